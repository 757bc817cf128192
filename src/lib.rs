pub mod batch;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod id_mapping;
pub mod load;
pub mod model;
pub mod pipeline;
pub mod transform;

use config::{MigrationConfig, SourceHandle, TargetHandle};
use error::Result;
use extract::{ArtifactExtractor, DatabaseExtractor, Extractor};
use load::{DirectLoader, Loader, SqlFileLoader};
use pipeline::{Pipeline, RunSummary};

/// Opens the configured source and target and runs one migration wave.
pub async fn migrate(config: &MigrationConfig) -> Result<RunSummary> {
    config.validate()?;

    let mut extractor: Box<dyn Extractor> = match &config.source {
        SourceHandle::Database {
            url,
            table,
            access_table,
        } => {
            let db = db::pool::connect(url).await?;
            tracing::info!(table = %table, "Connected to source database");
            let mut extractor = DatabaseExtractor::new(db, table.as_str(), config.page_size)
                .skip(config.skip_count)
                .limit(config.max_records);
            if let Some(access_table) = access_table {
                extractor = extractor.with_access_table(access_table.as_str());
            }
            Box::new(extractor)
        }
        SourceHandle::Artifact {
            path,
            boundary_prefix,
        } => Box::new(
            ArtifactExtractor::open(path, boundary_prefix)
                .await?
                .skip(config.skip_count)
                .limit(config.max_records),
        ),
    };

    let mut loader: Box<dyn Loader> = match &config.target {
        TargetHandle::Database { url } => {
            let db = db::pool::connect(url).await?;
            tracing::info!("Connected to target database");
            Box::new(DirectLoader::new(db))
        }
        TargetHandle::SqlFiles { dialect } => {
            tracing::info!(
                dir = %config.output_directory.display(),
                ?dialect,
                "Writing SQL batch files"
            );
            Box::new(SqlFileLoader::new(&config.output_directory, *dialect))
        }
    };

    let mut pipeline = Pipeline::new(config).await?;
    pipeline.run(extractor.as_mut(), loader.as_mut()).await
}
