use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{MigrateError, Result};

pub const DEFAULT_BATCH_SIZE: usize = 50;
/// Live extraction fetches this many batches per page unless told otherwise.
pub const DEFAULT_BATCHES_PER_PAGE: usize = 10;
pub const DEFAULT_OUTPUT_DIR: &str = "migration-out";
pub const DEFAULT_SOURCE_TABLE: &str = "auth.users";
pub const DEFAULT_ACCESS_TABLE: &str = "user_subscription_access";
pub const DEFAULT_BOUNDARY_PREFIX: &str = "untrusted-data";
pub const DEFAULT_BATCH_TIMEOUT_SECS: u64 = 60;
pub const MAPPING_FILE_NAME: &str = "user-id-mapping.json";

/// Where source records come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceHandle {
    /// Live identity-provider database.
    Database {
        url: String,
        /// Optionally schema-qualified, e.g. `auth.users`.
        table: String,
        /// Table with `user_id`/`has_access` rows used as the access signal.
        access_table: Option<String>,
    },
    /// Captured query output with the JSON payload between sentinel tags.
    Artifact {
        path: PathBuf,
        boundary_prefix: String,
    },
}

/// SQL dialect used when rendering batch files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum SqlDialect {
    #[default]
    Postgres,
    Sqlite,
}

/// Where transformed rows go.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TargetHandle {
    /// Execute batches directly against the target database.
    Database { url: String },
    /// Write one SQL file per batch into the output directory.
    SqlFiles { dialect: SqlDialect },
}

#[derive(Clone, Debug)]
pub struct MigrationConfig {
    pub source: SourceHandle,
    pub target: TargetHandle,
    pub batch_size: NonZeroUsize,
    /// Rows per live-query page. Always a multiple of `batch_size`.
    pub page_size: NonZeroUsize,
    /// Rows to skip at the start of the source ordering.
    pub skip_count: u64,
    pub max_records: Option<u64>,
    /// Holds SQL batch files and the ID mapping.
    pub output_directory: PathBuf,
    /// Access-grant export used when the source itself carries no signal.
    pub access_artifact: Option<PathBuf>,
    /// `email_verified` for rows whose source has no verification evidence.
    pub email_verified_default: bool,
    pub batch_timeout: Duration,
}

impl MigrationConfig {
    pub fn new(source: SourceHandle, target: TargetHandle) -> Self {
        let batch_size = NonZeroUsize::new(DEFAULT_BATCH_SIZE).unwrap_or(NonZeroUsize::MIN);
        Self {
            source,
            target,
            batch_size,
            page_size: batch_size.saturating_mul(
                NonZeroUsize::new(DEFAULT_BATCHES_PER_PAGE).unwrap_or(NonZeroUsize::MIN),
            ),
            skip_count: 0,
            max_records: None,
            output_directory: PathBuf::from(DEFAULT_OUTPUT_DIR),
            access_artifact: None,
            email_verified_default: false,
            batch_timeout: Duration::from_secs(DEFAULT_BATCH_TIMEOUT_SECS),
        }
    }

    pub fn mapping_path(&self) -> PathBuf {
        self.output_directory.join(MAPPING_FILE_NAME)
    }

    /// Check cross-field constraints. Runs before any I/O.
    pub fn validate(&self) -> Result<()> {
        match &self.source {
            SourceHandle::Database { url, table, .. } => {
                if url.trim().is_empty() {
                    return Err(MigrateError::Configuration(
                        "source database URL is empty".to_string(),
                    ));
                }
                if table.trim().is_empty() || table.split('.').count() > 2 {
                    return Err(MigrateError::Configuration(format!(
                        "invalid source table: {table:?}"
                    )));
                }
            }
            SourceHandle::Artifact {
                path,
                boundary_prefix,
            } => {
                if path.as_os_str().is_empty() {
                    return Err(MigrateError::Configuration(
                        "artifact path is empty".to_string(),
                    ));
                }
                if boundary_prefix.trim().is_empty() {
                    return Err(MigrateError::Configuration(
                        "boundary prefix is empty".to_string(),
                    ));
                }
            }
        }

        if let TargetHandle::Database { url } = &self.target {
            if url.trim().is_empty() {
                return Err(MigrateError::Configuration(
                    "target database URL is empty".to_string(),
                ));
            }
        }

        if self.page_size.get() % self.batch_size.get() != 0 {
            return Err(MigrateError::Configuration(format!(
                "page size {} must be a multiple of batch size {}",
                self.page_size, self.batch_size
            )));
        }

        if self.batch_timeout.is_zero() {
            return Err(MigrateError::Configuration(
                "batch timeout must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
