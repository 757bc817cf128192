use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::config::{
    MigrationConfig, SourceHandle, SqlDialect, TargetHandle, DEFAULT_ACCESS_TABLE,
    DEFAULT_BATCHES_PER_PAGE, DEFAULT_BOUNDARY_PREFIX, DEFAULT_OUTPUT_DIR, DEFAULT_SOURCE_TABLE,
};
use crate::error::{MigrateError, Result};

#[derive(Parser, Debug)]
#[command(
    name = "user-migration",
    version,
    about = "Migrate identity-provider users into the application's user and account tables"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Extract, transform and load users.
    Migrate(MigrateArgs),
    /// Create the target tables if they do not exist.
    InitSchema(InitSchemaArgs),
}

#[derive(Args, Debug)]
pub struct MigrateArgs {
    /// Source database URL. Ignored when `--artifact` is given.
    #[arg(long, env = "SOURCE_DATABASE_URL", hide_env_values = true)]
    pub source_url: Option<String>,

    /// Captured query log to read users from instead of a live database.
    #[arg(long)]
    pub artifact: Option<PathBuf>,

    /// Target database URL. Ignored when `--emit-sql` is given.
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub target_url: Option<String>,

    /// Write one SQL file per batch instead of loading directly.
    #[arg(long)]
    pub emit_sql: bool,

    #[arg(long, default_value = "50")]
    pub batch_size: NonZeroUsize,

    /// Rows per source query. Defaults to ten batches.
    #[arg(long)]
    pub page_size: Option<NonZeroUsize>,

    /// Rows to skip at the start of the source ordering.
    #[arg(long, default_value_t = 0)]
    pub skip_count: u64,

    #[arg(long)]
    pub max_records: Option<u64>,

    /// Directory for SQL batch files and the ID mapping.
    #[arg(long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: PathBuf,

    #[arg(long, default_value = DEFAULT_SOURCE_TABLE)]
    pub source_table: String,

    /// Grant table joined as the activation signal in live mode.
    #[arg(long, default_value = DEFAULT_ACCESS_TABLE)]
    pub access_table: String,

    /// Do not join the grant table; every user is migrated as active.
    #[arg(long)]
    pub no_access_grants: bool,

    /// Captured access-grant query log for artifact runs.
    #[arg(long)]
    pub access_artifact: Option<PathBuf>,

    /// Tag prefix around the JSON payload in artifact logs.
    #[arg(long, default_value = DEFAULT_BOUNDARY_PREFIX)]
    pub boundary_prefix: String,

    #[arg(long, value_enum, default_value_t = SqlDialect::Postgres)]
    pub dialect: SqlDialect,

    /// Mark emails verified when the source has no evidence either way.
    #[arg(long)]
    pub email_verified_default: bool,

    #[arg(long, default_value_t = crate::config::DEFAULT_BATCH_TIMEOUT_SECS)]
    pub batch_timeout_secs: u64,
}

impl MigrateArgs {
    /// Resolves the source and target and validates the result.
    pub fn into_config(self) -> Result<MigrationConfig> {
        let source = match (self.artifact, self.source_url) {
            (Some(path), _) => SourceHandle::Artifact {
                path,
                boundary_prefix: self.boundary_prefix,
            },
            (None, Some(url)) => SourceHandle::Database {
                url,
                table: self.source_table,
                access_table: (!self.no_access_grants).then_some(self.access_table),
            },
            (None, None) => {
                return Err(MigrateError::Configuration(
                    "no source: pass --artifact or --source-url (or set SOURCE_DATABASE_URL)"
                        .to_string(),
                ))
            }
        };

        let target = match (self.emit_sql, self.target_url) {
            (true, _) => TargetHandle::SqlFiles {
                dialect: self.dialect,
            },
            (false, Some(url)) => TargetHandle::Database { url },
            (false, None) => {
                return Err(MigrateError::Configuration(
                    "no target: pass --emit-sql or --target-url (or set DATABASE_URL)".to_string(),
                ))
            }
        };

        let mut config = MigrationConfig::new(source, target);
        config.batch_size = self.batch_size;
        config.page_size = match self.page_size {
            Some(size) => size,
            None => self.batch_size.saturating_mul(
                NonZeroUsize::new(DEFAULT_BATCHES_PER_PAGE).unwrap_or(NonZeroUsize::MIN),
            ),
        };
        config.skip_count = self.skip_count;
        config.max_records = self.max_records;
        config.output_directory = self.output_dir;
        config.access_artifact = if self.no_access_grants {
            None
        } else {
            self.access_artifact
        };
        config.email_verified_default = self.email_verified_default;
        config.batch_timeout = Duration::from_secs(self.batch_timeout_secs);

        config.validate()?;
        Ok(config)
    }
}

#[derive(Args, Debug)]
pub struct InitSchemaArgs {
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub target_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn migrate_args(args: &[&str]) -> MigrateArgs {
        let argv = ["user-migration", "migrate"].iter().chain(args);
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Migrate(args) => args,
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn artifact_to_sql_files() {
        let config = migrate_args(&["--artifact", "users.log", "--emit-sql", "--dialect", "sqlite"])
            .into_config()
            .unwrap();

        assert_eq!(
            config.source,
            SourceHandle::Artifact {
                path: PathBuf::from("users.log"),
                boundary_prefix: "untrusted-data".into(),
            }
        );
        assert_eq!(
            config.target,
            TargetHandle::SqlFiles {
                dialect: SqlDialect::Sqlite
            }
        );
        assert_eq!(config.batch_size.get(), 50);
        assert_eq!(config.page_size.get(), 500);
        assert_eq!(config.output_directory, PathBuf::from("migration-out"));
        assert_eq!(config.batch_timeout, Duration::from_secs(60));
    }

    #[test]
    fn live_source_joins_grant_table_by_default() {
        let config = migrate_args(&[
            "--source-url",
            "postgres://localhost/source",
            "--target-url",
            "postgres://localhost/target",
            "--batch-size",
            "20",
            "--skip-count",
            "40",
        ])
        .into_config()
        .unwrap();

        assert_eq!(
            config.source,
            SourceHandle::Database {
                url: "postgres://localhost/source".into(),
                table: "auth.users".into(),
                access_table: Some("user_subscription_access".into()),
            }
        );
        assert_eq!(config.page_size.get(), 200);
        assert_eq!(config.skip_count, 40);
    }

    #[test]
    fn grants_can_be_disabled() {
        let config = migrate_args(&[
            "--source-url",
            "postgres://localhost/source",
            "--emit-sql",
            "--no-access-grants",
            "--access-artifact",
            "grants.log",
        ])
        .into_config()
        .unwrap();

        assert!(matches!(
            config.source,
            SourceHandle::Database {
                access_table: None,
                ..
            }
        ));
        assert_eq!(config.access_artifact, None);
    }

    #[test]
    fn misaligned_page_size_is_rejected() {
        let err = migrate_args(&["--artifact", "a.log", "--emit-sql", "--page-size", "75"])
            .into_config()
            .unwrap_err();
        assert!(matches!(err, MigrateError::Configuration(_)));
    }

    #[test]
    fn zero_batch_size_does_not_parse() {
        let argv = ["user-migration", "migrate", "--emit-sql", "--batch-size", "0"];
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[test]
    #[serial]
    fn missing_source_is_a_configuration_error() {
        std::env::remove_var("SOURCE_DATABASE_URL");
        let err = migrate_args(&["--emit-sql"]).into_config().unwrap_err();
        assert!(matches!(err, MigrateError::Configuration(_)));
    }

    #[test]
    #[serial]
    fn missing_target_is_a_configuration_error() {
        std::env::remove_var("DATABASE_URL");
        let err = migrate_args(&["--artifact", "a.log"]).into_config().unwrap_err();
        assert!(matches!(err, MigrateError::Configuration(_)));
    }
}
