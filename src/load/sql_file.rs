use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sea_orm::DbErr;

use super::{statements, Applied, BatchOutcome, Loader};
use crate::batch::Batch;
use crate::config::SqlDialect;
use crate::error::{MigrateError, Result};
use crate::model::MigratedUser;

/// Writes each batch as `batch-NNN-users.sql`, one transaction per file.
///
/// The files hold the same conflict-skipping statements the direct loader
/// executes, so applying a file once or several times has the same effect.
pub struct SqlFileLoader {
    dir: PathBuf,
    dialect: SqlDialect,
}

impl SqlFileLoader {
    pub fn new(dir: impl Into<PathBuf>, dialect: SqlDialect) -> Self {
        Self {
            dir: dir.into(),
            dialect,
        }
    }

    pub fn batch_path(&self, index: usize) -> PathBuf {
        batch_file_path(&self.dir, index)
    }
}

pub fn batch_file_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("batch-{index:03}-users.sql"))
}

/// Renders one batch as a self-contained transaction.
pub fn render_batch(batch: &Batch<MigratedUser>, dialect: SqlDialect) -> Result<(String, usize)> {
    let mut sql = String::new();
    let mut count = 0;
    let failed = |source: DbErr| MigrateError::BatchCommit {
        batch: batch.index,
        source,
    };

    let _ = writeln!(sql, "-- User migration batch {} ({} users)", batch.index, batch.len());
    let _ = writeln!(sql, "-- Conflicting rows are skipped; safe to apply more than once.");
    let _ = writeln!(sql, "-- A user whose email already backs a credential account is not inserted.");
    sql.push_str("\nBEGIN;\n\n");

    for (offset, item) in batch.items.iter().enumerate() {
        let user = statements::insert_user(&item.user).map_err(failed)?;
        let account = statements::insert_account(&item.account, &item.source_id).map_err(failed)?;

        let _ = writeln!(sql, "-- {}: source {}", offset + 1, item.source_id.replace('\n', " "));
        let _ = writeln!(sql, "{};", statements::render(&user, dialect));
        let _ = writeln!(sql, "{};\n", statements::render(&account, dialect));
        count += 2;
    }

    sql.push_str("COMMIT;\n");
    Ok((sql, count))
}

#[async_trait]
impl Loader for SqlFileLoader {
    async fn apply(&mut self, batch: &Batch<MigratedUser>) -> Result<BatchOutcome> {
        let (sql, statements) = render_batch(batch, self.dialect)?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.batch_path(batch.index);
        tokio::fs::write(&path, sql).await?;

        tracing::info!(
            batch = batch.index,
            users = batch.len(),
            path = %path.display(),
            "Wrote SQL batch"
        );

        Ok(BatchOutcome {
            index: batch.index,
            rows: batch.len(),
            applied: Applied::Written { path, statements },
            resolved_ids: batch
                .items
                .iter()
                .map(|item| (item.source_id.clone(), item.user.id.clone()))
                .collect(),
            rejected: Vec::new(),
        })
    }
}
