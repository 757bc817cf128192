//! Applying batches to the target store.

pub mod direct;
pub mod sql_file;
pub mod statements;

use std::path::PathBuf;

use async_trait::async_trait;

use crate::batch::Batch;
use crate::error::{Result, RowError};
use crate::model::MigratedUser;

pub use direct::DirectLoader;
pub use sql_file::SqlFileLoader;

/// Rows written or skipped by one committed batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadCounts {
    pub users_inserted: u64,
    pub users_skipped: u64,
    pub accounts_inserted: u64,
    pub accounts_skipped: u64,
}

impl LoadCounts {
    pub fn add(&mut self, other: LoadCounts) {
        self.users_inserted += other.users_inserted;
        self.users_skipped += other.users_skipped;
        self.accounts_inserted += other.accounts_inserted;
        self.accounts_skipped += other.accounts_skipped;
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Applied {
    /// Executed and committed in one transaction.
    Committed(LoadCounts),
    /// Rendered to a SQL file for later execution.
    Written { path: PathBuf, statements: usize },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchOutcome {
    pub index: usize,
    pub rows: usize,
    pub applied: Applied,
    /// Source id and the target user id that holds it after this batch.
    pub resolved_ids: Vec<(String, String)>,
    /// Rows the target refused while the rest of the batch committed.
    pub rejected: Vec<RowError>,
}

/// Applies one batch with conflict-skip semantics. A batch either lands as a
/// whole or not at all.
#[async_trait]
pub trait Loader: Send {
    async fn apply(&mut self, batch: &Batch<MigratedUser>) -> Result<BatchOutcome>;
}
