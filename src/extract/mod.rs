//! Source record extraction.

pub mod access;
pub mod artifact;
pub mod database;

use async_trait::async_trait;

use crate::error::{Result, RowError};
use crate::model::SourceUserRecord;

pub use access::AccessGrants;
pub use artifact::ArtifactExtractor;
pub use database::DatabaseExtractor;

/// One fetch from the source.
#[derive(Debug, Default)]
pub struct Page {
    /// Position of the first row of this page within the whole run.
    pub offset: u64,
    pub records: Vec<SourceUserRecord>,
    /// Rows present in the source that could not be decoded.
    pub rejected: Vec<RowError>,
}

impl Page {
    pub fn row_count(&self) -> usize {
        self.records.len() + self.rejected.len()
    }
}

/// Produces source records in source order, one page at a time.
#[async_trait]
pub trait Extractor: Send {
    /// `Ok(None)` once the source is exhausted.
    async fn next_page(&mut self) -> Result<Option<Page>>;
}
