use std::fmt;

/// A single source row that could not be migrated. The row is skipped and
/// the run continues.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RowError {
    /// Position of the row in its source page.
    pub position: usize,
    pub source_id: Option<String>,
    pub reason: String,
}

impl RowError {
    pub fn new(position: usize, source_id: Option<String>, reason: impl Into<String>) -> Self {
        Self {
            position,
            source_id,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source_id {
            Some(id) => write!(f, "row {} ({id}): {}", self.position, self.reason),
            None => write!(f, "row {}: {}", self.position, self.reason),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(#[source] serde_json::Error),

    #[error("Batch {batch} failed to commit: {source}")]
    BatchCommit {
        batch: usize,
        #[source]
        source: sea_orm::DbErr,
    },

    #[error("Batch {batch} timed out after {secs}s")]
    BatchTimeout { batch: usize, secs: u64 },

    #[error("ID mapping error: {0}")]
    Mapping(String),

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MigrateError>;
