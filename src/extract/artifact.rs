use std::path::Path;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use super::{Extractor, Page};
use crate::error::{MigrateError, Result, RowError};
use crate::model::SourceUserRecord;

/// Reads records from a captured query log.
///
/// The log wraps the JSON result between sentinel tags such as
/// `<untrusted-data-1234>` and `</untrusted-data-1234>`. The whole artifact
/// is parsed up front, so parse failures surface before anything is loaded.
pub struct ArtifactExtractor {
    values: Option<Vec<Value>>,
    skip: u64,
    limit: Option<u64>,
}

impl ArtifactExtractor {
    pub async fn open(path: &Path, boundary_prefix: &str) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        tracing::info!(path = %path.display(), bytes = text.len(), "Read artifact log");
        Self::from_text(&text, boundary_prefix)
    }

    pub fn from_text(text: &str, boundary_prefix: &str) -> Result<Self> {
        let values = extract_payload(text, boundary_prefix)?;
        Ok(Self {
            values: Some(values),
            skip: 0,
            limit: None,
        })
    }

    /// Start after the first `count` array elements.
    pub fn skip(mut self, count: u64) -> Self {
        self.skip = count;
        self
    }

    /// Read at most `count` elements.
    pub fn limit(mut self, count: Option<u64>) -> Self {
        self.limit = count;
        self
    }
}

#[async_trait]
impl Extractor for ArtifactExtractor {
    async fn next_page(&mut self) -> Result<Option<Page>> {
        let Some(values) = self.values.take() else {
            return Ok(None);
        };
        let window = values
            .into_iter()
            .skip(self.skip as usize)
            .take(self.limit.map_or(usize::MAX, |n| n as usize));
        Ok(Some(decode_records(self.skip, window)))
    }
}

/// Returns the first JSON array enclosed by a `<prefix…>` / `</prefix…>`
/// pair.
pub fn extract_payload(text: &str, boundary_prefix: &str) -> Result<Vec<Value>> {
    let prefix = regex::escape(boundary_prefix);
    let open = Regex::new(&format!(r"<{prefix}[^<>/]*>"))
        .map_err(|e| MigrateError::Configuration(format!("boundary prefix: {e}")))?;
    let close = Regex::new(&format!(r"</{prefix}[^<>]*>"))
        .map_err(|e| MigrateError::Configuration(format!("boundary prefix: {e}")))?;

    let mut pairs = 0usize;
    let mut first_error = None;

    for start in open.find_iter(text) {
        let rest = &text[start.end()..];
        let Some(end) = close.find(rest) else {
            continue;
        };
        pairs += 1;

        match serde_json::from_str::<Vec<Value>>(rest[..end.start()].trim()) {
            Ok(values) => {
                tracing::debug!(pairs, rows = values.len(), "Found payload");
                return Ok(values);
            }
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => {
            tracing::error!(pairs, "No boundary pair encloses a JSON array");
            Err(MigrateError::MalformedPayload(e))
        }
        None => Err(MigrateError::Parse(format!(
            "no <{boundary_prefix}…> … </{boundary_prefix}…> pair found"
        ))),
    }
}

/// Decodes each array element on its own so one bad row does not sink the
/// rest.
pub fn decode_records(offset: u64, values: impl IntoIterator<Item = Value>) -> Page {
    let mut page = Page {
        offset,
        ..Page::default()
    };
    for (i, value) in values.into_iter().enumerate() {
        let position = offset as usize + i;
        let source_id = value.get("id").and_then(Value::as_str).map(str::to_string);
        match serde_json::from_value::<SourceUserRecord>(value) {
            Ok(record) => page.records.push(record),
            Err(e) => page.rejected.push(RowError::new(position, source_id, e.to_string())),
        }
    }
    page
}
