use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use super::artifact::extract_payload;
use crate::error::{MigrateError, Result};

#[derive(Debug, Deserialize)]
struct GrantRow {
    user_id: String,
    #[serde(default)]
    has_access: Option<bool>,
}

/// Access-grant signal per source user id, loaded from an exported
/// `user_subscription_access` query.
#[derive(Clone, Debug, Default)]
pub struct AccessGrants {
    grants: HashMap<String, bool>,
}

impl AccessGrants {
    pub async fn open(path: &Path, boundary_prefix: &str) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        let grants = Self::from_text(&text, boundary_prefix)?;
        tracing::info!(path = %path.display(), users = grants.len(), "Loaded access grants");
        Ok(grants)
    }

    pub fn from_text(text: &str, boundary_prefix: &str) -> Result<Self> {
        let values = extract_payload(text, boundary_prefix)?;
        let mut grants = Self::default();
        for value in values {
            let row: GrantRow =
                serde_json::from_value(value).map_err(MigrateError::MalformedPayload)?;
            grants.record(row.user_id, row.has_access.unwrap_or(false));
        }
        Ok(grants)
    }

    /// A user is granted if any of its rows grants access.
    pub fn record(&mut self, user_id: String, has_access: bool) {
        *self.grants.entry(user_id).or_insert(false) |= has_access;
    }

    /// `None` when the export has no row for this user.
    pub fn signal(&self, user_id: &str) -> Option<bool> {
        self.grants.get(user_id).copied()
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}
