use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// One row of the identity provider's user table.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct SourceUserRecord {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub updated_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "deserialize_optional_timestamp")]
    pub last_sign_in_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_optional_timestamp")]
    pub email_confirmed_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "raw_metadata")]
    pub raw_user_meta_data: Option<Value>,
    /// Some exports project `raw_user_meta_data->>'full_name'` as its own column.
    #[serde(default)]
    pub full_name: Option<String>,
    /// Access-grant signal, present when the export joined the grant table.
    #[serde(default, alias = "has_access")]
    pub is_active: Option<bool>,
}

impl SourceUserRecord {
    /// The metadata document, with absence treated as an empty object.
    pub fn metadata(&self) -> Value {
        match &self.raw_user_meta_data {
            Some(Value::Null) | None => Value::Object(Default::default()),
            Some(value) => value.clone(),
        }
    }

    /// Reads a top-level metadata key.
    pub fn metadata_field(&self, key: &str) -> Option<&Value> {
        self.raw_user_meta_data.as_ref()?.as_object()?.get(key)
    }
}

/// A source record transformed into its `user` row and its `account` row.
#[derive(Clone, Debug, PartialEq)]
pub struct MigratedUser {
    /// Position of the source row, carried into row-level rejections.
    pub position: usize,
    pub source_id: String,
    pub user: entity::user::Model,
    pub account: entity::account::Model,
}

/// Parses RFC 3339 as well as the text form PostgreSQL prints for
/// `timestamptz` (`2025-03-04 12:34:56.789+00`).
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"] {
        if let Ok(ts) = DateTime::parse_from_str(value, format) {
            return Some(ts.with_timezone(&Utc));
        }
    }
    // No offset: Supabase stores UTC.
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw:?}")))
}

fn deserialize_optional_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) => parse_timestamp(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_postgres_text_timestamps() {
        let expected = Utc.with_ymd_and_hms(2025, 3, 4, 12, 34, 56).unwrap();
        assert_eq!(parse_timestamp("2025-03-04 12:34:56+00"), Some(expected));
        assert_eq!(parse_timestamp("2025-03-04T12:34:56Z"), Some(expected));
        assert_eq!(parse_timestamp("2025-03-04 14:34:56+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-03-04 12:34:56"), Some(expected));
        assert!(parse_timestamp("2025-03-04 12:34:56.789012+00").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn deserializes_export_row() {
        let record: SourceUserRecord = serde_json::from_value(serde_json::json!({
            "id": "a1",
            "email": "a@b.com",
            "created_at": "2025-01-01 10:00:00+00",
            "updated_at": "2025-01-02 10:00:00+00",
            "last_sign_in_at": null,
            "raw_user_meta_data": {"full_name": "Ada"},
            "has_access": true
        }))
        .unwrap();

        assert_eq!(record.id, "a1");
        assert_eq!(record.last_sign_in_at, None);
        assert_eq!(record.is_active, Some(true));
        assert_eq!(
            record.metadata_field("full_name"),
            Some(&Value::String("Ada".into()))
        );
    }

    #[test]
    fn missing_metadata_is_an_empty_document() {
        let record: SourceUserRecord = serde_json::from_value(serde_json::json!({
            "id": "a1",
            "created_at": "2025-01-01T10:00:00Z",
            "updated_at": "2025-01-01T10:00:00Z",
            "raw_user_meta_data": null
        }))
        .unwrap();

        assert_eq!(record.email, None);
        assert_eq!(record.metadata(), serde_json::json!({}));
        assert_eq!(record.metadata_field("full_name"), None);
    }
}
