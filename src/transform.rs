use entity::account::CREDENTIAL_PROVIDER;
use entity::user::ActivationStatus;
use serde_json::Value;
use uuid::Uuid;

use crate::error::RowError;
use crate::model::{MigratedUser, SourceUserRecord};

/// Role given to every migrated user.
pub const DEFAULT_ROLE: &str = "user";

/// Derivation rules fixed once per migration wave.
#[derive(Clone, Copy, Debug, Default)]
pub struct TransformPolicy {
    /// Used when neither the metadata flag nor a confirmation timestamp says
    /// whether the email was verified.
    pub email_verified_default: bool,
}

/// Map one source record to its `user`/`account` rows.
///
/// `user_id` is the target id to use (freshly drawn, or taken from the ID
/// mapping of an earlier run). `access` is the access-grant signal when one
/// is available.
pub fn transform(
    position: usize,
    record: &SourceUserRecord,
    user_id: String,
    access: Option<bool>,
    policy: TransformPolicy,
) -> Result<MigratedUser, RowError> {
    let reject = |reason: &str| RowError::new(position, Some(record.id.clone()), reason);

    if record.id.trim().is_empty() {
        return Err(RowError::new(position, None, "source id is empty"));
    }
    let email = record
        .email
        .as_deref()
        .map(str::trim)
        .filter(|email| !email.is_empty())
        .ok_or_else(|| reject("email is missing"))?;
    let name = derive_name(record, email).ok_or_else(|| reject("email has no local part"))?;

    let is_active = access.unwrap_or(true);

    let user = entity::user::Model {
        id: user_id,
        email: email.to_string(),
        email_verified: derive_email_verified(record, policy),
        image: None,
        name,
        created_at: record.created_at,
        updated_at: record.updated_at,
        role: DEFAULT_ROLE.to_string(),
        is_active,
        activation_status: ActivationStatus::from_active(is_active),
        last_active_at: Some(record.last_sign_in_at.unwrap_or(record.updated_at)),
        supabase_user_id: record.id.clone(),
        raw_user_meta_data: record.metadata(),
    };

    let account = entity::account::Model {
        id: Uuid::new_v4().to_string(),
        account_id: user.email.clone(),
        provider_id: CREDENTIAL_PROVIDER.to_string(),
        user_id: user.id.clone(),
        password: None,
        created_at: record.created_at,
        updated_at: record.updated_at,
    };

    Ok(MigratedUser {
        position,
        source_id: record.id.clone(),
        user,
        account,
    })
}

/// `full_name` from the metadata (or a projected `full_name` column), else
/// the local part of the email.
pub fn derive_name(record: &SourceUserRecord, email: &str) -> Option<String> {
    let full_name = match record.metadata_field("full_name") {
        Some(Value::String(name)) => Some(name.as_str()),
        _ => record.full_name.as_deref(),
    };
    if let Some(name) = full_name.map(str::trim).filter(|name| !name.is_empty()) {
        return Some(name.to_string());
    }

    email
        .split('@')
        .next()
        .filter(|local| !local.is_empty())
        .map(str::to_string)
}

fn derive_email_verified(record: &SourceUserRecord, policy: TransformPolicy) -> bool {
    match record.metadata_field("email_verified") {
        Some(Value::Bool(verified)) => *verified,
        _ if record.email_confirmed_at.is_some() => true,
        _ => policy.email_verified_default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn record(email: Option<&str>, metadata: Option<Value>) -> SourceUserRecord {
        SourceUserRecord {
            id: "11111111-2222-3333-4444-555555555555".into(),
            email: email.map(str::to_string),
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2025, 2, 1, 9, 0, 0).unwrap(),
            last_sign_in_at: None,
            email_confirmed_at: None,
            raw_user_meta_data: metadata,
            full_name: None,
            is_active: None,
        }
    }

    fn run(record: &SourceUserRecord, access: Option<bool>) -> MigratedUser {
        transform(0, record, "target-1".into(), access, TransformPolicy::default()).unwrap()
    }

    #[test]
    fn name_prefers_metadata_full_name() {
        let source = record(Some("jane@example.com"), Some(json!({"full_name": "Jane Doe"})));
        assert_eq!(run(&source, None).user.name, "Jane Doe");
    }

    #[test]
    fn name_falls_back_to_email_local_part() {
        let source = record(Some("bob@example.com"), None);
        assert_eq!(run(&source, None).user.name, "bob");

        let blank = record(Some("bob@example.com"), Some(json!({"full_name": "  "})));
        assert_eq!(run(&blank, None).user.name, "bob");
    }

    #[test]
    fn projected_full_name_column_is_used() {
        let mut source = record(Some("bob@example.com"), Some(json!({})));
        source.full_name = Some("Robert".into());
        assert_eq!(run(&source, None).user.name, "Robert");
    }

    #[test]
    fn user_and_account_are_linked() {
        let source = record(Some("bob@example.com"), None);
        let migrated = run(&source, None);

        assert_eq!(migrated.source_id, source.id);
        assert_eq!(migrated.user.id, "target-1");
        assert_eq!(migrated.user.supabase_user_id, source.id);
        assert_eq!(migrated.user.role, "user");
        assert_eq!(migrated.user.image, None);
        assert_eq!(migrated.user.raw_user_meta_data, json!({}));
        assert_eq!(migrated.account.user_id, "target-1");
        assert_eq!(migrated.account.account_id, "bob@example.com");
        assert_eq!(migrated.account.provider_id, "credential");
        assert_eq!(migrated.account.password, None);
        assert_eq!(migrated.account.created_at, source.created_at);
        assert_ne!(migrated.account.id, migrated.user.id);
    }

    #[test]
    fn activation_follows_access_signal() {
        let source = record(Some("bob@example.com"), None);

        let granted = run(&source, Some(true)).user;
        assert!(granted.is_active);
        assert_eq!(granted.activation_status, ActivationStatus::Active);

        let revoked = run(&source, Some(false)).user;
        assert!(!revoked.is_active);
        assert_eq!(revoked.activation_status, ActivationStatus::Inactive);

        let unknown = run(&source, None).user;
        assert!(unknown.is_active);
        assert_eq!(unknown.activation_status, ActivationStatus::Active);
    }

    #[test]
    fn last_active_prefers_sign_in() {
        let mut source = record(Some("bob@example.com"), None);
        assert_eq!(run(&source, None).user.last_active_at, Some(source.updated_at));

        let signed_in = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        source.last_sign_in_at = Some(signed_in);
        assert_eq!(run(&source, None).user.last_active_at, Some(signed_in));
    }

    #[test]
    fn email_verified_sources() {
        let flagged = record(Some("a@b.com"), Some(json!({"email_verified": true})));
        assert!(run(&flagged, None).user.email_verified);

        let mut confirmed = record(Some("a@b.com"), None);
        confirmed.email_confirmed_at = Some(confirmed.created_at);
        assert!(run(&confirmed, None).user.email_verified);

        let unknown = record(Some("a@b.com"), None);
        assert!(!run(&unknown, None).user.email_verified);

        let policy = TransformPolicy {
            email_verified_default: true,
        };
        let migrated = transform(0, &unknown, "t".into(), None, policy).unwrap();
        assert!(migrated.user.email_verified);
    }

    #[test]
    fn rows_without_usable_email_are_rejected() {
        let missing = record(None, None);
        let err = transform(3, &missing, "t".into(), None, TransformPolicy::default())
            .unwrap_err();
        assert_eq!(err.position, 3);
        assert_eq!(err.source_id.as_deref(), Some(missing.id.as_str()));

        let no_local = record(Some("@example.com"), None);
        assert!(transform(0, &no_local, "t".into(), None, TransformPolicy::default()).is_err());
    }
}
