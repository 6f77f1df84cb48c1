//! Principal identity records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use housebank_core::{Entity, LedgerError, LedgerResult};

// ─────────────────────────────────────────────────────────────────────────────
// User
// ─────────────────────────────────────────────────────────────────────────────

/// A principal that can own accounts and hold sessions.
///
/// # Invariants
/// - `username` is unique and immutable.
/// - `hashed_password` is produced by an external hasher; the ledger never sees
///   the plain password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub full_name: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub hashed_password: String,
    pub password_changed_at: DateTime<Utc>,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Entity for User {
    type Id = String;

    fn id(&self) -> &Self::Id {
        &self.username
    }
}

impl User {
    pub fn is_email_verified(&self) -> bool {
        self.email_verified_at.is_some()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Parameters
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateUserParams {
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub hashed_password: String,
}

impl CreateUserParams {
    pub fn new(
        username: impl Into<String>,
        full_name: impl Into<String>,
        email: impl Into<String>,
        hashed_password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            full_name: full_name.into(),
            email: email.into(),
            hashed_password: hashed_password.into(),
        }
    }

    /// Shape checks only; uniqueness is enforced by the store.
    pub fn validate(&self) -> LedgerResult<()> {
        let username_ok = (3..=100).contains(&self.username.len())
            && self
                .username
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if !username_ok {
            return Err(LedgerError::validation(
                "username must be 3-100 lowercase letters, digits or underscores",
            ));
        }
        if self.full_name.trim().is_empty() {
            return Err(LedgerError::validation("full name must not be empty"));
        }
        if !self.email.contains('@') {
            return Err(LedgerError::validation("email is not valid"));
        }
        if self.hashed_password.is_empty() {
            return Err(LedgerError::validation("password hash must not be empty"));
        }
        Ok(())
    }
}

/// Partial profile update. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateUserParams {
    pub username: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub email_verified_at: Option<DateTime<Utc>>,
}

impl UpdateUserParams {
    pub fn for_user(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Default::default()
        }
    }

    pub fn apply_to(&self, user: &mut User) {
        if let Some(full_name) = &self.full_name {
            user.full_name = full_name.clone();
        }
        if let Some(email) = &self.email {
            user.email = email.clone();
        }
        if let Some(at) = self.email_verified_at {
            user.email_verified_at = Some(at);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangePasswordParams {
    pub username: String,
    pub hashed_password: String,
    pub password_changed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> CreateUserParams {
        CreateUserParams::new("alice_01", "Alice Doe", "alice@example.com", "$argon2id$...")
    }

    #[test]
    fn validate_accepts_well_formed_params() {
        assert!(params().validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_username_and_email() {
        let mut bad = params();
        bad.username = "Al".to_string();
        assert!(bad.validate().is_err());

        let mut bad = params();
        bad.email = "not-an-email".to_string();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn partial_update_only_touches_present_fields() {
        let now = Utc::now();
        let mut user = User {
            username: "alice_01".to_string(),
            full_name: "Alice Doe".to_string(),
            email: "alice@example.com".to_string(),
            hashed_password: "hash".to_string(),
            password_changed_at: now,
            email_verified_at: None,
            created_at: now,
        };

        let update = UpdateUserParams {
            email: Some("alice@new.example".to_string()),
            ..UpdateUserParams::for_user("alice_01")
        };
        update.apply_to(&mut user);

        assert_eq!(user.full_name, "Alice Doe");
        assert_eq!(user.email, "alice@new.example");
        assert!(!user.is_email_verified());
    }

    #[test]
    fn password_hash_is_never_serialized() {
        let now = Utc::now();
        let user = User {
            username: "bob".to_string(),
            full_name: "Bob".to_string(),
            email: "bob@example.com".to_string(),
            hashed_password: "secret-hash".to_string(),
            password_changed_at: now,
            email_verified_at: None,
            created_at: now,
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret-hash"));
    }
}
