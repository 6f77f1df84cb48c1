//! Refresh-credential sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use housebank_core::{Entity, SessionId};

/// An issued refresh credential, owned by exactly one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub username: String,
    pub refresh_token: String,
    pub user_agent: String,
    pub client_ip: String,
    pub is_blocked: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Entity for Session {
    type Id = SessionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Session {
    /// Not revoked and not yet expired.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        !self.is_blocked && now < self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSessionParams {
    /// Chosen by the token issuer (the refresh token's own id).
    pub id: SessionId,
    pub username: String,
    pub refresh_token: String,
    pub user_agent: String,
    pub client_ip: String,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn blocked_or_expired_sessions_are_unusable() {
        let now = Utc::now();
        let mut session = Session {
            id: SessionId::new(),
            username: "alice".to_string(),
            refresh_token: "token".to_string(),
            user_agent: "test".to_string(),
            client_ip: "127.0.0.1".to_string(),
            is_blocked: false,
            expires_at: now + Duration::hours(1),
            created_at: now,
        };
        assert!(session.is_usable(now));
        assert!(!session.is_usable(now + Duration::hours(2)));

        session.is_blocked = true;
        assert!(!session.is_usable(now));
    }
}
