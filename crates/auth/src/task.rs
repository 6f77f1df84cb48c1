//! Task payloads emitted by identity workflows.

use serde::{Deserialize, Serialize};

/// Ask the mail worker to send a verification email to `username`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendVerifyEmail {
    pub username: String,
}

impl SendVerifyEmail {
    pub const TASK_TYPE: &'static str = "task:send_verify_email";

    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }

    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::json!({ "username": self.username })
    }

    pub fn from_payload(payload: &serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(payload.clone())
    }
}
