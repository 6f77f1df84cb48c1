//! Outbox rows and delivery policies.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use housebank_auth::SendVerifyEmail;
use housebank_core::{LedgerError, LedgerResult, OutboxId};

/// Delivery state of an outbox row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    /// Waiting for (re)delivery once `available_at` has passed.
    Pending,
    /// Handed to the external system.
    Delivered,
    /// Exhausted retries; kept for inspection.
    DeadLettered,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Delivered => "delivered",
            OutboxStatus::DeadLettered => "dead_lettered",
        }
    }

    pub fn parse(raw: &str) -> LedgerResult<Self> {
        match raw {
            "pending" => Ok(OutboxStatus::Pending),
            "delivered" => Ok(OutboxStatus::Delivered),
            "dead_lettered" => Ok(OutboxStatus::DeadLettered),
            other => Err(LedgerError::validation(format!(
                "unknown outbox status: {other}"
            ))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OutboxStatus::Pending)
    }
}

/// A side effect recorded in the same transaction as the state change that
/// caused it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxMessage {
    pub id: OutboxId,
    /// Routing key for [`OutboxHandler`](super::OutboxHandler) lookup.
    pub topic: String,
    pub payload: serde_json::Value,
    pub status: OutboxStatus,
    /// Delivery attempts made so far.
    pub attempts: u32,
    pub last_error: Option<String>,
    /// Not claimable before this instant (backoff).
    pub available_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl OutboxMessage {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == OutboxStatus::Pending && self.available_at <= now
    }
}

/// Insert parameters for a new outbox row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOutboxMessage {
    pub topic: String,
    pub payload: serde_json::Value,
    /// Defaults to "now" when absent.
    pub available_at: Option<DateTime<Utc>>,
}

impl NewOutboxMessage {
    pub fn new(topic: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
            available_at: None,
        }
    }

    pub fn delayed_until(mut self, at: DateTime<Utc>) -> Self {
        self.available_at = Some(at);
        self
    }
}

impl From<&SendVerifyEmail> for NewOutboxMessage {
    fn from(task: &SendVerifyEmail) -> Self {
        Self::new(SendVerifyEmail::TASK_TYPE, task.to_payload())
    }
}

/// What to do with a message whose delivery just failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    RetryAt(DateTime<Utc>),
    DeadLetter,
}

/// Backoff strategy for redelivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    Fixed,
    /// base * 2^(attempt - 1)
    #[default]
    Exponential,
    /// base * attempt
    Linear,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total delivery attempts before dead-lettering.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
    /// Jitter factor (0.0-1.0).
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            strategy: BackoffStrategy::Exponential,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Dead-letter on the first failure.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
            jitter: 0.0,
        }
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            strategy: BackoffStrategy::Exponential,
            jitter: 0.1,
        }
    }

    /// Delay before the next attempt, given how many attempts already failed
    /// (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;

        let delay_ms = match self.strategy {
            BackoffStrategy::Fixed => base_ms,
            BackoffStrategy::Exponential => {
                let exp = 2_f64.powi(attempt.saturating_sub(1).min(30) as i32);
                (base_ms * exp).min(max_ms)
            }
            BackoffStrategy::Linear => (base_ms * attempt as f64).min(max_ms),
        };

        // Deterministic spread so retries of one batch do not line up.
        let jitter_range = delay_ms * self.jitter;
        let jitter = if jitter_range > 0.0 {
            let pseudo_random = ((attempt as f64 * 17.0) % 100.0) / 100.0;
            jitter_range * (pseudo_random - 0.5) * 2.0
        } else {
            0.0
        };

        Duration::from_millis((delay_ms + jitter).max(0.0) as u64)
    }

    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Disposition after the `attempts`-th failed delivery.
    ///
    /// A retry time that cannot be represented dead-letters the message.
    pub fn on_failure(&self, attempts: u32, now: DateTime<Utc>) -> FailureDisposition {
        if !self.should_retry(attempts) {
            return FailureDisposition::DeadLetter;
        }
        chrono::Duration::from_std(self.delay_for_attempt(attempts))
            .ok()
            .and_then(|delay| now.checked_add_signed(delay))
            .map_or(FailureDisposition::DeadLetter, FailureDisposition::RetryAt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_doubles_until_cap() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            strategy: BackoffStrategy::Exponential,
            jitter: 0.0,
        };

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(60), Duration::from_millis(500));
    }

    #[test]
    fn linear_and_fixed_backoff() {
        let linear = RetryPolicy {
            strategy: BackoffStrategy::Linear,
            jitter: 0.0,
            base_delay: Duration::from_millis(100),
            ..Default::default()
        };
        assert_eq!(linear.delay_for_attempt(3), Duration::from_millis(300));

        let fixed = RetryPolicy::fixed(3, Duration::from_millis(50));
        assert_eq!(fixed.delay_for_attempt(1), fixed.delay_for_attempt(3));
    }

    #[test]
    fn dead_letters_after_max_attempts() {
        let now = Utc::now();
        let policy = RetryPolicy::fixed(2, Duration::from_millis(10));

        assert!(matches!(
            policy.on_failure(1, now),
            FailureDisposition::RetryAt(at) if at > now
        ));
        assert_eq!(policy.on_failure(2, now), FailureDisposition::DeadLetter);
        assert_eq!(
            RetryPolicy::no_retry().on_failure(1, now),
            FailureDisposition::DeadLetter
        );
    }

    #[test]
    fn unrepresentable_retry_time_dead_letters() {
        let now = Utc::now();
        // ~31 million years: fits a chrono::Duration, overflows DateTime<Utc>.
        let huge = Duration::from_secs(1_000_000_000_000_000);
        let policy = RetryPolicy::fixed(5, huge);
        assert_eq!(policy.on_failure(1, now), FailureDisposition::DeadLetter);

        let beyond_chrono = RetryPolicy::fixed(5, Duration::MAX);
        assert_eq!(beyond_chrono.on_failure(1, now), FailureDisposition::DeadLetter);
    }

    #[test]
    fn status_round_trips_through_its_column_value() {
        for status in [
            OutboxStatus::Pending,
            OutboxStatus::Delivered,
            OutboxStatus::DeadLettered,
        ] {
            assert_eq!(OutboxStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(OutboxStatus::parse("sent").is_err());
    }

    #[test]
    fn verification_task_maps_to_its_topic() {
        let message = NewOutboxMessage::from(&SendVerifyEmail::new("alice"));
        assert_eq!(message.topic, SendVerifyEmail::TASK_TYPE);
        assert_eq!(message.payload["username"], "alice");
    }
}
