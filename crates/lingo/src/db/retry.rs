//! Bounded retry for SQLite busy/locked conditions.
//!
//! SQLite serializes writers. A second writer (another connection or another
//! process sharing the file) sees `SQLITE_BUSY` once the busy timeout runs
//! out, and some lock upgrades fail immediately. Every store operation runs
//! through [`with_retry`] so these surface as a short wait instead of an error.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::DatabaseError;

/// How many times, and how far apart, a busy operation is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub attempts: u32,
    #[serde(rename = "delay_ms", with = "duration_ms")]
    pub delay: Duration,
}

impl RetryPolicy {
    /// Small writes and point reads.
    pub const WRITE: RetryPolicy = RetryPolicy {
        attempts: 8,
        delay: Duration::from_millis(10),
    };

    /// List-style reads that may queue behind many writers.
    pub const LIST: RetryPolicy = RetryPolicy {
        attempts: 40,
        delay: Duration::from_millis(25),
    };

    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::WRITE
    }
}

/// Runs `f` until it succeeds, fails with a non-busy error, or the policy's
/// attempts are used up.
pub fn with_retry<T, F>(policy: RetryPolicy, operation: &str, mut f: F) -> Result<T, DatabaseError>
where
    F: FnMut() -> Result<T, DatabaseError>,
{
    let attempts = policy.attempts.max(1);
    for attempt in 1..=attempts {
        match f() {
            Err(e) if e.is_busy() => {
                log::debug!(
                    "{} hit a locked database (attempt {}/{})",
                    operation,
                    attempt,
                    attempts
                );
                if attempt < attempts {
                    std::thread::sleep(policy.delay);
                }
            }
            other => return other,
        }
    }

    log::warn!(
        "{} gave up after {} attempts on a locked database",
        operation,
        attempts
    );
    Err(DatabaseError::Busy {
        operation: operation.to_string(),
        attempts,
    })
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
