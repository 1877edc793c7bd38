//! Progress tracking and polling for long-running Fabric operations
//!
//! Fabric answers some creation requests with `202 Accepted` and an
//! `x-ms-operation-id` header. The result of that operation has to be polled
//! from `/operations/{id}/result` until it carries the created item's `id`.
//! This module turns that pattern into a single awaited call, with optional
//! progress callbacks for UI updates.
//!
//! Polling follows a [`PollSchedule`]: a fixed interval between attempts,
//! capped by a maximum attempt count and an optional overall timeout. A
//! backend that never reports completion ends in
//! [`FabricError::OperationTimeout`] instead of polling forever.

use serde::Deserialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::client::FabricClient;
use crate::error::{FabricError, Result};

/// Default time between polls (2 seconds)
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);

/// Default overall polling timeout (10 minutes)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Default cap on the number of polls
pub const DEFAULT_MAX_ATTEMPTS: u32 = 300;

/// Progress events emitted while waiting on an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Polling is about to start
    Started { operation_id: String },
    /// A poll returned without a completion signal
    Polling {
        operation_id: String,
        attempt: u32,
        elapsed: Duration,
    },
    /// The operation result carried the created item's id
    Completed {
        operation_id: String,
        result_id: String,
    },
    /// Polling stopped on an error, timeout or cancellation
    Failed { operation_id: String, error: String },
}

/// Callback type for progress updates
pub type ProgressCallback = Box<dyn Fn(ProgressEvent) + Send + Sync>;

/// Polling limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Fixed delay between two polls
    pub interval: Duration,
    /// Maximum number of polls
    pub max_attempts: u32,
    /// Overall deadline measured from the first poll
    pub timeout: Option<Duration>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }
}

impl PollConfig {
    /// Starts a new schedule; the deadline clock starts now.
    pub fn schedule(&self) -> PollSchedule {
        PollSchedule {
            interval: self.interval,
            max_attempts: self.max_attempts,
            deadline: self.timeout.map(|t| Instant::now() + t),
            issued: 0,
            cursor: None,
        }
    }
}

/// One scheduled poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollAttempt {
    /// 1-based attempt number
    pub number: u32,
    /// Time to wait before issuing this poll
    pub delay: Duration,
}

/// Lazy, finite sequence of poll attempts
///
/// The first attempt has no delay and is always issued; every later attempt
/// waits `interval`. The sequence ends after `max_attempts`, or as soon as the
/// planned time of the next attempt would cross the deadline.
#[derive(Debug, Clone)]
pub struct PollSchedule {
    interval: Duration,
    max_attempts: u32,
    deadline: Option<Instant>,
    issued: u32,
    /// Planned time of the previous attempt
    cursor: Option<Instant>,
}

impl Iterator for PollSchedule {
    type Item = PollAttempt;

    fn next(&mut self) -> Option<PollAttempt> {
        if self.issued >= self.max_attempts {
            return None;
        }

        let delay = if self.issued == 0 {
            Duration::ZERO
        } else {
            self.interval
        };

        let now = Instant::now();
        let planned = self.cursor.map_or(now, |c| c.max(now)) + delay;

        if self.issued > 0
            && let Some(deadline) = self.deadline
            && planned > deadline
        {
            return None;
        }

        self.cursor = Some(planned);
        self.issued += 1;
        Some(PollAttempt {
            number: self.issued,
            delay,
        })
    }
}

/// Typed view of an operation result; only the completion field is inspected.
#[derive(Debug, Deserialize)]
struct OperationResult {
    #[serde(default)]
    id: Option<String>,
}

/// Poll an operation until its result carries a non-empty `id`
///
/// # Arguments
///
/// * `client` - The API client; every poll is an authenticated GET
/// * `operation_id` - Value of the `x-ms-operation-id` header
/// * `config` - Interval and limits
/// * `on_progress` - Optional callback for progress updates
///
/// # Returns
///
/// The full JSON body of the completed operation result.
///
/// # Errors
///
/// [`FabricError::OperationTimeout`] when the schedule is exhausted,
/// [`FabricError::Cancelled`] when the client's cancellation token fires,
/// and any error of the underlying GET.
///
/// # Example
///
/// ```rust,ignore
/// use fabricctl_core::progress::{poll_operation, PollConfig, ProgressEvent};
///
/// let result = poll_operation(
///     &client,
///     "op123",
///     &PollConfig::default(),
///     Some(Box::new(|event| {
///         if let ProgressEvent::Polling { attempt, elapsed, .. } = event {
///             println!("attempt {attempt} ({:.0}s)", elapsed.as_secs());
///         }
///     })),
/// )
/// .await?;
/// ```
pub async fn poll_operation(
    client: &FabricClient,
    operation_id: &str,
    config: &PollConfig,
    on_progress: Option<ProgressCallback>,
) -> Result<serde_json::Value> {
    emit(
        &on_progress,
        ProgressEvent::Started {
            operation_id: operation_id.to_string(),
        },
    );

    let result = poll_until_complete(client, operation_id, config, &on_progress).await;

    if let Err(ref e) = result {
        warn!(operation_id, error = %e, "operation polling stopped");
        emit(
            &on_progress,
            ProgressEvent::Failed {
                operation_id: operation_id.to_string(),
                error: e.to_string(),
            },
        );
    }

    result
}

async fn poll_until_complete(
    client: &FabricClient,
    operation_id: &str,
    config: &PollConfig,
    on_progress: &Option<ProgressCallback>,
) -> Result<serde_json::Value> {
    let url = client.endpoints().operation_result(operation_id);
    let start = Instant::now();
    let mut attempts = 0;

    for attempt in config.schedule() {
        if !attempt.delay.is_zero() {
            client.sleep(attempt.delay).await?;
        }
        attempts = attempt.number;

        let body = client.get(&url).await?.into_value();
        let result: OperationResult =
            serde_json::from_value(body.clone()).map_err(|e| FabricError::decode(&url, e))?;

        if let Some(result_id) = result.id.filter(|id| !id.is_empty()) {
            info!(operation_id, result_id = %result_id, attempts, "operation completed");
            emit(
                on_progress,
                ProgressEvent::Completed {
                    operation_id: operation_id.to_string(),
                    result_id,
                },
            );
            return Ok(body);
        }

        debug!(operation_id, attempt = attempt.number, "operation still running");
        emit(
            on_progress,
            ProgressEvent::Polling {
                operation_id: operation_id.to_string(),
                attempt: attempt.number,
                elapsed: start.elapsed(),
            },
        );
    }

    Err(FabricError::OperationTimeout {
        operation_id: operation_id.to_string(),
        attempts,
    })
}

/// Helper to emit progress events
fn emit(callback: &Option<ProgressCallback>, event: ProgressEvent) {
    if let Some(cb) = callback {
        cb(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_is_capped_by_attempts() {
        let config = PollConfig {
            interval: Duration::from_secs(2),
            max_attempts: 3,
            timeout: None,
        };
        let attempts: Vec<_> = config.schedule().collect();
        assert_eq!(
            attempts,
            vec![
                PollAttempt {
                    number: 1,
                    delay: Duration::ZERO
                },
                PollAttempt {
                    number: 2,
                    delay: Duration::from_secs(2)
                },
                PollAttempt {
                    number: 3,
                    delay: Duration::from_secs(2)
                },
            ]
        );
    }

    #[test]
    fn test_schedule_is_capped_by_deadline() {
        let config = PollConfig {
            interval: Duration::from_secs(2),
            max_attempts: 100,
            timeout: Some(Duration::from_secs(5)),
        };
        // 0s, 2s, 4s fit in the window; 6s does not
        assert_eq!(config.schedule().count(), 3);
    }

    #[test]
    fn test_zero_timeout_still_polls_once() {
        let config = PollConfig {
            interval: Duration::from_millis(10),
            max_attempts: 100,
            timeout: Some(Duration::ZERO),
        };
        assert_eq!(config.schedule().count(), 1);
    }

    #[test]
    fn test_zero_attempts_yields_nothing() {
        let config = PollConfig {
            interval: Duration::from_millis(10),
            max_attempts: 0,
            timeout: None,
        };
        assert_eq!(config.schedule().next(), None);
    }

    #[test]
    fn test_operation_result_parsing() {
        let done: OperationResult = serde_json::from_str(r#"{"id":"final-1","type":"Eventstream"}"#).unwrap();
        assert_eq!(done.id.as_deref(), Some("final-1"));

        let pending: OperationResult = serde_json::from_str("{}").unwrap();
        assert!(pending.id.is_none());
    }
}
