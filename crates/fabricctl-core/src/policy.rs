//! Retry policies for the HTTP executor
//!
//! The executor asks its policy what to do after every failed attempt. The
//! default, [`NoRetryPolicy`], surfaces the first failure to the caller, so a
//! transient 5xx or network blip fails the call and the next apply retries it.

use std::fmt::Debug;
use std::time::Duration;

use crate::error::FabricError;

/// Decides whether a failed attempt should be repeated
pub trait RetryPolicy: Debug + Send + Sync {
    /// Delay before the next attempt, or `None` to give up.
    ///
    /// `attempt` is the 1-based number of the attempt that just failed.
    fn next_delay(&self, attempt: u32, error: &FabricError) -> Option<Duration>;
}

/// Never retries
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetryPolicy;

impl RetryPolicy for NoRetryPolicy {
    fn next_delay(&self, _attempt: u32, _error: &FabricError) -> Option<Duration> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_retry_policy_never_retries() {
        let policy = NoRetryPolicy;
        let err = FabricError::Request {
            url: "u".to_string(),
            status: 503,
            body: String::new(),
        };
        assert!(err.is_retryable());
        assert_eq!(policy.next_delay(1, &err), None);
        assert_eq!(policy.next_delay(10, &err), None);
    }
}
