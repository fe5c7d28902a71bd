//! Bounded readiness polling
//!
//! Every "wait until infrastructure condition X holds" goes through
//! [`ReadinessPoller::poll_until`]. The check decides what is transient: a
//! resource that does not exist yet should come back as
//! [`PollResult::NotReady`], a resource in a terminal failure state as
//! [`PollResult::Fatal`].

use std::future::Future;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{Error, Result};

/// Outcome of a single readiness check
#[derive(Debug)]
pub enum PollResult {
    /// Condition holds
    Ready,
    /// Condition does not hold yet; the detail is reported as progress
    NotReady(String),
    /// Condition can never hold; stop polling
    Fatal(Error),
}

impl PollResult {
    /// Map a check that may fail transiently: errors become `NotReady`.
    pub fn transient<T, E: std::fmt::Display>(
        result: std::result::Result<T, E>,
        classify: impl FnOnce(T) -> PollResult,
    ) -> Self {
        match result {
            Ok(value) => classify(value),
            Err(e) => PollResult::NotReady(e.to_string()),
        }
    }
}

/// Interval/timeout bounds plus an optional cancellation signal
#[derive(Clone, Debug)]
pub struct ReadinessPoller {
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
}

impl ReadinessPoller {
    /// Create a poller with the given bounds
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop waiting when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Same interval and cancellation, different timeout
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            interval: self.interval,
            timeout,
            cancel: self.cancel.clone(),
        }
    }

    /// Configured timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Poll `check` until it reports `Ready`.
    ///
    /// The check runs first, then the poller sleeps `interval` between
    /// attempts. Fails with `ReadinessFatal` (or the check's own error) on
    /// `Fatal`, `ReadinessTimeout` once `timeout` has elapsed after a
    /// `NotReady` or while a check is still running, and `Cancelled` when the
    /// token fires. A zero timeout performs at most one check.
    pub async fn poll_until<F, Fut>(&self, what: &str, mut check: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = PollResult>,
    {
        let start = Instant::now();
        let mut last_detail = String::from("no status observed");

        loop {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled {
                    what: what.to_string(),
                });
            }

            let budget = self.timeout.saturating_sub(start.elapsed());
            let outcome = tokio::select! {
                outcome = tokio::time::timeout(budget, check()) => match outcome {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        debug!(what = %what, "check did not return within the timeout");
                        return Err(Error::ReadinessTimeout {
                            what: what.to_string(),
                            elapsed: start.elapsed(),
                            last_detail,
                        });
                    }
                },
                _ = self.cancel.cancelled() => {
                    return Err(Error::Cancelled { what: what.to_string() });
                }
            };

            match outcome {
                PollResult::Ready => {
                    debug!(what = %what, elapsed = ?start.elapsed(), "ready");
                    return Ok(());
                }
                PollResult::Fatal(e) => return Err(e),
                PollResult::NotReady(detail) => {
                    debug!(what = %what, detail = %detail, "not ready yet");
                    last_detail = detail;
                }
            }

            let elapsed = start.elapsed();
            if elapsed >= self.timeout {
                return Err(Error::ReadinessTimeout {
                    what: what.to_string(),
                    elapsed,
                    last_detail,
                });
            }

            let remaining = self.timeout - elapsed;
            tokio::select! {
                _ = tokio::time::sleep(self.interval.min(remaining)) => {}
                _ = self.cancel.cancelled() => {
                    return Err(Error::Cancelled { what: what.to_string() });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn poller(timeout_ms: u64) -> ReadinessPoller {
        ReadinessPoller::new(Duration::from_millis(1), Duration::from_millis(timeout_ms))
    }

    #[tokio::test]
    async fn zero_timeout_checks_once_then_times_out() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result = ReadinessPoller::new(Duration::from_secs(60), Duration::ZERO)
            .poll_until("cluster", || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    PollResult::NotReady("CREATING".to_string())
                }
            })
            .await;

        match result {
            Err(Error::ReadinessTimeout { last_detail, .. }) => assert_eq!(last_detail, "CREATING"),
            other => panic!("expected ReadinessTimeout, got {:?}", other),
        }
        assert!(calls.load(Ordering::SeqCst) <= 1);
    }

    #[tokio::test]
    async fn ready_after_not_ready() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        poller(5_000)
            .poll_until("nodes", || {
                let c = c.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) < 2 {
                        PollResult::NotReady("0/3 ready".to_string())
                    } else {
                        PollResult::Ready
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_stops_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result = poller(5_000)
            .poll_until("cluster", || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    PollResult::Fatal(Error::ReadinessFatal {
                        what: "cluster".to_string(),
                        detail: "FAILED".to_string(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(Error::ReadinessFatal { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timeout_names_last_detail() {
        let result = poller(20)
            .poll_until("pods in trino", || async {
                PollResult::NotReady("1/2 running".to_string())
            })
            .await;

        match result {
            Err(Error::ReadinessTimeout {
                what,
                elapsed,
                last_detail,
            }) => {
                assert_eq!(what, "pods in trino");
                assert!(elapsed >= Duration::from_millis(20));
                assert_eq!(last_detail, "1/2 running");
            }
            other => panic!("expected ReadinessTimeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn hung_check_is_bounded_by_timeout() {
        let poller = ReadinessPoller::new(Duration::from_millis(10), Duration::from_millis(50));
        let result = tokio::time::timeout(
            Duration::from_secs(2),
            poller.poll_until("cluster", std::future::pending::<PollResult>),
        )
        .await
        .expect("poller should give up on a check that never returns");

        match result {
            Err(Error::ReadinessTimeout { what, last_detail, .. }) => {
                assert_eq!(what, "cluster");
                assert_eq!(last_detail, "no status observed");
            }
            other => panic!("expected ReadinessTimeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn slow_check_keeps_last_detail() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result = poller(40)
            .poll_until("nodes", || {
                let c = c.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) == 0 {
                        PollResult::NotReady("1/3 ready".to_string())
                    } else {
                        std::future::pending().await
                    }
                }
            })
            .await;

        match result {
            Err(Error::ReadinessTimeout { last_detail, .. }) => assert_eq!(last_detail, "1/3 ready"),
            other => panic!("expected ReadinessTimeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn cancellation_stops_waiting() {
        let token = CancellationToken::new();
        let poller = ReadinessPoller::new(Duration::from_secs(30), Duration::from_secs(600))
            .with_cancellation(token.clone());

        let handle = tokio::spawn(async move {
            poller
                .poll_until("cluster", || async { PollResult::NotReady("CREATING".to_string()) })
                .await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("poller should stop promptly")
            .unwrap();
        assert!(matches!(result, Err(Error::Cancelled { .. })));
    }

    #[test]
    fn transient_errors_are_not_ready() {
        let result: std::result::Result<bool, String> = Err("ResourceNotFoundException".to_string());
        let outcome = PollResult::transient(result, |ready| {
            if ready {
                PollResult::Ready
            } else {
                PollResult::NotReady("pending".to_string())
            }
        });
        match outcome {
            PollResult::NotReady(detail) => assert!(detail.contains("ResourceNotFound")),
            other => panic!("expected NotReady, got {:?}", other),
        }
    }
}
