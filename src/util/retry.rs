//! Bounded fixed-delay retry with explicit cancellation.
//!
//! The payment confirmation worker runs three different cadences (record
//! lookup, pending polls, error retries); all of them go through this
//! primitive so that shutdown or manual teardown stops a loop between
//! attempts instead of leaking a sleeping task.

use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

/// What a single attempt decided
pub enum Attempt<T> {
    /// Terminal; stop retrying
    Done(T),
    /// Not there yet; try again after the delay
    Again,
}

/// How the whole retry loop ended
#[derive(Debug)]
pub enum Outcome<T> {
    Done { value: T, attempts: u32 },
    Exhausted { attempts: u32 },
    Cancelled { attempts: u32 },
    Failed { error: anyhow::Error, attempts: u32 },
}

impl<T> Outcome<T> {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Done { attempts, .. }
            | Self::Exhausted { attempts }
            | Self::Cancelled { attempts }
            | Self::Failed { attempts, .. } => *attempts,
        }
    }
}

/// Run `op` up to `policy.max_attempts` times with a fixed delay between
/// attempts. An `Err` from `op` aborts immediately; callers that want errors
/// retried wrap this loop in another policy.
pub async fn run<T, F, Fut>(
    policy: RetryPolicy,
    token: &CancellationToken,
    mut op: F,
) -> Outcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Attempt<T>>>,
{
    let mut attempts = 0;
    while attempts < policy.max_attempts {
        if token.is_cancelled() {
            return Outcome::Cancelled { attempts };
        }
        attempts += 1;

        match op(attempts).await {
            Ok(Attempt::Done(value)) => return Outcome::Done { value, attempts },
            Ok(Attempt::Again) => {}
            Err(error) => return Outcome::Failed { error, attempts },
        }

        if attempts < policy.max_attempts {
            tokio::select! {
                _ = token.cancelled() => return Outcome::Cancelled { attempts },
                _ = tokio::time::sleep(policy.delay) => {}
            }
        }
    }
    Outcome::Exhausted { attempts }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn policy(attempts: u32, secs: u64) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_secs(secs))
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_nth_attempt() {
        let token = CancellationToken::new();
        let outcome = run(policy(8, 3), &token, |attempt| async move {
            if attempt == 8 {
                Ok(Attempt::Done("found"))
            } else {
                Ok(Attempt::Again)
            }
        })
        .await;

        match outcome {
            Outcome::Done { value, attempts } => {
                assert_eq!(value, "found");
                assert_eq!(attempts, 8);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_max_attempts() {
        let token = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let outcome = run(policy(12, 4), &token, move |_| {
            let calls = calls2.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Attempt::<()>::Again)
            }
        })
        .await;

        assert!(matches!(outcome, Outcome::Exhausted { attempts: 12 }));
        assert_eq!(calls.load(Ordering::SeqCst), 12);
    }

    #[tokio::test(start_paused = true)]
    async fn error_aborts_immediately() {
        let token = CancellationToken::new();
        let outcome = run(policy(5, 5), &token, |_| async {
            Err::<Attempt<()>, _>(anyhow::anyhow!("gateway unreachable"))
        })
        .await;

        assert!(matches!(outcome, Outcome::Failed { attempts: 1, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_between_attempts() {
        let token = CancellationToken::new();
        let inner = token.clone();
        let outcome = run(policy(10, 3), &token, move |attempt| {
            let inner = inner.clone();
            async move {
                if attempt == 2 {
                    inner.cancel();
                }
                Ok(Attempt::<()>::Again)
            }
        })
        .await;

        assert!(matches!(outcome, Outcome::Cancelled { attempts: 2 }));
    }

    #[tokio::test(start_paused = true)]
    async fn pre_cancelled_token_never_runs_op() {
        let token = CancellationToken::new();
        token.cancel();
        let outcome: Outcome<()> = run(policy(3, 1), &token, |_| async {
            panic!("op must not run after cancellation")
        })
        .await;
        assert!(matches!(outcome, Outcome::Cancelled { attempts: 0 }));
    }
}
