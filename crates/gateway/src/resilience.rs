//! Circuit breaker and retry policy shared by all tool invocations.

use crate::error::{GatewayError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResilienceSettings {
    /// Number of most recent calls the breaker looks at.
    pub window_size: usize,
    /// The breaker never opens with fewer recorded calls than this.
    pub minimum_calls: usize,
    /// Failure ratio (0.0..=1.0) at which the breaker opens.
    pub failure_rate_threshold: f64,
    pub open_duration_ms: u64,
    pub half_open_probes: u32,
    /// Total attempts per call, including the first.
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for ResilienceSettings {
    fn default() -> Self {
        Self {
            window_size: 10,
            minimum_calls: 5,
            failure_rate_threshold: 0.5,
            open_duration_ms: 30_000,
            half_open_probes: 1,
            max_attempts: 3,
            retry_delay_ms: 500,
        }
    }
}

/// Breaker + retry decisions for tool calls.
///
/// Every method receives the tool name so a per-tool policy can replace the shared one.
pub trait ResiliencePolicy: Send + Sync {
    /// Ask the breaker for permission to dispatch one attempt.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::CircuitOpen`] while the breaker is open.
    fn try_acquire(&self, tool: &str) -> Result<()>;

    /// Report the outcome of an attempt admitted by `try_acquire`.
    fn record(&self, tool: &str, failed: bool);

    /// Give back an admitted attempt that ended without an outcome (its future was dropped).
    fn release(&self, tool: &str);

    fn max_attempts(&self, tool: &str) -> u32;

    /// Delay before attempt `attempt + 1`.
    fn retry_delay(&self, tool: &str, attempt: u32) -> Duration;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CircuitState {
    Closed,
    Open { until: Instant },
    HalfOpen { in_flight: u32 },
}

struct Breaker {
    state: CircuitState,
    window: VecDeque<bool>,
}

/// One count-based circuit breaker and one fixed-delay retry policy for every tool.
pub struct SharedResilience {
    settings: ResilienceSettings,
    breaker: Mutex<Breaker>,
}

impl SharedResilience {
    #[must_use]
    pub fn new(settings: ResilienceSettings) -> Self {
        Self {
            breaker: Mutex::new(Breaker {
                state: CircuitState::Closed,
                window: VecDeque::with_capacity(settings.window_size),
            }),
            settings,
        }
    }

    fn open_duration(&self) -> Duration {
        Duration::from_millis(self.settings.open_duration_ms)
    }

    /// Whether the breaker currently rejects calls.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(
            self.breaker.lock().state,
            CircuitState::Open { until } if until > Instant::now()
        )
    }
}

impl Default for SharedResilience {
    fn default() -> Self {
        Self::new(ResilienceSettings::default())
    }
}

impl ResiliencePolicy for SharedResilience {
    fn try_acquire(&self, tool: &str) -> Result<()> {
        let now = Instant::now();
        let mut breaker = self.breaker.lock();
        match breaker.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open { until } if now < until => Err(GatewayError::CircuitOpen {
                retry_after: until - now,
            }),
            CircuitState::Open { .. } => {
                tracing::info!(tool = %tool, "Circuit breaker half-open; admitting probe");
                breaker.state = CircuitState::HalfOpen { in_flight: 1 };
                Ok(())
            }
            CircuitState::HalfOpen { in_flight } if in_flight < self.settings.half_open_probes => {
                breaker.state = CircuitState::HalfOpen {
                    in_flight: in_flight + 1,
                };
                Ok(())
            }
            CircuitState::HalfOpen { .. } => Err(GatewayError::CircuitOpen {
                retry_after: Duration::ZERO,
            }),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn record(&self, tool: &str, failed: bool) {
        let now = Instant::now();
        let mut breaker = self.breaker.lock();
        match breaker.state {
            CircuitState::Open { .. } => {}
            CircuitState::HalfOpen { .. } => {
                breaker.window.clear();
                if failed {
                    tracing::warn!(tool = %tool, "Circuit breaker probe failed; reopening");
                    breaker.state = CircuitState::Open {
                        until: now + self.open_duration(),
                    };
                } else {
                    tracing::info!(tool = %tool, "Circuit breaker closed");
                    breaker.state = CircuitState::Closed;
                }
            }
            CircuitState::Closed => {
                if breaker.window.len() >= self.settings.window_size.max(1) {
                    breaker.window.pop_front();
                }
                breaker.window.push_back(failed);

                let calls = breaker.window.len();
                if calls < self.settings.minimum_calls.max(1) {
                    return;
                }
                let failures = breaker.window.iter().filter(|f| **f).count();
                let rate = failures as f64 / calls as f64;
                if rate >= self.settings.failure_rate_threshold {
                    tracing::warn!(
                        tool = %tool,
                        failures,
                        calls,
                        open_ms = self.settings.open_duration_ms,
                        "Circuit breaker opened"
                    );
                    breaker.window.clear();
                    breaker.state = CircuitState::Open {
                        until: now + self.open_duration(),
                    };
                }
            }
        }
    }

    fn release(&self, tool: &str) {
        let mut breaker = self.breaker.lock();
        if let CircuitState::HalfOpen { in_flight } = breaker.state {
            tracing::debug!(tool = %tool, "Circuit breaker probe abandoned");
            breaker.state = CircuitState::HalfOpen {
                in_flight: in_flight.saturating_sub(1),
            };
        }
    }

    fn max_attempts(&self, _tool: &str) -> u32 {
        self.settings.max_attempts.max(1)
    }

    fn retry_delay(&self, _tool: &str, _attempt: u32) -> Duration {
        Duration::from_millis(self.settings.retry_delay_ms)
    }
}

/// An admitted attempt. Dropped without [`Permit::settle`], it is released back to the policy.
struct Permit<'a> {
    policy: &'a dyn ResiliencePolicy,
    tool: &'a str,
    settled: bool,
}

impl Permit<'_> {
    fn settle(mut self, failed: bool) {
        self.settled = true;
        self.policy.record(self.tool, failed);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.policy.release(self.tool);
        }
    }
}

/// Result of a resilient execution plus how many attempts were dispatched.
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: Result<T>,
    pub attempts: u32,
}

/// Run `op` under `policy`.
///
/// `checkpoint` runs before every attempt; an error from it (e.g. cancellation) ends the loop.
/// Circuit-open rejections are returned immediately. Only [`GatewayError::is_retryable`]
/// failures count against the breaker and are retried. An attempt whose future is dropped
/// mid-flight is released, so an abandoned half-open probe does not wedge the breaker.
pub async fn execute_with_resilience<T, C, F, Fut>(
    policy: &dyn ResiliencePolicy,
    tool: &str,
    checkpoint: C,
    mut op: F,
) -> Attempted<T>
where
    C: Fn() -> Result<()>,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts(tool).max(1);
    let mut attempts = 0;
    loop {
        if let Err(e) = checkpoint().and_then(|()| policy.try_acquire(tool)) {
            return Attempted {
                result: Err(e),
                attempts,
            };
        }

        let permit = Permit {
            policy,
            tool,
            settled: false,
        };
        attempts += 1;
        match op(attempts).await {
            Ok(value) => {
                permit.settle(false);
                return Attempted {
                    result: Ok(value),
                    attempts,
                };
            }
            Err(e) => {
                let retryable = e.is_retryable();
                permit.settle(retryable);
                if !retryable || attempts >= max_attempts {
                    return Attempted {
                        result: Err(e),
                        attempts,
                    };
                }
                let delay = policy.retry_delay(tool, attempts);
                tracing::debug!(
                    tool = %tool,
                    attempt = attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "Retrying tool call"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn unavailable() -> GatewayError {
        GatewayError::UpstreamHttp {
            status: 503,
            body: String::new(),
        }
    }

    fn no_checkpoint() -> Result<()> {
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn breaker_opens_at_failure_rate_and_recovers_through_probe() {
        let policy = SharedResilience::default();
        for _ in 0..4 {
            policy.try_acquire("a").unwrap();
            policy.record("a", true);
        }
        assert!(!policy.is_open(), "below minimum calls");

        policy.try_acquire("a").unwrap();
        policy.record("a", true);
        assert!(policy.is_open());

        // Shared across tools.
        let err = policy.try_acquire("b").unwrap_err();
        assert!(matches!(err, GatewayError::CircuitOpen { .. }));

        tokio::time::advance(Duration::from_secs(31)).await;
        policy.try_acquire("b").unwrap();
        assert!(matches!(
            policy.try_acquire("c"),
            Err(GatewayError::CircuitOpen { .. })
        ));
        policy.record("b", false);
        policy.try_acquire("c").unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_probe_reopens() {
        let policy = SharedResilience::default();
        for _ in 0..5 {
            policy.try_acquire("a").unwrap();
            policy.record("a", true);
        }
        tokio::time::advance(Duration::from_secs(31)).await;
        policy.try_acquire("a").unwrap();
        policy.record("a", true);
        assert!(policy.is_open());
    }

    #[tokio::test]
    async fn mixed_window_below_threshold_stays_closed() {
        let policy = SharedResilience::default();
        for i in 0..10 {
            policy.try_acquire("a").unwrap();
            policy.record("a", i % 3 == 0);
        }
        assert!(!policy.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_errors_up_to_max_attempts() {
        let policy = SharedResilience::default();
        let calls = AtomicU32::new(0);
        let out: Attempted<()> = execute_with_resilience(&policy, "a", no_checkpoint, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(unavailable()) }
        })
        .await;
        assert_eq!(out.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(out.result, Err(GatewayError::UpstreamHttp { status: 503, .. })));
    }

    #[tokio::test]
    async fn deterministic_errors_are_not_retried() {
        let policy = SharedResilience::default();
        let out: Attempted<()> = execute_with_resilience(&policy, "a", no_checkpoint, |_| async {
            Err(GatewayError::UpstreamHttp {
                status: 404,
                body: String::new(),
            })
        })
        .await;
        assert_eq!(out.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failure() {
        let policy = SharedResilience::default();
        let out = execute_with_resilience(&policy, "a", no_checkpoint, |attempt| async move {
            if attempt < 2 { Err(unavailable()) } else { Ok(attempt) }
        })
        .await;
        assert_eq!(out.result.unwrap(), 2);
        assert_eq!(out.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn open_circuit_dispatches_nothing() {
        let policy = SharedResilience::default();
        for _ in 0..5 {
            policy.try_acquire("a").unwrap();
            policy.record("a", true);
        }
        let calls = AtomicU32::new(0);
        let out: Attempted<()> = execute_with_resilience(&policy, "other", no_checkpoint, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })
        .await;
        assert_eq!(out.attempts, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(matches!(out.result, Err(GatewayError::CircuitOpen { .. })));
    }

    #[tokio::test]
    async fn checkpoint_failure_stops_before_dispatch() {
        let policy = SharedResilience::default();
        let out: Attempted<()> = execute_with_resilience(
            &policy,
            "a",
            || Err(GatewayError::Cancelled("c1".into())),
            |_| async { Ok(()) },
        )
        .await;
        assert_eq!(out.attempts, 0);
        assert!(matches!(out.result, Err(GatewayError::Cancelled(_))));
    }

    fn trip(policy: &SharedResilience) {
        for _ in 0..5 {
            policy.try_acquire("a").unwrap();
            policy.record("a", true);
        }
        assert!(policy.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_probe_frees_the_half_open_slot() {
        let policy = SharedResilience::default();
        trip(&policy);
        tokio::time::advance(Duration::from_secs(31)).await;

        let probe = execute_with_resilience(&policy, "a", no_checkpoint, |_| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok::<_, GatewayError>(())
        });
        assert!(
            tokio::time::timeout(Duration::from_millis(10), probe)
                .await
                .is_err()
        );

        policy.try_acquire("b").unwrap();
        policy.record("b", false);
        assert!(!policy.is_open());
        policy.try_acquire("c").unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn release_outside_half_open_changes_nothing() {
        let policy = SharedResilience::default();
        policy.release("a");
        policy.try_acquire("a").unwrap();

        trip(&policy);
        policy.release("a");
        assert!(matches!(
            policy.try_acquire("a"),
            Err(GatewayError::CircuitOpen { .. })
        ));
    }
}
