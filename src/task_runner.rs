/// Periodic Tick Runner
///
/// Drives the scan and evaluation loops on a fixed interval with failure
/// tracking: consecutive failures back off exponentially, and a loop that
/// keeps failing panics rather than degrading silently.

use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, warn};

/// Failure policy for a background tick loop
#[derive(Debug, Clone)]
pub struct TickLoopConfig {
    /// Seconds between ticks
    pub interval: Duration,
    /// Maximum number of consecutive failures before panic
    pub max_consecutive_failures: u32,
    /// Initial delay added after a failed tick
    pub initial_retry_delay: Duration,
    /// Maximum delay added after repeated failures
    pub max_retry_delay: Duration,
}

impl TickLoopConfig {
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            max_consecutive_failures: 10,
            initial_retry_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct FailureState {
    consecutive_failures: u32,
    current_retry_delay: Duration,
}

impl FailureState {
    fn new(initial_delay: Duration) -> Self {
        Self {
            consecutive_failures: 0,
            current_retry_delay: initial_delay,
        }
    }

    fn record_failure(&mut self, max_delay: Duration) {
        self.consecutive_failures += 1;
        self.current_retry_delay = std::cmp::min(self.current_retry_delay * 2, max_delay);
    }

    fn reset(&mut self, initial_delay: Duration) {
        self.consecutive_failures = 0;
        self.current_retry_delay = initial_delay;
    }
}

/// Run a tick function forever on the configured interval.
///
/// A failed tick is retried after an exponentially growing delay on top
/// of the interval. After `max_consecutive_failures` failures in a row
/// the loop panics so the outage is loud instead of silent.
pub async fn run_tick_loop<F, Fut>(task_name: &str, config: TickLoopConfig, mut tick_fn: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<(), String>>,
{
    let mut state = FailureState::new(config.initial_retry_delay);
    let mut interval = tokio::time::interval(config.interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        match tick_fn().await {
            Ok(()) => {
                if state.consecutive_failures > 0 {
                    warn!(
                        "Loop '{}' recovered after {} failures",
                        task_name, state.consecutive_failures
                    );
                }
                state.reset(config.initial_retry_delay);
            }
            Err(e) => {
                state.record_failure(config.max_retry_delay);
                error!(
                    "Loop '{}' tick failed (attempt {}/{}): {}",
                    task_name, state.consecutive_failures, config.max_consecutive_failures, e
                );

                if state.consecutive_failures >= config.max_consecutive_failures {
                    panic!(
                        "FATAL: Loop '{}' exceeded maximum consecutive failures ({}). \
                         Last error: {}. System cannot continue with a failed critical loop.",
                        task_name, config.max_consecutive_failures, e
                    );
                }

                warn!(
                    "Loop '{}' backing off {:?} before next tick",
                    task_name, state.current_retry_delay
                );
                sleep(state.current_retry_delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fast_config(max_failures: u32) -> TickLoopConfig {
        TickLoopConfig {
            interval: Duration::from_millis(5),
            max_consecutive_failures: max_failures,
            initial_retry_delay: Duration::from_millis(1),
            max_retry_delay: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn test_loop_recovers_after_transient_failures() {
        let attempt_count = Arc::new(AtomicUsize::new(0));
        let attempt_count_clone = attempt_count.clone();

        let handle = tokio::spawn(async move {
            run_tick_loop("test_loop", fast_config(5), || {
                let count = attempt_count_clone.fetch_add(1, Ordering::SeqCst);
                async move {
                    if count < 2 {
                        Err("transient failure".to_string())
                    } else {
                        Ok(())
                    }
                }
            })
            .await;
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.abort();

        assert!(attempt_count.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    #[should_panic(expected = "exceeded maximum consecutive failures")]
    async fn test_loop_panics_on_persistent_failure() {
        run_tick_loop("failing_loop", fast_config(3), || async {
            Err("always fails".to_string())
        })
        .await;
    }
}
