//! Evaluation Scheduler
//!
//! Periodically finds matured pending decisions, re-quotes them, marks
//! them evaluated and records the learning event. Evaluation is
//! at-least-once eventually and effect-once: a failed quote leaves the
//! decision pending for the next tick, while the evaluated flag and the
//! post-horizon price are written together so no decision is counted
//! twice.

use crate::domain::errors::EvaluationError;
use crate::infrastructure::market_data::PriceOracle;
use crate::persistence::decisions::DecisionLog;
use crate::persistence::tick_lease::TickLease;
use crate::persistence::StoreError;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What one scheduler tick accomplished. `failed` counts retryable
/// quote/storage failures; those decisions stay pending.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub evaluated: u32,
    pub stored: u32,
    pub failed: u32,
}

pub struct EvaluationService {
    decisions: Arc<DecisionLog>,
    oracle: Arc<dyn PriceOracle>,
    lease: Arc<TickLease>,
}

impl EvaluationService {
    pub fn new(
        decisions: Arc<DecisionLog>,
        oracle: Arc<dyn PriceOracle>,
        lease: Arc<TickLease>,
    ) -> Self {
        Self {
            decisions,
            oracle,
            lease,
        }
    }

    /// Process up to `batch_limit` due decisions. Each decision succeeds
    /// or fails independently; one failure never aborts the batch.
    pub async fn run_tick(&self, batch_limit: i64) -> Result<TickReport, StoreError> {
        if !self.lease.try_acquire().await? {
            debug!("Evaluation lease held by another instance; skipping tick");
            return Ok(TickReport::default());
        }

        let due = self.decisions.get_due_decisions(batch_limit).await?;
        if due.is_empty() {
            debug!("No decisions due for evaluation");
            return Ok(TickReport::default());
        }

        let mut report = TickReport::default();
        for decision in due {
            let quote = match self.oracle.quote(&decision.symbol).await {
                Ok(quote) => quote,
                Err(e) => {
                    // Retryable: the decision is still pending and due,
                    // so the next tick picks it up again.
                    let failure = EvaluationError::QuoteUnavailable {
                        symbol: decision.symbol.clone(),
                        reason: e.to_string(),
                    };
                    warn!("Decision #{} not evaluated: {}", decision.id, failure);
                    report.failed += 1;
                    continue;
                }
            };

            match self.decisions.mark_evaluated(decision.id, quote.price).await {
                Ok(Some(evaluated)) => {
                    report.evaluated += 1;
                    match self
                        .decisions
                        .record_learning_event(&evaluated, quote.price)
                        .await
                    {
                        Ok(event) => {
                            report.stored += 1;
                            debug!(
                                "Evaluated decision #{}: {} {} outcome {:.2}%",
                                decision.id, event.strategy, event.signal, event.outcome_pct
                            );
                        }
                        Err(e) => {
                            error!(
                                "Learning event for decision #{} not stored: {}",
                                decision.id, e
                            );
                            report.failed += 1;
                        }
                    }
                }
                Ok(None) => {
                    debug!("Decision #{} already evaluated elsewhere", decision.id);
                }
                Err(e) => {
                    warn!("Failed to mark decision #{} evaluated: {}", decision.id, e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Evaluation tick: {} evaluated, {} stored, {} failed",
            report.evaluated, report.stored, report.failed
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::market::Quote;
    use crate::domain::entities::strategy::{Horizon, LearningMode, Signal, StrategyId};
    use crate::domain::services::clock::ManualClock;
    use crate::infrastructure::market_data::QuoteError;
    use crate::persistence::models::NewDecision;
    use crate::persistence::test_pool;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone, Utc};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Oracle serving canned quotes; symbols not present fail.
    struct FixedOracle {
        quotes: Mutex<HashMap<String, Quote>>,
    }

    impl FixedOracle {
        fn new() -> Self {
            Self {
                quotes: Mutex::new(HashMap::new()),
            }
        }

        fn set(&self, symbol: &str, price: f64) {
            self.quotes.lock().unwrap().insert(
                symbol.to_string(),
                Quote {
                    price,
                    change_percent: 0.0,
                },
            );
        }
    }

    #[async_trait]
    impl PriceOracle for FixedOracle {
        async fn quote(&self, symbol: &str) -> Result<Quote, QuoteError> {
            self.quotes
                .lock()
                .unwrap()
                .get(symbol)
                .copied()
                .ok_or_else(|| QuoteError::Unknown(symbol.to_string()))
        }
    }

    struct Fixture {
        clock: Arc<ManualClock>,
        decisions: Arc<DecisionLog>,
        oracle: Arc<FixedOracle>,
        service: EvaluationService,
    }

    async fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 10, 9, 0, 0).unwrap(),
        ));
        let pool = test_pool().await;
        let decisions = Arc::new(DecisionLog::new(
            Some(pool.clone()),
            clock.clone(),
            LearningMode::Accelerated,
        ));
        let oracle = Arc::new(FixedOracle::new());
        let lease = Arc::new(TickLease::new(
            Some(pool),
            clock.clone(),
            "evaluation",
            120,
        ));
        let service = EvaluationService::new(decisions.clone(), oracle.clone(), lease);
        Fixture {
            clock,
            decisions,
            oracle,
            service,
        }
    }

    fn buy(symbol: &str, price: f64) -> NewDecision {
        NewDecision {
            symbol: symbol.to_string(),
            strategy: StrategyId::Momentum,
            horizon: Horizon::Short,
            signal: Signal::Buy,
            price_at_signal: price,
        }
    }

    #[tokio::test]
    async fn test_tick_evaluates_due_decisions() {
        let f = fixture().await;
        f.oracle.set("AAPL", 103.0);

        f.decisions.log_decision(buy("AAPL", 100.0)).await.unwrap();
        f.clock.advance(Duration::minutes(10));

        let report = f.service.run_tick(25).await.unwrap();
        assert_eq!(
            report,
            TickReport {
                evaluated: 1,
                stored: 1,
                failed: 0
            }
        );
        assert_eq!(f.decisions.count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_tick_with_nothing_due_is_a_no_op() {
        let f = fixture().await;
        f.decisions.log_decision(buy("AAPL", 100.0)).await.unwrap();

        let report = f.service.run_tick(25).await.unwrap();
        assert_eq!(report, TickReport::default());
        assert_eq!(f.decisions.count_pending().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_quote_leaves_decision_pending() {
        let f = fixture().await;
        f.decisions.log_decision(buy("AAPL", 100.0)).await.unwrap();
        f.clock.advance(Duration::minutes(10));

        // Oracle has no AAPL quote yet
        let report = f.service.run_tick(25).await.unwrap();
        assert_eq!(report.evaluated, 0);
        assert_eq!(report.failed, 1);
        assert_eq!(f.decisions.count_pending().await.unwrap(), 1);

        // Quote recovers; the next tick retries and succeeds
        f.oracle.set("AAPL", 104.0);
        let report = f.service.run_tick(25).await.unwrap();
        assert_eq!(report.evaluated, 1);
        assert_eq!(report.stored, 1);
        assert_eq!(f.decisions.count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_abort_the_batch() {
        let f = fixture().await;
        f.oracle.set("AAPL", 102.0);
        // MSFT quote missing

        f.decisions.log_decision(buy("MSFT", 300.0)).await.unwrap();
        f.clock.advance(Duration::minutes(1));
        f.decisions.log_decision(buy("AAPL", 100.0)).await.unwrap();
        f.clock.advance(Duration::minutes(10));

        let report = f.service.run_tick(25).await.unwrap();
        assert_eq!(report.evaluated, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(f.decisions.count_pending().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_evaluated_decisions_are_never_reevaluated() {
        let f = fixture().await;
        f.oracle.set("AAPL", 103.0);

        f.decisions.log_decision(buy("AAPL", 100.0)).await.unwrap();
        f.clock.advance(Duration::minutes(10));

        f.service.run_tick(25).await.unwrap();
        // Price moves; a second tick must not grade the decision again
        f.oracle.set("AAPL", 50.0);
        let report = f.service.run_tick(25).await.unwrap();
        assert_eq!(report, TickReport::default());
    }

    #[tokio::test]
    async fn test_batch_limit_bounds_tick_work() {
        let f = fixture().await;
        f.oracle.set("AAPL", 101.0);

        for _ in 0..5 {
            f.decisions.log_decision(buy("AAPL", 100.0)).await.unwrap();
        }
        f.clock.advance(Duration::minutes(10));

        let report = f.service.run_tick(2).await.unwrap();
        assert_eq!(report.evaluated, 2);
        assert_eq!(f.decisions.count_pending().await.unwrap(), 3);
    }
}
