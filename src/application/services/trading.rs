//! Trading Scan
//!
//! One scan pass per symbol: quote once, run every strategy bot, log every
//! judgment as a pending decision, blend each bot's intrinsic confidence
//! with its measured accuracy, and execute paper trades for actionable
//! signals that clear the confidence threshold.

use crate::domain::entities::strategy::{Signal, StrategyId};
use crate::domain::entities::trade::TradeSide;
use crate::domain::services::accuracy::AccuracyStats;
use crate::domain::services::confidence::{rank_strategies, RankedStrategy, StrategyCandidate};
use crate::domain::services::strategies::Strategy;
use crate::infrastructure::market_data::{PriceOracle, QuoteError};
use crate::infrastructure::news_feed::NewsFeed;
use crate::persistence::analytics::Analytics;
use crate::persistence::decisions::DecisionLog;
use crate::persistence::ledger::Ledger;
use crate::persistence::models::{NewDecision, NewTrade};
use crate::persistence::StoreError;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Learning events consulted when blending historical accuracy.
const ACCURACY_LOOKBACK: i64 = 50;

/// What one scan pass accomplished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub symbols_scanned: u32,
    pub symbols_skipped: u32,
    pub decisions_logged: u32,
    pub trades_executed: u32,
}

pub struct TradingConfig {
    pub symbols: Vec<String>,
    /// Blended confidence (0-100) an actionable signal must reach to trade.
    pub min_confidence: f64,
    /// Cash value per trade; quantity is notional / price.
    pub trade_notional: f64,
}

pub struct TradingService {
    ledger: Arc<Ledger>,
    decisions: Arc<DecisionLog>,
    analytics: Arc<Analytics>,
    oracle: Arc<dyn PriceOracle>,
    news: Arc<dyn NewsFeed>,
    strategies: Vec<Box<dyn Strategy>>,
    config: TradingConfig,
}

impl TradingService {
    pub fn new(
        ledger: Arc<Ledger>,
        decisions: Arc<DecisionLog>,
        analytics: Arc<Analytics>,
        oracle: Arc<dyn PriceOracle>,
        news: Arc<dyn NewsFeed>,
        strategies: Vec<Box<dyn Strategy>>,
        config: TradingConfig,
    ) -> Self {
        Self {
            ledger,
            decisions,
            analytics,
            oracle,
            news,
            strategies,
            config,
        }
    }

    /// Run one full scan over the configured symbols. A symbol whose
    /// quote fails is skipped for this pass; nothing is written for it.
    pub async fn run_scan(&self) -> ScanReport {
        let mut report = ScanReport::default();

        for symbol in &self.config.symbols {
            match self.scan_symbol(symbol, &mut report).await {
                Ok(()) => report.symbols_scanned += 1,
                Err(e) => {
                    warn!("Scan skipped {}: {}", symbol, e);
                    report.symbols_skipped += 1;
                }
            }
        }

        info!(
            "Scan pass: {} symbols, {} skipped, {} decisions, {} trades",
            report.symbols_scanned,
            report.symbols_skipped,
            report.decisions_logged,
            report.trades_executed
        );
        report
    }

    async fn scan_symbol(&self, symbol: &str, report: &mut ScanReport) -> Result<(), QuoteError> {
        let quote = self.oracle.quote(symbol).await?;

        // Headlines are advisory; a feed failure means no headlines.
        let headlines = match self.news.news_for(symbol).await {
            Ok(headlines) => headlines,
            Err(e) => {
                debug!("No headlines for {}: {}", symbol, e);
                Vec::new()
            }
        };

        let mut candidates = Vec::with_capacity(self.strategies.len());
        for strategy in &self.strategies {
            let judgment = strategy.evaluate(&quote, &headlines);

            match self
                .decisions
                .log_decision(NewDecision {
                    symbol: symbol.to_string(),
                    strategy: strategy.id(),
                    horizon: strategy.horizon(),
                    signal: judgment.signal,
                    price_at_signal: quote.price,
                })
                .await
            {
                Ok(_) => report.decisions_logged += 1,
                Err(StoreError::StorageUnavailable) => {
                    debug!("No storage; decision for {} not logged", symbol)
                }
                Err(e) => warn!("Decision for {} not logged: {}", symbol, e),
            }

            candidates.push(StrategyCandidate {
                strategy: strategy.id(),
                signal: judgment.signal,
                base_confidence: judgment.base_confidence,
            });
        }

        let ranked = self.rank_candidates(symbol, &candidates).await;
        for entry in &ranked {
            if !entry.signal.is_actionable() || entry.confidence < self.config.min_confidence {
                continue;
            }
            let side = match entry.signal {
                Signal::Buy => TradeSide::Buy,
                Signal::Sell => TradeSide::Sell,
                Signal::Hold => continue,
            };
            let quantity = self.config.trade_notional / quote.price;
            let note = format!(
                "{} signal, confidence {:.0} (base {:.0}, accuracy {:.0})",
                entry.signal, entry.confidence, entry.base_confidence, entry.historical_accuracy
            );

            match self
                .ledger
                .apply_trade(NewTrade {
                    strategy: entry.strategy,
                    symbol: symbol.to_string(),
                    side,
                    quantity,
                    price: quote.price,
                    note,
                })
                .await
            {
                Ok(trade) => {
                    report.trades_executed += 1;
                    debug!(
                        "Executed trade #{}: {} {} {:.4} {} @ {}",
                        trade.id, trade.strategy, trade.side, trade.quantity, trade.symbol,
                        trade.price
                    );
                }
                Err(StoreError::StorageUnavailable) => {
                    debug!("No storage; trade for {} not executed", symbol)
                }
                Err(e) => warn!("Trade for {} failed: {}", symbol, e),
            }
        }

        Ok(())
    }

    /// Rank the given candidates for a symbol by blended confidence.
    async fn rank_candidates(
        &self,
        symbol: &str,
        candidates: &[StrategyCandidate],
    ) -> Vec<RankedStrategy> {
        let mut history: HashMap<StrategyId, AccuracyStats> = HashMap::new();
        for candidate in candidates {
            let stats = match self
                .analytics
                .get_accuracy(symbol, Some(candidate.strategy), None, ACCURACY_LOOKBACK)
                .await
            {
                Ok(stats) => stats,
                Err(e) => {
                    warn!(
                        "Accuracy lookup failed for {} {}: {}",
                        candidate.strategy, symbol, e
                    );
                    AccuracyStats::default()
                }
            };
            history.insert(candidate.strategy, stats);
        }
        rank_strategies(candidates, &history)
    }

    /// Current strategy ranking for a symbol, for callers that want the
    /// scoreboard without triggering trades.
    pub async fn rank_for_symbol(&self, symbol: &str) -> Result<Vec<RankedStrategy>, QuoteError> {
        let quote = self.oracle.quote(symbol).await?;
        let headlines = self.news.news_for(symbol).await.unwrap_or_default();

        let candidates: Vec<StrategyCandidate> = self
            .strategies
            .iter()
            .map(|strategy| {
                let judgment = strategy.evaluate(&quote, &headlines);
                StrategyCandidate {
                    strategy: strategy.id(),
                    signal: judgment.signal,
                    base_confidence: judgment.base_confidence,
                }
            })
            .collect();

        Ok(self.rank_candidates(symbol, &candidates).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::market::{Headline, Quote};
    use crate::domain::entities::strategy::LearningMode;
    use crate::domain::services::clock::ManualClock;
    use crate::domain::services::strategies::default_strategies;
    use crate::infrastructure::news_feed::NewsError;
    use crate::persistence::test_pool;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;

    struct FixedOracle {
        quote: Mutex<Option<Quote>>,
    }

    #[async_trait]
    impl PriceOracle for FixedOracle {
        async fn quote(&self, symbol: &str) -> Result<Quote, QuoteError> {
            self.quote
                .lock()
                .unwrap()
                .ok_or_else(|| QuoteError::Unknown(symbol.to_string()))
        }
    }

    struct FixedNews {
        headlines: Vec<Headline>,
    }

    #[async_trait]
    impl NewsFeed for FixedNews {
        async fn news_for(&self, _symbol: &str) -> Result<Vec<Headline>, NewsError> {
            Ok(self.headlines.clone())
        }
    }

    async fn service_with(
        quote: Option<Quote>,
        headlines: Vec<Headline>,
        min_confidence: f64,
    ) -> (TradingService, Arc<Ledger>, Arc<DecisionLog>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 10, 9, 0, 0).unwrap(),
        ));
        let pool = test_pool().await;
        let ledger = Arc::new(Ledger::new(Some(pool.clone()), clock.clone()));
        ledger.seed_accounts(10_000.0).await.unwrap();
        let decisions = Arc::new(DecisionLog::new(
            Some(pool.clone()),
            clock.clone(),
            LearningMode::Accelerated,
        ));
        let analytics = Arc::new(Analytics::new(Some(pool), clock.clone()));
        let service = TradingService::new(
            ledger.clone(),
            decisions.clone(),
            analytics,
            Arc::new(FixedOracle {
                quote: Mutex::new(quote),
            }),
            Arc::new(FixedNews { headlines }),
            default_strategies(),
            TradingConfig {
                symbols: vec!["AAPL".to_string()],
                min_confidence,
                trade_notional: 1_000.0,
            },
        );
        (service, ledger, decisions)
    }

    #[tokio::test]
    async fn test_scan_logs_a_decision_per_strategy() {
        let quote = Quote {
            price: 100.0,
            change_percent: 2.0,
        };
        let (service, _ledger, decisions) = service_with(Some(quote), Vec::new(), 101.0).await;

        let report = service.run_scan().await;
        assert_eq!(report.symbols_scanned, 1);
        assert_eq!(report.decisions_logged, 3);
        // Threshold above 100 means nothing trades
        assert_eq!(report.trades_executed, 0);
        assert_eq!(decisions.count_pending().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_scan_trades_actionable_signals_over_threshold() {
        // +2% move: momentum buys with base 70 -> blended 0.6*70+0.4*50 = 62
        let quote = Quote {
            price: 100.0,
            change_percent: 2.0,
        };
        let (service, ledger, _decisions) = service_with(Some(quote), Vec::new(), 60.0).await;

        let report = service.run_scan().await;
        assert_eq!(report.trades_executed, 1);

        let trades = ledger.get_recent_trades(10).await.unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].strategy, "momentum");
        assert_eq!(trades[0].side, "BUY");
        assert!((trades[0].quantity - 10.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_scan_with_failing_oracle_writes_nothing() {
        let (service, ledger, decisions) = service_with(None, Vec::new(), 0.0).await;

        let report = service.run_scan().await;
        assert_eq!(report.symbols_scanned, 0);
        assert_eq!(report.symbols_skipped, 1);
        assert_eq!(report.decisions_logged, 0);
        assert_eq!(report.trades_executed, 0);
        assert!(ledger.get_recent_trades(10).await.unwrap().is_empty());
        assert_eq!(decisions.count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rank_for_symbol_orders_by_confidence() {
        let quote = Quote {
            price: 100.0,
            change_percent: 2.0,
        };
        let headlines = vec![Headline {
            title: "Guidance raised".to_string(),
            sentiment: 0.9,
        }];
        let (service, _ledger, _decisions) = service_with(Some(quote), headlines, 100.0).await;

        let ranked = service.rank_for_symbol("AAPL").await.unwrap();
        assert_eq!(ranked.len(), 3);
        for pair in ranked.windows(2) {
            assert!(pair[0].confidence >= pair[1].confidence);
        }
        // No history yet: every entry uses the neutral prior
        assert!(ranked.iter().all(|r| r.historical_accuracy == 50.0));
    }

    #[tokio::test]
    async fn test_hold_signals_never_trade() {
        // Flat quote, no headlines: every strategy holds
        let quote = Quote {
            price: 100.0,
            change_percent: 0.0,
        };
        let (service, ledger, decisions) = service_with(Some(quote), Vec::new(), 0.0).await;

        let report = service.run_scan().await;
        assert_eq!(report.decisions_logged, 3);
        assert_eq!(report.trades_executed, 0);
        assert!(ledger.get_recent_trades(10).await.unwrap().is_empty());
        // Hold judgments are still logged for grading
        assert_eq!(decisions.count_pending().await.unwrap(), 3);
    }
}
