use crate::domain::entities::market::{average_sentiment, Headline, Quote};
use crate::domain::entities::strategy::{Horizon, Signal, StrategyId, TradingSignal};

/// Move size (percent) below which momentum stays flat.
const MOMENTUM_TRIGGER_PCT: f64 = 0.75;
/// Move size (percent) a mean-reversion fade requires.
const MEANREV_TRIGGER_PCT: f64 = 1.5;
/// Average headline sentiment a sentiment trade requires.
const SENTIMENT_TRIGGER: f64 = 0.2;

pub trait Strategy: Send + Sync {
    fn id(&self) -> StrategyId;
    fn horizon(&self) -> Horizon;
    fn evaluate(&self, quote: &Quote, headlines: &[Headline]) -> TradingSignal;
}

/// Follows the day's move: buys strength, sells weakness.
pub struct MomentumStrategy;

impl Strategy for MomentumStrategy {
    fn id(&self) -> StrategyId {
        StrategyId::Momentum
    }

    fn horizon(&self) -> Horizon {
        Horizon::Short
    }

    fn evaluate(&self, quote: &Quote, _headlines: &[Headline]) -> TradingSignal {
        let change = quote.change_percent;
        if change.abs() < MOMENTUM_TRIGGER_PCT {
            return TradingSignal {
                signal: Signal::Hold,
                base_confidence: 45.0,
            };
        }
        let signal = if change > 0.0 { Signal::Buy } else { Signal::Sell };
        TradingSignal {
            signal,
            base_confidence: (50.0 + change.abs() * 10.0).min(95.0),
        }
    }
}

/// Fades outsized moves on the assumption they overshoot.
pub struct MeanReversionStrategy;

impl Strategy for MeanReversionStrategy {
    fn id(&self) -> StrategyId {
        StrategyId::MeanReversion
    }

    fn horizon(&self) -> Horizon {
        Horizon::Medium
    }

    fn evaluate(&self, quote: &Quote, _headlines: &[Headline]) -> TradingSignal {
        let change = quote.change_percent;
        if change.abs() < MEANREV_TRIGGER_PCT {
            return TradingSignal {
                signal: Signal::Hold,
                base_confidence: 40.0,
            };
        }
        let signal = if change > 0.0 { Signal::Sell } else { Signal::Buy };
        TradingSignal {
            signal,
            base_confidence: (50.0 + (change.abs() - MEANREV_TRIGGER_PCT) * 12.0).min(90.0),
        }
    }
}

/// Trades the average sentiment of recent headlines.
pub struct SentimentStrategy;

impl Strategy for SentimentStrategy {
    fn id(&self) -> StrategyId {
        StrategyId::Sentiment
    }

    fn horizon(&self) -> Horizon {
        Horizon::Long
    }

    fn evaluate(&self, _quote: &Quote, headlines: &[Headline]) -> TradingSignal {
        if headlines.is_empty() {
            return TradingSignal {
                signal: Signal::Hold,
                base_confidence: 35.0,
            };
        }
        let avg = average_sentiment(headlines);
        if avg.abs() < SENTIMENT_TRIGGER {
            return TradingSignal {
                signal: Signal::Hold,
                base_confidence: 45.0,
            };
        }
        let signal = if avg > 0.0 { Signal::Buy } else { Signal::Sell };
        TradingSignal {
            signal,
            base_confidence: (50.0 + avg.abs() * 50.0).min(92.0),
        }
    }
}

/// The full bot roster, one entry per [`StrategyId`].
pub fn default_strategies() -> Vec<Box<dyn Strategy>> {
    vec![
        Box::new(MomentumStrategy),
        Box::new(MeanReversionStrategy),
        Box::new(SentimentStrategy),
    ]
}
