use chrono::Duration;
use serde::{Deserialize, Serialize};

/// The fixed set of simulated trading bots. Each strategy owns its own
/// account and positions in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyId {
    #[serde(rename = "momentum")]
    Momentum,
    #[serde(rename = "meanrev")]
    MeanReversion,
    #[serde(rename = "sentiment")]
    Sentiment,
}

impl StrategyId {
    pub const ALL: [StrategyId; 3] = [
        StrategyId::Momentum,
        StrategyId::MeanReversion,
        StrategyId::Sentiment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyId::Momentum => "momentum",
            StrategyId::MeanReversion => "meanrev",
            StrategyId::Sentiment => "sentiment",
        }
    }

    pub fn parse(s: &str) -> Option<StrategyId> {
        match s {
            "momentum" => Some(StrategyId::Momentum),
            "meanrev" => Some(StrategyId::MeanReversion),
            "sentiment" => Some(StrategyId::Sentiment),
            _ => None,
        }
    }
}

impl std::fmt::Display for StrategyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Time class after which a decision is evaluated. The concrete duration
/// depends on the learning mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Horizon {
    Short,
    Medium,
    Long,
}

impl Horizon {
    pub fn as_str(&self) -> &'static str {
        match self {
            Horizon::Short => "short",
            Horizon::Medium => "medium",
            Horizon::Long => "long",
        }
    }

    pub fn parse(s: &str) -> Option<Horizon> {
        match s {
            "short" => Some(Horizon::Short),
            "medium" => Some(Horizon::Medium),
            "long" => Some(Horizon::Long),
            _ => None,
        }
    }

    /// Offset between the moment a decision is logged and the moment it
    /// becomes due for evaluation.
    pub fn offset(&self, mode: LearningMode) -> Duration {
        match (mode, self) {
            (LearningMode::Realtime, Horizon::Short) => Duration::hours(1),
            (LearningMode::Realtime, Horizon::Medium) => Duration::hours(24),
            (LearningMode::Realtime, Horizon::Long) => Duration::days(7),
            (LearningMode::Accelerated, Horizon::Short) => Duration::minutes(5),
            (LearningMode::Accelerated, Horizon::Medium) => Duration::minutes(30),
            (LearningMode::Accelerated, Horizon::Long) => Duration::hours(2),
        }
    }
}

impl std::fmt::Display for Horizon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How fast decisions mature. Realtime grades over hours to a week,
/// accelerated compresses the same horizons into minutes to hours so a
/// fresh install produces learning data quickly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LearningMode {
    Realtime,
    Accelerated,
}

impl LearningMode {
    pub fn parse(s: &str) -> Option<LearningMode> {
        match s.to_lowercase().as_str() {
            "realtime" => Some(LearningMode::Realtime),
            "accelerated" => Some(LearningMode::Accelerated),
            _ => None,
        }
    }
}

/// A strategy's judgment for a symbol. Every signal is logged as a
/// decision, including Hold; only Buy/Sell lead to ledger trades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Buy => "BUY",
            Signal::Sell => "SELL",
            Signal::Hold => "HOLD",
        }
    }

    pub fn parse(s: &str) -> Option<Signal> {
        match s {
            "BUY" => Some(Signal::Buy),
            "SELL" => Some(Signal::Sell),
            "HOLD" => Some(Signal::Hold),
            _ => None,
        }
    }

    pub fn is_actionable(&self) -> bool {
        !matches!(self, Signal::Hold)
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Signal plus the strategy-intrinsic confidence derived from signal
/// strength, on a 0-100 scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradingSignal {
    pub signal: Signal,
    pub base_confidence: f64,
}
