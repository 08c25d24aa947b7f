use crate::domain::errors::ValidationError;
use serde::{Deserialize, Serialize};

/// Side of a ledger trade. Unlike a signal there is no Hold: a trade is
/// always an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }

    /// Parse external input. Anything other than BUY/SELL is rejected
    /// before it can reach the ledger.
    pub fn parse(s: &str) -> Result<TradeSide, ValidationError> {
        match s {
            "BUY" => Ok(TradeSide::Buy),
            "SELL" => Ok(TradeSide::Sell),
            other => Err(ValidationError::InvalidSide(other.to_string())),
        }
    }

    /// Signed quantity multiplier: BUY adds to a position, SELL reduces it.
    pub fn quantity_sign(&self) -> f64 {
        match self {
            TradeSide::Buy => 1.0,
            TradeSide::Sell => -1.0,
        }
    }

    /// Signed cash multiplier: BUY spends cash, SELL returns it.
    pub fn cash_sign(&self) -> f64 {
        match self {
            TradeSide::Buy => -1.0,
            TradeSide::Sell => 1.0,
        }
    }
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_sides() {
        assert_eq!(TradeSide::parse("BUY").unwrap(), TradeSide::Buy);
        assert_eq!(TradeSide::parse("SELL").unwrap(), TradeSide::Sell);
    }

    #[test]
    fn test_parse_rejects_other_input() {
        assert!(TradeSide::parse("HOLD").is_err());
        assert!(TradeSide::parse("buy").is_err());
        assert!(TradeSide::parse("").is_err());
    }

    #[test]
    fn test_signs() {
        assert_eq!(TradeSide::Buy.quantity_sign(), 1.0);
        assert_eq!(TradeSide::Sell.quantity_sign(), -1.0);
        assert_eq!(TradeSide::Buy.cash_sign(), -1.0);
        assert_eq!(TradeSide::Sell.cash_sign(), 1.0);
    }
}
