use crate::domain::entities::strategy::LearningMode;
use tracing::warn;

/// Simulator configuration: symbol universe, bot sizing, learning speed,
/// and tick cadence.
#[derive(Clone)]
pub struct SimulationConfig {
    pub symbols: Vec<String>,
    pub starting_cash: f64,
    pub learning_mode: LearningMode,
    pub min_confidence: f64, // 0-100, blended confidence needed to trade
    pub trade_notional: f64, // Cash value per executed trade
    pub scan_interval_seconds: u64,
    pub evaluation_interval_seconds: u64,
    pub evaluation_batch_size: i64, // Due decisions processed per tick
    pub tick_lease_ttl_seconds: i64,
    pub http_port: u16,
}

impl SimulationConfig {
    /// Default configuration with a small large-cap universe
    pub fn default() -> SimulationConfig {
        SimulationConfig {
            symbols: vec![
                "AAPL".to_string(),
                "MSFT".to_string(),
                "NVDA".to_string(),
                "TSLA".to_string(),
            ],
            starting_cash: 10_000.0,
            learning_mode: LearningMode::Realtime,
            min_confidence: 60.0,
            trade_notional: 1_000.0,
            scan_interval_seconds: 300,
            evaluation_interval_seconds: 60,
            evaluation_batch_size: 25,
            tick_lease_ttl_seconds: 180,
            http_port: 3000,
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> SimulationConfig {
        let mut config = SimulationConfig::default();

        if let Ok(symbols) = std::env::var("SYMBOLS") {
            let parsed: Vec<String> = symbols
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect();
            if parsed.is_empty() {
                warn!("SYMBOLS is empty, using default universe");
            } else {
                config.symbols = parsed;
            }
        }

        if let Ok(cash) = std::env::var("STARTING_CASH") {
            match cash.parse::<f64>() {
                Ok(value) if value > 0.0 => config.starting_cash = value,
                Ok(value) => warn!(
                    "Invalid STARTING_CASH value: {} (must be positive), using default: {}",
                    value, config.starting_cash
                ),
                Err(e) => warn!(
                    "Failed to parse STARTING_CASH '{}': {}, using default: {}",
                    cash, e, config.starting_cash
                ),
            }
        }

        if let Ok(mode) = std::env::var("LEARNING_MODE") {
            match LearningMode::parse(&mode) {
                Some(value) => config.learning_mode = value,
                None => warn!(
                    "Invalid LEARNING_MODE value: {} (must be realtime or accelerated)",
                    mode
                ),
            }
        }

        if let Ok(threshold) = std::env::var("MIN_CONFIDENCE") {
            match threshold.parse::<f64>() {
                Ok(value) if (0.0..=100.0).contains(&value) => {
                    config.min_confidence = value;
                }
                Ok(value) => warn!(
                    "Invalid MIN_CONFIDENCE value: {} (must be between 0 and 100), using default: {}",
                    value, config.min_confidence
                ),
                Err(e) => warn!(
                    "Failed to parse MIN_CONFIDENCE '{}': {}, using default: {}",
                    threshold, e, config.min_confidence
                ),
            }
        }

        if let Ok(notional) = std::env::var("TRADE_NOTIONAL") {
            if let Ok(value) = notional.parse::<f64>() {
                if value > 0.0 {
                    config.trade_notional = value;
                }
            }
        }

        if let Ok(interval) = std::env::var("SCAN_INTERVAL_SECONDS") {
            if let Ok(value) = interval.parse::<u64>() {
                if (10..=3600).contains(&value) {
                    config.scan_interval_seconds = value;
                }
            }
        }

        if let Ok(interval) = std::env::var("EVALUATION_INTERVAL_SECONDS") {
            if let Ok(value) = interval.parse::<u64>() {
                if (5..=3600).contains(&value) {
                    config.evaluation_interval_seconds = value;
                }
            }
        }

        if let Ok(batch) = std::env::var("EVALUATION_BATCH_SIZE") {
            if let Ok(value) = batch.parse::<i64>() {
                if (1..=500).contains(&value) {
                    config.evaluation_batch_size = value;
                }
            }
        }

        if let Ok(ttl) = std::env::var("TICK_LEASE_TTL_SECONDS") {
            if let Ok(value) = ttl.parse::<i64>() {
                if (10..=3600).contains(&value) {
                    config.tick_lease_ttl_seconds = value;
                }
            }
        }

        if let Ok(port) = std::env::var("HTTP_PORT") {
            if let Ok(value) = port.parse::<u16>() {
                config.http_port = value;
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SimulationConfig::default();
        assert_eq!(config.symbols.len(), 4);
        assert!(config.symbols.contains(&"AAPL".to_string()));
        assert_eq!(config.learning_mode, LearningMode::Realtime);
        assert!(config.starting_cash > 0.0);
        assert!((0.0..=100.0).contains(&config.min_confidence));
    }

    #[test]
    fn test_learning_mode_parse() {
        assert_eq!(LearningMode::parse("realtime"), Some(LearningMode::Realtime));
        assert_eq!(
            LearningMode::parse("ACCELERATED"),
            Some(LearningMode::Accelerated)
        );
        assert_eq!(LearningMode::parse("warp"), None);
    }
}
