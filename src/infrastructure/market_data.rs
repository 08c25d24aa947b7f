//! Market Data Client
//!
//! Outbound adapter for the quote provider. Failures are expected here
//! (missing key, network trouble, rate limits) and must never crash a
//! caller: the scheduler and scan loops treat a failed quote as "skip and
//! retry later".

use crate::domain::entities::market::Quote;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use reqwest::Client;
use serde::Deserialize;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::services::clock::Clock;

/// Cached quotes kept per symbol; bounds memory on wide symbol universes.
const QUOTE_CACHE_CAPACITY: usize = 256;

#[derive(Debug, thiserror::Error, Clone)]
pub enum QuoteError {
    #[error("Quote request failed: {0}")]
    RequestFailed(String),

    #[error("Quote request timed out")]
    Timeout,

    #[error("Malformed quote payload: {0}")]
    MalformedPayload(String),

    #[error("Provider returned no quote for {0}")]
    Unknown(String),
}

/// Price oracle consumed by the scan and evaluation loops.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn quote(&self, symbol: &str) -> Result<Quote, QuoteError>;
}

/// Wire shape of the provider's quote payload.
#[derive(Debug, Deserialize)]
struct QuotePayload {
    symbol: String,
    price: f64,
    change_percent: f64,
}

#[derive(Debug, Clone, Copy)]
struct CachedQuote {
    quote: Quote,
    fetched_at: DateTime<Utc>,
}

/// HTTP market data client configuration
#[derive(Debug, Clone)]
pub struct MarketDataConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_milliseconds: u64,
    pub cache_ttl_seconds: i64,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8650".to_string(),
            api_key: None,
            timeout_milliseconds: 5_000,
            cache_ttl_seconds: 30,
        }
    }
}

impl MarketDataConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("MARKET_DATA_URL") {
            if !url.is_empty() {
                config.base_url = url.trim_end_matches('/').to_string();
            }
        }
        if let Ok(key) = std::env::var("MARKET_DATA_API_KEY") {
            if !key.is_empty() {
                config.api_key = Some(key);
            }
        }
        if let Ok(timeout) = std::env::var("MARKET_DATA_TIMEOUT_MILLISECONDS") {
            if let Ok(value) = timeout.parse::<u64>() {
                if (100..=60_000).contains(&value) {
                    config.timeout_milliseconds = value;
                }
            }
        }
        if let Ok(ttl) = std::env::var("MARKET_DATA_CACHE_TTL_SECONDS") {
            if let Ok(value) = ttl.parse::<i64>() {
                if (0..=600).contains(&value) {
                    config.cache_ttl_seconds = value;
                }
            }
        }

        config
    }
}

/// HTTP quote client with a short-TTL LRU cache in front of the provider.
pub struct HttpPriceOracle {
    client: Client,
    config: MarketDataConfig,
    clock: Arc<dyn Clock>,
    cache: Mutex<LruCache<String, CachedQuote>>,
}

impl HttpPriceOracle {
    pub fn new(config: MarketDataConfig, clock: Arc<dyn Clock>) -> Result<Self, QuoteError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_millis(config.timeout_milliseconds))
            .build()
            .map_err(|e| QuoteError::RequestFailed(format!("Failed to build client: {}", e)))?;

        let capacity =
            NonZeroUsize::new(QUOTE_CACHE_CAPACITY).expect("cache capacity is non-zero");
        Ok(Self {
            client,
            config,
            clock,
            cache: Mutex::new(LruCache::new(capacity)),
        })
    }

    async fn cached(&self, symbol: &str) -> Option<Quote> {
        let mut cache = self.cache.lock().await;
        let entry = cache.get(symbol)?;
        let age = self.clock.now() - entry.fetched_at;
        if age <= Duration::seconds(self.config.cache_ttl_seconds) {
            debug!("Quote cache hit for {} (age {}s)", symbol, age.num_seconds());
            Some(entry.quote)
        } else {
            None
        }
    }
}

#[async_trait]
impl PriceOracle for HttpPriceOracle {
    async fn quote(&self, symbol: &str) -> Result<Quote, QuoteError> {
        if let Some(quote) = self.cached(symbol).await {
            return Ok(quote);
        }

        let mut request = self
            .client
            .get(format!("{}/quote", self.config.base_url))
            .query(&[("symbol", symbol)]);
        if let Some(key) = &self.config.api_key {
            request = request.query(&[("apikey", key.as_str())]);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                QuoteError::Timeout
            } else {
                QuoteError::RequestFailed(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            return Err(QuoteError::RequestFailed(format!(
                "Provider returned {} for {}",
                response.status(),
                symbol
            )));
        }

        let payload: QuotePayload = response
            .json()
            .await
            .map_err(|e| QuoteError::MalformedPayload(e.to_string()))?;

        if !payload.price.is_finite() || payload.price <= 0.0 {
            return Err(QuoteError::Unknown(payload.symbol));
        }

        let quote = Quote {
            price: payload.price,
            change_percent: payload.change_percent,
        };

        let mut cache = self.cache.lock().await;
        cache.put(
            symbol.to_string(),
            CachedQuote {
                quote,
                fetched_at: self.clock.now(),
            },
        );

        Ok(quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_data_config_default() {
        let config = MarketDataConfig::default();
        assert_eq!(config.timeout_milliseconds, 5_000);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_quote_payload_parses() {
        let payload: QuotePayload =
            serde_json::from_str(r#"{"symbol":"AAPL","price":187.44,"change_percent":-0.8}"#)
                .unwrap();
        assert_eq!(payload.symbol, "AAPL");
        assert_eq!(payload.price, 187.44);
        assert_eq!(payload.change_percent, -0.8);
    }

    #[test]
    fn test_quote_payload_rejects_missing_fields() {
        let result: Result<QuotePayload, _> = serde_json::from_str(r#"{"symbol":"AAPL"}"#);
        assert!(result.is_err());
    }
}
