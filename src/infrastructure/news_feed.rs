//! News Feed Client
//!
//! Outbound adapter for the headline/sentiment collaborator. Headlines
//! are purely advisory input to signal generation; a feed failure just
//! means the sentiment strategy sees no headlines this pass.

use crate::domain::entities::market::Headline;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

#[derive(Debug, thiserror::Error, Clone)]
pub enum NewsError {
    #[error("News request failed: {0}")]
    RequestFailed(String),

    #[error("Malformed news payload: {0}")]
    MalformedPayload(String),
}

#[async_trait]
pub trait NewsFeed: Send + Sync {
    async fn news_for(&self, symbol: &str) -> Result<Vec<Headline>, NewsError>;
}

/// Wire shape of one scored headline.
#[derive(Debug, Deserialize)]
struct HeadlinePayload {
    title: String,
    sentiment: f64,
}

/// HTTP news feed client configuration
#[derive(Debug, Clone)]
pub struct NewsFeedConfig {
    pub base_url: String,
    pub timeout_milliseconds: u64,
}

impl Default for NewsFeedConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8651".to_string(),
            timeout_milliseconds: 5_000,
        }
    }
}

impl NewsFeedConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("NEWS_FEED_URL") {
            if !url.is_empty() {
                config.base_url = url.trim_end_matches('/').to_string();
            }
        }
        if let Ok(timeout) = std::env::var("NEWS_FEED_TIMEOUT_MILLISECONDS") {
            if let Ok(value) = timeout.parse::<u64>() {
                if (100..=60_000).contains(&value) {
                    config.timeout_milliseconds = value;
                }
            }
        }

        config
    }
}

pub struct HttpNewsFeed {
    client: Client,
    config: NewsFeedConfig,
}

impl HttpNewsFeed {
    pub fn new(config: NewsFeedConfig) -> Result<Self, NewsError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_millis(config.timeout_milliseconds))
            .build()
            .map_err(|e| NewsError::RequestFailed(format!("Failed to build client: {}", e)))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl NewsFeed for HttpNewsFeed {
    async fn news_for(&self, symbol: &str) -> Result<Vec<Headline>, NewsError> {
        let response = self
            .client
            .get(format!("{}/news", self.config.base_url))
            .query(&[("symbol", symbol)])
            .send()
            .await
            .map_err(|e| NewsError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NewsError::RequestFailed(format!(
                "Provider returned {} for {}",
                response.status(),
                symbol
            )));
        }

        let payloads: Vec<HeadlinePayload> = response
            .json()
            .await
            .map_err(|e| NewsError::MalformedPayload(e.to_string()))?;

        Ok(payloads
            .into_iter()
            .map(|p| Headline {
                title: p.title,
                sentiment: p.sentiment.clamp(-1.0, 1.0),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headline_payload_parses() {
        let payloads: Vec<HeadlinePayload> = serde_json::from_str(
            r#"[{"title":"Chipmaker guides above consensus","sentiment":0.7}]"#,
        )
        .unwrap();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].sentiment, 0.7);
    }

    #[test]
    fn test_news_feed_config_default() {
        let config = NewsFeedConfig::default();
        assert_eq!(config.timeout_milliseconds, 5_000);
    }
}
