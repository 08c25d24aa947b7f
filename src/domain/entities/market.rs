use serde::{Deserialize, Serialize};

/// A live quote from the price oracle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub price: f64,
    pub change_percent: f64,
}

/// A scored headline from the news collaborator. Sentiment is in [-1, 1];
/// purely advisory input to signal generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Headline {
    pub title: String,
    pub sentiment: f64,
}

/// Average sentiment across headlines, 0.0 when there are none.
pub fn average_sentiment(headlines: &[Headline]) -> f64 {
    if headlines.is_empty() {
        return 0.0;
    }
    headlines.iter().map(|h| h.sentiment).sum::<f64>() / headlines.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_sentiment_empty() {
        assert_eq!(average_sentiment(&[]), 0.0);
    }

    #[test]
    fn test_average_sentiment() {
        let headlines = vec![
            Headline {
                title: "Earnings beat expectations".to_string(),
                sentiment: 0.8,
            },
            Headline {
                title: "Supply chain concerns linger".to_string(),
                sentiment: -0.2,
            },
        ];
        let avg = average_sentiment(&headlines);
        assert!((avg - 0.3).abs() < 1e-12);
    }
}
