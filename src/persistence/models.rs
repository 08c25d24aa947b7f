//! Database Models
//!
//! Persistent data structures for accounts, positions, trades, decisions,
//! and learning events.

use crate::domain::entities::strategy::{Horizon, Signal, StrategyId};
use crate::domain::entities::trade::TradeSide;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Bot account record in database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AccountRecord {
    pub strategy: String,
    pub cash: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Position record in database. Rows are retained at zero quantity so
/// upserts stay idempotent.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PositionRecord {
    pub strategy: String,
    pub symbol: String,
    pub quantity: f64,
    pub avg_cost: f64,
    pub updated_at: DateTime<Utc>,
}

/// Trade record in database. Append-only: never mutated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TradeRecord {
    pub id: i64,
    pub strategy: String,
    pub symbol: String,
    pub side: String, // "BUY" or "SELL"
    pub quantity: f64,
    pub price: f64,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

/// Decision record in database. Created pending; `evaluated`,
/// `price_after` and `evaluated_at` are written together exactly once.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DecisionRecord {
    pub id: i64,
    pub symbol: String,
    pub strategy: String,
    pub horizon: String, // "short", "medium" or "long"
    pub signal: String,  // "BUY", "SELL" or "HOLD"
    pub price_at_signal: f64,
    pub due_at: DateTime<Utc>,
    pub evaluated: bool,
    pub price_after: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub evaluated_at: Option<DateTime<Utc>>,
}

/// Learning event record in database. Append-only, derived from an
/// evaluated decision.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LearningEventRecord {
    pub id: i64,
    pub symbol: String,
    pub strategy: String,
    pub horizon: String,
    pub signal: String,
    pub price_before: f64,
    pub price_after: f64,
    pub outcome_pct: f64,
    pub created_at: DateTime<Utc>,
}

/// Create trade input
#[derive(Debug, Clone)]
pub struct NewTrade {
    pub strategy: StrategyId,
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: f64,
    pub price: f64,
    pub note: String,
}

/// Create decision input
#[derive(Debug, Clone)]
pub struct NewDecision {
    pub symbol: String,
    pub strategy: StrategyId,
    pub horizon: Horizon,
    pub signal: Signal,
    pub price_at_signal: f64,
}
