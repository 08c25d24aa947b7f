//! Accuracy Analytics
//!
//! Read-only aggregation over learning events: recent-sample accuracy per
//! symbol/strategy/horizon, and hour/day bucketed series with running
//! cumulative accuracy. Never mutates ledger or decision state.

use super::{DatabaseError, DbPool, StoreError};
use crate::domain::entities::strategy::{Horizon, Signal, StrategyId};
use crate::domain::services::accuracy::{
    accuracy_of, bucketize, cumulative, AccuracyStats, BucketGranularity, EvaluatedOutcome,
    ImpactSeries,
};
use crate::domain::services::clock::Clock;
use crate::persistence::ledger::clamp_limit;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, warn};

/// Upper bound on buckets returned by an impact series.
const MAX_BUCKETS: i64 = 240;

pub struct Analytics {
    pool: Option<DbPool>,
    clock: Arc<dyn Clock>,
}

/// Row shape shared by both analytics queries.
#[derive(Debug, sqlx::FromRow)]
struct OutcomeRow {
    signal: String,
    outcome_pct: f64,
    created_at: DateTime<Utc>,
}

fn to_outcome(row: OutcomeRow) -> Option<EvaluatedOutcome> {
    match Signal::parse(&row.signal) {
        Some(signal) => Some(EvaluatedOutcome {
            at: row.created_at,
            signal,
            outcome_pct: row.outcome_pct,
        }),
        None => {
            warn!("Skipping learning event with unknown signal {:?}", row.signal);
            None
        }
    }
}

impl Analytics {
    pub fn new(pool: Option<DbPool>, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// Accuracy over the most recent `limit` learning events matching the
    /// filters. Zero matching events yields zero samples, which callers
    /// must treat differently from 0% accuracy.
    pub async fn get_accuracy(
        &self,
        symbol: &str,
        strategy: Option<StrategyId>,
        horizon: Option<Horizon>,
        limit: i64,
    ) -> Result<AccuracyStats, StoreError> {
        let Some(pool) = &self.pool else {
            return Ok(AccuracyStats::default());
        };

        let rows = sqlx::query_as::<_, OutcomeRow>(
            r#"
            SELECT signal, outcome_pct, created_at FROM learning_events
            WHERE symbol = ?1
              AND (?2 IS NULL OR strategy = ?2)
              AND (?3 IS NULL OR horizon = ?3)
            ORDER BY created_at DESC, id DESC
            LIMIT ?4
            "#,
        )
        .bind(symbol)
        .bind(strategy.map(|s| s.as_str()))
        .bind(horizon.map(|h| h.as_str()))
        .bind(clamp_limit(limit))
        .fetch_all(pool)
        .await
        .map_err(|e| {
            error!("Failed to get accuracy for {}: {}", symbol, e);
            DatabaseError::QueryError(format!("Failed to get accuracy: {}", e))
        })?;

        let outcomes: Vec<EvaluatedOutcome> = rows.into_iter().filter_map(to_outcome).collect();
        Ok(accuracy_of(&outcomes))
    }

    /// Time-bucketed accuracy series with running cumulative totals.
    /// The query returns most-recent-first; events are reversed into
    /// chronological order before bucketing, and the cumulative scan runs
    /// over the chronologically ordered buckets.
    pub async fn get_impact_series(
        &self,
        symbol: &str,
        strategy: Option<StrategyId>,
        granularity: BucketGranularity,
        bucket_limit: i64,
    ) -> Result<ImpactSeries, StoreError> {
        let Some(pool) = &self.pool else {
            return Ok(ImpactSeries::default());
        };

        let bucket_limit = bucket_limit.clamp(1, MAX_BUCKETS);
        let window_start =
            granularity.truncate(self.clock.now()) - granularity.span() * (bucket_limit as i32 - 1);

        let rows = sqlx::query_as::<_, OutcomeRow>(
            r#"
            SELECT signal, outcome_pct, created_at FROM learning_events
            WHERE symbol = ?1
              AND (?2 IS NULL OR strategy = ?2)
              AND created_at >= ?3
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(symbol)
        .bind(strategy.map(|s| s.as_str()))
        .bind(window_start)
        .fetch_all(pool)
        .await
        .map_err(|e| {
            error!("Failed to get impact series for {}: {}", symbol, e);
            DatabaseError::QueryError(format!("Failed to get impact series: {}", e))
        })?;

        let mut outcomes: Vec<EvaluatedOutcome> = rows.into_iter().filter_map(to_outcome).collect();
        outcomes.reverse();

        let buckets = bucketize(&outcomes, granularity);
        let cumulative = cumulative(&buckets);
        Ok(ImpactSeries {
            buckets,
            cumulative,
        })
    }
}
