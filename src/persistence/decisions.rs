//! Decision Log
//!
//! Records each strategy's signal at the moment of judgment together with
//! the time it matures. A decision is created pending and flips to
//! evaluated exactly once; evaluated decisions feed the append-only
//! learning-event log that accuracy analytics read.

use super::models::{DecisionRecord, LearningEventRecord, NewDecision};
use super::{DatabaseError, DbPool, StoreError};
use crate::domain::entities::strategy::LearningMode;
use crate::domain::services::accuracy;
use crate::domain::services::clock::Clock;
use crate::persistence::ledger::clamp_limit;
use std::sync::Arc;
use tracing::{debug, error};

pub struct DecisionLog {
    pool: Option<DbPool>,
    clock: Arc<dyn Clock>,
    mode: LearningMode,
}

impl DecisionLog {
    /// The learning mode is fixed at construction; it decides how far in
    /// the future each horizon matures.
    pub fn new(pool: Option<DbPool>, clock: Arc<dyn Clock>, mode: LearningMode) -> Self {
        Self { pool, clock, mode }
    }

    pub fn mode(&self) -> LearningMode {
        self.mode
    }

    /// Record a judgment. Every signal is logged, including HOLD; whether
    /// a trade follows is the caller's decision.
    pub async fn log_decision(&self, decision: NewDecision) -> Result<DecisionRecord, StoreError> {
        let pool = self.pool.as_ref().ok_or(StoreError::StorageUnavailable)?;

        let now = self.clock.now();
        let due_at = now + decision.horizon.offset(self.mode);

        let record = sqlx::query_as::<_, DecisionRecord>(
            r#"
            INSERT INTO decisions (
                symbol, strategy, horizon, signal, price_at_signal,
                due_at, evaluated, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)
            RETURNING *
            "#,
        )
        .bind(&decision.symbol)
        .bind(decision.strategy.as_str())
        .bind(decision.horizon.as_str())
        .bind(decision.signal.as_str())
        .bind(decision.price_at_signal)
        .bind(due_at)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(|e| {
            error!("Failed to log decision: {}", e);
            DatabaseError::QueryError(format!("Failed to log decision: {}", e))
        })?;

        debug!(
            "Logged decision #{}: {} {} {} due {}",
            record.id, record.strategy, record.signal, record.symbol, record.due_at
        );
        Ok(record)
    }

    /// Pending decisions whose due time has passed, oldest-due first.
    /// Bounded so one scheduler tick does bounded work.
    pub async fn get_due_decisions(&self, limit: i64) -> Result<Vec<DecisionRecord>, StoreError> {
        let Some(pool) = &self.pool else {
            return Ok(Vec::new());
        };

        let records = sqlx::query_as::<_, DecisionRecord>(
            r#"
            SELECT * FROM decisions
            WHERE evaluated = 0 AND due_at <= ?1
            ORDER BY due_at ASC
            LIMIT ?2
            "#,
        )
        .bind(self.clock.now())
        .bind(clamp_limit(limit))
        .fetch_all(pool)
        .await
        .map_err(|e| {
            error!("Failed to get due decisions: {}", e);
            DatabaseError::QueryError(format!("Failed to get due decisions: {}", e))
        })?;

        Ok(records)
    }

    /// Flip a decision to evaluated and store the re-quoted price, but
    /// only if it is still pending. Returns None when another evaluator
    /// got there first; the flag and price land in one statement so a
    /// decision can never be double-counted.
    pub async fn mark_evaluated(
        &self,
        id: i64,
        price_after: f64,
    ) -> Result<Option<DecisionRecord>, StoreError> {
        let pool = self.pool.as_ref().ok_or(StoreError::StorageUnavailable)?;

        let record = sqlx::query_as::<_, DecisionRecord>(
            r#"
            UPDATE decisions
            SET evaluated = 1, price_after = ?1, evaluated_at = ?2
            WHERE id = ?3 AND evaluated = 0
            RETURNING *
            "#,
        )
        .bind(price_after)
        .bind(self.clock.now())
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| {
            error!("Failed to mark decision {} evaluated: {}", id, e);
            DatabaseError::QueryError(format!("Failed to mark decision evaluated: {}", e))
        })?;

        Ok(record)
    }

    /// Derive the immutable learning event from an evaluated decision.
    pub async fn record_learning_event(
        &self,
        decision: &DecisionRecord,
        price_after: f64,
    ) -> Result<LearningEventRecord, StoreError> {
        let pool = self.pool.as_ref().ok_or(StoreError::StorageUnavailable)?;

        let outcome_pct = accuracy::outcome_pct(decision.price_at_signal, price_after);
        let record = sqlx::query_as::<_, LearningEventRecord>(
            r#"
            INSERT INTO learning_events (
                symbol, strategy, horizon, signal,
                price_before, price_after, outcome_pct, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            RETURNING *
            "#,
        )
        .bind(&decision.symbol)
        .bind(&decision.strategy)
        .bind(&decision.horizon)
        .bind(&decision.signal)
        .bind(decision.price_at_signal)
        .bind(price_after)
        .bind(outcome_pct)
        .bind(self.clock.now())
        .fetch_one(pool)
        .await
        .map_err(|e| {
            error!("Failed to record learning event: {}", e);
            DatabaseError::QueryError(format!("Failed to record learning event: {}", e))
        })?;

        debug!(
            "Recorded learning event #{}: {} {} {} outcome {:.2}%",
            record.id, record.strategy, record.signal, record.symbol, record.outcome_pct
        );
        Ok(record)
    }

    /// Count of decisions still waiting to mature.
    pub async fn count_pending(&self) -> Result<i64, StoreError> {
        let Some(pool) = &self.pool else {
            return Ok(0);
        };

        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM decisions WHERE evaluated = 0")
            .fetch_one(pool)
            .await
            .map_err(|e| DatabaseError::QueryError(format!("Failed to count pending: {}", e)))?;

        Ok(row.0)
    }
}
