//! Account Ledger
//!
//! Owns cash balances, positions, and the append-only trade log. A trade
//! is applied as one atomic unit: insert the trade row, adjust cash,
//! upsert the position with the weighted-average-cost rule. On any
//! failure mid-sequence the whole transaction rolls back.
//!
//! Trades for the same strategy serialize behind a per-strategy mutex;
//! trades for different strategies may run concurrently. The ledger does
//! not reject trades that drive cash negative: the simulation treats cash
//! as an unlimited-margin score and budget checks belong to callers.

use super::models::{AccountRecord, NewTrade, PositionRecord, TradeRecord};
use super::{DatabaseError, DbPool, StoreError};
use crate::domain::entities::strategy::StrategyId;
use crate::domain::services::clock::Clock;
use crate::domain::value_objects::{price::Price, quantity::Quantity};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error};

/// Below this a position quantity counts as flat and the cost basis is
/// reset, so float noise cannot leave a stale average behind.
const ZERO_EPSILON: f64 = 1e-9;

/// Query limits are clamped to this range.
const MIN_LIMIT: i64 = 1;
const MAX_LIMIT: i64 = 500;

pub(crate) fn clamp_limit(limit: i64) -> i64 {
    limit.clamp(MIN_LIMIT, MAX_LIMIT)
}

/// Weighted-average-cost blend for a position after a signed quantity
/// delta at `price`. Average cost moves only on increases; a decrease
/// leaves it unchanged unless the position goes (near-)flat, which
/// resets it to zero.
pub(crate) fn blend_position(
    current: Option<(f64, f64)>,
    delta_qty: f64,
    price: f64,
) -> (f64, f64) {
    match current {
        None => (delta_qty, if delta_qty > 0.0 { price } else { 0.0 }),
        Some((quantity, avg_cost)) => {
            let new_quantity = quantity + delta_qty;
            if delta_qty > 0.0 {
                let new_avg =
                    (quantity * avg_cost + delta_qty * price) / new_quantity.max(ZERO_EPSILON);
                (new_quantity, new_avg)
            } else if new_quantity <= ZERO_EPSILON {
                (new_quantity, 0.0)
            } else {
                (new_quantity, avg_cost)
            }
        }
    }
}

/// The paper-trading account ledger.
pub struct Ledger {
    pool: Option<DbPool>,
    clock: Arc<dyn Clock>,
    strategy_locks: HashMap<StrategyId, Mutex<()>>,
}

impl Ledger {
    pub fn new(pool: Option<DbPool>, clock: Arc<dyn Clock>) -> Self {
        let strategy_locks = StrategyId::ALL
            .into_iter()
            .map(|id| (id, Mutex::new(())))
            .collect();
        Self {
            pool,
            clock,
            strategy_locks,
        }
    }

    /// Create an account per strategy with the starting balance, skipping
    /// accounts that already exist. Safe to call on every startup.
    pub async fn seed_accounts(&self, starting_cash: f64) -> Result<(), StoreError> {
        let Some(pool) = &self.pool else {
            debug!("No storage configured; skipping account seeding");
            return Ok(());
        };

        let now = self.clock.now();
        for strategy in StrategyId::ALL {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO accounts (strategy, cash, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?3)
                "#,
            )
            .bind(strategy.as_str())
            .bind(starting_cash)
            .bind(now)
            .execute(pool)
            .await
            .map_err(|e| {
                error!("Failed to seed account for {}: {}", strategy, e);
                DatabaseError::QueryError(format!("Failed to seed account: {}", e))
            })?;
        }
        Ok(())
    }

    /// Apply a trade atomically: insert the trade row, adjust cash by
    /// ∓qty·price, upsert the position. Validation happens before any
    /// mutation; mid-sequence failure rolls everything back.
    pub async fn apply_trade(&self, trade: NewTrade) -> Result<TradeRecord, StoreError> {
        let quantity = Quantity::new(trade.quantity)?;
        let price = Price::new(trade.price)?;
        let pool = self.pool.as_ref().ok_or(StoreError::StorageUnavailable)?;

        // Serialize trades per strategy; cross-strategy trades interleave
        // freely.
        let _guard = self
            .strategy_locks
            .get(&trade.strategy)
            .expect("lock map covers every strategy")
            .lock()
            .await;

        let now = self.clock.now();
        let mut tx = pool.begin().await.map_err(|e| {
            error!("Failed to begin trade transaction: {}", e);
            DatabaseError::QueryError(format!("Failed to begin transaction: {}", e))
        })?;

        let record = sqlx::query_as::<_, TradeRecord>(
            r#"
            INSERT INTO trades (strategy, symbol, side, quantity, price, note, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            RETURNING *
            "#,
        )
        .bind(trade.strategy.as_str())
        .bind(&trade.symbol)
        .bind(trade.side.as_str())
        .bind(quantity.value())
        .bind(price.value())
        .bind(&trade.note)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            error!("Failed to insert trade: {}", e);
            DatabaseError::QueryError(format!("Failed to insert trade: {}", e))
        })?;

        let cash_delta = trade.side.cash_sign() * quantity.value() * price.value();
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO accounts (strategy, cash, created_at, updated_at)
            VALUES (?1, 0.0, ?2, ?2)
            "#,
        )
        .bind(trade.strategy.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| DatabaseError::QueryError(format!("Failed to ensure account: {}", e)))?;

        sqlx::query("UPDATE accounts SET cash = cash + ?1, updated_at = ?2 WHERE strategy = ?3")
            .bind(cash_delta)
            .bind(now)
            .bind(trade.strategy.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!("Failed to adjust cash for {}: {}", trade.strategy, e);
                DatabaseError::QueryError(format!("Failed to adjust cash: {}", e))
            })?;

        let current: Option<(f64, f64)> = sqlx::query_as(
            "SELECT quantity, avg_cost FROM positions WHERE strategy = ?1 AND symbol = ?2",
        )
        .bind(trade.strategy.as_str())
        .bind(&trade.symbol)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| DatabaseError::QueryError(format!("Failed to read position: {}", e)))?;

        let delta_qty = trade.side.quantity_sign() * quantity.value();
        let (new_quantity, new_avg_cost) = blend_position(current, delta_qty, price.value());

        sqlx::query(
            r#"
            INSERT INTO positions (strategy, symbol, quantity, avg_cost, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(strategy, symbol) DO UPDATE SET
                quantity = excluded.quantity,
                avg_cost = excluded.avg_cost,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(trade.strategy.as_str())
        .bind(&trade.symbol)
        .bind(new_quantity)
        .bind(new_avg_cost)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!("Failed to upsert position: {}", e);
            DatabaseError::QueryError(format!("Failed to upsert position: {}", e))
        })?;

        tx.commit().await.map_err(|e| {
            error!("Failed to commit trade transaction: {}", e);
            DatabaseError::QueryError(format!("Failed to commit transaction: {}", e))
        })?;

        debug!(
            "Applied trade #{}: {} {} {} @ {}",
            record.id, record.strategy, record.side, record.symbol, record.price
        );
        Ok(record)
    }

    /// Administrative cash adjustment, the only sanctioned cash mutation
    /// outside `apply_trade`.
    pub async fn adjust_cash(
        &self,
        strategy: StrategyId,
        amount: f64,
    ) -> Result<AccountRecord, StoreError> {
        let pool = self.pool.as_ref().ok_or(StoreError::StorageUnavailable)?;
        let now = self.clock.now();

        let record = sqlx::query_as::<_, AccountRecord>(
            r#"
            UPDATE accounts SET cash = cash + ?1, updated_at = ?2
            WHERE strategy = ?3
            RETURNING *
            "#,
        )
        .bind(amount)
        .bind(now)
        .bind(strategy.as_str())
        .fetch_one(pool)
        .await
        .map_err(|e| {
            error!("Failed to adjust cash for {}: {}", strategy, e);
            DatabaseError::QueryError(format!("Failed to adjust cash: {}", e))
        })?;

        Ok(record)
    }

    /// Get all bot accounts
    pub async fn get_accounts(&self) -> Result<Vec<AccountRecord>, StoreError> {
        let Some(pool) = &self.pool else {
            return Ok(Vec::new());
        };

        let records =
            sqlx::query_as::<_, AccountRecord>("SELECT * FROM accounts ORDER BY strategy")
                .fetch_all(pool)
                .await
                .map_err(|e| {
                    error!("Failed to get accounts: {}", e);
                    DatabaseError::QueryError(format!("Failed to get accounts: {}", e))
                })?;

        Ok(records)
    }

    /// Get a strategy's positions, alphabetical by symbol
    pub async fn get_positions(
        &self,
        strategy: StrategyId,
    ) -> Result<Vec<PositionRecord>, StoreError> {
        let Some(pool) = &self.pool else {
            return Ok(Vec::new());
        };

        let records = sqlx::query_as::<_, PositionRecord>(
            "SELECT * FROM positions WHERE strategy = ?1 ORDER BY symbol ASC",
        )
        .bind(strategy.as_str())
        .fetch_all(pool)
        .await
        .map_err(|e| {
            error!("Failed to get positions for {}: {}", strategy, e);
            DatabaseError::QueryError(format!("Failed to get positions: {}", e))
        })?;

        Ok(records)
    }

    /// Get recent trades across all strategies, newest first
    pub async fn get_recent_trades(&self, limit: i64) -> Result<Vec<TradeRecord>, StoreError> {
        let Some(pool) = &self.pool else {
            return Ok(Vec::new());
        };

        let records = sqlx::query_as::<_, TradeRecord>(
            "SELECT * FROM trades ORDER BY created_at DESC, id DESC LIMIT ?1",
        )
        .bind(clamp_limit(limit))
        .fetch_all(pool)
        .await
        .map_err(|e| {
            error!("Failed to get recent trades: {}", e);
            DatabaseError::QueryError(format!("Failed to get recent trades: {}", e))
        })?;

        Ok(records)
    }

    /// Get a strategy's trades, newest first
    pub async fn get_trades_for_strategy(
        &self,
        strategy: StrategyId,
        limit: i64,
    ) -> Result<Vec<TradeRecord>, StoreError> {
        let Some(pool) = &self.pool else {
            return Ok(Vec::new());
        };

        let records = sqlx::query_as::<_, TradeRecord>(
            "SELECT * FROM trades WHERE strategy = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2",
        )
        .bind(strategy.as_str())
        .bind(clamp_limit(limit))
        .fetch_all(pool)
        .await
        .map_err(|e| {
            error!("Failed to get trades for {}: {}", strategy, e);
            DatabaseError::QueryError(format!("Failed to get trades: {}", e))
        })?;

        Ok(records)
    }
}
