//! Persistence Layer
//!
//! SQLite-backed storage for the paper-trading ledger, the decision log,
//! and learning events. Uses async operations via sqlx.
//!
//! # Database Schema
//!
//! ## Accounts Table
//! - strategy: Strategy identifier (primary key)
//! - cash: Current cash balance
//!
//! ## Positions Table
//! - (strategy, symbol): Unique pair
//! - quantity, avg_cost: Weighted-average cost basis accounting
//!
//! ## Trades Table (append-only)
//! - strategy, symbol, side, quantity, price, note
//!
//! ## Decisions Table
//! - symbol, strategy, horizon, signal, price_at_signal
//! - due_at: When the decision matures
//! - evaluated, price_after, evaluated_at: Written together exactly once
//!
//! ## Learning Events Table (append-only)
//! - Derived from evaluated decisions, the input to accuracy analytics
//!
//! ## Tick Leases Table
//! - Cooperative advisory lock so a single instance runs scheduler ticks

pub mod analytics;
pub mod decisions;
pub mod ledger;
pub mod models;
pub mod tick_lease;

use crate::domain::errors::ValidationError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::ConnectOptions;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

/// Database connection pool
pub type DbPool = SqlitePool;

/// Database initialization error
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrationError(String),

    #[error("Query error: {0}")]
    QueryError(String),
}

/// Error type shared by the storage-backed services. Reads degrade to
/// empty results when storage is absent; writes surface
/// `StorageUnavailable` instead.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Storage required for this operation")]
    StorageUnavailable,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Explicitly constructed storage handle, passed to each component at
/// startup. Replaces any notion of a lazily initialized global pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open the database, creating the file and running migrations.
    pub async fn open(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let pool = init_database(&config.url, config.max_connections).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Cheap liveness probe for the health endpoint.
    pub async fn healthcheck(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| DatabaseError::QueryError(format!("Healthcheck failed: {}", e)))?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Initialize the database connection pool
///
/// # Arguments
/// - `database_url`: Path to SQLite database file (e.g., "sqlite://data/paperbot.db")
///
/// # Errors
/// Returns error if database connection fails or migrations fail
pub async fn init_database(database_url: &str, max_connections: u32) -> Result<DbPool, DatabaseError> {
    info!("Initializing database: {}", database_url);

    // Ensure data directory exists
    if let Some(db_path) = database_url.strip_prefix("sqlite://") {
        if let Some(parent) = Path::new(db_path).parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::ConnectionError(sqlx::Error::Configuration(Box::new(e)))
            })?;
        }
    }

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .log_statements(tracing::log::LevelFilter::Debug);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    info!("✓ Database initialized successfully");

    Ok(pool)
}

/// Run database migrations
async fn run_migrations(pool: &DbPool) -> Result<(), DatabaseError> {
    info!("Running database migrations...");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS accounts (
            strategy TEXT PRIMARY KEY,
            cash REAL NOT NULL,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::MigrationError(format!("Failed to create accounts table: {}", e)))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS positions (
            strategy TEXT NOT NULL,
            symbol TEXT NOT NULL,
            quantity REAL NOT NULL,
            avg_cost REAL NOT NULL,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (strategy, symbol)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        DatabaseError::MigrationError(format!("Failed to create positions table: {}", e))
    })?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS trades (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            strategy TEXT NOT NULL,
            symbol TEXT NOT NULL,
            side TEXT NOT NULL CHECK(side IN ('BUY', 'SELL')),
            quantity REAL NOT NULL,
            price REAL NOT NULL,
            note TEXT NOT NULL DEFAULT '',
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::MigrationError(format!("Failed to create trades table: {}", e)))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS decisions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            symbol TEXT NOT NULL,
            strategy TEXT NOT NULL,
            horizon TEXT NOT NULL CHECK(horizon IN ('short', 'medium', 'long')),
            signal TEXT NOT NULL CHECK(signal IN ('BUY', 'SELL', 'HOLD')),
            price_at_signal REAL NOT NULL,
            due_at DATETIME NOT NULL,
            evaluated INTEGER NOT NULL DEFAULT 0,
            price_after REAL,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            evaluated_at DATETIME
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        DatabaseError::MigrationError(format!("Failed to create decisions table: {}", e))
    })?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS learning_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            symbol TEXT NOT NULL,
            strategy TEXT NOT NULL,
            horizon TEXT NOT NULL,
            signal TEXT NOT NULL,
            price_before REAL NOT NULL,
            price_after REAL NOT NULL,
            outcome_pct REAL NOT NULL,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        DatabaseError::MigrationError(format!("Failed to create learning_events table: {}", e))
    })?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tick_leases (
            name TEXT PRIMARY KEY,
            holder TEXT NOT NULL,
            expires_at DATETIME NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        DatabaseError::MigrationError(format!("Failed to create tick_leases table: {}", e))
    })?;

    // Indexes for scheduler scans and bucket queries
    for (name, statement) in [
        (
            "idx_trades_created_at",
            "CREATE INDEX IF NOT EXISTS idx_trades_created_at ON trades(created_at)",
        ),
        (
            "idx_trades_strategy_time",
            "CREATE INDEX IF NOT EXISTS idx_trades_strategy_time ON trades(strategy, created_at)",
        ),
        (
            "idx_trades_symbol_time",
            "CREATE INDEX IF NOT EXISTS idx_trades_symbol_time ON trades(symbol, created_at)",
        ),
        (
            "idx_decisions_due",
            "CREATE INDEX IF NOT EXISTS idx_decisions_due ON decisions(evaluated, due_at)",
        ),
        (
            "idx_learning_symbol_time",
            "CREATE INDEX IF NOT EXISTS idx_learning_symbol_time ON learning_events(symbol, created_at)",
        ),
        (
            "idx_learning_strategy_time",
            "CREATE INDEX IF NOT EXISTS idx_learning_strategy_time ON learning_events(strategy, created_at)",
        ),
    ] {
        sqlx::query(statement).execute(pool).await.map_err(|e| {
            DatabaseError::MigrationError(format!("Failed to create index {}: {}", name, e))
        })?;
    }

    info!("✓ Database migrations completed successfully");

    Ok(())
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database URL (e.g., "sqlite://data/paperbot.db"); None runs the
    /// simulator in stateless demo mode
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/paperbot.db".to_string(),
            max_connections: 5,
        }
    }
}

impl DatabaseConfig {
    /// Load from environment variables. `DATABASE_URL=none` disables
    /// storage entirely.
    pub fn from_env() -> Option<Self> {
        let url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://data/paperbot.db".to_string());

        if url.is_empty() || url.eq_ignore_ascii_case("none") {
            warn!("DATABASE_URL disabled; running without persistent storage");
            return None;
        }

        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        Some(Self {
            url,
            max_connections,
        })
    }
}

#[cfg(test)]
pub(crate) async fn test_pool() -> DbPool {
    init_database("sqlite::memory:", 1)
        .await
        .expect("in-memory database")
}
