use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use paperbot::application::services::evaluation::EvaluationService;
use paperbot::application::services::trading::{TradingConfig, TradingService};
use paperbot::config::SimulationConfig;
use paperbot::domain::entities::strategy::{Horizon, StrategyId};
use paperbot::domain::entities::trade::TradeSide;
use paperbot::domain::services::accuracy::BucketGranularity;
use paperbot::domain::services::clock::{Clock, SystemClock};
use paperbot::domain::services::strategies::default_strategies;
use paperbot::infrastructure::market_data::{HttpPriceOracle, MarketDataConfig};
use paperbot::infrastructure::news_feed::{HttpNewsFeed, NewsFeedConfig};
use paperbot::persistence::analytics::Analytics;
use paperbot::persistence::decisions::DecisionLog;
use paperbot::persistence::ledger::Ledger;
use paperbot::persistence::models::NewTrade;
use paperbot::persistence::tick_lease::TickLease;
use paperbot::persistence::{Database, DatabaseConfig, StoreError};
use paperbot::task_runner::{run_tick_loop, TickLoopConfig};
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Clone)]
struct AppState {
    ledger: Arc<Ledger>,
    decisions: Arc<DecisionLog>,
    analytics: Arc<Analytics>,
    trading: Arc<TradingService>,
    evaluation: Arc<EvaluationService>,
    database: Option<Database>,
    evaluation_batch_size: i64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "paperbot=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = SimulationConfig::from_env();
    info!("Paperbot simulator starting...");
    info!(
        "Universe: {} symbols, learning mode {:?}",
        config.symbols.len(),
        config.learning_mode
    );

    // Storage is optional: without it the simulator runs stateless and
    // read endpoints serve empty collections.
    let database = match DatabaseConfig::from_env() {
        Some(db_config) => match Database::open(&db_config).await {
            Ok(db) => Some(db),
            Err(e) => {
                error!("Database unavailable, continuing stateless: {}", e);
                None
            }
        },
        None => None,
    };
    let pool = database.as_ref().map(|db| db.pool().clone());

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let ledger = Arc::new(Ledger::new(pool.clone(), clock.clone()));
    let decisions = Arc::new(DecisionLog::new(
        pool.clone(),
        clock.clone(),
        config.learning_mode,
    ));
    let analytics = Arc::new(Analytics::new(pool.clone(), clock.clone()));

    ledger.seed_accounts(config.starting_cash).await?;

    let oracle = Arc::new(HttpPriceOracle::new(
        MarketDataConfig::from_env(),
        clock.clone(),
    )?);
    let news = Arc::new(HttpNewsFeed::new(NewsFeedConfig::from_env())?);

    let evaluation_lease = Arc::new(TickLease::new(
        pool.clone(),
        clock.clone(),
        "evaluation",
        config.tick_lease_ttl_seconds,
    ));
    let scan_lease = Arc::new(TickLease::new(
        pool.clone(),
        clock.clone(),
        "scan",
        config.tick_lease_ttl_seconds,
    ));

    let evaluation = Arc::new(EvaluationService::new(
        decisions.clone(),
        oracle.clone(),
        evaluation_lease,
    ));
    let trading = Arc::new(TradingService::new(
        ledger.clone(),
        decisions.clone(),
        analytics.clone(),
        oracle,
        news,
        default_strategies(),
        TradingConfig {
            symbols: config.symbols.clone(),
            min_confidence: config.min_confidence,
            trade_notional: config.trade_notional,
        },
    ));

    // Background evaluation loop
    let evaluation_loop = evaluation.clone();
    let batch_size = config.evaluation_batch_size;
    let evaluation_interval = config.evaluation_interval_seconds;
    tokio::spawn(async move {
        run_tick_loop(
            "evaluation",
            TickLoopConfig::every(Duration::from_secs(evaluation_interval)),
            move || {
                let evaluation = evaluation_loop.clone();
                async move {
                    evaluation
                        .run_tick(batch_size)
                        .await
                        .map(|_| ())
                        .map_err(|e| e.to_string())
                }
            },
        )
        .await;
    });

    // Background scan loop, lease-guarded so replicas do not double-trade
    let trading_loop = trading.clone();
    let scan_interval = config.scan_interval_seconds;
    tokio::spawn(async move {
        run_tick_loop(
            "scan",
            TickLoopConfig::every(Duration::from_secs(scan_interval)),
            move || {
                let trading = trading_loop.clone();
                let lease = scan_lease.clone();
                async move {
                    match lease.try_acquire().await {
                        Ok(true) => {
                            trading.run_scan().await;
                            Ok(())
                        }
                        Ok(false) => Ok(()),
                        Err(e) => Err(e.to_string()),
                    }
                }
            },
        )
        .await;
    });

    let state = AppState {
        ledger,
        decisions,
        analytics,
        trading,
        evaluation,
        database: database.clone(),
        evaluation_batch_size: config.evaluation_batch_size,
    };

    let app = Router::new()
        .route("/", get(|| async { "Paperbot trading simulator is running!" }))
        .route("/health", get(health_check))
        .route("/accounts", get(get_accounts))
        .route("/positions/:strategy", get(get_positions))
        .route("/trades/recent", get(get_recent_trades))
        .route("/trades/:strategy", get(get_trades_for_strategy))
        .route("/trades", post(place_trade))
        .route("/accuracy/:symbol", get(get_accuracy))
        .route("/impact/:symbol", get(get_impact_series))
        .route("/rank/:symbol", get(rank_strategies_for_symbol))
        .route("/ticks/evaluate", post(trigger_evaluation_tick))
        .route("/ticks/scan", post(trigger_scan_tick))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(64 * 1024))
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.http_port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let server = axum::serve(listener, app);

    let shutdown_signal = async move {
        let ctrl_c = async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl+C signal"),
                Err(e) => error!("Failed to install Ctrl+C handler: {}", e),
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                    info!("Received SIGTERM signal");
                }
                Err(e) => error!("Failed to install SIGTERM handler: {}", e),
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    };

    info!("Server started successfully. Press Ctrl+C to stop.");
    server.with_graceful_shutdown(shutdown_signal).await?;

    info!("Server shutting down gracefully...");
    if let Some(db) = database {
        db.close().await;
    }
    info!("Shutdown complete");
    Ok(())
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn store_error(e: StoreError) -> ApiError {
    match e {
        StoreError::StorageUnavailable => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "storage required"})),
        ),
        StoreError::Validation(v) => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": v.to_string()})),
        ),
        StoreError::Database(d) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": d.to_string()})),
        ),
    }
}

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"error": message.into()})),
    )
}

fn parse_strategy(s: &str) -> Result<StrategyId, ApiError> {
    StrategyId::parse(s).ok_or_else(|| bad_request(format!("Unknown strategy: {}", s)))
}

fn limit_param(params: &HashMap<String, String>) -> i64 {
    params
        .get("limit")
        .and_then(|s| s.parse().ok())
        .unwrap_or(50)
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let storage = match &state.database {
        Some(db) => match db.healthcheck().await {
            Ok(()) => json!({"configured": true, "healthy": true}),
            Err(e) => json!({"configured": true, "healthy": false, "error": e.to_string()}),
        },
        None => json!({"configured": false}),
    };

    let pending = state.decisions.count_pending().await.unwrap_or(0);

    Json(json!({
        "status": "running",
        "storage": storage,
        "pending_decisions": pending,
    }))
}

/// Get all bot accounts
async fn get_accounts(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let accounts = state.ledger.get_accounts().await.map_err(store_error)?;
    Ok(Json(json!({ "accounts": accounts })))
}

/// Get a strategy's positions
async fn get_positions(
    State(state): State<AppState>,
    Path(strategy): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let strategy = parse_strategy(&strategy)?;
    let positions = state
        .ledger
        .get_positions(strategy)
        .await
        .map_err(store_error)?;
    Ok(Json(json!({
        "strategy": strategy,
        "positions": positions,
    })))
}

/// Get recent trades across all strategies
async fn get_recent_trades(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let trades = state
        .ledger
        .get_recent_trades(limit_param(&params))
        .await
        .map_err(store_error)?;
    Ok(Json(json!({ "trades": trades })))
}

/// Get a strategy's trades
async fn get_trades_for_strategy(
    State(state): State<AppState>,
    Path(strategy): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let strategy = parse_strategy(&strategy)?;
    let trades = state
        .ledger
        .get_trades_for_strategy(strategy, limit_param(&params))
        .await
        .map_err(store_error)?;
    Ok(Json(json!({
        "strategy": strategy,
        "trades": trades,
    })))
}

/// Place a manual trade
async fn place_trade(
    State(state): State<AppState>,
    Json(payload): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let strategy = payload["strategy"]
        .as_str()
        .ok_or_else(|| bad_request("Missing strategy field"))?;
    let strategy = parse_strategy(strategy)?;

    let symbol = payload["symbol"]
        .as_str()
        .ok_or_else(|| bad_request("Missing symbol field"))?
        .to_uppercase();

    let side = payload["side"]
        .as_str()
        .ok_or_else(|| bad_request("Missing side field"))?;
    let side = TradeSide::parse(side).map_err(|e| bad_request(e.to_string()))?;

    let quantity = payload["quantity"]
        .as_f64()
        .ok_or_else(|| bad_request("Missing or invalid quantity field"))?;
    let price = payload["price"]
        .as_f64()
        .ok_or_else(|| bad_request("Missing or invalid price field"))?;
    let note = payload
        .get("note")
        .and_then(|v| v.as_str())
        .unwrap_or("manual trade")
        .to_string();

    let trade = state
        .ledger
        .apply_trade(NewTrade {
            strategy,
            symbol,
            side,
            quantity,
            price,
            note,
        })
        .await
        .map_err(store_error)?;

    Ok(Json(json!({
        "success": true,
        "trade": trade,
    })))
}

/// Historical accuracy for a symbol, optionally filtered by strategy and
/// horizon
async fn get_accuracy(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let strategy = match params.get("strategy") {
        Some(s) => Some(parse_strategy(s)?),
        None => None,
    };
    let horizon = match params.get("horizon") {
        Some(h) => {
            Some(Horizon::parse(h).ok_or_else(|| bad_request(format!("Unknown horizon: {}", h)))?)
        }
        None => None,
    };

    let stats = state
        .analytics
        .get_accuracy(&symbol.to_uppercase(), strategy, horizon, limit_param(&params))
        .await
        .map_err(store_error)?;

    Ok(Json(json!({
        "symbol": symbol.to_uppercase(),
        "samples": stats.samples,
        "accuracy_pct": stats.accuracy_pct,
    })))
}

/// Bucketed accuracy time series with running cumulative totals
async fn get_impact_series(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let strategy = match params.get("strategy") {
        Some(s) => Some(parse_strategy(s)?),
        None => None,
    };
    let granularity = match params.get("granularity") {
        Some(g) => BucketGranularity::parse(g)
            .ok_or_else(|| bad_request(format!("Unknown granularity: {} (hour or day)", g)))?,
        None => BucketGranularity::Hour,
    };
    let bucket_limit = params
        .get("buckets")
        .and_then(|s| s.parse().ok())
        .unwrap_or(24);

    let series = state
        .analytics
        .get_impact_series(&symbol.to_uppercase(), strategy, granularity, bucket_limit)
        .await
        .map_err(store_error)?;

    Ok(Json(json!({
        "symbol": symbol.to_uppercase(),
        "granularity": granularity,
        "buckets": series.buckets,
        "cumulative": series.cumulative,
    })))
}

/// Rank strategies for a symbol by blended confidence
async fn rank_strategies_for_symbol(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let symbol = symbol.to_uppercase();
    match state.trading.rank_for_symbol(&symbol).await {
        Ok(ranked) => {
            let winner = ranked.first().map(|r| r.strategy);
            Ok(Json(json!({
                "symbol": symbol,
                "winner": winner,
                "ranked": ranked,
            })))
        }
        Err(e) => {
            warn!("Ranking unavailable for {}: {}", symbol, e);
            Err((
                StatusCode::BAD_GATEWAY,
                Json(json!({"error": format!("Quote unavailable: {}", e)})),
            ))
        }
    }
}

/// Run one evaluation tick now
async fn trigger_evaluation_tick(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let report = state
        .evaluation
        .run_tick(state.evaluation_batch_size)
        .await
        .map_err(store_error)?;
    Ok(Json(json!({
        "evaluated": report.evaluated,
        "stored": report.stored,
        "failed": report.failed,
    })))
}

/// Run one scan pass now
async fn trigger_scan_tick(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let report = state.trading.run_scan().await;
    Ok(Json(json!({
        "symbols_scanned": report.symbols_scanned,
        "symbols_skipped": report.symbols_skipped,
        "decisions_logged": report.decisions_logged,
        "trades_executed": report.trades_executed,
    })))
}
