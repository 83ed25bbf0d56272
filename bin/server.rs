// Banking ETL - JSON API
// Read-only view over the warehouse aggregates

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use banking_etl::config::EtlConfig;
use banking_etl::db::{self, DashboardSnapshot};
use banking_etl::{logging, AnomalyReason};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 1000;

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Response {
        (
            StatusCode::OK,
            Json(Self {
                success: true,
                data: Some(data),
                error: None,
            }),
        )
            .into_response()
    }

    fn internal_error(message: String) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(Self {
                success: false,
                data: None,
                error: Some(message),
            }),
        )
            .into_response()
    }
}

#[derive(Deserialize)]
struct LimitParams {
    limit: Option<usize>,
}

impl LimitParams {
    fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT)
    }
}

/// Summary response (header metrics + charts)
#[derive(Serialize)]
struct SummaryResponse {
    clean_transactions: i64,
    total_anomalies: i64,
    unique_accounts: i64,
    anomalies_by_reason: Vec<ReasonCount>,
    top_categories: Vec<CategoryCount>,
    hourly_volume: Vec<i64>,
}

#[derive(Serialize)]
struct ReasonCount {
    reason: AnomalyReason,
    count: i64,
}

#[derive(Serialize)]
struct CategoryCount {
    category: String,
    count: i64,
}

impl From<DashboardSnapshot> for SummaryResponse {
    fn from(snapshot: DashboardSnapshot) -> Self {
        Self {
            clean_transactions: snapshot.clean_count,
            total_anomalies: snapshot.anomaly_count,
            unique_accounts: snapshot.unique_accounts,
            hourly_volume: snapshot.full_day_volume().to_vec(),
            anomalies_by_reason: snapshot
                .anomalies_by_reason
                .into_iter()
                .map(|(reason, count)| ReasonCount { reason, count })
                .collect(),
            top_categories: snapshot
                .top_categories
                .into_iter()
                .map(|(category, count)| CategoryCount { category, count })
                .collect(),
        }
    }
}

/// Run a query against the shared connection, mapping failures to a 500
fn query<T, F>(state: &AppState, what: &str, f: F) -> Response
where
    T: Serialize,
    F: FnOnce(&Connection) -> Result<T>,
{
    let conn = match state.db.lock() {
        Ok(conn) => conn,
        Err(_) => {
            error!("database mutex poisoned");
            return ApiResponse::<T>::internal_error("database unavailable".to_string());
        }
    };

    match f(&conn) {
        Ok(data) => ApiResponse::ok(data),
        Err(e) => {
            error!(error = %e, "error getting {}", what);
            ApiResponse::<T>::internal_error(format!("failed to load {}", what))
        }
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> Response {
    ApiResponse::ok("OK")
}

/// GET /api/summary - Header metrics and chart data
async fn get_summary(State(state): State<AppState>) -> Response {
    query(&state, "summary", |conn| {
        Ok(SummaryResponse::from(DashboardSnapshot::load(conn, 0)?))
    })
}

/// GET /api/anomalies?limit=N - Latest anomalies
async fn get_anomalies(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> Response {
    query(&state, "anomalies", |conn| db::recent_anomalies(conn, params.limit()))
}

/// GET /api/transactions?limit=N - Latest clean transactions
async fn get_transactions(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> Response {
    query(&state, "transactions", |conn| db::recent_clean(conn, params.limit()))
}

/// GET /api/runs?limit=N - Load history
async fn get_runs(State(state): State<AppState>, Query(params): Query<LimitParams>) -> Response {
    query(&state, "runs", |conn| db::get_runs(conn, params.limit()))
}

fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/summary", get(get_summary))
        .route("/anomalies", get(get_anomalies))
        .route("/transactions", get(get_transactions))
        .route("/runs", get(get_runs))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let config = EtlConfig::load()?;
    logging::init(&config.logging.level);

    println!("🌐 Banking ETL - JSON API");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let db_path = &config.storage.database_path;
    if !db_path.exists() {
        eprintln!("❌ Database not found at {}", db_path.display());
        eprintln!("   Run: banking-etl etl");
        eprintln!("   to load transactions first.");
        std::process::exit(1);
    }

    let conn = db::open_database(db_path)?;
    println!("✓ Database opened: {}", db_path.display());

    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
    };

    let addr = std::env::var("ETL_SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!(%addr, "server listening");
    println!("\n🚀 Server running on http://{}", addr);
    println!("   API: http://{}/api/summary", addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, router(state))
        .await
        .context("Server error")?;

    Ok(())
}
