use axum::{
    Router,
    extract::{Query, State},
    response::Json,
    routing::get,
};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::pse::{
    ClientStats, DashboardSnapshot, GenerationPoint, HealthStatus, LoadPoint, PricePoint,
    PseClient, PseConfig, RedispatchEvent, ReserveMargin, Sourced,
};
use crate::risk::RiskScorer;
use crate::risk::telemetry::{HourlyRisk, build_day_telemetry, rolling_week_dates, score_day};

#[derive(Clone)]
struct AppState {
    client: Arc<PseClient>,
    scorer: RiskScorer,
}

#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

#[derive(Deserialize)]
struct RefreshQuery {
    /// Bypass the response cache for this request.
    refresh: Option<bool>,
}

#[derive(Deserialize)]
struct RangeQuery {
    /// Number of days to cover (default depends on the endpoint).
    days: Option<i64>,
    refresh: Option<bool>,
}

/// GET /health
async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(state.client.health_check().await)
}

/// GET /api/v1/generation?refresh=true
async fn get_generation(
    State(state): State<AppState>,
    Query(query): Query<RefreshQuery>,
) -> Json<ApiResponse<Sourced<Vec<GenerationPoint>>>> {
    let refresh = query.refresh.unwrap_or(false);
    Json(ApiResponse::success(
        state.client.pv_generation(None, refresh).await,
    ))
}

/// GET /api/v1/load
async fn get_load(
    State(state): State<AppState>,
    Query(query): Query<RefreshQuery>,
) -> Json<ApiResponse<Sourced<Vec<LoadPoint>>>> {
    let refresh = query.refresh.unwrap_or(false);
    Json(ApiResponse::success(
        state.client.system_load(None, refresh).await,
    ))
}

/// GET /api/v1/redispatch?days=N
async fn get_redispatch(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> Json<ApiResponse<Sourced<Vec<RedispatchEvent>>>> {
    let days = query.days.unwrap_or(30).clamp(1, 90);
    let refresh = query.refresh.unwrap_or(false);
    Json(ApiResponse::success(
        state.client.redispatch_events(days, refresh).await,
    ))
}

/// GET /api/v1/prices
async fn get_prices(
    State(state): State<AppState>,
    Query(query): Query<RefreshQuery>,
) -> Json<ApiResponse<Sourced<Vec<PricePoint>>>> {
    let refresh = query.refresh.unwrap_or(false);
    Json(ApiResponse::success(
        state.client.price_forecasts(None, refresh).await,
    ))
}

/// GET /api/v1/reserves?days=N
async fn get_reserves(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> Json<ApiResponse<Sourced<Vec<ReserveMargin>>>> {
    let days = query.days.unwrap_or(3).clamp(1, 7);
    let refresh = query.refresh.unwrap_or(false);
    Json(ApiResponse::success(
        state.client.reserve_margins(days, refresh).await,
    ))
}

/// GET /api/v1/snapshot
async fn get_snapshot(
    State(state): State<AppState>,
    Query(query): Query<RefreshQuery>,
) -> Json<ApiResponse<DashboardSnapshot>> {
    let refresh = query.refresh.unwrap_or(false);
    Json(ApiResponse::success(
        state.client.dashboard_snapshot(refresh).await,
    ))
}

/// GET /api/v1/risk/today
/// Hourly risk assessments for the current day.
async fn get_risk_today(
    State(state): State<AppState>,
    Query(query): Query<RefreshQuery>,
) -> Json<ApiResponse<Vec<HourlyRisk>>> {
    let refresh = query.refresh.unwrap_or(false);
    let today = Local::now().date_naive();

    let (load, generation, reserves) = tokio::join!(
        state.client.system_load(None, refresh),
        state.client.pv_generation(None, refresh),
        state.client.reserve_margins(1, refresh),
    );

    let telemetry = build_day_telemetry(today, &load.data, &generation.data, &reserves.data);
    Json(ApiResponse::success(score_day(&state.scorer, today, &telemetry)))
}

#[derive(Serialize)]
struct HeatmapDay {
    date: String,
    hours: Vec<HourlyRisk>,
}

/// GET /api/v1/risk/heatmap
/// Rolling 7-day risk matrix, day 0 = today. Live data backs today; the
/// remaining days run on the reserve-margin forecast alone.
async fn get_risk_heatmap(State(state): State<AppState>) -> Json<ApiResponse<Vec<HeatmapDay>>> {
    let dates = rolling_week_dates();

    let (load, generation, reserves) = tokio::join!(
        state.client.system_load(None, false),
        state.client.pv_generation(None, false),
        state.client.reserve_margins(7, false),
    );

    let days = dates
        .into_iter()
        .enumerate()
        .map(|(offset, date)| {
            let telemetry = if offset == 0 {
                build_day_telemetry(date, &load.data, &generation.data, &reserves.data)
            } else {
                build_day_telemetry(date, &[], &[], &reserves.data)
            };

            HeatmapDay {
                date: date.format("%Y-%m-%d").to_string(),
                hours: score_day(&state.scorer, date, &telemetry),
            }
        })
        .collect();

    Json(ApiResponse::success(days))
}

/// GET /api/v1/stats
async fn get_stats(State(state): State<AppState>) -> Json<ApiResponse<ClientStats>> {
    Json(ApiResponse::success(state.client.stats().await))
}

pub async fn start_server(config: PseConfig) -> anyhow::Result<()> {
    let state = AppState {
        client: Arc::new(PseClient::new(config)),
        scorer: RiskScorer::new(),
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/api/v1/generation", get(get_generation))
        .route("/api/v1/load", get(get_load))
        .route("/api/v1/redispatch", get(get_redispatch))
        .route("/api/v1/prices", get(get_prices))
        .route("/api/v1/reserves", get(get_reserves))
        .route("/api/v1/snapshot", get(get_snapshot))
        .route("/api/v1/risk/today", get(get_risk_today))
        .route("/api/v1/risk/heatmap", get(get_risk_heatmap))
        .route("/api/v1/stats", get(get_stats))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3055").await?;
    println!("🚀 Server running on http://0.0.0.0:3055");
    println!("\nAvailable endpoints:");
    println!("  GET /health");
    println!("  GET /api/v1/generation?refresh=true");
    println!("  GET /api/v1/load");
    println!("  GET /api/v1/redispatch?days=N");
    println!("  GET /api/v1/prices");
    println!("  GET /api/v1/reserves?days=N");
    println!("  GET /api/v1/snapshot");
    println!("  GET /api/v1/risk/today");
    println!("  GET /api/v1/risk/heatmap");
    println!("  GET /api/v1/stats");

    axum::serve(listener, app).await?;

    Ok(())
}
