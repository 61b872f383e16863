use std::sync::Arc;
use axum::{
    Router,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
};
use serde::Deserialize;
use tracing::{error, info};

use crate::cache::EntityKind;
use crate::config::Config;
use crate::error::ScoreError;
use crate::metrics;
use crate::model::RankCriteria;
use crate::score::engine::ScoreEngine;

/// HTTP surface - link redirects, rankings and stats.
/// Page rendering lives elsewhere and consumes the JSON endpoints.
pub struct WebServer {
    engine: Arc<ScoreEngine>,
    config: Arc<Config>,
}

#[derive(Clone)]
struct AppState {
    engine: Arc<ScoreEngine>,
}

#[derive(Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
}

#[derive(Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

/// Core error as an HTTP response
struct ApiError(ScoreError);

impl From<ScoreError> for ApiError {
    fn from(e: ScoreError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ScoreError::NotFound { .. } => StatusCode::NOT_FOUND,
            ScoreError::Conflict(_) => StatusCode::CONFLICT,
            ScoreError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

impl WebServer {
    pub fn new(engine: Arc<ScoreEngine>, config: Arc<Config>) -> Self {
        Self { engine, config }
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        if !self.config.web.enabled {
            info!("Web API disabled");
            return Ok(());
        }

        let app = router(self.engine.clone());

        let addr = format!("{}:{}", self.config.web.address, self.config.web.port);
        info!("🌐 Web API listening on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app).await?;
        Ok(())
    }
}

fn router(engine: Arc<ScoreEngine>) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/link/:product_id", get(follow_link))
        .route("/api/rank/:criteria", get(api_rank))
        .route("/api/search", get(api_search))
        .route("/api/tags/:tag_name", get(api_tag))
        .route("/api/entity/:kind/:id", get(api_entity))
        .route("/api/stats", get(api_stats))
        .route("/api/decay/history", get(api_decay_history))
        .route("/metrics", get(prometheus_metrics))
        .with_state(AppState { engine })
}

/// Run a blocking store call off the async workers
async fn blocking<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&ScoreEngine) -> Result<T, ScoreError> + Send + 'static,
{
    let engine = state.engine.clone();
    tokio::task::spawn_blocking(move || f(engine.as_ref()))
        .await
        .map_err(|e| ApiError(ScoreError::Store(format!("worker failed: {}", e))))?
        .map_err(ApiError::from)
}

/// Outbound link: count the click, then redirect
async fn follow_link(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
) -> Result<Response, ApiError> {
    let url = blocking(&state, move |engine| engine.record_click(&product_id)).await?;
    Ok((StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, url)]).into_response())
}

async fn home(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    ranked(state, RankCriteria::Default).await
}

async fn api_rank(
    State(state): State<AppState>,
    Path(criteria): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    ranked(state, RankCriteria::parse(&criteria)).await
}

async fn ranked(state: AppState, criteria: RankCriteria) -> Result<Json<serde_json::Value>, ApiError> {
    let products = blocking(&state, move |engine| engine.ranked_listing(criteria)).await?;
    Ok(Json(serde_json::json!({
        "criteria": criteria,
        "products": products,
    })))
}

async fn api_search(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let query = params.q.clone();
    let products = blocking(&state, move |engine| engine.search_listing(&query)).await?;
    Ok(Json(serde_json::json!({
        "query": params.q,
        "products": products,
    })))
}

async fn api_tag(
    State(state): State<AppState>,
    Path(tag_name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let name = tag_name.clone();
    let products = blocking(&state, move |engine| engine.tag_listing(&name)).await?;
    Ok(Json(serde_json::json!({
        "tag": tag_name,
        "products": products,
    })))
}

/// Single tag or merchant, through the entity cache
async fn api_entity(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Some(kind) = EntityKind::parse(&kind) else {
        return Err(ApiError(ScoreError::not_found("entity kind", &kind)));
    };
    let entity = blocking(&state, move |engine| engine.references.get(kind, &id)).await?;
    Ok(Json(serde_json::json!(entity)))
}

async fn api_stats(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(state.engine.get_stats())
}

async fn api_decay_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryQuery>,
) -> Json<serde_json::Value> {
    let limit = params.limit.unwrap_or(30);
    Json(serde_json::json!({
        "ticks": state.engine.history.recent(limit),
        "last_tick_day": state.engine.ledger.last_tick(),
    }))
}

async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render_metrics(&state.engine),
    )
}
