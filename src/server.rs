//! HTTP API.
//!
//! Serves form summaries, normalized submission pages, and source discovery
//! as JSON.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/_api/forms?namespace=` | Per-form summaries of a namespace |
//! | `GET`  | `/_api/submissions?namespace=&formId=&limit=&cursor=&status=&searchQuery=` | One page of normalized submissions |
//! | `GET`  | `/_api/sources` | Probe the configured candidates |
//! | `GET`  | `/_api/collections` | Every backend collection with its row count |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! Every failure answers with a complete JSON envelope:
//!
//! ```json
//! { "error": "namespace is required" }
//! ```
//!
//! `400` for missing or malformed parameters (a bad cursor included), `500`
//! when the backend fails.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::discovery::{resolve_candidates, DiscoveryResult, SourceDiscovery};
use crate::error::{BackendError, GatewayError};
use crate::forms::list_forms;
use crate::gateway::{build_gateway, QueryGateway};
use crate::models::{
    CollectionSummary, FormSummary, NormalizedSubmission, QueryOptions, QueryResult, SortOrder, SubmissionStatus,
};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    gateway: Arc<QueryGateway>,
}

impl AppState {
    pub fn new(config: Config, gateway: Arc<QueryGateway>) -> Self {
        Self {
            config: Arc::new(config),
            gateway,
        }
    }
}

/// Builds the router with permissive CORS.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/_api/forms", get(handle_forms))
        .route("/_api/submissions", get(handle_submissions))
        .route("/_api/sources", get(handle_sources))
        .route("/_api/collections", get(handle_collections))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` using the configured backend.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let gateway = Arc::new(build_gateway(config)?);
    run_server_with_gateway(config, gateway).await
}

/// Like [`run_server`], but with a caller-supplied gateway.
pub async fn run_server_with_gateway(
    config: &Config,
    gateway: Arc<QueryGateway>,
) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let app = router(AppState::new(config.clone(), gateway));

    println!("formdeck listening on http://{}", bind_addr);
    tracing::info!(bind = %bind_addr, "Server started");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        message: message.into(),
    }
}

impl From<GatewayError> for AppError {
    fn from(e: GatewayError) -> Self {
        // A query the backend cannot express came from the caller (bad cursor).
        if let GatewayError::Backend {
            error: BackendError::QueryBuild(_),
            ..
        } = &e
        {
            tracing::debug!(error = %e, "Rejected query");
            return bad_request(e.to_string());
        }
        tracing::error!(error = %e, "Request failed");
        AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: e.to_string(),
        }
    }
}

fn required(value: Option<String>, name: &str) -> Result<String, AppError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| bad_request(format!("{} is required", name)))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /_api/forms ============

#[derive(Deserialize)]
struct FormsParams {
    namespace: Option<String>,
}

async fn handle_forms(
    State(state): State<AppState>,
    Query(params): Query<FormsParams>,
) -> Result<Json<QueryResult<FormSummary>>, AppError> {
    let namespace = required(params.namespace, "namespace")?;
    let forms = list_forms(&state.gateway, &namespace).await?;
    Ok(Json(QueryResult::complete(forms)))
}

// ============ GET /_api/submissions ============

/// Every parameter arrives as text so malformed values get our own envelope.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmissionsParams {
    namespace: Option<String>,
    form_id: Option<String>,
    limit: Option<String>,
    cursor: Option<String>,
    status: Option<String>,
    search_query: Option<String>,
    sort_by: Option<String>,
    sort_order: Option<String>,
}

fn submission_options(params: SubmissionsParams) -> Result<QueryOptions, AppError> {
    let namespace = required(params.namespace, "namespace")?;
    let mut options = QueryOptions::namespace(namespace)
        .with_cursor(params.cursor)
        .with_search(params.search_query);

    // An unparseable limit falls back to the default.
    if let Some(limit) = params.limit.and_then(|l| l.trim().parse::<usize>().ok()) {
        options = options.with_limit(limit);
    }
    if let Some(form_id) = params.form_id.filter(|f| !f.trim().is_empty()) {
        options = options.with_filter("formId", form_id);
    }
    if let Some(status) = params.status.filter(|s| !s.trim().is_empty()) {
        let status: SubmissionStatus = status.parse().map_err(bad_request)?;
        options = options.with_filter("status", status.backend_value());
    }

    let order = match params.sort_order.filter(|o| !o.trim().is_empty()) {
        Some(order) => order.parse::<SortOrder>().map_err(bad_request)?,
        None => SortOrder::Desc,
    };
    let field = params
        .sort_by
        .filter(|f| !f.trim().is_empty())
        .unwrap_or_else(|| "createdAt".to_string());
    Ok(options.sorted_by(field, order))
}

async fn handle_submissions(
    State(state): State<AppState>,
    Query(params): Query<SubmissionsParams>,
) -> Result<Json<QueryResult<NormalizedSubmission>>, AppError> {
    let options = submission_options(params)?;
    let page = state.gateway.query_submissions(&options).await?;
    if page.dropped > 0 {
        tracing::debug!(
            source = %options.source,
            dropped = page.dropped,
            "Dropped invalid submissions"
        );
    }
    Ok(Json(page.result))
}

// ============ GET /_api/sources ============

async fn handle_sources(State(state): State<AppState>) -> Json<DiscoveryResult> {
    let candidates = resolve_candidates(&state.config, &state.gateway).await;
    let discovery = SourceDiscovery::from_config(&state.config, state.gateway.clone());
    Json(discovery.discover(&candidates, &CancellationToken::new()).await)
}

// ============ GET /_api/collections ============

async fn handle_collections(
    State(state): State<AppState>,
) -> Result<Json<QueryResult<CollectionSummary>>, AppError> {
    let collections = state.gateway.list_collections().await?;
    Ok(Json(QueryResult::complete(collections)))
}
