//! HTTP server for joinable column search.
//!
//! The index is built before the listener binds; a bootstrap failure stops
//! `fod serve` instead of serving with a partial index.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Status, version, index generation and size |
//! | `POST` | `/lsh/query` | Raw LSH candidates for `{seed, minhash}` |
//! | `GET`  | `/api/joinable-column-search` | Ranked joinable columns for `?id=` |
//! | `POST` | `/admin/rebuild` | Rebuild the index and swap it in |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "invalid input: ..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404),
//! `index_unavailable` (503), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted for browser clients.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use findopendata_core::minhash::MinHashSignature;
use findopendata_core::query::{JoinQuery, JoinabilityService, JoinableColumn};
use findopendata_core::store::SketchStore;
use findopendata_core::Error;

use crate::config::Config;
use crate::db;
use crate::query::build_service;

struct AppState<S> {
    service: Arc<JoinabilityService<S>>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
        }
    }
}

/// `fod serve`: build the index, then serve until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let service = Arc::new(build_service(config, pool).await?);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    println!("Join search server listening on http://{}", config.server.bind);
    info!(bind = %config.server.bind, "server started");

    axum::serve(listener, router(service)).await?;
    Ok(())
}

/// Routes over an already-built service.
pub fn router<S: SketchStore + 'static>(service: Arc<JoinabilityService<S>>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health::<S>))
        .route("/lsh/query", post(handle_lsh_query::<S>))
        .route("/api/joinable-column-search", get(handle_join_search::<S>))
        .route("/admin/rebuild", post(handle_rebuild::<S>))
        .layer(cors)
        .with_state(AppState { service })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn index_unavailable(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::SERVICE_UNAVAILABLE,
        code: "index_unavailable".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let msg = err.to_string();
        match err {
            Error::Input(_) | Error::IncompatibleSignature { .. } => bad_request(msg),
            Error::NotFound(_) => not_found(msg),
            Error::IndexUnavailable(_) => index_unavailable(msg),
            Error::Store(_) => {
                error!(error = %msg, "store failure");
                internal(msg)
            }
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    index_generation: u64,
    indexed: usize,
}

async fn handle_health<S: SketchStore + 'static>(
    State(state): State<AppState<S>>,
) -> Json<HealthResponse> {
    let current = state.service.current();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        index_generation: current.as_ref().map(|g| g.generation).unwrap_or(0),
        indexed: current.as_ref().map(|g| g.len()).unwrap_or(0),
    })
}

// ============ POST /lsh/query ============

#[derive(Deserialize)]
struct LshQueryRequest {
    seed: u64,
    #[serde(alias = "hashvalues")]
    minhash: Vec<u64>,
}

async fn handle_lsh_query<S: SketchStore + 'static>(
    State(state): State<AppState<S>>,
    Json(req): Json<LshQueryRequest>,
) -> Result<Json<Vec<String>>, AppError> {
    let signature = MinHashSignature::new(req.seed, req.minhash);
    Ok(Json(state.service.candidates(&signature)?))
}

// ============ GET /api/joinable-column-search ============

#[derive(Deserialize)]
struct JoinSearchParams {
    #[serde(default)]
    id: String,
    source: Option<String>,
    limit: Option<usize>,
}

async fn handle_join_search<S: SketchStore + 'static>(
    State(state): State<AppState<S>>,
    Query(params): Query<JoinSearchParams>,
) -> Result<Json<Vec<JoinableColumn>>, AppError> {
    let id = params.id.trim();
    if id.is_empty() {
        return Ok(Json(Vec::new()));
    }
    let results = state
        .service
        .query(&JoinQuery {
            id: id.to_string(),
            source_filter: params.source.filter(|s| !s.is_empty()),
            limit: params.limit,
        })
        .await?;
    Ok(Json(results))
}

// ============ POST /admin/rebuild ============

#[derive(Serialize)]
struct RebuildResponse {
    generation: u64,
    indexed: usize,
    scanned: usize,
    filtered: usize,
    bands: usize,
    rows: usize,
}

async fn handle_rebuild<S: SketchStore + 'static>(
    State(state): State<AppState<S>>,
) -> Result<Json<RebuildResponse>, AppError> {
    let built = state.service.rebuild().await?;
    let params = built.params();
    Ok(Json(RebuildResponse {
        generation: built.generation,
        indexed: built.len(),
        scanned: built.scanned,
        filtered: built.filtered,
        bands: params.bands,
        rows: params.rows,
    }))
}
