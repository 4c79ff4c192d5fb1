//! API Handlers
//!
//! HTTP request handlers exposing a [`CacheClient`] over JSON.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::cache::CacheClient;
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::models::{
    DeleteResponse, ExistsResponse, GetResponse, HealthResponse, SetRequest, SetResponse,
    StatsResponse,
};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Shared cache client
    pub cache: Arc<CacheClient>,
}

impl AppState {
    /// Creates a new AppState around an existing client.
    ///
    /// Request values are arbitrary JSON documents, which only a
    /// self-describing codec can read back, so a binary-only client is refused.
    pub fn new(cache: CacheClient) -> Result<Self> {
        if !cache.codec().is_self_describing() {
            return Err(CacheError::invalid(format!(
                "codec '{}' cannot serve JSON documents; use 'auto' or 'json'",
                cache.codec()
            )));
        }
        Ok(Self {
            cache: Arc::new(cache),
        })
    }

    /// Creates a new AppState from configuration.
    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        Self::new(CacheClient::from_config(config)?)
    }
}

/// Handler for PUT /set
///
/// Stores a JSON value with optional TTL.
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    state.cache.set(&req.key, &req.value, req.ttl).await?;
    Ok(Json(SetResponse::new(req.key)))
}

/// Handler for GET /get/:key
///
/// Returns 404 when the key is absent or expired.
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response> {
    let response = match state.cache.get::<serde_json::Value>(&key).await? {
        Some(value) => Json(GetResponse::new(key, value)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("Key not found: {}", key) })),
        )
            .into_response(),
    };
    Ok(response)
}

/// Handler for GET /exists/:key
pub async fn exists_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<ExistsResponse>> {
    let exists = state.cache.exists(&key).await?;
    Ok(Json(ExistsResponse::new(key, exists)))
}

/// Handler for DELETE /del/:key
///
/// Idempotent: deleting a missing key still answers 200 with `deleted: false`.
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    let deleted = state.cache.delete(&key).await?;
    Ok(Json(DeleteResponse::new(key, deleted)))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::from(state.cache.stats().await))
}

/// Handler for GET /health
///
/// Pings the backend; answers 503 when it cannot be reached.
pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let healthy = state.cache.ping().await.unwrap_or(false);
    let response = HealthResponse::new(healthy, state.cache.backend().name());
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}
