//! Management HTTP API over the search registry.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/health` | Liveness plus seen-set store reachability |
//! | `GET` | `/api/v1/searches` | Registered searches |
//! | `POST` | `/api/v1/searches` | Register a search (effective next tick) |
//! | `DELETE` | `/api/v1/searches/:key` | Stop polling a search |

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::warn;

use jobwatch_core::{SearchDefinition, SearchKey, SeenStore};
use jobwatch_monitor::SearchRegistry;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub registry: SearchRegistry,
    pub store: Arc<dyn SeenStore>,
}

impl AppState {
    pub fn new(registry: SearchRegistry, store: Arc<dyn SeenStore>) -> Self {
        Self { registry, store }
    }
}

/// Build the management router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/searches", get(list_searches).post(create_search))
        .route("/api/v1/searches/:key", delete(delete_search))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
}

impl From<jobwatch_core::Error> for ApiError {
    fn from(err: jobwatch_core::Error) -> Self {
        match err {
            jobwatch_core::Error::InvalidSearch(msg) => ApiError::BadRequest(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(serde_json::json!({
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

/// A registered search as returned by the API.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchView {
    pub key: SearchKey,
    pub query: String,
    #[serde(default)]
    pub location: Option<String>,
    /// Postings already notified for this search; absent if the store is down.
    #[serde(default)]
    pub seen: Option<u64>,
}

impl SearchView {
    async fn load(search: SearchDefinition, store: &dyn SeenStore) -> Self {
        let key = search.key();
        let seen = match store.count(&key).await {
            Ok(count) => Some(count),
            Err(e) => {
                warn!(search = %key, error = %e, "Failed to count seen postings");
                None
            }
        };
        Self {
            key,
            query: search.query,
            location: search.location,
            seen,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateSearchRequest {
    pub query: String,
    #[serde(default)]
    pub location: Option<String>,
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let (status, store) = match state.store.ping().await {
        Ok(()) => (StatusCode::OK, "ok".to_string()),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    };
    let healthy = status == StatusCode::OK;

    (
        status,
        Json(serde_json::json!({
            "status": if healthy { "healthy" } else { "degraded" },
            "version": env!("CARGO_PKG_VERSION"),
            "store": store,
            "searches": state.registry.len().await,
        })),
    )
}

async fn list_searches(State(state): State<AppState>) -> Json<Vec<SearchView>> {
    let mut views = Vec::new();
    for search in state.registry.list().await {
        views.push(SearchView::load(search, state.store.as_ref()).await);
    }
    Json(views)
}

async fn create_search(
    State(state): State<AppState>,
    Json(body): Json<CreateSearchRequest>,
) -> Result<(StatusCode, Json<SearchView>), ApiError> {
    let search = state
        .registry
        .add(&body.query, body.location.as_deref())
        .await?;
    let view = SearchView::load(search, state.store.as_ref()).await;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn delete_search(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<StatusCode, ApiError> {
    let key = SearchKey::from(key.as_str());
    if state.registry.remove(&key).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Search '{key}' is not registered")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobwatch_core::Error;

    #[test]
    fn test_invalid_search_maps_to_bad_request() {
        let err = ApiError::from(Error::InvalidSearch("query must not be empty".into()));
        assert!(matches!(err, ApiError::BadRequest(_)));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_store_errors_map_to_internal() {
        let err = ApiError::from(Error::StoreUnavailable("connection refused".into()));
        assert_eq!(err.to_string(), "Store unavailable: connection refused");
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
