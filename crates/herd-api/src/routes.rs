use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{delete, get, post};
use axum::{Extension, Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use herd_core::protocol::{
    DeltaResponse, HealthResponse, PushRequest, PushResponse, ResetResponse, StateBody,
};

use crate::auth::{extract_bearer_token, verify_token, AuthenticatedUser};
use crate::error::ApiError;
use crate::store::TodoStore;

#[derive(Clone)]
pub struct AppState {
    store: Arc<Mutex<TodoStore>>,
}

impl AppState {
    pub fn new(store: TodoStore) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/state", get(read_state))
        .route("/delta", get(read_delta))
        .route("/push", post(push))
        .route("/reset", delete(reset))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(health))
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now(),
    })
}

async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = {
        let token = extract_bearer_token(request.headers())?;
        let store = state.store.lock().await;
        verify_token(store.connection(), token)?
    };
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

async fn read_state(
    State(state): State<AppState>,
    _user: Extension<AuthenticatedUser>,
) -> Result<Json<StateBody>, ApiError> {
    let store = state.store.lock().await;
    Ok(Json(store.state()?))
}

#[derive(Debug, Deserialize)]
struct DeltaQuery {
    since: Option<String>,
}

async fn read_delta(
    State(state): State<AppState>,
    _user: Extension<AuthenticatedUser>,
    Query(query): Query<DeltaQuery>,
) -> Result<Json<DeltaResponse>, ApiError> {
    let since = query
        .since
        .ok_or_else(|| ApiError::bad_request("missing `since` query parameter"))?;
    let since = since
        .parse::<DateTime<Utc>>()
        .map_err(|error| ApiError::bad_request(format!("invalid `since` timestamp: {error}")))?;
    let store = state.store.lock().await;
    Ok(Json(store.delta(since)?))
}

async fn push(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    body: Result<Json<PushRequest>, JsonRejection>,
) -> Result<Json<PushResponse>, ApiError> {
    let Json(request) = body.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    let mut store = state.store.lock().await;
    Ok(Json(store.apply_push(&user.user_id, &request)?))
}

async fn reset(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<ResetResponse>, ApiError> {
    tracing::warn!(user = %user.user_id, "reset requested, wiping store");
    let mut store = state.store.lock().await;
    Ok(Json(store.reset()?))
}
