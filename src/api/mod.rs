use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::AppState;

pub mod handlers;

/// Build the admin API router.
/// All routes are relative; the caller mounts this under `/api/v1`.
pub fn api_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/wizard", post(handlers::begin_creation))
        .route("/wizard/expiration", post(handlers::choose_expiration))
        .route("/wizard/devices", post(handlers::choose_device_limit))
        .route("/keys", get(handlers::list_keys))
        .route("/keys/audit", get(handlers::audit_keys))
        .route("/keys/:id", delete(handlers::revoke_key))
        .route("/settings", get(handlers::show_settings))
        .layer(middleware::from_fn_with_state(state, admin_auth))
        .layer(TraceLayer::new_for_http())
        .fallback(fallback_404)
}

/// Full application router: health probes plus the admin API.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(readiness_check))
        .nest("/api/v1", api_router(state.clone()))
        .with_state(state)
}

async fn fallback_404() -> StatusCode {
    StatusCode::NOT_FOUND
}

async fn readiness_check(State(state): State<Arc<AppState>>) -> Result<&'static str, StatusCode> {
    state.registry.ping().await.map_err(|e| {
        tracing::warn!(error = %e, "readiness: registry unreachable");
        StatusCode::SERVICE_UNAVAILABLE
    })?;
    Ok("ok")
}

/// Middleware: validates `X-Admin-Key` header against the configured admin key.
/// Returns 401 if missing/invalid, 500 if no admin key is configured.
async fn admin_auth(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let provided_key = req
        .headers()
        .get("x-admin-key")
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            req.headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(|t| t.trim())
        });

    let expected = state.config.admin_key.as_deref().ok_or_else(|| {
        tracing::error!("KEEPER_ADMIN_KEY is not set");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    match provided_key {
        Some(k) if k == expected => Ok(next.run(req).await),
        Some(k) => {
            // never log the expected key or the full provided key
            let masked = if k.len() > 8 {
                format!("{}…{}", &k[..4], &k[k.len() - 4..])
            } else {
                "****".to_string()
            };
            tracing::warn!("admin API: invalid key (provided: '{}')", masked);
            Err(StatusCode::UNAUTHORIZED)
        }
        None => {
            tracing::warn!("admin API: missing X-Admin-Key header");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
