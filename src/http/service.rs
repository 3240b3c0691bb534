//! Route handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::ratelimit::{AdmissionBackend, CallerId, Decision};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    backend: Arc<dyn AdmissionBackend>,
}

impl AppState {
    pub fn new(backend: Arc<dyn AdmissionBackend>) -> Self {
        Self { backend }
    }
}

/// Body of `POST /rate-limited`.
#[derive(Debug, Deserialize)]
pub struct AttemptRequest {
    pub caller_id: CallerId,
}

/// Build the application router.
pub fn router(backend: Arc<dyn AdmissionBackend>) -> Router {
    Router::new()
        .route("/", get(info))
        .route("/rate-limited", post(rate_limited))
        .route("/stats", get(stats))
        .route("/callers/{caller_id}/usage", get(caller_usage))
        .with_state(AppState::new(backend))
}

/// Consume one admission for the caller.
async fn rate_limited(
    State(state): State<AppState>,
    Json(request): Json<AttemptRequest>,
) -> Response {
    let caller = request.caller_id;

    let decision = state.backend.attempt(&caller);
    match decision {
        Decision::Admitted => {
            let remaining = state.backend.remaining(&caller);
            debug!(caller = %caller, remaining = remaining, "Request admitted");

            Json(json!({
                "message": "Request admitted",
                "caller_id": caller,
                "remaining": remaining,
            }))
            .into_response()
        }
        Decision::WindowExceeded => {
            let retry_after = retry_after_secs(&*state.backend);
            warn!(
                caller = %caller,
                retry_after_secs = retry_after,
                "Window capacity exceeded"
            );

            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({
                    "error": decision.code(),
                    "message": "Too many requests. Please try again later.",
                    "caller_id": caller,
                    "retry_after_secs": retry_after,
                })),
            )
                .into_response();
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
            response
        }
        Decision::QuotaExceeded(exceeded) => {
            warn!(caller = %caller, quota = exceeded.quota, "Quota exceeded");

            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({
                    "error": decision.code(),
                    "message": format!(
                        "Too many requests for caller {}. Maximum of {} admissions reached.",
                        caller, exceeded.quota
                    ),
                    "caller_id": caller,
                    "quota": exceeded.quota,
                })),
            )
                .into_response()
        }
    }
}

/// Whole seconds a rejected caller should wait, rounding the window up.
fn retry_after_secs(backend: &dyn AdmissionBackend) -> u64 {
    backend.window().as_secs_f64().ceil() as u64
}

/// Global configuration and caller count. Consumes nothing.
async fn stats(State(state): State<AppState>) -> Response {
    Json(state.backend.stats()).into_response()
}

/// Usage for one caller. Consumes nothing, but evicts expired records.
///
/// A segment in canonical integer form addresses an integer caller; anything
/// else addresses the string caller of that exact text.
async fn caller_usage(State(state): State<AppState>, Path(caller_id): Path<String>) -> Response {
    let caller = CallerId::from_segment(&caller_id);
    let used = state.backend.used(&caller);
    let available = state.backend.remaining(&caller);

    Json(json!({
        "caller_id": caller,
        "used": used,
        "available": available,
        "capacity": state.backend.capacity(),
    }))
    .into_response()
}

async fn info() -> Response {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "description": env!("CARGO_PKG_DESCRIPTION"),
        "endpoints": {
            "POST /rate-limited": "Consume one admission for a caller",
            "GET /stats": "Limiter configuration and tracked caller count",
            "GET /callers/{caller_id}/usage": "Live usage for one caller",
        },
    }))
    .into_response()
}
