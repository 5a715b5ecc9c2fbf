//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! JSON API under `/api`, the live feed websocket at `/api/feed`, stored
//! avatars at `/avatars`, and the static page as the fallback. JSON and
//! static responses are gzip-compressed; the websocket route is kept out of
//! the compression layer.

pub mod claims;
pub mod slots;
pub mod ws;

use std::path::Path;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::frame::{Data, ErrorCode, FRAME_CODE, FRAME_MESSAGE, FRAME_RETRYABLE, error_data};
use crate::rate_limit::RateLimitError;
use crate::services::avatar::{AVATAR_URL_PREFIX, AvatarError};
use crate::services::claim::ClaimError;
use crate::state::AppState;

/// Room for form fields and multipart framing on top of the avatar itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Build the full application router.
pub fn app(state: AppState, static_dir: &Path, avatar_dir: &Path) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = state.upload.max_bytes.saturating_add(MULTIPART_OVERHEAD_BYTES);

    let json_api = Router::new()
        .route("/api/slots", get(slots::list_slots))
        .route("/api/claims", get(claims::list_claims).post(claims::create_claim))
        .route("/api/claims/slot/{slot}", get(claims::get_claim_by_slot))
        .route("/api/claims/{id}/avatar", post(claims::attach_avatar))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CompressionLayer::new());

    let static_files = Router::new()
        .nest_service(AVATAR_URL_PREFIX, ServeDir::new(avatar_dir))
        .fallback_service(ServeDir::new(static_dir).append_index_html_on_directories(true))
        .layer(CompressionLayer::new());

    Router::new()
        .merge(json_api)
        .route("/api/feed", get(ws::handle_feed))
        .route("/healthz", get(healthz))
        .with_state(state)
        .merge(static_files)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

// =============================================================================
// ERRORS
// =============================================================================

/// Error response: mapped status plus `{ code, message, retryable }`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: Data,
}

impl ApiError {
    pub fn new(status: StatusCode, err: &(impl ErrorCode + ?Sized)) -> Self {
        Self { status, body: error_data(err) }
    }

    /// Error without a typed source, e.g. malformed form input.
    pub fn plain(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        let mut body = Data::new();
        body.insert(FRAME_CODE.into(), serde_json::Value::String(code.into()));
        body.insert(FRAME_MESSAGE.into(), serde_json::Value::String(message.into()));
        body.insert(FRAME_RETRYABLE.into(), serde_json::Value::Bool(false));
        Self { status, body }
    }

    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::plain(StatusCode::BAD_REQUEST, code, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

pub(crate) fn claim_error_to_status(err: &ClaimError) -> StatusCode {
    match err {
        ClaimError::InvalidSlot(_)
        | ClaimError::SlotNotEligible(_)
        | ClaimError::EmptyHandle
        | ClaimError::HandleTooLong { .. }
        | ClaimError::NoteTooLong { .. } => StatusCode::BAD_REQUEST,
        ClaimError::SlotTaken(_) | ClaimError::HandleTaken(_) | ClaimError::AvatarAlreadySet(_) => {
            StatusCode::CONFLICT
        }
        ClaimError::NotFound(_) => StatusCode::NOT_FOUND,
        ClaimError::Avatar(e) => avatar_error_to_status(e),
        ClaimError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn avatar_error_to_status(err: &AvatarError) -> StatusCode {
    match err {
        AvatarError::UnsupportedType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        AvatarError::Empty | AvatarError::ForeignUrl(_) => StatusCode::BAD_REQUEST,
        AvatarError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        AvatarError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        AvatarError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<ClaimError> for ApiError {
    fn from(err: ClaimError) -> Self {
        let status = claim_error_to_status(&err);
        if status.is_server_error() {
            error!(error = %err, code = err.error_code(), "claim request failed");
        }
        Self::new(status, &err)
    }
}

impl From<RateLimitError> for ApiError {
    fn from(err: RateLimitError) -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, &err)
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
