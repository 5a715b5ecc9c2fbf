//! Claim routes: submit, read back, and attach an avatar later.

use std::net::SocketAddr;

use axum::extract::multipart::MultipartError;
use axum::extract::{ConnectInfo, Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::grid::{Slot, TOTAL_SLOTS};
use crate::routes::ApiError;
use crate::services::avatar::AvatarUpload;
use crate::services::claim::{self, Claim, ClaimError, ClaimRequest};
use crate::state::AppState;

const DEFAULT_LIST_LIMIT: usize = 100;

#[derive(Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

/// `GET /api/claims`: most recent claims first.
pub async fn list_claims(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Claim>>, ApiError> {
    let limit = clamp_limit(query.limit);
    Ok(Json(state.claims.list(limit).await?))
}

pub(crate) fn clamp_limit(limit: Option<usize>) -> usize {
    limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, usize::from(TOTAL_SLOTS))
}

/// `GET /api/claims/slot/{slot}`: the claim holding one slot.
pub async fn get_claim_by_slot(
    State(state): State<AppState>,
    Path(slot): Path<i64>,
) -> Result<Json<Claim>, ApiError> {
    let slot = Slot::new(slot).map_err(ClaimError::from)?;
    let Some(claim) = state.claims.get_by_slot(slot).await? else {
        return Err(ApiError::plain(StatusCode::NOT_FOUND, "E_SLOT_FREE", format!("slot {slot} is not claimed")));
    };
    Ok(Json(claim))
}

/// `POST /api/claims`: multipart form with `slot` (or `x` and `y`), `handle`,
/// `note`, and an optional `avatar` file.
pub async fn create_claim(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Claim>), ApiError> {
    state.rate_limiter.check_and_record(addr.ip())?;

    let request = read_claim_form(multipart).await?;
    info!(slot = request.slot, client = %addr.ip(), has_avatar = request.avatar.is_some(), "claim submitted");

    let claim = claim::submit_claim(&state, request).await?;
    Ok((StatusCode::CREATED, Json(claim)))
}

/// `POST /api/claims/{id}/avatar`: multipart form with one `avatar` file.
pub async fn attach_avatar(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(claim_id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<Claim>, ApiError> {
    state.rate_limiter.check_and_record(addr.ip())?;

    let request = read_claim_form(multipart).await?;
    let Some(upload) = request.avatar else {
        return Err(ApiError::bad_request("E_AVATAR_REQUIRED", "avatar file is required"));
    };

    let claim = claim::attach_avatar(&state, claim_id, upload).await?;
    Ok(Json(claim))
}

// =============================================================================
// FORM PARSING
// =============================================================================

async fn read_claim_form(mut multipart: Multipart) -> Result<ClaimRequest, ApiError> {
    let mut request = ClaimRequest::default();
    let (mut slot, mut x, mut y) = (None, None, None);

    while let Some(field) = multipart.next_field().await.map_err(form_error)? {
        let name = field.name().unwrap_or_default().to_owned();
        match name.as_str() {
            "slot" | "x" | "y" => {
                let raw = field.text().await.map_err(form_error)?;
                let value: i64 = raw
                    .trim()
                    .parse()
                    .map_err(|_| ApiError::bad_request("E_FORM", format!("{name} must be an integer, got {raw:?}")))?;
                match name.as_str() {
                    "slot" => slot = Some(value),
                    "x" => x = Some(value),
                    _ => y = Some(value),
                }
            }
            "handle" => request.handle = field.text().await.map_err(form_error)?,
            "note" => request.note = field.text().await.map_err(form_error)?,
            "avatar" => {
                let file_name = field.file_name().unwrap_or_default().to_owned();
                let content_type = field.content_type().map(str::to_owned);
                let bytes = field.bytes().await.map_err(form_error)?;
                // Browsers send an empty part when no file was chosen.
                if !(file_name.is_empty() && bytes.is_empty()) {
                    request.avatar = Some(AvatarUpload { file_name, content_type, bytes: bytes.to_vec() });
                }
            }
            _ => {}
        }
    }

    // `slot` wins over `x`/`y`; with neither, validation rejects -1 as out of range.
    request.slot = match (slot, x, y) {
        (Some(index), _, _) => index,
        (None, Some(x), Some(y)) => i64::from(Slot::from_xy(x, y).map_err(ClaimError::from)?.index()),
        (None, Some(_), None) | (None, None, Some(_)) => {
            return Err(ApiError::bad_request("E_FORM", "x and y must both be given"));
        }
        (None, None, None) => -1,
    };
    Ok(request)
}

fn form_error(err: MultipartError) -> ApiError {
    ApiError::plain(err.status(), "E_FORM", err.body_text())
}

#[cfg(test)]
#[path = "claims_test.rs"]
mod tests;
