//! Grid snapshot route.

use std::collections::HashMap;

use axum::extract::State;
use axum::response::Json;
use serde::Serialize;

use crate::grid::{GRID_SIZE, Slot, TOTAL_SLOTS};
use crate::routes::ApiError;
use crate::services::claim::Claim;
use crate::state::AppState;

#[derive(Serialize)]
pub struct SlotView {
    pub slot: Slot,
    pub x: u16,
    pub y: u16,
    pub eligible: bool,
    pub claim: Option<Claim>,
}

#[derive(Serialize)]
pub struct GridResponse {
    pub grid_size: u16,
    pub eligible_count: usize,
    pub claimed_count: usize,
    pub slots: Vec<SlotView>,
}

/// `GET /api/slots`: every slot with its eligibility and current claim.
pub async fn list_slots(State(state): State<AppState>) -> Result<Json<GridResponse>, ApiError> {
    let claims = state.claims.list(usize::from(TOTAL_SLOTS)).await?;
    Ok(Json(grid_view(&state, claims)))
}

pub(crate) fn grid_view(state: &AppState, claims: Vec<Claim>) -> GridResponse {
    let claimed_count = claims.len();
    let mut by_slot: HashMap<Slot, Claim> = claims.into_iter().map(|c| (c.slot, c)).collect();

    let slots = Slot::all()
        .map(|slot| SlotView {
            slot,
            x: slot.x(),
            y: slot.y(),
            eligible: state.mask.is_eligible(slot),
            claim: by_slot.remove(&slot),
        })
        .collect();

    GridResponse { grid_size: GRID_SIZE, eligible_count: state.mask.eligible_count(), claimed_count, slots }
}
