use std::time::Duration;

use super::*;
use crate::grid::{Slot, SlotError};
use crate::rate_limit::RateLimitError;
use crate::services::mask::SlotMask;
use crate::state::test_helpers;

fn temp_dir() -> std::path::PathBuf {
    std::env::temp_dir().join(format!("mosaic-routes-{}", uuid::Uuid::new_v4()))
}

// =============================================================================
// status mapping
// =============================================================================

#[test]
fn validation_errors_map_to_bad_request() {
    let slot = Slot::new(1).unwrap();
    for err in [
        ClaimError::InvalidSlot(SlotError::IndexOutOfRange(-1)),
        ClaimError::SlotNotEligible(slot),
        ClaimError::EmptyHandle,
        ClaimError::HandleTooLong { max: 32, len: 40 },
        ClaimError::NoteTooLong { max: 280, len: 300 },
    ] {
        assert_eq!(claim_error_to_status(&err), StatusCode::BAD_REQUEST, "{err}");
    }
}

#[test]
fn conflicts_map_to_conflict() {
    let slot = Slot::new(5).unwrap();
    assert_eq!(claim_error_to_status(&ClaimError::SlotTaken(slot)), StatusCode::CONFLICT);
    assert_eq!(claim_error_to_status(&ClaimError::HandleTaken("alice".into())), StatusCode::CONFLICT);
    assert_eq!(claim_error_to_status(&ClaimError::AvatarAlreadySet(uuid::Uuid::new_v4())), StatusCode::CONFLICT);
}

#[test]
fn avatar_errors_keep_their_own_status() {
    let err = ClaimError::Avatar(AvatarError::TooLarge { max: 1, len: 2 });
    assert_eq!(claim_error_to_status(&err), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(
        avatar_error_to_status(&AvatarError::UnsupportedType("text/plain".into())),
        StatusCode::UNSUPPORTED_MEDIA_TYPE
    );
    assert_eq!(
        avatar_error_to_status(&AvatarError::Timeout(Duration::from_secs(1))),
        StatusCode::GATEWAY_TIMEOUT
    );
}

#[test]
fn api_error_body_carries_code_and_retryable() {
    let err: ApiError = ClaimError::HandleTaken("alice".into()).into();
    assert_eq!(err.status, StatusCode::CONFLICT);
    assert_eq!(err.body.get(FRAME_CODE).and_then(|v| v.as_str()), Some("E_HANDLE_TAKEN"));
    assert_eq!(err.body.get(FRAME_RETRYABLE).and_then(serde_json::Value::as_bool), Some(false));
}

#[test]
fn rate_limit_maps_to_too_many_requests() {
    let err: ApiError = RateLimitError::PerClientExceeded { limit: 5, window_secs: 60 }.into();
    assert_eq!(err.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(err.body.get(FRAME_RETRYABLE).and_then(serde_json::Value::as_bool), Some(true));
}

#[test]
fn plain_error_is_not_retryable() {
    let err = ApiError::bad_request("E_FORM", "bad field");
    assert_eq!(err.body.get(FRAME_MESSAGE).and_then(|v| v.as_str()), Some("bad field"));
    assert_eq!(err.body.get(FRAME_RETRYABLE).and_then(serde_json::Value::as_bool), Some(false));
}

// =============================================================================
// served routes
// =============================================================================

#[tokio::test]
async fn healthz_is_ok() {
    let addr = test_server::spawn(test_helpers::test_app_state(), temp_dir()).await;
    let resp = reqwest::get(format!("http://{addr}/healthz")).await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
}

#[tokio::test]
async fn index_page_is_served_at_root() {
    let addr = test_server::spawn(test_helpers::test_app_state(), temp_dir()).await;
    let resp = reqwest::get(format!("http://{addr}/")).await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let body = resp.text().await.unwrap();
    assert!(body.contains("/api/feed"));
}

#[tokio::test]
async fn slots_reports_every_cell_with_eligibility() {
    let mask = SlotMask::from_fn(|slot| slot.y() < 10);
    let state = test_helpers::test_app_state_with(
        std::sync::Arc::new(crate::services::claim_store::MemoryClaimStore::new()),
        mask,
    );
    let addr = test_server::spawn(state, temp_dir()).await;

    let body: serde_json::Value = reqwest::get(format!("http://{addr}/api/slots"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["grid_size"], 20);
    assert_eq!(body["eligible_count"], 200);
    assert_eq!(body["claimed_count"], 0);
    let slots = body["slots"].as_array().unwrap();
    assert_eq!(slots.len(), 400);
    assert_eq!(slots[0]["eligible"], true);
    assert_eq!(slots[399]["eligible"], false);
    assert_eq!(slots[21]["x"], 1);
    assert_eq!(slots[21]["y"], 1);
    assert!(slots[21]["claim"].is_null());
}

#[tokio::test]
async fn unknown_avatar_is_not_found() {
    let addr = test_server::spawn(test_helpers::test_app_state(), temp_dir()).await;
    let resp = reqwest::get(format!("http://{addr}/avatars/missing.png")).await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
}
