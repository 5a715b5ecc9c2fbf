//! Claim service: validation, the uniqueness transaction and fan-out.
//!
//! DESIGN
//! ======
//! A claim binds one slot to one normalized handle. Both are unique: the
//! store checks the slot key and the handle key inside a single atomic unit
//! and writes both or neither. Conflicts surface to the caller as
//! [`ClaimError::SlotTaken`] / [`ClaimError::HandleTaken`] and are never
//! retried here; the visitor picks another slot or handle.
//!
//! ERROR HANDLING
//! ==============
//! Avatars are uploaded before the transaction so a slow upload never holds
//! row locks. If the transaction then rejects the claim, the uploaded object
//! is removed best-effort; a failed cleanup is logged and otherwise ignored.

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::frame::{Data, ErrorCode, Frame};
use crate::grid::{Slot, SlotError};
use crate::services::avatar::{self, AvatarError, AvatarUpload};
use crate::services::handle::{MAX_HANDLE_LEN, bare_handle, display_handle, normalize_handle};
use crate::services::mask::SlotMask;
use crate::state::AppState;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ClaimError {
    #[error(transparent)]
    InvalidSlot(#[from] SlotError),
    #[error("slot {0} is not part of the mosaic")]
    SlotNotEligible(Slot),
    #[error("handle is required")]
    EmptyHandle,
    #[error("handle is {len} characters, limit is {max}")]
    HandleTooLong { max: usize, len: usize },
    #[error("note is {len} characters, limit is {max}")]
    NoteTooLong { max: usize, len: usize },
    #[error("slot {0} is already claimed")]
    SlotTaken(Slot),
    #[error("handle @{0} has already claimed a slot")]
    HandleTaken(String),
    #[error("claim not found: {0}")]
    NotFound(Uuid),
    #[error("claim {0} already has an avatar")]
    AvatarAlreadySet(Uuid),
    #[error(transparent)]
    Avatar(#[from] AvatarError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ErrorCode for ClaimError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidSlot(_) => "E_SLOT_INVALID",
            Self::SlotNotEligible(_) => "E_SLOT_NOT_ELIGIBLE",
            Self::EmptyHandle => "E_HANDLE_REQUIRED",
            Self::HandleTooLong { .. } => "E_HANDLE_TOO_LONG",
            Self::NoteTooLong { .. } => "E_NOTE_TOO_LONG",
            Self::SlotTaken(_) => "E_SLOT_TAKEN",
            Self::HandleTaken(_) => "E_HANDLE_TAKEN",
            Self::NotFound(_) => "E_CLAIM_NOT_FOUND",
            Self::AvatarAlreadySet(_) => "E_AVATAR_ALREADY_SET",
            Self::Avatar(e) => e.error_code(),
            Self::Database(_) => "E_DATABASE",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Avatar(e) => e.retryable(),
            Self::Database(_) => true,
            _ => false,
        }
    }
}

/// A stored claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Claim {
    pub id: Uuid,
    pub slot: Slot,
    /// Display form, e.g. `@SentientAGI`.
    pub handle: String,
    /// Normalized uniqueness key, e.g. `sentientagi`.
    pub handle_id: String,
    pub note: String,
    pub avatar_url: Option<String>,
    pub created_at_ms: i64,
}

/// A validated claim ready for the uniqueness transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewClaim {
    pub slot: Slot,
    pub handle: String,
    pub handle_id: String,
    pub note: String,
    pub avatar_url: Option<String>,
}

/// Raw form input.
#[derive(Debug, Clone, Default)]
pub struct ClaimRequest {
    pub slot: i64,
    pub handle: String,
    pub note: String,
    pub avatar: Option<AvatarUpload>,
}

/// Persistence for claims. Implementations must make [`ClaimStore::claim`]
/// atomic across the slot key and the handle key.
#[async_trait::async_trait]
pub trait ClaimStore: Send + Sync {
    /// Check both keys and insert the claim, or fail with a conflict.
    ///
    /// # Errors
    ///
    /// [`ClaimError::SlotTaken`] / [`ClaimError::HandleTaken`] on conflict,
    /// [`ClaimError::Database`] on storage failure.
    async fn claim(&self, new: NewClaim) -> Result<Claim, ClaimError>;

    /// Most recent claims first.
    ///
    /// # Errors
    ///
    /// Returns [`ClaimError::Database`] on storage failure.
    async fn list(&self, limit: usize) -> Result<Vec<Claim>, ClaimError>;

    /// # Errors
    ///
    /// Returns [`ClaimError::Database`] on storage failure.
    async fn get_by_slot(&self, slot: Slot) -> Result<Option<Claim>, ClaimError>;

    /// Attach an avatar to a claim that has none yet and record the change.
    ///
    /// # Errors
    ///
    /// [`ClaimError::NotFound`] if the claim does not exist,
    /// [`ClaimError::AvatarAlreadySet`] if it already carries an avatar.
    async fn set_avatar(&self, claim_id: Uuid, avatar_url: &str) -> Result<Claim, ClaimError>;
}

// =============================================================================
// VALIDATION
// =============================================================================

/// Validate raw form fields. The avatar is handled separately.
///
/// # Errors
///
/// Returns the first failing rule: slot range, slot eligibility, handle
/// presence and length, then note length (counted in characters).
pub fn validate(
    slot: i64,
    handle: &str,
    note: &str,
    mask: &SlotMask,
    note_max_chars: usize,
) -> Result<NewClaim, ClaimError> {
    let slot = Slot::new(slot)?;
    if !mask.is_eligible(slot) {
        return Err(ClaimError::SlotNotEligible(slot));
    }

    let handle_id = normalize_handle(handle);
    if handle_id.is_empty() {
        return Err(ClaimError::EmptyHandle);
    }
    let handle_len = bare_handle(handle).chars().count();
    if handle_len > MAX_HANDLE_LEN {
        return Err(ClaimError::HandleTooLong { max: MAX_HANDLE_LEN, len: handle_len });
    }

    let note = note.trim();
    let len = note.chars().count();
    if len > note_max_chars {
        return Err(ClaimError::NoteTooLong { max: note_max_chars, len });
    }

    Ok(NewClaim { slot, handle: display_handle(handle), handle_id, note: note.to_owned(), avatar_url: None })
}

// =============================================================================
// OPERATIONS
// =============================================================================

/// Validate, upload the avatar (if any), run the uniqueness transaction, and
/// announce the new claim on the live feed.
///
/// # Errors
///
/// Returns [`ClaimError`] for validation failures, avatar failures,
/// uniqueness conflicts, and storage errors.
pub async fn submit_claim(state: &AppState, request: ClaimRequest) -> Result<Claim, ClaimError> {
    let mut new = validate(request.slot, &request.handle, &request.note, &state.mask, state.note_max_chars)?;

    // Pre-check only; the transaction below is authoritative.
    if state.claims.get_by_slot(new.slot).await?.is_some() {
        return Err(ClaimError::SlotTaken(new.slot));
    }

    if let Some(upload) = request.avatar {
        new.avatar_url = Some(avatar::upload_avatar(state.avatars.as_ref(), upload, state.upload).await?);
    }

    let uploaded = new.avatar_url.clone();
    let claim = match state.claims.claim(new).await {
        Ok(claim) => claim,
        Err(err) => {
            if let Some(url) = uploaded {
                if let Err(e) = state.avatars.delete(&url).await {
                    warn!(error = %e, %url, "orphaned avatar cleanup failed");
                }
            }
            return Err(err);
        }
    };

    info!(claim_id = %claim.id, slot = %claim.slot, handle_id = %claim.handle_id, "claim accepted");
    state.feed.broadcast(&claim_frame("claim:created", &claim)).await;
    Ok(claim)
}

/// Upload an avatar for an existing claim created without one.
///
/// # Errors
///
/// Returns [`ClaimError::NotFound`] for unknown claims,
/// [`ClaimError::AvatarAlreadySet`] when the claim has an avatar, and avatar
/// errors. The uploaded file is removed when the claim rejects it.
pub async fn attach_avatar(state: &AppState, claim_id: Uuid, upload: AvatarUpload) -> Result<Claim, ClaimError> {
    let url = avatar::upload_avatar(state.avatars.as_ref(), upload, state.upload).await?;
    let claim = match state.claims.set_avatar(claim_id, &url).await {
        Ok(claim) => claim,
        Err(err) => {
            if let Err(e) = state.avatars.delete(&url).await {
                warn!(error = %e, %url, "orphaned avatar cleanup failed");
            }
            return Err(err);
        }
    };

    info!(%claim_id, "avatar attached");
    state.feed.broadcast(&claim_frame("claim:avatar", &claim)).await;
    Ok(claim)
}

/// Feed frame announcing a claim.
#[must_use]
pub fn claim_frame(syscall: &str, claim: &Claim) -> Frame {
    let mut data = Data::new();
    data.insert("claim".into(), serde_json::to_value(claim).unwrap_or_default());
    Frame::request(syscall, data)
}

#[cfg(test)]
#[path = "claim_test.rs"]
mod tests;
