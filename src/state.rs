//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor.
//! The claim store and avatar store sit behind trait objects so the server
//! can run against Postgres or fully in memory, and tests can swap in fakes.
//! The slot mask is decoded once at startup and never changes.

use std::sync::Arc;

use crate::config::UploadLimits;
use crate::rate_limit::RateLimiter;
use crate::services::avatar::AvatarStore;
use crate::services::claim::ClaimStore;
use crate::services::feed::FeedHub;
use crate::services::mask::SlotMask;

/// Clone is required by Axum; every field is Arc-wrapped or cheap to copy.
#[derive(Clone)]
pub struct AppState {
    pub claims: Arc<dyn ClaimStore>,
    pub avatars: Arc<dyn AvatarStore>,
    pub mask: Arc<SlotMask>,
    pub feed: FeedHub,
    pub rate_limiter: RateLimiter,
    pub upload: UploadLimits,
    pub note_max_chars: usize,
}

impl AppState {
    #[must_use]
    pub fn new(
        claims: Arc<dyn ClaimStore>,
        avatars: Arc<dyn AvatarStore>,
        mask: SlotMask,
        rate_limiter: RateLimiter,
        upload: UploadLimits,
        note_max_chars: usize,
    ) -> Self {
        Self { claims, avatars, mask: Arc::new(mask), feed: FeedHub::new(), rate_limiter, upload, note_max_chars }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub mod test_helpers {
    use super::*;
    use crate::config::DEFAULT_NOTE_MAX_CHARS;
    use crate::services::avatar::LocalAvatarStore;
    use crate::services::claim_store::MemoryClaimStore;

    /// In-memory claims, avatars under a fresh temp dir, every slot eligible.
    #[must_use]
    pub fn test_app_state() -> AppState {
        test_app_state_with(Arc::new(MemoryClaimStore::new()), SlotMask::all_eligible())
    }

    #[must_use]
    pub fn test_app_state_with(claims: Arc<dyn ClaimStore>, mask: SlotMask) -> AppState {
        let root = std::env::temp_dir().join(format!("mosaic-test-{}", uuid::Uuid::new_v4()));
        AppState::new(
            claims,
            Arc::new(LocalAvatarStore::new(root, "")),
            mask,
            RateLimiter::default(),
            UploadLimits::default(),
            DEFAULT_NOTE_MAX_CHARS,
        )
    }
}
