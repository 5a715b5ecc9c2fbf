//! Claim stores: Postgres for production, in-memory for dev and tests.
//!
//! DESIGN
//! ======
//! Uniqueness lives in two key tables, `claim_slots(slot)` and
//! `claim_handles(handle_id)`, each pointing at the `claims` row. A claim
//! transaction locks any existing key rows, aborts if either key is present,
//! and otherwise inserts the claim plus both keys before committing.
//!
//! Two racing transactions on a free key both see "absent"; the loser then
//! trips the primary key on insert (`23505`), which maps to the same
//! conflict error as the read path. No automatic retry.

use std::collections::HashMap;
use std::sync::Mutex;

use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::frame::now_ms;
use crate::grid::Slot;
use crate::services::claim::{Claim, ClaimError, ClaimStore, NewClaim};

const UNIQUE_VIOLATION: &str = "23505";
const SLOT_KEY_CONSTRAINT: &str = "claim_slots_pkey";
const HANDLE_KEY_CONSTRAINT: &str = "claim_handles_pkey";

/// Change kind recorded when an avatar is attached after the claim.
pub const CHANGE_AVATAR_URL_SET: &str = "avatar_url_set";

type ClaimRow = (Uuid, i32, String, String, String, Option<String>, i64);

const CLAIM_COLUMNS: &str = "c.id, c.slot, c.handle, c.handle_id, c.note, c.avatar_url, \
     (EXTRACT(EPOCH FROM c.created_at) * 1000)::BIGINT";

fn row_to_claim(row: ClaimRow) -> Result<Claim, ClaimError> {
    let (id, slot, handle, handle_id, note, avatar_url, created_at_ms) = row;
    Ok(Claim { id, slot: Slot::new(i64::from(slot))?, handle, handle_id, note, avatar_url, created_at_ms })
}

// =============================================================================
// POSTGRES
// =============================================================================

pub struct PgClaimStore {
    pool: PgPool,
}

impl PgClaimStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Map an insert failure inside the claim transaction to a conflict when it
/// is a unique violation on one of the key tables.
fn map_insert_error(err: sqlx::Error, new: &NewClaim) -> ClaimError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some(UNIQUE_VIOLATION) {
            match db.constraint() {
                Some(SLOT_KEY_CONSTRAINT) => return ClaimError::SlotTaken(new.slot),
                Some(HANDLE_KEY_CONSTRAINT) => return ClaimError::HandleTaken(new.handle_id.clone()),
                _ => {}
            }
        }
    }
    ClaimError::Database(err)
}

#[async_trait::async_trait]
impl ClaimStore for PgClaimStore {
    async fn claim(&self, new: NewClaim) -> Result<Claim, ClaimError> {
        let mut tx = self.pool.begin().await?;

        let slot_owner =
            sqlx::query_scalar::<_, Uuid>("SELECT claim_id FROM claim_slots WHERE slot = $1 FOR UPDATE")
                .bind(i32::from(new.slot))
                .fetch_optional(&mut *tx)
                .await?;
        if slot_owner.is_some() {
            return Err(ClaimError::SlotTaken(new.slot));
        }

        let handle_owner =
            sqlx::query_scalar::<_, Uuid>("SELECT claim_id FROM claim_handles WHERE handle_id = $1 FOR UPDATE")
                .bind(&new.handle_id)
                .fetch_optional(&mut *tx)
                .await?;
        if handle_owner.is_some() {
            return Err(ClaimError::HandleTaken(new.handle_id));
        }

        let id = Uuid::new_v4();
        let created_at_ms = sqlx::query_scalar::<_, i64>(
            "INSERT INTO claims (id, slot, handle, handle_id, note, avatar_url) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING (EXTRACT(EPOCH FROM created_at) * 1000)::BIGINT",
        )
        .bind(id)
        .bind(i32::from(new.slot))
        .bind(&new.handle)
        .bind(&new.handle_id)
        .bind(&new.note)
        .bind(new.avatar_url.as_deref())
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO claim_slots (slot, claim_id) VALUES ($1, $2)")
            .bind(i32::from(new.slot))
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_insert_error(e, &new))?;

        sqlx::query("INSERT INTO claim_handles (handle_id, claim_id) VALUES ($1, $2)")
            .bind(&new.handle_id)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_insert_error(e, &new))?;

        tx.commit().await.map_err(|e| map_insert_error(e, &new))?;

        Ok(Claim {
            id,
            slot: new.slot,
            handle: new.handle,
            handle_id: new.handle_id,
            note: new.note,
            avatar_url: new.avatar_url,
            created_at_ms,
        })
    }

    async fn list(&self, limit: usize) -> Result<Vec<Claim>, ClaimError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query_as::<_, ClaimRow>(&format!(
            "SELECT {CLAIM_COLUMNS} FROM claims c ORDER BY c.created_at DESC, c.id DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_claim).collect()
    }

    async fn get_by_slot(&self, slot: Slot) -> Result<Option<Claim>, ClaimError> {
        let row = sqlx::query_as::<_, ClaimRow>(&format!(
            "SELECT {CLAIM_COLUMNS} FROM claim_slots s JOIN claims c ON c.id = s.claim_id WHERE s.slot = $1"
        ))
        .bind(i32::from(slot))
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_claim).transpose()
    }

    async fn set_avatar(&self, claim_id: Uuid, avatar_url: &str) -> Result<Claim, ClaimError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, ClaimRow>(
            "UPDATE claims c SET avatar_url = $2 WHERE c.id = $1 AND c.avatar_url IS NULL \
             RETURNING c.id, c.slot, c.handle, c.handle_id, c.note, c.avatar_url, \
             (EXTRACT(EPOCH FROM c.created_at) * 1000)::BIGINT",
        )
        .bind(claim_id)
        .bind(avatar_url)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM claims WHERE id = $1)")
                .bind(claim_id)
                .fetch_one(&mut *tx)
                .await?;
            return Err(if exists { ClaimError::AvatarAlreadySet(claim_id) } else { ClaimError::NotFound(claim_id) });
        };

        sqlx::query("INSERT INTO claim_changes (claim_id, kind, avatar_url) VALUES ($1, $2, $3)")
            .bind(claim_id)
            .bind(CHANGE_AVATAR_URL_SET)
            .bind(avatar_url)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        row_to_claim(row)
    }
}

// =============================================================================
// MEMORY
// =============================================================================

/// One entry of the change log kept next to claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimChange {
    pub claim_id: Uuid,
    pub kind: &'static str,
    pub avatar_url: Option<String>,
    pub at_ms: i64,
}

#[derive(Default)]
struct MemoryInner {
    claims: HashMap<Uuid, Claim>,
    slots: HashMap<Slot, Uuid>,
    handles: HashMap<String, Uuid>,
    /// Claim IDs in insertion order.
    order: Vec<Uuid>,
    changes: Vec<ClaimChange>,
}

/// Process-local store. The mutex is the transaction boundary.
#[derive(Default)]
pub struct MemoryClaimStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryClaimStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    #[cfg(test)]
    #[must_use]
    pub fn changes(&self) -> Vec<ClaimChange> {
        self.lock().changes.clone()
    }
}

#[async_trait::async_trait]
impl ClaimStore for MemoryClaimStore {
    async fn claim(&self, new: NewClaim) -> Result<Claim, ClaimError> {
        let mut inner = self.lock();
        if inner.slots.contains_key(&new.slot) {
            return Err(ClaimError::SlotTaken(new.slot));
        }
        if inner.handles.contains_key(&new.handle_id) {
            return Err(ClaimError::HandleTaken(new.handle_id));
        }

        let claim = Claim {
            id: Uuid::new_v4(),
            slot: new.slot,
            handle: new.handle,
            handle_id: new.handle_id,
            note: new.note,
            avatar_url: new.avatar_url,
            created_at_ms: now_ms(),
        };
        inner.slots.insert(claim.slot, claim.id);
        inner.handles.insert(claim.handle_id.clone(), claim.id);
        inner.order.push(claim.id);
        inner.claims.insert(claim.id, claim.clone());
        Ok(claim)
    }

    async fn list(&self, limit: usize) -> Result<Vec<Claim>, ClaimError> {
        let inner = self.lock();
        Ok(inner
            .order
            .iter()
            .rev()
            .filter_map(|id| inner.claims.get(id).cloned())
            .take(limit)
            .collect())
    }

    async fn get_by_slot(&self, slot: Slot) -> Result<Option<Claim>, ClaimError> {
        let inner = self.lock();
        Ok(inner
            .slots
            .get(&slot)
            .and_then(|id| inner.claims.get(id))
            .cloned())
    }

    async fn set_avatar(&self, claim_id: Uuid, avatar_url: &str) -> Result<Claim, ClaimError> {
        let mut inner = self.lock();
        let claim = {
            let Some(claim) = inner.claims.get_mut(&claim_id) else {
                return Err(ClaimError::NotFound(claim_id));
            };
            if claim.avatar_url.is_some() {
                return Err(ClaimError::AvatarAlreadySet(claim_id));
            }
            claim.avatar_url = Some(avatar_url.to_owned());
            claim.clone()
        };
        let change = ClaimChange {
            claim_id,
            kind: CHANGE_AVATAR_URL_SET,
            avatar_url: Some(avatar_url.to_owned()),
            at_ms: now_ms(),
        };
        debug!(claim_id = %change.claim_id, kind = change.kind, url = ?change.avatar_url, at_ms = change.at_ms, "claim change recorded");
        inner.changes.push(change);
        Ok(claim)
    }
}

#[cfg(test)]
#[path = "claim_store_test.rs"]
mod tests;
