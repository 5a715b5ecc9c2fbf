//! Domain services used by the HTTP and feed routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own claim rules, storage and fan-out so route handlers
//! stay focused on form parsing and status mapping.

pub mod avatar;
pub mod claim;
pub mod claim_store;
pub mod feed;
pub mod handle;
pub mod mask;
