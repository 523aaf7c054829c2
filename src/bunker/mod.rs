//! Bunker module: the encrypted credential store.
//!
//! This module provides:
//! - `KnoxState` and its key / authorization records (`state`)
//! - Locked reading and in-place rewriting of the bunker file (`file`)
//! - High-level `CredentialStore` for opening, mutating and saving (`store`)
//! - Per-key summaries for `knox status` (`status`)

pub mod file;
pub mod state;
pub mod status;
pub mod store;

// Re-export the most commonly used items.
pub use state::{KnoxAuthorization, KnoxKey, KnoxState, CURRENT_VERSION};
pub use status::{key_status, StatusTag};
pub use store::CredentialStore;
