//! Per-key summary shown by `knox status`.

use std::fmt;

use super::state::{KnoxKey, KnoxState};

/// One tag in a key's status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTag {
    /// No URI has been issued for the key yet.
    New,
    /// At least one URI can be redeemed without limit.
    Unlimited,
    /// URIs nobody has redeemed yet.
    UnusedUris(usize),
    /// Redemption slots left across all URIs.
    UnusedSlots(usize),
    /// Every issued URI has been fully redeemed.
    Connected,
}

impl fmt::Display for StatusTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => f.write_str("new"),
            Self::Unlimited => f.write_str("unlimited"),
            Self::UnusedUris(n) => write!(f, "{n} unused URIs"),
            Self::UnusedSlots(n) => write!(f, "{n} unused slots"),
            Self::Connected => f.write_str("connected"),
        }
    }
}

/// Summarize the authorizations issued for `key`.
pub fn key_status(state: &KnoxState, key: &KnoxKey) -> Vec<StatusTag> {
    let mut unused_uris = 0;
    let mut unused_slots = 0;
    let mut any = false;

    for auth in state.authorizations_for(&key.name) {
        any = true;
        let Some(remaining) = auth.remaining_uses() else {
            return vec![StatusTag::Unlimited];
        };
        if auth.pubkeys.is_empty() {
            unused_uris += 1;
        }
        unused_slots += remaining;
    }

    if !any {
        return vec![StatusTag::New];
    }

    let mut tags = Vec::new();
    if unused_uris > 0 {
        tags.push(StatusTag::UnusedUris(unused_uris));
    }
    if unused_slots > 0 && unused_slots != unused_uris {
        tags.push(StatusTag::UnusedSlots(unused_slots));
    }
    if tags.is_empty() {
        tags.push(StatusTag::Connected);
    }
    tags
}
