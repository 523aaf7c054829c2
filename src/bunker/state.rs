//! The document persisted inside a bunker file.
//!
//! `KnoxState` holds the user's named secret keys and the authorizations
//! issued for them.  Parsing is tolerant: a malformed key or
//! authorization record is dropped on its own instead of failing the
//! whole document.  After parsing, `sanitize` enforces the invariants
//! that must hold for every loaded state:
//!
//! - key names are unique (first occurrence wins)
//! - authorization secrets are non-empty and unique (first occurrence wins)
//! - every authorization references an existing key
//! - expired authorizations are gone
//! - `relays` and `pubkeys` hold no duplicates

use std::collections::HashSet;
use std::num::NonZeroU32;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;
use zeroize::Zeroizing;

use crate::crypto::keys::{is_pubkey_hex, nsec_serde};
use crate::crypto::{generate_secret_key, public_key_hex, SecretBuffer};
use crate::errors::{KnoxError, Result};

/// Current schema version written by this build.
pub const CURRENT_VERSION: u32 = 1;

/// URI scheme of authorization URIs.
pub const URI_SCHEME: &str = "bunker";

/// A named secret key owned by the bunker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnoxKey {
    pub name: String,

    #[serde(with = "nsec_serde")]
    pub sec: SecretBuffer,

    pub created_at: DateTime<Utc>,
}

/// A revocable capability that lets remote applications use a key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnoxAuthorization {
    /// Name of the `KnoxKey` this authorization signs with.
    pub key: String,

    /// Capability token embedded in the URI.
    pub secret: String,

    pub relays: Vec<String>,

    /// Application pubkeys that redeemed this capability.
    pub pubkeys: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_uses: Option<NonZeroU32>,

    /// Per-authorization identity of the signing endpoint.
    #[serde(with = "nsec_serde")]
    pub bunker_sec: SecretBuffer,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl KnoxAuthorization {
    /// Returns `true` if `expires_at` is set and lies before `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp < now)
    }

    /// Hex public key of the bunker signing identity.
    pub fn bunker_pubkey(&self) -> Result<String> {
        public_key_hex(&self.bunker_sec)
    }

    /// Build `bunker://<pubkey>?relay=...&secret=...` for this authorization.
    pub fn uri(&self) -> Result<Url> {
        let pubkey = self.bunker_pubkey()?;
        let mut uri = Url::parse(&format!("{URI_SCHEME}://{pubkey}"))
            .map_err(|e| KnoxError::Serialization(format!("bunker URI: {e}")))?;

        {
            let mut query = uri.query_pairs_mut();
            for relay in &self.relays {
                query.append_pair("relay", relay);
            }
            query.append_pair("secret", &self.secret);
        }

        Ok(uri)
    }

    /// Remaining redemption slots, or `None` when unlimited.
    pub fn remaining_uses(&self) -> Option<usize> {
        self.max_uses
            .map(|max| (max.get() as usize).saturating_sub(self.pubkeys.len()))
    }

    /// Check the record-level rules that serde alone cannot express.
    fn validate(&self) -> std::result::Result<(), String> {
        for relay in &self.relays {
            Url::parse(relay).map_err(|e| format!("invalid relay URL \"{relay}\": {e}"))?;
        }
        if let Some(bad) = self.pubkeys.iter().find(|p| !is_pubkey_hex(p)) {
            return Err(format!("invalid pubkey \"{bad}\""));
        }
        Ok(())
    }
}

/// The full persisted document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KnoxState {
    pub keys: Vec<KnoxKey>,
    pub authorizations: Vec<KnoxAuthorization>,
    pub version: u32,
}

/// Outer document shape.  Records stay untyped so each can fail alone.
#[derive(Deserialize)]
struct RawState {
    keys: Vec<serde_json::Value>,
    authorizations: Vec<serde_json::Value>,
    version: u32,
}

impl Default for KnoxState {
    fn default() -> Self {
        Self::new()
    }
}

impl KnoxState {
    /// An empty state at the current schema version.
    pub fn new() -> Self {
        Self {
            keys: Vec::new(),
            authorizations: Vec::new(),
            version: CURRENT_VERSION,
        }
    }

    // ------------------------------------------------------------------
    // Encoding
    // ------------------------------------------------------------------

    /// Parse and sanitize a JSON document.
    ///
    /// Fails only when the outer shape is unusable.  Malformed records
    /// are dropped.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let raw: RawState = serde_json::from_slice(bytes)
            .map_err(|e| KnoxError::Deserialization(format!("state JSON: {e}")))?;

        if raw.version == 0 {
            return Err(KnoxError::Deserialization(
                "version must be a positive integer".into(),
            ));
        }

        let keys = raw
            .keys
            .into_iter()
            .enumerate()
            .filter_map(|(i, value)| match serde_json::from_value::<KnoxKey>(value) {
                Ok(key) => Some(key),
                Err(e) => {
                    debug!(index = i, error = %e, "dropping malformed key record");
                    None
                }
            })
            .collect();

        let authorizations = raw
            .authorizations
            .into_iter()
            .enumerate()
            .filter_map(|(i, value)| {
                let auth = match serde_json::from_value::<KnoxAuthorization>(value) {
                    Ok(auth) => auth,
                    Err(e) => {
                        debug!(index = i, error = %e, "dropping malformed authorization record");
                        return None;
                    }
                };
                match auth.validate() {
                    Ok(()) => Some(auth),
                    Err(reason) => {
                        debug!(index = i, %reason, "dropping invalid authorization record");
                        None
                    }
                }
            })
            .collect();

        let mut state = Self {
            keys,
            authorizations,
            version: raw.version,
        };
        state.sanitize(Utc::now());
        Ok(state)
    }

    /// Serialize to pretty JSON.  The buffer holds `nsec` strings, so it
    /// is wiped on drop.
    pub fn to_json(&self) -> Result<Zeroizing<Vec<u8>>> {
        serde_json::to_vec_pretty(self)
            .map(Zeroizing::new)
            .map_err(|e| KnoxError::Serialization(format!("state JSON: {e}")))
    }

    /// Enforce the load-time invariants against the clock value `now`.
    pub fn sanitize(&mut self, now: DateTime<Utc>) {
        let mut names = HashSet::new();
        self.keys.retain(|key| {
            let first = names.insert(key.name.clone());
            if !first {
                debug!(key = %key.name, "dropping duplicate key");
            }
            first
        });

        let mut secrets = HashSet::new();
        self.authorizations.retain(|auth| {
            if !names.contains(&auth.key) {
                debug!(key = %auth.key, "dropping authorization for unknown key");
                return false;
            }
            if auth.is_expired(now) {
                debug!(key = %auth.key, "dropping expired authorization");
                return false;
            }
            if auth.secret.is_empty() {
                debug!(key = %auth.key, "dropping authorization with empty secret");
                return false;
            }
            if !secrets.insert(auth.secret.clone()) {
                debug!(key = %auth.key, "dropping authorization with duplicate secret");
                return false;
            }
            true
        });

        for auth in &mut self.authorizations {
            dedup_preserving_order(&mut auth.relays);
            dedup_preserving_order(&mut auth.pubkeys);
        }
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    pub fn key(&self, name: &str) -> Option<&KnoxKey> {
        self.keys.iter().find(|key| key.name == name)
    }

    pub fn authorization(&self, secret: &str) -> Option<&KnoxAuthorization> {
        self.authorizations.iter().find(|auth| auth.secret == secret)
    }

    /// All authorizations that sign with the key named `name`.
    pub fn authorizations_for<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a KnoxAuthorization> + 'a {
        self.authorizations.iter().filter(move |auth| auth.key == name)
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Add a new named key.
    pub fn add_key(&mut self, name: &str, sec: SecretBuffer) -> Result<()> {
        if self.key(name).is_some() {
            return Err(KnoxError::DuplicateKey(name.to_string()));
        }

        self.keys.push(KnoxKey {
            name: name.to_string(),
            sec,
            created_at: Utc::now(),
        });
        Ok(())
    }

    /// Remove a key together with every authorization that uses it.
    pub fn remove_key(&mut self, name: &str) -> Result<()> {
        let before = self.keys.len();
        self.keys.retain(|key| key.name != name);
        if self.keys.len() == before {
            return Err(KnoxError::KeyNotFound(name.to_string()));
        }

        self.authorizations.retain(|auth| auth.key != name);
        Ok(())
    }

    /// Issue a new authorization for `key_name` and return its URI.
    pub fn generate_uri(
        &mut self,
        key_name: &str,
        relays: &[String],
        max_uses: Option<NonZeroU32>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Url> {
        if self.key(key_name).is_none() {
            return Err(KnoxError::KeyNotFound(key_name.to_string()));
        }

        let mut relays = relays.to_vec();
        if let Some(bad) = relays.iter().find(|relay| Url::parse(relay).is_err()) {
            return Err(KnoxError::InvalidRelayUrl(bad.clone()));
        }
        dedup_preserving_order(&mut relays);

        let authorization = KnoxAuthorization {
            key: key_name.to_string(),
            secret: uuid::Uuid::new_v4().to_string(),
            relays,
            pubkeys: Vec::new(),
            max_uses,
            bunker_sec: generate_secret_key(),
            created_at: Utc::now(),
            expires_at,
        };

        let uri = authorization.uri()?;
        self.authorizations.push(authorization);
        Ok(uri)
    }

    /// Record that application `pubkey` redeemed the capability `secret`.
    ///
    /// `pubkey` must be 64 lowercase hex chars.  The remaining checks run
    /// in a fixed order: an already-authorized pubkey is a no-op, then
    /// the usage limit, then expiry.
    pub fn authorize(&mut self, pubkey: &str, secret: &str) -> Result<()> {
        let now = Utc::now();
        let authorization = self
            .authorizations
            .iter_mut()
            .find(|auth| auth.secret == secret)
            .ok_or(KnoxError::AuthorizationNotFound)?;

        if !is_pubkey_hex(pubkey) {
            return Err(KnoxError::InvalidPubkey(pubkey.to_string()));
        }

        if authorization.pubkeys.iter().any(|p| p == pubkey) {
            return Ok(());
        }

        if let Some(max) = authorization.max_uses {
            if authorization.pubkeys.len() >= max.get() as usize {
                return Err(KnoxError::UsageLimitExceeded);
            }
        }

        if authorization.is_expired(now) {
            return Err(KnoxError::AuthorizationExpired);
        }

        authorization.pubkeys.push(pubkey.to_string());
        Ok(())
    }
}

/// Remove repeated entries, keeping the first occurrence of each.
fn dedup_preserving_order(items: &mut Vec<String>) {
    let mut seen = HashSet::new();
    items.retain(|item| seen.insert(item.clone()));
}
