//! High-level bunker operations used by CLI commands and the daemon.
//!
//! `CredentialStore` pairs a bunker file path and its cipher with an
//! in-memory `KnoxState` snapshot.  Mutations change the snapshot only;
//! nothing reaches disk until `save` is called.
//!
//! When another process may be writing the same file, use
//! `CredentialStore::transaction`, which holds the exclusive lock across
//! the whole read-modify-write so no concurrent update is lost.

use std::num::NonZeroU32;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;
use url::Url;

use super::file::{self, LockGuard};
use super::state::KnoxState;
use crate::crypto::{PassphraseCipher, SecretBuffer};
use crate::errors::Result;

/// An open bunker.  Create one with `CredentialStore::create` or
/// `CredentialStore::open`, mutate it, then `save`.
pub struct CredentialStore {
    /// Path to the bunker file on disk.
    path: PathBuf,

    /// Cipher bound to the unlock passphrase.
    cipher: PassphraseCipher,

    /// Current snapshot of the document.
    state: KnoxState,
}

impl CredentialStore {
    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// Create a new, empty bunker file at `path`.
    pub fn create(path: &Path, cipher: PassphraseCipher) -> Result<Self> {
        let state = KnoxState::new();
        file::create_state(path, &state, &cipher)?;

        Ok(Self {
            path: path.to_path_buf(),
            cipher,
            state,
        })
    }

    /// Open and decrypt an existing bunker file.
    pub fn open(path: &Path, cipher: PassphraseCipher) -> Result<Self> {
        let state = Self::load(path, &cipher)?;
        Ok(Self {
            path: path.to_path_buf(),
            cipher,
            state,
        })
    }

    /// Read the sanitized state without keeping a handle.
    pub fn load(path: &Path, cipher: &PassphraseCipher) -> Result<KnoxState> {
        file::read_state(path, cipher)
    }

    /// Run `f` against the freshly loaded state while holding the
    /// exclusive lock, then persist the result.
    ///
    /// If `f` fails nothing is written and its error is returned.
    pub fn transaction<T, F>(path: &Path, cipher: &PassphraseCipher, f: F) -> Result<T>
    where
        F: FnOnce(&mut KnoxState) -> Result<T>,
    {
        let handle = file::open_existing(path, true)?;
        let _lock = LockGuard::exclusive(&handle)?;

        let envelope = file::read_envelope(&handle)?;
        let mut state = file::decode(&envelope, cipher)?;

        let output = f(&mut state)?;

        let envelope = file::encode(&state, cipher)?;
        file::write_envelope(&handle, &envelope)?;
        debug!(path = %path.display(), "bunker transaction committed");

        Ok(output)
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Add a named key.  Fails if the name is taken.
    pub fn add_key(&mut self, name: &str, sec: SecretBuffer) -> Result<()> {
        self.state.add_key(name, sec)
    }

    /// Remove a key and the authorizations that use it.
    pub fn remove_key(&mut self, name: &str) -> Result<()> {
        self.state.remove_key(name)
    }

    /// Issue a new authorization URI for a key.
    ///
    /// The URI is only usable by other processes once `save` has run.
    pub fn generate_uri(
        &mut self,
        key_name: &str,
        relays: &[String],
        max_uses: Option<NonZeroU32>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Url> {
        self.state
            .generate_uri(key_name, relays, max_uses, expires_at)
    }

    /// Redeem `secret` for application `pubkey`.
    pub fn authorize(&mut self, pubkey: &str, secret: &str) -> Result<()> {
        self.state.authorize(pubkey, secret)
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Encrypt the snapshot and rewrite the bunker file.
    pub fn save(&self) -> Result<()> {
        file::write_state(&self.path, &self.state, &self.cipher)
    }

    /// Replace the snapshot with what is currently on disk.
    pub fn reload(&mut self) -> Result<()> {
        self.state = Self::load(&self.path, &self.cipher)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn cipher(&self) -> &PassphraseCipher {
        &self.cipher
    }

    pub fn state(&self) -> &KnoxState {
        &self.state
    }
}
