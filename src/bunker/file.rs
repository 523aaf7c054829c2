//! Reading and writing the encrypted bunker file.
//!
//! A bunker file is a single passphrase envelope (see
//! `crypto::cipher`) wrapping the JSON form of `KnoxState`.
//!
//! Writers take an **exclusive** advisory lock on the destination file,
//! truncate it, write the whole envelope and flush before unlocking.
//! Readers take a **shared** lock, so they block until any in-flight
//! write completes and can never observe a half-written file.  The
//! file is rewritten in place rather than replaced by rename, because
//! the daemon watches the path itself and treats a rename as fatal.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use fs2::FileExt;
use zeroize::Zeroizing;

use super::state::KnoxState;
use crate::crypto::PassphraseCipher;
use crate::errors::{KnoxError, Result};

/// Holds an advisory lock until dropped.
pub(crate) struct LockGuard<'a> {
    file: &'a File,
}

impl<'a> LockGuard<'a> {
    pub(crate) fn exclusive(file: &'a File) -> Result<Self> {
        FileExt::lock_exclusive(file)?;
        Ok(Self { file })
    }

    pub(crate) fn shared(file: &'a File) -> Result<Self> {
        FileExt::lock_shared(file)?;
        Ok(Self { file })
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        let _ = FileExt::unlock(self.file);
    }
}

/// Load, decrypt and sanitize the state stored at `path`.
pub fn read_state(path: &Path, cipher: &PassphraseCipher) -> Result<KnoxState> {
    let file = open_existing(path, false)?;
    let envelope = {
        let _lock = LockGuard::shared(&file)?;
        read_envelope(&file)?
    };
    decode(&envelope, cipher)
}

/// Encrypt `state` and rewrite the file at `path` in place.
///
/// The file is created if missing.  The envelope is built before the
/// lock is taken so the lock is only held for truncate + write + flush.
pub fn write_state(path: &Path, state: &KnoxState, cipher: &PassphraseCipher) -> Result<()> {
    let envelope = encode(state, cipher)?;

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;
    restrict_permissions(path)?;

    let _lock = LockGuard::exclusive(&file)?;
    write_envelope(&file, &envelope)
}

/// Create a brand-new bunker file holding `state`.
///
/// Fails with `StoreAlreadyExists` if anything is already at `path`.
pub fn create_state(path: &Path, state: &KnoxState, cipher: &PassphraseCipher) -> Result<()> {
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists => KnoxError::StoreAlreadyExists(path.to_path_buf()),
            _ => KnoxError::Io(e),
        })?;
    restrict_permissions(path)?;

    let _lock = LockGuard::exclusive(&file)?;
    let envelope = encode(state, cipher)?;
    write_envelope(&file, &envelope)
}

/// Open an existing bunker file, mapping "not found" to `StoreNotFound`.
pub(crate) fn open_existing(path: &Path, writable: bool) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(writable)
        .open(path)
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => KnoxError::StoreNotFound(path.to_path_buf()),
            _ => KnoxError::Io(e),
        })
}

/// Read the whole envelope from an already-locked file.
pub(crate) fn read_envelope(file: &File) -> Result<Vec<u8>> {
    let mut reader = file;
    let mut envelope = Vec::new();
    reader.seek(SeekFrom::Start(0))?;
    reader.read_to_end(&mut envelope)?;
    Ok(envelope)
}

/// Truncate an already-locked file and write the envelope in full.
pub(crate) fn write_envelope(file: &File, envelope: &[u8]) -> Result<()> {
    let mut writer = file;
    writer.set_len(0)?;
    writer.seek(SeekFrom::Start(0))?;
    writer.write_all(envelope)?;
    writer.sync_all()?;
    Ok(())
}

pub(crate) fn decode(envelope: &[u8], cipher: &PassphraseCipher) -> Result<KnoxState> {
    let plaintext = cipher.decrypt(envelope)?;
    KnoxState::from_json(&plaintext)
}

pub(crate) fn encode(state: &KnoxState, cipher: &PassphraseCipher) -> Result<Vec<u8>> {
    let json: Zeroizing<Vec<u8>> = state.to_json()?;
    cipher.encrypt(&json)
}

/// On Unix, restrict the bunker file to owner-only read/write.
fn restrict_permissions(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}
