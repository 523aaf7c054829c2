//! CLI module: Clap argument parser, output helpers, and command implementations.

pub mod commands;
pub mod output;

use std::num::NonZeroU32;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use clap::Parser;
use url::Url;
use zeroize::Zeroizing;

use crate::bunker::CredentialStore;
use crate::config::Settings;
use crate::errors::{KnoxError, Result};

/// Environment variable consulted before prompting for the passphrase.
pub const PASSPHRASE_ENV: &str = "KNOX_PASSPHRASE";

/// Knox: Nostr bunker with encrypted storage.
#[derive(Parser)]
#[command(name = "knox", about = "Nostr bunker with encrypted storage", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the bunker file (default: knox.bunker)
    #[arg(short, long, global = true, env = "KNOX_FILE")]
    pub file: Option<PathBuf>,
}

/// All available subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Initialize a new bunker
    Init,

    /// Add a new key to the bunker
    Add {
        /// Name of the key
        name: String,
    },

    /// Remove a key and its authorizations from the bunker
    Remove {
        /// Name of the key
        name: String,
    },

    /// Generate a bunker URI for a key
    Uri {
        /// Name of the key
        name: String,

        /// Relays to use (wss:// only)
        #[arg(required = true)]
        relays: Vec<String>,

        /// Maximum number of uses (default from knox.toml, usually 1)
        #[arg(short = 'n', long, conflicts_with = "unlimited")]
        uses: Option<String>,

        /// Allow any number of applications to connect
        #[arg(long)]
        unlimited: bool,

        /// Expiration date (RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        expires: Option<String>,
    },

    /// Show the status of the bunker
    Status,

    /// Start the bunker daemon
    Start,

    /// Export keys from the bunker
    Export {
        /// Output format: csv (default) or jsonl
        #[arg(long, default_value = "csv")]
        format: String,

        /// Output keys only
        #[arg(long)]
        keys: bool,

        /// Output keys without encryption (not recommended)
        #[arg(long)]
        insecure: bool,
    },
}

// ---------------------------------------------------------------------------
// Shared helpers used by multiple commands
// ---------------------------------------------------------------------------

/// Load settings from the working directory and resolve the bunker path.
pub fn context(cli: &Cli) -> Result<(Settings, PathBuf)> {
    let cwd = std::env::current_dir()?;
    let settings = Settings::load(&cwd)?;
    let path = settings.bunker_path(&cwd, cli.file.as_deref());
    Ok((settings, path))
}

/// Prompt for the unlock passphrase and open the bunker.
pub fn open_bunker(cli: &Cli) -> Result<(Settings, CredentialStore)> {
    let (settings, path) = context(cli)?;
    if !path.exists() {
        return Err(KnoxError::StoreNotFound(path));
    }

    let passphrase = prompt_passphrase()?;
    let store = CredentialStore::open(&path, settings.cipher(&passphrase))?;
    Ok((settings, store))
}

/// Get the unlock passphrase, trying in order:
/// 1. `KNOX_PASSPHRASE` env var (scripts)
/// 2. Interactive prompt
///
/// Returns `Zeroizing<String>` so the passphrase is wiped from memory on drop.
pub fn prompt_passphrase() -> Result<Zeroizing<String>> {
    if let Some(pw) = passphrase_from_env() {
        return Ok(pw);
    }

    let pw = dialoguer::Password::new()
        .with_prompt("Enter unlock passphrase")
        .allow_empty_password(true)
        .interact()
        .map_err(|e| KnoxError::CommandFailed(format!("passphrase prompt: {e}")))?;
    require_passphrase(Zeroizing::new(pw))
}

/// Prompt for a new passphrase with confirmation (used during `init`).
///
/// Also respects `KNOX_PASSPHRASE` for scripted usage.
pub fn prompt_new_passphrase() -> Result<Zeroizing<String>> {
    if let Some(pw) = passphrase_from_env() {
        return Ok(pw);
    }

    let pw = dialoguer::Password::new()
        .with_prompt("Enter a new passphrase")
        .with_confirmation("Confirm passphrase", "Passphrases do not match, try again")
        .allow_empty_password(true)
        .interact()
        .map_err(|e| KnoxError::CommandFailed(format!("passphrase prompt: {e}")))?;
    require_passphrase(Zeroizing::new(pw))
}

fn passphrase_from_env() -> Option<Zeroizing<String>> {
    std::env::var(PASSPHRASE_ENV)
        .ok()
        .filter(|pw| !pw.is_empty())
        .map(Zeroizing::new)
}

fn require_passphrase(pw: Zeroizing<String>) -> Result<Zeroizing<String>> {
    if pw.is_empty() {
        return Err(KnoxError::PassphraseRequired);
    }
    Ok(pw)
}

/// Validate a relay URL.  Only `wss://` relays are accepted.
pub fn parse_relay(relay: &str) -> Result<String> {
    let url = Url::parse(relay).map_err(|_| KnoxError::InvalidRelayUrl(relay.to_string()))?;
    if url.scheme() != "wss" || url.host_str().is_none() {
        return Err(KnoxError::InvalidRelayUrl(relay.to_string()));
    }
    Ok(url.to_string())
}

/// Parse an expiration date (RFC 3339, or `YYYY-MM-DD` at midnight UTC)
/// that must lie after `now`.
pub fn parse_expiry(value: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc())
                .ok_or(())
        })
        .map_err(|_| KnoxError::InvalidDate(value.to_string()))?;

    if parsed <= now {
        return Err(KnoxError::InvalidDate(value.to_string()));
    }
    Ok(parsed)
}

/// Resolve the usage limit for a new URI.  `None` means unlimited.
pub fn parse_uses(value: Option<&str>, unlimited: bool, default: u32) -> Result<Option<NonZeroU32>> {
    if unlimited {
        return Ok(None);
    }

    let count = match value {
        Some(raw) => raw
            .trim()
            .parse::<u32>()
            .map_err(|_| KnoxError::InvalidUseCount(raw.to_string()))?,
        None => default,
    };

    NonZeroU32::new(count)
        .map(Some)
        .ok_or_else(|| KnoxError::InvalidUseCount(count.to_string()))
}
