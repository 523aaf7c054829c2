use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::crypto::cipher::MAX_LOG_N;
use crate::crypto::PassphraseCipher;
use crate::errors::{KnoxError, Result};

/// Smallest scrypt work factor accepted from configuration.
pub const MIN_WORK_FACTOR: u8 = 10;

/// Settings loaded from `knox.toml`.
///
/// Every field has a default so Knox works without any config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Bunker file used when `--file` is not given.
    #[serde(default = "default_file")]
    pub file: PathBuf,

    /// scrypt work factor (log2 N) for newly written envelopes.
    #[serde(default = "default_work_factor")]
    pub work_factor: u8,

    /// Redemptions allowed per URI unless `--uses` or `--unlimited` is passed.
    #[serde(default = "default_uses")]
    pub default_uses: u32,

    /// Quiet period before the daemon reacts to file changes.
    #[serde(default = "default_watch_debounce_ms")]
    pub watch_debounce_ms: u64,

    /// Log filter used when `KNOX_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Serde default helpers ────────────────────────────────────────────

fn default_file() -> PathBuf {
    PathBuf::from("knox.bunker")
}

fn default_work_factor() -> u8 {
    crate::crypto::DEFAULT_LOG_N
}

fn default_uses() -> u32 {
    1
}

fn default_watch_debounce_ms() -> u64 {
    200
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Implementation ───────────────────────────────────────────────────

impl Default for Settings {
    fn default() -> Self {
        Self {
            file: default_file(),
            work_factor: default_work_factor(),
            default_uses: default_uses(),
            watch_debounce_ms: default_watch_debounce_ms(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    /// Name of the config file we look for in the working directory.
    pub const FILE_NAME: &'static str = "knox.toml";

    /// Load settings from `<dir>/knox.toml`.
    ///
    /// A missing file yields defaults.  A file that cannot be parsed, or
    /// holds out-of-range values, is an error.
    pub fn load(dir: &Path) -> Result<Self> {
        let config_path = dir.join(Self::FILE_NAME);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path)?;

        let settings: Settings = toml::from_str(&contents).map_err(|e| {
            KnoxError::Config(format!("Failed to parse {}: {e}", config_path.display()))
        })?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if !(MIN_WORK_FACTOR..=MAX_LOG_N).contains(&self.work_factor) {
            return Err(KnoxError::Config(format!(
                "work_factor must be between {MIN_WORK_FACTOR} and {MAX_LOG_N}, got {}",
                self.work_factor
            )));
        }
        if self.default_uses == 0 {
            return Err(KnoxError::Config("default_uses must be at least 1".into()));
        }
        Ok(())
    }

    /// Resolve the bunker path: an explicit override wins, relative
    /// paths are taken from `dir`.
    pub fn bunker_path(&self, dir: &Path, explicit: Option<&Path>) -> PathBuf {
        dir.join(explicit.unwrap_or(self.file.as_path()))
    }

    /// Build a cipher for `passphrase` using the configured work factor.
    pub fn cipher(&self, passphrase: &str) -> PassphraseCipher {
        PassphraseCipher::new(passphrase).with_work_factor(self.work_factor)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.watch_debounce_ms)
    }
}

// ── Tests ────────────────────────────────────────────────────────────
