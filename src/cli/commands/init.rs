//! `knox init`: create a new, empty bunker file.

use crate::bunker::CredentialStore;
use crate::cli::output;
use crate::cli::{context, prompt_new_passphrase, Cli};
use crate::errors::{KnoxError, Result};

/// Execute the `init` command.
pub fn execute(cli: &Cli) -> Result<()> {
    let (settings, path) = context(cli)?;

    // Checked again under the lock by `create`; this only avoids a
    // pointless passphrase prompt.
    if path.exists() {
        output::tip("Use `knox add <name>` to add keys to the existing bunker.");
        return Err(KnoxError::StoreAlreadyExists(path));
    }

    let passphrase = prompt_new_passphrase()?;
    CredentialStore::create(&path, settings.cipher(&passphrase))?;

    output::success(&format!("Bunker created at {}", path.display()));
    output::tip("Run `knox add <name>` to add a key.");

    Ok(())
}
