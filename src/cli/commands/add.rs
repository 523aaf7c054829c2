//! `knox add`: add a named secret key to the bunker.

use std::io::{self, IsTerminal, Read};

use zeroize::Zeroizing;

use crate::bunker::CredentialStore;
use crate::cli::output;
use crate::cli::{open_bunker, Cli};
use crate::crypto::{decode_nsec, generate_secret_key, public_key_hex, SecretBuffer};
use crate::errors::{KnoxError, Result};

/// Execute the `add` command.
pub fn execute(cli: &Cli, name: &str) -> Result<()> {
    let (_settings, store) = open_bunker(cli)?;

    let (sec, generated) = match read_secret_key()? {
        Some(sec) => (sec, false),
        None => (generate_secret_key(), true),
    };
    let pubkey = public_key_hex(&sec)?;

    CredentialStore::transaction(store.path(), store.cipher(), |state| {
        state.add_key(name, sec)
    })?;

    if generated {
        output::success(&format!("Generated new key '{name}' ({pubkey})"));
    } else {
        output::success(&format!("Added key '{name}' ({pubkey})"));
    }
    output::tip(&format!("Run `knox uri {name} <relay>` to let an application connect."));

    Ok(())
}

/// Read an `nsec` from piped stdin or an interactive prompt.
///
/// Blank input means "generate a new key" and yields `None`.
fn read_secret_key() -> Result<Option<SecretBuffer>> {
    let input = if !io::stdin().is_terminal() {
        let mut buf = Zeroizing::new(String::new());
        io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        let value = dialoguer::Password::new()
            .with_prompt("Enter secret key (leave blank to generate)")
            .allow_empty_password(true)
            .interact()
            .map_err(|e| KnoxError::CommandFailed(format!("input prompt: {e}")))?;
        Zeroizing::new(value)
    };

    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    decode_nsec(trimmed).map(Some)
}
