//! `knox uri`: issue a bunker URI for a key.
//!
//! The URI goes to stdout on its own line so it can be piped.

use chrono::Utc;

use crate::bunker::CredentialStore;
use crate::cli::output;
use crate::cli::{context, open_bunker, parse_expiry, parse_relay, parse_uses, Cli};
use crate::errors::Result;

/// Execute the `uri` command.
pub fn execute(
    cli: &Cli,
    name: &str,
    relays: &[String],
    uses: Option<&str>,
    unlimited: bool,
    expires: Option<&str>,
) -> Result<()> {
    // Validate everything before asking for the passphrase.
    let (settings, _) = context(cli)?;
    let relays = relays
        .iter()
        .map(|relay| parse_relay(relay))
        .collect::<Result<Vec<_>>>()?;
    let max_uses = parse_uses(uses, unlimited, settings.default_uses)?;
    let expires_at = expires.map(|value| parse_expiry(value, Utc::now())).transpose()?;

    let (_settings, store) = open_bunker(cli)?;
    let uri = CredentialStore::transaction(store.path(), store.cipher(), |state| {
        state.generate_uri(name, &relays, max_uses, expires_at)
    })?;

    println!("{uri}");
    if max_uses.is_none() {
        output::warning("This URI can be redeemed by any number of applications.");
    }

    Ok(())
}
