//! `knox remove`: delete a key and revoke its authorizations.

use crate::bunker::CredentialStore;
use crate::cli::output;
use crate::cli::{open_bunker, Cli};
use crate::errors::Result;

/// Execute the `remove` command.
pub fn execute(cli: &Cli, name: &str) -> Result<()> {
    let (_settings, store) = open_bunker(cli)?;

    let revoked = CredentialStore::transaction(store.path(), store.cipher(), |state| {
        let revoked = state.authorizations_for(name).count();
        state.remove_key(name)?;
        Ok(revoked)
    })?;

    output::success(&format!("Removed key '{name}'"));
    if revoked > 0 {
        output::info(&format!("Revoked {revoked} authorization(s)."));
    }

    Ok(())
}
