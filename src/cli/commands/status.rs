//! `knox status`: list keys with a summary of their authorizations.

use crate::cli::output;
use crate::cli::{open_bunker, Cli};
use crate::errors::Result;

/// Execute the `status` command.
pub fn execute(cli: &Cli) -> Result<()> {
    let (_settings, store) = open_bunker(cli)?;
    output::print_status_table(store.state());
    Ok(())
}
