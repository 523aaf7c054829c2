//! `knox start`: run the signer daemon in the foreground.

use crate::cli::output;
use crate::cli::{open_bunker, Cli};
use crate::daemon::{run_daemon, LocalSessionFactory};
use crate::errors::{KnoxError, Result};

/// Execute the `start` command.
pub fn execute(cli: &Cli) -> Result<()> {
    let (settings, store) = open_bunker(cli)?;

    if store.state().authorizations.is_empty() {
        output::warning("No authorizations found.");
        output::tip("Run `knox uri <name> <relay>` to generate one.");
        return Ok(());
    }

    let path = store.path().to_path_buf();
    let cipher = store.cipher().clone();
    drop(store);

    output::info("Starting bunker daemon...");
    output::tip("Press Ctrl+C to stop.");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| KnoxError::CommandFailed(format!("failed to start runtime: {e}")))?;

    runtime.block_on(run_daemon(
        path,
        cipher,
        LocalSessionFactory::new(),
        settings.debounce(),
    ))
}
