use clap::Parser;
use knox::cli::{Cli, Commands};
use knox::config::Settings;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    init_tracing();

    let result = match cli.command {
        Commands::Init => knox::cli::commands::init::execute(&cli),
        Commands::Add { ref name } => knox::cli::commands::add::execute(&cli, name),
        Commands::Remove { ref name } => knox::cli::commands::remove::execute(&cli, name),
        Commands::Uri {
            ref name,
            ref relays,
            ref uses,
            unlimited,
            ref expires,
        } => knox::cli::commands::uri::execute(
            &cli,
            name,
            relays,
            uses.as_deref(),
            unlimited,
            expires.as_deref(),
        ),
        Commands::Status => knox::cli::commands::status::execute(&cli),
        Commands::Start => knox::cli::commands::start::execute(&cli),
        Commands::Export {
            ref format,
            keys,
            insecure,
        } => knox::cli::commands::export::execute(&cli, format, keys, insecure),
    };

    if let Err(e) = result {
        knox::cli::output::error(&e.to_string());
        std::process::exit(1);
    }
}

/// Logs go to stderr.  `KNOX_LOG` wins over `log_level` in knox.toml.
fn init_tracing() {
    let log_level = std::env::current_dir()
        .ok()
        .and_then(|cwd| Settings::load(&cwd).ok())
        .unwrap_or_default()
        .log_level;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("KNOX_LOG")
                .unwrap_or_else(|_| format!("knox={log_level},warn").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
