//! Command implementations, one module per subcommand.

pub mod add;
pub mod export;
pub mod init;
pub mod remove;
pub mod start;
pub mod status;
pub mod uri;
