pub mod bunker;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod daemon;
pub mod errors;
