//! Configuration loaded from `knox.toml`.

pub mod settings;

pub use settings::Settings;
