//! Configuration for the cinder server.
//!
//! Settings persist to disk as `config.ron`. Command-line flags override the
//! file, missing fields fall back to defaults, and a running server can poll
//! for edits with [`Config::reload`].

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    Config, EntityConfig, LoggingConfig, NetworkConfig, ProtocolConfig, ServerConfig, WorldConfig,
};
pub use error::ConfigError;
