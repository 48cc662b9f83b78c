//! Command-line argument parsing for the cinder server.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Cinder server command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "cinder", about = "Cinder game server")]
pub struct CliArgs {
    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// TCP port to listen on.
    #[arg(long)]
    pub port: Option<u16>,

    /// Default protocol version, e.g. 1.16.5.
    #[arg(long = "ver")]
    pub version: Option<String>,

    /// Skip account verification.
    #[arg(long)]
    pub offline: bool,

    /// Write JSON logs to the log directory.
    #[arg(long)]
    pub log: bool,

    /// Make every player an operator.
    #[arg(long)]
    pub op: bool,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Maximum number of live entities.
    #[arg(long)]
    pub max_entities: Option<usize>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(port) = args.port {
            self.server.port = port;
        }
        if let Some(ref version) = args.version {
            self.protocol.version = version.clone();
        }
        if args.offline {
            self.server.online_mode = false;
        }
        if args.log {
            self.logging.file_logging = true;
        }
        if args.op {
            self.server.everybody_op = true;
        }
        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
        if let Some(max) = args.max_entities {
            self.entities.max_entities = max;
        }
    }
}
