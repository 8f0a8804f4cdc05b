//! CLI argument definitions for the kytheron daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Kytheron log-processing daemon.
///
/// Loads configured parser/output plugins, decodes the declarative
/// policies, and runs the ingress server and the stream processor.
#[derive(Parser, Debug)]
#[command(name = "kytheron")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to the kytheron.toml configuration file.
    #[arg(short, long, default_value = "/etc/kytheron/kytheron.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration and policies, then exit without starting.
    #[arg(long)]
    pub validate: bool,
}
