//! Command-line interface for Tunnelg.
use std::str::FromStr;

use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;

use crate::{
    constants::{DEFAULT_LOG_LINES, DEFAULT_PORT},
    store::Protocol,
};

/// Wrapper around `LevelFilter` so clap can parse log levels by name.
#[derive(Clone, Copy, Debug)]
pub struct LogLevelArg(LevelFilter);

impl LogLevelArg {
    /// String representation suitable for `RUST_LOG`.
    pub fn as_str(&self) -> &'static str {
        match self.0 {
            LevelFilter::OFF => "off",
            LevelFilter::ERROR => "error",
            LevelFilter::WARN => "warn",
            LevelFilter::INFO => "info",
            LevelFilter::DEBUG => "debug",
            LevelFilter::TRACE => "trace",
        }
    }
}

impl FromStr for LogLevelArg {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let level = match value.trim().to_ascii_lowercase().as_str() {
            "off" => LevelFilter::OFF,
            "error" => LevelFilter::ERROR,
            "warn" | "warning" => LevelFilter::WARN,
            "info" => LevelFilter::INFO,
            "debug" => LevelFilter::DEBUG,
            "trace" => LevelFilter::TRACE,
            other => return Err(format!("invalid log level '{other}'")),
        };
        Ok(LogLevelArg(level))
    }
}

/// Parses `--protocol`, mapping the parse failure to an actionable message.
fn parse_protocol(value: &str) -> Result<Protocol, String> {
    Protocol::parse(value).map_err(|err| err.to_string())
}

/// Command-line interface for Tunnelg.
#[derive(Parser)]
#[command(name = "tunnelg", version, author)]
#[command(about = "A supervisor for ephemeral public tunnels", long_about = None)]
pub struct Cli {
    /// Override the logging verbosity for this invocation only.
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevelArg>,

    /// The command to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for tunnelg.
#[derive(Subcommand)]
pub enum Commands {
    /// Start a new tunnel exposing a local port.
    Start {
        /// Display name for the tunnel; sanitized and disambiguated into its id.
        name: String,

        /// Local port to forward.
        #[arg(short, long, default_value_t = DEFAULT_PORT, value_parser = clap::value_parser!(u16).range(1..))]
        port: u16,

        /// Local protocol the forwarded service speaks.
        #[arg(long, default_value_t = Protocol::Http, value_parser = parse_protocol)]
        protocol: Protocol,
    },

    /// Stop a running tunnel by id.
    Stop {
        /// Id of the tunnel to stop.
        id: String,
    },

    /// Stop every tunnel tracked in the state directory.
    StopAll,

    /// List live tunnels, reconciling stale entries along the way.
    List {
        /// Emit machine-readable JSON output instead of plain lines.
        #[arg(long)]
        json: bool,
    },

    /// Show the tail of a tunnel's forwarder log.
    Logs {
        /// Id of the tunnel whose log should be displayed.
        id: String,

        /// Number of lines to show.
        #[arg(short, long, default_value_t = DEFAULT_LOG_LINES)]
        lines: usize,
    },
}

/// Parses command-line arguments and returns a `Cli` struct.
pub fn parse_args() -> Cli {
    Cli::parse()
}
