//! Constants and configuration values for the tunnelg supervisor.
//!
//! This module centralizes timings, file-layout names, and patterns used
//! throughout the lifecycle engine so that every wait loop stays bounded and
//! every on-disk name has a single definition.

use std::time::Duration;

// ============================================================================
// File System Layout
// ============================================================================

/// Name of the state directory under the user's home.
pub const STATE_DIR_NAME: &str = ".tunnelg";

/// Subdirectory of the state directory holding forwarder logs.
pub const LOGS_SUBDIR: &str = "logs";

/// Extension of per-tunnel PID records.
pub const PID_EXTENSION: &str = "pid";

/// Extension of per-tunnel descriptor files.
pub const CONFIG_EXTENSION: &str = "config";

/// Extension of per-tunnel forwarder logs.
pub const LOG_EXTENSION: &str = "log";

// ============================================================================
// Forwarder Invocation
// ============================================================================

/// Default forwarding binary, resolved on `PATH`.
pub const FORWARDER_BIN: &str = "cloudflared";

/// Environment variable overriding the forwarding binary.
pub const FORWARDER_ENV: &str = "TUNNELG_FORWARDER";

/// Subcommand passed to the forwarding binary.
pub const FORWARDER_SUBCOMMAND: &str = "tunnel";

/// Flag carrying the local URL argument.
pub const FORWARDER_URL_FLAG: &str = "--url";

/// Pattern of publicly reachable URLs in forwarder logs.
pub const PUBLIC_URL_PATTERN: &str = r"https://[a-zA-Z0-9-]+\.trycloudflare\.com";

// ============================================================================
// Descriptor Defaults
// ============================================================================

/// Port assumed when a descriptor omits or mangles its `PORT=` line.
pub const DEFAULT_PORT: u16 = 3000;

/// Format of the informational `START_TIME=` descriptor field.
pub const START_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ============================================================================
// Process Management Timing
// ============================================================================

/// Number of post-spawn checks for a forwarder that exits immediately.
pub const SPAWN_SETTLE_CHECKS: usize = 5;

/// Interval between post-spawn settle checks.
pub const SPAWN_SETTLE_INTERVAL: Duration = Duration::from_millis(100);

/// Number of liveness checks after SIGTERM before escalating to SIGKILL.
pub const GRACEFUL_EXIT_CHECKS: usize = 10;

/// Interval between post-SIGTERM liveness checks.
pub const GRACEFUL_EXIT_INTERVAL: Duration = Duration::from_millis(500);

/// Number of liveness checks after SIGKILL before giving up.
pub const KILL_SETTLE_CHECKS: usize = 10;

/// Interval between post-SIGKILL liveness checks.
pub const KILL_SETTLE_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// Logging and Output
// ============================================================================

/// Default number of lines returned by the recent-log window.
pub const DEFAULT_LOG_LINES: usize = 50;
