//! Error handling for tunnelg.
use thiserror::Error;

/// Defines all possible errors that can occur in the tunnel supervisor.
///
/// Benign conditions (stopping a tunnel that already exited, stopping an id
/// that does not exist) are deliberately *not* errors; they are reported as
/// [`crate::manager::StopOutcome`] values. Corrupt on-disk state is self-healed
/// by the lifecycle engine and logged, never raised.
#[derive(Debug, Error)]
pub enum TunnelManagerError {
    /// Requested port falls outside the valid TCP range.
    #[error("Invalid port {0}: must be between 1 and 65535")]
    InvalidPort(u16),

    /// Requested protocol is not one the forwarder can serve.
    #[error("Invalid protocol '{0}': must be http or https")]
    InvalidProtocol(String),

    /// The forwarding binary could not be resolved on the execution path.
    #[error("Forwarding binary '{command}' not found on PATH")]
    ForwarderMissing {
        /// The command that failed to resolve.
        command: String,
    },

    /// Error launching the forwarding subprocess.
    #[error("Failed to launch forwarder for tunnel '{id}': {source}")]
    SpawnFailure {
        /// The tunnel id being started.
        id: String,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// The forwarder exited within the settle window after spawning.
    #[error("Forwarder for tunnel '{id}' exited during startup (code {code:?})")]
    ExitedImmediately {
        /// The tunnel id being started.
        id: String,
        /// Exit code, when the process terminated normally.
        code: Option<i32>,
    },

    /// The spawned forwarder could not be confirmed alive afterwards.
    #[error("Tunnel '{id}' could not be confirmed running (pid {pid})")]
    ConfirmationFailure {
        /// The tunnel id being started.
        id: String,
        /// The PID reported by the spawn.
        pid: u32,
    },

    /// The OS rejected a termination signal.
    #[error("Permission denied signalling pid {pid} of tunnel '{id}'")]
    PermissionDenied {
        /// The tunnel id being stopped.
        id: String,
        /// The PID the signal was aimed at.
        pid: u32,
    },

    /// Signal delivery failed for a reason other than permissions.
    #[error("Failed to signal pid {pid} of tunnel '{id}': {source}")]
    SignalFailure {
        /// The tunnel id being stopped.
        id: String,
        /// The PID the signal was aimed at.
        pid: u32,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// The process survived SIGKILL through the settle window.
    #[error("Tunnel '{id}' (pid {pid}) is still running after SIGKILL")]
    Unkillable {
        /// The tunnel id being stopped.
        id: String,
        /// The PID that refused to die.
        pid: u32,
    },

    /// Error persisting descriptor or PID records.
    #[error("Failed to persist records for tunnel '{id}': {source}")]
    StoreFailure {
        /// The tunnel id whose records could not be written.
        id: String,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },
}
