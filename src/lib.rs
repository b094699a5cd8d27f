//! Tunnelg supervises externally-spawned forwarding subprocesses ("tunnels")
//! that expose a local network port publicly. All state lives on disk as
//! per-tunnel PID and descriptor files, so every invocation reconstructs the
//! world from the filesystem and stale entries are reconciled lazily while
//! listing. The forwarding binary itself is an opaque external dependency.

/// CLI interface.
pub mod cli;

/// Named timings, file-layout names, and patterns.
pub mod constants;

/// Error handling.
pub mod error;

/// Change notifications for presentation layers.
pub mod events;

/// Lifecycle engine: start, stop, list, reconcile.
pub mod manager;

/// Process liveness probing.
pub mod probe;

/// Runtime paths and forwarder resolution.
pub mod runtime;

/// Log scanning: public URL extraction and tailing.
pub mod scanner;

/// On-disk tunnel state: descriptors and PID records.
pub mod store;

/// Shared helpers for tests that mutate process-global state.
pub mod test_utils;
