//! Runtime paths and forwarder resolution.

use std::{env, path::PathBuf};

use crate::constants::{FORWARDER_BIN, FORWARDER_ENV, STATE_DIR_NAME};

/// Base directory for tunnel state (`$HOME/.tunnelg`).
///
/// `HOME` is read on every call so tests can repoint it. Falls back to the
/// filesystem root when unset.
pub fn base_dir() -> PathBuf {
    let home = env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/"));
    home.join(STATE_DIR_NAME)
}

/// Command used to launch the forwarding binary.
///
/// Defaults to `cloudflared`; overridable through `TUNNELG_FORWARDER` so
/// deployments can pin an absolute path and tests can substitute a stub.
pub fn forwarder_command() -> String {
    env::var(FORWARDER_ENV).unwrap_or_else(|_| FORWARDER_BIN.to_string())
}
