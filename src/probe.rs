//! Non-destructive process liveness checks.

use nix::{errno::Errno, sys::signal, unistd::Pid};

/// Returns whether a process with the given PID currently exists.
///
/// Uses the zero-signal probe: `kill(pid, 0)` delivers nothing but still
/// performs the existence and permission checks. Only `ESRCH` means the
/// process is gone; a permission error means it exists but belongs to
/// someone we cannot signal, which still counts as alive.
pub fn is_alive(pid: u32) -> bool {
    match signal::kill(Pid::from_raw(pid as i32), None) {
        Ok(()) => true,
        Err(Errno::ESRCH) => false,
        Err(_) => true,
    }
}
