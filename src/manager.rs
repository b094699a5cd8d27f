//! Lifecycle engine for forwarder-backed tunnels.
//!
//! [`TunnelManager`] owns every invariant: descriptors are written before
//! PID records, PID records only after the forwarder is confirmed alive,
//! and both are deleted together. It is stateless between invocations; each
//! call reconstructs the world from the store, and [`TunnelManager::list_tunnels`]
//! doubles as the reconciliation pass that purges entries whose process died
//! or whose PID record rotted.

use std::{
    fs::OpenOptions,
    io::ErrorKind,
    os::unix::process::CommandExt,
    path::PathBuf,
    process::{Command, Stdio},
    sync::OnceLock,
    thread,
};

use chrono::Local;
use nix::{
    errno::Errno,
    sys::signal::{self, Signal},
    unistd::Pid,
};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    constants::{
        FORWARDER_SUBCOMMAND, FORWARDER_URL_FLAG, GRACEFUL_EXIT_CHECKS,
        GRACEFUL_EXIT_INTERVAL, KILL_SETTLE_CHECKS, KILL_SETTLE_INTERVAL,
        SPAWN_SETTLE_CHECKS, SPAWN_SETTLE_INTERVAL, START_TIME_FORMAT,
    },
    error::TunnelManagerError,
    events::{EventSink, TunnelEvent},
    probe, runtime, scanner,
    store::{PidEntry, Protocol, TunnelDescriptor, TunnelStore},
};

/// Snapshot of one live tunnel, joined from its PID record, descriptor, and
/// log. Computed fresh on every listing; never cached or persisted.
#[derive(Debug, Clone, Serialize)]
pub struct TunnelView {
    /// Disambiguated tunnel id (the on-disk file stem).
    pub id: String,
    /// Display name as requested at start time.
    pub name: String,
    /// Local port being forwarded.
    pub port: u16,
    /// Local protocol being forwarded.
    pub protocol: Protocol,
    /// PID of the forwarding subprocess.
    pub pid: u32,
    /// Public URL advertised in the log, once the forwarder connects.
    pub public_url: Option<String>,
    /// Always true for emitted views; dead entries are purged instead.
    pub is_running: bool,
}

/// How a stop request resolved. Only genuine failures (permission denial, a
/// process surviving SIGKILL) are errors; these outcomes are all successes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The process was signalled and has exited; records are purged.
    Stopped,
    /// The process was already gone (or the record was rotten); records are
    /// purged.
    AlreadyStopped,
    /// No PID record exists for the id; nothing to do.
    NotFound,
}

/// Supervises forwarding subprocesses through the on-disk store.
pub struct TunnelManager {
    store: TunnelStore,
    forwarder: String,
    subscribers: Vec<Box<dyn EventSink>>,
}

impl TunnelManager {
    /// Creates a manager rooted at `base`, launching the forwarder resolved
    /// by [`runtime::forwarder_command`].
    pub fn new(base: PathBuf) -> Self {
        Self::with_forwarder(base, runtime::forwarder_command())
    }

    /// Creates a manager with an explicit forwarder command.
    pub fn with_forwarder(base: PathBuf, forwarder: impl Into<String>) -> Self {
        Self {
            store: TunnelStore::new(base),
            forwarder: forwarder.into(),
            subscribers: Vec::new(),
        }
    }

    /// The underlying record store.
    pub fn store(&self) -> &TunnelStore {
        &self.store
    }

    /// Registers a sink for lifecycle notifications.
    pub fn subscribe(&mut self, sink: impl EventSink + 'static) {
        self.subscribers.push(Box::new(sink));
    }

    /// Lists all live tunnels, purging stale entries along the way.
    ///
    /// This is the sole self-healing mechanism: a PID record whose contents
    /// do not parse, or whose process is gone, is removed together with its
    /// descriptor and skipped. Stale entries therefore never survive beyond
    /// one listing cycle.
    pub fn list_tunnels(&self) -> Vec<TunnelView> {
        let mut ids = self.store.list_candidate_ids();
        ids.sort();

        let mut views = Vec::with_capacity(ids.len());
        let mut purged = false;

        for id in ids {
            let pid = match self.store.read_pid(&id) {
                // Deleted by a concurrent invocation between enumeration and
                // read; a normal race, not an error.
                PidEntry::Missing => continue,
                PidEntry::Corrupt => {
                    warn!("Unparsable PID record for tunnel '{id}'; removing stale entry");
                    self.purge(&id);
                    purged = true;
                    continue;
                }
                PidEntry::Pid(pid) if !probe::is_alive(pid) => {
                    debug!("Tunnel '{id}' (pid {pid}) is gone; removing stale entry");
                    self.purge(&id);
                    purged = true;
                    continue;
                }
                PidEntry::Pid(pid) => pid,
            };

            let descriptor = self.store.read_descriptor(&id);
            let public_url = scanner::extract_public_url(&self.store.log_path(&id));

            views.push(TunnelView {
                id,
                name: descriptor.name,
                port: descriptor.port,
                protocol: descriptor.protocol,
                pid,
                public_url,
                is_running: true,
            });
        }

        if purged {
            self.notify(TunnelEvent::TunnelsChanged);
        }

        views
    }

    /// Starts a tunnel forwarding `protocol://localhost:port` and returns
    /// its disambiguated id.
    ///
    /// The descriptor is written first; the PID record only once the
    /// forwarder has survived the settle window and been re-confirmed
    /// alive. On any failure the descriptor (and any PID record) is removed
    /// again, so no partial state outlives the call.
    pub fn start_tunnel(
        &self,
        name: &str,
        port: u16,
        protocol: Protocol,
    ) -> Result<String, TunnelManagerError> {
        if port == 0 {
            return Err(TunnelManagerError::InvalidPort(port));
        }

        let sanitized = sanitize_name(name);
        let id = self.allocate_id(&sanitized);

        let descriptor = TunnelDescriptor {
            name: sanitized,
            port,
            protocol,
            start_time: Local::now().format(START_TIME_FORMAT).to_string(),
        };
        self.store
            .write_descriptor(&id, &descriptor)
            .map_err(|source| TunnelManagerError::StoreFailure {
                id: id.clone(),
                source,
            })?;

        let local_url = format!("{protocol}://localhost:{port}");
        let mut child = match self.spawn_forwarder(&id, &local_url) {
            Ok(child) => child,
            Err(err) => {
                self.purge(&id);
                return Err(err);
            }
        };
        let pid = child.id();

        if !probe::is_alive(pid) {
            let _ = child.wait();
            self.purge(&id);
            return Err(TunnelManagerError::ConfirmationFailure { id, pid });
        }

        if let Err(source) = self.store.write_pid(&id, pid) {
            // The forwarder is up but untrackable; take it down rather than
            // leak a process nothing can stop by id.
            let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            let _ = child.wait();
            self.purge(&id);
            return Err(TunnelManagerError::StoreFailure { id, source });
        }

        // Reap the forwarder whenever it exits so long-lived callers never
        // see a zombie masquerading as a live tunnel. Short-lived callers
        // exit first, and the orphaned forwarder is reparented to init.
        thread::spawn(move || {
            let _ = child.wait();
        });

        info!("Started tunnel '{id}' (pid {pid}) forwarding {local_url}");
        self.emit_message(format!("Started tunnel '{id}' with PID {pid}"));
        self.notify(TunnelEvent::TunnelsChanged);
        Ok(id)
    }

    /// Stops the tunnel behind `id`: SIGTERM, a bounded graceful wait, then
    /// SIGKILL.
    ///
    /// Stopping an id whose process already exited is a successful cleanup;
    /// stopping an unknown id is a no-op. On a genuine failure (permission
    /// denial, a process surviving SIGKILL) the records are left untouched,
    /// so the caller is never left believing a still-running tunnel is gone.
    pub fn stop_tunnel(&self, id: &str) -> Result<StopOutcome, TunnelManagerError> {
        let pid = match self.store.read_pid(id) {
            PidEntry::Missing => {
                debug!("Tunnel '{id}' not found");
                return Ok(StopOutcome::NotFound);
            }
            PidEntry::Corrupt => {
                warn!("Unparsable PID record for tunnel '{id}'; removing stale entry");
                self.purge(id);
                self.notify(TunnelEvent::TunnelsChanged);
                return Ok(StopOutcome::AlreadyStopped);
            }
            PidEntry::Pid(pid) => pid,
        };

        if !probe::is_alive(pid) {
            info!("Tunnel '{id}' (pid {pid}) already exited; cleaning up records");
            self.purge(id);
            self.notify(TunnelEvent::TunnelsChanged);
            return Ok(StopOutcome::AlreadyStopped);
        }

        self.deliver(id, pid, Signal::SIGTERM)?;

        let mut running = true;
        for _ in 0..GRACEFUL_EXIT_CHECKS {
            thread::sleep(GRACEFUL_EXIT_INTERVAL);
            if !probe::is_alive(pid) {
                running = false;
                break;
            }
        }

        if running {
            warn!("Tunnel '{id}' (pid {pid}) did not exit after SIGTERM; sending SIGKILL");
            self.deliver(id, pid, Signal::SIGKILL)?;

            for _ in 0..KILL_SETTLE_CHECKS {
                thread::sleep(KILL_SETTLE_INTERVAL);
                if !probe::is_alive(pid) {
                    running = false;
                    break;
                }
            }

            if running {
                return Err(TunnelManagerError::Unkillable {
                    id: id.to_string(),
                    pid,
                });
            }
        }

        self.purge(id);
        info!("Stopped tunnel '{id}' (pid {pid})");
        self.emit_message(format!("Stopped tunnel '{id}'"));
        self.notify(TunnelEvent::TunnelsChanged);
        Ok(StopOutcome::Stopped)
    }

    /// Stops every tunnel tracked in the store and returns how many were
    /// brought down (including already-dead entries that only needed their
    /// records purged). Individual failures are logged, never abort the
    /// batch.
    pub fn stop_all(&self) -> usize {
        let mut ids = self.store.list_candidate_ids();
        ids.sort();

        let mut stopped = 0;
        for id in ids {
            match self.stop_tunnel(&id) {
                Ok(StopOutcome::Stopped | StopOutcome::AlreadyStopped) => stopped += 1,
                Ok(StopOutcome::NotFound) => {}
                Err(err) => warn!("Failed to stop tunnel '{id}': {err}"),
            }
        }
        stopped
    }

    /// Returns the last `lines` lines of a tunnel's forwarder log, or a
    /// descriptive message when no log exists yet.
    pub fn read_recent_log(&self, id: &str, lines: usize) -> String {
        match scanner::tail(&self.store.log_path(id), lines) {
            Some(tail) => tail.join("\n"),
            None => format!("Log file for tunnel '{id}' does not exist"),
        }
    }

    /// Finds the first free id in the sequence `base`, `base_1`, `base_2`, …
    ///
    /// A PID file whose process is dead (or whose contents are unparsable)
    /// marks a free slot and is reused; only a live process forces the
    /// suffix onward. No separate allocator is needed.
    fn allocate_id(&self, base: &str) -> String {
        let mut candidate = base.to_string();
        let mut counter = 1;
        loop {
            match self.store.read_pid(&candidate) {
                PidEntry::Pid(pid) if probe::is_alive(pid) => {
                    candidate = format!("{base}_{counter}");
                    counter += 1;
                }
                _ => return candidate,
            }
        }
    }

    /// Spawns the forwarder detached into its own session, its combined
    /// output appended to the per-tunnel log, and watches the settle window
    /// for an immediate exit. Returns the child handle on survival.
    fn spawn_forwarder(
        &self,
        id: &str,
        local_url: &str,
    ) -> Result<std::process::Child, TunnelManagerError> {
        let log_path = self.store.log_path(id);
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|source| TunnelManagerError::SpawnFailure {
                id: id.to_string(),
                source,
            })?;
        let log_err = log
            .try_clone()
            .map_err(|source| TunnelManagerError::SpawnFailure {
                id: id.to_string(),
                source,
            })?;

        let mut cmd = Command::new(&self.forwarder);
        cmd.arg(FORWARDER_SUBCOMMAND)
            .arg(FORWARDER_URL_FLAG)
            .arg(local_url)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err));

        // New session: the forwarder must outlive this process and is only
        // ever stopped explicitly, by id.
        unsafe {
            cmd.pre_exec(|| {
                if libc::setsid() < 0 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(TunnelManagerError::ForwarderMissing {
                    command: self.forwarder.clone(),
                });
            }
            Err(source) => {
                return Err(TunnelManagerError::SpawnFailure {
                    id: id.to_string(),
                    source,
                });
            }
        };

        debug!("Forwarder for tunnel '{id}' spawned with PID {}", child.id());

        for _ in 0..SPAWN_SETTLE_CHECKS {
            thread::sleep(SPAWN_SETTLE_INTERVAL);
            match child.try_wait() {
                Ok(Some(status)) => {
                    return Err(TunnelManagerError::ExitedImmediately {
                        id: id.to_string(),
                        code: status.code(),
                    });
                }
                Ok(None) => {}
                Err(source) => {
                    return Err(TunnelManagerError::SpawnFailure {
                        id: id.to_string(),
                        source,
                    });
                }
            }
        }

        Ok(child)
    }

    /// Sends `sig` to `pid`. A process that disappeared first is fine; a
    /// permission error is surfaced without touching any records.
    fn deliver(
        &self,
        id: &str,
        pid: u32,
        sig: Signal,
    ) -> Result<(), TunnelManagerError> {
        match signal::kill(Pid::from_raw(pid as i32), sig) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(Errno::EPERM) => Err(TunnelManagerError::PermissionDenied {
                id: id.to_string(),
                pid,
            }),
            Err(errno) => Err(TunnelManagerError::SignalFailure {
                id: id.to_string(),
                pid,
                source: std::io::Error::from_raw_os_error(errno as i32),
            }),
        }
    }

    fn purge(&self, id: &str) {
        if let Err(err) = self.store.remove(id) {
            warn!("Failed to remove records for tunnel '{id}': {err}");
        }
    }

    fn notify(&self, event: TunnelEvent) {
        for sink in &self.subscribers {
            sink.handle(&event);
        }
    }

    fn emit_message(&self, message: impl Into<String>) {
        self.notify(TunnelEvent::Message(message.into()));
    }
}

/// Replaces every character outside `[A-Za-z0-9_-]` with `_`. A name that
/// sanitizes to nothing gets a generated token instead.
fn sanitize_name(name: &str) -> String {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern =
        PATTERN.get_or_init(|| Regex::new(r"[^A-Za-z0-9_-]").expect("sanitize pattern is valid"));

    let sanitized = pattern.replace_all(name, "_").to_string();
    if sanitized.is_empty() {
        format!("tunnel_{}", Local::now().timestamp_millis())
    } else {
        sanitized
    }
}
