//! On-disk tunnel state: descriptors and PID records.
//!
//! The state directory is a plain key-value store keyed by tunnel id, with
//! two co-located records per key: `<id>.pid` (a single decimal line) and
//! `<id>.config` (line-oriented `KEY=value`). Forwarder logs live under a
//! `logs/` subdirectory and are never deleted here. Concurrent supervisor
//! invocations share this directory without locking, so every read tolerates
//! records vanishing underneath it.

use std::{
    fs, io,
    io::ErrorKind,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::Serialize;
use strum_macros::{Display, EnumString};
use tracing::warn;

use crate::{
    constants::{
        CONFIG_EXTENSION, DEFAULT_PORT, LOG_EXTENSION, LOGS_SUBDIR, PID_EXTENSION,
    },
    error::TunnelManagerError,
};

/// Local protocol the forwarded service speaks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Protocol {
    /// Plain HTTP.
    #[default]
    Http,
    /// HTTPS with a locally trusted certificate.
    Https,
}

impl Protocol {
    /// Parses a protocol name, surfacing the supervisor's own error type
    /// instead of strum's terse one.
    pub fn parse(value: &str) -> Result<Self, TunnelManagerError> {
        Self::from_str(value)
            .map_err(|_| TunnelManagerError::InvalidProtocol(value.to_string()))
    }
}

/// User-facing configuration of a tunnel, one `.config` file per id.
#[derive(Debug, Clone, PartialEq)]
pub struct TunnelDescriptor {
    /// Display name; the id is its disambiguated form.
    pub name: String,
    /// Local port being forwarded.
    pub port: u16,
    /// Local protocol being forwarded.
    pub protocol: Protocol,
    /// Informational start timestamp, read back verbatim.
    pub start_time: String,
}

impl TunnelDescriptor {
    /// The descriptor assumed when the `.config` file is absent or mangled.
    pub fn defaults_for(id: &str) -> Self {
        Self {
            name: id.to_string(),
            port: DEFAULT_PORT,
            protocol: Protocol::default(),
            start_time: String::new(),
        }
    }
}

/// Outcome of reading a tunnel's PID record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PidEntry {
    /// No PID file, or it vanished between enumeration and read.
    Missing,
    /// A PID file exists but its contents do not parse as a PID.
    Corrupt,
    /// The recorded process id.
    Pid(u32),
}

/// Filesystem-backed store for tunnel records, rooted at a base directory.
///
/// Production code roots this at [`crate::runtime::base_dir`]; tests root it
/// at a tempdir.
#[derive(Debug, Clone)]
pub struct TunnelStore {
    base: PathBuf,
}

impl TunnelStore {
    /// Creates a store rooted at `base`. No directories are created until
    /// the first write.
    pub fn new(base: PathBuf) -> Self {
        Self { base }
    }

    /// The store's base directory.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Path of the PID record for `id`.
    pub fn pid_path(&self, id: &str) -> PathBuf {
        self.base.join(format!("{id}.{PID_EXTENSION}"))
    }

    /// Path of the descriptor for `id`.
    pub fn config_path(&self, id: &str) -> PathBuf {
        self.base.join(format!("{id}.{CONFIG_EXTENSION}"))
    }

    /// Path of the forwarder log for `id`.
    pub fn log_path(&self, id: &str) -> PathBuf {
        self.base
            .join(LOGS_SUBDIR)
            .join(format!("{id}.{LOG_EXTENSION}"))
    }

    /// Creates the base and log directories if they are missing.
    pub fn ensure_layout(&self) -> io::Result<()> {
        fs::create_dir_all(self.base.join(LOGS_SUBDIR))
    }

    /// Stems of all PID files currently present, in no particular order.
    ///
    /// A missing or unreadable base directory yields the empty set.
    pub fn list_candidate_ids(&self) -> Vec<String> {
        let entries = match fs::read_dir(&self.base) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension().and_then(|ext| ext.to_str()) != Some(PID_EXTENSION) {
                    return None;
                }
                path.file_stem()
                    .and_then(|stem| stem.to_str())
                    .map(str::to_string)
            })
            .collect()
    }

    /// Reads the PID record for `id`.
    ///
    /// Every I/O failure (including the file being deleted by a concurrent
    /// invocation) resolves to [`PidEntry::Missing`]; only a file that is
    /// present yet unparsable is [`PidEntry::Corrupt`].
    pub fn read_pid(&self, id: &str) -> PidEntry {
        let contents = match fs::read_to_string(self.pid_path(id)) {
            Ok(contents) => contents,
            Err(_) => return PidEntry::Missing,
        };

        match contents.trim().parse::<u32>() {
            Ok(pid) => PidEntry::Pid(pid),
            Err(_) => PidEntry::Corrupt,
        }
    }

    /// Writes the PID record for `id`, creating the layout on demand.
    pub fn write_pid(&self, id: &str, pid: u32) -> io::Result<()> {
        self.ensure_layout()?;
        fs::write(self.pid_path(id), format!("{pid}\n"))
    }

    /// Reads the descriptor for `id`, applying defaults for anything absent.
    ///
    /// Malformed lines are skipped individually; a missing or unreadable
    /// file yields the defaults wholesale. This never fails: a tunnel with a
    /// live process but a mangled descriptor is still worth surfacing.
    pub fn read_descriptor(&self, id: &str) -> TunnelDescriptor {
        let mut descriptor = TunnelDescriptor::defaults_for(id);

        let contents = match fs::read_to_string(self.config_path(id)) {
            Ok(contents) => contents,
            Err(_) => return descriptor,
        };

        for raw_line in contents.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                warn!("Ignoring malformed line in descriptor for '{id}': {line}");
                continue;
            };

            match key {
                "NAME" => descriptor.name = value.to_string(),
                "PORT" => match value.parse::<u16>() {
                    Ok(port) if port > 0 => descriptor.port = port,
                    _ => warn!("Ignoring malformed PORT in descriptor for '{id}': {value}"),
                },
                "PROTOCOL" => match value.parse::<Protocol>() {
                    Ok(protocol) => descriptor.protocol = protocol,
                    Err(_) => {
                        warn!("Ignoring malformed PROTOCOL in descriptor for '{id}': {value}")
                    }
                },
                "START_TIME" => descriptor.start_time = value.to_string(),
                _ => {}
            }
        }

        descriptor
    }

    /// Writes the descriptor for `id`, creating the layout on demand.
    pub fn write_descriptor(
        &self,
        id: &str,
        descriptor: &TunnelDescriptor,
    ) -> io::Result<()> {
        self.ensure_layout()?;
        let contents = format!(
            "NAME={}\nPORT={}\nPROTOCOL={}\nSTART_TIME={}\n",
            descriptor.name, descriptor.port, descriptor.protocol, descriptor.start_time
        );
        fs::write(self.config_path(id), contents)
    }

    /// Deletes the PID record and descriptor for `id`.
    ///
    /// Idempotent: files that are already gone are not errors. The PID file
    /// goes first so a concurrent reader never observes a PID record whose
    /// descriptor has already been deleted. The log is left in place.
    pub fn remove(&self, id: &str) -> io::Result<()> {
        remove_if_present(&self.pid_path(id))?;
        remove_if_present(&self.config_path(id))
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}
