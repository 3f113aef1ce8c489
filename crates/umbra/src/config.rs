//! Daemon configuration, loaded once at startup from a TOML file.
//!
//! Missing files and unparseable files fall back to defaults with a log
//! line; values are immutable for the process lifetime.

use std::path::PathBuf;
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::session::{SessionSettings, WorkerCommand};

/// Config file structure (`umbrad.toml`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ConfigFile {
    pub server: ServerSection,
    pub port_pool: PortPoolSection,
    pub session: SessionSection,
    pub worker: WorkerSection,
    pub audit: AuditSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Address the HTTP API binds to.
    pub bind: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8420".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortPoolSection {
    /// First worker port (inclusive).
    pub start: u16,
    /// End of the worker port range (exclusive).
    pub end: u16,
}

impl Default for PortPoolSection {
    fn default() -> Self {
        Self {
            start: 9000,
            end: 9100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// Seconds of inactivity before a session is reaped.
    pub idle_timeout_secs: u64,
    /// Reaper sweep cadence in seconds.
    pub reap_interval_secs: u64,
    /// Hard deadline for the readiness handshake, in seconds.
    pub ready_timeout_secs: u64,
    /// Grace period before a worker is force-killed, in seconds.
    pub terminate_timeout_secs: u64,
    /// Per-call deadline for forwarded commands, in seconds.
    pub proxy_timeout_secs: u64,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 1800,
            reap_interval_secs: 60,
            ready_timeout_secs: 30,
            terminate_timeout_secs: 3,
            proxy_timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSection {
    /// Worker executable. The reserved port is appended as the final argument.
    pub binary: String,
    /// Arguments placed before the port.
    pub args: Vec<String>,
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            binary: "umbra-worker".to_string(),
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AuditSection {
    /// Audit database path. Defaults to `$XDG_DATA_HOME/umbra/audit.db`.
    pub db_path: Option<String>,
}

impl ConfigFile {
    /// Load from the given path, or the default location.
    pub fn load(path: Option<PathBuf>) -> Self {
        let path = path.unwrap_or_else(Self::default_path);
        if !path.exists() {
            debug!("Config file {:?} not found, using defaults", path);
            return Self::default();
        }
        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    info!("Loaded config from {:?}", path);
                    config
                }
                Err(e) => {
                    warn!("Failed to parse config {:?}: {}, using defaults", path, e);
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read config {:?}: {}, using defaults", path, e);
                Self::default()
            }
        }
    }

    pub fn default_path() -> PathBuf {
        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".config")
            });
        config_dir.join("umbra").join("umbrad.toml")
    }

    /// Resolved audit database path.
    pub fn audit_db_path(&self) -> PathBuf {
        if let Some(ref path) = self.audit.db_path {
            return PathBuf::from(path);
        }
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local").join("share")
            });
        data_dir.join("umbra").join("audit.db")
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            idle_timeout: Duration::from_secs(self.session.idle_timeout_secs),
            reap_interval: Duration::from_secs(self.session.reap_interval_secs),
            ready_timeout: Duration::from_secs(self.session.ready_timeout_secs),
            terminate_timeout: Duration::from_secs(self.session.terminate_timeout_secs),
            proxy_timeout: Duration::from_secs(self.session.proxy_timeout_secs),
        }
    }

    pub fn worker_command(&self) -> WorkerCommand {
        WorkerCommand {
            binary: self.worker.binary.clone(),
            args: self.worker.args.clone(),
        }
    }
}
