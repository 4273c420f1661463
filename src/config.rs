use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use tracing::trace;

use crate::host::{DEFAULT_GROUP, Host, HostId};

/// Snapshot store configuration
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory store (nothing survives a restart)
    #[serde(rename = "none")]
    None,

    /// JSON snapshot file written with write-temp-then-rename
    Json {
        #[serde(default = "default_snapshot_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Json {
            path: default_snapshot_path(),
        }
    }
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("./hosts.json")
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub timing: TimingConfig,

    /// Hosts added on startup unless a host with the same id already exists
    #[serde(default)]
    pub hosts: Vec<HostConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Seconds between probe cycles
    pub poll_interval: u64,

    /// Per-probe timeout in milliseconds
    pub timeout_ms: u64,

    /// Maximum concurrent probes
    pub max_workers: usize,

    /// Seconds a host must keep failing before it is reported offline
    pub offline_grace: u64,

    /// TCP port used by the connect probe
    pub probe_port: u16,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: 10,
            timeout_ms: 2000,
            max_workers: 20,
            offline_grace: 0,
            probe_port: 80,
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn offline_grace(&self) -> Duration {
        Duration::from_secs(self.offline_grace)
    }
}

/// Coalescing windows and flush timers
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub view_window_ms: u64,
    pub aggregate_window_ms: u64,
    pub probe_list_window_ms: u64,
    pub flush_interval_secs: u64,
    pub force_flush_timeout_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            view_window_ms: 100,
            aggregate_window_ms: 500,
            probe_list_window_ms: 200,
            flush_interval_secs: 30,
            force_flush_timeout_secs: 5,
        }
    }
}

impl TimingConfig {
    pub fn view_window(&self) -> Duration {
        Duration::from_millis(self.view_window_ms)
    }

    pub fn aggregate_window(&self) -> Duration {
        Duration::from_millis(self.aggregate_window_ms)
    }

    pub fn probe_list_window(&self) -> Duration {
        Duration::from_millis(self.probe_list_window_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn force_flush_timeout(&self) -> Duration {
        Duration::from_secs(self.force_flush_timeout_secs)
    }
}

/// A host declared in the configuration file
#[derive(Debug, Clone, serde::Deserialize)]
pub struct HostConfig {
    /// Stable id; generated if absent
    pub id: Option<String>,
    pub address: String,
    pub display: Option<String>,
    pub group: Option<String>,
    #[serde(default = "default_notifications")]
    pub notifications: bool,
}

fn default_notifications() -> bool {
    true
}

impl HostConfig {
    pub fn to_host(&self) -> Host {
        let display = self.display.clone().unwrap_or_else(|| self.address.clone());
        let host = Host::new(self.address.clone(), display)
            .with_group(self.group.clone().unwrap_or_else(|| DEFAULT_GROUP.to_string()))
            .with_notifications(self.notifications);

        match &self.id {
            Some(id) => host.with_id(HostId::new(id.clone())),
            None => host,
        }
    }
}

impl Config {
    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> anyhow::Result<()> {
        let monitor = &self.monitor;

        if !(1..=3600).contains(&monitor.poll_interval) {
            bail!(
                "monitor.poll_interval must be between 1 and 3600 seconds, got {}",
                monitor.poll_interval
            );
        }
        if !(1..=100).contains(&monitor.max_workers) {
            bail!(
                "monitor.max_workers must be between 1 and 100, got {}",
                monitor.max_workers
            );
        }
        if monitor.timeout_ms == 0 {
            bail!("monitor.timeout_ms must be positive");
        }

        let timing = &self.timing;
        if timing.flush_interval_secs == 0 {
            bail!("timing.flush_interval_secs must be positive");
        }
        if timing.force_flush_timeout_secs == 0 {
            bail!("timing.force_flush_timeout_secs must be positive");
        }

        for host in &self.hosts {
            host.to_host()
                .validate()
                .with_context(|| format!("invalid host '{}' in config", host.address))?;
        }

        Ok(())
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read config {path}"))?;
    let config: Config = serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))?;

    config.validate()?;
    trace!("loaded config: {config:?}");
    Ok(config)
}
