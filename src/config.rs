use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, SnowflakeError};

/// How hard `stop()` tries before giving up on a process.
///
/// The first attempt sends a graceful termination signal, every further
/// attempt kills the process outright. Attempts are separated by `pause_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StopPolicy {
    pub attempts: u32,
    pub pause_ms: u64,
}

impl Default for StopPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            pause_ms: 500,
        }
    }
}

impl StopPolicy {
    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }
}

/// A system service exposed as a custom job.
///
/// Every command runs through `sh -c`. The service counts as alive while the
/// output of `status` contains `running_marker`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceJobConfig {
    pub name: String,
    /// Exits successfully iff the service is installed
    pub check: String,
    pub start: String,
    pub stop: String,
    pub status: String,
    pub running_marker: String,
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub host: String,
    pub port: u16,
    pub tick_interval_ms: u64,
    pub stop: StopPolicy,
    /// Per-stream cap on captured process output
    pub output_limit_bytes: usize,
    pub shutdown_grace_ms: u64,
    pub services: Vec<ServiceJobConfig>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            tick_interval_ms: 1000,
            stop: StopPolicy::default(),
            output_limit_bytes: 64 * 1024,
            shutdown_grace_ms: 5000,
            services: Vec::new(),
        }
    }
}

impl DaemonConfig {
    /// Load a JSON config file. Missing keys fall back to their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SnowflakeError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| SnowflakeError::Config(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(SnowflakeError::Config(
                "tick_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.stop.attempts == 0 {
            return Err(SnowflakeError::Config(
                "stop.attempts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| {
                SnowflakeError::Config(format!(
                    "invalid listen address {}:{}: {}",
                    self.host, self.port, e
                ))
            })
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}
