// Configuration loading and management.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::docker::client::DEFAULT_DOCKER_HOST;
use crate::model::WorkloadTemplate;

pub const PROD: &str = "prod";
#[allow(dead_code)]
pub const DEV: &str = "dev";
#[allow(dead_code)]
pub const TEST: &str = "test";

pub const DEFAULT_API_VERSION: &str = "v1.41";
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);
const DOCKER_HOST_ENV: &str = "DOCKER_HOST";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Spawner {
    #[serde(rename = "spawner")]
    pub spawner: SpawnerBox,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SpawnerBox {
    #[serde(default = "default_env")]
    pub env: String,
    pub logs: Option<Logs>,
    pub docker: Option<Docker>,
    pub service: WorkloadTemplate,
    pub state: Option<State>,
    pub metrics: Option<Metrics>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Logs {
    pub level: Option<String>,
}

/// Connection to the Docker daemon managing the swarm.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Docker {
    /// Falls back to `$DOCKER_HOST`, then the local unix socket.
    pub host: Option<String>,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Network timeout of a single API call.
    #[serde(default = "default_call_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    pub tls: Option<TlsFiles>,
}

impl Docker {
    pub fn host(&self) -> String {
        self.host
            .clone()
            .or_else(|| std::env::var(DOCKER_HOST_ENV).ok().filter(|h| !h.is_empty()))
            .unwrap_or_else(|| DEFAULT_DOCKER_HOST.to_string())
    }
}

impl Default for Docker {
    fn default() -> Self {
        Self {
            host: None,
            api_version: default_api_version(),
            timeout: DEFAULT_CALL_TIMEOUT,
            tls: None,
        }
    }
}

/// PEM files for mutual TLS with the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TlsFiles {
    pub ca: PathBuf,
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Session store location; without it records live only in memory.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct State {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Metrics {
    pub enabled: bool,
    pub listen: Option<String>,
}

fn default_env() -> String {
    PROD.to_string()
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

fn default_call_timeout() -> Duration {
    DEFAULT_CALL_TIMEOUT
}

// Config trait
pub trait ConfigTrait {
    fn logs(&self) -> Option<&Logs>;
    fn is_prod(&self) -> bool;
    #[allow(dead_code)]
    fn is_test(&self) -> bool;
    fn docker(&self) -> Docker;
    fn service(&self) -> &WorkloadTemplate;
    fn state_path(&self) -> Option<&Path>;
    fn metrics(&self) -> Option<&Metrics>;
}

// Config type alias for convenience
pub type Config = Spawner;

impl ConfigTrait for Config {
    fn logs(&self) -> Option<&Logs> {
        self.spawner.logs.as_ref()
    }

    fn is_prod(&self) -> bool {
        self.spawner.env == PROD
    }

    fn is_test(&self) -> bool {
        self.spawner.env == TEST
    }

    fn docker(&self) -> Docker {
        self.spawner.docker.clone().unwrap_or_default()
    }

    fn service(&self) -> &WorkloadTemplate {
        &self.spawner.service
    }

    fn state_path(&self) -> Option<&Path> {
        self.spawner.state.as_ref()?.path.as_deref()
    }

    fn metrics(&self) -> Option<&Metrics> {
        self.spawner.metrics.as_ref()
    }
}

impl Config {
    /// Loads configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let abs_path = path
            .canonicalize()
            .with_context(|| format!("failed to resolve absolute config filepath: {:?}", path))?;

        let data = std::fs::read_to_string(&abs_path)
            .with_context(|| format!("read config yaml file {:?}", abs_path))?;

        let cfg = Self::parse(&data).with_context(|| format!("load config from {:?}", abs_path))?;
        Ok(cfg)
    }

    /// Parses and validates YAML text.
    pub fn parse(data: &str) -> Result<Self> {
        let cfg: Spawner = serde_yaml::from_str(data).context("unmarshal yaml")?;

        let service = &cfg.spawner.service;
        if service.image.trim().is_empty() {
            anyhow::bail!("spawner.service.image must be configured");
        }
        if service.prefix.is_empty() {
            anyhow::bail!("spawner.service.prefix must not be empty");
        }
        if service.poll_interval.is_zero() {
            anyhow::bail!("spawner.service.poll_interval must be positive");
        }
        if service.start_timeout < service.poll_interval {
            anyhow::bail!(
                "spawner.service.start_timeout ({:?}) is shorter than poll_interval ({:?})",
                service.start_timeout,
                service.poll_interval
            );
        }

        Ok(cfg)
    }
}

// Test config is always available for integration tests
mod test_config;
#[allow(dead_code)]
pub use test_config::new_test_config;
