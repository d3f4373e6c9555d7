// Workload template: how one class of workload is run. Loaded once from
// configuration and never mutated afterwards.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use super::{RawMount, ResourceSpec};

pub const DEFAULT_PREFIX: &str = "jupyter";
pub const DEFAULT_PORT: u16 = 8888;
pub const DEFAULT_USER_ENV: &str = "JPY_USER";
pub const DEFAULT_PORT_ENV: &str = "JPY_PORT";
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How the endpoint of a running workload is reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointMode {
    /// Overlay address of the running task, or the service name when the
    /// task's address is not visible from the daemon we talk to.
    #[default]
    TaskAddress,
    /// Swarm service DNS name; resolvable from any container on the same network.
    ServiceName,
}

/// Location of the hub as seen from inside the swarm.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HubSpec {
    /// Hub API URL as the hub itself knows it, e.g. `http://127.0.0.1:8081/hub/api`.
    pub api_url: String,
    /// Name of the swarm service running the hub.
    pub service_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct WorkloadTemplate {
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub image: String,
    #[serde(default, deserialize_with = "one_or_many")]
    pub command: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub args: Vec<String>,
    #[serde(default)]
    pub mounts: Vec<RawMount>,
    #[serde(default)]
    pub resources: ResourceSpec,
    #[serde(default)]
    pub networks: Vec<String>,
    #[serde(default)]
    pub placement: Vec<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default = "default_start_timeout", with = "humantime_serde")]
    pub start_timeout: Duration,
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(default)]
    pub endpoint: EndpointMode,
    #[serde(default = "default_user_env")]
    pub user_env: String,
    #[serde(default = "default_port_env")]
    pub port_env: String,
    #[serde(default)]
    pub hub: Option<HubSpec>,
    #[serde(default)]
    pub notebook_dir: Option<String>,
}

impl WorkloadTemplate {
    /// Template with defaults everywhere except the image.
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            prefix: default_prefix(),
            image: image.into(),
            command: Vec::new(),
            args: Vec::new(),
            mounts: Vec::new(),
            resources: ResourceSpec::default(),
            networks: Vec::new(),
            placement: Vec::new(),
            port: DEFAULT_PORT,
            env: BTreeMap::new(),
            start_timeout: DEFAULT_START_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            endpoint: EndpointMode::default(),
            user_env: default_user_env(),
            port_env: default_port_env(),
            hub: None,
            notebook_dir: None,
        }
    }
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_user_env() -> String {
    DEFAULT_USER_ENV.to_string()
}

fn default_port_env() -> String {
    DEFAULT_PORT_ENV.to_string()
}

fn default_start_timeout() -> Duration {
    DEFAULT_START_TIMEOUT
}

fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

/// Accepts `args: /usr/local/bin/start.sh` as well as a list.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}
