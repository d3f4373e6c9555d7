//! Docker Engine implementation of [`Orchestrator`] on top of bollard.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use bollard::container::InspectContainerOptions;
use bollard::network::ListNetworksOptions;
use bollard::service::InspectServiceOptions;
use bollard::task::ListTasksOptions;
use bollard::{ClientVersion, Docker};
use std::collections::HashMap;
use tracing::debug;

use super::convert;
use super::error::OrchestratorError;
use super::types::{ServiceDescriptor, TaskAddress, TaskDescriptor, TaskState};
use super::Orchestrator;
use crate::config::Docker as DockerConfig;
use crate::model::ServiceRequest;

pub const DEFAULT_DOCKER_HOST: &str = "unix:///var/run/docker.sock";

/// Where the daemon listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DockerHost {
    /// `unix://` address, kept whole.
    Unix(String),
    /// `tcp://host:port` or `http://host:port`.
    Http(String),
    /// Address of a daemon that requires mutual TLS.
    Tls(String),
}

impl DockerHost {
    /// Parses `unix://`, `tcp://`, `http://` and `https://` addresses.
    /// `tcp://` becomes TLS when client certificates are configured.
    pub fn parse(host: &str, tls: bool) -> Result<Self> {
        let host = host.trim().trim_end_matches('/');
        if let Some(path) = host.strip_prefix("unix://") {
            if path.is_empty() {
                bail!("docker host {:?} has an empty socket path", host);
            }
            return Ok(Self::Unix(host.to_string()));
        }
        if let Some(addr) = host.strip_prefix("https://") {
            if !tls {
                bail!("docker host {:?} needs docker.tls certificates", host);
            }
            return Ok(Self::Tls(format!("tcp://{}", addr)));
        }
        if host.starts_with("tcp://") || host.starts_with("http://") {
            return Ok(if tls {
                Self::Tls(host.replacen("http://", "tcp://", 1))
            } else {
                Self::Http(host.to_string())
            });
        }
        bail!("unsupported docker host {:?} (expected unix://, tcp://, http:// or https://)", host)
    }
}

/// Parses `v1.41` (or `1.41`) into the version bollard prefixes paths with.
pub fn parse_api_version(raw: &str) -> Result<ClientVersion> {
    let trimmed = raw.trim().trim_matches('/');
    let version = trimmed.strip_prefix('v').unwrap_or(trimmed);
    let parsed = version
        .split_once('.')
        .and_then(|(major, minor)| Some((major.parse().ok()?, minor.parse().ok()?)));
    match parsed {
        Some((major_version, minor_version)) => Ok(ClientVersion {
            major_version,
            minor_version,
        }),
        None => bail!("invalid docker api version {:?} (expected e.g. v1.41)", raw),
    }
}

/// Classifies a bollard failure: daemon replies by status, everything else
/// (connection, socket, timeout) is worth retrying.
pub(crate) fn map_error(err: bollard::errors::Error) -> OrchestratorError {
    match err {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } => OrchestratorError::from_status(status_code, message),
        other => OrchestratorError::Transient(other.to_string()),
    }
}

#[derive(Clone)]
pub struct DockerClient {
    docker: Docker,
}

impl DockerClient {
    /// Builds a client from configuration. Does not contact the daemon.
    pub fn new(cfg: &DockerConfig) -> Result<Self> {
        let host = DockerHost::parse(&cfg.host(), cfg.tls.is_some())?;
        let version = parse_api_version(&cfg.api_version)?;
        let timeout = cfg.timeout.as_secs().max(1);

        let docker = match (&host, &cfg.tls) {
            (DockerHost::Unix(addr), _) => Docker::connect_with_unix(addr, timeout, &version),
            (DockerHost::Http(addr), _) => Docker::connect_with_http(addr, timeout, &version),
            (DockerHost::Tls(addr), Some(tls)) => {
                Docker::connect_with_ssl(addr, &tls.key, &tls.cert, &tls.ca, timeout, &version)
            }
            (DockerHost::Tls(_), None) => bail!("docker host {:?} needs docker.tls certificates", host),
        }
        .with_context(|| format!("failed to set up docker client for {:?}", host))?;

        Ok(Self { docker })
    }

    /// Overlay addresses of a task's container. Only containers on the node
    /// this daemon runs are visible; others report none.
    async fn container_addresses(&self, container: &str) -> Vec<TaskAddress> {
        match self
            .docker
            .inspect_container(container, None::<InspectContainerOptions>)
            .await
        {
            Ok(inspected) => convert::container_addresses(inspected),
            Err(e) => {
                debug!(
                    component = "docker",
                    event = "container_not_visible",
                    container,
                    error = %e,
                    "task container not inspectable from this node"
                );
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl Orchestrator for DockerClient {
    async fn create_service(&self, req: &ServiceRequest) -> Result<String, OrchestratorError> {
        let created = self
            .docker
            .create_service(convert::service_spec(req), None)
            .await
            .map_err(map_error)?;
        debug!(component = "docker", event = "service_created", service = %req.name, "service created");
        created
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| OrchestratorError::Decode(format!("create of {} returned no id", req.name)))
    }

    async fn inspect_service(&self, service: &str) -> Result<ServiceDescriptor, OrchestratorError> {
        self.docker
            .inspect_service(service, None::<InspectServiceOptions>)
            .await
            .map(convert::service_descriptor)
            .map_err(map_error)
    }

    async fn list_tasks(&self, service: &str) -> Result<Vec<TaskDescriptor>, OrchestratorError> {
        let filters = HashMap::from([("service", vec![service])]);
        let tasks = self
            .docker
            .list_tasks(Some(ListTasksOptions { filters }))
            .await
            .map_err(map_error)?;

        let mut out = Vec::with_capacity(tasks.len());
        for task in tasks {
            let container = convert::task_container_id(&task);
            let mut descriptor = convert::task_descriptor(task);
            if let (TaskState::Running, Some(container)) = (descriptor.state, container) {
                descriptor.addresses = self.container_addresses(&container).await;
            }
            out.push(descriptor);
        }
        Ok(out)
    }

    async fn remove_service(&self, service: &str) -> Result<(), OrchestratorError> {
        self.docker.delete_service(service).await.map_err(map_error)
    }

    async fn resolve_network_ids(&self, names: &[String]) -> Result<Vec<String>, OrchestratorError> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let networks = self
            .docker
            .list_networks(None::<ListNetworksOptions<String>>)
            .await
            .map_err(map_error)?;
        convert::match_networks(names, &networks)
    }
}
