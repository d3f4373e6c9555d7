// Conversions between the adapter types and the bollard Engine API models.

use bollard::models::{
    ContainerInspectResponse, Limit, Mount, MountTypeEnum, MountVolumeOptions,
    MountVolumeOptionsDriverConfig, Network, NetworkAttachmentConfig, ResourceObject, Service,
    ServiceSpec, Task, TaskSpec, TaskSpecContainerSpec, TaskSpecPlacement, TaskSpecResources,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use super::error::OrchestratorError;
use super::types::{ServiceDescriptor, TaskAddress, TaskDescriptor, TaskState};
use crate::model::{MountSpec, ResourceSpec, ServiceRequest};

pub(crate) fn service_spec(req: &ServiceRequest) -> ServiceSpec {
    let non_empty = |v: &[String]| (!v.is_empty()).then(|| v.to_vec());

    let container = TaskSpecContainerSpec {
        image: Some(req.image.clone()),
        command: non_empty(&req.command),
        args: non_empty(&req.args),
        env: (!req.env.is_empty())
            .then(|| req.env.iter().map(|(k, v)| format!("{}={}", k, v)).collect()),
        mounts: (!req.mounts.is_empty()).then(|| req.mounts.iter().map(mount).collect()),
        ..Default::default()
    };

    ServiceSpec {
        name: Some(req.name.clone()),
        labels: Some(req.labels.clone().into_iter().collect()),
        task_template: Some(TaskSpec {
            container_spec: Some(container),
            resources: resources(&req.resources),
            placement: non_empty(&req.placement).map(|constraints| TaskSpecPlacement {
                constraints: Some(constraints),
                ..Default::default()
            }),
            networks: (!req.networks.is_empty()).then(|| {
                req.networks
                    .iter()
                    .map(|id| NetworkAttachmentConfig {
                        target: Some(id.clone()),
                        ..Default::default()
                    })
                    .collect()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn mount(spec: &MountSpec) -> Mount {
    match spec {
        MountSpec::Bind {
            host_path,
            container_path,
            read_only,
        } => Mount {
            typ: Some(MountTypeEnum::BIND),
            source: Some(host_path.clone()),
            target: Some(container_path.clone()),
            read_only: Some(*read_only),
            ..Default::default()
        },
        MountSpec::NamedVolume {
            volume_name,
            container_path,
            read_only,
            driver,
        } => Mount {
            typ: Some(MountTypeEnum::VOLUME),
            source: Some(volume_name.clone()),
            target: Some(container_path.clone()),
            read_only: Some(*read_only),
            volume_options: driver.as_ref().map(|d| MountVolumeOptions {
                driver_config: Some(MountVolumeOptionsDriverConfig {
                    name: Some(d.name.clone()),
                    options: (!d.options.is_empty())
                        .then(|| d.options.clone().into_iter().collect()),
                }),
                ..Default::default()
            }),
            ..Default::default()
        },
        MountSpec::AnonymousVolume {
            container_path,
            read_only,
        } => Mount {
            typ: Some(MountTypeEnum::VOLUME),
            target: Some(container_path.clone()),
            read_only: Some(*read_only),
            ..Default::default()
        },
    }
}

fn resources(spec: &ResourceSpec) -> Option<TaskSpecResources> {
    if !spec.has_limits() && !spec.has_reservations() {
        return None;
    }
    Some(TaskSpecResources {
        limits: spec.has_limits().then(|| Limit {
            nano_cpus: spec.cpu_limit.map(saturating_i64),
            memory_bytes: spec.mem_limit.map(saturating_i64),
            ..Default::default()
        }),
        reservations: spec.has_reservations().then(|| ResourceObject {
            nano_cpus: spec.cpu_reservation.map(saturating_i64),
            memory_bytes: spec.mem_reservation.map(saturating_i64),
            ..Default::default()
        }),
    })
}

fn saturating_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

pub(crate) fn service_descriptor(svc: Service) -> ServiceDescriptor {
    let spec = svc.spec.unwrap_or_default();
    ServiceDescriptor {
        id: svc.id.unwrap_or_default(),
        name: spec.name.unwrap_or_default(),
        labels: spec.labels.unwrap_or_default().into_iter().collect(),
        created_at: svc.created_at.as_deref().and_then(parse_time),
    }
}

/// Addresses are filled in separately from the task's container.
pub(crate) fn task_descriptor(task: Task) -> TaskDescriptor {
    let status = task.status.unwrap_or_default();
    TaskDescriptor {
        id: task.id.unwrap_or_default(),
        state: status
            .state
            .and_then(|s| serde_json::to_value(s).ok())
            .and_then(|v| v.as_str().map(TaskState::parse))
            .unwrap_or(TaskState::Unknown),
        message: status.message.unwrap_or_default(),
        error: status.err.filter(|e| !e.is_empty()),
        addresses: Vec::new(),
        created_at: task.created_at.as_deref().and_then(parse_time),
    }
}

/// Container id of a task that got far enough to have one.
pub(crate) fn task_container_id(task: &Task) -> Option<String> {
    task.status
        .as_ref()?
        .container_status
        .as_ref()?
        .container_id
        .clone()
        .filter(|id| !id.is_empty())
}

/// Per-network addresses of a container, CIDR suffix stripped.
pub(crate) fn container_addresses(container: ContainerInspectResponse) -> Vec<TaskAddress> {
    let networks: HashMap<_, _> = container
        .network_settings
        .and_then(|s| s.networks)
        .unwrap_or_default();
    let mut addresses: Vec<TaskAddress> = networks
        .into_iter()
        .filter_map(|(network, settings)| {
            let ip = settings.ip_address.filter(|ip| !ip.is_empty())?;
            Some(TaskAddress {
                network,
                ip: strip_prefix_len(&ip).to_string(),
            })
        })
        .collect();
    addresses.sort_by(|a, b| a.network.cmp(&b.network));
    addresses
}

/// Exact name match first, then exact id.
pub(crate) fn match_networks(
    names: &[String],
    networks: &[Network],
) -> Result<Vec<String>, OrchestratorError> {
    let mut ids = Vec::with_capacity(names.len());
    let mut missing = Vec::new();
    for name in names {
        let found = networks
            .iter()
            .find(|n| n.name.as_ref() == Some(name))
            .or_else(|| networks.iter().find(|n| n.id.as_ref() == Some(name)));
        match found.and_then(|n| n.id.clone()) {
            Some(id) => ids.push(id),
            None => missing.push(name.as_str()),
        }
    }
    if missing.is_empty() {
        Ok(ids)
    } else {
        Err(OrchestratorError::NotFound(format!(
            "networks not found: {}",
            missing.join(", ")
        )))
    }
}

fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn strip_prefix_len(cidr: &str) -> &str {
    cidr.split_once('/').map(|(ip, _)| ip).unwrap_or(cidr)
}
