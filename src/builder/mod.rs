//! Spec builder: merges the workload template, caller overrides and the
//! per-user substitutions into a ready-to-submit [`ServiceRequest`].
//!
//! Pure: no I/O, and the only non-deterministic input is the timestamp,
//! which [`build_at`] takes explicitly.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::warn;

use crate::model::{
    MountError, MountSpec, Overrides, ServiceRequest, WorkloadTemplate, LABEL_CREATED_AT,
    LABEL_USER,
};
use crate::naming;

pub const ENV_NOTEBOOK_DIR: &str = "NOTEBOOK_DIR";
pub const ENV_HUB_API_URL: &str = "JPY_HUB_API_URL";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("service image is empty")]
    EmptyImage,
    #[error("mount #{index}: {source}")]
    Mount {
        index: usize,
        #[source]
        source: MountError,
    },
    #[error("hub api url {url:?} cannot be rewritten: {reason}")]
    HubApiUrl { url: String, reason: String },
}

/// Builds the request for `user`/`session` stamped with the current time.
pub fn build(
    template: &WorkloadTemplate,
    overrides: Option<&Overrides>,
    user: &str,
    session: &str,
) -> Result<ServiceRequest, ValidationError> {
    build_at(template, overrides, user, session, Utc::now())
}

/// Same as [`build`] with an explicit creation time.
pub fn build_at(
    template: &WorkloadTemplate,
    overrides: Option<&Overrides>,
    user: &str,
    session: &str,
    now: DateTime<Utc>,
) -> Result<ServiceRequest, ValidationError> {
    let empty = Overrides::default();
    let ov = overrides.unwrap_or(&empty);

    let image = ov.image.clone().unwrap_or_else(|| template.image.clone());
    if image.trim().is_empty() {
        return Err(ValidationError::EmptyImage);
    }

    let raw_mounts = ov.mounts.as_ref().unwrap_or(&template.mounts);
    let mut mounts = Vec::with_capacity(raw_mounts.len());
    for (index, raw) in raw_mounts.iter().enumerate() {
        let mount = MountSpec::from_raw(raw)
            .map_err(|source| ValidationError::Mount { index, source })?;
        mounts.push(mount.map_source(|s| naming::substitute_username(s, user)));
    }

    let resources = ov.resources.unwrap_or(template.resources);
    if resources.reservation_exceeds_limit() {
        warn!(
            component = "builder",
            event = "reservation_exceeds_limit",
            user = %user,
            "resource reservation is above its limit, the orchestrator will likely reject the service"
        );
    }

    let session_suffix = ov.name.as_deref().unwrap_or(session);
    let name = naming::derive_service_name(&template.prefix, user, session_suffix);

    let mut labels = BTreeMap::new();
    labels.insert(LABEL_USER.to_string(), naming::user_token(user));
    labels.insert(LABEL_CREATED_AT.to_string(), now.to_rfc3339());

    Ok(ServiceRequest {
        name,
        image,
        command: ov.command.clone().unwrap_or_else(|| template.command.clone()),
        args: ov.args.clone().unwrap_or_else(|| template.args.clone()),
        env: workload_env(template, user)?,
        mounts,
        resources,
        networks: ov.networks.clone().unwrap_or_else(|| template.networks.clone()),
        placement: ov.placement.clone().unwrap_or_else(|| template.placement.clone()),
        labels,
        created_at: now,
    })
}

/// Environment handed to the workload. Template entries come first so the
/// identity keys always win.
fn workload_env(
    template: &WorkloadTemplate,
    user: &str,
) -> Result<BTreeMap<String, String>, ValidationError> {
    let mut env = template.env.clone();
    if let Some(dir) = &template.notebook_dir {
        env.insert(ENV_NOTEBOOK_DIR.to_string(), dir.clone());
    }
    if let Some(hub) = &template.hub {
        env.insert(
            ENV_HUB_API_URL.to_string(),
            public_hub_api_url(&hub.api_url, &hub.service_name)?,
        );
    }
    env.insert(template.user_env.clone(), user.to_string());
    env.insert(template.port_env.clone(), template.port.to_string());
    Ok(env)
}

/// Replaces the host of the hub API URL with the hub's swarm service name.
/// Everything after the host (port, path, query) is kept byte for byte.
pub fn public_hub_api_url(api_url: &str, hub_service_name: &str) -> Result<String, ValidationError> {
    let invalid = |reason: &str| ValidationError::HubApiUrl {
        url: api_url.to_string(),
        reason: reason.to_string(),
    };
    let (proto, authority) = api_url
        .split_once("://")
        .ok_or_else(|| invalid("missing scheme"))?;
    if proto.is_empty() {
        return Err(invalid("missing scheme"));
    }
    let host_end = if authority.starts_with('[') {
        authority
            .find(']')
            .map(|i| i + 1)
            .ok_or_else(|| invalid("unterminated IPv6 host"))?
    } else {
        authority.find([':', '/', '?']).unwrap_or(authority.len())
    };
    if host_end == 0 {
        return Err(invalid("missing host"));
    }
    Ok(format!("{proto}://{hub_service_name}{}", &authority[host_end..]))
}
