use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use super::{MountSpec, ResourceSpec};

/// Label carrying the hashed owner token.
pub const LABEL_USER: &str = "swarmspawn.user";
/// Label carrying the RFC 3339 creation time of the request.
pub const LABEL_CREATED_AT: &str = "swarmspawn.created_at";

/// Fully resolved service creation request. Built fresh for every spawn
/// attempt and never shared between users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRequest {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub mounts: Vec<MountSpec>,
    pub resources: ResourceSpec,
    /// Network names as declared until resolved, network ids afterwards.
    pub networks: Vec<String>,
    pub placement: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl ServiceRequest {
    /// Swaps declared network names for the ids the orchestrator resolved.
    pub fn with_network_ids(mut self, ids: Vec<String>) -> Self {
        self.networks = ids;
        self
    }
}
