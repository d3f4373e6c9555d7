use serde::{Deserialize, Serialize};

use super::{RawMount, ResourceSpec};

/// Per-request overrides supplied by the caller.
///
/// Every present field replaces the template field as a whole: a mount list
/// replaces the template's mounts, and a resource spec replaces the template
/// resources including the fields it leaves unset. `name` replaces the
/// session part of the service name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Overrides {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub args: Option<Vec<String>>,
    #[serde(default)]
    pub command: Option<Vec<String>>,
    #[serde(default)]
    pub mounts: Option<Vec<RawMount>>,
    #[serde(default, alias = "resource_spec")]
    pub resources: Option<ResourceSpec>,
    #[serde(default)]
    pub networks: Option<Vec<String>>,
    #[serde(default)]
    pub placement: Option<Vec<String>>,
    #[serde(default)]
    pub name: Option<String>,
}
