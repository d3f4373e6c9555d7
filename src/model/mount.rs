// Mount declarations as written in configuration and their validated form.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const TYPE_BIND: &str = "bind";
const TYPE_VOLUME: &str = "volume";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MountError {
    #[error("mount has no container path (target)")]
    MissingTarget,
    #[error("mount type {0:?} is not supported (expected bind or volume)")]
    UnknownType(String),
    #[error("bind mount for {0:?} has no host path (source)")]
    BindWithoutSource(String),
}

/// Volume driver for named volumes, e.g. `local` with NFS options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct VolumeDriver {
    pub name: String,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

/// Mount entry exactly as it appears in YAML or in caller overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RawMount {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default, alias = "container_path")]
    pub target: Option<String>,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub driver: Option<VolumeDriver>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountSpec {
    Bind {
        host_path: String,
        container_path: String,
        read_only: bool,
    },
    NamedVolume {
        volume_name: String,
        container_path: String,
        read_only: bool,
        driver: Option<VolumeDriver>,
    },
    /// Has no source; the orchestrator destroys it with the service.
    AnonymousVolume {
        container_path: String,
        read_only: bool,
    },
}

impl MountSpec {
    /// Validates a raw entry. A missing `type` means `volume`, and a volume
    /// without a source is anonymous.
    pub fn from_raw(raw: &RawMount) -> Result<Self, MountError> {
        let container_path = match raw.target.as_deref() {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => return Err(MountError::MissingTarget),
        };
        let source = raw.source.as_deref().filter(|s| !s.is_empty());

        match raw.kind.as_deref().unwrap_or(TYPE_VOLUME) {
            TYPE_BIND => {
                let host_path = source
                    .ok_or_else(|| MountError::BindWithoutSource(container_path.clone()))?;
                Ok(Self::Bind {
                    host_path: host_path.to_string(),
                    container_path,
                    read_only: raw.read_only,
                })
            }
            TYPE_VOLUME => match source {
                Some(name) => Ok(Self::NamedVolume {
                    volume_name: name.to_string(),
                    container_path,
                    read_only: raw.read_only,
                    driver: raw.driver.clone(),
                }),
                None => Ok(Self::AnonymousVolume {
                    container_path,
                    read_only: raw.read_only,
                }),
            },
            other => Err(MountError::UnknownType(other.to_string())),
        }
    }

    pub fn container_path(&self) -> &str {
        match self {
            Self::Bind { container_path, .. }
            | Self::NamedVolume { container_path, .. }
            | Self::AnonymousVolume { container_path, .. } => container_path,
        }
    }

    pub fn source(&self) -> Option<&str> {
        match self {
            Self::Bind { host_path, .. } => Some(host_path),
            Self::NamedVolume { volume_name, .. } => Some(volume_name),
            Self::AnonymousVolume { .. } => None,
        }
    }

    pub fn read_only(&self) -> bool {
        match self {
            Self::Bind { read_only, .. }
            | Self::NamedVolume { read_only, .. }
            | Self::AnonymousVolume { read_only, .. } => *read_only,
        }
    }

    /// Rewrites the source side (host path, volume name, driver options).
    /// The container path is never touched.
    pub fn map_source<F>(self, f: F) -> Self
    where
        F: Fn(&str) -> String,
    {
        match self {
            Self::Bind {
                host_path,
                container_path,
                read_only,
            } => Self::Bind {
                host_path: f(&host_path),
                container_path,
                read_only,
            },
            Self::NamedVolume {
                volume_name,
                container_path,
                read_only,
                driver,
            } => Self::NamedVolume {
                volume_name: f(&volume_name),
                container_path,
                read_only,
                driver: driver.map(|d| VolumeDriver {
                    name: d.name,
                    options: d.options.into_iter().map(|(k, v)| (k, f(&v))).collect(),
                }),
            },
            anonymous @ Self::AnonymousVolume { .. } => anonymous,
        }
    }
}
