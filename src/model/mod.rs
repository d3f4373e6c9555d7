//! Workload data model: templates, overrides, resolved requests and records.

pub mod mount;
pub mod overrides;
pub mod record;
pub mod request;
pub mod resources;
pub mod template;

#[cfg(test)]
mod mount_test;

// Re-export main types
pub use mount::{MountError, MountSpec, RawMount, VolumeDriver};
pub use overrides::Overrides;
pub use record::{Phase, SessionKey, WorkloadRecord};
pub use request::{ServiceRequest, LABEL_CREATED_AT, LABEL_USER};
pub use resources::ResourceSpec;
pub use template::{EndpointMode, HubSpec, WorkloadTemplate};
