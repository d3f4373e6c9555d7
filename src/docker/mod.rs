//! Orchestrator client adapter: the typed subset of the Docker Engine swarm
//! API needed to run one service per user session.

pub mod client;
mod convert;
pub mod error;
pub mod types;

#[cfg(test)]
mod client_test;

use async_trait::async_trait;

use crate::model::ServiceRequest;

// Re-export main types
pub use client::{DockerClient, DockerHost};
pub use error::OrchestratorError;
pub use types::{ServiceDescriptor, TaskAddress, TaskDescriptor, TaskState};

/// Operations the lifecycle controller needs from the orchestrator.
///
/// `service` arguments accept either a service id or a service name.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Creates the service and returns its id. Fails with
    /// [`OrchestratorError::Conflict`] when the name is already taken.
    async fn create_service(&self, req: &ServiceRequest) -> Result<String, OrchestratorError>;

    async fn inspect_service(&self, service: &str) -> Result<ServiceDescriptor, OrchestratorError>;

    async fn list_tasks(&self, service: &str) -> Result<Vec<TaskDescriptor>, OrchestratorError>;

    /// Fails with [`OrchestratorError::NotFound`] when already absent.
    async fn remove_service(&self, service: &str) -> Result<(), OrchestratorError>;

    /// Resolves network names (or ids) to ids, preserving order. Fails with
    /// [`OrchestratorError::NotFound`] naming every unresolved network.
    async fn resolve_network_ids(&self, names: &[String]) -> Result<Vec<String>, OrchestratorError>;
}
