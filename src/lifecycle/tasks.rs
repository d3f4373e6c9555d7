// Reading a service's task list: which task, if any, decides the spawn,
// and where the running one can be reached.

use crate::docker::{TaskDescriptor, TaskState};
use crate::model::EndpointMode;

/// Routing mesh network every published service is attached to; never the
/// address a workload should be reached on.
const INGRESS_NETWORK: &str = "ingress";

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum TaskVerdict<'a> {
    Running { endpoint: String },
    Failed(&'a TaskDescriptor),
    Waiting,
}

/// Where to find the workload once a task runs.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EndpointRule<'a> {
    pub mode: EndpointMode,
    pub service_name: &'a str,
    pub port: u16,
    /// Declared network names, in preference order.
    pub networks: &'a [String],
}

/// Any running task with a resolvable endpoint wins. Otherwise the newest
/// task in a failure state fails the spawn. Complete and shutdown tasks are
/// left alone.
pub(crate) fn evaluate<'a>(tasks: &'a [TaskDescriptor], rule: &EndpointRule<'_>) -> TaskVerdict<'a> {
    let running = tasks
        .iter()
        .filter(|t| t.state == TaskState::Running)
        .find_map(|t| endpoint(t, rule));
    if let Some(endpoint) = running {
        return TaskVerdict::Running { endpoint };
    }

    match tasks
        .iter()
        .filter(|t| t.state.is_failure())
        .max_by_key(|t| t.created_at)
    {
        Some(task) => TaskVerdict::Failed(task),
        None => TaskVerdict::Waiting,
    }
}

/// Task address mode falls back to the service name when the orchestrator
/// reported no usable address for the task (e.g. it runs on another node).
pub(crate) fn endpoint(task: &TaskDescriptor, rule: &EndpointRule<'_>) -> Option<String> {
    let by_name = || Some(format!("{}:{}", rule.service_name, rule.port));
    match rule.mode {
        EndpointMode::ServiceName => by_name(),
        EndpointMode::TaskAddress => {
            let declared = rule
                .networks
                .iter()
                .find_map(|net| task.addresses.iter().find(|a| &a.network == net));
            match declared.or_else(|| task.addresses.iter().find(|a| a.network != INGRESS_NETWORK)) {
                Some(a) => Some(format!("{}:{}", a.ip, rule.port)),
                None => by_name(),
            }
        }
    }
}
