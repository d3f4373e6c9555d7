// Task fixtures and controller construction shared by the scenario suites.

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::orchestrator::FakeOrchestrator;
use crate::config::{self, ConfigTrait};
use crate::docker::{TaskAddress, TaskDescriptor, TaskState};
use crate::lifecycle::Controller;
use crate::model::WorkloadTemplate;
use crate::store::{MemoryStore, SessionStore};

static TASK_SEQ: AtomicU32 = AtomicU32::new(0);

/// Test template: `jupyter/base:latest` on the `jupyterhub` network, 10ms
/// polling, 200ms start timeout.
pub fn template() -> WorkloadTemplate {
    config::new_test_config().service().clone()
}

pub fn controller(fake: &Arc<FakeOrchestrator>) -> Controller {
    controller_with(fake, template(), Arc::new(MemoryStore::new()))
}

pub fn controller_with(
    fake: &Arc<FakeOrchestrator>,
    template: WorkloadTemplate,
    store: Arc<dyn SessionStore>,
) -> Controller {
    Controller::new(template, fake.clone(), store, CancellationToken::new())
}

fn task(state: TaskState, addresses: Vec<TaskAddress>) -> TaskDescriptor {
    let seq = TASK_SEQ.fetch_add(1, Ordering::Relaxed);
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    TaskDescriptor {
        id: format!("task-{seq}"),
        state,
        message: String::new(),
        error: None,
        addresses,
        created_at: Some(base + ChronoDuration::seconds(i64::from(seq))),
    }
}

pub fn pending() -> TaskDescriptor {
    task(TaskState::Pending, Vec::new())
}

pub fn preparing() -> TaskDescriptor {
    task(TaskState::Preparing, Vec::new())
}

/// Running task attached to the ingress mesh and the `jupyterhub` network.
pub fn running(ip: &str) -> TaskDescriptor {
    task(
        TaskState::Running,
        vec![
            TaskAddress {
                network: "ingress".to_string(),
                ip: "10.255.0.9".to_string(),
            },
            TaskAddress {
                network: "jupyterhub".to_string(),
                ip: ip.to_string(),
            },
        ],
    )
}

pub fn failed(state: TaskState, err: &str) -> TaskDescriptor {
    let mut t = task(state, Vec::new());
    t.error = Some(err.to_string());
    t
}
