// Scripted in-memory orchestrator that records every adapter call.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use crate::docker::{Orchestrator, OrchestratorError, ServiceDescriptor, TaskDescriptor};
use crate::model::ServiceRequest;

/// One adapter call as seen by the fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create(String),
    Inspect(String),
    ListTasks(String),
    Remove(String),
    ResolveNetworks(Vec<String>),
}

pub type TaskReply = Result<Vec<TaskDescriptor>, OrchestratorError>;

#[derive(Default)]
struct State {
    services: BTreeMap<String, ServiceDescriptor>,
    requests: Vec<ServiceRequest>,
    next_id: u64,
    networks: BTreeMap<String, String>,
    script: VecDeque<TaskReply>,
    steady: Vec<TaskDescriptor>,
    create_error: Option<OrchestratorError>,
    lost_create_reply: Option<OrchestratorError>,
    remove_errors: VecDeque<OrchestratorError>,
    inspect_errors: VecDeque<OrchestratorError>,
    create_delay: Option<Duration>,
    list_delay: Option<Duration>,
}

/// Services live in a map keyed by id; lookups accept id or name like the
/// real daemon. `list_tasks` replies come from a script, then repeat the
/// steady reply forever.
#[derive(Default)]
pub struct FakeOrchestrator {
    state: Mutex<State>,
    calls: Mutex<Vec<Call>>,
}

impl FakeOrchestrator {
    /// Knows the `jupyterhub` network.
    pub fn new() -> Self {
        let fake = Self::default();
        fake.add_network("jupyterhub", "net-jupyterhub");
        fake
    }

    pub fn add_network(&self, name: &str, id: &str) {
        self.state
            .lock()
            .networks
            .insert(name.to_string(), id.to_string());
    }

    /// Registers a service as if a previous process had created it.
    pub fn add_service(&self, name: &str) -> String {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = format!("svc-pre-{}", state.next_id);
        state.services.insert(
            id.clone(),
            ServiceDescriptor {
                id: id.clone(),
                name: name.to_string(),
                labels: BTreeMap::new(),
                created_at: None,
            },
        );
        id
    }

    /// Drops a service behind the controller's back.
    pub fn vanish(&self, name: &str) {
        self.state.lock().services.retain(|_, s| s.name != name);
    }

    pub fn push_tasks(&self, reply: TaskReply) {
        self.state.lock().script.push_back(reply);
    }

    pub fn set_steady(&self, tasks: Vec<TaskDescriptor>) {
        self.state.lock().steady = tasks;
    }

    pub fn fail_create(&self, err: OrchestratorError) {
        self.state.lock().create_error = Some(err);
    }

    /// The next create succeeds on the daemon but the caller sees `err`.
    pub fn lose_create_reply(&self, err: OrchestratorError) {
        self.state.lock().lost_create_reply = Some(err);
    }

    pub fn fail_next_remove(&self, err: OrchestratorError) {
        self.state.lock().remove_errors.push_back(err);
    }

    pub fn fail_next_inspect(&self, err: OrchestratorError) {
        self.state.lock().inspect_errors.push_back(err);
    }

    pub fn delay_create(&self, delay: Duration) {
        self.state.lock().create_delay = Some(delay);
    }

    /// Every `list_tasks` call hangs this long before answering.
    pub fn delay_list(&self, delay: Duration) {
        self.state.lock().list_delay = Some(delay);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| matches(c)).count()
    }

    pub fn creates(&self) -> usize {
        self.count(|c| matches!(c, Call::Create(_)))
    }

    pub fn removes(&self) -> usize {
        self.count(|c| matches!(c, Call::Remove(_)))
    }

    pub fn list_calls(&self) -> usize {
        self.count(|c| matches!(c, Call::ListTasks(_)))
    }

    pub fn service_exists(&self, name: &str) -> bool {
        self.state.lock().services.values().any(|s| s.name == name)
    }

    pub fn service_count(&self) -> usize {
        self.state.lock().services.len()
    }

    /// Requests received by `create_service`, in order.
    pub fn requests(&self) -> Vec<ServiceRequest> {
        self.state.lock().requests.clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }

    fn find(state: &State, service: &str) -> Option<String> {
        if state.services.contains_key(service) {
            return Some(service.to_string());
        }
        state
            .services
            .values()
            .find(|s| s.name == service)
            .map(|s| s.id.clone())
    }
}

#[async_trait]
impl Orchestrator for FakeOrchestrator {
    async fn create_service(&self, req: &ServiceRequest) -> Result<String, OrchestratorError> {
        self.record(Call::Create(req.name.clone()));
        let delay = self.state.lock().create_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        state.requests.push(req.clone());
        if let Some(err) = state.create_error.take() {
            return Err(err);
        }
        if state.services.values().any(|s| s.name == req.name) {
            return Err(OrchestratorError::from_status(
                409,
                "rpc error: code = AlreadyExists desc = name conflicts with an existing object",
            ));
        }
        state.next_id += 1;
        let id = format!("svc-{}", state.next_id);
        state.services.insert(
            id.clone(),
            ServiceDescriptor {
                id: id.clone(),
                name: req.name.clone(),
                labels: req.labels.clone(),
                created_at: Some(req.created_at),
            },
        );
        match state.lost_create_reply.take() {
            Some(err) => Err(err),
            None => Ok(id),
        }
    }

    async fn inspect_service(&self, service: &str) -> Result<ServiceDescriptor, OrchestratorError> {
        self.record(Call::Inspect(service.to_string()));
        let mut state = self.state.lock();
        if let Some(err) = state.inspect_errors.pop_front() {
            return Err(err);
        }
        match Self::find(&state, service) {
            Some(id) => Ok(state.services[&id].clone()),
            None => Err(OrchestratorError::NotFound(format!("service {service} not found"))),
        }
    }

    async fn list_tasks(&self, service: &str) -> Result<Vec<TaskDescriptor>, OrchestratorError> {
        self.record(Call::ListTasks(service.to_string()));
        let delay = self.state.lock().list_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock();
        match state.script.pop_front() {
            Some(reply) => reply,
            None => Ok(state.steady.clone()),
        }
    }

    async fn remove_service(&self, service: &str) -> Result<(), OrchestratorError> {
        self.record(Call::Remove(service.to_string()));
        let mut state = self.state.lock();
        if let Some(err) = state.remove_errors.pop_front() {
            return Err(err);
        }
        match Self::find(&state, service) {
            Some(id) => {
                state.services.remove(&id);
                Ok(())
            }
            None => Err(OrchestratorError::NotFound(format!("service {service} not found"))),
        }
    }

    async fn resolve_network_ids(&self, names: &[String]) -> Result<Vec<String>, OrchestratorError> {
        self.record(Call::ResolveNetworks(names.to_vec()));
        let state = self.state.lock();
        let mut ids = Vec::new();
        let mut missing = Vec::new();
        for name in names {
            match state.networks.get(name) {
                Some(id) => ids.push(id.clone()),
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
}
