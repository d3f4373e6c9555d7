use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::SpawnError;
use super::tasks::{self, EndpointRule, TaskVerdict};
use crate::builder;
use crate::docker::{Orchestrator, OrchestratorError, TaskState};
use crate::metrics;
use crate::model::{Overrides, Phase, SessionKey, WorkloadRecord, WorkloadTemplate};
use crate::registry::{joined_outcome, Attempt, Registry, Slot, SpawnOutcome};
use crate::store::SessionStore;

/// Stand-in deadline for start timeouts too large to add to the clock.
const FAR_FUTURE: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Starts, stops and polls per-user workloads.
///
/// Transitions for one key are serialised by the slot's lifecycle lock;
/// different keys never wait on each other. Every record change is written
/// through to the session store so a restarted process can pick up where the
/// previous one left off.
pub struct Controller {
    template: WorkloadTemplate,
    orchestrator: Arc<dyn Orchestrator>,
    store: Arc<dyn SessionStore>,
    registry: Registry,
}

impl Controller {
    pub fn new(
        template: WorkloadTemplate,
        orchestrator: Arc<dyn Orchestrator>,
        store: Arc<dyn SessionStore>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            template,
            orchestrator,
            store,
            registry: Registry::new(shutdown),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Returns the endpoint once the workload is reachable, or why it never
    /// became so. Concurrent calls for the same key share one attempt.
    pub async fn start(
        &self,
        user: &str,
        session: &str,
        overrides: Option<&Overrides>,
    ) -> Result<String, SpawnError> {
        let key = SessionKey::new(user, session);
        let started = Instant::now();
        let slot = self.registry.slot(&key);

        let outcome = match slot.attempt() {
            Attempt::Join(rx) => {
                debug!(
                    component = "lifecycle",
                    event = "start_joined",
                    user = %key.user,
                    session = %key.session,
                    "joining in-flight start"
                );
                joined_outcome(rx, &key).await
            }
            Attempt::Lead(leader) => {
                let outcome = self.lead_start(&key, &slot, overrides).await;
                leader.publish(&outcome);
                let label = match &outcome {
                    Ok(_) => "ready",
                    Err(e) => e.outcome(),
                };
                metrics::record_spawn(label, started.elapsed());
                outcome
            }
        };

        drop(slot);
        self.registry.release(&key);
        outcome
    }

    /// Removes the workload and forgets the record. Unknown sessions and
    /// services already gone count as success. Cancels any start in flight
    /// for the key before removing.
    pub async fn stop(&self, user: &str, session: &str) -> Result<(), OrchestratorError> {
        let key = SessionKey::new(user, session);
        let slot = self.registry.slot(&key);
        slot.cancel();

        let result = {
            let _guard = slot.lock().await;
            let result = self.stop_locked(&key, &slot).await;
            slot.renew_token(self.registry.shutdown_token());
            result
        };

        metrics::record_stop(match &result {
            Ok(true) => "removed",
            Ok(false) => "absent",
            Err(_) => "error",
        });
        drop(slot);
        self.registry.release(&key);
        result.map(|_| ())
    }

    /// Current phase with one round trip of re-inspection for ready
    /// workloads. The only mutation is Ready -> Failed when the service has
    /// disappeared.
    pub async fn poll(&self, user: &str, session: &str) -> Phase {
        let key = SessionKey::new(user, session);
        let slot = self.registry.get(&key);
        let record = match slot.as_ref().and_then(|s| s.record()) {
            Some(record) => Some(record),
            None => self.load_persisted(&key).await,
        };
        let Some(record) = record else {
            return Phase::Idle;
        };
        if record.phase != Phase::Ready {
            return record.phase;
        }

        let service = match self.orchestrator.inspect_service(record.service_ref()).await {
            Ok(service) => service,
            Err(e) if e.is_not_found() => {
                warn!(
                    component = "lifecycle",
                    event = "service_vanished",
                    user = %key.user,
                    session = %key.session,
                    service = %record.service_name,
                    "ready service no longer exists"
                );
                let mut failed = record.clone();
                failed.phase = Phase::Failed;
                if let Some(slot) = &slot {
                    slot.update_record(|r| {
                        if r.phase == Phase::Ready && r.service_name == failed.service_name {
                            r.phase = Phase::Failed;
                        }
                    });
                }
                self.persist(&key, &failed).await;
                return Phase::Failed;
            }
            Err(e) => {
                debug!(
                    component = "lifecycle",
                    event = "poll_inconclusive",
                    service = %record.service_name,
                    error = %e,
                    "keeping last known phase"
                );
                return record.phase;
            }
        };

        match self.orchestrator.list_tasks(&service.id).await {
            Ok(tasks) if tasks.iter().any(|t| t.state == TaskState::Running) => Phase::Ready,
            Ok(_) => {
                info!(
                    component = "lifecycle",
                    event = "task_not_running",
                    service = %record.service_name,
                    "ready service has no running task"
                );
                Phase::Failed
            }
            Err(_) => record.phase,
        }
    }

    /// Last known record for the key, in memory or persisted.
    pub async fn record(&self, user: &str, session: &str) -> Option<WorkloadRecord> {
        let key = SessionKey::new(user, session);
        match self.registry.record(&key) {
            Some(record) => Some(record),
            None => self.load_persisted(&key).await,
        }
    }

    async fn lead_start(
        &self,
        key: &SessionKey,
        slot: &Slot,
        overrides: Option<&Overrides>,
    ) -> SpawnOutcome {
        let _guard = slot.lock().await;
        let cancel = slot.cancel_token();
        if cancel.is_cancelled() {
            return Err(SpawnError::Cancelled(key.to_string()));
        }

        let networks = overrides
            .and_then(|o| o.networks.clone())
            .unwrap_or_else(|| self.template.networks.clone());

        let record = match self.live_record(key, slot).await? {
            Some(record) if record.phase == Phase::Ready && record.endpoint.is_some() => {
                info!(
                    component = "lifecycle",
                    event = "already_running",
                    user = %key.user,
                    session = %key.session,
                    service = %record.service_name,
                    "workload already running"
                );
                return Ok(record.endpoint.unwrap_or_default());
            }
            Some(record) => {
                info!(
                    component = "lifecycle",
                    event = "resume_polling",
                    user = %key.user,
                    session = %key.session,
                    service = %record.service_name,
                    phase = %record.phase,
                    "resuming existing workload"
                );
                record
            }
            None => self.create(key, slot, overrides).await?,
        };

        self.await_running(key, slot, record, &networks, &cancel).await
    }

    /// The record for the key if its service still exists. A record whose
    /// service is gone is discarded.
    async fn live_record(
        &self,
        key: &SessionKey,
        slot: &Slot,
    ) -> Result<Option<WorkloadRecord>, SpawnError> {
        let record = match slot.record() {
            Some(record) => Some(record),
            None => self.load_persisted(key).await,
        };
        let Some(mut record) = record else {
            return Ok(None);
        };

        match self.orchestrator.inspect_service(record.service_ref()).await {
            Ok(service) => {
                record.service_id = service.id;
                slot.set_record(record.clone());
                Ok(Some(record))
            }
            // 5xx here usually means swarm lost track of the service
            Err(e)
                if e.is_not_found()
                    || matches!(&e, OrchestratorError::Api { status, .. } if *status >= 500) =>
            {
                info!(
                    component = "lifecycle",
                    event = "stale_record",
                    user = %key.user,
                    session = %key.session,
                    service = %record.service_name,
                    error = %e,
                    "discarding record of a service that no longer exists"
                );
                self.forget(key, slot).await;
                Ok(None)
            }
            Err(e) => {
                warn!(
                    component = "lifecycle",
                    event = "inspect_failed",
                    user = %key.user,
                    session = %key.session,
                    service = %record.service_name,
                    error = %e,
                    "could not check existing workload, keeping its record"
                );
                Err(e.into())
            }
        }
    }

    async fn create(
        &self,
        key: &SessionKey,
        slot: &Slot,
        overrides: Option<&Overrides>,
    ) -> Result<WorkloadRecord, SpawnError> {
        let request = builder::build(&self.template, overrides, &key.user, &key.session)?;

        let network_ids = if request.networks.is_empty() {
            Vec::new()
        } else {
            self.orchestrator
                .resolve_network_ids(&request.networks)
                .await
                .map_err(|e| match e {
                    OrchestratorError::NotFound(msg) => SpawnError::Configuration(msg),
                    other => other.into(),
                })?
        };

        let mut record = WorkloadRecord::new(key, &request.name, request.created_at);
        self.save(key, slot, &record).await;

        let request = request.with_network_ids(network_ids);
        match self.orchestrator.create_service(&request).await {
            Ok(id) => {
                info!(
                    component = "lifecycle",
                    event = "service_created",
                    user = %key.user,
                    session = %key.session,
                    service = %request.name,
                    service_id = %id,
                    image = %request.image,
                    "service created"
                );
                record.service_id = id;
            }
            Err(e) if e.is_conflict() => {
                info!(
                    component = "lifecycle",
                    event = "service_adopted",
                    user = %key.user,
                    session = %key.session,
                    service = %request.name,
                    "service name already taken, adopting the existing service"
                );
                match self.orchestrator.inspect_service(&request.name).await {
                    Ok(service) => record.service_id = service.id,
                    Err(e) => return Err(self.create_failed(key, slot, &record, e).await),
                }
            }
            Err(e) => return Err(self.create_failed(key, slot, &record, e).await),
        }

        Ok(record)
    }

    /// A transient failure may have left a service behind, so the Creating
    /// record is kept and a later stop removes the service by name.
    async fn create_failed(
        &self,
        key: &SessionKey,
        slot: &Slot,
        record: &WorkloadRecord,
        err: OrchestratorError,
    ) -> SpawnError {
        if err.is_transient() {
            metrics::add_transient_errors(1);
            warn!(
                component = "lifecycle",
                event = "create_uncertain",
                user = %key.user,
                session = %key.session,
                service = %record.service_name,
                error = %err,
                "service creation outcome unknown, keeping its record"
            );
        } else {
            self.forget(key, slot).await;
        }
        err.into()
    }

    async fn await_running(
        &self,
        key: &SessionKey,
        slot: &Slot,
        mut record: WorkloadRecord,
        networks: &[String],
        cancel: &CancellationToken,
    ) -> SpawnOutcome {
        record.phase = Phase::Polling;
        self.save(key, slot, &record).await;

        let service_name = record.service_name.clone();
        let rule = EndpointRule {
            mode: self.template.endpoint,
            service_name: &service_name,
            port: self.template.port,
            networks,
        };
        let timeout = self.template.start_timeout;
        let now = Instant::now();
        let deadline = now.checked_add(timeout).unwrap_or(now + FAR_FUTURE);
        let mut last_error: Option<String> = None;

        loop {
            let listed = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.cancelled(key, &record)),
                listed = self.orchestrator.list_tasks(&record.service_id) => Some(listed),
                _ = sleep_until(deadline) => None,
            };
            record.last_polled_at = Some(Utc::now());

            match listed {
                None => {
                    last_error = Some("task listing still pending at the deadline".to_string());
                }
                Some(Ok(found)) => match tasks::evaluate(&found, &rule) {
                    TaskVerdict::Running { endpoint } => {
                        record.phase = Phase::Ready;
                        record.endpoint = Some(endpoint.clone());
                        self.save(key, slot, &record).await;
                        info!(
                            component = "lifecycle",
                            event = "workload_ready",
                            user = %key.user,
                            session = %key.session,
                            service = %service_name,
                            endpoint = %endpoint,
                            "workload is running"
                        );
                        return Ok(endpoint);
                    }
                    TaskVerdict::Failed(task) => {
                        let detail = task.failure_detail();
                        warn!(
                            component = "lifecycle",
                            event = "task_failed",
                            user = %key.user,
                            session = %key.session,
                            service = %service_name,
                            task = %task.id,
                            state = %task.state,
                            detail = %detail,
                            "workload failed to start"
                        );
                        self.discard(key, slot, &record).await;
                        return Err(SpawnError::Startup {
                            service: service_name,
                            detail,
                        });
                    }
                    TaskVerdict::Waiting => {
                        debug!(
                            component = "lifecycle",
                            event = "tasks_pending",
                            service = %service_name,
                            tasks = found.len(),
                            "no running task yet"
                        );
                        last_error = None;
                    }
                },
                Some(Err(e)) if e.is_transient() => {
                    metrics::add_transient_errors(1);
                    warn!(
                        component = "lifecycle",
                        event = "poll_retry",
                        service = %service_name,
                        error = %e,
                        "orchestrator unavailable, retrying"
                    );
                    last_error = Some(e.to_string());
                }
                Some(Err(e)) => {
                    self.discard(key, slot, &record).await;
                    return Err(e.into());
                }
            }
            slot.set_record(record.clone());

            let now = Instant::now();
            if now >= deadline {
                warn!(
                    component = "lifecycle",
                    event = "start_timeout",
                    user = %key.user,
                    session = %key.session,
                    service = %service_name,
                    timeout = %humantime::format_duration(timeout),
                    "workload did not start in time"
                );
                self.discard(key, slot, &record).await;
                return Err(SpawnError::Timeout {
                    service: service_name,
                    timeout,
                    last_error,
                });
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.cancelled(key, &record)),
                _ = sleep((deadline - now).min(self.template.poll_interval)) => {}
            }
        }
    }

    /// Returns true when a record existed.
    async fn stop_locked(&self, key: &SessionKey, slot: &Slot) -> Result<bool, OrchestratorError> {
        let record = match slot.record() {
            Some(record) => Some(record),
            None => self.load_persisted(key).await,
        };
        let Some(mut record) = record else {
            debug!(
                component = "lifecycle",
                event = "stop_noop",
                user = %key.user,
                session = %key.session,
                "nothing to stop"
            );
            return Ok(false);
        };

        let previous = record.phase;
        record.phase = Phase::Stopping;
        slot.set_record(record.clone());

        match self.orchestrator.remove_service(record.service_ref()).await {
            Ok(()) | Err(OrchestratorError::NotFound(_)) => {
                self.forget(key, slot).await;
                info!(
                    component = "lifecycle",
                    event = "workload_stopped",
                    user = %key.user,
                    session = %key.session,
                    service = %record.service_name,
                    "workload removed"
                );
                Ok(true)
            }
            Err(e) => {
                record.phase = previous;
                self.save(key, slot, &record).await;
                warn!(
                    component = "lifecycle",
                    event = "stop_failed",
                    user = %key.user,
                    session = %key.session,
                    service = %record.service_name,
                    error = %e,
                    "failed to remove workload"
                );
                Err(e)
            }
        }
    }

    /// Best-effort removal after a failed start, then forget the record.
    /// A failed removal is logged and otherwise ignored.
    async fn discard(&self, key: &SessionKey, slot: &Slot, record: &WorkloadRecord) {
        match self.orchestrator.remove_service(record.service_ref()).await {
            Ok(()) | Err(OrchestratorError::NotFound(_)) => {}
            Err(e) => warn!(
                component = "lifecycle",
                event = "cleanup_failed",
                user = %key.user,
                session = %key.session,
                service = %record.service_name,
                error = %e,
                "failed to remove service after failed start"
            ),
        }
        self.forget(key, slot).await;
    }

    fn cancelled(&self, key: &SessionKey, record: &WorkloadRecord) -> SpawnError {
        info!(
            component = "lifecycle",
            event = "start_cancelled",
            user = %key.user,
            session = %key.session,
            service = %record.service_name,
            "start cancelled"
        );
        SpawnError::Cancelled(record.service_name.clone())
    }

    async fn save(&self, key: &SessionKey, slot: &Slot, record: &WorkloadRecord) {
        slot.set_record(record.clone());
        self.persist(key, record).await;
    }

    async fn persist(&self, key: &SessionKey, record: &WorkloadRecord) {
        if let Err(e) = self.store.save(key, record.to_fields()).await {
            warn!(
                component = "lifecycle",
                event = "store_write_failed",
                user = %key.user,
                session = %key.session,
                error = %e,
                "failed to persist session record"
            );
        }
    }

    async fn forget(&self, key: &SessionKey, slot: &Slot) {
        slot.take_record();
        if let Err(e) = self.store.delete(key).await {
            warn!(
                component = "lifecycle",
                event = "store_delete_failed",
                user = %key.user,
                session = %key.session,
                error = %e,
                "failed to delete session record"
            );
        }
    }

    async fn load_persisted(&self, key: &SessionKey) -> Option<WorkloadRecord> {
        match self.store.load(key).await {
            Ok(Some(fields)) => match WorkloadRecord::from_fields(&fields) {
                Some(record) => {
                    debug!(
                        component = "lifecycle",
                        event = "record_restored",
                        user = %key.user,
                        session = %key.session,
                        service = %record.service_name,
                        "loaded persisted session record"
                    );
                    Some(record)
                }
                None => {
                    warn!(
                        component = "lifecycle",
                        event = "record_malformed",
                        user = %key.user,
                        session = %key.session,
                        "ignoring malformed persisted record"
                    );
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(
                    component = "lifecycle",
                    event = "store_read_failed",
                    user = %key.user,
                    session = %key.session,
                    error = %e,
                    "failed to read session record"
                );
                None
            }
        }
    }
}
