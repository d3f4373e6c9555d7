//! Per-user session registry.
//!
//! Process-wide map from (user, session) to a slot holding the last known
//! workload record. Each slot carries its own lifecycle lock, so transitions
//! for one key are serialised while other keys proceed in parallel; the map
//! itself is only touched briefly to look a slot up or prune it.

#[cfg(test)]
mod registry_test;

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{watch, MutexGuard};
use tokio_util::sync::CancellationToken;

use crate::lifecycle::SpawnError;
use crate::model::{SessionKey, WorkloadRecord};

/// Result published by an in-flight start to everyone joined on it.
pub type SpawnOutcome = Result<String, SpawnError>;

pub type OutcomeRx = watch::Receiver<Option<SpawnOutcome>>;

pub struct Registry {
    slots: DashMap<SessionKey, Arc<Slot>>,
    shutdown: CancellationToken,
}

impl Registry {
    /// Per-key cancellation tokens are children of `shutdown`.
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            slots: DashMap::new(),
            shutdown,
        }
    }

    /// Slot for `key`, created on first use.
    pub fn slot(&self, key: &SessionKey) -> Arc<Slot> {
        self.slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Slot::new(self.shutdown.child_token())))
            .clone()
    }

    pub fn get(&self, key: &SessionKey) -> Option<Arc<Slot>> {
        self.slots.get(key).map(|s| s.value().clone())
    }

    pub fn record(&self, key: &SessionKey) -> Option<WorkloadRecord> {
        self.get(key).and_then(|s| s.record())
    }

    /// Live records, in no particular order.
    pub fn records(&self) -> Vec<WorkloadRecord> {
        self.slots.iter().filter_map(|s| s.value().record()).collect()
    }

    /// Drops the slot for `key` when it holds no record, no attempt is in
    /// flight, and nobody else holds a handle to it.
    pub fn release(&self, key: &SessionKey) {
        self.slots
            .remove_if(key, |_, slot| Arc::strong_count(slot) == 1 && slot.is_vacant());
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub(crate) fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }
}

/// State held for one (user, session) key.
pub struct Slot {
    lifecycle: tokio::sync::Mutex<()>,
    record: Mutex<Option<WorkloadRecord>>,
    cancel: Mutex<CancellationToken>,
    inflight: Mutex<Option<OutcomeRx>>,
}

/// Either join a start already running for the key, or lead a new one.
pub enum Attempt {
    Join(OutcomeRx),
    Lead(Leader),
}

impl Slot {
    fn new(cancel: CancellationToken) -> Self {
        Self {
            lifecycle: tokio::sync::Mutex::new(()),
            record: Mutex::new(None),
            cancel: Mutex::new(cancel),
            inflight: Mutex::new(None),
        }
    }

    /// Held for the whole of a start or stop.
    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self.lifecycle.lock().await
    }

    pub fn record(&self) -> Option<WorkloadRecord> {
        self.record.lock().clone()
    }

    pub fn set_record(&self, record: WorkloadRecord) {
        *self.record.lock() = Some(record);
    }

    pub fn take_record(&self) -> Option<WorkloadRecord> {
        self.record.lock().take()
    }

    /// Applies `f` to the record if there is one; returns whether it ran.
    pub fn update_record(&self, f: impl FnOnce(&mut WorkloadRecord)) -> bool {
        match self.record.lock().as_mut() {
            Some(record) => {
                f(record);
                true
            }
            None => false,
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.lock().clone()
    }

    /// Interrupts whatever poll loop is waiting on the current token.
    pub fn cancel(&self) {
        self.cancel.lock().cancel();
    }

    /// Installs a fresh token after a cancellation has been consumed.
    pub fn renew_token(&self, parent: &CancellationToken) {
        let mut cancel = self.cancel.lock();
        if cancel.is_cancelled() {
            *cancel = parent.child_token();
        }
    }

    pub fn attempt(self: &Arc<Self>) -> Attempt {
        let mut inflight = self.inflight.lock();
        if let Some(rx) = inflight.as_ref() {
            return Attempt::Join(rx.clone());
        }
        let (tx, rx) = watch::channel(None);
        *inflight = Some(rx);
        Attempt::Lead(Leader {
            slot: Arc::clone(self),
            tx,
        })
    }

    pub fn is_in_flight(&self) -> bool {
        self.inflight.lock().is_some()
    }

    fn is_vacant(&self) -> bool {
        self.record.lock().is_none() && !self.is_in_flight()
    }
}

/// Owner of an in-flight start. Dropping it ends the attempt; joiners that
/// have not seen a published outcome observe a closed channel.
pub struct Leader {
    slot: Arc<Slot>,
    tx: watch::Sender<Option<SpawnOutcome>>,
}

impl Leader {
    pub fn publish(&self, outcome: &SpawnOutcome) {
        self.tx.send_replace(Some(outcome.clone()));
    }
}

impl Drop for Leader {
    fn drop(&mut self) {
        self.slot.inflight.lock().take();
    }
}

/// Waits for the outcome of the attempt `rx` was joined to.
pub async fn joined_outcome(mut rx: OutcomeRx, key: &SessionKey) -> SpawnOutcome {
    let outcome = match rx.wait_for(|v| v.is_some()).await {
        Ok(v) => v.clone(),
        Err(_) => None,
    };
    outcome.unwrap_or_else(|| Err(SpawnError::Cancelled(key.to_string())))
}
