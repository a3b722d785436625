//! In-process mailbox for tests and simulations.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::schema::{ActiveSearch, JobMessage, ResultsMessage};

use super::WorkerId;
use super::mailbox::{Mailbox, MailboxError};

#[derive(Debug, Default)]
struct State {
    active: Option<ActiveSearch>,
    hails: BTreeSet<WorkerId>,
    inboxes: HashMap<WorkerId, JobMessage>,
    /// Raw JSON so malformed results can be injected.
    outboxes: HashMap<WorkerId, String>,
    jobs_sent: usize,
}

/// Mailbox held in memory. Clones share the same slots, so one handle can
/// play the coordinator while others play workers.
#[derive(Debug, Clone, Default)]
pub struct MemoryMailbox {
    state: Arc<Mutex<State>>,
}

impl MemoryMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Worker side: announce presence.
    pub fn hail(&self, worker: WorkerId) {
        self.lock().hails.insert(worker);
    }

    pub fn search_active(&self) -> bool {
        self.lock().active.is_some()
    }

    pub fn active_search(&self) -> Option<ActiveSearch> {
        self.lock().active.clone()
    }

    /// Worker side: take the pending job, consuming the inbox.
    pub fn receive_job(&self, worker: WorkerId) -> Option<JobMessage> {
        self.lock().inboxes.remove(&worker)
    }

    /// Worker side: publish a result.
    pub fn send_result(&self, worker: WorkerId, results: &ResultsMessage) {
        if let Ok(json) = serde_json::to_string(results) {
            self.send_raw_result(worker, json);
        }
    }

    /// Worker side: publish an arbitrary outbox payload.
    pub fn send_raw_result(&self, worker: WorkerId, payload: impl Into<String>) {
        self.lock().outboxes.insert(worker, payload.into());
    }

    /// Whether a job is waiting in the worker's inbox.
    pub fn has_job(&self, worker: WorkerId) -> bool {
        self.lock().inboxes.contains_key(&worker)
    }

    /// Total jobs written to any inbox.
    pub fn jobs_sent(&self) -> usize {
        self.lock().jobs_sent
    }
}

impl Mailbox for MemoryMailbox {
    fn announce_start(&mut self, search: &ActiveSearch) -> Result<(), MailboxError> {
        self.lock().active = Some(search.clone());
        Ok(())
    }

    fn announce_done(&mut self) -> Result<(), MailboxError> {
        self.lock().active = None;
        Ok(())
    }

    fn discover(&mut self) -> Result<Vec<WorkerId>, MailboxError> {
        let hails = std::mem::take(&mut self.lock().hails);
        Ok(hails.into_iter().collect())
    }

    fn send_job(&mut self, worker: WorkerId, job: &JobMessage) -> Result<(), MailboxError> {
        let mut state = self.lock();
        state.inboxes.insert(worker, job.clone());
        state.jobs_sent += 1;
        Ok(())
    }

    fn poll_result(&mut self, worker: WorkerId) -> Result<Option<ResultsMessage>, MailboxError> {
        let mut state = self.lock();
        if state.inboxes.contains_key(&worker) {
            return Ok(None);
        }
        let Some(payload) = state.outboxes.remove(&worker) else {
            return Ok(None);
        };
        serde_json::from_str(&payload)
            .map(Some)
            .map_err(|source| MailboxError::Payload { worker, source })
    }
}
