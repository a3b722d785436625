//! Worker bookkeeping: discovery, dispatch, completion and redelivery.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::schema::{ActiveSearch, Individual, JobMessage};
use crate::search::SearchError;

use super::WorkerId;
use super::mailbox::{Mailbox, MailboxError};

/// Tracks which workers are idle or running and what each one is evaluating.
///
/// A known worker is always in exactly one of the idle and running queues.
/// Both are serviced in FIFO order.
pub struct WorkerPool<M> {
    mailbox: M,
    hero_class: String,
    known: HashSet<WorkerId>,
    idle: VecDeque<WorkerId>,
    running: VecDeque<WorkerId>,
    jobs: HashMap<WorkerId, Individual>,
    /// Dispatch time per running worker; dropped once its job is redelivered.
    started: HashMap<WorkerId, Instant>,
    /// Jobs whose result could not be read, waiting to be sent again.
    retries: VecDeque<Individual>,
}

impl<M: Mailbox> WorkerPool<M> {
    pub fn new(mailbox: M, hero_class: impl Into<String>) -> Self {
        Self {
            mailbox,
            hero_class: hero_class.into(),
            known: HashSet::new(),
            idle: VecDeque::new(),
            running: VecDeque::new(),
            jobs: HashMap::new(),
            started: HashMap::new(),
            retries: VecDeque::new(),
        }
    }

    pub fn announce_start(&mut self, search: &ActiveSearch) -> Result<(), MailboxError> {
        info!("Announcing {} search", search.algorithm);
        self.mailbox.announce_start(search)
    }

    pub fn announce_done(&mut self) -> Result<(), MailboxError> {
        info!("Announcing search done");
        self.mailbox.announce_done()
    }

    /// Register newly announced workers as idle. Scan errors are logged and
    /// retried on the next call. Returns how many workers were new.
    pub fn discover_workers(&mut self) -> usize {
        let announced = match self.mailbox.discover() {
            Ok(workers) => workers,
            Err(e) => {
                warn!("Worker scan failed, retrying next poll: {e}");
                return 0;
            }
        };

        let mut found = 0;
        for worker in announced {
            if self.known.insert(worker) {
                info!("Found worker {worker}");
                self.idle.push_back(worker);
                found += 1;
            }
        }
        found
    }

    pub fn has_idle(&self) -> bool {
        !self.idle.is_empty()
    }

    /// Send `individual` to the next idle worker. Returns false if no worker
    /// is idle or the job could not be written.
    pub fn dispatch_one(&mut self, individual: Individual) -> bool {
        let Some(worker) = self.idle.pop_front() else {
            return false;
        };

        let job = JobMessage::new(&self.hero_class, &individual.deck);
        if let Err(e) = self.mailbox.send_job(worker, &job) {
            warn!("Could not send job to worker {worker}: {e}");
            self.idle.push_back(worker);
            return false;
        }

        debug!("Starting worker {worker}");
        self.jobs.insert(worker, individual);
        self.started.insert(worker, Instant::now());
        self.running.push_back(worker);
        true
    }

    /// Resend jobs whose results were malformed, ahead of any new work.
    /// Returns how many went out.
    pub fn dispatch_retries(&mut self) -> usize {
        let mut sent = 0;
        while self.has_idle() {
            let Some(individual) = self.retries.pop_front() else {
                break;
            };
            let retry = individual.clone();
            if !self.dispatch_one(individual) {
                self.retries.push_front(retry);
                break;
            }
            sent += 1;
        }
        sent
    }

    /// Jobs waiting to be resent.
    pub fn pending_retries(&self) -> usize {
        self.retries.len()
    }

    /// Collect every finished job, handing the evaluated individual to
    /// `on_complete` and returning its worker to the idle queue.
    ///
    /// A malformed result frees its worker and queues the job for
    /// [`dispatch_retries`](Self::dispatch_retries). Errors from
    /// `on_complete` abort the scan and are returned.
    pub fn poll_completions<F>(&mut self, mut on_complete: F) -> Result<usize, SearchError>
    where
        F: FnMut(Individual) -> Result<(), SearchError>,
    {
        let mut completed = 0;

        for _ in 0..self.running.len() {
            let Some(worker) = self.running.pop_front() else {
                break;
            };

            let results = match self.mailbox.poll_result(worker) {
                Ok(Some(results)) => results,
                Ok(None) => {
                    self.running.push_back(worker);
                    continue;
                }
                Err(MailboxError::Io(e)) => {
                    warn!("Could not poll worker {worker}: {e}");
                    self.running.push_back(worker);
                    continue;
                }
                Err(e @ MailboxError::Payload { .. }) => {
                    warn!("Requeueing job: {e}");
                    if let Some(job) = self.release(worker) {
                        self.retries.push_back(job);
                    }
                    continue;
                }
            };

            debug!("Worker done: {worker}");
            let job = self.release(worker);
            if let Some(mut individual) = job {
                individual.set_statistics(results.overall_stats, results.strategy_stats);
                completed += 1;
                on_complete(individual)?;
            }
        }

        Ok(completed)
    }

    /// Redeliver jobs running longer than `timeout` to other idle workers.
    pub fn reap_overtime(&mut self, timeout: Duration) -> usize {
        self.reap_overtime_at(Instant::now(), timeout)
    }

    /// Redelivery against an explicit clock. The original worker keeps its
    /// job and may still complete it; only its timestamp is dropped. Stops
    /// as soon as no idle worker is left.
    pub fn reap_overtime_at(&mut self, now: Instant, timeout: Duration) -> usize {
        let overdue: Vec<WorkerId> = self
            .running
            .iter()
            .copied()
            .filter(|w| {
                self.started
                    .get(w)
                    .is_some_and(|start| now.saturating_duration_since(*start) > timeout)
            })
            .collect();

        let mut redelivered = 0;
        for worker in overdue {
            if !self.has_idle() {
                break;
            }
            let Some(individual) = self.jobs.get(&worker).cloned() else {
                continue;
            };
            if self.dispatch_one(individual) {
                info!("Worker {worker} overtime, job redelivered");
                self.started.remove(&worker);
                redelivered += 1;
            }
        }
        redelivered
    }

    /// Return a worker to idle, dropping its job record.
    fn release(&mut self, worker: WorkerId) -> Option<Individual> {
        self.started.remove(&worker);
        self.idle.push_back(worker);
        self.jobs.remove(&worker)
    }

    pub fn idle_workers(&self) -> impl Iterator<Item = WorkerId> + '_ {
        self.idle.iter().copied()
    }

    pub fn running_workers(&self) -> impl Iterator<Item = WorkerId> + '_ {
        self.running.iter().copied()
    }

    /// Jobs currently out with workers.
    pub fn in_flight(&self) -> usize {
        self.running.len()
    }

    pub fn job(&self, worker: WorkerId) -> Option<&Individual> {
        self.jobs.get(&worker)
    }

    pub fn started_at(&self, worker: WorkerId) -> Option<Instant> {
        self.started.get(&worker).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::MemoryMailbox;
    use crate::schema::{Deck, OverallStatistics, ResultsMessage};

    fn individual(tag: &str) -> Individual {
        Individual::new(Deck::new(vec![tag.to_string()]))
    }

    fn results(fitness: f64) -> ResultsMessage {
        ResultsMessage {
            overall_stats: OverallStatistics {
                average_health_difference: fitness,
                ..Default::default()
            },
            strategy_stats: Vec::new(),
        }
    }

    fn pool(workers: &[WorkerId]) -> (WorkerPool<MemoryMailbox>, MemoryMailbox) {
        let mailbox = MemoryMailbox::new();
        let mut pool = WorkerPool::new(mailbox.clone(), "Mage");
        for &w in workers {
            mailbox.hail(w);
        }
        pool.discover_workers();
        (pool, mailbox)
    }

    #[test]
    fn test_discovery_registers_once() {
        let (mut pool, mailbox) = pool(&[1, 2]);
        assert_eq!(pool.idle_workers().collect::<Vec<_>>(), vec![1, 2]);

        assert!(pool.dispatch_one(individual("a")));
        mailbox.hail(1);
        mailbox.hail(3);
        assert_eq!(pool.discover_workers(), 1);
        assert_eq!(pool.idle_workers().collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(pool.running_workers().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_dispatch_and_completion_move_worker() {
        let (mut pool, mailbox) = pool(&[1]);

        assert!(pool.dispatch_one(individual("a")));
        assert!(!pool.has_idle());
        assert_eq!(pool.running_workers().collect::<Vec<_>>(), vec![1]);
        assert!(pool.started_at(1).is_some());
        assert!(mailbox.has_job(1));

        // No idle worker left
        assert!(!pool.dispatch_one(individual("b")));

        let mut done = Vec::new();
        let polled = pool
            .poll_completions(|ind| {
                done.push(ind);
                Ok(())
            })
            .unwrap();
        assert_eq!(polled, 0);

        mailbox.receive_job(1);
        mailbox.send_result(1, &results(2.5));
        let polled = pool
            .poll_completions(|ind| {
                done.push(ind);
                Ok(())
            })
            .unwrap();

        assert_eq!(polled, 1);
        assert_eq!(done[0].fitness(), 2.5);
        assert_eq!(done[0].deck.cards(), &["a".to_string()]);
        assert_eq!(pool.idle_workers().collect::<Vec<_>>(), vec![1]);
        assert_eq!(pool.in_flight(), 0);
        assert!(pool.started_at(1).is_none());
        assert!(pool.job(1).is_none());
    }

    #[test]
    fn test_overtime_redelivers_to_other_worker() {
        let (mut pool, mailbox) = pool(&[1]);
        assert!(pool.dispatch_one(individual("slow")));
        let start = pool.started_at(1).unwrap();
        let timeout = Duration::from_secs(60);

        // Overdue, but nobody to take the job yet
        let later = start + Duration::from_secs(61);
        assert_eq!(pool.reap_overtime_at(later, timeout), 0);
        assert!(pool.started_at(1).is_some());

        mailbox.hail(2);
        pool.discover_workers();
        assert_eq!(pool.reap_overtime_at(start + Duration::from_secs(30), timeout), 0);
        assert_eq!(pool.reap_overtime_at(later, timeout), 1);

        assert!(pool.started_at(1).is_none());
        assert!(pool.started_at(2).is_some());
        assert_eq!(pool.job(2).unwrap().deck, pool.job(1).unwrap().deck);
        assert!(mailbox.has_job(2));

        // Not redelivered twice
        mailbox.hail(3);
        pool.discover_workers();
        assert_eq!(pool.reap_overtime(timeout), 0);

        // The original may still finish
        mailbox.receive_job(1);
        mailbox.send_result(1, &results(1.0));
        let mut done = 0;
        pool.poll_completions(|_| {
            done += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!(done, 1);
        assert_eq!(pool.running_workers().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn test_malformed_result_requeues_job() {
        let (mut pool, mailbox) = pool(&[5]);
        assert!(pool.dispatch_one(individual("a")));

        mailbox.receive_job(5);
        mailbox.send_raw_result(5, "garbage");
        let polled = pool
            .poll_completions(|_| panic!("malformed result delivered"))
            .unwrap();

        assert_eq!(polled, 0);
        assert_eq!(pool.idle_workers().collect::<Vec<_>>(), vec![5]);
        assert!(pool.job(5).is_none());
        assert_eq!(pool.pending_retries(), 1);

        assert_eq!(pool.dispatch_retries(), 1);
        assert_eq!(pool.pending_retries(), 0);
        assert_eq!(pool.job(5).unwrap().deck.cards(), &["a".to_string()]);
        assert!(mailbox.has_job(5));

        mailbox.receive_job(5);
        mailbox.send_result(5, &results(3.0));
        let mut done = Vec::new();
        pool.poll_completions(|ind| {
            done.push(ind);
            Ok(())
        })
        .unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].fitness(), 3.0);
    }

    #[test]
    fn test_retries_wait_for_idle_worker() {
        let (mut pool, mailbox) = pool(&[1, 2]);
        assert!(pool.dispatch_one(individual("a")));
        assert!(pool.dispatch_one(individual("b")));

        mailbox.receive_job(1);
        mailbox.send_raw_result(1, "{ truncated");
        pool.poll_completions(|_| Ok(())).unwrap();
        assert!(pool.dispatch_one(individual("c")));

        // Worker 1 was taken by new work
        assert_eq!(pool.dispatch_retries(), 0);
        assert_eq!(pool.pending_retries(), 1);
    }

    #[test]
    fn test_callback_error_propagates() {
        let (mut pool, mailbox) = pool(&[1]);
        assert!(pool.dispatch_one(individual("a")));
        mailbox.receive_job(1);
        mailbox.send_result(1, &results(0.0));

        let result = pool.poll_completions(|_| Err(SearchError::EmptyArchive));
        assert!(matches!(result, Err(SearchError::EmptyArchive)));
        assert!(pool.has_idle());
    }
}
