//! The distributed run loop.

use std::thread;
use std::time::Duration;

use log::info;

use crate::logging::SearchLogs;
use crate::schema::{ActiveSearch, CardSet, SearchConfig};
use crate::search::{Result, SearchAlgorithm, build_algorithm};

use super::mailbox::Mailbox;
use super::pool::WorkerPool;

/// Polls a worker pool on a fixed interval until the algorithm has
/// evaluated its budget.
pub struct DistributedSearch<M> {
    pool: WorkerPool<M>,
    algorithm: Box<dyn SearchAlgorithm>,
    cards: CardSet,
    logs: Option<SearchLogs>,
    marker: ActiveSearch,
    poll_interval: Duration,
    overtime: Duration,
}

impl<M: Mailbox> DistributedSearch<M> {
    pub fn new(
        config: &SearchConfig,
        config_path: impl Into<String>,
        mailbox: M,
        algorithm: Box<dyn SearchAlgorithm>,
    ) -> Self {
        let marker = ActiveSearch {
            algorithm: algorithm.name().to_string(),
            config_path: config_path.into(),
        };
        Self {
            pool: WorkerPool::new(mailbox, config.deckspace.hero_class.clone()),
            algorithm,
            cards: config.deckspace.card_set(),
            logs: None,
            marker,
            poll_interval: Duration::from_millis(config.coordinator.poll_interval_ms),
            overtime: Duration::from_millis(config.coordinator.overtime_ms),
        }
    }

    /// Build the configured algorithm with individual and map logs under
    /// the configured log directory.
    pub fn from_config(
        config: &SearchConfig,
        config_path: impl Into<String>,
        mailbox: M,
    ) -> Result<Self> {
        let log_dir = &config.logging.log_dir;
        let algorithm = build_algorithm(config, Some(log_dir.as_path()))?;
        Ok(Self::new(config, config_path, mailbox, algorithm).with_logs(SearchLogs::new(log_dir)))
    }

    pub fn with_logs(mut self, logs: SearchLogs) -> Self {
        self.logs = Some(logs);
        self
    }

    pub fn algorithm(&self) -> &dyn SearchAlgorithm {
        self.algorithm.as_ref()
    }

    pub fn pool(&self) -> &WorkerPool<M> {
        &self.pool
    }

    /// One poll cycle without sleeping: discover, dispatch, collect, reap.
    /// Returns the number of completed evaluations.
    pub fn step(&mut self) -> Result<usize> {
        self.pool.discover_workers();
        self.dispatch_jobs()?;

        let algorithm = &mut self.algorithm;
        let logs = &mut self.logs;
        let completed = self.pool.poll_completions(|mut individual| {
            algorithm.add_to_feature_map(&mut individual)?;
            if let Some(logs) = logs.as_mut() {
                logs.record(&individual)?;
            }
            Ok(())
        })?;

        self.pool.reap_overtime(self.overtime);
        Ok(completed)
    }

    /// Run until the evaluation budget is spent. The active-search marker is
    /// withdrawn even when the loop fails.
    pub fn run(&mut self) -> Result<()> {
        info!(
            "Starting {} search: {} evaluations",
            self.algorithm.name(),
            self.algorithm.num_to_evaluate()
        );
        self.pool.announce_start(&self.marker)?;

        let outcome = self.poll_until_done();
        self.pool.announce_done()?;
        outcome?;

        let stats = self.algorithm.feature_map().stats();
        info!(
            "Search finished: {} evaluated, {}/{} cells, best fitness {:.3}",
            self.algorithm.num_evaluated(),
            stats.coverage,
            stats.capacity,
            stats.max_fitness
        );
        Ok(())
    }

    fn poll_until_done(&mut self) -> Result<()> {
        while self.algorithm.is_running() {
            self.step()?;
            if self.algorithm.is_running() {
                thread::sleep(self.poll_interval);
            }
        }
        Ok(())
    }

    /// Hand out jobs until no worker is idle or the algorithm blocks.
    /// Requeued jobs go first and ignore blocking.
    fn dispatch_jobs(&mut self) -> Result<usize> {
        let mut dispatched = self.pool.dispatch_retries();
        while self.pool.has_idle() && !self.algorithm.is_blocking() {
            let individual = self.algorithm.generate_individual(&self.cards)?;
            if !self.pool.dispatch_one(individual) {
                break;
            }
            dispatched += 1;
        }
        Ok(dispatched)
    }
}
