//! Surrogate-assisted search.
//!
//! Each outer round trains the surrogate model on every real evaluation so
//! far, runs MAP-Elites against the model's predictions in the surrogate
//! archive, then sends the surrogate elites to real workers. Real results
//! keep their surrogate IDs so the two archives can be compared.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use crate::logging::{IndividualLog, SearchLogs};
use crate::schema::{
    ActiveSearch, CardSet, Individual, OverallStatistics, SearchConfig, SurrogateRoundConfig,
};
use crate::search::{Result, SearchAlgorithm, SearchError, build_algorithm};

use super::mailbox::Mailbox;
use super::pool::WorkerPool;

/// Cheap approximate evaluator. Both calls are synchronous and batched.
pub trait SurrogateModel {
    /// Predict statistics for each individual, in order.
    fn predict(&mut self, individuals: &[Individual]) -> Result<Vec<OverallStatistics>>;

    /// Train on evaluated individuals.
    fn fit(&mut self, individuals: &[Individual]) -> Result<()>;
}

pub struct SurrogatedSearch<M, S> {
    pool: WorkerPool<M>,
    algorithm: Box<dyn SearchAlgorithm>,
    model: S,
    cards: CardSet,
    rounds: SurrogateRoundConfig,
    logs: Option<SearchLogs>,
    /// Root for the surrogate elite and training data logs.
    log_dir: Option<PathBuf>,
    marker: ActiveSearch,
    poll_interval: Duration,
    overtime: Duration,
    /// Every real evaluation, used as training data.
    buffer: Vec<Individual>,
    rounds_run: usize,
}

impl<M: Mailbox, S: SurrogateModel> SurrogatedSearch<M, S> {
    pub fn new(
        config: &SearchConfig,
        config_path: impl Into<String>,
        mailbox: M,
        algorithm: Box<dyn SearchAlgorithm>,
        model: S,
    ) -> Self {
        let marker = ActiveSearch {
            algorithm: algorithm.name().to_string(),
            config_path: config_path.into(),
        };
        Self {
            pool: WorkerPool::new(mailbox, config.deckspace.hero_class.clone()),
            algorithm,
            model,
            cards: config.deckspace.card_set(),
            rounds: config.search.surrogate.clone(),
            logs: None,
            log_dir: None,
            marker,
            poll_interval: Duration::from_millis(config.coordinator.poll_interval_ms),
            overtime: Duration::from_millis(config.coordinator.overtime_ms),
            buffer: Vec::new(),
            rounds_run: 0,
        }
    }

    /// Build the configured algorithm with every log under the configured
    /// log directory.
    pub fn from_config(
        config: &SearchConfig,
        config_path: impl Into<String>,
        mailbox: M,
        model: S,
    ) -> Result<Self> {
        let log_dir = config.logging.log_dir.clone();
        let algorithm = build_algorithm(config, Some(log_dir.as_path()))?;
        let mut search = Self::new(config, config_path, mailbox, algorithm, model);
        search.logs = Some(SearchLogs::new(&log_dir));
        search.log_dir = Some(log_dir);
        Ok(search)
    }

    pub fn algorithm(&self) -> &dyn SearchAlgorithm {
        self.algorithm.as_ref()
    }

    pub fn model(&self) -> &S {
        &self.model
    }

    pub fn pool(&self) -> &WorkerPool<M> {
        &self.pool
    }

    /// Outer rounds completed.
    pub fn rounds_run(&self) -> usize {
        self.rounds_run
    }

    /// Real evaluations collected as training data.
    pub fn training_data(&self) -> &[Individual] {
        &self.buffer
    }

    /// Run the whole search. The active-search marker is withdrawn even
    /// when a round fails.
    pub fn run(&mut self) -> Result<()> {
        info!("Starting surrogated {} search", self.algorithm.name());
        self.pool.announce_start(&self.marker)?;

        let outcome = self.search();
        self.pool.announce_done()?;
        outcome
    }

    fn search(&mut self) -> Result<()> {
        if !self.rounds.skip_init_population {
            self.evaluate_initial_population()?;
        }

        while self.algorithm.is_running()
            && self
                .rounds
                .num_outer_iterations
                .is_none_or(|limit| self.rounds_run < limit)
        {
            self.run_round()?;
        }

        if !self.rounds.fixed_model {
            self.train()?;
        }
        info!(
            "Surrogated search finished after {} rounds, {} evaluated",
            self.rounds_run,
            self.algorithm.num_evaluated()
        );
        Ok(())
    }

    fn evaluate_initial_population(&mut self) -> Result<()> {
        info!(
            "Evaluating initial population of {}",
            self.algorithm.initial_population()
        );
        while !self.algorithm.initial_population_evaluated() {
            self.pool.discover_workers();
            self.pool.dispatch_retries();
            while self.pool.has_idle() && !self.algorithm.initial_population_dispatched() {
                let individual = self.algorithm.generate_individual(&self.cards)?;
                if !self.pool.dispatch_one(individual) {
                    break;
                }
            }
            self.collect(false)?;
            self.pool.reap_overtime(self.overtime);

            if !self.algorithm.initial_population_evaluated() {
                thread::sleep(self.poll_interval);
            }
        }
        Ok(())
    }

    fn run_round(&mut self) -> Result<()> {
        if !self.rounds.fixed_model {
            self.train()?;
        }
        if self.rounds.keep_surrogate_archive {
            debug!("Surrogate archive is kept");
        } else {
            self.algorithm.clear_surrogate_map();
            debug!("Surrogate archive is cleared");
        }

        info!(
            "Running {} generations of {} surrogate evaluations",
            self.rounds.num_generation, self.rounds.num_to_evaluate_per_generation
        );
        for generation in 0..self.rounds.num_generation {
            self.surrogate_generation()?;
            debug!("Generation {} completed", generation + 1);
        }

        let elites = self.algorithm.surrogate_elites();
        if let Some(dir) = &self.log_dir {
            let path = dir
                .join("surrogate_elites")
                .join(format!("surrogate_elites_log{}.csv", self.rounds_run));
            IndividualLog::new(path).log_individuals(&elites)?;
        }

        info!("Evaluating {} surrogate elites", elites.len());
        self.evaluate_elites(elites)?;
        self.rounds_run += 1;
        Ok(())
    }

    /// One batch of candidates scored by the model into the surrogate archive.
    fn surrogate_generation(&mut self) -> Result<()> {
        let batch = (0..self.rounds.num_to_evaluate_per_generation)
            .map(|_| self.algorithm.generate_from_surrogate_map(&self.cards))
            .collect::<Result<Vec<_>>>()?;

        let predictions = self.model.predict(&batch)?;
        if predictions.len() != batch.len() {
            return Err(SearchError::Surrogate(format!(
                "expected {} predictions, got {}",
                batch.len(),
                predictions.len()
            )));
        }

        for (mut individual, stats) in batch.into_iter().zip(predictions) {
            self.algorithm.assign_surrogate_id(&mut individual);
            individual.set_statistics(stats, Vec::new());
            self.algorithm.add_to_surrogate_map(&mut individual)?;
        }
        Ok(())
    }

    /// Evaluate surrogate elites on real workers. The round is over once as
    /// many results have come back as there are elites.
    fn evaluate_elites(&mut self, elites: Vec<Individual>) -> Result<()> {
        let total = elites.len();
        let mut pending: VecDeque<Individual> =
            elites.iter().map(Individual::unevaluated_copy).collect();
        let mut evaluated = 0;

        while evaluated < total {
            self.pool.discover_workers();
            self.pool.dispatch_retries();
            while self.pool.has_idle() {
                let Some(individual) = pending.pop_front() else {
                    break;
                };
                let retry = individual.clone();
                if !self.pool.dispatch_one(individual) {
                    pending.push_front(retry);
                    break;
                }
            }

            evaluated += self.collect(true)?;
            self.pool.reap_overtime(self.overtime);

            if evaluated < total {
                thread::sleep(self.poll_interval);
            }
        }
        Ok(())
    }

    /// Archive, log and buffer every finished job.
    fn collect(&mut self, keep_id: bool) -> Result<usize> {
        let algorithm = &mut self.algorithm;
        let logs = &mut self.logs;
        let buffer = &mut self.buffer;

        self.pool.poll_completions(|mut individual| {
            if keep_id {
                algorithm.add_to_feature_map_keeping_id(&mut individual)?;
                algorithm.add_to_surrogate_map(&mut individual)?;
            } else {
                algorithm.add_to_feature_map(&mut individual)?;
            }
            if let Some(logs) = logs.as_mut() {
                logs.record(&individual)?;
            }
            buffer.push(individual);
            Ok(())
        })
    }

    fn train(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            warn!("No training data yet, skipping surrogate fit");
            return Ok(());
        }
        if let Some(dir) = &self.log_dir {
            let path = dir
                .join("train_log")
                .join(format!("training_data{}.csv", self.rounds_run));
            IndividualLog::new(path).log_individuals(&self.buffer)?;
        }
        info!("Fitting surrogate on {} individuals", self.buffer.len());
        self.model.fit(&self.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::MemoryMailbox;
    use crate::schema::{
        AlgorithmConfig, JobMessage, MapElitesConfig, ResultsMessage, SearchBudget,
    };
    use std::fs;
    use tempfile::tempdir;

    fn score(cards: &[String]) -> OverallStatistics {
        let fireballs = cards.iter().filter(|c| *c == "Fireball").count() as f64;
        let wisps = cards.iter().filter(|c| *c == "Wisp").count() as f64;
        OverallStatistics {
            win_count: fireballs,
            average_health_difference: fireballs - wisps,
            deck_mana_sum: fireballs * 8.0 + wisps,
            deck_mana_variance: wisps,
            ..Default::default()
        }
    }

    #[derive(Default)]
    struct CountingModel {
        fits: Vec<usize>,
        predictions: usize,
        short_by: usize,
    }

    impl SurrogateModel for CountingModel {
        fn predict(&mut self, individuals: &[Individual]) -> Result<Vec<OverallStatistics>> {
            self.predictions += individuals.len();
            let keep = individuals.len().saturating_sub(self.short_by);
            Ok(individuals[..keep]
                .iter()
                .map(|ind| score(ind.deck.cards()))
                .collect())
        }

        fn fit(&mut self, individuals: &[Individual]) -> Result<()> {
            assert!(individuals.iter().all(Individual::is_evaluated));
            self.fits.push(individuals.len());
            Ok(())
        }
    }

    fn config(log_dir: &std::path::Path) -> SearchConfig {
        let mut config = SearchConfig {
            random_seed: Some(3),
            ..Default::default()
        };
        config.search.algorithm = AlgorithmConfig::MapElites(MapElitesConfig {
            search: SearchBudget {
                initial_population: 4,
                num_to_evaluate: 12,
            },
            ..Default::default()
        });
        config.search.surrogate = SurrogateRoundConfig {
            num_generation: 3,
            num_to_evaluate_per_generation: 5,
            num_outer_iterations: Some(2),
            ..Default::default()
        };
        config.coordinator.poll_interval_ms = 1;
        config.logging.log_dir = log_dir.to_path_buf();
        config
    }

    /// Worker 1 answering every job, the first `malformed` of them with
    /// unreadable payloads.
    fn spawn_worker(mailbox: MemoryMailbox, mut malformed: usize) -> thread::JoinHandle<bool> {
        thread::spawn(move || {
            let mut seen_active = false;
            for _ in 0..1_000_000 {
                if mailbox.search_active() {
                    seen_active = true;
                } else if seen_active {
                    return true;
                }
                mailbox.hail(1);
                if let Some(JobMessage { deck }) = mailbox.receive_job(1) {
                    if malformed > 0 {
                        malformed -= 1;
                        mailbox.send_raw_result(1, "garbage");
                        continue;
                    }
                    let results = ResultsMessage {
                        overall_stats: score(&deck.card_list),
                        strategy_stats: Vec::new(),
                    };
                    mailbox.send_result(1, &results);
                }
                thread::sleep(Duration::from_micros(200));
            }
            false
        })
    }

    #[test]
    fn test_surrogated_rounds() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        let mailbox = MemoryMailbox::new();
        let mut search = SurrogatedSearch::from_config(
            &config,
            "search.json",
            mailbox.clone(),
            CountingModel::default(),
        )
        .unwrap();

        let worker = spawn_worker(mailbox.clone(), 0);
        search.run().unwrap();
        assert!(worker.join().unwrap());
        assert!(!mailbox.search_active());

        let rounds = search.rounds_run();
        assert!((1..=2).contains(&rounds));
        // One fit per round plus the final one, on a growing buffer
        let fits = &search.model().fits;
        assert_eq!(fits.len(), rounds + 1);
        assert_eq!(fits[0], 4);
        assert!(fits.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(search.model().predictions, rounds * 15);

        assert_eq!(search.training_data().len(), search.algorithm().num_evaluated());
        // Real evaluations of surrogate elites keep their surrogate IDs
        assert!(
            search.training_data()[4..]
                .iter()
                .all(|ind| ind.id.is_some_and(|id| id >= 4))
        );

        assert!(dir.path().join("surrogate_elites/surrogate_elites_log0.csv").exists());
        assert!(dir.path().join("train_log/training_data0.csv").exists());
        assert!(dir.path().join("individual_log.csv").exists());
    }

    #[test]
    fn test_fixed_model_is_never_fit() {
        let dir = tempdir().unwrap();
        let mut config = config(dir.path());
        config.search.surrogate.fixed_model = true;
        config.search.surrogate.num_outer_iterations = Some(1);
        let mailbox = MemoryMailbox::new();
        let mut search = SurrogatedSearch::from_config(
            &config,
            "search.json",
            mailbox.clone(),
            CountingModel::default(),
        )
        .unwrap();

        let worker = spawn_worker(mailbox.clone(), 0);
        search.run().unwrap();
        assert!(worker.join().unwrap());

        assert!(search.model().fits.is_empty());
        assert_eq!(search.rounds_run(), 1);
    }

    #[test]
    fn test_malformed_results_are_resent() {
        let dir = tempdir().unwrap();
        let mut config = config(dir.path());
        config.search.surrogate.num_outer_iterations = Some(1);
        let mailbox = MemoryMailbox::new();
        let mut search = SurrogatedSearch::from_config(
            &config,
            "search.json",
            mailbox.clone(),
            CountingModel::default(),
        )
        .unwrap();

        let worker = spawn_worker(mailbox.clone(), 2);
        search.run().unwrap();
        assert!(worker.join().unwrap());

        assert_eq!(search.model().fits[0], 4);
        assert_eq!(search.rounds_run(), 1);
        let evaluated = search.algorithm().num_evaluated();
        assert_eq!(search.training_data().len(), evaluated);
        assert_eq!(mailbox.jobs_sent(), evaluated + 2);
        assert_eq!(search.pool().pending_retries(), 0);
    }

    #[test]
    fn test_short_prediction_batch_fails() {
        let dir = tempdir().unwrap();
        let mut config = config(dir.path());
        config.search.surrogate.skip_init_population = true;
        let mailbox = MemoryMailbox::new();
        let model = CountingModel {
            short_by: 1,
            ..Default::default()
        };
        let mut search =
            SurrogatedSearch::from_config(&config, "search.json", mailbox.clone(), model).unwrap();

        assert!(matches!(search.run(), Err(SearchError::Surrogate(_))));
        assert!(!mailbox.search_active());
        // Nothing to train on before the first round
        assert!(search.model().fits.is_empty());
    }
}
