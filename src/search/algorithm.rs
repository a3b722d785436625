//! The search algorithm interface and the state its variants share.

use std::path::Path;

use crate::logging::MapLog;
use crate::schema::{AlgorithmConfig, CardSet, Individual, MutationConfig, SearchConfig};

use super::deck::DeckRng;
use super::evolution_strategy::EvolutionStrategy;
use super::feature_map::FeatureMap;
use super::map_elites::MapElites;
use super::random_search::RandomSearch;
use super::Result;

/// Counters, archives and generator shared by every algorithm variant.
///
/// Dispatch and evaluation are counted separately because dispatch races
/// ahead of completion.
pub struct SearchState {
    initial_population: usize,
    num_to_evaluate: usize,
    deck_size: usize,
    mutation: MutationConfig,
    dispatched: usize,
    evaluated: usize,
    next_surrogate_id: u64,
    rng: DeckRng,
    feature_map: FeatureMap,
    surrogate_map: FeatureMap,
    map_log: Option<MapLog>,
    surrogate_map_log: Option<MapLog>,
}

impl SearchState {
    pub fn new(
        algorithm: &AlgorithmConfig,
        deck_size: usize,
        mutation: MutationConfig,
        rng: DeckRng,
    ) -> Self {
        let num_to_evaluate = algorithm.num_to_evaluate();
        let initial_population = algorithm.initial_population();
        Self {
            initial_population,
            num_to_evaluate,
            deck_size,
            mutation,
            dispatched: 0,
            evaluated: 0,
            next_surrogate_id: initial_population as u64,
            rng,
            feature_map: FeatureMap::from_config(algorithm.map(), num_to_evaluate),
            surrogate_map: FeatureMap::from_config(algorithm.map(), num_to_evaluate),
            map_log: None,
            surrogate_map_log: None,
        }
    }

    /// Snapshot both archives to `elite_map_log.csv` and
    /// `surrogate_elite_map_log.csv` under `log_dir` on every update.
    pub fn with_map_logs(mut self, log_dir: &Path) -> std::io::Result<Self> {
        self.map_log = Some(MapLog::create(log_dir.join("elite_map_log.csv"))?);
        self.surrogate_map_log = Some(MapLog::create(
            log_dir.join("surrogate_elite_map_log.csv"),
        )?);
        Ok(self)
    }

    fn progress(&self) -> f64 {
        self.evaluated as f64 / self.num_to_evaluate.max(1) as f64
    }

    /// Count a dispatch; true while it still belongs to the initial population.
    pub(super) fn count_dispatch(&mut self) -> bool {
        self.dispatched += 1;
        self.dispatched <= self.initial_population
    }

    pub(super) fn rng_mut(&mut self) -> &mut rand::rngs::StdRng {
        self.rng.rng_mut()
    }

    pub(super) fn random_individual(&mut self, cards: &CardSet) -> Individual {
        self.rng.random_individual(cards, self.deck_size)
    }

    pub(super) fn mutate(&mut self, parent: &Individual, cards: &CardSet) -> Individual {
        self.rng.mutate_individual(parent, cards, &self.mutation)
    }

    /// Mutated copy of a uniformly sampled elite of the real archive.
    pub(super) fn mutate_elite(&mut self, cards: &CardSet) -> Result<Individual> {
        let parent = self.feature_map.random_elite(self.rng.rng_mut())?;
        Ok(self.rng.mutate_individual(parent, cards, &self.mutation))
    }

    /// Mutated copy of a surrogate elite, falling back to the real archive
    /// while the surrogate map is empty and to a random deck while both are.
    fn mutate_surrogate_elite(&mut self, cards: &CardSet) -> Result<Individual> {
        let map = if self.surrogate_map.is_empty() {
            &self.feature_map
        } else {
            &self.surrogate_map
        };
        if map.is_empty() {
            return Ok(self.random_individual(cards));
        }
        let parent = map.random_elite(self.rng.rng_mut())?;
        Ok(self.rng.mutate_individual(parent, cards, &self.mutation))
    }

    /// Fill in the behaviour features from the statistics named by the map.
    fn compute_features(&self, individual: &mut Individual) {
        let features = self.feature_map.features();
        if let Some(phenotype) = individual.phenotype.as_mut() {
            phenotype.features = features
                .iter()
                .map(|f| phenotype.overall.stat_by_name(&f.name).unwrap_or(f64::NAN))
                .collect();
        }
    }

    fn admit(&mut self, individual: &mut Individual) -> Result<()> {
        self.evaluated += 1;
        self.compute_features(individual);
        self.feature_map.add(individual.clone());
        if let Some(log) = self.map_log.as_mut() {
            log.update(&self.feature_map)?;
        }
        Ok(())
    }

    fn admit_surrogate(&mut self, individual: &mut Individual) -> Result<()> {
        self.compute_features(individual);
        self.surrogate_map.add(individual.clone());
        if let Some(log) = self.surrogate_map_log.as_mut() {
            log.update(&self.surrogate_map)?;
        }
        Ok(())
    }
}

/// A candidate generator with an archive of evaluated individuals.
///
/// Variants supply [`state`](Self::state), [`generate_individual`](Self::generate_individual)
/// and optionally override the blocking rule or observe admissions; every
/// other operation is shared.
pub trait SearchAlgorithm {
    /// Human-readable algorithm name.
    fn name(&self) -> &'static str;

    fn state(&self) -> &SearchState;

    fn state_mut(&mut self) -> &mut SearchState;

    /// Next candidate to dispatch. Counts as a dispatch even if the caller
    /// later discards it.
    fn generate_individual(&mut self, cards: &CardSet) -> Result<Individual>;

    /// Called with every evaluated individual just before it is archived.
    fn observe(&mut self, _individual: &Individual) {}

    /// True once the initial population is out but nothing has come back,
    /// so there is nothing to mutate yet.
    fn is_blocking(&self) -> bool {
        self.initial_population_dispatched() && self.num_evaluated() == 0
    }

    /// The sole termination condition.
    fn is_running(&self) -> bool {
        self.num_evaluated() < self.num_to_evaluate()
    }

    fn initial_population_dispatched(&self) -> bool {
        self.num_dispatched() >= self.state().initial_population
    }

    fn initial_population_evaluated(&self) -> bool {
        self.num_evaluated() >= self.state().initial_population
    }

    fn initial_population(&self) -> usize {
        self.state().initial_population
    }

    fn num_dispatched(&self) -> usize {
        self.state().dispatched
    }

    fn num_evaluated(&self) -> usize {
        self.state().evaluated
    }

    fn num_to_evaluate(&self) -> usize {
        self.state().num_to_evaluate
    }

    /// Admit an evaluated individual, assigning it the next archive ID.
    /// The ID and behaviour features are written back into `individual`;
    /// the archive keeps its own copy.
    fn add_to_feature_map(&mut self, individual: &mut Individual) -> Result<()> {
        individual.id = Some(self.num_evaluated() as u64);
        self.add_to_feature_map_keeping_id(individual)
    }

    /// Admit an evaluated individual without renumbering it, for
    /// individuals whose ID must survive a surrogate round-trip.
    fn add_to_feature_map_keeping_id(&mut self, individual: &mut Individual) -> Result<()> {
        self.observe(individual);
        self.state_mut().admit(individual)
    }

    fn feature_map(&self) -> &FeatureMap {
        &self.state().feature_map
    }

    /// Snapshot of the real archive's elites.
    fn all_elites(&self) -> Vec<Individual> {
        self.feature_map().all_elites()
    }

    /// Mutated copy of a surrogate elite. Not counted as a dispatch.
    fn generate_from_surrogate_map(&mut self, cards: &CardSet) -> Result<Individual> {
        self.state_mut().mutate_surrogate_elite(cards)
    }

    /// Give a surrogate-evaluated individual the next surrogate ID.
    fn assign_surrogate_id(&mut self, individual: &mut Individual) {
        let state = self.state_mut();
        individual.id = Some(state.next_surrogate_id);
        state.next_surrogate_id += 1;
    }

    /// Admit an individual to the surrogate archive, keeping its ID.
    fn add_to_surrogate_map(&mut self, individual: &mut Individual) -> Result<()> {
        self.state_mut().admit_surrogate(individual)
    }

    /// Discard the surrogate archive, re-sizing it for the current progress.
    fn clear_surrogate_map(&mut self) {
        let state = self.state_mut();
        let progress = state.progress();
        state.surrogate_map.clear_maps(progress);
    }

    fn surrogate_map(&self) -> &FeatureMap {
        &self.state().surrogate_map
    }

    fn surrogate_elites(&self) -> Vec<Individual> {
        self.surrogate_map().all_elites()
    }
}

/// Build the configured algorithm. Map logs are written under `map_log_dir`
/// when given.
pub fn build_algorithm(
    config: &SearchConfig,
    map_log_dir: Option<&Path>,
) -> Result<Box<dyn SearchAlgorithm>> {
    config.validate()?;

    let params = &config.search;
    let mut state = SearchState::new(
        &params.algorithm,
        config.deckspace.deck_size,
        params.mutation.clone(),
        DeckRng::from_seed(config.random_seed),
    );
    if let Some(dir) = map_log_dir {
        state = state.with_map_logs(dir)?;
    }

    let algorithm: Box<dyn SearchAlgorithm> = match &params.algorithm {
        AlgorithmConfig::MapElites(_) => Box::new(MapElites::new(state)),
        AlgorithmConfig::RandomSearch(_) => Box::new(RandomSearch::new(state)),
        AlgorithmConfig::EvolutionStrategy(es) => {
            Box::new(EvolutionStrategy::new(state, es.num_parents))
        }
    };
    Ok(algorithm)
}
