//! Top-level search configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::{AlgorithmConfig, Card, CardSet, MapKind, MutationConfig, OverallStatistics};

/// Top-level configuration for a deck search run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchConfig {
    /// The space of decks being searched.
    #[serde(default)]
    pub deckspace: DeckspaceConfig,
    /// Search algorithm and outer-loop settings.
    #[serde(default)]
    pub search: SearchParams,
    /// Worker pool and mailbox settings.
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    /// Where progress logs are written.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Random seed for reproducibility.
    #[serde(default)]
    pub random_seed: Option<u64>,
}

/// Deck space: hero class, deck size and card pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeckspaceConfig {
    #[serde(default = "default_hero_class")]
    pub hero_class: String,
    /// Number of cards in every deck.
    #[serde(default = "default_deck_size")]
    pub deck_size: usize,
    /// Cards decks are drawn from.
    #[serde(default = "default_cards")]
    pub cards: Vec<Card>,
}

impl Default for DeckspaceConfig {
    fn default() -> Self {
        Self {
            hero_class: default_hero_class(),
            deck_size: default_deck_size(),
            cards: default_cards(),
        }
    }
}

impl DeckspaceConfig {
    pub fn card_set(&self) -> CardSet {
        CardSet::new(self.cards.clone())
    }
}

fn default_hero_class() -> String {
    "Mage".to_string()
}
fn default_deck_size() -> usize {
    30
}
fn default_cards() -> Vec<Card> {
    [
        ("Arcane Explosion", 2),
        ("Arcane Intellect", 3),
        ("Arcane Missiles", 1),
        ("Fireball", 4),
        ("Flamestrike", 7),
        ("Frost Nova", 3),
        ("Frostbolt", 2),
        ("Mirror Image", 1),
        ("Polymorph", 4),
        ("Water Elemental", 4),
        ("Bloodfen Raptor", 2),
        ("Boulderfist Ogre", 6),
        ("Chillwind Yeti", 4),
        ("Murloc Raider", 1),
        ("Novice Engineer", 2),
        ("River Crocolisk", 2),
        ("Sen'jin Shieldmasta", 4),
        ("Wolfrider", 3),
    ]
    .into_iter()
    .map(|(name, cost)| Card {
        name: name.to_string(),
        cost,
        max_copies: 2,
    })
    .collect()
}

/// Which outer loop drives the search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchCategory {
    /// Every candidate is evaluated by a worker.
    #[default]
    Distributed,
    /// Candidates are pre-screened by a surrogate model.
    Surrogated,
}

/// Search algorithm and outer-loop parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub category: SearchCategory,
    #[serde(default)]
    pub algorithm: AlgorithmConfig,
    #[serde(default)]
    pub mutation: MutationConfig,
    /// Only read for the surrogated category.
    #[serde(default)]
    pub surrogate: SurrogateRoundConfig,
}

/// Parameters of each surrogate-assisted round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurrogateRoundConfig {
    /// Generations of MAP-Elites run on the surrogate per round.
    #[serde(default = "default_num_generation")]
    pub num_generation: usize,
    /// Candidates predicted per generation.
    #[serde(default = "default_num_per_generation")]
    pub num_to_evaluate_per_generation: usize,
    /// Stop after this many rounds even if evaluations remain.
    #[serde(default)]
    pub num_outer_iterations: Option<usize>,
    /// Keep the surrogate archive between rounds instead of clearing it.
    #[serde(default)]
    pub keep_surrogate_archive: bool,
    /// Start rounds immediately without a real initial population.
    #[serde(default)]
    pub skip_init_population: bool,
    /// Never refit the model (it was trained elsewhere).
    #[serde(default)]
    pub fixed_model: bool,
}

impl Default for SurrogateRoundConfig {
    fn default() -> Self {
        Self {
            num_generation: default_num_generation(),
            num_to_evaluate_per_generation: default_num_per_generation(),
            num_outer_iterations: None,
            keep_surrogate_archive: false,
            skip_init_population: false,
            fixed_model: false,
        }
    }
}

fn default_num_generation() -> usize {
    100
}
fn default_num_per_generation() -> usize {
    100
}

/// Worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Directory holding the `active/` and `boxes/` mailbox folders.
    #[serde(default = "default_mailbox_dir")]
    pub mailbox_dir: PathBuf,
    /// Sleep between poll cycles, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Redispatch a job after it has run this long, in milliseconds.
    #[serde(default = "default_overtime_ms")]
    pub overtime_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            mailbox_dir: default_mailbox_dir(),
            poll_interval_ms: default_poll_interval_ms(),
            overtime_ms: default_overtime_ms(),
        }
    }
}

fn default_mailbox_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_overtime_ms() -> u64 {
    10 * 60 * 1000
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
        }
    }
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

impl SearchConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let deckspace = &self.deckspace;
        if deckspace.deck_size == 0 {
            return Err(ConfigError::EmptyDeck);
        }
        if deckspace.cards.is_empty() {
            return Err(ConfigError::EmptyCardPool);
        }
        let capacity = deckspace.card_set().capacity();
        if capacity < deckspace.deck_size {
            return Err(ConfigError::CardPoolTooSmall {
                deck_size: deckspace.deck_size,
                capacity,
            });
        }

        let algorithm = &self.search.algorithm;
        if algorithm.num_to_evaluate() == 0 {
            return Err(ConfigError::NothingToEvaluate);
        }
        if algorithm.initial_population() == 0 {
            return Err(ConfigError::EmptyInitialPopulation);
        }
        if let AlgorithmConfig::EvolutionStrategy(es) = algorithm
            && es.num_parents == 0
        {
            return Err(ConfigError::NoParents);
        }

        let map = algorithm.map();
        if map.features.is_empty() {
            return Err(ConfigError::NoFeatures);
        }
        if map.start_size == 0 || map.end_size == 0 {
            return Err(ConfigError::InvalidMapSize);
        }
        for feature in &map.features {
            if OverallStatistics::default()
                .stat_by_name(&feature.name)
                .is_none()
            {
                return Err(ConfigError::UnknownFeature(feature.name.clone()));
            }
            let degenerate = map.kind == MapKind::Fixed && feature.min_value >= feature.max_value;
            if degenerate || feature.min_value > feature.max_value {
                return Err(ConfigError::InvalidFeatureRange {
                    name: feature.name.clone(),
                    min: feature.min_value,
                    max: feature.max_value,
                });
            }
        }

        let extra_swaps = self.search.mutation.mean_extra_swaps;
        if extra_swaps.is_nan() || extra_swaps < 0.0 {
            return Err(ConfigError::InvalidMutation(extra_swaps));
        }
        if self.search.category == SearchCategory::Surrogated
            && self.search.surrogate.num_to_evaluate_per_generation == 0
        {
            return Err(ConfigError::EmptyGeneration);
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Deck size must be non-zero")]
    EmptyDeck,
    #[error("Card pool is empty")]
    EmptyCardPool,
    #[error("Card pool holds at most {capacity} cards but decks need {deck_size}")]
    CardPoolTooSmall { deck_size: usize, capacity: usize },
    #[error("Number of individuals to evaluate must be non-zero")]
    NothingToEvaluate,
    #[error("Initial population must be non-zero")]
    EmptyInitialPopulation,
    #[error("Evolution strategy needs at least one parent")]
    NoParents,
    #[error("Feature map has no features")]
    NoFeatures,
    #[error("Feature map sizes must be non-zero")]
    InvalidMapSize,
    #[error("Unknown feature statistic: {0}")]
    UnknownFeature(String),
    #[error("Feature {name} has an invalid range [{min}, {max}]")]
    InvalidFeatureRange { name: String, min: f64, max: f64 },
    #[error("Mean extra swaps must be a non-negative number, got {0}")]
    InvalidMutation(f64),
    #[error("Surrogate generations must contain at least one candidate")]
    EmptyGeneration,
}
