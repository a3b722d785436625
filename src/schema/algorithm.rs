//! Search algorithm and archive configuration types.

use serde::{Deserialize, Serialize};

/// Search algorithm selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AlgorithmConfig {
    /// MAP-Elites: random initial population, then mutate uniformly sampled elites.
    MapElites(MapElitesConfig),
    /// Random decks only; the archive is kept for reporting.
    RandomSearch(RandomSearchConfig),
    /// Steady-state evolution strategy over the fittest evaluated decks.
    EvolutionStrategy(EvolutionStrategyConfig),
}

impl Default for AlgorithmConfig {
    fn default() -> Self {
        Self::MapElites(MapElitesConfig::default())
    }
}

impl AlgorithmConfig {
    /// Human-readable algorithm name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MapElites(_) => "MAP-Elites",
            Self::RandomSearch(_) => "RandomSearch",
            Self::EvolutionStrategy(_) => "EvolutionStrategy",
        }
    }

    pub fn map(&self) -> &MapConfig {
        match self {
            Self::MapElites(c) => &c.map,
            Self::RandomSearch(c) => &c.map,
            Self::EvolutionStrategy(c) => &c.map,
        }
    }

    pub fn num_to_evaluate(&self) -> usize {
        match self {
            Self::MapElites(c) => c.search.num_to_evaluate,
            Self::RandomSearch(c) => c.num_to_evaluate,
            Self::EvolutionStrategy(c) => c.search.num_to_evaluate,
        }
    }

    /// Size of the random initial population (random search is all initial population).
    pub fn initial_population(&self) -> usize {
        match self {
            Self::MapElites(c) => c.search.initial_population,
            Self::RandomSearch(c) => c.num_to_evaluate,
            Self::EvolutionStrategy(c) => c.search.initial_population,
        }
    }
}

/// Evaluation budget shared by the evolutionary variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchBudget {
    /// Number of random decks dispatched before mutation starts.
    #[serde(default = "default_initial_population")]
    pub initial_population: usize,
    /// Total evaluations before the search stops.
    #[serde(default = "default_num_to_evaluate")]
    pub num_to_evaluate: usize,
}

impl Default for SearchBudget {
    fn default() -> Self {
        Self {
            initial_population: default_initial_population(),
            num_to_evaluate: default_num_to_evaluate(),
        }
    }
}

fn default_initial_population() -> usize {
    100
}
fn default_num_to_evaluate() -> usize {
    10_000
}

/// MAP-Elites configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MapElitesConfig {
    #[serde(default)]
    pub search: SearchBudget,
    #[serde(default)]
    pub map: MapConfig,
}

/// Random search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomSearchConfig {
    #[serde(default = "default_num_to_evaluate")]
    pub num_to_evaluate: usize,
    #[serde(default)]
    pub map: MapConfig,
}

impl Default for RandomSearchConfig {
    fn default() -> Self {
        Self {
            num_to_evaluate: default_num_to_evaluate(),
            map: MapConfig::default(),
        }
    }
}

/// Evolution strategy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionStrategyConfig {
    #[serde(default)]
    pub search: SearchBudget,
    /// Number of fittest evaluated decks kept as parents.
    #[serde(default = "default_num_parents")]
    pub num_parents: usize,
    #[serde(default)]
    pub map: MapConfig,
}

impl Default for EvolutionStrategyConfig {
    fn default() -> Self {
        Self {
            search: SearchBudget::default(),
            num_parents: default_num_parents(),
            map: MapConfig::default(),
        }
    }
}

fn default_num_parents() -> usize {
    20
}

/// How a feature map turns feature values into bucket indices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MapKind {
    /// Equal-width buckets over the configured range.
    #[default]
    #[serde(alias = "FixedFeature")]
    Fixed,
    /// Equal-population buckets over every value seen so far.
    #[serde(alias = "SlidingFeature")]
    Sliding,
}

/// Feature map (archive) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapConfig {
    #[serde(default)]
    pub kind: MapKind,
    /// Re-bucket the full history every this many additions (0 disables).
    #[serde(default)]
    pub remap_frequency: usize,
    /// Buckets per dimension at the start of the run.
    #[serde(default = "default_start_size")]
    pub start_size: usize,
    /// Buckets per dimension at the end of the run.
    #[serde(default = "default_end_size")]
    pub end_size: usize,
    /// Behaviour dimensions, named after evaluator statistics.
    #[serde(default = "default_features")]
    pub features: Vec<FeatureParams>,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            kind: MapKind::default(),
            remap_frequency: 0,
            start_size: default_start_size(),
            end_size: default_end_size(),
            features: default_features(),
        }
    }
}

fn default_start_size() -> usize {
    20
}
fn default_end_size() -> usize {
    20
}
fn default_features() -> Vec<FeatureParams> {
    vec![
        FeatureParams {
            name: "DeckManaSum".to_string(),
            min_value: 0.0,
            max_value: 150.0,
        },
        FeatureParams {
            name: "DeckManaVariance".to_string(),
            min_value: 0.0,
            max_value: 10.0,
        },
    ]
}

/// One behaviour dimension of the archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureParams {
    /// Name of the evaluator statistic used as this feature.
    pub name: String,
    pub min_value: f64,
    pub max_value: f64,
}

/// Card-swap mutation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationConfig {
    /// Mean number of extra swaps on top of the mandatory one.
    #[serde(default = "default_extra_swaps")]
    pub mean_extra_swaps: f64,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            mean_extra_swaps: default_extra_swaps(),
        }
    }
}

fn default_extra_swaps() -> f64 {
    1.0
}
