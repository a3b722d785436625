//! MAP-Elites archive: a sparse grid over discretized behaviour features.
//!
//! Each occupied cell holds exactly one elite. A contender replaces the
//! occupant only with strictly greater fitness, so ties keep the incumbent.
//! Every cell also keeps a count of all individuals ever mapped into it.
//!
//! The number of buckets per dimension comes from a [`MapSizer`]. It is
//! queried on construction, on [`FeatureMap::clear_maps`], and (when a
//! remap frequency is configured) every `remap_frequency` additions.

use std::collections::HashMap;
use std::fmt;

use rand::Rng;

use crate::schema::{FeatureParams, Individual, MapConfig, MapKind};

use super::SearchError;
use super::sizer::{LinearMapSizer, MapSizer};

/// Composite cell index, one bucket per feature dimension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey(Vec<usize>);

impl CellKey {
    pub fn buckets(&self) -> &[usize] {
        &self.0
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, bucket) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{bucket}")?;
        }
        Ok(())
    }
}

/// Archive statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct MapStats {
    pub coverage: usize,
    pub capacity: usize,
    pub total_added: usize,
    pub max_fitness: f64,
    pub mean_fitness: f64,
}

/// The MAP-Elites feature map.
pub struct FeatureMap {
    kind: MapKind,
    features: Vec<FeatureParams>,
    sizer: Box<dyn MapSizer + Send>,
    num_groups: usize,
    /// Denominator of the remap progress fraction.
    num_to_evaluate: usize,
    remap_frequency: usize,
    total_added: usize,
    elites: HashMap<CellKey, Individual>,
    /// Occupied keys in first-occupied order.
    elite_keys: Vec<CellKey>,
    cell_count: HashMap<CellKey, usize>,
    /// Everything added since the last reset; only kept when remapping.
    history: Vec<Individual>,
    /// Sliding bucket boundaries per dimension (empty until the first remap).
    boundaries: Vec<Vec<f64>>,
}

impl FeatureMap {
    /// Create an empty map sized by the sizer at zero progress.
    pub fn new(
        kind: MapKind,
        features: Vec<FeatureParams>,
        sizer: impl MapSizer + Send + 'static,
        num_to_evaluate: usize,
        remap_frequency: usize,
    ) -> Self {
        let num_groups = sizer.size(0.0);
        Self {
            kind,
            features,
            sizer: Box::new(sizer),
            num_groups,
            num_to_evaluate: num_to_evaluate.max(1),
            remap_frequency,
            total_added: 0,
            elites: HashMap::new(),
            elite_keys: Vec::new(),
            cell_count: HashMap::new(),
            history: Vec::new(),
            boundaries: Vec::new(),
        }
    }

    /// Create a map from configuration with a linear sizer.
    pub fn from_config(config: &MapConfig, num_to_evaluate: usize) -> Self {
        Self::new(
            config.kind,
            config.features.clone(),
            LinearMapSizer::new(config.start_size, config.end_size),
            num_to_evaluate,
            config.remap_frequency,
        )
    }

    /// Buckets per dimension.
    pub fn num_groups(&self) -> usize {
        self.num_groups
    }

    pub fn num_features(&self) -> usize {
        self.features.len()
    }

    pub fn features(&self) -> &[FeatureParams] {
        &self.features
    }

    /// Number of occupied cells.
    pub fn len(&self) -> usize {
        self.elites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elites.is_empty()
    }

    /// Number of `add` calls over the map's lifetime.
    pub fn total_added(&self) -> usize {
        self.total_added
    }

    /// Bucket index of one feature value.
    fn bucket(&self, dim: usize, value: f64) -> usize {
        let last = self.num_groups - 1;

        if self.kind == MapKind::Sliding
            && let Some(bounds) = self.boundaries.get(dim)
            && !bounds.is_empty()
        {
            return bounds.partition_point(|b| *b <= value).min(last);
        }

        let params = &self.features[dim];
        if value <= params.min_value {
            return 0;
        }
        if value >= params.max_value {
            return last;
        }
        let span = params.max_value - params.min_value;
        let position = (value - params.min_value) / span * self.num_groups as f64;
        // NaN saturates to bucket 0
        (position.floor() as usize).min(last)
    }

    /// Cell key for a feature vector. Missing dimensions land in bucket 0.
    pub fn key_for(&self, features: &[f64]) -> CellKey {
        CellKey(
            (0..self.features.len())
                .map(|dim| self.bucket(dim, features.get(dim).copied().unwrap_or(f64::NAN)))
                .collect(),
        )
    }

    /// Add an evaluated individual. Returns true if it became the elite of its cell.
    pub fn add(&mut self, individual: Individual) -> bool {
        self.total_added += 1;

        if self.remap_frequency > 0 {
            self.history.push(individual.clone());
            if self.total_added % self.remap_frequency == 0 {
                self.remap();
            }
        }

        self.add_to_map(individual)
    }

    fn add_to_map(&mut self, individual: Individual) -> bool {
        let key = self.key_for(individual.features());
        *self.cell_count.entry(key.clone()).or_insert(0) += 1;

        match self.elites.get(&key) {
            Some(incumbent) if individual.fitness() <= incumbent.fitness() => false,
            Some(_) => {
                self.elites.insert(key, individual);
                true
            }
            None => {
                self.elite_keys.push(key.clone());
                self.elites.insert(key, individual);
                true
            }
        }
    }

    /// Re-query the sizer and re-bucket the history, excluding its newest entry
    /// (which the caller is about to add).
    fn remap(&mut self) {
        let progress = self.total_added as f64 / self.num_to_evaluate as f64;
        self.num_groups = self.sizer.size(progress);
        self.elites.clear();
        self.elite_keys.clear();
        self.cell_count.clear();

        if self.kind == MapKind::Sliding {
            self.boundaries = self.sliding_boundaries();
        }

        let mut history = std::mem::take(&mut self.history);
        let newest = history.pop();
        for individual in &history {
            self.add_to_map(individual.clone());
        }
        history.extend(newest);
        self.history = history;
    }

    /// Equal-population boundaries over every value in the history.
    fn sliding_boundaries(&self) -> Vec<Vec<f64>> {
        (0..self.features.len())
            .map(|dim| {
                let mut values: Vec<f64> = self
                    .history
                    .iter()
                    .filter_map(|ind| ind.features().get(dim).copied())
                    .filter(|v| !v.is_nan())
                    .collect();
                if values.is_empty() {
                    return Vec::new();
                }
                values.sort_by(f64::total_cmp);
                (1..self.num_groups)
                    .map(|j| values[(j * values.len() / self.num_groups).min(values.len() - 1)])
                    .collect()
            })
            .collect()
    }

    /// Discard every cell and re-size the grid for `progress` (0..=1).
    pub fn clear_maps(&mut self, progress: f64) {
        self.num_groups = self.sizer.size(progress);
        self.elites.clear();
        self.elite_keys.clear();
        self.cell_count.clear();
        self.history.clear();
        self.boundaries.clear();
    }

    /// Uniformly sample an occupied cell's elite.
    pub fn random_elite<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<&Individual, SearchError> {
        if self.elite_keys.is_empty() {
            return Err(SearchError::EmptyArchive);
        }
        let key = &self.elite_keys[rng.gen_range(0..self.elite_keys.len())];
        self.elites.get(key).ok_or(SearchError::EmptyArchive)
    }

    /// Snapshot of the current elites in first-occupied order.
    pub fn all_elites(&self) -> Vec<Individual> {
        self.elites().map(|(_, ind)| ind.clone()).collect()
    }

    /// Occupied cells in first-occupied order.
    pub fn elites(&self) -> impl Iterator<Item = (&CellKey, &Individual)> {
        self.elite_keys
            .iter()
            .filter_map(|key| self.elites.get(key).map(|ind| (key, ind)))
    }

    pub fn get(&self, key: &CellKey) -> Option<&Individual> {
        self.elites.get(key)
    }

    /// Number of individuals ever mapped into `key` since the last reset.
    pub fn cell_count(&self, key: &CellKey) -> usize {
        self.cell_count.get(key).copied().unwrap_or(0)
    }

    pub fn stats(&self) -> MapStats {
        let fitnesses: Vec<f64> = self.elites.values().map(Individual::fitness).collect();
        MapStats {
            coverage: fitnesses.len(),
            capacity: self.num_groups.pow(self.features.len() as u32),
            total_added: self.total_added,
            max_fitness: fitnesses.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            mean_fitness: if fitnesses.is_empty() {
                0.0
            } else {
                fitnesses.iter().sum::<f64>() / fitnesses.len() as f64
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Deck, Phenotype};
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn features() -> Vec<FeatureParams> {
        vec![
            FeatureParams {
                name: "DeckManaSum".into(),
                min_value: 0.0,
                max_value: 10.0,
            },
            FeatureParams {
                name: "NumTurns".into(),
                min_value: 0.0,
                max_value: 10.0,
            },
        ]
    }

    fn fixed_map(groups: usize) -> FeatureMap {
        FeatureMap::new(
            MapKind::Fixed,
            features(),
            LinearMapSizer::new(groups, groups),
            100,
            0,
        )
    }

    fn evaluated(tag: &str, features: [f64; 2], fitness: f64) -> Individual {
        let mut ind = Individual::new(Deck::new(vec![tag.to_string()]));
        ind.phenotype = Some(Phenotype {
            fitness,
            features: features.to_vec(),
            ..Default::default()
        });
        ind
    }

    #[test]
    fn test_bucketing_boundaries() {
        let map = fixed_map(5);
        assert_eq!(map.key_for(&[10.0, 0.0]).buckets(), &[4, 0]);
        assert_eq!(map.key_for(&[25.0, -3.0]).buckets(), &[4, 0]);
        assert_eq!(map.key_for(&[1.99, 2.0]).buckets(), &[0, 1]);
        assert_eq!(map.key_for(&[f64::NAN]).buckets(), &[0, 0]);
        assert_eq!(map.key_for(&[9.99, 5.0]).to_string(), "4:2");
    }

    #[test]
    fn test_replace_on_strict_improvement() {
        let mut map = fixed_map(5);

        assert!(map.add(evaluated("first", [1.0, 1.0], 1.0)));
        // Tie keeps the incumbent
        assert!(!map.add(evaluated("tie", [1.5, 1.5], 1.0)));
        assert!(map.add(evaluated("better", [1.2, 1.2], 2.0)));
        assert!(!map.add(evaluated("worse", [1.1, 1.1], 0.5)));

        let key = map.key_for(&[1.0, 1.0]);
        assert_eq!(map.len(), 1);
        assert_eq!(map.cell_count(&key), 4);
        assert_eq!(map.get(&key).unwrap().deck.cards()[0], "better");
    }

    #[test]
    fn test_random_elite_on_empty_map() {
        let map = fixed_map(5);
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            map.random_elite(&mut rng),
            Err(SearchError::EmptyArchive)
        ));
    }

    #[test]
    fn test_random_elite_covers_cells() {
        let mut map = fixed_map(5);
        map.add(evaluated("a", [0.0, 0.0], 1.0));
        map.add(evaluated("b", [9.0, 9.0], 1.0));
        // Heavily visited cell must not be favoured
        for _ in 0..20 {
            map.add(evaluated("a2", [0.5, 0.5], 0.0));
        }

        let mut rng = StdRng::seed_from_u64(9);
        let picks_b = (0..400)
            .filter(|_| map.random_elite(&mut rng).unwrap().deck.cards()[0] == "b")
            .count();
        assert!((120..280).contains(&picks_b), "picked b {picks_b} times");
    }

    #[test]
    fn test_all_elites_is_a_snapshot() {
        let mut map = fixed_map(5);
        map.add(evaluated("a", [0.0, 0.0], 1.0));
        let snapshot = map.all_elites();
        map.add(evaluated("b", [9.0, 9.0], 1.0));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(map.all_elites().len(), 2);
    }

    #[test]
    fn test_clear_maps_resets_counts_and_resizes() {
        let mut map = FeatureMap::new(
            MapKind::Fixed,
            features(),
            LinearMapSizer::new(2, 10),
            100,
            0,
        );
        assert_eq!(map.num_groups(), 2);

        let ind = evaluated("a", [3.0, 3.0], 1.0);
        map.add(ind.clone());
        map.add(ind.clone());
        assert_eq!(map.cell_count(&map.key_for(&[3.0, 3.0])), 2);

        map.clear_maps(1.0);
        assert!(map.is_empty());
        assert_eq!(map.num_groups(), 10);

        map.add(ind);
        let key = map.key_for(&[3.0, 3.0]);
        assert_eq!(key.buckets(), &[3, 3]);
        assert_eq!(map.cell_count(&key), 1);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_periodic_remap_grows_resolution() {
        let mut map = FeatureMap::new(
            MapKind::Fixed,
            features(),
            LinearMapSizer::new(1, 5),
            4,
            2,
        );
        map.add(evaluated("a", [1.0, 1.0], 1.0));
        map.add(evaluated("b", [9.0, 9.0], 2.0));
        assert_eq!(map.num_groups(), 3);
        // Both survive in separate cells after re-bucketing
        assert_eq!(map.len(), 2);

        map.add(evaluated("c", [5.0, 5.0], 0.0));
        map.add(evaluated("d", [5.0, 5.0], 0.0));
        assert_eq!(map.num_groups(), 5);
        let key = map.key_for(&[5.0, 5.0]);
        assert_eq!(map.cell_count(&key), 2);
        assert_eq!(map.total_added(), 4);
    }

    #[test]
    fn test_sliding_map_uses_empirical_quantiles() {
        let mut map = FeatureMap::new(
            MapKind::Sliding,
            features(),
            LinearMapSizer::new(2, 2),
            100,
            4,
        );
        // Heavily skewed values: a fixed map would put all in bucket 0
        for (i, v) in [0.1, 0.2, 0.3, 0.4].into_iter().enumerate() {
            map.add(evaluated(&format!("d{i}"), [v, v], 1.0));
        }
        assert_eq!(map.key_for(&[0.15, 0.15]).buckets(), &[0, 0]);
        assert_eq!(map.key_for(&[0.35, 0.35]).buckets(), &[1, 1]);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_stats() {
        let mut map = fixed_map(4);
        map.add(evaluated("a", [0.0, 0.0], 1.0));
        map.add(evaluated("b", [9.0, 9.0], 3.0));
        let stats = map.stats();
        assert_eq!(stats.coverage, 2);
        assert_eq!(stats.capacity, 16);
        assert_eq!(stats.max_fitness, 3.0);
        assert_eq!(stats.mean_fitness, 2.0);
    }

    proptest! {
        #[test]
        fn prop_occupant_beats_everything_mapped(
            entries in prop::collection::vec((0.0f64..12.0, -2.0f64..10.0, -5.0f64..5.0), 1..150)
        ) {
            let mut map = fixed_map(4);
            for (i, (x, y, fitness)) in entries.iter().enumerate() {
                map.add(evaluated(&format!("d{i}"), [*x, *y], *fitness));
            }

            for (x, y, fitness) in &entries {
                let key = map.key_for(&[*x, *y]);
                let elite = map.get(&key).unwrap();
                prop_assert!(elite.fitness() >= *fitness);
            }

            // The elite is the earliest entry reaching its cell's best fitness
            for (key, elite) in map.elites() {
                let in_cell: Vec<(usize, f64)> = entries
                    .iter()
                    .enumerate()
                    .filter(|(_, (x, y, _))| map.key_for(&[*x, *y]) == *key)
                    .map(|(i, (_, _, f))| (i, *f))
                    .collect();
                let best = in_cell.iter().map(|(_, f)| *f).fold(f64::NEG_INFINITY, f64::max);
                let first = in_cell.iter().find(|(_, f)| *f == best).unwrap().0;
                prop_assert_eq!(&elite.deck.cards()[0], &format!("d{first}"));
            }
        }

        #[test]
        fn prop_cell_counts_match_additions(
            entries in prop::collection::vec((0.0f64..10.0, 0.0f64..10.0, -5.0f64..5.0), 0..150)
        ) {
            let mut map = fixed_map(3);
            let mut expected: HashMap<CellKey, usize> = HashMap::new();
            for (i, (x, y, fitness)) in entries.iter().enumerate() {
                let key = map.key_for(&[*x, *y]);
                *expected.entry(key).or_insert(0) += 1;
                map.add(evaluated(&format!("d{i}"), [*x, *y], *fitness));
            }

            prop_assert_eq!(map.len(), expected.len());
            for (key, count) in &expected {
                prop_assert_eq!(map.cell_count(key), *count);
            }
        }
    }
}
