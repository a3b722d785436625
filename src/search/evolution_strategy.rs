//! Steady-state (mu + 1) evolution strategy.
//!
//! Parents are the `num_parents` fittest individuals evaluated so far.
//! Every child comes from a uniformly chosen parent. The feature map is
//! still filled so runs can be compared with MAP-Elites.

use rand::seq::SliceRandom;

use crate::schema::{CardSet, Individual};

use super::algorithm::{SearchAlgorithm, SearchState};
use super::{Result, SearchError};

pub struct EvolutionStrategy {
    state: SearchState,
    num_parents: usize,
    /// Sorted by descending fitness.
    parents: Vec<Individual>,
}

impl EvolutionStrategy {
    pub fn new(state: SearchState, num_parents: usize) -> Self {
        Self {
            state,
            num_parents,
            parents: Vec::new(),
        }
    }

    pub fn parents(&self) -> &[Individual] {
        &self.parents
    }
}

impl SearchAlgorithm for EvolutionStrategy {
    fn name(&self) -> &'static str {
        "EvolutionStrategy"
    }

    fn state(&self) -> &SearchState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut SearchState {
        &mut self.state
    }

    fn generate_individual(&mut self, cards: &CardSet) -> Result<Individual> {
        if self.state.count_dispatch() {
            return Ok(self.state.random_individual(cards));
        }
        let parent = self
            .parents
            .choose(self.state.rng_mut())
            .ok_or(SearchError::EmptyArchive)?;
        Ok(self.state.mutate(parent, cards))
    }

    fn observe(&mut self, individual: &Individual) {
        // Insert after equals so earlier parents win ties
        let fitness = individual.fitness();
        let position = self.parents.partition_point(|p| p.fitness() >= fitness);
        if position < self.num_parents {
            self.parents.insert(position, individual.clone());
            self.parents.truncate(self.num_parents);
        }
    }
}
