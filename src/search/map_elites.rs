//! MAP-Elites: random seeds, then mutations of uniformly sampled elites.

use crate::schema::{CardSet, Individual};

use super::Result;
use super::algorithm::{SearchAlgorithm, SearchState};

pub struct MapElites {
    state: SearchState,
}

impl MapElites {
    pub fn new(state: SearchState) -> Self {
        Self { state }
    }
}

impl SearchAlgorithm for MapElites {
    fn name(&self) -> &'static str {
        "MAP-Elites"
    }

    fn state(&self) -> &SearchState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut SearchState {
        &mut self.state
    }

    fn generate_individual(&mut self, cards: &CardSet) -> Result<Individual> {
        if self.state.count_dispatch() {
            Ok(self.state.random_individual(cards))
        } else {
            self.state.mutate_elite(cards)
        }
    }
}
