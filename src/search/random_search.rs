//! Random search baseline. Archives into a feature map for reporting only.

use crate::schema::{CardSet, Individual};

use super::Result;
use super::algorithm::{SearchAlgorithm, SearchState};

pub struct RandomSearch {
    state: SearchState,
}

impl RandomSearch {
    pub fn new(state: SearchState) -> Self {
        Self { state }
    }
}

impl SearchAlgorithm for RandomSearch {
    fn name(&self) -> &'static str {
        "RandomSearch"
    }

    fn state(&self) -> &SearchState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut SearchState {
        &mut self.state
    }

    fn generate_individual(&mut self, cards: &CardSet) -> Result<Individual> {
        self.state.count_dispatch();
        Ok(self.state.random_individual(cards))
    }

    fn is_blocking(&self) -> bool {
        false
    }
}
