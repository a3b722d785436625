//! Archive and search algorithms.
//!
//! The [`FeatureMap`] is the MAP-Elites archive. A [`SearchAlgorithm`]
//! generates candidate decks and feeds evaluated ones back into its maps;
//! the coordinator decides where and when they are evaluated.

mod algorithm;
mod deck;
mod evolution_strategy;
mod feature_map;
mod map_elites;
mod random_search;
mod sizer;

pub use algorithm::{SearchAlgorithm, SearchState, build_algorithm};
pub use deck::DeckRng;
pub use evolution_strategy::EvolutionStrategy;
pub use feature_map::{CellKey, FeatureMap, MapStats};
pub use map_elites::MapElites;
pub use random_search::RandomSearch;
pub use sizer::{LinearMapSizer, MapSizer};

use std::io;

use thiserror::Error;

use crate::coordinator::MailboxError;
use crate::schema::ConfigError;

/// Errors raised by the search layer.
#[derive(Debug, Error)]
pub enum SearchError {
    /// An elite was requested before anything was admitted to the archive.
    #[error("Cannot sample an elite from an empty archive")]
    EmptyArchive,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Mailbox(#[from] MailboxError),

    #[error("Surrogate model error: {0}")]
    Surrogate(String),
}

/// Result type for search operations.
pub type Result<T> = std::result::Result<T, SearchError>;
