//! Messages exchanged with evaluator workers through the mailbox.

use serde::{Deserialize, Serialize};

use super::{Deck, OverallStatistics, StrategyStatistics};

/// Deck description sent to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeckParams {
    /// Lower-case hero class name.
    pub class_name: String,
    pub card_list: Vec<String>,
}

/// Job payload written to a worker's inbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct JobMessage {
    pub deck: DeckParams,
}

impl JobMessage {
    pub fn new(hero_class: &str, deck: &Deck) -> Self {
        Self {
            deck: DeckParams {
                class_name: hero_class.to_lowercase(),
                card_list: deck.cards().to_vec(),
            },
        }
    }
}

/// Evaluation results written to a worker's outbox.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResultsMessage {
    pub overall_stats: OverallStatistics,
    #[serde(default)]
    pub strategy_stats: Vec<StrategyStatistics>,
}

/// Broadcast marker telling workers a search is accepting them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ActiveSearch {
    /// Algorithm name, for operators inspecting the marker.
    pub algorithm: String,
    /// Path of the configuration the search was started with.
    pub config_path: String,
}
