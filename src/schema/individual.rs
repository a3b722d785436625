//! Candidate decks and their evaluated phenotype.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A card that may appear in a deck.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    /// Card identifier as understood by the evaluator.
    pub name: String,
    /// Mana cost, used only for reporting.
    #[serde(default)]
    pub cost: u32,
    /// Maximum copies allowed in one deck.
    #[serde(default = "default_max_copies")]
    pub max_copies: usize,
}

fn default_max_copies() -> usize {
    2
}

impl Card {
    pub fn new(name: impl Into<String>, max_copies: usize) -> Self {
        Self {
            name: name.into(),
            cost: 0,
            max_copies,
        }
    }
}

/// The pool of cards decks are drawn from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CardSet {
    pub cards: Vec<Card>,
}

impl CardSet {
    pub fn new(cards: Vec<Card>) -> Self {
        Self { cards }
    }

    /// Largest deck the pool can fill while respecting copy limits.
    pub fn capacity(&self) -> usize {
        self.cards.iter().map(|c| c.max_copies).sum()
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Card> {
        self.cards.iter().find(|c| c.name == name)
    }
}

/// A deck: a sorted multiset of card names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Deck {
    cards: Vec<String>,
}

impl Deck {
    /// Build a deck, sorting the cards into canonical order.
    pub fn new(mut cards: Vec<String>) -> Self {
        cards.sort();
        Self { cards }
    }

    pub fn cards(&self) -> &[String] {
        &self.cards
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Copies of each card in the deck.
    pub fn counts(&self) -> HashMap<&str, usize> {
        let mut counts = HashMap::new();
        for card in &self.cards {
            *counts.entry(card.as_str()).or_insert(0) += 1;
        }
        counts
    }

}

impl fmt::Display for Deck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cards.join("*"))
    }
}

/// Aggregate statistics returned by an evaluator for one deck.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct OverallStatistics {
    pub win_count: f64,
    pub average_health_difference: f64,
    pub damage_done: f64,
    pub num_turns: f64,
    pub cards_drawn: f64,
    pub hand_size: f64,
    pub mana_spent: f64,
    pub mana_wasted: f64,
    pub strategy_alignment: f64,
    pub dust: f64,
    pub deck_mana_sum: f64,
    pub deck_mana_variance: f64,
    pub num_minion_cards: f64,
    pub num_spell_cards: f64,
}

impl OverallStatistics {
    /// Statistic names, in log column order.
    pub const NAMES: [&'static str; 14] = [
        "WinCount",
        "AverageHealthDifference",
        "DamageDone",
        "NumTurns",
        "CardsDrawn",
        "HandSize",
        "ManaSpent",
        "ManaWasted",
        "StrategyAlignment",
        "Dust",
        "DeckManaSum",
        "DeckManaVariance",
        "NumMinionCards",
        "NumSpellCards",
    ];

    /// Look up a statistic by its column name.
    pub fn stat_by_name(&self, name: &str) -> Option<f64> {
        let value = match name {
            "WinCount" => self.win_count,
            "AverageHealthDifference" => self.average_health_difference,
            "DamageDone" => self.damage_done,
            "NumTurns" => self.num_turns,
            "CardsDrawn" => self.cards_drawn,
            "HandSize" => self.hand_size,
            "ManaSpent" => self.mana_spent,
            "ManaWasted" => self.mana_wasted,
            "StrategyAlignment" => self.strategy_alignment,
            "Dust" => self.dust,
            "DeckManaSum" => self.deck_mana_sum,
            "DeckManaVariance" => self.deck_mana_variance,
            "NumMinionCards" => self.num_minion_cards,
            "NumSpellCards" => self.num_spell_cards,
            _ => return None,
        };
        Some(value)
    }

    /// All statistics in `NAMES` order.
    pub fn values(&self) -> [f64; 14] {
        Self::NAMES.map(|name| self.stat_by_name(name).unwrap_or_default())
    }
}

/// Per-strategy statistics returned alongside the overall record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct StrategyStatistics {
    pub win_count: f64,
    pub alignment: f64,
}

impl StrategyStatistics {
    pub const NAMES: [&'static str; 2] = ["WinCount", "Alignment"];

    pub fn values(&self) -> [f64; 2] {
        [self.win_count, self.alignment]
    }
}

/// Phenotype populated once a deck has been evaluated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Phenotype {
    pub fitness: f64,
    /// One value per archive dimension.
    pub features: Vec<f64>,
    pub overall: OverallStatistics,
    pub strategies: Vec<StrategyStatistics>,
}

/// A candidate deck and, once evaluated, its phenotype.
#[derive(Debug, Clone, PartialEq)]
pub struct Individual {
    /// Archive-wide ID, assigned when the evaluation is recorded.
    pub id: Option<u64>,
    /// ID of the elite this deck was mutated from.
    pub parent_id: Option<u64>,
    pub deck: Deck,
    pub phenotype: Option<Phenotype>,
}

impl Individual {
    /// An unevaluated seed individual.
    pub fn new(deck: Deck) -> Self {
        Self {
            id: None,
            parent_id: None,
            deck,
            phenotype: None,
        }
    }

    /// An unevaluated child of `parent`.
    pub fn with_parent(deck: Deck, parent: &Individual) -> Self {
        Self {
            id: None,
            parent_id: parent.id,
            deck,
            phenotype: None,
        }
    }

    /// Fresh unevaluated copy carrying only the deck and lineage.
    pub fn unevaluated_copy(&self) -> Self {
        Self {
            id: self.id,
            parent_id: self.parent_id,
            deck: self.deck.clone(),
            phenotype: None,
        }
    }

    pub fn is_evaluated(&self) -> bool {
        self.phenotype.is_some()
    }

    /// Fitness, or negative infinity when not yet evaluated.
    pub fn fitness(&self) -> f64 {
        self.phenotype
            .as_ref()
            .map_or(f64::NEG_INFINITY, |p| p.fitness)
    }

    pub fn features(&self) -> &[f64] {
        self.phenotype.as_ref().map_or(&[], |p| p.features.as_slice())
    }

    /// Record evaluator statistics. Fitness is the average health
    /// difference; features are left empty until the archive computes them.
    pub fn set_statistics(
        &mut self,
        overall: OverallStatistics,
        strategies: Vec<StrategyStatistics>,
    ) {
        self.phenotype = Some(Phenotype {
            fitness: overall.average_health_difference,
            features: Vec::new(),
            overall,
            strategies,
        });
    }
}
