//! Deck generation and mutation.
//!
//! Mutation is copy-on-write: the parent deck is never modified.

use rand::prelude::*;
use rand_distr::Poisson;

use crate::schema::{Card, CardSet, Deck, Individual, MutationConfig};

/// Random number generator wrapper for deck operations.
pub struct DeckRng {
    rng: StdRng,
}

impl DeckRng {
    /// Create from seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Create with random seed.
    pub fn random() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Create from an optional seed, falling back to entropy.
    pub fn from_seed(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::random, Self::new)
    }

    /// Access the underlying generator, e.g. for archive sampling.
    pub fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Draw `deck_size` cards uniformly from the pool, honouring copy limits.
    ///
    /// The deck is shorter than `deck_size` only if the pool cannot fill it,
    /// which configuration validation rules out.
    pub fn random_deck(&mut self, cards: &CardSet, deck_size: usize) -> Deck {
        let slots: Vec<&String> = cards
            .cards
            .iter()
            .flat_map(|c| std::iter::repeat_n(&c.name, c.max_copies))
            .collect();

        let chosen = slots
            .choose_multiple(&mut self.rng, deck_size)
            .map(|name| (*name).clone())
            .collect();
        Deck::new(chosen)
    }

    /// Generate an unevaluated seed individual.
    pub fn random_individual(&mut self, cards: &CardSet, deck_size: usize) -> Individual {
        Individual::new(self.random_deck(cards, deck_size))
    }

    /// Swap at least one card for another card from the pool.
    pub fn mutate(&mut self, deck: &Deck, cards: &CardSet, config: &MutationConfig) -> Deck {
        let mut next = deck.cards().to_vec();
        if next.is_empty() {
            return deck.clone();
        }

        let swaps = self.swap_count(config.mean_extra_swaps).min(next.len());
        for _ in 0..swaps {
            let idx = self.rng.gen_range(0..next.len());
            let removed = next.swap_remove(idx);

            let candidates: Vec<&Card> = cards
                .cards
                .iter()
                .filter(|c| next.iter().filter(|n| **n == c.name).count() < c.max_copies)
                .collect();

            match candidates.choose(&mut self.rng) {
                Some(card) => next.push(card.name.clone()),
                None => next.push(removed),
            }
        }

        Deck::new(next)
    }

    /// Mutated child of an elite; the parent is left untouched.
    pub fn mutate_individual(
        &mut self,
        parent: &Individual,
        cards: &CardSet,
        config: &MutationConfig,
    ) -> Individual {
        Individual::with_parent(self.mutate(&parent.deck, cards, config), parent)
    }

    /// One mandatory swap plus a Poisson-distributed number of extra swaps.
    fn swap_count(&mut self, mean_extra: f64) -> usize {
        let extra = Poisson::new(mean_extra)
            .map(|dist| self.rng.sample(dist) as usize)
            .unwrap_or(0);
        1 + extra
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> CardSet {
        CardSet::new(vec![
            Card::new("Fireball", 2),
            Card::new("Frostbolt", 2),
            Card::new("Polymorph", 2),
            Card::new("Wisp", 2),
            Card::new("Leeroy", 1),
        ])
    }

    fn respects_limits(deck: &Deck, cards: &CardSet) -> bool {
        deck.counts()
            .iter()
            .all(|(name, &n)| cards.get(name).is_some_and(|c| n <= c.max_copies))
    }

    #[test]
    fn test_random_deck() {
        let mut rng = DeckRng::new(42);
        let cards = pool();

        let deck = rng.random_deck(&cards, 8);
        assert_eq!(deck.len(), 8);
        assert!(respects_limits(&deck, &cards));

        // Entire pool
        let full = rng.random_deck(&cards, cards.capacity());
        assert_eq!(full.len(), 9);
        assert_eq!(full.counts()["Leeroy"], 1);
    }

    #[test]
    fn test_mutation_copy_on_write() {
        let mut rng = DeckRng::new(7);
        let cards = pool();
        let parent = rng.random_individual(&cards, 6);
        let before = parent.clone();

        let config = MutationConfig::default();
        for _ in 0..100 {
            let child = rng.mutate_individual(&parent, &cards, &config);
            assert_eq!(child.deck.len(), 6);
            assert!(respects_limits(&child.deck, &cards));
            assert!(child.phenotype.is_none());
        }
        assert_eq!(parent, before);
    }

    #[test]
    fn test_mutation_changes_decks() {
        let mut rng = DeckRng::new(3);
        let cards = pool();
        let deck = rng.random_deck(&cards, 6);
        let config = MutationConfig {
            mean_extra_swaps: 2.0,
        };

        let changed = (0..50)
            .filter(|_| rng.mutate(&deck, &cards, &config) != deck)
            .count();
        assert!(changed > 0);
    }

    #[test]
    fn test_seeded_generation_is_deterministic() {
        let cards = pool();
        let a = DeckRng::new(11).random_deck(&cards, 7);
        let b = DeckRng::new(11).random_deck(&cards, 7);
        assert_eq!(a, b);
    }

    #[test]
    fn test_child_records_parent() {
        let mut rng = DeckRng::new(5);
        let cards = pool();
        let mut parent = rng.random_individual(&cards, 4);
        parent.id = Some(17);
        let child = rng.mutate_individual(&parent, &cards, &MutationConfig::default());
        assert_eq!(child.parent_id, Some(17));
        assert_eq!(child.id, None);
    }
}
