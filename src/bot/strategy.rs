//! Bot move selection
//!
//! A strategy picks the letter a bot announces and the cell it fills.
//! Strategies own their RNG so a seeded registry replays the same game.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use rand::distr::weighted::WeightedIndex;
use rand::prelude::*;
use rand::rngs::StdRng;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{GameError, Result};
use crate::game::{Board, Game, Position};

/// English letter frequencies (percentages * 100 for integer weights).
/// Based on standard English text frequency analysis.
const LETTER_WEIGHTS: [(char, u32); 26] = [
    ('A', 820),
    ('B', 150),
    ('C', 280),
    ('D', 430),
    ('E', 1270),
    ('F', 220),
    ('G', 200),
    ('H', 610),
    ('I', 700),
    ('J', 15),
    ('K', 80),
    ('L', 400),
    ('M', 240),
    ('N', 670),
    ('O', 750),
    ('P', 190),
    ('Q', 10),
    ('R', 600),
    ('S', 630),
    ('T', 910),
    ('U', 280),
    ('V', 100),
    ('W', 240),
    ('X', 15),
    ('Y', 200),
    ('Z', 7),
];

static LETTER_DIST: Lazy<Option<WeightedIndex<u32>>> =
    Lazy::new(|| WeightedIndex::new(LETTER_WEIGHTS.iter().map(|(_, w)| *w)).ok());

pub const RANDOM: &str = "random";
pub const FREQUENCY: &str = "frequency";

pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Letter to announce on the bot's turn.
    fn choose_letter(&self, game: &Game) -> char;

    /// Empty cell to fill, or `None` on a full board.
    fn choose_position(&self, game: &Game, board: &Board) -> Option<Position>;
}

fn seeded_rng(seed: Option<u64>) -> Mutex<StdRng> {
    Mutex::new(match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_rng(&mut rand::rng()),
    })
}

fn uniform_letter<R: Rng>(rng: &mut R) -> char {
    (b'A' + rng.random_range(0..26u8)) as char
}

/// Uniform letter, uniform empty cell.
pub struct RandomStrategy {
    rng: Mutex<StdRng>,
}

impl RandomStrategy {
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            rng: seeded_rng(seed),
        }
    }
}

impl Strategy for RandomStrategy {
    fn name(&self) -> &'static str {
        RANDOM
    }

    fn choose_letter(&self, _game: &Game) -> char {
        uniform_letter(&mut *self.rng.lock())
    }

    fn choose_position(&self, _game: &Game, board: &Board) -> Option<Position> {
        board.empty_positions().choose(&mut *self.rng.lock()).copied()
    }
}

/// Letters weighted to English frequency; cells next to existing letters
/// are preferred so runs form.
pub struct FrequencyStrategy {
    rng: Mutex<StdRng>,
}

impl FrequencyStrategy {
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            rng: seeded_rng(seed),
        }
    }
}

impl Strategy for FrequencyStrategy {
    fn name(&self) -> &'static str {
        FREQUENCY
    }

    fn choose_letter(&self, _game: &Game) -> char {
        let mut rng = self.rng.lock();
        match LETTER_DIST.as_ref() {
            Some(dist) => LETTER_WEIGHTS[dist.sample(&mut *rng)].0,
            None => uniform_letter(&mut *rng),
        }
    }

    fn choose_position(&self, _game: &Game, board: &Board) -> Option<Position> {
        let empty = board.empty_positions();
        let best = empty.iter().map(|p| board.filled_neighbours(*p)).max()?;
        let candidates: Vec<Position> = empty
            .into_iter()
            .filter(|p| board.filled_neighbours(*p) == best)
            .collect();
        candidates.choose(&mut *self.rng.lock()).copied()
    }
}

/// Named strategies available to bots.
#[derive(Clone)]
pub struct StrategyRegistry {
    strategies: BTreeMap<String, Arc<dyn Strategy>>,
    default: String,
}

impl StrategyRegistry {
    /// Registry with the built-in strategies. `default` must be one of them.
    pub fn with_defaults(default: &str, seed: Option<u64>) -> Result<Self> {
        let mut registry = Self {
            strategies: BTreeMap::new(),
            default: default.to_string(),
        };
        registry.register(Arc::new(RandomStrategy::new(seed)));
        registry.register(Arc::new(FrequencyStrategy::new(seed.map(|s| s.wrapping_add(1)))));
        if !registry.strategies.contains_key(default) {
            return Err(GameError::UnknownStrategy(default.to_string()));
        }
        Ok(registry)
    }

    pub fn register(&mut self, strategy: Arc<dyn Strategy>) {
        self.strategies.insert(strategy.name().to_string(), strategy);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Strategy>> {
        self.strategies
            .get(name)
            .cloned()
            .ok_or_else(|| GameError::UnknownStrategy(name.to_string()))
    }

    pub fn default_name(&self) -> &str {
        &self.default
    }

    /// Strategy for `name`, falling back to the default for unknown names.
    pub fn resolve(&self, name: Option<&str>) -> Option<Arc<dyn Strategy>> {
        name.and_then(|n| self.strategies.get(n))
            .or_else(|| self.strategies.get(&self.default))
            .cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.strategies.keys().map(String::as_str).collect()
    }
}
