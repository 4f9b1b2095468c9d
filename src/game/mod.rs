//! Game logic: turn state machine, boards, scoring, dictionary

pub mod board;
pub mod dictionary;
pub mod engine;
pub mod scoring;
pub mod validation;

pub use board::{Board, Orientation, Position};
pub use dictionary::Dictionary;
pub use engine::{GameEngine, GameLifecycle, PlaceOutcome, RemoveOutcome};
pub use scoring::{BoardScore, ScoringRule, WordMatch};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::{GameId, LobbyCode, PlayerId};

/// Turn state. `Scoring` and `Abandoned` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameState {
    Announcing,
    Placing,
    Scoring,
    Abandoned,
}

impl GameState {
    pub fn is_terminal(self) -> bool {
        matches!(self, GameState::Scoring | GameState::Abandoned)
    }
}

/// Snapshot of one game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub id: GameId,
    pub lobby_code: LobbyCode,
    pub state: GameState,
    pub grid_size: usize,
    /// Active players in seat order, fixed at start except for departures.
    pub players: Vec<PlayerId>,
    /// Completed turns.
    pub turn: usize,
    /// Present only while placing.
    pub letter: Option<char>,
    /// Who has placed this turn.
    pub placed: HashMap<PlayerId, bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Game {
    pub fn announcer(&self) -> Option<&PlayerId> {
        if self.players.is_empty() {
            return None;
        }
        self.players.get(self.turn % self.players.len())
    }

    /// Turns needed to fill every board.
    pub fn total_turns(&self) -> usize {
        self.grid_size * self.grid_size
    }

    pub fn is_player(&self, player_id: &PlayerId) -> bool {
        self.players.contains(player_id)
    }

    pub fn has_placed(&self, player_id: &PlayerId) -> bool {
        self.placed.get(player_id).copied().unwrap_or(false)
    }

    pub fn placed_count(&self) -> usize {
        self.players.iter().filter(|p| self.has_placed(p)).count()
    }

    pub fn all_placed(&self) -> bool {
        !self.players.is_empty() && self.players.iter().all(|p| self.has_placed(p))
    }

    /// Players still to place this turn, in seat order.
    pub fn waiting_on(&self) -> Vec<PlayerId> {
        self.players
            .iter()
            .filter(|p| !self.has_placed(p))
            .cloned()
            .collect()
    }
}

/// Retained record of a completed game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSummary {
    pub game_id: GameId,
    pub grid_size: usize,
    /// Highest first.
    pub scores: Vec<BoardScore>,
    pub winner: Option<PlayerId>,
    pub winning_score: u32,
    /// Whether the winning total was shared. The earliest seat wins ties.
    pub tied: bool,
    pub completed_at: DateTime<Utc>,
}

impl GameSummary {
    pub fn score_for(&self, player_id: &PlayerId) -> Option<u32> {
        self.scores
            .iter()
            .find(|s| &s.player_id == player_id)
            .map(|s| s.total)
    }
}

/// Everything produced by the transition to scoring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameCompletion {
    pub lobby_code: LobbyCode,
    pub summary: GameSummary,
    /// Final boards in seat order.
    pub boards: Vec<(PlayerId, Board)>,
}
