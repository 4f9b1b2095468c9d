//! Turn state machine
//!
//! Each game lives behind its own mutex. Every entry point validates,
//! mutates and (on a terminal transition) notifies the lobby layer while
//! holding that one lock, so concurrent callers never observe a half-applied
//! turn. The registry lock is only held long enough to clone a game handle.
//!
//! Lock order: game, then lobby. Nothing here waits on a game lock while
//! holding the registry lock.

use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::{debug, info};

use super::board::{Board, Position};
use super::dictionary::Dictionary;
use super::scoring::{determine_winner, ranked, score_board, ScoringRule};
use super::validation::validate_letter;
use super::{Game, GameCompletion, GameState, GameSummary};
use crate::error::{GameError, Result};
use crate::types::{Clock, GameId, LobbyCode, PlayerId};

/// Receives terminal transitions. Called with the game lock held.
pub trait GameLifecycle: Send + Sync {
    fn game_completed(&self, completion: &GameCompletion);
    fn game_abandoned(&self, game: &Game);
}

/// Result of a successful placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceOutcome {
    pub turn_complete: bool,
    pub game_complete: bool,
    /// Players who have placed in the current turn (before any rollover).
    pub placed: usize,
    pub players: usize,
    /// Completed turns after this placement.
    pub turn: usize,
    /// Announcer for the next turn when the turn rolled over.
    pub next_announcer: Option<PlayerId>,
    pub completion: Option<GameCompletion>,
}

/// Result of dropping a player from a running game.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoveOutcome {
    pub removed: bool,
    pub abandoned: bool,
    /// Set when the departure completed the current turn.
    pub progress: Option<PlaceOutcome>,
}

struct GameSlot {
    game: Game,
    boards: HashMap<PlayerId, Board>,
}

pub struct GameEngine {
    games: RwLock<HashMap<GameId, Arc<Mutex<GameSlot>>>>,
    dictionary: Arc<Dictionary>,
    scoring: ScoringRule,
    clock: Arc<dyn Clock>,
    lifecycle: OnceCell<Weak<dyn GameLifecycle>>,
}

impl GameEngine {
    pub fn new(dictionary: Arc<Dictionary>, scoring: ScoringRule, clock: Arc<dyn Clock>) -> Self {
        Self {
            games: RwLock::new(HashMap::new()),
            dictionary,
            scoring,
            clock,
            lifecycle: OnceCell::new(),
        }
    }

    /// Register the receiver of completion and abandonment. Only the first
    /// call takes effect.
    pub fn attach_lifecycle(&self, hook: Weak<dyn GameLifecycle>) -> bool {
        self.lifecycle.set(hook).is_ok()
    }

    pub fn dictionary(&self) -> &Arc<Dictionary> {
        &self.dictionary
    }

    pub fn scoring_rule(&self) -> ScoringRule {
        self.scoring
    }

    /// Create a game in `announcing` with one empty board per player.
    pub fn create_game(
        &self,
        lobby_code: &LobbyCode,
        grid_size: usize,
        players: Vec<PlayerId>,
    ) -> Result<Game> {
        if players.is_empty() {
            return Err(GameError::InsufficientPlayers { min: 1, found: 0 });
        }
        if grid_size == 0 {
            return Err(GameError::InvalidConfig("grid size must be positive".into()));
        }

        let now = self.clock.now();
        let mut games = self.games.write();
        let mut id = GameId::generate();
        while games.contains_key(&id) {
            id = GameId::generate();
        }

        let game = Game {
            id: id.clone(),
            lobby_code: lobby_code.clone(),
            state: GameState::Announcing,
            grid_size,
            placed: players.iter().map(|p| (p.clone(), false)).collect(),
            players: players.clone(),
            turn: 0,
            letter: None,
            created_at: now,
            updated_at: now,
        };
        let boards = players
            .iter()
            .map(|p| (p.clone(), Board::new(grid_size)))
            .collect();

        games.insert(
            id.clone(),
            Arc::new(Mutex::new(GameSlot {
                game: game.clone(),
                boards,
            })),
        );

        info!(
            game_id = %id,
            lobby = %lobby_code,
            players = players.len(),
            grid_size,
            "game created"
        );
        Ok(game)
    }

    fn slot(&self, id: &GameId) -> Result<Arc<Mutex<GameSlot>>> {
        self.games
            .read()
            .get(id)
            .cloned()
            .ok_or(GameError::GameNotFound)
    }

    pub fn game(&self, id: &GameId) -> Result<Game> {
        Ok(self.slot(id)?.lock().game.clone())
    }

    pub fn board(&self, id: &GameId, player_id: &PlayerId) -> Result<Board> {
        self.slot(id)?
            .lock()
            .boards
            .get(player_id)
            .cloned()
            .ok_or(GameError::BoardNotFound)
    }

    /// Every board in seat order.
    pub fn boards(&self, id: &GameId) -> Result<Vec<(PlayerId, Board)>> {
        let slot = self.slot(id)?;
        let slot = slot.lock();
        Ok(seat_boards(&slot))
    }

    pub fn active_games(&self) -> usize {
        self.games.read().len()
    }

    /// Declare the letter for this turn.
    pub fn announce_letter(&self, id: &GameId, caller: &PlayerId, letter: &str) -> Result<Game> {
        let slot = self.slot(id)?;
        let mut slot = slot.lock();
        let game = &mut slot.game;

        ensure_active(game)?;
        if game.state != GameState::Announcing || game.announcer() != Some(caller) {
            return Err(GameError::NotPlayerTurn);
        }
        let letter = validate_letter(letter)?;

        game.letter = Some(letter);
        for placed in game.placed.values_mut() {
            *placed = false;
        }
        game.state = GameState::Placing;
        game.updated_at = self.clock.now();

        debug!(game_id = %id, player_id = %caller, turn = game.turn, %letter, "letter announced");
        Ok(game.clone())
    }

    /// Place the announced letter on the caller's own board.
    pub fn place_letter(
        &self,
        id: &GameId,
        caller: &PlayerId,
        pos: Position,
    ) -> Result<PlaceOutcome> {
        let handle = self.slot(id)?;
        let mut guard = handle.lock();
        let slot = &mut *guard;

        ensure_active(&slot.game)?;
        if slot.game.state != GameState::Placing {
            return Err(GameError::LetterNotAnnounced);
        }
        if !slot.game.is_player(caller) {
            return Err(GameError::PlayerNotFound);
        }
        if pos.row >= slot.game.grid_size || pos.col >= slot.game.grid_size {
            return Err(GameError::InvalidPosition {
                row: pos.row,
                col: pos.col,
            });
        }
        if slot.game.has_placed(caller) {
            return Err(GameError::AlreadyPlaced);
        }
        let letter = slot.game.letter.ok_or(GameError::LetterNotAnnounced)?;

        slot.boards
            .get_mut(caller)
            .ok_or(GameError::BoardNotFound)?
            .place(pos, letter)?;
        slot.game.placed.insert(caller.clone(), true);
        slot.game.updated_at = self.clock.now();

        debug!(
            game_id = %id,
            player_id = %caller,
            row = pos.row,
            col = pos.col,
            placed = slot.game.placed_count(),
            "letter placed"
        );

        if slot.game.all_placed() {
            Ok(self.finish_turn(slot))
        } else {
            Ok(PlaceOutcome {
                turn_complete: false,
                game_complete: false,
                placed: slot.game.placed_count(),
                players: slot.game.players.len(),
                turn: slot.game.turn,
                next_announcer: None,
                completion: None,
            })
        }
    }

    /// Move a running game to `abandoned`.
    ///
    /// `guard` runs under the game lock before the transition and can veto it.
    /// Returns the final snapshot, or `None` if the game was already abandoned.
    pub fn abandon<F>(&self, id: &GameId, guard: F) -> Result<Option<Game>>
    where
        F: FnOnce(&Game) -> Result<()>,
    {
        let handle = self.slot(id)?;
        let mut slot = handle.lock();
        match slot.game.state {
            GameState::Scoring => return Err(GameError::GameComplete),
            GameState::Abandoned => return Ok(None),
            GameState::Announcing | GameState::Placing => {}
        }
        guard(&slot.game)?;
        Ok(Some(self.abandon_locked(&mut slot)))
    }

    /// Drop a departing player from a running game.
    ///
    /// The game is abandoned when nobody is left, and the turn advances when
    /// everyone remaining has already placed.
    pub fn remove_player(&self, id: &GameId, player_id: &PlayerId) -> Result<RemoveOutcome> {
        let handle = self.slot(id)?;
        let mut guard = handle.lock();
        let slot = &mut *guard;

        if slot.game.state.is_terminal() || !slot.game.is_player(player_id) {
            return Ok(RemoveOutcome::default());
        }

        slot.game.players.retain(|p| p != player_id);
        slot.game.placed.remove(player_id);
        slot.boards.remove(player_id);
        slot.game.updated_at = self.clock.now();
        info!(
            game_id = %id,
            %player_id,
            remaining = slot.game.players.len(),
            "player removed from game"
        );

        if slot.game.players.is_empty() {
            self.abandon_locked(slot);
            return Ok(RemoveOutcome {
                removed: true,
                abandoned: true,
                progress: None,
            });
        }

        let progress = if slot.game.state == GameState::Placing && slot.game.all_placed() {
            Some(self.finish_turn(slot))
        } else {
            None
        };
        Ok(RemoveOutcome {
            removed: true,
            abandoned: false,
            progress,
        })
    }

    fn finish_turn(&self, slot: &mut GameSlot) -> PlaceOutcome {
        let placed = slot.game.placed_count();
        let players = slot.game.players.len();
        slot.game.turn += 1;
        slot.game.letter = None;
        for flag in slot.game.placed.values_mut() {
            *flag = false;
        }

        if slot.game.turn >= slot.game.total_turns() {
            slot.game.state = GameState::Scoring;
            let completion = self.complete_locked(slot);
            return PlaceOutcome {
                turn_complete: true,
                game_complete: true,
                placed,
                players,
                turn: slot.game.turn,
                next_announcer: None,
                completion: Some(completion),
            };
        }

        slot.game.state = GameState::Announcing;
        debug!(game_id = %slot.game.id, turn = slot.game.turn, "turn complete");
        PlaceOutcome {
            turn_complete: true,
            game_complete: false,
            placed,
            players,
            turn: slot.game.turn,
            next_announcer: slot.game.announcer().cloned(),
            completion: None,
        }
    }

    fn complete_locked(&self, slot: &mut GameSlot) -> GameCompletion {
        let size = slot.game.grid_size;
        let scores: Vec<_> = slot
            .game
            .players
            .iter()
            .map(|p| {
                let board = slot.boards.get(p).cloned().unwrap_or_else(|| Board::new(size));
                score_board(p, &board, &self.dictionary, self.scoring)
            })
            .collect();
        let winner = determine_winner(&scores);

        let summary = GameSummary {
            game_id: slot.game.id.clone(),
            grid_size: size,
            scores: ranked(&scores),
            winner: winner.as_ref().map(|w| w.player_id.clone()),
            winning_score: winner.as_ref().map(|w| w.score).unwrap_or(0),
            tied: winner.as_ref().map(|w| w.tied).unwrap_or(false),
            completed_at: self.clock.now(),
        };
        let completion = GameCompletion {
            lobby_code: slot.game.lobby_code.clone(),
            summary,
            boards: seat_boards(slot),
        };

        info!(
            game_id = %slot.game.id,
            lobby = %slot.game.lobby_code,
            winner = ?completion.summary.winner,
            score = completion.summary.winning_score,
            tied = completion.summary.tied,
            "game complete"
        );

        if let Some(hook) = self.hook() {
            hook.game_completed(&completion);
        }
        self.games.write().remove(&slot.game.id);
        completion
    }

    fn abandon_locked(&self, slot: &mut GameSlot) -> Game {
        slot.game.state = GameState::Abandoned;
        slot.game.letter = None;
        slot.game.updated_at = self.clock.now();
        info!(
            game_id = %slot.game.id,
            lobby = %slot.game.lobby_code,
            turn = slot.game.turn,
            "game abandoned"
        );

        if let Some(hook) = self.hook() {
            hook.game_abandoned(&slot.game);
        }
        self.games.write().remove(&slot.game.id);
        slot.game.clone()
    }

    fn hook(&self) -> Option<Arc<dyn GameLifecycle>> {
        self.lifecycle.get().and_then(Weak::upgrade)
    }
}

fn ensure_active(game: &Game) -> Result<()> {
    match game.state {
        GameState::Scoring => Err(GameError::GameComplete),
        GameState::Abandoned => Err(GameError::GameAbandoned),
        GameState::Announcing | GameState::Placing => Ok(()),
    }
}

fn seat_boards(slot: &GameSlot) -> Vec<(PlayerId, Board)> {
    slot.game
        .players
        .iter()
        .filter_map(|p| slot.boards.get(p).map(|b| (p.clone(), b.clone())))
        .collect()
}
