//! Automatic play for bot seats
//!
//! The driver looks at a game, takes the next action for every bot that can
//! act, and reports what it did so the caller can broadcast it. Each action
//! strictly advances turn or placement progress, so driving a bot-only game
//! always terminates.

pub mod strategy;

pub use strategy::{FrequencyStrategy, RandomStrategy, Strategy, StrategyRegistry};

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{GameError, Result};
use crate::game::{Game, GameCompletion, GameEngine, GameState, Position};
use crate::hub::HubEvent;
use crate::lobby::{Lobby, LobbyController};
use crate::storage::PlayerStore;
use crate::types::{Clock, GameId, LobbyCode, Player, PlayerId};

/// Upper bound on `step` calls in one `drive`.
pub const MAX_BOT_ITERATIONS: usize = 1000;

/// Something a bot did, or a transition its move caused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotAction {
    Announce {
        player_id: PlayerId,
        letter: char,
        turn: usize,
    },
    Place {
        player_id: PlayerId,
        position: Position,
        placed: usize,
        players: usize,
    },
    TurnComplete {
        turn: usize,
        next_announcer: Option<PlayerId>,
    },
    GameComplete {
        completion: GameCompletion,
    },
}

impl BotAction {
    /// Hub event announcing this action.
    pub fn event(&self, game_id: &GameId) -> HubEvent {
        let game_id = game_id.clone();
        match self {
            BotAction::Announce {
                player_id,
                letter,
                turn,
            } => HubEvent::LetterAnnounced {
                game_id,
                letter: *letter,
                announcer: player_id.clone(),
                turn: *turn,
            },
            BotAction::Place {
                player_id,
                placed,
                players,
                ..
            } => HubEvent::PlacementUpdate {
                game_id,
                player_id: player_id.clone(),
                placed: *placed,
                players: *players,
            },
            BotAction::TurnComplete {
                turn,
                next_announcer,
            } => HubEvent::TurnComplete {
                game_id,
                turn: *turn,
                next_announcer: next_announcer.clone(),
            },
            BotAction::GameComplete { completion } => HubEvent::GameComplete {
                game_id,
                winner: completion.summary.winner.clone(),
                winning_score: completion.summary.winning_score,
                tied: completion.summary.tied,
            },
        }
    }
}

pub struct BotDriver {
    engine: Arc<GameEngine>,
    lobbies: Arc<LobbyController>,
    store: Arc<dyn PlayerStore>,
    strategies: StrategyRegistry,
    clock: Arc<dyn Clock>,
}

impl BotDriver {
    pub fn new(
        engine: Arc<GameEngine>,
        lobbies: Arc<LobbyController>,
        store: Arc<dyn PlayerStore>,
        strategies: StrategyRegistry,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            engine,
            lobbies,
            store,
            strategies,
            clock,
        }
    }

    pub fn strategies(&self) -> &StrategyRegistry {
        &self.strategies
    }

    /// Create a bot named "Bot N" and seat it in the lobby.
    ///
    /// `strategy` defaults to the registry default.
    pub fn add_bot(
        &self,
        code: &LobbyCode,
        host: &PlayerId,
        strategy: Option<&str>,
    ) -> Result<(Player, Lobby)> {
        let strategy = strategy.unwrap_or(self.strategies.default_name());
        self.strategies.get(strategy)?;

        let lobby = self.lobbies.get_lobby(code)?;
        if !lobby.is_host(host) {
            return Err(GameError::NotHost);
        }
        if lobby.current_game.is_some() {
            return Err(GameError::GameInProgress);
        }

        let name = format!("Bot {}", lobby.bots().len() + 1);
        let bot = Player::bot(name, strategy, self.clock.now());
        self.store.save_player(&bot)?;
        let lobby = self.lobbies.add_bot(code, host, bot.clone())?;
        Ok((bot, lobby))
    }

    pub fn remove_bot(
        &self,
        code: &LobbyCode,
        host: &PlayerId,
        bot_id: &PlayerId,
    ) -> Result<Lobby> {
        self.lobbies.remove_bot(code, host, bot_id)
    }

    /// Take at most one action per bot in the game's current state.
    ///
    /// A missing or finished game yields no actions. Losing a race to a
    /// concurrent request ends the step early with what was done so far.
    pub fn step(&self, game_id: &GameId) -> Result<Vec<BotAction>> {
        let game = match self.engine.game(game_id) {
            Ok(game) => game,
            Err(GameError::GameNotFound) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        match game.state {
            GameState::Announcing => self.announce(&game),
            GameState::Placing => self.place_all(&game),
            GameState::Scoring | GameState::Abandoned => Ok(Vec::new()),
        }
    }

    /// Step until no bot can act. Returns every action taken, in order.
    pub fn drive(&self, game_id: &GameId) -> Result<Vec<BotAction>> {
        let mut actions = Vec::new();
        for _ in 0..MAX_BOT_ITERATIONS {
            let step = self.step(game_id)?;
            if step.is_empty() {
                if !actions.is_empty() {
                    debug!(%game_id, actions = actions.len(), "bots idle");
                }
                return Ok(actions);
            }
            actions.extend(step);
        }
        warn!(%game_id, limit = MAX_BOT_ITERATIONS, "bot iteration limit reached");
        Ok(actions)
    }

    fn announce(&self, game: &Game) -> Result<Vec<BotAction>> {
        let Some(announcer) = game.announcer() else {
            return Ok(Vec::new());
        };
        let Some(bot) = self.bot(&game.lobby_code, announcer)? else {
            return Ok(Vec::new());
        };
        let Some(strategy) = self.strategies.resolve(bot.bot_strategy()) else {
            return Ok(Vec::new());
        };

        let letter = strategy.choose_letter(game);
        match self
            .engine
            .announce_letter(&game.id, announcer, &letter.to_string())
        {
            Ok(after) => {
                debug!(game_id = %game.id, bot = %announcer, %letter, "bot announced");
                Ok(vec![BotAction::Announce {
                    player_id: announcer.clone(),
                    letter,
                    turn: after.turn,
                }])
            }
            Err(e) if lost_race(&e) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    fn place_all(&self, game: &Game) -> Result<Vec<BotAction>> {
        let mut actions = Vec::new();
        for player_id in game.waiting_on() {
            let Some(bot) = self.bot(&game.lobby_code, &player_id)? else {
                continue;
            };
            let Some(strategy) = self.strategies.resolve(bot.bot_strategy()) else {
                continue;
            };
            let board = match self.engine.board(&game.id, &player_id) {
                Ok(board) => board,
                Err(e) if lost_race(&e) => break,
                Err(e) => return Err(e),
            };
            let Some(position) = strategy.choose_position(game, &board) else {
                warn!(game_id = %game.id, bot = %player_id, "bot has no empty cell");
                continue;
            };

            let outcome = match self.engine.place_letter(&game.id, &player_id, position) {
                Ok(outcome) => outcome,
                Err(e) if lost_race(&e) => break,
                Err(e) => return Err(e),
            };
            debug!(
                game_id = %game.id,
                bot = %player_id,
                row = position.row,
                col = position.col,
                "bot placed"
            );

            actions.push(BotAction::Place {
                player_id: player_id.clone(),
                position,
                placed: outcome.placed,
                players: outcome.players,
            });
            if outcome.turn_complete {
                actions.push(BotAction::TurnComplete {
                    turn: outcome.turn,
                    next_announcer: outcome.next_announcer.clone(),
                });
            }
            if let Some(completion) = outcome.completion {
                info!(game_id = %game.id, "game finished by bot move");
                actions.push(BotAction::GameComplete { completion });
            }
            if outcome.turn_complete {
                break;
            }
        }
        Ok(actions)
    }

    /// The player if it is a bot. Falls back to the lobby roster when the
    /// store has no record.
    fn bot(&self, code: &LobbyCode, player_id: &PlayerId) -> Result<Option<Player>> {
        if let Some(player) = self.store.get_player(player_id)? {
            return Ok(player.is_bot().then_some(player));
        }
        let lobby = match self.lobbies.get_lobby(code) {
            Ok(lobby) => lobby,
            Err(GameError::LobbyNotFound) => return Ok(None),
            Err(e) => return Err(e),
        };
        Ok(lobby
            .member(player_id)
            .map(|m| m.player.clone())
            .filter(Player::is_bot))
    }
}

/// Errors meaning another request moved the game on first.
fn lost_race(err: &GameError) -> bool {
    matches!(
        err,
        GameError::GameNotFound
            | GameError::GameComplete
            | GameError::GameAbandoned
            | GameError::NotPlayerTurn
            | GameError::LetterNotAnnounced
            | GameError::AlreadyPlaced
            | GameError::PlayerNotFound
            | GameError::BoardNotFound
    )
}
