//! Lobby management
//!
//! Handles:
//! - Lobby creation with short shareable codes
//! - Membership, roles and host privileges
//! - Game lifecycle (start, abandon, completion history)
//!
//! Each lobby sits behind its own mutex; the registry lock only guards the
//! code → lobby map. Calls into the game engine that may take a game lock are
//! made after the lobby lock is released, because terminal game transitions
//! lock the lobby from inside the game lock.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{GameError, Result};
use crate::game::validation::validate_grid_size;
use crate::game::{Game, GameCompletion, GameEngine, GameLifecycle, GameSummary, RemoveOutcome};
use crate::types::{Clock, GameId, LobbyCode, Player, PlayerId};

/// Minimum number of active players to start a game
pub const MIN_PLAYERS: usize = 2;

/// State of the lobby
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LobbyState {
    /// No game running
    Waiting,
    /// A game is in announcing or placing
    Playing,
}

/// Whether a member plays or watches. Host status is tracked separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Player,
    Spectator,
}

/// A player in the lobby
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyMember {
    pub player: Player,
    pub role: MemberRole,
    pub is_host: bool,
    pub joined_at: DateTime<Utc>,
}

/// Public view of a member, as pushed to live clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberView {
    pub player_id: PlayerId,
    pub display_name: String,
    pub role: MemberRole,
    pub is_host: bool,
    pub is_bot: bool,
}

impl From<&LobbyMember> for MemberView {
    fn from(member: &LobbyMember) -> Self {
        Self {
            player_id: member.player.id.clone(),
            display_name: member.player.display_name.clone(),
            role: member.role,
            is_host: member.is_host,
            is_bot: member.player.is_bot(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyConfig {
    pub grid_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lobby {
    pub code: LobbyCode,
    pub state: LobbyState,
    pub config: LobbyConfig,
    /// Join order.
    pub members: Vec<LobbyMember>,
    pub current_game: Option<GameId>,
    /// Completed games, oldest first. Abandoned games are not recorded.
    pub history: Vec<GameSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lobby {
    pub fn host(&self) -> Option<&LobbyMember> {
        self.members.iter().find(|m| m.is_host)
    }

    pub fn is_host(&self, player_id: &PlayerId) -> bool {
        self.host().is_some_and(|h| &h.player.id == player_id)
    }

    pub fn member(&self, player_id: &PlayerId) -> Option<&LobbyMember> {
        self.members.iter().find(|m| &m.player.id == player_id)
    }

    fn member_mut(&mut self, player_id: &PlayerId) -> Option<&mut LobbyMember> {
        self.members.iter_mut().find(|m| &m.player.id == player_id)
    }

    /// Members with the player role, in join order.
    pub fn active_players(&self) -> Vec<&LobbyMember> {
        self.members
            .iter()
            .filter(|m| m.role == MemberRole::Player)
            .collect()
    }

    pub fn spectators(&self) -> Vec<&LobbyMember> {
        self.members
            .iter()
            .filter(|m| m.role == MemberRole::Spectator)
            .collect()
    }

    pub fn bots(&self) -> Vec<&LobbyMember> {
        self.members.iter().filter(|m| m.player.is_bot()).collect()
    }

    fn ensure_host(&self, player_id: &PlayerId) -> Result<()> {
        if self.is_host(player_id) {
            Ok(())
        } else {
            Err(GameError::NotHost)
        }
    }

    fn ensure_waiting(&self) -> Result<()> {
        if self.state == LobbyState::Playing {
            Err(GameError::GameInProgress)
        } else {
            Ok(())
        }
    }

    /// Give host to the earliest human member, or the earliest member if only
    /// bots remain.
    fn reassign_host(&mut self) -> Option<PlayerId> {
        let idx = self
            .members
            .iter()
            .position(|m| !m.player.is_bot())
            .or_else(|| (!self.members.is_empty()).then_some(0))?;
        self.members[idx].is_host = true;
        Some(self.members[idx].player.id.clone())
    }

    fn finish_game(&mut self, now: DateTime<Utc>) {
        self.current_game = None;
        self.state = LobbyState::Waiting;
        self.updated_at = now;
    }
}

/// Result of a member leaving.
#[derive(Debug, Clone)]
pub struct LeaveOutcome {
    /// Lobby after the departure and any game-side effects.
    pub lobby: Lobby,
    /// Set when host passed to someone else.
    pub new_host: Option<PlayerId>,
    /// Game the member was removed from, with what that did to it.
    pub game: Option<(GameId, RemoveOutcome)>,
}

pub struct LobbyController {
    lobbies: RwLock<HashMap<LobbyCode, Arc<Mutex<Lobby>>>>,
    engine: Arc<GameEngine>,
    config: Arc<Config>,
    clock: Arc<dyn Clock>,
}

impl LobbyController {
    /// Create a controller and register it for game completion and
    /// abandonment callbacks.
    pub fn new(engine: Arc<GameEngine>, config: Arc<Config>, clock: Arc<dyn Clock>) -> Arc<Self> {
        let controller = Arc::new(Self {
            lobbies: RwLock::new(HashMap::new()),
            engine: Arc::clone(&engine),
            config,
            clock,
        });
        let hook: Weak<LobbyController> = Arc::downgrade(&controller);
        if !engine.attach_lifecycle(hook) {
            warn!("game engine already has a lifecycle receiver");
        }
        controller
    }

    pub fn engine(&self) -> &Arc<GameEngine> {
        &self.engine
    }

    /// Lookup ignores case and surrounding whitespace in `code`.
    fn handle(&self, code: &LobbyCode) -> Result<Arc<Mutex<Lobby>>> {
        self.lobbies
            .read()
            .get(&LobbyCode::normalized(code.as_str()))
            .cloned()
            .ok_or(GameError::LobbyNotFound)
    }

    /// Create a lobby with `creator` as its only member and host.
    pub fn create_lobby(&self, creator: Player) -> Lobby {
        let now = self.clock.now();
        let mut lobbies = self.lobbies.write();
        let mut code = LobbyCode::generate();
        while lobbies.contains_key(&code) {
            code = LobbyCode::generate();
        }

        let lobby = Lobby {
            code: code.clone(),
            state: LobbyState::Waiting,
            config: LobbyConfig {
                grid_size: self.config.default_grid_size,
            },
            members: vec![LobbyMember {
                player: creator,
                role: MemberRole::Player,
                is_host: true,
                joined_at: now,
            }],
            current_game: None,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        lobbies.insert(code.clone(), Arc::new(Mutex::new(lobby.clone())));

        info!(lobby = %code, host = %lobby.members[0].player.id, "lobby created");
        lobby
    }

    pub fn get_lobby(&self, code: &LobbyCode) -> Result<Lobby> {
        Ok(self.handle(code)?.lock().clone())
    }

    pub fn lobby_count(&self) -> usize {
        self.lobbies.read().len()
    }

    /// Add `player` as a member. Players joining mid-game spectate; the first
    /// member of an empty lobby becomes host.
    pub fn join_lobby(&self, code: &LobbyCode, player: Player) -> Result<Lobby> {
        let handle = self.handle(code)?;
        let mut lobby = handle.lock();
        if lobby.member(&player.id).is_some() {
            return Err(GameError::AlreadyInLobby);
        }

        let role = match lobby.state {
            LobbyState::Playing => MemberRole::Spectator,
            LobbyState::Waiting => MemberRole::Player,
        };
        let is_host = lobby.members.is_empty();
        let now = self.clock.now();
        info!(lobby = %code, player_id = %player.id, ?role, "member joined");
        lobby.members.push(LobbyMember {
            player,
            role,
            is_host,
            joined_at: now,
        });
        lobby.updated_at = now;
        Ok(lobby.clone())
    }

    /// Remove a member, reassigning host and dropping them from any running
    /// game.
    pub fn leave_lobby(&self, code: &LobbyCode, player_id: &PlayerId) -> Result<LeaveOutcome> {
        let handle = self.handle(code)?;
        let (new_host, running_game) = {
            let mut lobby = handle.lock();
            let idx = lobby
                .members
                .iter()
                .position(|m| &m.player.id == player_id)
                .ok_or(GameError::NotInLobby)?;
            let member = lobby.members.remove(idx);
            lobby.updated_at = self.clock.now();
            info!(lobby = %code, %player_id, remaining = lobby.members.len(), "member left");

            let new_host = if member.is_host {
                let next = lobby.reassign_host();
                if let Some(next) = &next {
                    info!(lobby = %code, new_host = %next, "host reassigned");
                }
                next
            } else {
                None
            };
            let running_game = match member.role {
                MemberRole::Player => lobby.current_game.clone(),
                MemberRole::Spectator => None,
            };
            (new_host, running_game)
        };

        let game = match running_game {
            Some(game_id) => match self.engine.remove_player(&game_id, player_id) {
                Ok(outcome) => Some((game_id, outcome)),
                // Finished concurrently; nothing left to leave.
                Err(GameError::GameNotFound) => None,
                Err(e) => return Err(e),
            },
            None => None,
        };

        let lobby = handle.lock().clone();
        Ok(LeaveOutcome {
            lobby,
            new_host,
            game,
        })
    }

    /// Change lobby settings. Host only, not during a game.
    pub fn update_config(
        &self,
        code: &LobbyCode,
        player_id: &PlayerId,
        config: LobbyConfig,
    ) -> Result<Lobby> {
        let handle = self.handle(code)?;
        let mut lobby = handle.lock();
        lobby.ensure_host(player_id)?;
        lobby.ensure_waiting()?;
        validate_grid_size(
            config.grid_size,
            self.config.min_grid_size,
            self.config.max_grid_size,
        )?;
        lobby.config = config;
        lobby.updated_at = self.clock.now();
        Ok(lobby.clone())
    }

    /// Switch a member between player and spectator. Host only, not during a
    /// game.
    pub fn set_role(
        &self,
        code: &LobbyCode,
        player_id: &PlayerId,
        target: &PlayerId,
        role: MemberRole,
    ) -> Result<Lobby> {
        let handle = self.handle(code)?;
        let mut lobby = handle.lock();
        lobby.ensure_host(player_id)?;
        lobby.ensure_waiting()?;
        let now = self.clock.now();
        let member = lobby.member_mut(target).ok_or(GameError::NotInLobby)?;
        member.role = role;
        lobby.updated_at = now;
        Ok(lobby.clone())
    }

    pub fn transfer_host(
        &self,
        code: &LobbyCode,
        player_id: &PlayerId,
        new_host: &PlayerId,
    ) -> Result<Lobby> {
        let handle = self.handle(code)?;
        let mut lobby = handle.lock();
        lobby.ensure_host(player_id)?;
        if lobby.member(new_host).is_none() {
            return Err(GameError::NotInLobby);
        }
        for m in lobby.members.iter_mut() {
            m.is_host = &m.player.id == new_host;
        }
        lobby.updated_at = self.clock.now();
        info!(lobby = %code, from = %player_id, to = %new_host, "host transferred");
        Ok(lobby.clone())
    }

    /// Start a game with the current players in join order.
    pub fn start_game(&self, code: &LobbyCode, player_id: &PlayerId) -> Result<Game> {
        let handle = self.handle(code)?;
        let mut lobby = handle.lock();
        lobby.ensure_host(player_id)?;
        if lobby.current_game.is_some() {
            return Err(GameError::GameInProgress);
        }
        let players: Vec<PlayerId> = lobby
            .active_players()
            .into_iter()
            .map(|m| m.player.id.clone())
            .collect();
        if players.len() < MIN_PLAYERS {
            return Err(GameError::InsufficientPlayers {
                min: MIN_PLAYERS,
                found: players.len(),
            });
        }

        let game = self
            .engine
            .create_game(&lobby.code, lobby.config.grid_size, players)?;
        lobby.current_game = Some(game.id.clone());
        lobby.state = LobbyState::Playing;
        lobby.updated_at = self.clock.now();
        Ok(game)
    }

    /// Abandon the running game. Host only; nothing is added to history.
    pub fn abandon_game(&self, code: &LobbyCode, player_id: &PlayerId) -> Result<Game> {
        let handle = self.handle(code)?;
        let game_id = {
            let lobby = handle.lock();
            lobby.ensure_host(player_id)?;
            lobby.current_game.clone().ok_or(GameError::NoGameInProgress)?
        };

        // Host may have changed while no lock was held; check again under the
        // game lock.
        let result = self.engine.abandon(&game_id, |_| handle.lock().ensure_host(player_id));
        match result {
            Ok(Some(game)) => Ok(game),
            Ok(None) | Err(GameError::GameNotFound) => Err(GameError::NoGameInProgress),
            Err(e) => Err(e),
        }
    }

    /// Record a completed game and return the lobby to waiting.
    pub fn complete_game(&self, completion: &GameCompletion) -> Result<()> {
        let handle = self.handle(&completion.lobby_code)?;
        let mut lobby = handle.lock();
        if lobby.current_game.as_ref() != Some(&completion.summary.game_id) {
            return Err(GameError::NoGameInProgress);
        }
        lobby.history.push(completion.summary.clone());
        lobby.finish_game(self.clock.now());
        Ok(())
    }

    pub fn history(&self, code: &LobbyCode) -> Result<Vec<GameSummary>> {
        Ok(self.handle(code)?.lock().history.clone())
    }

    /// Add a bot member. Host only, not during a game.
    pub fn add_bot(&self, code: &LobbyCode, player_id: &PlayerId, bot: Player) -> Result<Lobby> {
        let handle = self.handle(code)?;
        let mut lobby = handle.lock();
        lobby.ensure_host(player_id)?;
        lobby.ensure_waiting()?;
        if lobby.member(&bot.id).is_some() {
            return Err(GameError::AlreadyInLobby);
        }
        let now = self.clock.now();
        info!(lobby = %code, bot = %bot.id, name = %bot.display_name, "bot added");
        lobby.members.push(LobbyMember {
            player: bot,
            role: MemberRole::Player,
            is_host: false,
            joined_at: now,
        });
        lobby.updated_at = now;
        Ok(lobby.clone())
    }

    /// Remove a bot member. Host only, not during a game.
    pub fn remove_bot(
        &self,
        code: &LobbyCode,
        player_id: &PlayerId,
        bot_id: &PlayerId,
    ) -> Result<Lobby> {
        let handle = self.handle(code)?;
        let mut lobby = handle.lock();
        lobby.ensure_host(player_id)?;
        lobby.ensure_waiting()?;
        let member = lobby.member(bot_id).ok_or(GameError::NotInLobby)?;
        if !member.player.is_bot() {
            return Err(GameError::NotBot);
        }
        lobby.members.retain(|m| &m.player.id != bot_id);
        lobby.updated_at = self.clock.now();
        info!(lobby = %code, bot = %bot_id, "bot removed");
        Ok(lobby.clone())
    }
}

impl GameLifecycle for LobbyController {
    fn game_completed(&self, completion: &GameCompletion) {
        if let Err(e) = self.complete_game(completion) {
            warn!(
                lobby = %completion.lobby_code,
                game_id = %completion.summary.game_id,
                error = %e,
                "completed game not recorded"
            );
        }
    }

    fn game_abandoned(&self, game: &Game) {
        let Ok(handle) = self.handle(&game.lobby_code) else {
            warn!(lobby = %game.lobby_code, game_id = %game.id, "abandoned game has no lobby");
            return;
        };
        let mut lobby = handle.lock();
        if lobby.current_game.as_ref() == Some(&game.id) {
            lobby.finish_game(self.clock.now());
        }
    }
}
