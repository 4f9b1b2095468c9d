//! The game server facade
//!
//! [`GameServer`] owns every component and runs each request the same way:
//! mutate under the owning lock, release it, let bots respond, then publish
//! the resulting events to the lobby's hub. Transport layers call these
//! methods and subscribe through [`GameServer::subscribe`].

use std::sync::Arc;
use tracing::{info, warn};

use crate::bot::{BotDriver, StrategyRegistry};
use crate::config::Config;
use crate::error::{GameError, Result};
use crate::game::{
    Board, Dictionary, Game, GameEngine, GameSummary, PlaceOutcome, Position,
};
use crate::hub::{Broadcaster, HubManager, Subscription};
use crate::lobby::{Lobby, LobbyConfig, LobbyController, MemberRole};
use crate::session::{Session, SessionStore};
use crate::storage::PlayerStore;
use crate::types::{Clock, GameId, LobbyCode, Player, PlayerId, SystemClock};

pub struct GameServer {
    config: Arc<Config>,
    store: Arc<dyn PlayerStore>,
    sessions: SessionStore,
    engine: Arc<GameEngine>,
    lobbies: Arc<LobbyController>,
    broadcaster: Broadcaster,
    bots: BotDriver,
}

impl GameServer {
    pub fn new(
        config: Config,
        dictionary: Arc<Dictionary>,
        store: Arc<dyn PlayerStore>,
    ) -> Result<Self> {
        Self::with_clock(config, dictionary, store, Arc::new(SystemClock), None)
    }

    /// Build with an explicit clock and an optional seed for bot strategies.
    pub fn with_clock(
        config: Config,
        dictionary: Arc<Dictionary>,
        store: Arc<dyn PlayerStore>,
        clock: Arc<dyn Clock>,
        bot_seed: Option<u64>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| GameError::InvalidConfig(e.to_string()))?;
        let session_ttl = config
            .session_ttl()
            .map_err(|e| GameError::InvalidConfig(e.to_string()))?;
        let config = Arc::new(config);

        let strategies = StrategyRegistry::with_defaults(&config.bot_strategy, bot_seed)?;
        let engine = Arc::new(GameEngine::new(
            dictionary,
            config.scoring,
            Arc::clone(&clock),
        ));
        let lobbies = LobbyController::new(
            Arc::clone(&engine),
            Arc::clone(&config),
            Arc::clone(&clock),
        );
        let hubs = Arc::new(HubManager::new(config.hub_buffer));
        let sessions = SessionStore::new(Arc::clone(&store), Arc::clone(&clock), session_ttl);
        let bots = BotDriver::new(
            Arc::clone(&engine),
            Arc::clone(&lobbies),
            Arc::clone(&store),
            strategies,
            clock,
        );

        info!(
            words = engine.dictionary().len(),
            scoring = ?engine.scoring_rule(),
            bot_strategy = %config.bot_strategy,
            "game server ready"
        );

        Ok(Self {
            config,
            store,
            sessions,
            engine,
            lobbies,
            broadcaster: Broadcaster::new(hubs),
            bots,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn engine(&self) -> &Arc<GameEngine> {
        &self.engine
    }

    pub fn lobbies(&self) -> &Arc<LobbyController> {
        &self.lobbies
    }

    pub fn hubs(&self) -> &Arc<HubManager> {
        self.broadcaster.hubs()
    }

    // Players and sessions

    pub fn create_guest(&self, display_name: &str) -> Result<(Player, Session)> {
        self.sessions.create_guest(display_name)
    }

    pub fn register(&self, username: &str, display_name: &str) -> Result<(Player, Session)> {
        self.sessions.register(username, display_name)
    }

    pub fn current_player(&self, token: &str) -> Result<Player> {
        self.sessions.current_player(token)
    }

    pub fn player(&self, player_id: &PlayerId) -> Result<Player> {
        self.store.get_player(player_id)?.ok_or(GameError::PlayerNotFound)
    }

    // Lobbies

    pub fn create_lobby(&self, creator: &PlayerId) -> Result<Lobby> {
        let creator = self.player(creator)?;
        Ok(self.lobbies.create_lobby(creator))
    }

    pub fn get_lobby(&self, code: &LobbyCode) -> Result<Lobby> {
        self.lobbies.get_lobby(code)
    }

    pub fn history(&self, code: &LobbyCode) -> Result<Vec<GameSummary>> {
        self.lobbies.history(code)
    }

    pub fn join_lobby(&self, code: &LobbyCode, player_id: &PlayerId) -> Result<Lobby> {
        let player = self.player(player_id)?;
        let lobby = self.lobbies.join_lobby(code, player)?;
        self.broadcaster.member_list_update(&lobby);
        Ok(lobby)
    }

    pub fn leave_lobby(&self, code: &LobbyCode, player_id: &PlayerId) -> Result<Lobby> {
        let outcome = self.lobbies.leave_lobby(code, player_id)?;
        self.broadcaster.member_list_update(&outcome.lobby);
        let code = &outcome.lobby.code;

        if let Some((game_id, removed)) = &outcome.game {
            if removed.abandoned {
                self.broadcaster.game_abandoned(code, game_id);
            } else if let Some(progress) = &removed.progress {
                self.broadcaster.progress(code, game_id, progress);
            }
            if !removed.abandoned {
                self.cascade(code, game_id);
            }
        }
        Ok(outcome.lobby)
    }

    pub fn update_config(
        &self,
        code: &LobbyCode,
        player_id: &PlayerId,
        config: LobbyConfig,
    ) -> Result<Lobby> {
        let lobby = self.lobbies.update_config(code, player_id, config)?;
        self.broadcaster.refresh(&lobby.code);
        Ok(lobby)
    }

    pub fn set_role(
        &self,
        code: &LobbyCode,
        player_id: &PlayerId,
        target: &PlayerId,
        role: MemberRole,
    ) -> Result<Lobby> {
        let lobby = self.lobbies.set_role(code, player_id, target, role)?;
        self.broadcaster.member_list_update(&lobby);
        Ok(lobby)
    }

    pub fn transfer_host(
        &self,
        code: &LobbyCode,
        player_id: &PlayerId,
        new_host: &PlayerId,
    ) -> Result<Lobby> {
        let lobby = self.lobbies.transfer_host(code, player_id, new_host)?;
        self.broadcaster.member_list_update(&lobby);
        Ok(lobby)
    }

    pub fn add_bot(
        &self,
        code: &LobbyCode,
        host: &PlayerId,
        strategy: Option<&str>,
    ) -> Result<(Player, Lobby)> {
        let (bot, lobby) = self.bots.add_bot(code, host, strategy)?;
        self.broadcaster.member_list_update(&lobby);
        Ok((bot, lobby))
    }

    pub fn remove_bot(
        &self,
        code: &LobbyCode,
        host: &PlayerId,
        bot_id: &PlayerId,
    ) -> Result<Lobby> {
        let lobby = self.bots.remove_bot(code, host, bot_id)?;
        self.broadcaster.member_list_update(&lobby);
        Ok(lobby)
    }

    /// Stream of events for one lobby.
    pub fn subscribe(&self, code: &LobbyCode) -> Result<Subscription> {
        let lobby = self.lobbies.get_lobby(code)?;
        Ok(self.hubs().get_or_create(&lobby.code).subscribe())
    }

    // Games

    pub fn start_game(&self, code: &LobbyCode, player_id: &PlayerId) -> Result<Game> {
        let game = self.lobbies.start_game(code, player_id)?;
        self.broadcaster.game_started(&game);
        self.cascade(&game.lobby_code, &game.id);
        Ok(game)
    }

    pub fn abandon_game(&self, code: &LobbyCode, player_id: &PlayerId) -> Result<Game> {
        let game = self.lobbies.abandon_game(code, player_id)?;
        self.broadcaster.game_abandoned(&game.lobby_code, &game.id);
        Ok(game)
    }

    /// Snapshot of a running game.
    pub fn game(&self, game_id: &GameId) -> Result<Game> {
        self.engine.game(game_id)
    }

    /// The running game of a lobby.
    pub fn current_game(&self, code: &LobbyCode) -> Result<Game> {
        let game_id = self
            .lobbies
            .get_lobby(code)?
            .current_game
            .ok_or(GameError::NoGameInProgress)?;
        match self.engine.game(&game_id) {
            Err(GameError::GameNotFound) => Err(GameError::NoGameInProgress),
            other => other,
        }
    }

    pub fn board(&self, game_id: &GameId, player_id: &PlayerId) -> Result<Board> {
        self.engine.board(game_id, player_id)
    }

    pub fn announce_letter(
        &self,
        game_id: &GameId,
        player_id: &PlayerId,
        letter: &str,
    ) -> Result<Game> {
        let game = self.engine.announce_letter(game_id, player_id, letter)?;
        self.broadcaster.letter_announced(&game);
        self.cascade(&game.lobby_code, game_id);
        Ok(game)
    }

    pub fn place_letter(
        &self,
        game_id: &GameId,
        player_id: &PlayerId,
        position: Position,
    ) -> Result<PlaceOutcome> {
        let code = self.engine.game(game_id)?.lobby_code;
        let outcome = self.engine.place_letter(game_id, player_id, position)?;
        self.broadcaster.placement(&code, game_id, player_id, &outcome);
        if !outcome.game_complete {
            self.cascade(&code, game_id);
        }
        Ok(outcome)
    }

    /// Let bots act on `game_id` and publish what they did. The triggering
    /// request has already committed, so bot failures are only logged.
    fn cascade(&self, code: &LobbyCode, game_id: &GameId) {
        match self.bots.drive(game_id) {
            Ok(actions) => {
                for action in &actions {
                    self.broadcaster.send(code, action.event(game_id));
                }
            }
            Err(e) => warn!(lobby = %code, %game_id, error = %e, "bot cascade failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_SESSION_TTL_SECS;
    use crate::game::ScoringRule;
    use crate::hub::HubEvent;
    use crate::storage::MemoryStore;
    use crate::types::ManualClock;
    use chrono::Utc;

    fn server() -> GameServer {
        GameServer::with_clock(
            Config::default(),
            Dictionary::embedded(),
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::new(Utc::now())),
            Some(5),
        )
        .unwrap()
    }

    fn drain(sub: &mut Subscription) -> Vec<&'static str> {
        let mut names = Vec::new();
        while let Some(event) = sub.try_recv() {
            names.push(event.name());
        }
        names
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = Config {
            hub_buffer: 0,
            ..Config::default()
        };
        let result = GameServer::with_clock(
            config,
            Dictionary::embedded(),
            Arc::new(MemoryStore::new()),
            Arc::new(SystemClock),
            None,
        );
        assert!(matches!(result, Err(GameError::InvalidConfig(_))));
    }

    #[test]
    fn test_oversized_session_ttl_is_rejected() {
        for secs in [100_000_000_000_000_000, u64::MAX] {
            let config = Config {
                session_ttl_secs: secs,
                ..Config::default()
            };
            let result = GameServer::with_clock(
                config,
                Dictionary::embedded(),
                Arc::new(MemoryStore::new()),
                Arc::new(SystemClock),
                None,
            );
            assert!(matches!(result, Err(GameError::InvalidConfig(_))));
        }
    }

    #[test]
    fn test_longest_session_ttl_keeps_sessions_valid() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let config = Config {
            session_ttl_secs: MAX_SESSION_TTL_SECS,
            ..Config::default()
        };
        let server = GameServer::with_clock(
            config,
            Dictionary::embedded(),
            Arc::new(MemoryStore::new()),
            clock.clone(),
            None,
        )
        .unwrap();
        let (player, session) = server.create_guest("Ada").unwrap();
        clock.advance(chrono::Duration::days(365));
        assert_eq!(server.current_player(&session.token).unwrap().id, player.id);
    }

    #[test]
    fn test_engine_uses_configured_scoring() {
        let config = Config {
            scoring: ScoringRule::Subwords,
            ..Config::default()
        };
        let server = GameServer::with_clock(
            config,
            Dictionary::embedded(),
            Arc::new(MemoryStore::new()),
            Arc::new(SystemClock),
            None,
        )
        .unwrap();
        assert_eq!(server.engine().scoring_rule(), ScoringRule::Subwords);
    }

    #[test]
    fn test_lobby_codes_match_any_case() {
        let server = server();
        let (alice, _) = server.create_guest("Alice").unwrap();
        let (bob, _) = server.create_guest("Bob").unwrap();
        let code = server.create_lobby(&alice.id).unwrap().code;
        let typed = LobbyCode::new(format!(" {} ", code.as_str().to_lowercase()));

        let mut sub = server.subscribe(&typed).unwrap();
        let lobby = server.join_lobby(&typed, &bob.id).unwrap();
        assert_eq!(lobby.code, code);
        assert_eq!(server.get_lobby(&typed).unwrap().members.len(), 2);

        server
            .update_config(&typed, &alice.id, LobbyConfig { grid_size: 3 })
            .unwrap();
        let game = server.start_game(&typed, &alice.id).unwrap();
        assert_eq!(game.lobby_code, code);
        assert_eq!(server.current_game(&typed).unwrap().id, game.id);
        assert_eq!(
            drain(&mut sub),
            vec!["member-list-update", "refresh", "game-started"]
        );
    }

    #[test]
    fn test_unknown_player_cannot_create_lobby() {
        let server = server();
        assert!(matches!(
            server.create_lobby(&PlayerId::from("p_ghost")),
            Err(GameError::PlayerNotFound)
        ));
    }

    #[test]
    fn test_subscribe_requires_lobby() {
        let server = server();
        assert!(matches!(
            server.subscribe(&LobbyCode::from("ZZZZZZ")),
            Err(GameError::LobbyNotFound)
        ));
    }

    #[test]
    fn test_two_player_game_events() {
        let server = server();
        let (alice, _) = server.create_guest("Alice").unwrap();
        let (bob, _) = server.create_guest("Bob").unwrap();
        let code = server.create_lobby(&alice.id).unwrap().code;
        let mut sub = server.subscribe(&code).unwrap();

        server.join_lobby(&code, &bob.id).unwrap();
        server
            .update_config(&code, &alice.id, LobbyConfig { grid_size: 3 })
            .unwrap();
        let game = server.start_game(&code, &alice.id).unwrap();
        assert_eq!(
            drain(&mut sub),
            vec!["member-list-update", "refresh", "game-started"]
        );

        let mut completed = 0;
        for turn in 0..9 {
            let announcer = if turn % 2 == 0 { &alice.id } else { &bob.id };
            server.announce_letter(&game.id, announcer, "a").unwrap();
            let pos = Position::new(turn / 3, turn % 3);
            let first = server.place_letter(&game.id, &alice.id, pos).unwrap();
            assert!(!first.turn_complete);
            let second = server.place_letter(&game.id, &bob.id, pos).unwrap();
            assert!(second.turn_complete);
            if second.game_complete {
                completed += 1;
            }
        }
        assert_eq!(completed, 1);

        let names = drain(&mut sub);
        assert_eq!(names.iter().filter(|n| **n == "letter-announced").count(), 9);
        assert_eq!(names.iter().filter(|n| **n == "placement-update").count(), 18);
        assert_eq!(names.iter().filter(|n| **n == "turn-complete").count(), 9);
        assert_eq!(names.last(), Some(&"game-complete"));

        let lobby = server.get_lobby(&code).unwrap();
        assert!(lobby.current_game.is_none());
        assert_eq!(lobby.history.len(), 1);
        assert!(lobby.history[0].winner.is_some());
        assert!(matches!(server.current_game(&code), Err(GameError::NoGameInProgress)));
    }

    #[test]
    fn test_bots_answer_human_moves() {
        let server = server();
        let (alice, _) = server.create_guest("Alice").unwrap();
        let code = server.create_lobby(&alice.id).unwrap().code;
        server
            .update_config(&code, &alice.id, LobbyConfig { grid_size: 2 })
            .unwrap();
        let (bot, _) = server.add_bot(&code, &alice.id, None).unwrap();
        let mut sub = server.subscribe(&code).unwrap();

        let game = server.start_game(&code, &alice.id).unwrap();
        server.announce_letter(&game.id, &alice.id, "t").unwrap();

        // The bot placed in response to the announcement.
        let current = server.game(&game.id).unwrap();
        assert!(current.has_placed(&bot.id));
        assert!(!current.has_placed(&alice.id));

        let outcome = server
            .place_letter(&game.id, &alice.id, Position::new(0, 0))
            .unwrap();
        assert!(outcome.turn_complete);

        // Bot is now announcer; it announced and placed on its own.
        let current = server.game(&game.id).unwrap();
        assert_eq!(current.turn, 1);
        assert!(current.letter.is_some());
        assert_eq!(current.waiting_on(), vec![alice.id.clone()]);

        let events: Vec<HubEvent> = std::iter::from_fn(|| sub.try_recv()).collect();
        let announced = events
            .iter()
            .filter(|e| {
                matches!(e, HubEvent::LetterAnnounced { announcer, .. } if announcer == &bot.id)
            })
            .count();
        assert_eq!(announced, 1);
    }

    #[test]
    fn test_leave_mid_game_advances_turn() {
        let server = server();
        let (alice, _) = server.create_guest("Alice").unwrap();
        let (bob, _) = server.create_guest("Bob").unwrap();
        let (carol, _) = server.create_guest("Carol").unwrap();
        let code = server.create_lobby(&alice.id).unwrap().code;
        server.join_lobby(&code, &bob.id).unwrap();
        server.join_lobby(&code, &carol.id).unwrap();
        let game = server.start_game(&code, &alice.id).unwrap();

        server.announce_letter(&game.id, &alice.id, "e").unwrap();
        server.place_letter(&game.id, &alice.id, Position::new(0, 0)).unwrap();
        server.place_letter(&game.id, &bob.id, Position::new(0, 0)).unwrap();

        let mut sub = server.subscribe(&code).unwrap();
        server.leave_lobby(&code, &carol.id).unwrap();

        let current = server.game(&game.id).unwrap();
        assert_eq!(current.players, vec![alice.id.clone(), bob.id.clone()]);
        assert_eq!(current.turn, 1);
        assert_eq!(drain(&mut sub), vec!["member-list-update", "turn-complete"]);
    }

    #[test]
    fn test_abandon_publishes() {
        let server = server();
        let (alice, _) = server.create_guest("Alice").unwrap();
        let (bob, _) = server.create_guest("Bob").unwrap();
        let code = server.create_lobby(&alice.id).unwrap().code;
        server.join_lobby(&code, &bob.id).unwrap();
        let game = server.start_game(&code, &alice.id).unwrap();
        let mut sub = server.subscribe(&code).unwrap();

        assert!(matches!(server.abandon_game(&code, &bob.id), Err(GameError::NotHost)));
        server.abandon_game(&code, &alice.id).unwrap();

        assert_eq!(drain(&mut sub), vec!["game-abandoned"]);
        assert!(matches!(server.game(&game.id), Err(GameError::GameNotFound)));
        assert!(server.history(&code).unwrap().is_empty());
    }
}
