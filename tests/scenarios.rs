use chrono::Utc;
use std::sync::{Arc, Barrier};

use gridword::config::Config;
use gridword::game::{Dictionary, GameState, Position};
use gridword::hub::HubEvent;
use gridword::lobby::{LobbyConfig, LobbyState};
use gridword::storage::MemoryStore;
use gridword::types::{LobbyCode, ManualClock, Player, PlayerId};
use gridword::{GameError, GameServer};

fn server() -> GameServer {
    GameServer::with_clock(
        Config::default(),
        Dictionary::embedded(),
        Arc::new(MemoryStore::new()),
        Arc::new(ManualClock::new(Utc::now())),
        Some(17),
    )
    .unwrap()
}

/// Two guests in a fresh lobby with the given grid size.
fn two_player_lobby(server: &GameServer, grid_size: usize) -> (LobbyCode, Player, Player) {
    let (alice, _) = server.create_guest("Alice").unwrap();
    let (bob, _) = server.create_guest("Bob").unwrap();
    let code = server.create_lobby(&alice.id).unwrap().code;
    server.join_lobby(&code, &bob.id).unwrap();
    server
        .update_config(&code, &alice.id, LobbyConfig { grid_size })
        .unwrap();
    (code, alice, bob)
}

fn row_major(turn: usize, size: usize) -> Position {
    Position::new(turn / size, turn % size)
}

#[test]
fn happy_path_two_players_three_by_three() {
    let server = server();
    let (code, alice, bob) = two_player_lobby(&server, 3);
    let mut sub = server.subscribe(&code).unwrap();

    let game = server.start_game(&code, &alice.id).unwrap();
    assert_eq!(game.state, GameState::Announcing);
    assert_eq!(game.players, vec![alice.id.clone(), bob.id.clone()]);
    assert_eq!(server.get_lobby(&code).unwrap().state, LobbyState::Playing);

    let letters = ["c", "a", "t", "o", "x", "e", "w", "e", "b"];
    let mut finished = None;
    for (turn, letter) in letters.iter().enumerate() {
        let announcer = &game.players[turn % 2];
        server.announce_letter(&game.id, announcer, letter).unwrap();
        let pos = row_major(turn, 3);
        let first = server.place_letter(&game.id, &alice.id, pos).unwrap();
        assert!(!first.turn_complete);
        let second = server.place_letter(&game.id, &bob.id, pos).unwrap();
        assert!(second.turn_complete);
        assert_eq!(second.turn, turn + 1);
        if turn < 8 {
            assert!(!second.game_complete);
        } else {
            finished = Some(second);
        }
    }

    let outcome = finished.unwrap();
    assert!(outcome.game_complete);
    let completion = outcome.completion.unwrap();
    assert!(completion.boards.iter().all(|(_, b)| b.is_full()));

    let lobby = server.get_lobby(&code).unwrap();
    assert_eq!(lobby.state, LobbyState::Waiting);
    assert!(lobby.current_game.is_none());
    assert_eq!(lobby.history.len(), 1);
    let summary = &lobby.history[0];
    assert!(summary.winner.is_some());
    assert_eq!(summary.game_id, game.id);
    // Identical boards: CAT / OXE / WEB.
    assert!(summary.tied);
    assert_eq!(summary.score_for(&alice.id), summary.score_for(&bob.id));

    let mut game_completes = 0;
    while let Some(event) = sub.try_recv() {
        if let HubEvent::GameComplete { winner, .. } = event {
            assert_eq!(winner, summary.winner);
            game_completes += 1;
        }
    }
    assert_eq!(game_completes, 1);
}

#[test]
fn only_host_may_abandon() {
    let server = server();
    let (code, alice, bob) = two_player_lobby(&server, 3);
    let game = server.start_game(&code, &alice.id).unwrap();

    assert!(matches!(server.abandon_game(&code, &bob.id), Err(GameError::NotHost)));
    assert!(server.game(&game.id).is_ok());

    let abandoned = server.abandon_game(&code, &alice.id).unwrap();
    assert_eq!(abandoned.state, GameState::Abandoned);

    let lobby = server.get_lobby(&code).unwrap();
    assert!(lobby.current_game.is_none());
    assert_eq!(lobby.state, LobbyState::Waiting);
    assert!(lobby.history.is_empty());
    assert!(matches!(server.current_game(&code), Err(GameError::NoGameInProgress)));
    assert!(matches!(server.game(&game.id), Err(GameError::GameNotFound)));
    assert!(matches!(
        server.abandon_game(&code, &alice.id),
        Err(GameError::NoGameInProgress)
    ));
}

#[test]
fn boards_are_independent() {
    let server = server();
    let (code, alice, bob) = two_player_lobby(&server, 3);
    let game = server.start_game(&code, &alice.id).unwrap();

    server.announce_letter(&game.id, &alice.id, "q").unwrap();
    server.place_letter(&game.id, &alice.id, Position::new(0, 0)).unwrap();
    server.place_letter(&game.id, &bob.id, Position::new(0, 0)).unwrap();

    assert_eq!(server.board(&game.id, &alice.id).unwrap().get(Position::new(0, 0)), Some('Q'));
    assert_eq!(server.board(&game.id, &bob.id).unwrap().get(Position::new(0, 0)), Some('Q'));
}

#[test]
fn second_placement_in_a_turn_is_rejected() {
    let server = server();
    let (code, alice, _bob) = two_player_lobby(&server, 3);
    let game = server.start_game(&code, &alice.id).unwrap();

    server.announce_letter(&game.id, &alice.id, "z").unwrap();
    server.place_letter(&game.id, &alice.id, Position::new(1, 1)).unwrap();
    let before = server.board(&game.id, &alice.id).unwrap();

    assert!(matches!(
        server.place_letter(&game.id, &alice.id, Position::new(2, 2)),
        Err(GameError::AlreadyPlaced)
    ));
    assert_eq!(server.board(&game.id, &alice.id).unwrap(), before);
}

#[test]
fn simultaneous_final_placements_complete_once() {
    for _ in 0..25 {
        let server = server();
        let (code, alice, bob) = two_player_lobby(&server, 2);
        let mut sub = server.subscribe(&code).unwrap();
        let game = server.start_game(&code, &alice.id).unwrap();

        for turn in 0..3 {
            let announcer = &game.players[turn % 2];
            server.announce_letter(&game.id, announcer, "a").unwrap();
            server.place_letter(&game.id, &alice.id, row_major(turn, 2)).unwrap();
            server.place_letter(&game.id, &bob.id, row_major(turn, 2)).unwrap();
        }
        server.announce_letter(&game.id, &bob.id, "a").unwrap();

        let barrier = Barrier::new(2);
        let completions: usize = std::thread::scope(|s| {
            let handles: Vec<_> = [&alice.id, &bob.id]
                .into_iter()
                .map(|player: &PlayerId| {
                    let server = &server;
                    let barrier = &barrier;
                    let game_id = &game.id;
                    s.spawn(move || {
                        barrier.wait();
                        server
                            .place_letter(game_id, player, Position::new(1, 1))
                            .map(|o| o.game_complete as usize)
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        assert_eq!(completions, 1);

        let lobby = server.get_lobby(&code).unwrap();
        assert_eq!(lobby.history.len(), 1);
        assert!(lobby.current_game.is_none());

        let events: Vec<HubEvent> = std::iter::from_fn(|| sub.try_recv()).collect();
        let completes = events
            .iter()
            .filter(|e| matches!(e, HubEvent::GameComplete { .. }))
            .count();
        assert_eq!(completes, 1);
    }
}

#[test]
fn placing_before_announce_always_fails() {
    let server = server();
    let (code, alice, bob) = two_player_lobby(&server, 3);
    let game = server.start_game(&code, &alice.id).unwrap();
    let stranger = PlayerId::from("p_stranger");

    for player in [&alice.id, &bob.id, &stranger] {
        for pos in [Position::new(0, 0), Position::new(2, 2), Position::new(9, 9)] {
            assert!(matches!(
                server.place_letter(&game.id, player, pos),
                Err(GameError::LetterNotAnnounced)
            ));
        }
    }

    // Also at the start of a later turn.
    server.announce_letter(&game.id, &alice.id, "a").unwrap();
    server.place_letter(&game.id, &alice.id, Position::new(0, 0)).unwrap();
    server.place_letter(&game.id, &bob.id, Position::new(0, 0)).unwrap();
    assert!(matches!(
        server.place_letter(&game.id, &bob.id, Position::new(0, 1)),
        Err(GameError::LetterNotAnnounced)
    ));
}

#[test]
fn wrong_announcer_changes_nothing() {
    let server = server();
    let (code, alice, bob) = two_player_lobby(&server, 3);
    let game = server.start_game(&code, &alice.id).unwrap();
    let before = server.game(&game.id).unwrap();

    assert!(matches!(
        server.announce_letter(&game.id, &bob.id, "a"),
        Err(GameError::NotPlayerTurn)
    ));
    let after = server.game(&game.id).unwrap();
    assert_eq!(after.turn, before.turn);
    assert_eq!(after.letter, before.letter);
    assert_eq!(after.placed, before.placed);
    assert_eq!(after.state, GameState::Announcing);

    // Announcing twice in one turn is also out of turn.
    server.announce_letter(&game.id, &alice.id, "a").unwrap();
    assert!(matches!(
        server.announce_letter(&game.id, &alice.id, "b"),
        Err(GameError::NotPlayerTurn)
    ));
    assert_eq!(server.game(&game.id).unwrap().letter, Some('A'));
}

#[test]
fn turn_counter_reaches_cell_count_at_scoring() {
    let server = server();
    let (code, alice, bob) = two_player_lobby(&server, 4);
    let game = server.start_game(&code, &alice.id).unwrap();

    for turn in 0..16 {
        let current = server.game(&game.id).unwrap();
        assert_eq!(current.turn, turn);
        for (_, board) in server.engine().boards(&game.id).unwrap() {
            assert_eq!(board.filled_count(), turn);
            assert!(!board.is_full());
        }
        server
            .announce_letter(&game.id, &current.players[turn % 2], "e")
            .unwrap();
        server.place_letter(&game.id, &alice.id, row_major(turn, 4)).unwrap();
        let last = server.place_letter(&game.id, &bob.id, row_major(15 - turn, 4)).unwrap();
        if turn == 15 {
            assert_eq!(last.turn, 16);
            assert!(last.game_complete);
        }
    }
}

#[test]
fn bot_only_game_plays_itself() {
    let server = server();
    let (host, _) = server.create_guest("Host").unwrap();
    let code = server.create_lobby(&host.id).unwrap().code;
    server
        .update_config(&code, &host.id, LobbyConfig { grid_size: 3 })
        .unwrap();
    server.add_bot(&code, &host.id, Some("random")).unwrap();
    server.add_bot(&code, &host.id, Some("frequency")).unwrap();
    server
        .set_role(&code, &host.id, &host.id, gridword::lobby::MemberRole::Spectator)
        .unwrap();

    server.start_game(&code, &host.id).unwrap();

    let lobby = server.get_lobby(&code).unwrap();
    assert_eq!(lobby.history.len(), 1);
    assert!(lobby.history[0].winner.is_some());
    assert_eq!(lobby.state, LobbyState::Waiting);
}

#[test]
fn sessions_identify_players() {
    let server = server();
    let (player, session) = server.register("ada", "Ada").unwrap();
    assert_eq!(server.current_player(&session.token).unwrap().id, player.id);
    assert!(matches!(server.register("ADA", "Other"), Err(GameError::UsernameExists)));
    assert!(matches!(server.current_player("bogus"), Err(GameError::InvalidSession)));
}
