//! Turns lobby and game changes into hub events.
//!
//! Publishing goes only to hubs that already exist; a lobby nobody has
//! subscribed to gets no hub created on its behalf.

use std::sync::Arc;

use super::{HubEvent, HubManager};
use crate::game::{Game, GameCompletion, PlaceOutcome};
use crate::lobby::{Lobby, MemberView};
use crate::types::{GameId, LobbyCode, PlayerId};

#[derive(Clone)]
pub struct Broadcaster {
    hubs: Arc<HubManager>,
}

impl Broadcaster {
    pub fn new(hubs: Arc<HubManager>) -> Self {
        Self { hubs }
    }

    pub fn hubs(&self) -> &Arc<HubManager> {
        &self.hubs
    }

    /// Publish to the lobby's hub if one exists. Returns subscribers reached.
    pub fn send(&self, code: &LobbyCode, event: HubEvent) -> usize {
        match self.hubs.get(code) {
            Some(hub) => hub.publish(event),
            None => 0,
        }
    }

    pub fn member_list_update(&self, lobby: &Lobby) -> usize {
        let members = lobby.members.iter().map(MemberView::from).collect();
        self.send(&lobby.code, HubEvent::MemberListUpdate { members })
    }

    pub fn game_started(&self, game: &Game) -> usize {
        self.send(
            &game.lobby_code,
            HubEvent::GameStarted {
                game_id: game.id.clone(),
                players: game.players.clone(),
                grid_size: game.grid_size,
            },
        )
    }

    /// Announcement of the letter for the game's current turn.
    pub fn letter_announced(&self, game: &Game) -> usize {
        let (Some(letter), Some(announcer)) = (game.letter, game.announcer()) else {
            return 0;
        };
        self.send(
            &game.lobby_code,
            HubEvent::LetterAnnounced {
                game_id: game.id.clone(),
                letter,
                announcer: announcer.clone(),
                turn: game.turn,
            },
        )
    }

    /// Progress after a placement, plus turn and game completion when they
    /// happened.
    pub fn placement(
        &self,
        code: &LobbyCode,
        game_id: &GameId,
        player_id: &PlayerId,
        outcome: &PlaceOutcome,
    ) -> usize {
        let mut reached = self.send(
            code,
            HubEvent::PlacementUpdate {
                game_id: game_id.clone(),
                player_id: player_id.clone(),
                placed: outcome.placed,
                players: outcome.players,
            },
        );
        reached += self.progress(code, game_id, outcome);
        reached
    }

    /// Turn and game completion carried by `outcome`, if any.
    pub fn progress(&self, code: &LobbyCode, game_id: &GameId, outcome: &PlaceOutcome) -> usize {
        let mut reached = 0;
        if outcome.turn_complete {
            reached += self.send(
                code,
                HubEvent::TurnComplete {
                    game_id: game_id.clone(),
                    turn: outcome.turn,
                    next_announcer: outcome.next_announcer.clone(),
                },
            );
        }
        if let Some(completion) = &outcome.completion {
            reached += self.game_complete(completion);
        }
        reached
    }

    pub fn game_complete(&self, completion: &GameCompletion) -> usize {
        let summary = &completion.summary;
        self.send(
            &completion.lobby_code,
            HubEvent::GameComplete {
                game_id: summary.game_id.clone(),
                winner: summary.winner.clone(),
                winning_score: summary.winning_score,
                tied: summary.tied,
            },
        )
    }

    pub fn game_abandoned(&self, code: &LobbyCode, game_id: &GameId) -> usize {
        self.send(
            code,
            HubEvent::GameAbandoned {
                game_id: game_id.clone(),
            },
        )
    }

    pub fn refresh(&self, code: &LobbyCode) -> usize {
        self.send(code, HubEvent::Refresh)
    }
}
