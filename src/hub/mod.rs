//! Per-lobby publish/subscribe for live clients
//!
//! Each subscriber reads from its own position in a bounded ring of
//! `hub_buffer` events. Publishing never waits: a subscriber that falls more
//! than a full buffer behind loses the oldest events, the loss is logged and
//! its stream carries on from the oldest event still buffered. Delivery is
//! best-effort and not replayable.

pub mod broadcaster;

pub use broadcaster::Broadcaster;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, info, warn};

use crate::lobby::MemberView;
use crate::types::{GameId, LobbyCode, PlayerId};

/// A change pushed to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum HubEvent {
    MemberListUpdate {
        members: Vec<MemberView>,
    },
    GameStarted {
        game_id: GameId,
        players: Vec<PlayerId>,
        grid_size: usize,
    },
    LetterAnnounced {
        game_id: GameId,
        letter: char,
        announcer: PlayerId,
        turn: usize,
    },
    PlacementUpdate {
        game_id: GameId,
        player_id: PlayerId,
        placed: usize,
        players: usize,
    },
    TurnComplete {
        game_id: GameId,
        turn: usize,
        next_announcer: Option<PlayerId>,
    },
    GameComplete {
        game_id: GameId,
        winner: Option<PlayerId>,
        winning_score: u32,
        tied: bool,
    },
    GameAbandoned {
        game_id: GameId,
    },
    /// Re-fetch everything.
    Refresh,
}

impl HubEvent {
    /// Stable event name for transports that label frames.
    pub fn name(&self) -> &'static str {
        match self {
            HubEvent::MemberListUpdate { .. } => "member-list-update",
            HubEvent::GameStarted { .. } => "game-started",
            HubEvent::LetterAnnounced { .. } => "letter-announced",
            HubEvent::PlacementUpdate { .. } => "placement-update",
            HubEvent::TurnComplete { .. } => "turn-complete",
            HubEvent::GameComplete { .. } => "game-complete",
            HubEvent::GameAbandoned { .. } => "game-abandoned",
            HubEvent::Refresh => "refresh",
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Fan-out point for one lobby.
pub struct Hub {
    code: LobbyCode,
    capacity: usize,
    /// `None` once closed.
    sender: Mutex<Option<broadcast::Sender<HubEvent>>>,
}

impl Hub {
    pub fn new(code: LobbyCode, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            code,
            capacity: capacity.max(1),
            sender: Mutex::new(Some(sender)),
        }
    }

    pub fn code(&self) -> &LobbyCode {
        &self.code
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Start a new event stream. A closed hub hands out streams that end
    /// immediately.
    pub fn subscribe(&self) -> Subscription {
        let receiver = match self.sender.lock().as_ref() {
            Some(sender) => sender.subscribe(),
            None => broadcast::channel(1).1,
        };
        debug!(lobby = %self.code, subscribers = self.subscriber_count(), "subscriber added");
        Subscription {
            code: self.code.clone(),
            receiver,
            dropped: 0,
        }
    }

    /// Queue `event` for every current subscriber. Returns how many received it.
    pub fn publish(&self, event: HubEvent) -> usize {
        let guard = self.sender.lock();
        let Some(sender) = guard.as_ref() else {
            return 0;
        };
        let name = event.name();
        // Err only means nobody is listening.
        let delivered = sender.send(event).unwrap_or(0);
        debug!(lobby = %self.code, event = name, delivered, "event published");
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender
            .lock()
            .as_ref()
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }

    /// End every stream. Events already buffered are still delivered first.
    pub fn close(&self) {
        if self.sender.lock().take().is_some() {
            info!(lobby = %self.code, "hub closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }
}

/// One subscriber's stream. Dropping it unsubscribes.
pub struct Subscription {
    code: LobbyCode,
    receiver: broadcast::Receiver<HubEvent>,
    dropped: u64,
}

impl Subscription {
    /// Next event, or `None` once the hub has closed.
    pub async fn recv(&mut self) -> Option<HubEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(n)) => self.note_lag(n),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<HubEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(n)) => self.note_lag(n),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Events this subscriber missed because it fell behind.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn unsubscribe(self) {
        debug!(lobby = %self.code, "subscriber removed");
    }

    fn note_lag(&mut self, n: u64) {
        self.dropped += n;
        warn!(lobby = %self.code, dropped = n, "subscriber lagging, oldest events dropped");
    }
}

/// Process-wide hub registry keyed by lobby code.
pub struct HubManager {
    hubs: RwLock<HashMap<LobbyCode, Arc<Hub>>>,
    buffer: usize,
}

impl HubManager {
    pub fn new(buffer: usize) -> Self {
        Self {
            hubs: RwLock::new(HashMap::new()),
            buffer,
        }
    }

    pub fn get_or_create(&self, code: &LobbyCode) -> Arc<Hub> {
        if let Some(hub) = self.hubs.read().get(code) {
            return Arc::clone(hub);
        }
        let mut hubs = self.hubs.write();
        let hub = hubs.entry(code.clone()).or_insert_with(|| {
            info!(lobby = %code, buffer = self.buffer, "hub created");
            Arc::new(Hub::new(code.clone(), self.buffer))
        });
        Arc::clone(hub)
    }

    pub fn get(&self, code: &LobbyCode) -> Option<Arc<Hub>> {
        self.hubs.read().get(code).cloned()
    }

    pub fn remove(&self, code: &LobbyCode) {
        if let Some(hub) = self.hubs.write().remove(code) {
            hub.close();
        }
    }

    /// Close and drop hubs nobody is subscribed to. Returns how many went.
    pub fn remove_idle(&self) -> usize {
        let mut hubs = self.hubs.write();
        let before = hubs.len();
        hubs.retain(|_, hub| {
            let keep = hub.subscriber_count() > 0;
            if !keep {
                hub.close();
            }
            keep
        });
        let removed = before - hubs.len();
        if removed > 0 {
            info!(removed, "idle hubs removed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.hubs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.hubs.read().is_empty()
    }
}
