//! Session tokens
//!
//! A token is an opaque string bound to one player until it expires. The
//! store is safe to read and write from concurrent requests.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{GameError, Result};
use crate::storage::PlayerStore;
use crate::types::{Clock, Player, PlayerId};

const TOKEN_PREFIX: &str = "sess_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub player_id: PlayerId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    store: Arc<dyn PlayerStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(store: Arc<dyn PlayerStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            store,
            clock,
            ttl,
        }
    }

    /// New guest player with a fresh session.
    pub fn create_guest(&self, display_name: &str) -> Result<(Player, Session)> {
        let player = Player::guest(display_name, self.clock.now());
        self.store.save_player(&player)?;
        let session = self.issue(&player.id);
        info!(player_id = %player.id, "guest session created");
        Ok((player, session))
    }

    /// New registered player. Usernames are unique, ignoring case.
    pub fn register(&self, username: &str, display_name: &str) -> Result<(Player, Session)> {
        // Holding the write lock serializes registrations.
        let mut sessions = self.sessions.write();
        if self.store.get_registered_player_by_username(username)?.is_some() {
            return Err(GameError::UsernameExists);
        }
        let player = Player::registered(username, display_name, self.clock.now());
        self.store.save_registered_player(&player)?;
        let session = self.new_session(&player.id);
        sessions.insert(session.token.clone(), session.clone());
        info!(player_id = %player.id, %username, "player registered");
        Ok((player, session))
    }

    /// Issue a session for an existing player.
    pub fn issue(&self, player_id: &PlayerId) -> Session {
        let session = self.new_session(player_id);
        self.sessions
            .write()
            .insert(session.token.clone(), session.clone());
        session
    }

    /// The live session for `token`. Expired sessions are evicted.
    pub fn validate(&self, token: &str) -> Result<Session> {
        let now = self.clock.now();
        {
            let sessions = self.sessions.read();
            match sessions.get(token) {
                None => return Err(GameError::InvalidSession),
                Some(s) if !s.is_expired(now) => return Ok(s.clone()),
                Some(_) => {}
            }
        }
        let mut sessions = self.sessions.write();
        if sessions.get(token).is_some_and(|s| s.is_expired(now)) {
            sessions.remove(token);
            debug!("expired session evicted");
        }
        Err(GameError::InvalidSession)
    }

    /// The player behind `token`.
    pub fn current_player(&self, token: &str) -> Result<Player> {
        let session = self.validate(token)?;
        self.store
            .get_player(&session.player_id)?
            .ok_or(GameError::PlayerNotFound)
    }

    /// Forget a token. Returns whether it existed.
    pub fn invalidate(&self, token: &str) -> bool {
        self.sessions.write().remove(token).is_some()
    }

    /// Drop every expired session. Returns how many went.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(now));
        let purged = before - sessions.len();
        if purged > 0 {
            info!(purged, "expired sessions purged");
        }
        purged
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    fn new_session(&self, player_id: &PlayerId) -> Session {
        let now = self.clock.now();
        Session {
            token: generate_token(),
            player_id: player_id.clone(),
            created_at: now,
            expires_at: now + self.ttl,
        }
    }
}

/// "sess_" followed by 32 hex digits of randomness.
fn generate_token() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill(&mut bytes);
    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    format!("{}{}", TOKEN_PREFIX, hex)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::types::ManualClock;

    fn sessions() -> (SessionStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store =
            SessionStore::new(Arc::new(MemoryStore::new()), clock.clone(), Duration::hours(1));
        (store, clock)
    }

    #[test]
    fn test_token_format() {
        let token = generate_token();
        assert!(token.starts_with("sess_"));
        assert_eq!(token.len(), 5 + 32);
        assert_ne!(token, generate_token());
    }

    #[test]
    fn test_guest_session() {
        let (store, _) = sessions();
        let (player, session) = store.create_guest("Ada").unwrap();
        assert_eq!(store.validate(&session.token).unwrap().player_id, player.id);
        assert_eq!(store.current_player(&session.token).unwrap(), player);
    }

    #[test]
    fn test_unknown_token() {
        let (store, _) = sessions();
        assert!(matches!(store.validate("sess_nope"), Err(GameError::InvalidSession)));
        assert!(matches!(store.current_player(""), Err(GameError::InvalidSession)));
    }

    #[test]
    fn test_expired_token_is_evicted() {
        let (store, clock) = sessions();
        let (_, session) = store.create_guest("Ada").unwrap();
        clock.advance(Duration::minutes(59));
        assert!(store.validate(&session.token).is_ok());

        clock.advance(Duration::minutes(1));
        assert!(matches!(store.validate(&session.token), Err(GameError::InvalidSession)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_register_unique_username() {
        let (store, _) = sessions();
        let (player, session) = store.register("grace", "Grace").unwrap();
        assert_eq!(player.username(), Some("grace"));
        assert_eq!(store.current_player(&session.token).unwrap().id, player.id);

        assert!(matches!(store.register("GRACE", "Imposter"), Err(GameError::UsernameExists)));
    }

    #[test]
    fn test_invalidate() {
        let (store, _) = sessions();
        let (_, session) = store.create_guest("Ada").unwrap();
        assert!(store.invalidate(&session.token));
        assert!(!store.invalidate(&session.token));
        assert!(store.validate(&session.token).is_err());
    }

    #[test]
    fn test_purge_expired() {
        let (store, clock) = sessions();
        store.create_guest("a").unwrap();
        store.create_guest("b").unwrap();
        clock.advance(Duration::minutes(30));
        let (_, fresh) = store.create_guest("c").unwrap();
        clock.advance(Duration::minutes(31));

        assert_eq!(store.purge_expired(), 2);
        assert_eq!(store.len(), 1);
        assert!(store.validate(&fresh.token).is_ok());
    }

    #[test]
    fn test_concurrent_sessions() {
        let (store, _) = sessions();
        let store = Arc::new(store);
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let (_, session) = store.create_guest(&format!("p{}", i)).unwrap();
                    store.validate(&session.token).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.len(), 8);
    }
}
