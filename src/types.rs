//! Identity types, players and the injectable clock.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Characters used in lobby codes. Omits I, O, 0 and 1 so codes can be read aloud.
pub const LOBBY_CODE_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const LOBBY_CODE_LENGTH: usize = 6;

const GAME_ID_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const GAME_ID_LENGTH: usize = 12;
const PLAYER_ID_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const PLAYER_ID_LENGTH: usize = 16;

/// Draw `len` characters from `charset`.
pub fn random_string<R: Rng>(rng: &mut R, charset: &[u8], len: usize) -> String {
    (0..len)
        .map(|_| charset[rng.random_range(0..charset.len())] as char)
        .collect()
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(
    /// Stable player identity.
    PlayerId
);
string_id!(
    /// Short, human-typeable lobby code.
    LobbyCode
);
string_id!(
    /// Game identity, unique for the process lifetime.
    GameId
);

impl PlayerId {
    /// `p_` followed by 16 random lowercase alphanumerics.
    pub fn generate() -> Self {
        Self(format!(
            "p_{}",
            random_string(&mut rand::rng(), PLAYER_ID_CHARSET, PLAYER_ID_LENGTH)
        ))
    }

    /// Bot ids carry a `bot-` prefix so they are recognisable in logs.
    pub fn generate_bot() -> Self {
        Self(format!(
            "bot-{}",
            random_string(&mut rand::rng(), PLAYER_ID_CHARSET, PLAYER_ID_LENGTH)
        ))
    }
}

impl LobbyCode {
    pub fn generate() -> Self {
        Self(random_string(&mut rand::rng(), LOBBY_CODE_CHARSET, LOBBY_CODE_LENGTH))
    }

    /// Codes are matched case-insensitively.
    pub fn normalized(value: &str) -> Self {
        Self(value.trim().to_uppercase())
    }
}

impl GameId {
    pub fn generate() -> Self {
        Self(random_string(&mut rand::rng(), GAME_ID_CHARSET, GAME_ID_LENGTH))
    }
}

/// How a player came to exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayerKind {
    Guest,
    Registered { username: String },
    Bot { strategy: String },
}

/// A participant identity. Only the display name may change after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub display_name: String,
    pub kind: PlayerKind,
    pub created_at: DateTime<Utc>,
}

impl Player {
    pub fn guest(display_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: PlayerId::generate(),
            display_name: display_name.into(),
            kind: PlayerKind::Guest,
            created_at: now,
        }
    }

    pub fn registered(
        username: impl Into<String>,
        display_name: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PlayerId::generate(),
            display_name: display_name.into(),
            kind: PlayerKind::Registered {
                username: username.into(),
            },
            created_at: now,
        }
    }

    pub fn bot(
        display_name: impl Into<String>,
        strategy: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PlayerId::generate_bot(),
            display_name: display_name.into(),
            kind: PlayerKind::Bot {
                strategy: strategy.into(),
            },
            created_at: now,
        }
    }

    pub fn is_bot(&self) -> bool {
        matches!(self.kind, PlayerKind::Bot { .. })
    }

    pub fn bot_strategy(&self) -> Option<&str> {
        match &self.kind {
            PlayerKind::Bot { strategy } => Some(strategy),
            _ => None,
        }
    }

    pub fn username(&self) -> Option<&str> {
        match &self.kind {
            PlayerKind::Registered { username } => Some(username),
            _ => None,
        }
    }
}

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}
