//! Player persistence
//!
//! This module provides:
//! - The [`PlayerStore`] trait the lobby, session and bot layers save through
//! - [`MemoryStore`] for tests and ephemeral servers
//! - [`SqliteStore`], a SQLite database with schema versioning, opened in
//!   the OS-standard data directory (via `directories`) or at a given path

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use parking_lot::{Mutex, RwLock};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::types::{Player, PlayerId, PlayerKind};

/// Current schema version. Bump this when making schema changes.
/// Version history:
/// - v1: meta and players tables
/// - v2: unique index on registered usernames
const SCHEMA_VERSION: u32 = 2;

/// Errors that can occur during storage operations.
#[derive(Debug)]
pub enum StorageError {
    /// Database error from SQLite
    Database(rusqlite::Error),
    /// Could not determine data directory
    NoDataDirectory,
    /// Schema version mismatch (future version)
    FutureSchemaVersion { found: u32, supported: u32 },
    /// Failed to create data directory
    CreateDirFailed(std::io::Error),
    /// Migration failed
    MigrationFailed { from: u32, to: u32, reason: String },
    /// A stored row could not be decoded
    Corrupt(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Database(e) => write!(f, "database error: {}", e),
            StorageError::NoDataDirectory => write!(f, "could not determine data directory"),
            StorageError::FutureSchemaVersion { found, supported } => {
                write!(
                    f,
                    "database schema version {} is newer than supported version {}",
                    found, supported
                )
            }
            StorageError::CreateDirFailed(e) => write!(f, "failed to create data directory: {}", e),
            StorageError::MigrationFailed { from, to, reason } => {
                write!(f, "migration from v{} to v{} failed: {}", from, to, reason)
            }
            StorageError::Corrupt(reason) => write!(f, "corrupt record: {}", reason),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Database(e) => Some(e),
            StorageError::CreateDirFailed(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        StorageError::Database(e)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Corrupt(e.to_string())
    }
}

/// Where players live between requests.
pub trait PlayerStore: Send + Sync {
    /// Insert or replace a player of any kind.
    fn save_player(&self, player: &Player) -> Result<(), StorageError>;

    fn get_player(&self, id: &PlayerId) -> Result<Option<Player>, StorageError>;

    /// Save a registered player and index it by username.
    fn save_registered_player(&self, player: &Player) -> Result<(), StorageError>;

    fn get_registered_player_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Player>, StorageError>;
}

/// In-process store backed by hash maps.
#[derive(Default)]
pub struct MemoryStore {
    players: RwLock<HashMap<PlayerId, Player>>,
    usernames: RwLock<HashMap<String, PlayerId>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.players.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.read().is_empty()
    }
}

impl PlayerStore for MemoryStore {
    fn save_player(&self, player: &Player) -> Result<(), StorageError> {
        self.players.write().insert(player.id.clone(), player.clone());
        Ok(())
    }

    fn get_player(&self, id: &PlayerId) -> Result<Option<Player>, StorageError> {
        Ok(self.players.read().get(id).cloned())
    }

    fn save_registered_player(&self, player: &Player) -> Result<(), StorageError> {
        self.save_player(player)?;
        if let Some(username) = player.username() {
            self.usernames
                .write()
                .insert(username.to_lowercase(), player.id.clone());
        }
        Ok(())
    }

    fn get_registered_player_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Player>, StorageError> {
        let id = self.usernames.read().get(&username.to_lowercase()).cloned();
        match id {
            Some(id) => self.get_player(&id),
            None => Ok(None),
        }
    }
}

/// SQLite-backed store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database in the OS data directory:
    /// - Linux: `$XDG_DATA_HOME/gridword/` or `~/.local/share/gridword/`
    /// - macOS: `~/Library/Application Support/gridword/`
    pub fn open() -> Result<Self, StorageError> {
        let data_dir = Self::data_dir()?;
        Self::open_at(&data_dir.join("gridword.db"))
    }

    /// Open or create the database at `path`, creating parent directories.
    pub fn open_at(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(StorageError::CreateDirFailed)?;
        }
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "player database opened");
        Self::from_connection(conn)
    }

    /// Open an in-memory database.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    pub fn data_dir() -> Result<PathBuf, StorageError> {
        ProjectDirs::from("", "", "gridword")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or(StorageError::NoDataDirectory)
    }

    pub fn schema_version(&self) -> Result<u32, StorageError> {
        Self::get_schema_version(&self.conn.lock())
    }

    pub fn player_count(&self) -> Result<usize, StorageError> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM players", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn initialize_schema(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock();
        let current_version = Self::get_schema_version(&conn)?;

        if current_version == 0 {
            Self::create_schema_v1(&conn)?;
            Self::migrate_schema(&conn, 1)?;
        } else if current_version < SCHEMA_VERSION {
            Self::migrate_schema(&conn, current_version)?;
        } else if current_version > SCHEMA_VERSION {
            return Err(StorageError::FutureSchemaVersion {
                found: current_version,
                supported: SCHEMA_VERSION,
            });
        }

        Ok(())
    }

    fn get_schema_version(conn: &Connection) -> Result<u32, StorageError> {
        let table_exists: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='meta'",
            [],
            |row| row.get(0),
        )?;

        if !table_exists {
            return Ok(0);
        }

        let version: Option<u32> = conn
            .query_row("SELECT schema_version FROM meta LIMIT 1", [], |row| row.get(0))
            .optional()?;

        Ok(version.unwrap_or(0))
    }

    fn create_schema_v1(conn: &Connection) -> Result<(), StorageError> {
        conn.execute_batch(
            r#"
            CREATE TABLE meta (
                schema_version INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );

            -- kind holds the serialized PlayerKind; username is denormalized
            -- from it for lookups
            CREATE TABLE players (
                id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                kind TEXT NOT NULL,
                username TEXT,
                created_at TEXT NOT NULL
            );
            "#,
        )?;

        conn.execute(
            "INSERT INTO meta (schema_version, created_at) VALUES (?1, ?2)",
            params![1u32, Utc::now().to_rfc3339()],
        )?;

        Ok(())
    }

    fn migrate_schema(conn: &Connection, from_version: u32) -> Result<(), StorageError> {
        let mut current_version = from_version;

        while current_version < SCHEMA_VERSION {
            match current_version {
                1 => {
                    conn.execute_batch(
                        "CREATE UNIQUE INDEX IF NOT EXISTS idx_players_username
                         ON players (username);",
                    )?;
                    current_version = 2;
                }
                _ => {
                    return Err(StorageError::MigrationFailed {
                        from: current_version,
                        to: SCHEMA_VERSION,
                        reason: format!("no migration path from version {}", current_version),
                    });
                }
            }
        }

        conn.execute("UPDATE meta SET schema_version = ?1", params![SCHEMA_VERSION])?;
        debug!(from = from_version, to = SCHEMA_VERSION, "schema migrated");

        Ok(())
    }

    fn upsert(&self, player: &Player) -> Result<(), StorageError> {
        let kind = serde_json::to_string(&player.kind)?;
        let username = player.username().map(str::to_lowercase);
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO players (id, display_name, kind, username, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                player.id.as_str(),
                &player.display_name,
                kind,
                username,
                player.created_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn select_one(&self, column: &str, value: &str) -> Result<Option<Player>, StorageError> {
        let sql = format!(
            "SELECT id, display_name, kind, created_at FROM players WHERE {} = ?1",
            column
        );
        let row = self
            .conn
            .lock()
            .query_row(&sql, params![value], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .optional()?;

        let Some((id, display_name, kind, created_at)) = row else {
            return Ok(None);
        };
        let kind: PlayerKind = serde_json::from_str(&kind)?;
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| StorageError::Corrupt(format!("player {}: {}", id, e)))?
            .with_timezone(&Utc);

        Ok(Some(Player {
            id: PlayerId::new(id),
            display_name,
            kind,
            created_at,
        }))
    }
}

impl PlayerStore for SqliteStore {
    fn save_player(&self, player: &Player) -> Result<(), StorageError> {
        self.upsert(player)
    }

    fn get_player(&self, id: &PlayerId) -> Result<Option<Player>, StorageError> {
        self.select_one("id", id.as_str())
    }

    fn save_registered_player(&self, player: &Player) -> Result<(), StorageError> {
        self.upsert(player)
    }

    fn get_registered_player_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Player>, StorageError> {
        self.select_one("username", &username.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stores() -> Vec<Box<dyn PlayerStore>> {
        vec![
            Box::new(MemoryStore::new()),
            Box::new(SqliteStore::open_in_memory().unwrap()),
        ]
    }

    #[test]
    fn test_save_and_get_player() {
        for store in stores() {
            let guest = Player::guest("Ada", Utc::now());
            assert!(store.get_player(&guest.id).unwrap().is_none());

            store.save_player(&guest).unwrap();
            assert_eq!(store.get_player(&guest.id).unwrap(), Some(guest.clone()));
        }
    }

    #[test]
    fn test_save_replaces() {
        for store in stores() {
            let mut guest = Player::guest("Ada", Utc::now());
            store.save_player(&guest).unwrap();
            guest.display_name = "Ada L".to_string();
            store.save_player(&guest).unwrap();
            assert_eq!(store.get_player(&guest.id).unwrap().unwrap().display_name, "Ada L");
        }
    }

    #[test]
    fn test_registered_lookup_ignores_case() {
        for store in stores() {
            let player = Player::registered("Grace", "Grace H", Utc::now());
            store.save_registered_player(&player).unwrap();

            let found = store.get_registered_player_by_username("grace").unwrap();
            assert_eq!(found, Some(player.clone()));
            assert!(store.get_registered_player_by_username("nobody").unwrap().is_none());
            assert_eq!(store.get_player(&player.id).unwrap(), Some(player));
        }
    }

    #[test]
    fn test_bot_kind_survives() {
        for store in stores() {
            let bot = Player::bot("Bot 1", "frequency", Utc::now());
            store.save_player(&bot).unwrap();
            let back = store.get_player(&bot.id).unwrap().unwrap();
            assert_eq!(back.bot_strategy(), Some("frequency"));
        }
    }

    #[test]
    fn test_schema_version() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.schema_version().unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_migrates_v1_database() {
        let conn = Connection::open_in_memory().unwrap();
        SqliteStore::create_schema_v1(&conn).unwrap();
        assert_eq!(SqliteStore::get_schema_version(&conn).unwrap(), 1);

        let store = SqliteStore::from_connection(conn).unwrap();
        assert_eq!(store.schema_version().unwrap(), 2);
    }

    #[test]
    fn test_rejects_future_schema() {
        let conn = Connection::open_in_memory().unwrap();
        SqliteStore::create_schema_v1(&conn).unwrap();
        conn.execute("UPDATE meta SET schema_version = 99", []).unwrap();

        match SqliteStore::from_connection(conn) {
            Err(StorageError::FutureSchemaVersion { found, supported }) => {
                assert_eq!(found, 99);
                assert_eq!(supported, SCHEMA_VERSION);
            }
            _ => panic!("expected FutureSchemaVersion"),
        }
    }

    #[test]
    fn test_username_unique() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .save_registered_player(&Player::registered("sam", "Sam", Utc::now()))
            .unwrap();
        let dup = store.save_registered_player(&Player::registered("SAM", "Other Sam", Utc::now()));
        assert!(matches!(dup, Err(StorageError::Database(_))));
    }

    #[test]
    fn test_open_at_path() {
        let dir = std::env::temp_dir().join(format!("gridword-test-{}", PlayerId::generate()));
        let path = dir.join("nested").join("players.db");
        {
            let store = SqliteStore::open_at(&path).unwrap();
            store.save_player(&Player::guest("Ada", Utc::now())).unwrap();
        }
        let reopened = SqliteStore::open_at(&path).unwrap();
        assert_eq!(reopened.player_count().unwrap(), 1);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            StorageError::NoDataDirectory.to_string(),
            "could not determine data directory"
        );
        let err = StorageError::MigrationFailed {
            from: 0,
            to: 2,
            reason: "x".into(),
        };
        assert_eq!(err.to_string(), "migration from v0 to v2 failed: x");
    }
}
