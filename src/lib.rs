//! gridword - multiplayer word-placement game server
//!
//! Players gather in a lobby, take turns announcing a letter and each place it
//! on a private grid. When the grids fill, every dictionary word in a row or
//! column scores.

pub mod bot;
pub mod config;
pub mod error;
pub mod game;
pub mod hub;
pub mod lobby;
pub mod server;
pub mod session;
pub mod storage;
pub mod types;

pub use error::{ErrorKind, GameError, Result};
pub use server::GameServer;
