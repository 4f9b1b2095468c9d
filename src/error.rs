//! Error taxonomy shared by the lobby, game, board and collaborator layers.
//!
//! Every failure an operation can report is a distinct [`GameError`] variant.
//! Callers match on the variant (or on its [`ErrorKind`]) instead of comparing
//! message strings.

use crate::storage::StorageError;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, GameError>;

/// Coarse classification used by transport layers to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input; retry with corrected input.
    Validation,
    /// Caller lacks the privilege or turn for this action.
    Authorization,
    /// Referenced lobby, game, player or board is absent.
    NotFound,
    /// Request collides with current state.
    Conflict,
    /// Missing, expired or unknown session.
    Unauthenticated,
    /// Unexpected failure; detail stays in the logs.
    Internal,
}

#[derive(Debug, Error)]
pub enum GameError {
    #[error("lobby not found")]
    LobbyNotFound,
    #[error("game not found")]
    GameNotFound,
    #[error("player not found")]
    PlayerNotFound,
    #[error("board not found")]
    BoardNotFound,

    #[error("player is already in the lobby")]
    AlreadyInLobby,
    #[error("player is not in the lobby")]
    NotInLobby,
    #[error("only the host can do that")]
    NotHost,
    #[error("a game is already in progress")]
    GameInProgress,
    #[error("no game in progress")]
    NoGameInProgress,
    #[error("at least {min} players are needed, found {found}")]
    InsufficientPlayers { min: usize, found: usize },

    #[error("it is not your turn")]
    NotPlayerTurn,
    #[error("invalid letter: {0:?}")]
    InvalidLetter(String),
    #[error("no letter has been announced this turn")]
    LetterNotAnnounced,
    #[error("already placed a letter this turn")]
    AlreadyPlaced,
    #[error("position ({row}, {col}) is outside the board")]
    InvalidPosition { row: usize, col: usize },
    #[error("cell ({row}, {col}) is already occupied")]
    CellOccupied { row: usize, col: usize },
    #[error("game is complete")]
    GameComplete,
    #[error("game was abandoned")]
    GameAbandoned,

    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("username already exists")]
    UsernameExists,
    #[error("invalid or expired session")]
    InvalidSession,
    #[error("player is not a bot")]
    NotBot,
    #[error("unknown bot strategy: {0}")]
    UnknownStrategy(String),

    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
}

impl GameError {
    pub fn kind(&self) -> ErrorKind {
        use GameError::*;
        match self {
            InvalidLetter(_) | InvalidPosition { .. } | InvalidConfig(_) | UnknownStrategy(_) => {
                ErrorKind::Validation
            }
            NotHost | NotPlayerTurn | AlreadyPlaced | NotBot => ErrorKind::Authorization,
            LobbyNotFound | GameNotFound | PlayerNotFound | BoardNotFound | NotInLobby => {
                ErrorKind::NotFound
            }
            AlreadyInLobby
            | GameInProgress
            | NoGameInProgress
            | InsufficientPlayers { .. }
            | LetterNotAnnounced
            | CellOccupied { .. }
            | GameComplete
            | GameAbandoned
            | UsernameExists => ErrorKind::Conflict,
            InvalidSession => ErrorKind::Unauthenticated,
            Storage(_) => ErrorKind::Internal,
        }
    }

    /// Message safe to hand to a remote caller.
    ///
    /// Internal failures are logged here with full detail and reported as a
    /// generic message.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Internal => {
                tracing::error!(error = %self, "internal error");
                "internal error".to_string()
            }
            _ => self.to_string(),
        }
    }
}
