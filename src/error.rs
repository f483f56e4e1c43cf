//! Domain error types.
//!
//! Input errors and rule violations never mutate game state; terminal
//! transitions (timeout, forbidden mora, opponent exhausted) are reported
//! as successful game-over outcomes, not as errors. Infrastructure errors
//! propagate unmodified.

use derive_more::{Display, Error, From};

use crate::db::DbError;

/// Errors surfaced by the game engine and the idempotency coordinator.
#[derive(Debug, Display, Error, From)]
pub enum GameError {
    /// The submitted text resolved to no dictionary entry.
    #[display("word not in the dictionary: {input}")]
    WordNotFound {
        /// The raw submitted text.
        #[error(not(source))]
        input: String,
    },

    /// A dictionary word was created with an empty reading.
    #[display("word has an empty reading: {surface}")]
    EmptyReading {
        /// Surface form of the rejected word.
        #[error(not(source))]
        surface: String,
    },

    /// The submitted word does not phonetically continue the chain.
    #[display("word does not connect: {previous} -> {current}")]
    ChainMismatch {
        /// Reading of the previous word in the chain.
        previous: String,
        /// Reading of the submitted word.
        current: String,
    },

    /// The word has already been played in this game.
    #[display("word already used in this game: {word}")]
    DuplicateWord {
        /// Surface form of the repeated word.
        #[error(not(source))]
        word: String,
    },

    /// No game exists with the given id.
    #[display("game not found: {game_id}")]
    GameNotFound {
        /// The requested game id.
        #[error(not(source))]
        game_id: i32,
    },

    /// The game has already reached a terminal status.
    #[display("game is already finished")]
    GameFinished,

    /// The pass budget is exhausted.
    #[display("no passes left")]
    NoPassesLeft,

    /// The game has no recorded turn to connect against.
    #[display("no prior word recorded for this game")]
    NoPriorWord,

    /// The opponent found no continuation for a passed turn.
    #[display("opponent has no word to continue with")]
    OpponentStuck,

    /// An identical action is still being processed; retry later.
    #[display("identical action is still in progress, retry later")]
    ActionInProgress,

    /// The game row changed underneath this update.
    #[display("game was modified concurrently, reload and retry")]
    SaveConflict,

    /// Cached response payload could not be serialized or deserialized.
    #[display("idempotency payload serialization failed: {_0}")]
    #[from]
    Serialization(serde_json::Error),

    /// Database failure.
    #[display("{_0}")]
    #[from]
    Db(DbError),
}

// `diesel::Connection::transaction` requires the closure's error type to
// absorb raw diesel errors.
impl From<diesel::result::Error> for GameError {
    fn from(err: diesel::result::Error) -> Self {
        Self::Db(err.into())
    }
}

impl GameError {
    /// True for user-correctable failures that leave the game untouched.
    pub fn is_rule_violation(&self) -> bool {
        matches!(
            self,
            Self::WordNotFound { .. }
                | Self::ChainMismatch { .. }
                | Self::DuplicateWord { .. }
                | Self::GameFinished
                | Self::NoPassesLeft
                | Self::NoPriorWord
                | Self::OpponentStuck
        )
    }
}
