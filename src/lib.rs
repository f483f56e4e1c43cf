//! Shiritori library - word-chain game engine with an idempotent turn
//! protocol.
//!
//! # Architecture
//!
//! - **kana**: pure phonetic normalization (script conversion, effective
//!   start/end characters, seion folding)
//! - **chain**: decides whether one word may legally follow another
//! - **dictionary / opponent**: free-text resolution and automated reply
//!   selection against the word store
//! - **engine**: end-to-end turn resolution with scoring and win/loss
//!   transitions
//! - **idempotency**: at-most-once execution of state-mutating actions
//!   under client retries
//! - **db**: diesel/SQLite persistence for all of the above
//!
//! # Example
//!
//! ```no_run
//! use shiritori::{GameEngine, GameRepository, JlptLevel};
//!
//! # fn example() -> anyhow::Result<()> {
//! let repository = GameRepository::new("shiritori.db".to_string())?;
//! let engine = GameEngine::new(repository);
//!
//! let start = engine.start_game("alice", JlptLevel::N5)?;
//! let outcome = engine.play_turn(*start.game_id(), "りんご")?;
//! println!("{}", outcome.message());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Private module declarations
mod chain;
mod db;
mod dictionary;
mod engine;
mod error;
mod idempotency;
pub mod kana;
mod opponent;

// Crate-level exports - persistence
pub use db::{
    ActionType, DbError, DbErrorKind, Game, GameRepository, GameStatus, GameTurn,
    IdempotencyRecord, IdempotencyStore, JlptLevel, NewGame, NewGameTurn, NewIdempotencyRecord,
    NewWord, PASS_ALLOWANCE, Speaker, Word,
};

// Crate-level exports - validation
pub use chain::validate_connection;

// Crate-level exports - lookup and opponent
pub use dictionary::WordFinder;
pub use opponent::OpponentSelector;

// Crate-level exports - engine
pub use engine::{
    FinishOutcome, GameEngine, GameStartOutcome, SEED_WORD, TIME_LIMIT_SECONDS, TurnOutcome,
    WordSummary,
};

// Crate-level exports - errors
pub use error::GameError;

// Crate-level exports - idempotency
pub use idempotency::{DEFAULT_TTL_SECONDS, IdempotencyCoordinator};
