//! Database persistence layer for words, games, turns, and idempotency
//! records.

mod error;
mod idempotency;
mod models;
mod repository;
mod schema; // Diesel generated schema - internal use only

pub use error::{DbError, DbErrorKind};
pub use idempotency::IdempotencyStore;
pub use models::{
    ActionType, Game, GameStatus, GameTurn, IdempotencyRecord, JlptLevel, NewGame, NewGameTurn,
    NewIdempotencyRecord, NewWord, PASS_ALLOWANCE, Speaker, Word,
};
pub use repository::GameRepository;
