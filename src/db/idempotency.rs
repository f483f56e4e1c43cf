//! Storage for idempotency claims.
//!
//! The unique index over `(player, game_id, action_type, idempotency_key)`
//! is the arbiter of claim races: whichever insert the database accepts
//! owns the key, and every other caller sees a conflict.

use chrono::NaiveDateTime;
use diesel::prelude::*;
use tracing::{debug, info, instrument};

use crate::db::{ActionType, DbError, IdempotencyRecord, NewIdempotencyRecord, schema};

/// Database store for idempotency records.
#[derive(Debug, Clone)]
pub struct IdempotencyStore {
    db_path: String,
}

impl IdempotencyStore {
    /// Creates a new store connected to the database at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the path is invalid.
    #[instrument(skip(db_path), fields(db_path = %db_path))]
    pub fn new(db_path: String) -> Result<Self, DbError> {
        info!(path = %db_path, "Creating IdempotencyStore");
        Ok(Self { db_path })
    }

    fn connection(&self) -> Result<SqliteConnection, DbError> {
        let mut conn = SqliteConnection::establish(&self.db_path)
            .map_err(|e| DbError::new(format!("Failed to connect to '{}': {}", self.db_path, e)))?;
        diesel::sql_query("PRAGMA busy_timeout = 5000;").execute(&mut conn)?;
        Ok(conn)
    }

    /// Attempts to atomically claim an action key.
    ///
    /// # Errors
    ///
    /// Returns a [`DbError`] whose `is_conflict()` is true when another
    /// caller already holds the key, or a plain [`DbError`] on other
    /// database failures.
    #[instrument(skip(self, claim))]
    pub fn try_claim(&self, claim: NewIdempotencyRecord) -> Result<IdempotencyRecord, DbError> {
        debug!("Claiming idempotency key");
        let mut conn = self.connection()?;

        let record = diesel::insert_into(schema::idempotency_records::table)
            .values(&claim)
            .returning(IdempotencyRecord::as_returning())
            .get_result(&mut conn)?;

        debug!(record_id = record.id(), "Claim acquired");
        Ok(record)
    }

    /// Finds the record for an action key, completed or not.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn find(
        &self,
        player: &str,
        game_id: i32,
        action_type: ActionType,
        idempotency_key: &str,
    ) -> Result<Option<IdempotencyRecord>, DbError> {
        let mut conn = self.connection()?;

        let record = schema::idempotency_records::table
            .filter(schema::idempotency_records::player.eq(player))
            .filter(schema::idempotency_records::game_id.eq(game_id))
            .filter(schema::idempotency_records::action_type.eq(action_type))
            .filter(schema::idempotency_records::idempotency_key.eq(idempotency_key))
            .select(IdempotencyRecord::as_select())
            .first::<IdempotencyRecord>(&mut conn)
            .optional()?;

        Ok(record)
    }

    /// Attaches the serialized response to a claim and refreshes its expiry.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self, payload))]
    pub fn complete(
        &self,
        record_id: i32,
        payload: &str,
        now: NaiveDateTime,
        expire_at: NaiveDateTime,
    ) -> Result<(), DbError> {
        debug!(record_id = %record_id, "Completing claim");
        let mut conn = self.connection()?;

        diesel::update(
            schema::idempotency_records::table.filter(schema::idempotency_records::id.eq(record_id)),
        )
        .set((
            schema::idempotency_records::response_payload.eq(Some(payload)),
            schema::idempotency_records::updated_at.eq(now),
            schema::idempotency_records::expire_at.eq(expire_at),
        ))
        .execute(&mut conn)?;

        Ok(())
    }

    /// Deletes a claim so the action can be retried immediately.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn release(&self, record_id: i32) -> Result<(), DbError> {
        debug!(record_id = %record_id, "Releasing claim");
        let mut conn = self.connection()?;

        diesel::delete(
            schema::idempotency_records::table.filter(schema::idempotency_records::id.eq(record_id)),
        )
        .execute(&mut conn)?;

        Ok(())
    }

    /// Deletes every record that expired before the given instant.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn delete_expired(&self, before: NaiveDateTime) -> Result<usize, DbError> {
        let mut conn = self.connection()?;

        let deleted = diesel::delete(
            schema::idempotency_records::table
                .filter(schema::idempotency_records::expire_at.lt(before)),
        )
        .execute(&mut conn)?;

        if deleted > 0 {
            debug!(count = deleted, "Expired idempotency records purged");
        }
        Ok(deleted)
    }
}
