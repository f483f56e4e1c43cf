//! At-most-once execution of state-mutating actions.
//!
//! Wraps an engine entry point keyed by `(player, game, action, client
//! key)`. The first caller to claim the key runs the action and caches the
//! serialized response; racing duplicates wait for that response and
//! replay it verbatim. The wrapped action is never executed twice for one
//! key: a waiter that exhausts its polling budget fails with
//! [`GameError::ActionInProgress`] instead of re-running it.

use std::thread;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};

use crate::db::{ActionType, IdempotencyStore, NewIdempotencyRecord};
use crate::error::GameError;

/// How long a completed response stays replayable.
pub const DEFAULT_TTL_SECONDS: i64 = 180;

/// Interval between polls while another caller holds the claim.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(30);
/// Polling attempts before giving up (roughly 600ms in total).
const WAIT_POLL_ATTEMPTS: u32 = 20;

/// Deduplicating wrapper around state-mutating actions.
#[derive(Debug, Clone)]
pub struct IdempotencyCoordinator {
    store: IdempotencyStore,
    ttl_seconds: i64,
}

impl IdempotencyCoordinator {
    /// Creates a coordinator with the default 180 second response TTL.
    #[instrument(skip(store))]
    pub fn new(store: IdempotencyStore) -> Self {
        Self::with_ttl(store, DEFAULT_TTL_SECONDS)
    }

    /// Creates a coordinator with a custom response TTL.
    #[instrument(skip(store))]
    pub fn with_ttl(store: IdempotencyStore, ttl_seconds: i64) -> Self {
        Self { store, ttl_seconds }
    }

    /// Executes `action` at most once per `(player, game, action type,
    /// key)`.
    ///
    /// Without a key the action runs directly on every call; the caller
    /// has accepted at-least-once semantics.
    ///
    /// # Errors
    ///
    /// Returns the action's own error when this caller ran it, or
    /// [`GameError::ActionInProgress`] when a racing caller holds the claim
    /// and did not finish within the polling budget.
    #[instrument(skip(self, action), fields(player = %player, game_id = %game_id, action_type = %action_type))]
    pub fn execute<T, F>(
        &self,
        player: &str,
        game_id: i32,
        action_type: ActionType,
        key: Option<&str>,
        action: F,
    ) -> Result<T, GameError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, GameError>,
    {
        let Some(key) = key.map(str::trim).filter(|k| !k.is_empty()) else {
            debug!("No idempotency key, running action directly");
            return action();
        };

        let now = Utc::now().naive_utc();
        // Best-effort sweep; a failure here must not block the action.
        if let Err(e) = self.store.delete_expired(now) {
            warn!(error = %e, "Expired record sweep failed");
        }

        if let Some(record) = self.store.find(player, game_id, action_type, key)? {
            if let Some(payload) = record.response_payload() {
                debug!(record_id = record.id(), "Replaying cached response");
                return Ok(serde_json::from_str(payload)?);
            }
        }

        let expire_at = now + chrono::Duration::seconds(self.ttl_seconds);
        let claim = NewIdempotencyRecord::claim(
            player.to_string(),
            game_id,
            action_type,
            key.to_string(),
            now,
            expire_at,
        );

        let record = match self.store.try_claim(claim) {
            Ok(record) => record,
            Err(e) if e.is_conflict() => {
                debug!("Claim lost, waiting for the winner's response");
                return self.wait_for_response(player, game_id, action_type, key);
            }
            Err(e) => return Err(e.into()),
        };

        match action() {
            Ok(response) => {
                let payload = serde_json::to_string(&response)?;
                let completed_at = Utc::now().naive_utc();
                self.store.complete(
                    *record.id(),
                    &payload,
                    completed_at,
                    completed_at + chrono::Duration::seconds(self.ttl_seconds),
                )?;
                info!(record_id = record.id(), "Action completed and cached");
                Ok(response)
            }
            Err(e) => {
                // Drop the claim so an immediate retry gets a fresh run.
                if let Err(release_err) = self.store.release(*record.id()) {
                    warn!(error = %release_err, "Failed to release claim after action failure");
                }
                Err(e)
            }
        }
    }

    /// Polls for the claim owner's cached response, bounded in time.
    fn wait_for_response<T: DeserializeOwned>(
        &self,
        player: &str,
        game_id: i32,
        action_type: ActionType,
        key: &str,
    ) -> Result<T, GameError> {
        for _ in 0..WAIT_POLL_ATTEMPTS {
            let Some(record) = self.store.find(player, game_id, action_type, key)? else {
                // The owner failed and released the claim; the caller may
                // retry, but this invocation must not run the action.
                break;
            };

            if let Some(payload) = record.response_payload() {
                debug!(record_id = record.id(), "Winner's response arrived");
                return Ok(serde_json::from_str(payload)?);
            }

            thread::sleep(WAIT_POLL_INTERVAL);
        }

        Err(GameError::ActionInProgress)
    }
}
