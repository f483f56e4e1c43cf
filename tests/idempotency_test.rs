//! Tests for the at-most-once action coordinator.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use diesel::Connection;
use diesel::SqliteConnection;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use shiritori::{
    ActionType, GameEngine, GameError, GameRepository, IdempotencyCoordinator, IdempotencyStore,
    JlptLevel, NewIdempotencyRecord, NewWord,
};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Receipt {
    value: i32,
}

fn setup_db() -> (NamedTempFile, String) {
    let db_file = NamedTempFile::new().expect("Failed to create temp file");
    let db_path = db_file.path().to_str().expect("Invalid path").to_string();

    let mut conn = SqliteConnection::establish(&db_path).expect("Failed to connect");
    conn.run_pending_migrations(MIGRATIONS)
        .expect("Migrations failed");
    (db_file, db_path)
}

fn setup_coordinator() -> (NamedTempFile, IdempotencyCoordinator) {
    let (db_file, db_path) = setup_db();
    let store = IdempotencyStore::new(db_path).expect("Failed to create store");
    (db_file, IdempotencyCoordinator::new(store))
}

#[test]
fn test_missing_key_runs_every_time() {
    let (_db, coordinator) = setup_coordinator();
    let runs = AtomicUsize::new(0);

    for key in [None, Some(""), Some("  ")] {
        coordinator
            .execute("alice", 1, ActionType::Turn, key, || {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(Receipt { value: 7 })
            })
            .expect("Action failed");
    }
    assert_eq!(runs.load(Ordering::SeqCst), 3);
}

#[test]
fn test_repeated_key_replays_the_cached_response() {
    let (_db, coordinator) = setup_coordinator();
    let runs = AtomicUsize::new(0);

    let first: Receipt = coordinator
        .execute("alice", 1, ActionType::Turn, Some("req-1"), || {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok(Receipt { value: 7 })
        })
        .expect("Action failed");

    let second: Receipt = coordinator
        .execute("alice", 1, ActionType::Turn, Some("req-1"), || {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok(Receipt { value: 99 })
        })
        .expect("Replay failed");

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(first, second);
}

#[test]
fn test_distinct_keys_run_independently() {
    let (_db, coordinator) = setup_coordinator();
    let runs = AtomicUsize::new(0);

    for key in ["req-1", "req-2"] {
        coordinator
            .execute("alice", 1, ActionType::Turn, Some(key), || {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(Receipt { value: 7 })
            })
            .expect("Action failed");
    }
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[test]
fn test_racing_callers_share_one_execution() {
    let (_db, coordinator) = setup_coordinator();
    let coordinator = Arc::new(coordinator);
    let runs = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..2 {
        let coordinator = Arc::clone(&coordinator);
        let runs = Arc::clone(&runs);
        handles.push(thread::spawn(move || {
            coordinator.execute("alice", 1, ActionType::Turn, Some("req-race"), || {
                runs.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(50));
                Ok(Receipt { value: 7 })
            })
        }));
    }

    let results: Vec<Receipt> = handles
        .into_iter()
        .map(|h| h.join().expect("Thread panicked").expect("Action failed"))
        .collect();

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(results[0], results[1]);
}

#[test]
fn test_pending_claim_exhausts_the_polling_budget() {
    let (_db, db_path) = setup_db();
    let store = IdempotencyStore::new(db_path).expect("Failed to create store");
    let coordinator = IdempotencyCoordinator::new(store.clone());

    // Claim the key directly and never complete it, as if the owning
    // caller were still mid-action.
    let now = Utc::now().naive_utc();
    store
        .try_claim(NewIdempotencyRecord::claim(
            "alice".to_string(),
            1,
            ActionType::Turn,
            "req-hung".to_string(),
            now,
            now + chrono::Duration::seconds(180),
        ))
        .expect("Claim failed");

    let runs = AtomicUsize::new(0);
    let err = coordinator
        .execute::<Receipt, _>("alice", 1, ActionType::Turn, Some("req-hung"), || {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok(Receipt { value: 7 })
        })
        .expect_err("Waiter should give up");

    assert!(matches!(err, GameError::ActionInProgress));
    // The action must never run while another caller holds the claim.
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[test]
fn test_failed_action_releases_the_claim() {
    let (_db, coordinator) = setup_coordinator();
    let runs = AtomicUsize::new(0);

    let err = coordinator
        .execute::<Receipt, _>("alice", 1, ActionType::Turn, Some("req-fail"), || {
            runs.fetch_add(1, Ordering::SeqCst);
            Err(GameError::OpponentStuck)
        })
        .expect_err("Action error should surface");
    assert!(matches!(err, GameError::OpponentStuck));

    // The key is free again, so a retry executes the action afresh.
    coordinator
        .execute("alice", 1, ActionType::Turn, Some("req-fail"), || {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok(Receipt { value: 7 })
        })
        .expect("Retry failed");
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[test]
fn test_expired_response_is_swept_and_rerun() {
    let (_db, db_path) = setup_db();
    let store = IdempotencyStore::new(db_path).expect("Failed to create store");
    let coordinator = IdempotencyCoordinator::with_ttl(store, 0);
    let runs = AtomicUsize::new(0);

    coordinator
        .execute("alice", 1, ActionType::Turn, Some("req-ttl"), || {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok(Receipt { value: 7 })
        })
        .expect("Action failed");

    thread::sleep(Duration::from_millis(50));

    coordinator
        .execute("alice", 1, ActionType::Turn, Some("req-ttl"), || {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok(Receipt { value: 8 })
        })
        .expect("Rerun failed");
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[test]
fn test_replayed_turn_does_not_advance_the_game() {
    let (_db, db_path) = setup_db();
    let repo = GameRepository::new(db_path.clone()).expect("Failed to create repository");
    let engine = GameEngine::new(repo);
    let store = IdempotencyStore::new(db_path).expect("Failed to create store");
    let coordinator = IdempotencyCoordinator::new(store);

    for (surface, reading) in [("しりとり", "しりとり"), ("りんご", "りんご"), ("ごりら", "ごりら")] {
        let word = NewWord::new(
            JlptLevel::N5,
            surface.to_string(),
            reading.to_string(),
            String::new(),
        )
        .expect("Invalid word");
        engine.repository().insert_word(word).expect("Insert failed");
    }

    let game_id = *engine
        .start_game("alice", JlptLevel::N5)
        .expect("Start failed")
        .game_id();

    let first = coordinator
        .execute("alice", game_id, ActionType::Turn, Some("turn-1"), || {
            engine.play_turn(game_id, "りんご")
        })
        .expect("Turn failed");

    let second = coordinator
        .execute("alice", game_id, ActionType::Turn, Some("turn-1"), || {
            engine.play_turn(game_id, "りんご")
        })
        .expect("Replay failed");

    assert_eq!(first, second);
    // Seed word plus one human/opponent exchange, not two.
    assert_eq!(engine.repository().count_turns(game_id).expect("Count failed"), 3);
}
