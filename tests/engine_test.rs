//! End-to-end engine tests driving whole turns against a real database.

use std::thread::sleep;
use std::time::Duration;

use diesel::Connection;
use diesel::RunQueryDsl;
use diesel::SqliteConnection;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tempfile::NamedTempFile;

use shiritori::{
    GameEngine, GameError, GameRepository, GameStatus, JlptLevel, NewWord, PASS_ALLOWANCE,
    SEED_WORD, Speaker,
};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

fn setup_engine() -> (NamedTempFile, GameEngine) {
    let db_file = NamedTempFile::new().expect("Failed to create temp file");
    let db_path = db_file.path().to_str().expect("Invalid path").to_string();

    let mut conn = SqliteConnection::establish(&db_path).expect("Failed to connect");
    conn.run_pending_migrations(MIGRATIONS)
        .expect("Migrations failed");

    let repo = GameRepository::new(db_path).expect("Failed to create repository");
    (db_file, GameEngine::new(repo))
}

fn insert(engine: &GameEngine, level: JlptLevel, surface: &str, reading: &str) {
    let word = NewWord::new(
        level,
        surface.to_string(),
        reading.to_string(),
        String::new(),
    )
    .expect("Invalid word");
    engine.repository().insert_word(word).expect("Insert failed");
}

/// Seeds the opening word plus a minimal chain: しりとり → りんご → ごりら.
fn seed_basic_chain(engine: &GameEngine) {
    insert(engine, JlptLevel::N5, "しりとり", "しりとり");
    insert(engine, JlptLevel::N5, "りんご", "りんご");
    insert(engine, JlptLevel::N5, "ごりら", "ごりら");
}

#[test]
fn test_start_game_seeds_the_opening_word() {
    let (_db, engine) = setup_engine();
    seed_basic_chain(&engine);

    let outcome = engine
        .start_game("alice", JlptLevel::N5)
        .expect("Start failed");
    assert_eq!(outcome.seed_word(), SEED_WORD);
    assert_eq!(*outcome.level(), JlptLevel::N5);

    let turns = engine
        .repository()
        .list_turns(*outcome.game_id())
        .expect("List failed");
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].word_text(), SEED_WORD);
    assert_eq!(*turns[0].speaker(), Speaker::Opponent);
}

#[test]
fn test_play_turn_happy_path() {
    let (_db, engine) = setup_engine();
    seed_basic_chain(&engine);
    let game_id = *engine
        .start_game("alice", JlptLevel::N5)
        .expect("Start failed")
        .game_id();

    let outcome = engine.play_turn(game_id, "りんご").expect("Turn failed");

    assert_eq!(*outcome.status(), GameStatus::Playing);
    assert_eq!(*outcome.score(), 26);
    assert_eq!(*outcome.current_combo(), 1);
    assert_eq!(
        outcome
            .player_word()
            .as_ref()
            .expect("Player word missing")
            .surface(),
        "りんご"
    );
    assert_eq!(
        outcome
            .opponent_word()
            .as_ref()
            .expect("Opponent word missing")
            .surface(),
        "ごりら"
    );
    assert_eq!(engine.repository().count_turns(game_id).expect("Count failed"), 3);
}

#[test]
fn test_unknown_word_leaves_state_untouched() {
    let (_db, engine) = setup_engine();
    seed_basic_chain(&engine);
    let game_id = *engine
        .start_game("alice", JlptLevel::N5)
        .expect("Start failed")
        .game_id();

    let err = engine
        .play_turn(game_id, "たぬき")
        .expect_err("Unknown word should fail");
    assert!(matches!(err, GameError::WordNotFound { .. }));

    let game = engine
        .repository()
        .load_game(game_id)
        .expect("Load failed")
        .expect("Game missing");
    assert_eq!(*game.score(), 0);
    assert_eq!(engine.repository().count_turns(game_id).expect("Count failed"), 1);
}

#[test]
fn test_chain_mismatch_is_rejected() {
    let (_db, engine) = setup_engine();
    seed_basic_chain(&engine);
    insert(&engine, JlptLevel::N5, "すいか", "すいか");
    let game_id = *engine
        .start_game("alice", JlptLevel::N5)
        .expect("Start failed")
        .game_id();

    let err = engine
        .play_turn(game_id, "すいか")
        .expect_err("Mismatch should fail");
    assert!(matches!(err, GameError::ChainMismatch { .. }));
}

#[test]
fn test_duplicate_word_is_rejected() {
    let (_db, engine) = setup_engine();
    seed_basic_chain(&engine);
    insert(&engine, JlptLevel::N5, "りす", "りす");
    insert(&engine, JlptLevel::N5, "すし", "すし");
    let game_id = *engine
        .start_game("alice", JlptLevel::N5)
        .expect("Start failed")
        .game_id();

    // しりとり → りす → すし, so しりとり chains but was already used.
    engine
        .repository()
        .append_turn(game_id, Speaker::Human, "りす")
        .expect("Append failed");
    engine
        .repository()
        .append_turn(game_id, Speaker::Opponent, "すし")
        .expect("Append failed");

    let err = engine
        .play_turn(game_id, "しりとり")
        .expect_err("Duplicate should fail");
    assert!(matches!(err, GameError::DuplicateWord { .. }));
}

#[test]
fn test_raw_input_ending_in_forbidden_mora_loses_immediately() {
    let (_db, engine) = setup_engine();
    seed_basic_chain(&engine);
    let game_id = *engine
        .start_game("alice", JlptLevel::N5)
        .expect("Start failed")
        .game_id();

    // Not in the dictionary; the raw-text check fires before lookup.
    let outcome = engine.play_turn(game_id, "みかん").expect("Turn failed");
    assert_eq!(*outcome.status(), GameStatus::GameOver);
    assert_eq!(*outcome.score(), 0);
    assert!(outcome.player_word().is_none());
}

#[test]
fn test_resolved_word_ending_in_forbidden_mora_scores_then_loses() {
    let (_db, engine) = setup_engine();
    seed_basic_chain(&engine);
    insert(&engine, JlptLevel::N5, "うみ", "うみ");
    insert(&engine, JlptLevel::N5, "蜜柑", "みかん");
    let game_id = *engine
        .start_game("alice", JlptLevel::N5)
        .expect("Start failed")
        .game_id();

    engine
        .repository()
        .append_turn(game_id, Speaker::Opponent, "うみ")
        .expect("Append failed");

    let outcome = engine.play_turn(game_id, "蜜柑").expect("Turn failed");
    assert_eq!(*outcome.status(), GameStatus::GameOver);
    assert_eq!(*outcome.score(), 26);
    assert_eq!(
        outcome
            .player_word()
            .as_ref()
            .expect("Player word missing")
            .surface(),
        "蜜柑"
    );
}

#[test]
fn test_player_wins_when_opponent_is_exhausted() {
    let (_db, engine) = setup_engine();
    insert(&engine, JlptLevel::N5, "しりとり", "しりとり");
    insert(&engine, JlptLevel::N5, "りんご", "りんご");
    let game_id = *engine
        .start_game("alice", JlptLevel::N5)
        .expect("Start failed")
        .game_id();

    let outcome = engine.play_turn(game_id, "りんご").expect("Turn failed");
    assert_eq!(*outcome.status(), GameStatus::Win);
    assert_eq!(*outcome.score(), 26);
    assert!(outcome.opponent_word().is_none());
}

#[test]
fn test_pass_turn_spends_a_pass() {
    let (_db, engine) = setup_engine();
    seed_basic_chain(&engine);
    insert(&engine, JlptLevel::N5, "りす", "りす");
    let game_id = *engine
        .start_game("alice", JlptLevel::N5)
        .expect("Start failed")
        .game_id();

    let outcome = engine.pass_turn(game_id).expect("Pass failed");
    assert_eq!(*outcome.passes_left(), PASS_ALLOWANCE - 1);
    assert!(outcome.player_word().is_none());
    assert!(outcome.opponent_word().is_some());
    assert_eq!(*outcome.status(), GameStatus::Playing);
}

#[test]
fn test_pass_budget_is_exhausted_after_three() {
    let (_db, engine) = setup_engine();
    insert(&engine, JlptLevel::N5, "しりとり", "しりとり");
    insert(&engine, JlptLevel::N5, "りす", "りす");
    insert(&engine, JlptLevel::N5, "すいか", "すいか");
    insert(&engine, JlptLevel::N5, "かさ", "かさ");
    let game_id = *engine
        .start_game("alice", JlptLevel::N5)
        .expect("Start failed")
        .game_id();

    for _ in 0..PASS_ALLOWANCE {
        engine.pass_turn(game_id).expect("Pass failed");
    }

    let err = engine.pass_turn(game_id).expect_err("Budget should be spent");
    assert!(matches!(err, GameError::NoPassesLeft));

    let game = engine
        .repository()
        .load_game(game_id)
        .expect("Load failed")
        .expect("Game missing");
    assert_eq!(*game.passes_left(), 0);
}

#[test]
fn test_failed_pass_does_not_spend_the_budget() {
    let (_db, engine) = setup_engine();
    insert(&engine, JlptLevel::N5, "しりとり", "しりとり");
    let game_id = *engine
        .start_game("alice", JlptLevel::N5)
        .expect("Start failed")
        .game_id();

    let err = engine
        .pass_turn(game_id)
        .expect_err("No continuation exists");
    assert!(matches!(err, GameError::OpponentStuck));

    let game = engine
        .repository()
        .load_game(game_id)
        .expect("Load failed")
        .expect("Game missing");
    assert_eq!(*game.passes_left(), PASS_ALLOWANCE);
}

#[test]
fn test_quit_is_idempotent() {
    let (_db, engine) = setup_engine();
    seed_basic_chain(&engine);
    let game_id = *engine
        .start_game("alice", JlptLevel::N5)
        .expect("Start failed")
        .game_id();

    let first = engine.quit_game(game_id).expect("Quit failed");
    assert_eq!(*first.status(), GameStatus::GameOver);

    let second = engine.quit_game(game_id).expect("Quit failed");
    assert_eq!(*second.status(), GameStatus::GameOver);
    assert_eq!(second.message(), "Game is already over.");
}

#[test]
fn test_play_after_finish_fails() {
    let (_db, engine) = setup_engine();
    seed_basic_chain(&engine);
    let game_id = *engine
        .start_game("alice", JlptLevel::N5)
        .expect("Start failed")
        .game_id();

    engine.timeout_game(game_id).expect("Timeout failed");

    let err = engine
        .play_turn(game_id, "りんご")
        .expect_err("Finished games take no turns");
    assert!(matches!(err, GameError::GameFinished));
}

#[test]
fn test_missing_game_is_reported() {
    let (_db, engine) = setup_engine();
    let err = engine.play_turn(999, "りんご").expect_err("No such game");
    assert!(matches!(err, GameError::GameNotFound { game_id: 999 }));
}

#[test]
fn test_expired_turn_clock_ends_the_game() {
    let db_file = NamedTempFile::new().expect("Failed to create temp file");
    let db_path = db_file.path().to_str().expect("Invalid path").to_string();
    let mut conn = SqliteConnection::establish(&db_path).expect("Failed to connect");
    conn.run_pending_migrations(MIGRATIONS)
        .expect("Migrations failed");
    let repo = GameRepository::new(db_path).expect("Failed to create repository");
    let engine = GameEngine::with_time_limit(repo, 0);

    seed_basic_chain(&engine);
    let game_id = *engine
        .start_game("alice", JlptLevel::N5)
        .expect("Start failed")
        .game_id();

    sleep(Duration::from_millis(1100));

    let outcome = engine.play_turn(game_id, "りんご").expect("Turn failed");
    assert_eq!(*outcome.status(), GameStatus::TimeOver);
    assert!(outcome.player_word().is_none());
}

#[test]
fn test_failed_turn_rolls_back_completely() {
    let db_file = NamedTempFile::new().expect("Failed to create temp file");
    let db_path = db_file.path().to_str().expect("Invalid path").to_string();
    let mut conn = SqliteConnection::establish(&db_path).expect("Failed to connect");
    conn.run_pending_migrations(MIGRATIONS)
        .expect("Migrations failed");
    let repo = GameRepository::new(db_path).expect("Failed to create repository");
    let engine = GameEngine::new(repo);

    seed_basic_chain(&engine);
    let game_id = *engine
        .start_game("alice", JlptLevel::N5)
        .expect("Start failed")
        .game_id();

    // Occupy turn number 4 so that, after the human turn lands as number
    // 3, the opponent's reply collides on the (game_id, turn_number)
    // unique index and the whole turn fails mid-write.
    diesel::sql_query(format!(
        "INSERT INTO game_turns (game_id, turn_number, speaker, word_text, created_at) \
         VALUES ({game_id}, 4, 'OPPONENT', 'しりとり', CURRENT_TIMESTAMP)"
    ))
    .execute(&mut conn)
    .expect("Insert failed");

    let err = engine
        .play_turn(game_id, "りんご")
        .expect_err("Reply write should fail");
    assert!(matches!(err, GameError::Db(_)));

    // Nothing from the failed turn survives: no human turn row, no score.
    assert!(
        !engine
            .repository()
            .turn_exists_with_word(game_id, "りんご")
            .expect("Query failed")
    );
    let game = engine
        .repository()
        .load_game(game_id)
        .expect("Load failed")
        .expect("Game missing");
    assert_eq!(*game.score(), 0);
    assert_eq!(*game.current_combo(), 0);

    // With the obstruction gone the same word plays cleanly instead of
    // tripping the duplicate-use rule.
    diesel::sql_query(format!(
        "DELETE FROM game_turns WHERE game_id = {game_id} AND turn_number = 4"
    ))
    .execute(&mut conn)
    .expect("Delete failed");

    let outcome = engine.play_turn(game_id, "りんご").expect("Retry failed");
    assert_eq!(*outcome.status(), GameStatus::Playing);
    assert_eq!(*outcome.score(), 26);
}

#[test]
fn test_unrestricted_game_scores_by_word_tier() {
    let (_db, engine) = setup_engine();
    insert(&engine, JlptLevel::N5, "しりとり", "しりとり");
    insert(&engine, JlptLevel::N3, "りんご", "りんご");
    insert(&engine, JlptLevel::N5, "ごりら", "ごりら");
    let game_id = *engine
        .start_game("alice", JlptLevel::Any)
        .expect("Start failed")
        .game_id();

    let outcome = engine.play_turn(game_id, "りんご").expect("Turn failed");
    assert_eq!(*outcome.score(), 34);
}
