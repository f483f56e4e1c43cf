//! Shiritori - interactive word-chain game CLI.

#![warn(missing_docs)]

mod cli;

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use diesel::{Connection, SqliteConnection};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::info;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use shiritori::{
    GameEngine, GameRepository, IdempotencyStore, JlptLevel, NewWord, TurnOutcome,
};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// A handful of chain-friendly words so a fresh database is playable.
/// Real dictionaries are imported out of band.
const DEMO_WORDS: &[(&str, &str, &str, JlptLevel)] = &[
    ("しりとり", "しりとり", "word-chain game", JlptLevel::Any),
    ("りんご", "りんご", "apple", JlptLevel::N5),
    ("りす", "りす", "squirrel", JlptLevel::N4),
    ("ごりら", "ごりら", "gorilla", JlptLevel::N5),
    ("らっぱ", "らっぱ", "trumpet", JlptLevel::N3),
    ("ぱせり", "ぱせり", "parsley", JlptLevel::N3),
    ("すいか", "すいか", "watermelon", JlptLevel::N5),
    ("かめ", "かめ", "turtle", JlptLevel::N5),
    ("めだか", "めだか", "killifish", JlptLevel::N3),
    ("かさ", "かさ", "umbrella", JlptLevel::N5),
    ("さくら", "さくら", "cherry blossom", JlptLevel::N5),
    ("らくだ", "らくだ", "camel", JlptLevel::N4),
    ("だちょう", "だちょう", "ostrich", JlptLevel::N3),
    ("うみ", "うみ", "sea", JlptLevel::N5),
    ("みそ", "みそ", "miso", JlptLevel::N4),
    ("そら", "そら", "sky", JlptLevel::N5),
    ("タクシー", "タクシー", "taxi", JlptLevel::N5),
    ("コーヒー", "コーヒー", "coffee", JlptLevel::N5),
    ("ひこうき", "ひこうき", "airplane", JlptLevel::N5),
    ("きつね", "きつね", "fox", JlptLevel::N4),
    ("ねこ", "ねこ", "cat", JlptLevel::N5),
    ("こま", "こま", "spinning top", JlptLevel::N4),
    ("まど", "まど", "window", JlptLevel::N5),
    ("ドア", "ドア", "door", JlptLevel::N5),
    ("あめ", "あめ", "rain", JlptLevel::N5),
];

fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    run_migrations(&cli.database)?;

    match cli.command {
        Command::Play { player, level } => play(&cli.database, &player, level),
        Command::Sweep => sweep(&cli.database),
    }
}

fn run_migrations(db_path: &str) -> Result<()> {
    let mut conn = SqliteConnection::establish(db_path)
        .with_context(|| format!("failed to open database '{}'", db_path))?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow!("migrations failed: {}", e))?;
    Ok(())
}

/// Run an interactive game on stdin.
fn play(db_path: &str, player: &str, level: JlptLevel) -> Result<()> {
    let repository = GameRepository::new(db_path.to_string())?;
    seed_demo_words(&repository)?;

    let engine = GameEngine::new(repository);
    let start = engine.start_game(player, level)?;
    let game_id = *start.game_id();

    println!("{}", start.message());
    println!("Type a word in kana, 'pass' to pass, or 'quit' to give up.");

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            // EOF counts as giving up.
            let outcome = engine.quit_game(game_id)?;
            println!("{}", outcome.message());
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        if input == "quit" {
            let outcome = engine.quit_game(game_id)?;
            println!("{} Final score: {}.", outcome.message(), outcome.score());
            break;
        }

        let result = if input == "pass" {
            engine.pass_turn(game_id)
        } else {
            engine.play_turn(game_id, input)
        };

        match result {
            Ok(outcome) => {
                print_outcome(&outcome);
                if outcome.status().is_terminal() {
                    break;
                }
            }
            Err(e) if e.is_rule_violation() => println!("{}", e),
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

fn print_outcome(outcome: &TurnOutcome) {
    if let Some(word) = outcome.opponent_word() {
        println!("{} ({})", word.surface(), word.reading());
    }
    println!(
        "[score {} | combo {} | passes {}] {}",
        outcome.score(),
        outcome.current_combo(),
        outcome.passes_left(),
        outcome.message()
    );
}

/// Purge expired idempotency records (normally driven by a scheduler).
fn sweep(db_path: &str) -> Result<()> {
    let store = IdempotencyStore::new(db_path.to_string())?;
    let deleted = store.delete_expired(chrono::Utc::now().naive_utc())?;
    println!("Purged {} expired idempotency records.", deleted);
    Ok(())
}

fn seed_demo_words(repository: &GameRepository) -> Result<()> {
    if repository.count_words()? > 0 {
        return Ok(());
    }

    info!(count = DEMO_WORDS.len(), "Seeding demo dictionary");
    for (surface, reading, meaning, level) in DEMO_WORDS {
        let word = NewWord::new(
            *level,
            surface.to_string(),
            reading.to_string(),
            meaning.to_string(),
        )?;
        repository.insert_word(word)?;
    }
    Ok(())
}
