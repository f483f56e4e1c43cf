//! Command-line interface for shiritori.

use clap::{Parser, Subcommand};
use shiritori::JlptLevel;

/// Shiritori - Japanese word-chain game engine
#[derive(Parser, Debug)]
#[command(name = "shiritori")]
#[command(about = "Play shiritori against an automated opponent", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to the SQLite database file (created if it doesn't exist)
    #[arg(long, default_value = "shiritori.db", env = "DATABASE_URL")]
    pub database: String,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Play an interactive game on stdin
    Play {
        /// Player name the game is recorded under
        #[arg(short, long, default_value = "player")]
        player: String,

        /// Difficulty tier filter (N1..N5, or ANY)
        #[arg(short, long, default_value = "ANY")]
        level: JlptLevel,
    },

    /// Purge expired idempotency records
    Sweep,
}
