//! End-to-end turn resolution.
//!
//! The engine is the only writer of game state. Validation failures
//! (unknown word, chain mismatch, duplicate, exhausted passes) return
//! errors before anything is persisted; terminal conditions (timeout,
//! forbidden mora, opponent exhausted) persist a finished game and are
//! reported as successful game-over outcomes.
//!
//! Each entry point performs its writes on one connection inside a single
//! transaction, so a turn's rows (human turn, opponent reply, game update)
//! commit or roll back together.
//!
//! Engine calls for the same game are expected to be serialized by the
//! caller (a per-game lock or queue); the engine is not internally
//! thread-safe across concurrent invocations on one game. The optimistic
//! version check on save turns a lost race into [`GameError::SaveConflict`]
//! rather than corrupted state.

use derive_getters::Getters;
use diesel::{Connection, SqliteConnection};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::db::{DbError, Game, GameRepository, GameStatus, JlptLevel, NewGame, Speaker, Word};
use crate::dictionary::WordFinder;
use crate::error::GameError;
use crate::opponent::OpponentSelector;
use crate::{chain, kana};

/// Seconds a player may think before the game times out.
pub const TIME_LIMIT_SECONDS: i64 = 20;

/// Every game opens with this word, spoken by the opponent, so the chain
/// always has a prior word to connect against.
pub const SEED_WORD: &str = "しりとり";

/// A word as reported back to the player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct WordSummary {
    surface: String,
    reading: String,
    meaning: String,
}

impl WordSummary {
    fn from_word(word: &Word) -> Self {
        Self {
            surface: word.surface().clone(),
            reading: word.reading().clone(),
            meaning: word.meaning().clone(),
        }
    }
}

/// Result of starting a game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct GameStartOutcome {
    game_id: i32,
    level: JlptLevel,
    seed_word: String,
    message: String,
}

/// Result of a played or passed turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct TurnOutcome {
    status: GameStatus,
    score: i32,
    current_combo: i32,
    max_combo: i32,
    passes_left: i32,
    /// The human's resolved word, when one was accepted this turn.
    player_word: Option<WordSummary>,
    /// The opponent's reply, when the game continued.
    opponent_word: Option<WordSummary>,
    message: String,
}

impl TurnOutcome {
    fn new(
        game: &Game,
        player_word: Option<WordSummary>,
        opponent_word: Option<WordSummary>,
        message: String,
    ) -> Self {
        Self {
            status: *game.status(),
            score: *game.score(),
            current_combo: *game.current_combo(),
            max_combo: *game.max_combo(),
            passes_left: *game.passes_left(),
            player_word,
            opponent_word,
            message,
        }
    }
}

/// Final summary returned by quit/timeout transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct FinishOutcome {
    status: GameStatus,
    score: i32,
    max_combo: i32,
    message: String,
}

impl FinishOutcome {
    fn new(game: &Game, message: String) -> Self {
        Self {
            status: *game.status(),
            score: *game.score(),
            max_combo: *game.max_combo(),
            message,
        }
    }
}

/// Turn orchestrator: resolves whole turns against the stores.
#[derive(Debug, Clone)]
pub struct GameEngine {
    repository: GameRepository,
    finder: WordFinder,
    opponent: OpponentSelector,
    time_limit_seconds: i64,
}

impl GameEngine {
    /// Creates an engine with the default 20 second turn clock.
    #[instrument(skip(repository))]
    pub fn new(repository: GameRepository) -> Self {
        Self::with_time_limit(repository, TIME_LIMIT_SECONDS)
    }

    /// Creates an engine with a custom turn clock.
    #[instrument(skip(repository))]
    pub fn with_time_limit(repository: GameRepository, time_limit_seconds: i64) -> Self {
        let finder = WordFinder::new(repository.clone());
        let opponent = OpponentSelector::new(repository.clone());
        Self {
            repository,
            finder,
            opponent,
            time_limit_seconds,
        }
    }

    /// Returns the underlying repository.
    pub fn repository(&self) -> &GameRepository {
        &self.repository
    }

    /// Starts a new game for the player and seeds it with the opening word.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Db`] on storage failures.
    #[instrument(skip(self))]
    pub fn start_game(&self, player: &str, level: JlptLevel) -> Result<GameStartOutcome, GameError> {
        let mut conn = self.repository.connection()?;
        let game = conn.transaction::<_, GameError, _>(|conn| {
            let game = self
                .repository
                .create_game_in(conn, NewGame::new(player.to_string(), level))?;
            self.repository
                .append_turn_in(conn, *game.id(), Speaker::Opponent, SEED_WORD)?;
            Ok(game)
        })?;

        info!(game_id = game.id(), player = %player, level = %level, "Game started");
        Ok(GameStartOutcome {
            game_id: *game.id(),
            level,
            seed_word: SEED_WORD.to_string(),
            message: format!("Game on! The opening word is {}.", SEED_WORD),
        })
    }

    /// Resolves one human turn end to end.
    ///
    /// The human turn, the opponent's reply, and the game row are written
    /// in a single transaction: a turn either commits whole or leaves no
    /// trace.
    ///
    /// # Errors
    ///
    /// Returns a rule-violation error (unknown word, chain mismatch,
    /// duplicate, finished game) without mutating any state, or
    /// [`GameError::Db`]/[`GameError::SaveConflict`] on storage failures.
    #[instrument(skip(self), fields(game_id = %game_id))]
    pub fn play_turn(&self, game_id: i32, raw_input: &str) -> Result<TurnOutcome, GameError> {
        let mut game = self.load_playing(game_id)?;

        if game.is_timed_out(self.time_limit_seconds) {
            info!(game_id = %game_id, "Turn clock expired");
            game.finish(GameStatus::TimeOver);
            self.save(&game)?;
            return Ok(TurnOutcome::new(
                &game,
                None,
                None,
                "Time over! The game has ended.".to_string(),
            ));
        }

        let input = raw_input.trim();
        if kana::ends_with_forbidden_mora(input) {
            info!(game_id = %game_id, input = %input, "Raw input ends in the forbidden mora");
            game.finish(GameStatus::GameOver);
            self.save(&game)?;
            return Ok(TurnOutcome::new(
                &game,
                None,
                None,
                format!("You lose! \"{}\" ends in the forbidden mora.", input),
            ));
        }

        let word = self.finder.resolve(input)?;
        self.validate_chain(game_id, &word)?;
        if self.repository.turn_exists_with_word(game_id, word.surface())? {
            return Err(GameError::DuplicateWord {
                word: word.surface().clone(),
            });
        }

        let mut conn = self.repository.connection()?;
        conn.transaction::<_, GameError, _>(|conn| {
            self.repository
                .append_turn_in(conn, game_id, Speaker::Human, word.surface())?;
            let points = game.apply_correct_answer(*word.level())?;
            debug!(game_id = %game_id, points = %points, combo = game.current_combo(), "Answer scored");

            // Score is applied before the mora check: a word ending in ん is
            // legal to play, but loses the game immediately afterwards.
            if word.ends_with_forbidden_mora() {
                info!(game_id = %game_id, word = %word.surface(), "Played word ends in the forbidden mora");
                game.finish(GameStatus::GameOver);
                self.save_in(conn, &game)?;
                return Ok(TurnOutcome::new(
                    &game,
                    Some(WordSummary::from_word(&word)),
                    None,
                    format!("You lose! {} ends in the forbidden mora.", word.reading()),
                ));
            }

            match self.opponent.select_reply_in(conn, &game, &word)? {
                None => {
                    info!(game_id = %game_id, "Opponent exhausted, human wins");
                    game.finish(GameStatus::Win);
                    self.save_in(conn, &game)?;
                    Ok(TurnOutcome::new(
                        &game,
                        Some(WordSummary::from_word(&word)),
                        None,
                        "You win! The opponent could not find a word.".to_string(),
                    ))
                }
                Some(reply) => {
                    self.repository
                        .append_turn_in(conn, game_id, Speaker::Opponent, reply.surface())?;
                    game.touch_last_turn();
                    self.save_in(conn, &game)?;
                    Ok(TurnOutcome::new(
                        &game,
                        Some(WordSummary::from_word(&word)),
                        Some(WordSummary::from_word(&reply)),
                        format!("The opponent answers {}.", reply.surface()),
                    ))
                }
            }
        })
    }

    /// Spends a pass: the opponent chains onto its own last word.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::NoPassesLeft`] when the budget is exhausted and
    /// [`GameError::OpponentStuck`] when no continuation exists; neither
    /// mutates the game.
    #[instrument(skip(self), fields(game_id = %game_id))]
    pub fn pass_turn(&self, game_id: i32) -> Result<TurnOutcome, GameError> {
        let mut game = self.load_playing(game_id)?;

        if *game.passes_left() <= 0 {
            return Err(GameError::NoPassesLeft);
        }
        game.consume_pass();

        let last = self.latest_resolved_word(game_id)?;
        let mut conn = self.repository.connection()?;
        conn.transaction::<_, GameError, _>(|conn| {
            let reply = self
                .opponent
                .select_reply_in(conn, &game, &last)?
                .ok_or(GameError::OpponentStuck)?;

            self.repository
                .append_turn_in(conn, game_id, Speaker::Opponent, reply.surface())?;
            game.touch_last_turn();
            self.save_in(conn, &game)?;

            info!(game_id = %game_id, passes_left = game.passes_left(), "Pass spent");
            Ok(TurnOutcome::new(
                &game,
                None,
                Some(WordSummary::from_word(&reply)),
                format!("Passed. The opponent continues with {}.", reply.surface()),
            ))
        })
    }

    /// Finishes the game as a loss. No-op when already terminal.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::GameNotFound`] or storage failures.
    #[instrument(skip(self))]
    pub fn quit_game(&self, game_id: i32) -> Result<FinishOutcome, GameError> {
        self.finish_game(game_id, GameStatus::GameOver, "You quit the game.")
    }

    /// Finishes the game on the clock. No-op when already terminal.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::GameNotFound`] or storage failures.
    #[instrument(skip(self))]
    pub fn timeout_game(&self, game_id: i32) -> Result<FinishOutcome, GameError> {
        self.finish_game(game_id, GameStatus::TimeOver, "Time over! The game has ended.")
    }

    fn finish_game(
        &self,
        game_id: i32,
        status: GameStatus,
        message: &str,
    ) -> Result<FinishOutcome, GameError> {
        let mut game = self.load_game(game_id)?;

        if game.status().is_terminal() {
            debug!(game_id = %game_id, status = %game.status(), "Game already finished");
            return Ok(FinishOutcome::new(&game, "Game is already over.".to_string()));
        }

        game.finish(status);
        self.save(&game)?;
        info!(game_id = %game_id, status = %status, "Game finished");
        Ok(FinishOutcome::new(&game, message.to_string()))
    }

    fn load_game(&self, game_id: i32) -> Result<Game, GameError> {
        self.repository
            .load_game(game_id)?
            .ok_or(GameError::GameNotFound { game_id })
    }

    fn load_playing(&self, game_id: i32) -> Result<Game, GameError> {
        let game = self.load_game(game_id)?;
        if game.status().is_terminal() {
            return Err(GameError::GameFinished);
        }
        Ok(game)
    }

    /// Resolves the most recent recorded word back through the dictionary.
    fn latest_resolved_word(&self, game_id: i32) -> Result<Word, GameError> {
        let text = self
            .repository
            .latest_word(game_id)?
            .ok_or(GameError::NoPriorWord)?;
        self.finder.resolve(&text)
    }

    fn validate_chain(&self, game_id: i32, word: &Word) -> Result<(), GameError> {
        let previous = self.latest_resolved_word(game_id)?;
        chain::validate_connection(&previous, word)
    }

    fn save(&self, game: &Game) -> Result<(), GameError> {
        self.repository
            .save_game(game)
            .map_err(Self::map_save_error)
    }

    fn save_in(&self, conn: &mut SqliteConnection, game: &Game) -> Result<(), GameError> {
        self.repository
            .save_game_in(conn, game)
            .map_err(Self::map_save_error)
    }

    fn map_save_error(e: DbError) -> GameError {
        if e.is_conflict() {
            GameError::SaveConflict
        } else {
            GameError::Db(e)
        }
    }
}
