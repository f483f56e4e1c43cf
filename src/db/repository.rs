//! Database repository for words, games, and recorded turns.

use diesel::dsl::sql;
use diesel::prelude::*;
use diesel::sql_types::Integer;
use tracing::{debug, info, instrument};

use crate::db::error::DbErrorKind;
use crate::db::{DbError, schema};
use crate::db::{Game, GameTurn, JlptLevel, NewGame, NewGameTurn, NewWord, Speaker, Word};

/// Database repository for dictionary, game, and turn operations.
#[derive(Debug, Clone)]
pub struct GameRepository {
    db_path: String,
}

impl GameRepository {
    /// Creates a new repository connected to the database at the given path.
    ///
    /// Use `":memory:"` for an in-memory database (useful for tests, though
    /// each call opens a fresh connection, so file-backed databases are the
    /// norm even there).
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the path is invalid.
    #[instrument(skip(db_path), fields(db_path = %db_path))]
    pub fn new(db_path: String) -> Result<Self, DbError> {
        info!(path = %db_path, "Creating GameRepository");
        Ok(Self { db_path })
    }

    /// Establishes a database connection.
    ///
    /// Sets a busy timeout so concurrent callers sharing the file queue on
    /// SQLite's lock instead of failing immediately.
    #[instrument(skip(self))]
    pub(crate) fn connection(&self) -> Result<SqliteConnection, DbError> {
        debug!(path = %self.db_path, "Establishing connection");
        let mut conn = SqliteConnection::establish(&self.db_path)
            .map_err(|e| DbError::new(format!("Failed to connect to '{}': {}", self.db_path, e)))?;
        diesel::sql_query("PRAGMA busy_timeout = 5000;").execute(&mut conn)?;
        Ok(conn)
    }

    // ── dictionary ──────────────────────────────────────────────

    /// Inserts a dictionary word.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the surface form already exists or a database
    /// error occurs.
    #[instrument(skip(self, word), fields(surface = %word.surface()))]
    pub fn insert_word(&self, word: NewWord) -> Result<Word, DbError> {
        debug!("Inserting word");
        let mut conn = self.connection()?;

        let word = diesel::insert_into(schema::words::table)
            .values(&word)
            .returning(Word::as_returning())
            .get_result(&mut conn)?;

        debug!(word_id = word.id(), surface = %word.surface(), "Word inserted");
        Ok(word)
    }

    /// Looks a word up by its exact surface form.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn find_by_surface(&self, surface: &str) -> Result<Option<Word>, DbError> {
        debug!(surface = %surface, "Looking up word by surface");
        let mut conn = self.connection()?;

        let word = schema::words::table
            .filter(schema::words::surface.eq(surface))
            .select(Word::as_select())
            .first::<Word>(&mut conn)
            .optional()?;

        Ok(word)
    }

    /// Looks a word up by reading, preferring the hardest tier.
    ///
    /// Several entries can share a reading; the winner is the one with the
    /// highest difficulty, ties broken by lowest id, so resolution is
    /// deterministic.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn find_by_reading(&self, reading: &str) -> Result<Option<Word>, DbError> {
        debug!(reading = %reading, "Looking up word by reading");
        let mut conn = self.connection()?;

        let mut matches = schema::words::table
            .filter(schema::words::reading.eq(reading))
            .select(Word::as_select())
            .load::<Word>(&mut conn)?;

        matches.sort_by_key(|w| (w.level().difficulty_rank(), *w.id()));
        Ok(matches.into_iter().next())
    }

    /// Finds a random word the opponent can safely reply with.
    ///
    /// Candidates must start with one of the given effective characters
    /// (hiragana and katakana forms of the same sound), match the tier
    /// filter, not have been played in this game, and not end in the
    /// forbidden mora.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn find_candidate(
        &self,
        game_id: i32,
        starts_hira: &str,
        starts_kata: &str,
        level: Option<JlptLevel>,
    ) -> Result<Option<Word>, DbError> {
        let mut conn = self.connection()?;
        self.find_candidate_in(&mut conn, game_id, starts_hira, starts_kata, level)
    }

    pub(crate) fn find_candidate_in(
        &self,
        conn: &mut SqliteConnection,
        game_id: i32,
        starts_hira: &str,
        starts_kata: &str,
        level: Option<JlptLevel>,
    ) -> Result<Option<Word>, DbError> {
        debug!(
            game_id = %game_id,
            starts_hira = %starts_hira,
            starts_kata = %starts_kata,
            level = ?level,
            "Querying opponent candidate"
        );

        let used = schema::game_turns::table
            .filter(schema::game_turns::game_id.eq(game_id))
            .select(schema::game_turns::word_text);

        let mut query = schema::words::table
            .filter(
                schema::words::starts_with
                    .eq(starts_hira)
                    .or(schema::words::starts_with.eq(starts_kata)),
            )
            .filter(schema::words::surface.ne_all(used))
            .filter(schema::words::reading.not_like("%ん"))
            .filter(schema::words::reading.not_like("%ン"))
            .select(Word::as_select())
            .into_boxed();

        if let Some(level) = level {
            query = query.filter(schema::words::level.eq(level));
        }

        let candidate = query
            .order(sql::<Integer>("RANDOM()"))
            .first::<Word>(conn)
            .optional()?;

        debug!(found = candidate.is_some(), "Candidate query finished");
        Ok(candidate)
    }

    /// Counts all dictionary words.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn count_words(&self) -> Result<i64, DbError> {
        let mut conn = self.connection()?;
        Ok(schema::words::table.count().get_result(&mut conn)?)
    }

    // ── games ───────────────────────────────────────────────────

    /// Creates a new game row.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self, game))]
    pub fn create_game(&self, game: NewGame) -> Result<Game, DbError> {
        let mut conn = self.connection()?;
        self.create_game_in(&mut conn, game)
    }

    pub(crate) fn create_game_in(
        &self,
        conn: &mut SqliteConnection,
        game: NewGame,
    ) -> Result<Game, DbError> {
        debug!("Creating game");
        let game = diesel::insert_into(schema::games::table)
            .values(&game)
            .returning(Game::as_returning())
            .get_result(conn)?;

        info!(game_id = game.id(), player = %game.player(), "Game created");
        Ok(game)
    }

    /// Loads a game by id. Returns `None` if not found.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn load_game(&self, game_id: i32) -> Result<Option<Game>, DbError> {
        debug!(game_id = %game_id, "Loading game");
        let mut conn = self.connection()?;

        let game = schema::games::table
            .filter(schema::games::id.eq(game_id))
            .select(Game::as_select())
            .first::<Game>(&mut conn)
            .optional()?;

        Ok(game)
    }

    /// Persists a mutated game with an optimistic version check.
    ///
    /// The update only matches the row at the version the game was loaded
    /// with, and bumps it. Zero matched rows means another writer got there
    /// first.
    ///
    /// # Errors
    ///
    /// Returns a [`DbError`] with [`DbErrorKind::Conflict`] on a stale
    /// version, or a plain [`DbError`] on other database failures.
    #[instrument(skip(self, game), fields(game_id = game.id(), status = %game.status()))]
    pub fn save_game(&self, game: &Game) -> Result<(), DbError> {
        let mut conn = self.connection()?;
        self.save_game_in(&mut conn, game)
    }

    pub(crate) fn save_game_in(
        &self,
        conn: &mut SqliteConnection,
        game: &Game,
    ) -> Result<(), DbError> {
        debug!(score = game.score(), combo = game.current_combo(), "Saving game");

        let updated = diesel::update(
            schema::games::table
                .filter(schema::games::id.eq(*game.id()))
                .filter(schema::games::version.eq(*game.version())),
        )
        .set((
            schema::games::score.eq(*game.score()),
            schema::games::current_combo.eq(*game.current_combo()),
            schema::games::max_combo.eq(*game.max_combo()),
            schema::games::status.eq(*game.status()),
            schema::games::passes_left.eq(*game.passes_left()),
            schema::games::last_turn_at.eq(*game.last_turn_at()),
            schema::games::ended_at.eq(*game.ended_at()),
            schema::games::version.eq(*game.version() + 1),
        ))
        .execute(conn)?;

        if updated == 0 {
            return Err(DbError::with_kind(
                format!("Stale version {} for game {}", game.version(), game.id()),
                DbErrorKind::Conflict,
            ));
        }

        debug!(game_id = game.id(), "Game saved");
        Ok(())
    }

    // ── turns ───────────────────────────────────────────────────

    /// Appends a turn, numbering it by counting existing turns.
    ///
    /// Count-then-insert is not safe under concurrent submissions for the
    /// same game; callers are expected to serialize per game. The
    /// `(game_id, turn_number)` unique index turns a lost race into an
    /// error instead of silent renumbering.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn append_turn(
        &self,
        game_id: i32,
        speaker: Speaker,
        word_text: &str,
    ) -> Result<GameTurn, DbError> {
        let mut conn = self.connection()?;
        self.append_turn_in(&mut conn, game_id, speaker, word_text)
    }

    pub(crate) fn append_turn_in(
        &self,
        conn: &mut SqliteConnection,
        game_id: i32,
        speaker: Speaker,
        word_text: &str,
    ) -> Result<GameTurn, DbError> {
        debug!(game_id = %game_id, speaker = %speaker, word = %word_text, "Appending turn");

        let count: i64 = schema::game_turns::table
            .filter(schema::game_turns::game_id.eq(game_id))
            .count()
            .get_result(conn)?;
        let turn_number = count as i32 + 1;

        let turn = NewGameTurn::new(
            game_id,
            turn_number,
            speaker,
            word_text.to_string(),
            chrono::Utc::now().naive_utc(),
        );

        let turn = diesel::insert_into(schema::game_turns::table)
            .values(&turn)
            .returning(GameTurn::as_returning())
            .get_result(conn)?;

        debug!(turn_number = turn.turn_number(), "Turn appended");
        Ok(turn)
    }

    /// Counts the turns recorded for a game.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn count_turns(&self, game_id: i32) -> Result<i64, DbError> {
        let mut conn = self.connection()?;
        Ok(schema::game_turns::table
            .filter(schema::game_turns::game_id.eq(game_id))
            .count()
            .get_result(&mut conn)?)
    }

    /// Returns the word of the most recent turn, if any.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn latest_word(&self, game_id: i32) -> Result<Option<String>, DbError> {
        let mut conn = self.connection()?;

        let word = schema::game_turns::table
            .filter(schema::game_turns::game_id.eq(game_id))
            .order(schema::game_turns::turn_number.desc())
            .select(schema::game_turns::word_text)
            .first::<String>(&mut conn)
            .optional()?;

        Ok(word)
    }

    /// True when the word has already been played in this game.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn turn_exists_with_word(&self, game_id: i32, word_text: &str) -> Result<bool, DbError> {
        let mut conn = self.connection()?;

        let count: i64 = schema::game_turns::table
            .filter(schema::game_turns::game_id.eq(game_id))
            .filter(schema::game_turns::word_text.eq(word_text))
            .count()
            .get_result(&mut conn)?;

        Ok(count > 0)
    }

    /// Lists a game's turns in play order.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn list_turns(&self, game_id: i32) -> Result<Vec<GameTurn>, DbError> {
        let mut conn = self.connection()?;

        let turns = schema::game_turns::table
            .filter(schema::game_turns::game_id.eq(game_id))
            .order(schema::game_turns::turn_number.asc())
            .select(GameTurn::as_select())
            .load::<GameTurn>(&mut conn)?;

        Ok(turns)
    }
}
