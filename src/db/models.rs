//! Database models and domain types.
//!
//! The `Game` model carries the scoring state machine directly: all score,
//! combo, and status transitions go through its methods so the invariants
//! (one-way terminal transitions, monotone score and combo, `max_combo >=
//! current_combo`) hold at every observable point.

use chrono::{NaiveDateTime, Utc};
use derive_getters::Getters;
use derive_new::new;
use diesel::deserialize::{self, FromSql};
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use diesel::sqlite::Sqlite;
use serde::{Deserialize, Serialize};

use crate::db::schema;
use crate::error::GameError;
use crate::kana;

/// Pass budget granted to every new game.
pub const PASS_ALLOWANCE: i32 = 3;

/// Combo streak steps that earn the full bonus.
const COMBO_EARLY_STEPS: i32 = 5;
/// Bonus points per streak step within the first five.
const COMBO_EARLY_BONUS: i32 = 6;
/// Bonus points per streak step beyond the first five.
const COMBO_LATE_BONUS: i32 = 3;

/// Implements diesel Text round-tripping for a strum-stringified enum.
macro_rules! text_enum {
    ($name:ident) => {
        impl ToSql<Text, Sqlite> for $name {
            fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
                out.set_value(self.to_string());
                Ok(IsNull::No)
            }
        }

        impl FromSql<Text, Sqlite> for $name {
            fn from_sql(bytes: <Sqlite as diesel::backend::Backend>::RawValue<'_>) -> deserialize::Result<Self> {
                let s = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
                Ok(s.parse::<Self>()?)
            }
        }
    };
}

/// Lifecycle status of a game. `Playing` is the only non-terminal state.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    diesel::AsExpression,
    diesel::FromSqlRow,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[diesel(sql_type = Text)]
pub enum GameStatus {
    /// Game is in progress.
    Playing,
    /// Human won: the opponent could not continue.
    Win,
    /// Human lost: forbidden mora or explicit quit.
    GameOver,
    /// Human lost on the clock.
    TimeOver,
}

text_enum!(GameStatus);

impl GameStatus {
    /// True for every status except [`GameStatus::Playing`].
    pub fn is_terminal(self) -> bool {
        self != Self::Playing
    }
}

/// JLPT-style difficulty tier, used for scoring and dictionary filtering.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    diesel::AsExpression,
    diesel::FromSqlRow,
)]
#[strum(serialize_all = "UPPERCASE")]
#[diesel(sql_type = Text)]
pub enum JlptLevel {
    /// Hardest tier.
    N1,
    /// Second tier.
    N2,
    /// Third tier.
    N3,
    /// Fourth tier.
    N4,
    /// Easiest tier.
    N5,
    /// No tier filter; baseline scoring.
    Any,
}

text_enum!(JlptLevel);

impl JlptLevel {
    /// Base points awarded for a correct answer at this tier.
    pub fn base_points(self) -> i32 {
        match self {
            Self::N1 => 42,
            Self::N2 => 38,
            Self::N3 => 34,
            Self::N4 => 30,
            Self::N5 => 26,
            Self::Any => 30,
        }
    }

    /// Difficulty ordering key; lower is harder. Used to break ties when
    /// several dictionary entries share a reading.
    pub fn difficulty_rank(self) -> u8 {
        match self {
            Self::N1 => 0,
            Self::N2 => 1,
            Self::N3 => 2,
            Self::N4 => 3,
            Self::N5 => 4,
            Self::Any => 5,
        }
    }
}

/// Who produced a turn.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    diesel::AsExpression,
    diesel::FromSqlRow,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[diesel(sql_type = Text)]
pub enum Speaker {
    /// The human player.
    Human,
    /// The automated opponent.
    Opponent,
}

text_enum!(Speaker);

/// State-mutating engine entry points, used as part of the idempotency key.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    diesel::AsExpression,
    diesel::FromSqlRow,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[diesel(sql_type = Text)]
pub enum ActionType {
    /// Start a new game.
    Start,
    /// Submit a word.
    Turn,
    /// Spend a pass.
    Pass,
    /// Quit the game.
    Quit,
}

text_enum!(ActionType);

/// Dictionary word database model. Immutable during gameplay.
#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Getters)]
#[diesel(table_name = schema::words)]
pub struct Word {
    id: i32,
    level: JlptLevel,
    surface: String,
    reading: String,
    meaning: String,
    starts_with: String,
    ends_with: String,
}

impl Word {
    /// True when the reading ends in the losing mora.
    pub fn ends_with_forbidden_mora(&self) -> bool {
        kana::ends_with_forbidden_mora(&self.reading)
    }
}

/// Insertable word model. The effective start/end characters are derived
/// from the reading once, here, and cached in their own indexed columns.
#[derive(Debug, Clone, Insertable, Getters)]
#[diesel(table_name = schema::words)]
pub struct NewWord {
    level: JlptLevel,
    surface: String,
    reading: String,
    meaning: String,
    starts_with: String,
    ends_with: String,
}

impl NewWord {
    /// Creates an insertable word, deriving the effective chain characters.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::EmptyReading`] when the reading is empty; a
    /// word without a reading has no connecting sound and could never
    /// chain.
    pub fn new(
        level: JlptLevel,
        surface: String,
        reading: String,
        meaning: String,
    ) -> Result<Self, GameError> {
        if reading.is_empty() {
            return Err(GameError::EmptyReading { surface });
        }
        let starts_with = kana::effective_start_char(&reading)
            .map(String::from)
            .unwrap_or_default();
        let ends_with = kana::effective_end_char(&reading)
            .map(String::from)
            .unwrap_or_default();
        Ok(Self {
            level,
            surface,
            reading,
            meaning,
            starts_with,
            ends_with,
        })
    }
}

/// Game database model and state machine.
#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Getters)]
#[diesel(table_name = schema::games)]
pub struct Game {
    id: i32,
    player: String,
    score: i32,
    current_combo: i32,
    max_combo: i32,
    status: GameStatus,
    level: JlptLevel,
    passes_left: i32,
    last_turn_at: Option<NaiveDateTime>,
    started_at: NaiveDateTime,
    ended_at: Option<NaiveDateTime>,
    version: i32,
}

impl Game {
    /// Records a correct answer: combo up, score up, clock refreshed.
    ///
    /// `word_level` is the tier of the word that was just played. It only
    /// matters when the game itself runs unfiltered (`Any`); otherwise the
    /// game's configured tier prices every answer.
    ///
    /// Returns the points awarded.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::GameFinished`] if the game is not playing;
    /// score and combo are left untouched.
    pub fn apply_correct_answer(&mut self, word_level: JlptLevel) -> Result<i32, GameError> {
        if self.status.is_terminal() {
            return Err(GameError::GameFinished);
        }

        self.current_combo += 1;
        if self.current_combo > self.max_combo {
            self.max_combo = self.current_combo;
        }

        let scoring_level = match self.level {
            JlptLevel::Any => word_level,
            configured => configured,
        };
        // The first correct answer earns no streak bonus.
        let streak = (self.current_combo - 1).max(0);
        let points = scoring_level.base_points() + combo_bonus(streak);

        self.score += points;
        self.touch_last_turn();
        Ok(points)
    }

    /// Refreshes the turn clock after the opponent replies.
    pub fn touch_last_turn(&mut self) {
        self.last_turn_at = Some(Utc::now().naive_utc());
    }

    /// True when more than `limit_seconds` have passed since the last turn.
    /// A game with no recorded turn time never times out.
    pub fn is_timed_out(&self, limit_seconds: i64) -> bool {
        match self.last_turn_at {
            Some(last) => (Utc::now().naive_utc() - last).num_seconds() > limit_seconds,
            None => false,
        }
    }

    /// Spends one pass. Callers must check [`Game::passes_left`] first;
    /// the budget is not floor-checked here.
    pub fn consume_pass(&mut self) {
        self.passes_left -= 1;
    }

    /// Moves the game to a terminal status. Idempotent: once terminal, the
    /// status never changes again and repeated calls are ignored.
    pub fn finish(&mut self, status: GameStatus) {
        if self.status.is_terminal() {
            return;
        }
        self.status = status;
        self.ended_at = Some(Utc::now().naive_utc());
    }
}

/// Streak bonus: early streak-building pays more than late grinding.
fn combo_bonus(streak: i32) -> i32 {
    let early = streak.min(COMBO_EARLY_STEPS);
    let late = (streak - COMBO_EARLY_STEPS).max(0);
    early * COMBO_EARLY_BONUS + late * COMBO_LATE_BONUS
}

/// Insertable game model for starting a new game.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::games)]
pub struct NewGame {
    player: String,
    score: i32,
    current_combo: i32,
    max_combo: i32,
    status: GameStatus,
    level: JlptLevel,
    passes_left: i32,
    last_turn_at: Option<NaiveDateTime>,
    started_at: NaiveDateTime,
    version: i32,
}

impl NewGame {
    /// Creates a fresh playing game with the full pass allowance.
    pub fn new(player: String, level: JlptLevel) -> Self {
        let now = Utc::now().naive_utc();
        Self {
            player,
            score: 0,
            current_combo: 0,
            max_combo: 0,
            status: GameStatus::Playing,
            level,
            passes_left: PASS_ALLOWANCE,
            last_turn_at: Some(now),
            started_at: now,
            version: 0,
        }
    }
}

/// Recorded turn database model. Append-only.
#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable, Getters)]
#[diesel(table_name = schema::game_turns)]
#[diesel(belongs_to(Game))]
pub struct GameTurn {
    id: i32,
    game_id: i32,
    turn_number: i32,
    speaker: Speaker,
    word_text: String,
    created_at: NaiveDateTime,
}

/// Insertable turn model.
#[derive(Debug, Clone, Insertable, new)]
#[diesel(table_name = schema::game_turns)]
pub struct NewGameTurn {
    game_id: i32,
    turn_number: i32,
    speaker: Speaker,
    word_text: String,
    created_at: NaiveDateTime,
}

/// Idempotency record database model.
///
/// Born in the claimed state (no payload); completed by attaching the
/// serialized response. The `(player, game_id, action_type,
/// idempotency_key)` unique index is what makes claiming race-safe.
#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Getters)]
#[diesel(table_name = schema::idempotency_records)]
pub struct IdempotencyRecord {
    id: i32,
    player: String,
    game_id: i32,
    action_type: ActionType,
    idempotency_key: String,
    response_payload: Option<String>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
    expire_at: NaiveDateTime,
}

impl IdempotencyRecord {
    /// True once the wrapped action's response has been attached.
    pub fn has_payload(&self) -> bool {
        self.response_payload
            .as_deref()
            .is_some_and(|p| !p.is_empty())
    }
}

/// Insertable idempotency claim (no payload yet).
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::idempotency_records)]
pub struct NewIdempotencyRecord {
    player: String,
    game_id: i32,
    action_type: ActionType,
    idempotency_key: String,
    response_payload: Option<String>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
    expire_at: NaiveDateTime,
}

impl NewIdempotencyRecord {
    /// Creates a pending claim for the given action key.
    pub fn claim(
        player: String,
        game_id: i32,
        action_type: ActionType,
        idempotency_key: String,
        now: NaiveDateTime,
        expire_at: NaiveDateTime,
    ) -> Self {
        Self {
            player,
            game_id,
            action_type,
            idempotency_key,
            response_payload: None,
            created_at: now,
            updated_at: now,
            expire_at,
        }
    }
}
