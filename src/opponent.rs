//! Automated opponent move selection.

use diesel::SqliteConnection;
use tracing::{debug, instrument};

use crate::db::{Game, GameRepository, JlptLevel, Word};
use crate::error::GameError;
use crate::kana;

/// Picks the automated opponent's reply word.
#[derive(Debug, Clone)]
pub struct OpponentSelector {
    repository: GameRepository,
}

impl OpponentSelector {
    /// Creates a selector backed by the given repository.
    pub fn new(repository: GameRepository) -> Self {
        Self { repository }
    }

    /// Selects a reply to the preceding word, or `None` when the opponent
    /// cannot continue (which means the human wins).
    ///
    /// The candidate must start with the preceding word's effective end
    /// character (either script), match the game's tier unless the game
    /// runs unfiltered, not repeat a word from this game, and not itself
    /// end in the forbidden mora.
    ///
    /// Selection among multiple candidates is uniform-random.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Db`] if the candidate query fails.
    #[instrument(skip(self, game, preceding), fields(game_id = game.id(), preceding = %preceding.surface()))]
    pub fn select_reply(&self, game: &Game, preceding: &Word) -> Result<Option<Word>, GameError> {
        let mut conn = self.repository.connection()?;
        self.select_reply_in(&mut conn, game, preceding)
    }

    /// [`OpponentSelector::select_reply`] on a caller-supplied connection,
    /// so the candidate query sees turns written earlier in the same
    /// transaction.
    pub(crate) fn select_reply_in(
        &self,
        conn: &mut SqliteConnection,
        game: &Game,
        preceding: &Word,
    ) -> Result<Option<Word>, GameError> {
        let Some(end) = kana::effective_end_char(preceding.reading()) else {
            debug!("Preceding word has an empty reading");
            return Ok(None);
        };

        let hira = kana::to_hiragana(&end.to_string());
        let kata = kana::to_katakana(&end.to_string());
        let level_filter = match game.level() {
            JlptLevel::Any => None,
            level => Some(*level),
        };

        let candidate =
            self.repository
                .find_candidate_in(conn, *game.id(), &hira, &kata, level_filter)?;

        match &candidate {
            Some(word) => debug!(reply = %word.surface(), "Opponent reply selected"),
            None => debug!("Opponent cannot continue"),
        }
        Ok(candidate)
    }
}
