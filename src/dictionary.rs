//! Free-text resolution against the dictionary.

use tracing::{debug, instrument};

use crate::db::{GameRepository, Word};
use crate::error::GameError;
use crate::kana;

/// Resolves raw player input to a canonical dictionary word.
#[derive(Debug, Clone)]
pub struct WordFinder {
    repository: GameRepository,
}

impl WordFinder {
    /// Creates a finder backed by the given repository.
    pub fn new(repository: GameRepository) -> Self {
        Self { repository }
    }

    /// Resolves input text to a dictionary word.
    ///
    /// Tries the exact surface form first, then the reading with the input
    /// converted to hiragana, then to katakana. Reading lookups prefer the
    /// hardest tier (see [`GameRepository::find_by_reading`]).
    ///
    /// # Errors
    ///
    /// Returns [`GameError::WordNotFound`] when all three lookups miss.
    #[instrument(skip(self))]
    pub fn resolve(&self, input: &str) -> Result<Word, GameError> {
        if let Some(word) = self.repository.find_by_surface(input)? {
            debug!(surface = %word.surface(), "Resolved by surface");
            return Ok(word);
        }

        if let Some(word) = self.repository.find_by_reading(&kana::to_hiragana(input))? {
            debug!(surface = %word.surface(), "Resolved by hiragana reading");
            return Ok(word);
        }

        if let Some(word) = self.repository.find_by_reading(&kana::to_katakana(input))? {
            debug!(surface = %word.surface(), "Resolved by katakana reading");
            return Ok(word);
        }

        debug!(input = %input, "No dictionary entry");
        Err(GameError::WordNotFound {
            input: input.to_string(),
        })
    }
}
