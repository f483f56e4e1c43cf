//! Chain connection validation.

use crate::db::Word;
use crate::error::GameError;
use crate::kana;

/// Decides whether `current` may legally follow `previous` in the chain.
///
/// Ordinary connection: the previous word's effective end character and the
/// current word's effective start character agree after normalization
/// (script, small-kana, and seion folding).
///
/// Contracted-syllable exception: a word ending in a small kana such as
/// じゅ is phonetically ambiguous at the boundary, so the next word may
/// start with the full two-character sound in either its voiced (じゅ…) or
/// devoiced (しゅ…) form.
///
/// # Errors
///
/// Returns [`GameError::ChainMismatch`] carrying both readings when
/// neither rule matches.
pub fn validate_connection(previous: &Word, current: &Word) -> Result<(), GameError> {
    let prev_reading = previous.reading();
    let current_reading = current.reading();

    let last = kana::effective_end_char(prev_reading).map(kana::normalize_for_chaining);
    let first = kana::effective_start_char(current_reading).map(kana::normalize_for_chaining);

    if last.is_some() && last == first {
        return Ok(());
    }

    if is_valid_contracted_connection(prev_reading, current_reading) {
        return Ok(());
    }

    Err(GameError::ChainMismatch {
        previous: prev_reading.clone(),
        current: current_reading.clone(),
    })
}

/// じゅ may be followed by じゅ… or しゅ… (combined sound, voiced or
/// devoiced). Requires the previous reading to end in a small kana with at
/// least one character before it.
fn is_valid_contracted_connection(prev_reading: &str, current_reading: &str) -> bool {
    let mut rev = prev_reading.chars().rev();
    let Some(small) = rev.next() else {
        return false;
    };
    if !kana::is_small_kana(small) {
        return false;
    }
    let Some(preceding) = rev.next() else {
        return false;
    };

    let combined: String = [preceding, small].iter().collect();
    if current_reading.starts_with(&combined) {
        return true;
    }

    let combined_seion: String = [kana::seion(preceding), small].iter().collect();
    current_reading.starts_with(&combined_seion)
}
