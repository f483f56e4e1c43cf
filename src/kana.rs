//! Kana script utilities for chain matching.
//!
//! Pure functions, no I/O. Readings are matched on their phonetic
//! connecting sound, which is not always the literal first/last character:
//! the long-vowel mark carries no sound of its own, small kana fold to
//! their full-size base, and voiced consonants fold to their seion form.

/// First character of the hiragana block (ぁ).
const HIRAGANA_START: u32 = 0x3041;
/// Last character of the hiragana block (ゖ).
const HIRAGANA_END: u32 = 0x3096;
/// Offset between the hiragana and katakana blocks.
const KANA_BLOCK_OFFSET: u32 = 0x60;

/// The long-vowel mark ー, skipped when extracting connecting sounds.
const LONG_VOWEL_MARK: char = 'ー';

/// Small kana in both scripts (contracted syllables and the glottal stop).
const SMALL_KANA: &str = "ぁぃぅぇぉっゃゅょゎァィゥェォッャュョヮ";

/// Voiced and semi-voiced kana mapped to their unvoiced (seion) base.
const SEION_TABLE: [(char, char); 25] = [
    ('が', 'か'),
    ('ぎ', 'き'),
    ('ぐ', 'く'),
    ('げ', 'け'),
    ('ご', 'こ'),
    ('ざ', 'さ'),
    ('じ', 'し'),
    ('ず', 'す'),
    ('ぜ', 'せ'),
    ('ぞ', 'そ'),
    ('だ', 'た'),
    ('ぢ', 'ち'),
    ('づ', 'つ'),
    ('で', 'て'),
    ('ど', 'と'),
    ('ば', 'は'),
    ('び', 'ひ'),
    ('ぶ', 'ふ'),
    ('べ', 'へ'),
    ('ぼ', 'ほ'),
    ('ぱ', 'は'),
    ('ぴ', 'ひ'),
    ('ぷ', 'ふ'),
    ('ぺ', 'へ'),
    ('ぽ', 'ほ'),
];

/// Small kana mapped to their full-size base.
const SMALL_TO_BASE: [(char, char); 10] = [
    ('ぁ', 'あ'),
    ('ぃ', 'い'),
    ('ぅ', 'う'),
    ('ぇ', 'え'),
    ('ぉ', 'お'),
    ('っ', 'つ'),
    ('ゃ', 'や'),
    ('ゅ', 'ゆ'),
    ('ょ', 'よ'),
    ('ゎ', 'わ'),
];

/// Converts hiragana characters to katakana; everything else passes through.
pub fn to_katakana(input: &str) -> String {
    input.chars().map(hira_char_to_kata).collect()
}

/// Converts katakana characters to hiragana; everything else passes through.
pub fn to_hiragana(input: &str) -> String {
    input.chars().map(kata_char_to_hira).collect()
}

fn hira_char_to_kata(c: char) -> char {
    let code = c as u32;
    if (HIRAGANA_START..=HIRAGANA_END).contains(&code) {
        char::from_u32(code + KANA_BLOCK_OFFSET).unwrap_or(c)
    } else {
        c
    }
}

fn kata_char_to_hira(c: char) -> char {
    let code = c as u32;
    let kata_range = (HIRAGANA_START + KANA_BLOCK_OFFSET)..=(HIRAGANA_END + KANA_BLOCK_OFFSET);
    if kata_range.contains(&code) {
        char::from_u32(code - KANA_BLOCK_OFFSET).unwrap_or(c)
    } else {
        c
    }
}

/// Returns the connecting sound at the end of a reading.
///
/// The last character, unless it is the long-vowel mark ー, in which case
/// the second-to-last character carries the sound ("タクシー" ends on シ).
pub fn effective_end_char(reading: &str) -> Option<char> {
    let mut chars = reading.chars().rev();
    let last = chars.next()?;
    if last == LONG_VOWEL_MARK {
        chars.next().or(Some(last))
    } else {
        Some(last)
    }
}

/// Returns the connecting sound at the start of a reading.
///
/// The first character, unless it is the long-vowel mark ー, in which case
/// the second character carries the sound.
pub fn effective_start_char(reading: &str) -> Option<char> {
    let mut chars = reading.chars();
    let first = chars.next()?;
    if first == LONG_VOWEL_MARK {
        chars.next().or(Some(first))
    } else {
        Some(first)
    }
}

/// Canonicalizes a single character for boundary comparison.
///
/// Hiragana conversion, then small kana fold to their base (ゃ→や), then
/// voiced consonants fold to seion (が→か). Ordinary connection compares
/// effective characters through this folding; the raw voiced/unvoiced
/// distinction only matters on the contracted-syllable path.
pub fn normalize_for_chaining(c: char) -> char {
    let c = kata_char_to_hira(c);
    let c = lookup(&SMALL_TO_BASE, c);
    lookup(&SEION_TABLE, c)
}

/// Returns the seion (unvoiced base) form of a kana, or the kana itself.
pub fn seion(c: char) -> char {
    lookup(&SEION_TABLE, c)
}

/// True for reduced-size kana (ぁぃぅぇぉっゃゅょゎ and katakana forms).
pub fn is_small_kana(c: char) -> bool {
    SMALL_KANA.contains(c)
}

/// True when the text ends in the mora that loses the game (ん/ン).
pub fn ends_with_forbidden_mora(text: &str) -> bool {
    matches!(text.chars().next_back(), Some('ん') | Some('ン'))
}

fn lookup<const N: usize>(table: &[(char, char); N], c: char) -> char {
    table
        .iter()
        .find(|(from, _)| *from == c)
        .map(|(_, to)| *to)
        .unwrap_or(c)
}
