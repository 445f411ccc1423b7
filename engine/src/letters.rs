//! First-letter (phonetic index) normalization
//!
//! Each word of a line contributes one index letter. The index keeps the byte
//! span of the word each letter came from, so a match found in the letters can
//! be mapped back onto the source text by word rather than by offset.

use crate::vishraam::UNIT_TERMINATOR;
use std::ops::Range;

/// Sihari is written before the consonant it follows in speech.
const SIHARI: char = 'i';

/// Pair-bindi and open-oora glyphs indexed under their base letter.
pub const LETTER_SUBSTITUTIONS: [(char, char); 7] = [
    ('^', 'K'), // khakha pair bindi
    ('E', 'a'), // open oora
    ('&', 'P'), // phapha pair bindi
    ('S', 's'), // sassa pair bindi
    ('z', 'j'), // jajja pair bindi
    ('Z', 'g'), // gagga pair bindi
    ('L', 'l'), // lalla pair bindi
];

fn substitute(letter: char) -> char {
    LETTER_SUBSTITUTIONS
        .iter()
        .find(|(from, _)| *from == letter)
        .map(|(_, to)| *to)
        .unwrap_or(letter)
}

/// Index letter for a single word, or `None` for empty words and unit
/// terminators.
pub fn index_letter(word: &str) -> Option<char> {
    let mut chars = word.chars();
    let first = chars.next()?;
    if first == UNIT_TERMINATOR {
        return None;
    }
    let letter = if first == SIHARI {
        chars.next().unwrap_or(first)
    } else {
        first
    };
    Some(substitute(letter))
}

/// An index letter and the span of the source word it stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexLetter {
    pub letter: char,
    pub span: Range<usize>,
}

/// Phonetic index of a line, one entry per indexed word.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhoneticIndex {
    letters: Vec<IndexLetter>,
}

impl PhoneticIndex {
    pub fn build(text: &str) -> Self {
        let mut letters = Vec::new();
        let mut start = 0;
        for word in text.split(' ') {
            if let Some(letter) = index_letter(word) {
                letters.push(IndexLetter {
                    letter,
                    span: start..start + word.len(),
                });
            }
            start += word.len() + 1;
        }
        Self { letters }
    }

    pub fn letters(&self) -> &[IndexLetter] {
        &self.letters
    }

    pub fn len(&self) -> usize {
        self.letters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.letters.is_empty()
    }

    /// Byte range of the source text covered by index positions `range`.
    pub fn source_span(&self, range: Range<usize>) -> Option<Range<usize>> {
        if range.is_empty() {
            return None;
        }
        let first = self.letters.get(range.start)?;
        let last = self.letters.get(range.end - 1)?;
        Some(first.span.start..last.span.end)
    }
}

impl std::fmt::Display for PhoneticIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for entry in &self.letters {
            write!(f, "{}", entry.letter)?;
        }
        Ok(())
    }
}
