//! Vishraam (pause) classification and word markup

use std::borrow::Cow;

/// Glyph that closes a verse or line unit.
pub const UNIT_TERMINATOR: char = ']';

/// Separator placed between words of a rendered line.
pub const NBSP: &str = r#"<div class="nbsp">&nbsp;</div>"#;

/// Closes the current sub-block and opens a new one.
const SUB_BLOCK_BREAK: &str = "</div></div><div><div>";

/// Closes and reopens a line box after a heavy pause.
const LINE_BREAK: &str = "</div><div>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vishraam {
    Heavy,
    Medium,
    Light,
}

/// Word-final pause marks and their strength.
pub const PAUSE_MARKS: [(char, Vishraam); 3] = [
    (';', Vishraam::Heavy),
    (',', Vishraam::Medium),
    ('.', Vishraam::Light),
];

impl Vishraam {
    pub fn from_mark(mark: char) -> Option<Self> {
        PAUSE_MARKS
            .iter()
            .find(|(c, _)| *c == mark)
            .map(|(_, strength)| *strength)
    }

    pub fn css_class(&self) -> &'static str {
        match self {
            Vishraam::Heavy => "vishraamHeavy",
            Vishraam::Medium => "vishraamMedium",
            Vishraam::Light => "vishraamLight",
        }
    }

    /// Heavy pauses force a visual break on long lines.
    pub fn breaks_line(&self) -> bool {
        matches!(self, Vishraam::Heavy)
    }
}

/// Pause strength of a word, from its final character.
pub fn classify(word: &str) -> Option<Vishraam> {
    word.chars().last().and_then(Vishraam::from_mark)
}

/// Wrap a single word according to its final character.
///
/// `is_last` tells whether the word ends its line, which decides what a
/// trailing unit terminator does.
pub fn annotate_word(word: &str, is_last: bool) -> Cow<'_, str> {
    let Some(end) = word.chars().last() else {
        return Cow::Borrowed(word);
    };

    if let Some(strength) = Vishraam::from_mark(end) {
        let inner = &word[..word.len() - end.len_utf8()];
        let mut out = format!(
            r#"<div class="{}">{}<div class="vishraamChar">{}</div></div>"#,
            strength.css_class(),
            inner,
            end
        );
        if strength.breaks_line() {
            out.push_str(LINE_BREAK);
        }
        return Cow::Owned(out);
    }

    if end == UNIT_TERMINATOR && is_last {
        return Cow::Owned(format!("{}{}", word, SUB_BLOCK_BREAK));
    }

    Cow::Borrowed(word)
}

/// Annotate every space-separated word of a line and rejoin them.
pub fn annotate_line(line: &str) -> String {
    let words: Vec<&str> = line.split(' ').collect();
    let last = words.len().saturating_sub(1);
    words
        .iter()
        .enumerate()
        .map(|(i, word)| annotate_word(word, i == last))
        .collect::<Vec<_>>()
        .join(NBSP)
}

/// Remove pause marks from display text.
pub fn strip_pause_marks(text: &str) -> String {
    text.chars()
        .filter(|c| Vishraam::from_mark(*c).is_none())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_marks() {
        assert_eq!(classify("hir;"), Some(Vishraam::Heavy));
        assert_eq!(classify("hir,"), Some(Vishraam::Medium));
        assert_eq!(classify("hir."), Some(Vishraam::Light));
        assert_eq!(classify("hir"), None);
        assert_eq!(classify(""), None);
    }

    #[test]
    fn test_pause_wraps_word_without_mark() {
        assert_eq!(
            annotate_word("nwmu,", false),
            r#"<div class="vishraamMedium">nwmu<div class="vishraamChar">,</div></div>"#
        );
        assert_eq!(
            annotate_word("nwmu.", true),
            r#"<div class="vishraamLight">nwmu<div class="vishraamChar">.</div></div>"#
        );
    }

    #[test]
    fn test_heavy_pause_breaks_line() {
        assert_eq!(
            annotate_word("gur;", false),
            r#"<div class="vishraamHeavy">gur<div class="vishraamChar">;</div></div></div><div>"#
        );
    }

    #[test]
    fn test_terminator_only_breaks_at_end() {
        assert_eq!(annotate_word("]1]", false), "]1]");
        assert_eq!(annotate_word("]1]", true), "]1]</div></div><div><div>");
    }

    #[test]
    fn test_plain_and_empty_words_pass_through() {
        assert!(matches!(annotate_word("siqgur", true), Cow::Borrowed("siqgur")));
        assert!(matches!(annotate_word("", true), Cow::Borrowed("")));
    }

    #[test]
    fn test_annotate_line() {
        assert_eq!(
            annotate_line("siqgur ]"),
            format!("siqgur{}]</div></div><div><div>", NBSP)
        );
    }

    #[test]
    fn test_strip_pause_marks() {
        assert_eq!(strip_pause_marks("hir; nwmu, jpu. ]1]"), "hir nwmu jpu ]1]");
    }
}
