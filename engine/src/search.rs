//! Search over scripture lines
//!
//! Queries starting with `#` search the Gurmukhi text literally. Everything
//! else is a first-letter query run against the phonetic index in three
//! passes: exact, prefix, then substring.

use crate::error::log_failure;
use crate::letters::{IndexLetter, PhoneticIndex};
use crate::line::ScriptureLine;
use crate::source::LineSource;
use crate::vishraam::strip_pause_marks;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

pub const LITERAL_MARKER: char = '#';

/// Row cap for a literal query.
pub const LITERAL_LIMIT: usize = 20;

/// Row cap for each phonetic pass.
pub const PHONETIC_LIMIT: usize = 10;

/// Hotkeys for the first hits of a result list.
pub const RESULT_HOTKEYS: [char; 10] = ['1', '2', '3', '4', '5', '6', '7', '8', '9', '0'];

const HIGHLIGHT_OPEN: &str = "<span class='slink-highlight'>";
const HIGHLIGHT_CLOSE: &str = "</span>";

/// Query letters that stand for any single index letter.
const WILDCARDS: [char; 2] = [' ', '?'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Literal,
    Phonetic,
}

impl SearchMode {
    /// Mode selected by a raw query, `None` for an empty query.
    pub fn of(query: &str) -> Option<Self> {
        match query.chars().next() {
            None => None,
            Some(LITERAL_MARKER) => Some(SearchMode::Literal),
            Some(_) => Some(SearchMode::Phonetic),
        }
    }
}

/// How a hit was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Literal,
    Exact,
    Prefix,
    Substring,
}

impl Strategy {
    /// Phonetic passes in priority order.
    pub const PHONETIC: [Strategy; 3] = [Strategy::Exact, Strategy::Prefix, Strategy::Substring];

    fn log_code(&self) -> &'static str {
        match self {
            Strategy::Literal => "search.literal",
            Strategy::Exact => "search.exact",
            Strategy::Prefix => "search.prefix",
            Strategy::Substring => "search.substring",
        }
    }

    /// GLOB run against the stored first letters for this pass.
    pub fn glob(&self, pattern: &LetterPattern) -> String {
        let glob = pattern.glob();
        match self {
            Strategy::Literal | Strategy::Exact => glob,
            Strategy::Prefix => format!("{}?*", glob),
            Strategy::Substring => format!("?*{}*", glob),
        }
    }

    /// Highlighted display text for a row this pass matched, or `None` when
    /// the row's text no longer reproduces the match.
    pub fn highlight(&self, pattern: &LetterPattern, display: &str, stored_index: &str) -> Option<String> {
        match self {
            // The exact pass opens a second span instead of closing the first;
            // display clients rely on that markup.
            Strategy::Literal | Strategy::Exact => {
                Some(format!("{}{}{}", HIGHLIGHT_OPEN, display, HIGHLIGHT_OPEN))
            }
            Strategy::Prefix => {
                let index = PhoneticIndex::build(display);
                if !pattern.matches_at(index.letters(), 0) {
                    return None;
                }
                let span = index.source_span(0..pattern.len())?;
                Some(format!(
                    "{}{}{}{}",
                    HIGHLIGHT_OPEN,
                    &display[..span.end],
                    HIGHLIGHT_CLOSE,
                    &display[span.end..]
                ))
            }
            Strategy::Substring => {
                let index = PhoneticIndex::build(display);
                let pos = pattern.find(index.letters(), 1)?;
                let span = index.source_span(pos..pos + pattern.len())?;
                if pattern.is_suffix_of(stored_index) {
                    Some(format!(
                        "{}{}{}{}",
                        &display[..span.start],
                        HIGHLIGHT_OPEN,
                        &display[span.start..],
                        HIGHLIGHT_CLOSE
                    ))
                } else {
                    Some(format!(
                        "{}{}{}{}{}",
                        &display[..span.start],
                        HIGHLIGHT_OPEN,
                        &display[span.clone()],
                        HIGHLIGHT_CLOSE,
                        &display[span.end..]
                    ))
                }
            }
        }
    }
}

/// A first-letter query, one slot per index letter; `None` matches any letter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LetterPattern {
    slots: Vec<Option<char>>,
}

impl LetterPattern {
    pub fn parse(query: &str) -> Self {
        Self {
            slots: query
                .chars()
                .map(|c| if WILDCARDS.contains(&c) { None } else { Some(c) })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// GLOB form of the pattern, with GLOB metacharacters taken literally.
    pub fn glob(&self) -> String {
        let mut glob = String::with_capacity(self.slots.len());
        for slot in &self.slots {
            match slot {
                None => glob.push('?'),
                Some(c @ ('*' | '[')) => {
                    glob.push('[');
                    glob.push(*c);
                    glob.push(']');
                }
                Some(c) => glob.push(*c),
            }
        }
        glob
    }

    fn slot_matches(slot: &Option<char>, letter: char) -> bool {
        slot.map_or(true, |c| c == letter)
    }

    pub fn matches_at(&self, letters: &[IndexLetter], pos: usize) -> bool {
        match letters.get(pos..pos + self.slots.len()) {
            Some(window) => self
                .slots
                .iter()
                .zip(window)
                .all(|(slot, entry)| Self::slot_matches(slot, entry.letter)),
            None => false,
        }
    }

    /// First position at or after `from` where the pattern matches.
    pub fn find(&self, letters: &[IndexLetter], from: usize) -> Option<usize> {
        (from..letters.len()).find(|&pos| self.matches_at(letters, pos))
    }

    pub fn is_suffix_of(&self, text: &str) -> bool {
        let letters: Vec<char> = text.chars().collect();
        if letters.len() < self.slots.len() {
            return false;
        }
        self.slots
            .iter()
            .zip(&letters[letters.len() - self.slots.len()..])
            .all(|(slot, c)| Self::slot_matches(slot, *c))
    }
}

/// Tokens of a literal query.
pub fn literal_tokens(query: &str) -> Vec<String> {
    query
        .trim_start_matches(LITERAL_MARKER)
        .split_whitespace()
        .map(String::from)
        .collect()
}

/// A literal query needs more than one character to run.
fn is_searchable(tokens: &[String]) -> bool {
    let joined_len: usize = tokens.iter().map(|t| t.len()).sum::<usize>() + tokens.len().saturating_sub(1);
    joined_len > 1
}

/// Wrap every occurrence of any token in a highlight span.
fn token_highlighter(tokens: &[String]) -> Option<Regex> {
    let alternation = tokens
        .iter()
        .map(|t| regex_lite::escape(t))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!("({})", alternation)).ok()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub primary_key: String,
    pub parent_id: String,
    pub highlighted: String,
    pub rank: usize,
    pub hotkey: Option<char>,
    pub strategy: Strategy,
}

impl SearchHit {
    /// Result anchor as the navigator lists it.
    pub fn markup(&self) -> String {
        let class_suffix = self
            .hotkey
            .map(|k| format!(" searchresult-{}", k))
            .unwrap_or_default();
        let number = self
            .hotkey
            .map(String::from)
            .unwrap_or_else(|| "&nbsp;".to_string());
        format!(
            r##"<a id="{}" href="shabad?id={}#{}" class="navigationForDisplay searchResultUpdateHistory" data-lineID="{}" data-shabadID="{}"><div class="searchresult{}"><p class="gurmukhifont"><span class="codefont"><span class="number">{}</span></span>{}</p></div></a>"##,
            self.rank,
            self.parent_id,
            self.primary_key,
            self.primary_key,
            self.parent_id,
            class_suffix,
            number,
            self.highlighted
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    pub query: String,
    pub mode: Option<SearchMode>,
    pub hits: Vec<SearchHit>,
    pub elapsed_ms: u64,
}

impl SearchResults {
    /// All hit anchors, in rank order.
    pub fn markup(&self) -> String {
        self.hits.iter().map(SearchHit::markup).collect()
    }
}

fn push_hit(hits: &mut Vec<SearchHit>, line: &ScriptureLine, highlighted: String, strategy: Strategy) {
    let rank = hits.len();
    hits.push(SearchHit {
        primary_key: line.primary_key.clone(),
        parent_id: line.scripture_id.clone(),
        highlighted,
        rank,
        hotkey: RESULT_HOTKEYS.get(rank).copied(),
        strategy,
    });
}

pub struct SearchEngine {
    source: Arc<dyn LineSource>,
}

impl SearchEngine {
    pub fn new(source: Arc<dyn LineSource>) -> Self {
        Self { source }
    }

    /// Run a raw query. Store failures are logged and the hits gathered so far
    /// are returned.
    pub fn search(&self, query: &str) -> SearchResults {
        let start = Instant::now();
        let mode = SearchMode::of(query);
        let mut hits = Vec::new();

        match mode {
            Some(SearchMode::Literal) => self.literal_search(query, &mut hits),
            Some(SearchMode::Phonetic) => self.phonetic_search(query, &mut hits),
            None => {}
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(query, ?mode, hits = hits.len(), elapsed_ms, "search finished");

        SearchResults {
            query: query.to_string(),
            mode,
            hits,
            elapsed_ms,
        }
    }

    fn literal_search(&self, query: &str, hits: &mut Vec<SearchHit>) {
        let tokens = literal_tokens(query);
        if !is_searchable(&tokens) {
            return;
        }
        let Some(highlighter) = token_highlighter(&tokens) else {
            return;
        };
        let replacement = format!("{}${{1}}{}", HIGHLIGHT_OPEN, HIGHLIGHT_CLOSE);

        let lines = self
            .source
            .search_text(&tokens, LITERAL_LIMIT)
            .unwrap_or_else(|e| {
                log_failure(Strategy::Literal.log_code(), &e);
                Vec::new()
            });
        for line in &lines {
            let display = strip_pause_marks(&line.gurmukhi);
            let highlighted = highlighter
                .replace_all(&display, replacement.as_str())
                .into_owned();
            push_hit(hits, line, highlighted, Strategy::Literal);
        }
    }

    fn phonetic_search(&self, query: &str, hits: &mut Vec<SearchHit>) {
        let pattern = LetterPattern::parse(query);
        if pattern.is_empty() {
            return;
        }

        for strategy in Strategy::PHONETIC {
            let lines = match self.source.search_letters(&strategy.glob(&pattern), PHONETIC_LIMIT) {
                Ok(lines) => lines,
                Err(e) => {
                    log_failure(strategy.log_code(), &e);
                    continue;
                }
            };
            for line in &lines {
                let display = strip_pause_marks(&line.gurmukhi);
                let highlighted = strategy
                    .highlight(&pattern, &display, &line.phonetic_index)
                    .unwrap_or_else(|| {
                        tracing::debug!(
                            pk = %line.primary_key,
                            stored = %line.phonetic_index,
                            "stored first letters do not match line text"
                        );
                        display.clone()
                    });
                push_hit(hits, line, highlighted, strategy);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::fixture;

    fn engine() -> SearchEngine {
        SearchEngine::new(Arc::new(fixture()))
    }

    fn highlighted(results: &SearchResults) -> Vec<&str> {
        results.hits.iter().map(|h| h.highlighted.as_str()).collect()
    }

    fn strip_highlight(text: &str) -> String {
        text.replace(HIGHLIGHT_OPEN, "").replace(HIGHLIGHT_CLOSE, "")
    }

    #[test]
    fn test_mode_selection() {
        assert_eq!(SearchMode::of(""), None);
        assert_eq!(SearchMode::of("#nwnk"), Some(SearchMode::Literal));
        assert_eq!(SearchMode::of("hhn"), Some(SearchMode::Phonetic));
    }

    #[test]
    fn test_pattern_globs() {
        let pattern = LetterPattern::parse("n d");
        assert_eq!(Strategy::Exact.glob(&pattern), "n?d");
        assert_eq!(Strategy::Prefix.glob(&pattern), "n?d?*");
        assert_eq!(Strategy::Substring.glob(&pattern), "?*n?d*");
        assert_eq!(LetterPattern::parse("a*[").glob(), "a[*][[]");
    }

    #[test]
    fn test_pattern_suffix() {
        let pattern = LetterPattern::parse("n d");
        assert!(pattern.is_suffix_of("jnsd"));
        assert!(!pattern.is_suffix_of("jnsdk"));
        assert!(!pattern.is_suffix_of("d"));
    }

    #[test]
    fn test_prefix_highlight_maps_words() {
        let pattern = LetterPattern::parse("bg");
        // Sihari word indexes under its second letter but keeps its full span
        let out = Strategy::Prefix
            .highlight(&pattern, "iblwvlu gur kw", "bgk")
            .unwrap();
        assert_eq!(out, "<span class='slink-highlight'>iblwvlu gur</span> kw");
    }

    #[test]
    fn test_substring_highlight_bounded() {
        let pattern = LetterPattern::parse("ks");
        let out = Strategy::Substring
            .highlight(&pattern, "gur kw sbdu min vsY ]2]", "gksmv")
            .unwrap();
        assert_eq!(out, "gur <span class='slink-highlight'>kw sbdu</span> min vsY ]2]");
    }

    #[test]
    fn test_substring_highlight_runs_to_end() {
        let pattern = LetterPattern::parse("nd");
        let out = Strategy::Substring
            .highlight(&pattern, "jpu nwnk dws ]3]", "jnd")
            .unwrap();
        assert_eq!(out, "jpu <span class='slink-highlight'>nwnk dws ]3]</span>");
    }

    #[test]
    fn test_substring_skips_first_word() {
        let pattern = LetterPattern::parse("h");
        let out = Strategy::Substring.highlight(&pattern, "hir hir", "hh").unwrap();
        assert_eq!(out, "hir <span class='slink-highlight'>hir</span>");
    }

    #[test]
    fn test_stale_index_is_not_highlighted() {
        let pattern = LetterPattern::parse("xy");
        assert!(Strategy::Prefix.highlight(&pattern, "hir hir", "xyz").is_none());
        assert!(Strategy::Substring.highlight(&pattern, "hir hir", "axy").is_none());
    }

    #[test]
    fn test_exact_pass() {
        let results = engine().search("jnd");
        assert_eq!(results.hits.len(), 1);
        let hit = &results.hits[0];
        assert_eq!(hit.strategy, Strategy::Exact);
        assert_eq!(
            hit.highlighted,
            "<span class='slink-highlight'>jpu nwnk dws ]3]<span class='slink-highlight'>"
        );
        assert_eq!(strip_highlight(&hit.highlighted), "jpu nwnk dws ]3]");
    }

    #[test]
    fn test_prefix_pass_strips_pauses() {
        let results = engine().search("hhn");
        assert_eq!(
            highlighted(&results),
            vec!["<span class='slink-highlight'>hir hir nwmu</span> jpu mn myry ]1]"]
        );
        assert_eq!(results.hits[0].parent_id, "1");
    }

    #[test]
    fn test_passes_append_in_priority_order() {
        let results = engine().search("nd");
        let keys: Vec<(&str, Strategy)> = results
            .hits
            .iter()
            .map(|h| (h.primary_key.as_str(), h.strategy))
            .collect();
        assert_eq!(keys, vec![("20", Strategy::Prefix), ("21", Strategy::Substring)]);
        assert_eq!(
            highlighted(&results),
            vec![
                "<span class='slink-highlight'>nwnk dws</span> sdw kurbwxu ]",
                "jpu <span class='slink-highlight'>nwnk dws ]3]</span>",
            ]
        );
        assert_eq!(results.hits[1].rank, 1);
        assert_eq!(results.hits[1].hotkey, Some('2'));
    }

    #[test]
    fn test_space_is_a_wildcard() {
        let results = engine().search("n s");
        assert_eq!(results.hits.len(), 1);
        assert_eq!(
            results.hits[0].highlighted,
            "<span class='slink-highlight'>nwnk dws sdw</span> kurbwxu ]"
        );
    }

    #[test]
    fn test_literal_search_highlights_every_token() {
        let results = engine().search("#nwnk   dws");
        assert_eq!(results.mode, Some(SearchMode::Literal));
        assert_eq!(
            highlighted(&results),
            vec![
                "<span class='slink-highlight'>nwnk</span> <span class='slink-highlight'>dws</span> sdw kurbwxu ]",
                "jpu <span class='slink-highlight'>nwnk</span> <span class='slink-highlight'>dws</span> ]3]",
            ]
        );
    }

    #[test]
    fn test_literal_search_needs_two_characters() {
        assert!(engine().search("#n").hits.is_empty());
        assert!(engine().search("#  ").hits.is_empty());
        assert!(engine().search("").hits.is_empty());
    }

    #[test]
    fn test_literal_tokens() {
        assert_eq!(literal_tokens("##nwnk  dws "), vec!["nwnk", "dws"]);
    }

    #[test]
    fn test_hit_markup() {
        let hit = SearchHit {
            primary_key: "21".to_string(),
            parent_id: "2".to_string(),
            highlighted: "jpu".to_string(),
            rank: 0,
            hotkey: Some('1'),
            strategy: Strategy::Exact,
        };
        assert_eq!(
            hit.markup(),
            concat!(
                r##"<a id="0" href="shabad?id=2#21" class="navigationForDisplay searchResultUpdateHistory" "##,
                r##"data-lineID="21" data-shabadID="2"><div class="searchresult searchresult-1"><p class="gurmukhifont">"##,
                r##"<span class="codefont"><span class="number">1</span></span>jpu</p></div></a>"##
            )
        );

        let unlabelled = SearchHit { rank: 12, hotkey: None, ..hit };
        assert!(unlabelled
            .markup()
            .contains(r#"<div class="searchresult"><p class="gurmukhifont"><span class="codefont"><span class="number">&nbsp;</span>"#));
    }

    #[test]
    fn test_only_first_ten_hits_get_hotkeys() {
        let line = ScriptureLine::default();
        let mut hits = Vec::new();
        for _ in 0..12 {
            push_hit(&mut hits, &line, String::new(), Strategy::Exact);
        }
        assert_eq!(hits[9].hotkey, Some('0'));
        assert!(hits[10].hotkey.is_none());
        assert_eq!(hits[11].rank, 11);
    }
}
