//! Phonetic index rebuild
//!
//! Recomputes every stored line's first letters and reports the rows whose
//! stored value differs, as `UPDATE` statements for manual review. Nothing is
//! written back to the store.

use crate::error::ShabadError;
use crate::letters::PhoneticIndex;
use crate::line::ScriptureLine;
use crate::source::LineSource;
use regex_lite::Regex;
use serde::Serialize;
use std::fmt;
use std::path::Path;

/// Verse counters written as `] 12 ]`.
const PADDED_COUNTER: &str = r"\] ([0-9]*) \]";

/// Annotations dropped before indexing, applied in order.
pub const ANNOTATION_REMOVALS: [(&str, &str); 9] = [
    ("] rhwau ]", "] ]"),
    ("] rhwau dUjw ]", "] ]"),
    ("] suDu", "]"),
    ("] jumlw", "]"),
    ("] bweIs caupdy qQw pMcpdy", "]"),
    ("] Ckw 1", "]"),
    ("] joVu", "]"),
    ("] Cky 2", "]"),
    ("] Cky 3", "]"),
];

/// Heading lines that are never indexed.
pub const BLANKED_LINES: [&str; 3] = ["Awsw ] iqpdw ] iekqukw ]", "kbIru ] mwrU ]", "muK Bwg"];

/// Author and raag headings.
const HEADING: &str = r"m \d | mhlw \d | hlI bwc | kbIr jI| bwc \]$";

/// Metre headings, suppressed only in Dasam Granth lines.
const DASAM_METRE: &str = " CMd ]";
const DASAM_SOURCE: &str = "D";

/// Compiled rewrite rules for one rebuild.
pub struct IndexRules {
    padded_counter: Regex,
    heading: Regex,
}

impl IndexRules {
    pub fn new() -> Result<Self, ShabadError> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| ShabadError::Other(format!("Bad index rule {}: {}", pattern, e)))
        };
        Ok(Self {
            padded_counter: compile(PADDED_COUNTER)?,
            heading: compile(HEADING)?,
        })
    }

    /// Index value a line should carry.
    pub fn compute_index(&self, line: &ScriptureLine) -> String {
        let mut text = self
            .padded_counter
            .replace_all(&line.gurmukhi, "]${1}]")
            .into_owned();
        for (from, to) in ANNOTATION_REMOVALS {
            text = text.replace(from, to);
        }
        if BLANKED_LINES.contains(&text.as_str()) {
            text.clear();
        }

        let suppressed = text.is_empty()
            || self.heading.is_match(&text)
            || (text.contains(DASAM_METRE) && line.source_tag == DASAM_SOURCE);
        if suppressed {
            return String::new();
        }

        let index = PhoneticIndex::build(&text).to_string();
        if index.chars().count() == 1 {
            String::new()
        } else {
            index
        }
    }
}

/// A row whose stored first letters disagree with the recomputed value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposedUpdate {
    pub primary_key: String,
    pub stored: String,
    pub computed: String,
}

impl fmt::Display for ProposedUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "UPDATE SHABAD SET FIRST_LETTERS='{}' WHERE PK={}",
            self.computed.replace('\'', "''"),
            self.primary_key
        )
    }
}

/// Compare every stored line against its recomputed index.
pub fn rebuild_phonetic_index(source: &dyn LineSource) -> Result<Vec<ProposedUpdate>, ShabadError> {
    let rules = IndexRules::new()?;
    let lines = source.all_lines()?;

    let updates: Vec<ProposedUpdate> = lines
        .iter()
        .filter_map(|line| {
            let computed = rules.compute_index(line);
            (computed != line.phonetic_index).then(|| ProposedUpdate {
                primary_key: line.primary_key.clone(),
                stored: line.phonetic_index.clone(),
                computed,
            })
        })
        .collect();

    tracing::info!(lines = lines.len(), updates = updates.len(), "phonetic index rebuilt");
    Ok(updates)
}

/// Statements joined for review.
pub fn report(updates: &[ProposedUpdate]) -> String {
    updates
        .iter()
        .map(ProposedUpdate::to_string)
        .collect::<Vec<_>>()
        .join(";\n")
}

pub fn write_report(updates: &[ProposedUpdate], path: &Path) -> Result<String, ShabadError> {
    let text = report(updates);
    std::fs::write(path, &text)?;
    tracing::info!(path = %path.display(), updates = updates.len(), "wrote index report");
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::fixture;

    fn computed(gurmukhi: &str, source_tag: &str) -> String {
        let line = ScriptureLine {
            gurmukhi: gurmukhi.to_string(),
            source_tag: source_tag.to_string(),
            ..Default::default()
        };
        IndexRules::new().unwrap().compute_index(&line)
    }

    #[test]
    fn test_plain_line() {
        assert_eq!(computed("hir hir nwmu jpu; mn myry ]1]", "G"), "hhnjmm");
    }

    #[test]
    fn test_padded_counter_is_not_indexed() {
        // `] 12 ]` would otherwise contribute the `1`
        assert_eq!(computed("gur kw sbdu ] 12 ]", "G"), "gks");
    }

    #[test]
    fn test_annotations_removed() {
        assert_eq!(computed("min vsY ] rhwau ]", "G"), "mv");
        assert_eq!(computed("jpu nwnk ] suDu", "G"), "jn");
    }

    #[test]
    fn test_headings_suppressed() {
        assert_eq!(computed("iblwvlu mhlw 3 ]", "G"), "");
        assert_eq!(computed("Awsw ] iqpdw ] iekqukw ]", "G"), "");
        assert_eq!(computed("slok kbIr jI", "G"), "");
    }

    #[test]
    fn test_dasam_metre_only_in_dasam() {
        assert_eq!(computed("BujMg pRXwq CMd ]", "D"), "");
        assert_eq!(computed("BujMg pRXwq CMd ]", "G"), "BpC");
    }

    #[test]
    fn test_single_letter_is_dropped() {
        assert_eq!(computed("hir ]", "G"), "");
    }

    #[test]
    fn test_statement_escapes_quotes() {
        let update = ProposedUpdate {
            primary_key: "7".to_string(),
            stored: String::new(),
            computed: "a'b".to_string(),
        };
        assert_eq!(update.to_string(), "UPDATE SHABAD SET FIRST_LETTERS='a''b' WHERE PK=7");
    }

    #[test]
    fn test_rebuild_against_store() {
        let updates = rebuild_phonetic_index(&fixture()).unwrap();
        assert_eq!(
            updates,
            vec![
                ProposedUpdate {
                    primary_key: "22".to_string(),
                    stored: "Aqe".to_string(),
                    computed: String::new(),
                },
                ProposedUpdate {
                    primary_key: "23".to_string(),
                    stored: String::new(),
                    computed: "sK".to_string(),
                },
            ]
        );
        assert_eq!(
            report(&updates),
            "UPDATE SHABAD SET FIRST_LETTERS='' WHERE PK=22;\nUPDATE SHABAD SET FIRST_LETTERS='sK' WHERE PK=23"
        );
    }
}
