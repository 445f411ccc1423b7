//! Scripture line records and identifiers

use crate::error::ShabadError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unit type recorded for standalone hymns.
pub const SHABAD_UNIT: &str = "shabad";

/// Identifies what is being rendered: a standalone hymn by numeric id, or a
/// compiled sequence (bani) by table name.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum ScriptureId {
    /// `text` is the id as it was requested (`"007"`, `"+7"`). Markup,
    /// history keys and the display state echo it unchanged; only the store
    /// lookup uses the number.
    Shabad { id: i64, text: String },
    Bani(String),
}

impl ScriptureId {
    pub fn shabad(id: i64) -> Self {
        ScriptureId::Shabad {
            id,
            text: id.to_string(),
        }
    }

    pub fn is_bani(&self) -> bool {
        matches!(self, ScriptureId::Bani(_))
    }
}

impl FromStr for ScriptureId {
    type Err = ShabadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(id) = s.parse::<i64>() {
            return Ok(ScriptureId::Shabad {
                id,
                text: s.to_string(),
            });
        }
        // Bani names end up in a table name, keep them to identifier characters
        if s.is_empty() || !s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ShabadError::InvalidQuery(format!("invalid scripture id `{}`", s)));
        }
        Ok(ScriptureId::Bani(s.to_string()))
    }
}

impl fmt::Display for ScriptureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptureId::Shabad { text, .. } => f.write_str(text),
            ScriptureId::Bani(name) => f.write_str(name),
        }
    }
}

/// One row of source text as read from the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptureLine {
    pub primary_key: String,
    /// `SHABAD_ID` of the row, the parent used for navigation links
    pub scripture_id: String,
    pub gurmukhi: String,
    pub transliteration: String,
    pub translation: String,
    pub secondary_translation: String,
    pub unit_type: String,
    pub page_group: i64,
    pub phonetic_index: String,
    pub source_tag: String,
}
