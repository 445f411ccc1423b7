//! Row source: the tabular store the engine reads scripture lines from

use crate::error::ShabadError;
use crate::line::{ScriptureId, ScriptureLine, SHABAD_UNIT};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, Row};
use std::path::Path;
use std::sync::Mutex;

/// Everything the renderer, the search engine and the maintenance job need
/// from the store.
pub trait LineSource: Send + Sync {
    /// Rows of one unit in display order.
    fn lines(&self, id: &ScriptureId) -> Result<Vec<ScriptureLine>, ShabadError>;

    /// Line keys of one unit from an independent query, used as the
    /// pagination lookahead.
    fn line_keys(&self, id: &ScriptureId) -> Result<Vec<String>, ShabadError>;

    /// The row a unit shows for `primary_key`.
    fn line(&self, id: &ScriptureId, primary_key: &str) -> Result<Option<ScriptureLine>, ShabadError>;

    /// Rows whose Gurmukhi contains every token.
    fn search_text(&self, tokens: &[String], limit: usize) -> Result<Vec<ScriptureLine>, ShabadError>;

    /// Rows whose stored first letters match a GLOB pattern.
    fn search_letters(&self, pattern: &str, limit: usize) -> Result<Vec<ScriptureLine>, ShabadError>;

    /// Every stored row, for index maintenance.
    fn all_lines(&self) -> Result<Vec<ScriptureLine>, ShabadError>;

    fn line_count(&self) -> Result<u64, ShabadError>;
}

const SHABAD_COLUMNS: &str =
    "PK, SHABAD_ID, GURMUKHI, TRANSLITERATION, ENGLISH, PUNJABI, FIRST_LETTERS, SOURCE_ID";

const BANI_COLUMNS: &str = "BANI_LINE_ID, SHABAD_ID, GURMUKHI, TRANSLITERATION, ENGLISH, PUNJABI, \
     FIRST_LETTERS, SOURCE_ID, BANI_SHABAD_TYPE, BANI_PAGE_ID";

const HIT_COLUMNS: &str = "PK, SHABAD_ID, GURMUKHI, FIRST_LETTERS";

/// Keys are integers in the shipped database but are handled as text.
fn key_text(row: &Row, idx: usize) -> rusqlite::Result<String> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) | ValueRef::Blob(t) => String::from_utf8_lossy(t).into_owned(),
    })
}

fn text(row: &Row, idx: usize) -> rusqlite::Result<String> {
    Ok(row.get::<_, Option<String>>(idx)?.unwrap_or_default())
}

fn row_to_line(row: &Row) -> rusqlite::Result<ScriptureLine> {
    Ok(ScriptureLine {
        primary_key: key_text(row, 0)?,
        scripture_id: key_text(row, 1)?,
        gurmukhi: text(row, 2)?,
        transliteration: text(row, 3)?,
        translation: text(row, 4)?,
        secondary_translation: text(row, 5)?,
        unit_type: SHABAD_UNIT.to_string(),
        page_group: 0,
        phonetic_index: text(row, 6)?,
        source_tag: text(row, 7)?,
    })
}

fn row_to_bani_line(row: &Row) -> rusqlite::Result<ScriptureLine> {
    let mut line = row_to_line(row)?;
    if let Some(unit_type) = row.get::<_, Option<String>>(8)? {
        line.unit_type = unit_type;
    }
    line.page_group = row.get::<_, Option<i64>>(9)?.unwrap_or_default();
    Ok(line)
}

fn row_to_hit(row: &Row) -> rusqlite::Result<ScriptureLine> {
    Ok(ScriptureLine {
        primary_key: key_text(row, 0)?,
        scripture_id: key_text(row, 1)?,
        gurmukhi: text(row, 2)?,
        phonetic_index: text(row, 3)?,
        ..Default::default()
    })
}

/// Escape `LIKE` wildcards so tokens match as plain substrings.
fn like_pattern(token: &str) -> String {
    let mut escaped = String::with_capacity(token.len() + 2);
    escaped.push('%');
    for c in token.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// `LineSource` over the Shabad OS SQLite database.
pub struct SqliteSource {
    conn: Mutex<Connection>,
}

impl SqliteSource {
    /// Open the corpus database read-only.
    pub fn open(path: &Path) -> Result<Self, ShabadError> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(ShabadError::database)?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self { conn: Mutex::new(conn) }
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T, ShabadError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| ShabadError::Other("Failed to acquire database lock".to_string()))?;
        f(&conn).map_err(ShabadError::database)
    }
}

impl LineSource for SqliteSource {
    fn lines(&self, id: &ScriptureId) -> Result<Vec<ScriptureLine>, ShabadError> {
        self.with_conn(|conn| match id {
            ScriptureId::Shabad { id: shabad_id, .. } => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM SHABAD WHERE SHABAD_ID = ?1",
                    SHABAD_COLUMNS
                ))?;
                let mut lines = stmt
                    .query_map([shabad_id], row_to_line)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                // Standalone hymns have no page ids; every row is its own group
                for (i, line) in lines.iter_mut().enumerate() {
                    line.page_group = i as i64 + 1;
                }
                Ok(lines)
            }
            ScriptureId::Bani(name) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM SHABAD NATURAL JOIN bani_{}",
                    BANI_COLUMNS, name
                ))?;
                let lines = stmt
                    .query_map([], row_to_bani_line)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(lines)
            }
        })
    }

    fn line_keys(&self, id: &ScriptureId) -> Result<Vec<String>, ShabadError> {
        self.with_conn(|conn| {
            let (sql, params): (String, Vec<i64>) = match id {
                ScriptureId::Shabad { id: shabad_id, .. } => {
                    ("SELECT PK FROM SHABAD WHERE SHABAD_ID = ?1".to_string(), vec![*shabad_id])
                }
                ScriptureId::Bani(name) => (format!("SELECT BANI_LINE_ID FROM bani_{}", name), vec![]),
            };
            let mut stmt = conn.prepare(&sql)?;
            let keys = stmt
                .query_map(rusqlite::params_from_iter(params), |row| key_text(row, 0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(keys)
        })
    }

    fn line(&self, id: &ScriptureId, primary_key: &str) -> Result<Option<ScriptureLine>, ShabadError> {
        self.with_conn(|conn| {
            let (sql, mapper): (String, fn(&Row) -> rusqlite::Result<ScriptureLine>) = match id {
                ScriptureId::Shabad { .. } => (
                    format!("SELECT {} FROM SHABAD WHERE PK = ?1", SHABAD_COLUMNS),
                    row_to_line,
                ),
                ScriptureId::Bani(name) => (
                    format!(
                        "SELECT {} FROM SHABAD NATURAL JOIN bani_{} WHERE BANI_LINE_ID = ?1",
                        BANI_COLUMNS, name
                    ),
                    row_to_bani_line,
                ),
            };
            let mut stmt = conn.prepare(&sql)?;
            // A bani line can span several rows; the last one wins
            let lines = stmt
                .query_map([primary_key], mapper)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(lines.into_iter().last())
        })
    }

    fn search_text(&self, tokens: &[String], limit: usize) -> Result<Vec<ScriptureLine>, ShabadError> {
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        let filter = tokens
            .iter()
            .enumerate()
            .map(|(i, _)| format!("GURMUKHI LIKE ?{} ESCAPE '\\'", i + 1))
            .collect::<Vec<_>>()
            .join(" AND ");
        let sql = format!(
            "SELECT {} FROM SHABAD WHERE {} LIMIT {}",
            HIT_COLUMNS, filter, limit
        );
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let hits = stmt
                .query_map(
                    rusqlite::params_from_iter(tokens.iter().map(|t| like_pattern(t))),
                    row_to_hit,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(hits)
        })
    }

    fn search_letters(&self, pattern: &str, limit: usize) -> Result<Vec<ScriptureLine>, ShabadError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM SHABAD WHERE FIRST_LETTERS GLOB ?1 LIMIT ?2",
                HIT_COLUMNS
            ))?;
            let hits = stmt
                .query_map(rusqlite::params![pattern, limit as i64], row_to_hit)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(hits)
        })
    }

    fn all_lines(&self) -> Result<Vec<ScriptureLine>, ShabadError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("SELECT {} FROM SHABAD", SHABAD_COLUMNS))?;
            let lines = stmt
                .query_map([], row_to_line)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(lines)
        })
    }

    fn line_count(&self) -> Result<u64, ShabadError> {
        self.with_conn(|conn| conn.query_row("SELECT COUNT(*) FROM SHABAD", [], |row| row.get::<_, i64>(0)))
            .map(|n| n as u64)
    }
}

/// In-memory corpus shared by the engine's tests.
#[cfg(test)]
pub(crate) fn fixture() -> SqliteSource {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        r#"
        CREATE TABLE SHABAD (
            PK INTEGER PRIMARY KEY,
            SHABAD_ID INTEGER NOT NULL,
            GURMUKHI TEXT NOT NULL,
            TRANSLITERATION TEXT,
            ENGLISH TEXT,
            PUNJABI TEXT,
            FIRST_LETTERS TEXT,
            SOURCE_ID TEXT
        );
        CREATE TABLE bani_test (
            PK INTEGER NOT NULL,
            BANI_LINE_ID INTEGER NOT NULL,
            BANI_SHABAD_TYPE TEXT,
            BANI_PAGE_ID INTEGER
        );

        INSERT INTO SHABAD VALUES
            (10, 1, 'hir hir nwmu jpu; mn myry ]1]', 'har har naam jap man mere', 'Chant the Name', 'ਹਰਿ ਨਾਮੁ', 'hhnjmm', 'G'),
            (11, 1, 'iblwvlu mhlw 3 ]', 'bilaaval mahalaa 3', 'Bilaaval, Third Mehl', NULL, '', 'G'),
            (12, 1, 'gur kw sbdu, min vsY. ]2]', 'gur kaa sabad man vasai', 'The Word of the Guru', NULL, 'gksmv', 'G'),
            (20, 2, 'nwnk dws sdw kurbwxu ]', 'naanak daas sadaa kurabaan', 'Slave Nanak', NULL, 'ndsk', 'G'),
            (21, 2, 'jpu nwnk dws ]3]', 'jap naanak daas', 'Chant, Nanak', NULL, 'jnd', 'G'),
            (22, 2, 'Awsw ] iqpdw ] iekqukw ]', 'aasaa tipadaa ikatukaa', NULL, NULL, 'Aqe', 'G'),
            (23, 2, 'Sbd ^uAwr ]', 'shabad khuaar', NULL, NULL, '', 'G'),
            (30, 3, 'BujMg pRXwq CMd ]', 'bhuja(n)g prayaat chha(n)d', NULL, NULL, '', 'D');

        INSERT INTO bani_test VALUES
            (10, 1, 'shabad', 1),
            (11, 1, 'shabad', 1),
            (12, 2, 'shabad', 2),
            (20, 3, 'sloku', 2);
        "#,
    )
    .unwrap();
    SqliteSource::from_connection(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shabad_lines_get_synthesized_groups() {
        let source = fixture();
        let lines = source.lines(&ScriptureId::shabad(1)).unwrap();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines.iter().map(|l| l.page_group).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(lines[0].primary_key, "10");
        assert_eq!(lines[0].secondary_translation, "ਹਰਿ ਨਾਮੁ");
        assert_eq!(lines[1].secondary_translation, "");
        assert_eq!(lines[0].unit_type, "shabad");
    }

    #[test]
    fn test_bani_lines_read_page_ids() {
        let source = fixture();
        let id = ScriptureId::Bani("test".to_string());
        let lines = source.lines(&id).unwrap();
        assert_eq!(
            lines.iter().map(|l| l.primary_key.as_str()).collect::<Vec<_>>(),
            vec!["1", "1", "2", "3"]
        );
        assert_eq!(lines[3].unit_type, "sloku");
        assert_eq!(lines[3].page_group, 2);
        assert_eq!(source.line_keys(&id).unwrap(), vec!["1", "1", "2", "3"]);
    }

    #[test]
    fn test_line_lookup() {
        let source = fixture();
        let line = source.line(&ScriptureId::shabad(2), "21").unwrap().unwrap();
        assert_eq!(line.transliteration, "jap naanak daas");

        let bani = ScriptureId::Bani("test".to_string());
        let line = source.line(&bani, "1").unwrap().unwrap();
        assert_eq!(line.gurmukhi, "iblwvlu mhlw 3 ]");
        assert!(source.line(&bani, "99").unwrap().is_none());
    }

    #[test]
    fn test_search_text_is_conjunctive() {
        let source = fixture();
        let hits = source
            .search_text(&["nwnk".to_string(), "dws".to_string()], 20)
            .unwrap();
        assert_eq!(
            hits.iter().map(|h| h.primary_key.as_str()).collect::<Vec<_>>(),
            vec!["20", "21"]
        );
        let hits = source.search_text(&["nwnk".to_string(), "sdw".to_string()], 20).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_search_text_treats_wildcards_literally() {
        let source = fixture();
        assert!(source.search_text(&["%".to_string()], 20).unwrap().is_empty());
        assert!(source.search_text(&["n_nk".to_string()], 20).unwrap().is_empty());
    }

    #[test]
    fn test_search_letters_glob() {
        let source = fixture();
        let hits = source.search_letters("nd?*", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].scripture_id, "2");
        assert_eq!(hits[0].phonetic_index, "ndsk");
    }

    #[test]
    fn test_line_count() {
        assert_eq!(fixture().line_count().unwrap(), 8);
    }

    #[test]
    fn test_missing_bani_table_is_an_error() {
        let source = fixture();
        let err = source.lines(&ScriptureId::Bani("missing".to_string())).unwrap_err();
        assert!(matches!(err, ShabadError::Database(_)));
    }
}
