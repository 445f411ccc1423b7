//! Navigation history log, stored in its own SQLite database

use crate::error::ShabadError;
use crate::line::ScriptureId;
use crate::search::RESULT_HOTKEYS;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;

/// Where a unit was last left.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub primary_key: String,
    pub toggle_lines: String,
}

/// Lookup used to pick the position a render opens at.
pub trait PositionLog: Send + Sync {
    fn last_position(&self, id: &ScriptureId) -> Result<Option<Position>, ShabadError>;
}

/// Line shown for Asa di Vaar entries, which have no single opening line.
const ASA_DI_VAAR_ID: &str = "adv";
const ASA_DI_VAAR_TITLE: &str = "Awsw dI vwr *";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub session: i64,
    pub shabad_id: String,
    pub primary_key: String,
    pub gurmukhi: String,
    pub transliteration: String,
    pub toggle_lines: String,
    pub created_at: String,
}

/// Fields written for one navigation.
#[derive(Debug, Clone, Default)]
pub struct NewEntry<'a> {
    pub session: i64,
    pub shabad_id: &'a str,
    pub primary_key: &'a str,
    pub gurmukhi: &'a str,
    pub transliteration: &'a str,
    pub toggle_lines: &'a str,
}

const ENTRY_COLUMNS: &str =
    "id, session, shabad_id, pk, gurmukhi, transliteration, toggle_lines, created_at";

fn row_to_entry(row: &Row) -> rusqlite::Result<HistoryEntry> {
    Ok(HistoryEntry {
        id: row.get(0)?,
        session: row.get(1)?,
        shabad_id: row.get(2)?,
        primary_key: row.get(3)?,
        gurmukhi: row.get(4)?,
        transliteration: row.get(5)?,
        toggle_lines: row.get(6)?,
        created_at: row.get(7)?,
    })
}

impl HistoryEntry {
    fn is_bani(&self) -> bool {
        self.shabad_id.parse::<i64>().is_err()
    }
}

/// Recent units as navigator anchors, newest first.
///
/// Numbering starts at 1 so the unit on screen, listed first, takes hotkey
/// `2` onward for the rest.
pub fn history_markup(entries: &[HistoryEntry]) -> String {
    let mut markup = String::new();
    for (i, entry) in entries.iter().enumerate() {
        let counter = i + 1;
        let href = if entry.is_bani() {
            format!("shabad?id={}", entry.shabad_id)
        } else {
            format!("shabad?id={}#{}${}", entry.shabad_id, entry.primary_key, entry.toggle_lines)
        };
        let (class_suffix, number) = match RESULT_HOTKEYS.get(counter) {
            Some(key) => (format!(" searchresult-{}", key), key.to_string()),
            None => (String::new(), "&nbsp;".to_string()),
        };
        markup.push_str(&format!(
            r#"<a href="{}" id="{}" class="navigationForDisplay searchResultUpdateHistory historyEntry" data-lineID="{}" data-shabadID="{}" title="{}"><div class="searchresult{}"><p class="gurmukhifont"><span class="codefont"><span class="number">{}</span></span>{}</p></div></a>"#,
            href,
            counter,
            entry.primary_key,
            entry.shabad_id,
            entry.transliteration,
            class_suffix,
            number,
            entry.gurmukhi
        ));
    }
    markup
}

pub struct HistoryLog {
    conn: Mutex<Connection>,
}

impl HistoryLog {
    /// Open (creating if missing) the history database.
    pub fn open(path: &Path) -> Result<Self, ShabadError> {
        let conn = Connection::open(path).map_err(ShabadError::database)?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self, ShabadError> {
        let conn = Connection::open_in_memory().map_err(ShabadError::database)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, ShabadError> {
        conn.execute_batch(
            r#"
            -- One row per visited unit, kept pointing at its latest line
            CREATE TABLE IF NOT EXISTS shabads (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session INTEGER NOT NULL,
                shabad_id TEXT NOT NULL,
                pk TEXT NOT NULL,
                gurmukhi TEXT NOT NULL,
                transliteration TEXT NOT NULL,
                toggle_lines TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            -- Every line sent to the display
            CREATE TABLE IF NOT EXISTS history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session INTEGER NOT NULL,
                shabad_id TEXT NOT NULL,
                pk TEXT NOT NULL,
                gurmukhi TEXT NOT NULL,
                transliteration TEXT NOT NULL,
                toggle_lines TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                started_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_history_shabad
            ON history(shabad_id, id DESC);

            CREATE INDEX IF NOT EXISTS idx_shabads_shabad
            ON shabads(shabad_id, id DESC);
            "#,
        )
        .map_err(ShabadError::database)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T, ShabadError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| ShabadError::Other("Failed to acquire history lock".to_string()))?;
        f(&conn).map_err(ShabadError::database)
    }

    /// Begin a new session and return its number.
    pub fn start_session(&self) -> Result<i64, ShabadError> {
        let now = chrono::Utc::now().to_rfc3339();
        self.with_conn(|conn| {
            conn.execute("INSERT INTO sessions (started_at) VALUES (?1)", [now])?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Record a newly opened unit.
    pub fn open_unit(&self, entry: &NewEntry) -> Result<i64, ShabadError> {
        self.insert("shabads", entry)
    }

    /// Record one displayed line.
    pub fn record_line(&self, entry: &NewEntry) -> Result<i64, ShabadError> {
        self.insert("history", entry)
    }

    fn insert(&self, table: &str, entry: &NewEntry) -> Result<i64, ShabadError> {
        let now = chrono::Utc::now().to_rfc3339();
        self.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO {} (session, shabad_id, pk, gurmukhi, transliteration, toggle_lines, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    table
                ),
                rusqlite::params![
                    entry.session,
                    entry.shabad_id,
                    entry.primary_key,
                    entry.gurmukhi,
                    entry.transliteration,
                    entry.toggle_lines,
                    now
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Point the most recent unit at a new main line.
    pub fn update_current_unit(&self, entry: &NewEntry) -> Result<(), ShabadError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE shabads SET pk = ?1, gurmukhi = ?2, transliteration = ?3, toggle_lines = ?4
                 WHERE id = (SELECT MAX(id) FROM shabads)",
                rusqlite::params![
                    entry.primary_key,
                    entry.gurmukhi,
                    entry.transliteration,
                    entry.toggle_lines
                ],
            )?;
            Ok(())
        })
    }

    pub fn update_current_toggle(&self, toggle_lines: &str) -> Result<(), ShabadError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE shabads SET toggle_lines = ?1 WHERE id = (SELECT MAX(id) FROM shabads)",
                [toggle_lines],
            )?;
            Ok(())
        })
    }

    /// Units visited, newest first.
    pub fn recent_units(&self, limit: usize) -> Result<Vec<HistoryEntry>, ShabadError> {
        let mut entries = self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM shabads ORDER BY id DESC LIMIT ?1",
                ENTRY_COLUMNS
            ))?;
            let rows = stmt
                .query_map([limit as i64], row_to_entry)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;
        for entry in entries.iter_mut().filter(|e| e.shabad_id == ASA_DI_VAAR_ID) {
            entry.gurmukhi = ASA_DI_VAAR_TITLE.to_string();
        }
        Ok(entries)
    }

    /// Every line shown, oldest first.
    pub fn lines(&self) -> Result<Vec<HistoryEntry>, ShabadError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("SELECT {} FROM history ORDER BY id", ENTRY_COLUMNS))?;
            let rows = stmt
                .query_map([], row_to_entry)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }
}

impl PositionLog for HistoryLog {
    fn last_position(&self, id: &ScriptureId) -> Result<Option<Position>, ShabadError> {
        // Banis resume at their last shown line; shabads only restore toggles
        let table = if id.is_bani() { "history" } else { "shabads" };
        let key = id.to_string();
        self.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "SELECT pk, toggle_lines FROM {} WHERE shabad_id = ?1 ORDER BY id DESC LIMIT 1",
                    table
                ),
                [key],
                |row| {
                    Ok(Position {
                        primary_key: row.get(0)?,
                        toggle_lines: row.get(1)?,
                    })
                },
            )
            .optional()
        })
    }
}
