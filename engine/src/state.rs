//! Application state management

use crate::cache::{CacheStats, RenderCache};
use crate::config::Config;
use crate::error::{log_failure, ShabadError};
use crate::history::{HistoryEntry, HistoryLog, NewEntry};
use crate::line::ScriptureId;
use crate::maintenance::{self, ProposedUpdate};
use crate::render::{render_scripture, Render, DEFAULT_TOGGLE_LINES};
use crate::search::{SearchEngine, SearchResults};
use crate::source::{LineSource, SqliteSource};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

/// Idle time after which the next navigation starts a new history session.
pub const SESSION_IDLE: Duration = Duration::from_secs(10 * 60);

/// Key and id the display uses for "nothing shown".
pub const CLEARED: &str = "0";

/// Page JSON of a blank display.
const CLEARED_PAGES: &str =
    r#"[{"gurmukhi":"","translation":"","transliteration":"","darpan":"","PK":"0"}]"#;

/// Units listed by the history view.
const RECENT_UNITS: usize = 100;

/// What the live display is showing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayState {
    pub shabad_id: String,
    pub primary_key: String,
    pub toggle_lines: String,
    pub main_id: String,
    pub pages: serde_json::Value,
}

impl Default for DisplayState {
    fn default() -> Self {
        Self {
            shabad_id: CLEARED.to_string(),
            primary_key: CLEARED.to_string(),
            toggle_lines: DEFAULT_TOGGLE_LINES.to_string(),
            main_id: CLEARED.to_string(),
            pages: parse_pages(CLEARED_PAGES),
        }
    }
}

/// Client-posted page JSON; kept as a string when it does not parse.
fn parse_pages(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

/// Payload polled by display clients.
#[derive(Debug, Clone, Serialize)]
pub struct DisplayJson {
    pub shabad: serde_json::Value,
    #[serde(rename = "shabadID")]
    pub shabad_id: String,
    #[serde(rename = "PK")]
    pub primary_key: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LineId {
    #[serde(rename = "shabadID")]
    pub shabad_id: String,
    #[serde(rename = "PK")]
    pub primary_key: String,
}

/// One navigation posted by a controller.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryPost {
    #[serde(rename = "PK", default)]
    pub primary_key: String,
    #[serde(rename = "shabadID", default)]
    pub shabad_id: String,
    #[serde(default)]
    pub shabad: String,
    #[serde(rename = "toggleLines", default)]
    pub toggle_lines: String,
    #[serde(rename = "mainID", default)]
    pub main_id: String,
}

struct SessionClock {
    session: i64,
    last_post: Instant,
}

/// Application state shared by every request
pub struct AppState {
    pub config: Config,
    pub source: Arc<dyn LineSource>,
    pub search_engine: Arc<SearchEngine>,
    pub render_cache: Arc<RenderCache>,
    pub history: Arc<HistoryLog>,
    display: RwLock<DisplayState>,
    session: Mutex<SessionClock>,
    session_idle: Duration,
}

impl AppState {
    /// Open the corpus and history databases named by `config`.
    pub fn new(config: Config) -> Result<Self> {
        let corpus_path = config.corpus_db();
        let source = SqliteSource::open(&corpus_path)
            .with_context(|| format!("Failed to open corpus at {:?}", corpus_path))?;
        tracing::info!(path = ?corpus_path, lines = source.line_count()?, "corpus opened");

        let history_path = config.history_db();
        let history = HistoryLog::open(&history_path)
            .with_context(|| format!("Failed to open history at {:?}", history_path))?;

        Ok(Self::from_parts(config, Arc::new(source), Arc::new(history))?)
    }

    pub fn from_parts(
        config: Config,
        source: Arc<dyn LineSource>,
        history: Arc<HistoryLog>,
    ) -> Result<Self, ShabadError> {
        let session = history.start_session()?;
        Ok(Self {
            search_engine: Arc::new(SearchEngine::new(Arc::clone(&source))),
            render_cache: Arc::new(RenderCache::new(config.render_cache_capacity)),
            config,
            source,
            history,
            display: RwLock::new(DisplayState::default()),
            session: Mutex::new(SessionClock {
                session,
                last_post: Instant::now(),
            }),
            session_idle: SESSION_IDLE,
        })
    }

    pub fn with_session_idle(mut self, idle: Duration) -> Self {
        self.session_idle = idle;
        self
    }

    /// Rendered pages of a unit, from the cache when present.
    pub fn render(&self, id: &ScriptureId) -> Arc<Render> {
        self.render_cache
            .get_or_render(id, || render_scripture(&*self.source, &*self.history, id))
    }

    pub fn search(&self, query: &str) -> SearchResults {
        self.search_engine.search(query)
    }

    pub fn rebuild_phonetic_index(&self) -> Result<Vec<ProposedUpdate>, ShabadError> {
        maintenance::rebuild_phonetic_index(&*self.source)
    }

    /// Rebuild the index and write the review report next to the corpus.
    pub fn write_index_report(&self) -> Result<String, ShabadError> {
        let updates = self.rebuild_phonetic_index()?;
        maintenance::write_report(&updates, &self.config.report_path())
    }

    pub fn display(&self) -> DisplayState {
        self.display
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn current_json(&self) -> DisplayJson {
        let display = self.display.read().unwrap_or_else(PoisonError::into_inner);
        DisplayJson {
            shabad: display.pages.clone(),
            shabad_id: display.shabad_id.clone(),
            primary_key: display.primary_key.clone(),
        }
    }

    pub fn current_line_id(&self) -> LineId {
        let display = self.display.read().unwrap_or_else(PoisonError::into_inner);
        LineId {
            shabad_id: display.shabad_id.clone(),
            primary_key: display.primary_key.clone(),
        }
    }

    pub fn clear_display(&self) {
        *self.display.write().unwrap_or_else(PoisonError::into_inner) = DisplayState::default();
    }

    /// Start a new history session now.
    pub fn new_session(&self) -> Result<i64, ShabadError> {
        let session = self.history.start_session()?;
        let mut clock = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        clock.session = session;
        clock.last_post = Instant::now();
        tracing::info!(session, "history session started");
        Ok(session)
    }

    /// Session for a navigation happening now, rotating after an idle gap.
    fn session_for_post(&self) -> i64 {
        let mut clock = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if clock.last_post.elapsed() > self.session_idle {
            match self.history.start_session() {
                Ok(session) => {
                    tracing::info!(session, "history session started after idle gap");
                    clock.session = session;
                }
                Err(e) => log_failure("history.session", &e),
            }
        }
        clock.last_post = Instant::now();
        clock.session
    }

    /// Record a navigation and update the live display.
    ///
    /// A primary key of `"0"` clears the display. History write failures are
    /// logged; the display is updated regardless.
    pub fn post_history(&self, post: &HistoryPost) {
        let session = self.session_for_post();

        let (gurmukhi, transliteration) = if post.primary_key == CLEARED {
            (String::new(), String::new())
        } else {
            self.line_text(&post.shabad_id, &post.primary_key)
        };

        let (snapshot, opened, main_changed, toggle_changed, previous_toggle) = {
            let mut display = self.display.write().unwrap_or_else(PoisonError::into_inner);
            if post.primary_key == CLEARED {
                *display = DisplayState::default();
                (display.clone(), false, false, false, String::new())
            } else {
                let previous_toggle = display.toggle_lines.clone();
                let opened = display.shabad_id != post.shabad_id;
                let main_changed = display.main_id != post.main_id;
                let toggle_changed = !main_changed && display.toggle_lines != post.toggle_lines;
                if main_changed {
                    display.main_id = post.main_id.clone();
                }
                if main_changed || toggle_changed {
                    display.toggle_lines = post.toggle_lines.clone();
                }
                display.shabad_id = post.shabad_id.clone();
                display.primary_key = post.primary_key.clone();
                display.pages = parse_pages(&post.shabad);
                (display.clone(), opened, main_changed, toggle_changed, previous_toggle)
            }
        };

        let entry = NewEntry {
            session,
            shabad_id: &snapshot.shabad_id,
            primary_key: &snapshot.primary_key,
            gurmukhi: &gurmukhi,
            transliteration: &transliteration,
            toggle_lines: &snapshot.toggle_lines,
        };

        if opened {
            // A new unit is logged with the toggles in force before this post
            let first = NewEntry {
                toggle_lines: &previous_toggle,
                ..entry.clone()
            };
            if let Err(e) = self.history.open_unit(&first) {
                log_failure("history.open_unit", &e);
            }
        }
        if main_changed {
            if let Err(e) = self.history.update_current_unit(&entry) {
                log_failure("history.main_line", &e);
            }
        } else if toggle_changed {
            if let Err(e) = self.history.update_current_toggle(&snapshot.toggle_lines) {
                log_failure("history.toggle", &e);
            }
        }
        if let Err(e) = self.history.record_line(&entry) {
            log_failure("history.record_line", &e);
        }

        // The opening position of a render comes from history
        if let Ok(id) = snapshot.shabad_id.parse::<ScriptureId>() {
            self.render_cache.invalidate(&id);
        }

        tracing::debug!(
            shabad = %snapshot.shabad_id,
            pk = %snapshot.primary_key,
            session,
            "history posted"
        );
    }

    fn line_text(&self, shabad_id: &str, primary_key: &str) -> (String, String) {
        let id = match shabad_id.parse::<ScriptureId>() {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(shabad_id, error = %e, "history post for unknown unit");
                return (String::new(), String::new());
            }
        };
        match self.source.line(&id, primary_key) {
            Ok(Some(line)) => (line.gurmukhi, line.transliteration),
            Ok(None) => (String::new(), String::new()),
            Err(e) => {
                log_failure("history.line", &e);
                (String::new(), String::new())
            }
        }
    }

    pub fn recent_history(&self) -> Result<Vec<HistoryEntry>, ShabadError> {
        self.history.recent_units(RECENT_UNITS)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.render_cache.stats()
    }
}
