//! Shabad engine - Gurbani line rendering and first-letter search
//!
//! Backend library for the presenter: paginates scripture units into display
//! markup, answers literal and first-letter searches, and keeps the
//! navigation history.

// Line records and annotation come first, everything else builds on them
pub mod line;
pub mod vishraam;
pub mod letters;
pub mod error;
pub mod source;
pub mod history;
pub mod render;
pub mod search;
pub mod maintenance;
pub mod cache;
pub mod config;
pub mod state;

pub use error::ShabadError;
pub use line::{ScriptureId, ScriptureLine};
pub use letters::PhoneticIndex;
pub use source::{LineSource, SqliteSource};
pub use history::{history_markup, HistoryEntry, HistoryLog, Position, PositionLog};
pub use render::{render_scripture, Render, RenderedPage};
pub use search::{SearchEngine, SearchHit, SearchMode, SearchResults, Strategy};
pub use maintenance::{rebuild_phonetic_index, ProposedUpdate};
pub use cache::{CacheStats, RenderCache};
pub use config::Config;
pub use state::{AppState, DisplayJson, DisplayState, HistoryPost, LineId};
