//! Page rendering: folds scripture lines into navigable pages
//!
//! A page closes whenever a row's key differs from the key of the row that
//! follows it, as reported by a second, independently ordered query. Rows that
//! share a line key (several rows of one bani line) fold into one page.

use crate::error::log_failure;
use crate::history::PositionLog;
use crate::line::{ScriptureId, ScriptureLine};
use crate::source::LineSource;
use crate::vishraam::{annotate_line, NBSP};
use serde::Serialize;

/// Shortcut keys handed out to new pages, in order.
pub const HOTKEYS: [char; 36] = [
    '1', '2', '3', '4', '5', '6', '7', '8', '9', '0', 'q', 'w', 'e', 'r', 't', 'y', 'u', 'i', 'o',
    'p', 'a', 's', 'd', 'f', 'g', 'h', 'j', 'k', 'l', 'z', 'x', 'c', 'v', 'b', 'n', 'm',
];

/// Successor key used once the lookahead runs out.
pub const LOOKAHEAD_SENTINEL: &str = "-1";

pub const DEFAULT_TOGGLE_LINES: &str = "0-0-0";

/// Line a bani opens at when it has no history.
const DEFAULT_BANI_KEY: &str = "1";

/// Left behind when a row's markup collapses to nothing.
const EMPTY_BLOCK: &str = "<div><div></div></div>";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedPage {
    pub line_number: u32,
    /// Key of the row that closed the page
    pub primary_key: String,
    pub primary_keys: Vec<String>,
    pub gurmukhi: String,
    pub transliteration: String,
    pub translation: String,
    pub secondary_translation: String,
    pub markup: String,
    pub hotkey: Option<char>,
    pub page_id: usize,
    pub is_continuation: bool,
}

/// Page record as the display clients read it.
#[derive(Serialize)]
struct PageRecord<'a> {
    gurmukhi: &'a str,
    transliteration: &'a str,
    translation: &'a str,
    darpan: &'a str,
    #[serde(rename = "lineID")]
    line_id: String,
    #[serde(rename = "PK")]
    primary_key: &'a str,
}

impl<'a> From<&'a RenderedPage> for PageRecord<'a> {
    fn from(page: &'a RenderedPage) -> Self {
        Self {
            gurmukhi: &page.gurmukhi,
            transliteration: &page.transliteration,
            translation: &page.translation,
            darpan: &page.secondary_translation,
            line_id: page.line_number.to_string(),
            primary_key: &page.primary_key,
        }
    }
}

/// Result of one pagination pass.
#[derive(Debug, Clone, Default)]
pub struct Pagination {
    pub pages: Vec<RenderedPage>,
    pub markup: String,
    /// Number of pages that started a new group and were offered a hotkey
    pub hotkey_groups: usize,
}

impl Pagination {
    /// Page records as a JSON array.
    pub fn json(&self) -> String {
        let records: Vec<PageRecord> = self.pages.iter().map(PageRecord::from).collect();
        serde_json::to_string(&records).unwrap_or_else(|_| "[]".to_string())
    }
}

#[derive(Default)]
struct PageAccumulator {
    gurmukhi: String,
    transliteration: String,
    translation: String,
    secondary_translation: String,
    primary_keys: Vec<String>,
}

impl PageAccumulator {
    fn push(&mut self, line: &ScriptureLine) {
        let folds_into_page = !self.gurmukhi.is_empty();
        self.gurmukhi.push_str("<div><div>");
        if folds_into_page {
            self.gurmukhi.push_str(NBSP);
        }
        self.gurmukhi.push_str(&annotate_line(&line.gurmukhi));
        self.gurmukhi.push_str("</div></div>");

        for (acc, text) in [
            (&mut self.transliteration, &line.transliteration),
            (&mut self.translation, &line.translation),
            (&mut self.secondary_translation, &line.secondary_translation),
        ] {
            acc.push(' ');
            acc.push_str(text);
        }
        self.primary_keys.push(line.primary_key.clone());
    }
}

fn strip_empty_blocks(mut markup: String) -> String {
    while markup.contains(EMPTY_BLOCK) {
        markup = markup.replace(EMPTY_BLOCK, "");
    }
    markup
}

/// Stateful pass over the rows of one unit.
pub struct Paginator<'a> {
    scripture_id: &'a str,
    acc: PageAccumulator,
    line_number: u32,
    hotkey_counter: usize,
    last_group: Option<i64>,
    out: Pagination,
}

impl<'a> Paginator<'a> {
    pub fn new(scripture_id: &'a str) -> Self {
        Self {
            scripture_id,
            acc: PageAccumulator::default(),
            line_number: 1,
            hotkey_counter: 0,
            last_group: None,
            out: Pagination::default(),
        }
    }

    /// Fold one row in; `next_key` is the lookahead key at this position.
    pub fn push(&mut self, line: &ScriptureLine, next_key: &str) {
        self.acc.push(line);
        if line.primary_key != next_key {
            self.close_page(line);
        }
    }

    fn close_page(&mut self, line: &ScriptureLine) {
        let acc = std::mem::take(&mut self.acc);
        let is_continuation = self.last_group == Some(line.page_group);

        let hotkey = if is_continuation {
            None
        } else {
            let hotkey = HOTKEYS.get(self.hotkey_counter).copied();
            self.hotkey_counter += 1;
            hotkey
        };

        let gurmukhi = strip_empty_blocks(acc.gurmukhi);
        let markup = self.page_markup(line, &gurmukhi, hotkey, is_continuation);
        self.out.markup.push_str(&markup);
        self.out.pages.push(RenderedPage {
            line_number: self.line_number,
            primary_key: line.primary_key.clone(),
            primary_keys: acc.primary_keys,
            gurmukhi,
            transliteration: acc.transliteration.trim_start_matches(' ').to_string(),
            translation: acc.translation.trim_start_matches(' ').to_string(),
            secondary_translation: acc.secondary_translation.trim_start_matches(' ').to_string(),
            markup,
            hotkey,
            page_id: self.hotkey_counter,
            is_continuation,
        });

        self.line_number += 1;
        self.last_group = Some(line.page_group);
    }

    fn page_markup(
        &self,
        line: &ScriptureLine,
        gurmukhi: &str,
        hotkey: Option<char>,
        is_continuation: bool,
    ) -> String {
        let key = hotkey.map(String::from).unwrap_or_default();
        let mut markup = format!(
            r#"<span id="{}" class="navigationForDisplay line{} {}" data-lineID="{}" data-shabadID="{}" data-pageID="{}" data-shabadType="{}"><div class="searchresult"#,
            line.primary_key,
            self.line_number,
            if is_continuation { "notHotkey" } else { "hotkey" },
            self.line_number,
            self.scripture_id,
            self.hotkey_counter,
            line.unit_type,
        );
        if !is_continuation {
            markup.push_str(&format!(
                r#" last{} pageID{} searchresult-{}" data-hotkey="yes"#,
                self.hotkey_counter - 1,
                self.hotkey_counter,
                key
            ));
        }
        markup.push_str(&format!(
            r#""><div><div class="gurmukhifont"><span class="codefont"><span class="number">{}</span></span>{}</div></div></div></span>"#,
            key, gurmukhi
        ));
        markup
    }

    pub fn finish(self) -> Pagination {
        let mut out = self.out;
        out.hotkey_groups = self.hotkey_counter;
        out
    }
}

/// Paginate `lines`, pairing each with the key of its successor.
///
/// `successors` runs in lockstep with `lines`; once it is exhausted every
/// remaining row is compared against [`LOOKAHEAD_SENTINEL`].
pub fn paginate<'l, L, K>(scripture_id: &str, lines: L, successors: K) -> Pagination
where
    L: IntoIterator<Item = &'l ScriptureLine>,
    K: IntoIterator<Item = String>,
{
    let mut paginator = Paginator::new(scripture_id);
    let mut successors = successors.into_iter();
    for line in lines {
        let next_key = successors
            .next()
            .unwrap_or_else(|| LOOKAHEAD_SENTINEL.to_string());
        paginator.push(line, &next_key);
    }
    paginator.finish()
}

/// A finished render of one unit.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Render {
    pub scripture_id: String,
    pub pages: Vec<RenderedPage>,
    pub markup: String,
    pub json: String,
    pub page_count: usize,
    pub hotkey_groups: usize,
    pub default_primary_key: String,
    pub toggle_lines: String,
}

impl Render {
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Page count the navigator pages through: one per `data-pageID`, so
    /// continuation pages do not count.
    pub fn total_pages(&self) -> usize {
        self.hotkey_groups
    }
}

/// Fetch, paginate and position one unit.
///
/// Store failures are logged and rendering continues with whatever was read.
pub fn render_scripture(
    source: &dyn LineSource,
    positions: &dyn PositionLog,
    id: &ScriptureId,
) -> Render {
    let lines = source.lines(id).unwrap_or_else(|e| {
        log_failure("render.lines", &e);
        Vec::new()
    });
    let keys = source.line_keys(id).unwrap_or_else(|e| {
        log_failure("render.keys", &e);
        Vec::new()
    });
    let position = positions.last_position(id).unwrap_or_else(|e| {
        log_failure("render.position", &e);
        None
    });

    let scripture_id = id.to_string();
    // The lookahead cursor starts one row ahead
    let pagination = paginate(&scripture_id, &lines, keys.into_iter().skip(1));
    let json = pagination.json();

    let (default_primary_key, toggle_lines) = match (id, position) {
        (ScriptureId::Bani(_), Some(position)) => (position.primary_key, DEFAULT_TOGGLE_LINES.to_string()),
        (ScriptureId::Bani(_), None) => (DEFAULT_BANI_KEY.to_string(), DEFAULT_TOGGLE_LINES.to_string()),
        (ScriptureId::Shabad { .. }, position) => (
            pagination
                .pages
                .first()
                .map(|p| p.primary_key.clone())
                .unwrap_or_default(),
            position
                .map(|p| p.toggle_lines)
                .unwrap_or_else(|| DEFAULT_TOGGLE_LINES.to_string()),
        ),
    };

    tracing::info!(
        scripture = %scripture_id,
        rows = lines.len(),
        pages = pagination.pages.len(),
        "rendered scripture"
    );

    Render {
        scripture_id,
        page_count: pagination.pages.len(),
        hotkey_groups: pagination.hotkey_groups,
        pages: pagination.pages,
        markup: pagination.markup,
        json,
        default_primary_key,
        toggle_lines,
    }
}
