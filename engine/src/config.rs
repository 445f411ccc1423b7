//! Runtime configuration, resolved from the environment

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CORPUS_DB: &str = "data.db";
pub const HISTORY_DB: &str = "history.db";
pub const REPORT_FILE: &str = "queries.txt";

pub const DEFAULT_BIND: &str = "127.0.0.1:42424";
pub const DEFAULT_RENDER_CACHE: usize = 64;

const DATA_DIR_VAR: &str = "SHABAD_DATA_DIR";
const BIND_VAR: &str = "SHABAD_BIND";
const RENDER_CACHE_VAR: &str = "SHABAD_RENDER_CACHE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub data_dir: PathBuf,
    pub bind: String,
    pub render_cache_capacity: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve settings through `lookup`, falling back to defaults for
    /// anything unset or unparseable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = lookup(DATA_DIR_VAR)
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);

        let bind = lookup(BIND_VAR)
            .filter(|addr| !addr.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BIND.to_string());

        let render_cache_capacity = match lookup(RENDER_CACHE_VAR) {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                tracing::warn!(value = %raw, "ignoring invalid {}", RENDER_CACHE_VAR);
                DEFAULT_RENDER_CACHE
            }),
            None => DEFAULT_RENDER_CACHE,
        };

        Self {
            data_dir,
            bind,
            render_cache_capacity,
        }
    }

    pub fn corpus_db(&self) -> PathBuf {
        self.data_dir.join(CORPUS_DB)
    }

    pub fn history_db(&self) -> PathBuf {
        self.data_dir.join(HISTORY_DB)
    }

    pub fn report_path(&self) -> PathBuf {
        self.data_dir.join(REPORT_FILE)
    }
}

/// Get the data directory
///
/// - `./data` when it already holds the corpus
/// - the platform data directory (`ShabadOS/`)
/// - `data` in the working directory as a last resort
pub fn default_data_dir() -> PathBuf {
    let local = PathBuf::from("data");
    if has_corpus(&local) {
        return local.canonicalize().unwrap_or(local);
    }

    if let Some(data_dir) = dirs::data_dir() {
        return data_dir.join("ShabadOS");
    }

    local
}

fn has_corpus(dir: &Path) -> bool {
    dir.join(CORPUS_DB).exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_explicit_settings() {
        let config = config(&[
            ("SHABAD_DATA_DIR", "/srv/shabad"),
            ("SHABAD_BIND", "0.0.0.0:8080"),
            ("SHABAD_RENDER_CACHE", "8"),
        ]);
        assert_eq!(config.data_dir, PathBuf::from("/srv/shabad"));
        assert_eq!(config.bind, "0.0.0.0:8080");
        assert_eq!(config.render_cache_capacity, 8);
        assert_eq!(config.corpus_db(), PathBuf::from("/srv/shabad/data.db"));
        assert_eq!(config.history_db(), PathBuf::from("/srv/shabad/history.db"));
        assert_eq!(config.report_path(), PathBuf::from("/srv/shabad/queries.txt"));
    }

    #[test]
    fn test_defaults() {
        let config = config(&[("SHABAD_DATA_DIR", "/srv/shabad"), ("SHABAD_RENDER_CACHE", "lots")]);
        assert_eq!(config.bind, DEFAULT_BIND);
        assert_eq!(config.render_cache_capacity, DEFAULT_RENDER_CACHE);
    }

    #[test]
    fn test_blank_data_dir_is_discovered() {
        let config = config(&[("SHABAD_DATA_DIR", "  ")]);
        assert_eq!(config.data_dir, default_data_dir());
    }
}
