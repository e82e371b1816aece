//! Message catalogue keyed by language and response type.
//!
//! Lookups fall back from the requested language to the default language,
//! then to the key itself, so a lookup never fails.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_LANGUAGE: &str = "en";

const EMBEDDED: &[(&str, &str)] = &[
    ("en", include_str!("../locales/en.json")),
    ("hi", include_str!("../locales/hi.json")),
];

#[derive(Debug, Error)]
pub enum LocaleError {
    #[error("failed to read locale directory {path}: {source}")]
    Io { path: String, source: std::io::Error },

    #[error("failed to parse locale file {file}: {source}")]
    Parse { file: String, source: serde_json::Error },

    #[error("no locale files found in {0}")]
    Empty(String),
}

#[derive(Debug)]
pub struct Locale {
    messages: RwLock<HashMap<String, HashMap<String, String>>>,
    default_lang: RwLock<String>,
}

impl Default for Locale {
    fn default() -> Self {
        Self::embedded()
    }
}

impl Locale {
    /// Empty catalogue; every lookup returns its key.
    #[must_use]
    pub fn empty() -> Self {
        Self { messages: RwLock::new(HashMap::new()), default_lang: RwLock::new(DEFAULT_LANGUAGE.to_string()) }
    }

    /// Catalogue built from the tables compiled into the crate.
    #[must_use]
    pub fn embedded() -> Self {
        let locale = Self::empty();
        for (lang, raw) in EMBEDDED {
            match serde_json::from_str::<HashMap<String, String>>(raw) {
                Ok(table) => locale.insert(lang, table),
                Err(e) => log::warn!("embedded locale {lang} unreadable: {e}"),
            }
        }
        locale
    }

    /// Adds or replaces the table for `lang`.
    pub fn insert(&self, lang: &str, table: HashMap<String, String>) {
        self.messages.write().insert(lang.to_string(), table);
    }

    /// Loads every `<lang>.json` in `dir`, replacing tables with the same language.
    ///
    /// # Errors
    /// When the directory cannot be read, holds no `.json` files, or a file
    /// is not a flat string map.
    pub fn load_dir(&self, dir: &Path) -> Result<usize, LocaleError> {
        let io_err = |source: std::io::Error| LocaleError::Io { path: dir.display().to_string(), source };
        let mut loaded = 0usize;
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(lang) = path.file_stem().and_then(|s| s.to_str()) else { continue };
            let raw = std::fs::read_to_string(&path).map_err(io_err)?;
            let table = serde_json::from_str(&raw)
                .map_err(|source| LocaleError::Parse { file: path.display().to_string(), source })?;
            self.insert(lang, table);
            loaded += 1;
        }
        if loaded == 0 {
            return Err(LocaleError::Empty(dir.display().to_string()));
        }
        log::debug!("loaded {loaded} locale files from {}", dir.display());
        Ok(loaded)
    }

    pub fn set_default_language(&self, lang: &str) {
        *self.default_lang.write() = lang.to_string();
    }

    #[must_use]
    pub fn default_language(&self) -> String {
        self.default_lang.read().clone()
    }

    /// Message for `key` in `lang`.
    #[must_use]
    pub fn get(&self, lang: &str, key: &str) -> String {
        let messages = self.messages.read();
        if let Some(msg) = messages.get(lang).and_then(|t| t.get(key)) {
            return msg.clone();
        }
        let default_lang = self.default_lang.read();
        if lang != default_lang.as_str()
            && let Some(msg) = messages.get(default_lang.as_str()).and_then(|t| t.get(key))
        {
            return msg.clone();
        }
        key.to_string()
    }

    /// Loaded languages, sorted.
    #[must_use]
    pub fn available_languages(&self) -> Vec<String> {
        let mut langs: Vec<String> = self.messages.read().keys().cloned().collect();
        langs.sort();
        langs
    }
}
