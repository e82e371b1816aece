//! Layered application configuration.
//!
//! Precedence, lowest first: defaults, TOML file, `DOCLAYER_*` environment,
//! command-line flags. The binary applies the last layer itself.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const ENV_PREFIX: &str = "DOCLAYER_";
pub const DEFAULT_CONFIG_FILE: &str = "doclayer.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("invalid config file {path}: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub env: String,
    /// Snapshot file backing the store; `None` keeps data in memory only.
    pub data_path: Option<PathBuf>,
    pub db_name: String,
    /// Enables the command monitor.
    pub debug: bool,
    pub default_lang: String,
    /// Default deadline for repository operations; `0` disables it.
    pub query_timeout_ms: u64,
    pub log_dir: Option<PathBuf>,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            env: "development".into(),
            data_path: None,
            db_name: "doclayer".into(),
            debug: false,
            default_lang: crate::locale::DEFAULT_LANGUAGE.into(),
            query_timeout_ms: 30_000,
            log_dir: None,
            log_level: "info".into(),
        }
    }
}

/// Same fields, all optional, so a file only overrides what it names.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileLayer {
    env: Option<String>,
    data_path: Option<PathBuf>,
    db_name: Option<String>,
    debug: Option<bool>,
    default_lang: Option<String>,
    query_timeout_ms: Option<u64>,
    log_dir: Option<PathBuf>,
    log_level: Option<String>,
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue { key: key.into(), value: value.into() }),
    }
}

impl AppConfig {
    /// Loads from the process environment and the default file locations.
    ///
    /// # Errors
    /// See [`AppConfig::load_with`].
    pub fn load(cli_path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(cli_path, |k| std::env::var(k).ok())
    }

    /// Loads with `env` standing in for the process environment.
    ///
    /// The file is `cli_path`, else `DOCLAYER_CONFIG`, else `./doclayer.toml`
    /// when it exists. An explicitly named file must exist.
    ///
    /// # Errors
    /// Unreadable or malformed files and unparsable environment values.
    pub fn load_with(cli_path: Option<&Path>, env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        let explicit = cli_path.map(Path::to_path_buf).or_else(|| env("DOCLAYER_CONFIG").map(PathBuf::from));
        match explicit {
            Some(path) => cfg.apply_file(&path)?,
            None => {
                let local = PathBuf::from(DEFAULT_CONFIG_FILE);
                if local.exists() {
                    cfg.apply_file(&local)?;
                }
            }
        }
        cfg.apply_env(&env)?;
        Ok(cfg)
    }

    fn apply_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        let layer: FileLayer =
            toml::from_str(&raw).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
        log::debug!("config file {}", path.display());
        if let Some(v) = layer.env {
            self.env = v;
        }
        if layer.data_path.is_some() {
            self.data_path = layer.data_path;
        }
        if let Some(v) = layer.db_name {
            self.db_name = v;
        }
        if let Some(v) = layer.debug {
            self.debug = v;
        }
        if let Some(v) = layer.default_lang {
            self.default_lang = v;
        }
        if let Some(v) = layer.query_timeout_ms {
            self.query_timeout_ms = v;
        }
        if layer.log_dir.is_some() {
            self.log_dir = layer.log_dir;
        }
        if let Some(v) = layer.log_level {
            self.log_level = v;
        }
        Ok(())
    }

    fn apply_env(&mut self, env: &impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let var = |name: &str| env(&format!("{ENV_PREFIX}{name}")).filter(|v| !v.is_empty());
        if let Some(v) = var("ENV") {
            self.env = v;
        }
        if let Some(v) = var("DATA") {
            self.data_path = Some(PathBuf::from(v));
        }
        if let Some(v) = var("DB_NAME") {
            self.db_name = v;
        }
        if let Some(v) = var("DEBUG") {
            self.debug = parse_bool("DOCLAYER_DEBUG", &v)?;
        }
        if let Some(v) = var("DEFAULT_LANG") {
            self.default_lang = v;
        }
        if let Some(v) = var("QUERY_TIMEOUT_MS") {
            self.query_timeout_ms = v
                .parse()
                .map_err(|_| ConfigError::InvalidValue { key: "DOCLAYER_QUERY_TIMEOUT_MS".into(), value: v })?;
        }
        if let Some(v) = var("LOG_DIR") {
            self.log_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = var("LOG_LEVEL") {
            self.log_level = v;
        }
        Ok(())
    }

    #[must_use]
    pub const fn query_timeout(&self) -> Option<Duration> {
        if self.query_timeout_ms == 0 { None } else { Some(Duration::from_millis(self.query_timeout_ms)) }
    }

    #[must_use]
    pub fn is_production(&self) -> bool {
        self.env.eq_ignore_ascii_case("production")
    }
}
