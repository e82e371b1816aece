//! log4rs initialisation.
//!
//! The console always receives records at the configured level. With a log
//! directory, `app.log` takes the root logger while `audit.log` and
//! `query.log` take the `doclayer::audit` and `doclayer::query` targets
//! exclusively; each file rolls at 10 MiB.

use log::LevelFilter;
use log4rs::Handle;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::rolling_file::policy::compound::{
    CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
};
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::Path;
use std::sync::OnceLock;

use crate::store::QUERY_TARGET;

pub const AUDIT_TARGET: &str = "doclayer::audit";

const FILE_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}";
const CONSOLE_PATTERN: &str = "{d(%H:%M:%S%.3f)} {h({l:<5})} {t} - {m}{n}";
const ROLL_SIZE: u64 = 10 * 1024 * 1024;
const DEFAULT_RETENTION: u32 = 7;

static HANDLE: OnceLock<Handle> = OnceLock::new();

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[must_use]
pub fn parse_level(level: &str) -> LevelFilter {
    match level.to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

fn rolling(dir: &Path, stem: &str, keep: u32) -> Result<RollingFileAppender, BoxError> {
    let roller = FixedWindowRoller::builder().build(&dir.join(format!("{stem}.{{}}.log")).to_string_lossy(), keep)?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(ROLL_SIZE)), Box::new(roller));
    Ok(RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(FILE_PATTERN)))
        .build(dir.join(format!("{stem}.log")), Box::new(policy))?)
}

/// Builds the log4rs configuration without installing it.
///
/// # Errors
/// When the log directory or a rolling appender cannot be created.
pub fn build_config(dir: Option<&Path>, level: LevelFilter, retention: Option<u32>) -> Result<Config, BoxError> {
    let console = ConsoleAppender::builder().encoder(Box::new(PatternEncoder::new(CONSOLE_PATTERN))).build();
    let mut builder = Config::builder().appender(Appender::builder().build("console", Box::new(console)));
    let mut root = Root::builder().appender("console");

    if let Some(dir) = dir {
        std::fs::create_dir_all(dir)?;
        let keep = retention.unwrap_or(DEFAULT_RETENTION);
        builder = builder
            .appender(Appender::builder().build("app", Box::new(rolling(dir, "app", keep)?)))
            .appender(Appender::builder().build("audit", Box::new(rolling(dir, "audit", keep)?)))
            .appender(Appender::builder().build("query", Box::new(rolling(dir, "query", keep)?)))
            .logger(Logger::builder().appender("audit").additive(false).build(AUDIT_TARGET, level))
            .logger(Logger::builder().appender("query").additive(false).build(QUERY_TARGET, level));
        root = root.appender("app");
    }
    Ok(builder.build(root.build(level))?)
}

/// Installs the configuration, or swaps it in when logging is already set up.
///
/// # Errors
/// See [`build_config`]; also when another logger owns the `log` facade.
pub fn configure_logging(dir: Option<&Path>, level: Option<&str>, retention: Option<u32>) -> Result<(), BoxError> {
    let config = build_config(dir, level.map_or(LevelFilter::Info, parse_level), retention)?;
    if let Some(handle) = HANDLE.get() {
        handle.set_config(config);
        return Ok(());
    }
    let handle = log4rs::init_config(config)?;
    // a concurrent initialiser would already have failed in init_config
    let _ = HANDLE.set(handle);
    Ok(())
}

/// Configures from `DOCLAYER_LOG_DIR`, `DOCLAYER_LOG_LEVEL` and
/// `DOCLAYER_LOG_RETENTION`, falling back to the given values.
///
/// # Errors
/// See [`configure_logging`].
pub fn configure_from_env(dir: Option<&Path>, level: &str) -> Result<(), BoxError> {
    let env_dir = std::env::var("DOCLAYER_LOG_DIR").ok().filter(|s| !s.is_empty());
    let env_level = std::env::var("DOCLAYER_LOG_LEVEL").ok().filter(|s| !s.is_empty());
    let retention = std::env::var("DOCLAYER_LOG_RETENTION").ok().and_then(|s| s.parse::<u32>().ok());
    let dir = env_dir.as_deref().map(Path::new).or(dir);
    configure_logging(dir, Some(env_level.as_deref().unwrap_or(level)), retention)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names() {
        assert_eq!(parse_level("DEBUG"), LevelFilter::Debug);
        assert_eq!(parse_level("off"), LevelFilter::Off);
        assert_eq!(parse_level("bogus"), LevelFilter::Info);
    }

    #[test]
    fn file_appenders_create_directory() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        let cfg = build_config(Some(&logs), LevelFilter::Info, Some(2)).unwrap();
        assert!(logs.is_dir());
        assert_eq!(cfg.appenders().len(), 4);
        assert_eq!(cfg.loggers().len(), 2);
    }

    #[test]
    fn console_only_without_directory() {
        let cfg = build_config(None, LevelFilter::Warn, None).unwrap();
        assert_eq!(cfg.appenders().len(), 1);
        assert_eq!(cfg.root().level(), LevelFilter::Warn);
    }
}
