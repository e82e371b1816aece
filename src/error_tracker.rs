//! Layer-tagged error records.
//!
//! Each tracked error becomes one structured line on the `doclayer::tracker`
//! target at `error` level, with the caller's source location.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::panic::Location;

use crate::utils::devlog;

pub const TRACKER_TARGET: &str = "doclayer::tracker";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Layer {
    Route,
    Controller,
    Service,
    Repository,
    Dto,
    Middleware,
    Database,
    External,
}

impl Layer {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Route => "ROUTE",
            Self::Controller => "CONTROLLER",
            Self::Service => "SERVICE",
            Self::Repository => "REPOSITORY",
            Self::Dto => "DTO",
            Self::Middleware => "MIDDLEWARE",
            Self::Database => "DATABASE",
            Self::External => "EXTERNAL",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub layer: Layer,
    pub file: String,
    pub line: u32,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<(String, String)>,
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}:{} {} | {}: {}",
            self.layer,
            self.file,
            self.line,
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.message,
            self.error
        )?;
        for (k, v) in &self.details {
            write!(f, " | {k}={v}")?;
        }
        Ok(())
    }
}

fn emit(record: &ErrorRecord) {
    devlog::emit(TRACKER_TARGET, log::Level::Error, &record.to_string());
}

fn file_name(path: &str) -> String {
    path.rsplit(['/', '\\']).next().unwrap_or(path).to_string()
}

/// Logs `err` tagged with `layer` and the caller's location, and returns the record.
#[track_caller]
pub fn track(layer: Layer, message: &str, err: &dyn fmt::Display) -> ErrorRecord {
    let caller = Location::caller();
    let record = ErrorRecord {
        layer,
        file: file_name(caller.file()),
        line: caller.line(),
        timestamp: Utc::now(),
        message: message.to_string(),
        error: err.to_string(),
        details: Vec::new(),
    };
    emit(&record);
    record
}

/// Like [`track`], with extra key/value details appended in the given order.
#[track_caller]
pub fn track_with_details(
    layer: Layer,
    message: &str,
    err: &dyn fmt::Display,
    details: &[(&str, &dyn fmt::Display)],
) -> ErrorRecord {
    let caller = Location::caller();
    let record = ErrorRecord {
        layer,
        file: file_name(caller.file()),
        line: caller.line(),
        timestamp: Utc::now(),
        message: message.to_string(),
        error: err.to_string(),
        details: details.iter().map(|(k, v)| ((*k).to_string(), v.to_string())).collect(),
    };
    emit(&record);
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_caller_location_and_layer() {
        let _g = devlog::enable_thread_sink();
        let line = line!() + 1;
        let rec = track(Layer::Service, "create failed", &"boom");
        assert_eq!(rec.file, "error_tracker.rs");
        assert_eq!(rec.line, line);
        let lines = devlog::drain();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("[SERVICE] error_tracker.rs:"));
        assert!(lines[0].ends_with("create failed: boom"));
    }

    #[test]
    fn details_are_appended_in_order() {
        let _g = devlog::enable_thread_sink();
        let rec = track_with_details(Layer::Dto, "bad body", &"missing", &[("field", &"email"), ("n", &3)]);
        assert_eq!(rec.details.len(), 2);
        assert!(devlog::drain()[0].ends_with("| field=email | n=3"));
    }

    #[test]
    fn layer_names_are_upper_case() {
        assert_eq!(Layer::Repository.to_string(), "REPOSITORY");
        assert_eq!(serde_json::to_value(Layer::Dto).unwrap(), serde_json::json!("DTO"));
    }
}
