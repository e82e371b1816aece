use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use crate::errors::StoreError;
use crate::utils::devlog;

pub const QUERY_TARGET: &str = "doclayer::query";

/// Command monitor: one started line and one succeeded or failed line per
/// store command, with a per-store request id. Silent until enabled.
#[derive(Debug)]
pub struct CommandMonitor {
    enabled: AtomicBool,
    next_request: AtomicU64,
}

impl Default for CommandMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}

impl CommandMonitor {
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self { enabled: AtomicBool::new(enabled), next_request: AtomicU64::new(1) }
    }

    pub fn set_enabled(&self, on: bool) {
        self.enabled.store(on, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Runs `f`, logging its lifecycle when enabled.
    ///
    /// # Errors
    /// Returns whatever `f` returns.
    pub fn observe<T>(
        &self,
        command: &str,
        collection: &str,
        detail: impl FnOnce() -> String,
        f: impl FnOnce() -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        if !self.is_enabled() {
            return f();
        }
        let request_id = self.next_request.fetch_add(1, Ordering::Relaxed);
        devlog::emit(
            QUERY_TARGET,
            log::Level::Debug,
            &format!("[{request_id}] {command} started on {collection}: {}", detail()),
        );
        let start = Instant::now();
        let out = f();
        let micros = start.elapsed().as_micros();
        match &out {
            Ok(_) => devlog::emit(
                QUERY_TARGET,
                log::Level::Debug,
                &format!("[{request_id}] {command} succeeded in {micros}µs"),
            ),
            Err(e) => devlog::emit(
                QUERY_TARGET,
                log::Level::Warn,
                &format!("[{request_id}] {command} failed in {micros}µs: {e}"),
            ),
        }
        out
    }
}
