//! Thread-local capture of structured log lines.
//!
//! Lines are always routed through the global `log` facade; tests can also
//! enable a per-thread sink and assert on what was emitted without racing
//! other tests on the global logger.

use std::cell::RefCell;

thread_local! {
    static TL_SINK: RefCell<Option<Vec<String>>> = const { RefCell::new(None) };
}

/// Guard that disables the thread-local sink on drop.
pub struct SinkGuard;

impl Drop for SinkGuard {
    fn drop(&mut self) {
        TL_SINK.with(|s| *s.borrow_mut() = None);
    }
}

/// Enable the thread-local sink for the current thread.
#[must_use]
pub fn enable_thread_sink() -> SinkGuard {
    TL_SINK.with(|s| *s.borrow_mut() = Some(Vec::new()));
    SinkGuard
}

fn write_str(msg: &str) {
    TL_SINK.with(|s| {
        if let Some(buf) = s.borrow_mut().as_mut() {
            buf.push(msg.to_owned());
        }
    });
}

/// Drain the captured lines for the current thread. Empty when the sink is disabled.
pub fn drain() -> Vec<String> {
    TL_SINK.with(|s| s.borrow_mut().as_mut().map(std::mem::take).unwrap_or_default())
}

/// Captured lines without clearing them.
#[must_use]
pub fn snapshot() -> Vec<String> {
    TL_SINK.with(|s| s.borrow().as_ref().cloned().unwrap_or_default())
}

/// Logs `msg` on `target` and captures it when the sink is enabled.
pub fn emit(target: &str, level: log::Level, msg: &str) {
    write_str(msg);
    log::log!(target: target, level, "{msg}");
}
