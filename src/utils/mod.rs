//! Logging plumbing: log4rs setup and the thread-local capture sink.
pub mod devlog;
pub mod logger;
