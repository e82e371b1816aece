//! Programmatic command runner behind the `doclayer` binary.

mod command;
mod runner;

pub use command::Command;
pub use runner::{App, Outcome, run};
