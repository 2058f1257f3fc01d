//! Command-line interface for album-organizer.
//!
//! A thin front end over the job registry and the move journal: organize a
//! source tree, inspect the journal, roll a batch back.

mod commands;

pub use commands::{Cli, Commands, run_command};
