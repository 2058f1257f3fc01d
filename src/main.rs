//! Album Organizer - sorts a music collection into a library layout.
//!
//! Scans a source tree for album directories, classifies their quality,
//! looks releases up in external catalogs, decides whether each album is
//! filed by artist, label, series, remixer or as underground, and moves it
//! with a journal that can be rolled back.

pub mod classifier;
pub mod cli;
pub mod config;
pub mod db;
pub mod decision;
pub mod enrichment;
pub mod error;
pub mod jobs;
pub mod metadata;
pub mod model;
pub mod organizer;
pub mod scanner;
#[cfg(test)]
pub mod test_utils;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("album_organizer=info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();

    cli::run_command(&args)
}
