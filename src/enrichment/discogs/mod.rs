//! Discogs API integration
//!
//! Secondary catalog source: `/database/search` with a personal access token.
//! Stronger than MusicBrainz on labels and catalog numbers for electronic
//! releases.
//!
//! API docs: https://www.discogs.com/developers#page:database,header:database-search

pub mod dto;
mod adapter;
mod client;

pub use adapter::to_candidates;
pub use client::DiscogsClient;
