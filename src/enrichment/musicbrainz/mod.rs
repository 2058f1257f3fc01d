//! MusicBrainz API integration
//!
//! Primary catalog source: release search by title and artist.
//!
//! API docs: https://musicbrainz.org/doc/MusicBrainz_API

pub mod dto;
mod adapter;
mod client;

pub use adapter::to_candidates;
pub(crate) use adapter::parse_year;
pub use client::MusicBrainzClient;
