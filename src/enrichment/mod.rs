//! Release enrichment - looks up albums in external catalogs.
//!
//! # Architecture
//!
//! This module follows a clean separation between:
//! - **Domain models** (`domain.rs`) - Internal types that represent our business logic
//! - **API DTOs** (`musicbrainz/dto.rs`, `discogs/dto.rs`) - Exact API response shapes
//! - **Adapters** - Convert DTOs to domain models
//! - **Clients** - HTTP clients for external APIs
//! - **Rate limiting** (`ratelimit.rs`) - One shared token bucket per source
//! - **Scoring** (`scoring.rs`) - Weighted similarity and deterministic tie-breaks
//! - **Service** - Cache, limits, search and scoring in one call
//!
//! This decoupling means:
//! 1. API changes don't ripple through our codebase
//! 2. We can test API contracts independently
//! 3. Tests substitute mock catalogs for real ones
//!
//! # Usage
//!
//! ```ignore
//! use album_organizer::enrichment::{EnrichmentClient, ReleaseQuery};
//!
//! let client = EnrichmentClient::from_config(&config.enrichment, pool)?;
//! let record = client.enrich(&ReleaseQuery::from_record(&local).unwrap()).await?;
//! println!("{:?} ({:.2})", record.label, record.confidence);
//! ```

pub mod discogs;
pub mod domain;
pub mod musicbrainz;
pub mod ratelimit;
pub mod scoring;
pub mod service;
pub mod traits;

pub use domain::{EnrichmentError, ReleaseCandidate, ReleaseQuery};
pub use ratelimit::{RateLimit, RateLimiterRegistry, RateLimiterState, TokenBucket};
pub use scoring::{MatchWeights, apply_threshold, passes_threshold};
pub use service::{ClientSettings, EnrichmentClient};
pub use traits::CatalogSource;
