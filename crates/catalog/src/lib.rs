//! Series/episode catalog built on demand-windowed sources.
//!
//! [`CatalogService`] joins every series (looked up by its unique name) with
//! the episodes a secondary lookup returns for that name. Single lookups
//! fail with `NotFound` for an unknown name; the batch join isolates
//! per-series failures and reports them together at the end.
//!
//! Stores are capabilities ([`SeriesStore`], [`EpisodeStore`]) using native
//! async fn in traits. In-memory backends and a JSON snapshot loader are
//! included.

pub mod config;
pub mod domain;
pub mod episode_service;
pub mod error;
pub mod service;
pub mod snapshot;
pub mod store;

pub use config::CatalogConfig;
pub use domain::{Episode, EpisodeView, Series, SeriesView};
pub use episode_service::EpisodeService;
pub use error::{CatalogError, EntityKind, ResponseClass, StoreError};
pub use service::{BatchOutcome, CatalogService};
pub use snapshot::CatalogSnapshot;
pub use store::{EpisodeStore, InMemoryEpisodeStore, InMemorySeriesStore, SeriesStore};
