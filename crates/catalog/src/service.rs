//! Joins each series with its episodes into a [`SeriesView`].
//!
//! The episode collection is computed at join time by a lookup keyed on the
//! series name and fully drained before a view is returned.

use crate::config::CatalogConfig;
use crate::domain::{EpisodeView, Series, SeriesView};
use crate::episode_service::EpisodeService;
use crate::error::{CatalogError, EntityKind, StoreError};
use crate::store::{EpisodeStore, SeriesStore};
use demandflow::{merge_with_options, ErrorMode, FlowConfig, FlowError, MergeOptions, Source, StreamExt};
use std::sync::Arc;

/// Result of [`CatalogService::fetch_all_best_effort`]: every composite that
/// could be built plus the failure that ended the batch, if any.
#[derive(Debug)]
pub struct BatchOutcome {
    pub composites: Vec<SeriesView>,
    pub failure: Option<CatalogError>,
}

impl BatchOutcome {
    /// Returns `true` if every series was joined.
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }

    /// Returns the composites, or the failure if there was one.
    pub fn into_result(self) -> Result<Vec<SeriesView>, CatalogError> {
        match self.failure {
            Some(failure) => Err(failure),
            None => Ok(self.composites),
        }
    }
}

/// Aggregation service over a series store and an episode store.
#[derive(Debug)]
pub struct CatalogService<S, E> {
    series: Arc<S>,
    episodes: Arc<E>,
    config: CatalogConfig,
}

impl<S, E> Clone for CatalogService<S, E> {
    fn clone(&self) -> Self {
        Self {
            series: Arc::clone(&self.series),
            episodes: Arc::clone(&self.episodes),
            config: self.config,
        }
    }
}

impl<S: SeriesStore, E: EpisodeStore> CatalogService<S, E> {
    pub fn new(series: S, episodes: E) -> Self {
        Self::with_config(series, episodes, CatalogConfig::default())
    }

    pub fn with_config(series: S, episodes: E, config: CatalogConfig) -> Self {
        Self {
            series: Arc::new(series),
            episodes: Arc::new(episodes),
            config,
        }
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    pub fn series_store(&self) -> &S {
        &self.series
    }

    pub fn episode_store(&self) -> &E {
        &self.episodes
    }

    /// An episode service sharing this service's episode store.
    pub fn episode_service(&self) -> EpisodeService<E> {
        EpisodeService::from_shared(Arc::clone(&self.episodes))
    }

    /// Returns the composite for `name`.
    ///
    /// # Errors
    ///
    /// `NotFound` if no series has that name. A series without episodes is
    /// a composite with an empty list.
    pub async fn fetch_composite(&self, name: &str) -> Result<SeriesView, CatalogError> {
        let series = self.require(name).await?;
        self.join(series).await
    }

    /// Every composite, one join per series.
    ///
    /// Joins run concurrently up to `merge_concurrency`. A failing join does
    /// not stop the others; its failure is deferred and the stream ends
    /// with an aggregate of every deferred failure after all other
    /// composites were emitted. An episode lookup reporting an unknown
    /// owner counts as an empty list.
    pub fn fetch_all_composite(&self) -> Source<SeriesView> {
        let primaries = self.series.find_all();
        let episodes = Arc::clone(&self.episodes);
        let config = self.config;

        Source::create(move |emitter| {
            let primaries = primaries.clone();
            let episodes = Arc::clone(&episodes);
            async move {
                let mut listed = emitter.open(&primaries);
                let mut joins = Vec::new();
                while let Some(series) = listed.next().await {
                    joins.push(join_source(episodes.as_ref(), series?, config.flow));
                }
                tracing::debug!(
                    series = joins.len(),
                    concurrency = ?config.merge_concurrency,
                    "joining all series"
                );

                let options = MergeOptions {
                    max_concurrency: config.merge_concurrency,
                    errors: ErrorMode::Deferred,
                };
                let mut joined = emitter.open(&merge_with_options(joins, options));
                while let Some(view) = joined.next().await {
                    emitter.emit(view?).await?;
                }
                Ok(())
            }
        })
    }

    /// Drains [`fetch_all_composite`](Self::fetch_all_composite), keeping
    /// the successful composites alongside the terminal failure.
    pub async fn fetch_all_best_effort(&self) -> BatchOutcome {
        let mut stream = self.fetch_all_composite().into_stream();
        let mut composites = Vec::new();
        let mut failure = None;
        while let Some(item) = stream.next().await {
            match item {
                Ok(view) => composites.push(view),
                Err(error) => {
                    failure = Some(CatalogError::from(error));
                    break;
                }
            }
        }
        BatchOutcome {
            composites,
            failure,
        }
    }

    /// Saves a new series and returns its composite.
    pub async fn create_composite(&self, series: Series) -> Result<SeriesView, CatalogError> {
        let saved = self.series.save(series).await?;
        tracing::debug!(name = %saved.name, "series created");
        self.join(saved).await
    }

    /// Replaces the series named `name` with `series`, keeping the stored
    /// identifier whatever `series.id` holds.
    ///
    /// # Errors
    ///
    /// `NotFound` if no series has that name.
    pub async fn update_composite(
        &self,
        name: &str,
        series: Series,
    ) -> Result<SeriesView, CatalogError> {
        let current = self.require(name).await?;
        let saved = self
            .series
            .save(Series {
                id: current.id,
                ..series
            })
            .await?;
        tracing::debug!(from = name, to = %saved.name, "series updated");
        self.join(saved).await
    }

    /// Deletes the series named `name` and returns its last composite.
    ///
    /// # Errors
    ///
    /// `NotFound` if no series has that name.
    pub async fn delete_composite(&self, name: &str) -> Result<SeriesView, CatalogError> {
        let current = self.require(name).await?;
        self.series.delete(&current).await?;
        tracing::debug!(name, "series deleted");
        self.join(current).await
    }

    async fn require(&self, name: &str) -> Result<Series, CatalogError> {
        self.series
            .find_by_name(name)
            .await?
            .ok_or_else(|| CatalogError::not_found(EntityKind::Series, name))
    }

    async fn join(&self, series: Series) -> Result<SeriesView, CatalogError> {
        let episodes = episodes_of(self.episodes.as_ref(), &series.name, self.config.flow)
            .collect()
            .await?;
        Ok(SeriesView::assemble(series, episodes))
    }
}

fn episodes_of<E: EpisodeStore>(store: &E, owner: &str, flow: FlowConfig) -> Source<EpisodeView> {
    store
        .find_by_series_name(owner)
        .with_config(flow)
        .map(EpisodeView::from)
}

/// One batch join: a single-item source yielding the composite for `series`.
fn join_source<E: EpisodeStore>(store: &E, series: Series, flow: FlowConfig) -> Source<SeriesView> {
    let lookup = episodes_of(store, &series.name, flow).on_error_resume(|error| {
        match StoreError::from_flow(&error) {
            Some(StoreError::OwnerNotFound(owner)) => {
                tracing::debug!(%owner, "owner unknown to episode store, treating as empty");
                Source::empty()
            }
            _ => Source::error(error),
        }
    });

    Source::from_future(move || {
        let lookup = lookup.clone();
        let series = series.clone();
        async move {
            let episodes = lookup.collect().await?;
            Ok::<_, FlowError>(SeriesView::assemble(series, episodes))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Episode;
    use crate::store::{InMemoryEpisodeStore, InMemorySeriesStore};

    async fn seeded() -> CatalogService<InMemorySeriesStore, InMemoryEpisodeStore> {
        let service = CatalogService::new(InMemorySeriesStore::new(), InMemoryEpisodeStore::new());
        service.series_store().save(Series::new("Naruto")).await.unwrap();
        for title in ["Ep 1", "Ep 2"] {
            service
                .episode_store()
                .save(Episode::new("Naruto", title))
                .await
                .unwrap();
        }
        service
    }

    #[tokio::test]
    async fn test_composite_keeps_episode_order() {
        let service = seeded().await;
        let view = service.fetch_composite("Naruto").await.unwrap();
        let titles: Vec<&str> = view.episodes.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Ep 1", "Ep 2"]);
    }

    #[tokio::test]
    async fn test_delete_returns_last_view() {
        let service = seeded().await;
        let view = service.delete_composite("Naruto").await.unwrap();
        assert_eq!(view.episodes.len(), 2);
        assert!(service.series_store().is_empty());
        assert!(service.fetch_composite("Naruto").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_batch_outcome_into_result() {
        let service = seeded().await;
        let outcome = service.fetch_all_best_effort().await;
        assert!(outcome.is_complete());
        assert_eq!(outcome.into_result().unwrap().len(), 1);
    }
}
