//! Episode lookups and mutations, keyed by title.

use crate::domain::{Episode, EpisodeView};
use crate::error::{CatalogError, EntityKind};
use crate::store::EpisodeStore;
use demandflow::Source;
use std::sync::Arc;

#[derive(Debug)]
pub struct EpisodeService<E> {
    store: Arc<E>,
}

impl<E> Clone for EpisodeService<E> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<E: EpisodeStore> EpisodeService<E> {
    pub fn new(store: E) -> Self {
        Self::from_shared(Arc::new(store))
    }

    pub(crate) fn from_shared(store: Arc<E>) -> Self {
        Self { store }
    }

    pub fn find_all(&self) -> Source<EpisodeView> {
        self.store.find_all().map(EpisodeView::from)
    }

    /// Episodes owned by `series_name`; empty when it owns none.
    pub fn find_by_series_name(&self, series_name: &str) -> Source<EpisodeView> {
        self.store.find_by_series_name(series_name).map(EpisodeView::from)
    }

    /// # Errors
    ///
    /// `NotFound` if no episode has that title.
    pub async fn find_by_title(&self, title: &str) -> Result<EpisodeView, CatalogError> {
        self.require(title).await.map(EpisodeView::from)
    }

    pub async fn create(&self, episode: Episode) -> Result<EpisodeView, CatalogError> {
        let saved = self.store.save(episode).await?;
        Ok(EpisodeView::from(saved))
    }

    /// Replaces the episode titled `title`, keeping its identifier.
    ///
    /// # Errors
    ///
    /// `NotFound` if no episode has that title.
    pub async fn update(&self, title: &str, episode: Episode) -> Result<EpisodeView, CatalogError> {
        let current = self.require(title).await?;
        let saved = self
            .store
            .save(Episode {
                id: current.id,
                ..episode
            })
            .await?;
        tracing::debug!(from = title, to = %saved.title, "episode updated");
        Ok(EpisodeView::from(saved))
    }

    /// Deletes the episode titled `title` and returns its last view.
    ///
    /// # Errors
    ///
    /// `NotFound` if no episode has that title.
    pub async fn delete(&self, title: &str) -> Result<EpisodeView, CatalogError> {
        let current = self.require(title).await?;
        self.store.delete(&current).await?;
        Ok(EpisodeView::from(current))
    }

    async fn require(&self, title: &str) -> Result<Episode, CatalogError> {
        self.store
            .find_by_title(title)
            .await?
            .ok_or_else(|| CatalogError::not_found(EntityKind::Episode, title))
    }
}
