//! Store capabilities consumed by the catalog, plus in-memory backends.

use crate::domain::{Episode, Series};
use crate::error::StoreError;
use demandflow::{FlowError, Source};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

/// Primary store: series keyed by name.
///
/// Uses native async fn in traits; implementors write `async fn`.
pub trait SeriesStore: Send + Sync + 'static {
    /// Looks a series up by its unique name.
    fn find_by_name(&self, name: &str) -> impl Future<Output = Result<Option<Series>, StoreError>> + Send;

    /// Every series, as a fresh source per subscription.
    fn find_all(&self) -> Source<Series>;

    /// Inserts or replaces. Assigns an id when `series.id` is `None`,
    /// otherwise replaces the series carrying that id.
    fn save(&self, series: Series) -> impl Future<Output = Result<Series, StoreError>> + Send;

    /// Removes the series carrying `series.id`.
    fn delete(&self, series: &Series) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Secondary store: episodes keyed by owner name and by title.
pub trait EpisodeStore: Send + Sync + 'static {
    /// Episodes owned by `series_name`, computed at subscription time.
    fn find_by_series_name(&self, series_name: &str) -> Source<Episode>;

    /// Looks an episode up by its title.
    fn find_by_title(&self, title: &str) -> impl Future<Output = Result<Option<Episode>, StoreError>> + Send;

    /// Every episode.
    fn find_all(&self) -> Source<Episode>;

    /// Inserts or replaces, with the same id rules as [`SeriesStore::save`].
    fn save(&self, episode: Episode) -> impl Future<Output = Result<Episode, StoreError>> + Send;

    /// Removes the episode carrying `episode.id`.
    fn delete(&self, episode: &Episode) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Row identity shared by the in-memory stores.
trait Row: Clone {
    fn id(&self) -> Option<&str>;
    fn assign_id(&mut self, id: String);
    /// Unique natural key.
    fn key(&self) -> &str;
}

impl Row for Series {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
    fn assign_id(&mut self, id: String) {
        self.id = Some(id);
    }
    fn key(&self) -> &str {
        &self.name
    }
}

impl Row for Episode {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
    fn assign_id(&mut self, id: String) {
        self.id = Some(id);
    }
    fn key(&self) -> &str {
        &self.title
    }
}

/// Upserts `row` by id into `rows`, assigning an id if it has none.
///
/// A different row holding the same key is a conflict.
fn upsert<T: Row>(rows: &mut Vec<T>, mut row: T) -> Result<T, StoreError> {
    if rows
        .iter()
        .any(|existing| existing.key() == row.key() && existing.id() != row.id())
    {
        return Err(StoreError::Conflict(format!("{} already exists", row.key())));
    }

    if row.id().is_none() {
        row.assign_id(Uuid::new_v4().to_string());
    }
    match rows.iter_mut().find(|existing| existing.id() == row.id()) {
        Some(existing) => *existing = row.clone(),
        None => rows.push(row.clone()),
    }
    Ok(row)
}

/// Shared failure switch for in-memory stores.
#[derive(Debug, Default)]
struct Outage {
    reason: RwLock<Option<String>>,
}

impl Outage {
    fn check(&self) -> Result<(), StoreError> {
        match self.reason.read().as_ref() {
            Some(reason) => Err(StoreError::Unavailable(reason.clone())),
            None => Ok(()),
        }
    }
}

/// In-memory [`SeriesStore`], in insertion order.
#[derive(Debug, Clone, Default)]
pub struct InMemorySeriesStore {
    rows: Arc<RwLock<Vec<Series>>>,
    outage: Arc<Outage>,
}

impl InMemorySeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `rows` as they are (ids included).
    pub fn with_rows(rows: Vec<Series>) -> Self {
        Self {
            rows: Arc::new(RwLock::new(rows)),
            outage: Arc::default(),
        }
    }

    /// Makes every call fail with [`StoreError::Unavailable`] until cleared
    /// with `None`.
    pub fn set_unavailable(&self, reason: Option<&str>) {
        *self.outage.reason.write() = reason.map(str::to_string);
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

impl SeriesStore for InMemorySeriesStore {
    async fn find_by_name(&self, name: &str) -> Result<Option<Series>, StoreError> {
        self.outage.check()?;
        Ok(self.rows.read().iter().find(|s| s.name == name).cloned())
    }

    fn find_all(&self) -> Source<Series> {
        let rows = Arc::clone(&self.rows);
        let outage = Arc::clone(&self.outage);
        Source::defer(move || match outage.check() {
            Ok(()) => Source::from_iter(rows.read().clone()),
            Err(error) => Source::error(FlowError::upstream(error)),
        })
    }

    async fn save(&self, series: Series) -> Result<Series, StoreError> {
        self.outage.check()?;
        let saved = upsert(&mut self.rows.write(), series)?;
        tracing::debug!(name = %saved.name, id = ?saved.id, "series saved");
        Ok(saved)
    }

    async fn delete(&self, series: &Series) -> Result<(), StoreError> {
        self.outage.check()?;
        self.rows.write().retain(|s| s.id != series.id);
        tracing::debug!(name = %series.name, "series deleted");
        Ok(())
    }
}

/// In-memory [`EpisodeStore`], in insertion order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEpisodeStore {
    rows: Arc<RwLock<Vec<Episode>>>,
    owner_failures: Arc<RwLock<HashMap<String, StoreError>>>,
    outage: Arc<Outage>,
}

impl InMemoryEpisodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<Episode>) -> Self {
        Self {
            rows: Arc::new(RwLock::new(rows)),
            ..Self::default()
        }
    }

    /// Makes lookups by `series_name` fail with `error`, leaving every
    /// other owner untouched.
    pub fn fail_lookups_for(&self, series_name: impl Into<String>, error: StoreError) {
        self.owner_failures.write().insert(series_name.into(), error);
    }

    /// Makes every call fail with [`StoreError::Unavailable`] until cleared
    /// with `None`.
    pub fn set_unavailable(&self, reason: Option<&str>) {
        *self.outage.reason.write() = reason.map(str::to_string);
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

impl EpisodeStore for InMemoryEpisodeStore {
    fn find_by_series_name(&self, series_name: &str) -> Source<Episode> {
        let rows = Arc::clone(&self.rows);
        let failures = Arc::clone(&self.owner_failures);
        let outage = Arc::clone(&self.outage);
        let owner = series_name.to_string();

        Source::defer(move || {
            let failure = outage
                .check()
                .err()
                .or_else(|| failures.read().get(&owner).cloned());
            if let Some(error) = failure {
                return Source::error(FlowError::upstream(error));
            }
            let owned: Vec<Episode> = rows
                .read()
                .iter()
                .filter(|e| e.series_name == owner)
                .cloned()
                .collect();
            Source::from_iter(owned)
        })
    }

    async fn find_by_title(&self, title: &str) -> Result<Option<Episode>, StoreError> {
        self.outage.check()?;
        Ok(self.rows.read().iter().find(|e| e.title == title).cloned())
    }

    fn find_all(&self) -> Source<Episode> {
        let rows = Arc::clone(&self.rows);
        let outage = Arc::clone(&self.outage);
        Source::defer(move || match outage.check() {
            Ok(()) => Source::from_iter(rows.read().clone()),
            Err(error) => Source::error(FlowError::upstream(error)),
        })
    }

    async fn save(&self, episode: Episode) -> Result<Episode, StoreError> {
        self.outage.check()?;
        upsert(&mut self.rows.write(), episode)
    }

    async fn delete(&self, episode: &Episode) -> Result<(), StoreError> {
        self.outage.check()?;
        self.rows.write().retain(|e| e.id != episode.id);
        Ok(())
    }
}
