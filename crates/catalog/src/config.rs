//! Configuration for the catalog service.

use demandflow::FlowConfig;

/// Configuration for joins issued by `CatalogService`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogConfig {
    /// How many series are joined concurrently by `fetch_all_composite`.
    /// `None` joins all of them at once.
    ///
    /// Default: `Some(8)`
    pub merge_concurrency: Option<usize>,

    /// Flow configuration applied to secondary (episode) lookups.
    pub flow: FlowConfig,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            merge_concurrency: Some(8),
            flow: FlowConfig::default(),
        }
    }
}

impl CatalogConfig {
    /// Sets the batch join concurrency. Zero is clamped to one.
    #[must_use]
    pub fn with_merge_concurrency(mut self, concurrency: usize) -> Self {
        self.merge_concurrency = Some(concurrency.max(1));
        self
    }

    /// Joins every series at once.
    #[must_use]
    pub fn unbounded(mut self) -> Self {
        self.merge_concurrency = None;
        self
    }

    /// Sets the flow configuration for secondary lookups.
    #[must_use]
    pub fn with_flow(mut self, flow: FlowConfig) -> Self {
        self.flow = flow;
        self
    }
}
