//! Configuration for demand windows and worker pools.

/// Configuration for how far producers may run ahead of demand and how
/// internal stage adapters request demand from their upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowConfig {
    /// Items a producer may enqueue beyond the demand granted so far.
    ///
    /// Items above outstanding demand are buffered, never dropped. Once the
    /// buffer reaches the watermark, `Emitter::emit` suspends until the
    /// consumer requests more.
    ///
    /// Default: 32
    pub watermark: usize,

    /// Demand a stage adapter requests from its upstream up front.
    ///
    /// The adapter replenishes in windows of [`FlowConfig::limit`] once that
    /// many items have been consumed, so upstream never has more than
    /// `prefetch` items outstanding.
    ///
    /// Default: 32
    pub prefetch: usize,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            watermark: 32,
            prefetch: 32,
        }
    }
}

impl FlowConfig {
    /// Lockstep configuration: one item in flight per stage.
    pub fn low_latency() -> Self {
        Self {
            watermark: 1,
            prefetch: 1,
        }
    }

    /// Creates a high-throughput configuration with larger windows.
    pub fn high_throughput() -> Self {
        Self {
            watermark: 256,
            prefetch: 256,
        }
    }

    /// Sets the watermark.
    pub fn with_watermark(mut self, watermark: usize) -> Self {
        self.watermark = watermark;
        self
    }

    /// Sets the prefetch window. Zero is clamped to one.
    pub fn with_prefetch(mut self, prefetch: usize) -> Self {
        self.prefetch = prefetch.max(1);
        self
    }

    /// Replenish threshold: the adapter re-requests after consuming this many
    /// items (75% of the prefetch window, at least one).
    #[inline]
    pub fn limit(&self) -> usize {
        let prefetch = self.prefetch.max(1);
        (prefetch - prefetch / 4).max(1)
    }
}

/// Configuration for a named worker pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Thread name prefix; every worker thread of the pool carries this name.
    pub name: String,
    /// Number of async worker threads.
    pub worker_threads: usize,
    /// Upper bound on threads used for blocking work routed to this pool.
    pub max_blocking_threads: usize,
}

impl SchedulerConfig {
    /// Creates a configuration with a single worker and a small blocking pool.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            worker_threads: 1,
            max_blocking_threads: 8,
        }
    }

    /// Sets the number of worker threads. Zero is clamped to one.
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads.max(1);
        self
    }

    /// Sets the blocking thread cap. Zero is clamped to one.
    pub fn with_max_blocking_threads(mut self, threads: usize) -> Self {
        self.max_blocking_threads = threads.max(1);
        self
    }
}
