//! Named worker pools and the execution-context hand-off.
//!
//! A [`Scheduler`] is a cloneable handle to a tokio runtime whose worker
//! threads all carry the scheduler's name. Pipelines never block on a
//! scheduler: `Source::subscribe*` submits the producer task and returns.
//!
//! Two directives place pipeline stages on schedulers:
//!
//! - `Source::subscribe_on(s)` ("begin"): the context the source's emission
//!   loop and every stage up to the first `publish_on` run on. When several
//!   are declared, the one nearest the source wins. This is resolved while the
//!   pipeline is built: a stage only records the directive if none is set yet.
//! - `Source::publish_on(s)` ("continue"): every stage declared after it runs
//!   on `s`, until the next `publish_on`.

use crate::config::SchedulerConfig;
use crate::error::FlowError;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::io;
use std::sync::Arc;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;

/// Pool used by subscriptions issued outside any tokio runtime.
static DEFAULT_POOL: Mutex<Option<Scheduler>> = parking_lot::const_mutex(None);

const DEFAULT_POOL_NAME: &str = "demandflow-parallel";

/// A named execution context tasks can be submitted to.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    name: String,
    handle: Handle,
    /// Present when this scheduler owns its runtime.
    runtime: Mutex<Option<Runtime>>,
}

impl Drop for SchedulerInner {
    fn drop(&mut self) {
        // May run on one of the pool's own workers; never block here.
        if let Some(runtime) = self.runtime.lock().take() {
            runtime.shutdown_background();
        }
    }
}

impl Scheduler {
    /// Builds an owned pool from a configuration.
    pub fn with_config(config: SchedulerConfig) -> io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(config.worker_threads.max(1))
            .max_blocking_threads(config.max_blocking_threads.max(1))
            .thread_name(config.name.clone())
            .enable_all()
            .build()?;

        tracing::debug!(
            scheduler = %config.name,
            workers = config.worker_threads,
            "worker pool started"
        );

        Ok(Self {
            inner: Arc::new(SchedulerInner {
                name: config.name,
                handle: runtime.handle().clone(),
                runtime: Mutex::new(Some(runtime)),
            }),
        })
    }

    /// A pool with exactly one worker thread.
    pub fn single(name: impl Into<String>) -> io::Result<Self> {
        Self::with_config(SchedulerConfig::new(name))
    }

    /// A pool with `threads` worker threads for non-blocking work.
    pub fn parallel(name: impl Into<String>, threads: usize) -> io::Result<Self> {
        Self::with_config(SchedulerConfig::new(name).with_worker_threads(threads))
    }

    /// A pool meant for blocking work: few async workers, up to
    /// `max_blocking` threads for [`Scheduler::run_blocking`].
    pub fn bounded_elastic(name: impl Into<String>, max_blocking: usize) -> io::Result<Self> {
        Self::with_config(
            SchedulerConfig::new(name)
                .with_worker_threads(1)
                .with_max_blocking_threads(max_blocking),
        )
    }

    /// Wraps an existing runtime handle without taking ownership of it.
    pub fn from_handle(name: impl Into<String>, handle: Handle) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                name: name.into(),
                handle,
                runtime: Mutex::new(None),
            }),
        }
    }

    /// The caller's runtime, or the process-wide default pool when called
    /// outside of one.
    pub fn current() -> Result<Self, FlowError> {
        if let Ok(handle) = Handle::try_current() {
            return Ok(Self::from_handle("current", handle));
        }

        let mut pool = DEFAULT_POOL.lock();
        if let Some(scheduler) = pool.as_ref() {
            return Ok(scheduler.clone());
        }
        let threads = std::thread::available_parallelism().map_or(2, usize::from);
        let scheduler = Self::parallel(DEFAULT_POOL_NAME, threads).map_err(FlowError::upstream)?;
        *pool = Some(scheduler.clone());
        Ok(scheduler)
    }

    /// Returns the scheduler's name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the underlying runtime handle.
    pub fn handle(&self) -> &Handle {
        &self.inner.handle
    }

    /// Submits a future to this scheduler's workers.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.inner.handle.spawn(future)
    }

    /// Runs a blocking closure on this scheduler's blocking threads, never on
    /// an async worker.
    pub fn run_blocking<F, R>(&self, f: F) -> JoinHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.inner.handle.spawn_blocking(f)
    }

    /// Returns `true` if both handles refer to the same scheduler instance.
    pub fn same_as(&self, other: &Scheduler) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("name", &self.inner.name)
            .field("owned", &self.inner.runtime.lock().is_some())
            .finish()
    }
}

/// Name of the thread the caller runs on, for diagnostics.
pub fn current_thread_name() -> String {
    std::thread::current()
        .name()
        .unwrap_or("<unnamed>")
        .to_string()
}
