//! The `Source` pipeline type, its constructors and terminal consumers.

use crate::config::FlowConfig;
use crate::emitter::Emitter;
use crate::error::FlowError;
use crate::scheduler::Scheduler;
use crate::stream::SourceStream;
use crate::subscription::{LambdaSubscriber, Subscriber, SubscriptionCore, SubscriptionHandle};
use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};

type Body<T> = Arc<dyn Fn(Emitter<T>) -> BoxFuture<'static, Result<(), FlowError>> + Send + Sync>;

/// A cold, restartable producer of items.
///
/// A `Source` is a description of work: nothing runs until it is subscribed,
/// and every subscription is an independent run of the body. Operators
/// return new sources; each stage runs as its own task that pulls from its
/// upstream through a windowed [`SourceStream`].
pub struct Source<T> {
    body: Body<T>,
    begin: Option<Scheduler>,
    exec: Option<Scheduler>,
    config: FlowConfig,
}

impl<T> Clone for Source<T> {
    fn clone(&self) -> Self {
        Self {
            body: Arc::clone(&self.body),
            begin: self.begin.clone(),
            exec: self.exec.clone(),
            config: self.config,
        }
    }
}

impl<T> fmt::Debug for Source<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("begin", &self.begin.as_ref().map(Scheduler::name))
            .field("exec", &self.exec.as_ref().map(Scheduler::name))
            .field("config", &self.config)
            .finish()
    }
}

impl<T: Send + 'static> Source<T> {
    /// Creates a source from an async body that emits through an [`Emitter`].
    ///
    /// The body is invoked once per subscription. Returning `Ok(())`
    /// completes the subscription, returning an error fails it; a body that
    /// propagates [`FlowError::Cancelled`] from `emit` simply stops.
    pub fn create<F, Fut>(body: F) -> Self
    where
        F: Fn(Emitter<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), FlowError>> + Send + 'static,
    {
        Self {
            body: Arc::new(move |emitter| Box::pin(body(emitter))),
            begin: None,
            exec: None,
            config: FlowConfig::default(),
        }
    }

    /// A source emitting a single item.
    pub fn just(item: T) -> Self
    where
        T: Clone + Sync,
    {
        Self::create(move |emitter| {
            let item = item.clone();
            async move { emitter.emit(item).await }
        })
    }

    /// A source emitting every item of a re-iterable collection.
    #[allow(clippy::should_implement_trait)]
    pub fn from_iter<I>(items: I) -> Self
    where
        I: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
        I::IntoIter: Send,
    {
        Self::create(move |emitter| {
            let items = items.clone();
            async move {
                for item in items {
                    emitter.emit(item).await?;
                }
                Ok(())
            }
        })
    }

    /// A source that completes without emitting.
    pub fn empty() -> Self {
        Self::create(|_emitter| async { Ok(()) })
    }

    /// A source that fails immediately with `error`.
    pub fn error(error: FlowError) -> Self {
        Self::create(move |_emitter| {
            let error = error.clone();
            async move { Err(error) }
        })
    }

    /// A source that never emits and never terminates.
    pub fn never() -> Self {
        Self::create(|_emitter| std::future::pending())
    }

    /// Builds a fresh source for every subscription.
    pub fn defer<F>(factory: F) -> Self
    where
        F: Fn() -> Source<T> + Send + Sync + 'static,
    {
        Self::create(move |emitter| {
            let source = factory();
            async move {
                let input = emitter.open(&source);
                forward(input, &emitter).await
            }
        })
    }

    /// A single-item source from an async computation, started per
    /// subscription.
    pub fn from_future<F, Fut>(factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, FlowError>> + Send + 'static,
    {
        Self::create(move |emitter| {
            let pending = factory();
            async move { emitter.emit(pending.await?).await }
        })
    }

    /// A single-item source from a blocking computation.
    ///
    /// `f` runs on the blocking threads of the subscription's begin
    /// scheduler, never on an async worker; pair it with
    /// `subscribe_on(Scheduler::bounded_elastic(..))` to give it a dedicated
    /// pool.
    pub fn from_blocking<F>(f: F) -> Self
    where
        F: Fn() -> Result<T, FlowError> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Self::create(move |emitter| {
            let f = Arc::clone(&f);
            async move {
                let value = emitter
                    .scheduler()
                    .run_blocking(move || f())
                    .await
                    .map_err(FlowError::upstream)??;
                emitter.emit(value).await
            }
        })
    }

    /// Declares where the source's emission loop begins.
    ///
    /// Only the directive nearest the source takes effect: if one is already
    /// set upstream this call is ignored.
    #[must_use]
    pub fn subscribe_on(&self, scheduler: Scheduler) -> Self {
        let mut source = self.clone();
        source.begin = source.begin.or(Some(scheduler));
        source
    }

    /// Runs every stage declared after this point on `scheduler`, up to the
    /// next `publish_on`.
    #[must_use]
    pub fn publish_on(&self, scheduler: Scheduler) -> Self {
        let mut stage = self.stage(forward_owned);
        stage.exec = Some(scheduler);
        stage
    }

    /// Replaces this source's flow configuration (watermark and the
    /// prefetch window downstream stages use when pulling from it).
    #[must_use]
    pub fn with_config(&self, config: FlowConfig) -> Self {
        let mut source = self.clone();
        source.config = config;
        source
    }

    /// Returns the flow configuration.
    pub fn config(&self) -> FlowConfig {
        self.config
    }

    /// Builds a downstream stage whose body pulls from this source.
    ///
    /// The stage inherits scheduling directives and configuration.
    pub(crate) fn stage<U, F, Fut>(&self, f: F) -> Source<U>
    where
        U: Send + 'static,
        F: Fn(SourceStream<T>, Emitter<U>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), FlowError>> + Send + 'static,
    {
        let upstream = self.clone();
        let mut stage = Source::create(move |emitter: Emitter<U>| {
            let input = emitter.open(&upstream);
            f(input, emitter)
        });
        stage.begin = self.begin.clone();
        stage.exec = self.exec.clone();
        stage.config = self.config;
        stage
    }

    /// Subscribes with three callbacks and zero initial demand.
    ///
    /// Nothing is delivered until the returned handle's `request` is called.
    /// Returns before the source starts running.
    pub fn subscribe<F, E, C>(&self, on_item: F, on_error: E, on_complete: C) -> SubscriptionHandle
    where
        F: FnMut(T) -> Result<(), FlowError> + Send + 'static,
        E: FnOnce(FlowError) + Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        self.subscribe_with(LambdaSubscriber::new(on_item, on_error, on_complete))
    }

    /// Subscribes a [`Subscriber`]; its `on_subscribe` may grant initial
    /// demand.
    pub fn subscribe_with<S: Subscriber<T>>(&self, subscriber: S) -> SubscriptionHandle {
        self.subscribe_in(Box::new(subscriber), None)
    }

    pub(crate) fn subscribe_in(
        &self,
        mut subscriber: Box<dyn Subscriber<T>>,
        inherited: Option<&Scheduler>,
    ) -> SubscriptionHandle {
        let core = Arc::new(SubscriptionCore::new(self.config.watermark));
        let handle = core.handle();

        subscriber.on_subscribe(&handle);
        if !core.attach(subscriber) {
            return handle;
        }

        let begin = match self.begin.clone().or_else(|| inherited.cloned()) {
            Some(begin) => begin,
            None => match Scheduler::current() {
                Ok(current) => current,
                Err(error) => {
                    tracing::warn!(%error, "no scheduler available for subscription");
                    core.finish(Err(error));
                    return handle;
                }
            },
        };
        let here = self.exec.clone().unwrap_or_else(|| begin.clone());
        tracing::trace!(begin = begin.name(), run = here.name(), "subscribing");

        let body = (self.body)(Emitter::new(Arc::clone(&core), begin));
        let pool = here.clone();
        here.spawn(async move {
            // Owned pools stay alive while a stage runs on them.
            let _pool = pool;
            let outcome = tokio::select! {
                biased;
                () = core.halted() => return,
                outcome = body => outcome,
            };
            core.finish(outcome);
        });

        handle
    }

    /// Subscribes and exposes the items as a windowed [`SourceStream`].
    pub fn into_stream(&self) -> SourceStream<T> {
        SourceStream::open(self, None)
    }

    /// Subscribes and gathers every item, or the terminal error.
    pub async fn collect(&self) -> Result<Vec<T>, FlowError> {
        let mut stream = self.into_stream();
        let mut items = Vec::new();
        while let Some(item) = stream.next().await {
            items.push(item?);
        }
        Ok(items)
    }

    /// Subscribes, returns the first item and cancels.
    pub async fn first(&self) -> Result<Option<T>, FlowError> {
        let mut stream = self.into_stream();
        let first = stream.next().await.transpose()?;
        stream.cancel();
        Ok(first)
    }
}

impl Source<u64> {
    /// Emits `count` consecutive integers starting at `start`.
    pub fn range(start: u64, count: u64) -> Self {
        Self::create(move |emitter| async move {
            for value in start..start.saturating_add(count) {
                emitter.emit(value).await?;
            }
            Ok(())
        })
    }

    /// Emits 0, 1, 2, ... every `period`, starting one period after
    /// subscription. Never completes; bound it with `take`.
    pub fn interval(period: Duration) -> Self {
        Self::create(move |emitter| async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut tick = 0u64;
            loop {
                ticker.tick().await;
                emitter.emit(tick).await?;
                tick += 1;
            }
        })
    }
}

/// Pipes every item and the terminal signal of `input` into `emitter`.
pub(crate) async fn forward<T: Send + 'static>(
    mut input: SourceStream<T>,
    emitter: &Emitter<T>,
) -> Result<(), FlowError> {
    while let Some(item) = input.next().await {
        emitter.emit(item?).await?;
    }
    Ok(())
}

pub(crate) async fn forward_owned<T: Send + 'static>(
    input: SourceStream<T>,
    emitter: Emitter<T>,
) -> Result<(), FlowError> {
    forward(input, &emitter).await
}
