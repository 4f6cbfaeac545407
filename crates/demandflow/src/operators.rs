//! Single-source operators.
//!
//! Every operator builds a new stage with [`Source::stage`]: the stage's
//! task pulls from its upstream through a windowed [`SourceStream`] and
//! emits into its own subscription, so demand is honored hop by hop.

use crate::concat::concat;
use crate::emitter::Emitter;
use crate::error::FlowError;
use crate::merge::merge;
use crate::source::{forward, forward_owned, Source};
use crate::stream::SourceStream;
use crate::subscription::SubscriptionState;
use crate::zip::zip2;
use futures_util::stream::SelectAll;
use futures_util::StreamExt;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

impl<T: Send + 'static> Source<T> {
    /// Transforms every item.
    #[must_use]
    pub fn map<U, F>(&self, f: F) -> Source<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.stage(move |mut input, emitter| {
            let f = Arc::clone(&f);
            async move {
                while let Some(item) = input.next().await {
                    emitter.emit(f(item?)).await?;
                }
                Ok(())
            }
        })
    }

    /// Transforms every item with a fallible function; the first failure
    /// terminates the pipeline.
    #[must_use]
    pub fn try_map<U, F>(&self, f: F) -> Source<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Result<U, FlowError> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.stage(move |mut input, emitter| {
            let f = Arc::clone(&f);
            async move {
                while let Some(item) = input.next().await {
                    emitter.emit(f(item?)?).await?;
                }
                Ok(())
            }
        })
    }

    /// Keeps items matching `predicate`.
    #[must_use]
    pub fn filter<F>(&self, predicate: F) -> Source<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let predicate = Arc::new(predicate);
        self.stage(move |mut input, emitter| {
            let predicate = Arc::clone(&predicate);
            async move {
                while let Some(item) = input.next().await {
                    let item = item?;
                    if predicate(&item) {
                        emitter.emit(item).await?;
                    }
                }
                Ok(())
            }
        })
    }

    /// Emits the first `n` items, then cancels upstream and completes.
    #[must_use]
    pub fn take(&self, n: usize) -> Source<T> {
        self.stage(move |mut input, emitter| async move {
            if n == 0 {
                input.cancel();
                return Ok(());
            }
            let mut taken = 0;
            while let Some(item) = input.next().await {
                emitter.emit(item?).await?;
                taken += 1;
                if taken == n {
                    input.cancel();
                    break;
                }
            }
            Ok(())
        })
    }

    /// Runs a side effect on every item.
    #[must_use]
    pub fn inspect<F>(&self, f: F) -> Source<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.stage(move |mut input, emitter| {
            let f = Arc::clone(&f);
            async move {
                while let Some(item) = input.next().await {
                    let item = item?;
                    f(&item);
                    emitter.emit(item).await?;
                }
                Ok(())
            }
        })
    }

    /// Runs a side effect on the terminal failure, which still propagates.
    #[must_use]
    pub fn inspect_err<F>(&self, f: F) -> Source<T>
    where
        F: Fn(&FlowError) + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.stage(move |mut input, emitter| {
            let f = Arc::clone(&f);
            async move {
                while let Some(item) = input.next().await {
                    match item {
                        Ok(item) => emitter.emit(item).await?,
                        Err(error) => {
                            f(&error);
                            return Err(error);
                        }
                    }
                }
                Ok(())
            }
        })
    }

    /// On failure, continues with the source `fallback(error)` returns.
    #[must_use]
    pub fn on_error_resume<F>(&self, fallback: F) -> Source<T>
    where
        F: Fn(FlowError) -> Source<T> + Send + Sync + 'static,
    {
        let fallback = Arc::new(fallback);
        self.stage(move |mut input, emitter| {
            let fallback = Arc::clone(&fallback);
            async move {
                while let Some(item) = input.next().await {
                    match item {
                        Ok(item) => emitter.emit(item).await?,
                        Err(error) => {
                            tracing::debug!(%error, "resuming with fallback source");
                            let resumed = emitter.open(&fallback(error));
                            return forward(resumed, &emitter).await;
                        }
                    }
                }
                Ok(())
            }
        })
    }

    /// On failure, emits `value` and completes.
    #[must_use]
    pub fn on_error_return(&self, value: T) -> Source<T>
    where
        T: Clone + Sync,
    {
        self.on_error_resume(move |_| Source::just(value.clone()))
    }

    /// Continues with `other` if this source completes without emitting.
    #[must_use]
    pub fn switch_if_empty(&self, other: &Source<T>) -> Source<T> {
        let other = other.clone();
        self.stage(move |mut input, emitter| {
            let other = other.clone();
            async move {
                let mut emitted = false;
                while let Some(item) = input.next().await {
                    emitter.emit(item?).await?;
                    emitted = true;
                }
                if emitted {
                    return Ok(());
                }
                forward(emitter.open(&other), &emitter).await
            }
        })
    }

    /// Maps every item to an inner source and merges the inner sources,
    /// all subscribed as soon as their item arrives.
    #[must_use]
    pub fn flat_map<U, F>(&self, f: F) -> Source<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Source<U> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.stage(move |mut input, emitter: Emitter<U>| {
            let f = Arc::clone(&f);
            async move {
                let mut inner: SelectAll<SourceStream<U>> = SelectAll::new();
                let mut outer_done = false;
                loop {
                    tokio::select! {
                        next = input.next(), if !outer_done => match next {
                            Some(item) => inner.push(emitter.open(&f(item?))),
                            None => outer_done = true,
                        },
                        Some(item) = inner.next(), if !inner.is_empty() => {
                            emitter.emit(item?).await?;
                        }
                        else => break,
                    }
                }
                Ok(())
            }
        })
    }

    /// Like [`Source::flat_map`], but inner items are emitted in the order of
    /// the outer items; later inner sources buffer meanwhile.
    #[must_use]
    pub fn flat_map_sequential<U, F>(&self, f: F) -> Source<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Source<U> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.stage(move |mut input, emitter: Emitter<U>| {
            let f = Arc::clone(&f);
            async move {
                let mut inner: VecDeque<SourceStream<U>> = VecDeque::new();
                let mut outer_done = false;
                loop {
                    tokio::select! {
                        biased;
                        item = next_front(&mut inner), if !inner.is_empty() => match item {
                            Some(item) => emitter.emit(item?).await?,
                            None => {
                                inner.pop_front();
                            }
                        },
                        next = input.next(), if !outer_done => match next {
                            Some(item) => inner.push_back(emitter.open(&f(item?))),
                            None => outer_done = true,
                        },
                        else => break,
                    }
                }
                Ok(())
            }
        })
    }

    /// Delays every item by `delay`.
    #[must_use]
    pub fn delay_elements(&self, delay: Duration) -> Source<T> {
        self.stage(move |mut input, emitter| async move {
            while let Some(item) = input.next().await {
                let item = item?;
                tokio::time::sleep(delay).await;
                emitter.emit(item).await?;
            }
            Ok(())
        })
    }

    /// Pulls from this source in windows of `n` items, re-requesting once
    /// 75% of a window was consumed. Stages after this one keep the
    /// previous configuration.
    #[must_use]
    pub fn limit_rate(&self, n: usize) -> Source<T> {
        let config = self.config();
        self.with_config(config.with_prefetch(n))
            .stage(forward_owned)
            .with_config(config)
    }

    /// Records every signal passing this point as a `tracing` event under
    /// `category`: subscribe, request, item, error, complete and cancel.
    #[must_use]
    pub fn log(&self, category: impl Into<String>) -> Source<T>
    where
        T: fmt::Debug,
    {
        let category: Arc<str> = Arc::from(category.into());
        self.stage(move |mut input, emitter| {
            let category = Arc::clone(&category);
            async move {
                tracing::debug!(
                    target: "demandflow::log",
                    %category,
                    requested = emitter.outstanding_demand(),
                    "subscribe"
                );
                let hook_category = Arc::clone(&category);
                emitter.on_request(move |n| {
                    tracing::debug!(target: "demandflow::log", category = %hook_category, n, "request");
                });
                let _cancel = CancelLog {
                    category: Arc::clone(&category),
                    emitter: emitter.clone(),
                };

                while let Some(item) = input.next().await {
                    match item {
                        Ok(item) => {
                            tracing::debug!(target: "demandflow::log", %category, ?item, "item");
                            emitter.emit(item).await?;
                        }
                        Err(error) => {
                            tracing::debug!(target: "demandflow::log", %category, %error, "error");
                            return Err(error);
                        }
                    }
                }
                tracing::debug!(target: "demandflow::log", %category, "complete");
                Ok(())
            }
        })
    }

    /// Runs `other` after this source completes.
    #[must_use]
    pub fn concat_with(&self, other: &Source<T>) -> Source<T> {
        concat([self.clone(), other.clone()])
    }

    /// Merges this source with `other`.
    #[must_use]
    pub fn merge_with(&self, other: &Source<T>) -> Source<T> {
        merge([self.clone(), other.clone()])
    }

    /// Zips this source with `other` into pairs.
    #[must_use]
    pub fn zip_with<U: Send + 'static>(&self, other: &Source<U>) -> Source<(T, U)> {
        zip2(self.clone(), other.clone())
    }
}

/// Polls the front stream of `queue`; pending while the queue is empty.
async fn next_front<S>(queue: &mut VecDeque<S>) -> Option<S::Item>
where
    S: futures_core::Stream + Unpin,
{
    match queue.front_mut() {
        Some(front) => front.next().await,
        None => std::future::pending().await,
    }
}

/// Logs `cancel` if the stage is dropped because its consumer cancelled.
struct CancelLog<T: Send + 'static> {
    category: Arc<str>,
    emitter: Emitter<T>,
}

impl<T: Send + 'static> Drop for CancelLog<T> {
    fn drop(&mut self) {
        if self.emitter.state() == SubscriptionState::Cancelled {
            tracing::debug!(target: "demandflow::log", category = %self.category, "cancel");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[tokio::test]
    async fn test_map_filter_take() {
        let items = Source::range(0, 100)
            .map(|n| n * 2)
            .filter(|n| n % 3 == 0)
            .take(4)
            .collect()
            .await
            .unwrap();
        assert_eq!(items, vec![0, 6, 12, 18]);
    }

    #[tokio::test]
    async fn test_take_zero_completes_immediately() {
        assert!(Source::<u8>::never().take(0).collect().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_try_map_failure_terminates() {
        let result = Source::from_iter(vec![1, 2, 3])
            .try_map(|n| {
                if n == 2 {
                    Err(FlowError::upstream("two"))
                } else {
                    Ok(n)
                }
            })
            .collect()
            .await;
        assert_eq!(result.unwrap_err().to_string(), "upstream failure: two");
    }

    #[tokio::test]
    async fn test_inspect_sees_items_and_errors() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let failures = Arc::new(Mutex::new(0));
        let (seen_in, failures_in) = (Arc::clone(&seen), Arc::clone(&failures));

        let result = Source::from_iter(vec![1, 2])
            .concat_with(&Source::error(FlowError::upstream("late")))
            .inspect(move |n| seen_in.lock().push(*n))
            .inspect_err(move |_| *failures_in.lock() += 1)
            .collect()
            .await;

        assert!(result.is_err());
        assert_eq!(*seen.lock(), vec![1, 2]);
        assert_eq!(*failures.lock(), 1);
    }

    #[tokio::test]
    async fn test_error_recovery() {
        let failing = Source::from_iter(vec![1]).concat_with(&Source::error(FlowError::upstream("x")));

        let resumed = failing.on_error_resume(|_| Source::from_iter(vec![8, 9]));
        assert_eq!(resumed.collect().await.unwrap(), vec![1, 8, 9]);

        let returned = failing.on_error_return(0);
        assert_eq!(returned.collect().await.unwrap(), vec![1, 0]);
    }

    #[tokio::test]
    async fn test_switch_if_empty() {
        let fallback = Source::just(42);
        assert_eq!(
            Source::empty().switch_if_empty(&fallback).collect().await.unwrap(),
            vec![42]
        );
        assert_eq!(
            Source::just(1).switch_if_empty(&fallback).collect().await.unwrap(),
            vec![1]
        );
    }

    #[tokio::test]
    async fn test_flat_map_and_sequential() {
        let mut merged = Source::range(1, 3)
            .flat_map(|n| Source::from_iter(vec![n * 10, n * 10 + 1]))
            .collect()
            .await
            .unwrap();
        merged.sort_unstable();
        assert_eq!(merged, vec![10, 11, 20, 21, 30, 31]);

        let ordered = Source::range(1, 3)
            .flat_map_sequential(|n| Source::from_iter(vec![n * 10, n * 10 + 1]))
            .collect()
            .await
            .unwrap();
        assert_eq!(ordered, vec![10, 11, 20, 21, 30, 31]);
    }

    #[tokio::test]
    async fn test_limit_rate_restores_downstream_config() {
        let source = Source::range(0, 10);
        let limited = source.limit_rate(4);
        assert_eq!(limited.config(), source.config());
        assert_eq!(limited.collect().await.unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_log_passes_items_through() {
        let items = Source::range(0, 3).log("unit").collect().await.unwrap();
        assert_eq!(items, vec![0, 1, 2]);
    }
}
