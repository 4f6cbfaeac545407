//! Concurrent fan-in combinators.

use crate::error_policy::{ErrorCollector, ErrorMode};
use crate::source::Source;
use crate::stream::SourceStream;
use crate::tagged::{Event, Tagged};
use futures_util::stream::SelectAll;
use futures_util::StreamExt;
use std::collections::VecDeque;
use std::sync::Arc;

/// Options for [`merge_with_options`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeOptions {
    /// Upper bound on simultaneously subscribed sources. `None` subscribes
    /// to every source at once.
    pub max_concurrency: Option<usize>,
    /// Reaction to a failing source.
    pub errors: ErrorMode,
}

impl MergeOptions {
    /// Limits how many sources are subscribed at the same time.
    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = Some(max_concurrency.max(1));
        self
    }

    /// Sets the error mode.
    #[must_use]
    pub fn with_errors(mut self, errors: ErrorMode) -> Self {
        self.errors = errors;
        self
    }
}

/// Subscribes to every source at once and emits items as they arrive.
///
/// Per-source order is kept; there is no order across sources. The first
/// failure cancels every other source.
pub fn merge<T, I>(sources: I) -> Source<T>
where
    T: Send + 'static,
    I: IntoIterator<Item = Source<T>>,
{
    merge_with_options(sources, MergeOptions::default())
}

/// Like [`merge`], but failures are deferred until every source is done.
pub fn merge_delay_error<T, I>(sources: I) -> Source<T>
where
    T: Send + 'static,
    I: IntoIterator<Item = Source<T>>,
{
    merge_with_options(sources, MergeOptions::default().with_errors(ErrorMode::Deferred))
}

/// Like [`merge`], with at most `max_concurrency` sources subscribed at a
/// time; the next pending source is subscribed as an active one completes.
pub fn merge_bounded<T, I>(sources: I, max_concurrency: usize) -> Source<T>
where
    T: Send + 'static,
    I: IntoIterator<Item = Source<T>>,
{
    merge_with_options(
        sources,
        MergeOptions::default().with_max_concurrency(max_concurrency),
    )
}

/// The general merge: bounded concurrency plus an error mode.
pub fn merge_with_options<T, I>(sources: I, options: MergeOptions) -> Source<T>
where
    T: Send + 'static,
    I: IntoIterator<Item = Source<T>>,
{
    let sources: Arc<[Source<T>]> = sources.into_iter().collect();
    let limit = options.max_concurrency.unwrap_or(usize::MAX).max(1);

    Source::create(move |emitter| {
        let sources = Arc::clone(&sources);
        async move {
            let mut pending = sources.iter().enumerate();
            let mut active: SelectAll<Tagged<SourceStream<T>>> = SelectAll::new();
            let mut errors = ErrorCollector::new(options.errors);

            for (index, source) in pending.by_ref().take(limit) {
                active.push(Tagged::new(index, emitter.open(source)));
            }

            while let Some(event) = active.next().await {
                match event {
                    Event::Item(_, Ok(item)) => emitter.emit(item).await?,
                    Event::Item(index, Err(error)) => errors.capture(index, error)?,
                    Event::End(index) => {
                        tracing::trace!(source = index, "merged source finished");
                        if let Some((next, source)) = pending.next() {
                            active.push(Tagged::new(next, emitter.open(source)));
                        }
                    }
                }
            }
            errors.finish()
        }
    })
}

/// Subscribes to every source at once but emits them one after another in
/// declaration order; later sources buffer up to their prefetch window
/// meanwhile.
pub fn merge_sequential<T, I>(sources: I) -> Source<T>
where
    T: Send + 'static,
    I: IntoIterator<Item = Source<T>>,
{
    let sources: Arc<[Source<T>]> = sources.into_iter().collect();
    Source::create(move |emitter| {
        let sources = Arc::clone(&sources);
        async move {
            let mut inputs: VecDeque<SourceStream<T>> =
                sources.iter().map(|source| emitter.open(source)).collect();
            while let Some(mut input) = inputs.pop_front() {
                while let Some(item) = input.next().await {
                    emitter.emit(item?).await?;
                }
            }
            Ok(())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FlowError;

    #[tokio::test]
    async fn test_merge_emits_everything() {
        let mut items = merge([Source::range(0, 3), Source::range(10, 3)])
            .collect()
            .await
            .unwrap();
        items.sort_unstable();
        assert_eq!(items, vec![0, 1, 2, 10, 11, 12]);
    }

    #[tokio::test]
    async fn test_bounded_merge_of_one_is_concat() {
        let items = merge_bounded([Source::range(0, 3), Source::range(10, 2)], 1)
            .collect()
            .await
            .unwrap();
        assert_eq!(items, vec![0, 1, 2, 10, 11]);
    }

    #[tokio::test]
    async fn test_merge_delay_error_keeps_going() {
        let failing = Source::from_iter(vec![1u64]).concat_with(&Source::error(FlowError::upstream("x")));
        let result = merge_delay_error([failing, Source::range(5, 2)]).collect().await;
        let err = result.unwrap_err();
        assert!(err.is_aggregate());
        assert_eq!(err.causes().len(), 1);
    }

    #[tokio::test]
    async fn test_merge_sequential_keeps_declaration_order() {
        let items = merge_sequential([Source::range(0, 2), Source::range(10, 2), Source::range(20, 2)])
            .collect()
            .await
            .unwrap();
        assert_eq!(items, vec![0, 1, 10, 11, 20, 21]);
    }
}
