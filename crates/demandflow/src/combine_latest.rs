//! Latest-combine combinator.

use crate::error::FlowError;
use crate::source::Source;
use crate::stream::SourceStream;
use crate::tagged::{Event, Tagged};
use futures_util::future::Either;
use futures_util::stream::SelectAll;
use futures_util::StreamExt;
use std::sync::Arc;

/// Emits `combiner(latest)` whenever any source produces, once every source
/// has produced at least once.
///
/// `latest` holds the most recent item of each source, in declaration
/// order. Completes when all sources complete, or as soon as a source
/// completes without ever emitting (no combination is possible then).
/// Fails immediately on any source failure.
pub fn combine_latest<T, R, I, F>(sources: I, combiner: F) -> Source<R>
where
    T: Clone + Send + 'static,
    R: Send + 'static,
    I: IntoIterator<Item = Source<T>>,
    F: Fn(&[T]) -> R + Send + Sync + 'static,
{
    let sources: Arc<[Source<T>]> = sources.into_iter().collect();
    let combiner = Arc::new(combiner);

    Source::create(move |emitter| {
        let sources = Arc::clone(&sources);
        let combiner = Arc::clone(&combiner);
        async move {
            let mut latest: Vec<Option<T>> = vec![None; sources.len()];
            let mut warmed = 0usize;
            let mut active: SelectAll<Tagged<SourceStream<T>>> = SelectAll::new();
            for (index, source) in sources.iter().enumerate() {
                active.push(Tagged::new(index, emitter.open(source)));
            }

            while let Some(event) = active.next().await {
                match event {
                    Event::Item(index, Ok(item)) => {
                        let Some(slot) = latest.get_mut(index) else {
                            continue;
                        };
                        if slot.replace(item).is_none() {
                            warmed += 1;
                        }
                        if warmed == latest.len() {
                            let values: Vec<T> = latest.iter().flatten().cloned().collect();
                            emitter.emit(combiner(&values)).await?;
                        }
                    }
                    Event::Item(_, Err(error)) => return Err(error),
                    Event::End(index) => {
                        if latest.get(index).is_some_and(Option::is_none) {
                            tracing::debug!(source = index, "source ended before its first item");
                            return Ok(());
                        }
                    }
                }
            }
            Ok(())
        }
    })
}

/// Two-source [`combine_latest`] with differently typed sources.
pub fn combine_latest2<A, B, R, F>(a: Source<A>, b: Source<B>, combiner: F) -> Source<R>
where
    A: Clone + Send + 'static,
    B: Clone + Send + 'static,
    R: Send + 'static,
    F: Fn(&A, &B) -> R + Send + Sync + 'static,
{
    let sources = [a.map(Either::Left), b.map(Either::Right)];
    combine_latest(sources, move |latest: &[Either<A, B>]| match latest {
        [Either::Left(a), Either::Right(b)] => Ok(combiner(a, b)),
        _ => Err(FlowError::ProtocolViolation("combine_latest2 slots out of order")),
    })
    .try_map(|combined| combined)
}
