//! Pairwise combinator.

use crate::error::FlowError;
use crate::source::Source;
use crate::stream::SourceStream;
use futures_core::Stream;
use futures_util::future::{poll_fn, Either};
use std::pin::Pin;
use std::sync::Arc;
use std::task::Poll;

/// Emits one row per index across all sources.
///
/// Each source fills one slot; once every slot is filled the row is emitted
/// and the slots are cleared. Completes as soon as any source completes,
/// whether or not its slot is filled: unpaired items are discarded and the
/// remaining sources are cancelled.
pub fn zip_all<T, I>(sources: I) -> Source<Vec<T>>
where
    T: Send + 'static,
    I: IntoIterator<Item = Source<T>>,
{
    let sources: Arc<[Source<T>]> = sources.into_iter().collect();
    Source::create(move |emitter| {
        let sources = Arc::clone(&sources);
        async move {
            if sources.is_empty() {
                return Ok(());
            }
            let mut lanes: Vec<Lane<T>> = sources
                .iter()
                .map(|source| Lane::new(emitter.open(source)))
                .collect();

            while let Some(row) = next_row(&mut lanes).await? {
                emitter.emit(row).await?;
            }
            Ok(())
        }
    })
}

/// One zipped input: the slot of the row being assembled plus one item of
/// lookahead, used to notice completion while the slot is filled.
struct Lane<T> {
    input: SourceStream<T>,
    slot: Option<T>,
    next: Option<T>,
}

impl<T> Lane<T> {
    fn new(input: SourceStream<T>) -> Self {
        Self {
            input,
            slot: None,
            next: None,
        }
    }
}

/// Assembles the next row; `Ok(None)` once any source ended.
async fn next_row<T>(lanes: &mut [Lane<T>]) -> Result<Option<Vec<T>>, FlowError> {
    poll_fn(|cx| {
        let mut complete = true;
        for lane in lanes.iter_mut() {
            if lane.slot.is_none() {
                lane.slot = lane.next.take();
            }
            if lane.slot.is_some() {
                continue;
            }
            match Pin::new(&mut lane.input).poll_next(cx) {
                Poll::Ready(Some(Ok(item))) => lane.slot = Some(item),
                Poll::Ready(Some(Err(error))) => return Poll::Ready(Err(error)),
                Poll::Ready(None) => return Poll::Ready(Ok(None)),
                Poll::Pending => complete = false,
            }
        }
        if complete {
            return Poll::Ready(Ok(Some(
                lanes.iter_mut().filter_map(|lane| lane.slot.take()).collect(),
            )));
        }

        // Waiting on a partner: a filled lane may still end the zip.
        for lane in lanes
            .iter_mut()
            .filter(|lane| lane.slot.is_some() && lane.next.is_none())
        {
            match Pin::new(&mut lane.input).poll_next(cx) {
                Poll::Ready(Some(Ok(item))) => lane.next = Some(item),
                Poll::Ready(Some(Err(error))) => return Poll::Ready(Err(error)),
                Poll::Ready(None) => return Poll::Ready(Ok(None)),
                Poll::Pending => {}
            }
        }
        Poll::Pending
    })
    .await
}

/// Zips two differently typed sources into pairs.
pub fn zip2<A, B>(a: Source<A>, b: Source<B>) -> Source<(A, B)>
where
    A: Send + 'static,
    B: Send + 'static,
{
    zip_all([a.map(Either::Left), b.map(Either::Right)]).try_map(|row| {
        let mut row = row.into_iter();
        match (row.next(), row.next()) {
            (Some(Either::Left(a)), Some(Either::Right(b))) => Ok((a, b)),
            _ => Err(FlowError::ProtocolViolation("zip2 row out of order")),
        }
    })
}

/// Zips three sources into triples.
pub fn zip3<A, B, C>(a: Source<A>, b: Source<B>, c: Source<C>) -> Source<(A, B, C)>
where
    A: Send + 'static,
    B: Send + 'static,
    C: Send + 'static,
{
    zip2(zip2(a, b), c).map(|((a, b), c)| (a, b, c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shortest_source_wins() {
        let pairs = zip2(Source::from_iter(vec!['x', 'y', 'z']), Source::from_iter(vec![1, 2]))
            .collect()
            .await
            .unwrap();
        assert_eq!(pairs, vec![('x', 1), ('y', 2)]);
    }

    #[tokio::test]
    async fn test_zip3_triples() {
        let rows = zip3(Source::range(0, 3), Source::range(10, 3), Source::range(20, 5))
            .collect()
            .await
            .unwrap();
        assert_eq!(rows, vec![(0, 10, 20), (1, 11, 21), (2, 12, 22)]);
    }

    #[tokio::test]
    async fn test_zip_all_rows() {
        let rows = zip_all([Source::range(0, 2), Source::range(5, 2), Source::range(9, 4)])
            .collect()
            .await
            .unwrap();
        assert_eq!(rows, vec![vec![0, 5, 9], vec![1, 6, 10]]);
    }

    #[tokio::test]
    async fn test_source_ending_with_filled_slot_completes_zip() {
        let pairs = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            zip2(Source::just(1u8), Source::<u8>::never()).collect(),
        )
        .await
        .expect("zip did not complete after a source ended")
        .unwrap();
        assert!(pairs.is_empty());
    }

    #[tokio::test]
    async fn test_zip_fails_on_source_error() {
        let result = zip2(Source::range(0, 3), Source::<u8>::error(FlowError::upstream("z")))
            .collect()
            .await;
        assert!(result.is_err());
    }
}
