//! Source-indexed stream wrapper used by the fan-in combinators.

use crate::error::FlowError;
use futures_core::Stream;
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Signal from one of several upstream sources.
#[derive(Debug)]
pub(crate) enum Event<T> {
    Item(usize, Result<T, FlowError>),
    /// The source at this index ended (after an error, too).
    End(usize),
}

pin_project! {
    /// Tags every item with its source index and reports the end of the
    /// inner stream as a final [`Event::End`], so a `SelectAll` of tagged
    /// streams tells the coordinator which source finished.
    pub(crate) struct Tagged<S> {
        index: usize,
        #[pin]
        inner: S,
        ended: bool,
    }
}

impl<S> Tagged<S> {
    pub(crate) fn new(index: usize, inner: S) -> Self {
        Self {
            index,
            inner,
            ended: false,
        }
    }
}

impl<S, T> Stream for Tagged<S>
where
    S: Stream<Item = Result<T, FlowError>>,
{
    type Item = Event<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        if *this.ended {
            return Poll::Ready(None);
        }
        match this.inner.poll_next(cx) {
            Poll::Ready(Some(item)) => Poll::Ready(Some(Event::Item(*this.index, item))),
            Poll::Ready(None) => {
                *this.ended = true;
                Poll::Ready(Some(Event::End(*this.index)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
