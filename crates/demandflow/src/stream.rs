//! Pull-based adapter over a source subscription.

#[cfg(debug_assertions)]
use crate::invariants::debug_assert_window_bounded;
use crate::error::FlowError;
use crate::scheduler::Scheduler;
use crate::source::Source;
use crate::subscription::{Subscriber, SubscriptionHandle};
use futures_core::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// A subscription consumed as a [`Stream`] of `Result<T, FlowError>`.
///
/// The adapter requests `prefetch` items up front and re-requests in windows
/// of [`FlowConfig::limit`](crate::FlowConfig::limit) as items are consumed,
/// so the upstream never has more than `prefetch` items outstanding.
///
/// An upstream failure is yielded once as `Some(Err(_))`, after which the
/// stream ends. Dropping the stream cancels the subscription.
pub struct SourceStream<T> {
    receiver: mpsc::Receiver<Result<T, FlowError>>,
    handle: SubscriptionHandle,
    prefetch: usize,
    limit: usize,
    consumed: usize,
    done: bool,
}

impl<T: Send + 'static> SourceStream<T> {
    pub(crate) fn open(source: &Source<T>, inherited: Option<&Scheduler>) -> Self {
        let config = source.config();
        let prefetch = config.prefetch.max(1);
        // One extra slot for the terminal error.
        let (sender, receiver) = mpsc::channel(prefetch + 1);
        let subscriber = ChannelSubscriber {
            sender: Some(sender),
            prefetch: prefetch as u64,
        };
        let handle = source.subscribe_in(Box::new(subscriber), inherited);

        Self {
            receiver,
            handle,
            prefetch,
            limit: config.limit(),
            consumed: 0,
            done: false,
        }
    }
}

impl<T> SourceStream<T> {
    /// Handle of the underlying subscription.
    pub fn handle(&self) -> &SubscriptionHandle {
        &self.handle
    }

    /// Cancels the upstream subscription and ends the stream.
    pub fn cancel(&mut self) {
        self.handle.cancel();
        self.done = true;
    }
}

impl<T> Stream for SourceStream<T> {
    type Item = Result<T, FlowError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        match this.receiver.poll_recv(cx) {
            Poll::Ready(Some(Ok(item))) => {
                this.consumed += 1;
                if this.consumed >= this.limit {
                    let replenish = std::mem::take(&mut this.consumed);
                    this.handle.request(replenish as u64);
                }

                #[cfg(debug_assertions)]
                debug_assert_window_bounded!(this.handle.outstanding_demand(), this.prefetch as u64);

                Poll::Ready(Some(Ok(item)))
            }
            Poll::Ready(Some(Err(error))) => {
                this.done = true;
                Poll::Ready(Some(Err(error)))
            }
            Poll::Ready(None) => {
                this.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> Drop for SourceStream<T> {
    fn drop(&mut self) {
        self.handle.cancel();
    }
}

/// Subscriber that forwards signals into the adapter's channel.
struct ChannelSubscriber<T> {
    sender: Option<mpsc::Sender<Result<T, FlowError>>>,
    prefetch: u64,
}

impl<T: Send + 'static> Subscriber<T> for ChannelSubscriber<T> {
    fn on_subscribe(&mut self, handle: &SubscriptionHandle) {
        handle.request(self.prefetch);
    }

    fn on_item(&mut self, item: T) -> Result<(), FlowError> {
        let Some(sender) = self.sender.as_ref() else {
            return Ok(());
        };
        match sender.try_send(Ok(item)) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(FlowError::ProtocolViolation(
                "stage adapter received more items than it requested",
            )),
            // Reader is gone and has already cancelled.
            Err(mpsc::error::TrySendError::Closed(_)) => Ok(()),
        }
    }

    fn on_error(&mut self, error: FlowError) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.try_send(Err(error));
        }
    }

    fn on_complete(&mut self) {
        self.sender = None;
    }
}
