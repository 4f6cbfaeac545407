//! Producer side of a subscription.

use crate::error::FlowError;
use crate::scheduler::Scheduler;
use crate::source::Source;
use crate::stream::SourceStream;
use crate::subscription::{Offer, SubscriptionCore, SubscriptionHandle, SubscriptionState};
use std::fmt;
use std::sync::Arc;

/// Handle a source body uses to emit items into its subscription.
///
/// `emit` never delivers beyond granted demand: items are queued (up to the
/// configured watermark) and handed to the consumer as demand arrives. When
/// the queue is full, `emit` suspends without holding any lock until the
/// consumer requests more.
///
/// Cloning is cheap; clones emit into the same subscription.
pub struct Emitter<T> {
    core: Arc<SubscriptionCore<T>>,
    begin: Scheduler,
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            begin: self.begin.clone(),
        }
    }
}

impl<T: Send + 'static> Emitter<T> {
    pub(crate) fn new(core: Arc<SubscriptionCore<T>>, begin: Scheduler) -> Self {
        Self { core, begin }
    }

    /// Emits one item, waiting for demand or queue room.
    ///
    /// Returns [`FlowError::Cancelled`] once the subscription is terminal;
    /// bodies propagate it with `?` to stop producing.
    pub async fn emit(&self, item: T) -> Result<(), FlowError> {
        let mut item = item;
        loop {
            match self.core.offer(item) {
                Offer::Accepted => {
                    self.core.drain();
                    return Ok(());
                }
                Offer::Closed => return Err(FlowError::Cancelled),
                Offer::Full(returned) => {
                    item = returned;
                    tracing::trace!("emitter waiting for demand");
                    self.core.wait_for_space().await;
                }
            }
        }
    }

    /// Emits one item without waiting.
    ///
    /// Fails with [`FlowError::ProtocolViolation`] when neither outstanding
    /// demand nor watermark room is left: the caller is pushing faster than
    /// its consumer asked for.
    pub fn try_emit(&self, item: T) -> Result<(), FlowError> {
        match self.core.offer(item) {
            Offer::Accepted => {
                self.core.drain();
                Ok(())
            }
            Offer::Closed => Err(FlowError::Cancelled),
            Offer::Full(_) => Err(FlowError::ProtocolViolation(
                "item emitted beyond granted demand and watermark",
            )),
        }
    }

    /// Returns `true` once the subscription is terminal. Long-running
    /// producers that do not emit often should poll this.
    pub fn is_cancelled(&self) -> bool {
        self.core.current_state().is_terminal()
    }

    pub(crate) fn state(&self) -> SubscriptionState {
        self.core.current_state()
    }

    pub(crate) fn outstanding_demand(&self) -> u64 {
        self.core.handle().outstanding_demand()
    }

    /// The begin context of this subscription. Blocking work belongs on
    /// [`Scheduler::run_blocking`] of this scheduler.
    pub fn scheduler(&self) -> &Scheduler {
        &self.begin
    }

    /// Subscribes to `source` as an upstream of this subscription.
    ///
    /// The upstream inherits this subscription's begin context unless it
    /// declares its own, and is cancelled together with this subscription.
    pub fn open<U: Send + 'static>(&self, source: &Source<U>) -> SourceStream<U> {
        let stream = SourceStream::open(source, Some(&self.begin));
        self.link(stream.handle().clone());
        stream
    }

    /// Ties an upstream subscription's lifetime to this one.
    pub fn link(&self, upstream: SubscriptionHandle) {
        self.core.link_upstream(upstream);
    }

    /// Observes every `request(n)` the consumer makes.
    pub fn on_request<F>(&self, hook: F)
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.core.set_request_hook(Box::new(hook));
    }
}

impl<T: Send + 'static> fmt::Debug for Emitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("state", &self.core.current_state())
            .field("begin", &self.begin)
            .finish()
    }
}
