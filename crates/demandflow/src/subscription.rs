//! The demand-windowed subscription between one producer and one consumer.
//!
//! # Delivery protocol
//!
//! Producers never call the subscriber directly. They [`offer`] items into a
//! queue bounded by `max(outstanding demand, watermark)` and then run the
//! drain loop. The drain loop delivers queued items only against units of
//! demand, and the terminal signal only once the queue is empty.
//!
//! The drain loop is entered by whichever side made progress possible (the
//! producer after an offer, the consumer after `request(n)`), but only one
//! caller runs it at a time: a work-in-progress counter admits the first
//! caller and turns concurrent or re-entrant calls into "go around once
//! more". This gives single-writer delivery per subscription and lets a
//! consumer call `request`/`cancel` from inside `on_item`.
//!
//! Each signal is delivered under a re-entrant delivery gate that `cancel()`
//! also takes, so once `cancel()` returns no further signal can start.
//!
//! [`offer`]: SubscriptionCore::offer

#[cfg(debug_assertions)]
use crate::invariants::{
    debug_assert_single_terminal, debug_assert_terminal_absorbing, debug_assert_upstream_cancelled,
    debug_assert_within_demand, debug_assert_within_watermark,
};
use crate::demand::Demand;
use crate::error::FlowError;
use parking_lot::{Mutex, ReentrantMutex};
use std::collections::VecDeque;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
#[cfg(debug_assertions)]
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Lifecycle of a subscription. Terminal states are absorbing.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Created, subscriber not yet attached.
    Unsubscribed = 0,
    /// Items may flow while demand is outstanding.
    Active = 1,
    /// `on_complete` was delivered.
    Completed = 2,
    /// The consumer cancelled.
    Cancelled = 3,
    /// `on_error` was delivered (producer or consumer failure).
    Errored = 4,
}

impl SubscriptionState {
    /// Returns `true` for `Completed`, `Cancelled` and `Errored`.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Errored)
    }

    #[inline]
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Unsubscribed,
            1 => Self::Active,
            2 => Self::Completed,
            3 => Self::Cancelled,
            _ => Self::Errored,
        }
    }
}

/// Consumer side of a subscription.
///
/// All callbacks of one subscription are invoked serially, never
/// concurrently with each other.
pub trait Subscriber<T>: Send + 'static {
    /// Called once, before any other callback, with the handle used to
    /// request demand or cancel. The usual place for the initial `request`.
    fn on_subscribe(&mut self, handle: &SubscriptionHandle) {
        let _ = handle;
    }

    /// Called once per item, never more often than demand was granted.
    ///
    /// Returning an error moves the subscription to `Errored`: production
    /// stops and `on_error` receives that error.
    fn on_item(&mut self, item: T) -> Result<(), FlowError>;

    /// Called at most once; exclusive with `on_complete`.
    fn on_error(&mut self, error: FlowError);

    /// Called at most once; exclusive with `on_error`.
    fn on_complete(&mut self);
}

/// Type-erased control surface of a subscription core.
trait Control: Send + Sync {
    fn request(&self, n: u64);
    fn cancel(&self);
    fn state(&self) -> SubscriptionState;
    fn outstanding(&self) -> u64;
}

/// Consumer's handle on a live subscription.
///
/// Cheap to clone; all clones control the same subscription.
#[derive(Clone)]
pub struct SubscriptionHandle {
    control: Arc<dyn Control>,
}

impl SubscriptionHandle {
    /// Grants `n` more items. Zero, or any call after a terminal state, is a
    /// no-op.
    pub fn request(&self, n: u64) {
        self.control.request(n);
    }

    /// Cancels the subscription and every upstream subscription it holds.
    ///
    /// Once this returns, no further `on_item`, `on_error` or `on_complete`
    /// is delivered. Safe to call from inside a callback and idempotent.
    pub fn cancel(&self) {
        self.control.cancel();
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> SubscriptionState {
        self.control.state()
    }

    /// Returns `true` once the subscription reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// Returns demand granted but not yet consumed by delivered items.
    pub fn outstanding_demand(&self) -> u64 {
        self.control.outstanding()
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("state", &self.state())
            .field("outstanding", &self.outstanding_demand())
            .finish()
    }
}

/// Result of offering an item to the queue.
pub(crate) enum Offer<T> {
    Accepted,
    /// No demand and the watermark is reached; the item is handed back.
    Full(T),
    /// The subscription is terminal; the item is dropped.
    Closed,
}

type RequestHook = Box<dyn Fn(u64) + Send + Sync>;

/// Shared state of one subscription.
pub(crate) struct SubscriptionCore<T> {
    state: AtomicU8,
    demand: Demand,
    queue: Mutex<VecDeque<T>>,
    /// Terminal outcome reported by the producer, delivered once drained.
    finished: Mutex<Option<Result<(), FlowError>>>,
    wip: AtomicUsize,
    subscriber: Mutex<Option<Box<dyn Subscriber<T>>>>,
    gate: ReentrantMutex<()>,
    /// Wakes a producer waiting for queue room.
    space: Notify,
    /// Wakes the producer task when production must stop.
    halt: Notify,
    upstream: Mutex<Vec<SubscriptionHandle>>,
    request_hook: Mutex<Option<RequestHook>>,
    watermark: usize,
    #[cfg(debug_assertions)]
    audit: Audit,
}

/// Bookkeeping behind the debug-only protocol checks.
#[cfg(debug_assertions)]
#[derive(Default)]
struct Audit {
    /// Sum of granted demand, saturating at `u64::MAX`.
    granted: AtomicU64,
    delivered: AtomicU64,
    /// First terminal state entered.
    terminal: AtomicU8,
    signalled: AtomicBool,
}

/// Runs a consumer callback, turning a panic into a failure.
fn guarded<R>(callback: impl FnOnce() -> R) -> Result<R, FlowError> {
    panic::catch_unwind(AssertUnwindSafe(callback)).map_err(panic_failure)
}

fn panic_failure(payload: Box<dyn Any + Send>) -> FlowError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    FlowError::upstream(format!("consumer panicked: {message}"))
}

impl<T: Send + 'static> SubscriptionCore<T> {
    pub(crate) fn new(watermark: usize) -> Self {
        Self {
            state: AtomicU8::new(SubscriptionState::Unsubscribed as u8),
            demand: Demand::new(),
            queue: Mutex::new(VecDeque::new()),
            finished: Mutex::new(None),
            wip: AtomicUsize::new(0),
            subscriber: Mutex::new(None),
            gate: ReentrantMutex::new(()),
            space: Notify::new(),
            halt: Notify::new(),
            upstream: Mutex::new(Vec::new()),
            request_hook: Mutex::new(None),
            watermark,
            #[cfg(debug_assertions)]
            audit: Audit::default(),
        }
    }

    /// Returns a handle controlling this core.
    pub(crate) fn handle(self: &Arc<Self>) -> SubscriptionHandle {
        SubscriptionHandle {
            control: Arc::clone(self) as Arc<dyn Control>,
        }
    }

    #[inline]
    pub(crate) fn current_state(&self) -> SubscriptionState {
        SubscriptionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Moves to `to` unless already terminal. Returns `true` on success.
    fn transition(&self, to: SubscriptionState) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if SubscriptionState::from_u8(current).is_terminal() {
                return false;
            }
            match self.state.compare_exchange(
                current,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    #[cfg(debug_assertions)]
                    if to.is_terminal() {
                        self.audit.terminal.store(to as u8, Ordering::Release);
                    }
                    return true;
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Attaches the subscriber and enters `Active`.
    ///
    /// Returns `false` if the subscription was cancelled from `on_subscribe`.
    pub(crate) fn attach(&self, subscriber: Box<dyn Subscriber<T>>) -> bool {
        *self.subscriber.lock() = Some(subscriber);
        let activated = self
            .state
            .compare_exchange(
                SubscriptionState::Unsubscribed as u8,
                SubscriptionState::Active as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        // Deliver anything requested from on_subscribe, or drop the
        // subscriber if it cancelled there.
        self.drain();
        activated
    }

    /// Offers one item, respecting demand plus watermark.
    pub(crate) fn offer(&self, item: T) -> Offer<T> {
        if self.current_state().is_terminal() {
            return Offer::Closed;
        }
        let mut queue = self.queue.lock();
        let outstanding = self.demand.outstanding();
        let room = usize::try_from(outstanding)
            .unwrap_or(usize::MAX)
            .max(self.watermark);
        if queue.len() >= room {
            return Offer::Full(item);
        }
        queue.push_back(item);

        #[cfg(debug_assertions)]
        debug_assert_within_watermark!(queue.len(), outstanding, self.watermark);

        Offer::Accepted
    }

    /// Records the producer's outcome; delivered after queued items drain.
    pub(crate) fn finish(&self, outcome: Result<(), FlowError>) {
        match outcome {
            Err(FlowError::Cancelled) => {
                // Producer unwound because it observed cancellation.
                if !self.current_state().is_terminal() {
                    self.cancel_internal();
                }
            }
            outcome => {
                let mut finished = self.finished.lock();
                if finished.is_none() {
                    *finished = Some(outcome);
                }
                drop(finished);
                self.drain();
            }
        }
    }

    /// Links an upstream subscription so that cancelling this one cancels it.
    pub(crate) fn link_upstream(&self, handle: SubscriptionHandle) {
        if self.current_state().is_terminal() {
            handle.cancel();
            return;
        }
        let mut upstream = self.upstream.lock();
        upstream.retain(|h| !h.is_terminal());
        upstream.push(handle);
    }

    pub(crate) fn set_request_hook(&self, hook: RequestHook) {
        *self.request_hook.lock() = Some(hook);
    }

    /// Waits for queue room (or a terminal state).
    pub(crate) async fn wait_for_space(&self) {
        self.space.notified().await;
    }

    /// Resolves once production must stop: cancelled, or errored by the
    /// consumer.
    pub(crate) async fn halted(&self) {
        loop {
            let notified = self.halt.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.current_state().is_terminal() {
                return;
            }
            notified.await;
        }
    }

    fn wake_producer(&self) {
        self.space.notify_one();
        self.halt.notify_waiters();
    }

    fn cancel_upstream(&self) {
        let linked = std::mem::take(&mut *self.upstream.lock());
        for handle in &linked {
            handle.cancel();
        }

        #[cfg(debug_assertions)]
        debug_assert_upstream_cancelled!(linked.iter().filter(|h| !h.is_terminal()).count());
    }

    fn cancel_internal(&self) {
        let cancelled = {
            let _gate = self.gate.lock();
            self.transition(SubscriptionState::Cancelled)
        };
        if cancelled {
            tracing::debug!("subscription cancelled");
            self.cancel_upstream();
            self.wake_producer();
            // Releases the subscriber and any buffered items.
            self.drain();
        }
    }

    /// Runs the drain loop unless another caller is already in it.
    pub(crate) fn drain(&self) {
        if self.wip.fetch_add(1, Ordering::AcqRel) != 0 {
            return;
        }
        let mut missed = 1;
        loop {
            self.drain_pass();
            let previous = self.wip.fetch_sub(missed, Ordering::AcqRel);
            missed = previous - missed;
            if missed == 0 {
                break;
            }
        }
    }

    fn drain_pass(&self) {
        let mut slot = self.subscriber.lock();
        let Some(subscriber) = slot.as_mut() else {
            return;
        };

        let mut delivered = 0usize;
        loop {
            let state = self.current_state();
            if state.is_terminal() {
                #[cfg(debug_assertions)]
                debug_assert_terminal_absorbing!(
                    SubscriptionState::from_u8(self.audit.terminal.load(Ordering::Acquire)),
                    state
                );
                // Cancelled (or already signalled): release everything.
                slot.take();
                self.queue.lock().clear();
                break;
            }
            if state == SubscriptionState::Unsubscribed {
                break;
            }

            let has_item = !self.queue.lock().is_empty();
            if has_item {
                if !self.demand.try_take() {
                    break;
                }

                let Some(item) = self.queue.lock().pop_front() else {
                    // Only the drain loop pops; give the unit back.
                    self.demand.add(1);
                    break;
                };

                let gate = self.gate.lock();
                if self.current_state() != SubscriptionState::Active {
                    continue;
                }
                #[cfg(debug_assertions)]
                debug_assert_within_demand!(
                    self.audit.delivered.fetch_add(1, Ordering::AcqRel) + 1,
                    self.audit.granted.load(Ordering::Acquire)
                );

                let result = guarded(|| subscriber.on_item(item)).and_then(|r| r);
                drop(gate);
                delivered += 1;

                if let Err(error) = result {
                    tracing::warn!(%error, "consumer failed while handling an item");
                    let errored = {
                        let _gate = self.gate.lock();
                        let errored = self.transition(SubscriptionState::Errored);
                        if errored {
                            self.signal_terminal(|| subscriber.on_error(error));
                        }
                        errored
                    };
                    if errored {
                        self.cancel_upstream();
                        self.wake_producer();
                    }
                    slot.take();
                    self.queue.lock().clear();
                    break;
                }
                continue;
            }

            // Queue is empty; the producer never offers after finishing, so a
            // recorded outcome can be delivered now.
            let Some(outcome) = self.finished.lock().take() else {
                break;
            };
            let _gate = self.gate.lock();
            let to = match outcome {
                Ok(()) => SubscriptionState::Completed,
                Err(_) => SubscriptionState::Errored,
            };
            if self.transition(to) {
                match outcome {
                    Ok(()) => {
                        tracing::debug!("subscription completed");
                        self.signal_terminal(|| subscriber.on_complete());
                    }
                    Err(error) => {
                        tracing::debug!(%error, "subscription errored");
                        self.signal_terminal(|| subscriber.on_error(error));
                    }
                }
                self.upstream.lock().clear();
                self.halt.notify_waiters();
            }
            slot.take();
            break;
        }

        if delivered > 0 {
            self.space.notify_one();
        }
    }

    /// Delivers `on_complete` or `on_error`. The state is already terminal,
    /// so a panic here is only logged.
    fn signal_terminal(&self, callback: impl FnOnce()) {
        #[cfg(debug_assertions)]
        debug_assert_single_terminal!(self.audit.signalled.swap(true, Ordering::AcqRel));

        if let Err(error) = guarded(callback) {
            tracing::error!(%error, "consumer failed while handling a terminal signal");
        }
    }
}

impl<T: Send + 'static> Control for SubscriptionCore<T> {
    fn request(&self, n: u64) {
        if n == 0 || self.current_state().is_terminal() {
            return;
        }
        if let Some(hook) = self.request_hook.lock().as_ref() {
            hook(n);
        }
        #[cfg(debug_assertions)]
        {
            let granted = &self.audit.granted;
            let mut current = granted.load(Ordering::Acquire);
            while let Err(actual) = granted.compare_exchange_weak(
                current,
                current.saturating_add(n),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                current = actual;
            }
        }
        self.demand.add(n);
        self.space.notify_one();
        self.drain();
    }

    fn cancel(&self) {
        self.cancel_internal();
    }

    fn state(&self) -> SubscriptionState {
        self.current_state()
    }

    fn outstanding(&self) -> u64 {
        self.demand.outstanding()
    }
}

/// Subscriber assembled from three closures.
pub struct LambdaSubscriber<F, E, C> {
    on_item: F,
    on_error: Option<E>,
    on_complete: Option<C>,
}

impl<F, E, C> LambdaSubscriber<F, E, C> {
    pub fn new(on_item: F, on_error: E, on_complete: C) -> Self {
        Self {
            on_item,
            on_error: Some(on_error),
            on_complete: Some(on_complete),
        }
    }
}

impl<T, F, E, C> Subscriber<T> for LambdaSubscriber<F, E, C>
where
    T: Send + 'static,
    F: FnMut(T) -> Result<(), FlowError> + Send + 'static,
    E: FnOnce(FlowError) + Send + 'static,
    C: FnOnce() + Send + 'static,
{
    fn on_item(&mut self, item: T) -> Result<(), FlowError> {
        (self.on_item)(item)
    }

    fn on_error(&mut self, error: FlowError) {
        if let Some(on_error) = self.on_error.take() {
            on_error(error);
        }
    }

    fn on_complete(&mut self) {
        if let Some(on_complete) = self.on_complete.take() {
            on_complete();
        }
    }
}
