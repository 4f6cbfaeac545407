//! Debug assertion macros for subscription and demand invariants.
//!
//! These macros provide runtime checks for the protocol invariants of the
//! demand window. They are only active in debug builds
//! (`#[cfg(debug_assertions)]`), so there is zero overhead in release builds.

// =============================================================================
// INV-DEM-01: No Over-Delivery
// =============================================================================

/// Assert that an item is delivered only against a unit of granted demand.
///
/// **Invariant**: `delivered_since_subscribe ≤ Σ request(n)`
///
/// Used in: `SubscriptionCore::drain()` before calling `on_item`
macro_rules! debug_assert_within_demand {
    ($delivered:expr, $granted:expr) => {
        debug_assert!(
            $delivered <= $granted,
            "INV-DEM-01 violated: item {} delivered against {} granted",
            $delivered,
            $granted
        )
    };
}

// =============================================================================
// INV-SUB-01: Terminal States Are Absorbing
// =============================================================================

/// Assert that no transition leaves a terminal state.
///
/// **Invariant**: `state ∈ {Completed, Cancelled, Errored} → state' = state`
///
/// Used in: `SubscriptionCore::drain()`, comparing the first terminal state
/// entered with the state observed later
macro_rules! debug_assert_terminal_absorbing {
    ($from:expr, $to:expr) => {
        debug_assert!(
            !$from.is_terminal() || $from == $to,
            "INV-SUB-01 violated: transition {:?} -> {:?} leaves a terminal state",
            $from,
            $to
        )
    };
}

// =============================================================================
// INV-SUB-02: Single Terminal Signal
// =============================================================================

/// Assert that `on_complete`/`on_error` fire at most once, mutually exclusive.
///
/// **Invariant**: `|{on_complete, on_error} fired| ≤ 1`
///
/// Used in: `SubscriptionCore::signal_terminal()`
macro_rules! debug_assert_single_terminal {
    ($already_signalled:expr) => {
        debug_assert!(
            !$already_signalled,
            "INV-SUB-02 violated: terminal signal delivered twice"
        )
    };
}

// =============================================================================
// INV-BUF-01: Bounded Run-Ahead
// =============================================================================

/// Assert that a producer only enqueues within demand plus watermark.
///
/// **Invariant**: `queued ≤ max(outstanding_demand, watermark)`
///
/// Used in: `SubscriptionCore::offer()`
macro_rules! debug_assert_within_watermark {
    ($queued:expr, $outstanding:expr, $watermark:expr) => {
        debug_assert!(
            $queued <= ($outstanding as usize).max($watermark),
            "INV-BUF-01 violated: {} queued items exceed demand {} and watermark {}",
            $queued,
            $outstanding,
            $watermark
        )
    };
}

// =============================================================================
// INV-CAN-01: Upstream Cancellation
// =============================================================================

/// Assert that every linked upstream was cancelled before `cancel()` returns.
///
/// **Invariant**: `cancel() → ∀ child: child.state ∈ terminal`
///
/// Used in: `SubscriptionCore::cancel()`
macro_rules! debug_assert_upstream_cancelled {
    ($remaining:expr) => {
        debug_assert!(
            $remaining == 0,
            "INV-CAN-01 violated: {} upstream subscriptions still linked after cancel",
            $remaining
        )
    };
}

// =============================================================================
// INV-ADP-01: Bounded Adapter Window
// =============================================================================

/// Assert that a stage adapter never has more than `prefetch` items outstanding.
///
/// **Invariant**: `requested - received ≤ prefetch`
///
/// Used in: `SourceStream::poll_next()` after replenishing
macro_rules! debug_assert_window_bounded {
    ($outstanding:expr, $prefetch:expr) => {
        debug_assert!(
            $outstanding <= $prefetch,
            "INV-ADP-01 violated: {} items outstanding exceeds prefetch {}",
            $outstanding,
            $prefetch
        )
    };
}

// =============================================================================
// Re-exports for crate-internal use
// =============================================================================

pub(crate) use debug_assert_single_terminal;
pub(crate) use debug_assert_terminal_absorbing;
pub(crate) use debug_assert_upstream_cancelled;
pub(crate) use debug_assert_window_bounded;
pub(crate) use debug_assert_within_demand;
pub(crate) use debug_assert_within_watermark;
