//! Outstanding-demand counter shared between a consumer and its producer.

use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicU64, Ordering};

/// Demand value at which the counter saturates and stops decrementing.
pub const UNBOUNDED: u64 = u64::MAX;

/// Lock-free counter of items a consumer is willing to receive.
///
/// `add` is called from the consumer side (`request(n)`), `try_take` from the
/// delivering side. Additions saturate at [`UNBOUNDED`]; once unbounded the
/// counter never decrements again.
///
/// The counter is padded to its own cache line since producer and consumer
/// hammer it from different cores.
#[derive(Debug)]
pub struct Demand {
    outstanding: CachePadded<AtomicU64>,
}

impl Demand {
    /// Creates a counter with zero demand.
    pub fn new() -> Self {
        Self {
            outstanding: CachePadded::new(AtomicU64::new(0)),
        }
    }

    /// Adds `n` to outstanding demand, saturating at [`UNBOUNDED`].
    ///
    /// Returns the new total. Adding zero is a no-op.
    pub fn add(&self, n: u64) -> u64 {
        if n == 0 {
            return self.outstanding();
        }
        let mut current = self.outstanding.load(Ordering::Acquire);
        loop {
            if current == UNBOUNDED {
                return UNBOUNDED;
            }
            let next = current.saturating_add(n);
            match self.outstanding.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }

    /// Consumes one unit of demand if any is outstanding.
    pub fn try_take(&self) -> bool {
        let mut current = self.outstanding.load(Ordering::Acquire);
        loop {
            match current {
                0 => return false,
                UNBOUNDED => return true,
                n => match self.outstanding.compare_exchange_weak(
                    current,
                    n - 1,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => return true,
                    Err(actual) => current = actual,
                },
            }
        }
    }

    /// Returns the current outstanding demand.
    #[inline]
    pub fn outstanding(&self) -> u64 {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Returns `true` if demand has saturated to unbounded.
    #[inline]
    pub fn is_unbounded(&self) -> bool {
        self.outstanding() == UNBOUNDED
    }
}

impl Default for Demand {
    fn default() -> Self {
        Self::new()
    }
}
