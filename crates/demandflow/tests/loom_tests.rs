//! Loom-based concurrency tests for the demand counter.
//!
//! Run with: `cargo test -p demandflow --features loom --test loom_tests --release`
//!
//! Loom exhaustively explores thread interleavings of the add/take protocol
//! used between a consumer granting demand and a producer delivering items.

#![cfg(feature = "loom")]

use loom::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use loom::sync::Arc;
use loom::thread;

const UNBOUNDED: u64 = u64::MAX;

/// The demand counter protocol, on loom atomics.
struct LoomDemand {
    outstanding: AtomicU64,
}

impl LoomDemand {
    fn new() -> Self {
        Self {
            outstanding: AtomicU64::new(0),
        }
    }

    /// Consumer: grant `n` more units, saturating at unbounded.
    fn add(&self, n: u64) {
        let mut current = self.outstanding.load(Ordering::Acquire);
        loop {
            if current == UNBOUNDED {
                return;
            }
            let next = current.saturating_add(n);
            match self.outstanding.compare_exchange(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    /// Producer: consume one unit if available.
    fn try_take(&self) -> bool {
        let mut current = self.outstanding.load(Ordering::Acquire);
        loop {
            match current {
                0 => return false,
                UNBOUNDED => return true,
                n => match self.outstanding.compare_exchange(
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
}

/// Two deliverers racing for two units never take more than two.
#[test]
fn loom_concurrent_takes_respect_grant() {
    loom::model(|| {
        let demand = Arc::new(LoomDemand::new());
        demand.add(2);
        let taken = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let demand = Arc::clone(&demand);
                let taken = Arc::clone(&taken);
                thread::spawn(move || {
                    for _ in 0..2 {
                        if demand.try_take() {
                            taken.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(taken.load(Ordering::SeqCst), 2);
        assert_eq!(demand.outstanding.load(Ordering::SeqCst), 0);
    });
}

/// A request racing with a delivery: every unit taken was granted first.
#[test]
fn loom_request_races_delivery() {
    loom::model(|| {
        let demand = Arc::new(LoomDemand::new());
        let consumer = Arc::clone(&demand);

        let requester = thread::spawn(move || {
            consumer.add(1);
            consumer.add(1);
        });

        let mut taken = 0;
        for _ in 0..3 {
            if demand.try_take() {
                taken += 1;
            }
            thread::yield_now();
        }

        requester.join().unwrap();
        let remaining = demand.outstanding.load(Ordering::SeqCst);
        assert!(taken <= 2, "took {taken} units of a 2-unit grant");
        assert_eq!(taken + remaining, 2);
    });
}

/// Saturation to unbounded is never undone by a concurrent take.
#[test]
fn loom_unbounded_is_sticky() {
    loom::model(|| {
        let demand = Arc::new(LoomDemand::new());
        demand.add(1);
        let producer = Arc::clone(&demand);

        let taker = thread::spawn(move || producer.try_take());
        demand.add(UNBOUNDED);

        assert!(taker.join().unwrap());
        assert_eq!(demand.outstanding.load(Ordering::SeqCst), UNBOUNDED);
    });
}
