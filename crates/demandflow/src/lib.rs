//! Demand-windowed reactive sources for tokio.
//!
//! A [`Source`] describes a lazy, restartable sequence of items. Subscribing
//! creates a subscription in which the consumer grants demand explicitly and
//! the producer never delivers more items than were requested.
//!
//! # Features
//!
//! - **Explicit demand**: `SubscriptionHandle::request(n)` / `cancel()`, with
//!   delivery serialized per subscription and no signal after `cancel` returns
//! - **Bounded run-ahead**: producers buffer at most `watermark` items beyond
//!   outstanding demand, then suspend in `Emitter::emit`
//! - **Combinators**: `concat`, `merge` (bounded concurrency), `merge_sequential`,
//!   `combine_latest`, `zip_all`, each with cancellation propagating upstream
//! - **Error deferral**: `concat_delay_error` / `merge_delay_error` collect
//!   failures into one [`FlowError::Aggregate`] after every source is done
//! - **Scheduling hand-off**: `subscribe_on` / `publish_on` place stages on
//!   named [`Scheduler`] pools
//!
//! # Example
//!
//! ```
//! use demandflow::{zip2, Source};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let pairs = zip2(Source::from_iter(vec!['x', 'y', 'z']), Source::range(1, 2))
//!         .collect()
//!         .await
//!         .unwrap();
//!     assert_eq!(pairs, vec![('x', 1), ('y', 2)]);
//! }
//! ```

mod combine_latest;
mod concat;
mod config;
mod demand;
mod emitter;
mod error;
mod error_policy;
mod invariants;
mod merge;
mod operators;
mod scheduler;
mod source;
mod stream;
mod subscription;
mod tagged;
mod zip;

pub use combine_latest::{combine_latest, combine_latest2};
pub use concat::{concat, concat_delay_error};
pub use config::{FlowConfig, SchedulerConfig};
pub use demand::{Demand, UNBOUNDED};
pub use emitter::Emitter;
pub use error::{Cause, FlowError};
pub use error_policy::ErrorMode;
pub use merge::{merge, merge_bounded, merge_delay_error, merge_sequential, merge_with_options, MergeOptions};
pub use scheduler::{current_thread_name, Scheduler};
pub use source::Source;
pub use stream::SourceStream;
pub use subscription::{LambdaSubscriber, Subscriber, SubscriptionHandle, SubscriptionState};
pub use zip::{zip2, zip3, zip_all};

// Re-export useful stream combinators
pub use tokio_stream::StreamExt;
