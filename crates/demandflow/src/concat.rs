//! Sequential combinator.

use crate::error_policy::{ErrorCollector, ErrorMode};
use crate::source::Source;
use futures_util::StreamExt;
use std::sync::Arc;

/// Subscribes to each source only after the previous one completed.
///
/// Every item of source `i` is emitted, in order, before source `i + 1` is
/// subscribed. The first failure ends the chain.
pub fn concat<T, I>(sources: I) -> Source<T>
where
    T: Send + 'static,
    I: IntoIterator<Item = Source<T>>,
{
    concat_with_mode(sources, ErrorMode::Immediate)
}

/// Like [`concat`], but a failing source is treated as completed and the
/// chain moves on; captured failures are raised as one aggregate at the end.
pub fn concat_delay_error<T, I>(sources: I) -> Source<T>
where
    T: Send + 'static,
    I: IntoIterator<Item = Source<T>>,
{
    concat_with_mode(sources, ErrorMode::Deferred)
}

fn concat_with_mode<T, I>(sources: I, mode: ErrorMode) -> Source<T>
where
    T: Send + 'static,
    I: IntoIterator<Item = Source<T>>,
{
    let sources: Arc<[Source<T>]> = sources.into_iter().collect();
    Source::create(move |emitter| {
        let sources = Arc::clone(&sources);
        async move {
            let mut errors = ErrorCollector::new(mode);
            for (index, source) in sources.iter().enumerate() {
                let mut input = emitter.open(source);
                while let Some(item) = input.next().await {
                    match item {
                        Ok(item) => emitter.emit(item).await?,
                        Err(error) => errors.capture(index, error)?,
                    }
                }
            }
            errors.finish()
        }
    })
}
