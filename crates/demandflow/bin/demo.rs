//! Demonstration of demandflow features.
//!
//! Run with: `RUST_LOG=demandflow=debug cargo run -p demandflow --bin demo`

use demandflow::{
    combine_latest2, concat_delay_error, current_thread_name, merge_delay_error, zip2, FlowError,
    Scheduler, Source, StreamExt,
};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== demandflow Demo ===\n");

    demo_demand().await?;
    demo_combinators().await?;
    demo_error_deferral().await?;
    demo_scheduling().await?;

    println!("\n=== All demos completed successfully! ===");
    Ok(())
}

/// Demo 1: explicit demand through a windowed stream
async fn demo_demand() -> anyhow::Result<()> {
    println!("--- Demo 1: Demand ---");

    let mut stream = Source::range(1, 5).log("demo.range").map(|n| n * n).into_stream();
    while let Some(item) = stream.next().await {
        println!("  Received: {}", item?);
    }

    let first = Source::interval(Duration::from_millis(10)).first().await?;
    println!("  First tick: {first:?}");
    Ok(())
}

/// Demo 2: zip and combine-latest
async fn demo_combinators() -> anyhow::Result<()> {
    println!("\n--- Demo 2: Combinators ---");

    let pairs = zip2(Source::from_iter(vec!["x", "y", "z"]), Source::range(1, 2))
        .collect()
        .await?;
    println!("  zip (shortest wins): {pairs:?}");

    let latest = combine_latest2(
        Source::from_iter(vec!["a", "b"]),
        Source::from_iter(vec!["c", "d"]).delay_elements(Duration::from_millis(10)),
        |x, y| format!("{x}{y}"),
    )
    .collect()
    .await?;
    println!("  combine_latest: {latest:?}");
    Ok(())
}

/// Demo 3: deferred failures
async fn demo_error_deferral() -> anyhow::Result<()> {
    println!("\n--- Demo 3: Error deferral ---");

    let letters = Source::from_iter(vec!["a", "b"]).try_map(|letter| {
        if letter == "b" {
            Err(FlowError::upstream("index error"))
        } else {
            Ok(letter)
        }
    });
    let mut stream = concat_delay_error([letters, Source::from_iter(vec!["c", "d"])]).into_stream();
    while let Some(item) = stream.next().await {
        match item {
            Ok(letter) => println!("  concat_delay_error item: {letter}"),
            Err(error) => println!("  concat_delay_error failed at the end: {error}"),
        }
    }

    let failing = Source::just(1).concat_with(&Source::error(FlowError::upstream("boom")));
    let result = merge_delay_error([failing, Source::from_iter(vec![2, 3])]).collect().await;
    println!("  merge_delay_error: {result:?}");
    Ok(())
}

/// Demo 4: subscribe_on / publish_on
async fn demo_scheduling() -> anyhow::Result<()> {
    println!("\n--- Demo 4: Scheduling ---");

    let single = Scheduler::single("demo-single")?;
    let elastic = Scheduler::bounded_elastic("demo-elastic", 4)?;

    let placed = Source::from_blocking(|| Ok(current_thread_name()))
        .publish_on(single)
        .map(|source_thread| (source_thread, current_thread_name()))
        .subscribe_on(elastic)
        .collect()
        .await?;
    for (source_thread, map_thread) in placed {
        println!("  source ran on {source_thread}, map ran on {map_thread}");
    }
    Ok(())
}
