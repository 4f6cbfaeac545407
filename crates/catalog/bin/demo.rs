//! Demonstration of the catalog service.
//!
//! Run with: `RUST_LOG=catalog=debug,demandflow=info cargo run -p catalog --bin catalog-demo [snapshot.json]`

use catalog::{
    CatalogConfig, CatalogService, CatalogSnapshot, Episode, EpisodeStore, InMemoryEpisodeStore,
    InMemorySeriesStore, Series, SeriesStore, StoreError,
};
use demandflow::{Scheduler, StreamExt};
use tracing_subscriber::EnvFilter;

type Service = CatalogService<InMemorySeriesStore, InMemoryEpisodeStore>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== catalog Demo ===\n");

    let service = match std::env::args().nth(1) {
        Some(path) => from_snapshot(path).await?,
        None => seeded().await?,
    };

    demo_single(&service).await?;
    demo_batch(&service).await?;
    demo_mutations(&service).await?;

    println!("\n=== All demos completed successfully! ===");
    Ok(())
}

async fn from_snapshot(path: String) -> anyhow::Result<Service> {
    println!("Loading snapshot from {path}");
    let io = Scheduler::bounded_elastic("catalog-io", 2)?;
    let snapshot = CatalogSnapshot::load(path)
        .subscribe_on(io)
        .first()
        .await?
        .unwrap_or_default();
    let (series, episodes) = snapshot.into_stores();
    Ok(CatalogService::with_config(
        series,
        episodes,
        CatalogConfig::default().with_merge_concurrency(4),
    ))
}

async fn seeded() -> anyhow::Result<Service> {
    let series = InMemorySeriesStore::new();
    let episodes = InMemoryEpisodeStore::new();
    for name in ["Naruto", "Bleach", "One Piece"] {
        series.save(Series::new(name)).await?;
    }
    for (owner, title) in [
        ("Naruto", "Enter: Naruto Uzumaki!"),
        ("Naruto", "My Name is Konohamaru!"),
        ("One Piece", "I'm Luffy!"),
    ] {
        episodes.save(Episode::new(owner, title)).await?;
    }
    Ok(CatalogService::with_config(
        series,
        episodes,
        CatalogConfig::default().with_merge_concurrency(4),
    ))
}

/// Demo 1: single lookups
async fn demo_single(service: &Service) -> anyhow::Result<()> {
    println!("--- Demo 1: Single lookups ---");

    if let Some(first) = service.series_store().find_all().first().await? {
        let view = service.fetch_composite(&first.name).await?;
        println!("  {}", serde_json::to_string(&view)?);
    }

    match service.fetch_composite("Ghost").await {
        Ok(view) => println!("  unexpected: {view:?}"),
        Err(e) => println!("  Ghost -> {:?}: {e}", e.response_class()),
    }
    Ok(())
}

/// Demo 2: batch join with one failing episode lookup
async fn demo_batch(service: &Service) -> anyhow::Result<()> {
    println!("\n--- Demo 2: Batch join ---");

    let mut stream = service.fetch_all_composite().into_stream();
    while let Some(view) = stream.next().await {
        let view = view?;
        println!("  {} ({} episodes)", view.name, view.episodes.len());
    }

    if let Some(victim) = service.series_store().find_all().first().await? {
        service
            .episode_store()
            .fail_lookups_for(victim.name.clone(), StoreError::Unavailable("replica down".into()));
        let outcome = service.fetch_all_best_effort().await;
        println!(
            "  With {} failing: {} composites, failure: {}",
            victim.name,
            outcome.composites.len(),
            outcome
                .failure
                .map_or_else(|| "none".to_string(), |e| e.to_string())
        );
    }
    Ok(())
}

/// Demo 3: create, update, delete
async fn demo_mutations(service: &Service) -> anyhow::Result<()> {
    println!("\n--- Demo 3: Mutations ---");

    let created = service.create_composite(Series::new("Hunter x Hunter")).await?;
    println!("  created: {:?} {}", created.id, created.name);

    let updated = service
        .update_composite("Hunter x Hunter", Series::new("Hunter x Hunter (2011)"))
        .await?;
    println!("  updated: {:?} {} (id kept: {})", updated.id, updated.name, updated.id == created.id);

    let episodes = service.episode_service();
    let episode = episodes
        .create(Episode::new("Hunter x Hunter (2011)", "Departure x And x Friends"))
        .await?;
    println!("  episode: {} / {}", episode.series_name, episode.title);
    println!(
        "  after episode: {} episodes",
        service.fetch_composite("Hunter x Hunter (2011)").await?.episodes.len()
    );

    let deleted = service.delete_composite("Hunter x Hunter (2011)").await?;
    println!("  deleted: {}", deleted.name);
    episodes.delete(&episode.title).await?;
    Ok(())
}
