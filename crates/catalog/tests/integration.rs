//! Integration tests for the catalog service.

use catalog::{
    CatalogConfig, CatalogError, CatalogService, CatalogSnapshot, Episode, EpisodeStore, EntityKind,
    InMemoryEpisodeStore, InMemorySeriesStore, ResponseClass, Series, SeriesStore, StoreError,
};
use demandflow::{FlowError, Scheduler, StreamExt};
use std::fs;
use tempfile::TempDir;

type Service = CatalogService<InMemorySeriesStore, InMemoryEpisodeStore>;

async fn service_with(series: &[&str], episodes: &[(&str, &str)], config: CatalogConfig) -> Service {
    let service = CatalogService::with_config(
        InMemorySeriesStore::new(),
        InMemoryEpisodeStore::new(),
        config,
    );
    for name in series {
        service.series_store().save(Series::new(*name)).await.unwrap();
    }
    for (owner, title) in episodes {
        service
            .episode_service()
            .create(Episode::new(*owner, *title))
            .await
            .unwrap();
    }
    service
}

async fn anime_catalog() -> Service {
    service_with(
        &["Naruto", "Bleach", "One Piece"],
        &[
            ("Naruto", "Enter: Naruto Uzumaki!"),
            ("Naruto", "My Name is Konohamaru!"),
            ("One Piece", "I'm Luffy!"),
        ],
        CatalogConfig::default(),
    )
    .await
}

fn sorted_names(views: &[catalog::SeriesView]) -> Vec<&str> {
    let mut names: Vec<&str> = views.iter().map(|v| v.name.as_str()).collect();
    names.sort_unstable();
    names
}

// =============================================================================
// Single-entity operations
// =============================================================================

#[tokio::test]
async fn test_unknown_name_is_not_found() {
    let service = anime_catalog().await;
    let err = service.fetch_composite("Ghost").await.unwrap_err();

    assert!(matches!(
        &err,
        CatalogError::NotFound { kind: EntityKind::Series, key } if key == "Ghost"
    ));
    assert_eq!(err.response_class(), ResponseClass::NotFound);
}

#[tokio::test]
async fn test_series_without_episodes_has_empty_collection() {
    let service = service_with(&["Known"], &[], CatalogConfig::default()).await;
    let view = service.fetch_composite("Known").await.unwrap();

    assert_eq!(view.name, "Known");
    assert!(view.id.is_some());
    assert!(view.episodes.is_empty());
}

#[tokio::test]
async fn test_composite_materializes_owned_episodes_only() {
    let service = anime_catalog().await;
    let view = service.fetch_composite("Naruto").await.unwrap();

    let titles: Vec<&str> = view.episodes.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, vec!["Enter: Naruto Uzumaki!", "My Name is Konohamaru!"]);
    assert!(view.episodes.iter().all(|e| e.series_name == "Naruto"));
}

#[tokio::test]
async fn test_create_assigns_id_and_joins() {
    let service = service_with(&[], &[("Hunter x Hunter", "Departure")], CatalogConfig::default()).await;
    let view = service
        .create_composite(Series::new("Hunter x Hunter"))
        .await
        .unwrap();

    assert!(view.id.is_some());
    assert_eq!(view.episodes.len(), 1);
}

#[tokio::test]
async fn test_create_duplicate_name_conflicts() {
    let service = anime_catalog().await;
    let err = service.create_composite(Series::new("Bleach")).await.unwrap_err();

    assert!(matches!(err, CatalogError::Store(StoreError::Conflict(_))));
    assert_eq!(err.response_class(), ResponseClass::Failure);
}

#[tokio::test]
async fn test_update_preserves_identifier() {
    let service = anime_catalog().await;
    let original = service.fetch_composite("Bleach").await.unwrap();

    let updated = service
        .update_composite("Bleach", Series::new("Bleach: Thousand-Year Blood War"))
        .await
        .unwrap();

    assert_eq!(updated.id, original.id);
    assert_eq!(updated.name, "Bleach: Thousand-Year Blood War");
    assert!(service.fetch_composite("Bleach").await.unwrap_err().is_not_found());
    assert_eq!(service.series_store().len(), 3);
}

#[tokio::test]
async fn test_update_ignores_caller_supplied_id() {
    let service = anime_catalog().await;
    let original = service.fetch_composite("Naruto").await.unwrap();

    let updated = service
        .update_composite("Naruto", Series::new("Naruto").with_id("forged"))
        .await
        .unwrap();
    assert_eq!(updated.id, original.id);
    assert_eq!(updated.episodes.len(), 2);
}

#[tokio::test]
async fn test_update_and_delete_unknown_name_are_not_found() {
    let service = anime_catalog().await;

    let update = service
        .update_composite("Ghost", Series::new("Ghost"))
        .await
        .unwrap_err();
    assert!(update.is_not_found());

    let delete = service.delete_composite("Ghost").await.unwrap_err();
    assert!(delete.is_not_found());
    assert_eq!(service.series_store().len(), 3);
}

#[tokio::test]
async fn test_delete_twice_is_not_found() {
    let service = anime_catalog().await;
    let view = service.delete_composite("One Piece").await.unwrap();
    assert_eq!(view.episodes.len(), 1);

    assert!(service.delete_composite("One Piece").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_primary_store_outage_is_failure() {
    let service = anime_catalog().await;
    service.series_store().set_unavailable(Some("primary down"));

    let err = service.fetch_composite("Naruto").await.unwrap_err();
    assert!(matches!(err, CatalogError::Store(StoreError::Unavailable(_))));
    assert_eq!(err.response_class(), ResponseClass::Failure);
}

// =============================================================================
// Batch join
// =============================================================================

#[tokio::test]
async fn test_fetch_all_joins_every_series() {
    let service = anime_catalog().await;
    let views = service.fetch_all_composite().collect().await.unwrap();

    assert_eq!(sorted_names(&views), vec!["Bleach", "Naruto", "One Piece"]);
    let bleach = views.iter().find(|v| v.name == "Bleach").unwrap();
    assert!(bleach.episodes.is_empty());
}

#[tokio::test]
async fn test_failing_join_is_isolated_and_deferred() {
    let service = anime_catalog().await;
    service
        .episode_store()
        .fail_lookups_for("Naruto", StoreError::Unavailable("replica down".into()));

    let outcome = service.fetch_all_best_effort().await;
    assert_eq!(sorted_names(&outcome.composites), vec!["Bleach", "One Piece"]);

    let Some(CatalogError::Flow(failure)) = &outcome.failure else {
        panic!("expected a deferred flow failure, got {:?}", outcome.failure);
    };
    assert!(failure.is_aggregate());
    assert_eq!(failure.causes().len(), 1);
    assert_eq!(
        StoreError::from_flow(&failure.causes()[0]),
        Some(&StoreError::Unavailable("replica down".into()))
    );
    assert_eq!(
        outcome.failure.as_ref().map(CatalogError::response_class),
        Some(ResponseClass::Failure)
    );
}

#[tokio::test]
async fn test_fetch_all_stream_emits_before_aggregate() {
    let service = anime_catalog().await;
    service
        .episode_store()
        .fail_lookups_for("Bleach", StoreError::Unavailable("timeout".into()));
    service
        .episode_store()
        .fail_lookups_for("One Piece", StoreError::Unavailable("timeout".into()));

    let mut stream = service.fetch_all_composite().into_stream();
    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.name, "Naruto");

    let last = stream.next().await.unwrap().unwrap_err();
    assert!(matches!(&last, FlowError::Aggregate(causes) if causes.len() == 2));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_unknown_owner_counts_as_empty() {
    let service = anime_catalog().await;
    service
        .episode_store()
        .fail_lookups_for("Bleach", StoreError::OwnerNotFound("Bleach".into()));

    let outcome = service.fetch_all_best_effort().await;
    assert!(outcome.is_complete());
    let bleach = outcome
        .composites
        .iter()
        .find(|v| v.name == "Bleach")
        .unwrap();
    assert!(bleach.episodes.is_empty());
}

#[tokio::test]
async fn test_primary_listing_failure_is_not_deferred() {
    let service = anime_catalog().await;
    service.series_store().set_unavailable(Some("primary down"));

    let err = service.fetch_all_composite().collect().await.unwrap_err();
    assert!(!err.is_aggregate());
    assert_eq!(
        StoreError::from_flow(&err),
        Some(&StoreError::Unavailable("primary down".into()))
    );
}

#[tokio::test]
async fn test_single_join_at_a_time_keeps_store_order() {
    let config = CatalogConfig::default().with_merge_concurrency(1);
    let service = service_with(&["C", "A", "B"], &[("A", "a1")], config).await;

    let names: Vec<String> = service
        .fetch_all_composite()
        .collect()
        .await
        .unwrap()
        .into_iter()
        .map(|v| v.name)
        .collect();
    assert_eq!(names, vec!["C", "A", "B"]);
}

#[tokio::test]
async fn test_unbounded_concurrency_joins_everything() {
    let names: Vec<String> = (0..40).map(|i| format!("series-{i}")).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let service = service_with(&refs, &[], CatalogConfig::default().unbounded()).await;

    let views = service.fetch_all_composite().collect().await.unwrap();
    assert_eq!(views.len(), 40);
}

// =============================================================================
// Episodes
// =============================================================================

#[tokio::test]
async fn test_episode_crud_by_title() {
    let service = anime_catalog().await;
    let episodes = service.episode_service();

    let found = episodes.find_by_title("I'm Luffy!").await.unwrap();
    assert_eq!(found.series_name, "One Piece");

    let before = service
        .episode_store()
        .find_by_title("I'm Luffy!")
        .await
        .unwrap()
        .unwrap();
    let updated = episodes
        .update("I'm Luffy!", Episode::new("One Piece", "I'm Luffy! The Man Who Will Become King"))
        .await
        .unwrap();
    assert_eq!(updated.title, "I'm Luffy! The Man Who Will Become King");
    let after = service
        .episode_store()
        .find_by_title(&updated.title)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.id, before.id);

    let deleted = episodes.delete(&updated.title).await.unwrap();
    assert_eq!(deleted.series_name, "One Piece");
    assert!(episodes.delete(&updated.title).await.unwrap_err().is_not_found());
    assert!(episodes.find_by_series_name("One Piece").collect().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_episode_lookups_missing_title() {
    let service = anime_catalog().await;
    let episodes = service.episode_service();

    let err = episodes.find_by_title("Nope").await.unwrap_err();
    assert!(matches!(
        err,
        CatalogError::NotFound { kind: EntityKind::Episode, .. }
    ));
    let err = episodes
        .update("Nope", Episode::new("Naruto", "Nope"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(episodes.find_all().collect().await.unwrap().len(), 3);
}

// =============================================================================
// Snapshots
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_snapshot_seeds_service_off_the_async_workers() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("catalog.json");
    fs::write(
        &path,
        r#"{
            "series": [{"id": "s-1", "name": "Naruto"}, {"name": "Bleach"}],
            "episodes": [{"series_name": "Naruto", "title": "Enter: Naruto Uzumaki!"}]
        }"#,
    )
    .unwrap();

    let io = Scheduler::bounded_elastic("catalog-io", 2).unwrap();
    let snapshot = CatalogSnapshot::load(&path)
        .subscribe_on(io)
        .first()
        .await
        .unwrap()
        .unwrap();

    let (series, episodes) = snapshot.into_stores();
    let service = CatalogService::new(series, episodes);
    let view = service.fetch_composite("Naruto").await.unwrap();
    assert_eq!(view.id.as_deref(), Some("s-1"));
    assert_eq!(view.episodes.len(), 1);
    assert!(service.fetch_composite("Bleach").await.unwrap().episodes.is_empty());
}

#[tokio::test]
async fn test_missing_snapshot_fails_the_source() {
    let dir = TempDir::new().unwrap();
    let err = CatalogSnapshot::load(dir.path().join("absent.json"))
        .first()
        .await
        .unwrap_err();
    assert!(matches!(
        StoreError::from_flow(&err),
        Some(StoreError::Snapshot(_))
    ));
}
