mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::mocks::{FakeRemotePostApi, sample_post};
use common::{TestApp, next_event, test_config, wait_until};
use mini_feed_lib::application::ports::key_value_store::KeyValueStore;
use mini_feed_lib::domain::entities::DataSource;
use mini_feed_lib::domain::value_objects::{PageRequest, PostId};
use mini_feed_lib::infrastructure::cache::{CACHE_SNAPSHOT_KEY, CacheStore};
use mini_feed_lib::infrastructure::storage::InMemoryKeyValueStore;
use mini_feed_lib::{AppError, PostRepository, PostSyncEvent};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn online_create_swaps_placeholder_in_place() {
    let app = TestApp::start(FakeRemotePostApi::with_posts(5), true).await;
    let repo = &app.state.post_repository;
    let feed = &app.state.feed;
    let mut events = repo.subscribe();

    feed.load_page(repo, 1, 20, false).await.unwrap();
    app.remote.hold_creates();

    let optimistic = repo
        .create_post("Hello".into(), "World body text".into(), 1)
        .await
        .unwrap();
    assert!(optimistic.is_optimistic());
    let placeholder = optimistic.id;

    wait_until(move || async move { feed.state().position_of(&placeholder) == Some(0) }).await;
    assert_eq!(feed.state().posts.len(), 6);

    app.remote.release_creates(1);
    let confirmed = next_event(&mut events, |e| matches!(e, PostSyncEvent::Confirmed { .. })).await;
    let PostSyncEvent::Confirmed { local_id, post } = confirmed else {
        unreachable!()
    };
    assert_eq!(Some(local_id), optimistic.local_id());
    assert_eq!(post.id, PostId::Confirmed(101));
    assert!(!post.is_optimistic());
    assert_eq!(post.title, "Hello");
    assert_eq!(post.body, "World body text");

    wait_until(move || async move {
        feed.state().position_of(&PostId::Confirmed(101)) == Some(0)
    })
    .await;
    let state = feed.state();
    assert!(state.position_of(&placeholder).is_none());
    assert_eq!(state.posts[1].id, PostId::Confirmed(1));

    // 以後のキャッシュ優先読み取りにも現れる
    let cached = repo.get_posts(1, 20, false).await.unwrap();
    assert_eq!(cached.data[0].id, PostId::Confirmed(101));
    assert!(repo.pending_operations().await.is_empty());
}

#[tokio::test]
async fn offline_create_is_replayed_on_reconnect() {
    let remote = FakeRemotePostApi::with_posts(3);
    remote.set_offline(true);
    let app = TestApp::start(remote, false).await;
    let repo = &app.state.post_repository;
    let mut events = repo.subscribe();

    let optimistic = repo
        .create_post("Hello".into(), "World body text".into(), 1)
        .await
        .unwrap();
    assert!(optimistic.is_optimistic());
    assert_eq!(repo.pending_operations().await.len(), 1);
    assert_eq!(app.remote.count(&app.remote.calls.create), 0);

    app.reconnect().await;

    let confirmed = next_event(&mut events, |e| matches!(e, PostSyncEvent::Confirmed { .. })).await;
    assert!(matches!(
        confirmed,
        PostSyncEvent::Confirmed { post, .. } if post.id == PostId::Confirmed(101)
    ));
    assert!(repo.pending_operations().await.is_empty());

    let sync = &app.state.sync_service;
    wait_until(move || async move { sync.status().await.last_report.is_some() }).await;
    assert_eq!(sync.status().await.last_report.unwrap().confirmed, 1);
}

#[tokio::test]
async fn offline_create_rejected_on_replay_is_removed() {
    let remote = FakeRemotePostApi::with_posts(3);
    remote.set_offline(true);
    remote
        .fail_next_creates(vec![AppError::server(422, "title rejected")])
        .await;
    let app = TestApp::start(remote, false).await;
    let repo = &app.state.post_repository;
    let feed = &app.state.feed;
    let mut events = repo.subscribe();

    let optimistic = repo
        .create_post("Hello".into(), "World body text".into(), 1)
        .await
        .unwrap();
    let placeholder = optimistic.id;
    wait_until(move || async move { feed.state().position_of(&placeholder).is_some() }).await;

    app.reconnect().await;

    let rolled_back =
        next_event(&mut events, |e| matches!(e, PostSyncEvent::RolledBack { .. })).await;
    let PostSyncEvent::RolledBack { error, .. } = rolled_back else {
        unreachable!()
    };
    assert_eq!(error, AppError::server(422, "title rejected"));

    wait_until(move || async move { feed.state().position_of(&placeholder).is_none() }).await;
    assert_eq!(feed.state().last_error, Some(error));
    assert!(repo.pending_operations().await.is_empty());
}

#[tokio::test]
async fn stale_page_from_previous_session_is_served_without_remote_call() {
    let store = Arc::new(InMemoryKeyValueStore::new());
    let cached_posts: Vec<_> = (1..=20).map(sample_post).collect();
    let mut previous = CacheStore::new(100, Duration::from_secs(3600));
    previous.put_page_at(
        PageRequest::new(1, 20).unwrap(),
        cached_posts.clone(),
        Utc::now() - ChronoDuration::hours(2),
    );
    store
        .put(
            CACHE_SNAPSHOT_KEY,
            serde_json::to_string(&previous.snapshot()).unwrap(),
        )
        .await
        .unwrap();

    let app = TestApp::start_with(
        FakeRemotePostApi::with_posts(50),
        true,
        test_config(),
        store,
    )
    .await;
    let fetched = app
        .state
        .post_repository
        .get_posts(1, 20, false)
        .await
        .unwrap();

    assert_eq!(fetched.data, cached_posts);
    assert_eq!(fetched.source, DataSource::Cache { stale: true });
    assert_eq!(app.remote.count(&app.remote.calls.list), 0);
}

#[tokio::test]
async fn forced_refresh_falls_back_to_cached_page_on_network_error() {
    let app = TestApp::start(FakeRemotePostApi::with_posts(30), true).await;
    let repo = &app.state.post_repository;

    let first = repo.get_posts(1, 20, false).await.unwrap();
    assert_eq!(first.source, DataSource::Remote);

    app.remote.set_offline(true);
    let fallback = repo.get_posts(1, 20, true).await.unwrap();

    assert_eq!(fallback.data, first.data);
    assert_eq!(
        fallback.source,
        DataSource::CacheFallback {
            stale: false,
            reason: "network".to_string()
        }
    );

    // キャッシュの無いページはエラーになる
    let err = repo.get_posts(2, 20, true).await.unwrap_err();
    assert!(matches!(err, AppError::Network(_)));
}

#[tokio::test]
async fn favorites_survive_cache_clear() {
    let app = TestApp::start(FakeRemotePostApi::with_posts(10), true).await;
    let repo = &app.state.post_repository;

    repo.get_post(PostId::Confirmed(5), false).await.unwrap();
    repo.toggle_favorite(PostId::Confirmed(5), true).await.unwrap();
    repo.clear_cache().await.unwrap();
    app.remote.set_offline(true);

    let favorites = repo.get_favorites(1, 20).await.unwrap();
    assert_eq!(favorites.len(), 1);
    assert_eq!(favorites[0].id, PostId::Confirmed(5));
    assert!(favorites[0].is_favorite);
    assert_eq!(favorites[0].title, "title 5");
    assert_eq!(repo.cache_status().await.total_items, 0);
}

#[tokio::test]
async fn eviction_keeps_favorite_and_drops_oldest_others() {
    let mut config = test_config();
    config.cache.max_entries = 3;
    let app = TestApp::start_with(
        FakeRemotePostApi::with_posts(10),
        true,
        config,
        Arc::new(InMemoryKeyValueStore::new()),
    )
    .await;
    let repo = &app.state.post_repository;

    repo.get_post(PostId::Confirmed(1), false).await.unwrap();
    repo.toggle_favorite(PostId::Confirmed(1), true).await.unwrap();
    for id in 2..=5 {
        repo.get_post(PostId::Confirmed(id), false).await.unwrap();
    }

    assert_eq!(repo.cache_status().await.total_items, 3);
    let gets_before = app.remote.count(&app.remote.calls.get);

    for id in [1, 4, 5] {
        let fetched = repo.get_post(PostId::Confirmed(id), false).await.unwrap();
        assert!(fetched.source.is_from_cache(), "post {id} should be cached");
    }
    assert_eq!(app.remote.count(&app.remote.calls.get), gets_before);

    let evicted = repo.get_post(PostId::Confirmed(2), false).await.unwrap();
    assert_eq!(evicted.source, DataSource::Remote);
}
