use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mini_feed_lib::application::services::SyncOutcome;
use mini_feed_lib::domain::entities::{DataSource, SyncReport};
use mini_feed_lib::infrastructure::cache::CacheStatus;
use mini_feed_lib::{AppConfig, AppState, PostRepository, PostSyncEvent};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone)]
struct ProbeConfig {
    page_limit: u32,
    create_title: Option<String>,
    create_body: String,
    author_id: i64,
    settle_ms: u64,
    summary_path: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct ProbeSummary {
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    connectivity: String,
    first_page_count: usize,
    first_page_source: String,
    created: Option<String>,
    events: Vec<String>,
    sync: Option<SyncReport>,
    cache: CacheStatus,
    pending_operations: usize,
    last_error: Option<String>,
}

fn parse_optional_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_u64(key: &str, default_value: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default_value)
}

fn build_config() -> ProbeConfig {
    // 引数 1 つ目が投稿タイトル、2 つ目が本文
    let mut args = std::env::args().skip(1);
    let create_title = args
        .next()
        .or_else(|| parse_optional_string("MINI_FEED_PROBE_TITLE"));
    let create_body = args
        .next()
        .or_else(|| parse_optional_string("MINI_FEED_PROBE_BODY"))
        .unwrap_or_else(|| "Posted by feed_sync_probe".to_string());

    ProbeConfig {
        page_limit: parse_u64("MINI_FEED_PROBE_LIMIT", 20).clamp(1, 100) as u32,
        create_title,
        create_body,
        author_id: parse_u64("MINI_FEED_PROBE_AUTHOR_ID", 1).max(1) as i64,
        settle_ms: parse_u64("MINI_FEED_PROBE_SETTLE_MS", 3_000),
        summary_path: parse_optional_string("MINI_FEED_PROBE_SUMMARY_PATH").map(PathBuf::from),
    }
}

fn describe_source(source: &DataSource) -> String {
    match source {
        DataSource::Remote => "remote".to_string(),
        DataSource::Cache { stale } => format!("cache(stale={stale})"),
        DataSource::CacheFallback { stale, reason } => {
            format!("cache_fallback(stale={stale}, reason={reason})")
        }
    }
}

fn describe_event(event: &PostSyncEvent) -> String {
    match event {
        PostSyncEvent::Created(post) => format!("created {}", post.id),
        PostSyncEvent::Confirmed { local_id, post } => format!("confirmed {local_id} -> {}", post.id),
        PostSyncEvent::RolledBack { local_id, error } => {
            format!("rolled_back {local_id}: {error}")
        }
        PostSyncEvent::Deferred {
            local_id,
            retry_count,
        } => format!("deferred {local_id} (retry {retry_count})"),
        PostSyncEvent::FavoriteChanged { id, is_favorite } => {
            format!("favorite {id} = {is_favorite}")
        }
    }
}

async fn write_summary(path: &PathBuf, summary: &ProbeSummary) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(path, serde_json::to_vec_pretty(summary)?).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    mini_feed_lib::init_logging();
    let cfg = build_config();
    let started_at = Utc::now();

    let app_config = AppConfig::from_env();
    info!(
        base_url = %app_config.api.base_url,
        backend = ?app_config.storage.backend,
        "Starting feed sync probe"
    );
    let state = AppState::new(app_config).await?;
    let mut events = state.post_repository.subscribe();
    let mut last_error = None;

    let (first_page_count, first_page_source) = match state
        .feed
        .load_page(&state.post_repository, 1, cfg.page_limit, false)
        .await
    {
        Ok(()) => {
            let feed = state.feed.state();
            let source = match &feed.status {
                mini_feed_lib::application::services::FeedStatus::Loaded { source } => {
                    describe_source(source)
                }
                other => format!("{other:?}"),
            };
            (feed.posts.len(), source)
        }
        Err(err) => {
            warn!(error = %err, "Failed to load first page");
            last_error = Some(err.to_string());
            (0, "error".to_string())
        }
    };

    let mut created = None;
    if let Some(title) = cfg.create_title.clone() {
        match state
            .post_repository
            .create_post(title, cfg.create_body.clone(), cfg.author_id)
            .await
        {
            Ok(post) => created = Some(post.id.to_string()),
            Err(err) => {
                warn!(error = %err, "Create rejected");
                last_error = Some(err.to_string());
            }
        }
        tokio::time::sleep(Duration::from_millis(cfg.settle_ms)).await;
    }

    let sync = match state.sync_service.sync_now().await {
        Ok(SyncOutcome::Completed(report)) => Some(report),
        Ok(SyncOutcome::Coalesced) => None,
        Err(err) => {
            warn!(error = %err, "Sync cycle failed");
            last_error = Some(err.to_string());
            None
        }
    };

    let mut observed = Vec::new();
    while let Ok(event) = events.try_recv() {
        observed.push(describe_event(&event));
    }

    let summary = ProbeSummary {
        started_at,
        finished_at: Utc::now(),
        connectivity: state.connectivity.current().to_string(),
        first_page_count,
        first_page_source,
        created,
        events: observed,
        sync,
        cache: state.post_repository.cache_status().await,
        pending_operations: state.post_repository.pending_operations().await.len(),
        last_error,
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);
    if let Some(path) = &cfg.summary_path {
        write_summary(path, &summary).await?;
    }

    state.shutdown();
    Ok(())
}
