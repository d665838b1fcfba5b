use std::collections::HashMap;

use chrono::Utc;
use log::{error, info, warn};

use crate::adapters::{ArrClient, JellyfinClient, RequestManagerClient, StatsClient};
use crate::config::Config;
use crate::domain::MediaItem;
use crate::notify::Notifier;
use crate::store::{CleanupRunStatus, CleanupStep, DeleteReason, Media, MediaState, MediaStore};

use super::decider::{should_delete_now, Candidate};
use super::{disk_usage, filters, inventory, tags};

pub struct CleanupOutcome {
    pub run_id: uuid::Uuid,
    pub marked: usize,
    pub deleted: usize,
    pub rescinded: usize,
}

/// Orchestrates a full cleanup run (§4.1/§4.2/§4.3/§4.4/§4.5/§4.10): expiry
/// sweep, inventory, filter chain, tag marking, recently-played rescind,
/// deletion decider, notifications. Runs entirely under the scheduler's
/// singleton flag — see `crate::scheduler`.
#[allow(clippy::too_many_arguments)]
pub async fn run(
    config: &Config,
    jellyfin: &JellyfinClient,
    sonarr: &dyn ArrClient,
    radarr: &dyn ArrClient,
    stats: &StatsClient,
    request_manager: &RequestManagerClient,
    store: &dyn MediaStore,
    notifier: &Notifier,
    dry_run: bool,
) -> anyhow::Result<CleanupOutcome> {
    let run_id = store.create_cleanup_run().await?;
    info!("cleanup run {run_id} starting (dry_run={dry_run})");

    let result = run_inner(config, jellyfin, sonarr, radarr, stats, request_manager, store, notifier, dry_run, run_id).await;

    match &result {
        Ok(outcome) => {
            store.finish_cleanup_run(run_id, CleanupRunStatus::Completed).await?;
            info!(
                "cleanup run {run_id} completed: marked={} deleted={} rescinded={}",
                outcome.marked, outcome.deleted, outcome.rescinded
            );
        }
        Err(e) => {
            error!("cleanup run {run_id} failed: {e:#}");
            store.finish_cleanup_run(run_id, CleanupRunStatus::Failed).await?;
        }
    }

    result
}

#[allow(clippy::too_many_arguments)]
async fn run_inner(
    config: &Config,
    jellyfin: &JellyfinClient,
    sonarr: &dyn ArrClient,
    radarr: &dyn ArrClient,
    stats: &StatsClient,
    request_manager: &RequestManagerClient,
    store: &dyn MediaStore,
    notifier: &Notifier,
    dry_run: bool,
    run_id: uuid::Uuid,
) -> anyhow::Result<CleanupOutcome> {
    let now = Utc::now();
    let today = now.date_naive();

    let inventory::Inventory { by_library: inventory, library_folders } =
        inventory::fetch_inventory(jellyfin, sonarr, radarr, config).await?;
    append_step(store, run_id, "inventory", inventory.values().map(Vec::len).sum::<usize>() as i64).await;

    expiry_sweep_pass(&inventory, sonarr, radarr, today).await;

    let mut rescinded = 0usize;
    rescinded += recently_played_pass(&inventory, config, stats, sonarr, radarr, now).await;

    let mut marked = 0usize;
    let mut per_library_marked: Vec<(String, usize)> = Vec::new();
    let mut by_requester: HashMap<String, Vec<Media>> = HashMap::new();

    for (library_name, items) in &inventory {
        let Some(library_cfg) = config.library(library_name) else {
            continue;
        };
        if !library_cfg.enabled {
            continue;
        }

        let eligible = filter_chain(items.clone(), config, store, stats, request_manager, now, now).await?;
        per_library_marked.push((library_name.clone(), eligible.len()));
        marked += eligible.len();

        for item in &eligible {
            let client = match item.media_ref {
                crate::domain::MediaRef::Series(_) => sonarr,
                crate::domain::MediaRef::Movie(_) => radarr,
            };
            let generated = tags::generate_deletion_tags(library_cfg, today);

            if dry_run {
                info!("[dry-run] would mark {} with {} tag(s)", item.title, generated.len());
            } else if let Err(e) = tags::apply_tags(client, item.media_ref.id() as u64, &item.tag_ids, &generated).await {
                warn!("failed to mark {}: {e:#}", item.title);
                continue;
            }

            let media = Media {
                id: uuid::Uuid::new_v4(),
                media_ref: item.media_ref,
                jellyfin_id: item.jellyfin_id.clone(),
                library: library_name.clone(),
                title: item.title.clone(),
                year: item.year,
                tmdb_id: item.tmdb_id.clone(),
                tvdb_id: item.tvdb_id.clone(),
                poster_url: item.poster_url.clone(),
                size_on_disk: item.size_on_disk as i64,
                default_delete_at: now + chrono::Duration::days(i64::from(library_cfg.cleanup_delay_days.max(1))),
                protected_until: None,
                requested_by: item.requested_by.clone(),
                state: MediaState::Pending,
                delete_reason: None,
                created_at: now,
                deleted_at: None,
            };
            if !dry_run {
                if let Err(e) = store.create_media_items(std::slice::from_ref(&media)).await {
                    warn!("persistence write failed for {}: {e:#} (continuing)", item.title);
                }
            }
            if let Some(requester) = &item.requested_by {
                by_requester.entry(requester.clone()).or_default().push(media);
            }
        }
    }
    append_step(store, run_id, "marked", marked as i64).await;

    notifier
        .notify_marked_for_cleanup(&by_requester, marked, &per_library_marked, &config.server_url, dry_run)
        .await;

    let deleted = deletion_pass(&inventory, &library_folders, config, sonarr, radarr, store, dry_run).await?;
    append_step(store, run_id, "deleted", deleted.len() as i64).await;
    notifier.notify_deletions_complete(&deleted).await;

    Ok(CleanupOutcome {
        run_id,
        marked,
        deleted: deleted.len(),
        rescinded,
    })
}

async fn filter_chain(
    items: Vec<MediaItem>,
    config: &Config,
    store: &dyn MediaStore,
    stats: &StatsClient,
    request_manager: &RequestManagerClient,
    today: chrono::DateTime<Utc>,
    now: chrono::DateTime<Utc>,
) -> anyhow::Result<Vec<MediaItem>> {
    let items = filters::already_marked(items, store).await?;
    let items = filters::already_meets_keep_criteria(items, config);
    let items = filters::tag_exclusion(items, config, today);
    let items = filters::content_age(items, config, store, now).await?;
    let items = filters::content_size(items, config);
    let items = filters::last_stream(items, config, stats, now).await;
    filters::populate_requester(items, request_manager).await
}

async fn expiry_sweep_pass(
    inventory: &HashMap<String, Vec<MediaItem>>,
    sonarr: &dyn ArrClient,
    radarr: &dyn ArrClient,
    today: chrono::NaiveDate,
) {
    for items in inventory.values() {
        for item in items {
            let client = match item.media_ref {
                crate::domain::MediaRef::Series(_) => sonarr,
                crate::domain::MediaRef::Movie(_) => radarr,
            };
            if let Err(e) = tags::expiry_sweep(client, item.media_ref.id() as u64, &item.tags, today).await {
                warn!("expiry sweep failed for {}: {e:#}", item.title);
            }
        }
    }
}

async fn recently_played_pass(
    inventory: &HashMap<String, Vec<MediaItem>>,
    config: &Config,
    stats: &StatsClient,
    sonarr: &dyn ArrClient,
    radarr: &dyn ArrClient,
    now: chrono::DateTime<Utc>,
) -> usize {
    let mut rescinded = 0;
    for (library_name, items) in inventory {
        let Some(library_cfg) = config.library(library_name) else { continue };
        for item in items {
            if !item.tags.iter().any(|l| tags::is_jellysweep_label(l)) {
                continue;
            }
            let Ok(last_played) = stats.last_played(item.tmdb_id.as_deref(), item.tvdb_id.as_deref()).await else {
                continue;
            };
            let client = match item.media_ref {
                crate::domain::MediaRef::Series(_) => sonarr,
                crate::domain::MediaRef::Movie(_) => radarr,
            };
            match tags::recently_played_sweep(
                client,
                item.media_ref.id() as u64,
                &item.tags,
                last_played,
                now,
                library_cfg.last_stream_threshold_days,
            )
            .await
            {
                Ok(true) => rescinded += 1,
                Ok(false) => {}
                Err(e) => warn!("recently-played sweep failed for {}: {e:#}", item.title),
            }
        }
    }
    rescinded
}

async fn deletion_pass(
    inventory: &HashMap<String, Vec<MediaItem>>,
    library_folders: &HashMap<String, Vec<String>>,
    config: &Config,
    sonarr: &dyn ArrClient,
    radarr: &dyn ArrClient,
    store: &dyn MediaStore,
    dry_run: bool,
) -> anyhow::Result<Vec<String>> {
    let mut deleted_titles = Vec::new();
    let empty_paths: Vec<String> = Vec::new();

    for (library_name, items) in inventory {
        let Some(library_cfg) = config.library(library_name) else { continue };
        let folder_paths = library_folders.get(library_name).unwrap_or(&empty_paths);
        let usage_percent = disk_usage::sample_usage_percent(folder_paths);

        for item in items {
            let item_tags: Vec<_> = item.jellysweep_tags().collect();
            if item_tags.is_empty() {
                continue;
            }
            let candidate = Candidate { tags: item_tags, library: library_cfg };
            if !should_delete_now(&candidate, usage_percent, Utc::now()) {
                continue;
            }

            if dry_run {
                info!("[dry-run] would delete {} ({})", item.title, library_name);
                deleted_titles.push(item.title.clone());
                continue;
            }

            let client = match item.media_ref {
                crate::domain::MediaRef::Series(_) => sonarr,
                crate::domain::MediaRef::Movie(_) => radarr,
            };
            if let Err(e) = client.delete(item.media_ref.id() as u64).await {
                warn!("failed to delete {}: {e:#}", item.title);
                continue;
            }
            if let Err(e) = store.delete_media_item(item.media_ref, DeleteReason::Auto).await {
                warn!("persistence delete-mark failed for {}: {e:#} (continuing)", item.title);
            }
            deleted_titles.push(item.title.clone());
        }
    }

    Ok(deleted_titles)
}

async fn append_step(store: &dyn MediaStore, run_id: uuid::Uuid, step: &str, count: i64) {
    let _ = store
        .append_cleanup_step(CleanupStep { run_id, step: step.to_string(), count, detail: None })
        .await;
}
