use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use log::debug;

use crate::adapters::{RequestManagerClient, StatsClient};
use crate::config::{CleanupMode, Config};
use crate::domain::{MediaItem, MediaRef, TagKind};
use crate::error::EngineError;
use crate::store::MediaStore;

/// Stage 1: drop items the store already has an opinion on (pending,
/// protected or unkeepable). This is the idempotence gate — rerunning the
/// pipeline on unchanged inventory produces zero further arr mutations.
pub async fn already_marked(items: Vec<MediaItem>, store: &dyn MediaStore) -> anyhow::Result<Vec<MediaItem>> {
    let mut kept = Vec::with_capacity(items.len());
    for item in items {
        match store.get_media_item_by_ref(item.media_ref).await? {
            Some(_) => debug!("{} already tracked in store, skipping", item.title),
            None => kept.push(item),
        }
    }
    Ok(kept)
}

/// Stage 2 (series only): under `keep_episodes`/`keep_seasons` modes, a
/// series that already has fewer files than the configured count is left
/// alone.
pub fn already_meets_keep_criteria(items: Vec<MediaItem>, config: &Config) -> Vec<MediaItem> {
    items
        .into_iter()
        .filter(|item| {
            let MediaRef::Series(_) = item.media_ref else {
                return true;
            };
            let Some(library) = config.library(&item.library) else {
                return true;
            };
            let count = match library.cleanup_mode {
                CleanupMode::All => return true,
                CleanupMode::KeepEpisodes => item.episodes_with_files,
                CleanupMode::KeepSeasons => item.seasons_with_files,
            };
            if count <= library.keep_count {
                debug!("{} already meets keep criteria ({count} <= {})", item.title, library.keep_count);
                false
            } else {
                true
            }
        })
        .collect()
}

/// Stage 3: drop items the engine already has an opinion about — protected
/// by `jellysweep-ignore`, a library-configured exclude tag, an unexpired
/// `jellysweep-must-keep-*`, `jellysweep-must-delete-for-sure`, or any live
/// `jellysweep-delete*` tag.
pub fn tag_exclusion(items: Vec<MediaItem>, config: &Config, today: DateTime<Utc>) -> Vec<MediaItem> {
    let today = today.date_naive();
    items
        .into_iter()
        .filter(|item| {
            let library = config.library(&item.library);
            let exclude_tags = library.map(|l| l.exclude_tags.as_slice()).unwrap_or(&[]);

            for raw_tag in &item.tags {
                if exclude_tags.iter().any(|t| t == raw_tag) {
                    return false;
                }
            }

            for tag in item.jellysweep_tags() {
                match tag {
                    TagKind::Ignore => return false,
                    TagKind::MustDeleteForSure => return false,
                    TagKind::MustKeep { date, .. } if date >= today => return false,
                    TagKind::Delete { date } if date >= today => return false,
                    TagKind::DiskUsageDelete { date, .. } if date >= today => return false,
                    _ => {}
                }
            }
            true
        })
        .collect()
}

/// Stage 4: drop items imported too recently. No import history at all is
/// treated as eligible. Also drops items re-added after a prior deletion —
/// the arr's import timestamp reflects the original import, not the re-add,
/// so without this check a re-requested item could look old enough to mark
/// again immediately.
pub async fn content_age(
    items: Vec<MediaItem>,
    config: &Config,
    store: &dyn MediaStore,
    now: DateTime<Utc>,
) -> anyhow::Result<Vec<MediaItem>> {
    let mut kept = Vec::with_capacity(items.len());
    for item in items {
        let Some(library) = config.library(&item.library) else {
            kept.push(item);
            continue;
        };

        let previously_deleted = match &item.media_ref {
            MediaRef::Movie(_) => match item.tmdb_id.as_deref() {
                Some(id) => store.get_deleted_media_by_tmdb_id(id).await?.is_some(),
                None => false,
            },
            MediaRef::Series(_) => match item.tvdb_id.as_deref() {
                Some(id) => store.get_deleted_media_by_tvdb_id(id).await?.is_some(),
                None => false,
            },
        };
        if previously_deleted {
            debug!("{} re-added after a prior deletion, skipping", item.title);
            continue;
        }

        let eligible = match item.first_imported_at {
            None => true,
            Some(imported_at) => {
                let age_days = (now - imported_at).num_days();
                age_days >= i64::from(library.content_age_threshold_days)
            }
        };
        if eligible {
            kept.push(item);
        }
    }
    Ok(kept)
}

/// Stage 5: drop items below the library's configured size floor.
pub fn content_size(items: Vec<MediaItem>, config: &Config) -> Vec<MediaItem> {
    items
        .into_iter()
        .filter(|item| {
            let Some(library) = config.library(&item.library) else {
                return true;
            };
            if library.content_size_threshold_bytes == 0 {
                return true;
            }
            item.size_on_disk >= library.content_size_threshold_bytes
        })
        .collect()
}

/// Stage 6: drop items played within the library's recency threshold. Items
/// the stats backend has never heard of are skipped (not acted on) rather
/// than treated as either recently played or eligible.
pub async fn last_stream(
    items: Vec<MediaItem>,
    config: &Config,
    stats: &StatsClient,
    now: DateTime<Utc>,
) -> Vec<MediaItem> {
    let mut kept = Vec::with_capacity(items.len());
    for item in items {
        let Some(library) = config.library(&item.library) else {
            kept.push(item);
            continue;
        };
        match stats.last_played(item.tmdb_id.as_deref(), item.tvdb_id.as_deref()).await {
            Ok(last_played) => {
                let days_since = (now - last_played).num_days();
                if days_since < i64::from(library.last_stream_threshold_days) {
                    debug!("{} played {days_since}d ago, within threshold", item.title);
                } else {
                    kept.push(item);
                }
            }
            Err(e) if e.downcast_ref::<EngineError>().is_some_and(|e| matches!(e, EngineError::StatsItemNotFound)) => {
                debug!("{} has no stats record, skipping", item.title);
            }
            Err(_) => kept.push(item),
        }
    }
    kept
}

/// Stage 7: attach requester identity, never filters.
pub async fn populate_requester(
    items: Vec<MediaItem>,
    request_manager: &RequestManagerClient,
) -> anyhow::Result<Vec<MediaItem>> {
    try_join_all(items.into_iter().map(|mut item| async move {
        if let Some(tmdb_id) = item.tmdb_id.clone() {
            let media_type = match item.media_ref {
                MediaRef::Movie(_) => "movie",
                MediaRef::Series(_) => "tv",
            };
            if let Some(requester) = request_manager.requester_for(&tmdb_id, media_type).await? {
                item.requested_by = Some(requester.email);
                item.requested_at = Some(requester.requested_at);
            }
        }
        anyhow::Ok(item)
    }))
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn base_item(library: &str) -> MediaItem {
        MediaItem {
            media_ref: MediaRef::Movie(1),
            jellyfin_id: "jf-1".into(),
            library: library.into(),
            title: "Test".into(),
            year: Some(2023),
            tmdb_id: Some("42".into()),
            tvdb_id: None,
            tags: vec![],
            tag_ids: vec![],
            size_on_disk: 1_000_000,
            poster_url: None,
            first_imported_at: None,
            requested_by: None,
            requested_at: None,
            episodes_with_files: 0,
            seasons_with_files: 0,
        }
    }

    fn config_with_library(toml_lib: &str) -> Config {
        let toml_str = format!(
            r#"
session_key = "k"
listen_addr = "0.0.0.0:8080"
api_key = "k"
cleanup_schedule = "0 0 3 * * *"
server_url = "http://localhost"
database_url = "postgres://localhost/db"

{toml_lib}

[jellyfin]
base_url = "http://localhost:8096"
api_key = "k"
username = "admin"
[sonarr]
base_url = "http://localhost:8989"
api_key = "k"
[radarr]
base_url = "http://localhost:7878"
api_key = "k"
[stats]
base_url = "http://localhost:8000"
[request_manager]
base_url = "http://localhost:5055"
api_key = "k"
"#
        );
        Config::parse(&toml_str).unwrap()
    }

    #[tokio::test]
    async fn scenario_age_filter_excludes_recent_import() {
        let config = config_with_library("[libraries.movies]\ncleanup_delay_days = 7\ncontent_age_threshold_days = 30");
        let store = crate::store::InMemoryMediaStore::new();
        let mut item = base_item("movies");
        item.first_imported_at = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let now = Utc.with_ymd_and_hms(2024, 1, 20, 0, 0, 0).unwrap();
        let result = content_age(vec![item], &config, &store, now).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn scenario_age_filter_includes_old_import() {
        let config = config_with_library("[libraries.movies]\ncleanup_delay_days = 7\ncontent_age_threshold_days = 30");
        let store = crate::store::InMemoryMediaStore::new();
        let mut item = base_item("movies");
        item.first_imported_at = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let now = Utc.with_ymd_and_hms(2024, 2, 5, 0, 0, 0).unwrap();
        let result = content_age(vec![item], &config, &store, now).await.unwrap();
        assert_eq!(result.len(), 1);
    }

    #[tokio::test]
    async fn scenario_age_filter_skips_item_re_added_after_prior_deletion() {
        let config = config_with_library("[libraries.movies]\ncleanup_delay_days = 7\ncontent_age_threshold_days = 30");
        let store = crate::store::InMemoryMediaStore::new();
        let mut deleted = base_item("movies");
        deleted.media_ref = MediaRef::Movie(1);
        deleted.tmdb_id = Some("42".into());
        let deleted_media = crate::store::Media {
            id: uuid::Uuid::new_v4(),
            media_ref: deleted.media_ref,
            jellyfin_id: deleted.jellyfin_id.clone(),
            library: deleted.library.clone(),
            title: deleted.title.clone(),
            year: deleted.year,
            tmdb_id: deleted.tmdb_id.clone(),
            tvdb_id: deleted.tvdb_id.clone(),
            poster_url: None,
            size_on_disk: 0,
            default_delete_at: Utc::now(),
            protected_until: None,
            requested_by: None,
            state: crate::store::MediaState::Deleted,
            delete_reason: Some(crate::store::DeleteReason::Auto),
            created_at: Utc::now(),
            deleted_at: Some(Utc::now()),
        };
        store.create_media_items(&[deleted_media]).await.unwrap();

        let mut item = deleted;
        item.first_imported_at = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let now = Utc.with_ymd_and_hms(2024, 2, 5, 0, 0, 0).unwrap();
        let result = content_age(vec![item], &config, &store, now).await.unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn ignore_tag_excludes_item() {
        let config = config_with_library("[libraries.movies]\ncleanup_delay_days = 7");
        let mut item = base_item("movies");
        item.tags = vec!["jellysweep-ignore".into()];
        let today = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let result = tag_exclusion(vec![item], &config, today);
        assert!(result.is_empty());
    }

    #[test]
    fn expired_must_keep_does_not_exclude() {
        let config = config_with_library("[libraries.movies]\ncleanup_delay_days = 7");
        let mut item = base_item("movies");
        item.tags = vec!["jellysweep-must-keep-2024-01-01".into()];
        let today = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let result = tag_exclusion(vec![item], &config, today);
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn keep_episodes_mode_excludes_series_under_threshold() {
        let config = config_with_library(
            "[libraries.shows]\ncleanup_delay_days = 7\ncleanup_mode = \"keep_episodes\"\nkeep_count = 3",
        );
        let mut two_episodes = base_item("shows");
        two_episodes.media_ref = MediaRef::Series(1);
        two_episodes.episodes_with_files = 2;

        let mut four_episodes = base_item("shows");
        four_episodes.media_ref = MediaRef::Series(2);
        four_episodes.episodes_with_files = 4;

        let result = already_meets_keep_criteria(vec![two_episodes, four_episodes], &config);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].media_ref, MediaRef::Series(2));
    }

    #[test]
    fn content_size_drops_items_below_threshold() {
        let config = config_with_library(
            "[libraries.movies]\ncleanup_delay_days = 7\ncontent_size_threshold_bytes = 2000000",
        );
        let mut small = base_item("movies");
        small.size_on_disk = 500_000;
        let mut large = base_item("movies");
        large.media_ref = MediaRef::Movie(2);
        large.size_on_disk = 3_000_000;

        let result = content_size(vec![small, large], &config);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].media_ref, MediaRef::Movie(2));
    }
}
