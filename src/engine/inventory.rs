use std::collections::HashMap;

use futures::future::try_join_all;
use log::warn;

use crate::adapters::{ArrClient, ArrItem, JellyfinClient, ItemsFilter};
use crate::config::Config;
use crate::domain::{MediaItem, MediaRef};

/// Fetches media-server items and joins them against both arrs' catalogs
/// into a library-keyed inventory (§4.2). Aborts on any adapter error —
/// partial inventory would let the filter chain mark the wrong things.
pub struct Inventory {
    pub by_library: HashMap<String, Vec<MediaItem>>,
    /// Filesystem paths backing each library, used by the deletion decider's
    /// disk-usage sampling.
    pub library_folders: HashMap<String, Vec<String>>,
}

pub async fn fetch_inventory(
    jellyfin: &JellyfinClient,
    sonarr: &dyn ArrClient,
    radarr: &dyn ArrClient,
    config: &Config,
) -> anyhow::Result<Inventory> {
    let (sonarr_items, radarr_items, sonarr_tags, radarr_tags, libraries) = futures::try_join!(
        sonarr.items(),
        radarr.items(),
        sonarr.tags(),
        radarr.tags(),
        jellyfin.library_folders(),
    )?;

    let sonarr_tag_labels: HashMap<u64, String> =
        sonarr_tags.into_iter().map(|t| (t.id, t.label)).collect();
    let radarr_tag_labels: HashMap<u64, String> =
        radarr_tags.into_iter().map(|t| (t.id, t.label)).collect();

    let sonarr_by_tvdb: HashMap<&str, &ArrItem> = sonarr_items
        .iter()
        .filter_map(|s| s.tvdb_id.as_deref().map(|id| (id, s)))
        .collect();
    let radarr_by_tmdb: HashMap<&str, &ArrItem> = radarr_items
        .iter()
        .filter_map(|m| m.tmdb_id.as_deref().map(|id| (id, m)))
        .collect();

    let mut by_library: HashMap<String, Vec<MediaItem>> = HashMap::new();
    let mut library_folders: HashMap<String, Vec<String>> = HashMap::new();

    for folder in &libraries {
        library_folders.insert(folder.name.clone(), folder.locations.clone());
        let Some(library_cfg) = config.library(&folder.name) else {
            continue;
        };
        if !library_cfg.enabled {
            continue;
        }

        let items = jellyfin
            .items(
                ItemsFilter::all()
                    .parent_id(&folder.item_id)
                    .include_item_types(&["Movie", "Series"]),
            )
            .await?;

        let mut matched = Vec::new();
        for item in items {
            // Gate on the media-server's own item type first so a series
            // carrying a TMDB id that happens to collide with a Radarr movie
            // can never be captured by the movie branch.
            if item.is_series() {
                if let Some(arr_item) = item.tvdb_id().and_then(|id| sonarr_by_tvdb.get(id)) {
                    matched.push((MediaRef::Series(arr_item.id as i32), item, (*arr_item).clone(), &sonarr_tag_labels));
                    continue;
                }
            } else if item.is_movie() {
                if let Some(arr_item) = item.tmdb_id().and_then(|id| radarr_by_tmdb.get(id)) {
                    matched.push((MediaRef::Movie(arr_item.id as i32), item, (*arr_item).clone(), &radarr_tag_labels));
                    continue;
                }
            }
            warn!("jellyfin item \"{}\" has no matching arr entry, skipping", item.name);
        }

        let resolved = try_join_all(matched.into_iter().map(|(media_ref, jellyfin_item, arr_item, labels)| {
            let arr_client: &dyn ArrClient = match media_ref {
                MediaRef::Movie(_) => radarr,
                MediaRef::Series(_) => sonarr,
            };
            async move {
                let first_imported_at = arr_client.first_imported_at(arr_item.id).await.unwrap_or(None);
                let tags = arr_item
                    .tag_ids
                    .iter()
                    .filter_map(|id| labels.get(id).cloned())
                    .collect();

                anyhow::Ok(MediaItem {
                    media_ref,
                    jellyfin_id: jellyfin_item.id,
                    library: folder.name.clone(),
                    title: jellyfin_item.name,
                    year: arr_item.year,
                    tmdb_id: arr_item.tmdb_id,
                    tvdb_id: arr_item.tvdb_id,
                    tags,
                    tag_ids: arr_item.tag_ids.clone(),
                    size_on_disk: arr_item.size_on_disk,
                    poster_url: None,
                    first_imported_at,
                    requested_by: None,
                    requested_at: None,
                    episodes_with_files: arr_item.episodes_with_files,
                    seasons_with_files: arr_item.seasons_with_files,
                })
            }
        }))
        .await?;

        by_library.insert(folder.name.clone(), resolved);
    }

    Ok(Inventory { by_library, library_folders })
}
