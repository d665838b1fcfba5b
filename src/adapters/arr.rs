use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, ClientBuilder, Url};
use serde::{Deserialize, Serialize};

use crate::config::ArrConfig;

use super::http_ext::ResponseExt;

/// A season's file/air status, carried only for series; movies report an
/// empty `seasons` vec.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SeasonStat {
    pub season_number: u32,
    pub monitored: bool,
    pub episode_file_count: u32,
    pub total_episode_count: u32,
    pub next_airing: Option<String>,
}

impl SeasonStat {
    pub fn fully_downloaded(&self) -> bool {
        self.episode_file_count >= self.total_episode_count
    }

    pub fn wont_air(&self) -> bool {
        self.next_airing.is_none()
    }
}

/// A normalized media-manager item: a Radarr movie or a Sonarr series.
#[derive(Debug, Clone)]
pub struct ArrItem {
    pub id: u64,
    pub title: String,
    pub year: Option<i32>,
    pub tmdb_id: Option<String>,
    pub tvdb_id: Option<String>,
    pub tag_ids: Vec<u64>,
    pub size_on_disk: u64,
    pub episodes_with_files: u32,
    pub seasons_with_files: u32,
    pub seasons: Vec<SeasonStat>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ArrTag {
    pub label: String,
    pub id: u64,
}

/// Generalizes the Radarr/Sonarr operations the engine needs over either
/// service, so the engine's filters, tag lifecycle and decider are written
/// once and parameterized by `&dyn ArrClient` rather than duplicated per
/// media type.
#[async_trait]
pub trait ArrClient: Send + Sync {
    async fn items(&self) -> anyhow::Result<Vec<ArrItem>>;
    async fn tags(&self) -> anyhow::Result<Vec<ArrTag>>;
    async fn create_tag(&self, label: &str) -> anyhow::Result<ArrTag>;
    async fn delete_tag(&self, id: u64) -> anyhow::Result<()>;
    async fn set_item_tags(&self, id: u64, tag_ids: &[u64]) -> anyhow::Result<()>;
    async fn delete(&self, id: u64) -> anyhow::Result<()>;
    /// Earliest import event for this item, or `None` if the item has no
    /// recorded import history.
    async fn first_imported_at(&self, id: u64) -> anyhow::Result<Option<DateTime<Utc>>>;
}

pub struct RadarrClient {
    client: Client,
    base_url: Url,
}

impl RadarrClient {
    pub fn new(config: &ArrConfig) -> anyhow::Result<Self> {
        let mut base_url = Url::parse(&config.base_url)?;
        base_url.set_path("/api/v3/");
        let client = ClientBuilder::new()
            .timeout(std::time::Duration::from_secs(30))
            .default_headers(auth_headers(&config.api_key)?)
            .build()?;
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl ArrClient for RadarrClient {
    async fn items(&self) -> anyhow::Result<Vec<ArrItem>> {
        let url = self.base_url.join("movie")?;
        let movies: Vec<RadarrMovie> = self
            .client
            .get(url)
            .send()
            .await?
            .handle_error()
            .await?
            .json()
            .await?;
        Ok(movies.into_iter().map(Into::into).collect())
    }

    async fn tags(&self) -> anyhow::Result<Vec<ArrTag>> {
        fetch_tags(&self.client, &self.base_url).await
    }

    async fn create_tag(&self, label: &str) -> anyhow::Result<ArrTag> {
        create_tag(&self.client, &self.base_url, label).await
    }

    async fn delete_tag(&self, id: u64) -> anyhow::Result<()> {
        delete_tag(&self.client, &self.base_url, id).await
    }

    async fn set_item_tags(&self, id: u64, tag_ids: &[u64]) -> anyhow::Result<()> {
        let url = self.base_url.join("movie/editor")?;
        let body = BulkEditRequest {
            movie_ids: vec![id],
            tags: tag_ids.to_vec(),
            apply_tags: "replace",
        };
        self.client
            .put(url)
            .json(&body)
            .send()
            .await?
            .handle_error()
            .await?;
        Ok(())
    }

    async fn delete(&self, id: u64) -> anyhow::Result<()> {
        let url = self.base_url.join("movie/")?.join(&id.to_string())?;
        self.client
            .delete(url)
            .query(&[("deleteFiles", "true")])
            .send()
            .await?
            .handle_error()
            .await?;
        Ok(())
    }

    async fn first_imported_at(&self, id: u64) -> anyhow::Result<Option<DateTime<Utc>>> {
        first_imported_at(&self.client, &self.base_url, "movieId", id).await
    }
}

pub struct SonarrClient {
    client: Client,
    base_url: Url,
}

impl SonarrClient {
    pub fn new(config: &ArrConfig) -> anyhow::Result<Self> {
        let mut base_url = Url::parse(&config.base_url)?;
        base_url.set_path("/api/v3/");
        let client = ClientBuilder::new()
            .timeout(std::time::Duration::from_secs(30))
            .default_headers(auth_headers(&config.api_key)?)
            .build()?;
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl ArrClient for SonarrClient {
    async fn items(&self) -> anyhow::Result<Vec<ArrItem>> {
        let url = self.base_url.join("series")?;
        let series: Vec<SonarrSeries> = self
            .client
            .get(url)
            .send()
            .await?
            .handle_error()
            .await?
            .json()
            .await?;
        Ok(series.into_iter().map(Into::into).collect())
    }

    async fn tags(&self) -> anyhow::Result<Vec<ArrTag>> {
        fetch_tags(&self.client, &self.base_url).await
    }

    async fn create_tag(&self, label: &str) -> anyhow::Result<ArrTag> {
        create_tag(&self.client, &self.base_url, label).await
    }

    async fn delete_tag(&self, id: u64) -> anyhow::Result<()> {
        delete_tag(&self.client, &self.base_url, id).await
    }

    async fn set_item_tags(&self, id: u64, tag_ids: &[u64]) -> anyhow::Result<()> {
        let url = self.base_url.join("series/editor")?;
        let body = BulkEditRequest {
            movie_ids: vec![id],
            tags: tag_ids.to_vec(),
            apply_tags: "replace",
        };
        self.client
            .put(url)
            .json(&body)
            .send()
            .await?
            .handle_error()
            .await?;
        Ok(())
    }

    async fn delete(&self, id: u64) -> anyhow::Result<()> {
        let url = self.base_url.join("series/")?.join(&id.to_string())?;
        self.client
            .delete(url)
            .query(&[("deleteFiles", "true")])
            .send()
            .await?
            .handle_error()
            .await?;
        Ok(())
    }

    async fn first_imported_at(&self, id: u64) -> anyhow::Result<Option<DateTime<Utc>>> {
        first_imported_at(&self.client, &self.base_url, "seriesId", id).await
    }
}

fn auth_headers(api_key: &str) -> Result<HeaderMap, anyhow::Error> {
    let mut headers = HeaderMap::new();
    let mut header_value = HeaderValue::from_str(api_key)?;
    header_value.set_sensitive(true);
    headers.insert("x-api-key", header_value);
    Ok(headers)
}

async fn fetch_tags(client: &Client, base_url: &Url) -> anyhow::Result<Vec<ArrTag>> {
    let url = base_url.join("tag")?;
    let tags = client
        .get(url)
        .send()
        .await?
        .handle_error()
        .await?
        .json()
        .await?;
    Ok(tags)
}

async fn create_tag(client: &Client, base_url: &Url, label: &str) -> anyhow::Result<ArrTag> {
    let url = base_url.join("tag")?;
    let tag = client
        .post(url)
        .json(&serde_json::json!({ "label": label }))
        .send()
        .await?
        .handle_error()
        .await?
        .json()
        .await?;
    Ok(tag)
}

async fn delete_tag(client: &Client, base_url: &Url, id: u64) -> anyhow::Result<()> {
    let url = base_url.join("tag/")?.join(&id.to_string())?;
    client.delete(url).send().await?.handle_error().await?;
    Ok(())
}

/// Streams history a page at a time (rather than buffering every page) and
/// returns the earliest `downloadFolderImported`/`episodeFileImported`
/// timestamp for the given item id.
async fn first_imported_at(
    client: &Client,
    base_url: &Url,
    id_query_key: &str,
    id: u64,
) -> anyhow::Result<Option<DateTime<Utc>>> {
    let url = base_url.join("history")?;
    let mut earliest: Option<DateTime<Utc>> = None;
    let mut page = 1;
    loop {
        let history: HistoryPage = client
            .get(url.clone())
            .query(&[(id_query_key, id.to_string().as_str())])
            .query(&[("pageSize", "100"), ("page", &page.to_string())])
            .send()
            .await?
            .handle_error()
            .await?
            .json()
            .await?;

        if history.records.is_empty() {
            break;
        }
        for record in &history.records {
            if record.event_type == "downloadFolderImported" || record.event_type == "episodeFileImported" {
                earliest = Some(match earliest {
                    Some(e) if e < record.date => e,
                    _ => record.date,
                });
            }
        }
        page += 1;
    }
    Ok(earliest)
}

#[derive(Serialize)]
struct BulkEditRequest {
    #[serde(rename = "movieIds")]
    movie_ids: Vec<u64>,
    tags: Vec<u64>,
    #[serde(rename = "applyTags")]
    apply_tags: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryPage {
    records: Vec<HistoryRecord>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryRecord {
    date: DateTime<Utc>,
    event_type: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RadarrMovie {
    id: u64,
    title: String,
    year: Option<i32>,
    tmdb_id: Option<u64>,
    has_file: bool,
    size_on_disk: Option<u64>,
    #[serde(default)]
    tags: Vec<u64>,
}

impl From<RadarrMovie> for ArrItem {
    fn from(m: RadarrMovie) -> Self {
        ArrItem {
            id: m.id,
            title: m.title,
            year: m.year,
            tmdb_id: m.tmdb_id.map(|id| id.to_string()),
            tvdb_id: None,
            tag_ids: m.tags,
            size_on_disk: m.size_on_disk.unwrap_or_default(),
            episodes_with_files: u32::from(m.has_file),
            seasons_with_files: 0,
            seasons: Vec::new(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SonarrSeries {
    id: u64,
    title: String,
    year: Option<i32>,
    tvdb_id: Option<u64>,
    #[serde(default)]
    tags: Vec<u64>,
    statistics: SonarrSeriesStatistics,
    #[serde(default)]
    seasons: Vec<SonarrSeason>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SonarrSeriesStatistics {
    size_on_disk: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SonarrSeason {
    season_number: u32,
    monitored: bool,
    statistics: SonarrSeasonStatistics,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SonarrSeasonStatistics {
    #[serde(default)]
    episode_file_count: u32,
    #[serde(default)]
    total_episode_count: u32,
    next_airing: Option<String>,
}

impl From<SonarrSeries> for ArrItem {
    fn from(s: SonarrSeries) -> Self {
        let seasons: Vec<SeasonStat> = s
            .seasons
            .iter()
            .filter(|season| season.season_number != 0)
            .map(|season| SeasonStat {
                season_number: season.season_number,
                monitored: season.monitored,
                episode_file_count: season.statistics.episode_file_count,
                total_episode_count: season.statistics.total_episode_count,
                next_airing: season.statistics.next_airing.clone(),
            })
            .collect();
        let seasons_with_files = seasons.iter().filter(|s| s.episode_file_count > 0).count() as u32;
        let episodes_with_files = seasons.iter().map(|s| s.episode_file_count).sum();

        ArrItem {
            id: s.id,
            title: s.title,
            year: s.year,
            tmdb_id: None,
            tvdb_id: s.tvdb_id.map(|id| id.to_string()),
            tag_ids: s.tags,
            size_on_disk: s.statistics.size_on_disk,
            episodes_with_files,
            seasons_with_files,
            seasons,
        }
    }
}

/// Maps a set of configured "keep" tag labels to their numeric ids in the
/// arr's tag table (tags that don't exist yet are simply absent).
pub async fn forbidden_tag_ids(
    client: &dyn ArrClient,
    labels: &[String],
) -> anyhow::Result<HashSet<u64>> {
    let tags = client.tags().await?;
    Ok(tags
        .into_iter()
        .filter(|t| labels.contains(&t.label))
        .map(|t| t.id)
        .collect())
}
