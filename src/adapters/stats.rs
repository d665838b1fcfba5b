use chrono::{DateTime, Utc};
use reqwest::{Client, ClientBuilder, Url};
use serde::Deserialize;

use crate::config::StatsConfig;
use crate::error::EngineError;

use super::http_ext::ResponseExt;

/// Thin adapter over the streaming-stats backend that reports last-played
/// timestamps per media item.
pub struct StatsClient {
    client: Client,
    base_url: Url,
}

impl StatsClient {
    pub fn new(config: &StatsConfig) -> anyhow::Result<Self> {
        let base_url = Url::parse(&config.base_url)?;
        let mut builder = ClientBuilder::new().timeout(std::time::Duration::from_secs(30));
        if let Some(api_key) = &config.api_key {
            let mut headers = reqwest::header::HeaderMap::new();
            let mut value = reqwest::header::HeaderValue::from_str(api_key)?;
            value.set_sensitive(true);
            headers.insert("x-api-key", value);
            builder = builder.default_headers(headers);
        }
        Ok(Self {
            client: builder.build()?,
            base_url,
        })
    }

    /// Returns the most recent play timestamp for the given TMDB/TVDB id, or
    /// `EngineError::StatsItemNotFound` if the backend has no record of it.
    pub async fn last_played(
        &self,
        tmdb_id: Option<&str>,
        tvdb_id: Option<&str>,
    ) -> anyhow::Result<DateTime<Utc>> {
        let url = self.base_url.join("stats/last-played")?;
        let mut query = Vec::new();
        if let Some(id) = tmdb_id {
            query.push(("tmdbId", id));
        }
        if let Some(id) = tvdb_id {
            query.push(("tvdbId", id));
        }
        let response = self.client.get(url).query(&query).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(EngineError::StatsItemNotFound.into());
        }
        let body: LastPlayedResponse = response.handle_error().await?.json().await?;
        Ok(body.last_played_at)
    }
}

#[derive(Deserialize)]
struct LastPlayedResponse {
    last_played_at: DateTime<Utc>,
}
