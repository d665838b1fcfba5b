use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, ClientBuilder, Url};
use serde::Deserialize;

use crate::config::RequestManagerConfig;

use super::http_ext::ResponseExt;

/// Thin adapter over the request-manager service that records who requested
/// a given TMDB title and when, used to populate `MediaItem::requested_by`.
pub struct RequestManagerClient {
    client: Client,
    base_url: Url,
}

#[derive(Debug, Clone)]
pub struct Requester {
    pub email: String,
    pub requested_at: DateTime<Utc>,
}

impl RequestManagerClient {
    pub fn new(config: &RequestManagerConfig) -> anyhow::Result<Self> {
        let base_url = Url::parse(&config.base_url)?;
        let mut headers = HeaderMap::new();
        let mut value = HeaderValue::from_str(&config.api_key)?;
        value.set_sensitive(true);
        headers.insert("x-api-key", value);
        let client = ClientBuilder::new()
            .timeout(std::time::Duration::from_secs(30))
            .default_headers(headers)
            .build()?;
        Ok(Self { client, base_url })
    }

    pub async fn requester_for(
        &self,
        tmdb_id: &str,
        media_type: &str,
    ) -> anyhow::Result<Option<Requester>> {
        let url = self.base_url.join("api/v1/request")?;
        let response: RequestsResponse = self
            .client
            .get(url)
            .query(&[("tmdbId", tmdb_id), ("mediaType", media_type)])
            .send()
            .await?
            .handle_error()
            .await?
            .json()
            .await?;

        Ok(response
            .results
            .into_iter()
            .min_by_key(|r| r.created_at)
            .map(|r| Requester {
                email: r.requested_by,
                requested_at: r.created_at,
            }))
    }
}

#[derive(Deserialize)]
struct RequestsResponse {
    #[serde(default)]
    results: Vec<RequestRecord>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestRecord {
    requested_by: String,
    created_at: DateTime<Utc>,
}
