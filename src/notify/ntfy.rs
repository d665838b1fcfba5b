use log::warn;
use reqwest::Client;

use crate::config::NtfyConfig;

/// Posts one-shot summary messages to an ntfy topic. ntfy's HTTP API is a
/// single POST of the message body with a couple of headers, so this needs
/// nothing beyond `reqwest`.
pub struct NtfyClient {
    client: Client,
    base_url: String,
    topic: String,
    token: Option<String>,
}

impl NtfyClient {
    pub fn new(config: &NtfyConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            topic: config.topic.clone(),
            token: config.token.clone(),
        }
    }

    pub async fn send(&self, title: &str, body: &str) {
        let url = format!("{}/{}", self.base_url, self.topic);
        let mut request = self.client.post(&url).header("Title", title).body(body.to_string());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        match request.send().await {
            Ok(response) if !response.status().is_success() => {
                warn!("ntfy publish to {url} failed with status {}", response.status());
            }
            Err(e) => warn!("ntfy publish to {url} failed: {e}"),
            _ => {}
        }
    }

    pub async fn send_run_summary(&self, total: usize, per_library: &[(String, usize)]) {
        let mut body = format!("{total} item(s) marked for cleanup this run.\n");
        for (library, count) in per_library {
            body.push_str(&format!("- {library}: {count}\n"));
        }
        self.send("Jellysweep cleanup run", &body).await;
    }

    pub async fn send_deletion_summary(&self, deleted_titles: &[String]) {
        if deleted_titles.is_empty() {
            return;
        }
        let body = deleted_titles.join("\n");
        self.send("Jellysweep deletions complete", &body).await;
    }
}
