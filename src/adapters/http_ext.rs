use anyhow::bail;
use log::debug;
use reqwest::Response;

/// Turns a non-2xx response into an `anyhow::Error` carrying the response
/// body, so every adapter gets a useful message for free.
pub trait ResponseExt {
    async fn handle_error(self) -> anyhow::Result<Response>;
}

impl ResponseExt for Response {
    async fn handle_error(self) -> anyhow::Result<Response> {
        let url = self.url().clone();
        if self.status().is_success() {
            debug!("request to {url} succeeded");
            Ok(self)
        } else {
            let status = self.status();
            let body = self.text().await.unwrap_or_default();
            bail!("request to {url} failed with status {status}: {body}")
        }
    }
}
