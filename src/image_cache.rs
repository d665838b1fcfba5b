use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use log::{debug, info, warn};
use reqwest::Client;
use sha2::{Digest, Sha256};
use tokio::fs;

const PURGE_AFTER: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Fetch-through on-disk proxy for external poster URLs (§4.8). Files are
/// sharded by the first two hex characters of their URL hash to keep any
/// single directory from growing unbounded.
pub struct ImageCache {
    root: PathBuf,
    client: Client,
}

impl ImageCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            client: Client::new(),
        }
    }

    fn path_for(&self, url: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        let hash = hex::encode(hasher.finalize());
        let (shard, rest) = hash.split_at(2);
        self.root.join(shard).join(rest)
    }

    /// Returns the bytes for `url`, fetching and persisting them on first
    /// request. Subsequent calls read straight from disk.
    pub async fn fetch(&self, url: &str) -> anyhow::Result<Vec<u8>> {
        let path = self.path_for(url);
        if let Ok(bytes) = fs::read(&path).await {
            debug!("image cache hit for {url}");
            return Ok(bytes);
        }

        debug!("image cache miss for {url}, fetching");
        let bytes = self
            .client
            .get(url)
            .timeout(Duration::from_secs(30))
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?
            .to_vec();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, &bytes).await?;
        fs::rename(&tmp_path, &path).await?;

        Ok(bytes)
    }

    /// Deletes cached files older than 7 days. Run weekly by the
    /// `clear_image_cache` scheduler job.
    pub async fn purge_stale(&self) -> anyhow::Result<()> {
        let cutoff = Utc::now() - chrono::Duration::from_std(PURGE_AFTER).unwrap();
        let mut purged = 0u64;

        let mut shards = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        while let Some(shard) = shards.next_entry().await? {
            if !shard.file_type().await?.is_dir() {
                continue;
            }
            purged += purge_dir(&shard.path(), cutoff).await?;
        }

        info!("image cache purge removed {purged} file(s)");
        Ok(())
    }
}

async fn purge_dir(dir: &Path, cutoff: chrono::DateTime<Utc>) -> anyhow::Result<u64> {
    let mut entries = fs::read_dir(dir).await?;
    let mut purged = 0u64;
    while let Some(entry) = entries.next_entry().await? {
        let metadata = match entry.metadata().await {
            Ok(m) => m,
            Err(e) => {
                warn!("failed to stat {:?}: {e}", entry.path());
                continue;
            }
        };
        let modified: chrono::DateTime<Utc> = match metadata.modified() {
            Ok(m) => m.into(),
            Err(_) => continue,
        };
        if modified < cutoff {
            fs::remove_file(entry.path()).await?;
            purged += 1;
        }
    }
    Ok(purged)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shards_by_first_two_hex_chars() {
        let cache = ImageCache::new("/tmp/doesnt-matter");
        let path = cache.path_for("https://example.com/poster.jpg");
        let mut components = path.strip_prefix("/tmp/doesnt-matter").unwrap().components();
        let shard = components.next().unwrap().as_os_str().to_str().unwrap();
        assert_eq!(shard.len(), 2);
    }

    #[test]
    fn same_url_hashes_to_same_path() {
        let cache = ImageCache::new("/tmp/doesnt-matter");
        assert_eq!(cache.path_for("a"), cache.path_for("a"));
        assert_ne!(cache.path_for("a"), cache.path_for("b"));
    }
}
