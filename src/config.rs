use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::bail;
use serde::Deserialize;

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub session_key: String,
    #[serde(with = "humantime_serde", default = "default_session_max_age")]
    pub session_max_age: Duration,
    pub listen_addr: String,
    pub api_key: String,
    pub cleanup_schedule: String,
    pub server_url: String,
    pub database_url: String,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub cache_backend: CacheBackendKind,
    pub redis_url: Option<String>,

    pub libraries: HashMap<String, LibraryConfig>,

    pub jellyfin: JellyfinConfig,
    pub sonarr: ArrConfig,
    pub radarr: ArrConfig,
    pub stats: StatsConfig,
    pub request_manager: RequestManagerConfig,

    pub smtp: Option<SmtpConfig>,
    pub ntfy: Option<NtfyConfig>,
    pub webpush: Option<WebPushConfig>,
    pub oidc: Option<OidcConfig>,
    pub gravatar: Option<GravatarConfig>,
}

fn default_session_max_age() -> Duration {
    Duration::from_secs(60 * 60 * 24 * 30)
}

#[derive(Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    #[default]
    Memory,
    Redis,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CleanupMode {
    All,
    KeepEpisodes,
    KeepSeasons,
}

#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(deny_unknown_fields)]
pub struct DiskUsageThreshold {
    pub usage_percent: u32,
    pub max_cleanup_delay_days: u32,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct LibraryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub content_age_threshold_days: u32,
    #[serde(default)]
    pub content_size_threshold_bytes: u64,
    #[serde(default)]
    pub last_stream_threshold_days: u32,
    pub cleanup_delay_days: u32,
    #[serde(default)]
    pub exclude_tags: Vec<String>,
    #[serde(default)]
    pub disk_usage_thresholds: Vec<DiskUsageThreshold>,
    #[serde(default)]
    pub protection_period_days: u32,
    #[serde(default = "default_cleanup_mode")]
    pub cleanup_mode: CleanupMode,
    #[serde(default)]
    pub keep_count: u32,
}

fn default_true() -> bool {
    true
}

fn default_cleanup_mode() -> CleanupMode {
    CleanupMode::All
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct JellyfinConfig {
    pub base_url: String,
    pub api_key: String,
    pub username: String,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct ArrConfig {
    pub base_url: String,
    pub api_key: String,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct StatsConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct RequestManagerConfig {
    pub base_url: String,
    pub api_key: String,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
}

fn default_smtp_port() -> u16 {
    587
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct NtfyConfig {
    pub base_url: String,
    pub topic: String,
    pub token: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct WebPushConfig {
    pub vapid_private_key: String,
    pub vapid_public_key: String,
    pub vapid_subject: String,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct OidcConfig {
    pub issuer_url: String,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct GravatarConfig {
    #[serde(default)]
    pub enabled: bool,
}

impl Config {
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let Ok(config_str) = tokio::fs::read_to_string(path).await else {
            bail!("failed to read config file at {path:?}");
        };
        Self::parse(&config_str)
    }

    pub fn parse(config_str: &str) -> anyhow::Result<Self> {
        let mut config: Config = toml::from_str(config_str)?;
        config.libraries = config
            .libraries
            .into_iter()
            .map(|(name, cfg)| (name.to_lowercase(), cfg))
            .collect();
        Ok(config)
    }

    /// Resolves a media-server library name (case-preserving) to its config,
    /// falling back to a case-folded lookup since the loader lowercases keys.
    pub fn library(&self, name: &str) -> Option<&LibraryConfig> {
        self.libraries
            .get(name)
            .or_else(|| self.libraries.get(&name.to_lowercase()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const EXAMPLE: &str = r#"
session_key = "dev-secret"
listen_addr = "0.0.0.0:8080"
api_key = "plugin-key"
cleanup_schedule = "0 0 3 * * *"
server_url = "http://localhost:8080"
database_url = "postgres://localhost/jellysweep"
dry_run = true

[libraries.Movies]
cleanup_delay_days = 7

[jellyfin]
base_url = "http://localhost:8096"
api_key = "api-key-foo"
username = "admin"

[sonarr]
base_url = "http://localhost:8989"
api_key = "api-key-foo"

[radarr]
base_url = "http://localhost:7878"
api_key = "api-key-foo"

[stats]
base_url = "http://localhost:8000"

[request_manager]
base_url = "http://localhost:5055"
api_key = "api-key-foo"
"#;

    #[test]
    fn parses_minimal_config() -> anyhow::Result<()> {
        let cfg = Config::parse(EXAMPLE)?;
        assert_eq!(cfg.jellyfin.api_key, "api-key-foo");
        assert!(cfg.dry_run);
        assert_eq!(cfg.cache_backend, CacheBackendKind::Memory);
        assert!(cfg.smtp.is_none());

        let movies = cfg.library("movies").expect("movies library");
        assert_eq!(movies.cleanup_delay_days, 7);
        assert!(movies.enabled);
        assert_eq!(movies.cleanup_mode, CleanupMode::All);
        Ok(())
    }

    #[test]
    fn library_lookup_is_case_insensitive() -> anyhow::Result<()> {
        let cfg = Config::parse(EXAMPLE)?;
        assert!(cfg.library("Movies").is_some());
        assert!(cfg.library("MOVIES").is_some());
        assert!(cfg.library("movies").is_some());
        assert!(cfg.library("tv-shows").is_none());
        Ok(())
    }

    #[test]
    fn rejects_unknown_fields() {
        let bad = format!("{EXAMPLE}\nbogus_field = 1\n");
        assert!(Config::parse(&bad).is_err());
    }
}
