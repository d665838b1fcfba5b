mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
pub use memory::InMemoryMediaStore;
pub use postgres::PgMediaStore;
use uuid::Uuid;

use crate::domain::MediaRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum MediaState {
    Pending,
    Protected,
    Unkeepable,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum DeleteReason {
    Auto,
    Admin,
    KeepForever,
}

/// The two `MediaRef` variants, carried without an id — used to filter a
/// listing by media type rather than look up one specific item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Series,
    Movie,
}

impl MediaKind {
    fn matches(self, media_ref: MediaRef) -> bool {
        matches!(
            (self, media_ref),
            (MediaKind::Series, MediaRef::Series(_)) | (MediaKind::Movie, MediaRef::Movie(_))
        )
    }
}

#[derive(Debug, Clone)]
pub struct Media {
    pub id: Uuid,
    pub media_ref: MediaRef,
    pub jellyfin_id: String,
    pub library: String,
    pub title: String,
    pub year: Option<i32>,
    pub tmdb_id: Option<String>,
    pub tvdb_id: Option<String>,
    pub poster_url: Option<String>,
    pub size_on_disk: i64,
    pub default_delete_at: DateTime<Utc>,
    pub protected_until: Option<DateTime<Utc>>,
    pub requested_by: Option<String>,
    pub state: MediaState,
    pub delete_reason: Option<DeleteReason>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum CleanupRunStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct CleanupRun {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: CleanupRunStatus,
}

#[derive(Debug, Clone)]
pub struct CleanupStep {
    pub run_id: Uuid,
    pub step: String,
    pub count: i64,
    pub detail: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PushSubscriptionRow {
    pub username: String,
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
}

/// Persistence boundary the engine requires (§4.9). `PgMediaStore` backs
/// production; `InMemoryMediaStore` backs unit tests.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn create_media_items(&self, items: &[Media]) -> anyhow::Result<()>;
    async fn get_media_items(&self) -> anyhow::Result<Vec<Media>>;
    async fn get_media_items_by_media_type(&self, kind: MediaKind) -> anyhow::Result<Vec<Media>>;
    async fn get_media_item_by_ref(&self, media_ref: MediaRef) -> anyhow::Result<Option<Media>>;
    async fn get_media_with_pending_request(&self) -> anyhow::Result<Vec<Media>>;
    async fn set_media_protected_until(
        &self,
        media_ref: MediaRef,
        until: Option<DateTime<Utc>>,
    ) -> anyhow::Result<()>;
    async fn mark_media_unkeepable(&self, media_ref: MediaRef) -> anyhow::Result<()>;
    async fn delete_media_item(&self, media_ref: MediaRef, reason: DeleteReason) -> anyhow::Result<()>;
    async fn get_deleted_media_by_tmdb_id(&self, tmdb_id: &str) -> anyhow::Result<Option<Media>>;
    async fn get_deleted_media_by_tvdb_id(&self, tvdb_id: &str) -> anyhow::Result<Option<Media>>;

    async fn create_cleanup_run(&self) -> anyhow::Result<Uuid>;
    async fn finish_cleanup_run(&self, run_id: Uuid, status: CleanupRunStatus) -> anyhow::Result<()>;
    async fn append_cleanup_step(&self, step: CleanupStep) -> anyhow::Result<()>;
    async fn get_cleanup_run_history(&self, limit: i64, offset: i64) -> anyhow::Result<Vec<CleanupRun>>;
    async fn get_active_cleanup_run(&self) -> anyhow::Result<Option<CleanupRun>>;

    async fn add_push_subscription(&self, row: PushSubscriptionRow) -> anyhow::Result<()>;
    async fn remove_push_subscription(&self, username: &str, endpoint: &str) -> anyhow::Result<()>;
    async fn get_push_subscriptions(&self, username: &str) -> anyhow::Result<Vec<PushSubscriptionRow>>;
}
