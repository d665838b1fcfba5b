use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use crate::domain::MediaRef;

use super::{
    CleanupRun, CleanupRunStatus, CleanupStep, DeleteReason, Media, MediaKind, MediaState, MediaStore,
    PushSubscriptionRow,
};

pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub struct PgMediaStore {
    pool: PgPool,
}

impl PgMediaStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct MediaRow {
    id: Uuid,
    source: String,
    external_id: i32,
    jellyfin_id: String,
    library: String,
    title: String,
    year: Option<i32>,
    tmdb_id: Option<String>,
    tvdb_id: Option<String>,
    poster_url: Option<String>,
    size_on_disk: i64,
    default_delete_at: DateTime<Utc>,
    protected_until: Option<DateTime<Utc>>,
    requested_by: Option<String>,
    state: MediaState,
    delete_reason: Option<DeleteReason>,
    created_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<MediaRow> for Media {
    type Error = anyhow::Error;

    fn try_from(row: MediaRow) -> Result<Self, Self::Error> {
        let media_ref = match row.source.as_str() {
            "series" => MediaRef::Series(row.external_id),
            "movie" => MediaRef::Movie(row.external_id),
            other => anyhow::bail!("unknown media source in database: {other}"),
        };
        Ok(Media {
            id: row.id,
            media_ref,
            jellyfin_id: row.jellyfin_id,
            library: row.library,
            title: row.title,
            year: row.year,
            tmdb_id: row.tmdb_id,
            tvdb_id: row.tvdb_id,
            poster_url: row.poster_url,
            size_on_disk: row.size_on_disk,
            default_delete_at: row.default_delete_at,
            protected_until: row.protected_until,
            requested_by: row.requested_by,
            state: row.state,
            delete_reason: row.delete_reason,
            created_at: row.created_at,
            deleted_at: row.deleted_at,
        })
    }
}

#[async_trait]
impl MediaStore for PgMediaStore {
    async fn create_media_items(&self, items: &[Media]) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        for item in items {
            sqlx::query(
                "INSERT INTO media (id, source, external_id, jellyfin_id, library, title, year, \
                 tmdb_id, tvdb_id, poster_url, size_on_disk, default_delete_at, state, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 'pending', now()) \
                 ON CONFLICT (source, external_id) WHERE state != 'deleted' DO NOTHING",
            )
            .bind(item.id)
            .bind(item.media_ref.kind())
            .bind(item.media_ref.id())
            .bind(&item.jellyfin_id)
            .bind(&item.library)
            .bind(&item.title)
            .bind(item.year)
            .bind(&item.tmdb_id)
            .bind(&item.tvdb_id)
            .bind(&item.poster_url)
            .bind(item.size_on_disk)
            .bind(item.default_delete_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_media_items(&self) -> anyhow::Result<Vec<Media>> {
        let rows: Vec<MediaRow> =
            sqlx::query_as("SELECT * FROM media WHERE state != 'deleted'")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(TryFrom::try_from).collect()
    }

    async fn get_media_items_by_media_type(&self, kind: MediaKind) -> anyhow::Result<Vec<Media>> {
        let source = match kind {
            MediaKind::Series => "series",
            MediaKind::Movie => "movie",
        };
        let rows: Vec<MediaRow> =
            sqlx::query_as("SELECT * FROM media WHERE source = $1 AND state != 'deleted'")
                .bind(source)
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(TryFrom::try_from).collect()
    }

    async fn get_media_item_by_ref(&self, media_ref: MediaRef) -> anyhow::Result<Option<Media>> {
        let row: Option<MediaRow> =
            sqlx::query_as("SELECT * FROM media WHERE source = $1 AND external_id = $2 AND state != 'deleted'")
                .bind(media_ref.kind())
                .bind(media_ref.id())
                .fetch_optional(&self.pool)
                .await?;
        row.map(TryFrom::try_from).transpose()
    }

    async fn get_media_with_pending_request(&self) -> anyhow::Result<Vec<Media>> {
        let rows: Vec<MediaRow> =
            sqlx::query_as("SELECT * FROM media WHERE state = 'pending' AND requested_by IS NOT NULL")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(TryFrom::try_from).collect()
    }

    async fn set_media_protected_until(
        &self,
        media_ref: MediaRef,
        until: Option<DateTime<Utc>>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE media SET state = 'protected', protected_until = $3 \
             WHERE source = $1 AND external_id = $2",
        )
        .bind(media_ref.kind())
        .bind(media_ref.id())
        .bind(until)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_media_unkeepable(&self, media_ref: MediaRef) -> anyhow::Result<()> {
        sqlx::query("UPDATE media SET state = 'unkeepable' WHERE source = $1 AND external_id = $2")
            .bind(media_ref.kind())
            .bind(media_ref.id())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_media_item(&self, media_ref: MediaRef, reason: DeleteReason) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE media SET state = 'deleted', delete_reason = $3, deleted_at = now() \
             WHERE source = $1 AND external_id = $2",
        )
        .bind(media_ref.kind())
        .bind(media_ref.id())
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_deleted_media_by_tmdb_id(&self, tmdb_id: &str) -> anyhow::Result<Option<Media>> {
        let row: Option<MediaRow> =
            sqlx::query_as("SELECT * FROM media WHERE tmdb_id = $1 AND state = 'deleted' ORDER BY deleted_at DESC LIMIT 1")
                .bind(tmdb_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(TryFrom::try_from).transpose()
    }

    async fn get_deleted_media_by_tvdb_id(&self, tvdb_id: &str) -> anyhow::Result<Option<Media>> {
        let row: Option<MediaRow> =
            sqlx::query_as("SELECT * FROM media WHERE tvdb_id = $1 AND state = 'deleted' ORDER BY deleted_at DESC LIMIT 1")
                .bind(tvdb_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(TryFrom::try_from).transpose()
    }

    async fn create_cleanup_run(&self) -> anyhow::Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO cleanup_runs (id, started_at, status) VALUES ($1, now(), 'running')")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(id)
    }

    async fn finish_cleanup_run(&self, run_id: Uuid, status: CleanupRunStatus) -> anyhow::Result<()> {
        sqlx::query("UPDATE cleanup_runs SET finished_at = now(), status = $2 WHERE id = $1")
            .bind(run_id)
            .bind(status)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn append_cleanup_step(&self, step: CleanupStep) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO cleanup_steps (run_id, step, count, detail) VALUES ($1, $2, $3, $4)")
            .bind(step.run_id)
            .bind(step.step)
            .bind(step.count)
            .bind(step.detail)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_cleanup_run_history(&self, limit: i64, offset: i64) -> anyhow::Result<Vec<CleanupRun>> {
        let rows: Vec<(Uuid, DateTime<Utc>, Option<DateTime<Utc>>, CleanupRunStatus)> = sqlx::query_as(
            "SELECT id, started_at, finished_at, status FROM cleanup_runs \
             ORDER BY started_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, started_at, finished_at, status)| CleanupRun {
                id,
                started_at,
                finished_at,
                status,
            })
            .collect())
    }

    async fn get_active_cleanup_run(&self) -> anyhow::Result<Option<CleanupRun>> {
        let row: Option<(Uuid, DateTime<Utc>, Option<DateTime<Utc>>, CleanupRunStatus)> = sqlx::query_as(
            "SELECT id, started_at, finished_at, status FROM cleanup_runs \
             WHERE status = 'running' ORDER BY started_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, started_at, finished_at, status)| CleanupRun {
            id,
            started_at,
            finished_at,
            status,
        }))
    }

    async fn add_push_subscription(&self, row: PushSubscriptionRow) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO push_subscriptions (id, username, endpoint, p256dh, auth) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (username, endpoint) DO UPDATE SET p256dh = $4, auth = $5",
        )
        .bind(Uuid::new_v4())
        .bind(&row.username)
        .bind(&row.endpoint)
        .bind(&row.p256dh)
        .bind(&row.auth)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_push_subscription(&self, username: &str, endpoint: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM push_subscriptions WHERE username = $1 AND endpoint = $2")
            .bind(username)
            .bind(endpoint)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_push_subscriptions(&self, username: &str) -> anyhow::Result<Vec<PushSubscriptionRow>> {
        let rows: Vec<(String, String, String, String)> = sqlx::query_as(
            "SELECT username, endpoint, p256dh, auth FROM push_subscriptions WHERE username = $1",
        )
        .bind(username)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(username, endpoint, p256dh, auth)| PushSubscriptionRow { username, endpoint, p256dh, auth })
            .collect())
    }
}
