use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::MediaRef;

use super::{
    CleanupRun, CleanupRunStatus, CleanupStep, DeleteReason, Media, MediaKind, MediaState, MediaStore,
    PushSubscriptionRow,
};

/// In-memory `MediaStore` used by unit tests for the engine components that
/// depend on persistence (already-marked filter, keep-request workflow).
#[derive(Default)]
pub struct InMemoryMediaStore {
    media: Mutex<Vec<Media>>,
    runs: Mutex<Vec<CleanupRun>>,
    steps: Mutex<Vec<CleanupStep>>,
    push_subscriptions: Mutex<Vec<PushSubscriptionRow>>,
}

impl InMemoryMediaStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MediaStore for InMemoryMediaStore {
    async fn create_media_items(&self, items: &[Media]) -> anyhow::Result<()> {
        let mut media = self.media.lock().unwrap();
        for item in items {
            let exists = media
                .iter()
                .any(|m| m.media_ref == item.media_ref && m.state != MediaState::Deleted);
            if !exists {
                media.push(item.clone());
            }
        }
        Ok(())
    }

    async fn get_media_items(&self) -> anyhow::Result<Vec<Media>> {
        Ok(self
            .media
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.state != MediaState::Deleted)
            .cloned()
            .collect())
    }

    async fn get_media_items_by_media_type(&self, kind: MediaKind) -> anyhow::Result<Vec<Media>> {
        Ok(self
            .media
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.state != MediaState::Deleted && kind.matches(m.media_ref))
            .cloned()
            .collect())
    }

    async fn get_media_item_by_ref(&self, media_ref: MediaRef) -> anyhow::Result<Option<Media>> {
        Ok(self
            .media
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.media_ref == media_ref && m.state != MediaState::Deleted)
            .cloned())
    }

    async fn get_media_with_pending_request(&self) -> anyhow::Result<Vec<Media>> {
        Ok(self
            .media
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.state == MediaState::Pending && m.requested_by.is_some())
            .cloned()
            .collect())
    }

    async fn set_media_protected_until(
        &self,
        media_ref: MediaRef,
        until: Option<DateTime<Utc>>,
    ) -> anyhow::Result<()> {
        let mut media = self.media.lock().unwrap();
        if let Some(m) = media.iter_mut().find(|m| m.media_ref == media_ref) {
            m.state = MediaState::Protected;
            m.protected_until = until;
        }
        Ok(())
    }

    async fn mark_media_unkeepable(&self, media_ref: MediaRef) -> anyhow::Result<()> {
        let mut media = self.media.lock().unwrap();
        if let Some(m) = media.iter_mut().find(|m| m.media_ref == media_ref) {
            m.state = MediaState::Unkeepable;
        }
        Ok(())
    }

    async fn delete_media_item(&self, media_ref: MediaRef, reason: DeleteReason) -> anyhow::Result<()> {
        let mut media = self.media.lock().unwrap();
        if let Some(m) = media.iter_mut().find(|m| m.media_ref == media_ref) {
            m.state = MediaState::Deleted;
            m.delete_reason = Some(reason);
            m.deleted_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn get_deleted_media_by_tmdb_id(&self, tmdb_id: &str) -> anyhow::Result<Option<Media>> {
        Ok(self
            .media
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.tmdb_id.as_deref() == Some(tmdb_id) && m.state == MediaState::Deleted)
            .cloned())
    }

    async fn get_deleted_media_by_tvdb_id(&self, tvdb_id: &str) -> anyhow::Result<Option<Media>> {
        Ok(self
            .media
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.tvdb_id.as_deref() == Some(tvdb_id) && m.state == MediaState::Deleted)
            .cloned())
    }

    async fn create_cleanup_run(&self) -> anyhow::Result<Uuid> {
        let run = CleanupRun {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            status: CleanupRunStatus::Running,
        };
        let id = run.id;
        self.runs.lock().unwrap().push(run);
        Ok(id)
    }

    async fn finish_cleanup_run(&self, run_id: Uuid, status: CleanupRunStatus) -> anyhow::Result<()> {
        let mut runs = self.runs.lock().unwrap();
        if let Some(run) = runs.iter_mut().find(|r| r.id == run_id) {
            run.status = status;
            run.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn append_cleanup_step(&self, step: CleanupStep) -> anyhow::Result<()> {
        self.steps.lock().unwrap().push(step);
        Ok(())
    }

    async fn get_cleanup_run_history(&self, limit: i64, offset: i64) -> anyhow::Result<Vec<CleanupRun>> {
        let runs = self.runs.lock().unwrap();
        Ok(runs
            .iter()
            .rev()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn get_active_cleanup_run(&self) -> anyhow::Result<Option<CleanupRun>> {
        Ok(self
            .runs
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.status == CleanupRunStatus::Running)
            .cloned())
    }

    async fn add_push_subscription(&self, row: PushSubscriptionRow) -> anyhow::Result<()> {
        let mut subs = self.push_subscriptions.lock().unwrap();
        subs.retain(|s| !(s.username == row.username && s.endpoint == row.endpoint));
        subs.push(row);
        Ok(())
    }

    async fn remove_push_subscription(&self, username: &str, endpoint: &str) -> anyhow::Result<()> {
        self.push_subscriptions
            .lock()
            .unwrap()
            .retain(|s| !(s.username == username && s.endpoint == endpoint));
        Ok(())
    }

    async fn get_push_subscriptions(&self, username: &str) -> anyhow::Result<Vec<PushSubscriptionRow>> {
        Ok(self
            .push_subscriptions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.username == username)
            .cloned()
            .collect())
    }
}
