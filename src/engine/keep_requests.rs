use chrono::Utc;

use crate::adapters::ArrClient;
use crate::domain::MediaRef;
use crate::error::EngineError;
use crate::notify::{Notifier, PushOutcome, PushSubscription};
use crate::store::{Media, MediaState, MediaStore};

use super::tags;

/// `media_id` multiplexing: resolves a `sonarr-<n>`/`radarr-<n>` reference
/// to the matching adapter. The unsupported-prefix case is handled by
/// `MediaRef::FromStr` itself, surfaced as `EngineError::ValidationFailed`.
pub fn resolve_client<'a>(media_ref: MediaRef, sonarr: &'a dyn ArrClient, radarr: &'a dyn ArrClient) -> &'a dyn ArrClient {
    match media_ref {
        MediaRef::Series(_) => sonarr,
        MediaRef::Movie(_) => radarr,
    }
}

/// Resolves an item's current tag labels straight from the arr service.
/// HTTP handlers call this immediately before a single-item tag mutation
/// (request/accept/decline/keep/keep-forever) since, unlike a cleanup run,
/// they don't already have an inventory snapshot to read labels from.
pub async fn current_labels(client: &dyn ArrClient, item_id: i32) -> anyhow::Result<Vec<String>> {
    let tag_labels: std::collections::HashMap<u64, String> =
        client.tags().await?.into_iter().map(|t| (t.id, t.label)).collect();
    let item = client
        .items()
        .await?
        .into_iter()
        .find(|i| i.id == item_id as u64)
        .ok_or_else(|| anyhow::anyhow!("item {item_id} not found"))?;
    Ok(item.tag_ids.iter().filter_map(|id| tag_labels.get(id).cloned()).collect())
}

/// §4.6 `RequestKeep`. Fails if the item already carries a keep-request or
/// must-delete-for-sure tag.
pub async fn request_keep(
    media_ref: MediaRef,
    current_labels: &[String],
    requester: &str,
    sonarr: &dyn ArrClient,
    radarr: &dyn ArrClient,
) -> anyhow::Result<()> {
    let client = resolve_client(media_ref, sonarr, radarr);
    let already_pending = current_labels.iter().any(|l| {
        matches!(
            crate::domain::TagKind::parse(l),
            Some(crate::domain::TagKind::KeepRequest { .. }) | Some(crate::domain::TagKind::MustDeleteForSure)
        )
    });
    if already_pending {
        return Err(EngineError::RequestAlreadyProcessed.into());
    }

    let today = Utc::now().date_naive();
    let tag = tags::sanitize_and_mark_keep_request(requester, today);
    let items = client.items().await?;
    let item = items
        .into_iter()
        .find(|i| i.id == media_ref.id() as u64)
        .ok_or_else(|| anyhow::anyhow!("media item {media_ref} not found"))?;
    tags::apply_tags(client, item.id, &item.tag_ids, &[tag]).await
}

/// §4.6 `AcceptKeepRequest`. Removes delete/keep-request tags, adds
/// must-keep, notifies the requester via webpush.
pub async fn accept_keep_request(
    media_ref: MediaRef,
    media: &Media,
    current_labels: &[String],
    sonarr: &dyn ArrClient,
    radarr: &dyn ArrClient,
    store: &dyn MediaStore,
    notifier: &Notifier,
    subscription: Option<&PushSubscription>,
) -> anyhow::Result<PushOutcome> {
    guard_not_processed(current_labels)?;
    let client = resolve_client(media_ref, sonarr, radarr);
    let today = Utc::now().date_naive();
    let tag = tags::must_keep_tag(media.requested_by.as_deref(), today);
    let item_id = media_ref.id() as u64;

    tags::replace_tags(client, item_id, current_labels, tags::is_jellysweep_label, &[tag]).await?;
    store
        .set_media_protected_until(media_ref, Some(Utc::now() + chrono::Duration::days(90)))
        .await?;

    match subscription {
        Some(sub) => Ok(notifier.notify_keep_request_outcome(sub, true).await),
        None => Ok(PushOutcome::Failed),
    }
}

/// §4.6 `DeclineKeepRequest`. Removes keep-request tags only, preserving
/// `jellysweep-delete-*` so the original schedule still applies, then adds
/// `jellysweep-must-delete-for-sure`.
pub async fn decline_keep_request(
    media_ref: MediaRef,
    current_labels: &[String],
    sonarr: &dyn ArrClient,
    radarr: &dyn ArrClient,
    store: &dyn MediaStore,
    notifier: &Notifier,
    subscription: Option<&PushSubscription>,
) -> anyhow::Result<PushOutcome> {
    guard_not_processed(current_labels)?;
    let client = resolve_client(media_ref, sonarr, radarr);
    let item_id = media_ref.id() as u64;

    let is_keep_request = |label: &str| {
        matches!(crate::domain::TagKind::parse(label), Some(crate::domain::TagKind::KeepRequest { .. }))
    };
    tags::replace_tags(
        client,
        item_id,
        current_labels,
        is_keep_request,
        &[crate::domain::TagKind::MustDeleteForSure],
    )
    .await?;
    store.mark_media_unkeepable(media_ref).await?;

    match subscription {
        Some(sub) => Ok(notifier.notify_keep_request_outcome(sub, false).await),
        None => Ok(PushOutcome::Failed),
    }
}

/// §4.4 "Mark keep-forever": removes every jellysweep tag, adds `ignore`.
pub async fn mark_keep_forever(
    media_ref: MediaRef,
    current_labels: &[String],
    sonarr: &dyn ArrClient,
    radarr: &dyn ArrClient,
    store: &dyn MediaStore,
) -> anyhow::Result<()> {
    let client = resolve_client(media_ref, sonarr, radarr);
    let item_id = media_ref.id() as u64;
    tags::replace_tags(
        client,
        item_id,
        current_labels,
        tags::is_jellysweep_label,
        &[crate::domain::TagKind::Ignore],
    )
    .await?;
    store.set_media_protected_until(media_ref, None).await?;
    Ok(())
}

/// `POST /admin/api/media/:id/keep` (§6): an admin directly protecting an
/// item for `days`, independent of any user keep request.
pub async fn admin_keep(
    media_ref: MediaRef,
    current_labels: &[String],
    days: i64,
    sonarr: &dyn ArrClient,
    radarr: &dyn ArrClient,
    store: &dyn MediaStore,
) -> anyhow::Result<()> {
    let client = resolve_client(media_ref, sonarr, radarr);
    let until = Utc::now() + chrono::Duration::days(days);
    let tag = crate::domain::TagKind::MustKeep { date: until.date_naive(), requester: None };
    tags::replace_tags(client, media_ref.id() as u64, current_labels, tags::is_jellysweep_label, &[tag]).await?;
    store.set_media_protected_until(media_ref, Some(until)).await?;
    Ok(())
}

/// `POST /admin/api/media/:id/delete` (§6): an admin marking an item
/// unkeepable, same tag outcome as declining a keep request.
pub async fn admin_delete(
    media_ref: MediaRef,
    current_labels: &[String],
    sonarr: &dyn ArrClient,
    radarr: &dyn ArrClient,
    store: &dyn MediaStore,
) -> anyhow::Result<()> {
    let client = resolve_client(media_ref, sonarr, radarr);
    tags::replace_tags(
        client,
        media_ref.id() as u64,
        current_labels,
        tags::is_jellysweep_label,
        &[crate::domain::TagKind::MustDeleteForSure],
    )
    .await?;
    store.mark_media_unkeepable(media_ref).await?;
    Ok(())
}

fn guard_not_processed(current_labels: &[String]) -> anyhow::Result<()> {
    let processed = current_labels.iter().any(|l| {
        matches!(
            crate::domain::TagKind::parse(l),
            Some(crate::domain::TagKind::MustKeep { .. }) | Some(crate::domain::TagKind::MustDeleteForSure)
        )
    });
    if processed {
        Err(EngineError::RequestAlreadyProcessed.into())
    } else {
        Ok(())
    }
}

/// Lists media rows with a pending keep request, used by
/// `ListKeepRequests`. `force_refresh` is accepted for interface parity with
/// §4.6 but this adapter always reads current store state.
pub async fn list_keep_requests(store: &dyn MediaStore, _force_refresh: bool) -> anyhow::Result<Vec<Media>> {
    store.get_media_with_pending_request().await
}

pub fn media_state_allows_request(state: MediaState) -> bool {
    matches!(state, MediaState::Pending)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::Utc;

    use crate::adapters::{ArrItem, ArrTag, SeasonStat};
    use crate::store::{InMemoryMediaStore, Media};

    use super::*;

    #[derive(Default)]
    struct FakeArr {
        items: Mutex<Vec<ArrItem>>,
        tags: Mutex<Vec<ArrTag>>,
        next_tag_id: Mutex<u64>,
    }

    impl FakeArr {
        fn with_item(item_id: u64, tag_ids: Vec<u64>) -> Self {
            let fake = Self::default();
            fake.items.lock().unwrap().push(ArrItem {
                id: item_id,
                title: "Test".into(),
                year: Some(2020),
                tmdb_id: Some("1".into()),
                tvdb_id: None,
                tag_ids,
                size_on_disk: 0,
                episodes_with_files: 0,
                seasons_with_files: 0,
                seasons: Vec::<SeasonStat>::new(),
            });
            *fake.next_tag_id.lock().unwrap() = 1;
            fake
        }

        fn tag(mut self, id: u64, label: &str) -> Self {
            self.tags.get_mut().unwrap().push(ArrTag { id, label: label.into() });
            self
        }
    }

    #[async_trait::async_trait]
    impl ArrClient for FakeArr {
        async fn items(&self) -> anyhow::Result<Vec<ArrItem>> {
            Ok(self.items.lock().unwrap().clone())
        }

        async fn tags(&self) -> anyhow::Result<Vec<ArrTag>> {
            Ok(self.tags.lock().unwrap().clone())
        }

        async fn create_tag(&self, label: &str) -> anyhow::Result<ArrTag> {
            let mut next = self.next_tag_id.lock().unwrap();
            *next += 100;
            let tag = ArrTag { id: *next, label: label.to_string() };
            self.tags.lock().unwrap().push(tag.clone());
            Ok(tag)
        }

        async fn delete_tag(&self, id: u64) -> anyhow::Result<()> {
            self.tags.lock().unwrap().retain(|t| t.id != id);
            Ok(())
        }

        async fn set_item_tags(&self, id: u64, tag_ids: &[u64]) -> anyhow::Result<()> {
            if let Some(item) = self.items.lock().unwrap().iter_mut().find(|i| i.id == id) {
                item.tag_ids = tag_ids.to_vec();
            }
            Ok(())
        }

        async fn delete(&self, _id: u64) -> anyhow::Result<()> {
            Ok(())
        }

        async fn first_imported_at(&self, _id: u64) -> anyhow::Result<Option<chrono::DateTime<Utc>>> {
            Ok(None)
        }
    }

    fn media_fixture(media_ref: MediaRef) -> Media {
        Media {
            id: uuid::Uuid::new_v4(),
            media_ref,
            jellyfin_id: "jf-1".into(),
            library: "Movies".into(),
            title: "Test".into(),
            year: Some(2020),
            tmdb_id: Some("1".into()),
            tvdb_id: None,
            poster_url: None,
            size_on_disk: 0,
            default_delete_at: Utc::now(),
            protected_until: None,
            requested_by: Some("alice".into()),
            state: MediaState::Pending,
            delete_reason: None,
            created_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn request_keep_adds_keep_request_tag() {
        let radarr = FakeArr::with_item(42, vec![]);
        let sonarr = FakeArr::default();
        let media_ref = MediaRef::Movie(42);

        request_keep(media_ref, &[], "alice", &sonarr, &radarr).await.unwrap();

        let item = radarr.items().await.unwrap().remove(0);
        assert_eq!(item.tag_ids.len(), 1);
        let tag = radarr.tags().await.unwrap().into_iter().find(|t| t.id == item.tag_ids[0]).unwrap();
        assert!(tag.label.starts_with("jellysweep-keep-request-"));
        assert!(tag.label.ends_with("-alice"));
    }

    #[tokio::test]
    async fn request_keep_rejects_when_already_pending() {
        let radarr = FakeArr::with_item(42, vec![]);
        let sonarr = FakeArr::default();
        let current_labels = vec!["jellysweep-keep-request-2024-01-01-bob".to_string()];

        let err = request_keep(MediaRef::Movie(42), &current_labels, "alice", &sonarr, &radarr)
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<EngineError>().is_some());
    }

    #[tokio::test]
    async fn accept_keep_request_protects_item_and_notifies() {
        let radarr = FakeArr::with_item(42, vec![1]).tag(1, "jellysweep-keep-request-2024-01-01-alice");
        let sonarr = FakeArr::default();
        let store = InMemoryMediaStore::new();
        let notifier = crate::notify::Notifier::default();
        let media_ref = MediaRef::Movie(42);
        let media = media_fixture(media_ref);
        store.create_media_items(&[media.clone()]).await.unwrap();

        let current_labels = vec!["jellysweep-keep-request-2024-01-01-alice".to_string()];
        accept_keep_request(media_ref, &media, &current_labels, &sonarr, &radarr, &store, &notifier, None)
            .await
            .unwrap();

        let stored = store.get_media_item_by_ref(media_ref).await.unwrap().unwrap();
        assert!(stored.protected_until.is_some());

        let item = radarr.items().await.unwrap().remove(0);
        let labels: Vec<String> = item
            .tag_ids
            .iter()
            .filter_map(|id| radarr.tags.lock().unwrap().iter().find(|t| t.id == *id).map(|t| t.label.clone()))
            .collect();
        assert!(labels.iter().any(|l| l.starts_with("jellysweep-must-keep-")));
        assert!(!labels.iter().any(|l| l.starts_with("jellysweep-keep-request-")));
    }

    #[tokio::test]
    async fn accept_keep_request_rejects_second_accept() {
        let radarr = FakeArr::with_item(42, vec![1]).tag(1, "jellysweep-must-keep-2024-01-01-alice");
        let sonarr = FakeArr::default();
        let store = InMemoryMediaStore::new();
        let notifier = crate::notify::Notifier::default();
        let media_ref = MediaRef::Movie(42);
        let media = media_fixture(media_ref);

        let current_labels = vec!["jellysweep-must-keep-2024-01-01-alice".to_string()];
        let err = accept_keep_request(media_ref, &media, &current_labels, &sonarr, &radarr, &store, &notifier, None)
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<EngineError>(), Some(EngineError::RequestAlreadyProcessed)));
    }

    #[tokio::test]
    async fn admin_delete_marks_unkeepable_and_tags() {
        let radarr = FakeArr::with_item(7, vec![]);
        let sonarr = FakeArr::default();
        let store = InMemoryMediaStore::new();
        let media_ref = MediaRef::Movie(7);
        store.create_media_items(&[media_fixture(media_ref)]).await.unwrap();

        admin_delete(media_ref, &[], &sonarr, &radarr, &store).await.unwrap();

        let stored = store.get_media_item_by_ref(media_ref).await.unwrap().unwrap();
        assert_eq!(stored.state, MediaState::Unkeepable);

        let item = radarr.items().await.unwrap().remove(0);
        let tag = radarr.tags().await.unwrap().into_iter().find(|t| t.id == item.tag_ids[0]).unwrap();
        assert_eq!(tag.label, "jellysweep-must-delete-for-sure");
    }

    #[tokio::test]
    async fn admin_keep_sets_protection_window() {
        let radarr = FakeArr::with_item(7, vec![]);
        let sonarr = FakeArr::default();
        let store = InMemoryMediaStore::new();
        let media_ref = MediaRef::Movie(7);
        store.create_media_items(&[media_fixture(media_ref)]).await.unwrap();

        admin_keep(media_ref, &[], 30, &sonarr, &radarr, &store).await.unwrap();

        let stored = store.get_media_item_by_ref(media_ref).await.unwrap().unwrap();
        let until = stored.protected_until.expect("protected_until set");
        assert!(until > Utc::now() + chrono::Duration::days(29));
    }
}
