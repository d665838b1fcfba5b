use std::collections::HashSet;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use log::info;

use crate::adapters::ArrClient;
use crate::config::LibraryConfig;
use crate::domain::TagKind;

/// Computes the set of `jellysweep-*` tag labels an eligible item should
/// carry: one regular delete tag plus one disk-usage delete tag per
/// configured threshold (§4.4 "Mark for deletion").
pub fn generate_deletion_tags(library: &LibraryConfig, today: NaiveDate) -> Vec<TagKind> {
    let delay_days = library.cleanup_delay_days.max(1);
    let mut tags = vec![TagKind::Delete {
        date: today + Duration::days(i64::from(delay_days)),
    }];
    for threshold in &library.disk_usage_thresholds {
        tags.push(TagKind::DiskUsageDelete {
            percent: threshold.usage_percent,
            date: today + Duration::days(i64::from(threshold.max_cleanup_delay_days)),
        });
    }
    tags
}

/// Ensures every generated tag exists on the arr (creating missing ones),
/// then writes the item's tag set back with any missing ids added.
pub async fn apply_tags(
    client: &dyn ArrClient,
    item_id: u64,
    current_tag_ids: &[u64],
    new_tags: &[TagKind],
) -> anyhow::Result<()> {
    let existing = client.tags().await?;
    let mut ids: HashSet<u64> = current_tag_ids.iter().copied().collect();
    let mut changed = false;

    for tag in new_tags {
        let label = tag.format();
        let id = match existing.iter().find(|t| t.label == label) {
            Some(t) => t.id,
            None => client.create_tag(&label).await?.id,
        };
        if ids.insert(id) {
            changed = true;
        }
    }

    if changed {
        client.set_item_tags(item_id, &ids.into_iter().collect::<Vec<_>>()).await?;
    }
    Ok(())
}

/// Replaces an item's tag set with one where labels matching `predicate`
/// have been removed and `additions` appended, mapping through the arr's
/// tag table. No-op if nothing would change.
pub async fn replace_tags(
    client: &dyn ArrClient,
    item_id: u64,
    current_labels: &[String],
    predicate: impl Fn(&str) -> bool,
    additions: &[TagKind],
) -> anyhow::Result<()> {
    let existing = client.tags().await?;
    let label_to_id = |label: &str| existing.iter().find(|t| t.label == label).map(|t| t.id);

    let mut keep_labels: Vec<String> = current_labels.iter().filter(|l| !predicate(l)).cloned().collect();
    for tag in additions {
        let label = tag.format();
        if !keep_labels.contains(&label) {
            keep_labels.push(label);
        }
    }

    let mut ids = Vec::with_capacity(keep_labels.len());
    for label in &keep_labels {
        let id = match label_to_id(label) {
            Some(id) => id,
            None => client.create_tag(label).await?.id,
        };
        ids.push(id);
    }
    client.set_item_tags(item_id, &ids).await
}

pub fn is_jellysweep_label(label: &str) -> bool {
    TagKind::parse(label).is_some()
}

fn is_delete_or_keep_request(label: &str) -> bool {
    matches!(
        TagKind::parse(label),
        Some(TagKind::Delete { .. }) | Some(TagKind::DiskUsageDelete { .. }) | Some(TagKind::KeepRequest { .. })
    )
}

/// Removes any `jellysweep-keep-request-*`/`jellysweep-must-keep-*` tag
/// whose date has expired. Run at the top of every cleanup pass.
pub async fn expiry_sweep(
    client: &dyn ArrClient,
    item_id: u64,
    current_labels: &[String],
    today: NaiveDate,
) -> anyhow::Result<()> {
    let expired = |label: &str| {
        matches!(
            TagKind::parse(label),
            Some(TagKind::KeepRequest { .. }) | Some(TagKind::MustKeep { .. })
        ) && TagKind::parse(label).is_some_and(|t| t.is_expired(today))
    };
    if !current_labels.iter().any(|l| expired(l)) {
        return Ok(());
    }
    replace_tags(client, item_id, current_labels, expired, &[]).await
}

/// After marking, items recently resumed by their requester have their
/// delete/keep-request tags rescinded.
pub async fn recently_played_sweep(
    client: &dyn ArrClient,
    item_id: u64,
    current_labels: &[String],
    last_played: DateTime<Utc>,
    now: DateTime<Utc>,
    threshold_days: u32,
) -> anyhow::Result<bool> {
    let has_tracked_tag = current_labels.iter().any(|l| is_delete_or_keep_request(l));
    if !has_tracked_tag {
        return Ok(false);
    }
    let days_since = (now - last_played).num_days();
    if days_since >= i64::from(threshold_days) {
        return Ok(false);
    }
    info!("item {item_id} resumed {days_since}d ago, rescinding cleanup tags");
    replace_tags(client, item_id, current_labels, is_delete_or_keep_request, &[]).await?;
    Ok(true)
}

/// Deletes any `jellysweep-*` tag in the arr's tag table with zero items
/// using it.
pub async fn garbage_collect_tags(client: &dyn ArrClient, item_tag_label_sets: &[Vec<String>]) -> anyhow::Result<usize> {
    let tags = client.tags().await?;
    let used: HashSet<&str> = item_tag_label_sets.iter().flatten().map(String::as_str).collect();
    let mut removed = 0;
    for tag in tags.iter().filter(|t| is_jellysweep_label(&t.label) && !used.contains(t.label.as_str())) {
        client.delete_tag(tag.id).await?;
        removed += 1;
    }
    Ok(removed)
}

pub fn sanitize_and_mark_keep_request(requester: &str, today: NaiveDate) -> TagKind {
    TagKind::KeepRequest {
        date: today + Duration::days(90),
        requester: crate::domain::sanitize_requester(requester),
    }
}

pub fn must_keep_tag(requester: Option<&str>, today: NaiveDate) -> TagKind {
    TagKind::MustKeep {
        date: today + Duration::days(90),
        requester: requester.map(crate::domain::sanitize_requester),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiskUsageThreshold;

    fn library(delay: u32, thresholds: Vec<DiskUsageThreshold>) -> LibraryConfig {
        LibraryConfig {
            enabled: true,
            content_age_threshold_days: 0,
            content_size_threshold_bytes: 0,
            last_stream_threshold_days: 0,
            cleanup_delay_days: delay,
            exclude_tags: vec![],
            disk_usage_thresholds: thresholds,
            protection_period_days: 0,
            cleanup_mode: crate::config::CleanupMode::All,
            keep_count: 0,
        }
    }

    #[test]
    fn generates_one_regular_tag_plus_one_per_threshold() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let library = library(
            7,
            vec![
                DiskUsageThreshold { usage_percent: 80, max_cleanup_delay_days: 3 },
                DiskUsageThreshold { usage_percent: 90, max_cleanup_delay_days: 1 },
            ],
        );
        let tags = generate_deletion_tags(&library, today);
        assert_eq!(tags.len(), 3);
        assert_eq!(tags[0], TagKind::Delete { date: today + Duration::days(7) });
        assert_eq!(
            tags[1],
            TagKind::DiskUsageDelete { percent: 80, date: today + Duration::days(3) }
        );
    }

    #[test]
    fn cleanup_delay_floor_is_one_day() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let library = library(0, vec![]);
        let tags = generate_deletion_tags(&library, today);
        assert_eq!(tags[0], TagKind::Delete { date: today + Duration::days(1) });
    }

    #[test]
    fn keep_request_tag_is_sanitised_and_90_days_out() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let tag = sanitize_and_mark_keep_request("jane doe-smith", today);
        assert_eq!(
            tag,
            TagKind::KeepRequest { date: today + Duration::days(90), requester: "jane_doe_smith".into() }
        );
    }
}
