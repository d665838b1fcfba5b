use chrono::{DateTime, Duration, Utc};

use crate::config::LibraryConfig;
use crate::domain::TagKind;

/// An item carrying a `jellysweep-delete*`/`must-delete-for-sure` tag,
/// enough context to decide whether it fires now.
pub struct Candidate<'a> {
    pub tags: Vec<TagKind>,
    pub library: &'a LibraryConfig,
}

/// §4.5: picks the smallest delay any present tag makes applicable at the
/// current disk usage, adjusts the tag's stored date by the delta between
/// its nominal delay and the selected one, and fires if `now` has passed
/// that adjusted date. Returns `None` if no tag implies an applicable delay
/// at the current usage level — the item simply isn't considered yet.
pub fn should_delete_now(candidate: &Candidate, current_disk_usage_percent: u32, now: DateTime<Utc>) -> bool {
    let Some((date, selected_delay, nominal_delay)) = select_delay(candidate, current_disk_usage_percent) else {
        return false;
    };
    let adjusted = date - Duration::days(i64::from(nominal_delay) - i64::from(selected_delay));
    now.date_naive() >= adjusted
}

/// Returns `(tag_date, selected_delay_days, tag_nominal_delay_days)` for the
/// tag whose applicable delay is smallest, or `None` if nothing applies.
fn select_delay(candidate: &Candidate, current_disk_usage_percent: u32) -> Option<(chrono::NaiveDate, u32, u32)> {
    let mut best: Option<(chrono::NaiveDate, u32, u32)> = None;

    let mut consider = |date: chrono::NaiveDate, delay: u32, nominal: u32| match &best {
        Some((_, best_delay, _)) if *best_delay <= delay => {}
        _ => best = Some((date, delay, nominal)),
    };

    for tag in &candidate.tags {
        match tag {
            TagKind::DiskUsageDelete { percent, date } => {
                if *percent <= current_disk_usage_percent {
                    if let Some(threshold) = candidate
                        .library
                        .disk_usage_thresholds
                        .iter()
                        .find(|t| t.usage_percent == *percent)
                    {
                        consider(*date, threshold.max_cleanup_delay_days, threshold.max_cleanup_delay_days);
                    }
                }
            }
            TagKind::Delete { date } => {
                consider(*date, candidate.library.cleanup_delay_days, candidate.library.cleanup_delay_days);
            }
            TagKind::MustDeleteForSure => {
                let min_threshold_delay = candidate
                    .library
                    .disk_usage_thresholds
                    .iter()
                    .map(|t| t.max_cleanup_delay_days)
                    .min();
                let min_delay = match min_threshold_delay {
                    Some(d) => d.min(candidate.library.cleanup_delay_days),
                    None => candidate.library.cleanup_delay_days,
                };
                // must-delete-for-sure carries no stored date of its own;
                // anchor it to today so the adjusted date collapses to "now".
                consider(chrono::Utc::now().date_naive(), min_delay, min_delay);
            }
            _ => {}
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CleanupMode, DiskUsageThreshold};
    use chrono::TimeZone;

    fn library() -> LibraryConfig {
        LibraryConfig {
            enabled: true,
            content_age_threshold_days: 0,
            content_size_threshold_bytes: 0,
            last_stream_threshold_days: 0,
            cleanup_delay_days: 7,
            exclude_tags: vec![],
            disk_usage_thresholds: vec![
                DiskUsageThreshold { usage_percent: 80, max_cleanup_delay_days: 2 },
                DiskUsageThreshold { usage_percent: 90, max_cleanup_delay_days: 0 },
            ],
            protection_period_days: 0,
            cleanup_mode: CleanupMode::All,
            keep_count: 0,
        }
    }

    #[test]
    fn fires_on_regular_delay_when_date_reached() {
        let library = library();
        let date = chrono::NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let candidate = Candidate { tags: vec![TagKind::Delete { date }], library: &library };
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        assert!(should_delete_now(&candidate, 10, now));
    }

    #[test]
    fn disk_usage_tag_accelerates_deletion_when_threshold_crossed() {
        let library = library();
        let regular_date = chrono::NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let du_date = chrono::NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let candidate = Candidate {
            tags: vec![
                TagKind::Delete { date: regular_date },
                TagKind::DiskUsageDelete { percent: 80, date: du_date },
            ],
            library: &library,
        };
        // disk usage is at 85%, so the 80% threshold (delay 2) applies and
        // wins over the regular tag's delay of 7.
        let now = Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap();
        assert!(should_delete_now(&candidate, 85, now));
    }

    #[test]
    fn disk_usage_tag_inapplicable_below_threshold() {
        let library = library();
        let date = chrono::NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let candidate = Candidate { tags: vec![TagKind::DiskUsageDelete { percent: 90, date }], library: &library };
        let now = Utc.with_ymd_and_hms(2024, 1, 6, 0, 0, 0).unwrap();
        assert!(!should_delete_now(&candidate, 50, now));
    }

    #[test]
    fn no_applicable_tag_does_not_fire() {
        let library = library();
        let candidate = Candidate { tags: vec![], library: &library };
        let now = Utc.with_ymd_and_hms(2024, 1, 6, 0, 0, 0).unwrap();
        assert!(!should_delete_now(&candidate, 50, now));
    }
}
