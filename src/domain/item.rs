use chrono::{DateTime, Utc};

use super::media_ref::MediaRef;
use super::tag::TagKind;

/// One row of the library-keyed inventory the merger produces for a cleanup
/// run. Lives only for the duration of that run.
#[derive(Debug, Clone)]
pub struct MediaItem {
    pub media_ref: MediaRef,
    pub jellyfin_id: String,
    pub library: String,
    pub title: String,
    pub year: Option<i32>,
    pub tmdb_id: Option<String>,
    pub tvdb_id: Option<String>,
    pub tags: Vec<String>,
    pub tag_ids: Vec<u64>,
    pub size_on_disk: u64,
    pub poster_url: Option<String>,
    pub first_imported_at: Option<DateTime<Utc>>,
    pub requested_by: Option<String>,
    pub requested_at: Option<DateTime<Utc>>,
    /// episodes-with-files (series) or `has_file` as 0/1 (movies); used by the
    /// keep-criteria filter.
    pub episodes_with_files: u32,
    pub seasons_with_files: u32,
}

impl MediaItem {
    pub fn jellysweep_tags(&self) -> impl Iterator<Item = TagKind> + '_ {
        self.tags.iter().filter_map(|t| TagKind::parse(t))
    }

    pub fn has_tag(&self, label: &str) -> bool {
        self.tags.iter().any(|t| t == label)
    }
}
