use std::path::Path;

use log::warn;

/// Samples current disk usage as a percentage for a set of filesystem paths
/// (a library's configured folders) and returns the maximum — the decider
/// cares about the fullest volume backing the library, not the average.
pub fn sample_usage_percent(paths: &[String]) -> u32 {
    paths
        .iter()
        .filter_map(|p| usage_percent(Path::new(p)))
        .max()
        .unwrap_or(0)
}

fn usage_percent(path: &Path) -> Option<u32> {
    let total = fs2::total_space(path).ok()?;
    if total == 0 {
        return None;
    }
    let free = fs2::free_space(path).ok()?;
    let used = total.saturating_sub(free);
    Some(((used as f64 / total as f64) * 100.0).round() as u32)
}

pub fn log_if_unreadable(paths: &[String]) {
    for p in paths {
        if fs2::total_space(Path::new(p)).is_err() {
            warn!("could not read disk usage for {p}");
        }
    }
}
