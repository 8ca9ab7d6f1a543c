//! Shared utility functions.

/// Fold one more sample into a running mean.
///
/// `count` is the number of samples already folded into `mean`. Metrics in
/// agent-forge are always maintained this way, never recomputed over history.
pub fn running_average(mean: f64, count: u64, sample: f64) -> f64 {
    if count == 0 {
        return sample;
    }
    mean + (sample - mean) / (count as f64 + 1.0)
}

/// Truncate a string for log and event payloads without splitting a UTF-8
/// character. Appends `...` when anything was cut.
pub fn truncate_for_log(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}
