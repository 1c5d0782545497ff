use crate::model::LogEntry;

/// Compute summary metrics (mean, median, 25th percentile, 75th percentile) from samples
pub fn compute_metrics(samples: &[f64]) -> Option<(f64, f64, f64, f64)> {
    if samples.is_empty() {
        return None;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    let mean = samples.iter().sum::<f64>() / n as f64;
    let median = sorted[n / 2];
    let p25 = sorted[n / 4];
    let p75 = sorted[3 * n / 4];
    Some((mean, median, p25, p75))
}

/// Stage durations in milliseconds, taken from terminal entries.
pub fn stage_durations_ms<'a>(
    entries: impl IntoIterator<Item = &'a LogEntry>,
) -> Vec<f64> {
    entries
        .into_iter()
        .filter(|e| e.is_terminal())
        .filter_map(|e| e.duration_ms)
        .map(|ms| ms as f64)
        .collect()
}
