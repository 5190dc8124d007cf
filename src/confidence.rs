//! Confidence aggregation

/// Arithmetic mean of per-detection confidences (0-100 scale).
///
/// Returns `None` when there are no confidences, which callers render as
/// "not available" rather than zero.
pub fn aggregate(confidences: &[f32]) -> Option<f32> {
    if confidences.is_empty() {
        return None;
    }
    let sum: f64 = confidences.iter().map(|&c| f64::from(c)).sum();
    Some((sum / confidences.len() as f64) as f32)
}

/// Render an aggregate for display, e.g. `90.00%`
pub fn format_confidence(aggregate: Option<f32>) -> String {
    match aggregate {
        Some(value) => format!("{:.2}%", value),
        None => "Not Available".to_string(),
    }
}
