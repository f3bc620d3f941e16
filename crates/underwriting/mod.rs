pub mod benchmarks;
pub mod cim;
pub mod deal_score;
pub mod financing;
pub mod hostname;
pub mod projection;

/// `a / b` when both are finite and `b` is non-zero.
pub fn safe_div(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) if a.is_finite() && b.is_finite() && b != 0.0 => Some(a / b),
        _ => None,
    }
}

pub fn clamp(value: f64, min: f64, max: f64) -> f64 {
    value.max(min).min(max)
}
