//! Field comparison norms.

use heat_types::error::{HeatError, HeatResult};
use ndarray::{Array2, Zip};

/// Euclidean distance between two fields of the same shape.
///
/// Differences are squared and summed in logical (row-major) order.
pub fn l2_norm_delta(a: &Array2<f64>, b: &Array2<f64>) -> HeatResult<f64> {
    check_pair(a, b, "l2_norm_delta")?;
    let sum_sq = Zip::from(a)
        .and(b)
        .fold(0.0f64, |acc, &x, &y| acc + (x - y) * (x - y));
    Ok(sum_sq.sqrt())
}

/// Largest pointwise `|a - b|`; `0.0` for empty fields.
pub fn max_abs_delta(a: &Array2<f64>, b: &Array2<f64>) -> HeatResult<f64> {
    check_pair(a, b, "max_abs_delta")?;
    Ok(Zip::from(a)
        .and(b)
        .fold(0.0f64, |acc, &x, &y| acc.max((x - y).abs())))
}

fn check_pair(a: &Array2<f64>, b: &Array2<f64>, what: &str) -> HeatResult<()> {
    if a.dim() != b.dim() {
        return Err(HeatError::GeometryViolation(format!(
            "{what} shape mismatch {:?} vs {:?}",
            a.dim(),
            b.dim()
        )));
    }
    if a.iter().any(|v| !v.is_finite()) || b.iter().any(|v| !v.is_finite()) {
        return Err(HeatError::GeometryViolation(format!(
            "{what} inputs must be finite"
        )));
    }
    Ok(())
}
