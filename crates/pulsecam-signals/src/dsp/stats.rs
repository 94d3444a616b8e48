//! Small statistics helpers shared by the filter, peak and quality stages.
//!
//! All helpers return 0.0 for empty input instead of NaN.

use ndarray::ArrayView1;

pub fn mean(values: &[f32]) -> f32 {
    ArrayView1::from(values).mean().unwrap_or(0.0)
}

/// Population variance
pub fn variance(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    ArrayView1::from(values).var(0.0).max(0.0)
}

/// Coefficient of variation; 0 when the mean is ~0
pub fn coefficient_of_variation(values: &[f32]) -> f32 {
    let m = mean(values);
    if m.abs() <= f32::EPSILON {
        return 0.0;
    }
    variance(values).sqrt() / m.abs()
}

pub fn median(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// First differences `x[i+1] - x[i]`
pub fn diff(values: &[f32]) -> Vec<f32> {
    values.windows(2).map(|w| w[1] - w[0]).collect()
}

/// (min, max) of a slice; (0, 0) when empty
pub fn min_max<'a, I>(values: I) -> (f32, f32)
where
    I: IntoIterator<Item = &'a f32>,
{
    let mut iter = values.into_iter();
    let Some(&first) = iter.next() else {
        return (0.0, 0.0);
    };
    iter.fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}
