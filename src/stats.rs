//! Numeric helpers shared by the aggregators
//!
//! Percentiles use linear interpolation between the two closest ranks, the
//! same definition most plotting stacks default to. Sorting is stable, so
//! equal samples keep their input order.

/// Samples needed before a percentile is reported
pub const MIN_PERCENTILE_SAMPLES: usize = 2;

/// Series shorter than this are never smoothed
pub const SMOOTHING_MIN_LEN: usize = 10;

/// Gaussian kernels are cut off at this many standard deviations
const GAUSSIAN_TRUNCATE: f64 = 4.0;

/// Linear-interpolation percentile of `samples`, `pct` in `[0, 100]`.
///
/// Returns `None` when fewer than [`MIN_PERCENTILE_SAMPLES`] samples are
/// given or `pct` is out of range.
///
/// ```
/// use flash_dt::stats::percentile;
///
/// assert_eq!(percentile(&[1.0, 2.0, 3.0, 4.0], 50.0), Some(2.5));
/// assert_eq!(percentile(&[7.0], 95.0), None);
/// ```
pub fn percentile(samples: &[f64], pct: f64) -> Option<f64> {
    if samples.len() < MIN_PERCENTILE_SAMPLES || !(0.0..=100.0).contains(&pct) {
        return None;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);
    Some(percentile_of_sorted(&sorted, pct))
}

/// Median under the same rules as [`percentile`]
pub fn median(samples: &[f64]) -> Option<f64> {
    percentile(samples, 50.0)
}

/// Percentile of an already sorted, non-empty slice
pub(crate) fn percentile_of_sorted(sorted: &[f64], pct: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let weight = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * weight
}

/// Median of a sorted, non-empty slice; a single value is its own median.
pub(crate) fn median_of_sorted(sorted: &[f64]) -> f64 {
    percentile_of_sorted(sorted, 50.0)
}

/// Arithmetic mean; `None` for an empty slice
pub fn mean(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        None
    } else {
        Some(samples.iter().sum::<f64>() / samples.len() as f64)
    }
}

/// Equal-width binning of `values` over their own `[min, max]` range.
///
/// Returns the bin edges and the bin index of every value. The maximum lands
/// in the last bin. When all values are equal the range has zero width and a
/// single bin `[v, v]` holds everything. `None` for no values, no bins or a
/// non-finite value.
///
/// ```
/// use flash_dt::stats::equal_width_bins;
///
/// let (edges, index) = equal_width_bins(&[0.0, 1.0, 4.0], 2).unwrap();
/// assert_eq!(edges, vec![0.0, 2.0, 4.0]);
/// assert_eq!(index, vec![0, 0, 1]);
/// ```
pub fn equal_width_bins(values: &[f64], bins: usize) -> Option<(Vec<f64>, Vec<usize>)> {
    if bins == 0 || values.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let min = values.iter().copied().reduce(f64::min)?;
    let max = values.iter().copied().reduce(f64::max)?;
    if max == min {
        return Some((vec![min, max], vec![0; values.len()]));
    }

    let width = (max - min) / bins as f64;
    let mut edges: Vec<f64> = (0..bins).map(|i| min + i as f64 * width).collect();
    edges.push(max);
    let index = values
        .iter()
        .map(|v| (((v - min) / width).floor() as usize).min(bins - 1))
        .collect();
    Some((edges, index))
}

/// One-dimensional Gaussian filter with reflected boundaries.
///
/// The kernel radius is `round(4 * sigma)`; samples past either end are
/// mirrored (`d c b a | a b c d | d c b a`).
pub fn gaussian_smooth(values: &[f64], sigma: f64) -> Vec<f64> {
    if values.is_empty() || !(sigma.is_finite() && sigma > 0.0) {
        return values.to_vec();
    }
    let radius = (GAUSSIAN_TRUNCATE * sigma + 0.5) as isize;
    let mut kernel: Vec<f64> = (-radius..=radius)
        .map(|i| (-0.5 * (i as f64 / sigma).powi(2)).exp())
        .collect();
    let total: f64 = kernel.iter().sum();
    kernel.iter_mut().for_each(|w| *w /= total);

    let len = values.len() as isize;
    (0..len)
        .map(|center| {
            kernel
                .iter()
                .zip(-radius..=radius)
                .map(|(w, offset)| w * values[reflect(center + offset, len)])
                .sum()
        })
        .collect()
}

fn reflect(mut idx: isize, len: isize) -> usize {
    let period = 2 * len;
    idx = idx.rem_euclid(period);
    if idx >= len {
        idx = period - 1 - idx;
    }
    idx as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_percentile_interpolates() {
        let samples = [10.0, 20.0, 30.0, 40.0, 50.0];
        assert_eq!(percentile(&samples, 0.0), Some(10.0));
        assert_eq!(percentile(&samples, 100.0), Some(50.0));
        assert_eq!(percentile(&samples, 50.0), Some(30.0));
        assert!(close(percentile(&samples, 95.0).unwrap(), 48.0));
        assert!(close(percentile(&samples, 10.0).unwrap(), 14.0));
    }

    #[test]
    fn test_percentile_unsorted_input() {
        let samples = [50.0, 10.0, 40.0, 20.0, 30.0];
        assert!(close(percentile(&samples, 95.0).unwrap(), 48.0));
    }

    #[test]
    fn test_percentile_insufficient() {
        assert_eq!(percentile(&[], 95.0), None);
        assert_eq!(percentile(&[1.0], 95.0), None);
        assert_eq!(percentile(&[1.0, 2.0], 101.0), None);
        assert_eq!(median(&[3.0]), None);
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median_of_sorted(&[9.0]), 9.0);
    }

    #[test]
    fn test_peak_not_below_median() {
        let samples: Vec<f64> = (0..97).map(|i| ((i * 37) % 101) as f64).collect();
        let p95 = percentile(&samples, 95.0).unwrap();
        let p50 = median(&samples).unwrap();
        assert!(p95 >= p50);
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[4.0]), Some(4.0));
        assert_eq!(mean(&[1.0, 2.0, 6.0]), Some(3.0));
    }

    #[test]
    fn test_equal_width_bins() {
        let (edges, index) = equal_width_bins(&[10.0, 25.0, 40.0, 39.9, 19.9], 3).unwrap();
        assert_eq!(edges, vec![10.0, 20.0, 30.0, 40.0]);
        assert_eq!(index, vec![0, 1, 2, 2, 0]);
    }

    #[test]
    fn test_equal_width_bins_single_value_range() {
        let (edges, index) = equal_width_bins(&[7.0, 7.0, 7.0], 15).unwrap();
        assert_eq!(edges, vec![7.0, 7.0]);
        assert_eq!(index, vec![0, 0, 0]);
    }

    #[test]
    fn test_equal_width_bins_degenerate_input() {
        assert!(equal_width_bins(&[], 15).is_none());
        assert!(equal_width_bins(&[1.0, 2.0], 0).is_none());
        assert!(equal_width_bins(&[1.0, f64::INFINITY], 4).is_none());
    }

    #[test]
    fn test_gaussian_preserves_constant() {
        let values = vec![5.0; 12];
        for v in gaussian_smooth(&values, 2.0) {
            assert!(close(v, 5.0));
        }
    }

    #[test]
    fn test_gaussian_spreads_spike_symmetrically() {
        let mut values = vec![0.0; 21];
        values[10] = 1.0;
        let smoothed = gaussian_smooth(&values, 2.0);
        assert!(smoothed[10] < 1.0);
        assert!(close(smoothed[9], smoothed[11]));
        assert!(close(smoothed.iter().sum::<f64>(), 1.0));
    }

    #[test]
    fn test_reflect() {
        assert_eq!(reflect(-1, 4), 0);
        assert_eq!(reflect(-2, 4), 1);
        assert_eq!(reflect(4, 4), 3);
        assert_eq!(reflect(5, 4), 2);
        assert_eq!(reflect(2, 4), 2);
    }
}
