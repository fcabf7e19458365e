//! Nearest-rank percentile estimation.

/// Percentile `p` (0-100) of `values` using nearest rank without interpolation.
///
/// The values are sorted ascending and the element at `floor(p/100 * n)` is
/// returned, clamped to the last index. An empty set yields `0.0`.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = ((p / 100.0) * sorted.len() as f64).floor();
    // `as usize` saturates negative and NaN ranks to 0.
    let idx = (rank as usize).min(sorted.len() - 1);
    sorted[idx]
}

/// 95th percentile.
pub fn p95(values: &[f64]) -> f64 {
    percentile(values, 95.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_set_is_zero() {
        assert_eq!(p95(&[]), 0.0);
    }

    #[test]
    fn single_sample_is_itself() {
        assert_eq!(p95(&[42.5]), 42.5);
    }

    #[test]
    fn nearest_rank_without_interpolation() {
        let values: Vec<f64> = (1..=20).map(f64::from).collect();
        // floor(0.95 * 20) = 19 -> last element
        assert_eq!(p95(&values), 20.0);
        // floor(0.5 * 20) = 10 -> 11th smallest
        assert_eq!(percentile(&values, 50.0), 11.0);
        assert_eq!(percentile(&values, 0.0), 1.0);
        assert_eq!(percentile(&values, 100.0), 20.0);
    }

    #[test]
    fn input_order_does_not_matter() {
        let values = [9.0, 1.0, 5.0, 3.0, 7.0];
        assert_eq!(percentile(&values, 40.0), 5.0);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: the percentile is always one of the observed samples.
        #[test]
        fn percentile_is_a_member(
            values in prop::collection::vec(0.0f64..10_000.0, 1..200),
            p in 0.0f64..=100.0,
        ) {
            let v = percentile(&values, p);
            prop_assert!(values.contains(&v));
        }

        /// Property: raising p never lowers the result.
        #[test]
        fn percentile_is_monotonic_in_p(
            values in prop::collection::vec(0.0f64..10_000.0, 1..200),
            a in 0.0f64..=100.0,
            b in 0.0f64..=100.0,
        ) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(percentile(&values, lo) <= percentile(&values, hi));
        }
    }
}
