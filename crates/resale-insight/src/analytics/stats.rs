//! Small-sample order statistics used by the structured aggregator.

use serde::Serialize;

/// Percentile with linear interpolation between closest ranks (`rank = p * (n - 1)`),
/// the `PERCENTILE_CONT` definition. `sorted` must be ascending.
///
/// Returns `None` for an empty sample; a single value is every percentile.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() || !(0.0..=1.0).contains(&p) {
        return None;
    }

    let rank = p * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;

    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Quartiles of a non-empty price sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceBand {
    pub p25: f64,
    pub median: f64,
    pub p75: f64,
}

impl PriceBand {
    pub fn from_unsorted(mut prices: Vec<f64>) -> Option<Self> {
        prices.sort_by(f64::total_cmp);
        Some(Self {
            p25: percentile(&prices, 0.25)?,
            median: percentile(&prices, 0.5)?,
            p75: percentile(&prices, 0.75)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sample_has_no_percentiles() {
        assert_eq!(percentile(&[], 0.5), None);
        assert_eq!(mean(&[]), None);
        assert_eq!(PriceBand::from_unsorted(Vec::new()), None);
    }

    #[test]
    fn single_value_is_every_percentile() {
        let band = PriceBand::from_unsorted(vec![420_000.0]).expect("one value");
        assert_eq!(band.p25, 420_000.0);
        assert_eq!(band.median, 420_000.0);
        assert_eq!(band.p75, 420_000.0);
    }

    #[test]
    fn interpolates_between_order_statistics() {
        let band = PriceBand::from_unsorted(vec![400.0, 100.0, 300.0, 200.0]).expect("values");
        assert_eq!(band.p25, 175.0);
        assert_eq!(band.median, 250.0);
        assert_eq!(band.p75, 325.0);
    }

    #[test]
    fn two_values_split_evenly() {
        let band = PriceBand::from_unsorted(vec![820_000.0, 800_000.0]).expect("values");
        assert_eq!(band.p25, 805_000.0);
        assert_eq!(band.median, 810_000.0);
        assert_eq!(band.p75, 815_000.0);
    }
}
