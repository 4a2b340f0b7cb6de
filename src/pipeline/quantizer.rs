//! Power quantisation: reservoir sampling, percentile range, int16 codes.
//!
//! The dynamic range is taken from the 0.5th / 99.5th percentiles of the
//! observed power (widened by 2 dB on each end) rather than min/max, so a
//! single interference spike cannot collapse the usable range. Percentiles
//! are estimated from a bounded uniform sub-sample; they are exact when
//! the band is small enough to fit the reservoir.

use crate::utils::config::{
    CODE_MAX, RANGE_HI_PERCENTILE, RANGE_LO_PERCENTILE, RANGE_WIDEN_DB, RESERVOIR_CAP,
};
use log::debug;

/// Bounded uniform sub-sample of observed power values.
///
/// Admission is deterministic: every `stride`-th observed value is kept,
/// and when the reservoir fills, every other retained sample is dropped
/// and the stride doubles. Identical inputs always produce identical
/// reservoirs, which keeps the whole batch idempotent.
#[derive(Debug, Clone)]
pub struct Reservoir {
    samples: Vec<f32>,
    stride: u64,
    seen: u64,
    cap: usize,
}

impl Default for Reservoir {
    fn default() -> Self {
        Self::with_capacity(RESERVOIR_CAP)
    }
}

impl Reservoir {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            samples: Vec::new(),
            stride: 1,
            seen: 0,
            cap: cap.max(2),
        }
    }

    /// Observe one power value
    pub fn observe(&mut self, value: f32) {
        if self.seen % self.stride == 0 {
            self.samples.push(value);
            if self.samples.len() >= self.cap {
                // Decimate and admit half as often from here on
                let mut keep = 0;
                self.samples.retain(|_| {
                    keep += 1;
                    keep % 2 == 1
                });
                self.stride *= 2;
            }
        }
        self.seen += 1;
    }

    /// Observe a whole row of power values
    pub fn observe_row(&mut self, row: &[f32]) {
        for &value in row {
            self.observe(value);
        }
    }

    /// Number of retained samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Whether every observed value was retained (percentiles are exact)
    pub fn is_exact(&self) -> bool {
        self.stride == 1
    }

    fn sorted(&self) -> Vec<f32> {
        let mut sorted = self.samples.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        sorted
    }
}

/// Quantisation range and scale for one band.
///
/// Codes are non-negative: `q = clip(round((db - db_min) * scale), 0,
/// 32767)` with `scale = 32767 / (db_max - db_min)`, and the inverse is
/// `db = db_min + q / scale`. The worst-case round-trip error for an
/// in-range value is `(db_max - db_min) / 65534`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantRange {
    pub db_min: f64,
    pub db_max: f64,
    pub scale: f64,
}

impl QuantRange {
    /// Derive the range from percentile bounds, widened on each end
    pub fn from_bounds(p_lo: f64, p_hi: f64) -> Self {
        let db_min = p_lo - RANGE_WIDEN_DB;
        let db_max = p_hi + RANGE_WIDEN_DB;
        let scale = CODE_MAX as f64 / (db_max - db_min);
        Self {
            db_min,
            db_max,
            scale,
        }
    }

    /// Derive the range from a band's power reservoir
    ///
    /// **Public** - called once per band, after its last record
    pub fn from_reservoir(reservoir: &Reservoir) -> Self {
        let sorted = reservoir.sorted();
        let p_lo = percentile(&sorted, RANGE_LO_PERCENTILE);
        let p_hi = percentile(&sorted, RANGE_HI_PERCENTILE);
        debug!(
            "Quantisation range: p{RANGE_LO_PERCENTILE}={p_lo:.2} dB, \
             p{RANGE_HI_PERCENTILE}={p_hi:.2} dB ({} samples, exact={})",
            sorted.len(),
            reservoir.is_exact()
        );
        Self::from_bounds(p_lo, p_hi)
    }

    /// Map a dB value to its int16 code
    pub fn quantize(&self, db: f32) -> i16 {
        let code = ((db as f64 - self.db_min) * self.scale).round();
        code.clamp(0.0, CODE_MAX as f64) as i16
    }

    /// Map an int16 code back to dB
    pub fn dequantize(&self, code: i16) -> f64 {
        self.db_min + code as f64 / self.scale
    }

    /// Map a code-space mean back to dB (the mapping is affine, so the
    /// mean of codes dequantises to the mean of powers)
    pub fn dequantize_mean(&self, mean_code: f64) -> f64 {
        self.db_min + mean_code / self.scale
    }
}

/// Linear-interpolated percentile over a sorted sample, `q` in percent
///
/// **Public** - also used by tests to cross-check range selection
pub fn percentile(sorted: &[f32], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0] as f64;
    }

    let rank = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] as f64 * (1.0 - frac) + sorted[hi] as f64 * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reservoir_exact_below_cap() {
        let mut reservoir = Reservoir::with_capacity(1000);
        for i in 0..500 {
            reservoir.observe(i as f32);
        }
        assert_eq!(reservoir.len(), 500);
        assert!(reservoir.is_exact());
    }

    #[test]
    fn test_reservoir_bounded_and_deterministic() {
        let run = || {
            let mut reservoir = Reservoir::with_capacity(64);
            for i in 0..10_000 {
                reservoir.observe((i % 97) as f32);
            }
            reservoir.samples
        };
        let a = run();
        let b = run();
        assert!(a.len() < 64);
        assert_eq!(a, b);
    }

    #[test]
    fn test_percentile_interpolates() {
        let sorted: Vec<f32> = (0..=100).map(|i| i as f32).collect();
        assert_eq!(percentile(&sorted, 0.0), 0.0);
        assert_eq!(percentile(&sorted, 100.0), 100.0);
        assert!((percentile(&sorted, 50.0) - 50.0).abs() < 1e-9);
        assert!((percentile(&sorted, 99.5) - 99.5).abs() < 1e-9);
    }

    #[test]
    fn test_range_widening() {
        let range = QuantRange::from_bounds(-120.0, -20.0);
        assert_eq!(range.db_min, -122.0);
        assert_eq!(range.db_max, -18.0);
        assert!((range.scale - 32767.0 / 104.0).abs() < 1e-9);
    }

    #[test]
    fn test_quantize_roundtrip_bound() {
        let range = QuantRange::from_bounds(-120.0, -20.0);
        let bound = (range.db_max - range.db_min) / 65534.0;
        let mut db = range.db_min;
        while db <= range.db_max {
            let back = range.dequantize(range.quantize(db as f32));
            assert!(
                (back - db).abs() <= bound + 1e-4,
                "roundtrip error at {db} dB"
            );
            db += 0.37;
        }
    }

    #[test]
    fn test_quantize_clips_outliers() {
        let range = QuantRange::from_bounds(-120.0, -20.0);
        assert_eq!(range.quantize(200.0), CODE_MAX as i16);
        assert_eq!(range.quantize(-500.0), 0);
    }

    #[test]
    fn test_outlier_does_not_stretch_range() {
        let mut reservoir = Reservoir::with_capacity(RESERVOIR_CAP);
        for _ in 0..10_000 {
            reservoir.observe(-80.0);
        }
        reservoir.observe(200.0);

        let range = QuantRange::from_reservoir(&reservoir);
        // Widening keeps db_max within 10 dB of the 99.5th percentile
        assert!(range.db_max < -70.0);
    }
}
