//! Per-frequency summary accumulation.
//!
//! Accumulates max / mean / min per frequency bin across all rows of a
//! band. Fed in float32 space during the quantisation pass (not from the
//! int16 codes) so the summary keeps full resolution. The mean uses a
//! Welford-style running update to avoid accumulation error over long
//! captures.

/// Final per-frequency summary: three vectors of length `n_freqs`
///
/// **Public** - persisted as the summary archive and reused as tier level 0
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryTriple {
    pub max: Vec<f32>,
    pub avg: Vec<f32>,
    pub min: Vec<f32>,
}

impl SummaryTriple {
    pub fn n_freqs(&self) -> usize {
        self.max.len()
    }
}

/// Streaming accumulator for one band
#[derive(Debug, Clone)]
pub struct SummaryAccumulator {
    max: Vec<f32>,
    min: Vec<f32>,
    mean: Vec<f64>,
    rows: u64,
}

impl SummaryAccumulator {
    pub fn new(n_freqs: usize) -> Self {
        Self {
            max: vec![f32::NEG_INFINITY; n_freqs],
            min: vec![f32::INFINITY; n_freqs],
            mean: vec![0.0; n_freqs],
            rows: 0,
        }
    }

    /// Fold one row of power values into the accumulator
    pub fn accumulate_row(&mut self, row: &[f32]) {
        debug_assert_eq!(row.len(), self.max.len());
        self.rows += 1;
        let n = self.rows as f64;

        for (j, &db) in row.iter().enumerate() {
            if db > self.max[j] {
                self.max[j] = db;
            }
            if db < self.min[j] {
                self.min[j] = db;
            }
            // Welford running mean
            self.mean[j] += (db as f64 - self.mean[j]) / n;
        }
    }

    /// Number of rows folded so far
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Finish accumulation and produce the summary
    pub fn finish(self) -> SummaryTriple {
        SummaryTriple {
            max: self.max,
            avg: self.mean.into_iter().map(|m| m as f32).collect(),
            min: self.min,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_ordering_invariant() {
        let mut acc = SummaryAccumulator::new(4);
        acc.accumulate_row(&[-80.0, -70.0, -60.0, -50.0]);
        acc.accumulate_row(&[-82.0, -65.0, -61.0, -40.0]);
        acc.accumulate_row(&[-79.0, -72.0, -59.0, -45.0]);

        let summary = acc.finish();
        for j in 0..4 {
            assert!(summary.min[j] <= summary.avg[j]);
            assert!(summary.avg[j] <= summary.max[j]);
        }
    }

    #[test]
    fn test_welford_mean_matches_direct() {
        let rows: Vec<Vec<f32>> = (0..100).map(|i| vec![i as f32 - 50.0]).collect();
        let mut acc = SummaryAccumulator::new(1);
        for row in &rows {
            acc.accumulate_row(row);
        }
        let summary = acc.finish();

        let direct: f64 = rows.iter().map(|r| r[0] as f64).sum::<f64>() / rows.len() as f64;
        assert!((summary.avg[0] as f64 - direct).abs() < 1e-4);
    }

    #[test]
    fn test_single_row_collapses() {
        let mut acc = SummaryAccumulator::new(3);
        acc.accumulate_row(&[-10.0, -20.0, -30.0]);
        let summary = acc.finish();
        assert_eq!(summary.max, summary.min);
        assert_eq!(summary.max, summary.avg);
    }
}
