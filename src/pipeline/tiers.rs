//! Multi-resolution frequency tier pyramid.
//!
//! Level 0 is the full-resolution summary reinterpreted as
//! (min, max, mean) triples. Each coarser level aggregates contiguous
//! bin pairs: min of mins, max of maxes, mean of means (bins are
//! equal-width, so the arithmetic mean is correct). An unpaired last bin
//! copies through. The pyramid ends at the first level with at most 256
//! bins; the viewer picks the coarsest level that still covers its zoom
//! span at the requested point density.

use crate::pipeline::summary::SummaryTriple;
use crate::utils::config::TIER_FLOOR_BINS;
use log::debug;
use serde::{Deserialize, Serialize};

/// One pyramid level: three vectors of `n_bins` entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierLevel {
    pub n_bins: usize,
    pub min: Vec<f32>,
    pub max: Vec<f32>,
    pub mean: Vec<f32>,
}

/// The full pyramid, level 0 first
#[derive(Debug, Clone, PartialEq)]
pub struct TierPyramid {
    pub levels: Vec<TierLevel>,
}

impl TierPyramid {
    /// Bin counts per level, finest first (mirrored into the manifest)
    pub fn bin_counts(&self) -> Vec<usize> {
        self.levels.iter().map(|l| l.n_bins).collect()
    }
}

/// Build the pyramid from a band's final summary
///
/// **Public** - runs after the summary is sealed
pub fn build_pyramid(summary: &SummaryTriple) -> TierPyramid {
    let mut levels = vec![TierLevel {
        n_bins: summary.n_freqs(),
        min: summary.min.clone(),
        max: summary.max.clone(),
        mean: summary.avg.clone(),
    }];

    while levels.last().map(|l| l.n_bins).unwrap_or(0) > TIER_FLOOR_BINS {
        let next = coarsen(levels.last().unwrap());
        levels.push(next);
    }

    debug!(
        "Built {} tier level(s): {:?}",
        levels.len(),
        levels.iter().map(|l| l.n_bins).collect::<Vec<_>>()
    );

    TierPyramid { levels }
}

/// Derive level k+1 from level k by pairwise aggregation
fn coarsen(level: &TierLevel) -> TierLevel {
    let n_out = level.n_bins.div_ceil(2);
    let mut min = Vec::with_capacity(n_out);
    let mut max = Vec::with_capacity(n_out);
    let mut mean = Vec::with_capacity(n_out);

    for j in 0..n_out {
        let a = 2 * j;
        let b = 2 * j + 1;
        if b < level.n_bins {
            min.push(level.min[a].min(level.min[b]));
            max.push(level.max[a].max(level.max[b]));
            mean.push((level.mean[a] + level.mean[b]) / 2.0);
        } else {
            // Unpaired last bin copies through
            min.push(level.min[a]);
            max.push(level.max[a]);
            mean.push(level.mean[a]);
        }
    }

    TierLevel {
        n_bins: n_out,
        min,
        max,
        mean,
    }
}

/// Frequency axis of a level with `n_bins` bins over `[f_start, f_stop]`.
///
/// Matches the level-0 convention: bin 0 sits at `f_start`, the last bin
/// at `f_stop`, evenly spaced between. The axis is linear, so it is
/// shared across levels and never persisted per level.
pub fn level_axis(f_start: f64, f_stop: f64, n_bins: usize) -> Vec<f64> {
    crate::decoder::record::linspace(f_start, f_stop, n_bins)
}
