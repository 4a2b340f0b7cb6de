//! Peak detection over summary curves.
//!
//! A peak is a strict local maximum of the chosen curve inside the
//! requested frequency window. Optional filters: minimum height,
//! minimum topographic prominence (saddle depth measured outward until
//! a higher sample), and a minimum distance in bins (the lower of two
//! close peaks is dropped, ties broken by lower index).

use crate::query::dataset::{window_indices, BandDataset};
use serde::Serialize;
use std::str::FromStr;

/// Summary curve selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Curve {
    Max,
    Avg,
    Min,
}

impl FromStr for Curve {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "max" => Ok(Curve::Max),
            "avg" | "mean" => Ok(Curve::Avg),
            "min" => Ok(Curve::Min),
            other => Err(format!("unknown curve: {other}")),
        }
    }
}

/// One detected peak
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Peak {
    /// Peak frequency, hertz
    pub freq: f64,
    /// Curve value at the peak, dB
    pub value: f64,
    /// Topographic prominence, dB
    pub prominence: f64,
}

/// Detection filters
#[derive(Debug, Clone, Copy, Default)]
pub struct PeakParams {
    pub height: Option<f64>,
    pub prominence: Option<f64>,
    pub distance: Option<usize>,
    pub f0: Option<f64>,
    pub f1: Option<f64>,
}

/// Find peaks on a band's summary curve
///
/// **Public** - `detect_peaks` of the query surface
///
/// Output is sorted by ascending frequency. An empty or inverted window
/// yields an empty result.
pub fn detect_peaks(ds: &BandDataset, curve: Curve, params: &PeakParams) -> Vec<Peak> {
    if let (Some(f0), Some(f1)) = (params.f0, params.f1) {
        if f0 >= f1 {
            return Vec::new();
        }
    }

    let (lo, hi) = window_indices(ds.freqs(), params.f0, params.f1);
    if hi - lo < 3 {
        return Vec::new();
    }

    let y: Vec<f64> = ds.tier_curve(0, curve)[lo..hi]
        .iter()
        .map(|&v| v as f64)
        .collect();
    let freqs = &ds.freqs()[lo..hi];

    let mut candidates: Vec<(usize, f64)> = local_maxima(&y)
        .into_iter()
        .map(|i| (i, prominence_of(&y, i)))
        .collect();

    if let Some(height) = params.height {
        candidates.retain(|&(i, _)| y[i] >= height);
    }
    if let Some(min_prom) = params.prominence {
        candidates.retain(|&(_, prom)| prom >= min_prom);
    }
    if let Some(distance) = params.distance {
        candidates = thin_by_distance(&y, candidates, distance);
    }

    candidates.sort_by_key(|&(i, _)| i);
    candidates
        .into_iter()
        .map(|(i, prom)| Peak {
            freq: freqs[i],
            value: y[i],
            prominence: prom,
        })
        .collect()
}

/// Indices of strict local maxima (interior points only)
fn local_maxima(y: &[f64]) -> Vec<usize> {
    (1..y.len() - 1)
        .filter(|&i| y[i] > y[i - 1] && y[i] > y[i + 1])
        .collect()
}

/// Topographic prominence of the peak at `i`.
///
/// Walk outward on each side until a strictly higher sample or the
/// window edge, tracking the lowest point passed; the higher of the two
/// side minima is the peak's base.
fn prominence_of(y: &[f64], i: usize) -> f64 {
    let mut left_min = y[i];
    for j in (0..i).rev() {
        if y[j] > y[i] {
            break;
        }
        if y[j] < left_min {
            left_min = y[j];
        }
    }

    let mut right_min = y[i];
    for &v in &y[i + 1..] {
        if v > y[i] {
            break;
        }
        if v < right_min {
            right_min = v;
        }
    }

    y[i] - left_min.max(right_min)
}

/// Drop the lower of any two accepted peaks closer than `distance` bins
/// (ties broken by keeping the lower index)
fn thin_by_distance(
    y: &[f64],
    candidates: Vec<(usize, f64)>,
    distance: usize,
) -> Vec<(usize, f64)> {
    // Strongest first; equal heights keep the leftmost
    let mut by_height = candidates;
    by_height.sort_by(|&(ia, _), &(ib, _)| {
        y[ib]
            .partial_cmp(&y[ia])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(ia.cmp(&ib))
    });

    let mut kept: Vec<(usize, f64)> = Vec::new();
    for (i, prom) in by_height {
        if kept
            .iter()
            .all(|&(k, _)| i.abs_diff(k) >= distance.max(1))
        {
            kept.push((i, prom));
        }
    }
    kept
}
