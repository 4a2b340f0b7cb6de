//! Sealed-band dataset handle and summary windowing.
//!
//! `BandDataset` maps a band's artifacts read-only and exposes slicing
//! helpers. Bands are discovered by manifest presence: the manifest is
//! written last, so a listed band is always complete.

use crate::pipeline::summary::SummaryTriple;
use crate::query::peaks::Curve;
use crate::store::{self, artifacts, manifest, BandManifest, TiersDoc};
use crate::utils::error::{ArtifactError, QueryError};
use log::debug;
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;

/// Lightweight band listing entry
#[derive(Debug, Clone)]
pub struct BandInfo {
    pub id: usize,
    pub manifest: BandManifest,
}

/// List sealed bands in a data directory, ascending by id
///
/// **Public** - `list_bands` of the query surface
pub fn list_bands(dir: &Path) -> Result<Vec<BandInfo>, QueryError> {
    let mut bands = Vec::new();

    for entry in std::fs::read_dir(dir).map_err(|e| ArtifactError::Io {
        path: dir.to_path_buf(),
        source: e,
    })? {
        let entry = entry.map_err(|e| ArtifactError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let name = entry.file_name();
        let Some(id) = parse_band_id(&name.to_string_lossy()) else {
            continue;
        };
        let manifest = manifest::read_manifest(&entry.path())?;
        bands.push(BandInfo { id, manifest });
    }

    bands.sort_by_key(|b| b.id);
    Ok(bands)
}

/// Extract N from `meta_bandN.json`
fn parse_band_id(name: &str) -> Option<usize> {
    name.strip_prefix("meta_band")?
        .strip_suffix(".json")?
        .parse()
        .ok()
}

/// A summary window: parallel arrays, at most `max_pts` entries each
#[derive(Debug, Clone, serde::Serialize)]
pub struct SummaryWindow {
    pub freqs: Vec<f64>,
    pub max: Vec<f32>,
    pub avg: Vec<f32>,
    pub min: Vec<f32>,
}

impl SummaryWindow {
    fn empty() -> Self {
        Self {
            freqs: Vec::new(),
            max: Vec::new(),
            avg: Vec::new(),
            min: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.freqs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.freqs.is_empty()
    }
}

/// Read-only handle over one sealed band
#[derive(Debug)]
pub struct BandDataset {
    pub index: usize,
    pub manifest: BandManifest,
    freqs: Vec<f64>,
    rel_t: Vec<i64>,
    summary: SummaryTriple,
    tiers: TiersDoc,
    waterfall: Mmap,
}

impl BandDataset {
    /// Map a sealed band's artifacts
    ///
    /// # Errors
    /// * `QueryError::NotFound` - no manifest for this band id
    /// * `QueryError::Artifact` - unreadable or inconsistent artifacts
    pub fn open(dir: &Path, index: usize) -> Result<Self, QueryError> {
        let meta = store::meta_path(dir, index);
        if !meta.exists() {
            return Err(QueryError::NotFound(index));
        }
        let manifest = manifest::read_manifest(&meta)?;

        let freqs = artifacts::read_f64_vec(&store::freqs_path(dir, index))?;
        let rel_t = artifacts::read_i64_vec(&store::rel_t_path(dir, index))?;
        let summary = artifacts::read_summary(&store::summary_path(dir, index))?;
        let tiers = manifest::read_tiers(&store::tiers_path(dir, index))?;

        let wf_path = store::waterfall_path(dir, index);
        let file = File::open(&wf_path).map_err(|e| ArtifactError::Io {
            path: wf_path.clone(),
            source: e,
        })?;
        // Safety: sealed artifacts are immutable once the manifest exists
        let waterfall = unsafe {
            Mmap::map(&file).map_err(|e| ArtifactError::Io {
                path: wf_path.clone(),
                source: e,
            })?
        };

        let expected = 2 * manifest.n_traces * manifest.n_freqs;
        if waterfall.len() != expected
            || freqs.len() != manifest.n_freqs
            || rel_t.len() != manifest.n_traces
            || summary.n_freqs() != manifest.n_freqs
        {
            return Err(QueryError::Artifact(ArtifactError::Corrupt {
                path: wf_path,
                reason: format!(
                    "artifact shapes disagree with manifest ({} x {})",
                    manifest.n_traces, manifest.n_freqs
                ),
            }));
        }

        debug!(
            "Opened band {index}: {} x {}, {} tier level(s)",
            manifest.n_traces,
            manifest.n_freqs,
            tiers.levels.len()
        );

        Ok(Self {
            index,
            manifest,
            freqs,
            rel_t,
            summary,
            tiers,
            waterfall,
        })
    }

    /// Canonical frequency axis, hertz
    pub fn freqs(&self) -> &[f64] {
        &self.freqs
    }

    /// Relative row times, seconds from `unix0`, non-decreasing
    pub fn rel_t(&self) -> &[i64] {
        &self.rel_t
    }

    /// One summary curve of a tier level.
    ///
    /// Level 0 comes from the full-resolution summary archive; coarser
    /// levels from the persisted pyramid.
    pub(crate) fn tier_curve(&self, level: usize, curve: Curve) -> &[f32] {
        if level == 0 {
            return match curve {
                Curve::Max => &self.summary.max,
                Curve::Avg => &self.summary.avg,
                Curve::Min => &self.summary.min,
            };
        }
        let tier = &self.tiers.levels[level];
        match curve {
            Curve::Max => &tier.max,
            Curve::Avg => &tier.mean,
            Curve::Min => &tier.min,
        }
    }

    /// Raw int16 code at (row, col) of the waterfall store
    pub(crate) fn code_at(&self, row: usize, col: usize) -> i16 {
        let offset = (row * self.manifest.n_freqs + col) * 2;
        i16::from_le_bytes([self.waterfall[offset], self.waterfall[offset + 1]])
    }

    /// Frequency axis of a tier level (level 0 is the canonical axis)
    fn tier_axis(&self, level: usize) -> Vec<f64> {
        if level == 0 {
            self.freqs.clone()
        } else {
            crate::pipeline::tiers::level_axis(
                self.manifest.f_start,
                self.manifest.f_stop,
                self.tiers.levels[level].n_bins,
            )
        }
    }

    /// Summary window: trim to `[f0, f1]`, serve from the coarsest tier
    /// that still has `max_pts` bins in the window, decimate to the cap.
    ///
    /// **Public** - `get_summary` of the query surface
    ///
    /// Degenerate windows (`f0 >= f1`, or fully outside the axis)
    /// produce an empty, well-formed response.
    pub fn summary(&self, f0: Option<f64>, f1: Option<f64>, max_pts: usize) -> SummaryWindow {
        if max_pts == 0 {
            return SummaryWindow::empty();
        }
        if let (Some(lo), Some(hi)) = (f0, f1) {
            if lo >= hi {
                return SummaryWindow::empty();
            }
        }

        // Coarsest level whose in-window bin count still reaches the cap
        let mut chosen = 0;
        let mut window = window_indices(&self.freqs, f0, f1);
        for level in (1..self.tiers.levels.len()).rev() {
            let axis = self.tier_axis(level);
            let (lo, hi) = window_indices(&axis, f0, f1);
            if hi - lo >= max_pts {
                chosen = level;
                window = (lo, hi);
                break;
            }
        }

        let axis = self.tier_axis(chosen);
        let (lo, hi) = window;
        if lo >= hi {
            return SummaryWindow::empty();
        }

        let take = |curve: Curve| self.tier_curve(chosen, curve)[lo..hi].to_vec();
        let mut out = SummaryWindow {
            freqs: axis[lo..hi].to_vec(),
            max: take(Curve::Max),
            avg: take(Curve::Avg),
            min: take(Curve::Min),
        };

        if out.len() > max_pts {
            out = decimate(out, max_pts);
        }
        out
    }
}

/// Half-open index window of `axis` covering `[f0, f1]`
///
/// `None` bounds clamp to the axis ends; the result keeps only entries
/// with `f0 <= axis[i] <= f1`.
pub(crate) fn window_indices(axis: &[f64], f0: Option<f64>, f1: Option<f64>) -> (usize, usize) {
    let lo = match f0 {
        Some(f0) => axis.partition_point(|&f| f < f0),
        None => 0,
    };
    let hi = match f1 {
        Some(f1) => axis.partition_point(|&f| f <= f1),
        None => axis.len(),
    };
    (lo, hi.max(lo))
}

/// Stride-decimate a window to exactly `max_pts` entries
fn decimate(window: SummaryWindow, max_pts: usize) -> SummaryWindow {
    let len = window.len();
    let pick: Vec<usize> = (0..max_pts).map(|j| j * len / max_pts).collect();

    let sel_f = |src: &[f64]| pick.iter().map(|&i| src[i]).collect::<Vec<_>>();
    let sel = |src: &[f32]| pick.iter().map(|&i| src[i]).collect::<Vec<_>>();

    SummaryWindow {
        freqs: sel_f(&window.freqs),
        max: sel(&window.max),
        avg: sel(&window.avg),
        min: sel(&window.min),
    }
}
