//! Band manifest and tier document emitters.
//!
//! The manifest is the last artifact written for a band (temp file then
//! rename), so a band listed by `meta_band*.json` presence is guaranteed
//! to be fully sealed.

use crate::pipeline::tiers::{TierLevel, TierPyramid};
use crate::utils::error::ArtifactError;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Sealed-band metadata
///
/// **Public** - the artifact contract with the viewer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandManifest {
    /// Bottom of the quantisation range, dB
    pub db_min: f64,

    /// Top of the quantisation range, dB
    pub db_max: f64,

    /// int16 codes per dB
    pub scale: f64,

    /// Number of rows in the waterfall store
    pub n_traces: usize,

    /// Number of frequency bins per row
    pub n_freqs: usize,

    /// First canonical frequency, hertz
    pub f_start: f64,

    /// Last canonical frequency, hertz
    pub f_stop: f64,

    /// Timestamp of the earliest trace, unix seconds
    pub unix0: f64,

    /// Bin count of each tier level, finest first
    pub levels: Vec<usize>,
}

/// The persisted tier pyramid: per-level arrays plus the shared axis
/// endpoints (the axis is linear, so endpoints suffice)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TiersDoc {
    pub f_start: f64,
    pub f_stop: f64,
    pub levels: Vec<TierLevel>,
}

impl TiersDoc {
    pub fn new(f_start: f64, f_stop: f64, pyramid: TierPyramid) -> Self {
        Self {
            f_start,
            f_stop,
            levels: pyramid.levels,
        }
    }
}

fn io_err(path: &Path, source: std::io::Error) -> ArtifactError {
    ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn json_err(path: &Path, source: serde_json::Error) -> ArtifactError {
    ArtifactError::Json {
        path: path.to_path_buf(),
        source,
    }
}

/// Write a JSON artifact via temp-file-then-rename
fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), ArtifactError> {
    let tmp = path.with_extension("json.tmp");
    {
        let file = File::create(&tmp).map_err(|e| io_err(&tmp, e))?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, value).map_err(|e| json_err(&tmp, e))?;
    }
    std::fs::rename(&tmp, path).map_err(|e| io_err(path, e))?;
    debug!("Wrote {}", path.display());
    Ok(())
}

/// Write the band manifest; this is the sealing write
pub fn write_manifest(path: &Path, manifest: &BandManifest) -> Result<(), ArtifactError> {
    write_json_atomic(path, manifest)
}

/// Read a band manifest
pub fn read_manifest(path: &Path) -> Result<BandManifest, ArtifactError> {
    let file = File::open(path).map_err(|e| io_err(path, e))?;
    serde_json::from_reader(file).map_err(|e| json_err(path, e))
}

/// Write the tier pyramid document
pub fn write_tiers(path: &Path, tiers: &TiersDoc) -> Result<(), ArtifactError> {
    write_json_atomic(path, tiers)
}

/// Read the tier pyramid document
pub fn read_tiers(path: &Path) -> Result<TiersDoc, ArtifactError> {
    let file = File::open(path).map_err(|e| io_err(path, e))?;
    serde_json::from_reader(file).map_err(|e| json_err(path, e))
}
