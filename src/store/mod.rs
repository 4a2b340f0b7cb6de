//! On-disk artifact layout, writers, and readers.
//!
//! Per band index N, in the data directory:
//! - `waterfall_bandN.dat` — raw little-endian int16, row-major
//! - `freqs0_bandN.bin` — little-endian f64 canonical axis
//! - `rel_t_bandN.bin` — little-endian i64 relative row times
//! - `summary_bandN.arc` — named-vector archive (max / avg / min, f32)
//! - `tiers_bandN.json` — the tier pyramid
//! - `meta_bandN.json` — the band manifest, written last (seal)

pub mod artifacts;
pub mod manifest;
pub mod waterfall;

use std::path::{Path, PathBuf};

// Re-export main types
pub use manifest::{read_manifest, read_tiers, write_manifest, write_tiers, BandManifest, TiersDoc};
pub use waterfall::{ScratchReader, ScratchWriter, WaterfallWriter};

/// Path of the sealed waterfall store
pub fn waterfall_path(dir: &Path, band: usize) -> PathBuf {
    dir.join(format!("waterfall_band{band}.dat"))
}

/// Path of the pre-rename waterfall temp file
pub fn waterfall_tmp_path(dir: &Path, band: usize) -> PathBuf {
    dir.join(format!("waterfall_band{band}.dat.tmp"))
}

/// Path of the float32 scratch row buffer (deleted on seal)
pub fn scratch_path(dir: &Path, band: usize) -> PathBuf {
    dir.join(format!("waterfall_band{band}.scratch"))
}

/// Path of the canonical frequency axis
pub fn freqs_path(dir: &Path, band: usize) -> PathBuf {
    dir.join(format!("freqs0_band{band}.bin"))
}

/// Path of the relative row-time vector
pub fn rel_t_path(dir: &Path, band: usize) -> PathBuf {
    dir.join(format!("rel_t_band{band}.bin"))
}

/// Path of the summary archive
pub fn summary_path(dir: &Path, band: usize) -> PathBuf {
    dir.join(format!("summary_band{band}.arc"))
}

/// Path of the tier pyramid document
pub fn tiers_path(dir: &Path, band: usize) -> PathBuf {
    dir.join(format!("tiers_band{band}.json"))
}

/// Path of the band manifest
pub fn meta_path(dir: &Path, band: usize) -> PathBuf {
    dir.join(format!("meta_band{band}.json"))
}

/// Remove every artifact of a band, sealed or partial.
///
/// Band-scoped rollback: called when a band fails mid-build or when a
/// cancelled build unwinds. Missing files are fine.
pub fn remove_band_files(dir: &Path, band: usize) {
    for path in [
        scratch_path(dir, band),
        waterfall_tmp_path(dir, band),
        waterfall_path(dir, band),
        freqs_path(dir, band),
        rel_t_path(dir, band),
        summary_path(dir, band),
        tiers_path(dir, band),
        meta_path(dir, band),
    ] {
        let _ = std::fs::remove_file(path);
    }
}
