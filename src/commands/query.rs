//! Query command implementations.
//!
//! Thin shell wrappers over the query surface: list sealed bands, print
//! summary windows and peaks as JSON, write waterfall tiles to disk.
//! The HTTP gateway uses the same library calls; these commands exist
//! so the artifacts can be exercised without it.

use crate::query::{
    detect_peaks, list_bands, waterfall_tile, BandDataset, Curve, PeakParams, TileFormat,
    TileRequest,
};
use anyhow::{Context, Result};
use log::info;
use std::path::{Path, PathBuf};

/// Print the manifests of all sealed bands
///
/// **Public** - `bands` subcommand
pub fn execute_bands(data_dir: &Path) -> Result<()> {
    let bands = list_bands(data_dir).context("Failed to list bands")?;

    if bands.is_empty() {
        println!("No sealed bands in {}", data_dir.display());
        return Ok(());
    }

    for band in bands {
        let m = &band.manifest;
        println!(
            "[{}] {:.3}-{:.3} MHz | {} x {} | {:.1}..{:.1} dB | levels {:?}",
            band.id,
            m.f_start / 1e6,
            m.f_stop / 1e6,
            m.n_traces,
            m.n_freqs,
            m.db_min,
            m.db_max,
            m.levels
        );
    }
    Ok(())
}

/// Print a summary window as JSON
///
/// **Public** - `summary` subcommand
pub fn execute_summary(
    data_dir: &Path,
    band: usize,
    f0: Option<f64>,
    f1: Option<f64>,
    max_pts: usize,
) -> Result<()> {
    let dataset = BandDataset::open(data_dir, band)
        .with_context(|| format!("Failed to open band {band}"))?;

    let window = dataset.summary(f0, f1, max_pts);
    info!("Summary window: {} point(s)", window.len());

    println!("{}", serde_json::to_string_pretty(&window)?);
    Ok(())
}

/// Write a waterfall tile to a PNG file
///
/// **Public** - `tile` subcommand
#[allow(clippy::too_many_arguments)]
pub fn execute_tile(
    data_dir: &Path,
    band: usize,
    f0: Option<f64>,
    f1: Option<f64>,
    t0: Option<f64>,
    t1: Option<f64>,
    maxw: usize,
    maxt: usize,
    output: &PathBuf,
) -> Result<()> {
    let dataset = BandDataset::open(data_dir, band)
        .with_context(|| format!("Failed to open band {band}"))?;

    let request = TileRequest {
        f0,
        f1,
        t0,
        t1,
        maxw,
        maxt,
        fmt: TileFormat::Png,
    };
    let tile = waterfall_tile(&dataset, &request).context("Failed to extract tile")?;

    if tile.bytes.is_empty() {
        println!("Requested window contains no data");
        return Ok(());
    }

    std::fs::write(output, &tile.bytes)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!("✓ Tile written to: {}", output.display());
    println!(
        "  {} x {} cells | {:.6}-{:.6} MHz | t {}..{} s",
        tile.width,
        tile.height,
        tile.bounds.f_start / 1e6,
        tile.bounds.f_end / 1e6,
        tile.bounds.t_start,
        tile.bounds.t_end
    );
    Ok(())
}

/// Print detected peaks as JSON
///
/// **Public** - `peaks` subcommand
pub fn execute_peaks(
    data_dir: &Path,
    band: usize,
    curve: Curve,
    params: PeakParams,
) -> Result<()> {
    let dataset = BandDataset::open(data_dir, band)
        .with_context(|| format!("Failed to open band {band}"))?;

    let peaks = detect_peaks(&dataset, curve, &params);
    info!("Detected {} peak(s)", peaks.len());

    println!("{}", serde_json::to_string_pretty(&peaks)?);
    Ok(())
}
