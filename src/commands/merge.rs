//! Merge command implementation.
//!
//! The merge command:
//! 1. Discovers capture chunks under the input paths
//! 2. Streams records through the band classifier
//! 3. Finalises each band in parallel (quantise, waterfall, summary,
//!    tiers, manifest)
//! 4. Reports per-band statistics

use crate::decoder::{find_chunks, ChunkDecoder, FrameDecoder};
use crate::pipeline::classifier::{BandRegistry, QuantisingBand};
use crate::pipeline::quantizer::QuantRange;
use crate::pipeline::summary::SummaryAccumulator;
use crate::pipeline::tiers::build_pyramid;
use crate::pipeline::CancelToken;
use crate::store::{self, artifacts, manifest, BandManifest, TiersDoc};
use crate::utils::config::GRID_REL_TOLERANCE;
use crate::utils::error::{ArtifactError, BuildError, DecodeError};
use log::{debug, info, warn};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Arguments for the merge command
///
/// **Public** - used by main.rs to construct from CLI args
#[derive(Debug, Clone)]
pub struct MergeArgs {
    /// Files and/or directories containing capture chunks
    pub inputs: Vec<PathBuf>,

    /// Output directory for band artifacts
    pub data_dir: PathBuf,

    /// Relative grid-drift tolerance
    pub tolerance: f64,

    /// Discover and print bands without building artifacts
    pub list_only: bool,
}

impl Default for MergeArgs {
    fn default() -> Self {
        Self {
            inputs: Vec::new(),
            data_dir: PathBuf::from("data"),
            tolerance: GRID_REL_TOLERANCE,
            list_only: false,
        }
    }
}

/// Statistics for one sealed band
#[derive(Debug, Clone)]
pub struct BandReport {
    pub index: usize,
    pub key: String,
    pub n_traces: usize,
    pub n_freqs: usize,
    pub accepted: u64,
    pub reconciled: u64,
    pub rejected: u64,
    pub levels: Vec<usize>,
}

/// Overall merge statistics
#[derive(Debug, Clone, Default)]
pub struct MergeReport {
    pub bands: Vec<BandReport>,
    pub decode_skips: u64,
    pub empty_bands: u64,
}

/// Validate merge arguments
///
/// **Public** - can be called before execute_merge for early validation
pub fn validate_args(args: &MergeArgs) -> anyhow::Result<()> {
    if args.inputs.is_empty() {
        anyhow::bail!("at least one input path is required");
    }
    if !(args.tolerance.is_finite() && args.tolerance > 0.0) {
        anyhow::bail!("tolerance must be a positive number");
    }
    Ok(())
}

/// Execute the merge command
///
/// **Public** - main entry point called from main.rs
///
/// # Errors
/// * `BuildError::InputMissing` - no chunks under the input paths
/// * `BuildError::DecodeFatal` - stream-level decoder failure
/// * `BuildError::Io` - artifact write failure (failed band rolled back)
/// * `BuildError::Cancelled` - cooperative cancellation
pub fn execute_merge(args: &MergeArgs, cancel: &CancelToken) -> Result<MergeReport, BuildError> {
    let start_time = Instant::now();

    // Step 1: discover chunks
    info!("Step 1/3: Discovering capture chunks...");
    let chunks = find_chunks(&args.inputs)?;
    if chunks.is_empty() {
        return Err(BuildError::InputMissing);
    }
    info!("Found {} chunk(s)", chunks.len());

    std::fs::create_dir_all(&args.data_dir)?;

    // Step 2: stream records through the classifier
    info!("Step 2/3: Classifying traces into bands...");
    let registry = BandRegistry::new(args.data_dir.clone(), args.tolerance);
    let decode_skips = match classify_chunks(&chunks, &registry, cancel) {
        Ok(skips) => skips,
        Err(e) => {
            rollback_classification(registry, &args.data_dir);
            return Err(e);
        }
    };

    info!("Classified into {} band(s)", registry.len());
    let n_bands = registry.len();
    let bands = match registry.into_bands() {
        Ok(bands) => bands,
        Err(e) => {
            for index in 0..n_bands {
                store::remove_band_files(&args.data_dir, index);
            }
            return Err(BuildError::Io(e));
        }
    };

    if args.list_only {
        for band in &bands {
            println!("[{}] {} ({} trace(s))", band.index, band.key, band.rows());
        }
        for band in &bands {
            store::remove_band_files(&args.data_dir, band.index);
        }
        return Ok(MergeReport {
            decode_skips,
            ..Default::default()
        });
    }

    // Step 3: finalise bands in parallel
    info!("Step 3/3: Quantising and sealing {} band(s)...", bands.len());
    let results: Vec<Result<Option<BandReport>, BuildError>> = bands
        .into_par_iter()
        .map(|band| {
            if cancel.is_cancelled() {
                store::remove_band_files(&args.data_dir, band.index);
                return Err(BuildError::Cancelled);
            }
            finalize_band(band, &args.data_dir, cancel)
        })
        .collect();

    let mut report = MergeReport {
        decode_skips,
        ..Default::default()
    };
    for result in results {
        match result? {
            Some(band) => report.bands.push(band),
            None => report.empty_bands += 1,
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        "Merge completed in {:.2}s: {} band(s) sealed, {} record(s) skipped",
        elapsed.as_secs_f64(),
        report.bands.len(),
        report.decode_skips
    );

    Ok(report)
}

/// Stream every chunk's records into the registry.
///
/// Returns the number of skipped records. Stream-level failures and
/// cancellation surface to the caller, which rolls the registry back.
fn classify_chunks(
    chunks: &[PathBuf],
    registry: &BandRegistry,
    cancel: &CancelToken,
) -> Result<u64, BuildError> {
    let mut decode_skips = 0u64;
    let decoder = FrameDecoder;

    for chunk in chunks {
        debug!("Reading {}", chunk.display());
        let records = decoder.open(chunk).map_err(|e| BuildError::DecodeFatal {
            path: chunk.clone(),
            source: e,
        })?;

        for item in records {
            if cancel.is_cancelled() {
                return Err(BuildError::Cancelled);
            }
            match item {
                Ok(record) => registry.dispatch(&record).map(|_| ()).map_err(BuildError::Io)?,
                Err(e) if e.is_skippable() => {
                    decode_skips += 1;
                    warn!("Skipping record in {}: {}", chunk.display(), e);
                }
                Err(e) => {
                    return Err(BuildError::DecodeFatal {
                        path: chunk.clone(),
                        source: match e {
                            DecodeError::Io(io) => io,
                            other => std::io::Error::other(other.to_string()),
                        },
                    });
                }
            }
        }
    }

    Ok(decode_skips)
}

/// Delete the scratch files of every band opened during classification
fn rollback_classification(registry: BandRegistry, data_dir: &Path) {
    let n_bands = registry.len();
    drop(registry);
    for index in 0..n_bands {
        store::remove_band_files(data_dir, index);
    }
}

/// Quantise, write, and seal one band.
///
/// Returns `None` for an empty band (dropped with a warning). Any
/// failure rolls back every artifact of this band before surfacing.
fn finalize_band(
    band: QuantisingBand,
    data_dir: &Path,
    cancel: &CancelToken,
) -> Result<Option<BandReport>, BuildError> {
    if band.rows() == 0 {
        warn!("Band {} is empty, dropping", band.index);
        store::remove_band_files(data_dir, band.index);
        return Ok(None);
    }

    let index = band.index;
    match seal_band(&band, data_dir, cancel) {
        Ok(report) => {
            let _ = std::fs::remove_file(&band.scratch);
            info!(
                "Band {index} sealed: {} x {} ({} reconciled, {} rejected)",
                report.n_traces, report.n_freqs, report.reconciled, report.rejected
            );
            Ok(Some(report))
        }
        Err(e) => {
            warn!("Band {index} failed, rolling back: {e}");
            store::remove_band_files(data_dir, index);
            Err(e)
        }
    }
}

/// The quantise-and-seal pass proper; rollback is handled by the caller
fn seal_band(
    band: &QuantisingBand,
    data_dir: &Path,
    cancel: &CancelToken,
) -> Result<BandReport, BuildError> {
    let n_traces = band.rows();
    let n_freqs = band.canonical.len();

    // Rows leave the scratch file in time-sorted order
    let order = band.time_order();
    let range = QuantRange::from_reservoir(&band.reservoir);

    // Second pass: visit scratch rows in time order, quantise into the
    // pre-sized map; the summary accumulates in float space, in the same
    // order for any chunk arrangement
    let mut writer = store::WaterfallWriter::create(
        store::waterfall_tmp_path(data_dir, band.index),
        store::waterfall_path(data_dir, band.index),
        n_traces,
        n_freqs,
    )?;
    let mut reader = store::ScratchReader::open(&band.scratch, n_freqs)?;
    let mut accumulator = SummaryAccumulator::new(n_freqs);
    let mut row = vec![0f32; n_freqs];
    let mut codes = vec![0i16; n_freqs];

    for (rank, &scratch_row) in order.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(BuildError::Cancelled);
        }
        reader.read_row_at(scratch_row, &mut row)?;
        for (code, &db) in codes.iter_mut().zip(&row) {
            *code = range.quantize(db);
        }
        writer.write_row(rank, &codes);
        accumulator.accumulate_row(&row);
    }

    writer.seal()?;

    // Axes
    let unix0 = band.timestamps[order[0]];
    let rel_t: Vec<i64> = order
        .iter()
        .map(|&i| (band.timestamps[i] - unix0).floor() as i64)
        .collect();
    artifacts::write_f64_vec(&store::freqs_path(data_dir, band.index), &band.canonical)
        .map_err(artifact_io)?;
    artifacts::write_i64_vec(&store::rel_t_path(data_dir, band.index), &rel_t)
        .map_err(artifact_io)?;

    // Summary and tiers
    let summary = accumulator.finish();
    artifacts::write_summary(&store::summary_path(data_dir, band.index), &summary)
        .map_err(artifact_io)?;

    let pyramid = build_pyramid(&summary);
    let levels = pyramid.bin_counts();
    let f_start = band.canonical[0];
    let f_stop = band.canonical[n_freqs - 1];
    manifest::write_tiers(
        &store::tiers_path(data_dir, band.index),
        &TiersDoc::new(f_start, f_stop, pyramid),
    )
    .map_err(artifact_io)?;

    // Manifest last: this write seals the band
    manifest::write_manifest(
        &store::meta_path(data_dir, band.index),
        &BandManifest {
            db_min: range.db_min,
            db_max: range.db_max,
            scale: range.scale,
            n_traces,
            n_freqs,
            f_start,
            f_stop,
            unix0,
            levels: levels.clone(),
        },
    )
    .map_err(artifact_io)?;

    Ok(BandReport {
        index: band.index,
        key: band.key.to_string(),
        n_traces,
        n_freqs,
        accepted: band.accepted,
        reconciled: band.reconciled,
        rejected: band.rejected,
        levels,
    })
}

fn artifact_io(e: ArtifactError) -> BuildError {
    match e {
        ArtifactError::Io { source, .. } => BuildError::Io(source),
        other => BuildError::Io(std::io::Error::other(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_args_requires_inputs() {
        let args = MergeArgs::default();
        assert!(validate_args(&args).is_err());
    }

    #[test]
    fn test_validate_args_rejects_bad_tolerance() {
        let args = MergeArgs {
            inputs: vec![PathBuf::from("chunks")],
            tolerance: -1.0,
            ..Default::default()
        };
        assert!(validate_args(&args).is_err());
    }

    #[test]
    fn test_missing_inputs_surface() {
        let dir = tempfile::tempdir().unwrap();
        let args = MergeArgs {
            inputs: vec![dir.path().join("nowhere")],
            data_dir: dir.path().join("out"),
            ..Default::default()
        };
        let err = execute_merge(&args, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, BuildError::InputMissing));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_cancelled_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let chunk = dir.path().join("a.sbc");
        let records = vec![crate::decoder::TraceRecord::from_endpoints(
            0.0,
            100e6,
            100.1e6,
            vec![-80.0; 64],
        )];
        crate::decoder::write_chunk(&chunk, &records).unwrap();

        let cancel = CancelToken::new();
        cancel.cancel();
        let args = MergeArgs {
            inputs: vec![dir.path().to_path_buf()],
            data_dir: dir.path().join("out"),
            ..Default::default()
        };
        let err = execute_merge(&args, &cancel).unwrap_err();
        assert!(matches!(err, BuildError::Cancelled));
        // No stray files survive the rollback
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("out"))
            .unwrap()
            .collect();
        assert!(leftovers.is_empty());
    }
}
