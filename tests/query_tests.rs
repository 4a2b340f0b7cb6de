//! Query surface scenarios over a freshly merged synthetic band.

use bandmerge::commands::{execute_merge, MergeArgs};
use bandmerge::decoder::{write_chunk, TraceRecord};
use bandmerge::pipeline::CancelToken;
use bandmerge::query::{
    detect_peaks, waterfall_tile, BandDataset, Curve, PeakParams, TileFormat, TileRequest,
};
use bandmerge::utils::error::QueryError;
use std::path::Path;

const F_START: f64 = 100e6;
const F_STOP: f64 = 100.1e6;
const N_FREQS: usize = 1025;
const TONE_HZ: f64 = 100.05e6;
const TONE_BIN: usize = 512;

/// Deterministic ripple in [-1, 1]
fn ripple(seed: u64) -> f32 {
    let x = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    ((x >> 33) as f64 / (1u64 << 31) as f64 * 2.0 - 1.0) as f32
}

/// Noise floor at -100 dB with a tone 20 dB above it at 100.05 MHz
fn tone_trace(t: f64) -> TraceRecord {
    let mut power: Vec<f32> = (0..N_FREQS)
        .map(|j| -100.0 + ripple(t as u64 * 16381 + j as u64))
        .collect();
    power[TONE_BIN - 1] = -90.0;
    power[TONE_BIN] = -80.0;
    power[TONE_BIN + 1] = -90.0;
    TraceRecord::from_endpoints(t, F_START, F_STOP, power)
}

/// Merge a 60-trace tone fixture and open the sealed band
fn tone_band(dir: &Path) -> BandDataset {
    let chunk = dir.join("tone.sbc");
    let records: Vec<_> = (0..60).map(|t| tone_trace(t as f64)).collect();
    write_chunk(&chunk, &records).unwrap();

    let data_dir = dir.join("out");
    let args = MergeArgs {
        inputs: vec![chunk],
        data_dir: data_dir.clone(),
        ..Default::default()
    };
    execute_merge(&args, &CancelToken::new()).expect("merge failed");
    BandDataset::open(&data_dir, 0).unwrap()
}

#[test]
fn s4_single_prominent_peak_at_tone() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = tone_band(dir.path());

    let params = PeakParams {
        prominence: Some(10.0),
        ..Default::default()
    };
    let peaks = detect_peaks(&dataset, Curve::Max, &params);

    assert_eq!(peaks.len(), 1, "expected exactly one peak: {peaks:?}");
    let bin_width = (F_STOP - F_START) / (N_FREQS - 1) as f64;
    assert!((peaks[0].freq - TONE_HZ).abs() < bin_width / 2.0);
    assert!(peaks[0].value > -82.0);
    assert!(peaks[0].prominence >= 10.0);
}

#[test]
fn s5_summary_window_keeps_tone_representable() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = tone_band(dir.path());

    let window = dataset.summary(Some(100.04e6), Some(100.06e6), 50);

    // Clamped to the window, capped, ordered, consistent
    assert!(window.len() <= 50);
    assert!(!window.is_empty());
    assert!(window.freqs[0] >= 100.04e6);
    assert!(*window.freqs.last().unwrap() <= 100.06e6);
    assert!(window.freqs.windows(2).all(|w| w[0] < w[1]));
    for k in 0..window.len() {
        assert!(window.min[k] <= window.avg[k] + 1e-6);
        assert!(window.avg[k] <= window.max[k] + 1e-6);
    }

    // The tone survives downsampling: the max curve peaks within one
    // output bin of the tone frequency
    let argmax = (0..window.len())
        .max_by(|&a, &b| window.max[a].partial_cmp(&window.max[b]).unwrap())
        .unwrap();
    let out_step = window.freqs[1] - window.freqs[0];
    assert!((window.freqs[argmax] - TONE_HZ).abs() <= out_step);
}

#[test]
fn summary_full_band_uses_coarse_tier() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = tone_band(dir.path());

    // Full span at a low cap: served from a coarse tier, still ordered
    let window = dataset.summary(None, None, 100);
    assert!(window.len() <= 100);
    assert!(window.len() >= 90);
    assert!(window.freqs.windows(2).all(|w| w[0] < w[1]));

    // The persisted pyramid follows the ceil-halving recurrence
    let m = &dataset.manifest;
    assert_eq!(m.levels[0], N_FREQS);
    for k in 1..m.levels.len() {
        assert_eq!(m.levels[k], m.levels[k - 1].div_ceil(2));
    }
    assert!(*m.levels.last().unwrap() <= 256);
}

#[test]
fn summary_degenerate_windows_are_empty() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = tone_band(dir.path());

    // Inverted window
    let window = dataset.summary(Some(100.06e6), Some(100.04e6), 50);
    assert!(window.is_empty());

    // Fully outside the band
    let window = dataset.summary(Some(200e6), Some(201e6), 50);
    assert!(window.is_empty());
}

#[test]
fn tile_dimensions_and_bounds_respect_request() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = tone_band(dir.path());

    let request = TileRequest {
        f0: Some(100.02e6),
        f1: Some(100.08e6),
        t0: Some(10.0),
        t1: Some(50.0),
        maxw: 64,
        maxt: 16,
        fmt: TileFormat::Png,
    };
    let tile = waterfall_tile(&dataset, &request).unwrap();

    // Dimensions stay within the cell caps, bounds within the window
    assert!(tile.width <= 64);
    assert!(tile.height <= 16);
    assert!(tile.bounds.f_start >= 100.02e6);
    assert!(tile.bounds.f_end <= 100.08e6);
    assert!(tile.bounds.t_start >= 10.0);
    assert!(tile.bounds.t_end <= 50.0);

    // PNG signature
    assert_eq!(&tile.bytes[..8], b"\x89PNG\r\n\x1a\n");
}

#[test]
fn tile_raw_format_matches_geometry() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = tone_band(dir.path());

    let request = TileRequest {
        f0: None,
        f1: None,
        t0: None,
        t1: None,
        maxw: 32,
        maxt: 8,
        fmt: TileFormat::Raw,
    };
    let tile = waterfall_tile(&dataset, &request).unwrap();

    assert_eq!(tile.width, 32);
    assert_eq!(tile.height, 8);
    assert_eq!(tile.bytes.len(), 32 * 8 * 4);

    // Full-span bounds clamp to the data
    assert_eq!(tile.bounds.f_start, F_START);
    assert_eq!(tile.bounds.f_end, F_STOP);
    assert_eq!(tile.bounds.t_start, 0.0);
    assert_eq!(tile.bounds.t_end, 59.0);

    // Every dequantised mean lies inside the quantisation range
    let m = &dataset.manifest;
    for chunk in tile.bytes.chunks_exact(4) {
        let db = f32::from_le_bytes(chunk.try_into().unwrap()) as f64;
        assert!(db >= m.db_min - 1e-6 && db <= m.db_max + 1e-6);
    }
}

#[test]
fn tile_empty_window_is_well_formed() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = tone_band(dir.path());

    let request = TileRequest {
        f0: Some(300e6),
        f1: Some(301e6),
        t0: None,
        t1: None,
        maxw: 32,
        maxt: 8,
        fmt: TileFormat::Png,
    };
    let tile = waterfall_tile(&dataset, &request).unwrap();
    assert_eq!(tile.width, 0);
    assert_eq!(tile.height, 0);
    assert!(tile.bytes.is_empty());
}

#[test]
fn peaks_distance_filter_thins_close_peaks() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = tone_band(dir.path());

    // Without filters the noise ripple produces many local maxima
    let all = detect_peaks(&dataset, Curve::Max, &PeakParams::default());
    assert!(all.len() > 10);
    assert!(all.windows(2).all(|w| w[0].freq < w[1].freq));

    // A large distance keeps only well-separated survivors
    let thinned = detect_peaks(
        &dataset,
        Curve::Max,
        &PeakParams {
            distance: Some(100),
            ..Default::default()
        },
    );
    assert!(thinned.len() < all.len());
    let bin_width = (F_STOP - F_START) / (N_FREQS - 1) as f64;
    for pair in thinned.windows(2) {
        assert!(pair[1].freq - pair[0].freq >= 100.0 * bin_width - 1e-3);
    }

    // The tone always survives thinning
    assert!(thinned
        .iter()
        .any(|p| (p.freq - TONE_HZ).abs() < bin_width / 2.0));
}

#[test]
fn unknown_band_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let _ = tone_band(dir.path());

    let err = BandDataset::open(&dir.path().join("out"), 7).unwrap_err();
    assert!(matches!(err, QueryError::NotFound(7)));
}
