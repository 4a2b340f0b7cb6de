//! End-to-end merge scenarios over synthetic capture chunks.

use bandmerge::commands::{execute_merge, MergeArgs, MergeReport};
use bandmerge::decoder::{write_chunk, TraceRecord};
use bandmerge::pipeline::CancelToken;
use bandmerge::query::{list_bands, BandDataset};
use std::path::Path;

/// Deterministic noise in [-1, 1] so fixtures never depend on a RNG crate
fn ripple(seed: u64) -> f32 {
    let x = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    ((x >> 33) as f64 / (1u64 << 31) as f64 * 2.0 - 1.0) as f32
}

/// One noise-floor trace with a per-bin deterministic ripple
fn noise_trace(t: f64, f_start: f64, f_stop: f64, n: usize) -> TraceRecord {
    let power: Vec<f32> = (0..n)
        .map(|j| -80.0 + ripple(t as u64 * 8191 + j as u64))
        .collect();
    TraceRecord::from_endpoints(t, f_start, f_stop, power)
}

fn merge(inputs: &[&Path], data_dir: &Path) -> MergeReport {
    let args = MergeArgs {
        inputs: inputs.iter().map(|p| p.to_path_buf()).collect(),
        data_dir: data_dir.to_path_buf(),
        ..Default::default()
    };
    execute_merge(&args, &CancelToken::new()).expect("merge failed")
}

#[test]
fn s1_two_chunks_one_band() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("out");

    // Two chunks, 100 records each, one grid, timestamps 0..199
    let chunk_a = dir.path().join("a.sbc");
    let chunk_b = dir.path().join("b.sbc");
    let records_a: Vec<_> = (0..100)
        .map(|t| noise_trace(t as f64, 100e6, 100.1e6, 1024))
        .collect();
    let records_b: Vec<_> = (100..200)
        .map(|t| noise_trace(t as f64, 100e6, 100.1e6, 1024))
        .collect();
    write_chunk(&chunk_a, &records_a).unwrap();
    write_chunk(&chunk_b, &records_b).unwrap();

    let report = merge(&[&chunk_a, &chunk_b], &data_dir);
    assert_eq!(report.bands.len(), 1);
    assert_eq!(report.decode_skips, 0);

    let band = &report.bands[0];
    assert_eq!(band.n_traces, 200);
    assert_eq!(band.n_freqs, 1024);

    // Store size matches the manifest shape exactly
    let wf = data_dir.join("waterfall_band0.dat");
    assert_eq!(std::fs::metadata(&wf).unwrap().len(), 200 * 1024 * 2);

    // Relative times are 0..=199
    let dataset = BandDataset::open(&data_dir, 0).unwrap();
    let expected: Vec<i64> = (0..200).collect();
    assert_eq!(dataset.rel_t(), expected.as_slice());

    // No scratch or temp files survive sealing
    let names: Vec<String> = std::fs::read_dir(&data_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert!(names.iter().all(|n| !n.ends_with(".tmp") && !n.ends_with(".scratch")));
}

#[test]
fn s1_quantisation_roundtrip_bound() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("out");
    let chunk = dir.path().join("a.sbc");
    let records: Vec<_> = (0..50)
        .map(|t| noise_trace(t as f64, 100e6, 100.1e6, 256))
        .collect();
    write_chunk(&chunk, &records).unwrap();
    merge(&[&chunk], &data_dir);

    let dataset = BandDataset::open(&data_dir, 0).unwrap();
    let m = &dataset.manifest;
    let bound = (m.db_max - m.db_min) / 65534.0;

    // Every in-range stored sample round-trips within one
    // half code of the original dB value
    let wf = std::fs::read(data_dir.join("waterfall_band0.dat")).unwrap();
    for (row, record) in records.iter().enumerate() {
        // Rows are already time-ordered in this fixture
        for (col, &db) in record.power_db.iter().enumerate() {
            let offset = (row * 256 + col) * 2;
            let code = i16::from_le_bytes([wf[offset], wf[offset + 1]]);
            let back = m.db_min + code as f64 / m.scale;
            if (db as f64) >= m.db_min && (db as f64) <= m.db_max {
                assert!(
                    (back - db as f64).abs() <= bound + 1e-6,
                    "roundtrip error at ({row}, {col})"
                );
            }
        }
    }
}

#[test]
fn s2_reconciled_grid_merges_into_one_band() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("out");

    // Same key, axes drifted by 10 mHz at every bin: far below the 1e-6
    // relative tolerance, far above one f64 ulp at 100 MHz
    let chunk_a = dir.path().join("a.sbc");
    let chunk_b = dir.path().join("b.sbc");
    let records_a: Vec<_> = (0..20)
        .map(|t| noise_trace(t as f64, 100e6, 100.1e6, 512))
        .collect();
    let records_b: Vec<_> = (20..40)
        .map(|t| noise_trace(t as f64, 100e6 + 0.01, 100.1e6 + 0.01, 512))
        .collect();
    write_chunk(&chunk_a, &records_a).unwrap();
    write_chunk(&chunk_b, &records_b).unwrap();

    let report = merge(&[&chunk_a, &chunk_b], &data_dir);
    assert_eq!(report.bands.len(), 1);

    let band = &report.bands[0];
    assert_eq!(band.n_traces, 40);
    assert_eq!(band.rejected, 0);
    assert_eq!(band.reconciled, 20);

    // Reconciled rows stay within one int16 code of the unshifted values
    let dataset = BandDataset::open(&data_dir, 0).unwrap();
    let m = dataset.manifest.clone();
    let wf = std::fs::read(data_dir.join("waterfall_band0.dat")).unwrap();
    for (i, record) in records_b.iter().enumerate() {
        let row = 20 + i;
        for (col, &db) in record.power_db.iter().enumerate() {
            let offset = (row * 512 + col) * 2;
            let code = i16::from_le_bytes([wf[offset], wf[offset + 1]]) as f64;
            let direct = ((db as f64 - m.db_min) * m.scale).round();
            assert!(
                (code - direct).abs() <= 1.0,
                "reconciled sample drifted at ({row}, {col})"
            );
        }
    }
}

#[test]
fn s3_different_bin_counts_make_two_bands() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("out");

    let chunk = dir.path().join("a.sbc");
    let mut records: Vec<_> = (0..10)
        .map(|t| noise_trace(t as f64, 100e6, 100.1e6, 1024))
        .collect();
    records.extend((10..20).map(|t| noise_trace(t as f64, 100e6, 100.1e6, 1025)));
    write_chunk(&chunk, &records).unwrap();

    let report = merge(&[&chunk], &data_dir);
    assert_eq!(report.bands.len(), 2);

    let bands = list_bands(&data_dir).unwrap();
    assert_eq!(bands.len(), 2);
    assert_eq!(bands[0].id, 0);
    assert_eq!(bands[1].id, 1);
    assert_eq!(bands[0].manifest.n_freqs, 1024);
    assert_eq!(bands[1].manifest.n_freqs, 1025);
    assert_eq!(bands[0].manifest.n_traces, 10);
    assert_eq!(bands[1].manifest.n_traces, 10);
}

#[test]
fn s6_outlier_does_not_collapse_dynamic_range() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("out");

    let chunk = dir.path().join("a.sbc");
    let mut records: Vec<_> = (0..100)
        .map(|t| noise_trace(t as f64, 100e6, 100.1e6, 1024))
        .collect();
    // Impulsive interference: one sample at +200 dB
    records[50].power_db[512] = 200.0;
    write_chunk(&chunk, &records).unwrap();

    merge(&[&chunk], &data_dir);
    let dataset = BandDataset::open(&data_dir, 0).unwrap();
    let m = &dataset.manifest;

    // Percentile widening keeps db_max near the noise floor, not the spike
    assert!(m.db_max < -70.0, "db_max stretched to {}", m.db_max);
    assert!(m.db_max > m.db_min);

    // The outlier cell clips to the top code instead of overflowing
    let wf = std::fs::read(data_dir.join("waterfall_band0.dat")).unwrap();
    let offset = (50 * 1024 + 512) * 2;
    let code = i16::from_le_bytes([wf[offset], wf[offset + 1]]);
    assert_eq!(code, 32767);
}

#[test]
fn chunk_order_does_not_change_artifacts() {
    let dir = tempfile::tempdir().unwrap();

    let chunk_a = dir.path().join("a.sbc");
    let chunk_b = dir.path().join("b.sbc");
    // Interleaved timestamps so the stable sort actually has work to do
    let records_a: Vec<_> = (0..30)
        .map(|t| noise_trace((t * 2) as f64, 100e6, 100.1e6, 256))
        .collect();
    let records_b: Vec<_> = (0..30)
        .map(|t| noise_trace((t * 2 + 1) as f64, 100e6, 100.1e6, 256))
        .collect();
    write_chunk(&chunk_a, &records_a).unwrap();
    write_chunk(&chunk_b, &records_b).unwrap();

    let out_ab = dir.path().join("out_ab");
    let out_ba = dir.path().join("out_ba");
    merge(&[&chunk_a, &chunk_b], &out_ab);
    merge(&[&chunk_b, &chunk_a], &out_ba);

    for name in [
        "waterfall_band0.dat",
        "freqs0_band0.bin",
        "rel_t_band0.bin",
        "summary_band0.arc",
        "tiers_band0.json",
        "meta_band0.json",
    ] {
        let a = std::fs::read(out_ab.join(name)).unwrap();
        let b = std::fs::read(out_ba.join(name)).unwrap();
        assert_eq!(a, b, "artifact {name} differs with chunk order");
    }
}

#[test]
fn idempotent_rerun_is_bit_identical() {
    let dir = tempfile::tempdir().unwrap();

    let chunk = dir.path().join("a.sbc");
    let records: Vec<_> = (0..40)
        .map(|t| noise_trace(t as f64, 100e6, 100.1e6, 300))
        .collect();
    write_chunk(&chunk, &records).unwrap();

    let out_1 = dir.path().join("out1");
    let out_2 = dir.path().join("out2");
    merge(&[&chunk], &out_1);
    merge(&[&chunk], &out_2);

    // Running the batch twice yields bit-identical artifacts
    for entry in std::fs::read_dir(&out_1).unwrap() {
        let name = entry.unwrap().file_name();
        let a = std::fs::read(out_1.join(&name)).unwrap();
        let b = std::fs::read(out_2.join(&name)).unwrap();
        assert_eq!(a, b, "artifact {name:?} differs between runs");
    }
}

#[test]
fn corrupt_record_is_skipped_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("out");

    let chunk = dir.path().join("a.sbc");
    let records: Vec<_> = (0..10)
        .map(|t| noise_trace(t as f64, 100e6, 100.1e6, 128))
        .collect();
    write_chunk(&chunk, &records).unwrap();

    // Append a frame whose sample count is wrong, then a valid record
    let mut bytes = std::fs::read(&chunk).unwrap();
    let mut bad = Vec::new();
    bad.extend_from_slice(&10.5f64.to_le_bytes());
    bad.extend_from_slice(&999u32.to_le_bytes());
    bad.extend_from_slice(&100e6f64.to_le_bytes());
    bad.extend_from_slice(&100.1e6f64.to_le_bytes());
    bytes.extend_from_slice(&(bad.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&bad);
    std::fs::write(&chunk, &bytes).unwrap();

    let tail = dir.path().join("b.sbc");
    write_chunk(&tail, &[noise_trace(11.0, 100e6, 100.1e6, 128)]).unwrap();

    let report = merge(&[&chunk, &tail], &data_dir);
    assert_eq!(report.decode_skips, 1);
    assert_eq!(report.bands.len(), 1);
    assert_eq!(report.bands[0].n_traces, 11);
}
