//! Band classification: grouping traces by frequency-grid fingerprint.
//!
//! The first record with a given `BandKey` establishes that band's
//! canonical axis. Later records are accepted verbatim when their axis
//! matches bit-for-bit, reconciled by interpolation when they only
//! drift within tolerance, and rejected as `GridDrift` otherwise.
//! Classification is streaming: accepted rows go straight to the band's
//! scratch file, and the percentile reservoir observes them on the way.

use crate::decoder::record::TraceRecord;
use crate::pipeline::quantizer::Reservoir;
use crate::pipeline::reconcile::{axis_within_tolerance, resample_onto};
use crate::store::{scratch_path, ScratchWriter};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Frequency-grid fingerprint used to group records
///
/// Two records belong to the same band iff their keys are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BandKey {
    pub n_freqs: usize,
    pub f_start_hz: i64,
    pub f_stop_hz: i64,
}

impl BandKey {
    pub fn of(record: &TraceRecord) -> Self {
        Self {
            n_freqs: record.n_freqs(),
            f_start_hz: record.f_start().round() as i64,
            f_stop_hz: record.f_stop().round() as i64,
        }
    }
}

impl std::fmt::Display for BandKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:.3}-{:.3} MHz x {}",
            self.f_start_hz as f64 / 1e6,
            self.f_stop_hz as f64 / 1e6,
            self.n_freqs
        )
    }
}

/// Per-band build state
///
/// ```text
/// Open -> AxisFixed -> Quantising -> Indexed -> Sealed
///   any --fatal I/O--> Failed
/// ```
///
/// Only `Sealed` bands are visible to the query surface (the manifest
/// is the sealing write).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandState {
    Open,
    AxisFixed,
    Quantising,
    Indexed,
    Sealed,
    Failed,
}

/// Outcome of dispatching one record into a band
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Axis matched the canonical one bit-for-bit
    Accepted,
    /// Axis drifted within tolerance and was re-interpolated
    Reconciled,
    /// Axis drifted beyond tolerance; record dropped
    Rejected,
}

/// In-progress band: canonical axis, scratch rows, reservoir
pub struct BandBuilder {
    pub key: BandKey,
    pub index: usize,
    state: BandState,
    canonical: Vec<f64>,
    scratch: ScratchWriter,
    timestamps: Vec<f64>,
    reservoir: Reservoir,
    tolerance: f64,
    pub accepted: u64,
    pub reconciled: u64,
    pub rejected: u64,
}

impl BandBuilder {
    /// Open a band from its first record; the record's axis becomes
    /// canonical and is frozen from here on
    fn open(
        index: usize,
        record: &TraceRecord,
        data_dir: &Path,
        tolerance: f64,
    ) -> std::io::Result<Self> {
        let key = BandKey::of(record);
        info!("Band {index} opened: {key}");

        let scratch = ScratchWriter::create(scratch_path(data_dir, index), record.n_freqs())?;
        let mut builder = Self {
            key,
            index,
            state: BandState::Open,
            canonical: record.freqs.clone(),
            scratch,
            timestamps: Vec::new(),
            reservoir: Reservoir::default(),
            tolerance,
            accepted: 0,
            reconciled: 0,
            rejected: 0,
        };

        builder.state = BandState::AxisFixed;
        builder.append(record.unix_time, &record.power_db)?;
        builder.accepted += 1;
        Ok(builder)
    }

    /// Dispatch a record whose key matches this band
    fn push(&mut self, record: &TraceRecord) -> std::io::Result<PushOutcome> {
        debug_assert_eq!(self.state, BandState::AxisFixed);

        if record.freqs == self.canonical {
            self.append(record.unix_time, &record.power_db)?;
            self.accepted += 1;
            return Ok(PushOutcome::Accepted);
        }

        if axis_within_tolerance(&self.canonical, &record.freqs, self.tolerance) {
            let resampled = resample_onto(&self.canonical, &record.freqs, &record.power_db);
            self.append(record.unix_time, &resampled)?;
            self.reconciled += 1;
            return Ok(PushOutcome::Reconciled);
        }

        self.rejected += 1;
        warn!(
            "Band {}: grid drift beyond tolerance, record at t={} rejected",
            self.index, record.unix_time
        );
        Ok(PushOutcome::Rejected)
    }

    fn append(&mut self, unix_time: f64, row: &[f32]) -> std::io::Result<()> {
        self.scratch.append_row(row)?;
        self.reservoir.observe_row(row);
        self.timestamps.push(unix_time);
        Ok(())
    }

    pub fn state(&self) -> BandState {
        self.state
    }

    pub fn n_freqs(&self) -> usize {
        self.canonical.len()
    }

    /// Rows buffered so far (accepted + reconciled)
    pub fn rows(&self) -> usize {
        self.timestamps.len()
    }

    /// Mark the end of classification and hand over the buffered state.
    ///
    /// Returns the canonical axis, the arrival-order timestamps, the
    /// reservoir, and the scratch path. The builder transitions to
    /// `Quantising`; the finalisation pass owns it from here.
    pub fn into_quantising(mut self) -> std::io::Result<QuantisingBand> {
        self.state = BandState::Quantising;
        let rows = self.scratch.rows();
        let scratch = self.scratch.finish()?;
        debug!(
            "Band {}: classification done, {} row(s) buffered",
            self.index, rows
        );
        Ok(QuantisingBand {
            key: self.key,
            index: self.index,
            canonical: self.canonical,
            timestamps: self.timestamps,
            reservoir: self.reservoir,
            scratch,
            accepted: self.accepted,
            reconciled: self.reconciled,
            rejected: self.rejected,
        })
    }
}

/// A band that finished classification and is ready for the
/// quantise-and-seal pass
pub struct QuantisingBand {
    pub key: BandKey,
    pub index: usize,
    pub canonical: Vec<f64>,
    pub timestamps: Vec<f64>,
    pub reservoir: Reservoir,
    pub scratch: PathBuf,
    pub accepted: u64,
    pub reconciled: u64,
    pub rejected: u64,
}

impl QuantisingBand {
    /// Rows buffered in the scratch file
    pub fn rows(&self) -> usize {
        self.timestamps.len()
    }

    /// Row permutation by ascending timestamp, ties broken by insertion
    /// order, so output is deterministic regardless of chunk order
    pub fn time_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.timestamps.len()).collect();
        order.sort_by(|&a, &b| {
            self.timestamps[a]
                .partial_cmp(&self.timestamps[b])
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        });
        order
    }
}

/// The process-wide band registry.
///
/// The only mutable shared state during a build; a single mutex guards
/// insert and lookup so the classifier can fan records out to workers.
pub struct BandRegistry {
    inner: Mutex<RegistryInner>,
    data_dir: PathBuf,
    tolerance: f64,
}

struct RegistryInner {
    bands: HashMap<BandKey, BandBuilder>,
    order: Vec<BandKey>,
}

impl BandRegistry {
    pub fn new(data_dir: PathBuf, tolerance: f64) -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                bands: HashMap::new(),
                order: Vec::new(),
            }),
            data_dir,
            tolerance,
        }
    }

    /// Route one record to its band, opening a new band on a fresh key
    pub fn dispatch(&self, record: &TraceRecord) -> std::io::Result<PushOutcome> {
        let key = BandKey::of(record);
        let mut inner = self.inner.lock().expect("band registry poisoned");

        if let Some(band) = inner.bands.get_mut(&key) {
            return band.push(record);
        }

        let index = inner.order.len();
        let band = BandBuilder::open(index, record, &self.data_dir, self.tolerance)?;
        inner.order.push(key);
        inner.bands.insert(key, band);
        Ok(PushOutcome::Accepted)
    }

    /// Number of bands opened so far
    pub fn len(&self) -> usize {
        self.inner.lock().expect("band registry poisoned").order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// End classification: drain builders in band-index order
    pub fn into_bands(self) -> std::io::Result<Vec<QuantisingBand>> {
        let inner = self.inner.into_inner().expect("band registry poisoned");
        let mut bands = Vec::with_capacity(inner.order.len());
        let mut map = inner.bands;
        for key in inner.order {
            let builder = map.remove(&key).expect("registry order out of sync");
            bands.push(builder.into_quantising()?);
        }
        Ok(bands)
    }
}
