//! The per-band build pipeline.
//!
//! This module transforms decoded trace records into sealed artifacts:
//! - Band classification by frequency-grid fingerprint
//! - Grid reconciliation onto the canonical axis
//! - Power quantisation range estimation (reservoir + percentiles)
//! - Per-frequency summary accumulation
//! - Multi-resolution tier pyramid construction

pub mod classifier;
pub mod quantizer;
pub mod reconcile;
pub mod summary;
pub mod tiers;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// Re-export main types
pub use classifier::{BandBuilder, BandKey, BandRegistry, BandState, PushOutcome, QuantisingBand};
pub use quantizer::{QuantRange, Reservoir};
pub use summary::{SummaryAccumulator, SummaryTriple};
pub use tiers::{build_pyramid, level_axis, TierLevel, TierPyramid};

/// Cooperative cancellation flag for the build pipeline.
///
/// Checked between records and between bands; a cancelled build rolls
/// back any in-flight band before returning.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
