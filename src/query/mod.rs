//! Read-only query surface over sealed band artifacts.
//!
//! This module serves the viewer-facing operations:
//! - Band listing and manifests
//! - Summary windows resampled from the tier pyramid
//! - Waterfall tile extraction (box-averaged, colormapped, PNG)
//! - Peak detection with prominence and distance filtering
//!
//! All operations are `&self` over immutable memory-mapped state; sealed
//! artifacts never change, so concurrent readers need no locking.

pub mod dataset;
pub mod peaks;
pub mod tile;

// Re-export main types
pub use dataset::{list_bands, BandDataset, BandInfo, SummaryWindow};
pub use peaks::{detect_peaks, Curve, Peak, PeakParams};
pub use tile::{waterfall_tile, AxisBounds, TileFormat, TileRequest, TileResponse};
