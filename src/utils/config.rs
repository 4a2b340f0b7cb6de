//! Configuration and constants for the merge pipeline and query surface.

/// File extension for capture chunks (spectrum binary chunk)
pub const CHUNK_EXTENSION: &str = "sbc";

/// Relative tolerance for accepting a near-matching frequency grid.
/// Grids further apart than this at any index are rejected as drift.
pub const GRID_REL_TOLERANCE: f64 = 1e-6;

/// Maximum number of power samples retained for percentile estimation
pub const RESERVOIR_CAP: usize = 1_000_000;

/// Lower percentile used for the quantisation range
pub const RANGE_LO_PERCENTILE: f64 = 0.5;

/// Upper percentile used for the quantisation range
pub const RANGE_HI_PERCENTILE: f64 = 99.5;

/// Widening applied on each end of the percentile range, in dB
pub const RANGE_WIDEN_DB: f64 = 2.0;

/// Largest int16 code emitted by the quantiser (codes are non-negative)
pub const CODE_MAX: i32 = 32_767;

/// The tier pyramid stops at the first level with at most this many bins
pub const TIER_FLOOR_BINS: usize = 256;

/// Default point cap for summary queries
pub const DEFAULT_SUMMARY_MAX_PTS: usize = 2200;

/// Default width cap for waterfall tiles, in cells
pub const DEFAULT_TILE_MAXW: usize = 1600;

/// Default height cap for waterfall tiles, in cells
pub const DEFAULT_TILE_MAXT: usize = 600;

// /// Maximum chunk frame size we'll attempt to parse (64 MB)
/*
pub const MAX_FRAME_SIZE_BYTES: usize = 64 * 1024 * 1024;
*/
