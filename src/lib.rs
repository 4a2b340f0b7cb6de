//! bandmerge
//!
//! Batch merge-and-index engine for rotated RF spectrum captures.
//!
//! The pipeline parses capture chunks into time-ordered traces, groups
//! them into bands by frequency grid, quantises power into a compact
//! int16 waterfall store, and precomputes a multi-resolution tier
//! pyramid so a remote viewer can request arbitrary frequency/time
//! windows cheaply. A read-only query surface (summary sampling,
//! waterfall tiles, peak detection) serves the sealed artifacts.
//!
//! ## Getting Started
//!
//! Most users should install and use the CLI:
//!
//! ```bash
//! cargo install bandmerge
//! bandmerge --help
//! ```

pub mod commands;
pub mod decoder;
pub mod pipeline;
pub mod query;
pub mod store;
pub mod utils;
