//! Chunk discovery and trace decoding.
//!
//! This module handles:
//! - Discovering capture chunks under input paths
//! - The decoder collaborator trait
//! - The built-in length-delimited frame reader
//! - Validating decoded trace records

pub mod chunk;
pub mod record;

// Re-export main types
pub use chunk::{find_chunks, write_chunk, ChunkDecoder, FrameDecoder};
pub use record::TraceRecord;
