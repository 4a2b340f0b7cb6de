//! Capture chunk discovery and the built-in frame reader.
//!
//! Chunks are length-delimited binary files: each frame is a little-endian
//! `u32` byte length followed by the payload. The built-in payload layout:
//!
//! ```text
//! f64  unix_time    seconds
//! u32  n_freqs
//! f64  f_start      hertz
//! f64  f_stop       hertz
//! n_freqs x f32     power, dB
//! ```
//!
//! The wire decoder seam is the `ChunkDecoder` trait, so an alternate
//! capture format can be plugged into the same build pipeline.

use crate::decoder::record::TraceRecord;
use crate::utils::config::CHUNK_EXTENSION;
use crate::utils::error::DecodeError;
use log::{debug, warn};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Fixed payload bytes before the power samples
const PAYLOAD_HEADER_LEN: usize = 8 + 4 + 8 + 8;

/// Decoder collaborator interface
///
/// **Public** - the build pipeline is generic over the chunk format.
/// Implementations yield records in file order; per-record failures are
/// skippable, underlying I/O failures are fatal.
pub trait ChunkDecoder {
    /// Open a chunk and return an iterator over its records
    fn open(
        &self,
        path: &Path,
    ) -> std::io::Result<Box<dyn Iterator<Item = Result<TraceRecord, DecodeError>> + Send>>;
}

/// The built-in length-delimited frame decoder
///
/// **Public** - default decoder used by the merge command
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameDecoder;

impl ChunkDecoder for FrameDecoder {
    fn open(
        &self,
        path: &Path,
    ) -> std::io::Result<Box<dyn Iterator<Item = Result<TraceRecord, DecodeError>> + Send>> {
        let file = File::open(path)?;
        debug!("Opened chunk: {}", path.display());
        Ok(Box::new(FrameIter {
            reader: BufReader::new(file),
            path: path.to_path_buf(),
            done: false,
        }))
    }
}

/// Iterator over frames of one chunk file
struct FrameIter {
    reader: BufReader<File>,
    path: PathBuf,
    done: bool,
}

impl Iterator for FrameIter {
    type Item = Result<TraceRecord, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        // Frame length header; clean EOF between frames ends the stream
        let mut header = [0u8; 4];
        match read_exact_or_eof(&mut self.reader, &mut header) {
            Ok(ReadOutcome::Eof) => {
                self.done = true;
                return None;
            }
            Ok(ReadOutcome::Short) => {
                warn!("Truncated frame header in {}, stopping", self.path.display());
                self.done = true;
                return None;
            }
            Ok(ReadOutcome::Full) => {}
            Err(e) => {
                self.done = true;
                return Some(Err(DecodeError::Io(e)));
            }
        }

        let len = u32::from_le_bytes(header) as usize;
        let mut payload = vec![0u8; len];
        match read_exact_or_eof(&mut self.reader, &mut payload) {
            Ok(ReadOutcome::Full) => {}
            Ok(_) => {
                warn!("Truncated frame payload in {}, stopping", self.path.display());
                self.done = true;
                return None;
            }
            Err(e) => {
                self.done = true;
                return Some(Err(DecodeError::Io(e)));
            }
        }

        Some(parse_payload(&payload))
    }
}

enum ReadOutcome {
    Full,
    Short,
    Eof,
}

/// Fill `buf`, distinguishing clean EOF, mid-read truncation, and I/O error
fn read_exact_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<ReadOutcome> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            return Ok(if filled == 0 {
                ReadOutcome::Eof
            } else {
                ReadOutcome::Short
            });
        }
        filled += n;
    }
    Ok(ReadOutcome::Full)
}

/// Parse one frame payload into a validated record
///
/// **Private** - internal to the frame iterator
fn parse_payload(payload: &[u8]) -> Result<TraceRecord, DecodeError> {
    if payload.len() < PAYLOAD_HEADER_LEN {
        return Err(DecodeError::BadRecord(format!(
            "payload too short: {} bytes",
            payload.len()
        )));
    }

    let unix_time = f64::from_le_bytes(payload[0..8].try_into().unwrap());
    let n_freqs = u32::from_le_bytes(payload[8..12].try_into().unwrap()) as usize;
    let f_start = f64::from_le_bytes(payload[12..20].try_into().unwrap());
    let f_stop = f64::from_le_bytes(payload[20..28].try_into().unwrap());

    let expected = PAYLOAD_HEADER_LEN + n_freqs * 4;
    if payload.len() != expected {
        return Err(DecodeError::BadRecord(format!(
            "payload length {} does not match {} samples",
            payload.len(),
            n_freqs
        )));
    }
    if f_start >= f_stop {
        return Err(DecodeError::BadRecord(format!(
            "degenerate axis: {f_start} >= {f_stop}"
        )));
    }

    let power_db: Vec<f32> = payload[PAYLOAD_HEADER_LEN..]
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes(b.try_into().unwrap()))
        .collect();

    let record = TraceRecord::from_endpoints(unix_time, f_start, f_stop, power_db);
    record.validate().map_err(DecodeError::BadRecord)?;
    Ok(record)
}

/// Write records to a chunk file in the built-in frame format
///
/// **Public** - used by capture tooling and test fixtures
pub fn write_chunk(path: &Path, records: &[TraceRecord]) -> std::io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    for record in records {
        let n = record.n_freqs();
        let mut payload = Vec::with_capacity(PAYLOAD_HEADER_LEN + n * 4);
        payload.extend_from_slice(&record.unix_time.to_le_bytes());
        payload.extend_from_slice(&(n as u32).to_le_bytes());
        payload.extend_from_slice(&record.f_start().to_le_bytes());
        payload.extend_from_slice(&record.f_stop().to_le_bytes());
        for p in &record.power_db {
            payload.extend_from_slice(&p.to_le_bytes());
        }
        writer.write_all(&(payload.len() as u32).to_le_bytes())?;
        writer.write_all(&payload)?;
    }

    writer.flush()
}

/// Discover capture chunks under the given files and directories
///
/// **Public** - input discovery for the merge command
///
/// Directories are walked recursively; only files with the chunk
/// extension are collected. The result is sorted by path so that runs
/// are deterministic regardless of filesystem enumeration order.
pub fn find_chunks(inputs: &[PathBuf]) -> std::io::Result<Vec<PathBuf>> {
    let mut chunks = Vec::new();

    for input in inputs {
        if input.is_dir() {
            collect_dir(input, &mut chunks)?;
        } else if input.is_file() && has_chunk_extension(input) {
            chunks.push(input.clone());
        }
    }

    chunks.sort();
    debug!("Discovered {} chunk(s)", chunks.len());
    Ok(chunks)
}

fn collect_dir(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_dir(&path, out)?;
        } else if has_chunk_extension(&path) {
            out.push(path);
        }
    }
    Ok(())
}

fn has_chunk_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(CHUNK_EXTENSION))
}
