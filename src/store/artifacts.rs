//! Binary axis vectors and the named-vector summary archive.
//!
//! The axis files are headerless little-endian dumps (`f64` frequencies,
//! `i64` relative times). The summary archive is a tiny self-describing
//! container so curves stay name-addressed:
//!
//! ```text
//! [4] magic "SARC"   [4] u32 version   [4] u32 entry count
//! per entry: [1] u8 name length, name bytes, [8] u64 element count,
//!            element count x f32 little-endian
//! ```

use crate::pipeline::summary::SummaryTriple;
use crate::utils::error::ArtifactError;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

const SUMMARY_MAGIC: &[u8; 4] = b"SARC";
const SUMMARY_VERSION: u32 = 1;

fn io_err(path: &Path, source: std::io::Error) -> ArtifactError {
    ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn corrupt(path: &Path, reason: impl Into<String>) -> ArtifactError {
    ArtifactError::Corrupt {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Write a little-endian f64 vector
pub fn write_f64_vec(path: &Path, values: &[f64]) -> Result<(), ArtifactError> {
    let mut writer = BufWriter::new(File::create(path).map_err(|e| io_err(path, e))?);
    for v in values {
        writer
            .write_all(&v.to_le_bytes())
            .map_err(|e| io_err(path, e))?;
    }
    writer.flush().map_err(|e| io_err(path, e))
}

/// Read a little-endian f64 vector
pub fn read_f64_vec(path: &Path) -> Result<Vec<f64>, ArtifactError> {
    let bytes = std::fs::read(path).map_err(|e| io_err(path, e))?;
    if bytes.len() % 8 != 0 {
        return Err(corrupt(path, "length is not a multiple of 8"));
    }
    Ok(bytes
        .chunks_exact(8)
        .map(|b| f64::from_le_bytes(b.try_into().unwrap()))
        .collect())
}

/// Write a little-endian i64 vector
pub fn write_i64_vec(path: &Path, values: &[i64]) -> Result<(), ArtifactError> {
    let mut writer = BufWriter::new(File::create(path).map_err(|e| io_err(path, e))?);
    for v in values {
        writer
            .write_all(&v.to_le_bytes())
            .map_err(|e| io_err(path, e))?;
    }
    writer.flush().map_err(|e| io_err(path, e))
}

/// Read a little-endian i64 vector
pub fn read_i64_vec(path: &Path) -> Result<Vec<i64>, ArtifactError> {
    let bytes = std::fs::read(path).map_err(|e| io_err(path, e))?;
    if bytes.len() % 8 != 0 {
        return Err(corrupt(path, "length is not a multiple of 8"));
    }
    Ok(bytes
        .chunks_exact(8)
        .map(|b| i64::from_le_bytes(b.try_into().unwrap()))
        .collect())
}

/// Write the summary archive (entries in order: max, avg, min)
pub fn write_summary(path: &Path, summary: &SummaryTriple) -> Result<(), ArtifactError> {
    let mut writer = BufWriter::new(File::create(path).map_err(|e| io_err(path, e))?);

    let entries: [(&str, &[f32]); 3] = [
        ("max", &summary.max),
        ("avg", &summary.avg),
        ("min", &summary.min),
    ];

    let mut emit = || -> std::io::Result<()> {
        writer.write_all(SUMMARY_MAGIC)?;
        writer.write_all(&SUMMARY_VERSION.to_le_bytes())?;
        writer.write_all(&(entries.len() as u32).to_le_bytes())?;
        for (name, values) in entries {
            writer.write_all(&[name.len() as u8])?;
            writer.write_all(name.as_bytes())?;
            writer.write_all(&(values.len() as u64).to_le_bytes())?;
            for v in values {
                writer.write_all(&v.to_le_bytes())?;
            }
        }
        writer.flush()
    };

    emit().map_err(|e| io_err(path, e))
}

/// Read the summary archive back
pub fn read_summary(path: &Path) -> Result<SummaryTriple, ArtifactError> {
    let mut reader = BufReader::new(File::open(path).map_err(|e| io_err(path, e))?);

    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic).map_err(|e| io_err(path, e))?;
    if &magic != SUMMARY_MAGIC {
        return Err(corrupt(path, "bad magic"));
    }

    let version = read_u32(&mut reader, path)?;
    if version != SUMMARY_VERSION {
        return Err(corrupt(path, format!("unsupported version {version}")));
    }

    let count = read_u32(&mut reader, path)?;
    let mut max = None;
    let mut avg = None;
    let mut min = None;

    for _ in 0..count {
        let mut name_len = [0u8; 1];
        reader
            .read_exact(&mut name_len)
            .map_err(|e| io_err(path, e))?;
        let mut name = vec![0u8; name_len[0] as usize];
        reader.read_exact(&mut name).map_err(|e| io_err(path, e))?;

        let mut len_bytes = [0u8; 8];
        reader
            .read_exact(&mut len_bytes)
            .map_err(|e| io_err(path, e))?;
        let len = u64::from_le_bytes(len_bytes) as usize;

        let mut data = vec![0u8; len * 4];
        reader.read_exact(&mut data).map_err(|e| io_err(path, e))?;
        let values: Vec<f32> = data
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes(b.try_into().unwrap()))
            .collect();

        match name.as_slice() {
            b"max" => max = Some(values),
            b"avg" => avg = Some(values),
            b"min" => min = Some(values),
            other => {
                return Err(corrupt(
                    path,
                    format!("unknown entry {:?}", String::from_utf8_lossy(other)),
                ))
            }
        }
    }

    match (max, avg, min) {
        (Some(max), Some(avg), Some(min))
            if max.len() == avg.len() && avg.len() == min.len() =>
        {
            Ok(SummaryTriple { max, avg, min })
        }
        _ => Err(corrupt(path, "missing or mismatched summary entries")),
    }
}

fn read_u32(reader: &mut impl Read, path: &Path) -> Result<u32, ArtifactError> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes).map_err(|e| io_err(path, e))?;
    Ok(u32::from_le_bytes(bytes))
}
