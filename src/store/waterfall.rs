//! Waterfall row storage: the float32 scratch buffer and the final
//! memory-mapped int16 store.
//!
//! Rows arrive before the band's quantisation range is known, so the
//! first pass appends raw f32 rows to a scratch file. Once the range is
//! fixed, the second pass reads the scratch sequentially, quantises, and
//! writes each row at its time-sorted rank into a pre-sized mmap. The
//! final file only appears under its real name after every row is
//! written and flushed, so readers never observe a partial store.

use log::debug;
use memmap2::MmapMut;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Append-only f32 row buffer for the pre-quantisation pass
pub struct ScratchWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    n_freqs: usize,
    rows: usize,
}

impl ScratchWriter {
    pub fn create(path: PathBuf, n_freqs: usize) -> std::io::Result<Self> {
        let file = File::create(&path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path,
            n_freqs,
            rows: 0,
        })
    }

    /// Append one row in arrival order
    pub fn append_row(&mut self, row: &[f32]) -> std::io::Result<()> {
        debug_assert_eq!(row.len(), self.n_freqs);
        for &value in row {
            self.writer.write_all(&value.to_le_bytes())?;
        }
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Flush and hand back the path for the read pass
    pub fn finish(mut self) -> std::io::Result<PathBuf> {
        self.writer.flush()?;
        Ok(self.path)
    }
}

/// Row-addressable reader over a finished scratch file
pub struct ScratchReader {
    reader: BufReader<File>,
    n_freqs: usize,
}

impl ScratchReader {
    pub fn open(path: &Path, n_freqs: usize) -> std::io::Result<Self> {
        Ok(Self {
            reader: BufReader::new(File::open(path)?),
            n_freqs,
        })
    }

    /// Read the next row into `row`; false on end of file
    pub fn read_row(&mut self, row: &mut [f32]) -> std::io::Result<bool> {
        debug_assert_eq!(row.len(), self.n_freqs);
        let mut buf = [0u8; 4];
        for (i, slot) in row.iter_mut().enumerate() {
            match self.reader.read_exact(&mut buf) {
                Ok(()) => *slot = f32::from_le_bytes(buf),
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof && i == 0 => {
                    return Ok(false);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }

    /// Read the row at `index`.
    ///
    /// The quantisation pass visits rows in time-sorted order so the
    /// summary accumulates identically regardless of chunk order; for
    /// already-ordered captures the seeks are sequential anyway.
    pub fn read_row_at(&mut self, index: usize, row: &mut [f32]) -> std::io::Result<()> {
        debug_assert_eq!(row.len(), self.n_freqs);
        self.reader
            .seek(SeekFrom::Start((index * self.n_freqs * 4) as u64))?;
        let mut buf = [0u8; 4];
        for slot in row.iter_mut() {
            self.reader.read_exact(&mut buf)?;
            *slot = f32::from_le_bytes(buf);
        }
        Ok(())
    }
}

/// Writer for the final int16 store.
///
/// The file is created under a temp name, sized exactly to
/// `2 * n_traces * n_freqs`, and memory-mapped. `seal` flushes the map
/// and renames to the final name.
pub struct WaterfallWriter {
    mmap: MmapMut,
    tmp_path: PathBuf,
    final_path: PathBuf,
    n_freqs: usize,
    n_traces: usize,
}

impl WaterfallWriter {
    pub fn create(
        tmp_path: PathBuf,
        final_path: PathBuf,
        n_traces: usize,
        n_freqs: usize,
    ) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.set_len((2 * n_traces * n_freqs) as u64)?;

        // Safety: the file is exclusively ours until the rename
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        debug!(
            "Created waterfall store {} ({} x {}, {} bytes)",
            tmp_path.display(),
            n_traces,
            n_freqs,
            2 * n_traces * n_freqs
        );

        Ok(Self {
            mmap,
            tmp_path,
            final_path,
            n_freqs,
            n_traces,
        })
    }

    /// Write one quantised row at its time-sorted rank
    pub fn write_row(&mut self, rank: usize, row: &[i16]) {
        debug_assert_eq!(row.len(), self.n_freqs);
        debug_assert!(rank < self.n_traces);
        let offset = rank * 2 * self.n_freqs;
        for (i, &code) in row.iter().enumerate() {
            let bytes = code.to_le_bytes();
            self.mmap[offset + 2 * i] = bytes[0];
            self.mmap[offset + 2 * i + 1] = bytes[1];
        }
    }

    /// Flush the map and atomically rename into place
    pub fn seal(self) -> std::io::Result<()> {
        self.mmap.flush()?;
        drop(self.mmap);
        std::fs::rename(&self.tmp_path, &self.final_path)?;
        debug!("Sealed waterfall store {}", self.final_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("band.scratch");

        let mut writer = ScratchWriter::create(path.clone(), 4).unwrap();
        writer.append_row(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        writer.append_row(&[5.0, 6.0, 7.0, 8.0]).unwrap();
        assert_eq!(writer.rows(), 2);
        let path = writer.finish().unwrap();

        let mut reader = ScratchReader::open(&path, 4).unwrap();
        let mut row = [0f32; 4];
        assert!(reader.read_row(&mut row).unwrap());
        assert_eq!(row, [1.0, 2.0, 3.0, 4.0]);
        assert!(reader.read_row(&mut row).unwrap());
        assert_eq!(row, [5.0, 6.0, 7.0, 8.0]);
        assert!(!reader.read_row(&mut row).unwrap());
    }

    #[test]
    fn test_waterfall_size_and_rename() {
        let dir = tempfile::tempdir().unwrap();
        let tmp = dir.path().join("wf.dat.tmp");
        let final_path = dir.path().join("wf.dat");

        let mut writer = WaterfallWriter::create(tmp.clone(), final_path.clone(), 3, 2).unwrap();
        writer.write_row(2, &[1, 2]);
        writer.write_row(0, &[3, 4]);
        writer.write_row(1, &[5, 6]);

        assert!(!final_path.exists());
        writer.seal().unwrap();
        assert!(final_path.exists());
        assert!(!tmp.exists());

        let bytes = std::fs::read(&final_path).unwrap();
        assert_eq!(bytes.len(), 2 * 3 * 2);
        let codes: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(codes, vec![3, 4, 5, 6, 1, 2]);
    }
}
