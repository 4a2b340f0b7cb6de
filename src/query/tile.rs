//! Waterfall tile extraction.
//!
//! Cuts a frequency/time subrectangle out of the int16 store, re-bins it
//! to the requested cell budget by box-averaging (mean over covered
//! codes, dequantised), runs the result through a fixed 256-entry
//! colormap, and encodes a PNG. The exact axis bounds of the delivered
//! image ride alongside the bytes; the HTTP gateway exposes them as
//! `X-Freq-*` / `X-Time-*` headers.

use crate::pipeline::quantizer::QuantRange;
use crate::query::dataset::{window_indices, BandDataset};
use crate::utils::error::QueryError;
use log::debug;
use std::io::Cursor;
use std::sync::OnceLock;

/// Requested tile window and budget
#[derive(Debug, Clone)]
pub struct TileRequest {
    /// Frequency window, hertz; `None` clamps to the canonical axis
    pub f0: Option<f64>,
    pub f1: Option<f64>,

    /// Time window, seconds from `unix0`; `None` clamps to `rel_t`
    pub t0: Option<f64>,
    pub t1: Option<f64>,

    /// Cell budget: at most `maxw` columns by `maxt` rows
    pub maxw: usize,
    pub maxt: usize,

    pub fmt: TileFormat,
}

/// Delivered encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileFormat {
    /// Colormapped PNG
    Png,
    /// Dequantised dB means as raw little-endian f32, row-major
    Raw,
}

/// Exact axis bounds of the delivered image
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct AxisBounds {
    /// First delivered frequency, hertz
    pub f_start: f64,
    /// Last delivered frequency, hertz
    pub f_end: f64,
    /// First delivered row time, seconds from `unix0`
    pub t_start: f64,
    /// Last delivered row time, seconds from `unix0`
    pub t_end: f64,
}

/// Encoded tile plus its geometry
#[derive(Debug, Clone)]
pub struct TileResponse {
    pub bytes: Vec<u8>,
    pub width: usize,
    pub height: usize,
    pub bounds: AxisBounds,
}

impl TileResponse {
    fn empty() -> Self {
        Self {
            bytes: Vec::new(),
            width: 0,
            height: 0,
            bounds: AxisBounds {
                f_start: 0.0,
                f_end: 0.0,
                t_start: 0.0,
                t_end: 0.0,
            },
        }
    }
}

/// Extract, re-bin, and encode one waterfall tile
///
/// **Public** - `get_waterfall_tile` of the query surface
///
/// An empty window (inverted or fully outside the data) returns an
/// empty, well-formed response rather than an error.
pub fn waterfall_tile(ds: &BandDataset, req: &TileRequest) -> Result<TileResponse, QueryError> {
    let freqs = ds.freqs();
    let times = ds.rel_t();

    let (f_lo, f_hi) = window_indices(freqs, req.f0, req.f1);
    let t_axis: Vec<f64> = times.iter().map(|&t| t as f64).collect();
    let (t_lo, t_hi) = window_indices(&t_axis, req.t0, req.t1);

    let n_cols = f_hi.saturating_sub(f_lo);
    let n_rows = t_hi.saturating_sub(t_lo);
    if n_cols == 0 || n_rows == 0 || req.maxw == 0 || req.maxt == 0 {
        return Ok(TileResponse::empty());
    }

    let width = n_cols.min(req.maxw);
    let height = n_rows.min(req.maxt);
    debug!(
        "Tile: {n_rows} x {n_cols} source cells -> {height} x {width} (band {})",
        ds.index
    );

    // Box-average into the output grid. Buckets share the floor of the
    // ratio; the final row/column takes the residual.
    let range = QuantRange {
        db_min: ds.manifest.db_min,
        db_max: ds.manifest.db_max,
        scale: ds.manifest.scale,
    };
    let row_base = n_rows / height;
    let col_base = n_cols / width;

    let mut tile = vec![0f64; width * height];
    for out_r in 0..height {
        let r0 = t_lo + out_r * row_base;
        let r1 = if out_r == height - 1 {
            t_hi
        } else {
            r0 + row_base
        };
        for out_c in 0..width {
            let c0 = f_lo + out_c * col_base;
            let c1 = if out_c == width - 1 {
                f_hi
            } else {
                c0 + col_base
            };

            let mut sum = 0f64;
            for r in r0..r1 {
                for c in c0..c1 {
                    sum += ds.code_at(r, c) as f64;
                }
            }
            let mean_code = sum / ((r1 - r0) * (c1 - c0)) as f64;
            tile[out_r * width + out_c] = range.dequantize_mean(mean_code);
        }
    }

    let bounds = AxisBounds {
        f_start: freqs[f_lo],
        f_end: freqs[f_hi - 1],
        t_start: times[t_lo] as f64,
        t_end: times[t_hi - 1] as f64,
    };

    let bytes = match req.fmt {
        TileFormat::Png => encode_png(&tile, width, height, &range)?,
        TileFormat::Raw => tile
            .iter()
            .flat_map(|&db| (db as f32).to_le_bytes())
            .collect(),
    };

    Ok(TileResponse {
        bytes,
        width,
        height,
        bounds,
    })
}

/// Colormap the dB tile over the band's quantisation range and encode
fn encode_png(
    tile: &[f64],
    width: usize,
    height: usize,
    range: &QuantRange,
) -> Result<Vec<u8>, QueryError> {
    let lut = colormap();
    let span = (range.db_max - range.db_min).max(f64::EPSILON);

    let mut pixels = Vec::with_capacity(width * height * 3);
    for &db in tile {
        let norm = ((db - range.db_min) / span).clamp(0.0, 1.0);
        let idx = (norm * 255.0).round() as usize;
        pixels.extend_from_slice(&lut[idx]);
    }

    let image = image::RgbImage::from_raw(width as u32, height as u32, pixels)
        .expect("pixel buffer matches dimensions");
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)?;
    Ok(bytes)
}

/// Anchor colors of the perceptually-ordered map, dark to bright
const COLORMAP_ANCHORS: [[u8; 3]; 8] = [
    [0, 0, 4],
    [40, 11, 84],
    [101, 21, 110],
    [159, 42, 99],
    [212, 72, 66],
    [245, 125, 21],
    [250, 193, 39],
    [252, 255, 164],
];

/// The fixed 256-entry lookup, linearly interpolated between anchors
fn colormap() -> &'static [[u8; 3]; 256] {
    static LUT: OnceLock<[[u8; 3]; 256]> = OnceLock::new();
    LUT.get_or_init(|| {
        let mut lut = [[0u8; 3]; 256];
        let segments = COLORMAP_ANCHORS.len() - 1;
        for (i, entry) in lut.iter_mut().enumerate() {
            let pos = i as f64 / 255.0 * segments as f64;
            let seg = (pos.floor() as usize).min(segments - 1);
            let t = pos - seg as f64;
            for ch in 0..3 {
                let a = COLORMAP_ANCHORS[seg][ch] as f64;
                let b = COLORMAP_ANCHORS[seg + 1][ch] as f64;
                entry[ch] = (a + (b - a) * t).round() as u8;
            }
        }
        lut
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_colormap_endpoints_and_monotone_luma() {
        let lut = colormap();
        assert_eq!(lut[0], COLORMAP_ANCHORS[0]);
        assert_eq!(lut[255], COLORMAP_ANCHORS[7]);

        // Perceptual ordering: luma should never decrease noticeably
        let luma =
            |c: [u8; 3]| 0.2126 * c[0] as f64 + 0.7152 * c[1] as f64 + 0.0722 * c[2] as f64;
        for i in 1..256 {
            assert!(luma(lut[i]) >= luma(lut[i - 1]) - 1.5, "dip at {i}");
        }
    }

    #[test]
    fn test_residual_bucketing() {
        // 7 source cells into 3 buckets: 2, 2, 3
        let n = 7usize;
        let out = 3usize;
        let base = n / out;
        let mut sizes = Vec::new();
        for j in 0..out {
            let start = j * base;
            let end = if j == out - 1 { n } else { start + base };
            sizes.push(end - start);
        }
        assert_eq!(sizes, vec![2, 2, 3]);
    }
}
