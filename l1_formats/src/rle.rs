//! Scanline run-length coding shared by L1 images, tile sets and sprites.
//!
//! Every row starts with a segment count. Each segment is a skip byte
//! (stored doubled, i.e. in bytes of 16-bit pixels), a run length, and
//! `run` little-endian 16-bit colors.

use crate::error::{Error, Result};
use crate::stream::ByteReader;

/// Largest gap (in pixels) a single skip byte can express.
const MAX_SKIP: usize = 0x7F;
const MAX_RUN: usize = 0xFF;

/// Walks `rows` encoded rows, handing every decoded pixel to `visit` as
/// `(column, row, color)`. Coordinates are not clipped here.
pub(crate) fn walk_rows<F>(
    reader: &mut ByteReader<'_>,
    first_row: usize,
    rows: usize,
    start_column: usize,
    mut visit: F,
) -> Result<()>
where
    F: FnMut(usize, usize, u16),
{
    for row in 0..rows {
        let y = first_row + row;
        let segments = reader.u8("scanline segment count")?;
        let mut x = start_column;
        for _ in 0..segments {
            let skip = reader.u8("scanline skip")? as usize / 2;
            let run = reader.u8("scanline run length")? as usize;
            x += skip;
            for _ in 0..run {
                let color = reader.u16("scanline color")?;
                visit(x, y, color);
                x += 1;
            }
        }
    }
    Ok(())
}

/// Decodes `height` rows into a zero-filled `width * height` buffer.
/// Pixels landing outside `[0, width)` are dropped.
pub(crate) fn decode_scanline_rle(
    reader: &mut ByteReader<'_>,
    width: usize,
    height: usize,
) -> Result<Vec<u16>> {
    let mut pixels = vec![0u16; width * height];
    let mut dropped = 0usize;
    walk_rows(reader, 0, height, 0, |x, y, color| {
        if x < width && y < height {
            pixels[y * width + x] = color;
        } else {
            dropped += 1;
        }
    })?;
    if dropped > 0 {
        log::debug!("discarded {dropped} scanline pixels beyond declared width {width}");
    }
    Ok(pixels)
}

/// Dry pass over `height` rows returning the widest column actually written.
/// The reader is copied, so the caller's position does not move.
pub(crate) fn measure_scanline_rle(reader: &ByteReader<'_>, height: usize) -> Result<usize> {
    let mut dry = *reader;
    let mut extent = 0usize;
    walk_rows(&mut dry, 0, height, 0, |x, _, _| {
        extent = extent.max(x + 1);
    })?;
    Ok(extent)
}

/// Encodes a `width * height` area; `pixel` returns `None` for gaps.
pub(crate) fn encode_scanline_rle<F>(width: usize, height: usize, pixel: F) -> Result<Vec<u8>>
where
    F: Fn(usize, usize) -> Option<u16>,
{
    let mut out = Vec::new();
    for y in 0..height {
        let mut segments: Vec<(usize, Vec<u16>)> = Vec::new();
        let mut cursor = 0usize;
        let mut x = 0usize;
        while x < width {
            if pixel(x, y).is_none() {
                x += 1;
                continue;
            }
            let start = x;
            let mut run = Vec::new();
            while x < width && run.len() < MAX_RUN {
                match pixel(x, y) {
                    Some(color) => run.push(color),
                    None => break,
                }
                x += 1;
            }

            let mut gap = start - cursor;
            while gap > MAX_SKIP {
                segments.push((MAX_SKIP, Vec::new()));
                gap -= MAX_SKIP;
            }
            cursor = start + run.len();
            segments.push((gap, run));
        }

        if segments.len() > u8::MAX as usize {
            return Err(Error::out_of_range(format!(
                "row {y} needs {} segments, at most 255 fit",
                segments.len()
            )));
        }
        out.push(segments.len() as u8);
        for (skip, run) in segments {
            out.push((skip * 2) as u8);
            out.push(run.len() as u8);
            for color in run {
                out.extend_from_slice(&color.to_le_bytes());
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_byte_is_halved() {
        // one row: skip 4 bytes (2 pixels), run 1
        let data = [1u8, 4, 1, 0x34, 0x12];
        let mut reader = ByteReader::new(&data);
        let pixels = decode_scanline_rle(&mut reader, 4, 1).unwrap();
        assert_eq!(pixels, vec![0, 0, 0x1234, 0]);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn pixels_past_declared_width_are_dropped_but_measured() {
        // run of three pixels in a two-pixel-wide row
        let data = [1u8, 0, 3, 1, 0, 2, 0, 3, 0];
        let reader = ByteReader::new(&data);
        assert_eq!(measure_scanline_rle(&reader, 1).unwrap(), 3);

        let mut reader = ByteReader::new(&data);
        let pixels = decode_scanline_rle(&mut reader, 2, 1).unwrap();
        assert_eq!(pixels, vec![1, 2]);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn truncated_row_is_an_error() {
        let data = [1u8, 0, 2, 0xFF, 0x7F];
        let mut reader = ByteReader::new(&data);
        assert!(matches!(
            decode_scanline_rle(&mut reader, 2, 1),
            Err(Error::TruncatedInput { .. })
        ));
    }

    #[test]
    fn long_gaps_split_into_empty_segments() {
        let width = 300;
        let encoded = encode_scanline_rle(width, 1, |x, _| (x == 299).then_some(0x0421)).unwrap();
        // 299 = 127 + 127 + 45
        assert_eq!(encoded[0], 3);
        assert_eq!(&encoded[1..3], &[254, 0]);
        assert_eq!(&encoded[3..5], &[254, 0]);
        assert_eq!(&encoded[5..7], &[90, 1]);

        let mut reader = ByteReader::new(&encoded);
        let pixels = decode_scanline_rle(&mut reader, width, 1).unwrap();
        assert_eq!(pixels[299], 0x0421);
        assert!(pixels[..299].iter().all(|&p| p == 0));
    }

    #[test]
    fn encoder_output_decodes_to_same_runs() {
        let source: [[Option<u16>; 5]; 2] = [
            [Some(1), Some(2), None, None, Some(3)],
            [None, None, None, None, None],
        ];
        let encoded = encode_scanline_rle(5, 2, |x, y| source[y][x]).unwrap();
        let mut reader = ByteReader::new(&encoded);
        let pixels = decode_scanline_rle(&mut reader, 5, 2).unwrap();
        assert_eq!(pixels, vec![1, 2, 0, 0, 3, 0, 0, 0, 0, 0]);
    }
}
