use serde::Serialize;

use crate::error::{Error, Result};
use crate::pixel::{Rgba8, Transparency, expand_rgb555, rgba_to_rgb555};
use crate::rle::{decode_scanline_rle, encode_scanline_rle, measure_scanline_rle};
use crate::stream::ByteReader;

/// Decoded RGBA bitmap. Used for L1 images, tiles and composited frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawImage {
    pub width: usize,
    pub height: usize,
    pub x_offset: i32,
    pub y_offset: i32,
    #[serde(skip)]
    pub rgba: Vec<u8>,
}

impl RawImage {
    pub fn blank(width: usize, height: usize) -> Self {
        RawImage {
            width,
            height,
            x_offset: 0,
            y_offset: 0,
            rgba: vec![0; width * height * 4],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn pixel(&self, x: usize, y: usize) -> Rgba8 {
        let index = (y * self.width + x) * 4;
        Rgba8::from_slice(&self.rgba[index..index + 4])
    }

    pub fn set_pixel(&mut self, x: usize, y: usize, color: Rgba8) {
        let index = (y * self.width + x) * 4;
        self.rgba[index..index + 4].copy_from_slice(&color.to_array());
    }

    /// Decodes an L1 image using the width declared in its header.
    pub fn decode_l1(bytes: &[u8]) -> Result<Self> {
        decode_l1(bytes, false)
    }

    /// Like [`RawImage::decode_l1`], but widens the canvas when segments
    /// run past the declared width.
    pub fn decode_l1_measured(bytes: &[u8]) -> Result<Self> {
        decode_l1(bytes, true)
    }

    /// Packs the image back into the L1 layout. Pixels with zero alpha
    /// become gaps.
    pub fn encode_l1(&self) -> Result<Vec<u8>> {
        let fields = [
            ("x offset", self.x_offset as i64),
            ("y offset", self.y_offset as i64),
            ("width", self.width as i64),
            ("height", self.height as i64),
        ];
        for (name, value) in fields {
            if !(0..=u8::MAX as i64).contains(&value) {
                return Err(Error::InvalidDimensions(format!(
                    "L1 image {name} {value} does not fit in a byte"
                )));
            }
        }
        if self.rgba.len() != self.width * self.height * 4 {
            return Err(Error::InvalidDimensions(format!(
                "{}x{} image carries {} RGBA bytes",
                self.width,
                self.height,
                self.rgba.len()
            )));
        }

        let mut out = vec![
            self.x_offset as u8,
            self.y_offset as u8,
            self.width as u8,
            self.height as u8,
        ];
        if self.is_empty() {
            return Ok(out);
        }
        let rows = encode_scanline_rle(self.width, self.height, |x, y| {
            let color = self.pixel(x, y);
            (color.a != 0).then(|| rgba_to_rgb555(color))
        })?;
        out.extend_from_slice(&rows);
        Ok(out)
    }
}

fn decode_l1(bytes: &[u8], measure: bool) -> Result<RawImage> {
    let mut reader = ByteReader::new(bytes);
    let x_offset = reader.u8("L1 image header")?;
    let y_offset = reader.u8("L1 image header")?;
    let declared_width = reader.u8("L1 image header")? as usize;
    let height = reader.u8("L1 image header")? as usize;

    if declared_width == 0 || height == 0 {
        return Ok(RawImage {
            width: 0,
            height: 0,
            x_offset: x_offset as i32,
            y_offset: y_offset as i32,
            rgba: Vec::new(),
        });
    }

    let width = if measure {
        declared_width.max(measure_scanline_rle(&reader, height)?)
    } else {
        declared_width
    };
    let pixels = decode_scanline_rle(&mut reader, width, height)?;

    Ok(RawImage {
        width,
        height,
        x_offset: x_offset as i32,
        y_offset: y_offset as i32,
        rgba: expand_rgb555(&pixels, Transparency::ZeroIsTransparent),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_by_two() -> Vec<u8> {
        let mut data = vec![0u8, 0, 2, 2];
        // row 0: one segment, skip 0, run 2, white then zero
        data.extend_from_slice(&[1, 0, 2]);
        data.extend_from_slice(&0x7FFFu16.to_le_bytes());
        data.extend_from_slice(&0x0000u16.to_le_bytes());
        // row 1: no segments
        data.push(0);
        data
    }

    #[test]
    fn decodes_two_by_two_with_zero_transparency() {
        let image = RawImage::decode_l1(&two_by_two()).unwrap();
        assert_eq!((image.width, image.height), (2, 2));
        assert_eq!(image.pixel(0, 0), Rgba8::opaque(0xFF, 0xFF, 0xFF));
        assert_eq!(image.pixel(1, 0), Rgba8::TRANSPARENT);
        assert_eq!(image.pixel(0, 1), Rgba8::TRANSPARENT);
        assert_eq!(image.pixel(1, 1), Rgba8::TRANSPARENT);
    }

    #[test]
    fn zero_dimensions_yield_empty_image() {
        let image = RawImage::decode_l1(&[3, 4, 0, 9]).unwrap();
        assert!(image.is_empty());
        assert!(image.rgba.is_empty());
        assert_eq!(image.x_offset, 3);
    }

    #[test]
    fn measured_decode_widens_canvas() {
        // declared 1 pixel wide, row carries 3 pixels
        let mut data = vec![0u8, 0, 1, 1, 1, 0, 3];
        for color in [0x001Fu16, 0x03E0, 0x7C00] {
            data.extend_from_slice(&color.to_le_bytes());
        }
        let clipped = RawImage::decode_l1(&data).unwrap();
        assert_eq!(clipped.width, 1);

        let measured = RawImage::decode_l1_measured(&data).unwrap();
        assert_eq!(measured.width, 3);
        assert_eq!(measured.pixel(2, 0), Rgba8::opaque(0xFF, 0, 0));
    }

    #[test]
    fn encode_reproduces_original_layout() {
        let original = two_by_two();
        let image = RawImage::decode_l1(&original).unwrap();
        let encoded = image.encode_l1().unwrap();
        // the trailing zero pixel is transparent and therefore dropped
        let mut expected = vec![0u8, 0, 2, 2, 1, 0, 1];
        expected.extend_from_slice(&0x7FFFu16.to_le_bytes());
        expected.push(0);
        assert_eq!(encoded, expected);
        assert_eq!(RawImage::decode_l1(&encoded).unwrap(), image);
    }

    #[test]
    fn oversized_image_cannot_be_encoded() {
        let image = RawImage::blank(300, 1);
        assert!(matches!(
            image.encode_l1(),
            Err(Error::InvalidDimensions(_))
        ));
    }
}
