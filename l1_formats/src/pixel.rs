//! 16-bit color conversions used by every bitmap format in the client.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const TRANSPARENT: Rgba8 = Rgba8 {
        r: 0,
        g: 0,
        b: 0,
        a: 0,
    };

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Rgba8 { r, g, b, a: 0xFF }
    }

    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub fn from_slice(bytes: &[u8]) -> Self {
        Rgba8 {
            r: bytes[0],
            g: bytes[1],
            b: bytes[2],
            a: bytes[3],
        }
    }
}

/// Which 16-bit value, if any, stands for "no pixel".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transparency {
    /// Plain L1 images: value 0 is transparent.
    ZeroIsTransparent,
    /// Sprite frames: 0 is an opaque black and a separate mask is carried.
    Mask(u16),
}

impl Transparency {
    pub fn is_transparent(self, value: u16) -> bool {
        match self {
            Transparency::ZeroIsTransparent => value == 0,
            Transparency::Mask(mask) => value == mask,
        }
    }
}

#[inline]
fn expand5(v: u8) -> u8 {
    (v << 3) | (v >> 2)
}

#[inline]
fn expand6(v: u8) -> u8 {
    (v << 2) | (v >> 4)
}

/// `0RRRRRGGGGGBBBBB` to RGBA8888, alpha fixed at 255.
pub fn rgb555_to_rgba(value: u16) -> Rgba8 {
    let r = ((value >> 10) & 0x1F) as u8;
    let g = ((value >> 5) & 0x1F) as u8;
    let b = (value & 0x1F) as u8;
    Rgba8::opaque(expand5(r), expand5(g), expand5(b))
}

/// `RRRRRGGGGGGBBBBB` to RGBA8888, alpha fixed at 255.
pub fn rgb565_to_rgba(value: u16) -> Rgba8 {
    let r = ((value >> 11) & 0x1F) as u8;
    let g = ((value >> 5) & 0x3F) as u8;
    let b = (value & 0x1F) as u8;
    Rgba8::opaque(expand5(r), expand6(g), expand5(b))
}

pub fn rgba_to_rgb555(color: Rgba8) -> u16 {
    ((color.r as u16 >> 3) << 10) | ((color.g as u16 >> 3) << 5) | (color.b as u16 >> 3)
}

pub fn rgba_to_rgb565(color: Rgba8) -> u16 {
    ((color.r as u16 >> 3) << 11) | ((color.g as u16 >> 2) << 5) | (color.b as u16 >> 3)
}

/// Expands an RGB555 buffer into tightly packed RGBA bytes.
pub fn expand_rgb555(pixels: &[u16], transparency: Transparency) -> Vec<u8> {
    let mut rgba = Vec::with_capacity(pixels.len() * 4);
    for &value in pixels {
        let color = if transparency.is_transparent(value) {
            Rgba8::TRANSPARENT
        } else {
            rgb555_to_rgba(value)
        };
        rgba.extend_from_slice(&color.to_array());
    }
    rgba
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn white_and_black_expand_to_full_range() {
        assert_eq!(rgb555_to_rgba(0x7FFF), Rgba8::opaque(0xFF, 0xFF, 0xFF));
        assert_eq!(rgb555_to_rgba(0x0000), Rgba8::opaque(0, 0, 0));
        assert_eq!(rgb565_to_rgba(0xFFFF), Rgba8::opaque(0xFF, 0xFF, 0xFF));
        assert_eq!(rgb565_to_rgba(0xF81F), Rgba8::opaque(0xFF, 0x00, 0xFF));
    }

    #[test]
    fn every_16_bit_value_converts_and_packs_back() {
        for value in 0..=u16::MAX {
            let c555 = rgb555_to_rgba(value);
            assert_eq!(c555.a, 0xFF);
            assert_eq!(rgba_to_rgb555(c555), value & 0x7FFF);

            let c565 = rgb565_to_rgba(value);
            assert_eq!(c565.a, 0xFF);
            assert_eq!(rgba_to_rgb565(c565), value);
        }
    }

    #[test]
    fn channel_expansion_is_recoverable() {
        for v in 0u8..32 {
            assert_eq!(expand5(v) >> 3, v);
        }
        for v in 0u8..64 {
            assert_eq!(expand6(v) >> 2, v);
        }
    }

    #[test]
    fn mask_policy_differs_from_zero_policy() {
        let pixels = [0x0000, 0x7C1F];
        let zero = expand_rgb555(&pixels, Transparency::ZeroIsTransparent);
        assert_eq!(&zero[0..4], &[0, 0, 0, 0]);
        assert_eq!(zero[7], 0xFF);

        let masked = expand_rgb555(&pixels, Transparency::Mask(0x7C1F));
        assert_eq!(&masked[0..4], &[0, 0, 0, 0xFF]);
        assert_eq!(&masked[4..8], &[0, 0, 0, 0]);
    }
}
