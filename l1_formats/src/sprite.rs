//! Multi-frame sprite containers.
//!
//! Layout (little-endian):
//!
//! ```text
//! [0xFF, count:u8 (0 => 256), count x u16]   optional palette
//! frame_count:u8
//! frame_count x {
//!     x1, y1, x2, y2: i16
//!     unknown1, unknown2: u16
//!     block_count: u16
//!     block_count x { a:i8, b:i8, frame_type:u8, block_id:u16 }
//! }
//! tile table (see `tiles`)
//! ```
//!
//! Frames are composited from 24x24 tiles placed on a diamond grid.

use serde::Serialize;

use crate::bitmap::RawImage;
use crate::error::{Error, Result, Warning};
use crate::pixel::{Transparency, expand_rgb555};
use crate::stream::ByteReader;
use crate::tiles::{SubTile, TILE_SIZE, decode_tile_table, encode_tile_table};

pub const PALETTE_MARKER: u8 = 0xFF;

/// Colors tried, in order, as the frame mask color.
pub const MASK_CANDIDATES: [u16; 7] = [0x7C00, 0x0300, 0x001F, 0x7FE0, 0x03FF, 0x7C1F, 0x7FFF];

/// Transparency candidates that are still unused. Copy semantics: every
/// update produces a new snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskCandidates {
    remaining: u8,
}

impl Default for MaskCandidates {
    fn default() -> Self {
        Self::all()
    }
}

impl MaskCandidates {
    pub const fn all() -> Self {
        MaskCandidates {
            remaining: (1 << MASK_CANDIDATES.len()) - 1,
        }
    }

    #[must_use]
    pub fn without(self, color: u16) -> Self {
        match MASK_CANDIDATES.iter().position(|&c| c == color) {
            Some(index) => MaskCandidates {
                remaining: self.remaining & !(1 << index),
            },
            None => self,
        }
    }

    #[must_use]
    pub fn without_all<I>(self, colors: I) -> Self
    where
        I: IntoIterator<Item = u16>,
    {
        colors.into_iter().fold(self, MaskCandidates::without)
    }

    pub fn first(self) -> Option<u16> {
        MASK_CANDIDATES
            .iter()
            .enumerate()
            .find(|(index, _)| self.remaining & (1 << index) != 0)
            .map(|(_, &color)| color)
    }

    pub fn is_exhausted(self) -> bool {
        self.remaining == 0
    }
}

/// Tile placement inside a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockDef {
    pub a: i8,
    pub b: i8,
    pub frame_type: u8,
    pub block_id: u16,
}

impl BlockDef {
    /// Diamond-grid coordinates to the tile's top-left pixel.
    pub fn pixel_offset(&self) -> (i32, i32) {
        let a = self.a as i32;
        let b = self.b as i32;
        let half = a.div_euclid(2);
        (24 * (b + a - half), 12 * (b - half))
    }
}

/// Frame header as stored; the two unknown fields are carried untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameHeader {
    pub x1: i16,
    pub y1: i16,
    pub x2: i16,
    pub y2: i16,
    pub unknown1: u16,
    pub unknown2: u16,
    pub blocks: Vec<BlockDef>,
}

impl FrameHeader {
    fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        let x1 = reader.i16("frame bounds")?;
        let y1 = reader.i16("frame bounds")?;
        let x2 = reader.i16("frame bounds")?;
        let y2 = reader.i16("frame bounds")?;
        let unknown1 = reader.u16("frame header")?;
        let unknown2 = reader.u16("frame header")?;
        let block_count = reader.u16("block count")? as usize;
        if block_count * 5 > reader.remaining() {
            return Err(Error::TruncatedInput {
                context: "block definitions",
                needed: block_count * 5,
                available: reader.remaining(),
            });
        }
        let mut blocks = Vec::with_capacity(block_count);
        for _ in 0..block_count {
            blocks.push(BlockDef {
                a: reader.i8("block definition")?,
                b: reader.i8("block definition")?,
                frame_type: reader.u8("block definition")?,
                block_id: reader.u16("block definition")?,
            });
        }
        Ok(FrameHeader {
            x1,
            y1,
            x2,
            y2,
            unknown1,
            unknown2,
            blocks,
        })
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        for value in [self.x1, self.y1, self.x2, self.y2] {
            out.extend_from_slice(&value.to_le_bytes());
        }
        out.extend_from_slice(&self.unknown1.to_le_bytes());
        out.extend_from_slice(&self.unknown2.to_le_bytes());
        let count = u16::try_from(self.blocks.len())
            .map_err(|_| Error::out_of_range(format!("{} blocks in frame", self.blocks.len())))?;
        out.extend_from_slice(&count.to_le_bytes());
        for block in &self.blocks {
            out.push(block.a as u8);
            out.push(block.b as u8);
            out.push(block.frame_type);
            out.extend_from_slice(&block.block_id.to_le_bytes());
        }
        Ok(())
    }

    pub fn width(&self) -> i32 {
        self.x2 as i32 - self.x1 as i32 + 1
    }

    pub fn height(&self) -> i32 {
        self.y2 as i32 - self.y1 as i32 + 1
    }
}

/// Composited frame. `pixels` is RGB555, `stride()` columns per row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Frame {
    pub x_offset: i32,
    pub y_offset: i32,
    pub width: usize,
    pub height: usize,
    pub mask_color: u16,
    pub frame_type: u8,
    #[serde(skip)]
    pub pixels: Option<Vec<u16>>,
}

impl Frame {
    /// Rows are stored as 16-bit pairs, so odd widths are padded by one.
    pub fn stride(&self) -> usize {
        self.width + self.width % 2
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<u16> {
        let pixels = self.pixels.as_ref()?;
        if x >= self.stride() || y >= self.height {
            return None;
        }
        pixels.get(y * self.stride() + x).copied()
    }

    /// RGBA view with the mask color made transparent and the padding
    /// column cropped. `None` for frames without blocks.
    pub fn to_rgba(&self) -> Option<RawImage> {
        let pixels = self.pixels.as_ref()?;
        let stride = self.stride();
        let mut rgba = Vec::with_capacity(self.width * self.height * 4);
        for row in pixels.chunks_exact(stride).take(self.height) {
            rgba.extend_from_slice(&expand_rgb555(
                &row[..self.width],
                Transparency::Mask(self.mask_color),
            ));
        }
        Some(RawImage {
            width: self.width,
            height: self.height,
            x_offset: self.x_offset,
            y_offset: self.y_offset,
            rgba,
        })
    }
}

/// Fully decoded sprite container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpriteFile {
    pub palette: Option<Vec<u16>>,
    pub headers: Vec<FrameHeader>,
    pub tiles: Vec<SubTile>,
    pub mask_color: u16,
    pub frames: Vec<Frame>,
}

/// Decode result plus any non-fatal conditions met on the way.
#[derive(Debug, Clone)]
pub struct SpriteLoad {
    pub sprite: SpriteFile,
    pub warnings: Vec<Warning>,
}

impl SpriteFile {
    pub fn decode(bytes: &[u8]) -> Result<SpriteLoad> {
        let mut reader = ByteReader::new(bytes);
        let mut warnings = Vec::new();

        let palette = if reader.peek_u8() == Some(PALETTE_MARKER) {
            reader.u8("palette marker")?;
            let count = match reader.u8("palette size")? {
                0 => 256,
                n => n as usize,
            };
            let mut colors = Vec::with_capacity(count);
            for _ in 0..count {
                colors.push(reader.u16("palette color")?);
            }
            Some(colors)
        } else {
            None
        };

        // With a palette every color in use is known up front.
        let fixed_mask = palette.as_ref().map(|colors| {
            let candidates = MaskCandidates::all().without_all(colors.iter().copied());
            resolve_mask(candidates, &mut warnings)
        });

        let frame_count = reader.u8("frame count")? as usize;
        let mut headers = Vec::with_capacity(frame_count);
        for _ in 0..frame_count {
            headers.push(FrameHeader::read(&mut reader)?);
        }

        let tiles = decode_tile_table(&mut reader)?;

        let mask_color = match fixed_mask {
            Some(mask) => mask,
            None => {
                let candidates = tiles
                    .iter()
                    .fold(MaskCandidates::all(), |candidates, tile| {
                        candidates.without_all(tile.colors())
                    });
                resolve_mask(candidates, &mut warnings)
            }
        };

        let frames = headers
            .iter()
            .enumerate()
            .map(|(index, header)| composite_frame(index, header, &tiles, mask_color))
            .collect::<Result<Vec<_>>>()?;

        Ok(SpriteLoad {
            sprite: SpriteFile {
                palette,
                headers,
                tiles,
                mask_color,
                frames,
            },
            warnings,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        if let Some(palette) = &self.palette {
            if palette.is_empty() || palette.len() > 256 {
                return Err(Error::out_of_range(format!(
                    "palette of {} colors",
                    palette.len()
                )));
            }
            out.push(PALETTE_MARKER);
            out.push(if palette.len() == 256 {
                0
            } else {
                palette.len() as u8
            });
            for color in palette {
                out.extend_from_slice(&color.to_le_bytes());
            }
        }

        let frame_count = u8::try_from(self.headers.len())
            .map_err(|_| Error::out_of_range(format!("{} frames", self.headers.len())))?;
        if self.palette.is_none() && frame_count == PALETTE_MARKER {
            return Err(Error::out_of_range(
                "255 frames without a palette would read back as a palette marker",
            ));
        }
        out.push(frame_count);
        for header in &self.headers {
            header.write(&mut out)?;
        }
        out.extend_from_slice(&encode_tile_table(&self.tiles)?);
        Ok(out)
    }
}

fn resolve_mask(candidates: MaskCandidates, warnings: &mut Vec<Warning>) -> u16 {
    match candidates.first() {
        Some(mask) => mask,
        None => {
            let fallback = MASK_CANDIDATES[0];
            log::warn!("sprite uses every transparency candidate, masking with {fallback:#06x}");
            warnings.push(Warning::MaskColorExhausted { fallback });
            fallback
        }
    }
}

fn composite_frame(
    index: usize,
    header: &FrameHeader,
    tiles: &[SubTile],
    mask_color: u16,
) -> Result<Frame> {
    let x_offset = header.x1 as i32;
    let y_offset = header.y1 as i32;
    let frame_type = header.blocks.first().map_or(0, |block| block.frame_type);

    if header.blocks.is_empty() {
        return Ok(Frame {
            x_offset,
            y_offset,
            width: header.width().max(0) as usize,
            height: header.height().max(0) as usize,
            mask_color,
            frame_type,
            pixels: None,
        });
    }

    let (width, height) = (header.width(), header.height());
    if width < 1 || height < 1 {
        return Err(Error::InvalidDimensions(format!(
            "frame {index} spans {width}x{height}"
        )));
    }
    let (width, height) = (width as usize, height as usize);
    let stride = width + width % 2;
    let mut canvas = vec![mask_color; stride * height];

    for block in &header.blocks {
        let tile = tiles.get(block.block_id as usize).ok_or_else(|| {
            Error::out_of_range(format!(
                "frame {index} references tile {} of {}",
                block.block_id,
                tiles.len()
            ))
        })?;
        let (px, py) = block.pixel_offset();
        for ty in 0..TILE_SIZE {
            for tx in 0..TILE_SIZE {
                // mask-colored tile pixels never overwrite earlier blocks
                let Some(color) = tile.get(tx, ty).filter(|&color| color != mask_color) else {
                    continue;
                };
                let cx = px + tx as i32 - x_offset;
                let cy = py + ty as i32 - y_offset;
                if cx < 0 || cy < 0 || cx >= width as i32 || cy >= height as i32 {
                    continue;
                }
                canvas[cy as usize * stride + cx as usize] = color;
            }
        }
    }

    Ok(Frame {
        x_offset,
        y_offset,
        width,
        height,
        mask_color,
        frame_type,
        pixels: Some(canvas),
    })
}
