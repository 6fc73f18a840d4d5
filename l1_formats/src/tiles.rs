//! 24x24 sub-tiles and the offset-table layout that stores them.
//!
//! A tile table is `count:i32`, `count` relative `i32` offsets, then the tile
//! records. Offsets are measured from the first byte after the offset list.
//! Each record is `skip:u8, start_row:u8, unused:u8, rows:u8` followed by
//! `rows` scanlines starting at column `skip`, row `start_row`.

use serde::Serialize;

use crate::bitmap::RawImage;
use crate::error::{Error, Result};
use crate::pixel::{Rgba8, rgb555_to_rgba, rgba_to_rgb555};
use crate::rle::{encode_scanline_rle, walk_rows};
use crate::stream::ByteReader;

pub const TILE_SIZE: usize = 24;
const TILE_PIXELS: usize = TILE_SIZE * TILE_SIZE;

/// A decoded tile. `None` marks pixels no scanline touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubTile {
    pixels: Vec<Option<u16>>,
    unused: u8,
}

impl Default for SubTile {
    fn default() -> Self {
        Self::blank()
    }
}

impl SubTile {
    pub fn blank() -> Self {
        SubTile {
            pixels: vec![None; TILE_PIXELS],
            unused: 0,
        }
    }

    pub fn get(&self, x: usize, y: usize) -> Option<u16> {
        if x < TILE_SIZE && y < TILE_SIZE {
            self.pixels[y * TILE_SIZE + x]
        } else {
            None
        }
    }

    pub fn set(&mut self, x: usize, y: usize, color: Option<u16>) {
        if x < TILE_SIZE && y < TILE_SIZE {
            self.pixels[y * TILE_SIZE + x] = color;
        }
    }

    /// Colors of every opaque pixel, in row-major order.
    pub fn colors(&self) -> impl Iterator<Item = u16> + '_ {
        self.pixels.iter().flatten().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.iter().all(Option::is_none)
    }

    pub(crate) fn decode(reader: &mut ByteReader<'_>) -> Result<Self> {
        let skip = reader.u8("tile header")? as usize;
        let start_row = reader.u8("tile header")? as usize;
        let unused = reader.u8("tile header")?;
        let rows = reader.u8("tile header")? as usize;

        let mut tile = SubTile {
            pixels: vec![None; TILE_PIXELS],
            unused,
        };
        walk_rows(reader, start_row, rows, skip, |x, y, color| {
            tile.set(x, y, Some(color));
        })?;
        Ok(tile)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.is_empty() {
            return Ok(vec![0, 0, self.unused, 0]);
        }
        let opaque = |x: usize, y: usize| self.get(x, y).is_some();
        let first_row = (0..TILE_SIZE)
            .find(|&y| (0..TILE_SIZE).any(|x| opaque(x, y)))
            .unwrap_or(0);
        let last_row = (0..TILE_SIZE)
            .rev()
            .find(|&y| (0..TILE_SIZE).any(|x| opaque(x, y)))
            .unwrap_or(first_row);
        let skip = (0..TILE_SIZE)
            .find(|&x| (first_row..=last_row).any(|y| opaque(x, y)))
            .unwrap_or(0);
        let rows = last_row - first_row + 1;

        let mut out = vec![skip as u8, first_row as u8, self.unused, rows as u8];
        let body = encode_scanline_rle(TILE_SIZE - skip, rows, |x, y| {
            self.get(x + skip, y + first_row)
        })?;
        out.extend_from_slice(&body);
        Ok(out)
    }

    pub fn to_raw_image(&self) -> RawImage {
        let mut image = RawImage::blank(TILE_SIZE, TILE_SIZE);
        for y in 0..TILE_SIZE {
            for x in 0..TILE_SIZE {
                if let Some(color) = self.get(x, y) {
                    image.set_pixel(x, y, rgb555_to_rgba(color));
                }
            }
        }
        image
    }

    pub fn from_raw_image(image: &RawImage) -> Result<Self> {
        if image.width != TILE_SIZE || image.height != TILE_SIZE {
            return Err(Error::InvalidDimensions(format!(
                "tiles are {TILE_SIZE}x{TILE_SIZE}, got {}x{}",
                image.width, image.height
            )));
        }
        let mut tile = SubTile::blank();
        for y in 0..TILE_SIZE {
            for x in 0..TILE_SIZE {
                let color = image.pixel(x, y);
                if color.a != 0 {
                    tile.set(x, y, Some(rgba_to_rgb555(color)));
                }
            }
        }
        Ok(tile)
    }
}

/// Reads a tile table starting at the reader's position.
pub(crate) fn decode_tile_table(reader: &mut ByteReader<'_>) -> Result<Vec<SubTile>> {
    let count = reader.i32("tile count")?;
    if count < 0 {
        return Err(Error::out_of_range(format!("negative tile count {count}")));
    }
    let count = count as usize;
    if count.saturating_mul(4) > reader.remaining() {
        return Err(Error::TruncatedInput {
            context: "tile offset table",
            needed: count.saturating_mul(4),
            available: reader.remaining(),
        });
    }

    let mut offsets = Vec::with_capacity(count);
    for _ in 0..count {
        offsets.push(reader.i32("tile offset")?);
    }

    let table_base = reader.position();
    let data = reader.data();
    let mut end = table_base;
    let mut tiles = Vec::with_capacity(count);
    for (index, offset) in offsets.into_iter().enumerate() {
        let start = usize::try_from(offset)
            .ok()
            .and_then(|offset| table_base.checked_add(offset))
            .filter(|&start| start < data.len())
            .ok_or_else(|| {
                Error::out_of_range(format!("tile {index} offset {offset} outside buffer"))
            })?;
        let mut tile_reader = ByteReader::at(data, start)?;
        tiles.push(SubTile::decode(&mut tile_reader)?);
        end = end.max(tile_reader.position());
    }

    *reader = ByteReader::at(data, end)?;
    Ok(tiles)
}

pub(crate) fn encode_tile_table(tiles: &[SubTile]) -> Result<Vec<u8>> {
    let count = i32::try_from(tiles.len())
        .map_err(|_| Error::out_of_range(format!("{} tiles", tiles.len())))?;
    let mut offsets = Vec::with_capacity(tiles.len());
    let mut body = Vec::new();
    for tile in tiles {
        offsets.push(body.len() as i32);
        body.extend_from_slice(&tile.encode()?);
    }

    let mut out = Vec::with_capacity(4 + offsets.len() * 4 + body.len());
    out.extend_from_slice(&count.to_le_bytes());
    for offset in offsets {
        out.extend_from_slice(&offset.to_le_bytes());
    }
    out.extend_from_slice(&body);
    Ok(out)
}

/// Standalone tile-set file: an ordered list of 24x24 images.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TileSet {
    pub tiles: Vec<RawImage>,
}

impl TileSet {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(bytes);
        let tiles = decode_tile_table(&mut reader)?
            .iter()
            .map(SubTile::to_raw_image)
            .collect();
        Ok(TileSet { tiles })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let tiles = self
            .tiles
            .iter()
            .map(SubTile::from_raw_image)
            .collect::<Result<Vec<_>>>()?;
        encode_tile_table(&tiles)
    }

    /// Lays the tiles out left-to-right, `columns` per row.
    pub fn atlas(&self, columns: usize) -> RawImage {
        let columns = columns.max(1).min(self.tiles.len().max(1));
        let rows = self.tiles.len().div_ceil(columns);
        let mut sheet = RawImage::blank(columns * TILE_SIZE, rows * TILE_SIZE);
        for (index, tile) in self.tiles.iter().enumerate() {
            let origin_x = (index % columns) * TILE_SIZE;
            let origin_y = (index / columns) * TILE_SIZE;
            for y in 0..TILE_SIZE.min(tile.height) {
                for x in 0..TILE_SIZE.min(tile.width) {
                    let color = tile.pixel(x, y);
                    if color != Rgba8::TRANSPARENT {
                        sheet.set_pixel(origin_x + x, origin_y + y, color);
                    }
                }
            }
        }
        sheet
    }
}
