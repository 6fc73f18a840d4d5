pub mod archive;
pub mod asset;
pub mod bitmap;
pub mod cipher;
pub mod error;
pub mod keys;
pub mod lcx;
pub mod pixel;
mod rle;
pub mod sprite;
pub mod text;
pub mod tiles;

mod stream;

pub use archive::{ArchiveEntry, ContainerVariant, IndexedArchive, IndexedArchiveWriter};
pub use asset::{AssetKind, DecodedAsset, decode_asset};
pub use bitmap::RawImage;
pub use cipher::{LegacyCipher, is_encrypted};
pub use error::{Error, Result, Warning};
pub use keys::KeySet;
pub use lcx::{LcxContainer, LcxEntry};
pub use pixel::{Rgba8, rgb555_to_rgba, rgb565_to_rgba};
pub use sprite::{BlockDef, Frame, FrameHeader, MaskCandidates, SpriteFile, SpriteLoad};
pub use text::{DecodedText, decode_text, read_config_text};
pub use tiles::{SubTile, TileSet};
