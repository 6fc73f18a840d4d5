//! Extension-based dispatch from raw entry bytes to the matching decoder.

use std::path::Path;

use crate::bitmap::RawImage;
use crate::cipher::LegacyCipher;
use crate::error::Result;
use crate::sprite::{SpriteFile, SpriteLoad};
use crate::text::{DecodedText, read_config_text};
use crate::tiles::TileSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Image,
    Sprite,
    TileSet,
    Text,
    Other,
}

impl AssetKind {
    pub fn from_name(name: &str) -> Self {
        let extension = Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());
        match extension.as_deref() {
            Some("img") => AssetKind::Image,
            Some("spr") => AssetKind::Sprite,
            Some("til") => AssetKind::TileSet,
            Some("xml") | Some("txt") => AssetKind::Text,
            _ => AssetKind::Other,
        }
    }
}

#[derive(Debug, Clone)]
pub enum DecodedAsset {
    Image(RawImage),
    Sprite(SpriteLoad),
    TileSet(TileSet),
    Text(DecodedText),
    Other(Vec<u8>),
}

/// Decodes `bytes` according to the extension of `name`.
pub fn decode_asset(name: &str, bytes: Vec<u8>, cipher: &LegacyCipher) -> Result<DecodedAsset> {
    Ok(match AssetKind::from_name(name) {
        AssetKind::Image => DecodedAsset::Image(RawImage::decode_l1_measured(&bytes)?),
        AssetKind::Sprite => DecodedAsset::Sprite(SpriteFile::decode(&bytes)?),
        AssetKind::TileSet => DecodedAsset::TileSet(TileSet::decode(&bytes)?),
        AssetKind::Text => DecodedAsset::Text(read_config_text(cipher, bytes, Some(name))?),
        AssetKind::Other => DecodedAsset::Other(bytes),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_selects_decoder() {
        assert_eq!(AssetKind::from_name("sprite/0-12.IMG"), AssetKind::Image);
        assert_eq!(AssetKind::from_name("12.spr"), AssetKind::Sprite);
        assert_eq!(AssetKind::from_name("map/4.til"), AssetKind::TileSet);
        assert_eq!(AssetKind::from_name("item-k.xml"), AssetKind::Text);
        assert_eq!(AssetKind::from_name("music.ogg"), AssetKind::Other);
        assert_eq!(AssetKind::from_name("noext"), AssetKind::Other);
    }

    #[test]
    fn decodes_image_entry() {
        let cipher = LegacyCipher::default();
        let asset = decode_asset("a.img", vec![0, 0, 1, 1, 1, 0, 1, 0xFF, 0x7F], &cipher).unwrap();
        match asset {
            DecodedAsset::Image(image) => assert_eq!((image.width, image.height), (1, 1)),
            other => panic!("unexpected asset {other:?}"),
        }
    }

    #[test]
    fn unknown_extensions_pass_through() {
        let cipher = LegacyCipher::default();
        let asset = decode_asset("x.bin", vec![1, 2, 3], &cipher).unwrap();
        assert!(matches!(asset, DecodedAsset::Other(bytes) if bytes == vec![1, 2, 3]));
    }
}
