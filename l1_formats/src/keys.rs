//! Candidate AEAD keys for LCX containers.
//!
//! Key files are JSON: `{"keys": ["<64 hex chars>", ...]}`. Order is
//! priority; the first key is also the one used when sealing entries.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

pub const KEY_LEN: usize = 32;

#[derive(Debug, Deserialize)]
struct KeyFile {
    keys: Vec<String>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct KeySet {
    keys: Vec<[u8; KEY_LEN]>,
}

impl std::fmt::Debug for KeySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySet")
            .field("len", &self.keys.len())
            .finish()
    }
}

impl KeySet {
    pub fn new(keys: Vec<[u8; KEY_LEN]>) -> Result<Self> {
        if keys.is_empty() {
            return Err(Error::InvalidKey("key set is empty".into()));
        }
        Ok(KeySet { keys })
    }

    pub fn from_hex<I, S>(keys: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys = keys
            .into_iter()
            .enumerate()
            .map(|(index, key)| parse_hex_key(index, key.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Self::new(keys)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: KeyFile = serde_json::from_str(json)?;
        Self::from_hex(file.keys)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }

    pub fn primary(&self) -> &[u8; KEY_LEN] {
        &self.keys[0]
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Keys in trial order.
    pub fn iter(&self) -> impl Iterator<Item = &[u8; KEY_LEN]> {
        self.keys.iter()
    }
}

fn parse_hex_key(index: usize, text: &str) -> Result<[u8; KEY_LEN]> {
    let bytes = hex::decode(text.trim())
        .map_err(|err| Error::InvalidKey(format!("key {index}: {err}")))?;
    <[u8; KEY_LEN]>::try_from(bytes.as_slice()).map_err(|_| {
        Error::InvalidKey(format!(
            "key {index} is {} bytes, expected {KEY_LEN}",
            bytes.len()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const KEY_A: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";
    const KEY_B: &str = "ffeeddccbbaa99887766554433221100ffeeddccbbaa99887766554433221100";

    #[test]
    fn loads_keys_in_priority_order() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"keys": ["{KEY_B}", "{KEY_A}"]}}"#).unwrap();

        let keys = KeySet::load(file.path()).unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys.primary()[0], 0xFF);
        let order: Vec<u8> = keys.iter().map(|key| key[0]).collect();
        assert_eq!(order, vec![0xFF, 0x00]);
    }

    #[test]
    fn rejects_short_and_malformed_keys() {
        assert!(matches!(
            KeySet::from_hex(["0011"]),
            Err(Error::InvalidKey(_))
        ));
        assert!(matches!(
            KeySet::from_hex(["zz"]),
            Err(Error::InvalidKey(_))
        ));
        assert!(matches!(
            KeySet::from_hex(Vec::<String>::new()),
            Err(Error::InvalidKey(_))
        ));
        assert!(matches!(
            KeySet::from_json_str("{\"nope\": 1}"),
            Err(Error::KeyFile(_))
        ));
    }

    #[test]
    fn debug_output_hides_key_material() {
        let keys = KeySet::from_hex([KEY_A]).unwrap();
        let debug = format!("{keys:?}");
        assert!(!debug.contains("0102"));
        assert!(debug.contains("len"));
    }
}
