//! AEAD-protected LCX containers.
//!
//! An LCX file is a ZIP envelope. Each stored entry is
//! `nonce[12] || ciphertext || tag[16]` under AES-256-GCM, and the plaintext
//! is a Zstandard frame holding the original asset.

use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use serde::Serialize;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{Error, Result};
use crate::keys::{KEY_LEN, KeySet};

pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
pub const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];
/// Suffix every stored entry name carries.
pub const ENTRY_SUFFIX: &str = ".lcx";

const ZSTD_LEVEL: i32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LcxEntry {
    pub index: usize,
    pub logical_filename: String,
    pub container_entry_name: String,
    pub stored_size: u64,
}

pub fn logical_name(container_entry_name: &str) -> &str {
    container_entry_name
        .strip_suffix(ENTRY_SUFFIX)
        .unwrap_or(container_entry_name)
}

/// Decrypts one sealed entry, trying every key in priority order.
pub fn open_sealed(keys: &KeySet, sealed: &[u8], entry_name: &str) -> Result<Vec<u8>> {
    if sealed.len() < NONCE_LEN + TAG_LEN {
        return Err(Error::TruncatedInput {
            context: "sealed entry",
            needed: NONCE_LEN + TAG_LEN,
            available: sealed.len(),
        });
    }
    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce);

    let plaintext = keys.iter().enumerate().find_map(|(index, key)| {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
        match cipher.decrypt(nonce, ciphertext) {
            Ok(plain) => {
                log::debug!("{entry_name}: authenticated with key {index}");
                Some(plain)
            }
            Err(_) => {
                log::debug!("{entry_name}: key {index} rejected");
                None
            }
        }
    });
    let plaintext = plaintext.ok_or_else(|| Error::AllKeysExhausted {
        entry: entry_name.to_string(),
        tried: keys.len(),
    })?;

    if !plaintext.starts_with(&ZSTD_MAGIC) {
        return Err(Error::NotZstdFrame);
    }
    Ok(zstd::decode_all(plaintext.as_slice())?)
}

/// Compresses and seals `plain` under `key` with a fresh random nonce.
pub fn seal(key: &[u8; KEY_LEN], plain: &[u8]) -> Result<Vec<u8>> {
    let compressed = zstd::encode_all(plain, ZSTD_LEVEL)?;
    let mut nonce = [0u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut nonce);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), compressed.as_slice())
        .map_err(|_| Error::SealFailed)?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// An opened LCX container. Entry payloads are read into memory once, so
/// concurrent extraction only takes shared borrows.
#[derive(Debug)]
pub struct LcxContainer {
    path: Option<PathBuf>,
    entries: Vec<LcxEntry>,
    payloads: Vec<Vec<u8>>,
}

impl LcxContainer {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_buf = path.as_ref().to_path_buf();
        let bytes = fs::read(&path_buf)?;
        let mut container = Self::from_bytes(&bytes)?;
        container.path = Some(path_buf);
        Ok(container)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_reader(Cursor::new(bytes))
    }

    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut zip = ZipArchive::new(reader)?;
        let mut entries = Vec::with_capacity(zip.len());
        let mut payloads = Vec::with_capacity(zip.len());
        for position in 0..zip.len() {
            let mut file = zip.by_index(position)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            let mut payload = Vec::new();
            file.read_to_end(&mut payload)?;
            entries.push(LcxEntry {
                index: entries.len(),
                logical_filename: logical_name(&name).to_string(),
                container_entry_name: name,
                stored_size: payload.len() as u64,
            });
            payloads.push(payload);
        }
        log::debug!("LCX container with {} entries", entries.len());
        Ok(LcxContainer {
            path: None,
            entries,
            payloads,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn entries(&self) -> &[LcxEntry] {
        &self.entries
    }

    /// Looks an entry up by logical or stored name, ignoring ASCII case.
    pub fn find_entry(&self, name: &str) -> Option<&LcxEntry> {
        self.entries.iter().find(|entry| {
            entry.logical_filename.eq_ignore_ascii_case(name)
                || entry.container_entry_name.eq_ignore_ascii_case(name)
        })
    }

    pub fn read_raw(&self, entry: &LcxEntry) -> Result<&[u8]> {
        self.payloads
            .get(entry.index)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::MissingEntry(entry.container_entry_name.clone()))
    }

    pub fn decrypt_entry(&self, entry: &LcxEntry, keys: &KeySet) -> Result<Vec<u8>> {
        open_sealed(keys, self.read_raw(entry)?, &entry.container_entry_name)
    }

    /// Seals `plain` the way this container stores entries (primary key).
    pub fn encrypt_entry(&self, keys: &KeySet, plain: &[u8]) -> Result<Vec<u8>> {
        seal(keys.primary(), plain)
    }

    /// Writes a new container: untouched entries are copied as stored,
    /// entries named in `replacements` (by logical name) are sealed with the
    /// primary key. Replacements for unknown names are appended.
    pub fn rewrite<W: Write + Seek>(
        &self,
        keys: &KeySet,
        replacements: &HashMap<String, Vec<u8>>,
        writer: W,
    ) -> Result<W> {
        let mut zip = ZipWriter::new(writer);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        let mut used = Vec::new();

        for (entry, payload) in self.entries.iter().zip(&self.payloads) {
            zip.start_file(entry.container_entry_name.as_str(), options)?;
            match replacements.get(&entry.logical_filename) {
                Some(plain) => {
                    zip.write_all(&seal(keys.primary(), plain)?)?;
                    used.push(entry.logical_filename.as_str());
                }
                None => zip.write_all(payload)?,
            }
        }

        let mut added: Vec<_> = replacements
            .iter()
            .filter(|(name, _)| !used.contains(&name.as_str()))
            .collect();
        added.sort_by(|a, b| a.0.cmp(b.0));
        for (name, plain) in added {
            zip.start_file(format!("{name}{ENTRY_SUFFIX}"), options)?;
            zip.write_all(&seal(keys.primary(), plain)?)?;
        }

        Ok(zip.finish()?)
    }
}
