//! Legacy indexed archives.
//!
//! ```text
//! magic[4] record_count:u32 directory_len:u32 reserved:u32
//! directory blob (directory_len bytes, compressed)
//! entry data
//! ```
//!
//! The inflated directory holds `record_count` 32-byte records:
//! `name[20] offset:u32 uncompressed_size:u32 stored_size:u32`. Offsets are
//! relative to the first byte after the directory blob. A non-zero
//! `stored_size` means the entry is compressed with the archive's scheme.

use std::borrow::Cow;
use std::fs::File;
use std::io::{Read, Write};
use std::ops::{Deref, Range};
use std::path::{Component, Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use flate2::Compression;
use flate2::read::{DeflateDecoder, ZlibDecoder};
use flate2::write::{DeflateEncoder, ZlibEncoder};
use memmap2::{Mmap, MmapOptions};
use serde::Serialize;

use crate::error::{Error, Result};

pub const HEADER_SIZE: usize = 16;
pub const RECORD_SIZE: usize = 32;
pub const NAME_LEN: usize = 20;

/// Upper bound of the deflate expansion ratio, used to cap allocations
/// sized from header fields.
const MAX_INFLATE_RATIO: usize = 1032;

/// On-disk compression scheme, sniffed from the header magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ContainerVariant {
    /// `IDXZ`: zlib-wrapped streams.
    Zlib,
    /// `IDXD`: raw deflate streams.
    Deflate,
}

impl ContainerVariant {
    pub fn sniff(header: &[u8]) -> Result<Self> {
        if header.len() < 4 {
            return Err(Error::TruncatedInput {
                context: "archive magic",
                needed: 4,
                available: header.len(),
            });
        }
        let magic: [u8; 4] = [header[0], header[1], header[2], header[3]];
        match &magic {
            b"IDXZ" => Ok(ContainerVariant::Zlib),
            b"IDXD" => Ok(ContainerVariant::Deflate),
            _ => Err(Error::UnknownContainerVariant(magic)),
        }
    }

    pub fn magic(self) -> [u8; 4] {
        match self {
            ContainerVariant::Zlib => *b"IDXZ",
            ContainerVariant::Deflate => *b"IDXD",
        }
    }

    /// Inflates `data`, requiring exactly `expected` output bytes.
    fn inflate(self, data: &[u8], expected: usize, what: &str) -> Result<Vec<u8>> {
        let capacity = expected.min(data.len().saturating_mul(MAX_INFLATE_RATIO));
        let mut out = Vec::with_capacity(capacity);
        // one spare byte so oversized streams are detected
        let limit = expected as u64 + 1;
        let read = match self {
            ContainerVariant::Zlib => ZlibDecoder::new(data).take(limit).read_to_end(&mut out),
            ContainerVariant::Deflate => {
                DeflateDecoder::new(data).take(limit).read_to_end(&mut out)
            }
        };
        read.map_err(|err| Error::CorruptDirectory(format!("inflating {what}: {err}")))?;
        if out.len() != expected {
            return Err(Error::CorruptDirectory(format!(
                "{what} inflated to {} bytes, expected {expected}",
                out.len()
            )));
        }
        Ok(out)
    }

    fn deflate(self, data: &[u8]) -> Result<Vec<u8>> {
        let out = match self {
            ContainerVariant::Zlib => {
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(data)?;
                encoder.finish()?
            }
            ContainerVariant::Deflate => {
                let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(data)?;
                encoder.finish()?
            }
        };
        Ok(out)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveEntry {
    pub name: String,
    pub file_offset: u32,
    pub uncompressed_size: u32,
    pub compressed_size: u32,
}

impl ArchiveEntry {
    pub fn is_compressed(&self) -> bool {
        self.compressed_size > 0
    }

    pub fn stored_len(&self) -> usize {
        if self.is_compressed() {
            self.compressed_size as usize
        } else {
            self.uncompressed_size as usize
        }
    }

    /// Entry name as a relative path, with `\` separators normalised and
    /// anything but plain components (`..`, roots, prefixes) dropped. `None`
    /// when nothing usable remains.
    pub fn relative_path(&self) -> Option<PathBuf> {
        let raw = PathBuf::from(self.name.replace('\\', "/"));
        let relative: PathBuf = raw
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => Some(part),
                _ => None,
            })
            .collect();
        (!relative.as_os_str().is_empty()).then_some(relative)
    }

    fn data_range(&self, data_base: usize) -> Option<Range<usize>> {
        let start = data_base.checked_add(self.file_offset as usize)?;
        Some(start..start.checked_add(self.stored_len())?)
    }
}

#[derive(Debug)]
enum Backing {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Deref for Backing {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Backing::Mapped(mmap) => mmap,
            Backing::Owned(bytes) => bytes,
        }
    }
}

/// Read-only handle on an indexed archive. The directory is parsed once at
/// open time; extraction only borrows, so the handle can be shared across
/// threads.
#[derive(Debug)]
pub struct IndexedArchive {
    path: Option<PathBuf>,
    data: Backing,
    variant: ContainerVariant,
    data_base: usize,
    entries: Vec<ArchiveEntry>,
}

impl IndexedArchive {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_buf = path.as_ref().to_path_buf();
        let file = File::open(&path_buf)?;
        // SAFETY: the archive is treated as immutable for the lifetime of the map.
        let mmap = unsafe { MmapOptions::new().map(&file) }?;
        let mut archive = Self::from_backing(Backing::Mapped(mmap))?;
        archive.path = Some(path_buf);
        Ok(archive)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::from_backing(Backing::Owned(bytes))
    }

    fn from_backing(data: Backing) -> Result<Self> {
        let (variant, data_base, entries) = parse_directory(&data)?;
        log::debug!(
            "indexed archive: {:?}, {} entries, data at {data_base:#x}",
            variant,
            entries.len()
        );
        Ok(IndexedArchive {
            path: None,
            data,
            variant,
            data_base,
            entries,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn variant(&self) -> ContainerVariant {
        self.variant
    }

    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    pub fn find_entry(&self, name: &str) -> Option<&ArchiveEntry> {
        self.entries
            .iter()
            .find(|entry| entry.name.eq_ignore_ascii_case(name))
    }

    /// Bytes as stored, before any inflation.
    pub fn read_stored(&self, entry: &ArchiveEntry) -> Result<&[u8]> {
        entry
            .data_range(self.data_base)
            .and_then(|range| self.data.get(range))
            .ok_or_else(|| {
                Error::out_of_range(format!("entry {} lies outside this archive", entry.name))
            })
    }

    pub fn read_entry(&self, entry: &ArchiveEntry) -> Result<Cow<'_, [u8]>> {
        let stored = self.read_stored(entry)?;
        if !entry.is_compressed() {
            return Ok(Cow::Borrowed(stored));
        }
        let inflated = self
            .variant
            .inflate(stored, entry.uncompressed_size as usize, &entry.name)?;
        Ok(Cow::Owned(inflated))
    }

    pub fn extract_entry<P: AsRef<Path>>(&self, entry: &ArchiveEntry, dest: P) -> Result<()> {
        let bytes = self.read_entry(entry)?;
        let mut file = File::create(dest.as_ref())?;
        file.write_all(&bytes)?;
        Ok(())
    }
}

fn parse_directory(data: &[u8]) -> Result<(ContainerVariant, usize, Vec<ArchiveEntry>)> {
    if data.len() < HEADER_SIZE {
        return Err(Error::TruncatedInput {
            context: "archive header",
            needed: HEADER_SIZE,
            available: data.len(),
        });
    }
    let variant = ContainerVariant::sniff(data)?;
    let record_count = LittleEndian::read_u32(&data[4..8]) as usize;
    let directory_len = LittleEndian::read_u32(&data[8..12]) as usize;

    let directory_end = HEADER_SIZE
        .checked_add(directory_len)
        .filter(|&end| end <= data.len())
        .ok_or(Error::TruncatedInput {
            context: "archive directory",
            needed: directory_len,
            available: data.len() - HEADER_SIZE,
        })?;
    let expected = record_count
        .checked_mul(RECORD_SIZE)
        .ok_or_else(|| Error::CorruptDirectory(format!("record count {record_count} overflows")))?;
    let directory = variant.inflate(&data[HEADER_SIZE..directory_end], expected, "directory")?;

    let mut entries = Vec::with_capacity(directory.len() / RECORD_SIZE);
    for (index, record) in directory.chunks_exact(RECORD_SIZE).enumerate() {
        let name = read_name(&record[..NAME_LEN]);
        let entry = ArchiveEntry {
            name,
            file_offset: LittleEndian::read_u32(&record[20..24]),
            uncompressed_size: LittleEndian::read_u32(&record[24..28]),
            compressed_size: LittleEndian::read_u32(&record[28..32]),
        };
        let range = entry.data_range(directory_end);
        if range.is_none_or(|range| range.end > data.len()) {
            return Err(Error::out_of_range(format!(
                "entry {index} ({}) extends beyond the archive",
                entry.name
            )));
        }
        entries.push(entry);
    }

    Ok((variant, directory_end, entries))
}

fn read_name(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Builds an indexed archive in memory.
#[derive(Debug)]
pub struct IndexedArchiveWriter {
    variant: ContainerVariant,
    entries: Vec<(String, Vec<u8>, bool)>,
}

impl IndexedArchiveWriter {
    pub fn new(variant: ContainerVariant) -> Self {
        IndexedArchiveWriter {
            variant,
            entries: Vec::new(),
        }
    }

    pub fn add(&mut self, name: &str, data: Vec<u8>, compress: bool) -> Result<()> {
        if name.is_empty() || name.len() > NAME_LEN || !name.is_ascii() {
            return Err(Error::out_of_range(format!(
                "archive names must be 1-{NAME_LEN} ASCII bytes, got {name:?}"
            )));
        }
        self.entries.push((name.to_string(), data, compress));
        Ok(())
    }

    pub fn finish(self) -> Result<Vec<u8>> {
        let mut directory = Vec::with_capacity(self.entries.len() * RECORD_SIZE);
        let mut body = Vec::new();
        for (name, data, compress) in &self.entries {
            let offset = u32::try_from(body.len())
                .map_err(|_| Error::out_of_range("archive data exceeds 4 GiB"))?;
            let uncompressed = u32::try_from(data.len())
                .map_err(|_| Error::out_of_range(format!("entry {name} exceeds 4 GiB")))?;
            let stored = if *compress {
                let packed = self.variant.deflate(data)?;
                body.extend_from_slice(&packed);
                packed.len() as u32
            } else {
                body.extend_from_slice(data);
                0
            };

            let mut field = [0u8; NAME_LEN];
            field[..name.len()].copy_from_slice(name.as_bytes());
            directory.extend_from_slice(&field);
            directory.write_u32::<LittleEndian>(offset)?;
            directory.write_u32::<LittleEndian>(uncompressed)?;
            directory.write_u32::<LittleEndian>(stored)?;
        }

        let packed_directory = self.variant.deflate(&directory)?;
        let mut out = Vec::with_capacity(HEADER_SIZE + packed_directory.len() + body.len());
        out.extend_from_slice(&self.variant.magic());
        out.write_u32::<LittleEndian>(self.entries.len() as u32)?;
        out.write_u32::<LittleEndian>(packed_directory.len() as u32)?;
        out.write_u32::<LittleEndian>(0)?;
        out.extend_from_slice(&packed_directory);
        out.extend_from_slice(&body);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn sample(variant: ContainerVariant) -> Vec<u8> {
        let mut writer = IndexedArchiveWriter::new(variant);
        writer.add("0-1.img", vec![1, 2, 3, 4], false).unwrap();
        writer.add("item-k.xml", b"<a>".repeat(50), true).unwrap();
        writer.finish().unwrap()
    }

    #[test]
    fn opens_written_archive_from_disk() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&sample(ContainerVariant::Zlib)).unwrap();

        let archive = IndexedArchive::open(file.path()).unwrap();
        assert_eq!(archive.variant(), ContainerVariant::Zlib);
        assert_eq!(archive.entries().len(), 2);
        assert_eq!(archive.path(), Some(file.path()));

        let raw = archive.find_entry("0-1.IMG").unwrap();
        assert!(!raw.is_compressed());
        assert!(matches!(archive.read_entry(raw).unwrap(), Cow::Borrowed(_)));
        assert_eq!(&*archive.read_entry(raw).unwrap(), &[1, 2, 3, 4]);

        let packed = archive.find_entry("item-k.xml").unwrap();
        assert!(packed.is_compressed());
        assert_eq!(packed.uncompressed_size, 150);
        assert_eq!(&*archive.read_entry(packed).unwrap(), b"<a>".repeat(50).as_slice());
    }

    #[test]
    fn raw_deflate_variant_round_trips() {
        let archive = IndexedArchive::from_bytes(sample(ContainerVariant::Deflate)).unwrap();
        assert_eq!(archive.variant(), ContainerVariant::Deflate);
        let entry = archive.find_entry("item-k.xml").unwrap();
        assert_eq!(archive.read_entry(entry).unwrap().len(), 150);
    }

    #[test]
    fn unknown_magic_is_rejected() {
        let mut bytes = sample(ContainerVariant::Zlib);
        bytes[..4].copy_from_slice(b"PAK!");
        assert!(matches!(
            IndexedArchive::from_bytes(bytes),
            Err(Error::UnknownContainerVariant(magic)) if &magic == b"PAK!"
        ));
    }

    #[test]
    fn directory_length_must_match_record_count() {
        let mut bytes = sample(ContainerVariant::Zlib);
        bytes[4..8].copy_from_slice(&3u32.to_le_bytes());
        assert!(matches!(
            IndexedArchive::from_bytes(bytes),
            Err(Error::CorruptDirectory(_))
        ));
    }

    #[test]
    fn truncated_data_is_rejected_at_open() {
        let bytes = sample(ContainerVariant::Zlib);
        let cut = bytes[..bytes.len() - 1].to_vec();
        assert!(matches!(
            IndexedArchive::from_bytes(cut),
            Err(Error::OutOfRange(_))
        ));
        assert!(matches!(
            IndexedArchive::from_bytes(bytes[..10].to_vec()),
            Err(Error::TruncatedInput { .. })
        ));
    }

    fn raw_archive(record_count: u32, directory: &[u8], body: &[u8]) -> Vec<u8> {
        let packed = ContainerVariant::Zlib.deflate(directory).unwrap();
        let mut out = b"IDXZ".to_vec();
        out.extend_from_slice(&record_count.to_le_bytes());
        out.extend_from_slice(&(packed.len() as u32).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&packed);
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn huge_record_count_is_corrupt_not_allocated() {
        let bytes = raw_archive(u32::MAX, &[], &[]);
        assert!(matches!(
            IndexedArchive::from_bytes(bytes),
            Err(Error::CorruptDirectory(_))
        ));
    }

    #[test]
    fn huge_uncompressed_size_fails_on_read() {
        let packed = ContainerVariant::Zlib.deflate(b"tiny").unwrap();
        let mut record = [0u8; RECORD_SIZE];
        record[..5].copy_from_slice(b"a.img");
        record[24..28].copy_from_slice(&u32::MAX.to_le_bytes());
        record[28..32].copy_from_slice(&(packed.len() as u32).to_le_bytes());
        let archive = IndexedArchive::from_bytes(raw_archive(1, &record, &packed)).unwrap();

        let entry = &archive.entries()[0];
        assert!(matches!(
            archive.read_entry(entry),
            Err(Error::CorruptDirectory(_))
        ));
    }

    #[test]
    fn foreign_entry_is_rejected() {
        let archive = IndexedArchive::from_bytes(sample(ContainerVariant::Zlib)).unwrap();
        let foreign = ArchiveEntry {
            name: "elsewhere.img".into(),
            file_offset: 1 << 30,
            uncompressed_size: 16,
            compressed_size: 0,
        };
        assert!(matches!(
            archive.read_stored(&foreign),
            Err(Error::OutOfRange(_))
        ));
        assert!(archive.read_entry(&foreign).is_err());
    }

    #[test]
    fn relative_paths_stay_below_the_destination() {
        let entry = |name: &str| ArchiveEntry {
            name: name.into(),
            file_offset: 0,
            uncompressed_size: 0,
            compressed_size: 0,
        };
        assert_eq!(
            entry("sprite\\0-1.img").relative_path(),
            Some(PathBuf::from("sprite/0-1.img"))
        );
        assert_eq!(
            entry("../../evil.txt").relative_path(),
            Some(PathBuf::from("evil.txt"))
        );
        assert_eq!(
            entry("/etc/passwd").relative_path(),
            Some(PathBuf::from("etc/passwd"))
        );
        assert_eq!(entry("..").relative_path(), None);
    }

    #[test]
    fn writer_rejects_long_names() {
        let mut writer = IndexedArchiveWriter::new(ContainerVariant::Zlib);
        assert!(writer.add("a-very-long-file-name.img", Vec::new(), false).is_err());
    }

    #[test]
    fn archive_handle_is_shareable_across_threads() {
        fn assert_sync<T: Send + Sync>() {}
        assert_sync::<IndexedArchive>();

        let archive = IndexedArchive::from_bytes(sample(ContainerVariant::Zlib)).unwrap();
        std::thread::scope(|scope| {
            for entry in archive.entries() {
                let archive = &archive;
                scope.spawn(move || {
                    assert_eq!(
                        archive.read_entry(entry).unwrap().len(),
                        entry.uncompressed_size as usize
                    );
                });
            }
        });
    }
}
