use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread;

use anyhow::{Context, Result, bail};
use clap::Parser;
use l1_formats::{AssetKind, DecodedAsset, IndexedArchive, LegacyCipher, RawImage, decode_asset};
use rayon::prelude::*;
use walkdir::WalkDir;

const ATLAS_COLUMNS: usize = 16;

#[derive(Parser, Debug)]
#[command(about = "Convert legacy client assets to PNG and UTF-8 text", version)]
struct Args {
    /// Directory scanned recursively for assets and archives
    input: PathBuf,

    /// Destination directory; the input tree layout is mirrored
    #[arg(long, value_name = "DIR", default_value = "converted")]
    output: PathBuf,

    /// Worker threads (defaults to available parallelism)
    #[arg(long)]
    jobs: Option<usize>,

    /// Extension treated as an indexed archive whose entries are converted
    #[arg(long, value_name = "EXT", default_value = "idx")]
    archive_extension: String,
}

#[derive(Debug, Default)]
struct Totals {
    converted: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
}

impl Totals {
    fn record(&self, outcome: Option<u64>) {
        match outcome {
            Some(written) => {
                self.converted.fetch_add(1, Ordering::Relaxed);
                self.bytes_out.fetch_add(written, Ordering::Relaxed);
            }
            None => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    if !args.input.is_dir() {
        bail!("{} is not a directory", args.input.display());
    }

    let files = collect_inputs(&args.input);
    let jobs = args.jobs.unwrap_or_else(|| {
        thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1)
    });
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build()
        .context("building worker pool")?;
    log::info!("converting {} files on {jobs} workers", files.len());

    fs::create_dir_all(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;

    let cipher = LegacyCipher::default();
    let totals = Totals::default();
    pool.install(|| {
        files.par_iter().for_each(|path| {
            if let Err(err) = convert_path(&args, path, &cipher, &totals) {
                log::warn!("{}: {err:#}", path.display());
                totals.failed.fetch_add(1, Ordering::Relaxed);
            }
        });
    });

    println!(
        "converted {} skipped {} failed {} ({} bytes in, {} bytes out)",
        totals.converted.load(Ordering::Relaxed),
        totals.skipped.load(Ordering::Relaxed),
        totals.failed.load(Ordering::Relaxed),
        totals.bytes_in.load(Ordering::Relaxed),
        totals.bytes_out.load(Ordering::Relaxed),
    );
    Ok(())
}

fn collect_inputs(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|res| res.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}

fn convert_path(args: &Args, path: &Path, cipher: &LegacyCipher, totals: &Totals) -> Result<()> {
    let relative = path.strip_prefix(&args.input).unwrap_or(path);
    let dest_base = args.output.join(relative);

    let is_archive = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(&args.archive_extension));
    if is_archive {
        let archive = IndexedArchive::open(path)
            .with_context(|| format!("opening archive {}", path.display()))?;
        totals
            .bytes_in
            .fetch_add(fs::metadata(path)?.len(), Ordering::Relaxed);
        let dest_dir = dest_base.with_extension("");
        for entry in archive.entries() {
            let Some(relative) = entry.relative_path() else {
                log::warn!("{}: skipping entry named {:?}", path.display(), entry.name);
                totals.record(None);
                continue;
            };
            let bytes = archive
                .read_entry(entry)
                .with_context(|| format!("reading {}", entry.name))?;
            let dest = dest_dir.join(relative);
            let outcome = convert_bytes(&entry.name, bytes.into_owned(), &dest, cipher)
                .with_context(|| format!("converting {}", entry.name))?;
            totals.record(outcome);
        }
        return Ok(());
    }

    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();
    if AssetKind::from_name(name) == AssetKind::Other {
        totals.record(None);
        return Ok(());
    }
    let bytes = fs::read(path)?;
    totals
        .bytes_in
        .fetch_add(bytes.len() as u64, Ordering::Relaxed);
    totals.record(convert_bytes(name, bytes, &dest_base, cipher)?);
    Ok(())
}

/// Writes the converted form of one asset next to `dest`. Returns the
/// number of bytes written, or `None` when there was nothing to convert.
fn convert_bytes(
    name: &str,
    bytes: Vec<u8>,
    dest: &Path,
    cipher: &LegacyCipher,
) -> Result<Option<u64>> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    match decode_asset(name, bytes, cipher)? {
        DecodedAsset::Image(image) => write_png(&image, &dest.with_extension("png")),
        DecodedAsset::TileSet(tiles) => {
            write_png(&tiles.atlas(ATLAS_COLUMNS), &dest.with_extension("png"))
        }
        DecodedAsset::Sprite(load) => {
            for warning in &load.warnings {
                log::warn!("{name}: {warning}");
            }
            let stem = dest
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or("sprite");
            let mut written = None;
            for (index, frame) in load.sprite.frames.iter().enumerate() {
                let Some(image) = frame.to_rgba() else {
                    continue;
                };
                let path = dest.with_file_name(format!("{stem}-{index:03}.png"));
                if let Some(bytes) = write_png(&image, &path)? {
                    written = Some(written.unwrap_or(0) + bytes);
                }
            }
            Ok(written)
        }
        DecodedAsset::Text(text) => {
            let path = dest.with_extension("utf8.txt");
            fs::write(&path, text.text.as_bytes())
                .with_context(|| format!("writing {}", path.display()))?;
            Ok(Some(text.text.len() as u64))
        }
        DecodedAsset::Other(_) => Ok(None),
    }
}

fn write_png(image: &RawImage, path: &Path) -> Result<Option<u64>> {
    if image.is_empty() {
        return Ok(None);
    }
    image::save_buffer(
        path,
        &image.rgba,
        image.width as u32,
        image.height as u32,
        image::ColorType::Rgba8,
    )
    .with_context(|| format!("writing {}", path.display()))?;
    Ok(Some(fs::metadata(path)?.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use l1_formats::{ContainerVariant, IndexedArchiveWriter};
    use tempfile::tempdir;

    fn tiny_image() -> Vec<u8> {
        let mut data = vec![0u8, 0, 2, 1, 1, 0, 2];
        data.extend_from_slice(&0x7C00u16.to_le_bytes());
        data.extend_from_slice(&0x001Fu16.to_le_bytes());
        data
    }

    #[test]
    fn image_becomes_png() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("0-1.img");
        let written = convert_bytes("0-1.img", tiny_image(), &dest, &LegacyCipher::default())
            .unwrap()
            .unwrap();
        let png = dir.path().join("0-1.png");
        assert_eq!(fs::metadata(&png).unwrap().len(), written);
        let decoded = image::open(&png).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (2, 1));
        assert_eq!(decoded.get_pixel(0, 0).0, [0xFF, 0, 0, 0xFF]);
    }

    #[test]
    fn archive_entries_cannot_escape_the_output_tree() {
        let root = tempdir().unwrap();
        let input = root.path().join("in");
        let output = root.path().join("out");
        fs::create_dir_all(&input).unwrap();

        let mut writer = IndexedArchiveWriter::new(ContainerVariant::Zlib);
        writer.add("../../evil.txt", b"gotcha".to_vec(), false).unwrap();
        writer.add("..", b"nothing".to_vec(), false).unwrap();
        fs::write(input.join("pack.idx"), writer.finish().unwrap()).unwrap();

        let args = Args {
            input: input.clone(),
            output: output.clone(),
            jobs: Some(1),
            archive_extension: "idx".into(),
        };
        let totals = Totals::default();
        convert_path(&args, &input.join("pack.idx"), &LegacyCipher::default(), &totals).unwrap();

        assert!(!root.path().join("evil.utf8.txt").exists());
        assert!(output.join("pack/evil.utf8.txt").exists());
        assert_eq!(totals.converted.load(Ordering::Relaxed), 1);
        assert_eq!(totals.skipped.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn walks_tree_and_archives_concurrently() {
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();
        fs::create_dir_all(input.path().join("sprite")).unwrap();
        fs::write(input.path().join("sprite/a.img"), tiny_image()).unwrap();
        fs::write(input.path().join("readme.bin"), b"ignored").unwrap();
        fs::write(input.path().join("broken.img"), [0u8, 0, 4, 4, 9]).unwrap();

        let mut writer = IndexedArchiveWriter::new(ContainerVariant::Zlib);
        writer.add("b.img", tiny_image(), true).unwrap();
        writer.add("note.txt", b"hello".to_vec(), false).unwrap();
        fs::write(input.path().join("pack.idx"), writer.finish().unwrap()).unwrap();

        let args = Args {
            input: input.path().to_path_buf(),
            output: output.path().to_path_buf(),
            jobs: Some(2),
            archive_extension: "idx".into(),
        };
        let totals = Totals::default();
        let cipher = LegacyCipher::default();
        let failed = AtomicUsize::new(0);
        collect_inputs(&args.input).par_iter().for_each(|path| {
            if convert_path(&args, path, &cipher, &totals).is_err() {
                failed.fetch_add(1, Ordering::Relaxed);
            }
        });

        assert_eq!(totals.converted.load(Ordering::Relaxed), 3);
        assert_eq!(totals.skipped.load(Ordering::Relaxed), 1);
        assert_eq!(failed.load(Ordering::Relaxed), 1);
        assert!(output.path().join("sprite/a.png").exists());
        assert!(output.path().join("pack/b.png").exists());
        let note = fs::read_to_string(output.path().join("pack/note.utf8.txt")).unwrap();
        assert_eq!(note, "hello");
    }
}
