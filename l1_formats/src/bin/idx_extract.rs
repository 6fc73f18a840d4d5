use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use l1_formats::IndexedArchive;
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(about = "Extract legacy indexed archives", version)]
struct Args {
    /// Archive to extract (may be passed multiple times)
    #[arg(long = "archive", value_name = "PATH", conflicts_with = "root")]
    archives: Vec<PathBuf>,

    /// Directory scanned recursively for archives with the given extension
    #[arg(long = "root", value_name = "DIR", conflicts_with = "archives")]
    root: Option<PathBuf>,

    /// Archive extension used with --root
    #[arg(long, value_name = "EXT", default_value = "idx")]
    extension: String,

    /// Destination directory
    #[arg(long, value_name = "DIR", default_value = "extracted")]
    dest: PathBuf,

    /// Entry names to extract (case-insensitive, may repeat)
    #[arg(long = "entry", value_name = "NAME")]
    entries: Vec<String>,

    /// Overwrite existing files instead of skipping them
    #[arg(long)]
    overwrite: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let archives = resolve_archive_paths(&args);
    if archives.is_empty() {
        bail!("no archives to extract");
    }

    let filter: HashSet<String> = args
        .entries
        .iter()
        .map(|name| name.trim().to_ascii_lowercase())
        .collect();

    fs::create_dir_all(&args.dest)
        .with_context(|| format!("creating destination {}", args.dest.display()))?;

    for path in archives {
        let archive = IndexedArchive::open(&path)
            .with_context(|| format!("opening archive {}", path.display()))?;
        let stem = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("archive");
        let dest = args.dest.join(stem);
        let extracted = extract_archive(&archive, &dest, &filter, args.overwrite)?;
        println!(
            "Extracted {} entries from {} into {}",
            extracted,
            path.display(),
            dest.display()
        );
    }

    Ok(())
}

fn resolve_archive_paths(args: &Args) -> Vec<PathBuf> {
    let mut archives = Vec::new();
    if !args.archives.is_empty() {
        archives.extend(args.archives.iter().cloned());
    } else if let Some(root) = args.root.as_ref() {
        for entry in WalkDir::new(root).into_iter().filter_map(|res| res.ok()) {
            let matches = entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(&args.extension));
            if matches {
                archives.push(entry.into_path());
            }
        }
    }
    archives.sort();
    archives.dedup();
    archives
}

fn extract_archive(
    archive: &IndexedArchive,
    dest_root: &Path,
    filter: &HashSet<String>,
    overwrite: bool,
) -> Result<usize> {
    fs::create_dir_all(dest_root).with_context(|| format!("creating {}", dest_root.display()))?;

    let mut extracted = 0usize;
    for entry in archive.entries() {
        if !filter.is_empty() && !filter.contains(&entry.name.to_ascii_lowercase()) {
            continue;
        }

        let Some(relative) = entry.relative_path() else {
            log::warn!("skipping entry with unusable name {:?}", entry.name);
            continue;
        };

        let dest_path = dest_root.join(&relative);
        if dest_path.exists() && !overwrite {
            continue;
        }
        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }

        archive
            .extract_entry(entry, &dest_path)
            .with_context(|| format!("extracting {}", entry.name))?;
        extracted += 1;
    }
    Ok(extracted)
}
