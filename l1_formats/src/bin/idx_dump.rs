use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use l1_formats::IndexedArchive;

/// List the directory of a legacy indexed archive.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// Archive to inspect
    path: PathBuf,

    /// Emit the listing as JSON instead of a table
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let archive = IndexedArchive::open(&args.path)
        .with_context(|| format!("opening archive {}", args.path.display()))?;

    if args.json {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        serde_json::to_writer_pretty(&mut out, archive.entries())?;
        writeln!(out)?;
        return Ok(());
    }

    println!(
        "{} entries in {} ({:?})",
        archive.entries().len(),
        args.path.display(),
        archive.variant()
    );
    for entry in archive.entries() {
        println!(
            "{name:<20} {offset:>10} {size:>10} {stored:>10}",
            name = entry.name,
            offset = entry.file_offset,
            size = entry.uncompressed_size,
            stored = if entry.is_compressed() {
                entry.compressed_size.to_string()
            } else {
                String::from("-")
            },
        );
    }
    Ok(())
}
