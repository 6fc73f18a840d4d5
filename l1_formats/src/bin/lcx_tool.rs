use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use l1_formats::{KeySet, LcxContainer};

/// Inspect, extract and patch AEAD-protected LCX containers.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// LCX container to operate on
    container: PathBuf,

    /// JSON key file: {"keys": ["<64 hex chars>", ...]}
    #[arg(long, value_name = "FILE")]
    keys: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List entries
    List {
        #[arg(long)]
        json: bool,
    },
    /// Decrypt entries into a directory
    Extract {
        #[arg(long, value_name = "DIR", default_value = "extracted")]
        dest: PathBuf,

        /// Logical names to extract (all when omitted)
        #[arg(long = "entry", value_name = "NAME")]
        entries: Vec<String>,
    },
    /// Write a copy of the container with entries replaced or added
    Replace {
        /// Replacement as LOGICAL_NAME=PATH (may repeat)
        #[arg(long = "set", value_name = "NAME=PATH", required = true)]
        replacements: Vec<String>,

        #[arg(long, value_name = "PATH")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let container = LcxContainer::open(&args.container)
        .with_context(|| format!("opening container {}", args.container.display()))?;

    match &args.command {
        Command::List { json } => list(&container, *json),
        Command::Extract { dest, entries } => {
            let keys = load_keys(&args)?;
            extract(&container, &keys, dest, entries)
        }
        Command::Replace {
            replacements,
            output,
        } => {
            let keys = load_keys(&args)?;
            replace(&container, &keys, replacements, output)
        }
    }
}

fn load_keys(args: &Args) -> Result<KeySet> {
    let Some(path) = args.keys.as_ref() else {
        bail!("--keys is required for this command");
    };
    KeySet::load(path).with_context(|| format!("loading keys from {}", path.display()))
}

fn list(container: &LcxContainer, json: bool) -> Result<()> {
    if json {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        serde_json::to_writer_pretty(&mut out, container.entries())?;
        writeln!(out)?;
        return Ok(());
    }
    println!("{} entries", container.entries().len());
    for entry in container.entries() {
        println!(
            "{:>4}  {:<40} {:>10}",
            entry.index, entry.logical_filename, entry.stored_size
        );
    }
    Ok(())
}

fn extract(
    container: &LcxContainer,
    keys: &KeySet,
    dest: &Path,
    names: &[String],
) -> Result<()> {
    fs::create_dir_all(dest).with_context(|| format!("creating {}", dest.display()))?;
    let mut extracted = 0usize;
    for entry in container.entries() {
        if !names.is_empty()
            && !names
                .iter()
                .any(|name| name.eq_ignore_ascii_case(&entry.logical_filename))
        {
            continue;
        }
        let plain = container
            .decrypt_entry(entry, keys)
            .with_context(|| format!("decrypting {}", entry.container_entry_name))?;
        let file_name = entry.logical_filename.replace(['/', '\\'], "_");
        let path = dest.join(file_name);
        fs::write(&path, plain).with_context(|| format!("writing {}", path.display()))?;
        extracted += 1;
    }
    println!("Extracted {extracted} entries into {}", dest.display());
    Ok(())
}

fn replace(
    container: &LcxContainer,
    keys: &KeySet,
    pairs: &[String],
    output: &Path,
) -> Result<()> {
    let mut replacements = HashMap::new();
    for pair in pairs {
        let Some((name, path)) = pair.split_once('=') else {
            bail!("replacement {pair:?} is not NAME=PATH");
        };
        let bytes = fs::read(path).with_context(|| format!("reading {path}"))?;
        replacements.insert(name.to_string(), bytes);
    }

    let file = File::create(output).with_context(|| format!("creating {}", output.display()))?;
    let writer = container.rewrite(keys, &replacements, BufWriter::new(file))?;
    writer
        .into_inner()
        .map_err(|err| err.into_error())?
        .sync_all()?;
    println!(
        "Wrote {} with {} replacement(s)",
        output.display(),
        replacements.len()
    );
    Ok(())
}
