use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use l1_formats::{FrameHeader, SpriteFile, Warning};
use serde::Serialize;

/// Summarise a sprite container: palette, frames, block lists and tiles.
#[derive(Parser)]
struct Args {
    /// Path to the `.spr` file to inspect
    path: PathBuf,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Summary<'a> {
    palette_colors: Option<usize>,
    mask_color: String,
    tiles: usize,
    frames: Vec<FrameSummary<'a>>,
    warnings: &'a [Warning],
}

#[derive(Serialize)]
struct FrameSummary<'a> {
    x_offset: i32,
    y_offset: i32,
    width: usize,
    height: usize,
    frame_type: u8,
    header: &'a FrameHeader,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let bytes = fs::read(&args.path).with_context(|| format!("reading {}", args.path.display()))?;
    let load = SpriteFile::decode(&bytes)
        .with_context(|| format!("decoding sprite {}", args.path.display()))?;
    let sprite = &load.sprite;

    let summary = Summary {
        palette_colors: sprite.palette.as_ref().map(Vec::len),
        mask_color: format!("{:#06x}", sprite.mask_color),
        tiles: sprite.tiles.len(),
        frames: sprite
            .frames
            .iter()
            .zip(&sprite.headers)
            .map(|(frame, header)| FrameSummary {
                x_offset: frame.x_offset,
                y_offset: frame.y_offset,
                width: frame.width,
                height: frame.height,
                frame_type: frame.frame_type,
                header,
            })
            .collect(),
        warnings: &load.warnings,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    match summary.palette_colors {
        Some(count) => println!("palette: {count} colors"),
        None => println!("palette: none"),
    }
    println!("mask color: {}", summary.mask_color);
    println!("tiles: {}", summary.tiles);
    println!("frames: {}", summary.frames.len());
    for (index, frame) in summary.frames.iter().enumerate() {
        println!(
            "{:>4}  {:>4}x{:<4} at ({:>5}, {:>5})  type {:>3}  blocks {}",
            index,
            frame.width,
            frame.height,
            frame.x_offset,
            frame.y_offset,
            frame.frame_type,
            frame.header.blocks.len()
        );
    }
    for warning in summary.warnings {
        println!("warning: {warning}");
    }
    Ok(())
}
