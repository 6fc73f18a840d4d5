use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use l1_formats::cipher::{BLOCK_LEN, DEFAULT_KEY, DEFAULT_SEED};
use l1_formats::text::encode_text;
use l1_formats::{LegacyCipher, decode_text, is_encrypted};

/// Decrypt or encrypt legacy client configuration text.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    #[arg(value_enum)]
    mode: Mode,

    input: PathBuf,

    output: PathBuf,

    /// Transcode decrypted text to UTF-8 (decrypt) or from UTF-8 to the
    /// file's regional charset (encrypt)
    #[arg(long)]
    transcode: bool,

    /// Override the cipher key (32 hex chars)
    #[arg(long, value_name = "HEX")]
    key: Option<String>,

    /// Override the chaining seed (32 hex chars)
    #[arg(long, value_name = "HEX")]
    seed: Option<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    Decrypt,
    Encrypt,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let cipher = build_cipher(&args)?;
    let bytes =
        fs::read(&args.input).with_context(|| format!("reading {}", args.input.display()))?;
    let file_name = args.input.file_name().and_then(|name| name.to_str());

    let output = match args.mode {
        Mode::Decrypt => {
            if !is_encrypted(&bytes) {
                log::warn!("{} is not encrypted, copying", args.input.display());
            }
            let plain = if is_encrypted(&bytes) {
                cipher.decrypt_payload(bytes)?
            } else {
                bytes
            };
            if args.transcode {
                let decoded = decode_text(&plain, file_name);
                println!("charset: {} ({:?})", decoded.encoding.name(), decoded.source);
                decoded.text.into_bytes()
            } else {
                plain
            }
        }
        Mode::Encrypt => {
            let plain = if args.transcode {
                let text = String::from_utf8(bytes).context("input is not UTF-8")?;
                let (encoding, _) = l1_formats::text::detect_encoding(text.as_bytes(), file_name);
                encode_text(&text, encoding)
            } else {
                bytes
            };
            cipher.encrypt_payload(plain)?
        }
    };

    fs::write(&args.output, output)
        .with_context(|| format!("writing {}", args.output.display()))?;
    Ok(())
}

fn build_cipher(args: &Args) -> Result<LegacyCipher> {
    if args.key.is_none() && args.seed.is_none() {
        return Ok(LegacyCipher::default());
    }
    let key = match &args.key {
        Some(text) => parse_block(text).context("parsing --key")?,
        None => DEFAULT_KEY,
    };
    let seed = match &args.seed {
        Some(text) => parse_block(text).context("parsing --seed")?,
        None => DEFAULT_SEED,
    };
    Ok(LegacyCipher::new(&key, seed))
}

fn parse_block(text: &str) -> Result<[u8; BLOCK_LEN]> {
    let bytes = hex::decode(text.trim())?;
    match <[u8; BLOCK_LEN]>::try_from(bytes.as_slice()) {
        Ok(block) => Ok(block),
        Err(_) => bail!("expected {BLOCK_LEN} bytes, got {}", bytes.len()),
    }
}
