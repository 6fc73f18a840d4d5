//! Error and warning types shared by every decoder in the crate.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Error conditions returned by the codec engine.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{context}: needed {needed} bytes but only {available} remain")]
    TruncatedInput {
        context: &'static str,
        needed: usize,
        available: usize,
    },
    #[error("container header {0:02x?} matches no known variant")]
    UnknownContainerVariant([u8; 4]),
    #[error("entry {entry} could not be authenticated with any of {tried} candidate keys")]
    AllKeysExhausted { entry: String, tried: usize },
    #[error("payload marker {found:#04x} does not match expected {expected:#04x}")]
    CipherMarkerMismatch { expected: u8, found: u8 },
    #[error("corrupt archive directory: {0}")]
    CorruptDirectory(String),
    #[error("value out of range: {0}")]
    OutOfRange(String),
    #[error("invalid dimensions: {0}")]
    InvalidDimensions(String),
    #[error("entry {0} not found")]
    MissingEntry(String),
    #[error("decrypted payload is not a Zstandard frame")]
    NotZstdFrame,
    #[error("invalid key material: {0}")]
    InvalidKey(String),
    #[error("AEAD encryption failed")]
    SealFailed,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip container error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("key file error: {0}")]
    KeyFile(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn out_of_range(message: impl Into<String>) -> Self {
        Error::OutOfRange(message.into())
    }
}

/// Non-fatal conditions reported alongside a successful decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Warning {
    /// Every built-in transparency candidate is used by real pixels; the
    /// carried color is used as the mask anyway.
    MaskColorExhausted { fallback: u16 },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::MaskColorExhausted { fallback } => write!(
                f,
                "all transparency candidates are in use; falling back to {fallback:#06x}"
            ),
        }
    }
}
