//! 128-bit block cipher protecting the client's configuration payloads.
//!
//! The block transform is AES-128. Payloads are chained with a rolling key:
//! on decrypt the rolling key becomes the ciphertext of the block just
//! processed, on encrypt the transform output. A trailing partial block is
//! only XORed with the current rolling key.

use std::fmt;

use aes::Aes128;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};

use crate::error::{Error, Result};

pub const BLOCK_LEN: usize = 16;
pub const HEADER_LEN: usize = 4;
pub const MARKER_ENCRYPTED: u8 = 0x58;
pub const MARKER_PLAIN: u8 = 0x3C;

pub const DEFAULT_KEY: [u8; BLOCK_LEN] = [
    0x4c, 0x31, 0x43, 0x6f, 0x6e, 0x66, 0x69, 0x67, 0x4b, 0x65, 0x79, 0x21, 0x32, 0x30, 0x30, 0x33,
];

/// Rolling key in effect before the first block.
pub const DEFAULT_SEED: [u8; BLOCK_LEN] = [
    0x9d, 0x2f, 0x61, 0x0b, 0xe4, 0x37, 0xc8, 0x5a, 0x13, 0x7e, 0xa6, 0x40, 0xf9, 0x82, 0x2c, 0xd5,
];

/// Reports whether a payload carries the encrypted marker.
pub fn is_encrypted(payload: &[u8]) -> bool {
    payload.first() == Some(&MARKER_ENCRYPTED)
}

#[derive(Clone)]
pub struct LegacyCipher {
    block: Aes128,
    seed: [u8; BLOCK_LEN],
}

impl fmt::Debug for LegacyCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LegacyCipher").finish_non_exhaustive()
    }
}

impl Default for LegacyCipher {
    fn default() -> Self {
        Self::new(&DEFAULT_KEY, DEFAULT_SEED)
    }
}

impl LegacyCipher {
    pub fn new(key: &[u8; BLOCK_LEN], seed: [u8; BLOCK_LEN]) -> Self {
        LegacyCipher {
            block: Aes128::new(GenericArray::from_slice(key)),
            seed,
        }
    }

    pub fn seed(&self) -> [u8; BLOCK_LEN] {
        self.seed
    }

    pub fn encrypt_block(&self, block: &mut [u8; BLOCK_LEN]) {
        self.block
            .encrypt_block(GenericArray::from_mut_slice(block.as_mut_slice()));
    }

    pub fn decrypt_block(&self, block: &mut [u8; BLOCK_LEN]) {
        self.block
            .decrypt_block(GenericArray::from_mut_slice(block.as_mut_slice()));
    }

    /// Chained decryption of a headerless body, starting from `rolling`.
    pub fn decrypt_body(&self, body: &mut [u8], mut rolling: [u8; BLOCK_LEN]) {
        let mut chunks = body.chunks_exact_mut(BLOCK_LEN);
        for chunk in &mut chunks {
            let mut block = [0u8; BLOCK_LEN];
            block.copy_from_slice(chunk);
            let ciphertext = block;
            self.decrypt_block(&mut block);
            xor_in_place(&mut block, &rolling);
            chunk.copy_from_slice(&block);
            rolling = ciphertext;
        }
        xor_in_place(chunks.into_remainder(), &rolling);
    }

    /// Chained encryption of a headerless body, starting from `rolling`.
    pub fn encrypt_body(&self, body: &mut [u8], mut rolling: [u8; BLOCK_LEN]) {
        let mut chunks = body.chunks_exact_mut(BLOCK_LEN);
        for chunk in &mut chunks {
            let mut block = [0u8; BLOCK_LEN];
            block.copy_from_slice(chunk);
            xor_in_place(&mut block, &rolling);
            self.encrypt_block(&mut block);
            chunk.copy_from_slice(&block);
            rolling = block;
        }
        xor_in_place(chunks.into_remainder(), &rolling);
    }

    /// Decrypts a full payload (4-byte header + body) and flips its marker
    /// to the plaintext sentinel.
    pub fn decrypt_payload(&self, mut payload: Vec<u8>) -> Result<Vec<u8>> {
        check_marker(&payload, MARKER_ENCRYPTED)?;
        self.decrypt_body(&mut payload[HEADER_LEN..], self.seed);
        payload[0] = MARKER_PLAIN;
        Ok(payload)
    }

    /// Inverse of [`LegacyCipher::decrypt_payload`].
    pub fn encrypt_payload(&self, mut payload: Vec<u8>) -> Result<Vec<u8>> {
        check_marker(&payload, MARKER_PLAIN)?;
        self.encrypt_body(&mut payload[HEADER_LEN..], self.seed);
        payload[0] = MARKER_ENCRYPTED;
        Ok(payload)
    }
}

fn check_marker(payload: &[u8], expected: u8) -> Result<()> {
    if payload.len() < HEADER_LEN {
        return Err(Error::TruncatedInput {
            context: "cipher payload header",
            needed: HEADER_LEN,
            available: payload.len(),
        });
    }
    if payload[0] != expected {
        return Err(Error::CipherMarkerMismatch {
            expected,
            found: payload[0],
        });
    }
    Ok(())
}

fn xor_in_place(data: &mut [u8], key: &[u8; BLOCK_LEN]) {
    for (byte, k) in data.iter_mut().zip(key) {
        *byte ^= k;
    }
}
