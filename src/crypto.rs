//! AES-ECB decryption for encrypted pak indexes and entries.
//!
//! Pak files are encrypted with AES in ECB mode, zero padded, no IV. There is
//! no MAC; whether a key is right can only be guessed by checking that the
//! decrypted index starts with a plausible mount-point string.

use crate::error::{Error, Result};
use crate::io::MAX_INDEX_STRING_LEN;
use aes::cipher::{BlockDecrypt, KeyInit};
use aes::{Aes128, Aes192, Aes256, Block};
use std::fmt;
use std::str::FromStr;

pub const AES_BLOCK_SIZE: usize = 16;

/// An AES key of any of the three standard widths.
#[derive(Clone)]
pub enum AesKey {
    Aes128(Aes128),
    Aes192(Aes192),
    Aes256(Aes256),
}

impl AesKey {
    pub fn new(bytes: &[u8]) -> Result<Self> {
        let key = match bytes.len() {
            16 => AesKey::Aes128(Aes128::new_from_slice(bytes).map_err(invalid_length)?),
            24 => AesKey::Aes192(Aes192::new_from_slice(bytes).map_err(invalid_length)?),
            32 => AesKey::Aes256(Aes256::new_from_slice(bytes).map_err(invalid_length)?),
            len => {
                return Err(Error::InvalidKey(format!(
                    "expected 16, 24 or 32 bytes, got {}",
                    len
                )))
            }
        };

        Ok(key)
    }

    /// Decrypts `data` in place. Its length must be a whole number of blocks.
    pub fn decrypt_in_place(&self, data: &mut [u8]) -> Result<()> {
        if data.len() % AES_BLOCK_SIZE != 0 {
            return Err(Error::format(format!(
                "encrypted length {} is not a multiple of {}",
                data.len(),
                AES_BLOCK_SIZE
            )));
        }

        for chunk in data.chunks_exact_mut(AES_BLOCK_SIZE) {
            let block = Block::from_mut_slice(chunk);

            match self {
                AesKey::Aes128(cipher) => cipher.decrypt_block(block),
                AesKey::Aes192(cipher) => cipher.decrypt_block(block),
                AesKey::Aes256(cipher) => cipher.decrypt_block(block),
            }
        }

        Ok(())
    }

    pub fn bits(&self) -> usize {
        match self {
            AesKey::Aes128(_) => 128,
            AesKey::Aes192(_) => 192,
            AesKey::Aes256(_) => 256,
        }
    }
}

fn invalid_length(_: aes::cipher::InvalidLength) -> Error {
    Error::InvalidKey("invalid key length".to_owned())
}

impl fmt::Debug for AesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AesKey({} bits)", self.bits())
    }
}

impl FromStr for AesKey {
    type Err = Error;

    /// Parses a hex key, with or without a `0x` prefix.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let s = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| Error::InvalidKey(e.to_string()))?;

        AesKey::new(&bytes)
    }
}

/// Decrypts a whole ciphertext into a new buffer.
pub fn decrypt(ciphertext: &[u8], key: &AesKey) -> Result<Vec<u8>> {
    let mut data = ciphertext.to_vec();

    key.decrypt_in_place(&mut data)?;

    Ok(data)
}

/// Rounds `len` up to the next multiple of the AES block size.
pub fn align_to_block(len: u64) -> u64 {
    let block = AES_BLOCK_SIZE as u64;

    len.div_ceil(block) * block
}

/// Where the string-length heuristic expects a zero byte, as
/// `(offset, width)`, or `None` if the length itself is implausible.
///
/// For UTF-16 strings only the high byte of the final unit is checked.
fn terminator_location(plain_prefix: &[u8]) -> Option<(usize, usize)> {
    let head: [u8; 4] = plain_prefix.get(..4)?.try_into().ok()?;
    let length = i32::from_le_bytes(head);

    if length.unsigned_abs() > MAX_INDEX_STRING_LEN {
        return None;
    }

    if length < 0 {
        let units = length.unsigned_abs() as usize;

        Some((4 + (units - 1) * 2 + 1, 1))
    } else {
        Some(((4 + length as usize) - 1, 1))
    }
}

/// Checks that decrypted index bytes start with a plausible FString: a length
/// within bounds whose final character is a zero terminator.
pub fn looks_like_index(plain: &[u8]) -> bool {
    match terminator_location(plain) {
        Some((offset, width)) => plain
            .get(offset..offset + width)
            .is_some_and(|bytes| bytes.iter().all(|&b| b == 0)),
        None => false,
    }
}

/// Returns the position of the first key whose decryption of `ciphertext`
/// passes [`looks_like_index`].
///
/// Only the first block is decrypted unless the terminator lies further in.
pub fn discover_key(ciphertext: &[u8], keys: &[AesKey]) -> Option<usize> {
    if ciphertext.len() < AES_BLOCK_SIZE {
        return None;
    }

    keys.iter().position(|key| {
        let mut plain = ciphertext[..AES_BLOCK_SIZE].to_vec();

        if key.decrypt_in_place(&mut plain).is_err() {
            return false;
        }

        let Some((offset, width)) = terminator_location(&plain) else {
            return false;
        };

        let needed = align_to_block((offset + width) as u64) as usize;

        if needed > plain.len() {
            if needed > ciphertext.len() {
                return false;
            }

            plain = ciphertext[..needed].to_vec();

            if key.decrypt_in_place(&mut plain).is_err() {
                return false;
            }
        }

        looks_like_index(&plain)
    })
}
