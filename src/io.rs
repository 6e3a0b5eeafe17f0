use crate::error::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read, Seek, SeekFrom};

/// Longest string accepted inside package data.
pub const MAX_ASSET_STRING_LEN: u32 = 65536;
/// Longest string accepted while validating a decrypted index.
pub const MAX_INDEX_STRING_LEN: u32 = 512;

/// In-memory cursor over one decoded buffer.
///
/// `depth` tracks how many nested property bags the decoder is inside.
pub struct Reader {
    cursor: Cursor<Vec<u8>>,
    pub depth: usize,
}

impl Reader {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            cursor: Cursor::new(data),
            depth: 0,
        }
    }

    pub fn get_ref(&self) -> &Vec<u8> {
        self.cursor.get_ref()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.cursor.into_inner()
    }

    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    pub fn len(&self) -> u64 {
        self.cursor.get_ref().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.cursor.get_ref().is_empty()
    }

    pub fn set_position(&mut self, position: u64) {
        self.cursor.set_position(position);
    }
}

impl Read for Reader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl Seek for Reader {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.cursor.seek(pos)
    }
}

pub trait ReaderExt: Read {
    fn read_fstring(&mut self) -> Result<String> {
        self.read_fstring_max(MAX_ASSET_STRING_LEN)
    }

    /// Reads a length-prefixed string; a negative length means UTF-16 code units.
    fn read_fstring_max(&mut self, max_len: u32) -> Result<String> {
        let length = self.read_i32::<LittleEndian>()?;

        if length.unsigned_abs() > max_len {
            return Err(Error::format(format!(
                "string length {} exceeds {}",
                length, max_len
            )));
        }

        if length == 0 {
            return Ok("".to_owned());
        }

        if length < 0 {
            let count = length.unsigned_abs() as usize;
            let mut units = Vec::with_capacity(count);

            for _ in 0..count {
                units.push(self.read_u16::<LittleEndian>()?);
            }

            return Ok(String::from_utf16(&units)?);
        }

        let mut buf = vec![0; length as usize];

        self.read_exact(&mut buf)?;
        buf.pop();

        while buf.last() == Some(&0) {
            buf.pop();
        }

        Ok(match String::from_utf8(buf) {
            Ok(value) => value,
            Err(err) => err.into_bytes().iter().map(|&b| b as char).collect(),
        })
    }

    /// Reads a signed 32-bit count followed by that many elements.
    fn read_array<T, F>(&mut self, mut element: F) -> Result<Vec<T>>
    where
        Self: Sized,
        F: FnMut(&mut Self) -> Result<T>,
    {
        let count = self.read_i32::<LittleEndian>()?;

        if count < 0 {
            return Err(Error::format(format!("negative array length {}", count)));
        }

        let mut elements = Vec::with_capacity((count as usize).min(4096));

        for _ in 0..count {
            elements.push(element(self)?);
        }

        Ok(elements)
    }

    fn read_hash(&mut self) -> Result<[u8; 20]> {
        let mut hash = [0; 20];

        self.read_exact(&mut hash)?;

        Ok(hash)
    }

    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0; len];

        self.read_exact(&mut buf)?;

        Ok(buf)
    }

    fn read_bool32(&mut self) -> Result<bool> {
        Ok(self.read_i32::<LittleEndian>()? != 0)
    }
}

impl<R: Read + ?Sized> ReaderExt for R {}
