use crate::crypto::AES_BLOCK_SIZE;
use crate::error::{Error, Result};
use crate::io::{Reader, ReaderExt};
use crate::pak::{
    CompressedBlock, PakEntry, PakInfo, PakVersion, COMPRESSION_METHOD_NAME_LEN,
    ENTRY_FLAG_ENCRYPTED, MAX_COMPRESSION_METHODS, PAK_MAGIC,
};
use crate::structs::FGuid;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

const LEGACY_COMPRESS_ZLIB: i32 = 0x01;
const LEGACY_COMPRESS_GZIP: i32 = 0x02;
const LEGACY_COMPRESS_CUSTOM: i32 = 0x04;

impl PakInfo {
    pub fn read(reader: &mut Reader) -> Result<Self> {
        let encryption_key_guid = FGuid::read(reader)?;
        let encrypted_index = reader.read_u8()? != 0;

        let magic = reader.read_u32::<LittleEndian>()?;

        if magic != PAK_MAGIC {
            return Err(Error::format(format!("bad pak magic {:#010x}", magic)));
        }

        let version = PakVersion::from_raw(reader.read_u32::<LittleEndian>()?);
        let index_offset = reader.read_i64::<LittleEndian>()?;
        let index_size = reader.read_i64::<LittleEndian>()?;
        let index_hash = reader.read_hash()?;

        let compression_methods = if version < PakVersion::FNameBasedCompressionMethod {
            vec!["Zlib".to_owned(), "Gzip".to_owned(), "Oodle".to_owned()]
        } else {
            let table = reader.read_bytes(COMPRESSION_METHOD_NAME_LEN * MAX_COMPRESSION_METHODS)?;

            table
                .chunks_exact(COMPRESSION_METHOD_NAME_LEN)
                .filter(|slot| slot[0] != 0)
                .map(|slot| {
                    let end = slot.iter().position(|&b| b == 0).unwrap_or(slot.len());

                    String::from_utf8_lossy(&slot[..end]).into_owned()
                })
                .collect()
        };

        Ok(PakInfo {
            encryption_key_guid,
            encrypted_index,
            version,
            index_offset,
            index_size,
            index_hash,
            compression_methods,
        })
    }
}

impl CompressedBlock {
    pub fn read(reader: &mut Reader) -> Result<Self> {
        let start = reader.read_i64::<LittleEndian>()?;
        let end = reader.read_i64::<LittleEndian>()?;

        Ok(CompressedBlock { start, end })
    }
}

/// Size of a serialized explicit entry header.
pub fn serialized_size(version: PakVersion, compression_method: u32, block_count: u32) -> u64 {
    let mut size = 8 + 8 + 8 + 4 + 20;

    if version <= PakVersion::Initial {
        size += 8;
    }

    if version >= PakVersion::CompressionEncryption {
        if compression_method != 0 {
            size += 4 + 16 * block_count as u64;
        }

        size += 1 + 4;
    }

    size
}

fn block_end(start: i64, len: i64) -> Result<i64> {
    start.checked_add(len).ok_or_else(|| {
        Error::format(format!(
            "compression block at {} with length {} overflows",
            start, len
        ))
    })
}

impl PakEntry {
    /// Reads an explicit, self-describing entry record.
    pub fn read(reader: &mut Reader, version: PakVersion) -> Result<Self> {
        let start = reader.position();

        let offset = reader.read_i64::<LittleEndian>()?;
        let size = reader.read_i64::<LittleEndian>()?;
        let uncompressed_size = reader.read_i64::<LittleEndian>()?;

        let compression_method = if version < PakVersion::FNameBasedCompressionMethod {
            let legacy = reader.read_i32::<LittleEndian>()?;

            if legacy == 0 {
                0
            } else if legacy & LEGACY_COMPRESS_ZLIB != 0 {
                1
            } else if legacy & LEGACY_COMPRESS_GZIP != 0 {
                2
            } else if legacy & LEGACY_COMPRESS_CUSTOM != 0 {
                3
            } else {
                return Err(Error::format(format!(
                    "unknown legacy compression flags {:#x}",
                    legacy
                )));
            }
        } else {
            reader.read_u32::<LittleEndian>()?
        };

        if version <= PakVersion::Initial {
            // timestamp
            reader.read_i64::<LittleEndian>()?;
        }

        let hash = reader.read_hash()?;

        let mut compression_blocks = Vec::new();
        let mut flags = 0;
        let mut compression_block_size = 0;

        if version >= PakVersion::CompressionEncryption {
            if compression_method != 0 {
                compression_blocks = reader.read_array(CompressedBlock::read)?;
            }

            flags = reader.read_u8()?;
            compression_block_size = reader.read_u32::<LittleEndian>()?;
        }

        Ok(PakEntry {
            offset,
            size,
            uncompressed_size,
            hash,
            compression_method,
            compression_blocks,
            compression_block_size,
            flags,
            struct_size: reader.position() - start,
        })
    }

    /// Decodes the bit-packed record at `location` in the encoded entries
    /// blob of a path-hash index.
    ///
    /// The leading word holds, from the top bit down: offset fits in 32 bits,
    /// uncompressed size fits in 32 bits, size fits in 32 bits, compression
    /// method (6 bits), encrypted (1 bit), block count (16 bits) and block
    /// size in 2 KiB units (6 bits).
    pub fn read_encoded(encoded: &[u8], location: i32) -> Result<Self> {
        if location < 0 {
            return Err(Error::UnsupportedIndirection(location));
        }

        let mut cursor = Cursor::new(encoded);
        cursor.set_position(location as u64);

        let value = cursor.read_u32::<LittleEndian>()?;

        let compression_method = (value >> 23) & 0x3f;
        let encrypted = value & (1 << 22) != 0;
        let block_count = (value >> 6) & 0xffff;

        let mut read_var = |safe_bit: u32| -> Result<i64> {
            if value & (1 << safe_bit) != 0 {
                Ok(cursor.read_u32::<LittleEndian>()? as i64)
            } else {
                Ok(cursor.read_i64::<LittleEndian>()?)
            }
        };

        let offset = read_var(31)?;
        let uncompressed_size = read_var(30)?;

        let size = if compression_method != 0 {
            read_var(29)?
        } else {
            uncompressed_size
        };

        let compression_block_size = if block_count == 0 {
            0
        } else if uncompressed_size < 65536 {
            uncompressed_size as u32
        } else {
            (value & 0x3f) << 11
        };

        let struct_size = serialized_size(PakVersion::LATEST, compression_method, block_count);
        let mut compression_blocks = Vec::with_capacity(block_count as usize);

        if block_count == 1 && !encrypted {
            let start = struct_size as i64;

            compression_blocks.push(CompressedBlock {
                start,
                end: block_end(start, size)?,
            });
        } else if block_count > 0 {
            let alignment = if encrypted { AES_BLOCK_SIZE as i64 } else { 1 };
            let mut block_offset = struct_size as i64;

            for _ in 0..block_count {
                let block_len = cursor.read_u32::<LittleEndian>()? as i64;

                compression_blocks.push(CompressedBlock {
                    start: block_offset,
                    end: block_end(block_offset, block_len)?,
                });

                let padded = (block_len + alignment - 1) / alignment * alignment;
                block_offset = block_end(block_offset, padded)?;
            }
        }

        Ok(PakEntry {
            offset,
            size,
            uncompressed_size,
            hash: [0; 20],
            compression_method,
            compression_blocks,
            compression_block_size,
            flags: if encrypted { ENTRY_FLAG_ENCRYPTED } else { 0 },
            struct_size,
        })
    }
}
