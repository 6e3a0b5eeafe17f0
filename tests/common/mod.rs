#![allow(dead_code)]

use aes::cipher::{BlockEncrypt, KeyInit};
use aes::{Aes256, Block};
use byteorder::{LittleEndian, WriteBytesExt};
use std::collections::BTreeMap;
use ue_pak_parser::pak::PAK_MAGIC;
use ue_pak_parser::AesKey;

pub const KEY: [u8; 32] = [
    0x4f, 0x1c, 0x8e, 0x02, 0x9a, 0x77, 0x3d, 0xc4, 0x10, 0x5b, 0xe9, 0x21, 0x66, 0xaf, 0x03, 0x88,
    0xd2, 0x47, 0x19, 0xbe, 0x70, 0x2c, 0x95, 0x0e, 0x5f, 0xa3, 0x61, 0xdb, 0x38, 0x84, 0x1a, 0xf7,
];

pub const WRONG_KEY: [u8; 32] = [0x11; 32];

pub fn aes_key(bytes: &[u8]) -> AesKey {
    AesKey::new(bytes).unwrap()
}

pub fn encrypt(plain: &[u8], key: &[u8; 32]) -> Vec<u8> {
    let cipher = Aes256::new_from_slice(key).unwrap();
    let mut data = plain.to_vec();

    data.resize(plain.len().div_ceil(16) * 16, 0);

    for chunk in data.chunks_exact_mut(16) {
        cipher.encrypt_block(Block::from_mut_slice(chunk));
    }

    data
}

pub fn fstring(out: &mut Vec<u8>, value: &str) {
    out.write_i32::<LittleEndian>(value.len() as i32 + 1).unwrap();
    out.extend_from_slice(value.as_bytes());
    out.push(0);
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Secondary {
    FullDirectory,
    PathHash,
    Both,
    Neither,
}

struct TestFile {
    path: String,
    data: Vec<u8>,
    encrypted: bool,
    compressed: bool,
}

struct Written {
    path: String,
    offset: u64,
    size: u64,
    encrypted: bool,
    compressed: bool,
    header: Vec<u8>,
}

/// Assembles a pak archive in memory: entry headers and payloads, the
/// secondary indexes, the primary index, then the footer.
pub struct PakBuilder {
    version: u32,
    mount_point: String,
    files: Vec<TestFile>,
    index_key: Option<[u8; 32]>,
    secondary: Secondary,
}

impl PakBuilder {
    /// Version 8: flat index of explicit entries.
    pub fn legacy() -> Self {
        Self::with_version(8)
    }

    /// Version 11: encoded entries behind directory indexes.
    pub fn modern() -> Self {
        Self::with_version(11)
    }

    pub fn with_version(version: u32) -> Self {
        Self {
            version,
            mount_point: "../../../Game/".to_owned(),
            files: Vec::new(),
            index_key: None,
            secondary: Secondary::FullDirectory,
        }
    }

    pub fn mount_point(mut self, mount_point: &str) -> Self {
        self.mount_point = mount_point.to_owned();
        self
    }

    pub fn file(mut self, path: &str, data: &[u8]) -> Self {
        self.files.push(TestFile {
            path: path.to_owned(),
            data: data.to_vec(),
            encrypted: false,
            compressed: false,
        });
        self
    }

    pub fn encrypted_file(mut self, path: &str, data: &[u8]) -> Self {
        self.files.push(TestFile {
            path: path.to_owned(),
            data: data.to_vec(),
            encrypted: true,
            compressed: false,
        });
        self
    }

    pub fn compressed_file(mut self, path: &str, data: &[u8]) -> Self {
        self.files.push(TestFile {
            path: path.to_owned(),
            data: data.to_vec(),
            encrypted: false,
            compressed: true,
        });
        self
    }

    pub fn encrypt_index(mut self, key: [u8; 32]) -> Self {
        self.index_key = Some(key);
        self
    }

    pub fn secondary(mut self, secondary: Secondary) -> Self {
        self.secondary = secondary;
        self
    }

    fn entry_header(&self, offset: u64, file: &TestFile) -> Vec<u8> {
        let mut out = Vec::new();
        let size = file.data.len() as i64;
        let header_len = if file.compressed { 8 * 3 + 4 + 20 + 4 + 16 + 1 + 4 } else { 53 };

        out.write_i64::<LittleEndian>(offset as i64).unwrap();
        out.write_i64::<LittleEndian>(size).unwrap();
        out.write_i64::<LittleEndian>(if file.compressed { size * 4 } else { size })
            .unwrap();
        out.write_u32::<LittleEndian>(file.compressed as u32).unwrap();
        out.extend_from_slice(&[0; 20]);

        if file.compressed {
            out.write_i32::<LittleEndian>(1).unwrap();
            out.write_i64::<LittleEndian>(header_len).unwrap();
            out.write_i64::<LittleEndian>(header_len + size).unwrap();
        }

        out.write_u8(file.encrypted as u8).unwrap();
        out.write_u32::<LittleEndian>(if file.compressed { 65536 } else { 0 })
            .unwrap();

        out
    }

    fn seal(&self, plain: Vec<u8>) -> Vec<u8> {
        match &self.index_key {
            Some(key) => encrypt(&plain, key),
            None => plain,
        }
    }

    fn directory_index(&self, written: &[Written], locations: &[i32]) -> Vec<u8> {
        let mut directories: BTreeMap<String, Vec<(String, i32)>> = BTreeMap::new();

        for (file, &location) in written.iter().zip(locations) {
            let (directory, name) = match file.path.rfind('/') {
                Some(slash) => (format!("/{}", &file.path[..=slash]), &file.path[slash + 1..]),
                None => ("/".to_owned(), file.path.as_str()),
            };

            directories
                .entry(directory)
                .or_default()
                .push((name.to_owned(), location));
        }

        let mut out = Vec::new();
        out.write_i32::<LittleEndian>(directories.len() as i32).unwrap();

        for (directory, files) in directories {
            fstring(&mut out, &directory);
            out.write_i32::<LittleEndian>(files.len() as i32).unwrap();

            for (name, location) in files {
                fstring(&mut out, &name);
                out.write_i32::<LittleEndian>(location).unwrap();
            }
        }

        out
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut written = Vec::new();

        for file in &self.files {
            let offset = out.len() as u64;
            let header = self.entry_header(offset, file);

            out.extend_from_slice(&header);

            if file.encrypted {
                let key = self.index_key.as_ref().unwrap_or(&KEY);
                out.extend_from_slice(&encrypt(&file.data, key));
            } else {
                out.extend_from_slice(&file.data);
            }

            written.push(Written {
                path: file.path.clone(),
                offset,
                size: file.data.len() as u64,
                encrypted: file.encrypted,
                compressed: file.compressed,
                header,
            });
        }

        let mut primary = Vec::new();
        fstring(&mut primary, &self.mount_point);
        primary
            .write_i32::<LittleEndian>(written.len() as i32)
            .unwrap();

        if self.version < 10 {
            for file in &written {
                fstring(&mut primary, &file.path);
                primary.extend_from_slice(&file.header);
            }
        } else {
            let mut encoded = Vec::new();
            let mut locations = Vec::new();

            for file in &written {
                locations.push(encoded.len() as i32);

                let mut word = (1u32 << 31) | (1 << 30);
                if file.encrypted {
                    word |= 1 << 22;
                }
                if file.compressed {
                    word |= (1 << 29) | (1 << 23) | (1 << 6);
                }

                encoded.write_u32::<LittleEndian>(word).unwrap();
                encoded.write_u32::<LittleEndian>(file.offset as u32).unwrap();

                if file.compressed {
                    encoded.write_u32::<LittleEndian>(file.size as u32 * 4).unwrap();
                }
                encoded.write_u32::<LittleEndian>(file.size as u32).unwrap();
            }

            let directory = self.directory_index(&written, &locations);

            let mut path_hash = Vec::new();
            path_hash
                .write_i32::<LittleEndian>(written.len() as i32)
                .unwrap();
            for (i, &location) in locations.iter().enumerate() {
                path_hash.write_u64::<LittleEndian>(0x9E37_79B9 * (i as u64 + 1)).unwrap();
                path_hash.write_i32::<LittleEndian>(location).unwrap();
            }
            path_hash.extend_from_slice(&directory);

            let descriptor = |present: bool, plain: Vec<u8>, out: &mut Vec<u8>| -> Vec<u8> {
                let mut fields = Vec::new();

                if !present {
                    fields.write_i32::<LittleEndian>(0).unwrap();
                    return fields;
                }

                let offset = out.len() as i64;
                let size = plain.len() as i64;
                out.extend_from_slice(&self.seal(plain));

                fields.write_i32::<LittleEndian>(1).unwrap();
                fields.write_i64::<LittleEndian>(offset).unwrap();
                fields.write_i64::<LittleEndian>(size).unwrap();
                fields.extend_from_slice(&[0x5A; 20]);
                fields
            };

            let use_path_hash = matches!(self.secondary, Secondary::PathHash | Secondary::Both);
            let use_full = matches!(self.secondary, Secondary::FullDirectory | Secondary::Both);

            let path_hash_fields = descriptor(use_path_hash, path_hash, &mut out);
            let full_fields = descriptor(use_full, directory, &mut out);

            primary.write_u64::<LittleEndian>(0xC0FFEE).unwrap();
            primary.extend_from_slice(&path_hash_fields);
            primary.extend_from_slice(&full_fields);
            primary
                .write_i32::<LittleEndian>(encoded.len() as i32)
                .unwrap();
            primary.extend_from_slice(&encoded);
            primary.write_i32::<LittleEndian>(0).unwrap();
        }

        let index_offset = out.len() as i64;
        let index_size = primary.len() as i64;
        out.extend_from_slice(&self.seal(primary));

        out.extend_from_slice(&[0; 16]);
        out.write_u8(self.index_key.is_some() as u8).unwrap();
        out.write_u32::<LittleEndian>(PAK_MAGIC).unwrap();
        out.write_u32::<LittleEndian>(self.version).unwrap();
        out.write_i64::<LittleEndian>(index_offset).unwrap();
        out.write_i64::<LittleEndian>(index_size).unwrap();
        out.extend_from_slice(&[0; 20]);

        let mut methods = [0u8; 160];
        methods[..4].copy_from_slice(b"Zlib");
        out.extend_from_slice(&methods);

        out
    }
}
