mod index;
mod reader;

use crate::crypto::{self, align_to_block, AesKey};
use crate::error::{Error, Result};
use crate::io::Reader;
use crate::structs::{serialize_hex, FGuid};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

pub const PAK_MAGIC: u32 = 0x5A6F12E1;

/// The footer occupies the last bytes of every archive.
pub const PAK_FOOTER_SIZE: u64 = 221;

pub const COMPRESSION_METHOD_NAME_LEN: usize = 32;
pub const MAX_COMPRESSION_METHODS: usize = 5;

pub const ENTRY_FLAG_ENCRYPTED: u8 = 0x01;
pub const ENTRY_FLAG_DELETED: u8 = 0x02;

/// Index prefix read when probing keys: long enough for the largest
/// mount-point string the heuristic accepts.
const KEY_PROBE_LEN: u64 = 1040;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PakVersion {
    Initial,
    NoTimestamps,
    CompressionEncryption,
    IndexEncryption,
    RelativeChunkOffsets,
    DeleteRecords,
    EncryptionKeyGuid,
    FNameBasedCompressionMethod,
    FrozenIndex,
    PathHashIndex,
    Fnv64BugFix,
    Unknown(u32),
}

impl PakVersion {
    pub const LATEST: PakVersion = PakVersion::Fnv64BugFix;

    pub fn from_raw(value: u32) -> Self {
        match value {
            1 => PakVersion::Initial,
            2 => PakVersion::NoTimestamps,
            3 => PakVersion::CompressionEncryption,
            4 => PakVersion::IndexEncryption,
            5 => PakVersion::RelativeChunkOffsets,
            6 => PakVersion::DeleteRecords,
            7 => PakVersion::EncryptionKeyGuid,
            8 => PakVersion::FNameBasedCompressionMethod,
            9 => PakVersion::FrozenIndex,
            10 => PakVersion::PathHashIndex,
            11 => PakVersion::Fnv64BugFix,
            other => PakVersion::Unknown(other),
        }
    }

    pub fn to_raw(self) -> u32 {
        match self {
            PakVersion::Initial => 1,
            PakVersion::NoTimestamps => 2,
            PakVersion::CompressionEncryption => 3,
            PakVersion::IndexEncryption => 4,
            PakVersion::RelativeChunkOffsets => 5,
            PakVersion::DeleteRecords => 6,
            PakVersion::EncryptionKeyGuid => 7,
            PakVersion::FNameBasedCompressionMethod => 8,
            PakVersion::FrozenIndex => 9,
            PakVersion::PathHashIndex => 10,
            PakVersion::Fnv64BugFix => 11,
            PakVersion::Unknown(other) => other,
        }
    }

    pub fn is_known(self) -> bool {
        !matches!(self, PakVersion::Unknown(_))
    }
}

impl PartialOrd for PakVersion {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PakVersion {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.to_raw().cmp(&other.to_raw())
    }
}

impl Serialize for PakVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.to_raw())
    }
}

/// The archive footer.
#[derive(Debug, Clone, Serialize)]
pub struct PakInfo {
    pub encryption_key_guid: FGuid,
    pub encrypted_index: bool,
    pub version: PakVersion,
    pub index_offset: i64,
    pub index_size: i64,
    #[serde(serialize_with = "serialize_hex")]
    pub index_hash: [u8; 20],
    pub compression_methods: Vec<String>,
}

/// Byte range of one compression chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CompressedBlock {
    pub start: i64,
    pub end: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PakEntry {
    pub offset: i64,
    pub size: i64,
    pub uncompressed_size: i64,
    #[serde(serialize_with = "serialize_hex")]
    pub hash: [u8; 20],
    /// Zero for stored entries, otherwise one past the index into
    /// [`PakInfo::compression_methods`].
    pub compression_method: u32,
    pub compression_blocks: Vec<CompressedBlock>,
    pub compression_block_size: u32,
    pub flags: u8,
    /// Length of the entry header that precedes the payload in the stream.
    pub struct_size: u64,
}

impl PakEntry {
    pub fn is_encrypted(&self) -> bool {
        self.flags & ENTRY_FLAG_ENCRYPTED != 0
    }

    pub fn is_deleted(&self) -> bool {
        self.flags & ENTRY_FLAG_DELETED != 0
    }

    pub fn is_compressed(&self) -> bool {
        self.compression_method != 0
    }
}

/// Path prefixes an index is restricted to, matched against the mount point
/// joined with the entry path. An empty filter accepts everything.
#[derive(Debug, Clone, Default)]
pub struct PakFilter {
    prefixes: Vec<String>,
}

impl PakFilter {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn matches(&self, path: &str, case_sensitive: bool) -> bool {
        if self.prefixes.is_empty() {
            return true;
        }

        if case_sensitive {
            self.prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
        } else {
            let path = path.to_lowercase();

            self.prefixes
                .iter()
                .any(|prefix| path.starts_with(&prefix.to_lowercase()))
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PakOptions {
    /// When false, index keys, the mount point and lookups are lowercased.
    pub case_sensitive: bool,
}

impl Default for PakOptions {
    fn default() -> Self {
        Self {
            case_sensitive: true,
        }
    }
}

/// One archive: its footer, and once [`PakFile::read_index`] succeeded, its
/// entries.
///
/// Entry payloads are read through a shared stream; every read holds the lock
/// for one seek and one read.
pub struct PakFile<R> {
    stream: Mutex<R>,
    length: u64,
    options: PakOptions,
    info: PakInfo,
    mount_point: String,
    entries: Option<BTreeMap<String, PakEntry>>,
    key: Option<AesKey>,
}

impl PakFile<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, PakOptions::default())
    }

    pub fn open_with<P: AsRef<Path>>(path: P, options: PakOptions) -> Result<Self> {
        let file = File::open(path)?;

        PakFile::new(BufReader::new(file), options)
    }
}

impl<R: Read + Seek> PakFile<R> {
    /// Reads the footer. The index is left for [`PakFile::read_index`].
    pub fn new(mut stream: R, options: PakOptions) -> Result<Self> {
        let length = stream.seek(SeekFrom::End(0))?;

        if length < PAK_FOOTER_SIZE {
            return Err(Error::format(format!(
                "{} bytes is too short for a pak footer",
                length
            )));
        }

        stream.seek(SeekFrom::Start(length - PAK_FOOTER_SIZE))?;

        let mut footer = vec![0; PAK_FOOTER_SIZE as usize];
        stream.read_exact(&mut footer)?;

        let info = PakInfo::read(&mut Reader::new(footer))?;

        if !info.version.is_known() {
            warn!(
                version = info.version.to_raw(),
                "pak version is newer than any known version, reading anyway"
            );
        }

        debug!(
            version = info.version.to_raw(),
            encrypted_index = info.encrypted_index,
            index_offset = info.index_offset,
            index_size = info.index_size,
            "read pak footer"
        );

        Ok(PakFile {
            stream: Mutex::new(stream),
            length,
            options,
            info,
            mount_point: String::new(),
            entries: None,
            key: None,
        })
    }

    pub fn info(&self) -> &PakInfo {
        &self.info
    }

    pub fn options(&self) -> PakOptions {
        self.options
    }

    /// Stream length in bytes.
    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Mount point after normalization; empty until the index has been read.
    pub fn mount_point(&self) -> &str {
        &self.mount_point
    }

    pub fn is_ready(&self) -> bool {
        self.entries.is_some()
    }

    /// Entries keyed by path relative to the mount point.
    pub fn entries(&self) -> Result<&BTreeMap<String, PakEntry>> {
        self.entries.as_ref().ok_or(Error::IndexNotRead)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PakEntry)> {
        self.entries
            .iter()
            .flat_map(|entries| entries.iter())
            .map(|(path, entry)| (path.as_str(), entry))
    }

    fn lookup_key(&self, path: &str) -> String {
        if self.options.case_sensitive {
            path.to_owned()
        } else {
            path.to_lowercase()
        }
    }

    /// Looks up an entry by its path without the mount point.
    pub fn get_entry(&self, path: &str) -> Result<&PakEntry> {
        self.entries()?
            .get(&self.lookup_key(path))
            .ok_or_else(|| Error::EntryNotFound(path.to_owned()))
    }

    /// Reads an entry's payload by path, decrypting with the key the index
    /// was read with.
    pub fn get_file(&self, path: &str) -> Result<Vec<u8>> {
        let entry = self.get_entry(path)?;

        self.get_bytes(entry, None)
    }

    /// Name of the compression method an entry uses, if any.
    pub fn compression_method_name(&self, entry: &PakEntry) -> Option<&str> {
        let index = entry.compression_method.checked_sub(1)? as usize;

        self.info.compression_methods.get(index).map(String::as_str)
    }

    /// Reads an entry's payload, skipping its in-stream header and decrypting
    /// if needed. `key` falls back to the key the index was read with.
    ///
    /// Compressed entries are refused; use [`PakFile::get_raw`] for those.
    pub fn get_bytes(&self, entry: &PakEntry, key: Option<&AesKey>) -> Result<Vec<u8>> {
        if entry.is_compressed() {
            let method = self
                .compression_method_name(entry)
                .unwrap_or("unknown method");

            return Err(Error::unsupported(format!(
                "decompressing {} entries",
                method
            )));
        }

        self.read_payload(entry, key, entry.uncompressed_size)
    }

    /// Reads the stored bytes of an entry, decrypted but still compressed,
    /// together with the block table describing them.
    ///
    /// Block offsets are as stored in the archive and are not rebased onto
    /// the returned buffer.
    pub fn get_raw<'a>(
        &self,
        entry: &'a PakEntry,
        key: Option<&AesKey>,
    ) -> Result<(Vec<u8>, &'a [CompressedBlock])> {
        let data = self.read_payload(entry, key, entry.size)?;

        Ok((data, &entry.compression_blocks))
    }

    fn read_payload(&self, entry: &PakEntry, key: Option<&AesKey>, keep: i64) -> Result<Vec<u8>> {
        let start = entry
            .offset
            .checked_add(entry.struct_size as i64)
            .and_then(|start| u64::try_from(start).ok())
            .ok_or_else(|| Error::format(format!("bad entry offset {}", entry.offset)))?;

        let len = u64::try_from(keep)
            .map_err(|_| Error::format(format!("bad entry size {}", keep)))?;

        if !entry.is_encrypted() {
            return self.read_at(start, len);
        }

        let key = key.or(self.key.as_ref()).ok_or(Error::MissingKey)?;
        let padded = u64::try_from(entry.size)
            .map_err(|_| Error::format(format!("bad entry size {}", entry.size)))?;

        let mut data = self.read_at(start, align_to_block(padded))?;

        key.decrypt_in_place(&mut data)?;
        data.truncate(len as usize);

        Ok(data)
    }

    /// Tries each key against the encrypted index and returns the position of
    /// the first that decrypts it plausibly. `None` for unencrypted indexes.
    pub fn find_key(&self, keys: &[AesKey]) -> Result<Option<usize>> {
        if !self.info.encrypted_index {
            debug!("index is not encrypted, no key to find");
            return Ok(None);
        }

        let offset = u64::try_from(self.info.index_offset).map_err(|_| {
            Error::corrupt_index("negative index offset", self.info.index_offset, self.info.index_size)
        })?;

        let available = align_to_block(self.info.index_size.max(0) as u64);
        let prefix = self.read_at(offset, available.min(KEY_PROBE_LEN))?;

        Ok(crypto::discover_key(&prefix, keys))
    }

    /// Seeks and reads as one step under the stream lock.
    fn read_at(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        if offset.checked_add(len).map_or(true, |end| end > self.length) {
            return Err(Error::format(format!(
                "read of {} bytes at {} runs past the end of the archive",
                len, offset
            )));
        }

        let mut data = vec![0; len as usize];
        let mut stream = self.stream.lock().unwrap_or_else(PoisonError::into_inner);

        stream.seek(SeekFrom::Start(offset))?;
        stream.read_exact(&mut data)?;

        Ok(data)
    }
}
