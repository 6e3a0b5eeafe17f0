use crate::crypto::{align_to_block, looks_like_index, AesKey};
use crate::error::{Error, Result};
use crate::io::{Reader, ReaderExt};
use crate::pak::{PakEntry, PakFile, PakFilter, PakVersion};
use byteorder::{LittleEndian, ReadBytesExt};
use std::collections::BTreeMap;
use std::io::{Read, Seek};
use tracing::{debug, info, instrument, warn};

/// Location of a secondary index blob.
#[derive(Debug, Clone, Copy)]
struct SecondaryIndex {
    offset: i64,
    size: i64,
    hash: [u8; 20],
}

impl SecondaryIndex {
    fn read(reader: &mut Reader) -> Result<Option<Self>> {
        if reader.read_i32::<LittleEndian>()? == 0 {
            return Ok(None);
        }

        let offset = reader.read_i64::<LittleEndian>()?;
        let size = reader.read_i64::<LittleEndian>()?;
        let hash = reader.read_hash()?;

        if offset == -1 {
            return Ok(None);
        }

        Ok(Some(SecondaryIndex { offset, size, hash }))
    }
}

/// Directory path to (file name, encoded entry location).
type DirectoryIndex = Vec<(String, Vec<(String, i32)>)>;

fn read_directory_index(reader: &mut Reader) -> Result<DirectoryIndex> {
    reader.read_array(|r| {
        let directory = r.read_fstring()?;
        let files = r.read_array(|r| {
            let name = r.read_fstring()?;
            let location = r.read_i32::<LittleEndian>()?;

            Ok((name, location))
        })?;

        Ok((directory, files))
    })
}

fn read_entry_count(reader: &mut Reader, offset: i64, size: i64) -> Result<usize> {
    let count = reader.read_i32::<LittleEndian>()?;

    usize::try_from(count)
        .map_err(|_| Error::corrupt_index(format!("negative entry count {}", count), offset, size))
}

/// Strips the `../../..` prefix every cooked archive carries. Anything that
/// does not then look like an absolute path becomes `/`.
pub(crate) fn normalize_mount_point(raw: &str, case_sensitive: bool) -> String {
    let mount_point = match raw.strip_prefix("../../..") {
        Some(rest) if rest.starts_with('/') && !rest[1..].starts_with('.') => rest.to_owned(),
        _ => {
            warn!(mount_point = raw, "unexpected mount point, using /");
            "/".to_owned()
        }
    };

    if case_sensitive {
        mount_point
    } else {
        mount_point.to_lowercase()
    }
}

impl<R: Read + Seek> PakFile<R> {
    /// Builds the entry map. Can only succeed once per archive.
    ///
    /// `key` is required when the index is encrypted; a key that does not
    /// yield a plausible mount point is rejected with [`Error::BadKey`].
    #[instrument(skip_all, fields(version = self.info.version.to_raw()))]
    pub fn read_index(&mut self, key: Option<&AesKey>, filter: Option<&PakFilter>) -> Result<()> {
        if self.entries.is_some() {
            return Err(Error::IndexAlreadyRead);
        }

        if self.info.encrypted_index && key.is_none() {
            return Err(Error::MissingKey);
        }

        let index = self.read_index_data(self.info.index_offset, self.info.index_size, key)?;

        if self.info.encrypted_index && !looks_like_index(&index) {
            return Err(Error::BadKey);
        }

        let mut reader = Reader::new(index);
        let filter = filter.cloned().unwrap_or_default();

        let entries = if self.info.version >= PakVersion::PathHashIndex {
            self.read_path_hash_index(&mut reader, key, &filter)?
        } else {
            self.read_legacy_index(&mut reader, &filter)?
        };

        info!(
            entries = entries.len(),
            mount_point = %self.mount_point,
            "pak index ready"
        );

        self.entries = Some(entries);
        self.key = key.cloned();

        Ok(())
    }

    /// Reads (and decrypts, if the archive encrypts its index) one index blob.
    fn read_index_data(&self, offset: i64, size: i64, key: Option<&AesKey>) -> Result<Vec<u8>> {
        let in_bounds = offset >= 0
            && size >= 0
            && offset
                .checked_add(size)
                .is_some_and(|end| end as u64 <= self.length);

        if !in_bounds {
            return Err(Error::corrupt_index("index lies outside the archive", offset, size));
        }

        if !self.info.encrypted_index {
            return self.read_at(offset as u64, size as u64);
        }

        let key = key.ok_or(Error::MissingKey)?;
        let mut data = self.read_at(offset as u64, align_to_block(size as u64))?;

        key.decrypt_in_place(&mut data)?;
        data.truncate(size as usize);

        Ok(data)
    }

    fn key_for(&self, path: String) -> String {
        if self.options.case_sensitive {
            path
        } else {
            path.to_lowercase()
        }
    }

    fn read_legacy_index(
        &mut self,
        reader: &mut Reader,
        filter: &PakFilter,
    ) -> Result<BTreeMap<String, PakEntry>> {
        let mount_point = reader.read_fstring()?;
        self.mount_point = normalize_mount_point(&mount_point, self.options.case_sensitive);

        let count = read_entry_count(reader, self.info.index_offset, self.info.index_size)?;
        let mut entries = BTreeMap::new();

        debug!(count, "reading legacy index");

        for _ in 0..count {
            let path = self.key_for(reader.read_fstring()?);
            let entry = PakEntry::read(reader, self.info.version)?;

            if filter.matches(&format!("{}{}", self.mount_point, path), self.options.case_sensitive) {
                entries.insert(path, entry);
            }
        }

        Ok(entries)
    }

    fn read_path_hash_index(
        &mut self,
        reader: &mut Reader,
        key: Option<&AesKey>,
        filter: &PakFilter,
    ) -> Result<BTreeMap<String, PakEntry>> {
        let (index_offset, index_size) = (self.info.index_offset, self.info.index_size);

        let mount_point = reader.read_fstring()?;
        self.mount_point = normalize_mount_point(&mount_point, self.options.case_sensitive);

        let count = read_entry_count(reader, index_offset, index_size)?;
        let path_hash_seed = reader.read_u64::<LittleEndian>()?;

        let path_hash = SecondaryIndex::read(reader)?;
        let full_directory = SecondaryIndex::read(reader)?;

        let encoded_len = read_entry_count(reader, index_offset, index_size)?;

        if encoded_len as u64 > reader.len().saturating_sub(reader.position()) {
            return Err(Error::corrupt_index(
                format!("{} bytes of encoded entries run past the index", encoded_len),
                index_offset,
                index_size,
            ));
        }

        let encoded = reader.read_bytes(encoded_len)?;

        let files = read_entry_count(reader, index_offset, index_size)?;

        for _ in 0..files {
            PakEntry::read(reader, self.info.version)?;
        }

        debug!(
            count,
            path_hash_seed,
            encoded_len,
            unencoded = files,
            "read primary index"
        );

        let directory = match (path_hash, full_directory) {
            (_, Some(index)) => {
                debug!(hash = %hex::encode(index.hash), "using full directory index");

                let data = self.read_index_data(index.offset, index.size, key)?;

                read_directory_index(&mut Reader::new(data))?
            }
            (Some(index), None) => {
                debug!(hash = %hex::encode(index.hash), "using path hash index");

                let mut secondary = Reader::new(self.read_index_data(index.offset, index.size, key)?);
                let hashes = secondary.read_array(|r| {
                    let hash = r.read_u64::<LittleEndian>()?;
                    let location = r.read_i32::<LittleEndian>()?;

                    Ok((hash, location))
                })?;

                debug!(hashes = hashes.len(), "skipped path hashes");

                read_directory_index(&mut secondary)?
            }
            (None, None) => {
                return Err(Error::corrupt_index(
                    "no secondary index present",
                    index_offset,
                    index_size,
                ))
            }
        };

        let mut entries = BTreeMap::new();

        for (directory, files) in directory {
            for (name, location) in files {
                let joined = format!("{}{}", directory, name);
                let path = self.key_for(joined.trim_start_matches('/').to_owned());

                if !filter.matches(&format!("{}{}", self.mount_point, path), self.options.case_sensitive) {
                    continue;
                }

                let entry = PakEntry::read_encoded(&encoded, location)?;

                entries.insert(path, entry);
            }
        }

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_relative_prefix() {
        assert_eq!(normalize_mount_point("../../../Game/", true), "/Game/");
        assert_eq!(normalize_mount_point("../../../Game/", false), "/game/");
    }

    #[test]
    fn odd_mount_points_become_root() {
        assert_eq!(normalize_mount_point("Game/", true), "/");
        assert_eq!(normalize_mount_point("../../../../x/", true), "/");
        assert_eq!(normalize_mount_point("../../..Game", true), "/");
    }

    #[test]
    fn filter_matches_prefixes() {
        let filter = PakFilter::new(["/Game/Maps/"]);

        assert!(filter.matches("/Game/Maps/Arena.umap", true));
        assert!(!filter.matches("/game/maps/arena.umap", true));
        assert!(filter.matches("/game/maps/arena.umap", false));
        assert!(PakFilter::default().matches("anything", true));
    }
}
