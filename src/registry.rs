//! One namespace over many archives.
//!
//! Every entry path is split into a lowercased stem and an extension. A stem
//! collects the `.uasset`, `.uexp`, `.ubulk` and `.ini` entries contributed by
//! any of the registered archives; an archive added later fills or replaces
//! individual slots without dropping the others.

use crate::asset::Package;
use crate::error::{Error, Result};
use crate::pak::PakFile;
use crate::properties::ParseOptions;
use std::collections::HashMap;
use std::io::{Read, Seek};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, trace};

const SLOT_EXTENSIONS: [&str; 4] = ["uasset", "uexp", "ubulk", "ini"];

/// An entry inside one registered archive.
pub struct PackageSlot<R> {
    pub archive: Arc<PakFile<R>>,
    /// Path relative to the archive's mount point.
    pub path: String,
}

impl<R> Clone for PackageSlot<R> {
    fn clone(&self) -> Self {
        Self {
            archive: Arc::clone(&self.archive),
            path: self.path.clone(),
        }
    }
}

impl<R: Read + Seek> PackageSlot<R> {
    pub fn read(&self) -> Result<Vec<u8>> {
        let entry = self.archive.get_entry(&self.path)?;

        self.archive.get_bytes(entry, None)
    }
}

pub struct PakPackage<R> {
    pub uasset: Option<PackageSlot<R>>,
    pub uexp: Option<PackageSlot<R>>,
    pub ubulk: Option<PackageSlot<R>>,
    pub ini: Option<PackageSlot<R>>,
}

impl<R> Default for PakPackage<R> {
    fn default() -> Self {
        Self {
            uasset: None,
            uexp: None,
            ubulk: None,
            ini: None,
        }
    }
}

impl<R> Clone for PakPackage<R> {
    fn clone(&self) -> Self {
        Self {
            uasset: self.uasset.clone(),
            uexp: self.uexp.clone(),
            ubulk: self.ubulk.clone(),
            ini: self.ini.clone(),
        }
    }
}

impl<R> PakPackage<R> {
    fn slot_mut(&mut self, extension: &str) -> Option<&mut Option<PackageSlot<R>>> {
        match extension {
            "uasset" => Some(&mut self.uasset),
            "uexp" => Some(&mut self.uexp),
            "ubulk" => Some(&mut self.ubulk),
            "ini" => Some(&mut self.ini),
            _ => None,
        }
    }
}

/// The buffers a package is parsed from.
#[derive(Debug, Clone)]
pub struct PackageBytes {
    pub uasset: Vec<u8>,
    pub uexp: Vec<u8>,
    pub ubulk: Option<Vec<u8>>,
}

/// Splits `Game/Maps/Arena.uasset` into `("game/maps/arena", "uasset")`.
/// Leading slashes are dropped.
pub fn split_package_path(path: &str) -> (String, String) {
    let path = path.trim_start_matches('/');
    let name_start = path.rfind('/').map_or(0, |i| i + 1);

    match path[name_start..].rfind('.') {
        Some(dot) => {
            let (stem, extension) = path.split_at(name_start + dot);

            (stem.to_lowercase(), extension[1..].to_lowercase())
        }
        None => (path.to_lowercase(), String::new()),
    }
}

pub struct PakRegistry<R> {
    packages: RwLock<HashMap<String, PakPackage<R>>>,
}

impl<R> Default for PakRegistry<R> {
    fn default() -> Self {
        Self {
            packages: RwLock::new(HashMap::new()),
        }
    }
}

impl<R: Read + Seek> PakRegistry<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every entry of an archive whose index has been read.
    /// Returns the number of slots filled.
    pub fn add(&self, archive: PakFile<R>) -> Result<usize> {
        let archive = Arc::new(archive);
        let mount_point = archive.mount_point().to_owned();
        let mut added = 0;
        let mut skipped = 0;

        let mut packages = self.packages.write().unwrap_or_else(PoisonError::into_inner);

        for (path, _) in archive.entries()? {
            let (stem, extension) = split_package_path(&format!("{}{}", mount_point, path));

            if !SLOT_EXTENSIONS.contains(&extension.as_str()) {
                skipped += 1;
                continue;
            }

            let package = packages.entry(stem).or_default();

            if let Some(slot) = package.slot_mut(&extension) {
                if slot.is_some() {
                    trace!(path = %path, "replacing slot from an earlier archive");
                }

                *slot = Some(PackageSlot {
                    archive: Arc::clone(&archive),
                    path: path.clone(),
                });
                added += 1;
            }
        }

        debug!(
            mount_point = %mount_point,
            added,
            skipped,
            packages = packages.len(),
            "registered archive"
        );

        Ok(added)
    }

    pub fn len(&self) -> usize {
        self.packages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every known stem, sorted.
    pub fn stems(&self) -> Vec<String> {
        let packages = self.packages.read().unwrap_or_else(PoisonError::into_inner);
        let mut stems: Vec<String> = packages.keys().cloned().collect();

        stems.sort();
        stems
    }

    /// Looks up a package by path with or without extension.
    pub fn get(&self, path: &str) -> Option<PakPackage<R>> {
        let (stem, _) = split_package_path(path);

        self.packages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&stem)
            .cloned()
    }

    /// Reads the buffers of a package. `.uasset` and `.uexp` are required.
    pub fn package_bytes(&self, path: &str) -> Result<PackageBytes> {
        let package = self
            .get(path)
            .ok_or_else(|| Error::EntryNotFound(path.to_owned()))?;

        let uasset = package
            .uasset
            .ok_or_else(|| Error::EntryNotFound(format!("{}.uasset", path)))?
            .read()?;

        let uexp = package
            .uexp
            .ok_or_else(|| Error::EntryNotFound(format!("{}.uexp", path)))?
            .read()?;

        let ubulk = package.ubulk.map(|slot| slot.read()).transpose()?;

        Ok(PackageBytes {
            uasset,
            uexp,
            ubulk,
        })
    }

    pub fn parse_package(&self, path: &str, options: &ParseOptions) -> Result<Package> {
        let bytes = self.package_bytes(path)?;

        Package::parse(&bytes.uasset, &bytes.uexp, bytes.ubulk.as_deref(), options)
    }
}
