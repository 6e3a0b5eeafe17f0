mod reader;

use crate::error::{Error, Result};
use crate::properties::PropertyBag;
use crate::structs::{serialize_len, FGuid, FName};
use serde::Serialize;

pub const PACKAGE_FILE_TAG: u32 = 0x9E2A83C1;
pub const PACKAGE_FILE_TAG_SWAPPED: u32 = 0xC1832A9E;

/// Oldest and newest supported `legacy_version` values.
pub const LEGACY_VERSION_RANGE: std::ops::RangeInclusive<i32> = -7..=-1;

pub const BULKDATA_FORCE_INLINE_PAYLOAD: u32 = 0x0040;
pub const BULKDATA_PAYLOAD_IN_SEPARATE_FILE: u32 = 0x0100;
pub const BULKDATA_SIZE_64BIT: u32 = 0x2000;

/// The pooled strings of one package.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct NameMap {
    names: Vec<String>,
}

impl NameMap {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn get(&self, index: i32) -> Result<&str> {
        usize::try_from(index)
            .ok()
            .and_then(|index| self.names.get(index))
            .map(String::as_str)
            .ok_or(Error::BadNameIndex {
                index,
                count: self.names.len(),
            })
    }

    pub fn resolve(&self, name: NameRef) -> Result<FName> {
        let value = self.get(name.index)?.to_owned();
        let number = u32::try_from(name.number).ok().filter(|&n| n != 0);

        Ok(FName { value, number })
    }
}

/// A name as stored on disk, resolved only when asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NameRef {
    pub index: i32,
    pub number: i32,
}

/// Signed reference into a package's import or export table.
///
/// Zero is null, positive values are `export + 1` and negative values are
/// `-(import + 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PackageIndex {
    Null,
    Import(usize),
    Export(usize),
}

impl PackageIndex {
    pub fn from_raw(index: i32) -> Self {
        match index {
            0 => PackageIndex::Null,
            i if i > 0 => PackageIndex::Export((i - 1) as usize),
            i => PackageIndex::Import((-(i + 1)) as usize),
        }
    }

    pub fn to_raw(self) -> i32 {
        match self {
            PackageIndex::Null => 0,
            PackageIndex::Export(i) => i as i32 + 1,
            PackageIndex::Import(i) => -(i as i32) - 1,
        }
    }

    pub fn is_null(self) -> bool {
        self == PackageIndex::Null
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FCustomVersion {
    pub key: FGuid,
    pub version: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct FGenerationInfo {
    pub export_count: i32,
    pub name_count: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct FEngineVersion {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
    pub changelist: u32,
    pub branch: String,
}

/// The `.uasset` header.
#[derive(Debug, Clone, Serialize)]
pub struct PackageSummary {
    pub tag: u32,
    pub legacy_version: i32,
    pub legacy_ue3_version: Option<i32>,
    pub file_version_ue4: i32,
    pub file_version_licensee: i32,
    pub custom_versions: Vec<FCustomVersion>,
    pub unversioned: bool,
    pub total_header_size: i32,
    pub folder_name: String,
    pub package_flags: u32,
    pub name_count: i32,
    pub name_offset: i32,
    pub gatherable_text_data_count: i32,
    pub gatherable_text_data_offset: i32,
    pub export_count: i32,
    pub export_offset: i32,
    pub import_count: i32,
    pub import_offset: i32,
    pub depends_offset: i32,
    pub soft_package_references_count: i32,
    pub soft_package_references_offset: i32,
    pub searchable_names_offset: i32,
    pub thumbnail_table_offset: i32,
    pub guid: FGuid,
    pub generations: Vec<FGenerationInfo>,
    pub saved_by_engine_version: FEngineVersion,
    pub compatible_with_engine_version: FEngineVersion,
    pub compression_flags: u32,
    pub package_source: u32,
    pub additional_packages_to_cook: Vec<String>,
    pub asset_registry_data_offset: i32,
    pub bulk_data_start_offset: i64,
    pub world_tile_info_data_offset: i32,
    pub chunk_ids: Vec<i32>,
    pub preload_dependency_count: i32,
    pub preload_dependency_offset: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ObjectImport {
    pub class_package: NameRef,
    pub class_name: NameRef,
    pub outer_index: PackageIndex,
    pub object_name: NameRef,
}

#[derive(Debug, Clone, Serialize)]
pub struct ObjectExport {
    pub class_index: PackageIndex,
    pub super_index: PackageIndex,
    pub template_index: PackageIndex,
    pub outer_index: PackageIndex,
    pub object_name: NameRef,
    pub object_flags: u32,
    pub serial_size: i64,
    pub serial_offset: i64,
    pub forced_export: bool,
    pub not_for_client: bool,
    pub not_for_server: bool,
    pub package_guid: FGuid,
    pub package_flags: u32,
    pub not_always_loaded_for_editor_game: bool,
    pub is_asset: bool,
    pub first_export_dependency: i32,
    pub serialization_before_serialization_dependencies: i32,
    pub create_before_serialization_dependencies: i32,
    pub serialization_before_create_dependencies: i32,
    pub create_before_create_dependencies: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ByteBulkData {
    pub flags: u32,
    pub element_count: i64,
    pub size_on_disk: i64,
    pub offset_in_file: i64,
    #[serde(serialize_with = "serialize_len")]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Texture2DMipMap {
    pub size_x: i32,
    pub size_y: i32,
    pub size_z: i32,
    pub bulk_data: ByteBulkData,
}

#[derive(Debug, Clone, Serialize)]
pub struct TexturePlatformData {
    pub size_x: i32,
    pub size_y: i32,
    pub num_slices: i32,
    pub pixel_format: String,
    pub first_mip: i32,
    pub mips: Vec<Texture2DMipMap>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Texture2D {
    pub cooked: bool,
    pub platform_data: Vec<TexturePlatformData>,
}

/// What a pixel decoder needs from a texture export: the first mip of the
/// first platform.
#[derive(Debug, Clone, Copy)]
pub struct TextureSource<'a> {
    pub pixel_format: &'a str,
    pub width: i32,
    pub height: i32,
    pub depth: i32,
    pub data: &'a [u8],
}

/// One decoded export.
#[derive(Debug, Serialize)]
pub struct ObjectRecord {
    pub export_index: usize,
    pub object_name: FName,
    pub class_name: FName,
    pub properties: PropertyBag,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guid: Option<FGuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub texture: Option<Texture2D>,
}

impl ObjectRecord {
    pub fn texture_source(&self) -> Option<TextureSource<'_>> {
        let platform = self.texture.as_ref()?.platform_data.first()?;
        let mip = platform.mips.first()?;

        Some(TextureSource {
            pixel_format: &platform.pixel_format,
            width: mip.size_x,
            height: mip.size_y,
            depth: mip.size_z,
            data: &mip.bulk_data.data,
        })
    }
}

/// An export that could not be decoded; the rest of the package still was.
#[derive(Debug, Clone, Serialize)]
pub struct ExportFailure {
    pub export_index: usize,
    pub object_name: String,
    pub message: String,
}

/// A parsed package: header tables plus every export that decoded.
#[derive(Debug, Serialize)]
pub struct Package {
    pub summary: PackageSummary,
    pub names: NameMap,
    pub imports: Vec<ObjectImport>,
    pub exports: Vec<ObjectExport>,
    pub objects: Vec<ObjectRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ExportFailure>,
}

impl Package {
    pub fn resolve_name(&self, name: NameRef) -> Result<FName> {
        self.names.resolve(name)
    }

    pub fn import(&self, index: PackageIndex) -> Result<&ObjectImport> {
        match index {
            PackageIndex::Import(i) => self.imports.get(i).ok_or(Error::BadPackageIndex {
                index: index.to_raw(),
                reason: "import out of range",
            }),
            _ => Err(Error::BadPackageIndex {
                index: index.to_raw(),
                reason: "not an import",
            }),
        }
    }

    pub fn export(&self, index: PackageIndex) -> Result<&ObjectExport> {
        match index {
            PackageIndex::Export(i) => self.exports.get(i).ok_or(Error::BadPackageIndex {
                index: index.to_raw(),
                reason: "export out of range",
            }),
            _ => Err(Error::BadPackageIndex {
                index: index.to_raw(),
                reason: "not an export",
            }),
        }
    }

    /// Name of the object an index points at, or `None` for the null index.
    pub fn object_name(&self, index: PackageIndex) -> Result<Option<FName>> {
        let name = match index {
            PackageIndex::Null => return Ok(None),
            PackageIndex::Import(_) => self.import(index)?.object_name,
            PackageIndex::Export(_) => self.export(index)?.object_name,
        };

        Ok(Some(self.resolve_name(name)?))
    }

    /// Offset of `.ubulk` payloads: the header size plus every export's
    /// serialized size.
    pub fn bulk_data_base(&self) -> Result<i64> {
        self.exports
            .iter()
            .try_fold(self.summary.total_header_size as i64, |base, export| {
                base.checked_add(export.serial_size)
            })
            .ok_or_else(|| Error::format("export sizes overflow the bulk data offset"))
    }
}
