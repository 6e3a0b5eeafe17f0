use crate::asset::{
    ByteBulkData, ExportFailure, FCustomVersion, FEngineVersion, FGenerationInfo, NameMap,
    NameRef, ObjectExport, ObjectImport, ObjectRecord, Package, PackageIndex, PackageSummary,
    Texture2D, Texture2DMipMap, TexturePlatformData, BULKDATA_FORCE_INLINE_PAYLOAD,
    BULKDATA_PAYLOAD_IN_SEPARATE_FILE, BULKDATA_SIZE_64BIT, LEGACY_VERSION_RANGE,
    PACKAGE_FILE_TAG, PACKAGE_FILE_TAG_SWAPPED,
};
use crate::error::{Error, Result};
use crate::io::{Reader, ReaderExt};
use crate::properties::{ParseOptions, PropertyBag, PropertyContext};
use crate::structs::{FGuid, FName};
use byteorder::{LittleEndian, ReadBytesExt};
use tracing::{debug, instrument, warn};

impl NameMap {
    /// Reads an on-disk name (index + number) and resolves it immediately.
    pub fn read_name(&self, reader: &mut Reader) -> Result<FName> {
        let name = NameRef::read(reader)?;

        self.resolve(name)
    }
}

impl NameRef {
    pub fn read(reader: &mut Reader) -> Result<Self> {
        let index = reader.read_i32::<LittleEndian>()?;
        let number = reader.read_i32::<LittleEndian>()?;

        Ok(NameRef { index, number })
    }
}

impl PackageIndex {
    pub fn read(reader: &mut Reader) -> Result<Self> {
        Ok(PackageIndex::from_raw(reader.read_i32::<LittleEndian>()?))
    }
}

impl FCustomVersion {
    pub fn read(reader: &mut Reader) -> Result<Self> {
        let key = FGuid::read(reader)?;
        let version = reader.read_i32::<LittleEndian>()?;

        Ok(FCustomVersion { key, version })
    }
}

impl FGenerationInfo {
    pub fn read(reader: &mut Reader) -> Result<Self> {
        let export_count = reader.read_i32::<LittleEndian>()?;
        let name_count = reader.read_i32::<LittleEndian>()?;

        Ok(FGenerationInfo {
            export_count,
            name_count,
        })
    }
}

impl FEngineVersion {
    pub fn read(reader: &mut Reader) -> Result<Self> {
        let major = reader.read_u16::<LittleEndian>()?;
        let minor = reader.read_u16::<LittleEndian>()?;
        let patch = reader.read_u16::<LittleEndian>()?;
        let changelist = reader.read_u32::<LittleEndian>()?;
        let branch = reader.read_fstring()?;

        Ok(FEngineVersion {
            major,
            minor,
            patch,
            changelist,
            branch,
        })
    }
}

impl PackageSummary {
    pub fn read(reader: &mut Reader) -> Result<Self> {
        let tag = reader.read_u32::<LittleEndian>()?;

        match tag {
            PACKAGE_FILE_TAG => {}
            PACKAGE_FILE_TAG_SWAPPED => {
                return Err(Error::unsupported("byte-swapped packages"));
            }
            _ => return Err(Error::format(format!("bad package tag {:#010x}", tag))),
        }

        let legacy_version = reader.read_i32::<LittleEndian>()?;

        if !LEGACY_VERSION_RANGE.contains(&legacy_version) {
            return Err(Error::UnsupportedVersion(format!(
                "legacy package version {}",
                legacy_version
            )));
        }

        let legacy_ue3_version = if legacy_version != -4 {
            Some(reader.read_i32::<LittleEndian>()?)
        } else {
            None
        };

        let file_version_ue4 = reader.read_i32::<LittleEndian>()?;
        let file_version_licensee = reader.read_i32::<LittleEndian>()?;

        let custom_versions = if legacy_version <= -2 {
            reader.read_array(FCustomVersion::read)?
        } else {
            Vec::new()
        };

        let unversioned = file_version_ue4 == 0 && file_version_licensee == 0;

        let total_header_size = reader.read_i32::<LittleEndian>()?;
        let folder_name = reader.read_fstring()?;
        let package_flags = reader.read_u32::<LittleEndian>()?;
        let name_count = reader.read_i32::<LittleEndian>()?;
        let name_offset = reader.read_i32::<LittleEndian>()?;
        let gatherable_text_data_count = reader.read_i32::<LittleEndian>()?;
        let gatherable_text_data_offset = reader.read_i32::<LittleEndian>()?;
        let export_count = reader.read_i32::<LittleEndian>()?;
        let export_offset = reader.read_i32::<LittleEndian>()?;
        let import_count = reader.read_i32::<LittleEndian>()?;
        let import_offset = reader.read_i32::<LittleEndian>()?;
        let depends_offset = reader.read_i32::<LittleEndian>()?;
        let soft_package_references_count = reader.read_i32::<LittleEndian>()?;
        let soft_package_references_offset = reader.read_i32::<LittleEndian>()?;
        let searchable_names_offset = reader.read_i32::<LittleEndian>()?;
        let thumbnail_table_offset = reader.read_i32::<LittleEndian>()?;
        let guid = FGuid::read(reader)?;
        let generations = reader.read_array(FGenerationInfo::read)?;
        let saved_by_engine_version = FEngineVersion::read(reader)?;
        let compatible_with_engine_version = FEngineVersion::read(reader)?;

        let compression_flags = reader.read_u32::<LittleEndian>()?;

        if compression_flags != 0 {
            return Err(Error::unsupported(format!(
                "package-level compression (flags {:#x})",
                compression_flags
            )));
        }

        let compressed_chunks = reader.read_array(|r| {
            let mut chunk = [0i32; 4];
            r.read_i32_into::<LittleEndian>(&mut chunk)?;
            Ok(chunk)
        })?;

        if !compressed_chunks.is_empty() {
            return Err(Error::unsupported("package-level compressed chunks"));
        }

        let package_source = reader.read_u32::<LittleEndian>()?;
        let additional_packages_to_cook = reader.read_array(|r| r.read_fstring())?;

        if legacy_version > -7 {
            let texture_allocations = reader.read_i32::<LittleEndian>()?;

            if texture_allocations != 0 {
                return Err(Error::UnsupportedVersion(
                    "package carries legacy texture allocation info".to_owned(),
                ));
            }
        }

        let asset_registry_data_offset = reader.read_i32::<LittleEndian>()?;
        let bulk_data_start_offset = reader.read_i64::<LittleEndian>()?;
        let world_tile_info_data_offset = reader.read_i32::<LittleEndian>()?;
        let chunk_ids = reader.read_array(|r| Ok(r.read_i32::<LittleEndian>()?))?;
        let preload_dependency_count = reader.read_i32::<LittleEndian>()?;
        let preload_dependency_offset = reader.read_i32::<LittleEndian>()?;

        Ok(PackageSummary {
            tag,
            legacy_version,
            legacy_ue3_version,
            file_version_ue4,
            file_version_licensee,
            custom_versions,
            unversioned,
            total_header_size,
            folder_name,
            package_flags,
            name_count,
            name_offset,
            gatherable_text_data_count,
            gatherable_text_data_offset,
            export_count,
            export_offset,
            import_count,
            import_offset,
            depends_offset,
            soft_package_references_count,
            soft_package_references_offset,
            searchable_names_offset,
            thumbnail_table_offset,
            guid,
            generations,
            saved_by_engine_version,
            compatible_with_engine_version,
            compression_flags,
            package_source,
            additional_packages_to_cook,
            asset_registry_data_offset,
            bulk_data_start_offset,
            world_tile_info_data_offset,
            chunk_ids,
            preload_dependency_count,
            preload_dependency_offset,
        })
    }
}

impl ObjectImport {
    pub fn read(reader: &mut Reader) -> Result<Self> {
        let class_package = NameRef::read(reader)?;
        let class_name = NameRef::read(reader)?;
        let outer_index = PackageIndex::read(reader)?;
        let object_name = NameRef::read(reader)?;

        Ok(ObjectImport {
            class_package,
            class_name,
            outer_index,
            object_name,
        })
    }
}

impl ObjectExport {
    pub fn read(reader: &mut Reader) -> Result<Self> {
        let class_index = PackageIndex::read(reader)?;
        let super_index = PackageIndex::read(reader)?;
        let template_index = PackageIndex::read(reader)?;
        let outer_index = PackageIndex::read(reader)?;
        let object_name = NameRef::read(reader)?;
        let object_flags = reader.read_u32::<LittleEndian>()?;
        let serial_size = reader.read_i64::<LittleEndian>()?;
        let serial_offset = reader.read_i64::<LittleEndian>()?;
        let forced_export = reader.read_bool32()?;
        let not_for_client = reader.read_bool32()?;
        let not_for_server = reader.read_bool32()?;
        let package_guid = FGuid::read(reader)?;
        let package_flags = reader.read_u32::<LittleEndian>()?;
        let not_always_loaded_for_editor_game = reader.read_bool32()?;
        let is_asset = reader.read_bool32()?;
        let first_export_dependency = reader.read_i32::<LittleEndian>()?;
        let serialization_before_serialization_dependencies = reader.read_i32::<LittleEndian>()?;
        let create_before_serialization_dependencies = reader.read_i32::<LittleEndian>()?;
        let serialization_before_create_dependencies = reader.read_i32::<LittleEndian>()?;
        let create_before_create_dependencies = reader.read_i32::<LittleEndian>()?;

        Ok(ObjectExport {
            class_index,
            super_index,
            template_index,
            outer_index,
            object_name,
            object_flags,
            serial_size,
            serial_offset,
            forced_export,
            not_for_client,
            not_for_server,
            package_guid,
            package_flags,
            not_always_loaded_for_editor_game,
            is_asset,
            first_export_dependency,
            serialization_before_serialization_dependencies,
            create_before_serialization_dependencies,
            serialization_before_create_dependencies,
            create_before_create_dependencies,
        })
    }
}

impl ByteBulkData {
    pub fn read(reader: &mut Reader, ubulk: Option<&[u8]>, bulk_base: i64) -> Result<Self> {
        let flags = reader.read_u32::<LittleEndian>()?;

        let (element_count, size_on_disk) = if flags & BULKDATA_SIZE_64BIT != 0 {
            (
                reader.read_i64::<LittleEndian>()?,
                reader.read_i64::<LittleEndian>()?,
            )
        } else {
            (
                reader.read_i32::<LittleEndian>()? as i64,
                reader.read_i32::<LittleEndian>()? as i64,
            )
        };

        let offset_in_file = reader.read_i64::<LittleEndian>()?;
        let length = usize::try_from(element_count)
            .map_err(|_| Error::format(format!("negative bulk data size {}", element_count)))?;

        let data = if flags & BULKDATA_FORCE_INLINE_PAYLOAD != 0 {
            let remaining = reader.len().saturating_sub(reader.position());

            if length as u64 > remaining {
                return Err(Error::format(format!(
                    "inline bulk data of {} bytes overruns the {} bytes left",
                    length, remaining
                )));
            }

            reader.read_bytes(length)?
        } else if flags & BULKDATA_PAYLOAD_IN_SEPARATE_FILE != 0 {
            let ubulk = ubulk.ok_or_else(|| {
                Error::format("bulk data lives in a .ubulk buffer that was not supplied")
            })?;

            let range = offset_in_file
                .checked_add(bulk_base)
                .and_then(|start| usize::try_from(start).ok())
                .and_then(|start| Some(start..start.checked_add(length)?));

            match range.and_then(|range| ubulk.get(range)) {
                Some(bytes) => bytes.to_vec(),
                None => {
                    return Err(Error::format(format!(
                        "bulk data at {} (+{}, base {}) overruns the .ubulk buffer of {} bytes",
                        offset_in_file,
                        length,
                        bulk_base,
                        ubulk.len()
                    )))
                }
            }
        } else {
            Vec::new()
        };

        Ok(ByteBulkData {
            flags,
            element_count,
            size_on_disk,
            offset_in_file,
            data,
        })
    }
}

impl Texture2DMipMap {
    pub fn read(reader: &mut Reader, ubulk: Option<&[u8]>, bulk_base: i64) -> Result<Self> {
        let cooked = reader.read_i32::<LittleEndian>()?;
        let bulk_data = ByteBulkData::read(reader, ubulk, bulk_base)?;
        let size_x = reader.read_i32::<LittleEndian>()?;
        let size_y = reader.read_i32::<LittleEndian>()?;
        let size_z = reader.read_i32::<LittleEndian>()?;

        if cooked != 1 {
            let _derived_data_key = reader.read_fstring()?;
        }

        Ok(Texture2DMipMap {
            size_x,
            size_y,
            size_z,
            bulk_data,
        })
    }
}

impl TexturePlatformData {
    pub fn read(reader: &mut Reader, ubulk: Option<&[u8]>, bulk_base: i64) -> Result<Self> {
        let size_x = reader.read_i32::<LittleEndian>()?;
        let size_y = reader.read_i32::<LittleEndian>()?;
        let num_slices = reader.read_i32::<LittleEndian>()?;
        let pixel_format = reader.read_fstring()?;
        let first_mip = reader.read_i32::<LittleEndian>()?;
        let mip_count = reader.read_u32::<LittleEndian>()?;
        let mut mips = Vec::with_capacity(mip_count.min(32) as usize);

        for _ in 0..mip_count {
            mips.push(Texture2DMipMap::read(reader, ubulk, bulk_base)?);
        }

        Ok(TexturePlatformData {
            size_x,
            size_y,
            num_slices,
            pixel_format,
            first_mip,
            mips,
        })
    }
}

impl Texture2D {
    /// Reads the texture tail that follows a Texture2D export's property bag.
    pub fn read(
        reader: &mut Reader,
        names: &NameMap,
        ubulk: Option<&[u8]>,
        bulk_base: i64,
        header_size: i64,
    ) -> Result<Self> {
        // strip flags, twice
        reader.read_u16::<LittleEndian>()?;
        reader.read_u16::<LittleEndian>()?;

        let cooked = reader.read_u32::<LittleEndian>()? != 0;
        let mut platform_data = Vec::new();

        if cooked {
            let mut pixel_format_name = names.read_name(reader)?;

            while !pixel_format_name.is_none() {
                let skip_offset = reader.read_i64::<LittleEndian>()?;
                let data = TexturePlatformData::read(reader, ubulk, bulk_base)?;
                let position = reader.position() as i64 + header_size;

                if position != skip_offset {
                    warn!(
                        pixel_format = %pixel_format_name,
                        position,
                        skip_offset,
                        "texture platform data did not end at its skip offset"
                    );
                }

                platform_data.push(data);
                pixel_format_name = names.read_name(reader)?;
            }
        }

        Ok(Texture2D {
            cooked,
            platform_data,
        })
    }
}

fn read_table<T>(
    reader: &mut Reader,
    what: &str,
    offset: i32,
    count: i32,
    mut element: impl FnMut(&mut Reader) -> Result<T>,
) -> Result<Vec<T>> {
    if count < 0 || offset < 0 {
        return Err(Error::format(format!(
            "{} table has count {} at offset {}",
            what, count, offset
        )));
    }

    let mut elements = Vec::with_capacity((count as usize).min(65536));

    if count == 0 {
        return Ok(elements);
    }

    reader.set_position(offset as u64);

    for _ in 0..count {
        elements.push(element(reader)?);
    }

    Ok(elements)
}

impl Package {
    /// Reads the summary and the name, import and export tables of a `.uasset`.
    pub fn read_header(uasset: &[u8]) -> Result<Package> {
        let mut reader = Reader::new(uasset.to_vec());
        let summary = PackageSummary::read(&mut reader)?;

        let names = read_table(
            &mut reader,
            "name",
            summary.name_offset,
            summary.name_count,
            |r| {
                let name = r.read_fstring()?;
                let _hashes = r.read_u32::<LittleEndian>()?;

                Ok(name)
            },
        )?;

        let imports = read_table(
            &mut reader,
            "import",
            summary.import_offset,
            summary.import_count,
            ObjectImport::read,
        )?;

        let exports = read_table(
            &mut reader,
            "export",
            summary.export_offset,
            summary.export_count,
            ObjectExport::read,
        )?;

        Ok(Package {
            summary,
            names: NameMap::new(names),
            imports,
            exports,
            objects: Vec::new(),
            failures: Vec::new(),
        })
    }

    /// Parses a package and decodes every export, in export-map order.
    ///
    /// An export that fails to decode is logged and listed in `failures`;
    /// the remaining exports are still decoded.
    #[instrument(skip_all, fields(uasset = uasset.len(), uexp = uexp.len()))]
    pub fn parse(
        uasset: &[u8],
        uexp: &[u8],
        ubulk: Option<&[u8]>,
        options: &ParseOptions,
    ) -> Result<Package> {
        let mut package = Package::read_header(uasset)?;
        let mut reader = Reader::new(uexp.to_vec());

        for index in 0..package.exports.len() {
            match package.read_export(&mut reader, index, uasset.len(), ubulk, options) {
                Ok(object) => package.objects.push(object),
                Err(err) => {
                    let object_name = package
                        .resolve_name(package.exports[index].object_name)
                        .map(|name| name.to_string())
                        .unwrap_or_default();

                    warn!(index, object = %object_name, "failed to decode export: {}", err);

                    package.failures.push(ExportFailure {
                        export_index: index,
                        object_name,
                        message: err.to_string(),
                    });
                }
            }
        }

        debug!(
            decoded = package.objects.len(),
            failed = package.failures.len(),
            "parsed package"
        );

        Ok(package)
    }

    /// Decodes a single export.
    pub fn read_object(
        &self,
        index: usize,
        uasset_len: usize,
        uexp: &[u8],
        ubulk: Option<&[u8]>,
        options: &ParseOptions,
    ) -> Result<ObjectRecord> {
        let mut reader = Reader::new(uexp.to_vec());

        self.read_export(&mut reader, index, uasset_len, ubulk, options)
    }

    fn read_export(
        &self,
        reader: &mut Reader,
        index: usize,
        uasset_len: usize,
        ubulk: Option<&[u8]>,
        options: &ParseOptions,
    ) -> Result<ObjectRecord> {
        let export = self.exports.get(index).ok_or(Error::BadPackageIndex {
            index: index as i32 + 1,
            reason: "export out of range",
        })?;

        let object_name = self.resolve_name(export.object_name)?;
        let class_name = self
            .object_name(export.class_index)?
            .unwrap_or_else(FName::none);

        let start = export.serial_offset.checked_sub(uasset_len as i64);
        let end = start.and_then(|start| start.checked_add(export.serial_size));

        let (start, end) = match (start, end) {
            (Some(start), Some(end)) if start >= 0 && end <= reader.len() as i64 => (start, end),
            _ => {
                return Err(Error::format(format!(
                    "export {} at {} (+{}) lies outside the {} byte .uexp buffer",
                    object_name,
                    export.serial_offset,
                    export.serial_size,
                    reader.len()
                )))
            }
        };

        debug!(index, object = %object_name, class = %class_name, "reading export");

        reader.set_position(start as u64);
        reader.depth = 0;

        let context = PropertyContext::new(&self.names, options);
        let properties = PropertyBag::read(reader, &context)?;

        let guid = if reader.read_i32::<LittleEndian>()? != 0 {
            Some(FGuid::read(reader)?)
        } else {
            None
        };

        let texture = if class_name.value == "Texture2D" {
            Some(Texture2D::read(
                reader,
                &self.names,
                ubulk,
                self.bulk_data_base()?,
                self.summary.total_header_size as i64,
            )?)
        } else {
            None
        };

        let position = reader.position() as i64;

        if is_tail_class(&class_name) {
            debug!(class = %class_name, "no model for serialized tail, skipping it");
        } else if position != end {
            warn!(
                object = %object_name,
                class = %class_name,
                position,
                expected = end,
                "export size mismatch"
            );
        }

        reader.set_position(end as u64);

        Ok(ObjectRecord {
            export_index: index,
            object_name,
            class_name,
            properties,
            guid,
            texture,
        })
    }
}

fn is_tail_class(class_name: &FName) -> bool {
    matches!(
        class_name.value.as_str(),
        "DataTable" | "SkeletalMesh" | "AnimSequence" | "Skeleton" | "CurveTable"
    )
}
