//! Byte builders for unit tests.

use crate::asset::NameMap;
use crate::io::Reader;
use byteorder::{LittleEndian, WriteBytesExt};

/// Writes tagged-property streams while collecting the name map they refer to.
pub(crate) struct Fixture {
    names: Vec<String>,
    pub(crate) data: Vec<u8>,
}

impl Fixture {
    pub(crate) fn new() -> Self {
        Self {
            names: vec!["None".to_owned()],
            data: Vec::new(),
        }
    }

    pub(crate) fn name_index(&mut self, name: &str) -> i32 {
        match self.names.iter().position(|n| n == name) {
            Some(index) => index as i32,
            None => {
                self.names.push(name.to_owned());
                self.names.len() as i32 - 1
            }
        }
    }

    pub(crate) fn name(&mut self, name: &str) -> &mut Self {
        let index = self.name_index(name);

        self.i32(index).i32(0)
    }

    /// Writes a tag header up to the type metadata.
    pub(crate) fn tag(&mut self, name: &str, type_name: &str, size: i32) -> &mut Self {
        self.name(name).name(type_name).i32(size).i32(0)
    }

    pub(crate) fn u8(&mut self, value: u8) -> &mut Self {
        self.data.push(value);
        self
    }

    pub(crate) fn u32(&mut self, value: u32) -> &mut Self {
        self.data.write_u32::<LittleEndian>(value).unwrap();
        self
    }

    pub(crate) fn i32(&mut self, value: i32) -> &mut Self {
        self.data.write_i32::<LittleEndian>(value).unwrap();
        self
    }

    pub(crate) fn i64(&mut self, value: i64) -> &mut Self {
        self.data.write_i64::<LittleEndian>(value).unwrap();
        self
    }

    pub(crate) fn f32(&mut self, value: f32) -> &mut Self {
        self.data.write_f32::<LittleEndian>(value).unwrap();
        self
    }

    pub(crate) fn bytes(&mut self, value: &[u8]) -> &mut Self {
        self.data.extend_from_slice(value);
        self
    }

    /// A zeroed GUID.
    pub(crate) fn guid(&mut self) -> &mut Self {
        self.bytes(&[0; 16])
    }

    /// Length-prefixed, NUL-terminated ASCII.
    pub(crate) fn fstring(&mut self, value: &str) -> &mut Self {
        self.i32(value.len() as i32 + 1).bytes(value.as_bytes()).u8(0)
    }

    pub(crate) fn name_list(&self) -> &[String] {
        &self.names
    }

    pub(crate) fn finish(self) -> (NameMap, Reader) {
        (NameMap::new(self.names), Reader::new(self.data))
    }
}

pub(crate) struct TestImport {
    pub(crate) class_package: i32,
    pub(crate) class_name: i32,
    pub(crate) object_name: i32,
}

pub(crate) struct TestExport {
    pub(crate) class_index: i32,
    pub(crate) object_name: i32,
    pub(crate) serial_size: i64,
}

struct SummaryLayout {
    total_header_size: i32,
    name_count: i32,
    name_offset: i32,
    import_count: i32,
    import_offset: i32,
    export_count: i32,
    export_offset: i32,
}

fn i32s(data: &mut Vec<u8>, values: &[i32]) {
    for &value in values {
        data.write_i32::<LittleEndian>(value).unwrap();
    }
}

fn write_summary(layout: &SummaryLayout) -> Vec<u8> {
    let mut data = Vec::new();

    data.write_u32::<LittleEndian>(crate::asset::PACKAGE_FILE_TAG).unwrap();
    // legacy version, UE3 version, UE4 version, licensee version, custom versions
    i32s(&mut data, &[-7, 864, 0, 0, 0]);
    i32s(&mut data, &[layout.total_header_size]);
    i32s(&mut data, &[5]);
    data.extend_from_slice(b"None\0");
    data.write_u32::<LittleEndian>(0x8000_0000).unwrap();
    i32s(
        &mut data,
        &[
            layout.name_count,
            layout.name_offset,
            0,
            0,
            layout.export_count,
            layout.export_offset,
            layout.import_count,
            layout.import_offset,
            0,
            0,
            0,
            0,
            0,
        ],
    );
    data.extend_from_slice(&[0; 16]);
    // generations
    i32s(&mut data, &[0]);

    for _ in 0..2 {
        data.write_u16::<LittleEndian>(4).unwrap();
        data.write_u16::<LittleEndian>(27).unwrap();
        data.write_u16::<LittleEndian>(2).unwrap();
        data.write_u32::<LittleEndian>(0).unwrap();
        i32s(&mut data, &[0]);
    }

    // compression flags, compressed chunks, package source, packages to cook
    i32s(&mut data, &[0, 0, 0, 0]);
    // asset registry offset
    i32s(&mut data, &[0]);
    data.write_i64::<LittleEndian>(0).unwrap();
    // world tile offset, chunk ids, preload dependency count and offset
    i32s(&mut data, &[0, 0, 0, 0]);

    data
}

/// Serializes a `.uasset` whose exports point at consecutive ranges of the
/// matching `.uexp`.
pub(crate) fn build_uasset(
    names: &[String],
    imports: &[TestImport],
    exports: &[TestExport],
) -> Vec<u8> {
    let mut layout = SummaryLayout {
        total_header_size: 0,
        name_count: names.len() as i32,
        name_offset: 0,
        import_count: imports.len() as i32,
        import_offset: 0,
        export_count: exports.len() as i32,
        export_offset: 0,
    };

    let summary_len = write_summary(&layout).len() as i32;
    let names_len: i32 = names.iter().map(|n| 4 + n.len() as i32 + 1 + 4).sum();

    layout.name_offset = summary_len;
    layout.import_offset = summary_len + names_len;
    layout.export_offset = layout.import_offset + 28 * imports.len() as i32;
    layout.total_header_size = layout.export_offset + 104 * exports.len() as i32;

    let mut data = write_summary(&layout);

    for name in names {
        data.write_i32::<LittleEndian>(name.len() as i32 + 1).unwrap();
        data.extend_from_slice(name.as_bytes());
        data.push(0);
        data.write_u32::<LittleEndian>(0).unwrap();
    }

    for import in imports {
        for value in [import.class_package, 0, import.class_name, 0, 0, import.object_name, 0] {
            data.write_i32::<LittleEndian>(value).unwrap();
        }
    }

    let mut serial_offset = layout.total_header_size as i64;

    for export in exports {
        for value in [export.class_index, 0, 0, 0, export.object_name, 0, 0] {
            data.write_i32::<LittleEndian>(value).unwrap();
        }
        data.write_i64::<LittleEndian>(export.serial_size).unwrap();
        data.write_i64::<LittleEndian>(serial_offset).unwrap();
        data.extend_from_slice(&[0; 12 + 16 + 4 + 8 + 20]);

        serial_offset += export.serial_size;
    }

    assert_eq!(data.len() as i32, layout.total_header_size);

    data
}
