mod reader;

pub use reader::{PropertyParser, PropertyReader};

use crate::asset::{NameMap, PackageIndex};
use crate::structs::{FGuid, FName, FSoftObjectPath, StructData};
use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use std::fmt;

/// Maps whose element types are not self-describing, keyed by the owning
/// property's name: `(property, key type, value type)`.
pub const MAP_TYPE_OVERRIDES: &[(&str, &str, &str)] = &[
    ("BindingIdToReferences", "Guid", "LevelSequenceBindingReferenceArray"),
    ("Tracks", "MovieSceneTrackIdentifier", "MovieSceneEvaluationTrack"),
    ("SubTemplateSerialNumbers", "MovieSceneSequenceID", "UInt32Property"),
    ("SubSequences", "MovieSceneSequenceID", "MovieSceneSubSequenceData"),
    ("Hierarchy", "MovieSceneSequenceID", "MovieSceneSequenceHierarchyNode"),
    ("TrackSignatureToTrackIdentifier", "Guid", "MovieSceneTrackIdentifier"),
    ("SubSectionRanges", "Guid", "MovieSceneFrameRange"),
];

/// What to do with a tag whose type (or some part of whose payload) has no
/// decoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum UnknownPropertyMode {
    /// Skip the tag and leave it out of the bag.
    #[default]
    Drop,
    /// Skip the tag but record a [`PropertyData::Unsupported`] marker.
    Keep,
    /// Fail the enclosing export.
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParseOptions {
    pub unknown_properties: UnknownPropertyMode,
    /// Deepest allowed nesting of fallback structs.
    pub max_depth: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            unknown_properties: UnknownPropertyMode::Drop,
            max_depth: 64,
        }
    }
}

/// Everything a property decoder needs besides the bytes.
#[derive(Clone, Copy)]
pub struct PropertyContext<'a> {
    pub names: &'a NameMap,
    pub options: &'a ParseOptions,
}

impl<'a> PropertyContext<'a> {
    pub fn new(names: &'a NameMap, options: &'a ParseOptions) -> Self {
        Self { names, options }
    }
}

/// One decoded property tag.
#[derive(Debug, Serialize)]
pub struct Property {
    pub name: FName,
    pub type_name: FName,
    pub array_index: u32,
    pub size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guid: Option<FGuid>,
    pub data: PropertyData,
}

/// Bag key: static arrays serialize one tag per element under the same name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyKey {
    pub name: String,
    pub array_index: u32,
}

impl PropertyKey {
    pub fn new(name: impl Into<String>, array_index: u32) -> Self {
        Self {
            name: name.into(),
            array_index,
        }
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.array_index == 0 {
            f.write_str(&self.name)
        } else {
            write!(f, "{}[{}]", self.name, self.array_index)
        }
    }
}

impl Serialize for PropertyKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Properties of one object or fallback struct, in stream order.
#[derive(Debug, Default, Serialize)]
#[serde(transparent)]
pub struct PropertyBag(pub IndexMap<PropertyKey, Property>);

impl PropertyBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, property: Property) -> Option<Property> {
        let key = PropertyKey::new(property.name.to_string(), property.array_index);

        self.0.insert(key, property)
    }

    pub fn get(&self, name: &str) -> Option<&Property> {
        self.get_indexed(name, 0)
    }

    pub fn get_indexed(&self, name: &str, array_index: u32) -> Option<&Property> {
        self.0.get(&PropertyKey::new(name, array_index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.0.values()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Serialize)]
pub enum BytePropertyValue {
    Enum(FName),
    Byte(u8),
}

#[derive(Debug, Serialize)]
pub struct ByteProperty {
    pub enum_name: FName,
    pub value: BytePropertyValue,
}

#[derive(Debug, Serialize)]
pub struct EnumProperty {
    pub enum_name: FName,
    pub value: Option<FName>,
}

#[derive(Debug, Serialize)]
pub enum TextHistory {
    None {
        culture_invariant_string: Option<String>,
    },
    Base {
        namespace: String,
        key: String,
        source_string: String,
    },
    AsDateTime {
        ticks: i64,
        date_style: i8,
        time_style: i8,
        time_zone: String,
        culture: String,
    },
}

#[derive(Debug, Serialize)]
pub struct TextProperty {
    pub flags: u32,
    pub history: TextHistory,
}

#[derive(Debug, Serialize)]
pub struct StructProperty {
    pub struct_name: FName,
    pub guid: FGuid,
    pub data: StructData,
}

#[derive(Debug, Serialize)]
pub struct ArrayProperty {
    pub inner_type: FName,
    pub elements: Vec<PropertyData>,
}

#[derive(Debug, Serialize)]
pub struct MapProperty {
    pub key_type: FName,
    pub value_type: FName,
    pub elements: Vec<(PropertyData, PropertyData)>,
}

#[derive(Debug, Serialize)]
pub enum PropertyData {
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float(f32),
    Double(f64),
    Byte(ByteProperty),
    Enum(EnumProperty),
    Str(String),
    Name(FName),
    Text(TextProperty),
    Object(PackageIndex),
    Interface(u32),
    SoftObject(FSoftObjectPath),
    Struct(StructProperty),
    Array(ArrayProperty),
    Set(ArrayProperty),
    Map(MapProperty),
    /// A tag that was skipped; only produced with [`UnknownPropertyMode::Keep`].
    Unsupported {
        type_name: FName,
        size: u32,
        reason: String,
    },
}
