use crate::asset::PackageIndex;
use crate::error::{Error, Result};
use crate::io::{Reader, ReaderExt};
use crate::properties::{
    ArrayProperty, ByteProperty, BytePropertyValue, EnumProperty, MapProperty, Property,
    PropertyBag, PropertyContext, PropertyData, StructProperty, TextHistory, TextProperty,
    UnknownPropertyMode, MAP_TYPE_OVERRIDES,
};
use crate::structs::{FGuid, FName, FSoftObjectPath, StructData};
use byteorder::{LittleEndian, ReadBytesExt};
use tracing::{debug, instrument, warn};

pub trait PropertyReader {
    /// Reads the type-specific part of the tag header, before the payload.
    fn read_tag(&mut self, _reader: &mut Reader, _context: &PropertyContext) -> Result<()> {
        Ok(())
    }

    /// Reads a tagged payload of `size` bytes.
    fn read(
        &mut self,
        reader: &mut Reader,
        context: &PropertyContext,
        _size: u32,
    ) -> Result<PropertyData> {
        self.read_raw(reader, context)
    }

    /// Reads the tag shared by every element of an array of structs.
    fn read_head(&mut self, _reader: &mut Reader, _context: &PropertyContext) -> Result<()> {
        Ok(())
    }

    /// Reads one bare value as stored inside arrays, sets and maps.
    fn read_raw(&mut self, reader: &mut Reader, context: &PropertyContext) -> Result<PropertyData>;
}

enum TagRead {
    End,
    Skipped,
    Property(Property),
}

impl Property {
    fn read(reader: &mut Reader, context: &PropertyContext) -> Result<TagRead> {
        let name = context.names.read_name(reader)?;

        if name.is_none() {
            return Ok(TagRead::End);
        }

        let type_name = context.names.read_name(reader)?;
        let size = reader.read_i32::<LittleEndian>()?;
        let array_index = reader.read_u32::<LittleEndian>()?;

        let size = u32::try_from(size).map_err(|_| {
            Error::format(format!("property {} has negative size {}", name, size))
        })?;

        let mut parser = PropertyParser::from_name(&type_name.value, &name.value);

        parser.read_tag(reader, context)?;

        let guid = read_property_guid(reader)?;
        let start = reader.position();
        let end = start + size as u64;

        let data = match parser.read(reader, context, size) {
            Ok(data) => {
                if reader.position() != end {
                    warn!(
                        property = %name,
                        r#type = %type_name,
                        position = reader.position(),
                        expected = end,
                        "property size mismatch"
                    );

                    reader.set_position(end);
                }

                data
            }
            Err(err) if err.is_recoverable() => {
                reader.set_position(end);

                match context.options.unknown_properties {
                    UnknownPropertyMode::Drop => {
                        debug!(property = %name, r#type = %type_name, "dropping property: {}", err);

                        return Ok(TagRead::Skipped);
                    }
                    UnknownPropertyMode::Keep => PropertyData::Unsupported {
                        type_name: type_name.clone(),
                        size,
                        reason: err.to_string(),
                    },
                    UnknownPropertyMode::Error => return Err(err),
                }
            }
            Err(err) => return Err(err),
        };

        Ok(TagRead::Property(Property {
            name,
            type_name,
            array_index,
            size,
            guid,
            data,
        }))
    }
}

impl PropertyBag {
    /// Reads tags until the `None` terminator.
    #[instrument(level = "trace", skip_all, fields(depth = reader.depth))]
    pub fn read(reader: &mut Reader, context: &PropertyContext) -> Result<PropertyBag> {
        if reader.depth >= context.options.max_depth {
            return Err(Error::format(format!(
                "property bags nested deeper than {}",
                context.options.max_depth
            )));
        }

        reader.depth += 1;

        let bag = Self::read_tags(reader, context);

        reader.depth -= 1;

        bag
    }

    fn read_tags(reader: &mut Reader, context: &PropertyContext) -> Result<PropertyBag> {
        let mut bag = PropertyBag::new();

        loop {
            match Property::read(reader, context)? {
                TagRead::End => break,
                TagRead::Skipped => {}
                TagRead::Property(property) => {
                    bag.insert(property);
                }
            }
        }

        Ok(bag)
    }
}

fn read_property_guid(reader: &mut Reader) -> Result<Option<FGuid>> {
    if reader.read_u8()? != 0 {
        Ok(Some(FGuid::read(reader)?))
    } else {
        Ok(None)
    }
}

pub struct PropertyParser;

impl PropertyParser {
    /// Picks the decoder for a tag of type `name` owned by property `property_name`.
    pub fn from_name(name: &str, property_name: &str) -> Box<dyn PropertyReader> {
        match name {
            "BoolProperty" => Box::new(BoolPropertyParser::default()),
            "ByteProperty" => Box::new(BytePropertyParser::default()),
            "EnumProperty" => Box::new(EnumPropertyParser::default()),
            "Int8Property" => Box::new(Int8PropertyParser),
            "Int16Property" => Box::new(Int16PropertyParser),
            "IntProperty" => Box::new(IntPropertyParser),
            "Int64Property" => Box::new(Int64PropertyParser),
            "UInt16Property" => Box::new(UInt16PropertyParser),
            "UInt32Property" => Box::new(UInt32PropertyParser),
            "UInt64Property" => Box::new(UInt64PropertyParser),
            "FloatProperty" => Box::new(FloatPropertyParser),
            "DoubleProperty" => Box::new(DoublePropertyParser),
            "StrProperty" => Box::new(StrPropertyParser),
            "NameProperty" => Box::new(NamePropertyParser),
            "TextProperty" => Box::new(TextPropertyParser),
            "ObjectProperty" => Box::new(ObjectPropertyParser),
            "InterfaceProperty" => Box::new(InterfacePropertyParser),
            "SoftObjectProperty" => Box::new(SoftObjectPropertyParser),
            "StructProperty" => Box::new(StructPropertyParser::new(FName::none())),
            "ArrayProperty" => Box::new(ArrayPropertyParser::new(property_name)),
            "SetProperty" => Box::new(SetPropertyParser::new(property_name)),
            "MapProperty" => Box::new(MapPropertyParser::new(property_name)),
            "LazyObjectProperty"
            | "DelegateProperty"
            | "MulticastDelegateProperty"
            | "MulticastInlineDelegateProperty"
            | "MulticastSparseDelegateProperty" => Box::new(UnsupportedPropertyParser {
                message: format!("{} values", name),
            }),
            _ => Box::new(UnsupportedPropertyParser {
                message: format!("unknown property type {}", name),
            }),
        }
    }

    /// Picks the decoder for a map key or value. Map element types that are
    /// not property types name a struct.
    pub fn for_map_element(name: &str) -> Box<dyn PropertyReader> {
        match name {
            _ if name.ends_with("Property") => Self::from_name(name, ""),
            struct_name => Box::new(StructPropertyParser::new(FName::from(struct_name))),
        }
    }
}

struct UnsupportedPropertyParser {
    message: String,
}

impl PropertyReader for UnsupportedPropertyParser {
    fn read_raw(&mut self, _reader: &mut Reader, _context: &PropertyContext) -> Result<PropertyData> {
        Err(Error::unsupported(self.message.clone()))
    }
}

#[derive(Default)]
struct BoolPropertyParser {
    value: bool,
}

impl PropertyReader for BoolPropertyParser {
    fn read_tag(&mut self, reader: &mut Reader, _context: &PropertyContext) -> Result<()> {
        self.value = reader.read_u8()? != 0;

        Ok(())
    }

    fn read(
        &mut self,
        _reader: &mut Reader,
        _context: &PropertyContext,
        _size: u32,
    ) -> Result<PropertyData> {
        Ok(PropertyData::Bool(self.value))
    }

    fn read_raw(&mut self, reader: &mut Reader, _context: &PropertyContext) -> Result<PropertyData> {
        Ok(PropertyData::Bool(reader.read_u8()? != 0))
    }
}

struct BytePropertyParser {
    enum_name: FName,
}

impl Default for BytePropertyParser {
    fn default() -> Self {
        Self {
            enum_name: FName::none(),
        }
    }
}

impl PropertyReader for BytePropertyParser {
    fn read_tag(&mut self, reader: &mut Reader, context: &PropertyContext) -> Result<()> {
        self.enum_name = context.names.read_name(reader)?;

        Ok(())
    }

    fn read(
        &mut self,
        reader: &mut Reader,
        context: &PropertyContext,
        _size: u32,
    ) -> Result<PropertyData> {
        let value = if self.enum_name.is_none() {
            BytePropertyValue::Byte(reader.read_u8()?)
        } else {
            BytePropertyValue::Enum(context.names.read_name(reader)?)
        };

        Ok(PropertyData::Byte(ByteProperty {
            enum_name: self.enum_name.clone(),
            value,
        }))
    }

    fn read_raw(&mut self, reader: &mut Reader, _context: &PropertyContext) -> Result<PropertyData> {
        Ok(PropertyData::Byte(ByteProperty {
            enum_name: self.enum_name.clone(),
            value: BytePropertyValue::Byte(reader.read_u8()?),
        }))
    }
}

struct EnumPropertyParser {
    enum_name: FName,
}

impl Default for EnumPropertyParser {
    fn default() -> Self {
        Self {
            enum_name: FName::none(),
        }
    }
}

impl PropertyReader for EnumPropertyParser {
    fn read_tag(&mut self, reader: &mut Reader, context: &PropertyContext) -> Result<()> {
        self.enum_name = context.names.read_name(reader)?;

        Ok(())
    }

    fn read(
        &mut self,
        reader: &mut Reader,
        context: &PropertyContext,
        _size: u32,
    ) -> Result<PropertyData> {
        let value = if self.enum_name.is_none() {
            None
        } else {
            Some(context.names.read_name(reader)?)
        };

        Ok(PropertyData::Enum(EnumProperty {
            enum_name: self.enum_name.clone(),
            value,
        }))
    }

    fn read_raw(&mut self, reader: &mut Reader, context: &PropertyContext) -> Result<PropertyData> {
        Ok(PropertyData::Enum(EnumProperty {
            enum_name: self.enum_name.clone(),
            value: Some(context.names.read_name(reader)?),
        }))
    }
}

struct Int8PropertyParser;

impl PropertyReader for Int8PropertyParser {
    fn read_raw(&mut self, reader: &mut Reader, _context: &PropertyContext) -> Result<PropertyData> {
        Ok(PropertyData::Int8(reader.read_i8()?))
    }
}

macro_rules! impl_primitive_parser {
    (
        $name:ident, $read_method:ident, $prop_data_name:ident
    ) => {
        struct $name;

        impl PropertyReader for $name {
            fn read_raw(
                &mut self,
                reader: &mut Reader,
                _context: &PropertyContext,
            ) -> Result<PropertyData> {
                let value = reader.$read_method::<LittleEndian>()?;

                Ok(PropertyData::$prop_data_name(value))
            }
        }
    };
}

impl_primitive_parser!(Int16PropertyParser, read_i16, Int16);
impl_primitive_parser!(IntPropertyParser, read_i32, Int32);
impl_primitive_parser!(Int64PropertyParser, read_i64, Int64);
impl_primitive_parser!(UInt16PropertyParser, read_u16, UInt16);
impl_primitive_parser!(UInt32PropertyParser, read_u32, UInt32);
impl_primitive_parser!(UInt64PropertyParser, read_u64, UInt64);
impl_primitive_parser!(FloatPropertyParser, read_f32, Float);
impl_primitive_parser!(DoublePropertyParser, read_f64, Double);
impl_primitive_parser!(InterfacePropertyParser, read_u32, Interface);

struct StrPropertyParser;

impl PropertyReader for StrPropertyParser {
    fn read_raw(&mut self, reader: &mut Reader, _context: &PropertyContext) -> Result<PropertyData> {
        Ok(PropertyData::Str(reader.read_fstring()?))
    }
}

struct NamePropertyParser;

impl PropertyReader for NamePropertyParser {
    fn read_raw(&mut self, reader: &mut Reader, context: &PropertyContext) -> Result<PropertyData> {
        Ok(PropertyData::Name(context.names.read_name(reader)?))
    }
}

struct ObjectPropertyParser;

impl PropertyReader for ObjectPropertyParser {
    fn read_raw(&mut self, reader: &mut Reader, _context: &PropertyContext) -> Result<PropertyData> {
        Ok(PropertyData::Object(PackageIndex::read(reader)?))
    }
}

struct SoftObjectPropertyParser;

impl PropertyReader for SoftObjectPropertyParser {
    fn read_raw(&mut self, reader: &mut Reader, context: &PropertyContext) -> Result<PropertyData> {
        Ok(PropertyData::SoftObject(FSoftObjectPath::read(reader, context.names)?))
    }
}

struct TextPropertyParser;

impl PropertyReader for TextPropertyParser {
    fn read_raw(&mut self, reader: &mut Reader, _context: &PropertyContext) -> Result<PropertyData> {
        let flags = reader.read_u32::<LittleEndian>()?;
        let history_type = reader.read_i8()?;

        let history = match history_type {
            -1 => {
                let culture_invariant_string = if reader.read_bool32()? {
                    Some(reader.read_fstring()?)
                } else {
                    None
                };

                TextHistory::None {
                    culture_invariant_string,
                }
            }
            0 => {
                let namespace = reader.read_fstring()?;
                let key = reader.read_fstring()?;
                let source_string = reader.read_fstring()?;

                TextHistory::Base {
                    namespace,
                    key,
                    source_string,
                }
            }
            9 => {
                let ticks = reader.read_i64::<LittleEndian>()?;
                let date_style = reader.read_i8()?;
                let time_style = reader.read_i8()?;
                let time_zone = reader.read_fstring()?;
                let culture = reader.read_fstring()?;

                TextHistory::AsDateTime {
                    ticks,
                    date_style,
                    time_style,
                    time_zone,
                    culture,
                }
            }
            _ => {
                return Err(Error::unsupported(format!(
                    "text history type {}",
                    history_type
                )))
            }
        };

        Ok(PropertyData::Text(TextProperty { flags, history }))
    }
}

struct StructPropertyParser {
    struct_name: FName,
    guid: FGuid,
}

impl StructPropertyParser {
    fn new(struct_name: FName) -> Self {
        Self {
            struct_name,
            guid: FGuid::default(),
        }
    }

    fn read_struct(&self, reader: &mut Reader, context: &PropertyContext) -> Result<PropertyData> {
        let data = StructData::read(reader, context, &self.struct_name.value)?;

        Ok(PropertyData::Struct(StructProperty {
            struct_name: self.struct_name.clone(),
            guid: self.guid,
            data,
        }))
    }
}

impl PropertyReader for StructPropertyParser {
    fn read_tag(&mut self, reader: &mut Reader, context: &PropertyContext) -> Result<()> {
        self.struct_name = context.names.read_name(reader)?;
        self.guid = FGuid::read(reader)?;

        Ok(())
    }

    fn read_head(&mut self, reader: &mut Reader, context: &PropertyContext) -> Result<()> {
        let _name = context.names.read_name(reader)?;
        let _type_name = context.names.read_name(reader)?;
        let _size = reader.read_i32::<LittleEndian>()?;
        let _index = reader.read_i32::<LittleEndian>()?;

        self.read_tag(reader, context)?;
        read_property_guid(reader)?;

        Ok(())
    }

    fn read_raw(&mut self, reader: &mut Reader, context: &PropertyContext) -> Result<PropertyData> {
        self.read_struct(reader, context)
    }
}

fn read_count(reader: &mut Reader, what: &str) -> Result<usize> {
    let count = reader.read_i32::<LittleEndian>()?;

    usize::try_from(count)
        .map_err(|_| Error::format(format!("negative {} element count {}", what, count)))
}

struct ArrayPropertyParser {
    property_name: String,
    inner_type: FName,
}

impl ArrayPropertyParser {
    fn new(property_name: &str) -> Self {
        Self {
            property_name: property_name.to_owned(),
            inner_type: FName::none(),
        }
    }
}

impl PropertyReader for ArrayPropertyParser {
    fn read_tag(&mut self, reader: &mut Reader, context: &PropertyContext) -> Result<()> {
        self.inner_type = context.names.read_name(reader)?;

        Ok(())
    }

    fn read(
        &mut self,
        reader: &mut Reader,
        context: &PropertyContext,
        _size: u32,
    ) -> Result<PropertyData> {
        let element_count = read_count(reader, "array")?;
        let mut inner_parser = PropertyParser::from_name(&self.inner_type.value, &self.property_name);

        if matches!(
            self.inner_type.value.as_str(),
            "StructProperty" | "ArrayProperty"
        ) {
            inner_parser.read_head(reader, context)?;
        }

        let mut elements = Vec::with_capacity(element_count.min(4096));

        for _ in 0..element_count {
            elements.push(inner_parser.read_raw(reader, context)?);
        }

        Ok(PropertyData::Array(ArrayProperty {
            inner_type: self.inner_type.clone(),
            elements,
        }))
    }

    fn read_head(&mut self, reader: &mut Reader, context: &PropertyContext) -> Result<()> {
        let _name = context.names.read_name(reader)?;
        let _type_name = context.names.read_name(reader)?;
        let _size = reader.read_i32::<LittleEndian>()?;
        let _index = reader.read_i32::<LittleEndian>()?;

        self.read_tag(reader, context)?;
        read_property_guid(reader)?;

        Ok(())
    }

    fn read_raw(&mut self, _reader: &mut Reader, _context: &PropertyContext) -> Result<PropertyData> {
        Err(Error::unsupported("arrays nested in containers"))
    }
}

struct SetPropertyParser {
    property_name: String,
    inner_type: FName,
}

impl SetPropertyParser {
    fn new(property_name: &str) -> Self {
        Self {
            property_name: property_name.to_owned(),
            inner_type: FName::none(),
        }
    }
}

impl PropertyReader for SetPropertyParser {
    fn read_tag(&mut self, reader: &mut Reader, context: &PropertyContext) -> Result<()> {
        self.inner_type = context.names.read_name(reader)?;

        Ok(())
    }

    fn read(
        &mut self,
        reader: &mut Reader,
        context: &PropertyContext,
        _size: u32,
    ) -> Result<PropertyData> {
        let removed = reader.read_i32::<LittleEndian>()?;

        if removed != 0 {
            return Err(Error::unsupported(format!(
                "set with {} removed elements",
                removed
            )));
        }

        let element_count = read_count(reader, "set")?;
        let mut inner_parser = PropertyParser::from_name(&self.inner_type.value, &self.property_name);
        let mut elements = Vec::with_capacity(element_count.min(4096));

        for _ in 0..element_count {
            elements.push(inner_parser.read_raw(reader, context)?);
        }

        Ok(PropertyData::Set(ArrayProperty {
            inner_type: self.inner_type.clone(),
            elements,
        }))
    }

    fn read_raw(&mut self, _reader: &mut Reader, _context: &PropertyContext) -> Result<PropertyData> {
        Err(Error::unsupported("sets nested in containers"))
    }
}

struct MapPropertyParser {
    property_name: String,
    key_type: FName,
    value_type: FName,
}

impl MapPropertyParser {
    fn new(property_name: &str) -> Self {
        Self {
            property_name: property_name.to_owned(),
            key_type: FName::none(),
            value_type: FName::none(),
        }
    }
}

impl PropertyReader for MapPropertyParser {
    fn read_tag(&mut self, reader: &mut Reader, context: &PropertyContext) -> Result<()> {
        self.key_type = context.names.read_name(reader)?;
        self.value_type = context.names.read_name(reader)?;

        let overrides = MAP_TYPE_OVERRIDES
            .iter()
            .find(|(property, _, _)| *property == self.property_name);

        if let Some((_, key_type, value_type)) = overrides {
            self.key_type = FName::from(key_type);
            self.value_type = FName::from(value_type);
        }

        Ok(())
    }

    fn read(
        &mut self,
        reader: &mut Reader,
        context: &PropertyContext,
        _size: u32,
    ) -> Result<PropertyData> {
        let removed = reader.read_i32::<LittleEndian>()?;

        if removed != 0 {
            return Err(Error::unsupported(format!(
                "map {} with {} removed keys",
                self.property_name, removed
            )));
        }

        let element_count = read_count(reader, "map")?;
        let mut key_parser = PropertyParser::for_map_element(&self.key_type.value);
        let mut value_parser = PropertyParser::for_map_element(&self.value_type.value);
        let mut elements = Vec::with_capacity(element_count.min(4096));

        for _ in 0..element_count {
            let key = key_parser.read_raw(reader, context)?;
            let value = value_parser.read_raw(reader, context)?;

            elements.push((key, value));
        }

        Ok(PropertyData::Map(MapProperty {
            key_type: self.key_type.clone(),
            value_type: self.value_type.clone(),
            elements,
        }))
    }

    fn read_raw(&mut self, _reader: &mut Reader, _context: &PropertyContext) -> Result<PropertyData> {
        Err(Error::unsupported("maps nested in containers"))
    }
}
