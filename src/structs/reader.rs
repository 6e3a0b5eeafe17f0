use crate::asset::NameMap;
use crate::error::Result;
use crate::io::{Reader, ReaderExt};
use crate::properties::{PropertyBag, PropertyContext};
use crate::structs::{
    DateTime, DynamicStruct, FColor, FGuid, FIntPoint, FLinearColor, FQuat, FRotator,
    FSoftObjectPath, FVector, FVector2D, FVector4, LevelSequenceObjectReference, StructData,
    Timespan,
};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Read;

impl FGuid {
    pub fn read<R: Read>(reader: &mut R) -> Result<FGuid> {
        let a = reader.read_u32::<LittleEndian>()?;
        let b = reader.read_u32::<LittleEndian>()?;
        let c = reader.read_u32::<LittleEndian>()?;
        let d = reader.read_u32::<LittleEndian>()?;

        Ok(FGuid { a, b, c, d })
    }
}

impl FVector {
    pub fn read(reader: &mut Reader) -> Result<Self> {
        let x = reader.read_f32::<LittleEndian>()?;
        let y = reader.read_f32::<LittleEndian>()?;
        let z = reader.read_f32::<LittleEndian>()?;

        Ok(FVector { x, y, z })
    }
}

impl FVector2D {
    pub fn read(reader: &mut Reader) -> Result<Self> {
        let x = reader.read_f32::<LittleEndian>()?;
        let y = reader.read_f32::<LittleEndian>()?;

        Ok(FVector2D { x, y })
    }
}

impl FVector4 {
    pub fn read(reader: &mut Reader) -> Result<Self> {
        let x = reader.read_f32::<LittleEndian>()?;
        let y = reader.read_f32::<LittleEndian>()?;
        let z = reader.read_f32::<LittleEndian>()?;
        let w = reader.read_f32::<LittleEndian>()?;

        Ok(FVector4 { x, y, z, w })
    }
}

impl FRotator {
    pub fn read(reader: &mut Reader) -> Result<Self> {
        let pitch = reader.read_f32::<LittleEndian>()?;
        let yaw = reader.read_f32::<LittleEndian>()?;
        let roll = reader.read_f32::<LittleEndian>()?;

        Ok(FRotator { pitch, yaw, roll })
    }
}

impl FQuat {
    pub fn read(reader: &mut Reader) -> Result<Self> {
        let x = reader.read_f32::<LittleEndian>()?;
        let y = reader.read_f32::<LittleEndian>()?;
        let z = reader.read_f32::<LittleEndian>()?;
        let w = reader.read_f32::<LittleEndian>()?;

        Ok(FQuat { x, y, z, w })
    }
}

impl FColor {
    pub fn read(reader: &mut Reader) -> Result<Self> {
        let b = reader.read_u8()?;
        let g = reader.read_u8()?;
        let r = reader.read_u8()?;
        let a = reader.read_u8()?;

        Ok(FColor { b, g, r, a })
    }
}

impl FLinearColor {
    pub fn read(reader: &mut Reader) -> Result<Self> {
        let r = reader.read_f32::<LittleEndian>()?;
        let g = reader.read_f32::<LittleEndian>()?;
        let b = reader.read_f32::<LittleEndian>()?;
        let a = reader.read_f32::<LittleEndian>()?;

        Ok(FLinearColor { r, g, b, a })
    }
}

impl FIntPoint {
    pub fn read(reader: &mut Reader) -> Result<Self> {
        let x = reader.read_i32::<LittleEndian>()?;
        let y = reader.read_i32::<LittleEndian>()?;

        Ok(FIntPoint { x, y })
    }
}

impl FSoftObjectPath {
    pub fn read(reader: &mut Reader, names: &NameMap) -> Result<Self> {
        let asset_path_name = names.read_name(reader)?;
        let sub_path = reader.read_fstring()?;

        Ok(FSoftObjectPath {
            asset_path_name,
            sub_path,
        })
    }
}

impl LevelSequenceObjectReference {
    pub fn read(reader: &mut Reader) -> Result<Self> {
        let key = FGuid::read(reader)?;
        let object_id = FGuid::read(reader)?;
        let object_path = reader.read_fstring()?;

        Ok(LevelSequenceObjectReference {
            key,
            object_id,
            object_path,
        })
    }
}

impl StructData {
    /// Decodes a struct payload, choosing the binary layout by struct name.
    pub fn read(reader: &mut Reader, context: &PropertyContext, struct_name: &str) -> Result<Self> {
        let data = match struct_name {
            "Vector" => StructData::Vector(FVector::read(reader)?),
            "Vector2D" => StructData::Vector2D(FVector2D::read(reader)?),
            "Vector4" => StructData::Vector4(FVector4::read(reader)?),
            "Rotator" => StructData::Rotator(FRotator::read(reader)?),
            "Quat" => StructData::Quat(FQuat::read(reader)?),
            "Color" => StructData::Color(FColor::read(reader)?),
            "LinearColor" => StructData::LinearColor(FLinearColor::read(reader)?),
            "IntPoint" => StructData::IntPoint(FIntPoint::read(reader)?),
            "Guid" => StructData::Guid(FGuid::read(reader)?),
            "DateTime" => StructData::DateTime(DateTime {
                ticks: reader.read_i64::<LittleEndian>()?,
            }),
            "Timespan" => StructData::Timespan(Timespan {
                ticks: reader.read_i64::<LittleEndian>()?,
            }),
            "FrameNumber" => StructData::FrameNumber(reader.read_i32::<LittleEndian>()?),
            "SoftObjectPath" => {
                StructData::SoftObjectPath(FSoftObjectPath::read(reader, context.names)?)
            }
            "SoftClassPath" => {
                StructData::SoftClassPath(FSoftObjectPath::read(reader, context.names)?)
            }
            "GameplayTagContainer" => {
                let tags = reader.read_array(|r| context.names.read_name(r))?;

                StructData::GameplayTagContainer(tags)
            }
            "LevelSequenceObjectReferenceMap" => {
                let count = reader.read_i32::<LittleEndian>()?;
                let mut references = Vec::with_capacity(count.clamp(0, 1024) as usize);

                for _ in 0..count {
                    references.push(LevelSequenceObjectReference::read(reader)?);
                }

                StructData::LevelSequenceObjectReferenceMap(references)
            }
            _ => {
                let properties = PropertyBag::read(reader, context)?;

                StructData::Dynamic(DynamicStruct { properties })
            }
        };

        Ok(data)
    }
}
