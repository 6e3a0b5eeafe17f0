mod reader;

use crate::properties::PropertyBag;
use serde::{Serialize, Serializer};
use std::fmt;

/// A pooled name reference, resolved against a package's name map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FName {
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<u32>,
}

impl FName {
    pub fn from(name: &str) -> FName {
        FName {
            value: name.to_owned(),
            number: None,
        }
    }

    pub fn none() -> FName {
        FName::from("None")
    }

    pub fn is_none(&self) -> bool {
        self.value == "None"
    }
}

impl fmt::Display for FName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.number {
            Some(number) => write!(f, "{}_{}", self.value, number - 1),
            None => f.write_str(&self.value),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct FGuid {
    pub a: u32,
    pub b: u32,
    pub c: u32,
    pub d: u32,
}

impl FGuid {
    pub fn is_zero(&self) -> bool {
        self.a == 0 && self.b == 0 && self.c == 0 && self.d == 0
    }
}

impl fmt::Display for FGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}{:08X}{:08X}{:08X}", self.a, self.b, self.c, self.d)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FVector {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FVector2D {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FVector4 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FRotator {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FQuat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

/// 8-bit color, stored on disk in BGRA order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FColor {
    pub b: u8,
    pub g: u8,
    pub r: u8,
    pub a: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FLinearColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FIntPoint {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateTime {
    pub ticks: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Timespan {
    pub ticks: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FSoftObjectPath {
    pub asset_path_name: FName,
    pub sub_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LevelSequenceObjectReference {
    pub key: FGuid,
    pub object_id: FGuid,
    pub object_path: String,
}

#[derive(Debug, Serialize)]
pub struct DynamicStruct {
    pub properties: PropertyBag,
}

/// Payload of a `StructProperty`: one of the binary-layout engine structs,
/// or a nested property bag for everything else.
#[derive(Debug, Serialize)]
pub enum StructData {
    Vector(FVector),
    Vector2D(FVector2D),
    Vector4(FVector4),
    Rotator(FRotator),
    Quat(FQuat),
    Color(FColor),
    LinearColor(FLinearColor),
    IntPoint(FIntPoint),
    Guid(FGuid),
    DateTime(DateTime),
    Timespan(Timespan),
    FrameNumber(i32),
    SoftObjectPath(FSoftObjectPath),
    SoftClassPath(FSoftObjectPath),
    GameplayTagContainer(Vec<FName>),
    LevelSequenceObjectReferenceMap(Vec<LevelSequenceObjectReference>),
    Dynamic(DynamicStruct),
}

pub(crate) fn serialize_hex<T, S>(bytes: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: AsRef<[u8]>,
    S: Serializer,
{
    serializer.serialize_str(&hex::encode(bytes))
}

pub(crate) fn serialize_len<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u64(bytes.len() as u64)
}
