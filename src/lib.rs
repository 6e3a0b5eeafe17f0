//! Readers for Unreal Engine pak archives and the tagged-property packages
//! stored inside them.

pub mod asset;
pub mod crypto;
pub mod error;
pub mod io;
pub mod pak;
pub mod properties;
pub mod registry;
pub mod structs;

#[cfg(test)]
mod testing;

pub use asset::{ObjectRecord, Package, PackageIndex, TextureSource};
pub use crypto::AesKey;
pub use error::{Error, Result};
pub use pak::{PakEntry, PakFile, PakFilter, PakInfo, PakOptions, PakVersion};
pub use properties::{ParseOptions, PropertyBag, PropertyData, UnknownPropertyMode};
pub use registry::{PackageBytes, PakRegistry};
