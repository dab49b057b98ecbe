//! A library for reading and writing RenderDragon compiled material
//! containers (`.material.bin`).
//!
//! # Container Versions
//! Versions 22 through 25 are supported. Version 25 is the current format
//! and receives the most testing. The container packages one named material
//! as a set of render passes, each pass holding one variant per flag
//! combination, each variant holding per platform and stage shader blobs.
//!
//! Reading and writing are byte-exact inverses for valid containers,
//! including the passphrase-encrypted layout.
use std::io::{Read, Seek, Write};

use binrw::{BinRead, BinReaderExt, BinWrite, VecArgs};

pub mod bgfx;
pub mod encryption;
pub mod enums;
pub mod error;
pub mod material;
pub mod pass;

pub use material::CompiledMaterialDefinition;

use error::{ReadError, WriteError};

/// Magic u64 at the start and end of every container.
pub const MAGIC: u64 = 168_942_106;

/// Fixed ASCII identifier following the leading magic.
pub const IDENTIFIER: &str = "RenderDragon.CompiledMaterialDefinition";

/// Material name whose container omits the uniform-override table.
pub const BUILTINS_NAME: &str = "Core/Builtins";

pub(crate) fn read_bool<R: Read + Seek>(reader: &mut R) -> Result<bool, ReadError> {
    Ok(reader.read_le::<u8>()? != 0)
}

pub(crate) fn read_bytes<R: Read + Seek>(reader: &mut R) -> Result<Vec<u8>, ReadError> {
    let count = reader.read_le::<u32>()? as usize;
    let bytes = Vec::<u8>::read_le_args(reader, VecArgs { count, inner: () })?;
    Ok(bytes)
}

pub(crate) fn read_string<R: Read + Seek>(reader: &mut R) -> Result<String, ReadError> {
    Ok(String::from_utf8(read_bytes(reader)?)?)
}

pub(crate) fn read_f32s<R: Read + Seek>(
    reader: &mut R,
    count: usize,
) -> Result<Vec<f32>, ReadError> {
    let values = Vec::<f32>::read_le_args(reader, VecArgs { count, inner: () })?;
    Ok(values)
}

pub(crate) fn write_bool<W: Write + Seek>(writer: &mut W, value: bool) -> Result<(), WriteError> {
    u8::from(value).write_le(writer)?;
    Ok(())
}

pub(crate) fn write_bytes<W: Write + Seek>(writer: &mut W, bytes: &[u8]) -> Result<(), WriteError> {
    let count = u32::try_from(bytes.len())?;
    count.write_le(writer)?;
    writer.write_all(bytes).map_err(WriteError::Io)?;
    Ok(())
}

pub(crate) fn write_string<W: Write + Seek>(writer: &mut W, value: &str) -> Result<(), WriteError> {
    write_bytes(writer, value.as_bytes())
}

/// u16 count followed by (string, string) pairs, preserving order.
pub(crate) fn read_string_map<R: Read + Seek>(
    reader: &mut R,
) -> Result<indexmap::IndexMap<String, String>, ReadError> {
    let count = reader.read_le::<u16>()?;
    let mut map = indexmap::IndexMap::with_capacity(count as usize);
    for _ in 0..count {
        let key = read_string(reader)?;
        let value = read_string(reader)?;
        map.insert(key, value);
    }
    Ok(map)
}

pub(crate) fn write_string_map<W: Write + Seek>(
    writer: &mut W,
    map: &indexmap::IndexMap<String, String>,
) -> Result<(), WriteError> {
    u16::try_from(map.len())?.write_le(writer)?;
    for (key, value) in map {
        write_string(writer, key)?;
        write_string(writer, value)?;
    }
    Ok(())
}

#[cfg(test)]
#[macro_export]
macro_rules! assert_hex_eq {
    ($a:expr, $b:expr) => {
        pretty_assertions::assert_str_eq!(hex::encode($a), hex::encode($b))
    };
}
