//! The root material container and its buffer and uniform tables.
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;

use binrw::{BinReaderExt, BinWrite};
use indexmap::IndexMap;
use log::trace;

use crate::encryption::{self, EncryptionVariant};
use crate::enums::{BufferAccess, BufferType, Precision, SamplerFilter, SamplerWrap, UniformType};
use crate::error::{EncryptionError, ReadError, WriteError};
use crate::pass::Pass;
use crate::{
    read_bool, read_f32s, read_string, read_string_map, write_bool, write_string,
    write_string_map, BUILTINS_NAME, IDENTIFIER, MAGIC,
};

/// Texture sampling state packed into a single byte on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerState {
    pub filter: SamplerFilter,
    pub wrap: SamplerWrap,
}

impl SamplerState {
    fn from_bits(bits: u8) -> Result<Self, ReadError> {
        if bits > 3 {
            return Err(ReadError::Format(format!(
                "sampler state {bits:#04x} has bits outside the filter and wrap fields"
            )));
        }
        Ok(Self {
            filter: if bits & 1 == 0 {
                SamplerFilter::Point
            } else {
                SamplerFilter::Bilinear
            },
            wrap: if bits & 2 == 0 {
                SamplerWrap::Clamp
            } else {
                SamplerWrap::Repeat
            },
        })
    }

    fn bits(&self) -> u8 {
        self.filter as u8 | (self.wrap as u8) << 1
    }
}

/// Structured-buffer layout details for `StructBuffer` bindings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomTypeInfo {
    pub struct_name: String,
    pub size: u64,
}

/// A GPU resource binding declared by the material.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialBuffer {
    pub name: String,
    pub reg1: u16,
    pub reg2: u8,
    pub access: BufferAccess,
    pub precision: Precision,
    pub unordered_access: bool,
    pub buffer_type: BufferType,
    pub texture_format: String,
    /// Observed to always hold 1, but preserved verbatim either way.
    pub always_one: u64,
    pub sampler_state: Option<SamplerState>,
    pub default_texture: Option<String>,
    pub texture_path: Option<String>,
    pub custom_type_info: Option<CustomTypeInfo>,
}

impl MaterialBuffer {
    fn read<R: Read + Seek>(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Self {
            name: read_string(reader)?,
            reg1: reader.read_le()?,
            reg2: reader.read_le()?,
            access: reader.read_le()?,
            precision: reader.read_le()?,
            unordered_access: read_bool(reader)?,
            buffer_type: reader.read_le()?,
            texture_format: read_string(reader)?,
            always_one: reader.read_le()?,
            sampler_state: if read_bool(reader)? {
                Some(SamplerState::from_bits(reader.read_le()?)?)
            } else {
                None
            },
            default_texture: if read_bool(reader)? {
                Some(read_string(reader)?)
            } else {
                None
            },
            texture_path: if read_bool(reader)? {
                Some(read_string(reader)?)
            } else {
                None
            },
            custom_type_info: if read_bool(reader)? {
                Some(CustomTypeInfo {
                    struct_name: read_string(reader)?,
                    size: reader.read_le()?,
                })
            } else {
                None
            },
        })
    }

    fn write<W: Write + Seek>(&self, writer: &mut W) -> Result<(), WriteError> {
        write_string(writer, &self.name)?;
        self.reg1.write_le(writer)?;
        self.reg2.write_le(writer)?;
        self.access.write_le(writer)?;
        self.precision.write_le(writer)?;
        write_bool(writer, self.unordered_access)?;
        self.buffer_type.write_le(writer)?;
        write_string(writer, &self.texture_format)?;
        self.always_one.write_le(writer)?;

        write_bool(writer, self.sampler_state.is_some())?;
        if let Some(state) = self.sampler_state {
            state.bits().write_le(writer)?;
        }
        write_bool(writer, self.default_texture.is_some())?;
        if let Some(texture) = &self.default_texture {
            write_string(writer, texture)?;
        }
        write_bool(writer, self.texture_path.is_some())?;
        if let Some(path) = &self.texture_path {
            write_string(writer, path)?;
        }
        write_bool(writer, self.custom_type_info.is_some())?;
        if let Some(info) = &self.custom_type_info {
            write_string(writer, &info.struct_name)?;
            info.size.write_le(writer)?;
        }
        Ok(())
    }
}

/// A material-level uniform parameter.
///
/// External uniforms carry no count and no default value on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct Uniform {
    pub name: String,
    pub uniform_type: UniformType,
    pub count: u32,
    pub default_value: Option<Vec<f32>>,
}

impl Uniform {
    fn read<R: Read + Seek>(reader: &mut R) -> Result<Self, ReadError> {
        let name = read_string(reader)?;
        let uniform_type: UniformType = reader.read_le()?;

        let (count, default_value) = match uniform_type.element_count() {
            Some(elements) => {
                let count = reader.read_le::<u32>()?;
                let default_value = if read_bool(reader)? {
                    Some(read_f32s(reader, elements)?)
                } else {
                    None
                };
                (count, default_value)
            }
            None => (0, None),
        };

        Ok(Self {
            name,
            uniform_type,
            count,
            default_value,
        })
    }

    fn write<W: Write + Seek>(&self, writer: &mut W) -> Result<(), WriteError> {
        write_string(writer, &self.name)?;
        self.uniform_type.write_le(writer)?;

        if let Some(elements) = self.uniform_type.element_count() {
            self.count.write_le(writer)?;
            write_bool(writer, self.default_value.is_some())?;
            if let Some(value) = &self.default_value {
                if value.len() != elements {
                    return Err(WriteError::Format(format!(
                        "uniform {:?} default has {} elements, expected {elements}",
                        self.name,
                        value.len()
                    )));
                }
                value.write_le(writer)?;
            }
        }
        Ok(())
    }
}

/// A parsed `RenderDragon.CompiledMaterialDefinition` container.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledMaterialDefinition {
    pub version: u64,
    pub name: String,
    pub encryption: EncryptionVariant,
    pub parent: Option<String>,
    pub buffers: Vec<MaterialBuffer>,
    pub uniforms: Vec<Uniform>,
    /// Absent from the wire only for `Core/Builtins`.
    pub uniform_overrides: IndexMap<String, String>,
    pub passes: Vec<Pass>,
    pub encryption_key: Option<Vec<u8>>,
    pub encryption_nonce: Option<Vec<u8>>,
}

impl CompiledMaterialDefinition {
    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<Self, ReadError> {
        let magic = reader.read_le::<u64>()?;
        if magic != MAGIC {
            return Err(ReadError::Format(format!(
                "leading magic {magic:#x} does not match {MAGIC:#x}"
            )));
        }

        let identifier = read_string(reader)?;
        if identifier != IDENTIFIER {
            return Err(ReadError::Format(format!(
                "unexpected identifier {identifier:?}"
            )));
        }

        let version = reader.read_le::<u64>()?;
        if !(22..=25).contains(&version) {
            return Err(ReadError::UnsupportedVersion(version));
        }

        let encryption = EncryptionVariant::read(reader)?;
        match encryption {
            EncryptionVariant::None => Self::read_body(reader, version, encryption, None, None),
            EncryptionVariant::SimplePassphrase => {
                let key = crate::read_bytes(reader)?;
                let nonce = crate::read_bytes(reader)?;
                let ciphertext = crate::read_bytes(reader)?;
                trace!(
                    "decrypting {} body bytes with a {}-byte key",
                    ciphertext.len(),
                    key.len()
                );
                let body = encryption::decrypt(&key, &nonce, &ciphertext)?;
                let mut body_reader = Cursor::new(body);
                Self::read_body(
                    &mut body_reader,
                    version,
                    encryption,
                    Some(key),
                    Some(nonce),
                )
            }
            EncryptionVariant::KeyPair => Err(EncryptionError::KeyPairUnsupported.into()),
        }
    }

    fn read_body<R: Read + Seek>(
        reader: &mut R,
        version: u64,
        encryption: EncryptionVariant,
        encryption_key: Option<Vec<u8>>,
        encryption_nonce: Option<Vec<u8>>,
    ) -> Result<Self, ReadError> {
        let name = read_string(reader)?;

        let parent = if read_bool(reader)? {
            Some(read_string(reader)?)
        } else {
            None
        };

        let buffer_count = reader.read_le::<u8>()?;
        let mut buffers = Vec::with_capacity(buffer_count as usize);
        for _ in 0..buffer_count {
            buffers.push(MaterialBuffer::read(reader)?);
        }

        let uniform_count = reader.read_le::<u16>()?;
        let mut uniforms = Vec::with_capacity(uniform_count as usize);
        for _ in 0..uniform_count {
            uniforms.push(Uniform::read(reader)?);
        }

        let uniform_overrides = if name != BUILTINS_NAME {
            read_string_map(reader)?
        } else {
            IndexMap::new()
        };

        let pass_count = reader.read_le::<u16>()?;
        let mut passes = Vec::with_capacity(pass_count as usize);
        for _ in 0..pass_count {
            passes.push(Pass::read(reader, version)?);
        }

        let trailing = reader.read_le::<u64>()?;
        if trailing != MAGIC {
            return Err(ReadError::Format(format!(
                "trailing magic {trailing:#x} does not match {MAGIC:#x}"
            )));
        }

        Ok(Self {
            version,
            name,
            encryption,
            parent,
            buffers,
            uniforms,
            uniform_overrides,
            passes,
            encryption_key,
            encryption_nonce,
        })
    }

    pub fn write<W: Write + Seek>(&self, writer: &mut W) -> Result<(), WriteError> {
        if !(22..=25).contains(&self.version) {
            return Err(WriteError::UnsupportedVersion(self.version));
        }

        MAGIC.write_le(writer)?;
        write_string(writer, IDENTIFIER)?;
        self.version.write_le(writer)?;
        self.encryption.write(writer)?;

        match self.encryption {
            EncryptionVariant::None => self.write_body(writer),
            EncryptionVariant::SimplePassphrase => {
                let key = self
                    .encryption_key
                    .as_deref()
                    .ok_or(EncryptionError::MissingSecret("key"))?;
                let nonce = self
                    .encryption_nonce
                    .as_deref()
                    .ok_or(EncryptionError::MissingSecret("nonce"))?;

                let mut body = Cursor::new(Vec::new());
                self.write_body(&mut body)?;
                let ciphertext = encryption::encrypt(key, nonce, &body.into_inner())?;

                crate::write_bytes(writer, key)?;
                crate::write_bytes(writer, nonce)?;
                crate::write_bytes(writer, &ciphertext)?;
                Ok(())
            }
            EncryptionVariant::KeyPair => Err(EncryptionError::KeyPairUnsupported.into()),
        }
    }

    fn write_body<W: Write + Seek>(&self, writer: &mut W) -> Result<(), WriteError> {
        write_string(writer, &self.name)?;

        write_bool(writer, self.parent.is_some())?;
        if let Some(parent) = &self.parent {
            write_string(writer, parent)?;
        }

        u8::try_from(self.buffers.len())?.write_le(writer)?;
        for buffer in &self.buffers {
            buffer.write(writer)?;
        }

        u16::try_from(self.uniforms.len())?.write_le(writer)?;
        for uniform in &self.uniforms {
            uniform.write(writer)?;
        }

        if self.name != BUILTINS_NAME {
            write_string_map(writer, &self.uniform_overrides)?;
        }

        u16::try_from(self.passes.len())?.write_le(writer)?;
        for pass in &self.passes {
            pass.write(writer, self.version)?;
        }

        MAGIC.write_le(writer)?;
        Ok(())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ReadError> {
        Self::read(&mut Cursor::new(bytes))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ReadError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, WriteError> {
        let mut writer = Cursor::new(Vec::new());
        self.write(&mut writer)?;
        Ok(writer.into_inner())
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), WriteError> {
        std::fs::write(path, self.to_bytes()?).map_err(WriteError::Io)
    }
}
