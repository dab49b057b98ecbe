//! The bgfx-style shader wrapper embedded in each shader definition.
//!
//! The wrapper is serialized into a u32 length-prefixed byte array inside
//! its [ShaderDefinition](crate::pass::ShaderDefinition), so readers detect
//! the optional trailing attribute block by the bytes remaining in that
//! array.
use std::io::{Cursor, Read, Seek, Write};

use binrw::{BinReaderExt, BinWrite};

use crate::enums::{ShaderCodePlatform, ShaderStage};
use crate::error::{ReadError, WriteError};
use crate::{read_bytes, read_string, write_bytes, write_string};

/// The three-letter ASCII tag leading a wrapper blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BgfxTag {
    Vertex,
    Fragment,
    Compute,
}

impl BgfxTag {
    pub fn bytes(&self) -> [u8; 3] {
        match self {
            Self::Vertex => *b"VSH",
            Self::Fragment => *b"FSH",
            Self::Compute => *b"CSH",
        }
    }

    /// The wrapper format version paired with this tag.
    pub fn version(&self) -> u8 {
        match self {
            Self::Vertex | Self::Fragment => 5,
            Self::Compute => 3,
        }
    }

    pub fn from_stage(stage: ShaderStage) -> Option<Self> {
        match stage {
            ShaderStage::Vertex => Some(Self::Vertex),
            ShaderStage::Fragment => Some(Self::Fragment),
            ShaderStage::Compute => Some(Self::Compute),
            ShaderStage::Unknown => None,
        }
    }
}

/// Per-blob uniform metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BgfxUniform {
    pub name: String,
    pub type_bits: u8,
    pub count: u8,
    pub reg_index: u16,
    pub reg_count: u16,
}

/// One compiled shader blob plus its uniform and attribute metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct BgfxShader {
    pub tag: BgfxTag,
    pub hash: u64,
    pub uniforms: Vec<BgfxUniform>,
    /// Compute workgroup dimensions, carried only for Metal compute blobs.
    pub group_size: Option<[u16; 3]>,
    pub shader_bytes: Vec<u8>,
    pub attributes: Vec<u16>,
    /// `-1` when the trailing attribute block is absent.
    pub attributes_size: i16,
}

fn has_group_size(platform: ShaderCodePlatform, stage: ShaderStage) -> bool {
    platform == ShaderCodePlatform::Metal && stage == ShaderStage::Compute
}

impl BgfxShader {
    /// A wrapper around freshly compiled bytecode with no metadata.
    pub fn from_object(tag: BgfxTag, object: Vec<u8>) -> Self {
        Self {
            tag,
            hash: 0,
            uniforms: Vec::new(),
            group_size: None,
            shader_bytes: object,
            attributes: Vec::new(),
            attributes_size: -1,
        }
    }

    pub fn from_bytes(
        bytes: &[u8],
        platform: ShaderCodePlatform,
        stage: ShaderStage,
    ) -> Result<Self, ReadError> {
        let total = bytes.len() as u64;
        let mut reader = Cursor::new(bytes);
        Self::read(&mut reader, total, platform, stage)
    }

    fn read<R: Read + Seek>(
        reader: &mut R,
        total: u64,
        platform: ShaderCodePlatform,
        stage: ShaderStage,
    ) -> Result<Self, ReadError> {
        let tag_bytes = reader.read_le::<[u8; 3]>()?;
        let tag = match &tag_bytes {
            b"VSH" => BgfxTag::Vertex,
            b"FSH" => BgfxTag::Fragment,
            b"CSH" => BgfxTag::Compute,
            _ => {
                return Err(ReadError::Format(format!(
                    "invalid shader wrapper tag {tag_bytes:?}"
                )))
            }
        };
        let version = reader.read_le::<u8>()?;
        if version != tag.version() {
            return Err(ReadError::Format(format!(
                "shader wrapper version {version} does not match tag version {}",
                tag.version()
            )));
        }

        let hash = reader.read_le::<u64>()?;

        let uniform_count = reader.read_le::<u16>()?;
        let mut uniforms = Vec::with_capacity(uniform_count as usize);
        for _ in 0..uniform_count {
            uniforms.push(BgfxUniform {
                name: read_string(reader)?,
                type_bits: reader.read_le::<u8>()?,
                count: reader.read_le::<u8>()?,
                reg_index: reader.read_le::<u16>()?,
                reg_count: reader.read_le::<u16>()?,
            });
        }

        let group_size = if has_group_size(platform, stage) {
            Some(reader.read_le::<[u16; 3]>()?)
        } else {
            None
        };

        let shader_bytes = read_bytes(reader)?;

        let padding = reader.read_le::<u8>()?;
        if padding != 0 {
            return Err(ReadError::Format(format!(
                "shader wrapper padding byte is {padding}, expected 0"
            )));
        }

        // The attribute block has no presence byte of its own.
        let (attributes, attributes_size) = if reader.stream_position()? < total {
            let attribute_count = reader.read_le::<u8>()?;
            let mut attributes = Vec::with_capacity(attribute_count as usize);
            for _ in 0..attribute_count {
                attributes.push(reader.read_le::<u16>()?);
            }
            (attributes, reader.read_le::<i16>()?)
        } else {
            (Vec::new(), -1)
        };

        Ok(Self {
            tag,
            hash,
            uniforms,
            group_size,
            shader_bytes,
            attributes,
            attributes_size,
        })
    }

    pub fn to_bytes(
        &self,
        platform: ShaderCodePlatform,
        stage: ShaderStage,
    ) -> Result<Vec<u8>, WriteError> {
        let mut writer = Cursor::new(Vec::new());
        self.write(&mut writer, platform, stage)?;
        Ok(writer.into_inner())
    }

    fn write<W: Write + Seek>(
        &self,
        writer: &mut W,
        platform: ShaderCodePlatform,
        stage: ShaderStage,
    ) -> Result<(), WriteError> {
        self.tag.bytes().write_le(writer)?;
        self.tag.version().write_le(writer)?;
        self.hash.write_le(writer)?;

        u16::try_from(self.uniforms.len())?.write_le(writer)?;
        for uniform in &self.uniforms {
            write_string(writer, &uniform.name)?;
            uniform.type_bits.write_le(writer)?;
            uniform.count.write_le(writer)?;
            uniform.reg_index.write_le(writer)?;
            uniform.reg_count.write_le(writer)?;
        }

        if has_group_size(platform, stage) {
            let group_size = self.group_size.ok_or_else(|| {
                WriteError::Format("Metal compute shader is missing its group size".to_string())
            })?;
            group_size.write_le(writer)?;
        }

        write_bytes(writer, &self.shader_bytes)?;
        0u8.write_le(writer)?;

        if self.attributes_size != -1 {
            u8::try_from(self.attributes.len())?.write_le(writer)?;
            for attribute in &self.attributes {
                attribute.write_le(writer)?;
            }
            self.attributes_size.write_le(writer)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::assert_hex_eq;
    use hexlit::hex;

    fn sample() -> BgfxShader {
        BgfxShader {
            tag: BgfxTag::Fragment,
            hash: 0xDEADBEEF_u64,
            uniforms: vec![BgfxUniform {
                name: "u_lightDir".to_string(),
                type_bits: 2,
                count: 1,
                reg_index: 4,
                reg_count: 1,
            }],
            group_size: None,
            shader_bytes: b"compiled".to_vec(),
            attributes: vec![1, 5, 9],
            attributes_size: 48,
        }
    }

    #[test]
    fn wrapper_byte_layout() {
        let shader = BgfxShader {
            tag: BgfxTag::Fragment,
            hash: 0x0102030405060708,
            uniforms: Vec::new(),
            group_size: None,
            shader_bytes: b"AB".to_vec(),
            attributes: Vec::new(),
            attributes_size: -1,
        };
        let bytes = shader
            .to_bytes(ShaderCodePlatform::Vulkan, ShaderStage::Fragment)
            .unwrap();
        let expected = hex!(
            46534805 // "FSH", version 5
            0807060504030201
            0000 // no uniforms
            02000000 4142
            00 // padding
        );
        assert_hex_eq!(expected, bytes);
    }

    #[test]
    fn wrapper_round_trip() {
        let shader = sample();
        let bytes = shader
            .to_bytes(ShaderCodePlatform::Vulkan, ShaderStage::Fragment)
            .unwrap();
        let read_back =
            BgfxShader::from_bytes(&bytes, ShaderCodePlatform::Vulkan, ShaderStage::Fragment)
                .unwrap();
        assert_eq!(shader, read_back);
        assert_eq!(
            bytes,
            read_back
                .to_bytes(ShaderCodePlatform::Vulkan, ShaderStage::Fragment)
                .unwrap()
        );
    }

    #[test]
    fn attribute_block_absent_when_size_is_minus_one() {
        let mut shader = sample();
        shader.attributes = Vec::new();
        shader.attributes_size = -1;
        let bytes = shader
            .to_bytes(ShaderCodePlatform::Vulkan, ShaderStage::Fragment)
            .unwrap();
        // tag + version + hash + count + uniform + shader array + padding.
        assert_eq!(*bytes.last().unwrap(), 0);
        let read_back =
            BgfxShader::from_bytes(&bytes, ShaderCodePlatform::Vulkan, ShaderStage::Fragment)
                .unwrap();
        assert_eq!(-1, read_back.attributes_size);
        assert!(read_back.attributes.is_empty());
    }

    #[test]
    fn metal_compute_carries_group_size() {
        let mut shader = sample();
        shader.tag = BgfxTag::Compute;
        shader.group_size = Some([8, 8, 1]);
        let bytes = shader
            .to_bytes(ShaderCodePlatform::Metal, ShaderStage::Compute)
            .unwrap();
        let read_back =
            BgfxShader::from_bytes(&bytes, ShaderCodePlatform::Metal, ShaderStage::Compute)
                .unwrap();
        assert_eq!(Some([8, 8, 1]), read_back.group_size);

        // The same blob parsed for a non-Metal platform has no group size.
        let mut shader = sample();
        shader.tag = BgfxTag::Compute;
        let bytes = shader
            .to_bytes(ShaderCodePlatform::Vulkan, ShaderStage::Compute)
            .unwrap();
        let read_back =
            BgfxShader::from_bytes(&bytes, ShaderCodePlatform::Vulkan, ShaderStage::Compute)
                .unwrap();
        assert_eq!(None, read_back.group_size);
    }

    #[test]
    fn tag_and_version_must_agree() {
        let shader = sample();
        let mut bytes = shader
            .to_bytes(ShaderCodePlatform::Vulkan, ShaderStage::Fragment)
            .unwrap();
        bytes[3] = 3;
        assert!(matches!(
            BgfxShader::from_bytes(&bytes, ShaderCodePlatform::Vulkan, ShaderStage::Fragment),
            Err(ReadError::Format(_))
        ));

        bytes[0] = b'X';
        assert!(BgfxShader::from_bytes(
            &bytes,
            ShaderCodePlatform::Vulkan,
            ShaderStage::Fragment
        )
        .is_err());
    }
}
