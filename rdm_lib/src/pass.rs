//! Render passes, their variants, and per-variant shader definitions.
use std::collections::BTreeMap;
use std::io::{Read, Seek, Write};

use binrw::{BinReaderExt, BinWrite};
use indexmap::IndexMap;
use log::warn;

use crate::bgfx::BgfxShader;
use crate::enums::{
    platform_count, wire_index, wire_platforms, BlendMode, InputSemantic, InputType, Interpolation,
    Precision, ShaderCodePlatform, ShaderStage,
};
use crate::error::{ReadError, WriteError};
use crate::{
    read_bool, read_bytes, read_string, read_string_map, write_bool, write_bytes, write_string,
    write_string_map,
};

/// Which platforms a pass is built for.
///
/// The on-disk form is a bit-string whose rightmost character is platform
/// wire index 0, so shorter strings pad with leading zeros like a binary
/// numeral. Anything other than `0` and `1` degrades the whole set to
/// all-on.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SupportedPlatforms {
    platforms: BTreeMap<ShaderCodePlatform, bool>,
}

impl SupportedPlatforms {
    /// Every platform addressable in `version` switched on.
    pub fn all(version: u64) -> Self {
        Self {
            platforms: wire_platforms(version).iter().map(|p| (*p, true)).collect(),
        }
    }

    pub fn is_supported(&self, platform: ShaderCodePlatform) -> bool {
        self.platforms.get(&platform).copied().unwrap_or(false)
    }

    pub fn set(&mut self, platform: ShaderCodePlatform, supported: bool) {
        self.platforms.insert(platform, supported);
    }

    pub fn read<R: Read + Seek>(reader: &mut R, version: u64) -> Result<Self, ReadError> {
        let bits = read_string(reader)?;
        let expected = platform_count(version);
        if bits.len() != expected {
            warn!(
                "supported-platforms bitstring has {} characters, expected {expected}",
                bits.len()
            );
        }
        if bits.bytes().any(|b| b != b'0' && b != b'1') {
            warn!("supported-platforms bitstring {bits:?} is malformed, enabling all platforms");
            return Ok(Self::all(version));
        }

        let mut platforms = BTreeMap::new();
        let bytes = bits.as_bytes();
        for (index, platform) in wire_platforms(version).iter().enumerate() {
            // Rightmost character is index 0; missing high characters are 0.
            let supported = bytes
                .len()
                .checked_sub(1 + index)
                .map(|pos| bytes[pos] == b'1')
                .unwrap_or(false);
            platforms.insert(*platform, supported);
        }
        Ok(Self { platforms })
    }

    pub fn write<W: Write + Seek>(&self, writer: &mut W, version: u64) -> Result<(), WriteError> {
        let bits: String = wire_platforms(version)
            .iter()
            .rev()
            .map(|p| if self.is_supported(*p) { '1' } else { '0' })
            .collect();
        write_string(writer, &bits)
    }
}

/// Vertex attribute or varying metadata attached to a shader definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderInput {
    pub name: String,
    pub input_type: InputType,
    pub semantic: InputSemantic,
    pub semantic_sub_index: u8,
    pub per_instance: bool,
    pub precision: Option<Precision>,
    pub interpolation: Option<Interpolation>,
}

impl ShaderInput {
    fn read<R: Read + Seek>(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Self {
            name: read_string(reader)?,
            input_type: reader.read_le()?,
            semantic: reader.read_le()?,
            semantic_sub_index: reader.read_le()?,
            per_instance: read_bool(reader)?,
            precision: if read_bool(reader)? {
                Some(reader.read_le()?)
            } else {
                None
            },
            interpolation: if read_bool(reader)? {
                Some(reader.read_le()?)
            } else {
                None
            },
        })
    }

    fn write<W: Write + Seek>(&self, writer: &mut W) -> Result<(), WriteError> {
        write_string(writer, &self.name)?;
        self.input_type.write_le(writer)?;
        self.semantic.write_le(writer)?;
        self.semantic_sub_index.write_le(writer)?;
        write_bool(writer, self.per_instance)?;
        write_bool(writer, self.precision.is_some())?;
        if let Some(precision) = self.precision {
            precision.write_le(writer)?;
        }
        write_bool(writer, self.interpolation.is_some())?;
        if let Some(interpolation) = self.interpolation {
            interpolation.write_le(writer)?;
        }
        Ok(())
    }
}

/// One compiled shader for a (platform, stage) pair.
///
/// Stage and platform are stored twice on disk, once by name and once by
/// index. Readers reject blobs where the two disagree.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderDefinition {
    pub stage: ShaderStage,
    pub platform: ShaderCodePlatform,
    pub inputs: Vec<ShaderInput>,
    pub hash: u64,
    pub shader: BgfxShader,
}

impl ShaderDefinition {
    pub(crate) fn read<R: Read + Seek>(reader: &mut R, version: u64) -> Result<Self, ReadError> {
        let stage_name = read_string(reader)?;
        let stage_index = reader.read_le::<u8>()?;
        let stage = ShaderStage::from_name(&stage_name)?;
        if stage as u8 != stage_index {
            return Err(ReadError::Format(format!(
                "stage name {stage_name:?} does not match stage index {stage_index}"
            )));
        }

        let platform_name = read_string(reader)?;
        let platform_index = reader.read_le::<u8>()?;
        let platform = ShaderCodePlatform::from_name(&platform_name)?;
        let expected_index = wire_index(platform, version)?;
        if expected_index != platform_index {
            return Err(ReadError::Format(format!(
                "platform name {platform_name:?} does not match platform index {platform_index}"
            )));
        }

        let input_count = reader.read_le::<u16>()?;
        let mut inputs = Vec::with_capacity(input_count as usize);
        for _ in 0..input_count {
            inputs.push(ShaderInput::read(reader)?);
        }

        let hash = reader.read_le::<u64>()?;
        let blob = read_bytes(reader)?;
        let shader = BgfxShader::from_bytes(&blob, platform, stage)?;

        Ok(Self {
            stage,
            platform,
            inputs,
            hash,
            shader,
        })
    }

    pub(crate) fn write<W: Write + Seek>(
        &self,
        writer: &mut W,
        version: u64,
    ) -> Result<(), WriteError> {
        write_string(writer, self.stage.name())?;
        self.stage.write_le(writer)?;

        // Re-derive the index so ESSL_300 canonicalizes for version 25.
        let index = wire_index(self.platform, version)?;
        let platform = crate::enums::platform_from_wire_index(index, version)
            .map_err(WriteError::Platform)?;
        write_string(writer, platform.name())?;
        index.write_le(writer)?;

        u16::try_from(self.inputs.len())?.write_le(writer)?;
        for input in &self.inputs {
            input.write(writer)?;
        }

        self.hash.write_le(writer)?;
        write_bytes(writer, &self.shader.to_bytes(self.platform, self.stage)?)?;
        Ok(())
    }
}

/// One flag combination of a pass.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Variant {
    pub is_supported: bool,
    pub flags: IndexMap<String, String>,
    pub shaders: Vec<ShaderDefinition>,
}

impl Variant {
    pub(crate) fn read<R: Read + Seek>(reader: &mut R, version: u64) -> Result<Self, ReadError> {
        let is_supported = read_bool(reader)?;
        let flags = read_string_map(reader)?;
        let shader_count = reader.read_le::<u16>()?;
        let mut shaders = Vec::with_capacity(shader_count as usize);
        for _ in 0..shader_count {
            shaders.push(ShaderDefinition::read(reader, version)?);
        }
        Ok(Self {
            is_supported,
            flags,
            shaders,
        })
    }

    pub(crate) fn write<W: Write + Seek>(
        &self,
        writer: &mut W,
        version: u64,
    ) -> Result<(), WriteError> {
        write_bool(writer, self.is_supported)?;
        write_string_map(writer, &self.flags)?;
        u16::try_from(self.shaders.len())?.write_le(writer)?;
        for shader in &self.shaders {
            shader.write(writer, version)?;
        }
        Ok(())
    }
}

/// A render step holding many flag variants and pass-level defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Pass {
    pub name: String,
    pub supported_platforms: SupportedPlatforms,
    pub fallback_pass: String,
    pub default_blend_mode: BlendMode,
    pub default_variant: IndexMap<String, String>,
    /// Only on the wire for version 23 and later.
    pub framebuffer_binding: u32,
    pub variants: Vec<Variant>,
}

impl Pass {
    pub(crate) fn read<R: Read + Seek>(reader: &mut R, version: u64) -> Result<Self, ReadError> {
        let name = read_string(reader)?;
        let supported_platforms = SupportedPlatforms::read(reader, version)?;
        let fallback_pass = read_string(reader)?;

        let default_blend_mode = if read_bool(reader)? {
            BlendMode::from_wire_value(reader.read_le::<u16>()?)?
        } else {
            BlendMode::Unspecified
        };

        let default_variant = read_string_map(reader)?;

        let framebuffer_binding = if version >= 23 {
            reader.read_le::<u32>()?
        } else {
            0
        };

        let variant_count = reader.read_le::<u16>()?;
        let mut variants = Vec::with_capacity(variant_count as usize);
        for _ in 0..variant_count {
            variants.push(Variant::read(reader, version)?);
        }

        Ok(Self {
            name,
            supported_platforms,
            fallback_pass,
            default_blend_mode,
            default_variant,
            framebuffer_binding,
            variants,
        })
    }

    pub(crate) fn write<W: Write + Seek>(
        &self,
        writer: &mut W,
        version: u64,
    ) -> Result<(), WriteError> {
        write_string(writer, &self.name)?;
        self.supported_platforms.write(writer, version)?;
        write_string(writer, &self.fallback_pass)?;

        match self.default_blend_mode.wire_value() {
            Some(value) => {
                write_bool(writer, true)?;
                value.write_le(writer)?;
            }
            None => write_bool(writer, false)?,
        }

        write_string_map(writer, &self.default_variant)?;

        if version >= 23 {
            self.framebuffer_binding.write_le(writer)?;
        }

        u16::try_from(self.variants.len())?.write_le(writer)?;
        for variant in &self.variants {
            variant.write(writer, version)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    use crate::bgfx::BgfxTag;

    fn shader_definition(platform: ShaderCodePlatform, stage: ShaderStage) -> ShaderDefinition {
        let tag = BgfxTag::from_stage(stage).unwrap();
        ShaderDefinition {
            stage,
            platform,
            inputs: vec![ShaderInput {
                name: "position".to_string(),
                input_type: InputType::Vec3,
                semantic: InputSemantic::Position,
                semantic_sub_index: 0,
                per_instance: false,
                precision: Some(Precision::Highp),
                interpolation: None,
            }],
            hash: 7,
            shader: BgfxShader::from_object(tag, b"code".to_vec()),
        }
    }

    fn round_trip_pass(pass: &Pass, version: u64) -> (Vec<u8>, Pass) {
        let mut writer = Cursor::new(Vec::new());
        pass.write(&mut writer, version).unwrap();
        let bytes = writer.into_inner();
        let read_back = Pass::read(&mut Cursor::new(&bytes), version).unwrap();
        (bytes, read_back)
    }

    #[test]
    fn bitstring_rightmost_is_platform_zero() {
        let mut writer = Cursor::new(Vec::new());
        let mut platforms = SupportedPlatforms::default();
        platforms.set(ShaderCodePlatform::Direct3DSm40, true);
        platforms.write(&mut writer, 25).unwrap();

        let bytes = writer.into_inner();
        // u32 length 13 then twelve '0' and a final '1'.
        assert_eq!(13, u32::from_le_bytes(bytes[..4].try_into().unwrap()));
        assert_eq!(b"0000000000001", &bytes[4..]);
    }

    #[test]
    fn bitstring_degrades_to_all_on() {
        let mut writer = Cursor::new(Vec::new());
        write_string(&mut writer, "00000000000x1").unwrap();
        let platforms =
            SupportedPlatforms::read(&mut Cursor::new(writer.into_inner()), 25).unwrap();
        assert_eq!(SupportedPlatforms::all(25), platforms);
    }

    #[test]
    fn bitstring_pads_and_truncates() {
        // Short strings pad with leading zeros.
        let mut writer = Cursor::new(Vec::new());
        write_string(&mut writer, "11").unwrap();
        let platforms =
            SupportedPlatforms::read(&mut Cursor::new(writer.into_inner()), 25).unwrap();
        assert!(platforms.is_supported(ShaderCodePlatform::Direct3DSm40));
        assert!(platforms.is_supported(ShaderCodePlatform::Direct3DSm50));
        assert!(!platforms.is_supported(ShaderCodePlatform::Vulkan));

        // Long strings drop their leading characters.
        let mut writer = Cursor::new(Vec::new());
        write_string(&mut writer, "111110000000000001").unwrap();
        let platforms =
            SupportedPlatforms::read(&mut Cursor::new(writer.into_inner()), 25).unwrap();
        assert!(platforms.is_supported(ShaderCodePlatform::Direct3DSm40));
        assert!(!platforms.is_supported(ShaderCodePlatform::Pssl));
    }

    #[test]
    fn shader_definition_round_trip() {
        let definition = shader_definition(ShaderCodePlatform::Essl310, ShaderStage::Vertex);
        let mut writer = Cursor::new(Vec::new());
        definition.write(&mut writer, 24).unwrap();
        let bytes = writer.into_inner();
        let read_back = ShaderDefinition::read(&mut Cursor::new(&bytes), 24).unwrap();
        assert_eq!(definition, read_back);
    }

    #[test]
    fn essl_300_canonicalizes_in_v25() {
        let definition = shader_definition(ShaderCodePlatform::Essl300, ShaderStage::Fragment);

        // Version 24 keeps the name and uses index 8.
        let mut writer = Cursor::new(Vec::new());
        definition.write(&mut writer, 24).unwrap();
        let bytes = writer.into_inner();
        let read_back = ShaderDefinition::read(&mut Cursor::new(&bytes), 24).unwrap();
        assert_eq!(ShaderCodePlatform::Essl300, read_back.platform);

        // Version 25 emits ESSL_310 at the same index.
        let mut writer = Cursor::new(Vec::new());
        definition.write(&mut writer, 25).unwrap();
        let bytes = writer.into_inner();
        let read_back = ShaderDefinition::read(&mut Cursor::new(&bytes), 25).unwrap();
        assert_eq!(ShaderCodePlatform::Essl310, read_back.platform);
    }

    #[test]
    fn stage_index_mismatch_is_rejected() {
        let definition = shader_definition(ShaderCodePlatform::Vulkan, ShaderStage::Fragment);
        let mut writer = Cursor::new(Vec::new());
        definition.write(&mut writer, 25).unwrap();
        let mut bytes = writer.into_inner();

        // The stage index byte follows the u32 length and "Fragment".
        let stage_index_pos = 4 + "Fragment".len();
        assert_eq!(1, bytes[stage_index_pos]);
        bytes[stage_index_pos] = 0;
        assert!(matches!(
            ShaderDefinition::read(&mut Cursor::new(&bytes), 25),
            Err(ReadError::Format(_))
        ));
    }

    #[test]
    fn framebuffer_binding_gated_on_version() {
        let pass = Pass {
            name: "Transparent".to_string(),
            supported_platforms: SupportedPlatforms::all(22),
            fallback_pass: String::new(),
            default_blend_mode: BlendMode::AlphaBlend,
            default_variant: IndexMap::new(),
            framebuffer_binding: 3,
            variants: vec![Variant {
                is_supported: true,
                flags: IndexMap::new(),
                shaders: Vec::new(),
            }],
        };

        let (bytes_v22, read_v22) = round_trip_pass(&pass, 22);
        // The binding never hits the wire before version 23.
        assert_eq!(0, read_v22.framebuffer_binding);

        let (bytes_v23, read_v23) = round_trip_pass(&pass, 23);
        assert_eq!(3, read_v23.framebuffer_binding);
        assert_eq!(bytes_v22.len() + 4, bytes_v23.len());
    }

    #[test]
    fn unspecified_blend_mode_is_absent() {
        let pass = Pass {
            name: "G".to_string(),
            supported_platforms: SupportedPlatforms::all(25),
            fallback_pass: String::new(),
            default_blend_mode: BlendMode::Unspecified,
            default_variant: IndexMap::new(),
            framebuffer_binding: 0,
            variants: Vec::new(),
        };
        let (_, read_back) = round_trip_pass(&pass, 25);
        assert_eq!(BlendMode::Unspecified, read_back.default_blend_mode);
        assert_eq!(pass, read_back);
    }
}
