//! Numeric and named enums shared by the container format.
//!
//! Every enum that appears on the wire by name carries a total
//! [name](ShaderStage::name) / [from_name](ShaderStage::from_name) pair.
//! Platforms additionally map to version-dependent wire indices since
//! version 25 dropped ESSL_300 from the index table.
use binrw::{BinRead, BinWrite};

use crate::error::{PlatformMapError, ReadError};

macro_rules! enum_names {
    ($name:ident, $kind:literal, { $($variant:ident => $str:literal,)+ }) => {
        impl $name {
            pub fn name(&self) -> &'static str {
                match self {
                    $(Self::$variant => $str,)+
                }
            }

            pub fn from_name(name: &str) -> Result<Self, ReadError> {
                match name {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(ReadError::InvalidEnum {
                        kind: $kind,
                        name: name.to_string(),
                    }),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, BinRead, BinWrite)]
#[brw(repr(u8))]
pub enum ShaderStage {
    Vertex = 0,
    Fragment = 1,
    Compute = 2,
    Unknown = 3,
}

enum_names!(ShaderStage, "shader stage", {
    Vertex => "Vertex",
    Fragment => "Fragment",
    Compute => "Compute",
    Unknown => "Unknown",
});

/// A shader back-end target.
///
/// ESSL_100 still has a name in current containers but no longer has a
/// wire index, so [wire_index] rejects it for every supported version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ShaderCodePlatform {
    Direct3DSm40,
    Direct3DSm50,
    Direct3DSm60,
    Direct3DSm65,
    Direct3DXb1,
    Direct3DXbx,
    Glsl120,
    Glsl430,
    Essl100,
    Essl300,
    Essl310,
    Metal,
    Vulkan,
    Nvn,
    Pssl,
}

enum_names!(ShaderCodePlatform, "shader platform", {
    Direct3DSm40 => "Direct3D_SM40",
    Direct3DSm50 => "Direct3D_SM50",
    Direct3DSm60 => "Direct3D_SM60",
    Direct3DSm65 => "Direct3D_SM65",
    Direct3DXb1 => "Direct3D_XB1",
    Direct3DXbx => "Direct3D_XBX",
    Glsl120 => "GLSL_120",
    Glsl430 => "GLSL_430",
    Essl100 => "ESSL_100",
    Essl300 => "ESSL_300",
    Essl310 => "ESSL_310",
    Metal => "Metal",
    Vulkan => "Vulkan",
    Nvn => "Nvn",
    Pssl => "PSSL",
});

use ShaderCodePlatform::*;

const WIRE_PLATFORMS_V22: &[ShaderCodePlatform] = &[
    Direct3DSm40,
    Direct3DSm50,
    Direct3DSm60,
    Direct3DSm65,
    Direct3DXb1,
    Direct3DXbx,
    Glsl120,
    Glsl430,
    Essl300,
    Essl310,
    Metal,
    Vulkan,
    Nvn,
    Pssl,
];

// Version 25 removed ESSL_300, shifting everything after it down by one.
const WIRE_PLATFORMS_V25: &[ShaderCodePlatform] = &[
    Direct3DSm40,
    Direct3DSm50,
    Direct3DSm60,
    Direct3DSm65,
    Direct3DXb1,
    Direct3DXbx,
    Glsl120,
    Glsl430,
    Essl310,
    Metal,
    Vulkan,
    Nvn,
    Pssl,
];

/// The ordered platform index table for a container version.
pub fn wire_platforms(version: u64) -> &'static [ShaderCodePlatform] {
    if version >= 25 {
        WIRE_PLATFORMS_V25
    } else {
        WIRE_PLATFORMS_V22
    }
}

/// The number of platforms a version can address.
/// This is also the serialized length of a supported-platforms bitstring.
pub fn platform_count(version: u64) -> usize {
    wire_platforms(version).len()
}

/// The on-disk index for `platform` under `version`.
///
/// ESSL_300 is not addressable in version 25 and is canonicalized to
/// ESSL_310, so materials carrying it still serialize.
pub fn wire_index(platform: ShaderCodePlatform, version: u64) -> Result<u8, PlatformMapError> {
    let platform = if version >= 25 && platform == Essl300 {
        Essl310
    } else {
        platform
    };
    wire_platforms(version)
        .iter()
        .position(|p| *p == platform)
        .map(|i| i as u8)
        .ok_or_else(|| PlatformMapError {
            platform: platform.name().to_string(),
            version,
        })
}

/// The platform addressed by on-disk index `index` under `version`.
pub fn platform_from_wire_index(
    index: u8,
    version: u64,
) -> Result<ShaderCodePlatform, PlatformMapError> {
    wire_platforms(version)
        .get(index as usize)
        .copied()
        .ok_or_else(|| PlatformMapError {
            platform: format!("index {index}"),
            version,
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, BinRead, BinWrite)]
#[brw(repr(u8))]
pub enum Precision {
    None = 0,
    Lowp = 1,
    Mediump = 2,
    Highp = 3,
}

enum_names!(Precision, "precision", {
    None => "none",
    Lowp => "lowp",
    Mediump => "mediump",
    Highp => "highp",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, BinRead, BinWrite)]
#[brw(repr(u8))]
pub enum BufferAccess {
    Undefined = 0,
    Readonly = 1,
    Writeonly = 2,
    Readwrite = 3,
}

enum_names!(BufferAccess, "buffer access", {
    Undefined => "Undefined",
    Readonly => "Readonly",
    Writeonly => "Writeonly",
    Readwrite => "Readwrite",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, BinRead, BinWrite)]
#[brw(repr(u8))]
pub enum BufferType {
    Texture2D = 0,
    Texture2DArray = 1,
    External2D = 2,
    Texture3D = 3,
    TextureCube = 4,
    TextureCubeArray = 5,
    StructBuffer = 6,
    RawBuffer = 7,
    AccelerationStructure = 8,
    Shadow2D = 9,
    Shadow2DArray = 10,
}

enum_names!(BufferType, "buffer type", {
    Texture2D => "Texture2D",
    Texture2DArray => "Texture2DArray",
    External2D => "External2D",
    Texture3D => "Texture3D",
    TextureCube => "TextureCube",
    TextureCubeArray => "TextureCubeArray",
    StructBuffer => "StructBuffer",
    RawBuffer => "RawBuffer",
    AccelerationStructure => "AccelerationStructure",
    Shadow2D => "Shadow2D",
    Shadow2DArray => "Shadow2DArray",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, BinRead, BinWrite)]
#[brw(repr(u16))]
pub enum UniformType {
    Vec4 = 2,
    Mat3 = 3,
    Mat4 = 4,
    External = 5,
}

enum_names!(UniformType, "uniform type", {
    Vec4 => "vec4",
    Mat3 => "mat3",
    Mat4 => "mat4",
    External => "external",
});

impl UniformType {
    /// Number of f32 words in a default value, or `None` for externals.
    pub fn element_count(&self) -> Option<usize> {
        match self {
            UniformType::Vec4 => Some(4),
            UniformType::Mat3 => Some(9),
            UniformType::Mat4 => Some(16),
            UniformType::External => None,
        }
    }
}

/// Pass-level default blend state. `Unspecified` is the absent case of the
/// presence byte and never appears as an ordinal on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendMode {
    Unspecified,
    NoneMode,
    Replace,
    AlphaBlend,
    ColorBlendAlphaAdd,
    PreMultiplied,
    InvertColor,
    Additive,
    AdditiveAlpha,
    Multiply,
    MultiplyBoth,
    InverseSrcAlpha,
    SrcAlpha,
}

enum_names!(BlendMode, "blend mode", {
    Unspecified => "Unspecified",
    NoneMode => "None",
    Replace => "Replace",
    AlphaBlend => "AlphaBlend",
    ColorBlendAlphaAdd => "ColorBlendAlphaAdd",
    PreMultiplied => "PreMultiplied",
    InvertColor => "InvertColor",
    Additive => "Additive",
    AdditiveAlpha => "AdditiveAlpha",
    Multiply => "Multiply",
    MultiplyBoth => "MultiplyBoth",
    InverseSrcAlpha => "InverseSrcAlpha",
    SrcAlpha => "SrcAlpha",
});

impl BlendMode {
    const ORDINALS: &'static [BlendMode] = &[
        BlendMode::NoneMode,
        BlendMode::Replace,
        BlendMode::AlphaBlend,
        BlendMode::ColorBlendAlphaAdd,
        BlendMode::PreMultiplied,
        BlendMode::InvertColor,
        BlendMode::Additive,
        BlendMode::AdditiveAlpha,
        BlendMode::Multiply,
        BlendMode::MultiplyBoth,
        BlendMode::InverseSrcAlpha,
        BlendMode::SrcAlpha,
    ];

    pub fn wire_value(&self) -> Option<u16> {
        Self::ORDINALS.iter().position(|m| m == self).map(|i| i as u16)
    }

    pub fn from_wire_value(value: u16) -> Result<Self, ReadError> {
        Self::ORDINALS
            .get(value as usize)
            .copied()
            .ok_or_else(|| ReadError::InvalidEnum {
                kind: "blend mode",
                name: value.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, BinRead, BinWrite)]
#[brw(repr(u8))]
pub enum InputType {
    Float = 0,
    Vec2 = 1,
    Vec3 = 2,
    Vec4 = 3,
    Int = 4,
    IVec2 = 5,
    IVec3 = 6,
    IVec4 = 7,
    UInt = 8,
    UVec2 = 9,
    UVec3 = 10,
    UVec4 = 11,
    Mat4 = 12,
}

enum_names!(InputType, "input type", {
    Float => "float",
    Vec2 => "vec2",
    Vec3 => "vec3",
    Vec4 => "vec4",
    Int => "int",
    IVec2 => "ivec2",
    IVec3 => "ivec3",
    IVec4 => "ivec4",
    UInt => "uint",
    UVec2 => "uvec2",
    UVec3 => "uvec3",
    UVec4 => "uvec4",
    Mat4 => "mat4",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, BinRead, BinWrite)]
#[brw(repr(u8))]
pub enum InputSemantic {
    Position = 0,
    Normal = 1,
    Tangent = 2,
    Bitangent = 3,
    Color = 4,
    BlendIndices = 5,
    BlendWeight = 6,
    TexCoord = 7,
    Unknown = 8,
    FrontFacing = 9,
}

enum_names!(InputSemantic, "input semantic", {
    Position => "POSITION",
    Normal => "NORMAL",
    Tangent => "TANGENT",
    Bitangent => "BITANGENT",
    Color => "COLOR",
    BlendIndices => "BLENDINDICES",
    BlendWeight => "BLENDWEIGHT",
    TexCoord => "TEXCOORD",
    Unknown => "UNKNOWN",
    FrontFacing => "FRONTFACING",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, BinRead, BinWrite)]
#[brw(repr(u8))]
pub enum Interpolation {
    Flat = 0,
    Smooth = 1,
    Noperspective = 2,
    Centroid = 3,
}

enum_names!(Interpolation, "interpolation", {
    Flat => "flat",
    Smooth => "smooth",
    Noperspective => "noperspective",
    Centroid => "centroid",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerFilter {
    Point = 0,
    Bilinear = 1,
}

enum_names!(SamplerFilter, "sampler filter", {
    Point => "Point",
    Bilinear => "Bilinear",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerWrap {
    Clamp = 0,
    Repeat = 1,
}

enum_names!(SamplerWrap, "sampler wrap", {
    Clamp => "Clamp",
    Repeat => "Repeat",
});
