//! Restoring `varying.def.sc` texts from shader input metadata.
//!
//! Each platform's input list formats into one definition text; the texts
//! are then merged through the decompiler (with comment stripping
//! disabled) so per-platform differences collapse into `#if` blocks over
//! `BGFX_SHADER_LANGUAGE_*` checks.
use std::time::Duration;

use indexmap::IndexMap;

use rdm_lib::enums::{Precision, ShaderCodePlatform, ShaderStage};
use rdm_lib::pass::ShaderInput;

use crate::decompile::{decompile, macro_for, DecompileOptions, InputVariant};
use crate::DecompileError;

/// The `BGFX_SHADER_LANGUAGE_*` name and version a platform compiles as.
fn shader_language(platform: ShaderCodePlatform) -> (&'static str, u32) {
    use ShaderCodePlatform::*;
    match platform {
        Direct3DSm40 => ("HLSL", 400),
        Direct3DSm50 => ("HLSL", 500),
        Direct3DSm60 => ("HLSL", 600),
        Direct3DSm65 => ("HLSL", 650),
        Direct3DXb1 => ("HLSL", 500),
        Direct3DXbx => ("HLSL", 600),
        Glsl120 => ("GLSL", 120),
        Glsl430 => ("GLSL", 430),
        Essl100 => ("ESSL", 100),
        Essl300 => ("ESSL", 300),
        Essl310 => ("ESSL", 310),
        Metal => ("METAL", 1),
        Vulkan => ("SPIRV", 1),
        Nvn => ("SPIRV", 1),
        Pssl => ("PSSL", 1),
    }
}

/// The conventional name for an input in a varying definition.
/// Attributes get `a_`, per-instance data `i_`, varyings `v_`.
fn remapped_name(stage: ShaderStage, input: &ShaderInput) -> String {
    for prefix in ["a_", "i_", "v_"] {
        if input.name.starts_with(prefix) {
            return input.name.clone();
        }
    }
    let prefix = if input.per_instance {
        "i_"
    } else if stage == ShaderStage::Vertex {
        "a_"
    } else {
        "v_"
    };
    format!("{prefix}{}", input.name)
}

fn semantic_text(input: &ShaderInput) -> String {
    use rdm_lib::enums::InputSemantic;
    let name = input.semantic.name();
    match input.semantic {
        InputSemantic::TexCoord | InputSemantic::Color => {
            format!("{name}{}", input.semantic_sub_index)
        }
        _ if input.semantic_sub_index > 0 => format!("{name}{}", input.semantic_sub_index),
        _ => name.to_string(),
    }
}

/// Formats one platform's inputs, column-aligned per `a_`/`i_`/`v_` group.
pub fn format_varying_def(entries: &[(ShaderStage, ShaderInput)]) -> String {
    // (prefix text, remapped name, semantic), deduplicated by name.
    let mut lines: Vec<(String, String, String)> = Vec::new();
    for (stage, input) in entries {
        let name = remapped_name(*stage, input);
        if lines.iter().any(|(_, n, _)| *n == name) {
            continue;
        }

        let mut prefix = Vec::new();
        match input.precision {
            Some(Precision::None) | None => {}
            Some(precision) => prefix.push(precision.name()),
        }
        if let Some(interpolation) = input.interpolation {
            prefix.push(interpolation.name());
        }
        prefix.push(input.input_type.name());

        lines.push((prefix.join(" "), name, semantic_text(input)));
    }

    let mut out = String::new();
    for group in ["a_", "i_", "v_"] {
        let group_lines: Vec<&(String, String, String)> =
            lines.iter().filter(|(_, n, _)| n.starts_with(group)).collect();
        if group_lines.is_empty() {
            continue;
        }
        let prefix_width = group_lines.iter().map(|(p, _, _)| p.len()).max().unwrap_or(0);
        let name_width = group_lines.iter().map(|(_, n, _)| n.len()).max().unwrap_or(0);
        for (prefix, name, semantic) in group_lines {
            out.push_str(&format!(
                "{prefix:<prefix_width$} {name:<name_width$} : {semantic};\n"
            ));
        }
    }
    out
}

/// Merges per-platform definition texts into one conditional text whose
/// platform checks use `BGFX_SHADER_LANGUAGE_*` comparisons.
pub fn merge_varying_defs(
    per_platform: &IndexMap<ShaderCodePlatform, String>,
    search_timeout: Duration,
) -> Result<String, DecompileError> {
    let variants: Vec<InputVariant> = per_platform
        .iter()
        .map(|(platform, code)| InputVariant {
            code: code.clone(),
            flags: IndexMap::from([("platform".to_string(), platform.name().to_string())]),
        })
        .collect();

    let options = DecompileOptions {
        preprocess: false,
        postprocess: false,
        search_timeout,
    };
    let merged = decompile(&variants, &options)?;

    let mut code = merged.code;
    for platform in per_platform.keys() {
        let (macro_name, _) = macro_for("platform", platform.name());
        let (language, version) = shader_language(*platform);
        code = code
            .replace(
                &format!("#ifdef {macro_name}"),
                &format!("#if BGFX_SHADER_LANGUAGE_{language} == {version}"),
            )
            .replace(
                &format!("#ifndef {macro_name}"),
                &format!("#if BGFX_SHADER_LANGUAGE_{language} != {version}"),
            )
            .replace(
                &format!("defined({macro_name})"),
                &format!("(BGFX_SHADER_LANGUAGE_{language} == {version})"),
            );
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use rdm_lib::enums::{InputSemantic, InputType, Interpolation};

    fn input(
        name: &str,
        input_type: InputType,
        semantic: InputSemantic,
        sub_index: u8,
        precision: Option<Precision>,
        interpolation: Option<Interpolation>,
    ) -> ShaderInput {
        ShaderInput {
            name: name.to_string(),
            input_type,
            semantic,
            semantic_sub_index: sub_index,
            per_instance: false,
            precision,
            interpolation,
        }
    }

    #[test]
    fn formatting_aligns_groups() {
        let entries = vec![
            (
                ShaderStage::Vertex,
                input(
                    "position",
                    InputType::Vec3,
                    InputSemantic::Position,
                    0,
                    Some(Precision::Highp),
                    None,
                ),
            ),
            (
                ShaderStage::Vertex,
                input("texcoord0", InputType::Vec2, InputSemantic::TexCoord, 0, None, None),
            ),
            (
                ShaderStage::Fragment,
                input(
                    "color0",
                    InputType::Vec4,
                    InputSemantic::Color,
                    0,
                    None,
                    Some(Interpolation::Smooth),
                ),
            ),
        ];
        assert_eq!(
            indoc! {"
                highp vec3 a_position  : POSITION;
                vec2       a_texcoord0 : TEXCOORD0;
                smooth vec4 v_color0 : COLOR0;
            "},
            format_varying_def(&entries)
        );
    }

    #[test]
    fn names_with_prefixes_are_kept_and_deduplicated() {
        let entries = vec![
            (
                ShaderStage::Fragment,
                input("v_fog", InputType::Vec4, InputSemantic::Color, 1, None, None),
            ),
            (
                ShaderStage::Fragment,
                input("v_fog", InputType::Vec4, InputSemantic::Color, 1, None, None),
            ),
        ];
        assert_eq!("vec4 v_fog : COLOR1;\n", format_varying_def(&entries));
    }

    #[test]
    fn per_instance_inputs_use_i_prefix() {
        let entries = vec![(
            ShaderStage::Vertex,
            ShaderInput {
                name: "data0".to_string(),
                input_type: InputType::Vec4,
                semantic: InputSemantic::TexCoord,
                semantic_sub_index: 7,
                per_instance: true,
                precision: None,
                interpolation: None,
            },
        )];
        assert_eq!("vec4 i_data0 : TEXCOORD7;\n", format_varying_def(&entries));
    }

    #[test]
    fn platform_differences_become_language_checks() {
        let shared = "vec4 a_color0 : COLOR0;\n";
        let per_platform = IndexMap::from([
            (
                ShaderCodePlatform::Essl310,
                format!("{shared}highp vec3 a_position : POSITION;\n"),
            ),
            (
                ShaderCodePlatform::Direct3DSm65,
                format!("{shared}vec3 a_position : POSITION;\n"),
            ),
        ]);

        let merged = merge_varying_defs(&per_platform, Duration::from_millis(200)).unwrap();
        assert_eq!(
            indoc! {"
                vec4 a_color0 : COLOR0;
                #if BGFX_SHADER_LANGUAGE_ESSL == 310
                highp vec3 a_position : POSITION;
                #endif
                #if BGFX_SHADER_LANGUAGE_HLSL == 650
                vec3 a_position : POSITION;
                #endif
            "},
            merged
        );
    }
}
