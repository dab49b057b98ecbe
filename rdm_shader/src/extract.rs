//! Pulling variant sources out of a compiled material and reconstructing
//! per-pass conditional source files.
use indexmap::IndexMap;
use log::warn;

use rdm_lib::enums::{ShaderCodePlatform, ShaderStage};
use rdm_lib::pass::ShaderInput;
use rdm_lib::CompiledMaterialDefinition;

use crate::decompile::{decompile, DecompileOptions, DecompiledShader, InputVariant};
use crate::varying::{format_varying_def, merge_varying_defs};
use crate::DecompileError;

/// One reconstructed source for a (pass, stage) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassSource {
    pub pass_name: String,
    pub stage: ShaderStage,
    pub source: DecompiledShader,
}

/// Reconstructs every (pass, stage) source for one platform.
///
/// Variants whose shader bytes are not valid UTF-8 (object code rather
/// than text) are skipped with a warning, since only text back-ends can be
/// decompiled.
pub fn decompile_material(
    material: &CompiledMaterialDefinition,
    platform: ShaderCodePlatform,
    options: &DecompileOptions,
) -> Result<Vec<PassSource>, DecompileError> {
    let mut sources = Vec::new();

    for pass in &material.passes {
        for stage in [
            ShaderStage::Vertex,
            ShaderStage::Fragment,
            ShaderStage::Compute,
        ] {
            let mut variants = Vec::new();
            for variant in &pass.variants {
                let Some(definition) = variant
                    .shaders
                    .iter()
                    .find(|s| s.platform == platform && s.stage == stage)
                else {
                    continue;
                };
                let code = match std::str::from_utf8(&definition.shader.shader_bytes) {
                    Ok(code) => code.to_string(),
                    Err(_) => {
                        warn!(
                            "skipping non-text shader in pass {:?} for {} {}",
                            pass.name,
                            platform.name(),
                            stage.name()
                        );
                        continue;
                    }
                };
                variants.push(InputVariant {
                    code,
                    flags: variant.flags.clone(),
                });
            }

            if variants.is_empty() {
                continue;
            }
            sources.push(PassSource {
                pass_name: pass.name.clone(),
                stage,
                source: decompile(&variants, options)?,
            });
        }
    }

    Ok(sources)
}

/// Rebuilds one `varying.def` text per pass from the input metadata of
/// every platform's shader definitions.
pub fn restore_varying_defs(
    material: &CompiledMaterialDefinition,
    options: &DecompileOptions,
) -> Result<IndexMap<String, String>, DecompileError> {
    let mut result = IndexMap::new();

    for pass in &material.passes {
        let mut per_platform: IndexMap<ShaderCodePlatform, Vec<(ShaderStage, ShaderInput)>> =
            IndexMap::new();
        for variant in &pass.variants {
            for definition in &variant.shaders {
                let entries = per_platform.entry(definition.platform).or_default();
                for input in &definition.inputs {
                    entries.push((definition.stage, input.clone()));
                }
            }
        }

        if per_platform.is_empty() {
            continue;
        }

        let texts: IndexMap<ShaderCodePlatform, String> = per_platform
            .iter()
            .map(|(platform, entries)| (*platform, format_varying_def(entries)))
            .collect();
        result.insert(
            pass.name.clone(),
            merge_varying_defs(&texts, options.search_timeout)?,
        );
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use rdm_lib::bgfx::{BgfxShader, BgfxTag};
    use rdm_lib::encryption::EncryptionVariant;
    use rdm_lib::enums::{BlendMode, InputSemantic, InputType};
    use rdm_lib::pass::{Pass, ShaderDefinition, SupportedPlatforms, Variant};

    fn text_shader(stage: ShaderStage, code: &str) -> ShaderDefinition {
        ShaderDefinition {
            stage,
            platform: ShaderCodePlatform::Essl310,
            inputs: vec![ShaderInput {
                name: "color0".to_string(),
                input_type: InputType::Vec4,
                semantic: InputSemantic::Color,
                semantic_sub_index: 0,
                per_instance: false,
                precision: None,
                interpolation: None,
            }],
            hash: 0,
            shader: BgfxShader::from_object(
                BgfxTag::from_stage(stage).expect("known stage"),
                code.as_bytes().to_vec(),
            ),
        }
    }

    fn material_with_variants() -> CompiledMaterialDefinition {
        let variant = |flag: &str, line: &str| Variant {
            is_supported: true,
            flags: IndexMap::from([("Fog".to_string(), flag.to_string())]),
            shaders: vec![text_shader(
                ShaderStage::Fragment,
                &format!("base;\n{line}"),
            )],
        };

        CompiledMaterialDefinition {
            version: 25,
            name: "Terrain".to_string(),
            encryption: EncryptionVariant::None,
            parent: None,
            buffers: Vec::new(),
            uniforms: Vec::new(),
            uniform_overrides: IndexMap::new(),
            passes: vec![Pass {
                name: "Opaque".to_string(),
                supported_platforms: SupportedPlatforms::all(25),
                fallback_pass: String::new(),
                default_blend_mode: BlendMode::Unspecified,
                default_variant: IndexMap::new(),
                framebuffer_binding: 0,
                variants: vec![
                    variant("On", "fog_line;\n"),
                    variant("Off", "clear_line;\n"),
                ],
            }],
            encryption_key: None,
            encryption_nonce: None,
        }
    }

    fn options() -> DecompileOptions {
        DecompileOptions {
            preprocess: false,
            postprocess: false,
            search_timeout: Duration::from_millis(200),
        }
    }

    #[test]
    fn decompiles_per_pass_and_stage() {
        let material = material_with_variants();
        let sources =
            decompile_material(&material, ShaderCodePlatform::Essl310, &options()).unwrap();

        assert_eq!(1, sources.len());
        let source = &sources[0];
        assert_eq!("Opaque", source.pass_name);
        assert_eq!(ShaderStage::Fragment, source.stage);
        assert_eq!(
            indoc! {"
                base;
                #ifdef FOG
                fog_line;
                #endif
                #ifndef FOG
                clear_line;
                #endif
            "},
            source.source.code
        );
    }

    #[test]
    fn other_platforms_have_no_sources() {
        let material = material_with_variants();
        let sources =
            decompile_material(&material, ShaderCodePlatform::Vulkan, &options()).unwrap();
        assert!(sources.is_empty());
    }

    #[test]
    fn varying_defs_come_from_input_metadata() {
        let material = material_with_variants();
        let defs = restore_varying_defs(&material, &options()).unwrap();
        assert_eq!(1, defs.len());
        assert_eq!("vec4 v_color0 : COLOR0;\n", defs["Opaque"]);
    }
}
