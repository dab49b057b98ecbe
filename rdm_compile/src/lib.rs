//! Compiles HLSL sources into a version 25 material container.
//!
//! The pipeline resolves a layered define map per shader, hands each
//! source to an external compiler adapter, wraps the returned bytecode in
//! the container's shader-wrapper form, and assembles a single-pass,
//! single-variant material ready for serialization.
use indexmap::IndexMap;
use log::info;
use thiserror::Error;

use rdm_lib::bgfx::{BgfxShader, BgfxTag};
use rdm_lib::encryption::EncryptionVariant;
use rdm_lib::enums::{BlendMode, ShaderCodePlatform, ShaderStage};
use rdm_lib::pass::{Pass, ShaderDefinition, SupportedPlatforms, Variant};
use rdm_lib::CompiledMaterialDefinition;

pub mod compiler;
pub mod manifest;
pub mod source;

pub use compiler::{
    CompileInput, CompileOutput, DxcExecutableCompiler, DxcLibraryCompiler, ShaderCompiler,
};
pub use manifest::{MaterialManifest, ShaderEntry};
pub use source::{DirectorySource, EmbeddedSource, ShaderSource};

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("shader source {0:?} was not found")]
    SourceNotFound(String),

    #[error("failed to load the shader compiler: {reason}")]
    CompilerLoad { reason: String },

    #[error("failed to invoke the shader compiler: {0}")]
    CompilerInvocation(String),

    #[error("failed to compile {file_name}:\n{diagnostics}")]
    Compilation {
        file_name: String,
        diagnostics: String,
    },

    #[error("invalid manifest: {0}")]
    Manifest(String),

    #[error("error reading manifest")]
    ManifestJson(#[from] serde_json::Error),

    #[error("error assembling the material container")]
    Container(#[from] rdm_lib::error::WriteError),

    #[error("i/o error during compilation")]
    Io(#[from] std::io::Error),
}

/// Pipeline-wide settings for one compile call.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub platform: ShaderCodePlatform,
    /// The weakest define layer, from user settings.
    pub user_defines: IndexMap<String, String>,
    /// Register bindings extracted from a base material.
    pub register_defines: IndexMap<String, String>,
    pub include_paths: Vec<std::path::PathBuf>,
    pub additional_args: Vec<String>,
}

impl CompileOptions {
    pub fn new(platform: ShaderCodePlatform) -> Self {
        Self {
            platform,
            user_defines: IndexMap::new(),
            register_defines: IndexMap::new(),
            include_paths: Vec::new(),
            additional_args: Vec::new(),
        }
    }
}

/// The `s_<BufferName>_REG=<slot>` defines a base material's buffer
/// bindings contribute to a compile.
pub fn register_defines(material: &CompiledMaterialDefinition) -> IndexMap<String, String> {
    material
        .buffers
        .iter()
        .map(|buffer| {
            let name = if buffer.name.starts_with("s_") {
                format!("{}_REG", buffer.name)
            } else {
                format!("s_{}_REG", buffer.name)
            };
            (name, buffer.reg1.to_string())
        })
        .collect()
}

/// Layered define resolution: user settings, then register bindings, then
/// the shader entry's own defines, rightmost wins.
fn resolve_defines(
    options: &CompileOptions,
    entry: &ShaderEntry,
) -> IndexMap<String, String> {
    let mut defines = options.user_defines.clone();
    defines.extend(
        options
            .register_defines
            .iter()
            .map(|(k, v)| (k.clone(), v.clone())),
    );
    defines.extend(entry.defines.iter().map(|(k, v)| (k.clone(), v.clone())));
    defines
}

/// Compiles every shader of `manifest` in declared order and assembles the
/// material. The first failed shader aborts the whole manifest.
pub fn compile_material(
    manifest: &MaterialManifest,
    options: &CompileOptions,
    sources: &dyn ShaderSource,
    compiler: &mut dyn ShaderCompiler,
) -> Result<CompiledMaterialDefinition, CompileError> {
    let mut shaders = Vec::with_capacity(manifest.shaders.len());

    for entry in &manifest.shaders {
        let stage = ShaderStage::from_name(&entry.stage)
            .map_err(|_| CompileError::Manifest(format!("unknown stage {:?}", entry.stage)))?;
        let tag = BgfxTag::from_stage(stage).ok_or_else(|| {
            CompileError::Manifest(format!("stage {:?} cannot be compiled", entry.stage))
        })?;

        let source = sources.load(&entry.file_name)?;
        let defines = resolve_defines(options, entry);

        let mut args = options.additional_args.clone();
        args.extend(manifest.compiler_options.iter().cloned());
        args.extend(entry.compiler_options.iter().cloned());

        info!("compiling {} from {}", entry.name, entry.file_name);
        let output = compiler.compile(&CompileInput {
            source: &source,
            source_name: &entry.file_name,
            entry_point: &entry.entry_point,
            target_profile: &entry.target_profile,
            defines: &defines,
            include_paths: &options.include_paths,
            args: &args,
        })?;
        if !output.success {
            return Err(CompileError::Compilation {
                file_name: entry.file_name.clone(),
                diagnostics: output.diagnostics,
            });
        }

        shaders.push(ShaderDefinition {
            stage,
            platform: options.platform,
            inputs: Vec::new(),
            hash: 0,
            shader: BgfxShader::from_object(tag, output.object),
        });
    }

    Ok(CompiledMaterialDefinition {
        version: 25,
        name: manifest.material_name.clone(),
        encryption: EncryptionVariant::None,
        parent: None,
        buffers: Vec::new(),
        uniforms: Vec::new(),
        uniform_overrides: IndexMap::new(),
        passes: vec![Pass {
            name: manifest.pass_name.clone(),
            supported_platforms: SupportedPlatforms::all(25),
            fallback_pass: String::new(),
            default_blend_mode: BlendMode::Unspecified,
            default_variant: IndexMap::new(),
            framebuffer_binding: 0,
            variants: vec![Variant {
                is_supported: true,
                flags: IndexMap::new(),
                shaders,
            }],
        }],
        encryption_key: None,
        encryption_nonce: None,
    })
}

/// [compile_material] followed by container serialization.
pub fn compile_to_bytes(
    manifest: &MaterialManifest,
    options: &CompileOptions,
    sources: &dyn ShaderSource,
    compiler: &mut dyn ShaderCompiler,
) -> Result<Vec<u8>, CompileError> {
    let material = compile_material(manifest, options, sources, compiler)?;
    Ok(material.to_bytes()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    /// Records every input it sees and returns canned bytecode.
    #[derive(Default)]
    struct RecordingCompiler {
        seen_defines: Vec<IndexMap<String, String>>,
        seen_args: Vec<Vec<String>>,
        fail: bool,
    }

    impl ShaderCompiler for RecordingCompiler {
        fn compile(&mut self, input: &CompileInput<'_>) -> Result<CompileOutput, CompileError> {
            self.seen_defines.push(input.defines.clone());
            self.seen_args.push(input.args.to_vec());
            if self.fail {
                Ok(CompileOutput {
                    success: false,
                    object: Vec::new(),
                    diagnostics: "error: something went wrong".to_string(),
                })
            } else {
                Ok(CompileOutput {
                    success: true,
                    object: b"DXBC".to_vec(),
                    diagnostics: String::new(),
                })
            }
        }
    }

    fn defines(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn compute_manifest() -> MaterialManifest {
        MaterialManifest {
            material_name: "RTXStub".to_string(),
            pass_name: "ComputePass".to_string(),
            shaders: vec![ShaderEntry {
                name: "Denoise".to_string(),
                file_name: "denoise.hlsl".to_string(),
                stage: "Compute".to_string(),
                entry_point: "main".to_string(),
                target_profile: "cs_6_5".to_string(),
                defines: defines(&[("__PASS_X__", "1"), ("FOO", "(2)")]),
                compiler_options: vec!["-enable-16bit-types".to_string()],
            }],
            compiler_options: vec!["-HV 2021".to_string()],
        }
    }

    fn embedded_sources() -> EmbeddedSource {
        let mut sources = EmbeddedSource::new();
        sources.insert("denoise.hlsl", b"[numthreads(8,8,1)] void main() {}".to_vec());
        sources
    }

    #[test]
    fn define_layers_merge_rightmost_wins() {
        let manifest = compute_manifest();
        let mut options = CompileOptions::new(ShaderCodePlatform::Direct3DSm65);
        options.user_defines = defines(&[("FOO", "(1)"), ("USER_ONLY", "u")]);
        options.register_defines = defines(&[("s_Buf_REG", "3")]);
        options.additional_args = vec!["-Zi".to_string()];

        let mut compiler = RecordingCompiler::default();
        compile_material(&manifest, &options, &embedded_sources(), &mut compiler).unwrap();

        assert_eq!(
            vec![defines(&[
                ("FOO", "(2)"),
                ("USER_ONLY", "u"),
                ("s_Buf_REG", "3"),
                ("__PASS_X__", "1"),
            ])],
            compiler.seen_defines
        );
        assert_eq!(
            vec![vec![
                "-Zi".to_string(),
                "-HV 2021".to_string(),
                "-enable-16bit-types".to_string(),
            ]],
            compiler.seen_args
        );
    }

    #[test]
    fn assembled_container_round_trips() {
        let manifest = compute_manifest();
        let options = CompileOptions::new(ShaderCodePlatform::Direct3DSm65);
        let mut compiler = RecordingCompiler::default();

        let bytes =
            compile_to_bytes(&manifest, &options, &embedded_sources(), &mut compiler).unwrap();
        let material = CompiledMaterialDefinition::from_bytes(&bytes).unwrap();

        assert_eq!(25, material.version);
        assert_eq!("RTXStub", material.name);
        assert_eq!(1, material.passes.len());
        let pass = &material.passes[0];
        assert_eq!("ComputePass", pass.name);
        assert_eq!(BlendMode::Unspecified, pass.default_blend_mode);
        assert_eq!(0, pass.framebuffer_binding);
        assert!(pass
            .supported_platforms
            .is_supported(ShaderCodePlatform::Vulkan));

        let variant = &pass.variants[0];
        assert!(variant.is_supported);
        assert!(variant.flags.is_empty());
        let shader = &variant.shaders[0];
        assert_eq!(ShaderStage::Compute, shader.stage);
        assert_eq!(ShaderCodePlatform::Direct3DSm65, shader.platform);
        assert_eq!(0, shader.hash);
        assert_eq!(b"DXBC".to_vec(), shader.shader.shader_bytes);
        assert_eq!(-1, shader.shader.attributes_size);

        assert_eq!(bytes, material.to_bytes().unwrap());
    }

    #[test]
    fn compilation_failure_aborts_with_diagnostics() {
        let manifest = compute_manifest();
        let options = CompileOptions::new(ShaderCodePlatform::Direct3DSm65);
        let mut compiler = RecordingCompiler {
            fail: true,
            ..Default::default()
        };

        let result = compile_material(&manifest, &options, &embedded_sources(), &mut compiler);
        assert!(matches!(
            result,
            Err(CompileError::Compilation { file_name, diagnostics })
                if file_name == "denoise.hlsl" && diagnostics.contains("something went wrong")
        ));
    }

    #[test]
    fn missing_source_aborts() {
        let manifest = compute_manifest();
        let options = CompileOptions::new(ShaderCodePlatform::Direct3DSm65);
        let mut compiler = RecordingCompiler::default();
        let result = compile_material(
            &manifest,
            &options,
            &EmbeddedSource::new(),
            &mut compiler,
        );
        assert!(matches!(result, Err(CompileError::SourceNotFound(_))));
    }

    #[test]
    fn register_defines_from_buffers() {
        let mut material = CompiledMaterialDefinition {
            version: 25,
            name: "Base".to_string(),
            encryption: EncryptionVariant::None,
            parent: None,
            buffers: Vec::new(),
            uniforms: Vec::new(),
            uniform_overrides: IndexMap::new(),
            passes: Vec::new(),
            encryption_key: None,
            encryption_nonce: None,
        };
        material.buffers.push(rdm_lib::material::MaterialBuffer {
            name: "s_MatTexture".to_string(),
            reg1: 2,
            reg2: 0,
            access: rdm_lib::enums::BufferAccess::Readonly,
            precision: rdm_lib::enums::Precision::None,
            unordered_access: false,
            buffer_type: rdm_lib::enums::BufferType::Texture2D,
            texture_format: String::new(),
            always_one: 1,
            sampler_state: None,
            default_texture: None,
            texture_path: None,
            custom_type_info: None,
        });
        material.buffers.push(rdm_lib::material::MaterialBuffer {
            name: "LightData".to_string(),
            reg1: 7,
            ..material.buffers[0].clone()
        });

        assert_eq!(
            defines(&[("s_MatTexture_REG", "2"), ("s_LightData_REG", "7")]),
            register_defines(&material)
        );
    }
}
