use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indexmap::IndexMap;

use rdm_compile::{
    compile_to_bytes, register_defines, CompileOptions, DirectorySource, DxcExecutableCompiler,
    DxcLibraryCompiler, MaterialManifest, ShaderCompiler,
};
use rdm_lib::enums::ShaderCodePlatform;
use rdm_lib::CompiledMaterialDefinition;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a manifest of HLSL shaders into a material container.
    Build {
        /// The manifest JSON file.
        manifest: PathBuf,
        /// The folder holding the shader sources.
        source_folder: PathBuf,
        /// The output .material.bin path.
        output: PathBuf,
        /// The target shader platform.
        #[arg(long, default_value = "Direct3D_SM65")]
        platform: String,
        /// Defines like NAME=VALUE, the weakest layer of the merge.
        #[arg(short = 'D', long = "define")]
        defines: Vec<String>,
        /// Extra include directories.
        #[arg(short = 'I', long = "include")]
        include_paths: Vec<PathBuf>,
        /// A base material whose buffer registers become defines.
        #[arg(long)]
        base_material: Option<PathBuf>,
        /// Path to a dxc executable. Uses the in-process library when absent.
        #[arg(long)]
        dxc: Option<PathBuf>,
        /// Extra arguments passed through to the compiler.
        #[arg(last = true)]
        compiler_args: Vec<String>,
    },
}

fn parse_defines(raw: &[String]) -> Result<IndexMap<String, String>> {
    raw.iter()
        .map(|define| {
            let (name, value) = define
                .split_once('=')
                .with_context(|| format!("define {define:?} is not NAME=VALUE"))?;
            Ok((name.to_string(), value.to_string()))
        })
        .collect()
}

fn main() -> Result<()> {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()
        .unwrap();

    let cli = Cli::parse();
    let start = std::time::Instant::now();

    match cli.command {
        Commands::Build {
            manifest,
            source_folder,
            output,
            platform,
            defines,
            include_paths,
            base_material,
            dxc,
            compiler_args,
        } => {
            let platform = ShaderCodePlatform::from_name(&platform)
                .with_context(|| format!("unknown platform {platform:?}"))?;
            let manifest = MaterialManifest::from_file(&manifest)
                .with_context(|| format!("failed to read manifest {manifest:?}"))?;

            let mut options = CompileOptions::new(platform);
            options.user_defines = parse_defines(&defines)?;
            options.include_paths = include_paths;
            options.additional_args = compiler_args;
            if let Some(base) = base_material {
                let base = CompiledMaterialDefinition::from_file(&base)
                    .with_context(|| format!("failed to read base material {base:?}"))?;
                options.register_defines = register_defines(&base);
            }

            let sources = DirectorySource::new(source_folder);
            let mut library;
            let mut executable;
            let compiler: &mut dyn ShaderCompiler = match dxc {
                Some(path) => {
                    executable = DxcExecutableCompiler::new(path);
                    &mut executable
                }
                None => {
                    library = DxcLibraryCompiler::new();
                    &mut library
                }
            };

            let bytes = compile_to_bytes(&manifest, &options, &sources, compiler)?;
            std::fs::write(&output, bytes)
                .with_context(|| format!("failed to write {output:?}"))?;
        }
    }

    println!("Finished in {:?}", start.elapsed());
    Ok(())
}
