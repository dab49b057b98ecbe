use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use rdm_lib::enums::ShaderCodePlatform;
use rdm_lib::CompiledMaterialDefinition;
use rdm_shader::decompile::DecompileOptions;
use rdm_shader::extract::{decompile_material, restore_varying_defs};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconstruct conditional source files from a compiled material.
    Decompile {
        /// The input .material.bin file.
        input: PathBuf,
        /// The output folder for the reconstructed sources.
        output_folder: PathBuf,
        /// The shader platform to extract, like ESSL_310.
        #[arg(default_value = "ESSL_310")]
        platform: String,
        /// Wall-clock budget in milliseconds for each expression search.
        #[arg(long, default_value_t = 10_000)]
        search_timeout_ms: u64,
        /// Skip comment stripping and the bgfx declaration rewrites.
        #[arg(long)]
        raw: bool,
    },
    /// Rebuild per-pass varying.def texts from a compiled material.
    VaryingDef {
        /// The input .material.bin file.
        input: PathBuf,
        /// The output folder for the varying definition files.
        output_folder: PathBuf,
        /// Wall-clock budget in milliseconds for each expression search.
        #[arg(long, default_value_t = 10_000)]
        search_timeout_ms: u64,
    },
}

fn main() -> Result<()> {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Warn)
        .init()
        .unwrap();

    let cli = Cli::parse();
    let start = std::time::Instant::now();

    match cli.command {
        Commands::Decompile {
            input,
            output_folder,
            platform,
            search_timeout_ms,
            raw,
        } => {
            let platform = ShaderCodePlatform::from_name(&platform)
                .with_context(|| format!("unknown platform {platform:?}"))?;
            let material = CompiledMaterialDefinition::from_file(&input)
                .with_context(|| format!("failed to read {input:?}"))?;

            let options = DecompileOptions {
                preprocess: !raw,
                postprocess: !raw,
                search_timeout: Duration::from_millis(search_timeout_ms),
            };
            std::fs::create_dir_all(&output_folder)?;

            for source in decompile_material(&material, platform, &options)? {
                let file_name = format!(
                    "{}.{}.sc",
                    source.pass_name.replace('/', "_"),
                    source.stage.name().to_lowercase()
                );
                std::fs::write(output_folder.join(file_name), source.source.code)?;
            }
        }
        Commands::VaryingDef {
            input,
            output_folder,
            search_timeout_ms,
        } => {
            let material = CompiledMaterialDefinition::from_file(&input)
                .with_context(|| format!("failed to read {input:?}"))?;
            let options = DecompileOptions {
                search_timeout: Duration::from_millis(search_timeout_ms),
                ..Default::default()
            };
            std::fs::create_dir_all(&output_folder)?;

            for (pass_name, text) in restore_varying_defs(&material, &options)? {
                let file_name = format!("{}.varying.def.sc", pass_name.replace('/', "_"));
                std::fs::write(output_folder.join(file_name), text)?;
            }
        }
    }

    println!("Finished in {:?}", start.elapsed());
    Ok(())
}
