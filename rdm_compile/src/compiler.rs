//! Adapters over the external HLSL compiler.
//!
//! Two interchangeable back-ends: an in-process call through the DXC
//! shared library, and a spawned `dxc` executable fed through temp files.
//! The underlying compiler is not re-entrant, so both adapters take
//! `&mut self`; callers wanting parallel builds create one adapter per
//! worker.
use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use log::{debug, warn};

use crate::CompileError;

/// One compilation request.
#[derive(Debug)]
pub struct CompileInput<'a> {
    pub source: &'a [u8],
    pub source_name: &'a str,
    pub entry_point: &'a str,
    pub target_profile: &'a str,
    pub defines: &'a IndexMap<String, String>,
    pub include_paths: &'a [PathBuf],
    pub args: &'a [String],
}

/// The compiler's verdict. `diagnostics` carries the full compiler output
/// verbatim so tools can present it unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOutput {
    pub success: bool,
    pub object: Vec<u8>,
    pub diagnostics: String,
}

pub trait ShaderCompiler {
    fn compile(&mut self, input: &CompileInput<'_>) -> Result<CompileOutput, CompileError>;
}

/// Compiles in-process through the DXC shared library.
#[derive(Debug, Default)]
pub struct DxcLibraryCompiler;

impl DxcLibraryCompiler {
    pub fn new() -> Self {
        Self
    }
}

impl ShaderCompiler for DxcLibraryCompiler {
    fn compile(&mut self, input: &CompileInput<'_>) -> Result<CompileOutput, CompileError> {
        let source = std::str::from_utf8(input.source).map_err(|_| {
            CompileError::CompilerInvocation(format!(
                "shader source {:?} is not valid utf-8",
                input.source_name
            ))
        })?;

        let mut args: Vec<String> = input.args.to_vec();
        for path in input.include_paths {
            args.push("-I".to_string());
            args.push(path.display().to_string());
        }
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let defines: Vec<(&str, Option<&str>)> = input
            .defines
            .iter()
            .map(|(name, value)| (name.as_str(), Some(value.as_str())))
            .collect();

        debug!(
            "compiling {:?} ({} -> {})",
            input.source_name, input.entry_point, input.target_profile
        );
        match hassle_rs::compile_hlsl(
            input.source_name,
            source,
            input.entry_point,
            input.target_profile,
            &arg_refs,
            &defines,
        ) {
            Ok(object) => Ok(CompileOutput {
                success: true,
                object,
                diagnostics: String::new(),
            }),
            Err(hassle_rs::HassleError::CompileError(diagnostics)) => Ok(CompileOutput {
                success: false,
                object: Vec::new(),
                diagnostics,
            }),
            Err(error) => Err(CompileError::CompilerLoad {
                reason: error.to_string(),
            }),
        }
    }
}

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Removes its file when dropped, on the success and failure paths alike.
struct TempFile(PathBuf);

impl Drop for TempFile {
    fn drop(&mut self) {
        if let Err(error) = std::fs::remove_file(&self.0) {
            if self.0.exists() {
                warn!("failed to remove temp file {:?}: {error}", self.0);
            }
        }
    }
}

fn temp_path(extension: &str) -> PathBuf {
    let unique = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!(
        "rdm-compile-{}-{unique}.{extension}",
        std::process::id()
    ))
}

/// Spawns a `dxc` executable per call with temp-file source and output.
#[derive(Debug, Clone)]
pub struct DxcExecutableCompiler {
    path: PathBuf,
}

impl DxcExecutableCompiler {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

impl ShaderCompiler for DxcExecutableCompiler {
    fn compile(&mut self, input: &CompileInput<'_>) -> Result<CompileOutput, CompileError> {
        let source_path = temp_path("hlsl");
        let object_path = temp_path("cso");

        std::fs::write(&source_path, input.source)?;
        let source_file = TempFile(source_path.clone());
        let object_file = TempFile(object_path.clone());

        let mut command = Command::new(&self.path);
        command
            .arg("-E")
            .arg(input.entry_point)
            .arg("-T")
            .arg(input.target_profile)
            .arg("-Fo")
            .arg(&object_path);
        for (name, value) in input.defines {
            command.arg("-D").arg(format!("{name}={value}"));
        }
        for path in input.include_paths {
            command.arg("-I").arg(path);
        }
        for arg in input.args {
            command.arg(arg);
        }
        command.arg(&source_path);

        debug!("running {:?}", command);
        let output = command.output().map_err(|error| {
            CompileError::CompilerInvocation(format!(
                "failed to run {:?}: {error}",
                self.path
            ))
        })?;

        let mut diagnostics = String::from_utf8_lossy(&output.stderr).into_owned();
        diagnostics.push_str(&String::from_utf8_lossy(&output.stdout));

        let result = if output.status.success() {
            Ok(CompileOutput {
                success: true,
                object: std::fs::read(&object_path)?,
                diagnostics,
            })
        } else {
            Ok(CompileOutput {
                success: false,
                object: Vec::new(),
                diagnostics,
            })
        };

        drop(source_file);
        drop(object_file);
        result
    }
}
