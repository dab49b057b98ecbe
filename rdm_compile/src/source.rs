//! Shader-source resolution for the compilation pipeline.
use std::path::PathBuf;

use indexmap::IndexMap;

use crate::CompileError;

/// Where shader source files come from.
pub trait ShaderSource {
    fn load(&self, file_name: &str) -> Result<Vec<u8>, CompileError>;
}

/// Reads sources from a directory on disk.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }
}

impl ShaderSource for DirectorySource {
    fn load(&self, file_name: &str) -> Result<Vec<u8>, CompileError> {
        let path = self.root.join(file_name);
        std::fs::read(&path).map_err(|_| CompileError::SourceNotFound(file_name.to_string()))
    }
}

/// Serves sources from an in-memory map, for embedded or generated files.
#[derive(Debug, Clone, Default)]
pub struct EmbeddedSource {
    files: IndexMap<String, Vec<u8>>,
}

impl EmbeddedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, file_name: impl Into<String>, contents: impl Into<Vec<u8>>) {
        self.files.insert(file_name.into(), contents.into());
    }
}

impl ShaderSource for EmbeddedSource {
    fn load(&self, file_name: &str) -> Result<Vec<u8>, CompileError> {
        self.files
            .get(file_name)
            .cloned()
            .ok_or_else(|| CompileError::SourceNotFound(file_name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_lookup() {
        let mut source = EmbeddedSource::new();
        source.insert("a.hlsl", b"float4 main() : SV_TARGET { return 0; }".to_vec());
        assert!(source.load("a.hlsl").is_ok());
        assert!(matches!(
            source.load("missing.hlsl"),
            Err(CompileError::SourceNotFound(name)) if name == "missing.hlsl"
        ));
    }

    #[test]
    fn directory_miss_is_source_not_found() {
        let source = DirectorySource::new("/nonexistent-rdm-test-dir");
        assert!(matches!(
            source.load("a.hlsl"),
            Err(CompileError::SourceNotFound(_))
        ));
    }
}
