//! The per-material build manifest.
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::CompileError;

/// Describes how to build one pass of one material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialManifest {
    pub material_name: String,
    pub pass_name: String,
    #[serde(default)]
    pub shaders: Vec<ShaderEntry>,
    /// Arguments applied to every shader in this manifest.
    #[serde(default)]
    pub compiler_options: Vec<String>,
}

/// One shader to compile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShaderEntry {
    pub name: String,
    pub file_name: String,
    /// Stage name as the container spells it, like `Vertex` or `Compute`.
    pub stage: String,
    pub entry_point: String,
    pub target_profile: String,
    /// Per-shader defines, the strongest layer of the define merge.
    #[serde(default)]
    pub defines: IndexMap<String, String>,
    #[serde(default)]
    pub compiler_options: Vec<String>,
}

impl MaterialManifest {
    pub fn from_json(json: &str) -> Result<Self, CompileError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CompileError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn to_json(&self) -> Result<String, CompileError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn camel_case_json_round_trip() {
        let json = r#"{
            "materialName": "RTXStub",
            "passName": "ComputePass",
            "shaders": [
                {
                    "name": "Denoise",
                    "fileName": "denoise.hlsl",
                    "stage": "Compute",
                    "entryPoint": "main",
                    "targetProfile": "cs_6_5",
                    "defines": { "__PASS_X__": "1" },
                    "compilerOptions": ["-O3"]
                }
            ],
            "compilerOptions": ["-HV 2021"]
        }"#;

        let manifest = MaterialManifest::from_json(json).unwrap();
        assert_eq!("RTXStub", manifest.material_name);
        assert_eq!(1, manifest.shaders.len());
        let entry = &manifest.shaders[0];
        assert_eq!("denoise.hlsl", entry.file_name);
        assert_eq!("cs_6_5", entry.target_profile);
        assert_eq!(Some(&"1".to_string()), entry.defines.get("__PASS_X__"));

        let round_tripped = MaterialManifest::from_json(&manifest.to_json().unwrap()).unwrap();
        assert_eq!(manifest, round_tripped);
    }

    #[test]
    fn missing_optional_fields_default() {
        let json = r#"{ "materialName": "M", "passName": "P" }"#;
        let manifest = MaterialManifest::from_json(json).unwrap();
        assert!(manifest.shaders.is_empty());
        assert!(manifest.compiler_options.is_empty());
    }

    #[test]
    fn malformed_json_is_a_manifest_error() {
        assert!(matches!(
            MaterialManifest::from_json("{"),
            Err(CompileError::ManifestJson(_))
        ));
    }
}
