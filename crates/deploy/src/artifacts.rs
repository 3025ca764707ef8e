//! Access to the Hardhat compilation output.
//!
//! Hardhat writes one artifact per contract at `artifacts/<source>/<Name>.json`, a debug file
//! next to it pointing at the build-info file, and the build-info file holding the compiler
//! version and the standard-JSON input of the compilation.

use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use alloy_core::primitives::Bytes;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

/// A fully qualified contract name, `<source path>:<contract name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QualifiedName {
    source: String,
    name: String,
}

impl QualifiedName {
    pub fn new(source: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            name: name.into(),
        }
    }

    /// The source file, e.g. `contracts/extensions/Forwarder.sol`.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The contract name, e.g. `Forwarder`.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl FromStr for QualifiedName {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (source, name) = s
            .rsplit_once(':')
            .with_context(|| format!("Expected `<source>:<contract>`, got '{s}'"))?;

        if source.is_empty() || name.is_empty() {
            anyhow::bail!("Expected `<source>:<contract>`, got '{s}'");
        }
        if !source.ends_with(".sol") {
            anyhow::bail!("Contract source must be a .sol file, got '{source}'");
        }

        Ok(Self::new(source, name))
    }
}

impl TryFrom<String> for QualifiedName {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<QualifiedName> for String {
    fn from(value: QualifiedName) -> Self {
        value.to_string()
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.name)
    }
}

/// A compiled contract artifact.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub contract_name: String,
    pub source_name: String,
    /// The creation code of the contract.
    pub bytecode: Bytes,
    #[serde(default)]
    pub link_references: serde_json::Map<String, Value>,
}

/// The debug file written next to every artifact.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArtifactDebug {
    /// Path of the build-info file, relative to the debug file.
    build_info: PathBuf,
}

/// A Hardhat build-info file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    pub solc_version: String,
    /// The full compiler version, e.g. `0.8.17+commit.8df45f5f`.
    pub solc_long_version: String,
    /// The standard-JSON input given to the compiler.
    pub input: Value,
}

impl BuildInfo {
    /// The compiler version in the form expected by Etherscan-like explorers.
    pub fn explorer_compiler_version(&self) -> String {
        format!("v{}", self.solc_long_version)
    }
}

/// Read-only view on a Hardhat artifacts directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn artifact_path(&self, name: &QualifiedName) -> PathBuf {
        self.root
            .join(name.source())
            .join(format!("{}.json", name.name()))
    }

    fn debug_path(&self, name: &QualifiedName) -> PathBuf {
        self.root
            .join(name.source())
            .join(format!("{}.dbg.json", name.name()))
    }

    /// Load the artifact of `name`.
    pub fn artifact(&self, name: &QualifiedName) -> Result<Artifact> {
        let path = self.artifact_path(name);
        let artifact: Artifact = read_json(&path)
            .with_context(|| format!("Failed to load artifact of {name}. Did you run `hardhat compile`?"))?;

        if artifact.contract_name != name.name() || artifact.source_name != name.source() {
            anyhow::bail!(
                "Artifact at {} describes {}:{}, expected {}",
                path.display(),
                artifact.source_name,
                artifact.contract_name,
                name
            );
        }

        Ok(artifact)
    }

    /// The creation code of `name`, ready to be deployed.
    pub fn creation_code(&self, name: &QualifiedName) -> Result<Bytes> {
        let artifact = self.artifact(name)?;

        if !artifact.link_references.is_empty() {
            anyhow::bail!(
                "{name} references unlinked libraries ({}), linking is not supported",
                artifact
                    .link_references
                    .keys()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        if artifact.bytecode.is_empty() {
            anyhow::bail!("{name} has no bytecode, is it an abstract contract or an interface?");
        }

        Ok(artifact.bytecode)
    }

    /// Load the build-info of the compilation that produced `name`.
    pub fn build_info(&self, name: &QualifiedName) -> Result<BuildInfo> {
        let debug_path = self.debug_path(name);
        let debug: ArtifactDebug = read_json(&debug_path)
            .with_context(|| format!("Failed to load debug file of {name}"))?;

        let build_info_path = debug_path
            .parent()
            .context("Debug file path must have a parent directory")?
            .join(&debug.build_info);

        read_json(&build_info_path).with_context(|| format!("Failed to load build-info of {name}"))
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}
