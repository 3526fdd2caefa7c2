use crate::error::{CliError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// An external program and its argument template.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileToolCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileModelCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Arguments for an ahead-of-time compilation call of the same program.
    pub compile_args: Option<Vec<String>>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileRunConfig {
    pub output_dir: Option<PathBuf>,
    pub cpus: Option<usize>,
    pub preset: Option<String>,
    pub multimer_ri_gap: Option<i32>,
    pub compilation_interval: Option<usize>,
}

/// The tools file: how to reach every external collaborator, plus optional run settings.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ToolsFile {
    #[serde(default)]
    pub run: FileRunConfig,
    pub alignment: FileToolCommand,
    pub features: FileToolCommand,
    pub model: FileModelCommand,
    pub relax: Option<FileToolCommand>,
}

impl ToolsFile {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Reading tools file from {:?}", path);
        let content = std::fs::read_to_string(path).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })?;
        Self::parse(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}
