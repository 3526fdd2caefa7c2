use super::file::ToolsFile;
use foldrun::engine::config::PredictionConfig;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamsKind {
    Jax,
    OpenFoldCheckpoint,
}

impl ParamsKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ParamsKind::Jax => "jax",
            ParamsKind::OpenFoldCheckpoint => "openfold",
        }
    }
}

/// One set of model parameters to load, with the directory its predictions go to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub params: PathBuf,
    pub kind: ParamsKind,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub fasta_dir: PathBuf,
    pub template_mmcif_dir: PathBuf,
    pub core_config: PredictionConfig,
    pub tools: ToolsFile,
    pub models: Vec<ModelSpec>,
    pub random_seed: u64,
    pub enable_template: bool,
}
