use super::{CommandTemplate, path_var};
use crate::config::file::FileToolCommand;
use crate::error::Result;
use foldrun::core::io::npz::read_npz_path;
use foldrun::core::models::features::FeatureRecord;
use foldrun::engine::error::ToolError;
use foldrun::engine::features::{FeatureRequest, FeaturePipeline};
use foldrun::engine::scratch::ScratchFile;
use std::path::PathBuf;
use tracing::{debug, info};

pub const FEATURE_VARS: [&str; 10] = [
    "fasta_path",
    "alignment_dir",
    "output",
    "strategy",
    "tag",
    "template_mmcif_dir",
    "template_output_dir",
    "enable_template",
    "random_seed",
    "config",
];

/// Run-wide inputs of the feature tool that do not change between targets.
#[derive(Debug, Clone)]
pub struct FeatureToolSettings {
    /// Directory for the exchanged `.npz` archive.
    pub work_dir: PathBuf,
    pub template_mmcif_dir: PathBuf,
    pub enable_template: bool,
    pub random_seed: u64,
    /// JSON dump of the model configuration.
    pub config_path: PathBuf,
}

/// Builds features by running the feature program, which writes them to an `.npz` archive.
#[derive(Debug, Clone)]
pub struct ProcessFeaturePipeline {
    command: CommandTemplate,
    settings: FeatureToolSettings,
}

impl ProcessFeaturePipeline {
    pub fn new(command: &FileToolCommand, settings: FeatureToolSettings) -> Result<Self> {
        let command = CommandTemplate::from_tool(command);
        command.validate("features", &FEATURE_VARS)?;
        Ok(Self { command, settings })
    }
}

impl FeaturePipeline for ProcessFeaturePipeline {
    fn build(&self, request: &FeatureRequest<'_>) -> std::result::Result<FeatureRecord, ToolError> {
        let settings = &self.settings;
        let output = ScratchFile::reserve(
            &settings.work_dir,
            &format!("features_{}.npz", std::process::id()),
        )?;
        info!(
            tag = request.target.tag(),
            strategy = request.strategy.as_str(),
            "Running feature pipeline."
        );

        self.command.run(&[
            ("fasta_path", path_var(request.fasta_path)),
            ("alignment_dir", path_var(request.alignment_dir)),
            ("output", path_var(output.path())),
            ("strategy", request.strategy.as_str().to_string()),
            ("tag", request.target.tag().to_string()),
            ("template_mmcif_dir", path_var(&settings.template_mmcif_dir)),
            (
                "template_output_dir",
                request.template_output_dir.map(path_var).unwrap_or_default(),
            ),
            ("enable_template", settings.enable_template.to_string()),
            ("random_seed", settings.random_seed.to_string()),
            ("config", path_var(&settings.config_path)),
        ])?;

        if !output.path().is_file() {
            return Err(ToolError::InvalidOutput(format!(
                "'{}' did not write {}",
                self.command.program(),
                output.path().display()
            )));
        }
        let tensors = read_npz_path(output.path())?;
        if tensors.is_empty() {
            return Err(ToolError::InvalidOutput(format!(
                "'{}' wrote an empty feature archive",
                self.command.program()
            )));
        }
        debug!(tag = request.target.tag(), features = tensors.len(), "Read feature archive.");
        Ok(FeatureRecord::new(tensors))
    }
}
