use super::{CommandTemplate, path_var};
use crate::config::file::FileToolCommand;
use crate::error::Result;
use foldrun::engine::error::ToolError;
use foldrun::engine::output::{RelaxRequest, Relaxer};
use serde_json::Value;
use std::fs;
use tracing::info;

pub const RELAX_VARS: [&str; 4] = ["unrelaxed", "relaxed", "device", "relax_config"];

/// Relaxes a written structure with an external energy-minimization program.
#[derive(Debug, Clone)]
pub struct ProcessRelaxer {
    command: CommandTemplate,
}

impl ProcessRelaxer {
    pub fn new(command: &FileToolCommand) -> Result<Self> {
        let command = CommandTemplate::from_tool(command);
        command.validate("relax", &RELAX_VARS)?;
        Ok(Self { command })
    }
}

impl Relaxer for ProcessRelaxer {
    fn relax(&self, request: &RelaxRequest<'_>) -> std::result::Result<(), ToolError> {
        info!(path = %request.unrelaxed_path.display(), device = request.device, "Relaxing structure.");
        // The relax section of the model configuration, inlined as compact JSON.
        let relax_config = request
            .model_config
            .get("relax")
            .map(Value::to_string)
            .unwrap_or_else(|| "{}".to_string());

        // A file left by an earlier run must not pass for this run's output.
        if request.relaxed_path.exists() {
            fs::remove_file(request.relaxed_path)?;
        }

        self.command.run(&[
            ("unrelaxed", path_var(request.unrelaxed_path)),
            ("relaxed", path_var(request.relaxed_path)),
            ("device", request.device.to_string()),
            ("relax_config", relax_config),
        ])?;

        if !request.relaxed_path.is_file() {
            return Err(ToolError::InvalidOutput(format!(
                "'{}' did not write {}",
                self.command.program(),
                request.relaxed_path.display()
            )));
        }
        Ok(())
    }
}
