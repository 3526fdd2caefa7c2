use super::{CommandTemplate, path_var};
use crate::config::{AppConfig, ModelSpec, ParamsKind};
use crate::error::{CliError, Result};
use foldrun::core::io::npz::{read_npz_path, write_npz_path};
use foldrun::core::models::features::{ModelOutput, ProcessedFeatures};
use foldrun::core::models::tensor::TensorMap;
use foldrun::engine::config::ModelConfig;
use foldrun::engine::error::ToolError;
use foldrun::engine::invoker::{LoadedModel, StructureModel};
use foldrun::engine::scratch::ScratchFile;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const MODEL_VARS: [&str; 8] = [
    "params",
    "params_kind",
    "model_name",
    "features",
    "output",
    "device",
    "config",
    "random_seed",
];

pub const MODEL_CONFIG_FILE: &str = "model_config.json";

/// A model served by an external program: processed features go in as one `.npz`
/// archive and raw outputs come back as another.
#[derive(Debug)]
pub struct ProcessModel {
    name: String,
    params: PathBuf,
    kind: ParamsKind,
    run: CommandTemplate,
    compile: Option<CommandTemplate>,
    config_path: PathBuf,
    work_dir: PathBuf,
    random_seed: u64,
}

impl ProcessModel {
    fn vars(&self, features: &ProcessedFeatures, inputs: &Path, outputs: &Path) -> Vec<(&'static str, String)> {
        vec![
            ("params", path_var(&self.params)),
            ("params_kind", self.kind.as_str().to_string()),
            ("model_name", self.name.clone()),
            ("features", path_var(inputs)),
            ("output", path_var(outputs)),
            ("device", features.device().to_string()),
            ("config", path_var(&self.config_path)),
            ("random_seed", self.random_seed.to_string()),
        ]
    }

    fn scratch(&self, stem: &str) -> std::result::Result<ScratchFile, ToolError> {
        Ok(ScratchFile::reserve(
            &self.work_dir,
            &format!("{}_{}.npz", stem, std::process::id()),
        )?)
    }

    fn call(
        &self,
        command: &CommandTemplate,
        features: &ProcessedFeatures,
    ) -> std::result::Result<Option<TensorMap>, ToolError> {
        let inputs = self.scratch("model_inputs")?;
        write_npz_path(features.tensors(), inputs.path())?;
        let outputs = self.scratch("model_outputs")?;

        command.run(&self.vars(features, inputs.path(), outputs.path()))?;

        if outputs.path().is_file() {
            Ok(Some(read_npz_path(outputs.path())?))
        } else {
            Ok(None)
        }
    }
}

impl StructureModel for ProcessModel {
    fn run(&mut self, features: &ProcessedFeatures) -> std::result::Result<ModelOutput, ToolError> {
        debug!(model = %self.name, "Running model program.");
        match self.call(&self.run, features)? {
            Some(tensors) => Ok(ModelOutput::new(tensors)),
            None => Err(ToolError::InvalidOutput(format!(
                "model '{}' wrote no output archive",
                self.name
            ))),
        }
    }

    fn compile(&mut self, features: &ProcessedFeatures) -> std::result::Result<(), ToolError> {
        let Some(compile) = &self.compile else {
            return Err(ToolError::Failed(format!(
                "model '{}' has no compile command",
                self.name
            )));
        };
        self.call(compile, features).map(|_| ())
    }
}

/// Dumps the model configuration tree for the feature, model and relax tools.
pub fn write_model_config(model: &ModelConfig, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(MODEL_CONFIG_FILE);
    let json = serde_json::to_string_pretty(model.tree()).map_err(|e| CliError::Other(e.into()))?;
    fs::write(&path, json)?;
    debug!(path = %path.display(), preset = model.preset(), "Wrote model configuration.");
    Ok(path)
}

/// Prepares every requested parameter set. Any missing parameter file stops the run
/// before the first target.
pub fn load_models(app: &AppConfig, config_path: &Path, work_dir: &Path) -> Result<Vec<LoadedModel>> {
    let tool = &app.tools.model;
    let run = CommandTemplate::new(&tool.program, tool.args.clone());
    run.validate("model", &MODEL_VARS)?;
    let compile = match &tool.compile_args {
        Some(args) => {
            let compile = CommandTemplate::new(&tool.program, args.clone());
            compile.validate("model", &MODEL_VARS)?;
            Some(compile)
        }
        None => None,
    };

    app.models
        .iter()
        .map(|spec| {
            load_one(spec, &run, compile.as_ref(), config_path, work_dir, app.random_seed)
        })
        .collect()
}

fn load_one(
    spec: &ModelSpec,
    run: &CommandTemplate,
    compile: Option<&CommandTemplate>,
    config_path: &Path,
    work_dir: &Path,
    random_seed: u64,
) -> Result<LoadedModel> {
    if !spec.params.exists() {
        return Err(CliError::Config(format!(
            "Parameters for model '{}' not found at {}",
            spec.name,
            spec.params.display()
        )));
    }
    info!(
        model = %spec.name,
        kind = spec.kind.as_str(),
        params = %spec.params.display(),
        "Loaded model parameters."
    );
    let model = ProcessModel {
        name: spec.name.clone(),
        params: spec.params.clone(),
        kind: spec.kind,
        run: run.clone(),
        compile: compile.cloned(),
        config_path: config_path.to_path_buf(),
        work_dir: work_dir.to_path_buf(),
        random_seed,
    };
    Ok(LoadedModel::new(
        spec.name.clone(),
        Box::new(model),
        spec.output_dir.clone(),
    ))
}
