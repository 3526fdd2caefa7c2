use super::defaults::DefaultsConfig;
use super::file::ToolsFile;
use super::models::{AppConfig, ModelSpec, ParamsKind};
use crate::cli::PredictArgs;
use crate::error::{CliError, Result};
use foldrun::engine::alignment::AlignmentSource;
use foldrun::engine::config::{
    CompilationConfig, DatabasePreset, DiagnosticsConfig, ModelConfig, OutputConfig,
    OutputFormat, PredictionConfigBuilder,
};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::info;

/// Merges defaults, the tools file, the JSON overlay and the command line, in
/// increasing order of precedence.
pub fn build_config(args: &PredictArgs) -> Result<AppConfig> {
    let tools = ToolsFile::from_file(&args.tools)?;
    build_config_with(args, tools, &DefaultsConfig::default())
}

pub(crate) fn build_config_with(
    args: &PredictArgs,
    tools: ToolsFile,
    defaults: &DefaultsConfig,
) -> Result<AppConfig> {
    let run = &tools.run;

    let output_root = args
        .output_dir
        .clone()
        .or_else(|| run.output_dir.clone())
        .unwrap_or_else(|| defaults.output_dir.clone());
    let cpus = args.cpus.or(run.cpus).unwrap_or(defaults.cpus);
    let database_preset = match (args.preset, run.preset.as_deref()) {
        (Some(preset), _) => preset.into(),
        (None, Some(name)) => name.parse::<DatabasePreset>()?,
        (None, None) => defaults.database_preset,
    };
    let residue_index_gap = args
        .multimer_ri_gap
        .or(run.multimer_ri_gap)
        .unwrap_or(defaults.multimer_ri_gap);
    let interval = run
        .compilation_interval
        .unwrap_or(defaults.compilation_interval);

    let mut model = ModelConfig::for_preset(
        &args.config_preset,
        args.long_sequence_inference,
        args.use_deepspeed_evoformer_attention,
    )?;
    if let Some(path) = &args.experiment_config_json {
        let overlay = read_overlay(path)?;
        model.update_from_flattened(&overlay)?;
        info!(keys = overlay.len(), "Applied experiment configuration overlay.");
    }

    let relax = !args.skip_relaxation;
    if relax && tools.relax.is_none() {
        return Err(CliError::Config(
            "Relaxation is enabled but the tools file has no [relax] section. Add one or pass --skip-relaxation.".to_string(),
        ));
    }
    if args.trace_model && tools.model.compile_args.is_none() {
        return Err(CliError::Config(
            "--trace-model needs `compile-args` in the [model] section of the tools file.".to_string(),
        ));
    }

    let alignment_source = match &args.use_precomputed_alignments {
        Some(dir) => AlignmentSource::Precomputed(dir.clone()),
        None => AlignmentSource::Generate(output_root.join("alignments")),
    };

    let core_config = PredictionConfigBuilder::new()
        .model(model)
        .output_root(output_root.clone())
        .single_sequence_mode(args.use_single_seq_mode)
        .device(&args.model_device)
        .alignment_source(alignment_source)
        .cpus(cpus)
        .database_preset(database_preset)
        .compilation(CompilationConfig {
            enabled: args.trace_model,
            interval,
        })
        .output(OutputConfig {
            format: if args.cif_output {
                OutputFormat::ModelCif
            } else {
                OutputFormat::Pdb
            },
            residue_index_gap,
            subtract_plddt: args.subtract_plddt,
            relax,
        })
        .diagnostics(DiagnosticsConfig {
            enabled: args.save_outputs,
            collapse_homomers: args.collapse_homomers,
        })
        .build()?;

    let models = resolve_models(args, &output_root, defaults);
    let random_seed = args
        .data_random_seed
        .unwrap_or_else(|| u64::from(rand::random::<u32>()));

    Ok(AppConfig {
        fasta_dir: args.fasta_dir.clone(),
        template_mmcif_dir: args.template_mmcif_dir.clone(),
        core_config,
        tools,
        models,
        random_seed,
        enable_template: args.enable_template,
    })
}

fn read_overlay(path: &Path) -> Result<Map<String, Value>> {
    let parse_error = |source: anyhow::Error| CliError::FileParsing {
        path: path.to_path_buf(),
        source,
    };
    let content = std::fs::read_to_string(path).map_err(|e| parse_error(e.into()))?;
    serde_json::from_str(&content).map_err(|e| parse_error(e.into()))
}

fn split_paths(list: &str) -> impl Iterator<Item = PathBuf> + '_ {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
}

/// Model name derived from a parameter path: its final component without extension.
pub fn model_basename(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// JAX parameters first, then OpenFold checkpoints. Predictions of several models go to
/// per-model subdirectories of `<output>/predictions`.
fn resolve_models(args: &PredictArgs, output_root: &Path, defaults: &DefaultsConfig) -> Vec<ModelSpec> {
    let mut params: Vec<(PathBuf, ParamsKind)> = Vec::new();
    if let Some(list) = &args.jax_param_path {
        params.extend(split_paths(list).map(|p| (p, ParamsKind::Jax)));
    }
    if let Some(list) = &args.openfold_checkpoint_path {
        params.extend(split_paths(list).map(|p| (p, ParamsKind::OpenFoldCheckpoint)));
    }
    if params.is_empty() {
        params.push((defaults.default_params_path(&args.config_preset), ParamsKind::Jax));
    }

    let predictions = output_root.join("predictions");
    let multiple = params.len() > 1;
    params
        .into_iter()
        .map(|(path, kind)| {
            let name = model_basename(&path);
            let output_dir = if multiple {
                predictions.join(&name)
            } else {
                predictions.clone()
            };
            ModelSpec {
                name,
                params: path,
                kind,
                output_dir,
            }
        })
        .collect()
}
