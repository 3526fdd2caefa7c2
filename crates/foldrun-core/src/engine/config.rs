use super::alignment::AlignmentSource;
use super::compilation::COMPILATION_INTERVAL;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Unknown model configuration preset: '{0}'")]
    UnknownPreset(String),

    #[error("Unknown configuration key: '{0}'")]
    UnknownKey(String),

    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Compilation requires 'data.predict.fixed_size' to be enabled")]
    TracingRequiresFixedSize,

    #[error("Compilation interval must be greater than zero")]
    ZeroCompilationInterval,
}

/// Whether targets are predicted as single chains or as complexes.
///
/// Fixed once per run from the model preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainMode {
    Monomer,
    Multimer,
}

impl ChainMode {
    pub fn from_preset(preset: &str) -> Self {
        if preset.contains("multimer") {
            ChainMode::Multimer
        } else {
            ChainMode::Monomer
        }
    }

    pub fn is_multimer(self) -> bool {
        self == ChainMode::Multimer
    }

    /// Template search strategy used when generating alignments in this mode.
    pub fn template_search(self) -> TemplateSearch {
        match self {
            ChainMode::Multimer => TemplateSearch::Hmmsearch,
            ChainMode::Monomer => TemplateSearch::Hhsearch,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateSearch {
    Hhsearch,
    Hmmsearch,
}

impl TemplateSearch {
    pub fn as_str(self) -> &'static str {
        match self {
            TemplateSearch::Hhsearch => "hhsearch",
            TemplateSearch::Hmmsearch => "hmmsearch",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Pdb,
    ModelCif,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Pdb => "pdb",
            OutputFormat::ModelCif => "cif",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabasePreset {
    #[default]
    FullDbs,
    ReducedDbs,
}

impl DatabasePreset {
    pub fn as_str(self) -> &'static str {
        match self {
            DatabasePreset::FullDbs => "full_dbs",
            DatabasePreset::ReducedDbs => "reduced_dbs",
        }
    }
}

impl FromStr for DatabasePreset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full_dbs" => Ok(DatabasePreset::FullDbs),
            "reduced_dbs" => Ok(DatabasePreset::ReducedDbs),
            other => Err(ConfigError::InvalidValue {
                key: "preset".to_string(),
                reason: format!("expected 'full_dbs' or 'reduced_dbs', got '{}'", other),
            }),
        }
    }
}

/// What the alignment runner is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentMode {
    /// Full multiple sequence alignments plus template hits.
    #[default]
    Full,
    /// Template hits and per-sequence embeddings only (single-sequence mode).
    SequenceEmbedding,
}

impl AlignmentMode {
    pub fn as_str(self) -> &'static str {
        match self {
            AlignmentMode::Full => "full",
            AlignmentMode::SequenceEmbedding => "sequence_embedding",
        }
    }
}

/// The hierarchical model configuration, created from a named preset.
///
/// The tree is kept as JSON so it can be overlaid with flattened dotted keys and
/// handed verbatim to the model and feature tools.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelConfig {
    preset: String,
    tree: Value,
}

fn base_tree() -> Value {
    json!({
        "globals": {
            "chunk_size": 4,
            "use_lma": false,
            "offload_inference": false,
            "use_deepspeed_evo_attention": false,
            "is_multimer": false,
            "seqemb_mode_enabled": false,
        },
        "data": {
            "common": {
                "max_recycling_iters": 3,
                "use_templates": true,
                "use_template_torsion_angles": true,
                "reduce_msa_clusters_by_max_templates": false,
            },
            "predict": {
                "fixed_size": true,
                "max_msa_clusters": 512,
                "max_extra_msa": 1024,
                "max_templates": 4,
                "subsample_templates": false,
            },
        },
        "model": {
            "template": { "enabled": true },
            "extra_msa": { "enabled": true },
            "heads": { "tm": { "enabled": false } },
        },
        "relax": {
            "max_iterations": 0,
            "tolerance": 2.39,
            "stiffness": 10.0,
            "max_outer_iterations": 20,
            "exclude_residues": [],
        },
    })
}

fn set(tree: &mut Value, path: &str, value: Value) {
    let mut node = tree;
    for key in path.split('.') {
        node = &mut node[key];
    }
    *node = value;
}

/// Models 1 and 2 use templates and a deep extra MSA; models 3 to 5 run without templates.
fn apply_monomer_layout(tree: &mut Value, number: u8) {
    if number <= 2 {
        set(tree, "data.predict.max_extra_msa", json!(5120));
    } else {
        set(tree, "data.common.use_templates", json!(false));
        set(tree, "model.template.enabled", json!(false));
    }
}

fn parse_model_number(s: &str) -> Option<u8> {
    match s.parse::<u8>() {
        Ok(n @ 1..=5) => Some(n),
        _ => None,
    }
}

impl ModelConfig {
    /// Builds the configuration tree of a named preset.
    ///
    /// Recognised presets are `model_1`..`model_5`, their `_ptm` variants,
    /// `model_N_multimer[_v2|_v3]`, and `seq_model_esm1b[_ptm]`.
    pub fn for_preset(
        preset: &str,
        long_sequence_inference: bool,
        use_deepspeed_evoformer_attention: bool,
    ) -> Result<Self, ConfigError> {
        let unknown = || ConfigError::UnknownPreset(preset.to_string());
        let mut tree = base_tree();

        if let Some(rest) = preset.strip_prefix("seq_model_esm1b") {
            let ptm = match rest {
                "" => false,
                "_ptm" => true,
                _ => return Err(unknown()),
            };
            set(&mut tree, "globals.seqemb_mode_enabled", json!(true));
            set(&mut tree, "data.predict.max_msa_clusters", json!(1));
            set(&mut tree, "data.predict.max_extra_msa", json!(1));
            set(&mut tree, "model.extra_msa.enabled", json!(false));
            set(&mut tree, "model.heads.tm.enabled", json!(ptm));
        } else {
            let rest = preset.strip_prefix("model_").ok_or_else(unknown)?;
            let (number, variant) = rest.split_once('_').unwrap_or((rest, ""));
            let number = parse_model_number(number).ok_or_else(unknown)?;
            match variant {
                "" => apply_monomer_layout(&mut tree, number),
                "ptm" => {
                    apply_monomer_layout(&mut tree, number);
                    set(&mut tree, "model.heads.tm.enabled", json!(true));
                }
                // Multimer weights share one template and MSA layout across model numbers.
                "multimer" | "multimer_v2" | "multimer_v3" => {
                    set(&mut tree, "globals.is_multimer", json!(true));
                    set(&mut tree, "data.predict.max_msa_clusters", json!(252));
                    set(&mut tree, "data.predict.max_extra_msa", json!(1152));
                    set(&mut tree, "model.heads.tm.enabled", json!(true));
                }
                _ => return Err(unknown()),
            }
        }

        if long_sequence_inference {
            set(&mut tree, "globals.offload_inference", json!(true));
            set(&mut tree, "globals.use_lma", json!(true));
            set(&mut tree, "globals.chunk_size", json!(Value::Null));
        }
        if use_deepspeed_evoformer_attention {
            set(&mut tree, "globals.use_deepspeed_evo_attention", json!(true));
        }

        Ok(Self {
            preset: preset.to_string(),
            tree,
        })
    }

    pub fn preset(&self) -> &str {
        &self.preset
    }

    pub fn tree(&self) -> &Value {
        &self.tree
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .try_fold(&self.tree, |node, key| node.as_object()?.get(key))
    }

    pub fn get_bool(&self, path: &str) -> Result<bool, ConfigError> {
        self.get(path)
            .ok_or_else(|| ConfigError::UnknownKey(path.to_string()))?
            .as_bool()
            .ok_or_else(|| ConfigError::InvalidValue {
                key: path.to_string(),
                reason: "expected a boolean".to_string(),
            })
    }

    pub fn get_usize(&self, path: &str) -> Result<usize, ConfigError> {
        self.get(path)
            .ok_or_else(|| ConfigError::UnknownKey(path.to_string()))?
            .as_u64()
            .and_then(|v| usize::try_from(v).ok())
            .ok_or_else(|| ConfigError::InvalidValue {
                key: path.to_string(),
                reason: "expected a non-negative integer".to_string(),
            })
    }

    /// Overwrites leaves of the tree from a flattened `{"a.b.c": value}` document.
    ///
    /// Every dotted key must name an existing entry, and a subtree may not be
    /// replaced by a scalar. Applying the same overlay twice yields the same tree.
    pub fn update_from_flattened(&mut self, overlay: &Map<String, Value>) -> Result<(), ConfigError> {
        for (dotted, value) in overlay {
            let mut node = &mut self.tree;
            for key in dotted.split('.') {
                node = node
                    .as_object_mut()
                    .and_then(|object| object.get_mut(key))
                    .ok_or_else(|| ConfigError::UnknownKey(dotted.clone()))?;
            }
            if node.is_object() && !value.is_object() {
                return Err(ConfigError::InvalidValue {
                    key: dotted.clone(),
                    reason: "cannot replace a configuration section with a scalar".to_string(),
                });
            }
            *node = value.clone();
        }
        Ok(())
    }

    pub fn is_multimer(&self) -> bool {
        self.get_bool("globals.is_multimer").unwrap_or(false)
    }

    pub fn fixed_size(&self) -> bool {
        self.get_bool("data.predict.fixed_size").unwrap_or(false)
    }

    pub fn max_recycling_iters(&self) -> Result<usize, ConfigError> {
        self.get_usize("data.common.max_recycling_iters")
    }

    pub fn max_msa_clusters(&self) -> Result<usize, ConfigError> {
        self.get_usize("data.predict.max_msa_clusters")
    }

    pub fn max_extra_msa(&self) -> Result<usize, ConfigError> {
        self.get_usize("data.predict.max_extra_msa")
    }

    pub fn max_templates(&self) -> Result<usize, ConfigError> {
        self.get_usize("data.predict.max_templates")
    }
}

impl fmt::Display for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.preset)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentConfig {
    pub source: AlignmentSource,
    pub cpus: usize,
    pub database_preset: DatabasePreset,
    pub mode: AlignmentMode,
}

/// Ahead-of-time compilation ("tracing") settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompilationConfig {
    pub enabled: bool,
    pub interval: usize,
}

impl Default for CompilationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: COMPILATION_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub residue_index_gap: i32,
    pub subtract_plddt: bool,
    pub relax: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Pdb,
            residue_index_gap: 200,
            subtract_plddt: false,
            relax: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiagnosticsConfig {
    pub enabled: bool,
    /// Treat chain 2 as an alias of chain 1 when computing alignment statistics.
    pub collapse_homomers: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionConfig {
    pub model: ModelConfig,
    pub chain_mode: ChainMode,
    pub single_sequence_mode: bool,
    pub device: String,
    pub output_root: PathBuf,
    pub alignment: AlignmentConfig,
    pub compilation: CompilationConfig,
    pub output: OutputConfig,
    pub diagnostics: DiagnosticsConfig,
}

impl PredictionConfig {
    /// Rejects combinations that must stop the run before any target is touched.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.compilation.enabled {
            if self.compilation.interval == 0 {
                return Err(ConfigError::ZeroCompilationInterval);
            }
            if !self.model.fixed_size() {
                return Err(ConfigError::TracingRequiresFixedSize);
            }
        }
        if self.alignment.cpus == 0 {
            return Err(ConfigError::InvalidValue {
                key: "cpus".to_string(),
                reason: "at least one CPU is required".to_string(),
            });
        }
        if self.output.residue_index_gap <= 0 {
            return Err(ConfigError::InvalidValue {
                key: "multimer_ri_gap".to_string(),
                reason: "the residue index gap must be positive".to_string(),
            });
        }
        self.model.max_recycling_iters()?;
        self.model.max_msa_clusters()?;
        self.model.max_extra_msa()?;
        Ok(())
    }

    /// The compilation interval, if compilation is enabled.
    pub fn compilation_interval(&self) -> Option<usize> {
        self.compilation.enabled.then_some(self.compilation.interval)
    }
}

#[derive(Default)]
pub struct PredictionConfigBuilder {
    model: Option<ModelConfig>,
    output_root: Option<PathBuf>,
    single_sequence_mode: Option<bool>,
    device: Option<String>,
    alignment_source: Option<AlignmentSource>,
    cpus: Option<usize>,
    database_preset: Option<DatabasePreset>,
    compilation: Option<CompilationConfig>,
    output: Option<OutputConfig>,
    diagnostics: Option<DiagnosticsConfig>,
}

impl PredictionConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(mut self, model: ModelConfig) -> Self {
        self.model = Some(model);
        self
    }
    pub fn output_root(mut self, path: PathBuf) -> Self {
        self.output_root = Some(path);
        self
    }
    pub fn single_sequence_mode(mut self, enabled: bool) -> Self {
        self.single_sequence_mode = Some(enabled);
        self
    }
    pub fn device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }
    pub fn alignment_source(mut self, source: AlignmentSource) -> Self {
        self.alignment_source = Some(source);
        self
    }
    pub fn cpus(mut self, cpus: usize) -> Self {
        self.cpus = Some(cpus);
        self
    }
    pub fn database_preset(mut self, preset: DatabasePreset) -> Self {
        self.database_preset = Some(preset);
        self
    }
    pub fn compilation(mut self, compilation: CompilationConfig) -> Self {
        self.compilation = Some(compilation);
        self
    }
    pub fn output(mut self, output: OutputConfig) -> Self {
        self.output = Some(output);
        self
    }
    pub fn diagnostics(mut self, diagnostics: DiagnosticsConfig) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    pub fn build(self) -> Result<PredictionConfig, ConfigError> {
        let model = self.model.ok_or(ConfigError::MissingParameter("model"))?;
        let output_root = self
            .output_root
            .ok_or(ConfigError::MissingParameter("output_root"))?;

        let single_sequence_mode =
            self.single_sequence_mode.unwrap_or(false) || model.preset().starts_with("seq");
        let chain_mode = ChainMode::from_preset(model.preset());

        let alignment = AlignmentConfig {
            source: self
                .alignment_source
                .unwrap_or_else(|| AlignmentSource::Generate(output_root.join("alignments"))),
            cpus: self.cpus.unwrap_or(4),
            database_preset: self.database_preset.unwrap_or_default(),
            mode: if single_sequence_mode {
                AlignmentMode::SequenceEmbedding
            } else {
                AlignmentMode::Full
            },
        };

        let config = PredictionConfig {
            model,
            chain_mode,
            single_sequence_mode,
            device: self.device.unwrap_or_else(|| "cpu".to_string()),
            output_root,
            alignment,
            compilation: self.compilation.unwrap_or_default(),
            output: self.output.unwrap_or_default(),
            diagnostics: self.diagnostics.unwrap_or_default(),
        };
        config.validate()?;
        Ok(config)
    }
}
