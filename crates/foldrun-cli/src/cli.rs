use clap::{Args, Parser, Subcommand, ValueEnum};
use foldrun::engine::config::DatabasePreset;
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "The foldrun developers",
    version,
    about = "foldrun - Batch protein structure prediction over a directory of FASTA files, with cached alignments and features, shape-bucketed compilation and per-target failure isolation.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Predict structures for every FASTA file in a directory with one or more models.
    Predict(PredictArgs),
    /// List the targets a prediction run would process, in processing order.
    Targets(TargetsArgs),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
#[value(rename_all = "snake_case")]
pub enum DatabasePresetArg {
    FullDbs,
    ReducedDbs,
}

impl From<DatabasePresetArg> for DatabasePreset {
    fn from(arg: DatabasePresetArg) -> Self {
        match arg {
            DatabasePresetArg::FullDbs => DatabasePreset::FullDbs,
            DatabasePresetArg::ReducedDbs => DatabasePreset::ReducedDbs,
        }
    }
}

/// Arguments for the `predict` subcommand.
#[derive(Args, Debug, Clone)]
pub struct PredictArgs {
    // --- Inputs ---
    /// Directory containing `.fasta`/`.fa` files, one target per file.
    #[arg(value_name = "FASTA_DIR")]
    pub fasta_dir: PathBuf,

    /// Directory of template structures in mmCIF format.
    #[arg(value_name = "TEMPLATE_MMCIF_DIR")]
    pub template_mmcif_dir: PathBuf,

    /// TOML file describing the external alignment, feature, model and relaxation tools.
    #[arg(short, long, value_name = "PATH")]
    pub tools: PathBuf,

    /// Directory in which to write alignments and predictions [default: current directory]
    #[arg(short, long, value_name = "PATH")]
    pub output_dir: Option<PathBuf>,

    // --- Model selection ---
    /// Name of the model configuration preset (e.g., 'model_1', 'model_1_multimer_v3').
    #[arg(long, value_name = "NAME", default_value = "model_1")]
    pub config_preset: String,

    /// Device the model runs on (e.g., 'cpu', 'cuda:0').
    #[arg(long, value_name = "DEVICE", default_value = "cpu")]
    pub model_device: String,

    /// Comma-separated JAX parameter files. Defaults to
    /// 'openfold/resources/params/params_<preset>.npz' when no checkpoint is given either.
    #[arg(long, value_name = "PATHS")]
    pub jax_param_path: Option<String>,

    /// Comma-separated OpenFold checkpoints (DeepSpeed directories or .pt files).
    #[arg(long, value_name = "PATHS")]
    pub openfold_checkpoint_path: Option<String>,

    /// JSON file of flattened configuration keys overriding the preset
    /// (e.g., {"data.predict.fixed_size": false}).
    #[arg(long, value_name = "PATH")]
    pub experiment_config_json: Option<PathBuf>,

    /// Reduce memory usage at the cost of speed for long sequences.
    #[arg(long)]
    pub long_sequence_inference: bool,

    /// Use the DeepSpeed evoformer attention kernel.
    #[arg(long)]
    pub use_deepspeed_evoformer_attention: bool,

    // --- Alignments and features ---
    /// Directory of alignments computed ahead of time. No alignment search is run.
    #[arg(long, value_name = "PATH")]
    pub use_precomputed_alignments: Option<PathBuf>,

    /// Use single-sequence embeddings instead of alignments.
    #[arg(long)]
    pub use_single_seq_mode: bool,

    /// Include template features.
    #[arg(long)]
    pub enable_template: bool,

    /// Number of CPUs available to the alignment tools.
    #[arg(long, value_name = "INT")]
    pub cpus: Option<usize>,

    /// Sequence database preset for alignment search.
    #[arg(long, value_enum, value_name = "PRESET")]
    pub preset: Option<DatabasePresetArg>,

    /// Random seed forwarded to the feature and model tools. Drawn at random when absent.
    #[arg(long, value_name = "INT")]
    pub data_random_seed: Option<u64>,

    // --- Execution ---
    /// Compile each model ahead of time for length buckets of growing size.
    #[arg(long)]
    pub trace_model: bool,

    // --- Outputs ---
    /// Do not run relaxation on the predicted structures.
    #[arg(long)]
    pub skip_relaxation: bool,

    /// Save metrics, alignment statistics and raw alignments for every prediction.
    #[arg(long)]
    pub save_outputs: bool,

    /// Treat the second chain as a copy of the first when counting alignment rows
    /// of homodimers.
    #[arg(long, requires = "save_outputs")]
    pub collapse_homomers: bool,

    /// Write ModelCIF instead of PDB.
    #[arg(long)]
    pub cif_output: bool,

    /// Residue index offset separating chains in single-chain mode.
    #[arg(long, value_name = "INT")]
    pub multimer_ri_gap: Option<i32>,

    /// Write (100 - pLDDT) to the B-factor column instead of pLDDT.
    #[arg(long)]
    pub subtract_plddt: bool,
}

/// Arguments for the `targets` subcommand.
#[derive(Args, Debug, Clone)]
pub struct TargetsArgs {
    /// Directory containing `.fasta`/`.fa` files.
    #[arg(value_name = "FASTA_DIR")]
    pub fasta_dir: PathBuf,

    /// Model preset; decides whether multi-sequence files are accepted.
    #[arg(long, value_name = "NAME", default_value = "model_1")]
    pub config_preset: String,
}
