use super::config::{
    ChainMode, ConfigError, DiagnosticsConfig, ModelConfig, OutputConfig, OutputFormat,
};
use super::error::{EngineError, ToolError};
use super::msa_stats::{self, ChainLayout};
use super::state::TargetStage;
use crate::core::io::mmcif::ModelCifFile;
use crate::core::io::npz::write_npz_path;
use crate::core::io::pdb::PdbFile;
use crate::core::io::traits::StructureFile;
use crate::core::models::features::{FeatureRecord, ModelOutput, ProcessedFeatures};
use crate::core::models::protein::{PredictionArrays, Protein};
use crate::core::models::target::Target;
use crate::core::models::tensor::{Tensor, TensorError, TensorMap};
use ndarray::{Array1, ArrayD, Ix1, Ix2, Ix3};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Model outputs copied into `analysis/metrics.json` when the model reports them.
const METRIC_KEYS: [&str; 6] = [
    "plddt",
    "ptm_score",
    "iptm_score",
    "predicted_aligned_error",
    "num_recycles",
    "tm_logits",
];

/// Feature-record entries added to the metrics.
const FEATURE_METRIC_KEYS: [&str; 2] = ["num_alignments", "num_templates"];

#[derive(Debug, Clone, Copy)]
pub struct RelaxRequest<'a> {
    pub unrelaxed_path: &'a Path,
    pub relaxed_path: &'a Path,
    pub device: &'a str,
    pub model_config: &'a ModelConfig,
}

/// Energy-minimization post-processing of a written structure.
///
/// Implementors read `unrelaxed_path` and must write `relaxed_path` in the same format.
pub trait Relaxer {
    fn relax(&self, request: &RelaxRequest<'_>) -> Result<(), ToolError>;
}

/// Paths of everything written for one (model, target) pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputArtifact {
    pub unrelaxed: PathBuf,
    pub relaxed: Option<PathBuf>,
    pub metrics: Option<PathBuf>,
    pub msa_stats: Option<PathBuf>,
    pub raw_msa: Option<PathBuf>,
}

pub struct OutputPersister<'a> {
    model: &'a ModelConfig,
    chain_mode: ChainMode,
    device: &'a str,
    output: OutputConfig,
    diagnostics: DiagnosticsConfig,
    relaxer: Option<&'a dyn Relaxer>,
}

impl<'a> OutputPersister<'a> {
    /// `relaxer` is only consulted when relaxation is enabled in `output`.
    pub fn new(
        model: &'a ModelConfig,
        chain_mode: ChainMode,
        device: &'a str,
        output: OutputConfig,
        diagnostics: DiagnosticsConfig,
        relaxer: Option<&'a dyn Relaxer>,
    ) -> Self {
        Self {
            model,
            chain_mode,
            device,
            output,
            diagnostics,
            relaxer,
        }
    }

    /// Writes the structure, its relaxed sibling and diagnostics into `output_dir`.
    ///
    /// Either everything is written or nothing is left behind: on error, every file this
    /// call may have produced is removed again.
    pub fn write(
        &self,
        target: &Target,
        output: &ModelOutput,
        processed: &ProcessedFeatures,
        features: &FeatureRecord,
        output_dir: &Path,
        stage: &mut TargetStage,
    ) -> Result<OutputArtifact, EngineError> {
        let result = self.write_all(target, output, processed, features, output_dir, stage);
        if result.is_err() {
            self.discard(output_dir);
        }
        result
    }

    fn write_all(
        &self,
        target: &Target,
        output: &ModelOutput,
        processed: &ProcessedFeatures,
        features: &FeatureRecord,
        output_dir: &Path,
        stage: &mut TargetStage,
    ) -> Result<OutputArtifact, EngineError> {
        fs::create_dir_all(output_dir).map_err(EngineError::output(output_dir))?;

        let last = processed.last_recycle()?;
        let protein = self.build_protein(target, output, &last)?;

        let extension = self.output.format.extension();
        let unrelaxed = output_dir.join(format!("unrelaxed.{}", extension));
        match self.output.format {
            OutputFormat::Pdb => PdbFile::write_to_path(&protein, &unrelaxed)?,
            OutputFormat::ModelCif => ModelCifFile::write_to_path(&protein, &unrelaxed)?,
        }
        info!(
            target = target.file_stem(),
            path = %unrelaxed.display(),
            residues = protein.residues.len(),
            "Wrote unrelaxed structure."
        );
        stage.advance(TargetStage::Written);

        let mut artifact = OutputArtifact {
            unrelaxed,
            ..OutputArtifact::default()
        };

        if self.output.relax {
            let relaxed = output_dir.join(format!("relaxed.{}", extension));
            self.relax(&artifact.unrelaxed, &relaxed)?;
            artifact.relaxed = Some(relaxed);
            stage.advance(TargetStage::Relaxed);
        }

        if self.diagnostics.enabled {
            self.save_diagnostics(target, output, processed, features, output_dir, &mut artifact)?;
            stage.advance(TargetStage::MetricsSaved);
        }

        Ok(artifact)
    }

    fn discard(&self, output_dir: &Path) {
        let extension = self.output.format.extension();
        let files = [
            output_dir.join(format!("unrelaxed.{}", extension)),
            output_dir.join(format!("relaxed.{}", extension)),
            output_dir.join("tmp").join("raw_msa.npz"),
        ];
        for file in files.iter().filter(|f| f.exists()) {
            if let Err(e) = fs::remove_file(file) {
                warn!(path = %file.display(), error = %e, "Could not remove output of a failed target.");
            }
        }
        let analysis_dir = output_dir.join("analysis");
        if analysis_dir.exists() {
            if let Err(e) = fs::remove_dir_all(&analysis_dir) {
                warn!(path = %analysis_dir.display(), error = %e, "Could not remove output of a failed target.");
            }
        }
        // Only succeeds when nothing else lives in tmp/.
        let _ = fs::remove_dir(output_dir.join("tmp"));
    }

    fn relax(&self, unrelaxed: &Path, relaxed: &Path) -> Result<(), EngineError> {
        let relaxer = self
            .relaxer
            .ok_or(ConfigError::MissingParameter("relaxer"))?;
        info!(path = %unrelaxed.display(), "Running relaxation.");
        let request = RelaxRequest {
            unrelaxed_path: unrelaxed,
            relaxed_path: relaxed,
            device: self.device,
            model_config: self.model,
        };
        relaxer
            .relax(&request)
            .map_err(|source| EngineError::Relaxation {
                path: unrelaxed.to_path_buf(),
                source,
            })
    }

    /// Assembles the structure from the last recycling iteration of the features.
    pub fn build_protein(
        &self,
        target: &Target,
        output: &ModelOutput,
        last: &TensorMap,
    ) -> Result<Protein, EngineError> {
        let restypes = restypes(last.require("aatype")?)?;
        let residue_index: Vec<i32> = last
            .require("residue_index")?
            .to_f64_vec()
            .into_iter()
            .map(|v| v as i32)
            .collect();

        let (chain_index, residue_index) = if self.chain_mode.is_multimer() {
            let chains = last
                .require("asym_id")?
                .to_f64_vec()
                .into_iter()
                .map(|id| (id as i64 - 1).max(0) as usize)
                .collect();
            (chains, residue_index.iter().map(|ri| ri + 1).collect())
        } else {
            split_chains_by_gap(&residue_index, self.output.residue_index_gap)
        };

        let positions = fixed_rank::<Ix3>(output, "final_atom_positions")?;
        let mask = fixed_rank::<Ix2>(output, "final_atom_mask")?;
        let plddt = fixed_rank::<Ix1>(output, "plddt")?;
        let b_factors: Array1<f32> = if self.output.subtract_plddt {
            plddt.mapv(|p| 100.0 - p)
        } else {
            plddt.to_owned()
        };

        let remark = format!(
            "no_recycling={}, max_templates={}, config_preset={}",
            self.model.max_recycling_iters()?,
            self.model.max_templates()?,
            self.model.preset()
        );

        let protein = Protein::from_arrays(
            target.tag(),
            PredictionArrays {
                restypes: &restypes,
                residue_index: &residue_index,
                chain_index: &chain_index,
                atom_positions: positions,
                atom_mask: mask,
                b_factors: b_factors.view(),
            },
        )?;
        Ok(protein.with_remark(remark))
    }

    fn save_diagnostics(
        &self,
        target: &Target,
        output: &ModelOutput,
        processed: &ProcessedFeatures,
        features: &FeatureRecord,
        output_dir: &Path,
        artifact: &mut OutputArtifact,
    ) -> Result<(), EngineError> {
        let analysis_dir = output_dir.join("analysis");
        let tmp_dir = output_dir.join("tmp");
        fs::create_dir_all(&analysis_dir).map_err(EngineError::output(&analysis_dir))?;
        fs::create_dir_all(&tmp_dir).map_err(EngineError::output(&tmp_dir))?;

        let total = features.require_int("msa")?;
        let retained = processed.require_int("true_msa")?;
        let extra = processed.require_int("extra_msa")?;
        let available = processed.num_recycles()?;
        let performed = output.num_recycles().unwrap_or(available).min(available);

        let metrics_path = analysis_dir.join("metrics.json");
        write_metrics(output, features, &metrics_path)?;
        artifact.metrics = Some(metrics_path);

        let layout = ChainLayout::for_target(target, self.diagnostics.collapse_homomers);
        let stats = msa_stats::aggregate(total, retained, extra, layout, available)?
            .truncated(performed);
        let stats_path = analysis_dir.join("msa_stats.csv");
        stats.write_csv_path(&stats_path)?;
        artifact.msa_stats = Some(stats_path);

        let mut raw = TensorMap::new();
        raw.insert("total_msa", Tensor::Int(total.clone()));
        raw.insert("msa_recycle", Tensor::Int(retained.clone()).slice_axis(2, 0, performed));
        raw.insert(
            "extra_msa_recycle",
            Tensor::Int(extra.clone()).slice_axis(2, 0, performed),
        );
        let raw_path = tmp_dir.join("raw_msa.npz");
        write_npz_path(&raw, &raw_path).map_err(EngineError::diagnostics(&raw_path))?;
        artifact.raw_msa = Some(raw_path);

        debug!(
            target = target.file_stem(),
            recycles = performed,
            "Saved diagnostics."
        );
        Ok(())
    }
}

fn write_metrics(
    output: &ModelOutput,
    features: &FeatureRecord,
    path: &Path,
) -> Result<(), EngineError> {
    let metrics: BTreeMap<&str, &Tensor> = METRIC_KEYS
        .iter()
        .filter_map(|&key| output.get(key).map(|t| (key, t)))
        .chain(
            FEATURE_METRIC_KEYS
                .iter()
                .filter_map(|&key| features.get(key).map(|t| (key, t))),
        )
        .collect();

    let file = File::create(path).map_err(EngineError::output(path))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &metrics).map_err(EngineError::diagnostics(path))?;
    writer.flush().map_err(EngineError::output(path))
}

/// Residue types from either integer codes `[N]` or a one-hot encoding `[N, classes]`.
fn restypes(aatype: &Tensor) -> Result<Vec<usize>, TensorError> {
    let values = aatype.to_f64_vec();
    match *aatype.shape() {
        [_] => Ok(values.iter().map(|&v| v.max(0.0) as usize).collect()),
        [_, classes] if classes > 0 => Ok(values.chunks(classes).map(argmax).collect()),
        _ => Err(TensorError::Shape {
            name: "aatype".to_string(),
            shape: aatype.shape().to_vec(),
            reason: "expected residue codes or a one-hot encoding".to_string(),
        }),
    }
}

fn argmax(row: &[f64]) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
        .0
}

fn fixed_rank<'t, D: ndarray::Dimension>(
    output: &'t ModelOutput,
    name: &str,
) -> Result<ndarray::ArrayView<'t, f32, D>, TensorError> {
    let array: &ArrayD<f32> = output.require_float(name)?;
    array
        .view()
        .into_dimensionality::<D>()
        .map_err(|e| TensorError::Shape {
            name: name.to_string(),
            shape: array.shape().to_vec(),
            reason: e.to_string(),
        })
}

/// Recovers chain membership of a single-chain-mode prediction from jumps of `gap`
/// in the residue index, restarting the (1-based) numbering for every chain.
pub fn split_chains_by_gap(residue_index: &[i32], gap: i32) -> (Vec<usize>, Vec<i32>) {
    let gap = i64::from(gap);
    let mut chains = Vec::with_capacity(residue_index.len());
    let mut renumbered = Vec::with_capacity(residue_index.len());
    let mut current = 0i64;
    let mut offset = 0i64;
    for (i, &ri) in residue_index.iter().enumerate() {
        let chain = (i64::from(ri) - i as i64).checked_div(gap).unwrap_or(0);
        if chain != current {
            current = chain;
            offset = i as i64 + chain * gap;
        }
        chains.push(chain.max(0) as usize);
        renumbered.push((i64::from(ri) - offset + 1) as i32);
    }
    (chains, renumbered)
}
