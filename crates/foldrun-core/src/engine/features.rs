use super::compilation::round_up_seqlen;
use super::config::ChainMode;
use super::error::{EngineError, ToolError};
use super::scratch::ScratchFile;
use crate::core::models::features::FeatureRecord;
use crate::core::models::target::Target;
use crate::core::models::tensor::TensorError;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// How the feature pipeline is driven for one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureStrategy {
    /// All chains in one FASTA against the per-target alignment directory.
    Multimer,
    /// One sequence against its own chain alignment directory.
    SingleChain { sequence_embedding: bool },
    /// Several sequences in single-chain mode, sharing the per-target directory.
    MultiSequence,
}

impl FeatureStrategy {
    pub fn select(chain_mode: ChainMode, single_sequence_mode: bool, chain_count: usize) -> Self {
        match chain_mode {
            ChainMode::Multimer => FeatureStrategy::Multimer,
            ChainMode::Monomer if chain_count == 1 => FeatureStrategy::SingleChain {
                sequence_embedding: single_sequence_mode,
            },
            ChainMode::Monomer => FeatureStrategy::MultiSequence,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FeatureStrategy::Multimer => "multimer",
            FeatureStrategy::SingleChain {
                sequence_embedding: true,
            } => "sequence_embedding",
            FeatureStrategy::SingleChain { .. } => "single_chain",
            FeatureStrategy::MultiSequence => "multi_sequence",
        }
    }
}

/// Inputs handed to the feature pipeline for one target.
#[derive(Debug, Clone, Copy)]
pub struct FeatureRequest<'a> {
    pub target: &'a Target,
    pub strategy: FeatureStrategy,
    pub fasta_path: &'a Path,
    pub alignment_dir: &'a Path,
    /// Where template hit information is saved (multimer only).
    pub template_output_dir: Option<&'a Path>,
}

/// External feature assembly from sequences, alignments and templates.
pub trait FeaturePipeline {
    fn build(&self, request: &FeatureRequest<'_>) -> Result<FeatureRecord, ToolError>;
}

/// In-memory feature records keyed by composite tag, kept for the whole batch.
#[derive(Debug, Default)]
pub struct FeatureCache {
    records: HashMap<String, FeatureRecord>,
}

impl FeatureCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tag: &str) -> Option<&FeatureRecord> {
        self.records.get(tag)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.records.contains_key(tag)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub struct FeatureAssembler<'a> {
    pipeline: &'a dyn FeaturePipeline,
    chain_mode: ChainMode,
    single_sequence_mode: bool,
    compilation_interval: Option<usize>,
    scratch_dir: PathBuf,
}

impl<'a> FeatureAssembler<'a> {
    pub fn new(
        pipeline: &'a dyn FeaturePipeline,
        chain_mode: ChainMode,
        single_sequence_mode: bool,
        compilation_interval: Option<usize>,
        scratch_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            pipeline,
            chain_mode,
            single_sequence_mode,
            compilation_interval,
            scratch_dir: scratch_dir.into(),
        }
    }

    /// Returns the cached record for `target`, building (and padding) it on first use.
    pub fn assemble<'c>(
        &self,
        cache: &'c mut FeatureCache,
        target: &Target,
        alignment_dir: &Path,
        output_dir: &Path,
    ) -> Result<&'c FeatureRecord, EngineError> {
        match cache.records.entry(target.tag().to_string()) {
            Entry::Occupied(entry) => {
                debug!(tag = target.tag(), "Feature cache hit.");
                Ok(entry.into_mut())
            }
            Entry::Vacant(entry) => {
                let record = self.build(target, alignment_dir, output_dir)?;
                Ok(entry.insert(record))
            }
        }
    }

    fn build(
        &self,
        target: &Target,
        alignment_dir: &Path,
        output_dir: &Path,
    ) -> Result<FeatureRecord, EngineError> {
        let strategy =
            FeatureStrategy::select(self.chain_mode, self.single_sequence_mode, target.chain_count());
        info!(tag = target.tag(), ?strategy, "Assembling features.");

        let scratch = ScratchFile::fasta(&self.scratch_dir, target.chains()).map_err(|source| {
            EngineError::Scratch {
                path: ScratchFile::fasta_path(&self.scratch_dir),
                source,
            }
        })?;

        let chain_dir;
        let (alignment_dir, template_output_dir) = match strategy {
            FeatureStrategy::Multimer => (alignment_dir, Some(output_dir)),
            FeatureStrategy::SingleChain { .. } => {
                chain_dir = alignment_dir.join(&target.chains()[0].tag);
                (chain_dir.as_path(), None)
            }
            FeatureStrategy::MultiSequence => (alignment_dir, None),
        };

        let request = FeatureRequest {
            target,
            strategy,
            fasta_path: scratch.path(),
            alignment_dir,
            template_output_dir,
        };
        let record = self
            .pipeline
            .build(&request)
            .map_err(|source| EngineError::Features {
                tag: target.tag().to_string(),
                source,
            })?;
        drop(scratch);

        match self.compilation_interval {
            Some(interval) => {
                let processing_error = |source: TensorError| EngineError::Processing {
                    tag: target.tag().to_string(),
                    source,
                };
                let residues = record.num_residues().map_err(processing_error)?;
                let padded_len = round_up_seqlen(residues, interval);
                debug!(tag = target.tag(), residues, padded_len, "Padding features for compilation.");
                record.padded_to(padded_len).map_err(processing_error)
            }
            None => Ok(record),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::models::target::ChainSequence;
    use crate::core::models::tensor::{Tensor, TensorMap};
    use ndarray::{ArrayD, IxDyn};
    use std::cell::RefCell;
    use tempfile::tempdir;

    /// Builds a one-hot `aatype`, an `msa` of three aligned rows plus one all-gap row, and
    /// the bookkeeping features the persister reads.
    pub(crate) fn synthetic_record(residues: usize) -> FeatureRecord {
        let mut tensors = TensorMap::new();
        tensors.insert(
            "aatype",
            Tensor::Int(ArrayD::from_shape_fn(IxDyn(&[residues, 21]), |i| {
                i32::from(i[1] == i[0] % 20)
            })),
        );
        tensors.insert(
            "msa",
            Tensor::Int(ArrayD::from_shape_fn(IxDyn(&[4, residues]), |i| {
                if i[0] < 3 { (i[1] % 20) as i32 + 1 } else { 21 }
            })),
        );
        tensors.insert(
            "residue_index",
            Tensor::Int(ArrayD::from_shape_fn(IxDyn(&[residues]), |i| i[0] as i32)),
        );
        tensors.insert(
            "seq_length",
            Tensor::Int(ArrayD::from_elem(IxDyn(&[residues]), residues as i32)),
        );
        tensors.insert("num_alignments", Tensor::Int(ArrayD::from_elem(IxDyn(&[residues]), 4)));
        tensors.insert("num_templates", Tensor::Int(ArrayD::from_elem(IxDyn(&[]), 0)));
        FeatureRecord::new(tensors)
    }

    #[derive(Default)]
    pub(crate) struct CountingPipeline {
        pub(crate) requests: RefCell<Vec<(String, FeatureStrategy, PathBuf, bool)>>,
    }

    impl FeaturePipeline for CountingPipeline {
        fn build(&self, request: &FeatureRequest<'_>) -> Result<FeatureRecord, ToolError> {
            self.requests.borrow_mut().push((
                request.target.tag().to_string(),
                request.strategy,
                request.alignment_dir.to_path_buf(),
                request.template_output_dir.is_some(),
            ));
            Ok(synthetic_record(request.target.total_length()))
        }
    }

    fn monomer(len: usize) -> Target {
        Target::new(vec![ChainSequence::new("A", "M".repeat(len))], "a")
    }

    #[test]
    fn strategy_follows_chain_mode_and_chain_count() {
        assert_eq!(
            FeatureStrategy::select(ChainMode::Multimer, false, 1),
            FeatureStrategy::Multimer
        );
        assert_eq!(
            FeatureStrategy::select(ChainMode::Monomer, true, 1),
            FeatureStrategy::SingleChain {
                sequence_embedding: true
            }
        );
        assert_eq!(
            FeatureStrategy::select(ChainMode::Monomer, false, 3),
            FeatureStrategy::MultiSequence
        );
    }

    #[test]
    fn records_are_built_once_per_tag() {
        let dir = tempdir().unwrap();
        let pipeline = CountingPipeline::default();
        let assembler = FeatureAssembler::new(&pipeline, ChainMode::Monomer, false, None, dir.path());
        let mut cache = FeatureCache::new();
        let target = monomer(37);

        let first = assembler
            .assemble(&mut cache, &target, &dir.path().join("aln/A"), dir.path())
            .unwrap()
            .clone();
        let second = assembler
            .assemble(&mut cache, &target, &dir.path().join("aln/A"), dir.path())
            .unwrap()
            .clone();

        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
        let requests = pipeline.requests.borrow();
        assert_eq!(requests.len(), 1);
        // Single-chain targets read their own chain directory.
        assert_eq!(requests[0].2, dir.path().join("aln/A").join("A"));
        assert!(!ScratchFile::fasta_path(dir.path()).exists());
    }

    #[test]
    fn compilation_pads_cached_record_to_the_bucket() {
        let dir = tempdir().unwrap();
        let pipeline = CountingPipeline::default();
        let assembler =
            FeatureAssembler::new(&pipeline, ChainMode::Monomer, false, Some(50), dir.path());
        let mut cache = FeatureCache::new();

        let record = assembler
            .assemble(&mut cache, &monomer(37), dir.path(), dir.path())
            .unwrap();

        assert_eq!(record.num_residues().unwrap(), 50);
        assert_eq!(record.require("msa").unwrap().shape(), &[4, 50]);
        assert_eq!(
            cache.get("A").unwrap().require_int("seq_length").unwrap()[[0]],
            50
        );
    }

    #[test]
    fn multimer_targets_save_template_info_in_output_dir() {
        let dir = tempdir().unwrap();
        let pipeline = CountingPipeline::default();
        let assembler = FeatureAssembler::new(&pipeline, ChainMode::Multimer, false, None, dir.path());
        let mut cache = FeatureCache::new();
        let target = Target::new(
            vec![ChainSequence::new("H", "MKV"), ChainSequence::new("L", "GG")],
            "hl",
        );

        assembler
            .assemble(&mut cache, &target, dir.path(), &dir.path().join("out"))
            .unwrap();

        let requests = pipeline.requests.borrow();
        assert_eq!(requests[0].1, FeatureStrategy::Multimer);
        assert_eq!(requests[0].2, dir.path());
        assert!(requests[0].3);
    }
}
