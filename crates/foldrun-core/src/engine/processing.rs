use super::config::{ChainMode, ConfigError, ModelConfig};
use crate::core::models::features::{FeatureRecord, ProcessedFeatures};
use crate::core::models::tensor::{TensorError, TensorMap};
use tracing::debug;

/// Turns a cached feature record into the inputs of one inference call.
///
/// Processing is cheap and deterministic, so its output is never cached.
pub trait FeatureProcessor {
    fn process(
        &self,
        record: &FeatureRecord,
        chain_mode: ChainMode,
    ) -> Result<ProcessedFeatures, TensorError>;
}

/// Splits the alignment into retained and extra rows and adds a recycling axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecyclingFeatureProcessor {
    pub max_recycling_iters: usize,
    pub max_msa_clusters: usize,
    pub max_extra_msa: usize,
    pub fixed_size: bool,
    pub device: String,
}

impl RecyclingFeatureProcessor {
    pub fn from_config(model: &ModelConfig, device: impl Into<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            max_recycling_iters: model.max_recycling_iters()?,
            max_msa_clusters: model.max_msa_clusters()?,
            max_extra_msa: model.max_extra_msa()?,
            fixed_size: model.fixed_size(),
            device: device.into(),
        })
    }

    /// Length of the trailing axis added to every processed feature.
    pub fn recycling_dim(&self) -> usize {
        self.max_recycling_iters + 1
    }
}

impl FeatureProcessor for RecyclingFeatureProcessor {
    fn process(
        &self,
        record: &FeatureRecord,
        chain_mode: ChainMode,
    ) -> Result<ProcessedFeatures, TensorError> {
        if chain_mode.is_multimer() {
            record.require("asym_id")?;
        }

        let msa = record.require("msa")?;
        if msa.ndim() != 2 {
            return Err(TensorError::Shape {
                name: "msa".to_string(),
                shape: msa.shape().to_vec(),
                reason: "expected [rows, residues]".to_string(),
            });
        }
        let clusters = self.max_msa_clusters;
        let mut true_msa = msa.slice_axis(0, 0, clusters);
        let mut extra_msa = msa.slice_axis(0, clusters, clusters + self.max_extra_msa);
        if self.fixed_size {
            true_msa = true_msa.pad_axis(0, clusters);
            extra_msa = extra_msa.pad_axis(0, self.max_extra_msa);
        }

        let recycles = self.recycling_dim();
        let mut processed = TensorMap::new();
        for (name, tensor) in record.tensors() {
            if name == "msa" {
                continue;
            }
            processed.insert(name.clone(), tensor.append_axis(recycles));
        }
        processed.insert("true_msa", true_msa.append_axis(recycles));
        processed.insert("extra_msa", extra_msa.append_axis(recycles));

        debug!(
            features = processed.len(),
            recycles,
            device = %self.device,
            "Processed features for inference."
        );
        Ok(ProcessedFeatures::new(processed, self.device.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::tensor::Tensor;
    use crate::engine::features::tests::synthetic_record;

    fn processor(fixed_size: bool) -> RecyclingFeatureProcessor {
        RecyclingFeatureProcessor {
            max_recycling_iters: 3,
            max_msa_clusters: 2,
            max_extra_msa: 5,
            fixed_size,
            device: "cuda:0".to_string(),
        }
    }

    #[test]
    fn alignment_rows_are_split_and_recycling_axis_appended() {
        let processed = processor(false)
            .process(&synthetic_record(10), ChainMode::Monomer)
            .unwrap();

        assert_eq!(processed.device(), "cuda:0");
        assert_eq!(processed.num_recycles().unwrap(), 4);
        assert_eq!(processed.require("true_msa").unwrap().shape(), &[2, 10, 4]);
        assert_eq!(processed.require("extra_msa").unwrap().shape(), &[2, 10, 4]);
        assert_eq!(processed.require("aatype").unwrap().shape(), &[10, 21, 4]);
        assert!(!processed.contains("msa"));
    }

    #[test]
    fn fixed_size_pads_alignment_rows() {
        let processed = processor(true)
            .process(&synthetic_record(10), ChainMode::Monomer)
            .unwrap();

        let extra = processed.require_int("extra_msa").unwrap();
        assert_eq!(extra.shape(), &[5, 10, 4]);
        assert_eq!(extra[[2, 0, 3]], 0);
        // Row 3 of the record (all gaps) is the second extra row.
        assert_eq!(extra[[1, 0, 0]], 21);
    }

    #[test]
    fn multimer_processing_requires_chain_ids() {
        let record = synthetic_record(10);
        assert_eq!(
            processor(false).process(&record, ChainMode::Multimer),
            Err(TensorError::Missing("asym_id".to_string()))
        );

        let mut tensors = record.into_tensors();
        tensors.insert("asym_id", Tensor::Int(ndarray::ArrayD::from_elem(ndarray::IxDyn(&[10]), 1)));
        assert!(
            processor(false)
                .process(&FeatureRecord::new(tensors), ChainMode::Multimer)
                .is_ok()
        );
    }

    #[test]
    fn from_config_reads_model_limits() {
        let model = ModelConfig::for_preset("model_3", false, false).unwrap();
        let processor = RecyclingFeatureProcessor::from_config(&model, "cpu").unwrap();
        assert_eq!(processor.recycling_dim(), 4);
        assert_eq!(processor.max_msa_clusters, 512);
        assert_eq!(processor.max_extra_msa, 1024);
        assert!(processor.fixed_size);
    }
}
