use super::tensor::{Tensor, TensorError, TensorMap};
use ndarray::{ArrayD, IxDyn};
use phf::{Map, phf_map};
use std::ops::Deref;

/// Residue-axis position of each sequence-length-dependent feature, counted from the end
/// of the shape (1 = last axis). Features not listed here have no residue axis.
static RESIDUE_AXIS_FROM_END: Map<&'static str, usize> = phf_map! {
    "aatype" => 2,
    "between_segment_residues" => 1,
    "residue_index" => 1,
    "seq_mask" => 1,
    "asym_id" => 1,
    "entity_id" => 1,
    "sym_id" => 1,
    "deletion_matrix_int" => 1,
    "deletion_matrix" => 1,
    "msa" => 1,
    "template_aatype" => 2,
    "template_all_atom_mask" => 2,
    "template_all_atom_positions" => 3,
    "seq_embedding" => 2,
};

/// The unprocessed numeric features of one target, as produced by the feature pipeline.
///
/// A record is built once per composite tag per run and shared by every loaded model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureRecord {
    tensors: TensorMap,
}

impl FeatureRecord {
    pub fn new(tensors: TensorMap) -> Self {
        Self { tensors }
    }

    pub fn tensors(&self) -> &TensorMap {
        &self.tensors
    }

    pub fn into_tensors(self) -> TensorMap {
        self.tensors
    }

    /// Residue count, read from the second-to-last axis of the one-hot `aatype` feature.
    pub fn num_residues(&self) -> Result<usize, TensorError> {
        let aatype = self.tensors.require("aatype")?;
        let shape = aatype.shape();
        match shape.len().checked_sub(2) {
            Some(axis) => Ok(shape[axis]),
            None => Err(TensorError::Shape {
                name: "aatype".to_string(),
                shape: shape.to_vec(),
                reason: "expected a one-hot array with at least two axes".to_string(),
            }),
        }
    }

    /// Pads every residue axis up to `length` residues and rewrites `seq_length`.
    ///
    /// Padding only ever grows an axis; a record already at or above `length` keeps its
    /// residue axes unchanged.
    pub fn padded_to(&self, length: usize) -> Result<FeatureRecord, TensorError> {
        let mut padded = TensorMap::new();
        for (name, tensor) in &self.tensors {
            let tensor = if name == "seq_length" {
                let value = i32::try_from(length).map_err(|_| TensorError::Shape {
                    name: name.clone(),
                    shape: tensor.shape().to_vec(),
                    reason: format!("padded length {} does not fit in int32", length),
                })?;
                Tensor::Int(ArrayD::from_elem(IxDyn(tensor.shape()), value))
            } else if let Some(&from_end) = RESIDUE_AXIS_FROM_END.get(name.as_str()) {
                match tensor.ndim().checked_sub(from_end) {
                    Some(axis) => tensor.pad_axis(axis, length),
                    None => {
                        return Err(TensorError::Shape {
                            name: name.clone(),
                            shape: tensor.shape().to_vec(),
                            reason: format!("expected at least {} axes", from_end),
                        });
                    }
                }
            } else {
                tensor.clone()
            };
            padded.insert(name.clone(), tensor);
        }
        Ok(FeatureRecord::new(padded))
    }
}

impl Deref for FeatureRecord {
    type Target = TensorMap;

    fn deref(&self) -> &Self::Target {
        &self.tensors
    }
}

/// Features prepared for a single inference call: every tensor carries a trailing
/// recycling axis, and the record is tagged with the device it is destined for.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedFeatures {
    tensors: TensorMap,
    device: String,
}

impl ProcessedFeatures {
    pub fn new(tensors: TensorMap, device: impl Into<String>) -> Self {
        Self {
            tensors,
            device: device.into(),
        }
    }

    pub fn tensors(&self) -> &TensorMap {
        &self.tensors
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// Length of the recycling axis, read from the retained alignment (`true_msa`).
    pub fn num_recycles(&self) -> Result<usize, TensorError> {
        let msa = self.tensors.require("true_msa")?;
        msa.shape()
            .last()
            .copied()
            .ok_or_else(|| TensorError::Shape {
                name: "true_msa".to_string(),
                shape: msa.shape().to_vec(),
                reason: "missing recycling axis".to_string(),
            })
    }

    /// Drops the recycling axis by keeping the last iteration of every tensor.
    pub fn last_recycle(&self) -> Result<TensorMap, TensorError> {
        self.tensors
            .iter()
            .map(|(name, tensor)| {
                tensor
                    .select_last()
                    .map(|t| (name.clone(), t))
                    .ok_or_else(|| TensorError::Shape {
                        name: name.clone(),
                        shape: tensor.shape().to_vec(),
                        reason: "no recycling axis to select from".to_string(),
                    })
            })
            .collect::<Result<TensorMap, TensorError>>()
    }
}

impl Deref for ProcessedFeatures {
    type Target = TensorMap;

    fn deref(&self) -> &Self::Target {
        &self.tensors
    }
}

/// Raw output tensors returned by one model invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelOutput {
    tensors: TensorMap,
}

impl ModelOutput {
    pub fn new(tensors: TensorMap) -> Self {
        Self { tensors }
    }

    pub fn tensors(&self) -> &TensorMap {
        &self.tensors
    }

    /// Number of recycling iterations the model actually performed, if it reported one.
    pub fn num_recycles(&self) -> Option<usize> {
        self.tensors
            .get("num_recycles")
            .and_then(Tensor::scalar)
            .filter(|v| *v >= 0.0)
            .map(|v| v as usize)
    }
}

impl Deref for ModelOutput {
    type Target = TensorMap;

    fn deref(&self) -> &Self::Target {
        &self.tensors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, ArrayD, IxDyn, array};

    fn record_with_residues(n: usize) -> FeatureRecord {
        let mut tensors = TensorMap::new();
        tensors.insert("aatype", Tensor::Int(Array2::<i32>::ones((n, 21)).into_dyn()));
        tensors.insert(
            "residue_index",
            Tensor::Int(ArrayD::from_shape_fn(IxDyn(&[n]), |i| i[0] as i32)),
        );
        tensors.insert("msa", Tensor::Int(ArrayD::from_elem(IxDyn(&[3, n]), 5)));
        tensors.insert("seq_length", Tensor::Int(ArrayD::from_elem(IxDyn(&[n]), n as i32)));
        tensors.insert("num_alignments", Tensor::Int(ArrayD::from_elem(IxDyn(&[n]), 3)));
        FeatureRecord::new(tensors)
    }

    #[test]
    fn num_residues_reads_second_to_last_aatype_axis() {
        assert_eq!(record_with_residues(37).num_residues().unwrap(), 37);
    }

    #[test]
    fn padded_to_grows_residue_axes_and_rewrites_seq_length() {
        let padded = record_with_residues(37).padded_to(50).unwrap();

        assert_eq!(padded.num_residues().unwrap(), 50);
        assert_eq!(padded.require("msa").unwrap().shape(), &[3, 50]);
        assert_eq!(padded.require("residue_index").unwrap().shape(), &[50]);
        assert!(
            padded
                .require_int("seq_length")
                .unwrap()
                .iter()
                .all(|&v| v == 50)
        );
        // Not a residue-axis feature: untouched.
        assert_eq!(padded.require("num_alignments").unwrap().shape(), &[37]);
        // Padding rows are zero.
        let msa = padded.require_int("msa").unwrap();
        assert_eq!(msa[[0, 36]], 5);
        assert_eq!(msa[[0, 37]], 0);
    }

    #[test]
    fn last_recycle_strips_trailing_axis() {
        let mut tensors = TensorMap::new();
        tensors.insert(
            "true_msa",
            Tensor::Int(array![[1, 2], [3, 4]].into_dyn()).append_axis(4),
        );
        let processed = ProcessedFeatures::new(tensors, "cpu");

        assert_eq!(processed.num_recycles().unwrap(), 4);
        let last = processed.last_recycle().unwrap();
        assert_eq!(last.require("true_msa").unwrap().shape(), &[2, 2]);
    }

    #[test]
    fn model_output_reads_scalar_recycle_count() {
        let mut tensors = TensorMap::new();
        tensors.insert("num_recycles", Tensor::Int(ArrayD::from_elem(IxDyn(&[]), 3)));
        assert_eq!(ModelOutput::new(tensors).num_recycles(), Some(3));
        assert_eq!(ModelOutput::default().num_recycles(), None);
    }
}
