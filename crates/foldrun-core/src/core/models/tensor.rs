use ndarray::{ArrayD, Axis, Dimension, IxDyn, Slice};
use serde::Serialize;
use std::collections::BTreeMap;
use std::collections::btree_map;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TensorError {
    #[error("Missing tensor '{0}'")]
    Missing(String),

    #[error("Tensor '{name}' has dtype {found}, expected {expected}")]
    DType {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Tensor '{name}' has shape {shape:?}: {reason}")]
    Shape {
        name: String,
        shape: Vec<usize>,
        reason: String,
    },
}

/// A dynamically shaped numeric array exchanged with the external collaborators.
///
/// Feature pipelines and models produce a mix of integer-coded arrays (residue types,
/// alignment rows, indices) and floating-point arrays (coordinates, confidences), so a
/// tensor is one of the two.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Tensor {
    Int(ArrayD<i32>),
    Float(ArrayD<f32>),
}

impl Tensor {
    pub fn shape(&self) -> &[usize] {
        match self {
            Tensor::Int(a) => a.shape(),
            Tensor::Float(a) => a.shape(),
        }
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    pub fn dtype_name(&self) -> &'static str {
        match self {
            Tensor::Int(_) => "int32",
            Tensor::Float(_) => "float32",
        }
    }

    pub fn as_int(&self) -> Option<&ArrayD<i32>> {
        match self {
            Tensor::Int(a) => Some(a),
            Tensor::Float(_) => None,
        }
    }

    pub fn as_float(&self) -> Option<&ArrayD<f32>> {
        match self {
            Tensor::Float(a) => Some(a),
            Tensor::Int(_) => None,
        }
    }

    /// Reads the tensor as a list of `f64` values in logical order, regardless of dtype.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match self {
            Tensor::Int(a) => a.iter().map(|&v| v as f64).collect(),
            Tensor::Float(a) => a.iter().map(|&v| v as f64).collect(),
        }
    }

    /// The single value of a one-element tensor of any rank.
    pub fn scalar(&self) -> Option<f64> {
        let values = self.to_f64_vec();
        match values.as_slice() {
            [value] => Some(*value),
            _ => None,
        }
    }

    /// Zero-pads `axis` at its end up to `len`. Never truncates.
    pub fn pad_axis(&self, axis: usize, len: usize) -> Tensor {
        match self {
            Tensor::Int(a) => Tensor::Int(pad_array(a, axis, len)),
            Tensor::Float(a) => Tensor::Float(pad_array(a, axis, len)),
        }
    }

    /// Keeps the first `len` entries of `axis`.
    pub fn truncate_axis(&self, axis: usize, len: usize) -> Tensor {
        self.slice_axis(axis, 0, len)
    }

    /// Keeps entries `start..end` of `axis`, clamped to the axis length.
    pub fn slice_axis(&self, axis: usize, start: usize, end: usize) -> Tensor {
        match self {
            Tensor::Int(a) => Tensor::Int(slice_array(a, axis, start, end)),
            Tensor::Float(a) => Tensor::Float(slice_array(a, axis, start, end)),
        }
    }

    /// Copies the tensor `count` times along a new trailing axis.
    pub fn append_axis(&self, count: usize) -> Tensor {
        match self {
            Tensor::Int(a) => Tensor::Int(broadcast_trailing(a, count)),
            Tensor::Float(a) => Tensor::Float(broadcast_trailing(a, count)),
        }
    }

    /// Selects the last entry of the trailing axis, dropping that axis.
    pub fn select_last(&self) -> Option<Tensor> {
        match self {
            Tensor::Int(a) => last_of_trailing(a).map(Tensor::Int),
            Tensor::Float(a) => last_of_trailing(a).map(Tensor::Float),
        }
    }
}

fn pad_array<T: Clone + Default>(array: &ArrayD<T>, axis: usize, len: usize) -> ArrayD<T> {
    let current = array.len_of(Axis(axis));
    if len <= current {
        return array.clone();
    }
    let mut shape = array.shape().to_vec();
    shape[axis] = len;
    let mut padded = ArrayD::<T>::default(IxDyn(&shape));
    padded
        .slice_axis_mut(Axis(axis), Slice::from(0..current))
        .assign(array);
    padded
}

fn slice_array<T: Clone>(array: &ArrayD<T>, axis: usize, start: usize, end: usize) -> ArrayD<T> {
    let len = array.len_of(Axis(axis));
    let end = end.min(len);
    let start = start.min(end);
    array.slice_axis(Axis(axis), Slice::from(start..end)).to_owned()
}

fn broadcast_trailing<T: Clone>(array: &ArrayD<T>, count: usize) -> ArrayD<T> {
    let ndim = array.ndim();
    let mut shape = array.shape().to_vec();
    shape.push(count);
    ArrayD::from_shape_fn(IxDyn(&shape), |index| {
        array[&index.slice()[..ndim]].clone()
    })
}

fn last_of_trailing<T: Clone>(array: &ArrayD<T>) -> Option<ArrayD<T>> {
    let axis = array.ndim().checked_sub(1)?;
    let len = array.len_of(Axis(axis));
    if len == 0 {
        return None;
    }
    Some(array.index_axis(Axis(axis), len - 1).to_owned())
}

/// An ordered map from tensor name to tensor.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TensorMap {
    tensors: BTreeMap<String, Tensor>,
}

impl TensorMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) -> Option<Tensor> {
        self.tensors.insert(name.into(), tensor)
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.tensors.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tensors.contains_key(name)
    }

    pub fn require(&self, name: &str) -> Result<&Tensor, TensorError> {
        self.get(name)
            .ok_or_else(|| TensorError::Missing(name.to_string()))
    }

    pub fn require_int(&self, name: &str) -> Result<&ArrayD<i32>, TensorError> {
        let tensor = self.require(name)?;
        tensor.as_int().ok_or_else(|| TensorError::DType {
            name: name.to_string(),
            expected: "int32",
            found: tensor.dtype_name(),
        })
    }

    pub fn require_float(&self, name: &str) -> Result<&ArrayD<f32>, TensorError> {
        let tensor = self.require(name)?;
        tensor.as_float().ok_or_else(|| TensorError::DType {
            name: name.to_string(),
            expected: "float32",
            found: tensor.dtype_name(),
        })
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Tensor> {
        self.tensors.iter()
    }
}

impl FromIterator<(String, Tensor)> for TensorMap {
    fn from_iter<I: IntoIterator<Item = (String, Tensor)>>(iter: I) -> Self {
        Self {
            tensors: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for TensorMap {
    type Item = (String, Tensor);
    type IntoIter = btree_map::IntoIter<String, Tensor>;

    fn into_iter(self) -> Self::IntoIter {
        self.tensors.into_iter()
    }
}

impl<'a> IntoIterator for &'a TensorMap {
    type Item = (&'a String, &'a Tensor);
    type IntoIter = btree_map::Iter<'a, String, Tensor>;

    fn into_iter(self) -> Self::IntoIter {
        self.tensors.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn, array};

    #[test]
    fn pad_axis_extends_with_zeros_and_never_truncates() {
        let tensor = Tensor::Int(array![[1, 2], [3, 4]].into_dyn());

        let padded = tensor.pad_axis(1, 4);
        assert_eq!(padded.shape(), &[2, 4]);
        assert_eq!(
            padded.as_int().unwrap(),
            &array![[1, 2, 0, 0], [3, 4, 0, 0]].into_dyn()
        );

        let unchanged = tensor.pad_axis(1, 1);
        assert_eq!(unchanged, tensor);
    }

    #[test]
    fn append_axis_then_select_last_restores_original() {
        let tensor = Tensor::Float(array![[0.5, 1.5], [2.5, 3.5]].into_dyn());

        let expanded = tensor.append_axis(4);
        assert_eq!(expanded.shape(), &[2, 2, 4]);
        assert_eq!(expanded.select_last().unwrap(), tensor);
    }

    #[test]
    fn select_last_is_none_for_scalars_and_empty_axes() {
        let scalar = Tensor::Int(ArrayD::from_elem(IxDyn(&[]), 7));
        let empty = Tensor::Int(ArrayD::zeros(IxDyn(&[3, 0])));

        assert!(scalar.select_last().is_none());
        assert!(empty.select_last().is_none());
        assert_eq!(scalar.scalar(), Some(7.0));
    }

    #[test]
    fn require_int_reports_dtype_mismatch() {
        let mut map = TensorMap::new();
        map.insert("plddt", Tensor::Float(array![90.0].into_dyn()));

        assert_eq!(
            map.require_int("plddt"),
            Err(TensorError::DType {
                name: "plddt".to_string(),
                expected: "int32",
                found: "float32",
            })
        );
        assert_eq!(
            map.require("msa"),
            Err(TensorError::Missing("msa".to_string()))
        );
    }
}
