use super::tensor::TensorError;
use crate::core::residue_constants::{ATOM_TYPE_NUM, RESTYPE_NUM_WITH_X};
use nalgebra::Point3;
use ndarray::{ArrayView1, ArrayView2, ArrayView3};
use std::io;
use thiserror::Error;

/// Atoms whose mask value falls below this threshold are treated as absent.
const ATOM_MASK_THRESHOLD: f32 = 0.5;

#[derive(Debug, Error)]
pub enum StructureError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Inconsistent prediction arrays: {0}")]
    Inconsistent(String),

    #[error("Too many chains for the PDB format: {count} (maximum {max})")]
    TooManyChains { count: usize, max: usize },

    #[error(transparent)]
    Tensor(#[from] TensorError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictedAtom {
    pub atom_type: usize,       // Slot in the atom37 layout
    pub position: Point3<f32>,  // Cartesian coordinates in Angstroms
    pub b_factor: f32,          // Per-atom confidence written to the B-factor column
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictedResidue {
    pub restype: usize,          // Residue-type index (20 = unknown)
    pub residue_index: i32,      // 1-based residue number within its chain
    pub chain_index: usize,      // 0-based chain number
    pub atoms: Vec<PredictedAtom>,
}

/// A predicted structure ready to be handed to a [`StructureFile`] encoder.
///
/// Residues without any present atom (for example positions added by shape padding)
/// are dropped during construction, so every residue here has at least one atom.
///
/// [`StructureFile`]: crate::core::io::traits::StructureFile
#[derive(Debug, Clone, PartialEq)]
pub struct Protein {
    pub name: String,
    pub residues: Vec<PredictedResidue>,
    pub remark: Option<String>,
    pub parents: Vec<String>,
}

/// Borrowed per-residue arrays from which a [`Protein`] is assembled.
pub struct PredictionArrays<'a> {
    pub restypes: &'a [usize],
    pub residue_index: &'a [i32],
    pub chain_index: &'a [usize],
    pub atom_positions: ArrayView3<'a, f32>,
    pub atom_mask: ArrayView2<'a, f32>,
    pub b_factors: ArrayView1<'a, f32>,
}

impl Protein {
    pub fn from_arrays(
        name: impl Into<String>,
        arrays: PredictionArrays<'_>,
    ) -> Result<Self, StructureError> {
        let n = arrays.atom_positions.shape()[0];
        check_len("restypes", arrays.restypes.len(), n)?;
        check_len("residue_index", arrays.residue_index.len(), n)?;
        check_len("chain_index", arrays.chain_index.len(), n)?;
        check_len("b_factors", arrays.b_factors.len(), n)?;
        if arrays.atom_positions.shape()[1..] != [ATOM_TYPE_NUM, 3] {
            return Err(StructureError::Inconsistent(format!(
                "atom positions must have shape [N, {}, 3], got {:?}",
                ATOM_TYPE_NUM,
                arrays.atom_positions.shape()
            )));
        }
        if arrays.atom_mask.shape() != [n, ATOM_TYPE_NUM] {
            return Err(StructureError::Inconsistent(format!(
                "atom mask must have shape [{}, {}], got {:?}",
                n,
                ATOM_TYPE_NUM,
                arrays.atom_mask.shape()
            )));
        }

        let mut residues = Vec::with_capacity(n);
        for i in 0..n {
            let b_factor = arrays.b_factors[i];
            let atoms: Vec<PredictedAtom> = (0..ATOM_TYPE_NUM)
                .filter(|&slot| arrays.atom_mask[[i, slot]] >= ATOM_MASK_THRESHOLD)
                .map(|slot| PredictedAtom {
                    atom_type: slot,
                    position: Point3::new(
                        arrays.atom_positions[[i, slot, 0]],
                        arrays.atom_positions[[i, slot, 1]],
                        arrays.atom_positions[[i, slot, 2]],
                    ),
                    b_factor,
                })
                .collect();
            if atoms.is_empty() {
                continue;
            }
            residues.push(PredictedResidue {
                restype: arrays.restypes[i].min(RESTYPE_NUM_WITH_X - 1),
                residue_index: arrays.residue_index[i],
                chain_index: arrays.chain_index[i],
                atoms,
            });
        }

        Ok(Self {
            name: name.into(),
            residues,
            remark: None,
            parents: Vec::new(),
        })
    }

    pub fn with_remark(mut self, remark: impl Into<String>) -> Self {
        self.remark = Some(remark.into());
        self
    }

    pub fn atom_count(&self) -> usize {
        self.residues.iter().map(|r| r.atoms.len()).sum()
    }

    pub fn chain_count(&self) -> usize {
        self.residues
            .iter()
            .map(|r| r.chain_index + 1)
            .max()
            .unwrap_or(0)
    }

    /// Mean per-residue confidence, taken from each residue's first atom.
    pub fn mean_b_factor(&self) -> Option<f32> {
        if self.residues.is_empty() {
            return None;
        }
        let sum: f32 = self
            .residues
            .iter()
            .filter_map(|r| r.atoms.first())
            .map(|a| a.b_factor)
            .sum();
        Some(sum / self.residues.len() as f32)
    }
}

fn check_len(name: &str, found: usize, expected: usize) -> Result<(), StructureError> {
    if found == expected {
        Ok(())
    } else {
        Err(StructureError::Inconsistent(format!(
            "'{}' covers {} residues, expected {}",
            name, found, expected
        )))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ndarray::{Array1, Array2, Array3};

    /// A small two-chain protein with backbone atoms only.
    pub(crate) fn two_chain_protein() -> Protein {
        let n = 3;
        let mut positions = Array3::<f32>::zeros((n, ATOM_TYPE_NUM, 3));
        let mut mask = Array2::<f32>::zeros((n, ATOM_TYPE_NUM));
        for i in 0..n {
            for slot in 0..3 {
                mask[[i, slot]] = 1.0;
                positions[[i, slot, 0]] = i as f32 + slot as f32 * 0.5;
                positions[[i, slot, 1]] = -1.25;
                positions[[i, slot, 2]] = 10.0;
            }
        }
        let b_factors = Array1::from(vec![91.5, 80.0, 42.25]);
        Protein::from_arrays(
            "demo",
            PredictionArrays {
                restypes: &[12, 7, 0],
                residue_index: &[1, 2, 1],
                chain_index: &[0, 0, 1],
                atom_positions: positions.view(),
                atom_mask: mask.view(),
                b_factors: b_factors.view(),
            },
        )
        .unwrap()
        .with_remark("no_recycling=3, max_templates=4, config_preset=model_1")
    }

    #[test]
    fn from_arrays_keeps_only_masked_atoms() {
        let protein = two_chain_protein();
        assert_eq!(protein.residues.len(), 3);
        assert_eq!(protein.atom_count(), 9);
        assert_eq!(protein.chain_count(), 2);
        assert_eq!(protein.residues[0].atoms[1].atom_type, 1);
        assert_eq!(protein.residues[2].atoms[0].b_factor, 42.25);
    }

    #[test]
    fn residues_without_atoms_are_dropped() {
        let n = 2;
        let positions = Array3::<f32>::zeros((n, ATOM_TYPE_NUM, 3));
        let mut mask = Array2::<f32>::zeros((n, ATOM_TYPE_NUM));
        mask[[0, 1]] = 1.0;
        let b_factors = Array1::from(vec![50.0, 50.0]);

        let protein = Protein::from_arrays(
            "padded",
            PredictionArrays {
                restypes: &[0, 0],
                residue_index: &[1, 2],
                chain_index: &[0, 0],
                atom_positions: positions.view(),
                atom_mask: mask.view(),
                b_factors: b_factors.view(),
            },
        )
        .unwrap();

        assert_eq!(protein.residues.len(), 1);
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let positions = Array3::<f32>::zeros((2, ATOM_TYPE_NUM, 3));
        let mask = Array2::<f32>::zeros((2, ATOM_TYPE_NUM));
        let b_factors = Array1::from(vec![50.0, 50.0]);

        let result = Protein::from_arrays(
            "broken",
            PredictionArrays {
                restypes: &[0],
                residue_index: &[1, 2],
                chain_index: &[0, 0],
                atom_positions: positions.view(),
                atom_mask: mask.view(),
                b_factors: b_factors.view(),
            },
        );

        assert!(matches!(result, Err(StructureError::Inconsistent(_))));
    }
}
