//! Provides input/output functionality for sequence, structure and tensor files.
//!
//! This module reads FASTA inputs, encodes predicted structures in the PDB and
//! ModelCIF-style mmCIF formats through a shared [`traits::StructureFile`] interface,
//! and moves tensor maps in and out of NumPy `.npz` archives.

pub mod fasta;
pub mod mmcif;
pub mod npz;
pub mod pdb;
pub mod traits;
