//! # Core Module
//!
//! Stateless building blocks shared by every pipeline stage.
//!
//! - **Models** ([`models`]) - targets, tensor maps and predicted protein structures
//! - **I/O** ([`io`]) - FASTA parsing, structure encoders and `.npz` tensor archives
//! - **Residue Constants** ([`residue_constants`]) - residue and atom37 naming tables
//!
//! Nothing in this module keeps state between calls; caching and sequencing live in
//! [`crate::engine`].

pub mod io;
pub mod models;
pub mod residue_constants;
