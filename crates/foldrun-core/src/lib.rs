//! # foldrun Core Library
//!
//! Batch orchestration for multi-model protein structure prediction. The library schedules a
//! directory of sequence targets through alignment search, feature assembly, model inference
//! and structure output, caching what can be reused and isolating per-target failures.
//!
//! ## Architectural Philosophy
//!
//! The library follows a strict three-layer architecture:
//!
//! - **[`core`]: The Foundation.** Stateless data models (`Target`, `TensorMap`, `Protein`),
//!   residue constants and file I/O (FASTA parsing, PDB/ModelCIF encoders, `.npz` tensors).
//!
//! - **[`engine`]: The Pipeline Stages.** The stateful pieces of a run: target discovery,
//!   alignment coordination, the per-run feature cache, the per-model compilation cache,
//!   model invocation, alignment statistics and output persistence. External capabilities
//!   (alignment search, feature assembly, the model itself, relaxation) are reached through
//!   the collaborator traits defined here.
//!
//! - **[`workflows`]: The Public API.** The batch driver that composes the stages over every
//!   loaded model and every target, with per-target failure isolation.

pub mod core;
pub mod engine;
pub mod workflows;
