//! # Engine Module
//!
//! This module implements the stateful stages of the batch prediction pipeline:
//! everything between a directory of sequence files and a directory of predicted
//! structures.
//!
//! ## Overview
//!
//! Each stage owns one concern and talks to the outside world only through a trait,
//! so the external tools (alignment search, feature assembly, the predictive model,
//! energy minimization) can be swapped for process-backed implementations or
//! in-memory test doubles.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Run settings, the model configuration tree and its overlay
//! - **Target Discovery** ([`catalog`]) - Input validation and worklist ordering
//! - **Alignments** ([`alignment`]) - Idempotent alignment precomputation
//! - **Features** ([`features`], [`processing`]) - Cached feature records and per-inference processing
//! - **Compilation** ([`compilation`]) - Length-bucketed ahead-of-time compilation tracking
//! - **Inference** ([`invoker`]) - Model invocation guarded by the compilation cache
//! - **Diagnostics** ([`msa_stats`]) - Alignment depth per recycling iteration
//! - **Persistence** ([`output`]) - Structure files, relaxation and analysis artifacts
//! - **State Tracking** ([`state`]) - Per-target stage machine and batch report
//! - **Progress Monitoring** ([`progress`]) - Events for front-ends
//! - **Error Handling** ([`error`]) - Stage-tagged engine errors

pub mod alignment;
pub mod catalog;
pub mod compilation;
pub mod config;
pub mod error;
pub mod features;
pub mod invoker;
pub mod msa_stats;
pub mod output;
pub mod processing;
pub mod progress;
pub mod scratch;
pub mod state;
