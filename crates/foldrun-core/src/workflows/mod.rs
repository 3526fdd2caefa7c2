//! # Workflows Module
//!
//! High-level entry points that drive the engine stages over a whole batch.
//!
//! ## Overview
//!
//! A workflow takes a validated configuration, a target catalog, the loaded models and
//! the external collaborators, and returns a report of what succeeded and what failed.
//! Only configuration problems abort a workflow; anything that goes wrong for a single
//! target is logged, recorded and skipped.
//!
//! ## Architecture
//!
//! - **Prediction Workflow** ([`predict`]) - Alignment, features, (optional) compilation,
//!   inference, structure output, relaxation and diagnostics for every (model, target) pair.

pub mod predict;
