use std::io;
use std::path::PathBuf;
use thiserror::Error;

use super::config::ConfigError;
use super::msa_stats::StatsError;
use crate::core::io::npz::NpzError;
use crate::core::models::protein::StructureError;
use crate::core::models::tensor::TensorError;

/// Failure reported by an external collaborator (alignment search, feature
/// assembly, the model, the relaxer).
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("'{program}' exited with {status}: {stderr}")]
    Process {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("Invalid tool output: {0}")]
    InvalidOutput(String),

    #[error("Tensor exchange failed: {0}")]
    Exchange(#[from] NpzError),

    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cannot read input directory {path:?}: {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot prepare scratch file {path:?}: {source}")]
    Scratch {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Alignment generation failed for '{tag}': {source}")]
    Alignment {
        tag: String,
        #[source]
        source: ToolError,
    },

    #[error("Feature assembly failed for '{tag}': {source}")]
    Features {
        tag: String,
        #[source]
        source: ToolError,
    },

    #[error("Feature processing failed for '{tag}': {source}")]
    Processing {
        tag: String,
        #[source]
        source: TensorError,
    },

    #[error("Tensor error: {0}")]
    Tensor(#[from] TensorError),

    #[error("Compilation at {bucket} residues failed: {source}")]
    Compilation {
        bucket: usize,
        #[source]
        source: ToolError,
    },

    #[error("Inference with model '{model}' failed: {source}")]
    Inference {
        model: String,
        #[source]
        source: ToolError,
    },

    #[error("Alignment statistics failed: {0}")]
    Stats(#[from] StatsError),

    #[error("Structure assembly failed: {0}")]
    Structure(#[from] StructureError),

    #[error("Relaxation of {path:?} failed: {source}")]
    Relaxation {
        path: PathBuf,
        #[source]
        source: ToolError,
    },

    #[error("Cannot write output {path:?}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot write diagnostics to {path:?}: {reason}")]
    Diagnostics { path: PathBuf, reason: String },
}

impl EngineError {
    pub(crate) fn output(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> EngineError {
        let path = path.into();
        move |source| EngineError::Output { path, source }
    }

    pub(crate) fn diagnostics<E: std::fmt::Display>(
        path: impl Into<PathBuf>,
    ) -> impl FnOnce(E) -> EngineError {
        let path = path.into();
        move |e| EngineError::Diagnostics {
            path,
            reason: e.to_string(),
        }
    }
}

/// Renders an error with its whole `source()` chain, outermost first.
///
/// Causes already spelled out by their parent's message are not repeated.
pub fn error_chain(error: &dyn std::error::Error) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !rendered.ends_with(&text) {
            rendered.push_str(": ");
            rendered.push_str(&text);
        }
        source = cause.source();
    }
    rendered
}
