use super::config::ChainMode;
use super::error::EngineError;
use crate::core::io::fasta::parse_fasta;
use crate::core::models::target::Target;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// File-name suffixes recognised as sequence inputs.
pub const INPUT_EXTENSIONS: [&str; 2] = [".fasta", ".fa"];

/// An input file that was not turned into a target, with the reason why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedInput {
    pub path: PathBuf,
    pub reason: String,
}

/// The ordered worklist of a batch run.
///
/// Targets are sorted by ascending total sequence length (stable for ties), which
/// keeps each model's compilation bucket monotonically growing over the run.
#[derive(Debug, Clone, Default)]
pub struct TargetCatalog {
    targets: Vec<Target>,
    skipped: Vec<SkippedInput>,
}

/// Name of the output directory for an input file: its file name up to the first `.`.
pub fn file_stem(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.split_once('.') {
        Some((stem, _)) => stem.to_string(),
        None => name,
    }
}

fn is_sequence_input(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy())
        .is_some_and(|name| INPUT_EXTENSIONS.iter().any(|ext| name.ends_with(ext)))
}

impl TargetCatalog {
    /// Scans `input_dir` for `.fasta`/`.fa` files and builds the worklist.
    ///
    /// Unreadable, unparsable or mode-incompatible files are skipped with a warning;
    /// only a failure to list the directory itself is an error.
    pub fn discover(input_dir: &Path, chain_mode: ChainMode) -> Result<Self, EngineError> {
        let input_error = |source: std::io::Error| EngineError::Input {
            path: input_dir.to_path_buf(),
            source,
        };
        let mut paths = Vec::new();
        for entry in fs::read_dir(input_dir).map_err(input_error)? {
            let path = entry.map_err(input_error)?.path();
            if path.is_file() && is_sequence_input(&path) {
                paths.push(path);
            }
        }
        paths.sort_by_key(|p| p.file_name().map(|n| n.to_os_string()));

        let mut sources = Vec::with_capacity(paths.len());
        let mut unreadable = Vec::new();
        for path in paths {
            match fs::read_to_string(&path) {
                Ok(contents) => sources.push((path, contents)),
                Err(e) => unreadable.push(SkippedInput {
                    path,
                    reason: format!("cannot read file: {}", e),
                }),
            }
        }

        let mut catalog = Self::from_sources(sources, chain_mode);
        for skip in &unreadable {
            warn!(path = %skip.path.display(), reason = %skip.reason, "Skipping input file.");
        }
        catalog.skipped.extend(unreadable);

        info!(
            targets = catalog.targets.len(),
            skipped = catalog.skipped.len(),
            dir = %input_dir.display(),
            "Target discovery complete."
        );
        Ok(catalog)
    }

    /// Builds the worklist from already-read `(path, contents)` pairs, in the given order.
    pub fn from_sources<I>(sources: I, chain_mode: ChainMode) -> Self
    where
        I: IntoIterator<Item = (PathBuf, String)>,
    {
        let mut targets = Vec::new();
        let mut skipped = Vec::new();

        for (path, contents) in sources {
            let skip = |reason: String| {
                warn!(path = %path.display(), reason = %reason, "Skipping input file.");
                SkippedInput {
                    path: path.clone(),
                    reason,
                }
            };

            let chains = match parse_fasta(&contents) {
                Ok(chains) => chains,
                Err(e) => {
                    skipped.push(skip(format!("invalid FASTA: {}", e)));
                    continue;
                }
            };

            match chain_mode {
                ChainMode::Monomer if chains.len() != 1 => {
                    skipped.push(skip(format!(
                        "expected exactly one sequence in single-chain mode, found {}",
                        chains.len()
                    )));
                    continue;
                }
                ChainMode::Multimer if chains.is_empty() => {
                    skipped.push(skip("file contains no sequences".to_string()));
                    continue;
                }
                _ => {}
            }

            targets.push(Target::new(chains, file_stem(&path)));
        }

        targets.sort_by_key(Target::total_length);
        Self { targets, skipped }
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn skipped(&self) -> &[SkippedInput] {
        &self.skipped
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
