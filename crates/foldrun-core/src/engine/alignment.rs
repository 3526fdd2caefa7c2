use super::config::{AlignmentConfig, AlignmentMode, ChainMode, DatabasePreset, TemplateSearch};
use super::error::{EngineError, ToolError};
use super::scratch::ScratchFile;
use crate::core::models::target::{ChainSequence, Target};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File written next to generated alignments, holding the sequence they were computed for.
/// It is written only after the runner succeeds, so it also marks the directory complete.
pub const QUERY_FINGERPRINT: &str = ".query_sequence";

/// Where per-target alignment directories live, and whether they may be generated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlignmentSource {
    /// Alignments were computed ahead of time; nothing is ever generated.
    Precomputed(PathBuf),
    /// Missing alignments are generated under this root.
    Generate(PathBuf),
}

impl AlignmentSource {
    pub fn root(&self) -> &Path {
        match self {
            AlignmentSource::Precomputed(root) | AlignmentSource::Generate(root) => root,
        }
    }

    pub fn is_precomputed(&self) -> bool {
        matches!(self, AlignmentSource::Precomputed(_))
    }
}

/// Everything an alignment tool needs to search one chain.
#[derive(Debug, Clone, Copy)]
pub struct AlignmentRequest<'a> {
    pub chain: &'a ChainSequence,
    pub fasta_path: &'a Path,
    pub output_dir: &'a Path,
    pub template_search: TemplateSearch,
    pub mode: AlignmentMode,
    pub database_preset: DatabasePreset,
    pub cpus: usize,
}

/// External alignment search (sequence databases plus template search).
pub trait AlignmentRunner {
    fn run(&self, request: &AlignmentRequest<'_>) -> Result<(), ToolError>;
}

/// Makes sure every chain of a target has alignment data on disk.
///
/// Alignment directories are created lazily and never modified once present, so
/// repeated calls for the same target (for example once per loaded model) only
/// search the first time.
pub struct AlignmentCoordinator<'a> {
    runner: &'a dyn AlignmentRunner,
    config: &'a AlignmentConfig,
    template_search: TemplateSearch,
    scratch_dir: PathBuf,
}

fn is_complete(chain_dir: &Path) -> bool {
    chain_dir.join(QUERY_FINGERPRINT).is_file()
}

/// Warns when a chain directory was generated for a different sequence under the same tag.
fn check_fingerprint(chain_dir: &Path, chain: &ChainSequence) {
    let Ok(recorded) = fs::read_to_string(chain_dir.join(QUERY_FINGERPRINT)) else {
        return;
    };
    if recorded.trim() != chain.sequence {
        warn!(
            tag = %chain.tag,
            dir = %chain_dir.display(),
            "Stale alignment cache: directory was generated for a different sequence with the same tag."
        );
    }
}

impl<'a> AlignmentCoordinator<'a> {
    pub fn new(
        runner: &'a dyn AlignmentRunner,
        config: &'a AlignmentConfig,
        chain_mode: ChainMode,
        scratch_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            config,
            template_search: chain_mode.template_search(),
            scratch_dir: scratch_dir.into(),
        }
    }

    /// Per-target alignment directory, `<root>/<composite_tag>`.
    pub fn target_dir(&self, target: &Target) -> PathBuf {
        self.config.source.root().join(target.tag())
    }

    /// Returns the target's alignment directory, generating missing chain alignments first.
    pub fn ensure(&self, target: &Target) -> Result<PathBuf, EngineError> {
        let target_dir = self.target_dir(target);

        if self.config.source.is_precomputed() {
            debug!(tag = target.tag(), dir = %target_dir.display(), "Using precomputed alignments.");
            for chain in target.chains() {
                check_fingerprint(&target_dir.join(&chain.tag), chain);
            }
            return Ok(target_dir);
        }

        for chain in target.chains() {
            let chain_dir = target_dir.join(&chain.tag);
            if is_complete(&chain_dir) {
                debug!(tag = %chain.tag, "Reusing existing alignments.");
                check_fingerprint(&chain_dir, chain);
                continue;
            }
            if chain_dir.exists() {
                warn!(
                    tag = %chain.tag,
                    dir = %chain_dir.display(),
                    "Discarding incomplete alignments from an earlier run."
                );
                fs::remove_dir_all(&chain_dir).map_err(|e| EngineError::Alignment {
                    tag: chain.tag.clone(),
                    source: e.into(),
                })?;
            }
            self.generate(chain, &chain_dir)?;
        }
        Ok(target_dir)
    }

    fn generate(&self, chain: &ChainSequence, chain_dir: &Path) -> Result<(), EngineError> {
        let alignment_error = |source: ToolError| EngineError::Alignment {
            tag: chain.tag.clone(),
            source,
        };

        info!(tag = %chain.tag, "Generating alignments.");
        fs::create_dir_all(chain_dir).map_err(|e| alignment_error(e.into()))?;

        let scratch = ScratchFile::fasta(&self.scratch_dir, std::slice::from_ref(chain)).map_err(
            |source| EngineError::Scratch {
                path: ScratchFile::fasta_path(&self.scratch_dir),
                source,
            },
        )?;

        let request = AlignmentRequest {
            chain,
            fasta_path: scratch.path(),
            output_dir: chain_dir,
            template_search: self.template_search,
            mode: self.config.mode,
            database_preset: self.config.database_preset,
            cpus: self.config.cpus,
        };
        if let Err(source) = self.runner.run(&request) {
            if let Err(e) = fs::remove_dir_all(chain_dir) {
                warn!(dir = %chain_dir.display(), error = %e, "Could not remove partial alignments.");
            }
            return Err(alignment_error(source));
        }

        fs::write(chain_dir.join(QUERY_FINGERPRINT), &chain.sequence)
            .map_err(|e| alignment_error(e.into()))?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;
    use tempfile::tempdir;

    /// Records every request and drops a placeholder alignment file into the chain directory.
    /// With `fail` set, the file is still written before the error is returned.
    #[derive(Default)]
    pub(crate) struct RecordingRunner {
        pub(crate) calls: RefCell<Vec<(String, TemplateSearch, AlignmentMode, bool)>>,
        pub(crate) fail: bool,
    }

    impl AlignmentRunner for RecordingRunner {
        fn run(&self, request: &AlignmentRequest<'_>) -> Result<(), ToolError> {
            self.calls.borrow_mut().push((
                request.chain.tag.clone(),
                request.template_search,
                request.mode,
                request.fasta_path.exists(),
            ));
            fs::write(request.output_dir.join("uniref90_hits.sto"), "# STOCKHOLM 1.0\n")?;
            if self.fail {
                return Err(ToolError::Failed("database unavailable".to_string()));
            }
            Ok(())
        }
    }

    fn config(source: AlignmentSource) -> AlignmentConfig {
        AlignmentConfig {
            source,
            cpus: 2,
            database_preset: DatabasePreset::ReducedDbs,
            mode: AlignmentMode::Full,
        }
    }

    fn target() -> Target {
        Target::new(
            vec![ChainSequence::new("H", "MKVL"), ChainSequence::new("L", "GGS")],
            "complex",
        )
    }

    #[test]
    fn generates_missing_chains_once_and_cleans_up_scratch() {
        let out = tempdir().unwrap();
        let runner = RecordingRunner::default();
        let config = config(AlignmentSource::Generate(out.path().join("alignments")));
        let coordinator =
            AlignmentCoordinator::new(&runner, &config, ChainMode::Multimer, out.path());

        let dir = coordinator.ensure(&target()).unwrap();
        coordinator.ensure(&target()).unwrap();

        assert_eq!(dir, out.path().join("alignments").join("H-L"));
        let calls = runner.calls.borrow();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|c| c.1 == TemplateSearch::Hmmsearch && c.3));
        assert_eq!(
            fs::read_to_string(dir.join("L").join(QUERY_FINGERPRINT)).unwrap(),
            "GGS"
        );
        assert!(!ScratchFile::fasta_path(out.path()).exists());
    }

    #[test]
    fn precomputed_alignments_never_invoke_the_runner() {
        let out = tempdir().unwrap();
        let runner = RecordingRunner::default();
        let config = config(AlignmentSource::Precomputed(out.path().join("given")));
        let coordinator =
            AlignmentCoordinator::new(&runner, &config, ChainMode::Monomer, out.path());

        let dir = coordinator.ensure(&target()).unwrap();

        assert_eq!(dir, out.path().join("given").join("H-L"));
        assert!(runner.calls.borrow().is_empty());
    }

    #[test]
    fn runner_failure_removes_scratch_and_reports_the_chain() {
        let out = tempdir().unwrap();
        let runner = RecordingRunner {
            fail: true,
            ..Default::default()
        };
        let config = config(AlignmentSource::Generate(out.path().join("alignments")));
        let coordinator =
            AlignmentCoordinator::new(&runner, &config, ChainMode::Monomer, out.path());

        let result = coordinator.ensure(&target());

        assert!(matches!(result, Err(EngineError::Alignment { ref tag, .. }) if tag == "H"));
        assert!(!ScratchFile::fasta_path(out.path()).exists());
        assert_eq!(runner.calls.borrow()[0].1, TemplateSearch::Hhsearch);
    }

    #[test]
    fn failed_search_is_retried_on_the_next_ensure() {
        let out = tempdir().unwrap();
        let config = config(AlignmentSource::Generate(out.path().join("alignments")));
        let failing = RecordingRunner {
            fail: true,
            ..Default::default()
        };
        AlignmentCoordinator::new(&failing, &config, ChainMode::Monomer, out.path())
            .ensure(&target())
            .unwrap_err();
        let chain_dir = out.path().join("alignments").join("H-L").join("H");
        assert!(!chain_dir.exists());

        let working = RecordingRunner::default();
        AlignmentCoordinator::new(&working, &config, ChainMode::Monomer, out.path())
            .ensure(&target())
            .unwrap();

        assert_eq!(working.calls.borrow().len(), 2);
        assert!(chain_dir.join(QUERY_FINGERPRINT).is_file());
    }

    #[test]
    fn directory_without_fingerprint_is_regenerated() {
        let out = tempdir().unwrap();
        let config = config(AlignmentSource::Generate(out.path().join("alignments")));
        let chain_dir = out.path().join("alignments").join("H-L").join("H");
        fs::create_dir_all(&chain_dir).unwrap();
        fs::write(chain_dir.join("bfd_hits.a3m"), ">partial\n").unwrap();

        let runner = RecordingRunner::default();
        AlignmentCoordinator::new(&runner, &config, ChainMode::Monomer, out.path())
            .ensure(&target())
            .unwrap();

        assert_eq!(runner.calls.borrow().len(), 2);
        assert!(!chain_dir.join("bfd_hits.a3m").exists());
        assert!(chain_dir.join("uniref90_hits.sto").exists());
        assert_eq!(fs::read_to_string(chain_dir.join(QUERY_FINGERPRINT)).unwrap(), "MKVL");
    }
}
