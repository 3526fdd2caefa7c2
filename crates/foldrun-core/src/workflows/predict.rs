use crate::core::models::target::Target;
use crate::engine::alignment::{AlignmentCoordinator, AlignmentRunner};
use crate::engine::catalog::TargetCatalog;
use crate::engine::compilation::{CompilationCache, round_up_seqlen};
use crate::engine::config::{ConfigError, PredictionConfig};
use crate::engine::error::{EngineError, error_chain};
use crate::engine::features::{FeatureAssembler, FeatureCache, FeaturePipeline};
use crate::engine::invoker::{self, LoadedModel};
use crate::engine::output::{OutputArtifact, OutputPersister, Relaxer};
use crate::engine::processing::FeatureProcessor;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::state::{BatchReport, TargetFailure, TargetOutcome, TargetStage};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, info_span, instrument, warn};

/// The external capabilities a batch run is wired to.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub alignment_runner: &'a dyn AlignmentRunner,
    pub feature_pipeline: &'a dyn FeaturePipeline,
    pub feature_processor: &'a dyn FeatureProcessor,
    /// Required when relaxation is enabled.
    pub relaxer: Option<&'a dyn Relaxer>,
}

/// Runs every loaded model over every catalogued target.
///
/// The driver owns the feature cache for the whole run, so features are assembled
/// once per target no matter how many models are loaded. Compilation state is
/// per model and starts fresh each time a model begins its pass.
pub struct BatchDriver<'a> {
    config: &'a PredictionConfig,
    collaborators: Collaborators<'a>,
    reporter: &'a ProgressReporter<'a>,
    features: FeatureCache,
}

impl<'a> BatchDriver<'a> {
    pub fn new(
        config: &'a PredictionConfig,
        collaborators: Collaborators<'a>,
        reporter: &'a ProgressReporter<'a>,
    ) -> Self {
        Self {
            config,
            collaborators,
            reporter,
            features: FeatureCache::new(),
        }
    }

    pub fn feature_cache(&self) -> &FeatureCache {
        &self.features
    }

    /// Processes the whole batch.
    ///
    /// Only configuration problems abort the run, and they are detected before any
    /// target is touched. Every per-target error is logged and recorded in the report.
    #[instrument(skip_all, name = "predict_workflow")]
    pub fn run(
        &mut self,
        catalog: &TargetCatalog,
        models: &mut [LoadedModel],
    ) -> Result<BatchReport, EngineError> {
        self.config.validate()?;
        if self.config.output.relax && self.collaborators.relaxer.is_none() {
            return Err(ConfigError::MissingParameter("relaxer").into());
        }
        fs::create_dir_all(&self.config.output_root)
            .map_err(EngineError::output(&self.config.output_root))?;

        info!(
            models = models.len(),
            targets = catalog.len(),
            skipped = catalog.skipped().len(),
            preset = self.config.model.preset(),
            "Starting batch prediction."
        );

        if !catalog.skipped().is_empty() {
            self.reporter.report(Progress::Message(format!(
                "{} input file(s) skipped",
                catalog.skipped().len()
            )));
        }

        let mut report = BatchReport::new(catalog.skipped().to_vec());
        for model in models.iter_mut() {
            self.run_model(model, catalog, &mut report);
        }

        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Batch prediction finished."
        );
        Ok(report)
    }

    fn run_model(&mut self, model: &mut LoadedModel, catalog: &TargetCatalog, report: &mut BatchReport) {
        self.reporter.report(Progress::PhaseStart {
            name: format!("Predicting with {}", model.name),
        });
        self.reporter.report(Progress::TaskStart {
            total_steps: catalog.len() as u64,
        });

        let mut compilation = CompilationCache::new();
        for target in catalog.targets() {
            self.reporter.report(Progress::TargetStarted {
                name: target.file_stem().to_string(),
            });

            let span = info_span!("target", model = %model.name, name = target.file_stem());
            let _entered = span.enter();
            let output_dir = self.target_output_dir(model, target);
            let fresh_dir = !output_dir.exists();
            let mut stage = TargetStage::Pending;
            let result = self.run_target(model, &mut compilation, target, &output_dir, &mut stage);
            let result = match result {
                Ok(artifact) => {
                    stage.advance(TargetStage::Done);
                    info!(
                        model = %model.name,
                        target = target.file_stem(),
                        path = %artifact.unrelaxed.display(),
                        "Target finished."
                    );
                    Ok(artifact)
                }
                Err(error) => {
                    error!(
                        model = %model.name,
                        target = target.file_stem(),
                        stage = %stage,
                        error = %error_chain(&error),
                        "Target failed."
                    );
                    if fresh_dir {
                        discard_dir(&output_dir);
                    }
                    Err(TargetFailure { stage, error })
                }
            };

            self.reporter.report(Progress::TargetFinished {
                name: target.file_stem().to_string(),
                success: result.is_ok(),
            });
            self.reporter.report(Progress::TaskIncrement);
            report.push(TargetOutcome {
                model: model.name.clone(),
                target: target.file_stem().to_string(),
                result,
            });
        }

        self.reporter.report(Progress::TaskFinish);
        self.reporter.report(Progress::PhaseFinish);
    }

    fn target_output_dir(&self, model: &LoadedModel, target: &Target) -> PathBuf {
        model
            .output_dir
            .join(self.config.model.preset())
            .join(target.file_stem())
    }

    fn run_target(
        &mut self,
        model: &mut LoadedModel,
        compilation: &mut CompilationCache,
        target: &Target,
        output_dir: &Path,
        stage: &mut TargetStage,
    ) -> Result<OutputArtifact, EngineError> {
        let config = self.config;
        fs::create_dir_all(output_dir).map_err(EngineError::output(output_dir))?;
        info!(model = %model.name, target = target.file_stem(), tag = target.tag(), "Processing target.");

        let coordinator = AlignmentCoordinator::new(
            self.collaborators.alignment_runner,
            &config.alignment,
            config.chain_mode,
            &config.output_root,
        );
        let alignment_dir = coordinator.ensure(target)?;
        stage.advance(TargetStage::AlignmentReady);

        let assembler = FeatureAssembler::new(
            self.collaborators.feature_pipeline,
            config.chain_mode,
            config.single_sequence_mode,
            config.compilation_interval(),
            &config.output_root,
        );
        let record = assembler.assemble(&mut self.features, target, &alignment_dir, output_dir)?;
        let processed = self
            .collaborators
            .feature_processor
            .process(record, config.chain_mode)
            .map_err(|source| EngineError::Processing {
                tag: target.tag().to_string(),
                source,
            })?;
        stage.advance(TargetStage::FeatureReady);

        let bucket = match config.compilation_interval() {
            Some(interval) => Some(round_up_seqlen(record.num_residues()?, interval)),
            None => None,
        };
        let output = invoker::run(model, compilation, &processed, bucket, stage)?;

        let persister = OutputPersister::new(
            &config.model,
            config.chain_mode,
            &config.device,
            config.output,
            config.diagnostics,
            self.collaborators.relaxer,
        );
        persister.write(target, &output, &processed, record, output_dir, stage)
    }
}

/// Removes a directory created for a target that then failed.
fn discard_dir(dir: &Path) {
    if let Err(e) = fs::remove_dir_all(dir) {
        warn!(dir = %dir.display(), error = %e, "Could not remove output of a failed target.");
    }
}
