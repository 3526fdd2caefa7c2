use super::compilation::CompilationCache;
use super::error::{EngineError, ToolError};
use super::state::TargetStage;
use crate::core::models::features::{ModelOutput, ProcessedFeatures};
use std::fmt;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

/// A pretrained structure-prediction model.
///
/// Both calls take `&mut self`: compilation changes the model, and a model may
/// keep per-shape state between calls.
pub trait StructureModel {
    fn run(&mut self, features: &ProcessedFeatures) -> Result<ModelOutput, ToolError>;

    /// Compiles the model ahead of time for the shapes of `features`.
    fn compile(&mut self, features: &ProcessedFeatures) -> Result<(), ToolError>;
}

/// A model together with the directory its predictions go to.
pub struct LoadedModel {
    pub name: String,
    pub model: Box<dyn StructureModel>,
    pub output_dir: PathBuf,
}

impl LoadedModel {
    pub fn new(
        name: impl Into<String>,
        model: Box<dyn StructureModel>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            model,
            output_dir: output_dir.into(),
        }
    }
}

impl fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModel")
            .field("name", &self.name)
            .field("output_dir", &self.output_dir)
            .finish_non_exhaustive()
    }
}

/// Runs one model on one processed feature record.
///
/// With `bucket` set (compilation active), the model is first compiled on these
/// same features whenever the bucket exceeds everything compiled so far for it.
/// No retries are attempted.
pub fn run(
    model: &mut LoadedModel,
    cache: &mut CompilationCache,
    features: &ProcessedFeatures,
    bucket: Option<usize>,
    stage: &mut TargetStage,
) -> Result<ModelOutput, EngineError> {
    if let Some(bucket) = bucket {
        if cache.should_recompile(bucket) {
            info!(model = %model.name, bucket, "Compiling model.");
            let started = Instant::now();
            model
                .model
                .compile(features)
                .map_err(|source| EngineError::Compilation { bucket, source })?;
            info!(
                model = %model.name,
                bucket,
                seconds = started.elapsed().as_secs_f64(),
                "Compilation finished."
            );
            cache.record(bucket);
            stage.advance(TargetStage::Compiled);
        }
    }

    let started = Instant::now();
    let output = model
        .model
        .run(features)
        .map_err(|source| EngineError::Inference {
            model: model.name.clone(),
            source,
        })?;
    info!(
        model = %model.name,
        seconds = started.elapsed().as_secs_f64(),
        "Inference finished."
    );
    stage.advance(TargetStage::Inferred);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::tensor::TensorMap;
    use std::cell::Cell;
    use std::rc::Rc;

    struct FakeModel {
        compiles: Rc<Cell<usize>>,
        runs: Rc<Cell<usize>>,
        fail_compile: bool,
    }

    impl StructureModel for FakeModel {
        fn run(&mut self, _features: &ProcessedFeatures) -> Result<ModelOutput, ToolError> {
            self.runs.set(self.runs.get() + 1);
            Ok(ModelOutput::default())
        }

        fn compile(&mut self, _features: &ProcessedFeatures) -> Result<(), ToolError> {
            if self.fail_compile {
                return Err(ToolError::Failed("unsupported shape".to_string()));
            }
            self.compiles.set(self.compiles.get() + 1);
            Ok(())
        }
    }

    fn loaded(fail_compile: bool) -> (LoadedModel, Rc<Cell<usize>>, Rc<Cell<usize>>) {
        let compiles = Rc::new(Cell::new(0));
        let runs = Rc::new(Cell::new(0));
        let model = FakeModel {
            compiles: compiles.clone(),
            runs: runs.clone(),
            fail_compile,
        };
        (LoadedModel::new("m", Box::new(model), "/out"), compiles, runs)
    }

    #[test]
    fn compiles_only_for_growing_buckets() {
        let (mut model, compiles, runs) = loaded(false);
        let mut cache = CompilationCache::new();
        let features = ProcessedFeatures::new(TensorMap::new(), "cpu");

        for bucket in [50, 50, 100, 50, 100] {
            let mut stage = TargetStage::FeatureReady;
            run(&mut model, &mut cache, &features, Some(bucket), &mut stage).unwrap();
            assert_eq!(stage, TargetStage::Inferred);
        }

        assert_eq!(compiles.get(), 2);
        assert_eq!(runs.get(), 5);
    }

    #[test]
    fn no_bucket_means_no_compilation() {
        let (mut model, compiles, _) = loaded(false);
        let mut cache = CompilationCache::new();
        let features = ProcessedFeatures::new(TensorMap::new(), "cpu");
        let mut stage = TargetStage::FeatureReady;

        run(&mut model, &mut cache, &features, None, &mut stage).unwrap();

        assert_eq!(compiles.get(), 0);
        assert_eq!(cache.largest(), None);
    }

    #[test]
    fn compilation_failure_skips_inference_and_leaves_cache_untouched() {
        let (mut model, _, runs) = loaded(true);
        let mut cache = CompilationCache::new();
        let features = ProcessedFeatures::new(TensorMap::new(), "cpu");
        let mut stage = TargetStage::FeatureReady;

        let result = run(&mut model, &mut cache, &features, Some(50), &mut stage);

        assert!(matches!(result, Err(EngineError::Compilation { bucket: 50, .. })));
        assert_eq!(runs.get(), 0);
        assert_eq!(cache.largest(), None);
        assert_eq!(stage, TargetStage::FeatureReady);
    }
}
