use super::catalog::SkippedInput;
use super::error::EngineError;
use super::output::OutputArtifact;
use std::fmt;

/// Progress of one (model, target) pair through the pipeline.
///
/// Stages only move forward. When an error occurs, the stage reached so far is
/// recorded with the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum TargetStage {
    #[default]
    Pending,
    AlignmentReady,
    FeatureReady,
    Compiled,
    Inferred,
    Written,
    Relaxed,
    MetricsSaved,
    Done,
}

impl TargetStage {
    pub fn advance(&mut self, next: TargetStage) {
        if next > *self {
            *self = next;
        }
    }
}

impl fmt::Display for TargetStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TargetStage::Pending => "pending",
            TargetStage::AlignmentReady => "alignment-ready",
            TargetStage::FeatureReady => "feature-ready",
            TargetStage::Compiled => "compiled",
            TargetStage::Inferred => "inferred",
            TargetStage::Written => "written",
            TargetStage::Relaxed => "relaxed",
            TargetStage::MetricsSaved => "metrics-saved",
            TargetStage::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub struct TargetFailure {
    pub stage: TargetStage,
    pub error: EngineError,
}

#[derive(Debug)]
pub struct TargetOutcome {
    pub model: String,
    pub target: String,
    pub result: Result<OutputArtifact, TargetFailure>,
}

impl TargetOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Everything a batch run produced, in processing order.
#[derive(Debug, Default)]
pub struct BatchReport {
    outcomes: Vec<TargetOutcome>,
    skipped: Vec<SkippedInput>,
}

impl BatchReport {
    pub fn new(skipped: Vec<SkippedInput>) -> Self {
        Self {
            outcomes: Vec::new(),
            skipped,
        }
    }

    pub fn push(&mut self, outcome: TargetOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn outcomes(&self) -> &[TargetOutcome] {
        &self.outcomes
    }

    pub fn skipped(&self) -> &[SkippedInput] {
        &self.skipped
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&TargetOutcome, &TargetFailure)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|f| (o, f)))
    }
}
