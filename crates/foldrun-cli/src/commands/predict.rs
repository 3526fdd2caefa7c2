use crate::cli::PredictArgs;
use crate::config::build_config;
use crate::error::Result;
use crate::tools::features::FeatureToolSettings;
use crate::tools::model::write_model_config;
use crate::tools::{ProcessAlignmentRunner, ProcessFeaturePipeline, ProcessRelaxer, load_models};
use crate::utils::progress::CliProgressHandler;
use foldrun::engine::catalog::TargetCatalog;
use foldrun::engine::error::error_chain;
use foldrun::engine::output::Relaxer;
use foldrun::engine::processing::RecyclingFeatureProcessor;
use foldrun::engine::progress::ProgressReporter;
use foldrun::engine::state::BatchReport;
use foldrun::workflows::predict::{BatchDriver, Collaborators};
use std::fs;
use std::io::{self, Write};
use tracing::{info, warn};

pub async fn run(args: PredictArgs) -> Result<()> {
    super::require_dir(&args.fasta_dir, "FASTA directory")?;
    info!("Building run configuration...");
    let app = build_config(&args)?;
    let core = &app.core_config;
    info!(
        preset = core.model.preset(),
        chain_mode = ?core.chain_mode,
        single_sequence = core.single_sequence_mode,
        random_seed = app.random_seed,
        "Configuration ready."
    );

    let catalog = TargetCatalog::discover(&app.fasta_dir, core.chain_mode)?;
    if catalog.is_empty() {
        warn!(dir = %app.fasta_dir.display(), "No usable targets found.");
        println!(
            "No targets to predict in {} ({} file(s) skipped).",
            app.fasta_dir.display(),
            catalog.skipped().len()
        );
        return Ok(());
    }

    fs::create_dir_all(&core.output_root)?;
    let config_path = write_model_config(&core.model, &core.output_root)?;

    let alignment_runner = ProcessAlignmentRunner::new(&app.tools.alignment)?;
    let feature_pipeline = ProcessFeaturePipeline::new(
        &app.tools.features,
        FeatureToolSettings {
            work_dir: core.output_root.clone(),
            template_mmcif_dir: app.template_mmcif_dir.clone(),
            enable_template: app.enable_template,
            random_seed: app.random_seed,
            config_path: config_path.clone(),
        },
    )?;
    let feature_processor = RecyclingFeatureProcessor::from_config(&core.model, &core.device)?;
    let relaxer = app.tools.relax.as_ref().map(ProcessRelaxer::new).transpose()?;
    let mut models = load_models(&app, &config_path, &core.output_root)?;

    let collaborators = Collaborators {
        alignment_runner: &alignment_runner,
        feature_pipeline: &feature_pipeline,
        feature_processor: &feature_processor,
        relaxer: relaxer.as_ref().map(|r| r as &dyn Relaxer),
    };

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!(
        "Predicting {} target(s) with {} model(s)...",
        catalog.len(),
        models.len()
    );
    info!("Invoking the batch prediction workflow...");

    let report = tokio::task::block_in_place(|| {
        BatchDriver::new(core, collaborators, &reporter).run(&catalog, &mut models)
    })?;

    write_summary(&report, &mut io::stdout().lock())?;
    println!("Outputs written under {}", core.output_root.display());
    Ok(())
}

/// Per-target failures do not change the exit status; they are listed here instead.
fn write_summary(report: &BatchReport, out: &mut impl Write) -> io::Result<()> {
    writeln!(
        out,
        "Finished: {} succeeded, {} failed, {} input file(s) skipped.",
        report.succeeded(),
        report.failed(),
        report.skipped().len()
    )?;
    for (outcome, failure) in report.failures() {
        writeln!(
            out,
            "  ✗ {} / {} (at {}): {}",
            outcome.model,
            outcome.target,
            failure.stage,
            error_chain(&failure.error)
        )?;
    }
    for skipped in report.skipped() {
        writeln!(out, "  - skipped {}: {}", skipped.path.display(), skipped.reason)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use foldrun::engine::catalog::SkippedInput;
    use foldrun::engine::error::{EngineError, ToolError};
    use foldrun::engine::output::OutputArtifact;
    use foldrun::engine::state::{TargetFailure, TargetOutcome, TargetStage};
    use std::path::PathBuf;

    #[test]
    fn summary_lists_failures_and_skips() {
        let mut report = BatchReport::new(vec![SkippedInput {
            path: PathBuf::from("in/pair.fasta"),
            reason: "expected exactly one sequence in single-chain mode, found 2".to_string(),
        }]);
        report.push(TargetOutcome {
            model: "params_model_1".to_string(),
            target: "t1".to_string(),
            result: Ok(OutputArtifact::default()),
        });
        report.push(TargetOutcome {
            model: "params_model_1".to_string(),
            target: "t2".to_string(),
            result: Err(TargetFailure {
                stage: TargetStage::AlignmentReady,
                error: EngineError::Features {
                    tag: "T2".to_string(),
                    source: ToolError::Failed("no hits".to_string()),
                },
            }),
        });

        let mut out = Vec::new();
        write_summary(&report, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines[0],
            "Finished: 1 succeeded, 1 failed, 1 input file(s) skipped."
        );
        assert!(lines[1].starts_with("  ✗ params_model_1 / t2 (at alignment-ready):"));
        assert!(lines[1].contains("no hits"));
        assert!(lines[2].contains("pair.fasta"));
    }
}
