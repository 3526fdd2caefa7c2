use crate::error::{CliError, Result};
use std::fs::File;
use std::path::Path;
use tracing::Subscriber;
use tracing_subscriber::{
    Layer,
    filter::{LevelFilter, Targets},
    fmt::{self, format::FmtSpan},
    prelude::*,
    registry::LookupSpan,
};

/// Target prefix shared by the engine library and this binary.
const FOLDRUN_TARGET: &str = "foldrun";

fn level_filter(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::OFF;
    }
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// `-v` flags raise foldrun's own verbosity; dependencies never log below WARN.
fn target_filter(verbosity: u8, quiet: bool) -> Targets {
    let level = level_filter(verbosity, quiet);
    Targets::new()
        .with_target(FOLDRUN_TARGET, level)
        .with_default(level.min(LevelFilter::WARN))
}

/// Plain-text log file. Closing a per-target span records how long the target took.
fn file_layer<S>(file: File) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(file)
        .with_ansi(false)
        .with_thread_ids(true)
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
}

pub fn setup_logging(verbosity: u8, quiet: bool, log_file: Option<&Path>) -> Result<()> {
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false)
        .compact();

    let subscriber = tracing_subscriber::registry()
        .with(target_filter(verbosity, quiet))
        .with(stderr_layer);

    match log_file {
        Some(path) => {
            let file = File::create(path).map_err(CliError::Io)?;
            subscriber.with(file_layer(file)).init();
        }
        None => subscriber.init(),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::sync::Once;
    use std::thread;
    use std::time::Duration;
    use tracing::{Level, debug, error, info, info_span, trace, warn};

    static INIT: Once = Once::new();

    fn ensure_global_logger_is_set() {
        INIT.call_once(|| {
            setup_logging(3, false, None).expect("Failed to set up global logger for tests");
        });
    }

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(level_filter(0, false), LevelFilter::WARN);
        assert_eq!(level_filter(1, false), LevelFilter::INFO);
        assert_eq!(level_filter(2, false), LevelFilter::DEBUG);
        assert_eq!(level_filter(7, false), LevelFilter::TRACE);
        assert_eq!(level_filter(3, true), LevelFilter::OFF);
    }

    #[test]
    fn dependencies_stay_at_warn_while_foldrun_gets_verbose() {
        let filter = target_filter(2, false);
        assert!(filter.would_enable("foldrun::engine::alignment", &Level::DEBUG));
        assert!(!filter.would_enable("foldrun::engine::alignment", &Level::TRACE));
        assert!(!filter.would_enable("hyper::client", &Level::INFO));
        assert!(filter.would_enable("hyper::client", &Level::WARN));

        let quiet = target_filter(2, true);
        assert!(!quiet.would_enable("foldrun", &Level::ERROR));
        assert!(!quiet.would_enable("hyper::client", &Level::ERROR));
    }

    #[test]
    #[serial]
    fn initialization_and_macros_work() {
        ensure_global_logger_is_set();

        error!(target_name = "t1", "Target failed.");
        warn!("Skipping input file.");
        info!(models = 2, "Starting batch prediction.");
        debug!("Feature cache hit.");
        trace!("trace");
    }

    #[test]
    #[serial]
    fn file_layer_writes_plain_text_with_target_spans() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_path = temp_dir.path().join("foldrun.log");

        let file = File::create(&log_path).unwrap();
        let subscriber = tracing_subscriber::registry().with(file_layer(file));

        tracing::subscriber::with_default(subscriber, || {
            let span = info_span!("target", model = "params_model_1", name = "t1");
            let _guard = span.enter();
            debug!(bucket = 50, "Compiling model.");
        });

        thread::sleep(Duration::from_millis(100));

        let content = std::fs::read_to_string(log_path).unwrap();
        assert!(content.contains("Compiling model."));
        assert!(content.contains("bucket=50"));
        assert!(content.contains("DEBUG"));
        assert!(content.contains("target{"));
        assert!(content.contains("t1"));
        assert!(content.contains("close"));
        assert!(!content.contains('\u{1b}'));
    }

    #[test]
    #[serial]
    fn unwritable_log_file_is_an_io_error() {
        let invalid_path = Path::new("/");

        if cfg!(unix) && invalid_path.is_dir() {
            let result = setup_logging(0, false, Some(invalid_path));
            assert!(matches!(result, Err(CliError::Io(_))));
        }
    }
}
