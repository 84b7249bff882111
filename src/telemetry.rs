//! Log output for `mfi`: a span tree on stderr and an optional json-lines
//! file, pruned on startup, that `watch` keeps by default.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::{Layer, Layered, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

use crate::config::{FileLoggingConfig, LogRotation, LoggingConfig};
use crate::paths;

const LOG_FILE_PREFIX: &str = "mfi.log";
const LOG_ENV_VAR: &str = "MFI_LOG";
const SECS_PER_DAY: u64 = 24 * 60 * 60;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;
type LogSubscriber = Layered<Vec<BoxedLayer>, Registry>;

/// Subscriber settings resolved from the CLI and the `[logging]` section.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    pub verbosity: u8,
    pub logging: LoggingConfig,
}

impl TelemetryConfig {
    pub fn new(verbosity: u8, logging: LoggingConfig) -> Self {
        Self { verbosity, logging }
    }
}

pub fn is_test_env() -> bool {
    std::env::var_os("MFI_TESTING").is_some() || std::env::var_os("RUST_TEST_THREADS").is_some()
}

/// `watch` runs unattended, so it always keeps a log file unless under test.
pub fn apply_watch_logging_defaults(logging: &mut LoggingConfig) {
    apply_watch_logging_defaults_inner(logging, is_test_env());
}

fn apply_watch_logging_defaults_inner(logging: &mut LoggingConfig, is_test_env: bool) {
    if is_test_env {
        return;
    }
    logging.file.enabled = true;
}

/// Keeps the file writer's background thread alive; dropping it flushes.
pub struct TelemetryGuard {
    _file_writer: Option<WorkerGuard>,
}

#[derive(Debug, Error)]
enum LogFileError {
    #[error("cannot create log dir {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("cannot scan log dir {} for old files: {source}", path.display())]
    Scan { path: PathBuf, source: io::Error },
    #[error("cannot open log file in {}: {source}", path.display())]
    Open {
        path: PathBuf,
        source: tracing_appender::rolling::InitError,
    },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct PruneReport {
    removed: usize,
    failed: usize,
}

/// Outcome of opening the log file. Reported once the subscriber is live,
/// since nothing can be logged before that.
#[derive(Debug, Default)]
struct FileSetup {
    dir: Option<PathBuf>,
    pruned: PruneReport,
    error: Option<LogFileError>,
}

impl FileSetup {
    fn report(&self) {
        if let Some(error) = &self.error {
            tracing::warn!(%error, "file logging disabled");
            return;
        }
        if let Some(dir) = &self.dir {
            tracing::info!(
                dir = %dir.display(),
                pruned = self.pruned.removed,
                prune_failures = self.pruned.failed,
                "file logging enabled"
            );
        }
    }
}

struct Telemetry {
    subscriber: LogSubscriber,
    guard: TelemetryGuard,
    file: FileSetup,
}

/// Install the global subscriber. Call once per process.
pub fn init(config: TelemetryConfig) -> TelemetryGuard {
    let Telemetry {
        subscriber,
        guard,
        file,
    } = assemble(&config, SystemTime::now());
    subscriber.init();
    file.report();
    guard
}

fn assemble(config: &TelemetryConfig, now: SystemTime) -> Telemetry {
    let mut layers: Vec<BoxedLayer> = Vec::new();

    if config.logging.stdout {
        layers.push(Box::new(
            tracing_tree::HierarchicalLayer::new(2).with_targets(true),
        ));
    }

    let mut file = FileSetup::default();
    let mut file_writer = None;
    if config.logging.file.enabled {
        let dir = config.logging.file.dir.clone().unwrap_or_else(paths::log_dir);
        match open_log_file(&config.logging.file, &dir, now) {
            Ok((layer, worker, pruned)) => {
                layers.push(layer);
                file_writer = Some(worker);
                file.pruned = pruned;
                file.dir = Some(dir);
            }
            Err(error) => file.error = Some(error),
        }
    }

    layers.push(Box::new(build_filter(
        config.verbosity,
        config.logging.filter.as_deref(),
    )));

    Telemetry {
        subscriber: Registry::default().with(layers),
        guard: TelemetryGuard {
            _file_writer: file_writer,
        },
        file,
    }
}

fn open_log_file(
    config: &FileLoggingConfig,
    dir: &Path,
    now: SystemTime,
) -> Result<(BoxedLayer, WorkerGuard, PruneReport), LogFileError> {
    fs::create_dir_all(dir).map_err(|source| LogFileError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;
    let pruned = prune_old_logs(dir, config, now).map_err(|source| LogFileError::Scan {
        path: dir.to_path_buf(),
        source,
    })?;

    let rotation = match config.rotation {
        LogRotation::Daily => Rotation::DAILY,
        LogRotation::Hourly => Rotation::HOURLY,
        LogRotation::Never => Rotation::NEVER,
    };
    let appender = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(LOG_FILE_PREFIX)
        .build(dir)
        .map_err(|source| LogFileError::Open {
            path: dir.to_path_buf(),
            source,
        })?;
    let (writer, worker) = tracing_appender::non_blocking(appender);
    let layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(writer)
        .with_ansi(false)
        .with_thread_names(true)
        .with_current_span(true);
    Ok((Box::new(layer), worker, pruned))
}

/// Delete `mfi.log*` files past the age limit, then the oldest ones beyond
/// the count limit. Other files in the directory are left alone.
fn prune_old_logs(
    dir: &Path,
    config: &FileLoggingConfig,
    now: SystemTime,
) -> io::Result<PruneReport> {
    let mut logs: Vec<(SystemTime, PathBuf)> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let is_log = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(LOG_FILE_PREFIX));
        let meta = entry.metadata()?;
        if is_log && meta.is_file() {
            logs.push((meta.modified().unwrap_or(now), entry.path()));
        }
    }
    logs.sort();

    let max_age = config
        .retention_max_age_days
        .map(|days| Duration::from_secs(days.saturating_mul(SECS_PER_DAY)));
    let expired = logs
        .iter()
        .take_while(|(modified, _)| {
            max_age.is_some_and(|max| now.duration_since(*modified).unwrap_or_default() > max)
        })
        .count();
    let surplus = config
        .retention_max_files
        .map_or(0, |max| logs.len().saturating_sub(max));

    let mut report = PruneReport::default();
    for (_, path) in logs.drain(..expired.max(surplus)) {
        match fs::remove_file(&path) {
            Ok(()) => report.removed += 1,
            Err(_) => report.failed += 1,
        }
    }
    Ok(report)
}

/// `MFI_LOG` wins over the configured filter, which wins over `-v`.
fn build_filter(verbosity: u8, configured: Option<&str>) -> EnvFilter {
    let builder = EnvFilter::builder()
        .with_default_directive(level_from_verbosity(verbosity).into())
        .with_env_var(LOG_ENV_VAR);
    if std::env::var_os(LOG_ENV_VAR).is_some() {
        return builder.from_env_lossy();
    }
    match configured.map(str::trim).filter(|f| !f.is_empty()) {
        Some(directives) => builder.parse_lossy(directives),
        None => builder.from_env_lossy(),
    }
}

fn level_from_verbosity(verbosity: u8) -> tracing::metadata::LevelFilter {
    match verbosity {
        0 => tracing::metadata::LevelFilter::WARN,
        1 => tracing::metadata::LevelFilter::INFO,
        _ => tracing::metadata::LevelFilter::DEBUG,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_only(
        dir: &Path,
        max_age_days: Option<u64>,
        max_files: Option<usize>,
    ) -> TelemetryConfig {
        let mut logging = LoggingConfig::default();
        logging.stdout = false;
        logging.filter = Some("info".to_string());
        logging.file.enabled = true;
        logging.file.dir = Some(dir.to_path_buf());
        logging.file.rotation = LogRotation::Never;
        logging.file.retention_max_age_days = max_age_days;
        logging.file.retention_max_files = max_files;
        TelemetryConfig::new(0, logging)
    }

    fn seed_old_logs(dir: &Path) {
        for name in [
            "mfi.log.2020-01-01",
            "mfi.log.2020-01-02",
            "mfi.log.2020-01-03",
            "notes.txt",
        ] {
            fs::write(dir.join(name), b"{}\n").unwrap();
        }
    }

    #[test]
    fn watch_defaults_enable_file_logging_outside_tests() {
        let mut logging = LoggingConfig::default();
        logging.file.enabled = false;
        apply_watch_logging_defaults_inner(&mut logging, true);
        assert!(!logging.file.enabled);
        apply_watch_logging_defaults_inner(&mut logging, false);
        assert!(logging.file.enabled);
    }

    #[test]
    fn file_log_keeps_newest_files_and_records_events() {
        let dir = tempfile::tempdir().unwrap();
        seed_old_logs(dir.path());

        let Telemetry {
            subscriber,
            guard,
            file,
        } = assemble(&file_only(dir.path(), None, Some(1)), SystemTime::now());
        assert!(file.error.is_none());
        assert_eq!(file.pruned, PruneReport { removed: 2, failed: 0 });

        tracing::subscriber::with_default(subscriber, || {
            file.report();
            tracing::warn!(topic = "/topic/loans", "realtime session dropped");
        });
        drop(guard);

        assert!(!dir.path().join("mfi.log.2020-01-01").exists());
        assert!(!dir.path().join("mfi.log.2020-01-02").exists());
        assert!(dir.path().join("mfi.log.2020-01-03").exists());
        assert!(dir.path().join("notes.txt").exists());

        let written = fs::read_to_string(dir.path().join(LOG_FILE_PREFIX)).unwrap();
        let lines: Vec<serde_json::Value> = written
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["fields"]["message"], "file logging enabled");
        assert_eq!(lines[0]["fields"]["pruned"], 2);
        assert_eq!(lines[1]["level"], "WARN");
        assert_eq!(lines[1]["fields"]["topic"], "/topic/loans");
    }

    #[test]
    fn file_log_drops_files_past_the_age_limit() {
        let dir = tempfile::tempdir().unwrap();
        seed_old_logs(dir.path());
        let later = SystemTime::now() + Duration::from_secs(30 * SECS_PER_DAY);

        let telemetry = assemble(&file_only(dir.path(), Some(7), None), later);
        assert_eq!(telemetry.file.pruned.removed, 3);
        assert!(dir.path().join("notes.txt").exists());
        drop(telemetry);

        let logs = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().starts_with("mfi.log."))
            .count();
        assert_eq!(logs, 0);
    }

    #[test]
    fn file_log_without_limits_keeps_everything() {
        let dir = tempfile::tempdir().unwrap();
        seed_old_logs(dir.path());
        let telemetry = assemble(&file_only(dir.path(), None, None), SystemTime::now());
        assert_eq!(telemetry.file.pruned, PruneReport::default());
        assert!(dir.path().join("mfi.log.2020-01-01").exists());
    }

    #[test]
    fn unusable_log_dir_disables_file_logging() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"x").unwrap();

        let telemetry = assemble(&file_only(&blocker, None, None), SystemTime::now());
        assert!(matches!(
            telemetry.file.error,
            Some(LogFileError::CreateDir { .. })
        ));
        assert!(telemetry.file.dir.is_none());
    }

    #[test]
    fn verbosity_maps_to_levels() {
        use tracing::metadata::LevelFilter;
        assert_eq!(level_from_verbosity(0), LevelFilter::WARN);
        assert_eq!(level_from_verbosity(1), LevelFilter::INFO);
        assert_eq!(level_from_verbosity(3), LevelFilter::DEBUG);
    }
}
