//! Logging initialization.
//!
//! Two profiles, picked with `UMBRA_ENV`:
//! - **Production**: JSON lines in a daily rolling file plus compact stdout
//!   for the user journal
//! - **Development**: pretty stdout with span open/close events
//!
//! Log files go to the user's state directory.

use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Keeps the non-blocking writers flushing for the life of the process.
static GUARDS: OnceLock<(WorkerGuard, WorkerGuard)> = OnceLock::new();

/// Environment variable selecting the logging profile.
pub const ENV_VAR: &str = "UMBRA_ENV";

/// Default filter when `RUST_LOG` is not set.
pub const LOG_LEVEL_VAR: &str = "UMBRA_LOG_LEVEL";

/// Overrides the log file directory.
pub const LOG_DIR_VAR: &str = "UMBRA_LOG_DIR";

const LOG_FILE_PREFIX: &str = "umbra";

/// Which set of layers to install.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogProfile {
    /// File and stdout, machine readable.
    Production,
    /// Stdout only, human readable.
    Development,
}

impl LogProfile {
    /// Reads the profile from `UMBRA_ENV`. Anything but "production" means
    /// development.
    #[must_use]
    pub fn from_env() -> Self {
        Self::parse(std::env::var(ENV_VAR).ok().as_deref())
    }

    fn parse(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.trim().eq_ignore_ascii_case("production") => Self::Production,
            _ => Self::Development,
        }
    }
}

/// Installs the global subscriber.
///
/// `RUST_LOG` wins over `UMBRA_LOG_LEVEL`, which defaults to `info`.
///
/// # Errors
///
/// Returns an error if the filter cannot be parsed or the log directory
/// cannot be created.
pub fn init(profile: LogProfile) -> anyhow::Result<()> {
    let log_level = std::env::var(LOG_LEVEL_VAR).unwrap_or_else(|_| "info".to_string());
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log_level))?;

    match profile {
        LogProfile::Production => init_production(env_filter),
        LogProfile::Development => {
            init_development(env_filter);
            Ok(())
        }
    }
}

fn init_production(env_filter: EnvFilter) -> anyhow::Result<()> {
    let log_dir = log_directory();
    std::fs::create_dir_all(&log_dir)?;

    // umbra.YYYY-MM-DD
    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE_PREFIX);
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(file_writer)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(stdout_writer)
        .with_target(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    let _ = GUARDS.set((file_guard, stdout_guard));
    tracing::info!(dir = %log_dir.display(), "writing logs");

    Ok(())
}

fn init_development(env_filter: EnvFilter) {
    let stdout_layer = tracing_subscriber::fmt::layer()
        .pretty()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .init();
}

/// `UMBRA_LOG_DIR`, else the per-user state directory.
fn log_directory() -> PathBuf {
    if let Some(dir) = std::env::var_os(LOG_DIR_VAR).filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    directories::ProjectDirs::from("", "", "umbra")
        .map(|dirs| {
            dirs.state_dir()
                .unwrap_or_else(|| dirs.data_local_dir())
                .join("logs")
        })
        .unwrap_or_else(|| PathBuf::from("./logs"))
}
