//! Tracing subscriber setup.

use anyhow::{anyhow, Context};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::DaemonConfig;

/// Log file name prefix inside `daemon.log_dir`.
pub const LOG_FILE_PREFIX: &str = "lcdsrv.log";

/// Build the log filter.
///
/// `RUST_LOG` wins when set; otherwise `--verbose` forces `debug` and the
/// configured level applies.
pub fn filter(level: &str, verbose: bool) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    EnvFilter::new(if verbose { "debug" } else { level })
}

/// Install the global subscriber.
///
/// With `log_dir` set, output goes to a daily rolling file through a
/// background writer; the returned guard must be held until exit so
/// buffered lines are flushed.
pub fn init(config: &DaemonConfig, verbose: bool) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = filter(&config.log_level, verbose);

    match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("cannot create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);

            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .try_init()
                .map_err(|e| anyhow!("failed to install logger: {e}"))?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init()
                .map_err(|e| anyhow!("failed to install logger: {e}"))?;
            Ok(None)
        }
    }
}
