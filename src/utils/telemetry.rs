//! Logging setup
//!
//! Console output plus an optional daily-rolling log file. Worker output
//! arrives under the `worker` target so it can be filtered separately.

use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

const DEFAULT_FILTER: &str = "vanity_rotor=info,worker=info";
const LOG_FILE_PREFIX: &str = "rotor.log";

/// Install the global subscriber. Keep the returned guard alive for the
/// lifetime of the process or buffered file lines are lost.
pub fn init_logging(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let console = fmt::layer().with_target(false);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            Registry::default()
                .with(filter)
                .with(console)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .try_init()
                .context("Failed to set tracing subscriber")?;
            Ok(Some(guard))
        }
        None => {
            Registry::default()
                .with(filter)
                .with(console)
                .try_init()
                .context("Failed to set tracing subscriber")?;
            Ok(None)
        }
    }
}
