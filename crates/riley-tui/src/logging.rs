//! File logging. The terminal belongs to the UI, so nothing goes to stdout.

use std::path::PathBuf;

use anyhow::{Context, Result};
use riley_core::Config;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber writing to `<config dir>/riley/logs/riley.log.YYYY-MM-DD`.
/// `RUST_LOG` wins over the configured level. Keep the guard alive until exit.
pub fn init(config: &Config) -> Result<WorkerGuard> {
    let log_dir = Config::log_dir().unwrap_or_else(|| PathBuf::from("logs"));
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory {:?}", log_dir))?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let file_appender = tracing_appender::rolling::daily(&log_dir, "riley.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .try_init()
        .context("Failed to install log subscriber")?;

    Ok(guard)
}
