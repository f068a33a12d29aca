use clap::ValueEnum;
use tracing_log::LogTracer;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Installs the global subscriber and routes `log` records into it.
///
/// `level` takes any `EnvFilter` directive (`info`, `intersync=debug,warn`).
pub fn init(level: &str, format: LogFormat) -> Result<(), String> {
    LogTracer::init().map_err(|e| format!("failed to bridge log records: {e}"))?;

    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let installed = match format {
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish()),
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish()),
    };
    installed.map_err(|e| format!("failed to install log subscriber: {e}"))
}
