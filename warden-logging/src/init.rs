use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};
use warden_config::{LogFileConfig, LogFormat, LogLevel, LoggingConfig};

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

/// Keeps the file writer alive. Dropping it flushes buffered log lines, so hold
/// it until the process is about to exit.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    file_guard: Option<WorkerGuard>,
}

impl LoggingGuard {
    /// Whether a file sink is active
    pub fn has_file_sink(&self) -> bool {
        self.file_guard.is_some()
    }
}

/// Initialize logging from configuration: console output in the configured
/// format plus the optional rolling file. `RUST_LOG` overrides the level.
pub fn init_logging(config: &LoggingConfig) -> Result<LoggingGuard> {
    let mut layers: Vec<BoxedLayer<Registry>> = vec![console_layer(config.format, config.include_location)];
    let mut file_guard = None;

    if let Some(file) = &config.file {
        let (layer, guard) = file_layer(file, config.format)?;
        layers.push(layer);
        file_guard = Some(guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter(config.level))
        .try_init()
        .context("Global tracing subscriber already initialized")?;

    tracing::debug!(
        level = %config.level,
        format = ?config.format,
        file = file_guard.is_some(),
        "Logging initialized"
    );

    Ok(LoggingGuard { file_guard })
}

/// Initialize simple tracing for basic console output
pub fn init_simple_tracing(log_level: &str) -> Result<()> {
    let env_filter = EnvFilter::try_new(log_level)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // Use try_init to avoid panic if global subscriber already set
    if tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init()
        .is_err()
    {
        tracing::debug!("Global tracing subscriber already initialized, skipping");
    }

    Ok(())
}

fn env_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

fn console_layer<S>(format: LogFormat, include_location: bool) -> BoxedLayer<S>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_file(include_location)
        .with_line_number(include_location);

    match format {
        LogFormat::Json => layer.json().boxed(),
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Text => layer.boxed(),
    }
}

fn file_layer<S>(config: &LogFileConfig, format: LogFormat) -> Result<(BoxedLayer<S>, WorkerGuard)>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    std::fs::create_dir_all(&config.directory).with_context(|| {
        format!("Failed to create log directory {}", config.directory.display())
    })?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(&config.prefix)
        .max_log_files(config.max_files)
        .build(&config.directory)
        .with_context(|| format!("Failed to open log file in {}", config.directory.display()))?;

    let (writer, guard) = tracing_appender::non_blocking(appender);
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false);

    let layer = match format {
        LogFormat::Json => layer.json().boxed(),
        _ => layer.boxed(),
    };

    Ok((layer, guard))
}
