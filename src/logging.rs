use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use serde::{
    Deserialize,
    Serialize,
};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::{
    EnvFilter,
    fmt,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Used when `RUST_LOG` is not set.
    pub filter: String,
    /// When set, logs go to a daily rolling file in this directory instead of
    /// stdout.
    pub directory: Option<String>,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            directory: None,
            file_prefix: "survivor-sync.log".to_string(),
        }
    }
}

/// Keep the returned guard alive for the lifetime of the process, dropping it
/// flushes the file writer.
pub fn init_tracing(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter)
            .wrap_err_with(|| format!("invalid log filter '{}'", config.filter))?,
    };

    match &config.directory {
        Some(directory) => {
            let directory = shellexpand::tilde(directory).into_owned();
            let appender = rolling::daily(directory, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .try_init()
                .map_err(|err| eyre!("failed to install tracing subscriber: {err}"))?;
            Ok(Some(guard))
        }
        None => {
            fmt()
                .with_env_filter(filter)
                .try_init()
                .map_err(|err| eyre!("failed to install tracing subscriber: {err}"))?;
            Ok(None)
        }
    }
}
