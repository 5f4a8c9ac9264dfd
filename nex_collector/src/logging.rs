use std::str::FromStr;

use tracing_subscriber::EnvFilter;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable, `debug` by default
    #[default]
    Dev,
    /// JSON lines, `info` by default
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dev" | "pretty" | "text" => Ok(LogFormat::Dev),
            "json" | "prod" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

fn env_filter_or(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Initialize logging for development (human-readable format)
pub fn init_dev_logging() {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(env_filter_or("debug"))
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .try_init();

    if installed.is_err() {
        tracing::debug!("Global subscriber already installed");
    }
}

/// Initialize logging for production (JSON format)
pub fn init_prod_logging() {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(env_filter_or("info"))
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .json()
        .try_init();

    if installed.is_err() {
        tracing::debug!("Global subscriber already installed");
    }
}

/// Initialize logging with custom filter
pub fn init_logging_with_filter(filter: &str) {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .try_init();

    if installed.is_err() {
        tracing::debug!("Global subscriber already installed");
    }
}

/// Initialize logging in the given format
pub fn init_logging(format: LogFormat) {
    match format {
        LogFormat::Dev => init_dev_logging(),
        LogFormat::Json => init_prod_logging(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("DEV".parse::<LogFormat>().unwrap(), LogFormat::Dev);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_repeated_initialization_is_harmless() {
        init_logging_with_filter("warn");
        init_dev_logging();
        init_prod_logging();
    }
}
