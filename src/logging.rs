use serde::{Deserialize, Serialize};
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable, multi-line events
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            LogFormat::Pretty => "pretty",
            LogFormat::Json => "json",
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Log level or full filter directive (default: warn)
    pub level: String,
    /// Log format: json or pretty (default: pretty)
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] ParseError),
    #[error("cannot install subscriber: {0}")]
    Init(String),
}

impl LoggingConfig {
    /// `RUST_LOG` wins over the configured level when it is set and valid.
    pub fn filter(&self) -> Result<EnvFilter, LoggingError> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => Ok(EnvFilter::try_new(&self.level)?),
        }
    }
}

/// Install the global subscriber. Events go to stderr; stdout is reserved for
/// the action report.
pub fn init(config: &LoggingConfig) -> Result<(), LoggingError> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.filter()?)
        .with_writer(std::io::stderr);

    let installed = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };
    installed.map_err(|e| LoggingError::Init(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_garbage_filter() {
        let config = LoggingConfig {
            level: "smsverify=loudest".to_string(),
            format: LogFormat::Json,
        };
        // only meaningful when RUST_LOG is not steering the filter
        if std::env::var_os("RUST_LOG").is_none() {
            assert!(matches!(config.filter(), Err(LoggingError::Filter(_))));
        }
    }

    #[test]
    fn accepts_directives() {
        let config = LoggingConfig {
            level: "smsverify=debug,sms_twilio=info".to_string(),
            ..LoggingConfig::default()
        };
        assert!(config.filter().is_ok());
    }

    #[test]
    fn format_names() {
        assert_eq!(LogFormat::Json.as_str(), "json");
        assert_eq!(LogFormat::default(), LogFormat::Pretty);
    }
}
