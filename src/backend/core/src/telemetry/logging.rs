//! Structured logging.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line
    Json,
    /// Multi-line, human readable
    Pretty,
}

impl LogFormat {
    pub fn from_config(config: &ObservabilityConfig) -> Self {
        if config.json_logging {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Build the level filter. `RUST_LOG` wins over the configured level.
pub fn env_filter(config: &ObservabilityConfig) -> anyhow::Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => Ok(EnvFilter::try_new(&config.log_level)?),
    }
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns an error if the level is unparseable or a subscriber is already set.
pub fn init_logging(config: &ObservabilityConfig) -> anyhow::Result<()> {
    let filter = env_filter(config)?;

    match LogFormat::from_config(config) {
        LogFormat::Json => {
            let fmt_layer = fmt::layer()
                .json()
                .with_current_span(true)
                .with_target(true);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()?;
        }
        LogFormat::Pretty => {
            let fmt_layer = fmt::layer().pretty().with_target(true);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_config() {
        let mut config = ObservabilityConfig::default();
        assert_eq!(LogFormat::from_config(&config), LogFormat::Json);
        config.json_logging = false;
        assert_eq!(LogFormat::from_config(&config), LogFormat::Pretty);
    }

    #[test]
    fn test_bad_level_rejected() {
        std::env::remove_var("RUST_LOG");
        let config = ObservabilityConfig {
            log_level: "skyreel_core=[".to_string(),
            ..ObservabilityConfig::default()
        };
        assert!(env_filter(&config).is_err());
    }
}
