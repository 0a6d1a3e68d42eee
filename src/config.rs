//! Configuration loading and logging setup.

use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{Error, Result};
use crate::protocol::SegmentLimits;

/// Environment variable holding the application key.
pub const ENV_APP_KEY: &str = "BETSTREAM_APP_KEY";
/// Environment variable holding the session token.
pub const ENV_SESSION_TOKEN: &str = "BETSTREAM_SESSION_TOKEN";

/// Top-level configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub stream: StreamConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.stream.validate()
    }
}

/// Stream session configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Stream endpoint host.
    pub host: String,
    /// Stream endpoint port.
    pub port: u16,
    /// Whether the server may split large change messages.
    pub segmentation_enabled: bool,
    /// Server-side conflation window in milliseconds, 0 for none.
    pub conflate_ms: u64,
    /// Server heartbeat send interval in milliseconds.
    pub heartbeat_ms: u64,
    /// Currency conversion applied to volume-like fields during decode.
    pub currency: CurrencyConfig,
    /// Maximum buffered segments per request id.
    pub max_segments_per_request: usize,
    /// Maximum bytes buffered across all pending segments.
    pub max_buffered_bytes: usize,
}

impl StreamConfig {
    /// Segment buffer bounds derived from this configuration.
    #[must_use]
    pub const fn segment_limits(&self) -> SegmentLimits {
        SegmentLimits {
            max_segments_per_request: self.max_segments_per_request,
            max_buffered_bytes: self.max_buffered_bytes,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(Error::Config("host cannot be empty".into()));
        }
        if !(500..=5000).contains(&self.heartbeat_ms) {
            return Err(Error::Config(
                "heartbeat_ms must be between 500 and 5000".into(),
            ));
        }
        if self.conflate_ms > 120_000 {
            return Err(Error::Config("conflate_ms must be at most 120000".into()));
        }
        if self.currency.rate <= Decimal::ZERO {
            return Err(Error::Config("currency rate must be positive".into()));
        }
        Ok(())
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            host: "stream-api.betfair.com".into(),
            port: 443,
            segmentation_enabled: true,
            conflate_ms: 0,
            heartbeat_ms: 5000,
            currency: CurrencyConfig::default(),
            max_segments_per_request: 64,
            max_buffered_bytes: 8 * 1024 * 1024,
        }
    }
}

/// Currency applied to volume-like fields (`tv`, ladder sizes) during
/// decode. Prices are always reported as given. Rate 1 disables conversion.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CurrencyConfig {
    pub code: String,
    pub rate: Decimal,
}

impl Default for CurrencyConfig {
    fn default() -> Self {
        Self {
            code: "GBP".into(),
            rate: Decimal::ONE,
        }
    }
}

/// Stream credentials obtained from the HTTP login collaborator.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub app_key: String,
    pub session_token: String,
}

impl Credentials {
    #[must_use]
    pub fn new(app_key: impl Into<String>, session_token: impl Into<String>) -> Self {
        Self {
            app_key: app_key.into(),
            session_token: session_token.into(),
        }
    }

    /// Read credentials from the environment.
    pub fn from_env() -> Result<Self> {
        let app_key = std::env::var(ENV_APP_KEY)
            .map_err(|_| Error::Config(format!("{ENV_APP_KEY} not set")))?;
        let session_token = std::env::var(ENV_SESSION_TOKEN)
            .map_err(|_| Error::Config(format!("{ENV_SESSION_TOKEN} not set")))?;
        Ok(Self {
            app_key,
            session_token,
        })
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl LoggingConfig {
    /// Initialize the tracing subscriber with this logging configuration.
    pub fn init(&self) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));

        match self.format.as_str() {
            "json" => {
                fmt().json().with_env_filter(filter).init();
            }
            _ => {
                fmt().with_env_filter(filter).init();
            }
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.stream.port, 443);
        assert_eq!(config.stream.heartbeat_ms, 5000);
        assert_eq!(config.stream.currency.rate, Decimal::ONE);
    }

    #[test]
    fn parses_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [stream]
            host = "stream-api-integration.betfair.com"
            conflate_ms = 120

            [stream.currency]
            code = "EUR"
            rate = 1.16
            "#,
        )
        .unwrap();
        assert_eq!(config.stream.host, "stream-api-integration.betfair.com");
        assert_eq!(config.stream.conflate_ms, 120);
        assert_eq!(config.stream.currency.rate, dec!(1.16));
        // untouched sections fall back to defaults
        assert_eq!(config.stream.port, 443);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn rejects_out_of_range_heartbeat() {
        let mut config = Config::default();
        config.stream.heartbeat_ms = 100;
        assert!(config.validate().is_err());
        config.stream.heartbeat_ms = 60_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_non_positive_rate() {
        let mut config = Config::default();
        config.stream.currency.rate = Decimal::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_empty_host() {
        let mut config = Config::default();
        config.stream.host.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn segment_limits_follow_config() {
        let mut config = Config::default();
        config.stream.max_segments_per_request = 8;
        config.stream.max_buffered_bytes = 1024;
        let limits = config.stream.segment_limits();
        assert_eq!(limits.max_segments_per_request, 8);
        assert_eq!(limits.max_buffered_bytes, 1024);
    }
}
