//! SDK configuration using Figment
//!
//! Configuration is loaded from:
//! 1. a TOML file (base configuration)
//! 2. environment variables prefixed with `DRIVER_SDK_`, nested keys split on `__`
//!
//! ```toml
//! [platform]
//! endpoint = "http://platform.local:9090"
//! request_timeout = "10s"
//!
//! [identity]
//! project_id = "plant-7"
//! driver_id = "modbus"
//! driver_name = "Modbus TCP"
//! service_id = "edge-01"
//!
//! [session]
//! retry_interval = "5s"
//! keepalive_interval = "10s"
//! ```
//!
//! `DRIVER_SDK_SESSION__RETRY_INTERVAL=2s` overrides `session.retry_interval`.
//!
//! # Example
//! ```no_run
//! use driver_sdk::config::SdkConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SdkConfig::load_from("config/driver.toml")?;
//! config.validate()?;
//! println!("Platform: {}", config.platform.endpoint);
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{SdkError, SdkResult};
use crate::session::Identity;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/driver.toml";
/// Environment variable prefix.
pub const ENV_PREFIX: &str = "DRIVER_SDK_";

/// Top-level SDK configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SdkConfig {
    /// Platform endpoint and channel tuning
    #[serde(default)]
    pub platform: PlatformConfig,
    /// Identity headers attached to every call
    pub identity: IdentityConfig,
    /// Session manager timing
    #[serde(default)]
    pub session: SessionSettings,
    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// gRPC channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Platform URI, e.g. `http://127.0.0.1:9090`
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// How long to wait for the TCP/HTTP2 connection
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Timeout of unary calls
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
    /// HTTP/2 keepalive ping interval
    #[serde(default = "default_http2_keepalive", with = "humantime_serde")]
    pub keepalive_interval: Duration,
    /// How long to wait for a keepalive ping response
    #[serde(default = "default_http2_keepalive_timeout", with = "humantime_serde")]
    pub keepalive_timeout: Duration,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            connect_timeout: default_connect_timeout(),
            request_timeout: default_request_timeout(),
            keepalive_interval: default_http2_keepalive(),
            keepalive_timeout: default_http2_keepalive_timeout(),
        }
    }
}

/// Identity of this driver process
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub project_id: String,
    pub driver_id: String,
    pub driver_name: String,
    /// Instance id, unique per running process
    pub service_id: String,
}

impl From<&IdentityConfig> for Identity {
    fn from(config: &IdentityConfig) -> Self {
        Identity {
            project_id: config.project_id.clone(),
            driver_id: config.driver_id.clone(),
            driver_name: config.driver_name.clone(),
            service_id: config.service_id.clone(),
        }
    }
}

/// Session manager timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Pause between failed attempts to open the command streams
    #[serde(default = "default_retry_interval", with = "humantime_serde")]
    pub retry_interval: Duration,
    /// Interval between health checks while running
    #[serde(default = "default_keepalive_interval", with = "humantime_serde")]
    pub keepalive_interval: Duration,
    /// Deadline of one health check
    #[serde(default = "default_health_timeout", with = "humantime_serde")]
    pub health_timeout: Duration,
    /// Buffered responses per command stream
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            retry_interval: default_retry_interval(),
            keepalive_interval: default_keepalive_interval(),
            health_timeout: default_health_timeout(),
            stream_buffer: default_stream_buffer(),
        }
    }
}

/// Log output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Log line format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, colored (development)
    #[default]
    Pretty,
    /// Single line, no colors
    Compact,
    /// One JSON object per line (log aggregation)
    Json,
}

// Default value functions
fn default_endpoint() -> String {
    "http://127.0.0.1:9090".to_string()
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_http2_keepalive() -> Duration {
    Duration::from_secs(10)
}

fn default_http2_keepalive_timeout() -> Duration {
    Duration::from_secs(20)
}

fn default_retry_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_keepalive_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_health_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_stream_buffer() -> usize {
    64
}

fn default_log_level() -> String {
    "info".to_string()
}

impl SdkConfig {
    /// Load configuration from the default path and the environment.
    pub fn load() -> SdkResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path, with environment overrides.
    pub fn load_from<P: AsRef<Path>>(path: P) -> SdkResult<Self> {
        Self::figment(path).extract().map_err(SdkError::from)
    }

    /// The provider stack, exposed so embedders can merge their own sources.
    pub fn figment<P: AsRef<Path>>(path: P) -> Figment {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> SdkResult<()> {
        if self.platform.endpoint.trim().is_empty() {
            return Err(SdkError::Configuration("platform.endpoint must not be empty".into()));
        }

        let identity = [
            ("project_id", &self.identity.project_id),
            ("driver_id", &self.identity.driver_id),
            ("driver_name", &self.identity.driver_name),
            ("service_id", &self.identity.service_id),
        ];
        for (name, value) in identity {
            if value.trim().is_empty() {
                return Err(SdkError::Configuration(format!("identity.{} must not be empty", name)));
            }
        }

        let intervals = [
            ("session.retry_interval", self.session.retry_interval),
            ("session.keepalive_interval", self.session.keepalive_interval),
            ("session.health_timeout", self.session.health_timeout),
        ];
        for (name, value) in intervals {
            if value.is_zero() {
                return Err(SdkError::Configuration(format!("{} must be greater than zero", name)));
            }
        }

        if self.session.stream_buffer == 0 {
            return Err(SdkError::Configuration(
                "session.stream_buffer must be greater than zero".into(),
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(SdkError::Configuration(format!(
                "Invalid logging.level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            )));
        }

        Ok(())
    }

    /// Identity headers for the transport.
    #[must_use]
    pub fn identity(&self) -> Identity {
        Identity::from(&self.identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CONFIG: &str = r#"
        [platform]
        endpoint = "http://platform.test:7000"
        request_timeout = "2s"

        [identity]
        project_id = "plant-7"
        driver_id = "modbus"
        driver_name = "Modbus TCP"
        service_id = "edge-01"

        [session]
        retry_interval = "250ms"

        [logging]
        level = "debug"
        format = "json"
    "#;

    fn valid() -> SdkConfig {
        SdkConfig {
            identity: IdentityConfig {
                project_id: "p".into(),
                driver_id: "d".into(),
                driver_name: "n".into(),
                service_id: "s".into(),
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();

        let config = SdkConfig::load_from(file.path()).unwrap();
        assert_eq!(config.platform.endpoint, "http://platform.test:7000");
        assert_eq!(config.platform.request_timeout, Duration::from_secs(2));
        assert_eq!(config.platform.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.session.retry_interval, Duration::from_millis(250));
        assert_eq!(config.session.keepalive_interval, Duration::from_secs(10));
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.identity().driver_name, "Modbus TCP");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_identity_fails_to_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[platform]\nendpoint = \"http://x:1\"\n").unwrap();
        assert!(matches!(
            SdkConfig::load_from(file.path()),
            Err(SdkError::Config(_))
        ));
    }

    #[test]
    fn test_validation() {
        assert!(valid().validate().is_ok());

        let mut blank = valid();
        blank.identity.service_id = " ".into();
        assert!(blank.validate().is_err());

        let mut zero = valid();
        zero.session.retry_interval = Duration::ZERO;
        assert!(zero.validate().is_err());

        let mut level = valid();
        level.logging.level = "verbose".into();
        assert!(level.validate().is_err());
    }
}
