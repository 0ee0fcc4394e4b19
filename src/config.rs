//! Runtime configuration, resolved from the environment variables recognized
//! at startup (§6). Mirrors the builder style of `ConnectionConfig`
//! (construct with defaults, override field by field, `validate()` before
//! use).

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Stdio,
    Sse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportSelector {
    Stdio,
    Sse,
    Auto,
}

impl TransportSelector {
    fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "stdio" => Some(Self::Stdio),
            "sse" => Some(Self::Sse),
            "auto" => Some(Self::Auto),
            _ => None,
        }
    }

    /// Resolve `auto` using the same rule as spec §6: stdio when stdin is a
    /// non-interactive pipe, else sse.
    pub fn resolve(self) -> Transport {
        match self {
            TransportSelector::Stdio => Transport::Stdio,
            TransportSelector::Sse => Transport::Sse,
            TransportSelector::Auto => {
                use std::io::IsTerminal;
                if std::io::stdin().is_terminal() {
                    Transport::Sse
                } else {
                    Transport::Stdio
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "DEBUG" => Some(Self::Debug),
            "INFO" => Some(Self::Info),
            "WARN" => Some(Self::Warn),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn as_filter_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
    #[error("{0}")]
    Inconsistent(String),
}

/// Resolved runtime configuration. Construct with [`Config::from_env`],
/// then call [`Config::validate`] before wiring up the composition root.
#[derive(Debug, Clone)]
pub struct Config {
    pub memory_path: PathBuf,
    pub config_path: Option<PathBuf>,
    pub log_level: LogLevel,
    pub transport: TransportSelector,
    pub sse_port: u16,
    pub metrics_port: u16,
    pub redis_url: Option<String>,
    pub phi_alpha: f64,
    pub principal_threshold: f64,
    pub llm_timeout: std::time::Duration,
}

impl Config {
    pub fn new() -> Self {
        Self {
            memory_path: PathBuf::from("./mnemos-data"),
            config_path: None,
            log_level: LogLevel::Info,
            transport: TransportSelector::Auto,
            sse_port: 3000,
            metrics_port: 9100,
            redis_url: None,
            phi_alpha: 0.05,
            principal_threshold: 0.7,
            llm_timeout: std::time::Duration::from_secs(30),
        }
    }

    /// Build a [`Config`] from the process environment, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::new();

        if let Ok(v) = std::env::var("MEMORY_PATH") {
            config.memory_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("CONFIG_PATH") {
            config.config_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            config.log_level = LogLevel::parse(&v).ok_or(ConfigError::InvalidValue {
                name: "LOG_LEVEL",
                value: v,
            })?;
        }
        if let Ok(v) = std::env::var("TRANSPORT") {
            config.transport = TransportSelector::parse(&v).ok_or(ConfigError::InvalidValue {
                name: "TRANSPORT",
                value: v,
            })?;
        }
        if let Ok(v) = std::env::var("SSE_PORT") {
            config.sse_port = v.parse().map_err(|_| ConfigError::InvalidValue {
                name: "SSE_PORT",
                value: v,
            })?;
        }
        if let Ok(v) = std::env::var("METRICS_PORT") {
            config.metrics_port = v.parse().map_err(|_| ConfigError::InvalidValue {
                name: "METRICS_PORT",
                value: v,
            })?;
        }
        if let Ok(v) = std::env::var("REDIS_URL") {
            config.redis_url = Some(v);
        }
        if let Ok(v) = std::env::var("PHI_ALPHA") {
            config.phi_alpha = v.parse().map_err(|_| ConfigError::InvalidValue {
                name: "PHI_ALPHA",
                value: v,
            })?;
        }
        if let Ok(v) = std::env::var("PRINCIPAL_THRESHOLD") {
            config.principal_threshold = v.parse().map_err(|_| ConfigError::InvalidValue {
                name: "PRINCIPAL_THRESHOLD",
                value: v,
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.phi_alpha) || self.phi_alpha == 0.0 {
            return Err(ConfigError::InvalidValue {
                name: "PHI_ALPHA",
                value: self.phi_alpha.to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.principal_threshold) {
            return Err(ConfigError::InvalidValue {
                name: "PRINCIPAL_THRESHOLD",
                value: self.principal_threshold.to_string(),
            });
        }
        if self.metrics_port != 0 && self.metrics_port == self.sse_port {
            return Err(ConfigError::Inconsistent(
                "SSE_PORT and METRICS_PORT must not collide".into(),
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
