use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::workflows::tenancy::money::Currency;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

const DEFAULT_MAX_WRITE_ATTEMPTS: u8 = 3;
const MAX_WRITE_ATTEMPTS_CEILING: u8 = 10;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 3_600;
const ONE_DAY_SECS: u64 = 86_400;

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub lifecycle: LifecycleConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            lifecycle: LifecycleConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Knobs for the lifecycle engines and the sweep scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleConfig {
    /// Attempts per optimistic write before a concurrency conflict is surfaced.
    pub max_write_attempts: u8,
    /// Cadence of the expiry and overdue sweeps. Never longer than a day.
    pub sweep_interval: Duration,
    /// Stamped on new leases.
    pub currency: Currency,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            max_write_attempts: DEFAULT_MAX_WRITE_ATTEMPTS,
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            currency: Currency::default(),
        }
    }
}

impl LifecycleConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let max_write_attempts = match env::var("APP_MAX_WRITE_ATTEMPTS") {
            Ok(raw) => raw
                .trim()
                .parse::<u8>()
                .ok()
                .filter(|value| (1..=MAX_WRITE_ATTEMPTS_CEILING).contains(value))
                .ok_or(ConfigError::InvalidWriteAttempts)?,
            Err(_) => DEFAULT_MAX_WRITE_ATTEMPTS,
        };

        let sweep_secs = match env::var("APP_SWEEP_INTERVAL_SECS") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|value| (1..=ONE_DAY_SECS).contains(value))
                .ok_or(ConfigError::InvalidSweepInterval)?,
            Err(_) => DEFAULT_SWEEP_INTERVAL_SECS,
        };

        let currency = match env::var("APP_CURRENCY") {
            Ok(raw) => Currency::parse(&raw).map_err(|_| ConfigError::InvalidCurrency(raw))?,
            Err(_) => Currency::default(),
        };

        Ok(Self {
            max_write_attempts,
            sweep_interval: Duration::from_secs(sweep_secs),
            currency,
        })
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidWriteAttempts,
    InvalidSweepInterval,
    InvalidCurrency(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidWriteAttempts => write!(
                f,
                "APP_MAX_WRITE_ATTEMPTS must be between 1 and {MAX_WRITE_ATTEMPTS_CEILING}"
            ),
            ConfigError::InvalidSweepInterval => write!(
                f,
                "APP_SWEEP_INTERVAL_SECS must be between 1 and {ONE_DAY_SECS}"
            ),
            ConfigError::InvalidCurrency(value) => {
                write!(f, "APP_CURRENCY must be a three letter code, got '{value}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
