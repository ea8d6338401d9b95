use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use crate::workflows::caisse::policy::CaissePolicy;

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

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub caisse: CaisseConfig,
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
            caisse: CaisseConfig::from_env()?,
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

/// Association policy values plus an optional catalog override.
#[derive(Debug, Clone, Default)]
pub struct CaisseConfig {
    pub policy: CaissePolicy,
    pub catalog_csv: Option<PathBuf>,
}

impl CaisseConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = CaissePolicy::default();
        let mut policy = defaults.clone();

        policy.grace.grace_days = env_number("CAISSE_GRACE_DAYS", defaults.grace.grace_days)?;
        policy.grace.penalty_days =
            env_number("CAISSE_PENALTY_DAYS", defaults.grace.penalty_days)?;
        policy.support.waiting_periods = env_number(
            "CAISSE_SUPPORT_WAITING_PERIODS",
            defaults.support.waiting_periods,
        )?;
        policy.support.annual_limit =
            env_number("CAISSE_SUPPORT_ANNUAL_LIMIT", defaults.support.annual_limit)?;
        policy.min_reason_length =
            env_number("CAISSE_MIN_REASON_LENGTH", defaults.min_reason_length)?;
        policy.max_write_attempts =
            env_number("CAISSE_MAX_WRITE_ATTEMPTS", defaults.max_write_attempts)?;

        if policy.grace.penalty_days < policy.grace.grace_days {
            return Err(ConfigError::InconsistentGraceWindow {
                grace_days: policy.grace.grace_days,
                penalty_days: policy.grace.penalty_days,
            });
        }
        if policy.max_write_attempts == 0 {
            return Err(ConfigError::InvalidNumber {
                key: "CAISSE_MAX_WRITE_ATTEMPTS",
                value: "0".to_string(),
            });
        }

        let catalog_csv = env::var("CAISSE_CATALOG_CSV")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            policy,
            catalog_csv,
        })
    }
}

fn env_number<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { key, value: raw }),
        Err(_) => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: &'static str, value: String },
    InconsistentGraceWindow { grace_days: i64, penalty_days: i64 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { key, value } => {
                write!(f, "{key} must be a positive number (found '{value}')")
            }
            ConfigError::InconsistentGraceWindow {
                grace_days,
                penalty_days,
            } => write!(
                f,
                "CAISSE_PENALTY_DAYS ({penalty_days}) must not be shorter than CAISSE_GRACE_DAYS ({grace_days})"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::InconsistentGraceWindow { .. } => None,
        }
    }
}
