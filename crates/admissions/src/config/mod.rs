use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use chrono_tz::Tz;

use crate::workflows::startups::ActivityWindows;

const DEFAULT_TIME_ZONE: &str = "Asia/Calcutta";
const DEFAULT_WEEK_CUTOFF_HOURS: u32 = 18;
const DEFAULT_ENDANGERED_WEEKS: u32 = 3;
const MAX_ENDANGERED_WEEKS: u32 = 520;

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

/// Top-level configuration for the admissions service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub admissions: AdmissionsConfig,
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
            admissions: AdmissionsConfig::from_env()?,
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

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Batch configuration and the reporting windows used by startup activity queries.
#[derive(Debug, Clone)]
pub struct AdmissionsConfig {
    /// JSON file holding the stage definitions; the built-in batch is used when unset.
    pub stages_path: Option<PathBuf>,
    pub time_zone: Tz,
    pub week_cutoff_hours: u32,
    pub endangered_weeks: u32,
}

impl AdmissionsConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let stages_path = env::var("ADMISSIONS_STAGES_PATH")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        let zone = env::var("ADMISSIONS_TIME_ZONE").unwrap_or_else(|_| DEFAULT_TIME_ZONE.to_string());
        let time_zone = zone
            .trim()
            .parse::<Tz>()
            .map_err(|_| ConfigError::InvalidTimeZone(zone.clone()))?;

        let week_cutoff_hours =
            parse_u32("ADMISSIONS_WEEK_CUTOFF_HOURS", DEFAULT_WEEK_CUTOFF_HOURS)?;
        if week_cutoff_hours >= 24 {
            return Err(ConfigError::InvalidNumber {
                key: "ADMISSIONS_WEEK_CUTOFF_HOURS",
                value: week_cutoff_hours.to_string(),
            });
        }
        let endangered_weeks = parse_u32("ADMISSIONS_ENDANGERED_WEEKS", DEFAULT_ENDANGERED_WEEKS)?;
        if endangered_weeks == 0 || endangered_weeks > MAX_ENDANGERED_WEEKS {
            return Err(ConfigError::InvalidNumber {
                key: "ADMISSIONS_ENDANGERED_WEEKS",
                value: endangered_weeks.to_string(),
            });
        }

        Ok(Self {
            stages_path,
            time_zone,
            week_cutoff_hours,
            endangered_weeks,
        })
    }

    pub fn activity_windows(&self) -> ActivityWindows {
        ActivityWindows {
            time_zone: self.time_zone,
            week_cutoff_hours: self.week_cutoff_hours,
            endangered_weeks: self.endangered_weeks,
        }
    }
}

fn parse_u32(key: &'static str, default: u32) -> Result<u32, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<u32>()
            .map_err(|_| ConfigError::InvalidNumber { key, value }),
        Err(_) => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidTimeZone(String),
    InvalidNumber { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidTimeZone(zone) => {
                write!(f, "ADMISSIONS_TIME_ZONE '{zone}' is not a known IANA zone")
            }
            ConfigError::InvalidNumber { key, value } => {
                write!(f, "{key} has invalid value '{value}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidTimeZone(_)
            | ConfigError::InvalidNumber { .. } => None,
        }
    }
}
