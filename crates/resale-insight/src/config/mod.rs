use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::analytics::ScoreWeights;

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
    pub analytics: AnalyticsConfig,
    pub seed: SeedConfig,
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
            analytics: AnalyticsConfig::from_env()?,
            seed: SeedConfig {
                resale_csv: env::var_os("RESALE_CSV_PATH").map(PathBuf::from),
                reviews_csv: env::var_os("REVIEWS_CSV_PATH").map(PathBuf::from),
            },
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

/// Tuning for the hybrid queries.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsConfig {
    /// Upper bound for a single store read before it counts as unavailable.
    pub store_timeout: Duration,
    pub weights: ScoreWeights,
    /// Towns with fewer priced transactions in the window are left out of rankings.
    pub min_transactions: usize,
    pub profile_months: u32,
    pub recent_reviews: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_millis(2_000),
            weights: ScoreWeights::default(),
            min_transactions: 1,
            profile_months: 12,
            recent_reviews: 3,
        }
    }
}

impl AnalyticsConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let store_timeout = match env::var("ANALYTICS_STORE_TIMEOUT_MS") {
            Ok(raw) => Duration::from_millis(parse_var("ANALYTICS_STORE_TIMEOUT_MS", &raw)?),
            Err(_) => defaults.store_timeout,
        };
        let price = optional_var("ANALYTICS_PRICE_WEIGHT")?.unwrap_or(defaults.weights.price);
        let rating = optional_var("ANALYTICS_RATING_WEIGHT")?.unwrap_or(defaults.weights.rating);
        let weights =
            ScoreWeights::new(price, rating).map_err(|_| ConfigError::InvalidWeights)?;
        let profile_months = optional_var("ANALYTICS_PROFILE_MONTHS")?
            .unwrap_or(defaults.profile_months);
        if profile_months == 0 {
            return Err(ConfigError::ZeroProfileMonths);
        }

        Ok(Self {
            store_timeout,
            weights,
            min_transactions: optional_var("ANALYTICS_MIN_TRANSACTIONS")?
                .unwrap_or(defaults.min_transactions),
            profile_months,
            recent_reviews: optional_var("ANALYTICS_RECENT_REVIEWS")?
                .unwrap_or(defaults.recent_reviews),
        })
    }
}

/// Optional CSV files used to hydrate the in-memory stores at startup.
#[derive(Debug, Clone, Default)]
pub struct SeedConfig {
    pub resale_csv: Option<PathBuf>,
    pub reviews_csv: Option<PathBuf>,
}

fn optional_var<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(raw) => parse_var(name, &raw).map(Some),
        Err(_) => Ok(None),
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse::<T>().map_err(|_| ConfigError::InvalidNumber {
        name,
        value: raw.to_string(),
    })
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { name: &'static str, value: String },
    InvalidWeights,
    ZeroProfileMonths,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { name, value } => {
                write!(f, "{name} must be numeric, got '{value}'")
            }
            ConfigError::InvalidWeights => write!(
                f,
                "ANALYTICS_PRICE_WEIGHT and ANALYTICS_RATING_WEIGHT must be non-negative with a positive sum"
            ),
            ConfigError::ZeroProfileMonths => {
                write!(f, "ANALYTICS_PROFILE_MONTHS must be at least 1")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::InvalidWeights
            | ConfigError::ZeroProfileMonths => None,
        }
    }
}
