use quill_server::{LimitPolicy, LimiterConfig, ReplenishPolicy};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host (default: 0.0.0.0)
    pub host: String,
    /// Server port (default: 3040)
    pub port: u16,
    /// Ledger database file path (default: ./quill_ledger.db)
    pub database_path: PathBuf,
    /// Shared rate-limit store. Unset means counters live in this process only.
    pub redis_url: Option<String>,
    /// CORS allowed origins (comma-separated)
    pub cors_origins: Vec<String>,
    /// Bound on every ledger and rate-limit store call (default: 2000ms)
    pub store_timeout: Duration,
    /// Per-class rate-limit policies
    pub limits: LimiterConfig,
    /// Take the client identifier from X-Forwarded-For / X-Real-IP (default: false)
    pub trust_proxy_headers: bool,
    /// Credits granted when an account is first seen (default: 10)
    pub signup_credits: i64,
    /// Periodic top-up policy
    pub replenish: ReplenishPolicy,
    /// Seconds between in-process replenishment passes; 0 disables the loop (default: 3600)
    pub replenish_interval_secs: u64,
    /// Credits debited per content generation (default: 1)
    pub generation_cost: i64,
    /// Content generator endpoint
    pub generator: Option<GeneratorConfig>,
    /// Enables the `/api/admin` routes
    pub admin_secret: Option<String>,
}

/// External content generator endpoint.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub url: String,
    pub api_key: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3040".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let database_path = PathBuf::from(
            env::var("DATABASE_PATH").unwrap_or_else(|_| "./quill_ledger.db".to_string()),
        );

        let redis_url = non_empty_var("REDIS_URL");

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let store_timeout = Duration::from_millis(parse_or("STORE_TIMEOUT_MS", 2000));

        let defaults = LimiterConfig::default();
        let limits = LimiterConfig {
            general: limit_var("RATE_LIMIT_GENERAL", defaults.general)?,
            authentication: limit_var("RATE_LIMIT_AUTH", defaults.authentication)?,
            generation: limit_var("RATE_LIMIT_GENERATION", defaults.generation)?,
        };

        let trust_proxy_headers = env::var("TRUST_PROXY_HEADERS")
            .unwrap_or_else(|_| "false".to_string())
            .eq_ignore_ascii_case("true");

        let replenish = ReplenishPolicy {
            grant: at_least("REPLENISH_AMOUNT", parse_or("REPLENISH_AMOUNT", 10), 1)?,
            period: replenish_period(parse_or("REPLENISH_PERIOD_HOURS", 24))?,
            ..ReplenishPolicy::default()
        };

        let generator = non_empty_var("GENERATOR_URL").map(|url| GeneratorConfig {
            url,
            api_key: non_empty_var("GENERATOR_API_KEY"),
        });

        Ok(Config {
            host,
            port,
            database_path,
            redis_url,
            cors_origins,
            store_timeout,
            limits,
            trust_proxy_headers,
            signup_credits: at_least("SIGNUP_CREDITS", parse_or("SIGNUP_CREDITS", 10), 0)?,
            replenish,
            replenish_interval_secs: parse_or("REPLENISH_INTERVAL_SECS", 3600),
            generation_cost: at_least("GENERATION_COST", parse_or("GENERATION_COST", 1), 1)?,
            generator,
            admin_secret: non_empty_var("ADMIN_SECRET"),
        })
    }

    /// Get the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn limit_var(name: &'static str, default: LimitPolicy) -> Result<LimitPolicy, ConfigError> {
    match non_empty_var(name) {
        None => Ok(default),
        Some(spec) => LimitPolicy::parse(&spec).ok_or(ConfigError::InvalidRateLimit(name)),
    }
}

fn at_least(name: &'static str, value: i64, min: i64) -> Result<i64, ConfigError> {
    if value < min {
        return Err(ConfigError::OutOfRange { name, min });
    }
    Ok(value)
}

/// Whole hours, at least one. Values too large for a `chrono::Duration` are rejected.
fn replenish_period(hours: i64) -> Result<chrono::Duration, ConfigError> {
    chrono::Duration::try_hours(at_least("REPLENISH_PERIOD_HOURS", hours, 1)?).ok_or(
        ConfigError::OutOfRange {
            name: "REPLENISH_PERIOD_HOURS",
            min: 1,
        },
    )
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidRateLimit(&'static str),
    OutOfRange { name: &'static str, min: i64 },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "Invalid PORT environment variable"),
            ConfigError::InvalidRateLimit(name) => write!(
                f,
                "Invalid {} environment variable (expected max/window_secs, e.g. 60/60)",
                name
            ),
            ConfigError::OutOfRange { name, min } => write!(
                f,
                "Invalid {} environment variable (expected an integer >= {})",
                name, min
            ),
        }
    }
}

impl std::error::Error for ConfigError {}
