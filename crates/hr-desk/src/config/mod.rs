use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

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
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub session: SessionConfig,
    pub access_policy_path: PathBuf,
    pub catalog_path: PathBuf,
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

        let database = DatabaseConfig {
            path: env_path("APP_DATABASE_PATH", "data/hr-desk.sqlite3"),
            scripts_dir: env_path("APP_SQL_DIR", "sql"),
            debug: env_flag("APP_DEBUG", false)?,
        };

        let cache = CacheConfig {
            enabled: env_flag("APP_CACHE_ENABLED", true)?,
            ttl: env_minutes("APP_CACHE_TTL_MINUTES", DEFAULT_CACHE_TTL_MINUTES)
                .ok_or(ConfigError::InvalidCacheTtl)?,
        };
        let session = SessionConfig {
            idle_timeout: env_minutes("APP_SESSION_IDLE_MINUTES", DEFAULT_SESSION_IDLE_MINUTES)
                .ok_or(ConfigError::InvalidSessionIdle)?,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            database,
            cache,
            session,
            access_policy_path: env_path("APP_ACCESS_POLICY", "config/access.json"),
            catalog_path: env_path("APP_CATALOG", "config/catalog.json"),
        })
    }
}

const DEFAULT_CACHE_TTL_MINUTES: u64 = 15;
const DEFAULT_SESSION_IDLE_MINUTES: u64 = 8 * 60;

/// Whole minutes from the environment; `None` when malformed or too large to
/// express in seconds.
fn env_minutes(name: &str, default: u64) -> Option<Duration> {
    let minutes = match env::var(name) {
        Err(_) => default,
        Ok(raw) => raw.trim().parse::<u64>().ok()?,
    };
    minutes.checked_mul(60).map(Duration::from_secs)
}

fn env_path(name: &str, default: &str) -> PathBuf {
    PathBuf::from(env::var(name).unwrap_or_else(|_| default.to_string()))
}

fn env_flag(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidFlag { name }),
        },
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

/// Relational store location and the script tree executed against it.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub scripts_dir: PathBuf,
    /// Attach diagnostic detail to unexpected (non-database) failures.
    pub debug: bool,
}

/// Read-through cache settings for candidate lookups.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl: Duration,
}

/// Server-side login sessions.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Sessions untouched for this long are dropped.
    pub idle_timeout: Duration,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidCacheTtl,
    InvalidSessionIdle,
    InvalidFlag { name: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidCacheTtl => {
                write!(f, "APP_CACHE_TTL_MINUTES must be a whole number of minutes")
            }
            ConfigError::InvalidSessionIdle => {
                write!(f, "APP_SESSION_IDLE_MINUTES must be a whole number of minutes")
            }
            ConfigError::InvalidFlag { name } => {
                write!(f, "{name} must be one of true/false/1/0/yes/no/on/off")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidCacheTtl
            | ConfigError::InvalidSessionIdle
            | ConfigError::InvalidFlag { .. } => None,
        }
    }
}
