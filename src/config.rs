//! Centralized configuration for the credential authority.
//!
//! All configuration is loaded from environment variables (optionally seeded
//! from a `.env` file) and validated at startup. Values are immutable for the
//! process lifetime.

use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Environment variable parse error
    #[error("Failed to parse environment variable {name}: {reason}")]
    ParseError {
        /// Variable name
        name: String,
        /// Parser message
        reason: String,
    },

    /// Invalid port number
    #[error("Invalid port: must be between 1 and 65535")]
    InvalidPort,

    /// Invalid TTL value
    #[error("Invalid TTL: must be greater than 0")]
    InvalidTtl,

    /// Invalid hashing parameters
    #[error("Invalid password hashing parameters: {0}")]
    InvalidHashCost(String),

    /// Missing required field
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Automated test runs; enables the destructive flush operation
    Test,
    /// Local development
    Development,
    /// Production
    Production,
}

impl Environment {
    /// Parse environment from string. Unknown values fall back to development.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "test" => Self::Test,
            "prod" | "production" => Self::Production,
            _ => Self::Development,
        }
    }

    /// Whether this is the test environment.
    #[must_use]
    pub const fn is_test(&self) -> bool {
        matches!(self, Self::Test)
    }
}

/// Credential persistence backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// PostgreSQL via a connection pool
    Postgres,
    /// Process-local map, for development and tests
    Memory,
}

impl StoreBackend {
    /// Parse backend from string.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown backends.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(ConfigError::ParseError {
                name: "STORE_BACKEND".to_string(),
                reason: format!("unknown backend {other}"),
            }),
        }
    }
}

/// PostgreSQL connection parameters.
#[derive(Clone)]
pub struct DatabaseConfig {
    /// Database host
    pub host: String,
    /// Database port
    pub port: u16,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Database name
    pub dbname: String,
    /// libpq-style SSL mode (disable, prefer, require, ...)
    pub sslmode: String,
    /// Maximum pooled connections
    pub max_connections: u32,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("dbname", &self.dbname)
            .field("sslmode", &self.sslmode)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Argon2id work factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashCost {
    /// Iterations
    pub time_cost: u32,
    /// Memory in KiB
    pub memory_kib: u32,
    /// Lanes
    pub parallelism: u32,
}

impl Default for HashCost {
    fn default() -> Self {
        Self {
            time_cost: 2,
            memory_kib: 19_456,
            parallelism: 1,
        }
    }
}

/// Credential authority configuration.
#[derive(Debug, Clone)]
pub struct Config {
    // Server settings
    /// Deployment environment
    pub environment: Environment,
    /// Running inside a container
    pub dockerized: bool,
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,

    // Storage settings
    /// Credential backend
    pub store_backend: StoreBackend,
    /// PostgreSQL parameters
    pub database: DatabaseConfig,

    // Token settings
    /// `iss` claim of issued tokens
    pub token_issuer: String,
    /// Default token TTL
    pub token_ttl: Duration,

    // Credential settings
    /// Password hashing cost
    pub hash_cost: HashCost,

    // Key material settings
    /// Root directory for key artifacts
    pub key_dir: PathBuf,
    /// Namespace of the signing keypair
    pub key_namespace: String,

    // Logging
    /// Default log filter
    pub log_level: String,
    /// Emit JSON logs
    pub log_json: bool,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if variables are invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = Environment::parse(&env::var("APP_ENV").unwrap_or_default());
        let dockerized = parse_env("DOCKERIZED", false)?;
        let host = env::var("HOST").unwrap_or_else(|_| default_host(dockerized).to_string());
        let port = parse_env("PORT", 50051)?;
        let shutdown_timeout = Duration::from_secs(parse_env("SHUTDOWN_TIMEOUT", 30)?);

        let store_backend =
            StoreBackend::parse(&env::var("STORE_BACKEND").unwrap_or_else(|_| "postgres".to_string()))?;

        let db = DbEnv { environment };
        let database = DatabaseConfig {
            host: db.var("DATABASE_HOST").unwrap_or_else(|| "localhost".to_string()),
            port: db.parse("DATABASE_PORT", 5432)?,
            user: db.var("DATABASE_USER").unwrap_or_else(|| "postgres".to_string()),
            password: db.var("DATABASE_PASSWORD").unwrap_or_default(),
            dbname: db.var("DATABASE_DBNAME").unwrap_or_else(|| "auth".to_string()),
            sslmode: db.var("DATABASE_SSLMODE").unwrap_or_else(|| "prefer".to_string()),
            max_connections: db.parse("DATABASE_MAX_CONNECTIONS", 10)?,
        };

        let token_issuer =
            env::var("TOKEN_ISSUER").unwrap_or_else(|_| "credential-authority".to_string());
        let token_ttl = Duration::from_secs(parse_env("TOKEN_TTL", 86_400)?);

        let defaults = HashCost::default();
        let hash_cost = HashCost {
            time_cost: parse_env("HASH_TIME_COST", defaults.time_cost)?,
            memory_kib: parse_env("HASH_MEMORY_KIB", defaults.memory_kib)?,
            parallelism: parse_env("HASH_PARALLELISM", defaults.parallelism)?,
        };

        let key_dir = PathBuf::from(env::var("KEY_DIR").unwrap_or_else(|_| "cert".to_string()));
        let key_namespace = env::var("KEY_NAMESPACE").unwrap_or_else(|_| "token".to_string());

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_json = parse_env("LOG_JSON", false)?;

        let config = Self {
            environment,
            dockerized,
            host,
            port,
            shutdown_timeout,
            store_backend,
            database,
            token_issuer,
            token_ttl,
            hash_cost,
            key_dir,
            key_namespace,
            log_level,
            log_json,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if self.token_ttl.is_zero() {
            return Err(ConfigError::InvalidTtl);
        }
        if self.hash_cost.time_cost == 0 || self.hash_cost.parallelism == 0 {
            return Err(ConfigError::InvalidHashCost(
                "time cost and parallelism must be greater than 0".to_string(),
            ));
        }
        if self.hash_cost.memory_kib < 8 * self.hash_cost.parallelism {
            return Err(ConfigError::InvalidHashCost(
                "memory must be at least 8 KiB per lane".to_string(),
            ));
        }
        if self.token_issuer.is_empty() {
            return Err(ConfigError::MissingRequired("token_issuer".to_string()));
        }
        if self.key_namespace.is_empty() {
            return Err(ConfigError::MissingRequired("key_namespace".to_string()));
        }
        if self.store_backend == StoreBackend::Postgres && self.database.max_connections == 0 {
            return Err(ConfigError::ParseError {
                name: "DATABASE_MAX_CONNECTIONS".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    /// Socket address string to bind the gRPC server to.
    #[must_use]
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Bind host when `HOST` is not set.
fn default_host(dockerized: bool) -> &'static str {
    if dockerized {
        "0.0.0.0"
    } else {
        "127.0.0.1"
    }
}

/// Database variable lookup; the test environment prefers `TEST_`-prefixed names.
struct DbEnv {
    environment: Environment,
}

impl DbEnv {
    fn var(&self, name: &str) -> Option<String> {
        if self.environment.is_test() {
            if let Ok(val) = env::var(format!("TEST_{name}")) {
                return Some(val);
            }
        }
        env::var(name).ok()
    }

    fn parse<T: std::str::FromStr>(&self, name: &str, default: T) -> Result<T, ConfigError>
    where
        T::Err: std::fmt::Display,
    {
        match self.var(name) {
            Some(val) => parse_value(name, &val),
            None => Ok(default),
        }
    }
}

/// Parse environment variable with default value.
fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(val) => parse_value(name, &val),
        Err(_) => Ok(default),
    }
}

fn parse_value<T: std::str::FromStr>(name: &str, val: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    val.trim().parse().map_err(|e: T::Err| ConfigError::ParseError {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config_base() -> Config {
        Config {
            environment: Environment::Development,
            dockerized: false,
            host: "127.0.0.1".to_string(),
            port: 50051,
            shutdown_timeout: Duration::from_secs(30),
            store_backend: StoreBackend::Memory,
            database: DatabaseConfig {
                host: "localhost".to_string(),
                port: 5432,
                user: "postgres".to_string(),
                password: "secret".to_string(),
                dbname: "auth".to_string(),
                sslmode: "disable".to_string(),
                max_connections: 10,
            },
            token_issuer: "credential-authority".to_string(),
            token_ttl: Duration::from_secs(3600),
            hash_cost: HashCost::default(),
            key_dir: PathBuf::from("cert"),
            key_namespace: "token".to_string(),
            log_level: "info".to_string(),
            log_json: false,
        }
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!(Environment::parse("test"), Environment::Test);
        assert_eq!(Environment::parse("TEST"), Environment::Test);
        assert_eq!(Environment::parse("production"), Environment::Production);
        assert_eq!(Environment::parse(""), Environment::Development);
        assert!(Environment::Test.is_test());
        assert!(!Environment::Production.is_test());
    }

    #[test]
    fn test_store_backend_parsing() {
        assert_eq!(StoreBackend::parse("postgres").unwrap(), StoreBackend::Postgres);
        assert_eq!(StoreBackend::parse("Memory").unwrap(), StoreBackend::Memory);
        assert!(StoreBackend::parse("mysql").is_err());
    }

    #[test]
    fn test_default_host_follows_dockerized() {
        assert_eq!(default_host(true), "0.0.0.0");
        assert_eq!(default_host(false), "127.0.0.1");
    }

    #[test]
    fn test_config_validation_ok() {
        assert!(test_config_base().validate().is_ok());
    }

    #[test]
    fn test_config_validation_invalid_port() {
        let mut config = test_config_base();
        config.port = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidPort)));
    }

    #[test]
    fn test_config_validation_zero_ttl() {
        let mut config = test_config_base();
        config.token_ttl = Duration::ZERO;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTtl)));
    }

    #[test]
    fn test_config_validation_hash_memory_too_small() {
        let mut config = test_config_base();
        config.hash_cost.memory_kib = 4;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidHashCost(_))));
    }

    #[test]
    fn test_config_validation_empty_namespace() {
        let mut config = test_config_base();
        config.key_namespace = String::new();
        assert!(matches!(config.validate(), Err(ConfigError::MissingRequired(_))));
    }

    #[test]
    fn test_database_password_redacted() {
        let config = test_config_base();
        let rendered = format!("{:?}", config.database);
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn test_parse_value_error_names_variable() {
        let err = parse_value::<u16>("PORT", "not-a-port").unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn test_listen_addr() {
        assert_eq!(test_config_base().listen_addr(), "127.0.0.1:50051");
    }
}
