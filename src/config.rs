//! Configuration manager for user-service.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::FromRef;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::AppState;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const VERSION: &str = env!("CARGO_PKG_VERSION");

// Circuit breaker constraints.
pub const MIN_FAILURE_THRESHOLD: u32 = 1;
pub const MAX_FAILURE_THRESHOLD: u32 = 100;
pub const MIN_FAILURE_WINDOW_SECS: u64 = 1;
pub const MAX_FAILURE_WINDOW_SECS: u64 = 600;
pub const MIN_OPEN_DURATION_SECS: u64 = 1;
pub const MAX_OPEN_DURATION_SECS: u64 = 300;
// Identity authority constraints.
pub const MIN_TIMEOUT_MS: u64 = 1;
pub const MAX_TIMEOUT_MS: u64 = 60_000;

/// Errors raised while reading or validating the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must be {min}-{max}, got {value}")]
    OutOfRange {
        field: &'static str,
        min: u64,
        max: u64,
        value: u64,
    },
    #[error("URL is invalid: {0}")]
    Url(#[from] url::ParseError),
    #[error("failed to parse configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Instance name.
    pub name: String,
    /// Domain name of current instance.
    pub url: String,
    /// Port to listen on.
    pub port: u16,
    #[serde(skip_deserializing)]
    version: String,
    #[serde(skip)]
    path: PathBuf,
    /// Related to PostgreSQL configuration.
    #[serde(skip_serializing)]
    pub postgres: Option<Postgres>,
    /// Related to the remote identity authority.
    #[serde(skip_serializing)]
    pub identity: Identity,
    /// Circuit breaker guarding the identity authority.
    #[serde(skip_serializing)]
    pub circuit_breaker: CircuitBreaker,
    /// Read-through user cache.
    #[serde(skip_serializing)]
    pub cache: Cache,
    /// Related to Argon2 configuration.
    #[serde(skip_serializing)]
    pub argon2: Option<Argon2>,
    #[serde(skip_serializing)]
    pub telemetry: Telemetry,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_owned(),
            url: String::default(),
            port: 8080,
            version: VERSION.to_owned(),
            path: PathBuf::default(),
            postgres: None,
            identity: Identity::default(),
            circuit_breaker: CircuitBreaker::default(),
            cache: Cache::default(),
            argon2: None,
            telemetry: Telemetry::default(),
        }
    }
}

/// PostgreSQL configuration.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Postgres {
    /// Hostname:(?port) for PostgreSQL instance.
    pub address: String,
    /// Database name.
    pub database: Option<String>,
    /// Username credential to connect.
    pub username: Option<String>,
    /// Password credential to connect.
    pub password: Option<String>,
    /// Maximum pool connections.
    pub pool_size: Option<u32>,
}

/// Identity authority configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Identity {
    /// Base URL, e.g. `http://auth-service/auth-service`.
    pub address: String,
    /// Upper bound for one remote call.
    pub timeout_ms: u64,
}

impl Default for Identity {
    fn default() -> Self {
        Self {
            address: "http://auth-service/auth-service".to_owned(),
            timeout_ms: 3_000,
        }
    }
}

impl Identity {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Circuit breaker configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreaker {
    /// Failures inside the window before opening the circuit.
    pub failure_threshold: u32,
    /// Window in seconds for counting failures.
    pub failure_window_secs: u64,
    /// Seconds to keep circuit open before a probe.
    pub open_duration_secs: u64,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window_secs: 60,
            open_duration_secs: 30,
        }
    }
}

/// Cache configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Cache {
    pub ttl_secs: u64,
    pub max_capacity: u64,
}

impl Default for Cache {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            max_capacity: 10_000,
        }
    }
}

/// Argon2 configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Argon2 {
    /// Memory used while hashing.
    pub memory_cost: u32,
    /// Iterations of hash.
    pub iterations: u32,
    /// Parallelism degree.
    pub parallelism: u32,
    /// Output hash length.
    pub hash_length: usize,
}

impl Default for Argon2 {
    fn default() -> Self {
        Self {
            memory_cost: 1024 * 64, // 64 MiB.
            iterations: 4,
            parallelism: 2,
            hash_length: 32,
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Telemetry {
    /// OTLP gRPC endpoint for logs and traces.
    pub otlp_endpoint: Option<String>,
    /// Install the Prometheus recorder and expose `/metrics`.
    pub prometheus: bool,
}

impl FromRef<AppState> for Arc<Configuration> {
    fn from_ref(state: &AppState) -> Arc<Configuration> {
        Arc::clone(&state.config)
    }
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Normalizes a URL string by ensuring it starts with a valid scheme
    /// (`http` or `https`).
    fn normalize_url(
        &self,
        url: &str,
        default_scheme: &str,
    ) -> Result<String, url::ParseError> {
        let url_with_scheme =
            if url.starts_with("http://") || url.starts_with("https://") {
                url.to_string()
            } else {
                format!("{default_scheme}://{url}")
            };

        let parsed_url = Url::parse(&url_with_scheme)?;
        Ok(parsed_url.as_str().trim_end_matches('/').to_string())
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location.
    pub fn read(self) -> Result<Arc<Self>, ConfigError> {
        let file_path = if self.path.is_file() {
            &self.path
        } else {
            &Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        };

        match File::open(file_path) {
            Ok(file) => {
                let mut config: Configuration = serde_yaml::from_reader(file)
                    .inspect_err(|err| {
                        tracing::error!(
                            path = %file_path.display(),
                            %err,
                            "failed to parse configuration file"
                        )
                    })?;

                // set app version.
                config.version = VERSION.to_owned();

                // normalize URLs.
                if !config.url.is_empty() {
                    config.url = self.normalize_url(&config.url, "https")?;
                }
                config.identity.address =
                    self.normalize_url(&config.identity.address, "http")?;

                config.validate()?;

                Ok(Arc::new(config))
            },
            Err(err) => Ok(Arc::new(self.error(err))),
        }
    }

    /// Range-check tunables.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let cb = &self.circuit_breaker;

        check_range(
            "circuit_breaker.failure_threshold",
            cb.failure_threshold.into(),
            MIN_FAILURE_THRESHOLD.into(),
            MAX_FAILURE_THRESHOLD.into(),
        )?;
        check_range(
            "circuit_breaker.failure_window_secs",
            cb.failure_window_secs,
            MIN_FAILURE_WINDOW_SECS,
            MAX_FAILURE_WINDOW_SECS,
        )?;
        check_range(
            "circuit_breaker.open_duration_secs",
            cb.open_duration_secs,
            MIN_OPEN_DURATION_SECS,
            MAX_OPEN_DURATION_SECS,
        )?;
        check_range(
            "identity.timeout_ms",
            self.identity.timeout_ms,
            MIN_TIMEOUT_MS,
            MAX_TIMEOUT_MS,
        )?;
        check_range("cache.max_capacity", self.cache.max_capacity, 1, u64::MAX)?;

        Ok(())
    }

    /// Return a default configuration as fallback.
    fn error(&self, err: impl std::error::Error) -> Self {
        tracing::error!(error = %err, "`config.yaml` file not found");
        Self {
            version: VERSION.to_owned(),
            ..Default::default()
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

fn check_range(
    field: &'static str,
    value: u64,
    min: u64,
    max: u64,
) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            field,
            min,
            max,
            value,
        });
    }

    Ok(())
}
