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
    pub pipeline: PipelineConfig,
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
            pipeline: PipelineConfig::from_env()?,
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

/// Everything tunable about the exposure processing pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub circuit_breaker: CircuitBreakerConfig,
    pub isolation: IsolationConfig,
    pub payment: PaymentPolicy,
    pub failed_token_policy: FailedTokenPolicy,
    /// Directory for durable snapshots. `None` keeps all state in memory.
    pub data_dir: Option<PathBuf>,
    pub risk_service_url: String,
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let failed_token_policy = match env::var("APP_FAILED_TOKEN_POLICY") {
            Ok(raw) => FailedTokenPolicy::from_str(&raw)?,
            Err(_) => FailedTokenPolicy::ReingestOnSignal,
        };

        Ok(Self {
            circuit_breaker: CircuitBreakerConfig {
                max_attempts: parse_env_u32("APP_CB_MAX_ATTEMPTS", 8)?,
                base_delay: Duration::from_millis(parse_env_u64("APP_CB_BASE_DELAY_MS", 1_000)?),
                max_delay: Duration::from_millis(parse_env_u64("APP_CB_MAX_DELAY_MS", 60_000)?),
                request_timeout: Duration::from_millis(parse_env_u64(
                    "APP_CB_REQUEST_TIMEOUT_MS",
                    10_000,
                )?),
                worker_count: parse_env_u32("APP_CB_WORKERS", 4)? as usize,
            },
            isolation: IsolationConfig {
                isolation_period_days: parse_env_u32("APP_ISOLATION_PERIOD_DAYS", 11)? as i64,
            },
            payment: PaymentPolicy {
                contact_qualifies: parse_env_bool("APP_PAYMENT_CONTACT_QUALIFIES", true)?,
                index_case_qualifies: parse_env_bool("APP_PAYMENT_INDEX_QUALIFIES", true)?,
                minimum_remaining_hours: parse_env_u32("APP_PAYMENT_MIN_REMAINING_HOURS", 24)?
                    as i64,
            },
            failed_token_policy,
            data_dir: env::var("APP_DATA_DIR").ok().map(PathBuf::from),
            risk_service_url: env::var("APP_RISK_SERVICE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8081".to_string()),
        })
    }
}

/// Retry and polling knobs for the remote risk-evaluation protocol.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Evaluation attempts before a token is marked failed.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub request_timeout: Duration,
    /// Concurrent token evaluations.
    pub worker_count: usize,
}

#[derive(Debug, Clone)]
pub struct IsolationConfig {
    pub isolation_period_days: i64,
}

impl IsolationConfig {
    pub fn isolation_period(&self) -> chrono::Duration {
        chrono::Duration::days(self.isolation_period_days)
    }
}

/// Which isolation reasons qualify for financial support, and for how long a
/// window must still run. Jurisdictional policy, not hard-coded logic.
#[derive(Debug, Clone)]
pub struct PaymentPolicy {
    pub contact_qualifies: bool,
    pub index_case_qualifies: bool,
    pub minimum_remaining_hours: i64,
}

impl PaymentPolicy {
    pub fn minimum_remaining(&self) -> chrono::Duration {
        chrono::Duration::hours(self.minimum_remaining_hours)
    }
}

/// What happens when a signal arrives for a token that previously failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailedTokenPolicy {
    /// A matching signal returns the token to the pending queue.
    ReingestOnSignal,
    /// Failed tokens stay failed until an operator requeues them.
    ManualRequeue,
}

impl FailedTokenPolicy {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "reingest-on-signal" | "reingest" => Ok(Self::ReingestOnSignal),
            "manual-requeue" | "manual" => Ok(Self::ManualRequeue),
            other => Err(ConfigError::InvalidFailedTokenPolicy {
                value: other.to_string(),
            }),
        }
    }

    pub fn reingests_on_signal(self) -> bool {
        matches!(self, Self::ReingestOnSignal)
    }
}

fn parse_env_u32(key: &str, default: u32) -> Result<u32, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse::<u32>().map_err(|_| ConfigError::InvalidNumber {
            key: key.to_string(),
            value: raw,
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u64(key: &str, default: u64) -> Result<u64, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse::<u64>().map_err(|_| ConfigError::InvalidNumber {
            key: key.to_string(),
            value: raw,
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_bool(key: &str, default: bool) -> Result<bool, ConfigError> {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigError::InvalidNumber {
                key: key.to_string(),
                value: raw,
            }),
        },
        Err(_) => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: String, value: String },
    InvalidFailedTokenPolicy { value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { key, value } => {
                write!(f, "{key} has unusable value '{value}'")
            }
            ConfigError::InvalidFailedTokenPolicy { value } => {
                write!(
                    f,
                    "APP_FAILED_TOKEN_POLICY must be 'reingest-on-signal' or 'manual-requeue', got '{value}'"
                )
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "APP_CB_MAX_ATTEMPTS",
            "APP_CB_BASE_DELAY_MS",
            "APP_CB_MAX_DELAY_MS",
            "APP_CB_REQUEST_TIMEOUT_MS",
            "APP_CB_WORKERS",
            "APP_ISOLATION_PERIOD_DAYS",
            "APP_PAYMENT_CONTACT_QUALIFIES",
            "APP_PAYMENT_INDEX_QUALIFIES",
            "APP_PAYMENT_MIN_REMAINING_HOURS",
            "APP_FAILED_TOKEN_POLICY",
            "APP_DATA_DIR",
            "APP_RISK_SERVICE_URL",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.pipeline.circuit_breaker.max_attempts, 8);
        assert_eq!(config.pipeline.circuit_breaker.worker_count, 4);
        assert_eq!(config.pipeline.isolation.isolation_period_days, 11);
        assert_eq!(
            config.pipeline.failed_token_policy,
            FailedTokenPolicy::ReingestOnSignal
        );
        assert!(config.pipeline.data_dir.is_none());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
    }

    #[test]
    fn rejects_unknown_failed_token_policy() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_FAILED_TOKEN_POLICY", "sometimes");
        let result = AppConfig::load();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidFailedTokenPolicy { .. })
        ));
        env::remove_var("APP_FAILED_TOKEN_POLICY");
    }

    #[test]
    fn parses_manual_requeue_policy() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_FAILED_TOKEN_POLICY", "manual-requeue");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(
            config.pipeline.failed_token_policy,
            FailedTokenPolicy::ManualRequeue
        );
        assert!(!config.pipeline.failed_token_policy.reingests_on_signal());
        env::remove_var("APP_FAILED_TOKEN_POLICY");
    }
}
