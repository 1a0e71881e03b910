//! Client configuration.
//!
//! Connection parameters are external to the protocol: the caller supplies
//! the service addresses, the enclave info file describing the expected
//! service enclaves, and the root CA certificate of the attestation service.
//! They can be loaded from a TOML file or from `TEACLAVE_*` environment
//! variables.
//!
//! # Example Configuration File
//!
//! ```toml
//! authentication_service_address = "localhost:7776"
//! frontend_service_address = "localhost:7777"
//! enclave_info_path = "release/services/enclave_info.toml"
//! as_root_ca_cert_path = "keys/dcap_root_ca_cert.pem"
//! request_timeout_ms = 30000
//!
//! [poll]
//! initial_interval_ms = 100
//! max_interval_ms = 2000
//! backoff_factor = 2.0
//! timeout_ms = 60000
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::{Error, Result};

/// Enclave info entry name of the authentication service.
pub const AUTHENTICATION_SERVICE_NAME: &str = "teaclave_authentication_service";

/// Enclave info entry name of the frontend service.
pub const FRONTEND_SERVICE_NAME: &str = "teaclave_frontend_service";

/// Client configuration for both platform services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Address of the authentication service (`host:port` or URL).
    #[serde(default = "default_authentication_address")]
    pub authentication_service_address: String,

    /// Address of the frontend service (`host:port` or URL).
    #[serde(default = "default_frontend_address")]
    pub frontend_service_address: String,

    /// Path of the enclave info file.
    #[serde(default = "default_enclave_info_path")]
    pub enclave_info_path: PathBuf,

    /// Path of the attestation service root CA certificate (PEM).
    #[serde(default = "default_root_ca_path")]
    pub as_root_ca_cert_path: PathBuf,

    /// Timeout for a single request/response exchange, in milliseconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Timeout for establishing a connection, in milliseconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Policy for waiting on task results.
    #[serde(default)]
    pub poll: PollPolicy,
}

fn default_authentication_address() -> String {
    "localhost:7776".to_string()
}

fn default_frontend_address() -> String {
    "localhost:7777".to_string()
}

fn default_enclave_info_path() -> PathBuf {
    PathBuf::from("release/services/enclave_info.toml")
}

fn default_root_ca_path() -> PathBuf {
    PathBuf::from("keys/dcap_root_ca_cert.pem")
}

fn default_request_timeout() -> u64 {
    30_000 // 30 seconds
}

fn default_connect_timeout() -> u64 {
    5_000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            authentication_service_address: default_authentication_address(),
            frontend_service_address: default_frontend_address(),
            enclave_info_path: default_enclave_info_path(),
            as_root_ca_cert_path: default_root_ca_path(),
            request_timeout_ms: default_request_timeout(),
            connect_timeout_ms: default_connect_timeout(),
            poll: PollPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load configuration from environment variables.
    ///
    /// Recognized variables, all optional:
    /// - `TEACLAVE_AUTHENTICATION_SERVICE_ADDRESS`
    /// - `TEACLAVE_FRONTEND_SERVICE_ADDRESS`
    /// - `TEACLAVE_ENCLAVE_INFO_PATH`
    /// - `TEACLAVE_AS_ROOT_CA_CERT_PATH`
    /// - `TEACLAVE_REQUEST_TIMEOUT_MS`
    /// - `TEACLAVE_POLL_TIMEOUT_MS`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(address) = lookup("TEACLAVE_AUTHENTICATION_SERVICE_ADDRESS") {
            config.authentication_service_address = address;
        }
        if let Some(address) = lookup("TEACLAVE_FRONTEND_SERVICE_ADDRESS") {
            config.frontend_service_address = address;
        }
        if let Some(path) = lookup("TEACLAVE_ENCLAVE_INFO_PATH") {
            config.enclave_info_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("TEACLAVE_AS_ROOT_CA_CERT_PATH") {
            config.as_root_ca_cert_path = PathBuf::from(path);
        }
        if let Some(ms) = lookup("TEACLAVE_REQUEST_TIMEOUT_MS") {
            config.request_timeout_ms = parse_millis("TEACLAVE_REQUEST_TIMEOUT_MS", &ms)?;
        }
        if let Some(ms) = lookup("TEACLAVE_POLL_TIMEOUT_MS") {
            config.poll.timeout_ms = parse_millis("TEACLAVE_POLL_TIMEOUT_MS", &ms)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks timeouts and the poll policy.
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_ms == 0 {
            return Err(Error::Config("request_timeout_ms must be positive".to_string()));
        }
        if self.connect_timeout_ms == 0 {
            return Err(Error::Config("connect_timeout_ms must be positive".to_string()));
        }
        self.poll.validate()
    }

    /// Endpoint of the authentication service.
    pub fn authentication_endpoint(&self) -> ServiceEndpoint {
        self.endpoint(
            AUTHENTICATION_SERVICE_NAME,
            &self.authentication_service_address,
        )
    }

    /// Endpoint of the frontend service.
    pub fn frontend_endpoint(&self) -> ServiceEndpoint {
        self.endpoint(FRONTEND_SERVICE_NAME, &self.frontend_service_address)
    }

    fn endpoint(&self, service_name: &str, address: &str) -> ServiceEndpoint {
        ServiceEndpoint {
            service_name: service_name.to_string(),
            address: address.to_string(),
            enclave_info_path: self.enclave_info_path.clone(),
            root_ca_cert_path: self.as_root_ca_cert_path.clone(),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
        }
    }
}

fn parse_millis(name: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|e| Error::Config(format!("{} must be milliseconds: {}", name, e)))
}

/// Everything needed to open a connection to one platform service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    /// Entry name of the service in the enclave info file.
    pub service_name: String,
    /// `host:port` (HTTPS implied) or a full `http(s)://` URL.
    pub address: String,
    /// Path of the enclave info file.
    pub enclave_info_path: PathBuf,
    /// Path of the attestation root CA certificate.
    pub root_ca_cert_path: PathBuf,
    /// Timeout for one request/response exchange.
    pub request_timeout: Duration,
    /// Timeout for establishing the connection.
    pub connect_timeout: Duration,
}

impl ServiceEndpoint {
    /// Creates an endpoint with default timeouts.
    pub fn new(
        service_name: impl Into<String>,
        address: impl Into<String>,
        enclave_info_path: impl Into<PathBuf>,
        root_ca_cert_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            address: address.into(),
            enclave_info_path: enclave_info_path.into(),
            root_ca_cert_path: root_ca_cert_path.into(),
            request_timeout: Duration::from_millis(default_request_timeout()),
            connect_timeout: Duration::from_millis(default_connect_timeout()),
        }
    }

    /// Set the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Base URL of the service.
    ///
    /// A bare `host:port` address means HTTPS.
    ///
    /// # Examples
    ///
    /// ```
    /// use teaclave_client::config::ServiceEndpoint;
    ///
    /// let endpoint = ServiceEndpoint::new("svc", "localhost:7777", "info.toml", "ca.pem");
    /// assert_eq!(endpoint.base_url().unwrap().as_str(), "https://localhost:7777/");
    /// ```
    pub fn base_url(&self) -> Result<Url> {
        let raw = if self.address.contains("://") {
            self.address.clone()
        } else {
            format!("https://{}", self.address)
        };

        let url = Url::parse(&raw)
            .map_err(|e| Error::Config(format!("invalid address {}: {}", self.address, e)))?;
        match url.scheme() {
            "https" | "http" => Ok(url),
            other => Err(Error::Config(format!(
                "unsupported scheme {} in address {}",
                other, self.address
            ))),
        }
    }
}

/// Caller-configurable policy for waiting on a task result.
///
/// The wait polls `get_task_result`, sleeping between attempts with
/// exponential backoff, until the result arrives, the task fails, the
/// deadline passes, or the caller cancels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollPolicy {
    /// Delay before the second poll, in milliseconds.
    #[serde(default = "default_initial_interval")]
    pub initial_interval_ms: u64,

    /// Upper bound on the delay between polls, in milliseconds.
    #[serde(default = "default_max_interval")]
    pub max_interval_ms: u64,

    /// Multiplier applied to the delay after each unsuccessful poll.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Overall deadline of the wait, in milliseconds.
    #[serde(default = "default_poll_timeout")]
    pub timeout_ms: u64,
}

fn default_initial_interval() -> u64 {
    100
}

fn default_max_interval() -> u64 {
    2_000
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_poll_timeout() -> u64 {
    60_000 // 1 minute
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_interval_ms: default_initial_interval(),
            max_interval_ms: default_max_interval(),
            backoff_factor: default_backoff_factor(),
            timeout_ms: default_poll_timeout(),
        }
    }
}

impl PollPolicy {
    /// Polls at a fixed interval until `timeout`.
    pub fn fixed(interval: Duration, timeout: Duration) -> Self {
        let interval_ms = interval.as_millis() as u64;
        Self {
            initial_interval_ms: interval_ms,
            max_interval_ms: interval_ms,
            backoff_factor: 1.0,
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    /// Set the overall deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Overall deadline.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Delay before the second poll.
    pub fn initial_interval(&self) -> Duration {
        Duration::from_millis(self.initial_interval_ms)
    }

    /// Delay that follows `current`, capped at the maximum interval.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use teaclave_client::PollPolicy;
    ///
    /// let policy = PollPolicy::default();
    /// assert_eq!(policy.next_interval(Duration::from_millis(100)), Duration::from_millis(200));
    /// assert_eq!(policy.next_interval(Duration::from_millis(1500)), Duration::from_millis(2000));
    /// ```
    pub fn next_interval(&self, current: Duration) -> Duration {
        let next_ms = (current.as_millis() as f64 * self.backoff_factor) as u64;
        Duration::from_millis(next_ms.min(self.max_interval_ms))
    }

    /// Checks that the policy can make progress.
    pub fn validate(&self) -> Result<()> {
        if self.initial_interval_ms == 0 {
            return Err(Error::Config("poll initial_interval_ms must be positive".to_string()));
        }
        if self.max_interval_ms < self.initial_interval_ms {
            return Err(Error::Config(
                "poll max_interval_ms must not be below initial_interval_ms".to_string(),
            ));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(Error::Config(format!(
                "poll backoff_factor must be at least 1.0, got {}",
                self.backoff_factor
            )));
        }
        if self.timeout_ms == 0 {
            return Err(Error::Config("poll timeout_ms must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.frontend_service_address, "localhost:7777");
        assert_eq!(config.authentication_service_address, "localhost:7776");
        assert_eq!(config.request_timeout_ms, 30_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            frontend_service_address = "teaclave.example:7777"
            enclave_info_path = "/etc/teaclave/enclave_info.toml"
            request_timeout_ms = 5000

            [poll]
            initial_interval_ms = 50
            timeout_ms = 1000
        "#;

        let config = ClientConfig::from_toml(toml).unwrap();
        assert_eq!(config.frontend_service_address, "teaclave.example:7777");
        assert_eq!(config.authentication_service_address, "localhost:7776");
        assert_eq!(
            config.enclave_info_path,
            PathBuf::from("/etc/teaclave/enclave_info.toml")
        );
        assert_eq!(config.poll.initial_interval_ms, 50);
        assert_eq!(config.poll.max_interval_ms, 2_000);
        assert_eq!(config.poll.timeout(), Duration::from_secs(1));

        let endpoint = config.frontend_endpoint();
        assert_eq!(endpoint.service_name, FRONTEND_SERVICE_NAME);
        assert_eq!(endpoint.request_timeout, Duration::from_millis(5000));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = ClientConfig::default();
        let back = ClientConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_invalid_poll_policy_rejected() {
        let toml = r#"
            [poll]
            initial_interval_ms = 500
            max_interval_ms = 100
        "#;
        assert!(matches!(
            ClientConfig::from_toml(toml),
            Err(Error::Config(_))
        ));

        let policy = PollPolicy {
            backoff_factor: 0.5,
            ..PollPolicy::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("TEACLAVE_FRONTEND_SERVICE_ADDRESS", "10.0.0.2:7777"),
            ("TEACLAVE_POLL_TIMEOUT_MS", "1500"),
        ]
        .into_iter()
        .collect();

        let config = ClientConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.frontend_service_address, "10.0.0.2:7777");
        assert_eq!(config.poll.timeout_ms, 1500);

        let err = ClientConfig::from_lookup(|k| {
            (k == "TEACLAVE_REQUEST_TIMEOUT_MS").then(|| "soon".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_base_url() {
        let endpoint = ServiceEndpoint::new("svc", "http://127.0.0.1:8080", "i", "c");
        assert_eq!(endpoint.base_url().unwrap().scheme(), "http");

        let endpoint = ServiceEndpoint::new("svc", "ftp://127.0.0.1", "i", "c");
        assert!(endpoint.base_url().is_err());
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = PollPolicy::default();
        let mut interval = policy.initial_interval();
        for _ in 0..10 {
            interval = policy.next_interval(interval);
        }
        assert_eq!(interval, Duration::from_millis(policy.max_interval_ms));

        let fixed = PollPolicy::fixed(Duration::from_millis(10), Duration::from_secs(1));
        assert_eq!(
            fixed.next_interval(fixed.initial_interval()),
            Duration::from_millis(10)
        );
    }
}
