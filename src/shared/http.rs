//! HTTPS transport to a platform service.
//!
//! Requests are `POST {base}/v1/{request_kind}` with a JSON body; the
//! credential travels in the `x-teaclave-user-id` and `authorization`
//! headers. Reachability is probed with `GET {base}/health` while
//! connecting so that a dead endpoint fails at `connect`, not at the first
//! operation.

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde_json::{Map, Value};
use tracing::{debug, warn};
use url::Url;

use super::enclave_info::{EnclaveInfo, EnclaveMeasurement};
use super::transport::Transport;
use crate::config::ServiceEndpoint;
use crate::error::{Error, Result};
use crate::types::protocol::{Reply, Request, ServiceError, ServiceErrorKind};
use crate::types::Credential;

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-teaclave-user-id";

/// Transport over HTTPS, trusting only the configured root CA.
///
/// # Examples
///
/// ```rust,no_run
/// use teaclave_client::config::ClientConfig;
/// use teaclave_client::shared::HttpTransport;
///
/// # async fn example() -> teaclave_client::Result<()> {
/// let config = ClientConfig::from_env()?;
/// let transport = HttpTransport::connect(&config.frontend_endpoint()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
    service_name: String,
    measurement: EnclaveMeasurement,
    closed: bool,
}

impl HttpTransport {
    /// Opens a connection to the service described by `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the enclave info file has no valid
    /// entry for the service, the root CA certificate cannot be loaded, or
    /// the endpoint does not answer the health probe.
    pub async fn connect(endpoint: &ServiceEndpoint) -> Result<Self> {
        let mut base_url = endpoint.base_url()?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let enclave_info = EnclaveInfo::from_file(&endpoint.enclave_info_path)?;
        let measurement = *enclave_info.measurement(&endpoint.service_name)?;

        let mut builder = Client::builder()
            .timeout(endpoint.request_timeout)
            .connect_timeout(endpoint.connect_timeout);

        if base_url.scheme() == "https" {
            let pem = std::fs::read(&endpoint.root_ca_cert_path).map_err(|e| {
                Error::Connection(format!(
                    "cannot read root CA certificate {}: {}",
                    endpoint.root_ca_cert_path.display(),
                    e
                ))
            })?;
            let roots = reqwest::Certificate::from_pem_bundle(&pem)
                .map_err(|e| Error::Connection(format!("invalid root CA certificate: {}", e)))?;
            if roots.is_empty() {
                return Err(Error::Connection(format!(
                    "no certificate in root CA file {}",
                    endpoint.root_ca_cert_path.display()
                )));
            }
            builder = builder.tls_certs_only(roots);
        } else {
            warn!(
                service = %endpoint.service_name,
                address = %endpoint.address,
                "Connecting without TLS; use only for local development"
            );
        }

        let client = builder
            .build()
            .map_err(|e| Error::Connection(format!("failed to build HTTP client: {}", e)))?;

        let transport = Self {
            client,
            base_url,
            service_name: endpoint.service_name.clone(),
            measurement,
            closed: false,
        };
        transport.probe().await?;

        debug!(
            service = %transport.service_name,
            url = %transport.base_url,
            measurement = ?transport.measurement,
            "Connected"
        );
        Ok(transport)
    }

    /// Expected enclave measurement of the connected service.
    pub fn measurement(&self) -> &EnclaveMeasurement {
        &self.measurement
    }

    /// Base URL of the connected service.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn probe(&self) -> Result<()> {
        let url = self.join("health")?;
        let response = self.client.get(url).send().await.map_err(|e| {
            Error::Connection(format!("{} is unreachable: {}", self.service_name, e))
        })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Error::Connection(format!(
                "{} health probe answered {}",
                self.service_name,
                response.status()
            )))
        }
    }

    fn join(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::Config(format!("invalid request path {}: {}", path, e)))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&mut self, request: &Request, credential: Option<&Credential>) -> Result<Reply> {
        if self.closed {
            return Err(Error::Connection(format!(
                "connection to {} is closed",
                self.service_name
            )));
        }

        let url = self.join(&format!("v1/{}", request.kind()))?;
        let mut builder = self.client.post(url).json(request);
        if let Some(credential) = credential {
            builder = builder
                .header(USER_ID_HEADER, credential.user_id())
                .header(header::AUTHORIZATION, credential.to_header_value());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout(format!("{} request to {}", request.kind(), self.service_name))
            } else {
                Error::Connection(format!(
                    "{} request to {} failed: {}",
                    request.kind(),
                    self.service_name,
                    e
                ))
            }
        })?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| {
            Error::Connection(format!("failed to read {} response: {}", request.kind(), e))
        })?;

        if status.is_success() {
            if bytes.is_empty() {
                return Ok(Ok(Value::Object(Map::new())));
            }
            let body = serde_json::from_slice(&bytes).map_err(|e| {
                Error::Protocol(format!("{} response is not JSON: {}", request.kind(), e))
            })?;
            return Ok(Ok(body));
        }

        let service_error = serde_json::from_slice::<ServiceError>(&bytes).unwrap_or_else(|_| {
            ServiceError::new(
                kind_for_status(status),
                String::from_utf8_lossy(&bytes).into_owned(),
            )
        });
        Ok(Err(service_error))
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::Connection(format!(
                "connection to {} is already closed",
                self.service_name
            )));
        }
        self.closed = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.closed
    }

    fn transport_type(&self) -> &'static str {
        "https"
    }
}

/// Service error kind implied by an HTTP status without a JSON error body.
fn kind_for_status(status: StatusCode) -> ServiceErrorKind {
    match status {
        StatusCode::UNAUTHORIZED => ServiceErrorKind::Unauthenticated,
        StatusCode::FORBIDDEN => ServiceErrorKind::PermissionDenied,
        StatusCode::NOT_FOUND => ServiceErrorKind::NotFound,
        StatusCode::CONFLICT => ServiceErrorKind::AlreadyExists,
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            ServiceErrorKind::InvalidArgument
        },
        StatusCode::PRECONDITION_FAILED => ServiceErrorKind::FailedPrecondition,
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::TOO_MANY_REQUESTS => {
            ServiceErrorKind::Unavailable
        },
        _ => ServiceErrorKind::Internal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            kind_for_status(StatusCode::UNAUTHORIZED),
            ServiceErrorKind::Unauthenticated
        );
        assert_eq!(
            kind_for_status(StatusCode::CONFLICT),
            ServiceErrorKind::AlreadyExists
        );
        assert_eq!(
            kind_for_status(StatusCode::PRECONDITION_FAILED),
            ServiceErrorKind::FailedPrecondition
        );
        assert_eq!(
            kind_for_status(StatusCode::INTERNAL_SERVER_ERROR),
            ServiceErrorKind::Internal
        );
    }
}
