//! Authentication service client.
//!
//! Exchanges a user id and password for a session [`Credential`], and lets a
//! platform admin provision accounts. Every failure of this client,
//! including an unreachable service, is reported as [`Error::Auth`].

use tracing::{debug, info, warn};

use super::map_service_error;
use crate::error::{Error, Result};
use crate::shared::Transport;
use crate::types::protocol::{
    decode_body, Reply, Request, UserLoginRequest, UserLoginResponse, UserRegisterRequest,
};
use crate::types::{Credential, ServiceErrorKind, UserRegistration, UserRole};

/// Client of the authentication service.
///
/// # Example
///
/// ```rust,no_run
/// use teaclave_client::{AuthenticationClient, ClientConfig, UserRole};
///
/// # async fn example() -> teaclave_client::Result<()> {
/// let config = ClientConfig::from_env()?;
/// let mut auth = AuthenticationClient::connect(&config.authentication_endpoint()).await?;
///
/// let admin = auth.login("admin", "teaclave").await?;
/// auth.register_user(&admin, "test_id", "test_password", UserRole::FunctionOwner)
///     .await?;
/// let user = auth.login("test_id", "test_password").await?;
/// auth.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct AuthenticationClient {
    transport: Box<dyn Transport>,
}

impl AuthenticationClient {
    /// Connects to the authentication service over HTTPS.
    ///
    /// Unlike the other operations of this client, a failure here is an
    /// [`Error::Connection`].
    #[cfg(feature = "http-client")]
    pub async fn connect(endpoint: &crate::config::ServiceEndpoint) -> Result<Self> {
        let transport = crate::shared::HttpTransport::connect(endpoint).await?;
        Ok(Self::with_transport(transport))
    }

    /// Wraps an already connected transport.
    pub fn with_transport(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Box::new(transport),
        }
    }

    /// Logs in and returns the session credential.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] when the credentials are rejected, the
    /// service cannot be reached, or the returned token is empty, too long,
    /// or not header-safe.
    pub async fn login(&mut self, user_id: &str, password: &str) -> Result<Credential> {
        let request = Request::UserLogin(UserLoginRequest {
            id: user_id.to_string(),
            password: password.to_string(),
        });

        let body = self
            .exchange(&request, None)
            .await?
            .map_err(|e| map_service_error(e, Error::Auth))?;
        let response: UserLoginResponse =
            decode_body(request.kind(), body).map_err(|e| Error::Auth(e.to_string()))?;

        let credential = Credential::new(user_id, response.token)?;
        info!(user_id, "Logged in");
        Ok(credential)
    }

    /// Registers a new account on behalf of a platform admin.
    ///
    /// An account that already exists is reported as
    /// [`UserRegistration::AlreadyExists`] so that provisioning can be
    /// repeated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] when `admin` is not privileged, its token is
    /// rejected, or the service cannot be reached.
    pub async fn register_user(
        &mut self,
        admin: &Credential,
        new_user_id: &str,
        new_password: &str,
        role: UserRole,
    ) -> Result<UserRegistration> {
        self.register_user_with_attribute(admin, new_user_id, new_password, role, "")
            .await
    }

    /// Like [`register_user`](Self::register_user), attaching an opaque
    /// attribute string to the account (for example an organization).
    pub async fn register_user_with_attribute(
        &mut self,
        admin: &Credential,
        new_user_id: &str,
        new_password: &str,
        role: UserRole,
        attribute: &str,
    ) -> Result<UserRegistration> {
        let request = Request::UserRegister(UserRegisterRequest {
            id: new_user_id.to_string(),
            password: new_password.to_string(),
            role,
            attribute: attribute.to_string(),
        });

        match self.exchange(&request, Some(admin)).await? {
            Ok(_) => {
                info!(admin = admin.user_id(), new_user_id, %role, "Registered user");
                Ok(UserRegistration::Created)
            },
            Err(e) if e.kind == ServiceErrorKind::AlreadyExists => {
                debug!(new_user_id, "User already registered");
                Ok(UserRegistration::AlreadyExists)
            },
            Err(e) => Err(map_service_error(e, Error::Auth)),
        }
    }

    /// Releases the connection.
    pub async fn close(&mut self) -> Result<()> {
        self.transport.close().await
    }

    async fn exchange(
        &mut self,
        request: &Request,
        credential: Option<&Credential>,
    ) -> Result<Reply> {
        self.transport
            .send(request, credential)
            .await
            .map_err(|e| {
                warn!(request = request.kind(), error = %e, "Authentication service unreachable");
                Error::Auth(format!("authentication service unreachable: {}", e))
            })
    }
}
