//! User credentials and account types.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Largest session token accepted from the authentication service.
///
/// Longer tokens are rejected rather than truncated.
pub const MAX_TOKEN_LEN: usize = 4096;

/// Session-scoped proof of an authenticated identity.
///
/// Produced by [`AuthenticationClient::login`](crate::AuthenticationClient::login)
/// and immutable afterwards. The token is redacted from `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    user_id: String,
    token: String,
}

impl Credential {
    /// Creates a credential, checking the token bounds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] if the user id or token is empty or contains
    /// characters that cannot travel in a request header, or if the token
    /// exceeds [`MAX_TOKEN_LEN`].
    ///
    /// # Examples
    ///
    /// ```
    /// use teaclave_client::Credential;
    ///
    /// let credential = Credential::new("test_id", "secret-token").unwrap();
    /// assert_eq!(credential.user_id(), "test_id");
    /// assert!(!format!("{credential:?}").contains("secret-token"));
    ///
    /// assert!(Credential::new("test_id", "").is_err());
    /// ```
    pub fn new(user_id: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let user_id = user_id.into();
        let token = token.into();

        if user_id.is_empty() {
            return Err(Error::Auth("user id is empty".to_string()));
        }
        if !user_id.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(Error::Auth(format!(
                "user id {:?} contains whitespace or non-printable characters",
                user_id
            )));
        }
        if token.is_empty() {
            return Err(Error::Auth(format!("empty token for user {}", user_id)));
        }
        if token.len() > MAX_TOKEN_LEN {
            return Err(Error::Auth(format!(
                "token for user {} is {} bytes, limit is {}",
                user_id,
                token.len(),
                MAX_TOKEN_LEN
            )));
        }
        if !token.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(Error::Auth(format!(
                "token for user {} contains non-printable characters",
                user_id
            )));
        }

        Ok(Self { user_id, token })
    }

    /// The authenticated user.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The session token.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Value for the `Authorization` header.
    pub fn to_header_value(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("user_id", &self.user_id)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Platform role of a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// May register users and manage the platform.
    PlatformAdmin,
    /// May register functions and run tasks.
    FunctionOwner,
    /// May own task inputs and outputs.
    DataOwner,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlatformAdmin => write!(f, "platform_admin"),
            Self::FunctionOwner => write!(f, "function_owner"),
            Self::DataOwner => write!(f, "data_owner"),
        }
    }
}

/// Outcome of a user registration that did not fail.
///
/// An account that already exists is a normal outcome so that
/// provisioning can be repeated safely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserRegistration {
    /// A new account was created.
    Created,
    /// The account existed before this call.
    AlreadyExists,
}
