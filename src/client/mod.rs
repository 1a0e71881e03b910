//! Clients of the platform services.
//!
//! - [`AuthenticationClient`] logs users in and provisions accounts.
//! - [`FrontendClient`] registers functions and drives tasks.
//!
//! Both own one transport. Operations take `&mut self`, so requests on one
//! client never overlap.

pub mod auth;
pub mod frontend;

pub use auth::AuthenticationClient;
pub use frontend::FrontendClient;

use crate::error::Error;
use crate::types::protocol::{ServiceError, ServiceErrorKind};

/// Maps a service-side failure onto the error of the calling operation.
///
/// A rejected credential is always [`Error::Auth`]; every other kind is
/// wrapped by `wrap`, keeping the kind in the message.
pub(crate) fn map_service_error(err: ServiceError, wrap: fn(String) -> Error) -> Error {
    match err.kind {
        ServiceErrorKind::Unauthenticated => Error::Auth(err.message),
        _ => wrap(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthenticated_is_always_auth() {
        let err = ServiceError::new(ServiceErrorKind::Unauthenticated, "token expired");
        assert!(matches!(
            map_service_error(err, Error::Invocation),
            Error::Auth(msg) if msg == "token expired"
        ));
    }

    #[test]
    fn other_kinds_use_operation_error() {
        let err = ServiceError::new(ServiceErrorKind::NotFound, "no such task");
        match map_service_error(err, Error::Invocation) {
            Error::Invocation(msg) => assert_eq!(msg, "not_found: no such task"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
