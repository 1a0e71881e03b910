//! Transport abstraction for talking to a platform service.
//!
//! A transport carries one request/response exchange at a time. Methods take
//! `&mut self`, so a single connection can never have two requests in
//! flight; concurrent tasks need separate connections or external locking.

use async_trait::async_trait;
use std::fmt;

use crate::error::Result;
use crate::types::protocol::{Reply, Request};
use crate::types::Credential;

/// Connection to one platform service.
///
/// `send` returns `Ok(Reply)` whenever the service answered, even if the
/// answer is a [`ServiceError`](crate::types::ServiceError). The outer
/// `Err` is reserved for failures of the channel itself (unreachable peer,
/// timeout, closed connection, undecodable bytes).
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Sends a request and waits for the service's reply.
    ///
    /// `credential` is attached to the request when present.
    async fn send(&mut self, request: &Request, credential: Option<&Credential>) -> Result<Reply>;

    /// Releases the underlying channel.
    ///
    /// Closing an already closed transport fails with
    /// [`Error::Connection`](crate::Error::Connection) and has no other
    /// effect.
    async fn close(&mut self) -> Result<()>;

    /// Returns `true` until the transport is closed.
    fn is_connected(&self) -> bool;

    /// Short name of the transport, for diagnostics.
    fn transport_type(&self) -> &'static str;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn send(&mut self, request: &Request, credential: Option<&Credential>) -> Result<Reply> {
        (**self).send(request, credential).await
    }

    async fn close(&mut self) -> Result<()> {
        (**self).close().await
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn transport_type(&self) -> &'static str {
        (**self).transport_type()
    }
}
