//! Transports and connection material shared by the service clients.

pub mod enclave_info;
#[cfg(feature = "http-client")]
pub mod http;
pub mod transport;

pub use enclave_info::{EnclaveInfo, EnclaveMeasurement};
#[cfg(feature = "http-client")]
pub use http::HttpTransport;
pub use transport::Transport;
