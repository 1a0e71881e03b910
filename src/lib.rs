//! Client SDK for the Teaclave confidential-computing platform.
//!
//! Users authenticate against the authentication service, then talk to the
//! frontend service to register functions and run them as tasks inside
//! attested enclaves:
//!
//! ```text
//! login -> register_function -> create_task -> invoke_task -> get_task_result
//! ```
//!
//! # Module Organization
//!
//! - [`client`] - authentication and frontend clients
//! - [`config`] - endpoints, timeouts, and the result polling policy
//! - [`error`] - error taxonomy shared by every operation
//! - [`shared`] - transports and enclave attestation material
//! - [`types`] - wire types and the task state machine
//! - [`mock`] - in-memory platform for tests and local development
//!
//! # Example
//!
//! ```rust,no_run
//! use teaclave_client::{
//!     AuthenticationClient, ClientConfig, ExecutorType, FrontendClient, FunctionArgument,
//!     FunctionArguments, FunctionDescriptor, TaskRequest, UserRole,
//! };
//!
//! # async fn example() -> teaclave_client::Result<()> {
//! let config = ClientConfig::from_env()?;
//!
//! let mut auth = AuthenticationClient::connect(&config.authentication_endpoint()).await?;
//! let admin = auth.login("admin", "teaclave").await?;
//! auth.register_user(&admin, "test_id", "test_password", UserRole::FunctionOwner)
//!     .await?;
//! let credential = auth.login("test_id", "test_password").await?;
//! auth.close().await?;
//!
//! let mut client = FrontendClient::connect(&config.frontend_endpoint()).await?;
//! client.use_credential(credential);
//!
//! let echo = FunctionDescriptor::new("builtin-echo", ExecutorType::Builtin)
//!     .with_description("Native Echo Function")
//!     .with_argument(FunctionArgument::new("message", "", true));
//! let function_id = client.register_function(&echo).await?;
//!
//! let args = FunctionArguments::new().with("message", "Hello, Teaclave!");
//! let task_id = client.create_task(&TaskRequest::new(function_id, args)).await?;
//! client.invoke_task(&task_id).await?;
//!
//! let result = client
//!     .wait_for_task_result(&task_id, &config.poll, &Default::default())
//!     .await;
//! let result = client.finish(result).await?;
//! assert_eq!(result.as_str()?, "Hello, Teaclave!");
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod mock;
pub mod shared;
pub mod types;

pub use client::{AuthenticationClient, FrontendClient};
pub use config::{ClientConfig, PollPolicy, ServiceEndpoint};
pub use error::{Error, Result};
pub use types::{
    Credential, ExecutorType, FunctionArgument, FunctionArguments, FunctionDescriptor,
    FunctionId, FunctionInfo, FunctionInput, FunctionOutput, OwnerList, TaskId, TaskInfo,
    TaskRequest, TaskResult, TaskStatus, UserRegistration, UserRole,
};

/// Installs a `tracing` subscriber writing to stderr.
///
/// The filter comes from `RUST_LOG`, falling back to `default_filter`
/// (for example `"info"` or `"teaclave_client=debug"`). Calling it twice is
/// harmless; the second call has no effect.
#[cfg(feature = "logging")]
pub fn init_logging(default_filter: &str) {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
