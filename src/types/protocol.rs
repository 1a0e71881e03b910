//! Request and response bodies exchanged with the platform services.
//!
//! Requests are JSON objects tagged by a `"request"` field naming the
//! operation. Successful responses carry the operation's body directly
//! (for example `{"function_id": "function-..."}`); failures carry a
//! [`ServiceError`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::credential::UserRole;
use super::function::{FunctionDescriptor, FunctionId};
use super::task::{TaskId, TaskRequest};
use crate::error::{Error, Result};

/// A request to the authentication or frontend service.
///
/// # Examples
///
/// ```
/// use teaclave_client::types::protocol::{Request, TaskIdRequest};
/// use teaclave_client::TaskId;
///
/// let request = Request::InvokeTask(TaskIdRequest::new(TaskId::generate()));
/// assert_eq!(request.kind(), "invoke_task");
///
/// let json = serde_json::to_value(&request).unwrap();
/// assert_eq!(json["request"], "invoke_task");
/// assert!(json["task_id"].as_str().unwrap().starts_with("task-"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum Request {
    /// Exchange a user id and password for a session token.
    UserLogin(UserLoginRequest),
    /// Create a user account (platform admins only).
    UserRegister(UserRegisterRequest),
    /// Register a function definition.
    RegisterFunction(FunctionDescriptor),
    /// Fetch a registered function.
    GetFunction(GetFunctionRequest),
    /// Create a task bound to a function.
    CreateTask(TaskRequest),
    /// Start a created task.
    InvokeTask(TaskIdRequest),
    /// Fetch task status and outcome.
    GetTask(TaskIdRequest),
    /// Cancel a task that has not finished.
    CancelTask(TaskIdRequest),
}

impl Request {
    /// Wire name of the operation.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UserLogin(_) => "user_login",
            Self::UserRegister(_) => "user_register",
            Self::RegisterFunction(_) => "register_function",
            Self::GetFunction(_) => "get_function",
            Self::CreateTask(_) => "create_task",
            Self::InvokeTask(_) => "invoke_task",
            Self::GetTask(_) => "get_task",
            Self::CancelTask(_) => "cancel_task",
        }
    }

    /// Whether the request must carry a credential.
    pub fn requires_credential(&self) -> bool {
        !matches!(self, Self::UserLogin(_))
    }
}

/// Body of `user_login`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserLoginRequest {
    /// Account to log in.
    pub id: String,
    /// Account password.
    pub password: String,
}

impl fmt::Debug for UserLoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserLoginRequest")
            .field("id", &self.id)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Body of `user_register`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRegisterRequest {
    /// Account to create.
    pub id: String,
    /// Initial password.
    pub password: String,
    /// Platform role of the new account.
    pub role: UserRole,
    /// Role attribute, such as the organization of a data owner.
    #[serde(default)]
    pub attribute: String,
}

impl fmt::Debug for UserRegisterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserRegisterRequest")
            .field("id", &self.id)
            .field("password", &"[REDACTED]")
            .field("role", &self.role)
            .field("attribute", &self.attribute)
            .finish()
    }
}

/// Body of `get_function`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetFunctionRequest {
    /// Function to fetch.
    pub function_id: FunctionId,
}

/// Body of the task operations addressed by id alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskIdRequest {
    /// Target task.
    pub task_id: TaskId,
}

impl TaskIdRequest {
    /// Wraps a task id.
    pub fn new(task_id: TaskId) -> Self {
        Self { task_id }
    }
}

/// Response to `user_login`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserLoginResponse {
    /// Session token.
    pub token: String,
}

impl fmt::Debug for UserLoginResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserLoginResponse")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Response to `register_function`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterFunctionResponse {
    /// Identifier of the new function.
    pub function_id: FunctionId,
}

/// Response to `create_task`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTaskResponse {
    /// Identifier of the new task.
    pub task_id: TaskId,
}

/// Category of a service-side failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceErrorKind {
    /// Missing, malformed, or expired credential.
    Unauthenticated,
    /// Authenticated caller lacks the privilege.
    PermissionDenied,
    /// Referenced function, task, or user does not exist for the caller.
    NotFound,
    /// Entity already exists.
    AlreadyExists,
    /// Request fields are invalid.
    InvalidArgument,
    /// Target is in the wrong state for the operation.
    FailedPrecondition,
    /// Service temporarily unavailable.
    Unavailable,
    /// Unexpected service failure.
    Internal,
}

impl fmt::Display for ServiceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unauthenticated => "unauthenticated",
            Self::PermissionDenied => "permission_denied",
            Self::NotFound => "not_found",
            Self::AlreadyExists => "already_exists",
            Self::InvalidArgument => "invalid_argument",
            Self::FailedPrecondition => "failed_precondition",
            Self::Unavailable => "unavailable",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// Failure reported by a platform service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceError {
    /// Failure category.
    pub kind: ServiceErrorKind,
    /// Human-readable detail.
    #[serde(default)]
    pub message: String,
}

impl ServiceError {
    /// Creates a service error.
    pub fn new(kind: ServiceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// What a service answered: the operation body or a service error.
pub type Reply = std::result::Result<Value, ServiceError>;

/// Decodes an operation body, naming the operation on failure.
///
/// Missing or malformed fields are reported as [`Error::Protocol`]; no
/// partial value is ever returned.
pub fn decode_body<T: DeserializeOwned>(operation: &str, body: Value) -> Result<T> {
    serde_json::from_value(body).map_err(|e| {
        Error::Protocol(format!("malformed {} response: {}", operation, e))
    })
}
