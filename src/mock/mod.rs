//! In-memory platform for tests and local development.
//!
//! [`MockPlatform`] answers the same requests as the authentication and
//! frontend services, applying the platform's rules: only platform admins
//! register users, private functions are usable by their owner and
//! allowlist, each created task consumes one unit of quota, and tasks are
//! visible to their creator only (anyone else gets `not_found`, never a hint
//! that the task exists).
//!
//! Invoked tasks run lazily: the first `get_task` after the configured
//! number of [pending polls](MockPlatform::with_pending_polls) executes the
//! function's builtin and records the outcome.
//!
//! # Examples
//!
//! ```
//! use teaclave_client::mock::MockPlatform;
//! use teaclave_client::{AuthenticationClient, FrontendClient};
//!
//! # async fn example() -> teaclave_client::Result<()> {
//! let platform = MockPlatform::new();
//! let mut auth = AuthenticationClient::with_transport(platform.transport());
//! let admin = auth.login("admin", "teaclave").await?;
//!
//! let mut frontend = FrontendClient::with_transport(platform.transport());
//! frontend.use_credential(admin);
//! # auth.close().await?;
//! # frontend.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod builtin;

pub use builtin::{BuiltinFn, BuiltinRegistry};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::mapref::one::RefMut;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::error::{Error, Result};
use crate::shared::Transport;
use crate::types::protocol::{
    CreateTaskResponse, GetFunctionRequest, RegisterFunctionResponse, Reply, Request,
    ServiceError, ServiceErrorKind, TaskIdRequest, UserLoginRequest, UserLoginResponse,
    UserRegisterRequest,
};
use crate::types::{
    Credential, ExecutorType, FunctionDescriptor, FunctionId, FunctionInfo, TaskFailure, TaskId,
    TaskInfo, TaskOutcome, TaskOutputs, TaskRequest, TaskStatus, UserRole,
};

/// Account seeded as platform admin.
pub const ADMIN_USER_ID: &str = "admin";

/// Password of [`ADMIN_USER_ID`].
pub const ADMIN_PASSWORD: &str = "teaclave";

type ServiceResult<T> = std::result::Result<T, ServiceError>;

#[derive(Debug, Clone)]
struct UserRecord {
    password: String,
    role: UserRole,
}

#[derive(Debug)]
struct TaskRecord {
    info: TaskInfo,
    function_name: String,
    pending_polls: u32,
}

#[derive(Debug)]
struct PlatformState {
    users: DashMap<String, UserRecord>,
    // token -> user id
    sessions: DashMap<String, String>,
    functions: DashMap<FunctionId, FunctionInfo>,
    tasks: DashMap<TaskId, TaskRecord>,
    builtins: BuiltinRegistry,
    pending_polls: AtomicU32,
    open_connections: AtomicUsize,
}

/// Shared in-memory platform. Clones share state.
#[derive(Debug, Clone)]
pub struct MockPlatform {
    state: Arc<PlatformState>,
}

impl MockPlatform {
    /// Platform with the seeded admin account and the echo builtin.
    pub fn new() -> Self {
        let state = PlatformState {
            users: DashMap::new(),
            sessions: DashMap::new(),
            functions: DashMap::new(),
            tasks: DashMap::new(),
            builtins: BuiltinRegistry::new(),
            pending_polls: AtomicU32::new(0),
            open_connections: AtomicUsize::new(0),
        };
        state.users.insert(
            ADMIN_USER_ID.to_string(),
            UserRecord {
                password: ADMIN_PASSWORD.to_string(),
                role: UserRole::PlatformAdmin,
            },
        );
        Self {
            state: Arc::new(state),
        }
    }

    /// Adds an account.
    pub fn with_user(self, user_id: &str, password: &str, role: UserRole) -> Self {
        self.state.users.insert(
            user_id.to_string(),
            UserRecord {
                password: password.to_string(),
                role,
            },
        );
        self
    }

    /// Adds a builtin, selected by function name.
    pub fn with_builtin<F>(self, name: &str, function: F) -> Self
    where
        F: Fn(&crate::types::FunctionArguments) -> std::result::Result<Vec<u8>, String>
            + Send
            + Sync
            + 'static,
    {
        self.state.builtins.register(name, function);
        self
    }

    /// Number of `get_task` calls that report `Running` before an invoked
    /// task executes.
    pub fn with_pending_polls(self, polls: u32) -> Self {
        self.state.pending_polls.store(polls, Ordering::Relaxed);
        self
    }

    /// Opens a connection to the platform.
    pub fn transport(&self) -> MockTransport {
        self.state.open_connections.fetch_add(1, Ordering::Relaxed);
        MockTransport {
            platform: self.clone(),
            closed: false,
        }
    }

    /// Logs in directly, bypassing any transport.
    pub fn login(&self, user_id: &str, password: &str) -> Result<Credential> {
        let response = self
            .user_login(UserLoginRequest {
                id: user_id.to_string(),
                password: password.to_string(),
            })
            .map_err(|e| Error::Auth(e.message))?;
        Credential::new(user_id, response.token)
    }

    /// Connections opened and not yet closed or dropped.
    pub fn open_connections(&self) -> usize {
        self.state.open_connections.load(Ordering::Relaxed)
    }

    /// Number of registered functions.
    pub fn function_count(&self) -> usize {
        self.state.functions.len()
    }

    /// Number of created tasks.
    pub fn task_count(&self) -> usize {
        self.state.tasks.len()
    }

    /// Current status of a task, regardless of who created it.
    pub fn task_status(&self, task_id: &TaskId) -> Option<TaskStatus> {
        self.state.tasks.get(task_id).map(|record| record.info.status)
    }

    /// Remaining quota of a function.
    pub fn usage_quota(&self, function_id: &FunctionId) -> Option<i32> {
        self.state
            .functions
            .get(function_id)
            .map(|info| info.descriptor.usage_quota)
    }

    /// Answers one request as the platform would.
    pub fn handle(&self, request: Request, credential: Option<&Credential>) -> Reply {
        let kind = request.kind();
        let reply = self.dispatch(request, credential);
        if let Err(e) = &reply {
            debug!(request = kind, error = %e, "Mock platform rejected request");
        }
        reply
    }

    fn dispatch(&self, request: Request, credential: Option<&Credential>) -> Reply {
        let caller = if request.requires_credential() {
            self.authenticate(credential)?
        } else {
            String::new()
        };

        match request {
            Request::UserLogin(req) => to_body(self.user_login(req)?),
            Request::UserRegister(req) => {
                self.user_register(&caller, req)?;
                Ok(Value::Object(Map::new()))
            },
            Request::RegisterFunction(descriptor) => {
                to_body(self.register_function(&caller, descriptor)?)
            },
            Request::GetFunction(req) => to_body(self.get_function(&caller, req)?),
            Request::CreateTask(req) => to_body(self.create_task(&caller, req)?),
            Request::InvokeTask(req) => {
                self.invoke_task(&caller, req)?;
                Ok(Value::Object(Map::new()))
            },
            Request::GetTask(req) => to_body(self.get_task(&caller, req)?),
            Request::CancelTask(req) => {
                self.cancel_task(&caller, req)?;
                Ok(Value::Object(Map::new()))
            },
        }
    }

    fn user_login(&self, req: UserLoginRequest) -> ServiceResult<UserLoginResponse> {
        let valid = self
            .state
            .users
            .get(&req.id)
            .is_some_and(|user| user.password == req.password);
        if !valid {
            return Err(ServiceError::new(
                ServiceErrorKind::Unauthenticated,
                "invalid user id or password",
            ));
        }

        let token = uuid::Uuid::new_v4().simple().to_string();
        self.state.sessions.insert(token.clone(), req.id);
        Ok(UserLoginResponse { token })
    }

    fn authenticate(&self, credential: Option<&Credential>) -> ServiceResult<String> {
        let credential = credential.ok_or_else(|| {
            ServiceError::new(ServiceErrorKind::Unauthenticated, "missing credential")
        })?;

        match self.state.sessions.get(credential.token()) {
            Some(user) if user.value() == credential.user_id() => Ok(user.value().clone()),
            _ => Err(ServiceError::new(
                ServiceErrorKind::Unauthenticated,
                format!("invalid token for user {}", credential.user_id()),
            )),
        }
    }

    fn user_register(&self, caller: &str, req: UserRegisterRequest) -> ServiceResult<()> {
        let is_admin = self
            .state
            .users
            .get(caller)
            .is_some_and(|user| user.role == UserRole::PlatformAdmin);
        if !is_admin {
            return Err(ServiceError::new(
                ServiceErrorKind::PermissionDenied,
                format!("{} may not register users", caller),
            ));
        }

        match self.state.users.entry(req.id) {
            Entry::Occupied(entry) => Err(ServiceError::new(
                ServiceErrorKind::AlreadyExists,
                format!("user {} already exists", entry.key()),
            )),
            Entry::Vacant(entry) => {
                entry.insert(UserRecord {
                    password: req.password,
                    role: req.role,
                });
                Ok(())
            },
        }
    }

    fn register_function(
        &self,
        caller: &str,
        descriptor: FunctionDescriptor,
    ) -> ServiceResult<RegisterFunctionResponse> {
        descriptor.validate().map_err(invalid_argument)?;
        if descriptor.executor_type == ExecutorType::Builtin
            && !self.state.builtins.contains(&descriptor.name)
        {
            return Err(ServiceError::new(
                ServiceErrorKind::InvalidArgument,
                format!("no builtin named {}", descriptor.name),
            ));
        }

        let function_id = FunctionId::generate();
        self.state.functions.insert(
            function_id.clone(),
            FunctionInfo {
                function_id: function_id.clone(),
                owner: caller.to_string(),
                descriptor,
            },
        );
        Ok(RegisterFunctionResponse { function_id })
    }

    fn get_function(&self, caller: &str, req: GetFunctionRequest) -> ServiceResult<FunctionInfo> {
        let info = self
            .state
            .functions
            .get(&req.function_id)
            .map(|info| info.value().clone())
            .ok_or_else(|| not_found("function", req.function_id.as_str()))?;
        check_usable(&info, caller)?;
        Ok(info)
    }

    fn create_task(&self, caller: &str, req: TaskRequest) -> ServiceResult<CreateTaskResponse> {
        let mut function = self
            .state
            .functions
            .get_mut(&req.function_id)
            .ok_or_else(|| not_found("function", req.function_id.as_str()))?;
        check_usable(&function, caller)?;

        if req.executor != function.descriptor.executor_type {
            return Err(ServiceError::new(
                ServiceErrorKind::InvalidArgument,
                format!(
                    "function {} runs on {}, not {}",
                    function.function_id, function.descriptor.executor_type, req.executor
                ),
            ));
        }
        let arguments = function
            .descriptor
            .resolve_arguments(&req.function_arguments)
            .map_err(invalid_argument)?;

        let quota = function.descriptor.usage_quota;
        match quota {
            0 => {
                return Err(ServiceError::new(
                    ServiceErrorKind::FailedPrecondition,
                    format!("usage quota of function {} is exhausted", function.function_id),
                ));
            },
            q if q > 0 => function.descriptor.usage_quota = q - 1,
            _ => {},
        }
        let function_name = function.descriptor.name.clone();
        drop(function);

        let task_id = TaskId::generate();
        self.state.tasks.insert(
            task_id.clone(),
            TaskRecord {
                info: TaskInfo {
                    task_id: task_id.clone(),
                    creator: caller.to_string(),
                    function_id: req.function_id,
                    function_arguments: arguments,
                    executor: req.executor,
                    status: TaskStatus::Created,
                    result: None,
                },
                function_name,
                pending_polls: 0,
            },
        );
        Ok(CreateTaskResponse { task_id })
    }

    fn invoke_task(&self, caller: &str, req: TaskIdRequest) -> ServiceResult<()> {
        let pending_polls = self.state.pending_polls.load(Ordering::Relaxed);
        let mut record = self.owned_task(caller, &req.task_id)?;
        transition(&mut record, TaskStatus::Running)?;
        record.pending_polls = pending_polls;
        Ok(())
    }

    fn get_task(&self, caller: &str, req: TaskIdRequest) -> ServiceResult<TaskInfo> {
        let mut record = self.owned_task(caller, &req.task_id)?;
        if record.info.status == TaskStatus::Running {
            if record.pending_polls > 0 {
                record.pending_polls -= 1;
            } else {
                self.execute(&mut record)?;
            }
        }
        Ok(record.info.clone())
    }

    fn cancel_task(&self, caller: &str, req: TaskIdRequest) -> ServiceResult<()> {
        let mut record = self.owned_task(caller, &req.task_id)?;
        transition(&mut record, TaskStatus::Canceled)
    }

    fn execute(&self, record: &mut TaskRecord) -> ServiceResult<()> {
        let outcome = match record.info.executor {
            ExecutorType::Builtin => self
                .state
                .builtins
                .execute(&record.function_name, &record.info.function_arguments),
            other => Err(format!("executor {} is not available", other)),
        };

        let (status, result) = match outcome {
            Ok(return_value) => (
                TaskStatus::Finished,
                TaskOutcome::Ok(TaskOutputs {
                    return_value,
                    output_file_hashes: BTreeMap::new(),
                }),
            ),
            Err(reason) => (TaskStatus::Failed, TaskOutcome::Err(TaskFailure { reason })),
        };
        transition(record, status)?;
        record.info.result = Some(result);
        debug!(task_id = %record.info.task_id, %status, "Mock task executed");
        Ok(())
    }

    fn owned_task(
        &self,
        caller: &str,
        task_id: &TaskId,
    ) -> ServiceResult<RefMut<'_, TaskId, TaskRecord>> {
        match self.state.tasks.get_mut(task_id) {
            Some(record) if record.info.creator == caller => Ok(record),
            _ => Err(not_found("task", task_id.as_str())),
        }
    }
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

fn to_body<T: Serialize>(value: T) -> Reply {
    serde_json::to_value(value)
        .map_err(|e| ServiceError::new(ServiceErrorKind::Internal, e.to_string()))
}

fn not_found(what: &str, id: &str) -> ServiceError {
    ServiceError::new(ServiceErrorKind::NotFound, format!("{} {} not found", what, id))
}

fn invalid_argument(err: Error) -> ServiceError {
    ServiceError::new(ServiceErrorKind::InvalidArgument, detail(err))
}

/// Message of a client-side error without its category prefix.
fn detail(err: Error) -> String {
    match err {
        Error::Registration(msg) | Error::TaskCreation(msg) | Error::Invocation(msg) => msg,
        other => other.to_string(),
    }
}

fn check_usable(info: &FunctionInfo, caller: &str) -> ServiceResult<()> {
    let usable = info.descriptor.public
        || info.owner == caller
        || info.descriptor.user_allowlist.iter().any(|user| user == caller);
    if usable {
        Ok(())
    } else {
        Err(ServiceError::new(
            ServiceErrorKind::PermissionDenied,
            format!("{} may not use function {}", caller, info.function_id),
        ))
    }
}

fn transition(record: &mut TaskRecord, next: TaskStatus) -> ServiceResult<()> {
    record
        .info
        .status
        .validate_transition(record.info.task_id.as_str(), &next)
        .map_err(|e| ServiceError::new(ServiceErrorKind::FailedPrecondition, detail(e)))?;
    record.info.status = next;
    Ok(())
}

/// Connection to a [`MockPlatform`].
///
/// Requests and replies pass through their JSON encoding, so the wire
/// format is exercised exactly as over HTTPS.
#[derive(Debug)]
pub struct MockTransport {
    platform: MockPlatform,
    closed: bool,
}

impl MockTransport {
    fn release(&mut self) {
        if !self.closed {
            self.closed = true;
            self.platform
                .state
                .open_connections
                .fetch_sub(1, Ordering::Relaxed);
        }
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        self.release();
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, request: &Request, credential: Option<&Credential>) -> Result<Reply> {
        if self.closed {
            return Err(Error::Connection("mock connection is closed".to_string()));
        }

        let wire = serde_json::to_value(request)?;
        let request: Request = serde_json::from_value(wire)
            .map_err(|e| Error::Protocol(format!("request does not round-trip: {}", e)))?;
        Ok(self.platform.handle(request, credential))
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::Connection(
                "mock connection is already closed".to_string(),
            ));
        }
        self.release();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.closed
    }

    fn transport_type(&self) -> &'static str {
        "mock"
    }
}
