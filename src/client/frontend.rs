//! Frontend service client: function registry and task lifecycle.
//!
//! A [`FrontendClient`] is one authenticated session. It must be released
//! with [`close`](FrontendClient::close), or handed a block of work through
//! [`run`](FrontendClient::run) / [`finish`](FrontendClient::finish), which
//! close it on every exit path.

use futures::future::BoxFuture;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::map_service_error;
use crate::config::PollPolicy;
use crate::error::{Error, Result};
use crate::shared::Transport;
use crate::types::protocol::{
    decode_body, CreateTaskResponse, GetFunctionRequest, RegisterFunctionResponse, Request,
    TaskIdRequest,
};
use crate::types::{
    Credential, FunctionDescriptor, FunctionId, FunctionInfo, TaskId, TaskInfo, TaskRequest,
    TaskResult,
};

/// Authenticated session with the frontend service.
///
/// # Example
///
/// ```rust,no_run
/// use teaclave_client::{
///     ClientConfig, ExecutorType, FunctionArgument, FunctionArguments, FunctionDescriptor,
///     FrontendClient, TaskRequest,
/// };
///
/// # async fn example(credential: teaclave_client::Credential) -> teaclave_client::Result<()> {
/// let config = ClientConfig::from_env()?;
/// let mut client = FrontendClient::connect(&config.frontend_endpoint()).await?;
/// client.use_credential(credential);
///
/// let echo = FunctionDescriptor::new("builtin-echo", ExecutorType::Builtin)
///     .with_argument(FunctionArgument::new("message", "", true));
/// let function_id = client.register_function(&echo).await?;
///
/// let args = FunctionArguments::new().with("message", "Hello, Teaclave!");
/// let task_id = client.create_task(&TaskRequest::new(function_id, args)).await?;
/// client.invoke_task(&task_id).await?;
///
/// let result = client.get_task_result(&task_id).await;
/// let result = client.finish(result).await?;
/// println!("{}", result.as_str()?);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct FrontendClient {
    transport: Box<dyn Transport>,
    credential: Option<Credential>,
    closed: bool,
}

impl FrontendClient {
    /// Connects to the frontend service over HTTPS.
    ///
    /// The session has no credential until one is set.
    #[cfg(feature = "http-client")]
    pub async fn connect(endpoint: &crate::config::ServiceEndpoint) -> Result<Self> {
        let transport = crate::shared::HttpTransport::connect(endpoint).await?;
        Ok(Self::with_transport(transport))
    }

    /// Connects, authenticates, runs `f`, and closes the session.
    ///
    /// See [`run`](Self::run).
    #[cfg(feature = "http-client")]
    pub async fn scoped<T, F>(
        endpoint: &crate::config::ServiceEndpoint,
        credential: Credential,
        f: F,
    ) -> Result<T>
    where
        T: Send,
        F: for<'a> FnOnce(&'a mut FrontendClient) -> BoxFuture<'a, Result<T>>,
    {
        let mut client = Self::connect(endpoint).await?;
        client.use_credential(credential);
        client.run(f).await
    }

    /// Wraps an already connected transport.
    pub fn with_transport(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Box::new(transport),
            credential: None,
            closed: false,
        }
    }

    /// Attaches the credential sent with every later request.
    ///
    /// The token is only checked locally; a token the service rejects
    /// surfaces as [`Error::Auth`] on the next operation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] if the user id or token is malformed.
    pub fn set_credential(&mut self, user_id: &str, token: &str) -> Result<()> {
        self.use_credential(Credential::new(user_id, token)?);
        Ok(())
    }

    /// Attaches a credential obtained from
    /// [`AuthenticationClient::login`](crate::AuthenticationClient::login).
    pub fn use_credential(&mut self, credential: Credential) {
        debug!(user_id = credential.user_id(), "Credential attached");
        self.credential = Some(credential);
    }

    /// Credential of the session, if one is attached.
    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// Returns `true` until the session is closed.
    pub fn is_connected(&self) -> bool {
        !self.closed && self.transport.is_connected()
    }

    /// Registers a function and returns its identifier.
    ///
    /// The descriptor is validated locally before anything is sent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Registration`] for a malformed or duplicate
    /// function or an unprivileged caller, and [`Error::Auth`] when the
    /// session has no accepted credential.
    pub async fn register_function(
        &mut self,
        descriptor: &FunctionDescriptor,
    ) -> Result<FunctionId> {
        descriptor.validate()?;

        let request = Request::RegisterFunction(descriptor.clone());
        let body = self.call(&request, Error::Registration).await?;
        let response: RegisterFunctionResponse = decode_body(request.kind(), body)?;

        info!(
            function_id = %response.function_id,
            name = %descriptor.name,
            executor = %descriptor.executor_type,
            "Registered function"
        );
        Ok(response.function_id)
    }

    /// Fetches a registered function.
    pub async fn get_function(&mut self, function_id: &FunctionId) -> Result<FunctionInfo> {
        let request = Request::GetFunction(GetFunctionRequest {
            function_id: function_id.clone(),
        });
        let body = self.call(&request, Error::Registration).await?;
        decode_body(request.kind(), body)
    }

    /// Creates a task bound to a registered function.
    ///
    /// The task starts in [`Created`](crate::TaskStatus::Created).
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskCreation`] if the function is unknown or not
    /// usable by the caller, its quota is exhausted, or the arguments do not
    /// satisfy its argument spec.
    pub async fn create_task(&mut self, task: &TaskRequest) -> Result<TaskId> {
        let request = Request::CreateTask(task.clone());
        let body = self.call(&request, Error::TaskCreation).await?;
        let response: CreateTaskResponse = decode_body(request.kind(), body)?;

        info!(
            task_id = %response.task_id,
            function_id = %task.function_id,
            "Created task"
        );
        Ok(response.task_id)
    }

    /// Starts a created task.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invocation`] if the task is unknown to the caller or
    /// has already been invoked.
    pub async fn invoke_task(&mut self, task_id: &TaskId) -> Result<()> {
        let request = Request::InvokeTask(TaskIdRequest::new(task_id.clone()));
        self.call(&request, Error::Invocation).await?;
        info!(%task_id, "Invoked task");
        Ok(())
    }

    /// Fetches the status and outcome of a task.
    pub async fn get_task(&mut self, task_id: &TaskId) -> Result<TaskInfo> {
        let request = Request::GetTask(TaskIdRequest::new(task_id.clone()));
        let body = self.call(&request, Error::Invocation).await?;
        let info: TaskInfo = decode_body(request.kind(), body)?;

        if &info.task_id != task_id {
            return Err(Error::Protocol(format!(
                "asked for task {} but got {}",
                task_id, info.task_id
            )));
        }
        Ok(info)
    }

    /// Fetches the result of a task, without waiting.
    ///
    /// # Errors
    ///
    /// - [`Error::ResultNotReady`] while the task is created or running; the
    ///   only retryable error.
    /// - [`Error::Task`] if the task failed or was canceled.
    /// - [`Error::Invocation`] if the task is unknown to the caller.
    pub async fn get_task_result(&mut self, task_id: &TaskId) -> Result<TaskResult> {
        let result = self.get_task(task_id).await?.into_result()?;
        debug!(%task_id, bytes = result.return_value.len(), "Fetched task result");
        Ok(result)
    }

    /// Polls [`get_task_result`](Self::get_task_result) until the task
    /// finishes.
    ///
    /// Waits follow `policy`: exponential backoff between polls, bounded by
    /// an overall deadline. Only [`Error::ResultNotReady`] is retried.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] when the deadline passes, and
    /// [`Error::Cancelled`] as soon as `cancel` fires. Both also abandon a
    /// poll that is still in flight.
    pub async fn wait_for_task_result(
        &mut self,
        task_id: &TaskId,
        policy: &PollPolicy,
        cancel: &CancellationToken,
    ) -> Result<TaskResult> {
        policy.validate()?;

        let deadline = Instant::now() + policy.timeout();
        let mut interval = policy.initial_interval();
        let mut attempts: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled(format!("wait for task {task_id}")));
            }

            attempts += 1;
            let polled = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(Error::Cancelled(format!("wait for task {task_id}")));
                },
                _ = tokio::time::sleep_until(deadline) => {
                    warn!(%task_id, attempts, "Poll still pending at deadline");
                    return Err(timed_out(task_id, policy));
                },
                polled = self.get_task_result(task_id) => polled,
            };
            match polled {
                Ok(result) => {
                    info!(%task_id, attempts, "Task finished");
                    return Ok(result);
                },
                Err(e) if e.is_retryable() => {
                    debug!(%task_id, attempts, error = %e, "Task result not ready");
                },
                Err(e) => return Err(e),
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(%task_id, attempts, "Gave up waiting for task");
                return Err(timed_out(task_id, policy));
            }

            if !sleep_or_cancel(interval.min(deadline - now), cancel).await {
                return Err(Error::Cancelled(format!("wait for task {task_id}")));
            }
            interval = policy.next_interval(interval);
        }
    }

    /// Cancels a task that has not reached a terminal state.
    pub async fn cancel_task(&mut self, task_id: &TaskId) -> Result<()> {
        let request = Request::CancelTask(TaskIdRequest::new(task_id.clone()));
        self.call(&request, Error::Invocation).await?;
        info!(%task_id, "Canceled task");
        Ok(())
    }

    /// Releases the session.
    ///
    /// # Errors
    ///
    /// Closing twice returns [`Error::Connection`]; the session stays
    /// closed.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::Connection("session is already closed".to_string()));
        }
        self.closed = true;
        self.transport.close().await?;
        debug!(transport = self.transport.transport_type(), "Session closed");
        Ok(())
    }

    /// Closes the session and returns `outcome`.
    ///
    /// A close failure is returned when `outcome` succeeded. When `outcome`
    /// already failed, that error wins and the close failure is only
    /// logged.
    pub async fn finish<T>(mut self, outcome: Result<T>) -> Result<T> {
        let closed = self.close().await;
        match (outcome, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(close_err)) => Err(close_err),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close_err)) => {
                warn!(error = %close_err, "Failed to close session after error");
                Err(e)
            },
        }
    }

    /// Runs `f` against the session, then closes it whatever `f` returned.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use teaclave_client::{FrontendClient, TaskId};
    /// # async fn example(client: FrontendClient, task_id: TaskId) -> teaclave_client::Result<()> {
    /// let result = client
    ///     .run(move |c| Box::pin(async move { c.get_task_result(&task_id).await }))
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn run<T, F>(mut self, f: F) -> Result<T>
    where
        T: Send,
        F: for<'a> FnOnce(&'a mut FrontendClient) -> BoxFuture<'a, Result<T>>,
    {
        let outcome = f(&mut self).await;
        self.finish(outcome).await
    }

    async fn call(
        &mut self,
        request: &Request,
        wrap: fn(String) -> Error,
    ) -> Result<serde_json::Value> {
        if self.closed {
            return Err(Error::Connection(format!(
                "{} on a closed session",
                request.kind()
            )));
        }
        let credential = self.credential.as_ref().ok_or_else(|| {
            Error::Auth(format!("{} requires a credential", request.kind()))
        })?;

        self.transport
            .send(request, Some(credential))
            .await?
            .map_err(|e| {
                debug!(request = request.kind(), error = %e, "Service rejected request");
                map_service_error(e, wrap)
            })
    }
}

impl Drop for FrontendClient {
    fn drop(&mut self) {
        if !self.closed {
            warn!("FrontendClient dropped without close(); session released implicitly");
        }
    }
}

fn timed_out(task_id: &TaskId, policy: &PollPolicy) -> Error {
    Error::Timeout(format!(
        "task {} not finished after {:?}",
        task_id,
        policy.timeout()
    ))
}

/// Sleeps for `duration`; returns `false` if `cancel` fired first.
async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = cancel.cancelled() => false,
    }
}
