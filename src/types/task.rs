//! Task wire types and the task state machine.
//!
//! A task binds one registered function to concrete arguments. It moves
//! through [`TaskStatus`] from creation to a terminal state:
//!
//! ```text
//! Created -> Running      (invoke_task)
//! Created -> Canceled     (cancel_task)
//! Running -> Finished     (execution succeeded)
//! Running -> Failed       (execution failed)
//! Running -> Canceled     (cancel_task)
//! Finished, Failed, Canceled -> (terminal, no transitions)
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use super::function::{ExecutorType, FunctionId};
use super::parse_external_id;
use crate::error::{Error, Result};

/// Task lifecycle status.
///
/// # Examples
///
/// ```
/// use teaclave_client::TaskStatus;
///
/// assert!(!TaskStatus::Running.is_terminal());
/// assert!(TaskStatus::Created.can_transition_to(&TaskStatus::Running));
/// assert!(!TaskStatus::Finished.can_transition_to(&TaskStatus::Running));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task accepted, not yet invoked.
    Created,
    /// Task invoked and executing inside the platform.
    Running,
    /// Task finished and its result is available (terminal).
    Finished,
    /// Task execution failed (terminal).
    Failed,
    /// Task was canceled before finishing (terminal).
    Canceled,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Finished => write!(f, "finished"),
            Self::Failed => write!(f, "failed"),
            Self::Canceled => write!(f, "canceled"),
        }
    }
}

impl TaskStatus {
    /// Returns `true` if no further transitions are allowed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Canceled)
    }

    /// Returns `true` if moving from this status to `next` is valid.
    ///
    /// Self-transitions are rejected.
    pub fn can_transition_to(&self, next: &Self) -> bool {
        if self == next {
            return false;
        }

        match self {
            Self::Created => matches!(next, Self::Running | Self::Canceled),
            Self::Running => matches!(next, Self::Finished | Self::Failed | Self::Canceled),
            Self::Finished | Self::Failed | Self::Canceled => false,
        }
    }

    /// Validates a transition from this status to `next`.
    ///
    /// Returns [`Error::Invocation`] describing the rejected transition.
    ///
    /// # Examples
    ///
    /// ```
    /// use teaclave_client::TaskStatus;
    ///
    /// assert!(TaskStatus::Created
    ///     .validate_transition("task-1", &TaskStatus::Running)
    ///     .is_ok());
    /// assert!(TaskStatus::Running
    ///     .validate_transition("task-1", &TaskStatus::Running)
    ///     .is_err());
    /// ```
    pub fn validate_transition(&self, task_id: &str, next: &Self) -> Result<()> {
        if self.can_transition_to(next) {
            return Ok(());
        }

        let detail = if self.is_terminal() {
            format!("task {task_id} is {self}, a terminal state")
        } else if self == next {
            format!("task {task_id} is already {self}")
        } else {
            format!("task {task_id} cannot move from {self} to {next}")
        };
        Err(Error::Invocation(detail))
    }
}

/// Opaque, globally unique task identifier (`task-<uuid>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(String);

impl TaskId {
    /// Identifier prefix used by the platform.
    pub const PREFIX: &'static str = "task";

    /// Parses a task identifier, rejecting anything that is not
    /// `task-<uuid>`.
    pub fn parse(raw: &str) -> Result<Self> {
        parse_external_id(Self::PREFIX, raw).map(Self)
    }

    /// Generates a fresh identifier.
    pub fn generate() -> Self {
        Self(format!("{}-{}", Self::PREFIX, uuid::Uuid::new_v4()))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for TaskId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TaskId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Key/value arguments handed to a function when its task runs.
///
/// On the wire the arguments travel as a JSON *string* holding the
/// serialized object, e.g. `"{\"message\": \"Hello, Teaclave!\"}"`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunctionArguments {
    inner: Map<String, Value>,
}

impl FunctionArguments {
    /// Creates an empty argument set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds arguments from a JSON object.
    ///
    /// # Examples
    ///
    /// ```
    /// use teaclave_client::FunctionArguments;
    ///
    /// let args = FunctionArguments::from_json(serde_json::json!({
    ///     "message": "Hello, Teaclave!"
    /// }))
    /// .unwrap();
    /// assert_eq!(args.get("message").unwrap(), "Hello, Teaclave!");
    /// ```
    pub fn from_json(value: Value) -> Result<Self> {
        match value {
            Value::Object(inner) => Ok(Self { inner }),
            other => Err(Error::TaskCreation(format!(
                "function arguments must be a JSON object, got {}",
                other
            ))),
        }
    }

    /// Parses arguments from their serialized string form.
    pub fn parse(serialized: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(serialized)?;
        Self::from_json(value)
    }

    /// Adds or replaces one argument.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inner.insert(key.into(), value.into());
        self
    }

    /// Inserts one argument, returning the previous value if any.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.inner.insert(key.into(), value.into())
    }

    /// Looks up one argument.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.inner.get(key)
    }

    /// Returns `true` if `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    /// Iterates over argument keys.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.inner.keys()
    }

    /// Number of arguments.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if there are no arguments.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Serializes the arguments to their JSON string form.
    pub fn into_string(self) -> String {
        Value::Object(self.inner).to_string()
    }

    /// Returns the arguments as a JSON value.
    pub fn to_json(&self) -> Value {
        Value::Object(self.inner.clone())
    }
}

impl Serialize for FunctionArguments {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_json().to_string())
    }
}

impl<'de> Deserialize<'de> for FunctionArguments {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Declares which users own a named task input or output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerList {
    /// Name of the input/output binding of the function.
    pub data_name: String,
    /// Users that own the data bound to that name.
    pub uids: Vec<String>,
}

impl OwnerList {
    /// Creates an ownership declaration.
    pub fn new(data_name: impl Into<String>, uids: Vec<String>) -> Self {
        Self {
            data_name: data_name.into(),
            uids,
        }
    }
}

/// Request to create a task bound to a registered function.
///
/// # Examples
///
/// ```
/// use teaclave_client::{FunctionArguments, FunctionId, TaskRequest};
///
/// let function_id = FunctionId::generate();
/// let args = FunctionArguments::new().with("message", "Hello, Teaclave!");
/// let request = TaskRequest::new(function_id, args);
///
/// let json = serde_json::to_value(&request).unwrap();
/// assert_eq!(json["executor"], "builtin");
/// assert_eq!(json["function_arguments"], "{\"message\":\"Hello, Teaclave!\"}");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    /// Function the task runs.
    pub function_id: FunctionId,
    /// Concrete arguments, validated against the function's argument spec.
    pub function_arguments: FunctionArguments,
    /// Executor that runs the function.
    pub executor: ExecutorType,
    /// Owners of each function input.
    #[serde(default)]
    pub inputs_ownership: Vec<OwnerList>,
    /// Owners of each function output.
    #[serde(default)]
    pub outputs_ownership: Vec<OwnerList>,
}

impl TaskRequest {
    /// Creates a request using the builtin executor and no data bindings.
    pub fn new(function_id: FunctionId, function_arguments: FunctionArguments) -> Self {
        Self {
            function_id,
            function_arguments,
            executor: ExecutorType::Builtin,
            inputs_ownership: Vec::new(),
            outputs_ownership: Vec::new(),
        }
    }

    /// Selects the executor.
    pub fn with_executor(mut self, executor: ExecutorType) -> Self {
        self.executor = executor;
        self
    }

    /// Declares the owners of a function input.
    pub fn with_input_owner(mut self, data_name: impl Into<String>, uids: Vec<String>) -> Self {
        self.inputs_ownership.push(OwnerList::new(data_name, uids));
        self
    }

    /// Declares the owners of a function output.
    pub fn with_output_owner(mut self, data_name: impl Into<String>, uids: Vec<String>) -> Self {
        self.outputs_ownership.push(OwnerList::new(data_name, uids));
        self
    }
}

/// Outputs of a task that finished successfully.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutputs {
    /// Value returned by the function, base64 on the wire.
    #[serde(with = "base64_bytes")]
    pub return_value: Vec<u8>,
    /// Content hashes of the files the task produced, by output name.
    #[serde(default)]
    pub output_file_hashes: BTreeMap<String, String>,
}

/// Failure report of a task that did not finish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    /// Human-readable failure reason.
    pub reason: String,
}

/// Outcome recorded by the platform once a task leaves `Running`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    /// Execution succeeded.
    Ok(TaskOutputs),
    /// Execution failed.
    Err(TaskFailure),
}

/// Task details returned by `get_task`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    /// The task.
    pub task_id: TaskId,
    /// User that created the task.
    pub creator: String,
    /// Function the task runs.
    pub function_id: FunctionId,
    /// Resolved arguments (defaults applied).
    pub function_arguments: FunctionArguments,
    /// Executor running the function.
    pub executor: ExecutorType,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Outcome, present once the task has run.
    #[serde(default)]
    pub result: Option<TaskOutcome>,
}

impl TaskInfo {
    /// Converts task details into its result.
    ///
    /// Non-terminal tasks yield [`Error::ResultNotReady`]; failed or
    /// canceled tasks yield [`Error::Task`]. A finished task without a
    /// successful outcome is a protocol violation.
    pub fn into_result(self) -> Result<TaskResult> {
        let task_id = self.task_id.to_string();
        match (self.status, self.result) {
            (TaskStatus::Finished, Some(TaskOutcome::Ok(outputs))) => Ok(TaskResult {
                task_id: self.task_id,
                return_value: outputs.return_value,
                output_file_hashes: outputs.output_file_hashes,
            }),
            (TaskStatus::Finished, _) => Err(Error::Protocol(format!(
                "task {task_id} is finished but carries no successful outcome"
            ))),
            (TaskStatus::Failed, Some(TaskOutcome::Err(failure))) => Err(Error::Task {
                task_id,
                reason: failure.reason,
            }),
            (TaskStatus::Failed, _) => Err(Error::Task {
                task_id,
                reason: "execution failed".to_string(),
            }),
            (TaskStatus::Canceled, _) => Err(Error::Task {
                task_id,
                reason: "task was canceled".to_string(),
            }),
            (status, _) => Err(Error::ResultNotReady { task_id, status }),
        }
    }
}

/// Result payload of a finished task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    /// Task that produced the result.
    pub task_id: TaskId,
    /// Application-defined return value.
    pub return_value: Vec<u8>,
    /// Content hashes of produced output files.
    pub output_file_hashes: BTreeMap<String, String>,
}

impl TaskResult {
    /// Returns the return value as UTF-8 text.
    pub fn as_str(&self) -> Result<&str> {
        std::str::from_utf8(&self.return_value).map_err(|e| {
            Error::Protocol(format!(
                "result of task {} is not valid UTF-8: {}",
                self.task_id, e
            ))
        })
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn info(status: TaskStatus, result: Option<TaskOutcome>) -> TaskInfo {
        TaskInfo {
            task_id: TaskId::generate(),
            creator: "test_id".to_string(),
            function_id: FunctionId::generate(),
            function_arguments: FunctionArguments::new(),
            executor: ExecutorType::Builtin,
            status,
            result,
        }
    }

    #[test]
    fn task_status_display_matches_serde() {
        for status in [
            TaskStatus::Created,
            TaskStatus::Running,
            TaskStatus::Finished,
            TaskStatus::Failed,
            TaskStatus::Canceled,
        ] {
            assert_eq!(serde_json::to_value(status).unwrap(), status.to_string());
        }
    }

    #[test]
    fn task_id_requires_prefix_and_uuid() {
        let id = TaskId::generate();
        assert_eq!(TaskId::parse(id.as_str()).unwrap(), id);
        assert!(TaskId::parse("").is_err());
        assert!(TaskId::parse("task-not-a-uuid").is_err());
        assert!(TaskId::parse(&format!("function-{}", uuid::Uuid::new_v4())).is_err());
    }

    #[test]
    fn arguments_travel_as_a_json_string() {
        let args = FunctionArguments::new().with("message", "Hello, Teaclave!");
        let json = serde_json::to_value(&args).unwrap();
        assert_eq!(json, json!("{\"message\":\"Hello, Teaclave!\"}"));

        let back: FunctionArguments = serde_json::from_value(json).unwrap();
        assert_eq!(back, args);
    }

    #[test]
    fn arguments_must_be_an_object() {
        assert!(FunctionArguments::from_json(json!(["message"])).is_err());
        assert!(FunctionArguments::parse("\"message\"").is_err());
    }

    #[test]
    fn finished_task_yields_result() {
        let outcome = TaskOutcome::Ok(TaskOutputs {
            return_value: b"Hello, Teaclave!".to_vec(),
            output_file_hashes: BTreeMap::new(),
        });
        let result = info(TaskStatus::Finished, Some(outcome))
            .into_result()
            .unwrap();
        assert_eq!(result.as_str().unwrap(), "Hello, Teaclave!");
    }

    #[test]
    fn unfinished_task_is_not_ready() {
        for status in [TaskStatus::Created, TaskStatus::Running] {
            let err = info(status, None).into_result().unwrap_err();
            assert!(err.is_retryable(), "{status} should be retryable");
        }
    }

    #[test]
    fn failed_and_canceled_tasks_are_terminal_errors() {
        let failure = TaskOutcome::Err(TaskFailure {
            reason: "Cannot deserialize arguments".to_string(),
        });
        let err = info(TaskStatus::Failed, Some(failure))
            .into_result()
            .unwrap_err();
        assert!(err.is_terminal());
        assert!(err.to_string().contains("Cannot deserialize arguments"));

        let err = info(TaskStatus::Canceled, None).into_result().unwrap_err();
        assert!(err.is_terminal());
    }

    #[test]
    fn finished_without_outcome_is_protocol_error() {
        let err = info(TaskStatus::Finished, None).into_result().unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn outcome_wire_format() {
        let outcome = TaskOutcome::Ok(TaskOutputs {
            return_value: b"hi".to_vec(),
            output_file_hashes: BTreeMap::new(),
        });
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["ok"]["return_value"], "aGk=");
    }
}
