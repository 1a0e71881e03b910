//! Function definitions and their wire representation.
//!
//! A [`FunctionDescriptor`] is registered once and identified thereafter by
//! an opaque [`FunctionId`]. The descriptor is immutable after creation.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

use super::parse_external_id;
use super::task::FunctionArguments;
use crate::error::{Error, Result};

/// Usage quota meaning "no limit".
pub const UNLIMITED_QUOTA: i32 = -1;

/// Opaque function identifier (`function-<uuid>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(String);

impl FunctionId {
    /// Identifier prefix used by the platform.
    pub const PREFIX: &'static str = "function";

    /// Parses a function identifier, rejecting anything that is not
    /// `function-<uuid>`.
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

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for FunctionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for FunctionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Engine that executes a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorType {
    /// Function compiled into the platform, selected by name.
    Builtin,
    /// Python script shipped as the function payload.
    Python,
    /// WebAssembly module shipped as the function payload.
    Wamr,
}

impl fmt::Display for ExecutorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Builtin => write!(f, "builtin"),
            Self::Python => write!(f, "python"),
            Self::Wamr => write!(f, "wamr"),
        }
    }
}

/// One entry of a function's argument spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionArgument {
    /// Argument name.
    pub key: String,
    /// Value used when the task does not supply one.
    #[serde(default)]
    pub default_value: String,
    /// Whether a task may supply its own value.
    #[serde(default)]
    pub allow_overwrite: bool,
}

impl FunctionArgument {
    /// Creates an argument spec entry.
    pub fn new(
        key: impl Into<String>,
        default_value: impl Into<String>,
        allow_overwrite: bool,
    ) -> Self {
        Self {
            key: key.into(),
            default_value: default_value.into(),
            allow_overwrite,
        }
    }

    /// An argument is required when the caller may set it and no default
    /// exists.
    pub fn is_required(&self) -> bool {
        self.allow_overwrite && self.default_value.is_empty()
    }
}

/// Named input file binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionInput {
    /// Binding name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Whether a task may omit the binding.
    #[serde(default)]
    pub optional: bool,
}

impl FunctionInput {
    /// Creates a mandatory input binding.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            optional: false,
        }
    }
}

/// Named output file binding.
pub type FunctionOutput = FunctionInput;

/// Definition of a reusable function.
///
/// Serializes to the body of a `register_function` request:
///
/// ```
/// use teaclave_client::{ExecutorType, FunctionArgument, FunctionDescriptor};
///
/// let echo = FunctionDescriptor::new("builtin-echo", ExecutorType::Builtin)
///     .with_description("Native Echo Function")
///     .with_argument(FunctionArgument::new("message", "", true));
///
/// let json = serde_json::to_value(&echo).unwrap();
/// assert_eq!(json["executor_type"], "builtin");
/// assert_eq!(json["public"], true);
/// assert_eq!(json["usage_quota"], -1);
/// assert_eq!(json["arguments"][0]["key"], "message");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    /// Function name; builtin functions are selected by it.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Engine that runs the function.
    pub executor_type: ExecutorType,
    /// Whether every user may create tasks for the function.
    pub public: bool,
    /// Script or module body for non-builtin executors.
    #[serde(default)]
    pub payload: Vec<u8>,
    /// Ordered argument spec.
    #[serde(default)]
    pub arguments: Vec<FunctionArgument>,
    /// Input file bindings.
    #[serde(default)]
    pub inputs: Vec<FunctionInput>,
    /// Output file bindings.
    #[serde(default)]
    pub outputs: Vec<FunctionOutput>,
    /// Users allowed to use a private function.
    #[serde(default)]
    pub user_allowlist: Vec<String>,
    /// Remaining number of tasks that may be created; `-1` is unlimited.
    pub usage_quota: i32,
}

impl FunctionDescriptor {
    /// Creates a public descriptor with no arguments and unlimited quota.
    pub fn new(name: impl Into<String>, executor_type: ExecutorType) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            executor_type,
            public: true,
            payload: Vec::new(),
            arguments: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            user_allowlist: Vec::new(),
            usage_quota: UNLIMITED_QUOTA,
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the payload.
    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    /// Appends an argument spec entry.
    pub fn with_argument(mut self, argument: FunctionArgument) -> Self {
        self.arguments.push(argument);
        self
    }

    /// Appends an input binding.
    pub fn with_input(mut self, input: FunctionInput) -> Self {
        self.inputs.push(input);
        self
    }

    /// Appends an output binding.
    pub fn with_output(mut self, output: FunctionOutput) -> Self {
        self.outputs.push(output);
        self
    }

    /// Makes the function private, usable by its owner and `allowlist`.
    pub fn private(mut self, allowlist: Vec<String>) -> Self {
        self.public = false;
        self.user_allowlist = allowlist;
        self
    }

    /// Limits how many tasks may be created for the function.
    pub fn with_usage_quota(mut self, quota: i32) -> Self {
        self.usage_quota = quota;
        self
    }

    /// Checks the descriptor before it is sent to the platform.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Registration`] if the name is empty, argument keys
    /// repeat, the quota is below `-1`, or a builtin function carries a
    /// payload.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Registration("function name is empty".to_string()));
        }

        let mut seen = HashSet::new();
        for argument in &self.arguments {
            if argument.key.is_empty() {
                return Err(Error::Registration(format!(
                    "function {} has an argument with an empty key",
                    self.name
                )));
            }
            if !seen.insert(argument.key.as_str()) {
                return Err(Error::Registration(format!(
                    "function {} declares argument {} twice",
                    self.name, argument.key
                )));
            }
        }

        if self.usage_quota < UNLIMITED_QUOTA {
            return Err(Error::Registration(format!(
                "usage quota {} is invalid; use -1 for unlimited",
                self.usage_quota
            )));
        }

        if self.executor_type == ExecutorType::Builtin && !self.payload.is_empty() {
            return Err(Error::Registration(format!(
                "builtin function {} must not carry a payload",
                self.name
            )));
        }

        Ok(())
    }

    /// Applies the argument spec to the arguments supplied by a task.
    ///
    /// Unknown keys and overrides of non-overwritable arguments are
    /// rejected; absent arguments take their default; required arguments
    /// (see [`FunctionArgument::is_required`]) must be supplied.
    ///
    /// # Examples
    ///
    /// ```
    /// use teaclave_client::{ExecutorType, FunctionArgument, FunctionArguments, FunctionDescriptor};
    ///
    /// let function = FunctionDescriptor::new("greeter", ExecutorType::Builtin)
    ///     .with_argument(FunctionArgument::new("greeting", "Hello", false))
    ///     .with_argument(FunctionArgument::new("name", "", true));
    ///
    /// let resolved = function
    ///     .resolve_arguments(&FunctionArguments::new().with("name", "Teaclave"))
    ///     .unwrap();
    /// assert_eq!(resolved.get("greeting").unwrap(), "Hello");
    ///
    /// assert!(function.resolve_arguments(&FunctionArguments::new()).is_err());
    /// ```
    pub fn resolve_arguments(&self, provided: &FunctionArguments) -> Result<FunctionArguments> {
        if let Some(unknown) = provided
            .keys()
            .find(|key| !self.arguments.iter().any(|a| &a.key == *key))
        {
            return Err(Error::TaskCreation(format!(
                "function {} has no argument named {}",
                self.name, unknown
            )));
        }

        let mut resolved = FunctionArguments::new();
        for spec in &self.arguments {
            match provided.get(&spec.key) {
                Some(_) if !spec.allow_overwrite => {
                    return Err(Error::TaskCreation(format!(
                        "argument {} of function {} cannot be overwritten",
                        spec.key, self.name
                    )));
                },
                Some(value) => {
                    resolved.insert(spec.key.clone(), value.clone());
                },
                None if spec.is_required() => {
                    return Err(Error::TaskCreation(format!(
                        "missing required argument {} of function {}",
                        spec.key, self.name
                    )));
                },
                None => {
                    resolved.insert(spec.key.clone(), Value::String(spec.default_value.clone()));
                },
            }
        }

        Ok(resolved)
    }
}

/// Registered function as returned by `get_function`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionInfo {
    /// Identifier assigned at registration.
    pub function_id: FunctionId,
    /// User that registered the function.
    pub owner: String,
    /// The registered definition.
    #[serde(flatten)]
    pub descriptor: FunctionDescriptor,
}
