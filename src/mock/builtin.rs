//! Builtin functions executed by the in-memory platform.

use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::types::FunctionArguments;

/// Body of a builtin: resolved arguments in, return value or failure
/// reason out.
pub type BuiltinFn =
    Arc<dyn Fn(&FunctionArguments) -> std::result::Result<Vec<u8>, String> + Send + Sync>;

/// Name of the echo builtin.
pub const ECHO: &str = "builtin-echo";

#[derive(Deserialize)]
struct EchoArguments {
    message: String,
}

/// Returns the `message` argument unchanged.
///
/// # Examples
///
/// ```
/// use teaclave_client::mock::builtin::echo;
/// use teaclave_client::FunctionArguments;
///
/// let args = FunctionArguments::new().with("message", "Hello, Teaclave!");
/// assert_eq!(echo(&args).unwrap(), b"Hello, Teaclave!");
/// ```
pub fn echo(arguments: &FunctionArguments) -> std::result::Result<Vec<u8>, String> {
    let args: EchoArguments = serde_json::from_value(arguments.to_json())
        .map_err(|e| format!("invalid echo arguments: {}", e))?;
    Ok(args.message.into_bytes())
}

/// Builtins available to tasks, by function name.
#[derive(Clone)]
pub struct BuiltinRegistry {
    functions: Arc<RwLock<HashMap<String, BuiltinFn>>>,
}

impl BuiltinRegistry {
    /// Registry holding only [`echo`].
    pub fn new() -> Self {
        let registry = Self {
            functions: Arc::new(RwLock::new(HashMap::new())),
        };
        registry.register(ECHO, echo);
        registry
    }

    /// Adds or replaces a builtin.
    pub fn register<F>(&self, name: impl Into<String>, function: F)
    where
        F: Fn(&FunctionArguments) -> std::result::Result<Vec<u8>, String> + Send + Sync + 'static,
    {
        self.functions.write().insert(name.into(), Arc::new(function));
    }

    /// Returns `true` if a builtin named `name` exists.
    pub fn contains(&self, name: &str) -> bool {
        self.functions.read().contains_key(name)
    }

    /// Runs the builtin named `name`.
    pub fn execute(
        &self,
        name: &str,
        arguments: &FunctionArguments,
    ) -> std::result::Result<Vec<u8>, String> {
        // clone out so the lock is not held while user code runs
        let function = self
            .functions
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| format!("no builtin named {}", name))?;
        function(arguments)
    }
}

impl Default for BuiltinRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BuiltinRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.functions.read().keys().cloned().collect();
        names.sort();
        f.debug_struct("BuiltinRegistry")
            .field("functions", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_requires_string_message() {
        assert!(echo(&FunctionArguments::new()).is_err());
        assert!(echo(&FunctionArguments::new().with("message", 42)).is_err());
    }

    #[test]
    fn custom_builtins() {
        let registry = BuiltinRegistry::new();
        registry.register("builtin-reverse", |args: &FunctionArguments| {
            let text = args
                .get("text")
                .and_then(|v| v.as_str())
                .ok_or_else(|| "missing text".to_string())?;
            Ok(text.chars().rev().collect::<String>().into_bytes())
        });

        assert!(registry.contains(ECHO));
        let args = FunctionArguments::new().with("text", "abc");
        assert_eq!(registry.execute("builtin-reverse", &args).unwrap(), b"cba");
        assert!(registry.execute("builtin-missing", &args).is_err());
    }
}
