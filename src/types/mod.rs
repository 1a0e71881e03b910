//! Data model and wire types of the Teaclave client protocol.
//!
//! - [`credential`] - credentials, user roles, registration outcomes
//! - [`function`] - function descriptors and identifiers
//! - [`task`] - task requests, the task state machine, and results
//! - [`protocol`] - request/response envelopes and service errors

pub mod credential;
pub mod function;
pub mod protocol;
pub mod task;

pub use credential::{Credential, UserRegistration, UserRole, MAX_TOKEN_LEN};
pub use function::{
    ExecutorType, FunctionArgument, FunctionDescriptor, FunctionId, FunctionInfo, FunctionInput,
    FunctionOutput, UNLIMITED_QUOTA,
};
pub use protocol::{Request, ServiceError, ServiceErrorKind};
pub use task::{
    FunctionArguments, OwnerList, TaskFailure, TaskId, TaskInfo, TaskOutcome, TaskOutputs,
    TaskRequest, TaskResult, TaskStatus,
};

use crate::error::{Error, Result};

/// Longest identifier accepted from the platform.
pub const MAX_ID_LEN: usize = 128;

/// Validates a platform identifier of the form `<prefix>-<uuid>`.
pub(crate) fn parse_external_id(prefix: &str, raw: &str) -> Result<String> {
    if raw.len() > MAX_ID_LEN {
        return Err(Error::Protocol(format!(
            "{} id is {} bytes, limit is {}",
            prefix,
            raw.len(),
            MAX_ID_LEN
        )));
    }

    let uuid_part = raw
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('-'))
        .ok_or_else(|| {
            Error::Protocol(format!("expected a {prefix}-<uuid> identifier, got {raw:?}"))
        })?;

    uuid::Uuid::parse_str(uuid_part).map_err(|e| {
        Error::Protocol(format!("invalid {} id {:?}: {}", prefix, raw, e))
    })?;

    Ok(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_ids() {
        let raw = format!("function-{}", uuid::Uuid::new_v4());
        assert_eq!(parse_external_id("function", &raw).unwrap(), raw);

        assert!(parse_external_id("function", "function").is_err());
        assert!(parse_external_id("function", "functionx-1").is_err());
        assert!(parse_external_id("task", &raw).is_err());
        assert!(parse_external_id("task", &"x".repeat(MAX_ID_LEN + 1)).is_err());
    }
}
