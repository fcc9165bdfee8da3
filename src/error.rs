//! Error taxonomy for config load, validation, execution, and log queries.
//!
//! Config-load errors are fatal at startup. Everything else is a per-request
//! failure: the dispatcher renders it as a structured object with a stable
//! machine `code`, a human-readable message, optional details, and an
//! actionable suggestion. Nothing here is ever retried.

use serde_json::{Value, json};
use thiserror::Error;

/// Fatal configuration errors. Any of these aborts startup with a nonzero
/// exit code.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("--yolo and --unsafe are mutually exclusive")]
    ConflictingModes,

    #[error("unknown shell '{0}'")]
    UnknownShell(String),

    #[error("{field}: {message}")]
    Bounds {
        field: &'static str,
        message: String,
    },
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Invalid(_) => "INVALID_CONFIG",
            ConfigError::ConflictingModes => "CONFLICTING_MODES",
            ConfigError::UnknownShell(_) => "UNKNOWN_SHELL",
            ConfigError::Bounds { .. } => "BOUNDS_VIOLATION",
        }
    }
}

/// Per-request validation failures. The validator has no side effects; these
/// are reported to the caller and never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("command exceeds the maximum length of {max} characters (got {len})")]
    CommandTooLong { len: usize, max: usize },

    #[error("command contains a blocked operator: '{operator}'")]
    BlockedOperator { operator: String },

    #[error("command '{name}' is blocked")]
    BlockedCommand { name: String },

    #[error("argument '{argument}' is blocked")]
    BlockedArgument { argument: String },

    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("working directory '{dir}' is outside all allowed paths")]
    WorkingDirectoryNotAllowed { dir: String, allowed: Vec<String> },

    #[error("shell '{0}' is not enabled")]
    ShellNotEnabled(String),

    #[error("timeout {0}s exceeds the maximum of 3600 seconds")]
    TimeoutTooLarge(u64),

    #[error("timeout {0}s is below the minimum of 1 second")]
    TimeoutTooSmall(u64),

    #[error("timeout must be an integer number of seconds")]
    TimeoutNotInteger,

    #[error("no working directory: none was provided and the server has no current directory")]
    NoCurrentDirectory,
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::CommandTooLong { .. } => "COMMAND_TOO_LONG",
            ValidationError::BlockedOperator { .. } => "BLOCKED_OPERATOR",
            ValidationError::BlockedCommand { .. } => "BLOCKED_COMMAND",
            ValidationError::BlockedArgument { .. } => "BLOCKED_ARGUMENT",
            ValidationError::InvalidPath { .. } => "INVALID_PATH",
            ValidationError::WorkingDirectoryNotAllowed { .. } => "WORKING_DIRECTORY_NOT_ALLOWED",
            ValidationError::ShellNotEnabled(_) => "SHELL_NOT_ENABLED",
            ValidationError::TimeoutTooLarge(_) => "TIMEOUT_TOO_LARGE",
            ValidationError::TimeoutTooSmall(_) => "TIMEOUT_TOO_SMALL",
            ValidationError::TimeoutNotInteger => "TIMEOUT_NOT_INTEGER",
            ValidationError::NoCurrentDirectory => "NO_CURRENT_DIRECTORY",
        }
    }

    pub fn suggestion(&self) -> Option<String> {
        match self {
            ValidationError::WorkingDirectoryNotAllowed { allowed, .. } => Some(format!(
                "Use a directory under one of the allowed paths: {}",
                allowed.join(", ")
            )),
            ValidationError::NoCurrentDirectory => {
                Some("Pass workingDir, or call set_current_directory first".to_string())
            }
            ValidationError::ShellNotEnabled(_) => {
                Some("Call get_config to see which shells are enabled".to_string())
            }
            _ => None,
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            ValidationError::WorkingDirectoryNotAllowed { dir, allowed } => Some(json!({
                "workingDirectory": dir,
                "allowedPaths": allowed,
            })),
            ValidationError::CommandTooLong { len, max } => Some(json!({
                "commandLength": len,
                "maxCommandLength": max,
            })),
            _ => None,
        }
    }

    /// The structured form returned to callers.
    pub fn to_value(&self) -> Value {
        error_object(self.code(), &self.to_string(), self.details(), self.suggestion())
    }
}

/// Execution failures. `Timeout` is not represented here: a timed-out command
/// is a successful tool call carrying an error flag and partial output.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to spawn shell '{shell}': {source}")]
    SpawnFailed {
        shell: String,
        #[source]
        source: std::io::Error,
    },
}

impl ExecError {
    pub fn code(&self) -> &'static str {
        match self {
            ExecError::SpawnFailed { .. } => "SPAWN_FAILED",
        }
    }

    pub fn to_value(&self) -> Value {
        let suggestion = match self {
            ExecError::SpawnFailed { .. } => {
                Some("Check that the shell executable exists and is runnable".to_string())
            }
        };
        error_object(self.code(), &self.to_string(), None, suggestion)
    }
}

/// Failures while reading `cli://logs/...` resources or `get_command_output`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LogQueryError {
    #[error("no stored output for execution id '{0}'")]
    LogNotFound(String),

    #[error("invalid line range: {0}")]
    InvalidRange(String),

    #[error("invalid search: {0}")]
    InvalidSearch(String),

    #[error("no lines match pattern '{0}'")]
    NoMatches(String),

    #[error("occurrence {requested} is out of range: {available} match(es) available")]
    InvalidOccurrence { requested: i64, available: usize },

    #[error("log resources are disabled")]
    LogsDisabled,
}

impl LogQueryError {
    pub fn code(&self) -> &'static str {
        match self {
            LogQueryError::LogNotFound(_) => "LOG_NOT_FOUND",
            LogQueryError::InvalidRange(_) => "INVALID_RANGE",
            LogQueryError::InvalidSearch(_) => "INVALID_SEARCH",
            LogQueryError::NoMatches(_) => "NO_MATCHES",
            LogQueryError::InvalidOccurrence { .. } => "INVALID_OCCURRENCE",
            LogQueryError::LogsDisabled => "LOGS_DISABLED",
        }
    }

    pub fn suggestion(&self) -> Option<String> {
        match self {
            LogQueryError::LogNotFound(_) => {
                Some("List stored executions via cli://logs/list".to_string())
            }
            LogQueryError::NoMatches(_) => {
                Some("Try caseInsensitive=true or a broader pattern".to_string())
            }
            LogQueryError::InvalidOccurrence { available, .. } => Some(format!(
                "Pick an occurrence between 1 and {available}"
            )),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        error_object(self.code(), &self.to_string(), None, self.suggestion())
    }
}

fn error_object(
    code: &str,
    message: &str,
    details: Option<Value>,
    suggestion: Option<String>,
) -> Value {
    let mut obj = json!({
        "code": code,
        "message": message,
    });
    if let Some(details) = details {
        obj["details"] = details;
    }
    if let Some(suggestion) = suggestion {
        obj["suggestion"] = Value::String(suggestion);
    }
    obj
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_codes_are_stable() {
        let err = ValidationError::BlockedCommand {
            name: "rm".to_string(),
        };
        assert_eq!(err.code(), "BLOCKED_COMMAND");
        assert!(err.to_string().contains("rm"));
    }

    #[test]
    fn structured_form_carries_details_and_suggestion() {
        let err = ValidationError::WorkingDirectoryNotAllowed {
            dir: "/etc".to_string(),
            allowed: vec!["/home/alice".to_string()],
        };
        let value = err.to_value();
        assert_eq!(value["code"], "WORKING_DIRECTORY_NOT_ALLOWED");
        assert_eq!(value["details"]["workingDirectory"], "/etc");
        assert_eq!(value["details"]["allowedPaths"][0], "/home/alice");
        assert!(value["suggestion"].as_str().unwrap().contains("/home/alice"));
    }

    #[test]
    fn no_matches_suggests_case_insensitive_search() {
        let err = LogQueryError::NoMatches("ERROR".to_string());
        let value = err.to_value();
        assert!(value["suggestion"].as_str().unwrap().contains("caseInsensitive"));
    }

    #[test]
    fn log_not_found_points_at_the_listing() {
        let err = LogQueryError::LogNotFound("20260801-120000-ab12".to_string());
        assert!(err.suggestion().unwrap().contains("cli://logs/list"));
    }
}
