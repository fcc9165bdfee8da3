//! Tool surface: parameter schemas and handlers.
//!
//! Argument structs deserialize straight from the `tools/call` arguments
//! object; their schemas are derived and patched with runtime facts (the
//! enabled-shell enum) at list time. Handlers return the MCP result value:
//! command-level failures ride inside a successful response with
//! `isError=true`, never as transport errors.

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::{LogQueryError, ValidationError};
use crate::exec::{self, ExecRequest};
use crate::logs::{range, search};
use crate::truncate;
use crate::validate;

use super::ServerState;
use super::protocol::{self, tool_error, tool_result};

/// Arguments for `execute_command`.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteCommandParams {
    /// Shell to run the command in; one of the enabled shells.
    pub shell: String,
    /// The command line to execute.
    pub command: String,
    /// Working directory; defaults to the server's current directory.
    #[serde(default)]
    pub working_dir: Option<String>,
    /// Cap on inline output lines for this call (minimum 1).
    #[serde(default)]
    #[schemars(with = "Option<i64>")]
    pub max_output_lines: Option<f64>,
    /// Timeout in seconds for this call, integer in [1, 3600].
    #[serde(default)]
    #[schemars(with = "Option<i64>")]
    pub timeout: Option<f64>,
}

/// Arguments for `set_current_directory`.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SetCurrentDirectoryParams {
    /// The directory to make current for subsequent commands.
    pub path: String,
}

/// Arguments for `validate_directories`.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidateDirectoriesParams {
    /// Directories to check against the allowed-path policy.
    pub directories: Vec<String>,
    /// Check against this shell's allowed set instead of the union.
    #[serde(default)]
    pub shell: Option<String>,
}

/// Arguments for `get_command_output`.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetCommandOutputParams {
    /// Execution id from an earlier `execute_command` result.
    pub execution_id: String,
    /// First line to return (1-based; negatives count from the end).
    #[serde(default)]
    #[schemars(with = "Option<i64>")]
    pub start_line: Option<f64>,
    /// Last line to return (1-based; negatives count from the end).
    #[serde(default)]
    #[schemars(with = "Option<i64>")]
    pub end_line: Option<f64>,
    /// Regex to search for instead of slicing by line range.
    #[serde(default)]
    pub search: Option<String>,
    /// Tail cap when returning the full output.
    #[serde(default)]
    #[schemars(with = "Option<i64>")]
    pub max_lines: Option<f64>,
    /// Context lines around a search match (clamped to [0, 20]).
    #[serde(default)]
    #[schemars(with = "Option<i64>")]
    pub context_lines: Option<f64>,
    /// Which search match to show (1-based).
    #[serde(default)]
    #[schemars(with = "Option<i64>")]
    pub occurrence: Option<f64>,
    /// Case-insensitive search.
    #[serde(default)]
    pub case_insensitive: Option<bool>,
    /// Prefix returned lines with their 1-based numbers.
    #[serde(default)]
    pub include_line_numbers: Option<bool>,
}

/// Dispatch one tool call. `Err` is a transport-level problem (unknown tool,
/// malformed arguments); every policy or execution failure is an `Ok` value
/// carrying `isError=true`.
pub fn call(state: &ServerState, name: &str, arguments: Value) -> Result<Value, (i64, String)> {
    match name {
        "execute_command" => {
            let params: ExecuteCommandParams = parse(arguments)?;
            execute_command(state, params)
        }
        "get_current_directory" => Ok(get_current_directory(state)),
        "set_current_directory" => {
            let params: SetCurrentDirectoryParams = parse(arguments)?;
            Ok(set_current_directory(state, params))
        }
        "get_config" => Ok(tool_result(
            pretty(&state.sanitized_config()),
            false,
            None,
        )),
        "validate_directories" if state.any_shell_restricts() => {
            let params: ValidateDirectoriesParams = parse(arguments)?;
            validate_directories(state, params)
        }
        "get_command_output" => {
            let params: GetCommandOutputParams = parse(arguments)?;
            get_command_output(state, params)
        }
        other => Err((
            protocol::METHOD_NOT_FOUND,
            format!("unknown tool '{other}'"),
        )),
    }
}

/// The `tools/list` payload. The `shell` enum mirrors the enabled shells;
/// `validate_directories` appears only when some shell restricts working
/// directories.
pub fn list(state: &ServerState) -> Value {
    let shell_names: Vec<&str> = state.shells().keys().map(String::as_str).collect();

    let mut execute_schema = schema_of::<ExecuteCommandParams>();
    execute_schema["properties"]["shell"]["enum"] = json!(shell_names);

    let mut tools = vec![
        json!({
            "name": "execute_command",
            "description": "Execute a command in one of the configured shells and return its output",
            "inputSchema": execute_schema,
        }),
        json!({
            "name": "get_current_directory",
            "description": "Return the server's current working directory",
            "inputSchema": empty_schema(),
        }),
        json!({
            "name": "set_current_directory",
            "description": "Set the server's current working directory for subsequent commands",
            "inputSchema": schema_of::<SetCurrentDirectoryParams>(),
        }),
        json!({
            "name": "get_config",
            "description": "Return the server configuration (enabled shells, policy, logging)",
            "inputSchema": empty_schema(),
        }),
        json!({
            "name": "get_command_output",
            "description": "Retrieve stored output of a past execution by id, by line range or regex search",
            "inputSchema": schema_of::<GetCommandOutputParams>(),
        }),
    ];

    if state.any_shell_restricts() {
        let mut schema = schema_of::<ValidateDirectoriesParams>();
        schema["properties"]["shell"]["enum"] = json!(shell_names);
        tools.push(json!({
            "name": "validate_directories",
            "description": "Check directories against the allowed-path policy before using them",
            "inputSchema": schema,
        }));
    }

    json!({ "tools": tools })
}

fn execute_command(
    state: &ServerState,
    params: ExecuteCommandParams,
) -> Result<Value, (i64, String)> {
    let max_output_lines = match params.max_output_lines {
        Some(raw) if raw.fract() != 0.0 || raw < 1.0 => {
            return Err((
                protocol::INVALID_PARAMS,
                format!("maxOutputLines must be an integer >= 1, got {raw}"),
            ));
        }
        Some(raw) => Some(raw as usize),
        None => None,
    };

    let outcome = exec::execute(
        state.shells(),
        &state.current_dir,
        &state.logs,
        ExecRequest {
            shell_name: &params.shell,
            command: &params.command,
            working_dir: params.working_dir.as_deref(),
            timeout_secs: params.timeout,
            max_output_lines,
        },
    );

    Ok(match outcome {
        Ok(outcome) => {
            let metadata = json!({
                "exitCode": outcome.exit_code,
                "shell": outcome.shell_name,
                "workingDirectory": outcome.working_directory,
                "executionId": outcome.execution_id,
                "totalLines": outcome.total_lines,
                "returnedLines": outcome.returned_lines,
                "wasTruncated": outcome.was_truncated,
                "timedOut": outcome.timed_out,
            });
            let is_error = outcome.is_error();
            tool_result(outcome.text, is_error, Some(metadata))
        }
        Err(rejection) => tool_error(rejection.to_value()),
    })
}

fn get_current_directory(state: &ServerState) -> Value {
    match state.current_dir.lock().expect("current dir lock poisoned").clone() {
        Some(dir) => tool_result(dir, false, None),
        None => tool_result(
            "No current directory is set. Pass workingDir on execute_command, or call \
             set_current_directory first."
                .to_string(),
            false,
            None,
        ),
    }
}

fn set_current_directory(state: &ServerState, params: SetCurrentDirectoryParams) -> Value {
    let path = params.path;

    // Accepted when any enabled shell would take it as a working directory
    let accepted = state
        .shells()
        .values()
        .any(|cfg| validate::is_path_allowed(&path, cfg));
    if !accepted {
        let allowed: Vec<String> = state
            .shells()
            .values()
            .flat_map(|cfg| cfg.effective_allowed_paths.iter().cloned())
            .collect();
        return tool_error(
            ValidationError::WorkingDirectoryNotAllowed { dir: path, allowed }.to_value(),
        );
    }
    if !std::path::Path::new(&path).is_dir() {
        return tool_error(
            ValidationError::InvalidPath {
                path,
                reason: "not an existing directory".to_string(),
            }
            .to_value(),
        );
    }

    let mut current = state.current_dir.lock().expect("current dir lock poisoned");
    let previous = current.replace(path.clone());
    drop(current);

    tool_result(
        format!("Current directory set to {path}"),
        false,
        Some(json!({ "previous": previous, "current": path })),
    )
}

fn validate_directories(
    state: &ServerState,
    params: ValidateDirectoriesParams,
) -> Result<Value, (i64, String)> {
    if params.directories.is_empty() {
        return Err((
            protocol::INVALID_PARAMS,
            "directories must be a non-empty array".to_string(),
        ));
    }

    let single = match &params.shell {
        Some(name) => match state.shells().get(name) {
            Some(cfg) => Some(cfg),
            None => {
                return Ok(tool_error(
                    ValidationError::ShellNotEnabled(name.clone()).to_value(),
                ));
            }
        },
        None => None,
    };

    let results: Vec<Value> = params
        .directories
        .iter()
        .map(|dir| {
            let allowed = match single {
                Some(cfg) => validate::is_path_allowed(dir, cfg),
                None => state
                    .shells()
                    .values()
                    .any(|cfg| validate::is_path_allowed(dir, cfg)),
            };
            json!({ "directory": dir, "allowed": allowed })
        })
        .collect();

    let all_allowed = results.iter().all(|r| r["allowed"] == true);
    let text = if all_allowed {
        format!("All {} directories are allowed", results.len())
    } else {
        let rejected: Vec<&str> = results
            .iter()
            .filter(|r| r["allowed"] == false)
            .filter_map(|r| r["directory"].as_str())
            .collect();
        format!("Not allowed: {}", rejected.join(", "))
    };

    Ok(tool_result(
        text,
        false,
        Some(json!({ "results": results, "allAllowed": all_allowed })),
    ))
}

fn get_command_output(
    state: &ServerState,
    params: GetCommandOutputParams,
) -> Result<Value, (i64, String)> {
    let Some(entry) = state.logs.get(&params.execution_id) else {
        return Ok(tool_error(
            LogQueryError::LogNotFound(params.execution_id).to_value(),
        ));
    };

    let rendered: Result<String, LogQueryError> = if let Some(pattern) = &params.search {
        int_param(params.context_lines, "contextLines").and_then(|context| {
            int_param(params.occurrence, "occurrence").and_then(|occurrence| {
                search::search_lines(
                    &entry.combined_output,
                    pattern,
                    context.unwrap_or(0),
                    occurrence.unwrap_or(1),
                    params.case_insensitive.unwrap_or(false),
                    params.include_line_numbers.unwrap_or(false),
                )
            })
        })
    } else if params.start_line.is_some() || params.end_line.is_some() {
        int_param(params.start_line, "startLine").and_then(|start| {
            int_param(params.end_line, "endLine").and_then(|end| {
                range::slice_lines(
                    &entry.combined_output,
                    start.unwrap_or(1),
                    end.unwrap_or(-1),
                    params.include_line_numbers.unwrap_or(false),
                )
            })
        })
    } else {
        match int_param(params.max_lines, "maxLines") {
            Ok(Some(max)) => Ok(truncate::truncate_lines(
                &entry.combined_output,
                max.max(1) as usize,
                &entry.id,
            )
            .text),
            Ok(None) => Ok(entry.combined_output.clone()),
            Err(e) => Err(e),
        }
    };

    Ok(match rendered {
        Ok(text) => tool_result(
            text,
            false,
            Some(json!({
                "executionId": entry.id,
                "shell": entry.shell_name,
                "exitCode": entry.exit_code,
                "totalLines": entry.total_lines,
            })),
        ),
        Err(e) => tool_error(e.to_value()),
    })
}

fn int_param(raw: Option<f64>, name: &str) -> Result<Option<i64>, LogQueryError> {
    match raw {
        None => Ok(None),
        Some(value) if value.fract() == 0.0 && value.is_finite() => Ok(Some(value as i64)),
        Some(value) => Err(LogQueryError::InvalidRange(format!(
            "{name} must be an integer, got {value}"
        ))),
    }
}

fn parse<T: serde::de::DeserializeOwned>(arguments: Value) -> Result<T, (i64, String)> {
    serde_json::from_value(arguments)
        .map_err(|e| (protocol::INVALID_PARAMS, format!("invalid arguments: {e}")))
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn schema_of<T: JsonSchema>() -> Value {
    serde_json::to_value(schemars::schema_for!(T)).expect("schema serializes")
}

fn empty_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}
