//! `cli://` resource URIs: parsing, listing, and reads.
//!
//! | URI | media type |
//! |---|---|
//! | `cli://config` | `application/json` |
//! | `cli://logs/list` | `application/json` |
//! | `cli://logs/recent?n=K&shell=S` | `application/json` |
//! | `cli://logs/commands/{id}` | `text/plain` |
//! | `cli://logs/commands/{id}/range?start=A&end=B&lineNumbers=bool` | `text/plain` |
//! | `cli://logs/commands/{id}/search?q=P&context=C&occurrence=K&...` | `text/plain` |

use serde_json::{Value, json};

use crate::error::LogQueryError;
use crate::logs::{ListFilter, range, search};

use super::ServerState;
use super::protocol::{self, JsonRpcResponse};

const RECENT_DEFAULT: usize = 5;
const RECENT_MAX: usize = 100;

/// A parsed `cli://` reference.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceRef {
    Config,
    LogsList,
    LogsRecent {
        count: usize,
        shell: Option<String>,
    },
    LogOutput {
        id: String,
    },
    LogRange {
        id: String,
        start: i64,
        end: i64,
        line_numbers: bool,
    },
    LogSearch {
        id: String,
        pattern: String,
        context: i64,
        occurrence: i64,
        case_insensitive: bool,
        line_numbers: bool,
    },
}

#[derive(Debug)]
pub enum ResourceError {
    UnknownUri(String),
    Query(LogQueryError),
}

impl From<LogQueryError> for ResourceError {
    fn from(e: LogQueryError) -> Self {
        ResourceError::Query(e)
    }
}

impl ResourceError {
    pub fn into_response(self, id: Value) -> JsonRpcResponse {
        match self {
            ResourceError::UnknownUri(uri) => JsonRpcResponse::error(
                id,
                protocol::RESOURCE_NOT_FOUND,
                format!("unknown resource '{uri}'"),
            ),
            ResourceError::Query(e) => {
                let code = match e {
                    LogQueryError::LogNotFound(_) | LogQueryError::LogsDisabled => {
                        protocol::RESOURCE_NOT_FOUND
                    }
                    _ => protocol::INVALID_PARAMS,
                };
                JsonRpcResponse::error_with_data(id, code, e.to_string(), e.to_value())
            }
        }
    }
}

/// Parse a `cli://` URI into its typed reference.
pub fn parse_uri(uri: &str) -> Result<ResourceRef, ResourceError> {
    let rest = uri
        .strip_prefix("cli://")
        .ok_or_else(|| ResourceError::UnknownUri(uri.to_string()))?;
    let (path, query) = match rest.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (rest, None),
    };

    match path {
        "config" => Ok(ResourceRef::Config),
        "logs/list" => Ok(ResourceRef::LogsList),
        "logs/recent" => {
            let params = query_params(query, range_err)?;
            let count = match find(&params, "n") {
                Some(raw) => parse_int(raw, "n", range_err)?.clamp(1, RECENT_MAX as i64) as usize,
                None => RECENT_DEFAULT,
            };
            Ok(ResourceRef::LogsRecent {
                count,
                shell: find(&params, "shell").map(str::to_string),
            })
        }
        _ => parse_command_uri(uri, path, query),
    }
}

fn parse_command_uri(
    uri: &str,
    path: &str,
    query: Option<&str>,
) -> Result<ResourceRef, ResourceError> {
    let Some(rest) = path.strip_prefix("logs/commands/") else {
        return Err(ResourceError::UnknownUri(uri.to_string()));
    };

    match rest.split_once('/') {
        None if !rest.is_empty() => Ok(ResourceRef::LogOutput {
            id: rest.to_string(),
        }),
        Some((id, "range")) if !id.is_empty() => {
            let params = query_params(query, range_err)?;
            let start = required_int(&params, "start", range_err)?;
            let end = required_int(&params, "end", range_err)?;
            Ok(ResourceRef::LogRange {
                id: id.to_string(),
                start,
                end,
                line_numbers: parse_bool(&params, "lineNumbers", range_err)?,
            })
        }
        Some((id, "search")) if !id.is_empty() => {
            let params = query_params(query, search_err)?;
            let pattern = find(&params, "q")
                .ok_or_else(|| search_err("missing required parameter 'q'".to_string()))?
                .to_string();
            let context = match find(&params, "context") {
                Some(raw) => parse_int(raw, "context", search_err)?,
                None => 0,
            };
            let occurrence = match find(&params, "occurrence") {
                Some(raw) => parse_int(raw, "occurrence", search_err)?,
                None => 1,
            };
            Ok(ResourceRef::LogSearch {
                id: id.to_string(),
                pattern,
                context,
                occurrence,
                case_insensitive: parse_bool(&params, "caseInsensitive", search_err)?,
                line_numbers: parse_bool(&params, "lineNumbers", search_err)?,
            })
        }
        _ => Err(ResourceError::UnknownUri(uri.to_string())),
    }
}

/// Read a resource and produce the `resources/read` result value.
pub fn read(state: &ServerState, uri: &str) -> Result<Value, ResourceError> {
    let reference = parse_uri(uri)?;

    if !matches!(reference, ResourceRef::Config) && !state.logging().enable_log_resources {
        return Err(LogQueryError::LogsDisabled.into());
    }

    match reference {
        ResourceRef::Config => Ok(protocol::resource_result(
            uri,
            "application/json",
            pretty(&state.sanitized_config()),
        )),
        ResourceRef::LogsList => {
            let entries = state.logs.list(&ListFilter::default());
            let stats = state.logs.stats();
            let body = json!({
                "entries": entries.iter().map(|e| e.metadata()).collect::<Vec<_>>(),
                "totalCount": stats.count,
                "totalSize": stats.total_size,
            });
            Ok(protocol::resource_result(uri, "application/json", pretty(&body)))
        }
        ResourceRef::LogsRecent { count, shell } => {
            let filter = ListFilter {
                shell_name: shell,
                ..Default::default()
            };
            let entries: Vec<Value> = state
                .logs
                .list(&filter)
                .iter()
                .take(count)
                .map(|e| e.metadata())
                .collect();
            Ok(protocol::resource_result(
                uri,
                "application/json",
                pretty(&json!({ "entries": entries })),
            ))
        }
        ResourceRef::LogOutput { id } => {
            let entry = lookup(state, &id)?;
            Ok(protocol::resource_result(
                uri,
                "text/plain",
                entry.combined_output.clone(),
            ))
        }
        ResourceRef::LogRange {
            id,
            start,
            end,
            line_numbers,
        } => {
            let entry = lookup(state, &id)?;
            let text = range::slice_lines(&entry.combined_output, start, end, line_numbers)?;
            Ok(protocol::resource_result(uri, "text/plain", text))
        }
        ResourceRef::LogSearch {
            id,
            pattern,
            context,
            occurrence,
            case_insensitive,
            line_numbers,
        } => {
            let entry = lookup(state, &id)?;
            let text = search::search_lines(
                &entry.combined_output,
                &pattern,
                context,
                occurrence,
                case_insensitive,
                line_numbers,
            )?;
            Ok(protocol::resource_result(uri, "text/plain", text))
        }
    }
}

/// The `resources/list` payload: the static resources plus one entry per
/// stored execution when log resources are enabled.
pub fn list(state: &ServerState) -> Value {
    let mut resources = vec![json!({
        "uri": "cli://config",
        "name": "Server configuration",
        "description": "Sanitized server configuration (enabled shells, policy, logging)",
        "mimeType": "application/json",
    })];

    if state.logging().enable_log_resources {
        resources.push(json!({
            "uri": "cli://logs/list",
            "name": "Command execution logs",
            "description": "Metadata for all stored command executions",
            "mimeType": "application/json",
        }));
        resources.push(json!({
            "uri": "cli://logs/recent",
            "name": "Recent command executions",
            "description": "The most recent executions; n=K and shell=S filter the list",
            "mimeType": "application/json",
        }));
        for entry in state.logs.list(&ListFilter::default()) {
            resources.push(json!({
                "uri": format!("cli://logs/commands/{}", entry.id),
                "name": entry.id,
                "description": short(&entry.command),
                "mimeType": "text/plain",
            }));
        }
    }

    json!({ "resources": resources })
}

fn lookup(
    state: &ServerState,
    id: &str,
) -> Result<std::sync::Arc<crate::logs::CommandLogEntry>, ResourceError> {
    state
        .logs
        .get(id)
        .ok_or_else(|| LogQueryError::LogNotFound(id.to_string()).into())
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn short(command: &str) -> String {
    const MAX: usize = 80;
    match command.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}…", &command[..idx]),
        None => command.to_string(),
    }
}

fn range_err(message: String) -> ResourceError {
    LogQueryError::InvalidRange(message).into()
}

fn search_err(message: String) -> ResourceError {
    LogQueryError::InvalidSearch(message).into()
}

fn query_params(
    query: Option<&str>,
    err: fn(String) -> ResourceError,
) -> Result<Vec<(String, String)>, ResourceError> {
    let Some(query) = query else {
        return Ok(Vec::new());
    };
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = urlencoding::decode(key)
                .map_err(|e| err(format!("malformed query key '{key}': {e}")))?;
            let value = urlencoding::decode(value)
                .map_err(|e| err(format!("malformed query value for '{key}': {e}")))?;
            Ok((key.into_owned(), value.into_owned()))
        })
        .collect()
}

fn find<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn parse_int(
    raw: &str,
    key: &str,
    err: fn(String) -> ResourceError,
) -> Result<i64, ResourceError> {
    raw.parse::<i64>()
        .map_err(|_| err(format!("parameter '{key}' must be an integer, got '{raw}'")))
}

fn required_int(
    params: &[(String, String)],
    key: &str,
    err: fn(String) -> ResourceError,
) -> Result<i64, ResourceError> {
    match find(params, key) {
        Some(raw) => parse_int(raw, key, err),
        None => Err(err(format!("missing required parameter '{key}'"))),
    }
}

fn parse_bool(
    params: &[(String, String)],
    key: &str,
    err: fn(String) -> ResourceError,
) -> Result<bool, ResourceError> {
    match find(params, key) {
        None => Ok(false),
        Some("true") | Some("1") => Ok(true),
        Some("false") | Some("0") | Some("") => Ok(false),
        Some(other) => Err(err(format!(
            "parameter '{key}' must be a boolean, got '{other}'"
        ))),
    }
}
