//! The MCP dispatcher: request routing and the stdio run loop.
//!
//! The run loop reads newline-delimited JSON-RPC from the reader. Pure
//! requests (listing, resource reads) are answered inline; `tools/call`
//! blocks on child processes, so each one runs on its own worker thread and
//! responses are funneled through a channel to a single writer. Completion
//! order, not submission order, decides response order; callers correlate
//! by request id.

pub mod protocol;
pub mod resources;
pub mod tools;

use std::io::{BufRead, Write};
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use serde_json::{Value, json};

use crate::config::{LoggingConfig, ResolvedConfig, ResolvedShellConfig};
use crate::logs::LogStore;

use protocol::{JsonRpcRequest, JsonRpcResponse};

/// Process-wide state shared by all requests. The shell map is immutable
/// after startup; the current directory and the log store synchronize
/// internally.
pub struct ServerState {
    config: ResolvedConfig,
    pub current_dir: Mutex<Option<String>>,
    pub logs: Arc<LogStore>,
}

impl ServerState {
    pub fn new(config: ResolvedConfig, logs: Arc<LogStore>) -> ServerState {
        let current_dir = Mutex::new(config.initial_dir.clone());
        ServerState {
            config,
            current_dir,
            logs,
        }
    }

    pub fn shells(&self) -> &IndexMap<String, ResolvedShellConfig> {
        &self.config.shells
    }

    pub fn logging(&self) -> &LoggingConfig {
        &self.config.logging
    }

    pub fn sanitized_config(&self) -> Value {
        crate::config::sanitized(&self.config)
    }

    pub fn any_shell_restricts(&self) -> bool {
        self.config
            .shells
            .values()
            .any(|cfg| cfg.security.restrict_working_directory)
    }
}

pub struct McpServer {
    state: Arc<ServerState>,
}

impl McpServer {
    pub fn new(state: Arc<ServerState>) -> McpServer {
        McpServer { state }
    }

    /// Handle one decoded request. Returns `None` for notifications.
    pub fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let id = request.id.clone().unwrap_or(Value::Null);
        let response = match request.method.as_str() {
            "initialize" => JsonRpcResponse::result(id, self.initialize(&request.params)),
            "ping" => JsonRpcResponse::result(id, json!({})),
            "tools/list" => JsonRpcResponse::result(id, tools::list(&self.state)),
            "tools/call" => self.tools_call(id, &request.params),
            "resources/list" => JsonRpcResponse::result(id, resources::list(&self.state)),
            "resources/read" => self.resources_read(id, &request.params),
            method if method.starts_with("notifications/") => return None,
            other => {
                if request.is_notification() {
                    return None;
                }
                JsonRpcResponse::error(
                    id,
                    protocol::METHOD_NOT_FOUND,
                    format!("method '{other}' not found"),
                )
            }
        };
        if request.is_notification() {
            None
        } else {
            Some(response)
        }
    }

    fn initialize(&self, params: &Value) -> Value {
        let requested = params
            .get("protocolVersion")
            .and_then(Value::as_str)
            .unwrap_or(protocol::PROTOCOL_VERSION);
        json!({
            "protocolVersion": requested,
            "capabilities": {
                "tools": {},
                "resources": {},
            },
            "serverInfo": {
                "name": "shellbroker",
                "version": env!("CARGO_PKG_VERSION"),
            },
        })
    }

    fn tools_call(&self, id: Value, params: &Value) -> JsonRpcResponse {
        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return JsonRpcResponse::error(
                id,
                protocol::INVALID_PARAMS,
                "tools/call requires a 'name'",
            );
        };
        let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
        match tools::call(&self.state, name, arguments) {
            Ok(result) => JsonRpcResponse::result(id, result),
            Err((code, message)) => JsonRpcResponse::error(id, code, message),
        }
    }

    fn resources_read(&self, id: Value, params: &Value) -> JsonRpcResponse {
        let Some(uri) = params.get("uri").and_then(Value::as_str) else {
            return JsonRpcResponse::error(
                id,
                protocol::INVALID_PARAMS,
                "resources/read requires a 'uri'",
            );
        };
        match resources::read(&self.state, uri) {
            Ok(result) => JsonRpcResponse::result(id, result),
            Err(e) => e.into_response(id),
        }
    }

    /// Serve newline-delimited JSON-RPC until EOF on the reader.
    ///
    /// Returns once every in-flight worker has finished and its response has
    /// been written, so callers can tear down cleanly afterwards.
    pub fn run<R: BufRead>(&self, reader: R, writer: impl Write + Send + 'static) {
        let (tx, rx) = crossbeam_channel::unbounded::<String>();
        let writer_thread = std::thread::spawn(move || {
            let mut writer = writer;
            for line in rx {
                if writeln!(writer, "{line}").and_then(|_| writer.flush()).is_err() {
                    break;
                }
            }
        });

        for line in reader.lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }

            let request: JsonRpcRequest = match serde_json::from_str(&line) {
                Ok(request) => request,
                Err(e) => {
                    let response = JsonRpcResponse::error(
                        Value::Null,
                        protocol::PARSE_ERROR,
                        format!("parse error: {e}"),
                    );
                    let _ = tx.send(encode(&response));
                    continue;
                }
            };

            if request.method == "tools/call" {
                // Blocks on the child process; run it on its own worker so
                // the dispatcher keeps serving
                let server = McpServer {
                    state: Arc::clone(&self.state),
                };
                let tx = tx.clone();
                std::thread::spawn(move || {
                    if let Some(response) = server.handle_request(request) {
                        let _ = tx.send(encode(&response));
                    }
                });
            } else if let Some(response) = self.handle_request(request) {
                let _ = tx.send(encode(&response));
            }
        }

        // The writer drains until every worker has dropped its sender clone
        drop(tx);
        let _ = writer_thread.join();
    }
}

fn encode(response: &JsonRpcResponse) -> String {
    serde_json::to_string(response).expect("response serializes")
}
