//! MCP stdio server loop.
//!
//! One JSON-RPC message per line. Each request runs on a blocking worker
//! thread (store reads and devtools commands block), so slow calls do not
//! hold up the rest. Responses funnel through a single writer task, which
//! keeps output lines whole.

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AppError;

use super::prompts;
use super::protocol::{JSONRPC_VERSION, PROTOCOL_VERSION, Request, RequestId, Response, RpcError};
use super::tools::{self, ToolCallError, Toolbox};

pub const SERVER_NAME: &str = "phalcon-mcp";

const OUTBOX_CAPACITY: usize = 64;

pub struct McpServer {
    toolbox: Toolbox,
}

impl McpServer {
    pub fn new(toolbox: Toolbox) -> Self {
        Self { toolbox }
    }

    /// Handle one raw line. `None` means nothing to send (notification).
    pub fn handle_line(&self, line: &str) -> Option<Response> {
        match decode_line(line) {
            Ok(request) => self.handle_request(request),
            Err(response) => Some(response),
        }
    }

    /// Handle an already decoded request.
    pub fn handle_request(&self, request: Request) -> Option<Response> {
        match request.id {
            Some(id) => Some(self.dispatch(id, &request.method, request.params)),
            None => {
                debug!(method = %request.method, "notification");
                None
            }
        }
    }

    fn dispatch(&self, id: RequestId, method: &str, params: Value) -> Response {
        debug!(method, ?id, "request");
        match method {
            "initialize" => Response::success(id, initialize_result(&params)),
            "ping" => Response::success(id, json!({})),
            "tools/list" => Response::success(id, tools::catalogue()),
            "tools/call" => self.call_tool(id, params),
            "prompts/list" => Response::success(id, prompts::list()),
            "prompts/get" => {
                let name = params.get("name").and_then(Value::as_str).unwrap_or_default();
                match prompts::get(name) {
                    Some(prompt) => Response::success(id, prompt),
                    None => Response::error(
                        id,
                        RpcError::invalid_params(format!("unknown prompt: '{name}'")),
                    ),
                }
            }
            other => Response::error(id, RpcError::method_not_found(other)),
        }
    }

    fn call_tool(&self, id: RequestId, params: Value) -> Response {
        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return Response::error(id, RpcError::invalid_params("tools/call requires a tool name"));
        };
        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

        match self.toolbox.call(name, arguments) {
            Ok(output) => Response::success(id, output.into_call_result()),
            Err(e @ ToolCallError::UnknownTool(_)) => {
                Response::error(id, RpcError::invalid_params(e.to_string()))
            }
        }
    }

    /// Serve until `reader` hits EOF or `shutdown` fires.
    pub async fn serve<R, W>(
        self: Arc<Self>,
        reader: R,
        mut writer: W,
        shutdown: CancellationToken,
    ) -> Result<(), AppError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbox, mut outbox_rx) = mpsc::channel::<String>(OUTBOX_CAPACITY);

        let writer_task = tokio::spawn(async move {
            while let Some(line) = outbox_rx.recv().await {
                writer.write_all(line.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
            Ok::<(), std::io::Error>(())
        });

        let mut in_flight = JoinSet::new();
        let mut lines = reader.lines();

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("mcp: shutdown requested");
                    break;
                }

                // Reap finished requests.
                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}

                line = lines.next_line() => {
                    let line = match line {
                        Ok(Some(line)) => line,
                        Ok(None) => {
                            info!("mcp: input closed");
                            break;
                        }
                        Err(e) => {
                            warn!("mcp: read error: {e}");
                            break;
                        }
                    };
                    if line.trim().is_empty() {
                        continue;
                    }

                    let server = Arc::clone(&self);
                    let outbox = outbox.clone();
                    in_flight.spawn(async move {
                        let response = match decode_line(&line) {
                            Ok(request) => {
                                let id = request.id.clone();
                                run_blocking(id, move || server.handle_request(request)).await
                            }
                            Err(response) => Some(response),
                        };
                        let Some(response) = response else {
                            return;
                        };
                        match serde_json::to_string(&response) {
                            Ok(encoded) => {
                                if outbox.send(encoded).await.is_err() {
                                    warn!("mcp: writer gone; dropping response");
                                }
                            }
                            Err(e) => warn!("mcp: cannot encode response: {e}"),
                        }
                    });
                }
            }
        }

        // Let in-flight requests finish unless shutdown cuts them off.
        tokio::select! {
            _ = async { while in_flight.join_next().await.is_some() {} } => {}
            _ = shutdown.cancelled() => {}
        }
        drop(in_flight);
        drop(outbox);

        writer_task
            .await
            .map_err(|e| AppError::Protocol(format!("writer task failed: {e}")))??;
        Ok(())
    }
}

/// Parse and check one line. Failures come back as ready-to-send responses.
fn decode_line(line: &str) -> Result<Request, Response> {
    let request = match serde_json::from_str::<Request>(line) {
        Ok(request) => request,
        Err(e) if e.is_syntax() || e.is_eof() => {
            return Err(Response::error(RequestId::Null, RpcError::parse_error(e)));
        }
        Err(e) => {
            return Err(Response::error(
                RequestId::Null,
                RpcError::invalid_request(format!("Invalid Request: {e}")),
            ));
        }
    };

    if request.jsonrpc != JSONRPC_VERSION {
        return Err(Response::error(
            request.id.unwrap_or(RequestId::Null),
            RpcError::invalid_request(format!(
                "Invalid Request: unsupported jsonrpc version '{}'",
                request.jsonrpc
            )),
        ));
    }

    Ok(request)
}

/// Run a handler on the blocking pool. A panicking handler still answers
/// the caller under its own `id`; notifications stay silent.
async fn run_blocking<F>(id: Option<RequestId>, handler: F) -> Option<Response>
where
    F: FnOnce() -> Option<Response> + Send + 'static,
{
    match tokio::task::spawn_blocking(handler).await {
        Ok(response) => response,
        Err(e) => {
            warn!(?id, "mcp: request handler failed: {e}");
            id.map(|id| Response::error(id, RpcError::internal("request handler failed")))
        }
    }
}

fn initialize_result(params: &Value) -> Value {
    let version = params
        .get("protocolVersion")
        .and_then(Value::as_str)
        .unwrap_or(PROTOCOL_VERSION);
    json!({
        "protocolVersion": version,
        "capabilities": {
            "tools": { "listChanged": false },
            "prompts": { "listChanged": false }
        },
        "serverInfo": {
            "name": SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::{DiscoverySources, QueryEngine, StoreRegistry};
    use crate::phalcon::PhalconRunner;
    use crate::mcp::protocol::{
        INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR,
    };

    fn server() -> McpServer {
        let registry = Arc::new(StoreRegistry::new(DiscoverySources::default()));
        McpServer::new(Toolbox::new(
            QueryEngine::new(registry),
            PhalconRunner::new("/nonexistent/phalcon-devtools-bin"),
        ))
    }

    #[test]
    fn initialize_echoes_requested_version() {
        let resp = server()
            .handle_line(
                r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-03-26"}}"#,
            )
            .unwrap();
        let result = resp.result.unwrap();
        assert_eq!(result["protocolVersion"], "2025-03-26");
        assert_eq!(result["serverInfo"]["name"], SERVER_NAME);
    }

    #[test]
    fn notifications_get_no_response() {
        assert!(
            server()
                .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
                .is_none()
        );
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let resp = server().handle_line("{not json").unwrap();
        assert_eq!(resp.error.unwrap().code, PARSE_ERROR);
        assert_eq!(resp.id, RequestId::Null);
    }

    #[test]
    fn wrong_version_is_invalid_request() {
        let resp = server()
            .handle_line(r#"{"jsonrpc":"1.0","id":3,"method":"ping"}"#)
            .unwrap();
        assert_eq!(resp.error.unwrap().code, INVALID_REQUEST);
        assert_eq!(resp.id, RequestId::Number(3));
    }

    #[test]
    fn unknown_method() {
        let resp = server()
            .handle_line(r#"{"jsonrpc":"2.0","id":"x","method":"resources/list"}"#)
            .unwrap();
        assert_eq!(resp.error.unwrap().code, METHOD_NOT_FOUND);
    }

    #[test]
    fn unknown_tool_is_invalid_params() {
        let resp = server()
            .handle_line(
                r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"nope","arguments":{}}}"#,
            )
            .unwrap();
        assert_eq!(resp.error.unwrap().code, INVALID_PARAMS);
    }

    #[test]
    fn prompts_get_help() {
        let resp = server()
            .handle_line(
                r#"{"jsonrpc":"2.0","id":5,"method":"prompts/get","params":{"name":"phalcon_help"}}"#,
            )
            .unwrap();
        assert!(resp.result.unwrap()["messages"].is_array());
    }

    #[tokio::test]
    async fn panicking_handler_keeps_the_request_id() {
        let resp = run_blocking(Some(RequestId::Number(9)), || panic!("handler blew up"))
            .await
            .unwrap();
        assert_eq!(resp.id, RequestId::Number(9));
        assert_eq!(resp.error.unwrap().code, INTERNAL_ERROR);
    }

    #[tokio::test]
    async fn panicking_notification_stays_silent() {
        assert!(run_blocking(None, || panic!("handler blew up")).await.is_none());
    }
}
