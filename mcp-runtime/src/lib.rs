use clap::{Args, Subcommand};
use matomo_core::endpoint::EndpointConfig;
use matomo_core::outcome::{ToolOutcome, to_pretty_json};
use serde_json::{Map, Value, json};
use tokio::io::{
    self, AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};

pub mod catalog;
pub mod dispatch;
pub mod gateway;
mod util;

pub use dispatch::Dispatcher;

const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
const MCP_SERVER_NAME: &str = "matomo-mcp-server";

#[derive(Subcommand)]
pub enum McpCommands {
    /// Run the Matomo MCP server over stdio
    Serve,
    /// Print the tool catalog as JSON
    Tools,
    /// Invoke a single tool and print its text result
    Call(McpCallArgs),
}

#[derive(Args, Clone, Debug)]
pub struct McpCallArgs {
    /// Tool name (see `tools`)
    pub tool: String,
    /// Tool arguments as a JSON object
    #[arg(long, default_value = "{}")]
    pub arguments: String,
}

/// Raw connection settings, as read from flags or the environment.
/// Resolution into an [`EndpointConfig`] is deferred so that a missing
/// value fails tool calls rather than startup.
#[derive(Clone, Default)]
pub struct MatomoSettings {
    pub url: Option<String>,
    pub token: Option<String>,
}

impl MatomoSettings {
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::from_endpoint(EndpointConfig::from_settings(
            self.url.as_deref(),
            self.token.as_deref(),
        ))
    }
}

pub async fn run(settings: MatomoSettings, command: McpCommands) -> i32 {
    match command {
        McpCommands::Serve => {
            let server = McpServer::new(settings.dispatcher());
            match server.serve_stdio().await {
                Ok(()) => 0,
                Err(err) => {
                    tracing::error!(error = %err, "mcp server stopped");
                    1
                }
            }
        }
        McpCommands::Tools => {
            println!("{}", to_pretty_json(&catalog::tools_list_payload()));
            0
        }
        McpCommands::Call(args) => {
            let arguments = match serde_json::from_str::<Value>(&args.arguments) {
                Ok(Value::Object(map)) => map,
                Ok(_) => {
                    eprintln!("Error: --arguments must be a JSON object");
                    return 2;
                }
                Err(e) => {
                    eprintln!("Error: --arguments is not valid JSON: {e}");
                    return 2;
                }
            };
            let outcome = settings.dispatcher().invoke(&args.tool, &arguments).await;
            println!("{}", outcome.to_text());
            if outcome.is_error() { 1 } else { 0 }
        }
    }
}

/// How a message arrived; replies go back the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    /// One JSON document per line.
    Line,
    /// LSP-style `Content-Length` header block followed by the body.
    ContentLength,
}

pub struct McpServer {
    dispatcher: Dispatcher,
}

impl McpServer {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    pub async fn serve_stdio(&self) -> Result<(), String> {
        if let Some(err) = self.dispatcher.configuration_error() {
            tracing::warn!(error = %err, "Matomo endpoint not configured; tool calls will fail");
        }
        tracing::info!(
            server = MCP_SERVER_NAME,
            version = env!("CARGO_PKG_VERSION"),
            "serving MCP over stdio"
        );
        self.serve(BufReader::new(io::stdin()), io::stdout()).await
    }

    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> Result<(), String>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        loop {
            let incoming = read_message(&mut reader)
                .await
                .map_err(|e| format!("Failed to read MCP message: {e}"))?;
            let Some((payload, framing)) = incoming else {
                break;
            };

            let responses = match serde_json::from_slice::<Value>(&payload) {
                Ok(message) => self.handle_incoming_message(message).await,
                Err(e) => vec![error_response(
                    Value::Null,
                    RpcError::parse_error(format!("Invalid JSON payload: {e}")),
                )],
            };
            for response in responses {
                write_message(&mut writer, &response, framing)
                    .await
                    .map_err(|e| format!("Failed to write MCP response: {e}"))?;
            }
        }
        Ok(())
    }

    async fn handle_incoming_message(&self, incoming: Value) -> Vec<Value> {
        let mut responses = Vec::new();

        if let Some(batch) = incoming.as_array() {
            if batch.is_empty() {
                responses.push(error_response(
                    Value::Null,
                    RpcError::invalid_request("Batch request must not be empty"),
                ));
                return responses;
            }
            for item in batch {
                if let Some(response) = self.handle_single_message(item.clone()).await {
                    responses.push(response);
                }
            }
            return responses;
        }

        if let Some(response) = self.handle_single_message(incoming).await {
            responses.push(response);
        }
        responses
    }

    async fn handle_single_message(&self, incoming: Value) -> Option<Value> {
        let Some(obj) = incoming.as_object() else {
            return Some(error_response(
                Value::Null,
                RpcError::invalid_request("Request must be a JSON object"),
            ));
        };

        if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            let id = obj.get("id").cloned().unwrap_or(Value::Null);
            return Some(error_response(
                id,
                RpcError::invalid_request("jsonrpc must be '2.0'"),
            ));
        }

        let Some(method) = obj.get("method").and_then(Value::as_str) else {
            // A client response; this server never issues requests.
            return None;
        };

        let params = obj.get("params").cloned().unwrap_or(Value::Null);
        match obj.get("id").cloned() {
            Some(id) => Some(match self.handle_request(method, params).await {
                Ok(payload) => success_response(id, payload),
                Err(err) => error_response(id, err),
            }),
            None => {
                tracing::debug!(method, "ignoring notification");
                None
            }
        }
    }

    async fn handle_request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(initialize_payload()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(catalog::tools_list_payload()),
            "tools/call" => self.handle_tools_call(params).await,
            "resources/list" => Ok(json!({ "resources": [] })),
            "prompts/list" => Ok(json!({ "prompts": [] })),
            _ => Err(RpcError::method_not_found(method)),
        }
    }

    async fn handle_tools_call(&self, params: Value) -> Result<Value, RpcError> {
        let params = params
            .as_object()
            .ok_or_else(|| RpcError::invalid_params("tools/call params must be an object"))?;

        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("tools/call requires string field 'name'"))?;

        let args = match params.get("arguments") {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(_) => {
                return Err(RpcError::invalid_params(
                    "tools/call 'arguments' must be an object",
                ));
            }
        };

        let outcome = self.dispatcher.invoke(name, &args).await;
        Ok(build_tool_call_response(&outcome))
    }
}

fn initialize_payload() -> Value {
    json!({
        "protocolVersion": MCP_PROTOCOL_VERSION,
        "capabilities": {
            "tools": {
                "listChanged": false
            }
        },
        "serverInfo": {
            "name": MCP_SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION")
        },
        "instructions": "Matomo web analytics reporting. Every tool needs a site_id; use get_site_info to confirm a site, the get_* reports for common questions, and query_custom_report for any other Matomo Reporting API method."
    })
}

fn build_tool_call_response(outcome: &ToolOutcome) -> Value {
    let content = json!([{ "type": "text", "text": outcome.to_text() }]);
    if outcome.is_error() {
        json!({ "isError": true, "content": content })
    } else {
        json!({ "content": content })
    }
}

#[derive(Debug)]
struct RpcError {
    code: i64,
    message: String,
}

impl RpcError {
    fn parse_error(message: impl Into<String>) -> Self {
        Self {
            code: -32700,
            message: message.into(),
        }
    }

    fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            code: -32600,
            message: message.into(),
        }
    }

    fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("Method not found: {method}"),
        }
    }

    fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: -32602,
            message: message.into(),
        }
    }
}

fn success_response(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

fn error_response(id: Value, error: RpcError) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": error.code,
            "message": error.message
        }
    })
}

/// Read the next message body, skipping blank lines between messages.
/// `Ok(None)` on clean EOF. Bytes are passed through undecoded so that
/// malformed input surfaces as a JSON parse error, not an I/O error.
async fn read_message<R>(reader: &mut R) -> Result<Option<(Vec<u8>, Framing)>, std::io::Error>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let mut line = Vec::new();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_ascii();
        if trimmed.is_empty() {
            continue;
        }
        let content_length = match content_length_header(trimmed) {
            Some(Some(length)) => length,
            // Plain JSON line, or a header with no usable length which is
            // then answered as an unparseable line.
            None | Some(None) => return Ok(Some((trimmed.to_vec(), Framing::Line))),
        };

        // Remaining headers (e.g. Content-Type) up to the blank separator.
        loop {
            let mut header = Vec::new();
            if reader.read_until(b'\n', &mut header).await? == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "Unexpected EOF while reading MCP headers",
                ));
            }
            if header.trim_ascii().is_empty() {
                break;
            }
        }

        let mut payload = vec![0_u8; content_length];
        reader.read_exact(&mut payload).await?;
        return Ok(Some((payload, Framing::ContentLength)));
    }
}

/// `None` if `line` is not a `Content-Length` header, `Some(None)` if it is
/// one with an unusable value.
fn content_length_header(line: &[u8]) -> Option<Option<usize>> {
    const NAME: &[u8] = b"content-length:";
    if line.len() < NAME.len() || !line[..NAME.len()].eq_ignore_ascii_case(NAME) {
        return None;
    }
    Some(
        std::str::from_utf8(&line[NAME.len()..])
            .ok()
            .and_then(|value| value.trim().parse::<usize>().ok()),
    )
}

async fn write_message<W>(
    writer: &mut W,
    value: &Value,
    framing: Framing,
) -> Result<(), std::io::Error>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(value).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Failed to serialize JSON: {e}"),
        )
    })?;
    match framing {
        Framing::Line => {
            writer.write_all(&body).await?;
            writer.write_all(b"\n").await?;
        }
        Framing::ContentLength => {
            let header = format!(
                "Content-Length: {}\r\nContent-Type: application/json\r\n\r\n",
                body.len()
            );
            writer.write_all(header.as_bytes()).await?;
            writer.write_all(&body).await?;
        }
    }
    writer.flush().await?;
    Ok(())
}
