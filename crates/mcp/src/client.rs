//! Gateway client (streamable HTTP transport, request lifecycle).

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use futures::StreamExt;
use reqwest::header;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcRequest,
    JsonRpcResponse, ListToolsResult, RequestId, Tool,
};

/// Default timeout for a single MCP round trip.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum response body size (1MB).
/// Sized for large tool outputs; anything bigger is treated as a fault.
pub const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Session header defined by the streamable HTTP transport.
const SESSION_HEADER: &str = "Mcp-Session-Id";

/// A remote MCP endpoint: a transport URL plus the routing headers sent with
/// every request.
///
/// The headers exist for shared-ingress deployments where the URL points at a
/// multi-tenant gateway and a `Host` header selects the backend and policy.
/// Endpoints have no identity beyond their URL and headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Endpoint {
    pub url: String,
    pub headers: HashMap<String, String>,
}

impl Endpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
        }
    }

    /// Add a routing header sent with every request to this endpoint.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// An MCP client bound to one remote endpoint.
///
/// `connect` performs no I/O: the URL is not validated and the gateway is not
/// contacted until [`Client::initialize`] runs. A bad endpoint therefore
/// surfaces on the first call, not at construction.
pub struct Client {
    http: reqwest::Client,
    endpoint: Endpoint,
    next_id: AtomicI64,
    session: Mutex<Option<String>>,
    initialized: Mutex<bool>,
    server_info: Mutex<Option<InitializeResult>>,
    tools: Mutex<Vec<Tool>>,
}

impl Client {
    /// Create a client for the given endpoint.
    pub fn connect(endpoint: Endpoint) -> Result<Self> {
        let http = reqwest::Client::builder().build()?;

        Ok(Self {
            http,
            endpoint,
            next_id: AtomicI64::new(1),
            session: Mutex::new(None),
            initialized: Mutex::new(false),
            server_info: Mutex::new(None),
            tools: Mutex::new(Vec::new()),
        })
    }

    /// The endpoint this client talks to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Perform the initialize handshake and fetch the tool list.
    pub async fn initialize(&self) -> Result<InitializeResult> {
        let params = InitializeParams::default();
        let result: InitializeResult = self.request("initialize", Some(params)).await?;

        self.notify("notifications/initialized", None::<()>).await?;

        debug!(
            server = %result.server_info.name,
            protocol = %result.protocol_version,
            "MCP session established"
        );

        *self.server_info.lock().await = Some(result.clone());
        *self.initialized.lock().await = true;

        self.refresh_tools().await?;

        Ok(result)
    }

    /// Whether the initialize handshake has completed.
    pub async fn is_initialized(&self) -> bool {
        *self.initialized.lock().await
    }

    /// Server info from the handshake, if initialized.
    pub async fn server_info(&self) -> Option<InitializeResult> {
        self.server_info.lock().await.clone()
    }

    /// Re-fetch the tool list from the server.
    pub async fn refresh_tools(&self) -> Result<()> {
        let result: ListToolsResult = self.request("tools/list", None::<()>).await?;
        debug!(count = result.tools.len(), "fetched tool list");
        *self.tools.lock().await = result.tools;
        Ok(())
    }

    /// The cached tool list.
    pub async fn tools(&self) -> Vec<Tool> {
        self.tools.lock().await.clone()
    }

    /// Call a tool by name.
    pub async fn call_tool(&self, name: &str, arguments: Option<Value>) -> Result<CallToolResult> {
        if !*self.initialized.lock().await {
            return Err(Error::NotInitialized);
        }

        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };

        let result: CallToolResult = self.request("tools/call", Some(params)).await?;

        // Tool-level failures come back as content with an error flag, not as
        // JSON-RPC errors.
        if result.is_error {
            return Err(Error::ToolCallFailed(result.text()));
        }

        Ok(result)
    }

    // --- Internal methods ---

    fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn request<P, R>(&self, method: &str, params: Option<P>) -> Result<R>
    where
        P: Serialize,
        R: serde::de::DeserializeOwned,
    {
        let id = self.next_request_id();
        let mut request = JsonRpcRequest::new(id.clone(), method);
        if let Some(p) = params {
            request = request.with_params(p);
        }

        let response = timeout(DEFAULT_TIMEOUT, self.round_trip(&request))
            .await
            .map_err(|_| Error::Timeout)??;

        if response.id != id {
            return Err(Error::InvalidResponse(format!(
                "response ID mismatch: expected {id:?}, got {:?}",
                response.id
            )));
        }

        let result_value = response.into_result()?;
        let result: R = serde_json::from_value(result_value)?;

        Ok(result)
    }

    async fn notify<P>(&self, method: &str, params: Option<P>) -> Result<()>
    where
        P: Serialize,
    {
        // Notifications have no ID and expect no body in return.
        let notification = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params.and_then(|p| serde_json::to_value(p).ok()),
        });

        let response = timeout(DEFAULT_TIMEOUT, self.post(&notification))
            .await
            .map_err(|_| Error::Timeout)??;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }

    /// Send one request and decode the JSON-RPC response, whether the server
    /// answers with a plain JSON body or a short-lived event stream.
    async fn round_trip(&self, request: &JsonRpcRequest) -> Result<JsonRpcResponse> {
        let response = self.post(request).await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Status {
                status: status.as_u16(),
                body,
            });
        }

        self.record_session(response.headers()).await;

        let streaming = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/event-stream"));

        if streaming {
            self.scan_event_stream(response, &request.id).await
        } else {
            let body = read_body(response).await?;
            serde_json::from_slice(&body).map_err(|e| Error::InvalidResponse(e.to_string()))
        }
    }

    async fn post<B>(&self, body: &B) -> Result<reqwest::Response>
    where
        B: Serialize,
    {
        let mut req = self
            .http
            .post(&self.endpoint.url)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "application/json, text/event-stream");

        // Routing headers steer the request at a shared ingress. A `Host`
        // entry here deliberately overrides the one derived from the URL.
        for (name, value) in &self.endpoint.headers {
            req = req.header(name.as_str(), value.as_str());
        }

        if let Some(session) = self.session.lock().await.clone() {
            req = req.header(SESSION_HEADER, session);
        }

        Ok(req.json(body).send().await?)
    }

    async fn record_session(&self, headers: &header::HeaderMap) {
        if let Some(session) = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()) {
            *self.session.lock().await = Some(session.to_string());
        }
    }

    /// Scan an SSE body for the event carrying the response to `id`.
    ///
    /// Servers may interleave notifications before the response; those frames
    /// fail to parse as responses and are skipped. The stream is abandoned as
    /// soon as the matching response arrives.
    async fn scan_event_stream(
        &self,
        response: reqwest::Response,
        id: &RequestId,
    ) -> Result<JsonRpcResponse> {
        let mut stream = response.bytes_stream();
        let mut scanner = SseScanner::default();
        let mut total = 0usize;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            total += chunk.len();
            if total > MAX_BODY_SIZE {
                return Err(Error::ResponseTooLarge {
                    size: total,
                    max: MAX_BODY_SIZE,
                });
            }

            for payload in scanner.push(&chunk) {
                if let Ok(response) = serde_json::from_str::<JsonRpcResponse>(&payload) {
                    if &response.id == id {
                        return Ok(response);
                    }
                }
            }
        }

        Err(Error::InvalidResponse(
            "event stream ended before a response arrived".to_string(),
        ))
    }
}

/// Read a non-streaming body, enforcing the size cap.
async fn read_body(response: reqwest::Response) -> Result<Vec<u8>> {
    let mut stream = response.bytes_stream();
    let mut body = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if body.len() + chunk.len() > MAX_BODY_SIZE {
            return Err(Error::ResponseTooLarge {
                size: body.len() + chunk.len(),
                max: MAX_BODY_SIZE,
            });
        }
        body.extend_from_slice(&chunk);
    }

    Ok(body)
}

/// Incremental SSE frame scanner.
///
/// Bytes are buffered until a full frame (terminated by a blank line) is
/// available; the joined `data` lines of each frame are handed back. Byte
/// buffering keeps multi-byte characters split across chunks intact.
#[derive(Default)]
struct SseScanner {
    buf: Vec<u8>,
}

impl SseScanner {
    /// Feed a chunk, returning the data payload of every completed frame.
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some((frame_len, sep_len)) = find_frame_end(&self.buf) {
            let frame: Vec<u8> = self.buf.drain(..frame_len + sep_len).collect();
            if let Some(data) = frame_data(&frame[..frame_len]) {
                payloads.push(data);
            }
        }
        payloads
    }
}

/// Locate the first frame terminator (`\n\n` or `\n\r\n`), returning the
/// frame length and terminator length.
fn find_frame_end(buf: &[u8]) -> Option<(usize, usize)> {
    let mut i = 0;
    while i + 1 < buf.len() {
        if buf[i] == b'\n' {
            if buf[i + 1] == b'\n' {
                return Some((i + 1, 1));
            }
            if i + 2 < buf.len() && buf[i + 1] == b'\r' && buf[i + 2] == b'\n' {
                return Some((i + 1, 2));
            }
        }
        i += 1;
    }
    None
}

/// Join the `data` lines of one frame, or `None` for data-less frames
/// (comments, bare `event:` lines, keep-alives).
fn frame_data(frame: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(frame);
    let mut data_lines = Vec::new();

    for line in text.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
        }
    }

    if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}
