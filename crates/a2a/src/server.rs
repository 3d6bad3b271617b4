//! Axum application: agent card, JSON-RPC dispatch, SSE streaming.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use runtime::{Agent, Backend, RunStep, ToolHost};
use serde_json::Value;
use tokio::sync::mpsc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::Error;
use crate::protocol::{
    AgentCard, Artifact, JsonRpcError, JsonRpcRequest, JsonRpcResponse, Message,
    MessageSendParams, RequestId, Task, TaskIdParams, TaskQueryParams, TaskState, TaskStatus,
    TaskStatusUpdate,
};
use crate::store::TaskStore;

/// Shared server state: the agent, its card, and the task store.
pub struct AppState<B, H> {
    agent: Agent<B, H>,
    card: AgentCard,
    store: TaskStore,
}

/// Build the servable application for an agent.
pub fn router<B, H>(agent: Agent<B, H>, card: AgentCard) -> Router
where
    B: Backend + 'static,
    H: ToolHost + 'static,
{
    let state = Arc::new(AppState {
        agent,
        card,
        store: TaskStore::new(),
    });

    Router::new()
        .route("/.well-known/agent.json", get(agent_card))
        .route("/", post(rpc))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `addr` and serve the application until terminated.
pub async fn serve<B, H>(addr: SocketAddr, agent: Agent<B, H>, card: AgentCard) -> Result<(), Error>
where
    B: Backend + 'static,
    H: ToolHost + 'static,
{
    let app = router(agent, card);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "A2A server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn agent_card<B, H>(State(state): State<Arc<AppState<B, H>>>) -> Json<AgentCard>
where
    B: Backend + 'static,
    H: ToolHost + 'static,
{
    Json(state.card.clone())
}

async fn rpc<B, H>(State(state): State<Arc<AppState<B, H>>>, body: Bytes) -> Response
where
    B: Backend + 'static,
    H: ToolHost + 'static,
{
    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(_) => {
            return Json(JsonRpcResponse::error(None, JsonRpcError::parse_error()))
                .into_response();
        }
    };

    let Some(id) = request.id else {
        return Json(JsonRpcResponse::error(
            None,
            JsonRpcError::invalid_request("missing request id"),
        ))
        .into_response();
    };

    match request.method.as_str() {
        "message/send" => message_send(state, id, request.params).await.into_response(),
        "message/stream" => message_stream(state, id, request.params)
            .await
            .into_response(),
        "tasks/get" => tasks_get(state, id, request.params).await.into_response(),
        "tasks/cancel" => tasks_cancel(state, id, request.params).await.into_response(),
        other => Json(JsonRpcResponse::error(
            Some(id),
            JsonRpcError::method_not_found(other),
        ))
        .into_response(),
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Option<Value>) -> Result<T, JsonRpcError> {
    serde_json::from_value(params.unwrap_or(Value::Null))
        .map_err(|e| JsonRpcError::invalid_params(e.to_string()))
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// A task accepted from an inbound message, plus the text to hand the agent.
struct PendingTask {
    task: Task,
    text: String,
}

fn accept_message(message: Message) -> Result<PendingTask, JsonRpcError> {
    let text = message.text();
    if text.is_empty() {
        return Err(JsonRpcError::invalid_params("message has no text parts"));
    }

    let context_id = message.context_id.clone().unwrap_or_else(new_id);
    let task_id = message.task_id.clone().unwrap_or_else(new_id);

    let mut message = message;
    message.task_id = Some(task_id.clone());
    message.context_id = Some(context_id.clone());

    Ok(PendingTask {
        task: Task::submitted(task_id, context_id, message),
        text,
    })
}

/// Drive the agent over the context transcript and settle the task.
///
/// The transcript is only persisted on success; a failed turn leaves the
/// context as it was so the next message retries from clean state.
async fn run_to_completion<B, H>(
    state: &AppState<B, H>,
    task: &Task,
    text: String,
    mut on_step: impl FnMut(RunStep) + Send,
) -> Task
where
    B: Backend,
    H: ToolHost,
{
    let task_id = task.id.clone();
    let context_id = task.context_id.clone();

    state
        .store
        .update(&task_id, |t| {
            t.status = TaskStatus::now(TaskState::Working);
        })
        .await;

    let mut transcript = state.store.transcript(&context_id).await;
    transcript.push(runtime::Message::user(text));

    let settled = match state.agent.run_observed(&mut transcript, &mut on_step).await {
        Ok(reply) => {
            state.store.set_transcript(&context_id, transcript).await;
            let reply_message = Message::agent_text(reply.clone(), &task_id, &context_id);
            state
                .store
                .update(&task_id, |t| {
                    t.history.push(reply_message.clone());
                    t.artifacts.push(Artifact::text(reply));
                    t.status = TaskStatus::now(TaskState::Completed).with_message(reply_message);
                })
                .await
        }
        Err(error) => {
            warn!(task = %task_id, %error, "agent run failed");
            let failure = Message::agent_text(error.to_string(), &task_id, &context_id);
            state
                .store
                .update(&task_id, |t| {
                    t.status = TaskStatus::now(TaskState::Failed).with_message(failure);
                })
                .await
        }
    };

    settled.unwrap_or_else(|| task.clone())
}

async fn message_send<B, H>(
    state: Arc<AppState<B, H>>,
    id: RequestId,
    params: Option<Value>,
) -> Json<JsonRpcResponse>
where
    B: Backend + 'static,
    H: ToolHost + 'static,
{
    let params: MessageSendParams = match parse_params(params) {
        Ok(params) => params,
        Err(error) => return Json(JsonRpcResponse::error(Some(id), error)),
    };

    let pending = match accept_message(params.message) {
        Ok(pending) => pending,
        Err(error) => return Json(JsonRpcResponse::error(Some(id), error)),
    };

    info!(task = %pending.task.id, context = %pending.task.context_id, "message/send accepted");
    state.store.insert(pending.task.clone()).await;

    let task = run_to_completion(&state, &pending.task, pending.text, |_| {}).await;

    match serde_json::to_value(&task) {
        Ok(result) => Json(JsonRpcResponse::success(id, result)),
        Err(error) => Json(JsonRpcResponse::error(
            Some(id),
            JsonRpcError::internal(error.to_string()),
        )),
    }
}

async fn message_stream<B, H>(
    state: Arc<AppState<B, H>>,
    id: RequestId,
    params: Option<Value>,
) -> Response
where
    B: Backend + 'static,
    H: ToolHost + 'static,
{
    let params: MessageSendParams = match parse_params(params) {
        Ok(params) => params,
        Err(error) => return Json(JsonRpcResponse::error(Some(id), error)).into_response(),
    };

    let pending = match accept_message(params.message) {
        Ok(pending) => pending,
        Err(error) => return Json(JsonRpcResponse::error(Some(id), error)).into_response(),
    };

    info!(task = %pending.task.id, context = %pending.task.context_id, "message/stream accepted");
    state.store.insert(pending.task.clone()).await;

    let initial = pending.task.clone();
    let (tx, mut rx) = mpsc::unbounded_channel::<TaskStatusUpdate>();

    let run_state = state.clone();
    let run_task = pending.task;
    let text = pending.text;
    tokio::spawn(async move {
        let step_task = run_task.clone();
        let step_tx = tx.clone();
        let on_step = move |step: RunStep| {
            let note = match step {
                RunStep::ToolCall { name } => format!("Calling tool {name}"),
                RunStep::ToolResult { name, ok: true } => format!("Tool {name} returned"),
                RunStep::ToolResult { name, ok: false } => format!("Tool {name} failed"),
            };
            let message = Message::agent_text(note, &step_task.id, &step_task.context_id);
            let status = TaskStatus::now(TaskState::Working).with_message(message);
            let _ = step_tx.send(TaskStatusUpdate::new(&step_task, status, false));
        };

        let _ = tx.send(TaskStatusUpdate::new(
            &run_task,
            TaskStatus::now(TaskState::Working),
            false,
        ));

        let finished = run_to_completion(&run_state, &run_task, text, on_step).await;
        let final_status = finished.status.clone();
        let _ = tx.send(TaskStatusUpdate::new(&finished, final_status, true));
    });

    let stream = async_stream::stream! {
        if let Some(event) = rpc_event(&id, serde_json::to_value(&initial)) {
            yield Ok::<Event, Infallible>(event);
        }
        while let Some(update) = rx.recv().await {
            let is_final = update.is_final;
            if let Some(event) = rpc_event(&id, serde_json::to_value(&update)) {
                yield Ok(event);
            }
            if is_final {
                break;
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new()).into_response()
}

/// Wrap a result payload in a JSON-RPC response and frame it as an SSE event.
fn rpc_event(id: &RequestId, result: Result<Value, serde_json::Error>) -> Option<Event> {
    let response = match result {
        Ok(value) => JsonRpcResponse::success(id.clone(), value),
        Err(error) => {
            JsonRpcResponse::error(Some(id.clone()), JsonRpcError::internal(error.to_string()))
        }
    };

    match Event::default().json_data(&response) {
        Ok(event) => Some(event),
        Err(error) => {
            warn!(%error, "dropping unserializable SSE event");
            None
        }
    }
}

async fn tasks_get<B, H>(
    state: Arc<AppState<B, H>>,
    id: RequestId,
    params: Option<Value>,
) -> Json<JsonRpcResponse>
where
    B: Backend + 'static,
    H: ToolHost + 'static,
{
    let params: TaskQueryParams = match parse_params(params) {
        Ok(params) => params,
        Err(error) => return Json(JsonRpcResponse::error(Some(id), error)),
    };

    let Some(mut task) = state.store.get(&params.id).await else {
        return Json(JsonRpcResponse::error(
            Some(id),
            JsonRpcError::task_not_found(&params.id),
        ));
    };

    if let Some(limit) = params.history_length {
        if task.history.len() > limit {
            task.history = task.history.split_off(task.history.len() - limit);
        }
    }

    match serde_json::to_value(&task) {
        Ok(result) => Json(JsonRpcResponse::success(id, result)),
        Err(error) => Json(JsonRpcResponse::error(
            Some(id),
            JsonRpcError::internal(error.to_string()),
        )),
    }
}

async fn tasks_cancel<B, H>(
    state: Arc<AppState<B, H>>,
    id: RequestId,
    params: Option<Value>,
) -> Json<JsonRpcResponse>
where
    B: Backend + 'static,
    H: ToolHost + 'static,
{
    let params: TaskIdParams = match parse_params(params) {
        Ok(params) => params,
        Err(error) => return Json(JsonRpcResponse::error(Some(id), error)),
    };

    let Some(task) = state.store.get(&params.id).await else {
        return Json(JsonRpcResponse::error(
            Some(id),
            JsonRpcError::task_not_found(&params.id),
        ));
    };

    if task.status.state.is_terminal() {
        return Json(JsonRpcResponse::error(
            Some(id),
            JsonRpcError::task_not_cancelable(&params.id),
        ));
    }

    let canceled = state
        .store
        .update(&params.id, |t| {
            t.status = TaskStatus::now(TaskState::Canceled);
        })
        .await
        .unwrap_or(task);

    match serde_json::to_value(&canceled) {
        Ok(result) => Json(JsonRpcResponse::success(id, result)),
        Err(error) => Json(JsonRpcResponse::error(
            Some(id),
            JsonRpcError::internal(error.to_string()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{AgentCapabilities, AgentSkill};
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use runtime::{AgentDefinition, EmptyToolHost, ModelError, ModelRequest, ModelResponse, Usage};
    use serde_json::json;
    use tower::ServiceExt;

    /// Replies with the transcript length, making context continuity visible.
    struct CountingBackend;

    impl Backend for CountingBackend {
        async fn call(
            &self,
            request: ModelRequest<'_>,
        ) -> Result<ModelResponse, ModelError> {
            Ok(ModelResponse {
                message: runtime::Message::assistant(format!(
                    "seen {} messages",
                    request.messages.len()
                )),
                usage: Usage::default(),
            })
        }
    }

    fn test_card() -> AgentCard {
        AgentCard {
            name: "currency_agent".into(),
            description: "An agent that can help with currency conversions".into(),
            url: "http://localhost:10000/".into(),
            version: "0.1.0".into(),
            capabilities: AgentCapabilities { streaming: true },
            default_input_modes: vec!["text/plain".into()],
            default_output_modes: vec!["text/plain".into()],
            skills: vec![AgentSkill {
                id: "exchange_rates".into(),
                name: "Exchange rates".into(),
                description: "Look up currency exchange rates".into(),
                tags: vec!["currency".into()],
                examples: Vec::new(),
            }],
        }
    }

    fn test_router() -> Router {
        let definition = AgentDefinition {
            name: "currency_agent".into(),
            description: "test".into(),
            instruction: "currency only".into(),
            model: "gemini-2.5-flash".into(),
            tool_sources: Vec::new(),
        };
        let agent = Agent::new(definition, CountingBackend, EmptyToolHost);
        router(agent, test_card())
    }

    async fn rpc_call(app: Router, body: Value) -> Value {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn send_request(id: i64, text: &str, context_id: Option<&str>) -> Value {
        let mut message = json!({
            "role": "user",
            "parts": [{"kind": "text", "text": text}],
            "messageId": format!("m-{id}"),
        });
        if let Some(context_id) = context_id {
            message["contextId"] = json!(context_id);
        }
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "message/send",
            "params": {"message": message},
        })
    }

    #[tokio::test]
    async fn serves_agent_card() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .uri("/.well-known/agent.json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let card: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(card["name"], "currency_agent");
        assert_eq!(card["capabilities"]["streaming"], true);
        assert_eq!(card["defaultInputModes"][0], "text/plain");
    }

    #[tokio::test]
    async fn message_send_completes_task() {
        let response = rpc_call(test_router(), send_request(1, "1 USD in EUR?", None)).await;

        let task = &response["result"];
        assert_eq!(task["kind"], "task");
        assert_eq!(task["status"]["state"], "completed");
        assert_eq!(
            task["status"]["message"]["parts"][0]["text"],
            "seen 1 messages"
        );
        assert_eq!(task["artifacts"][0]["parts"][0]["text"], "seen 1 messages");
        // user message + agent reply
        assert_eq!(task["history"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn same_context_continues_the_conversation() {
        let app = test_router();

        let first = rpc_call(app.clone(), send_request(1, "first", Some("ctx-7"))).await;
        assert_eq!(
            first["result"]["status"]["message"]["parts"][0]["text"],
            "seen 1 messages"
        );

        // Transcript now holds user + assistant; the follow-up sees three.
        let second = rpc_call(app, send_request(2, "second", Some("ctx-7"))).await;
        assert_eq!(
            second["result"]["status"]["message"]["parts"][0]["text"],
            "seen 3 messages"
        );
    }

    #[tokio::test]
    async fn tasks_get_round_trips_and_truncates_history() {
        let app = test_router();

        let sent = rpc_call(app.clone(), send_request(1, "hello", None)).await;
        let task_id = sent["result"]["id"].as_str().unwrap().to_string();

        let fetched = rpc_call(
            app.clone(),
            json!({
                "jsonrpc": "2.0", "id": 2, "method": "tasks/get",
                "params": {"id": task_id},
            }),
        )
        .await;
        assert_eq!(fetched["result"]["id"].as_str().unwrap(), task_id);
        assert_eq!(fetched["result"]["history"].as_array().unwrap().len(), 2);

        let truncated = rpc_call(
            app,
            json!({
                "jsonrpc": "2.0", "id": 3, "method": "tasks/get",
                "params": {"id": task_id, "historyLength": 1},
            }),
        )
        .await;
        assert_eq!(truncated["result"]["history"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_task_is_an_error() {
        let response = rpc_call(
            test_router(),
            json!({
                "jsonrpc": "2.0", "id": 1, "method": "tasks/get",
                "params": {"id": "no-such-task"},
            }),
        )
        .await;
        assert_eq!(response["error"]["code"], -32001);
    }

    #[tokio::test]
    async fn unknown_method_is_an_error() {
        let response = rpc_call(
            test_router(),
            json!({"jsonrpc": "2.0", "id": 1, "method": "tasks/explode"}),
        )
        .await;
        assert_eq!(response["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn malformed_body_is_a_parse_error() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], -32700);
        assert_eq!(body["id"], Value::Null);
    }

    #[tokio::test]
    async fn finished_task_cannot_be_canceled() {
        let app = test_router();

        let sent = rpc_call(app.clone(), send_request(1, "hello", None)).await;
        let task_id = sent["result"]["id"].as_str().unwrap().to_string();

        let response = rpc_call(
            app,
            json!({
                "jsonrpc": "2.0", "id": 2, "method": "tasks/cancel",
                "params": {"id": task_id},
            }),
        )
        .await;
        assert_eq!(response["error"]["code"], -32002);
    }

    #[tokio::test]
    async fn message_stream_ends_with_final_update() {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 9,
            "method": "message/stream",
            "params": {"message": {
                "role": "user",
                "parts": [{"kind": "text", "text": "stream it"}],
                "messageId": "m-9",
            }},
        });

        let response = test_router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(request.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response
                .headers()
                .get(header::CONTENT_TYPE)
                .unwrap()
                .to_str()
                .unwrap()
                .starts_with("text/event-stream")
        );

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(body.contains("\"kind\":\"task\""));
        assert!(body.contains("\"kind\":\"status-update\""));
        assert!(body.contains("\"final\":true"));
        assert!(body.contains("\"state\":\"completed\""));
    }
}
