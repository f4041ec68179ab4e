// Copyright (c) 2026 XMRT DAO Contributors
// SPDX-License-Identifier: AGPL-3.0

//! REST + SSE surface over the task manager, registry and message hub.
//! Handlers only translate; all decisions live in `crate::application`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Response, Sse,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::convert::Infallible;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_stream::StreamExt;
use tracing::error;

use crate::application::agent_hub::{AgentHub, HubError};
use crate::application::registry::{AgentLiveness, AgentRegistry, RegistryError};
use crate::application::task_manager::{SystemStatus, TaskFilter, TaskManager};
use crate::domain::agent::{Agent, AgentId};
use crate::domain::message::{AgentMessage, MessagePriority, MessageType};
use crate::domain::task::{NewTask, Specialization, TaskError, TaskId, TaskPriority, TaskStatus};
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::message_queue::{QueueError, QueueHealth};

const DEFAULT_HISTORY_LIMIT: usize = 50;
const MAX_INBOX_WAIT_MS: u64 = 30_000;

pub struct AppState {
    pub manager: Arc<TaskManager>,
    pub hub: Arc<AgentHub>,
    pub registry: Arc<AgentRegistry>,
    pub event_bus: EventBus,
    pub started_at: Instant,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/tasks", post(create_task).get(list_tasks))
        .route("/api/tasks/bulk", post(create_tasks))
        .route("/api/tasks/{id}", get(get_task))
        .route("/api/tasks/{id}/progress", post(update_progress))
        .route("/api/tasks/{id}/complete", post(complete_task))
        .route("/api/tasks/{id}/fail", post(fail_task))
        .route("/api/tasks/{id}/cancel", post(cancel_task))
        .route("/api/tasks/{id}/reassign", post(reassign_task))
        .route("/api/agents", get(list_agents).post(register_agent))
        .route("/api/agents/by-capability/{capability}", get(agents_by_capability))
        .route("/api/agents/{id}", get(agent_status))
        .route("/api/agents/{id}/heartbeat", post(heartbeat))
        .route("/api/agents/{id}/inbox", get(inbox))
        .route("/api/messages", post(send_message))
        .route("/api/messages/broadcast", post(broadcast))
        .route("/api/messages/history", get(history))
        .route("/api/system/status", get(system_status))
        .route("/api/events", get(stream_events))
        .with_state(Arc::new(state))
}

// ---- errors -----------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "Request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<TaskError> for ApiError {
    fn from(e: TaskError) -> Self {
        let message = e.to_string();
        match e {
            TaskError::TaskNotFound(_) | TaskError::AgentNotFound(_) => ApiError::NotFound(message),
            TaskError::UnknownDependency(_)
            | TaskError::Validation(_)
            | TaskError::InvalidTransition { .. } => ApiError::BadRequest(message),
            TaskError::Unassignable { .. } | TaskError::AgentBusy { .. } => {
                ApiError::Conflict(message)
            }
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        let message = e.to_string();
        match e {
            RegistryError::AgentNotFound(_) => ApiError::NotFound(message),
            RegistryError::InvalidCapability(_) | RegistryError::Validation(_) => {
                ApiError::BadRequest(message)
            }
        }
    }
}

impl From<HubError> for ApiError {
    fn from(e: HubError) -> Self {
        let message = e.to_string();
        match e {
            HubError::UnknownReceiver(_) => ApiError::NotFound(message),
            HubError::Queue(QueueError::Unavailable(_)) => ApiError::Unavailable(message),
            HubError::Queue(_) => ApiError::Internal(message),
        }
    }
}

type ApiResult<T> = Result<T, ApiError>;
type SharedState = State<Arc<AppState>>;

fn parse_task_id(raw: &str) -> ApiResult<TaskId> {
    TaskId::from_string(raw).map_err(|_| ApiError::BadRequest(format!("Invalid task id: {}", raw)))
}

fn parse_optional<T>(raw: Option<&str>) -> ApiResult<Option<T>>
where
    T: FromStr<Err = TaskError>,
{
    raw.filter(|s| !s.is_empty())
        .map(|s| s.parse::<T>())
        .transpose()
        .map_err(ApiError::from)
}

// ---- health -----------------------------------------------------------

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub queue: QueueHealth,
}

async fn health(State(state): SharedState) -> Json<HealthResponse> {
    let queue = state.hub.queue_health().await;
    Json(HealthResponse {
        status: if queue.healthy { "healthy" } else { "degraded" }.to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        queue,
    })
}

// ---- tasks ------------------------------------------------------------

async fn create_task(
    State(state): SharedState,
    Json(request): Json<NewTask>,
) -> ApiResult<impl IntoResponse> {
    let task_id = state.manager.create_task(request)?;
    let task = state.manager.get_task(task_id)?;
    Ok((StatusCode::CREATED, Json(task)))
}

#[derive(Deserialize)]
pub struct BulkCreateRequest {
    pub tasks: Vec<NewTask>,
}

#[derive(Serialize, Deserialize)]
pub struct BulkCreateItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

async fn create_tasks(
    State(state): SharedState,
    Json(request): Json<BulkCreateRequest>,
) -> Json<Vec<BulkCreateItem>> {
    let results = state
        .manager
        .create_tasks(request.tasks)
        .into_iter()
        .map(|result| match result {
            Ok(task_id) => BulkCreateItem {
                task_id: Some(task_id),
                error: None,
            },
            Err(e) => BulkCreateItem {
                task_id: None,
                error: Some(e.to_string()),
            },
        })
        .collect();
    Json(results)
}

#[derive(Deserialize, Default)]
pub struct TaskQuery {
    pub status: Option<String>,
    pub specialization: Option<String>,
    pub priority: Option<String>,
    pub agent: Option<String>,
}

async fn list_tasks(
    State(state): SharedState,
    Query(query): Query<TaskQuery>,
) -> ApiResult<impl IntoResponse> {
    let filter = TaskFilter {
        status: parse_optional::<TaskStatus>(query.status.as_deref())?,
        specialization: parse_optional::<Specialization>(query.specialization.as_deref())?,
        priority: parse_optional::<TaskPriority>(query.priority.as_deref())?,
        agent: query.agent.filter(|a| !a.is_empty()).map(AgentId::new),
    };
    Ok(Json(state.manager.list_tasks(&filter)))
}

async fn get_task(State(state): SharedState, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.manager.get_task(parse_task_id(&id)?)?))
}

#[derive(Deserialize)]
pub struct ProgressRequest {
    pub progress: i64,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
}

async fn update_progress(
    State(state): SharedState,
    Path(id): Path<String>,
    Json(request): Json<ProgressRequest>,
) -> ApiResult<impl IntoResponse> {
    let task = state
        .manager
        .update_task_progress(parse_task_id(&id)?, request.progress, request.result)?;
    Ok(Json(task))
}

#[derive(Deserialize, Default)]
pub struct CompleteRequest {
    #[serde(default)]
    pub result: Option<serde_json::Value>,
}

async fn complete_task(
    State(state): SharedState,
    Path(id): Path<String>,
    Json(request): Json<CompleteRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.manager.complete_task(parse_task_id(&id)?, request.result)?))
}

#[derive(Deserialize)]
pub struct FailRequest {
    pub reason: String,
}

async fn fail_task(
    State(state): SharedState,
    Path(id): Path<String>,
    Json(request): Json<FailRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.manager.fail_task(parse_task_id(&id)?, request.reason)?))
}

async fn cancel_task(State(state): SharedState, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.manager.cancel_task(parse_task_id(&id)?)?))
}

#[derive(Deserialize, Default)]
pub struct ReassignRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

async fn reassign_task(
    State(state): SharedState,
    Path(id): Path<String>,
    Json(request): Json<ReassignRequest>,
) -> ApiResult<impl IntoResponse> {
    let reason = request
        .reason
        .unwrap_or_else(|| "manual reassignment".to_string());
    Ok(Json(state.manager.reassign_task(parse_task_id(&id)?, reason)?))
}

// ---- agents -----------------------------------------------------------

async fn list_agents(State(state): SharedState) -> Json<Vec<Agent>> {
    Json(state.manager.list_agents())
}

#[derive(Deserialize)]
pub struct RegisterAgentRequest {
    pub id: String,
    pub name: String,
    pub specialization: Specialization,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub max_concurrent_tasks: Option<usize>,
    #[serde(default)]
    pub endpoint: Option<String>,
}

async fn register_agent(
    State(state): SharedState,
    Json(request): Json<RegisterAgentRequest>,
) -> ApiResult<impl IntoResponse> {
    let id = AgentId::new(request.id);
    let entry = state.registry.register_agent(
        id.clone(),
        request.name.clone(),
        &request.capabilities,
        request.endpoint,
    )?;

    let mut agent = Agent::new(
        id,
        request.name,
        request.specialization,
        entry.capabilities.clone(),
        entry.last_seen,
    );
    if let Some(max) = request.max_concurrent_tasks {
        agent = agent.with_max_concurrent_tasks(max);
    }
    state.manager.register_agent(agent)?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn agent_status(State(state): SharedState, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    let id = AgentId::new(id);
    let scheduling = state.manager.agent_status(&id)?;
    Ok(Json(json!({
        "scheduling": scheduling,
        "registry": state.registry.get_agent(&id),
    })))
}

#[derive(Deserialize, Default)]
pub struct HeartbeatRequest {
    #[serde(default)]
    pub status: Option<AgentLiveness>,
}

/// Liveness report. Only `active` agents receive new work.
async fn heartbeat(
    State(state): SharedState,
    Path(id): Path<String>,
    Json(request): Json<HeartbeatRequest>,
) -> ApiResult<impl IntoResponse> {
    let id = AgentId::new(id);
    let status = request.status.unwrap_or(AgentLiveness::Active);
    state
        .manager
        .set_agent_availability(&id, status == AgentLiveness::Active)?;
    let entry = if state.registry.contains(&id) {
        Some(state.registry.update_agent_status(&id, status)?)
    } else {
        None
    };
    Ok(Json(json!({ "agent_id": id, "status": status, "registry": entry })))
}

async fn agents_by_capability(
    State(state): SharedState,
    Path(capability): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.registry.get_agents_by_capability(&capability)?))
}

// ---- messages ---------------------------------------------------------

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub sender: String,
    pub receiver: String,
    pub content: String,
    pub message_type: MessageType,
    #[serde(default)]
    pub priority: MessagePriority,
    #[serde(default)]
    pub requires_response: bool,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

async fn send_message(
    State(state): SharedState,
    Json(request): Json<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let mut message = AgentMessage::new(
        AgentId::new(request.sender),
        AgentId::new(request.receiver),
        request.content,
        request.message_type,
    )
    .with_priority(request.priority);
    message.requires_response = request.requires_response;
    message.metadata = request.metadata;

    let message_id = state.hub.send_message(message).await?;
    Ok((StatusCode::CREATED, Json(json!({ "message_id": message_id }))))
}

fn default_broadcast_type() -> MessageType {
    MessageType::Broadcast
}

#[derive(Deserialize)]
pub struct BroadcastRequest {
    pub sender: String,
    pub content: String,
    #[serde(default = "default_broadcast_type")]
    pub message_type: MessageType,
}

async fn broadcast(
    State(state): SharedState,
    Json(request): Json<BroadcastRequest>,
) -> ApiResult<impl IntoResponse> {
    let ids = state
        .hub
        .broadcast(AgentId::new(request.sender), &request.content, request.message_type)
        .await?;
    Ok(Json(json!({ "message_ids": ids, "recipients": ids.len() })))
}

#[derive(Deserialize, Default)]
pub struct InboxQuery {
    /// Wait up to this long for one message instead of draining.
    pub timeout_ms: Option<u64>,
}

async fn inbox(
    State(state): SharedState,
    Path(id): Path<String>,
    Query(query): Query<InboxQuery>,
) -> ApiResult<Json<Vec<AgentMessage>>> {
    let agent = AgentId::new(id);
    let messages = match query.timeout_ms {
        Some(ms) => {
            let wait = Duration::from_millis(ms.min(MAX_INBOX_WAIT_MS));
            state.hub.receive(&agent, Some(wait)).await?.into_iter().collect()
        }
        None => state.hub.drain_inbox(&agent).await?,
    };
    Ok(Json(messages))
}

#[derive(Deserialize, Default)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

async fn history(State(state): SharedState, Query(query): Query<HistoryQuery>) -> Json<Vec<AgentMessage>> {
    Json(state.hub.recent_history(query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT)))
}

// ---- system -----------------------------------------------------------

#[derive(Serialize, Deserialize)]
pub struct SystemStatusResponse {
    #[serde(flatten)]
    pub status: SystemStatus,
    pub queue: QueueHealth,
    pub uptime_seconds: u64,
}

async fn system_status(State(state): SharedState) -> Json<SystemStatusResponse> {
    Json(SystemStatusResponse {
        status: state.manager.system_status(),
        queue: state.hub.queue_health().await,
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

#[derive(Deserialize, Default)]
pub struct EventsQuery {
    pub task_id: Option<String>,
}

async fn stream_events(
    State(state): SharedState,
    Query(query): Query<EventsQuery>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let task_filter = query.task_id.as_deref().map(parse_task_id).transpose()?;
    let stream = state.event_bus.stream(task_filter).filter_map(|event| {
        let data = serde_json::to_string(&event).ok()?;
        Some(Ok(Event::default().event(event.kind()).data(data)))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
