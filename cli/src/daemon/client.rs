// Copyright (c) 2026 XMRT DAO Contributors
// SPDX-License-Identifier: AGPL-3.0

//! HTTP client for communicating with daemon API

use anyhow::{Context, Result};
use colored::Colorize;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_stream::StreamExt;

use xmrt_core::application::registry::{AgentLiveness, RegistryEntry};
use xmrt_core::application::task_manager::{AgentStatus, CompletionOutcome};
use xmrt_core::domain::agent::Agent;
use xmrt_core::domain::message::{AgentMessage, MessageId, MessagePriority, MessageType};
use xmrt_core::domain::task::{NewTask, Specialization, Task, TaskId};
use xmrt_core::presentation::api::{BulkCreateItem, HealthResponse, SystemStatusResponse};

use super::base_url;

#[derive(Debug, Clone)]
pub struct DaemonClient {
    client: Client,
    base_url: String,
}

/// Query filters for `GET /api/tasks`.
#[derive(Debug, Clone, Default)]
pub struct TaskListFilter {
    pub status: Option<String>,
    pub specialization: Option<String>,
    pub priority: Option<String>,
    pub agent: Option<String>,
}

impl TaskListFilter {
    fn query_pairs(&self) -> Vec<(&'static str, &str)> {
        [
            ("status", &self.status),
            ("specialization", &self.specialization),
            ("priority", &self.priority),
            ("agent", &self.agent),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.as_deref().map(|v| (key, v)))
        .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentRegistration {
    pub id: String,
    pub name: String,
    pub specialization: Specialization,
    pub capabilities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent_tasks: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutgoingMessage {
    pub sender: String,
    pub receiver: String,
    pub content: String,
    pub message_type: MessageType,
    pub priority: MessagePriority,
    pub requires_response: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentDetails {
    pub scheduling: AgentStatus,
    pub registry: Option<RegistryEntry>,
}

async fn read_json<T: DeserializeOwned>(response: Response, action: &str) -> Result<T> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v["error"].as_str().map(str::to_string))
            .unwrap_or(body);
        anyhow::bail!("Failed to {} ({}): {}", action, status, message);
    }

    response
        .json()
        .await
        .with_context(|| format!("Failed to parse response to {}", action))
}

impl DaemonClient {
    pub fn new(host: &str, port: u16) -> Result<Self> {
        let client = Client::builder()
            // No global timeout: inbox waits and event streams are long-lived
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url(host, port),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, action: &str) -> Result<T> {
        self.get_with_query(path, &[] as &[(&str, &str)], action).await
    }

    async fn get_with_query<Q: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        query: &Q,
        action: &str,
    ) -> Result<T> {
        let response = self
            .client
            .get(self.url(path))
            .query(query)
            .send()
            .await
            .with_context(|| format!("Failed to {}", action))?;
        read_json(response, action).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        action: &str,
    ) -> Result<T> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to {}", action))?;
        read_json(response, action).await
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        self.get("/health", "check health").await
    }

    // ---- tasks ----------------------------------------------------------

    pub async fn create_task(&self, task: &NewTask) -> Result<Task> {
        self.post("/api/tasks", task, "create task").await
    }

    pub async fn create_tasks(&self, tasks: &[NewTask]) -> Result<Vec<BulkCreateItem>> {
        self.post("/api/tasks/bulk", &json!({ "tasks": tasks }), "create tasks")
            .await
    }

    pub async fn get_task(&self, task_id: TaskId) -> Result<Task> {
        self.get(&format!("/api/tasks/{}", task_id), "get task").await
    }

    pub async fn list_tasks(&self, filter: &TaskListFilter) -> Result<Vec<Task>> {
        self.get_with_query("/api/tasks", &filter.query_pairs(), "list tasks")
            .await
    }

    pub async fn update_progress(
        &self,
        task_id: TaskId,
        progress: i64,
        result: Option<serde_json::Value>,
    ) -> Result<Task> {
        self.post(
            &format!("/api/tasks/{}/progress", task_id),
            &json!({ "progress": progress, "result": result }),
            "update progress",
        )
        .await
    }

    pub async fn complete_task(
        &self,
        task_id: TaskId,
        result: Option<serde_json::Value>,
    ) -> Result<CompletionOutcome> {
        self.post(
            &format!("/api/tasks/{}/complete", task_id),
            &json!({ "result": result }),
            "complete task",
        )
        .await
    }

    pub async fn fail_task(&self, task_id: TaskId, reason: &str) -> Result<Task> {
        self.post(
            &format!("/api/tasks/{}/fail", task_id),
            &json!({ "reason": reason }),
            "fail task",
        )
        .await
    }

    pub async fn cancel_task(&self, task_id: TaskId) -> Result<Task> {
        let response = self
            .client
            .post(self.url(&format!("/api/tasks/{}/cancel", task_id)))
            .send()
            .await
            .context("Failed to cancel task")?;
        read_json(response, "cancel task").await
    }

    pub async fn reassign_task(&self, task_id: TaskId, reason: Option<&str>) -> Result<Task> {
        self.post(
            &format!("/api/tasks/{}/reassign", task_id),
            &json!({ "reason": reason }),
            "reassign task",
        )
        .await
    }

    // ---- agents ---------------------------------------------------------

    pub async fn list_agents(&self) -> Result<Vec<Agent>> {
        self.get("/api/agents", "list agents").await
    }

    pub async fn get_agent(&self, agent_id: &str) -> Result<AgentDetails> {
        self.get(&format!("/api/agents/{}", agent_id), "get agent").await
    }

    pub async fn register_agent(&self, registration: &AgentRegistration) -> Result<RegistryEntry> {
        self.post("/api/agents", registration, "register agent").await
    }

    pub async fn heartbeat(&self, agent_id: &str, status: AgentLiveness) -> Result<serde_json::Value> {
        self.post(
            &format!("/api/agents/{}/heartbeat", agent_id),
            &json!({ "status": status }),
            "send heartbeat",
        )
        .await
    }

    pub async fn agents_by_capability(&self, capability: &str) -> Result<Vec<RegistryEntry>> {
        self.get(
            &format!("/api/agents/by-capability/{}", capability),
            "look up agents",
        )
        .await
    }

    // ---- messages -------------------------------------------------------

    pub async fn send_message(&self, message: &OutgoingMessage) -> Result<MessageId> {
        #[derive(Deserialize)]
        struct SendResponse {
            message_id: MessageId,
        }

        let response: SendResponse = self.post("/api/messages", message, "send message").await?;
        Ok(response.message_id)
    }

    pub async fn broadcast(
        &self,
        sender: &str,
        content: &str,
        message_type: MessageType,
    ) -> Result<usize> {
        #[derive(Deserialize)]
        struct BroadcastResponse {
            recipients: usize,
        }

        let response: BroadcastResponse = self
            .post(
                "/api/messages/broadcast",
                &json!({ "sender": sender, "content": content, "message_type": message_type }),
                "broadcast message",
            )
            .await?;
        Ok(response.recipients)
    }

    pub async fn inbox(&self, agent_id: &str, wait_ms: Option<u64>) -> Result<Vec<AgentMessage>> {
        let query: Vec<(&str, u64)> = wait_ms.map(|ms| ("timeout_ms", ms)).into_iter().collect();
        self.get_with_query(&format!("/api/agents/{}/inbox", agent_id), &query, "read inbox")
            .await
    }

    pub async fn history(&self, limit: usize) -> Result<Vec<AgentMessage>> {
        self.get_with_query("/api/messages/history", &[("limit", limit)], "read history")
            .await
    }

    // ---- system ---------------------------------------------------------

    pub async fn system_status(&self) -> Result<SystemStatusResponse> {
        self.get("/api/system/status", "get system status").await
    }

    /// Print coordination events until the stream closes.
    pub async fn stream_events(&self, task_id: Option<TaskId>) -> Result<()> {
        let query: Vec<(&str, String)> = task_id
            .map(|id| ("task_id", id.to_string()))
            .into_iter()
            .collect();

        let response = self
            .client
            .get(self.url("/api/events"))
            .query(&query)
            .send()
            .await
            .context("Failed to connect to event stream")?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Failed to stream events: {}", error_text);
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("Failed to read event stream chunk")?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            // Events may be split across chunks; only handle complete lines.
            while let Some(newline) = buffer.find('\n') {
                let line: String = buffer.drain(..=newline).collect();
                if let Some(json_str) = line.trim_end().strip_prefix("data: ") {
                    if let Ok(event) = serde_json::from_str::<serde_json::Value>(json_str) {
                        print_event(&event);
                    }
                }
            }
        }

        Ok(())
    }
}

fn print_event(event: &serde_json::Value) {
    let kind = event["type"].as_str().unwrap_or("unknown");
    let task = event["task_id"].as_str().unwrap_or("");

    match kind {
        "task_created" => println!(
            "{} {} [{}] {}",
            "created".cyan(),
            task,
            event["priority"].as_str().unwrap_or(""),
            event["title"].as_str().unwrap_or("")
        ),
        "task_assigned" => println!(
            "{} {} → {} (score {:.3})",
            "assigned".green(),
            task,
            event["agent_id"].as_str().unwrap_or("?"),
            event["score"].as_f64().unwrap_or(0.0)
        ),
        "assignment_deferred" => println!(
            "{} {} {}",
            "deferred".yellow(),
            task,
            event["failure"]["reason"].as_str().unwrap_or("")
        ),
        "task_progressed" => println!(
            "{} {} {}%",
            "progress".blue(),
            task,
            event["progress"].as_u64().unwrap_or(0)
        ),
        "task_completed" => println!(
            "{} {}{}",
            "completed".green().bold(),
            task,
            if event["on_time"].as_bool() == Some(false) {
                " (late)".yellow().to_string()
            } else {
                String::new()
            }
        ),
        "task_failed" => println!(
            "{} {} {}",
            "failed".red().bold(),
            task,
            event["reason"].as_str().unwrap_or("")
        ),
        "task_reassigned" => println!(
            "{} {} {}",
            "reassigned".magenta(),
            task,
            event["reason"].as_str().unwrap_or("")
        ),
        "coordination_task_spawned" => println!(
            "{} {} for {} ({})",
            "coordination".purple(),
            task,
            event["parent_task_id"].as_str().unwrap_or("?"),
            event["rule"].as_str().unwrap_or("")
        ),
        _ => println!(
            "{} {}",
            kind.dimmed(),
            serde_json::to_string(event).unwrap_or_default().dimmed()
        ),
    }
}
