use async_trait::async_trait;
use chrono::Utc;
use maestro_core::{AgentId, MaestroResult, TaskId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Everything an agent handler is told about the task it runs.
///
/// Handlers get an owned copy; they never see the coordinator's state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invocation {
    pub task_id: TaskId,
    pub task_type: String,
    pub description: String,
    pub input: serde_json::Value,
    pub agent_id: AgentId,
}

/// The work an agent performs: model inference, tool calls or anything else.
///
/// Returning `Err` (or panicking) marks the task failed; the engine never
/// propagates either to its caller.
#[async_trait]
pub trait AgentHandler: Send + Sync {
    async fn handle(&self, invocation: Invocation) -> MaestroResult<serde_json::Value>;
}

/// Stand-in handler used by the stock agents: waits, then reports success.
#[derive(Debug, Clone)]
pub struct SimulatedHandler {
    agent_name: String,
    delay: Duration,
}

impl SimulatedHandler {
    pub fn new(agent_name: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl AgentHandler for SimulatedHandler {
    async fn handle(&self, invocation: Invocation) -> MaestroResult<serde_json::Value> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(serde_json::json!({
            "agent_id": invocation.agent_id,
            "agent_name": self.agent_name,
            "task_id": invocation.task_id,
            "result": format!("Completed task: {}", invocation.description),
            "status": "success",
            "timestamp": Utc::now().to_rfc3339(),
        }))
    }
}
