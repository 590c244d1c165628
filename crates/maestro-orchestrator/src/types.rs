use chrono::{DateTime, Utc};
use maestro_core::{AgentId, MaestroError, MaestroResult, TaskId, WorkflowId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Priority assigned when a task does not ask for one. Lower values are more urgent.
pub const DEFAULT_PRIORITY: i32 = 5;

/// Declared category of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// Searches for and summarizes material.
    Research,
    /// Compares and evaluates inputs.
    Analysis,
    /// Drafts and edits prose.
    Writing,
    /// Writes, debugs and tests code.
    Coding,
    /// Breaks goals down into steps.
    Planning,
    /// Checks the output of other agents.
    Verification,
    /// Anything else.
    Custom,
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentKind::Research => write!(f, "research"),
            AgentKind::Analysis => write!(f, "analysis"),
            AgentKind::Writing => write!(f, "writing"),
            AgentKind::Coding => write!(f, "coding"),
            AgentKind::Planning => write!(f, "planning"),
            AgentKind::Verification => write!(f, "verification"),
            AgentKind::Custom => write!(f, "custom"),
        }
    }
}

/// Availability of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Idle,
    Busy,
}

/// Static description of an agent, as supplied at registration or in config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: AgentId,
    pub kind: AgentKind,
    pub name: String,
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub model_id: Option<String>,
}

impl AgentProfile {
    pub fn new(
        id: impl Into<AgentId>,
        kind: AgentKind,
        name: impl Into<String>,
        capabilities: &[&str],
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            name: name.into(),
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
            model_id: None,
        }
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }
}

/// A registered agent and its live scheduling state.
///
/// `status` is `Busy` exactly when `current_task` is set; both fields are
/// only changed together by the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub kind: AgentKind,
    pub name: String,
    pub capabilities: BTreeSet<String>,
    pub model_id: Option<String>,
    pub status: AgentStatus,
    pub current_task: Option<TaskId>,
}

impl Agent {
    pub(crate) fn from_profile(profile: AgentProfile, capabilities: BTreeSet<String>) -> Self {
        Self {
            id: profile.id,
            kind: profile.kind,
            name: profile.name,
            capabilities,
            model_id: profile.model_id,
            status: AgentStatus::Idle,
            current_task: None,
        }
    }

    /// Check if the agent advertises the given task type.
    pub fn can_handle(&self, task_type: &str) -> bool {
        self.capabilities.contains(task_type)
    }

    pub fn is_idle(&self) -> bool {
        self.status == AgentStatus::Idle
    }
}

/// Status of a task.
///
/// ```text
/// Pending ──> Running ──> Completed | Failed | TimedOut
///    └──────> Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::TimedOut | TaskStatus::Cancelled
        )
    }

    /// Whether the state machine has an edge from `self` to `next`.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Pending, TaskStatus::Cancelled)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Running, TaskStatus::Failed)
                | (TaskStatus::Running, TaskStatus::TimedOut)
        )
    }

    /// The single transition function: returns `next` or rejects the edge.
    pub fn transition(self, next: TaskStatus) -> MaestroResult<TaskStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(MaestroError::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::TimedOut => write!(f, "timed_out"),
            TaskStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Parameters for creating a task.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub task_type: String,
    pub description: String,
    pub input: serde_json::Value,
    pub priority: Option<i32>,
    pub dependencies: Vec<TaskId>,
}

impl NewTask {
    pub fn new(task_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
            description: description.into(),
            input: serde_json::json!({}),
            priority: None,
            dependencies: Vec::new(),
        }
    }

    pub fn with_input(mut self, input: serde_json::Value) -> Self {
        self.input = input;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_dependencies(mut self, deps: Vec<TaskId>) -> Self {
        self.dependencies = deps;
        self
    }
}

/// A task record. Never deleted; mutated only by the execution engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub task_type: String,
    pub description: String,
    pub input: serde_json::Value,
    /// Lower is more urgent.
    pub priority: i32,
    pub dependencies: Vec<TaskId>,
    pub status: TaskStatus,
    pub assigned_agent: Option<AgentId>,
    pub result: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub(crate) fn new(id: TaskId, spec: NewTask, default_priority: i32) -> Self {
        Self {
            id,
            task_type: spec.task_type,
            description: spec.description,
            input: spec.input,
            priority: spec.priority.unwrap_or(default_priority),
            dependencies: spec.dependencies,
            status: TaskStatus::Pending,
            assigned_agent: None,
            result: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Move to `next`, stamping `started_at` / `completed_at` as appropriate.
    pub(crate) fn transition(&mut self, next: TaskStatus) -> MaestroResult<()> {
        self.status = self.status.transition(next)?;
        let now = Utc::now();
        if next == TaskStatus::Running {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.completed_at = Some(now);
        }
        Ok(())
    }
}

/// How a workflow step names a task it depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyRef {
    /// A task that already exists.
    Task(TaskId),
    /// The task created for an earlier step (zero-based) of the same run.
    Step(usize),
}

/// One step of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    #[serde(rename = "type")]
    pub task_type: String,
    pub description: String,
    #[serde(default = "empty_input")]
    pub input: serde_json::Value,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub dependencies: Vec<DependencyRef>,
}

fn empty_input() -> serde_json::Value {
    serde_json::json!({})
}

impl TaskSpec {
    pub fn new(task_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
            description: description.into(),
            input: empty_input(),
            priority: None,
            dependencies: Vec::new(),
        }
    }

    pub fn with_input(mut self, input: serde_json::Value) -> Self {
        self.input = input;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn depends_on(mut self, dep: DependencyRef) -> Self {
        self.dependencies.push(dep);
        self
    }
}

/// What a workflow run does after a step that did not complete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Run every remaining step.
    #[default]
    Continue,
    /// Halt the run; later steps are never created.
    Stop,
}

/// An immutable, ordered batch of task specifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    pub description: String,
    pub tasks: Vec<TaskSpec>,
    pub on_failure: FailurePolicy,
    pub created_at: DateTime<Utc>,
}

/// One entry of the execution history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: Uuid,
    pub task_id: TaskId,
    pub agent_id: AgentId,
    pub status: TaskStatus,
    pub result: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Why a task could not be assigned right now. Retryable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UnavailableReason {
    /// Some dependencies are missing or not yet completed.
    UnmetDependencies { pending: Vec<TaskId> },
    /// No registered agent is both idle and capable of the task type.
    NoIdleAgent { task_type: String },
}

impl std::fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnavailableReason::UnmetDependencies { pending } => {
                let ids: Vec<String> = pending.iter().map(ToString::to_string).collect();
                write!(f, "unmet dependencies: {}", ids.join(", "))
            }
            UnavailableReason::NoIdleAgent { task_type } => {
                write!(f, "no idle agent for '{task_type}'")
            }
        }
    }
}

/// Result of asking the engine to execute a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TaskOutcome {
    /// The task ran and reached a terminal state (which may be a failure).
    Finished { task: Task },
    /// The task was not assigned and is still pending.
    Unavailable {
        task_id: TaskId,
        reason: UnavailableReason,
    },
}

impl TaskOutcome {
    pub fn task_id(&self) -> TaskId {
        match self {
            TaskOutcome::Finished { task } => task.id,
            TaskOutcome::Unavailable { task_id, .. } => *task_id,
        }
    }

    /// Terminal status, or `None` if the task was never assigned.
    pub fn status(&self) -> Option<TaskStatus> {
        match self {
            TaskOutcome::Finished { task } => Some(task.status),
            TaskOutcome::Unavailable { .. } => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status() == Some(TaskStatus::Completed)
    }
}
