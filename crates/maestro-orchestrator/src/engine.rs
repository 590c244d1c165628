use crate::capability::CapabilityVocabulary;
use crate::config::OrchestratorConfig;
use crate::handler::{AgentHandler, Invocation};
use crate::history::ExecutionHistory;
use crate::registry::{AgentRegistry, AgentStatusReport};
use crate::task_store::{TaskStore, TaskSummary};
use crate::types::{
    Agent, AgentProfile, ExecutionRecord, NewTask, Task, TaskOutcome, TaskStatus,
    UnavailableReason,
};
use crate::workflow::WorkflowStore;
use chrono::Utc;
use maestro_core::{AgentId, MaestroError, MaestroResult, TaskId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Everything the scheduling lock protects.
pub(crate) struct SchedulerState {
    pub(crate) agents: AgentRegistry,
    pub(crate) tasks: TaskStore,
    pub(crate) workflows: WorkflowStore,
    pub(crate) history: ExecutionHistory,
}

impl SchedulerState {
    /// Release the agent, record the task's terminal state and log the execution.
    fn settle(
        &mut self,
        task_id: TaskId,
        agent_id: &AgentId,
        outcome: HandlerOutcome,
    ) -> MaestroResult<Task> {
        if !self.agents.release(agent_id, task_id) {
            warn!(
                task_id = %task_id,
                agent = %agent_id,
                "Agent no longer holds task at completion; treating it as released"
            );
        }

        let (status, result) = outcome.into_parts();
        let task = self.tasks.get_mut(task_id)?;
        task.transition(status)?;
        task.result = Some(result.clone());
        let task = task.clone();

        self.history.append(ExecutionRecord {
            id: Uuid::new_v4(),
            task_id,
            agent_id: agent_id.clone(),
            status,
            result,
            timestamp: Utc::now(),
        });
        Ok(task)
    }
}

/// How a handler invocation ended.
pub(crate) enum HandlerOutcome {
    Success(serde_json::Value),
    Failed(String),
    TimedOut(Duration),
}

impl HandlerOutcome {
    fn from_join(joined: Result<MaestroResult<serde_json::Value>, JoinError>) -> Self {
        match joined {
            Ok(Ok(value)) => HandlerOutcome::Success(value),
            Ok(Err(e)) => HandlerOutcome::Failed(e.to_string()),
            Err(e) if e.is_panic() => {
                HandlerOutcome::Failed(format!("handler panicked: {}", panic_message(e)))
            }
            Err(e) => HandlerOutcome::Failed(format!("handler cancelled: {e}")),
        }
    }

    fn into_parts(self) -> (TaskStatus, serde_json::Value) {
        match self {
            HandlerOutcome::Success(value) => (TaskStatus::Completed, value),
            HandlerOutcome::Failed(reason) => {
                (TaskStatus::Failed, serde_json::json!({ "error": reason }))
            }
            HandlerOutcome::TimedOut(limit) => (
                TaskStatus::TimedOut,
                serde_json::json!({
                    "error": format!("execution timed out after {} ms", limit.as_millis())
                }),
            ),
        }
    }
}

fn panic_message(err: JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string()),
        Err(err) => err.to_string(),
    }
}

/// A task bound to an agent.
///
/// The agent stays busy until the lease is settled. Dropping an unsettled
/// lease fails the task and frees the agent, so every exit path releases it.
pub struct AgentLease {
    state: Arc<Mutex<SchedulerState>>,
    task_id: TaskId,
    agent_id: AgentId,
    handler: Arc<dyn AgentHandler>,
    invocation: Invocation,
    settled: bool,
}

impl AgentLease {
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    fn settle(mut self, outcome: HandlerOutcome) -> MaestroResult<Task> {
        self.settled = true;
        let mut state = self.state.lock();
        state.settle(self.task_id, &self.agent_id, outcome)
    }
}

impl Drop for AgentLease {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        warn!(
            task_id = %self.task_id,
            agent = %self.agent_id,
            "Lease dropped before completion; failing task"
        );
        let mut state = self.state.lock();
        let abandoned = HandlerOutcome::Failed("execution abandoned before completion".to_string());
        if let Err(e) = state.settle(self.task_id, &self.agent_id, abandoned) {
            error!(task_id = %self.task_id, error = %e, "Failed to settle abandoned task");
        }
    }
}

impl std::fmt::Debug for AgentLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentLease")
            .field("task_id", &self.task_id)
            .field("agent_id", &self.agent_id)
            .finish_non_exhaustive()
    }
}

/// Result of an assignment attempt.
#[derive(Debug)]
pub enum Assignment {
    /// The task is running on the leased agent.
    Assigned(AgentLease),
    /// Nothing changed; the caller may retry later.
    Unavailable(UnavailableReason),
}

/// Either a single task or counts over all of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskStatusReport {
    Task(Task),
    Summary(TaskSummary),
}

/// The coordinator: owns agents, tasks, workflows and history behind one lock.
///
/// Cloning is cheap and every clone shares the same state. The lock is only
/// held for map mutations, never while a handler runs.
#[derive(Clone)]
pub struct Orchestrator {
    pub(crate) state: Arc<Mutex<SchedulerState>>,
    pub(crate) vocabulary: Arc<CapabilityVocabulary>,
    timeout: Option<Duration>,
}

impl Orchestrator {
    pub fn new(config: &OrchestratorConfig) -> MaestroResult<Self> {
        let vocabulary = config.vocabulary()?;
        info!(
            capabilities = vocabulary.len(),
            history_limit = config.history_limit,
            timeout_ms = ?config.execution_timeout_ms,
            "Orchestrator created"
        );
        Ok(Self {
            state: Arc::new(Mutex::new(SchedulerState {
                agents: AgentRegistry::new(),
                tasks: TaskStore::new(config.default_priority),
                workflows: WorkflowStore::new(),
                history: ExecutionHistory::new(config.history_limit),
            })),
            vocabulary: Arc::new(vocabulary),
            timeout: config.execution_timeout(),
        })
    }

    pub fn vocabulary(&self) -> &CapabilityVocabulary {
        &self.vocabulary
    }

    // --- Agents ---

    /// Register (or replace an idle) agent backed by `handler`.
    pub fn register_agent(
        &self,
        profile: AgentProfile,
        handler: Arc<dyn AgentHandler>,
    ) -> MaestroResult<()> {
        let capabilities = self.vocabulary.validate_set(&profile.capabilities)?;
        let agent = Agent::from_profile(profile, capabilities);
        self.state.lock().agents.register(agent, handler)?;
        Ok(())
    }

    /// Remove an idle agent. Busy agents are rejected with `AgentBusy`.
    pub fn unregister_agent(&self, id: &AgentId) -> MaestroResult<Agent> {
        self.state.lock().agents.unregister(id)
    }

    pub fn agent_status(&self) -> AgentStatusReport {
        self.state.lock().agents.snapshot()
    }

    // --- Tasks ---

    pub fn create_task(&self, spec: NewTask) -> MaestroResult<Task> {
        self.vocabulary.check(&spec.task_type)?;
        let mut state = self.state.lock();
        let task = state.tasks.create(spec);
        info!(
            task_id = %task.id,
            task_type = %task.task_type,
            priority = task.priority,
            dependencies = task.dependencies.len(),
            "Task created"
        );
        Ok(task.clone())
    }

    pub fn get_task(&self, id: TaskId) -> MaestroResult<Task> {
        self.state.lock().tasks.get(id).cloned()
    }

    pub fn task_status(&self, id: Option<TaskId>) -> MaestroResult<TaskStatusReport> {
        let state = self.state.lock();
        match id {
            Some(id) => Ok(TaskStatusReport::Task(state.tasks.get(id)?.clone())),
            None => Ok(TaskStatusReport::Summary(state.tasks.summary())),
        }
    }

    /// Cancel a task that has not started yet.
    pub fn cancel_task(&self, id: TaskId) -> MaestroResult<Task> {
        let mut state = self.state.lock();
        let task = state.tasks.get_mut(id)?;
        task.transition(TaskStatus::Cancelled)?;
        info!(task_id = %id, "Task cancelled");
        Ok(task.clone())
    }

    /// The last `limit` executions, oldest first.
    pub fn execution_history(&self, limit: usize) -> Vec<ExecutionRecord> {
        self.state.lock().history.recent(limit)
    }

    // --- Assignment ---

    /// Bind a pending, dependency-satisfied task to the first idle capable agent.
    ///
    /// The whole check-and-set runs under the scheduling lock, so concurrent
    /// callers can never claim the same agent.
    pub fn assign(&self, task_id: TaskId) -> MaestroResult<Assignment> {
        let mut state = self.state.lock();
        self.assign_locked(&mut state, task_id)
    }

    pub(crate) fn assign_locked(
        &self,
        state: &mut SchedulerState,
        task_id: TaskId,
    ) -> MaestroResult<Assignment> {
        let task = state.tasks.get(task_id)?;
        task.status.transition(TaskStatus::Running)?;

        let pending = state.tasks.unmet_dependencies(task);
        if !pending.is_empty() {
            debug!(task_id = %task_id, unmet = pending.len(), "Dependencies not satisfied");
            return Ok(Assignment::Unavailable(
                UnavailableReason::UnmetDependencies { pending },
            ));
        }

        let Some(agent_id) = state
            .agents
            .find_idle_capable(&task.task_type)
            .map(|a| a.id.clone())
        else {
            debug!(task_id = %task_id, task_type = %task.task_type, "No idle capable agent");
            return Ok(Assignment::Unavailable(UnavailableReason::NoIdleAgent {
                task_type: task.task_type.clone(),
            }));
        };

        let invocation = Invocation {
            task_id,
            task_type: task.task_type.clone(),
            description: task.description.clone(),
            input: task.input.clone(),
            agent_id: agent_id.clone(),
        };

        let handler = state.agents.claim(&agent_id, task_id).ok_or_else(|| {
            MaestroError::AgentBusy(format!("agent '{agent_id}' was claimed concurrently"))
        })?;

        let started = state.tasks.get_mut(task_id).and_then(|task| {
            task.transition(TaskStatus::Running)?;
            task.assigned_agent = Some(agent_id.clone());
            Ok(())
        });
        if let Err(e) = started {
            state.agents.release(&agent_id, task_id);
            return Err(e);
        }

        info!(task_id = %task_id, agent = %agent_id, "Task assigned");
        Ok(Assignment::Assigned(AgentLease {
            state: Arc::clone(&self.state),
            task_id,
            agent_id,
            handler,
            invocation,
            settled: false,
        }))
    }

    // --- Execution ---

    /// Assign and run a task to completion.
    ///
    /// Unknown ids and illegal transitions are errors. Contention comes back as
    /// [`TaskOutcome::Unavailable`]; handler failures as a finished task in a
    /// failed state.
    pub async fn execute_task(&self, task_id: TaskId) -> MaestroResult<TaskOutcome> {
        let assignment = self.assign(task_id)?;
        self.drive(task_id, assignment).await
    }

    pub(crate) async fn drive(
        &self,
        task_id: TaskId,
        assignment: Assignment,
    ) -> MaestroResult<TaskOutcome> {
        match assignment {
            Assignment::Unavailable(reason) => {
                info!(task_id = %task_id, reason = %reason, "Task unavailable");
                Ok(TaskOutcome::Unavailable { task_id, reason })
            }
            Assignment::Assigned(lease) => {
                let task = self.run_assigned(lease).await?;
                Ok(TaskOutcome::Finished { task })
            }
        }
    }

    /// Invoke the leased agent's handler and record the result.
    ///
    /// The handler runs on its own tokio task, so a panic is contained and a
    /// dropped caller aborts it.
    pub async fn run_assigned(&self, lease: AgentLease) -> MaestroResult<Task> {
        let task_id = lease.task_id;
        let agent_id = lease.agent_id.clone();
        let handler = Arc::clone(&lease.handler);
        let invocation = lease.invocation.clone();
        let start = Instant::now();

        let mut running = JoinSet::new();
        running.spawn(async move { handler.handle(invocation).await });

        let joined = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, running.join_next()).await {
                Ok(joined) => joined,
                Err(_) => {
                    running.abort_all();
                    warn!(task_id = %task_id, agent = %agent_id, timeout_ms = limit.as_millis(), "Task timed out");
                    return lease.settle(HandlerOutcome::TimedOut(limit));
                }
            },
            None => running.join_next().await,
        };

        let outcome = match joined {
            Some(joined) => HandlerOutcome::from_join(joined),
            None => HandlerOutcome::Failed("handler task missing".to_string()),
        };
        if let HandlerOutcome::Failed(reason) = &outcome {
            error!(task_id = %task_id, agent = %agent_id, error = %reason, "Task failed");
        }

        let task = lease.settle(outcome)?;
        info!(
            task_id = %task_id,
            agent = %agent_id,
            status = %task.status,
            duration_ms = start.elapsed().as_millis(),
            "Task finished"
        );
        Ok(task)
    }

    /// Run every ready task that can get an agent right now, concurrently.
    ///
    /// Tasks are assigned most urgent first; those left without an agent are
    /// reported unavailable. Outcomes are returned in task id order.
    pub async fn dispatch_ready(&self) -> Vec<TaskOutcome> {
        let ready = self.state.lock().tasks.ready_by_priority();
        let mut outcomes = Vec::with_capacity(ready.len());
        let mut running = JoinSet::new();

        for task_id in ready {
            match self.assign(task_id) {
                Ok(Assignment::Assigned(lease)) => {
                    let this = self.clone();
                    running.spawn(async move { this.run_assigned(lease).await });
                }
                Ok(Assignment::Unavailable(reason)) => {
                    outcomes.push(TaskOutcome::Unavailable { task_id, reason });
                }
                Err(e) => debug!(task_id = %task_id, error = %e, "Skipping task during dispatch"),
            }
        }

        while let Some(joined) = running.join_next().await {
            match joined {
                Ok(Ok(task)) => outcomes.push(TaskOutcome::Finished { task }),
                Ok(Err(e)) => error!(error = %e, "Dispatched task could not be settled"),
                Err(e) => error!(error = %e, "Dispatch worker failed"),
            }
        }

        outcomes.sort_by_key(TaskOutcome::task_id);
        info!(count = outcomes.len(), "Dispatch round complete");
        outcomes
    }
}
