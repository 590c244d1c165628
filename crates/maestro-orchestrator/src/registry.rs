use crate::handler::AgentHandler;
use crate::types::{Agent, AgentStatus};
use maestro_core::{AgentId, MaestroError, MaestroResult, ResourceKind, TaskId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

struct AgentEntry {
    agent: Agent,
    handler: Arc<dyn AgentHandler>,
}

/// Point-in-time view of the agent pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatusReport {
    pub total: usize,
    pub idle: usize,
    pub busy: usize,
    pub agents: Vec<Agent>,
}

/// Registered agents in registration order.
///
/// Lookups scan linearly; first match in registration order wins.
#[derive(Default)]
pub struct AgentRegistry {
    entries: Vec<AgentEntry>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an agent, replacing an idle entry with the same id in place.
    ///
    /// Returns `true` when an existing entry was replaced. A busy entry is
    /// never replaced, since its in-flight task would lose its agent.
    pub fn register(&mut self, agent: Agent, handler: Arc<dyn AgentHandler>) -> MaestroResult<bool> {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.agent.id == agent.id) {
            if let Some(task_id) = entry.agent.current_task {
                return Err(MaestroError::AgentBusy(format!(
                    "cannot replace agent '{}' while it runs {task_id}",
                    agent.id
                )));
            }
            info!(agent = %agent.id, "Replaced agent registration");
            *entry = AgentEntry { agent, handler };
            return Ok(true);
        }
        info!(agent = %agent.id, kind = %agent.kind, "Registered agent");
        self.entries.push(AgentEntry { agent, handler });
        Ok(false)
    }

    /// Remove an idle agent.
    pub fn unregister(&mut self, id: &AgentId) -> MaestroResult<Agent> {
        let pos = self
            .entries
            .iter()
            .position(|e| &e.agent.id == id)
            .ok_or_else(|| MaestroError::not_found(ResourceKind::Agent, id))?;
        if let Some(task_id) = self.entries[pos].agent.current_task {
            return Err(MaestroError::AgentBusy(format!(
                "cannot unregister agent '{id}' while it runs {task_id}"
            )));
        }
        info!(agent = %id, "Unregistered agent");
        Ok(self.entries.remove(pos).agent)
    }

    pub fn get(&self, id: &AgentId) -> Option<&Agent> {
        self.entries.iter().map(|e| &e.agent).find(|a| &a.id == id)
    }

    /// First idle agent, in registration order, that can handle `task_type`.
    pub fn find_idle_capable(&self, task_type: &str) -> Option<&Agent> {
        self.entries
            .iter()
            .map(|e| &e.agent)
            .find(|a| a.is_idle() && a.can_handle(task_type))
    }

    /// Mark an idle agent busy with `task_id` and hand back its handler.
    pub(crate) fn claim(&mut self, id: &AgentId, task_id: TaskId) -> Option<Arc<dyn AgentHandler>> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| &e.agent.id == id && e.agent.is_idle())?;
        entry.agent.status = AgentStatus::Busy;
        entry.agent.current_task = Some(task_id);
        debug!(agent = %id, task_id = %task_id, "Agent claimed");
        Some(Arc::clone(&entry.handler))
    }

    /// Return an agent to idle if it still holds `task_id`.
    ///
    /// Returns `false` when the agent is gone or holds a different task.
    pub(crate) fn release(&mut self, id: &AgentId, task_id: TaskId) -> bool {
        match self
            .entries
            .iter_mut()
            .find(|e| &e.agent.id == id && e.agent.current_task == Some(task_id))
        {
            Some(entry) => {
                entry.agent.status = AgentStatus::Idle;
                entry.agent.current_task = None;
                debug!(agent = %id, task_id = %task_id, "Agent released");
                true
            }
            None => false,
        }
    }

    pub fn snapshot(&self) -> AgentStatusReport {
        let agents: Vec<Agent> = self.entries.iter().map(|e| e.agent.clone()).collect();
        let busy = agents.iter().filter(|a| !a.is_idle()).count();
        AgentStatusReport {
            total: agents.len(),
            idle: agents.len() - busy,
            busy,
            agents,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
