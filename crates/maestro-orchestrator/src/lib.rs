//! In-memory multi-agent scheduler.
//!
//! Matches declared tasks to idle agents by capability, honours task
//! dependencies, supervises each agent invocation and keeps an execution
//! history. All state lives for the lifetime of the process only.
//!
//! # Main types
//!
//! - [`Orchestrator`]: The coordinator; every operation goes through it.
//! - [`AgentRegistry`]: Registered agents in registration order.
//! - [`TaskStore`]: Task records and their state machine.
//! - [`ExecutionHistory`]: Bounded log of finished executions.
//! - [`AgentHandler`]: The work an agent performs.
//! - [`CapabilityVocabulary`]: The closed set of capability tags.

/// Capability vocabulary and validation.
pub mod capability;
/// Orchestrator, assignment and execution.
pub mod engine;
/// Agent handler boundary.
pub mod handler;
/// Execution history log.
pub mod history;
/// Orchestrator configuration.
pub mod config;
/// Stock agent profiles.
pub mod profiles;
/// Agent registry.
pub mod registry;
/// Task records and dependency checks.
pub mod task_store;
/// Shared scheduling types (Agent, Task, Workflow, ...).
pub mod types;
/// Workflow definitions and sequential runs.
pub mod workflow;

pub use capability::{CapabilityVocabulary, DEFAULT_CAPABILITIES};
pub use config::OrchestratorConfig;
pub use engine::{AgentLease, Assignment, Orchestrator, TaskStatusReport};
pub use handler::{AgentHandler, Invocation, SimulatedHandler};
pub use history::ExecutionHistory;
pub use profiles::default_profiles;
pub use registry::{AgentRegistry, AgentStatusReport};
pub use task_store::{TaskStore, TaskSummary};
pub use types::{
    Agent, AgentKind, AgentProfile, AgentStatus, DependencyRef, ExecutionRecord, FailurePolicy,
    NewTask, Task, TaskOutcome, TaskSpec, TaskStatus, UnavailableReason, Workflow,
    DEFAULT_PRIORITY,
};
pub use workflow::{WorkflowRun, WorkflowRunStatus, WorkflowStatusReport, WorkflowStore};
