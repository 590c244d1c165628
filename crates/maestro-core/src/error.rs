use thiserror::Error;

/// A convenience `Result` alias using [`MaestroError`].
pub type MaestroResult<T> = Result<T, MaestroError>;

/// The kind of record a lookup was made against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// A registered agent.
    Agent,
    /// A task record.
    Task,
    /// A workflow definition.
    Workflow,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Agent => write!(f, "agent"),
            ResourceKind::Task => write!(f, "task"),
            ResourceKind::Workflow => write!(f, "workflow"),
        }
    }
}

/// Top-level error type for the Maestro scheduler.
///
/// Contention for agents is *not* an error: it is reported as an
/// `Unavailable` outcome by the orchestrator. Failures inside an agent handler
/// are absorbed into the task's terminal state and only surface here as
/// [`MaestroError::Handler`] on the handler boundary itself.
#[derive(Debug, Error)]
pub enum MaestroError {
    /// A referenced agent, task or workflow does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What was looked up.
        kind: ResourceKind,
        /// The identifier that failed to resolve.
        id: String,
    },

    /// A task state change that the state machine does not allow.
    #[error("Invalid task transition: {from} -> {to}")]
    InvalidTransition {
        /// Current status.
        from: String,
        /// Requested status.
        to: String,
    },

    /// A capability tag outside the configured vocabulary.
    #[error("Capability error: {0}")]
    InvalidCapability(String),

    /// The agent holds an in-flight task and cannot be replaced or removed.
    #[error("Agent busy: {0}")]
    AgentBusy(String),

    /// A workflow definition that cannot be executed as written.
    #[error("Workflow error: {0}")]
    InvalidWorkflow(String),

    /// An error raised by an agent handler during invocation.
    #[error("Handler error: {0}")]
    Handler(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MaestroError {
    /// Shorthand for a [`MaestroError::NotFound`].
    pub fn not_found(kind: ResourceKind, id: impl ToString) -> Self {
        MaestroError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Whether this error is a failed lookup.
    pub fn is_not_found(&self) -> bool {
        matches!(self, MaestroError::NotFound { .. })
    }
}
