use crate::capability::CapabilityVocabulary;
use crate::engine::Orchestrator;
use crate::types::{DependencyRef, FailurePolicy, NewTask, TaskOutcome, TaskSpec, Workflow};
use chrono::{DateTime, Utc};
use maestro_core::{MaestroError, MaestroResult, ResourceKind, TaskId, WorkflowId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Stored workflow definitions, keyed by id in creation order.
pub struct WorkflowStore {
    workflows: BTreeMap<WorkflowId, Workflow>,
    next_seq: u64,
}

impl WorkflowStore {
    pub fn new() -> Self {
        Self {
            workflows: BTreeMap::new(),
            next_seq: 1,
        }
    }

    pub fn insert(
        &mut self,
        name: String,
        description: String,
        tasks: Vec<TaskSpec>,
        on_failure: FailurePolicy,
    ) -> WorkflowId {
        let id = WorkflowId::new(self.next_seq);
        self.next_seq += 1;
        self.workflows.insert(
            id,
            Workflow {
                id,
                name,
                description,
                tasks,
                on_failure,
                created_at: Utc::now(),
            },
        );
        id
    }

    pub fn get(&self, id: WorkflowId) -> MaestroResult<&Workflow> {
        self.workflows
            .get(&id)
            .ok_or_else(|| MaestroError::not_found(ResourceKind::Workflow, id))
    }

    pub fn all(&self) -> Vec<Workflow> {
        self.workflows.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }
}

impl Default for WorkflowStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Check that every step requests a known capability and only depends on earlier steps.
pub fn validate_specs(specs: &[TaskSpec], vocabulary: &CapabilityVocabulary) -> MaestroResult<()> {
    for (step, spec) in specs.iter().enumerate() {
        vocabulary.check(&spec.task_type).map_err(|e| {
            MaestroError::InvalidWorkflow(format!("step {step}: {e}"))
        })?;
        for dep in &spec.dependencies {
            if let DependencyRef::Step(target) = dep {
                if *target >= step {
                    return Err(MaestroError::InvalidWorkflow(format!(
                        "step {step} depends on step {target}, which does not run before it"
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Overall result of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowRunStatus {
    /// Every step completed.
    Completed,
    /// Some steps completed, others failed, timed out, were unavailable or never ran.
    PartialFailure,
    /// No step completed.
    Failed,
}

impl WorkflowRunStatus {
    fn from_results(results: &[TaskOutcome], declared: usize) -> Self {
        let completed = results.iter().filter(|r| r.is_completed()).count();
        if completed == declared {
            WorkflowRunStatus::Completed
        } else if completed == 0 {
            WorkflowRunStatus::Failed
        } else {
            WorkflowRunStatus::PartialFailure
        }
    }
}

/// Report returned by [`Orchestrator::execute_workflow`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub workflow_id: WorkflowId,
    /// One outcome per executed step, in execution order.
    pub results: Vec<TaskOutcome>,
    pub status: WorkflowRunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Either a single workflow or all of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkflowStatusReport {
    Workflow(Workflow),
    All { total: usize, workflows: Vec<Workflow> },
}

impl Orchestrator {
    /// Store a workflow that continues past failed steps.
    pub fn create_workflow(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        tasks: Vec<TaskSpec>,
    ) -> MaestroResult<WorkflowId> {
        self.create_workflow_with_policy(name, description, tasks, FailurePolicy::Continue)
    }

    pub fn create_workflow_with_policy(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        tasks: Vec<TaskSpec>,
        on_failure: FailurePolicy,
    ) -> MaestroResult<WorkflowId> {
        validate_specs(&tasks, &self.vocabulary)?;
        let name = name.into();
        let steps = tasks.len();
        let id = self
            .state
            .lock()
            .workflows
            .insert(name.clone(), description.into(), tasks, on_failure);
        info!(workflow_id = %id, name = %name, steps, "Workflow created");
        Ok(id)
    }

    pub fn workflow_status(&self, id: Option<WorkflowId>) -> MaestroResult<WorkflowStatusReport> {
        let state = self.state.lock();
        match id {
            Some(id) => Ok(WorkflowStatusReport::Workflow(state.workflows.get(id)?.clone())),
            None => Ok(WorkflowStatusReport::All {
                total: state.workflows.len(),
                workflows: state.workflows.all(),
            }),
        }
    }

    /// Run a workflow's steps strictly in declared order.
    ///
    /// Each step's task is created and assigned in one critical section, then
    /// awaited to a terminal state before the next step is created, so step
    /// references always point at finished tasks.
    pub async fn execute_workflow(&self, id: WorkflowId) -> MaestroResult<WorkflowRun> {
        let workflow = self.state.lock().workflows.get(id)?.clone();
        let started_at = Utc::now();
        info!(workflow_id = %id, name = %workflow.name, steps = workflow.tasks.len(), "Workflow started");

        let mut created: Vec<TaskId> = Vec::with_capacity(workflow.tasks.len());
        let mut results = Vec::with_capacity(workflow.tasks.len());

        for (step, spec) in workflow.tasks.iter().enumerate() {
            let dependencies = spec
                .dependencies
                .iter()
                .map(|dep| match *dep {
                    DependencyRef::Task(task_id) => Ok(task_id),
                    DependencyRef::Step(target) => created.get(target).copied().ok_or_else(|| {
                        MaestroError::InvalidWorkflow(format!(
                            "step {step} depends on step {target}, which has not run"
                        ))
                    }),
                })
                .collect::<MaestroResult<Vec<TaskId>>>()?;

            let mut new_task = NewTask::new(&spec.task_type, &spec.description)
                .with_input(spec.input.clone())
                .with_dependencies(dependencies);
            if let Some(priority) = spec.priority {
                new_task = new_task.with_priority(priority);
            }

            let (task_id, assignment) = {
                self.vocabulary.check(&new_task.task_type)?;
                let mut state = self.state.lock();
                let task_id = state.tasks.create(new_task).id;
                let assignment = self.assign_locked(&mut state, task_id)?;
                (task_id, assignment)
            };
            created.push(task_id);

            let outcome = self.drive(task_id, assignment).await?;
            let completed = outcome.is_completed();
            results.push(outcome);

            if !completed {
                warn!(workflow_id = %id, step, task_id = %task_id, "Workflow step did not complete");
                if workflow.on_failure == FailurePolicy::Stop {
                    warn!(workflow_id = %id, step, "Halting workflow");
                    break;
                }
            }
        }

        let status = WorkflowRunStatus::from_results(&results, workflow.tasks.len());
        info!(workflow_id = %id, status = ?status, executed = results.len(), "Workflow finished");
        Ok(WorkflowRun {
            workflow_id: id,
            results,
            status,
            started_at,
            finished_at: Utc::now(),
        })
    }
}
