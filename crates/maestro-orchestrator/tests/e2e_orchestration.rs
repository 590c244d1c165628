//! End-to-end scheduling tests.
//!
//! Drives the orchestrator through its public API only: registration,
//! dependency gating, workflows, contention between concurrent callers and
//! agent removal while a task is in flight.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use maestro_core::{AgentId, MaestroError, MaestroResult, TaskId};
use maestro_orchestrator::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Barrier, Notify};

// ---------------------------------------------------------------------------
// Test handlers
// ---------------------------------------------------------------------------

/// Blocks until the test opens the gate.
struct GatedHandler {
    gate: Arc<Notify>,
}

#[async_trait]
impl AgentHandler for GatedHandler {
    async fn handle(&self, invocation: Invocation) -> MaestroResult<serde_json::Value> {
        self.gate.notified().await;
        Ok(serde_json::json!({ "done": invocation.task_id }))
    }
}

/// Fails every task whose input has `"fail": true`.
struct PickyHandler;

#[async_trait]
impl AgentHandler for PickyHandler {
    async fn handle(&self, invocation: Invocation) -> MaestroResult<serde_json::Value> {
        if invocation.input["fail"] == serde_json::json!(true) {
            return Err(MaestroError::Handler(format!(
                "refusing {}",
                invocation.description
            )));
        }
        Ok(serde_json::json!({ "ok": invocation.description }))
    }
}

fn orchestrator() -> Orchestrator {
    Orchestrator::new(&OrchestratorConfig::default()).unwrap()
}

fn with_stock_agents() -> Orchestrator {
    let orch = orchestrator();
    for profile in default_profiles() {
        let handler = Arc::new(SimulatedHandler::new(profile.name.clone()));
        orch.register_agent(profile, handler).unwrap();
    }
    orch
}

fn register(orch: &Orchestrator, id: &str, caps: &[&str], handler: Arc<dyn AgentHandler>) {
    orch.register_agent(AgentProfile::new(id, AgentKind::Custom, id, caps), handler)
        .unwrap();
}

/// At most one running task per agent, and busy iff holding a task.
fn assert_scheduling_invariants(orch: &Orchestrator) {
    let TaskStatusReport::Summary(summary) = orch.task_status(None).unwrap() else {
        panic!("expected summary");
    };
    let agents = orch.agent_status();
    for agent in &agents.agents {
        let running: Vec<TaskId> = summary
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Running && t.assigned_agent.as_ref() == Some(&agent.id))
            .map(|t| t.id)
            .collect();
        assert!(running.len() <= 1, "{} runs {running:?}", agent.id);
        assert_eq!(agent.status == AgentStatus::Busy, agent.current_task.is_some());
        assert_eq!(agent.current_task, running.first().copied());
    }
}

// ---------------------------------------------------------------------------
// Scenario A: single task on a single capable agent
// ---------------------------------------------------------------------------

#[tokio::test]
async fn single_task_runs_on_capable_agent() {
    let orch = orchestrator();
    register(&orch, "A1", &["research"], Arc::new(SimulatedHandler::new("A1")));
    let t1 = orch.create_task(NewTask::new("research", "Survey the field")).unwrap();

    let outcome = orch.execute_task(t1.id).await.unwrap();

    let TaskOutcome::Finished { task } = outcome else {
        panic!("expected the task to run");
    };
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.assigned_agent, Some(AgentId::from("A1")));
    assert_eq!(
        task.result.as_ref().unwrap()["result"],
        "Completed task: Survey the field"
    );

    let agents = orch.agent_status();
    assert_eq!(agents.idle, 1);
    assert!(agents.agents[0].current_task.is_none());

    let history = orch.execution_history(50);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].task_id, t1.id);
    assert_eq!(history[0].agent_id.as_str(), "A1");
}

// ---------------------------------------------------------------------------
// Scenario B: dependency not yet completed
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unmet_dependency_is_unavailable() {
    let orch = orchestrator();
    register(&orch, "A1", &["research"], Arc::new(SimulatedHandler::new("A1")));
    let t1 = orch.create_task(NewTask::new("research", "first")).unwrap();
    let t2 = orch
        .create_task(NewTask::new("research", "second").with_dependencies(vec![t1.id]))
        .unwrap();

    match orch.execute_task(t2.id).await.unwrap() {
        TaskOutcome::Unavailable {
            task_id,
            reason: UnavailableReason::UnmetDependencies { pending },
        } => {
            assert_eq!(task_id, t2.id);
            assert_eq!(pending, vec![t1.id]);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(matches!(
        orch.assign(t2.id).unwrap(),
        Assignment::Unavailable(UnavailableReason::UnmetDependencies { .. })
    ));
    assert_eq!(orch.get_task(t2.id).unwrap().status, TaskStatus::Pending);
    assert_eq!(orch.agent_status().idle, 1);

    // Once the dependency completes the retry goes through.
    orch.execute_task(t1.id).await.unwrap();
    assert!(orch.execute_task(t2.id).await.unwrap().is_completed());
}

#[tokio::test]
async fn failed_dependency_blocks_forever() {
    let orch = orchestrator();
    register(&orch, "P", &["coding"], Arc::new(PickyHandler));
    let t1 = orch
        .create_task(NewTask::new("coding", "bad").with_input(serde_json::json!({"fail": true})))
        .unwrap();
    let t2 = orch
        .create_task(NewTask::new("coding", "after").with_dependencies(vec![t1.id]))
        .unwrap();

    assert_eq!(
        orch.execute_task(t1.id).await.unwrap().status(),
        Some(TaskStatus::Failed)
    );
    assert!(matches!(
        orch.execute_task(t2.id).await.unwrap(),
        TaskOutcome::Unavailable { .. }
    ));
}

#[tokio::test]
async fn unknown_task_is_not_found() {
    let orch = with_stock_agents();
    let err = orch.execute_task(TaskId::new(404)).await.unwrap_err();
    assert!(err.is_not_found());
}

// ---------------------------------------------------------------------------
// Scenario C: sequential workflow with a step dependency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn workflow_runs_steps_in_order() {
    let orch = with_stock_agents();
    let wf = orch
        .create_workflow(
            "report",
            "Research then write",
            vec![
                TaskSpec::new("research", "Collect sources"),
                TaskSpec::new("writing", "Write the report").depends_on(DependencyRef::Step(0)),
            ],
        )
        .unwrap();

    // Creating the workflow creates no tasks.
    let TaskStatusReport::Summary(before) = orch.task_status(None).unwrap() else {
        panic!("expected summary");
    };
    assert_eq!(before.total, 0);

    let run = orch.execute_workflow(wf).await.unwrap();
    assert_eq!(run.workflow_id, wf);
    assert_eq!(run.status, WorkflowRunStatus::Completed);
    assert_eq!(run.results.len(), 2);

    let first = orch.get_task(run.results[0].task_id()).unwrap();
    let second = orch.get_task(run.results[1].task_id()).unwrap();
    assert_eq!(second.dependencies, vec![first.id]);
    assert_eq!(second.assigned_agent, Some(AgentId::from("agent_writing_1")));
    assert!(first.completed_at.unwrap() <= second.started_at.unwrap());

    let history = orch.execution_history(10);
    assert_eq!(history[0].task_id, first.id);
    assert_eq!(history[1].task_id, second.id);

    // The workflow record is unchanged by running it.
    match orch.workflow_status(Some(wf)).unwrap() {
        WorkflowStatusReport::Workflow(w) => assert_eq!(w.tasks.len(), 2),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn workflow_can_depend_on_existing_task() {
    let orch = with_stock_agents();
    let seed = orch.create_task(NewTask::new("search", "seed")).unwrap();
    orch.execute_task(seed.id).await.unwrap();

    let wf = orch
        .create_workflow(
            "follow-up",
            "",
            vec![TaskSpec::new("summarize", "digest").depends_on(DependencyRef::Task(seed.id))],
        )
        .unwrap();
    let run = orch.execute_workflow(wf).await.unwrap();
    assert_eq!(run.status, WorkflowRunStatus::Completed);
}

#[tokio::test]
async fn workflow_continues_and_reports_partial_failure() {
    let orch = orchestrator();
    register(&orch, "P", &["coding", "testing"], Arc::new(PickyHandler));
    let wf = orch
        .create_workflow(
            "build",
            "",
            vec![
                TaskSpec::new("coding", "compile").with_input(serde_json::json!({"fail": true})),
                TaskSpec::new("testing", "unrelated tests"),
                TaskSpec::new("testing", "needs build").depends_on(DependencyRef::Step(0)),
            ],
        )
        .unwrap();

    let run = orch.execute_workflow(wf).await.unwrap();
    assert_eq!(run.results.len(), 3);
    assert_eq!(run.results[0].status(), Some(TaskStatus::Failed));
    assert!(run.results[1].is_completed());
    assert!(matches!(
        run.results[2],
        TaskOutcome::Unavailable {
            reason: UnavailableReason::UnmetDependencies { .. },
            ..
        }
    ));
    assert_eq!(run.status, WorkflowRunStatus::PartialFailure);
}

#[tokio::test]
async fn workflow_stop_policy_halts_after_failure() {
    let orch = orchestrator();
    register(&orch, "P", &["coding"], Arc::new(PickyHandler));
    let wf = orch
        .create_workflow_with_policy(
            "strict",
            "",
            vec![
                TaskSpec::new("coding", "broken").with_input(serde_json::json!({"fail": true})),
                TaskSpec::new("coding", "never created"),
            ],
            FailurePolicy::Stop,
        )
        .unwrap();

    let run = orch.execute_workflow(wf).await.unwrap();
    assert_eq!(run.results.len(), 1);
    assert_eq!(run.status, WorkflowRunStatus::Failed);
    let TaskStatusReport::Summary(summary) = orch.task_status(None).unwrap() else {
        panic!("expected summary");
    };
    assert_eq!(summary.total, 1);
}

#[tokio::test]
async fn unknown_workflow_is_not_found() {
    let orch = orchestrator();
    let err = orch
        .execute_workflow("workflow_9".parse().unwrap())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(orch.workflow_status(Some("workflow_9".parse().unwrap())).is_err());
    match orch.workflow_status(None).unwrap() {
        WorkflowStatusReport::All { total, workflows } => {
            assert_eq!(total, 0);
            assert!(workflows.is_empty());
        }
        other => panic!("unexpected {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Scenario D: two callers, one agent
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_executes_share_one_agent() {
    let orch = orchestrator();
    register(
        &orch,
        "solo",
        &["analysis"],
        Arc::new(SimulatedHandler::new("solo").with_delay(Duration::from_millis(200))),
    );
    let t1 = orch.create_task(NewTask::new("analysis", "one")).unwrap();
    let t2 = orch.create_task(NewTask::new("analysis", "two")).unwrap();

    let (r1, r2) = tokio::join!(orch.execute_task(t1.id), orch.execute_task(t2.id));
    let outcomes = [r1.unwrap(), r2.unwrap()];

    let finished = outcomes.iter().filter(|o| o.is_completed()).count();
    let unavailable = outcomes
        .iter()
        .filter(|o| {
            matches!(
                o,
                TaskOutcome::Unavailable {
                    reason: UnavailableReason::NoIdleAgent { .. },
                    ..
                }
            )
        })
        .count();
    assert_eq!(finished, 1);
    assert_eq!(unavailable, 1);
    assert_scheduling_invariants(&orch);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_executes_across_threads() {
    let orch = orchestrator();
    register(
        &orch,
        "solo",
        &["analysis"],
        Arc::new(SimulatedHandler::new("solo").with_delay(Duration::from_millis(300))),
    );
    let ids: Vec<TaskId> = (0..4)
        .map(|n| orch.create_task(NewTask::new("analysis", format!("t{n}"))).unwrap().id)
        .collect();

    let barrier = Arc::new(Barrier::new(ids.len()));
    let mut handles = Vec::new();
    for id in ids {
        let orch = orch.clone();
        let barrier = Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            orch.execute_task(id).await
        }));
    }

    let mut finished = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap().is_completed() {
            finished += 1;
        }
    }
    assert_eq!(finished, 1);
    assert_eq!(orch.agent_status().idle, 1);
    assert_eq!(orch.execution_history(10).len(), 1);
}

// ---------------------------------------------------------------------------
// Scenario E: removing an agent that holds an in-flight task
// ---------------------------------------------------------------------------

#[tokio::test]
async fn busy_agent_cannot_be_unregistered() {
    let orch = orchestrator();
    let gate = Arc::new(Notify::new());
    register(
        &orch,
        "G",
        &["coding"],
        Arc::new(GatedHandler {
            gate: Arc::clone(&gate),
        }),
    );
    let task = orch.create_task(NewTask::new("coding", "long job")).unwrap();

    let runner = {
        let orch = orch.clone();
        tokio::spawn(async move { orch.execute_task(task.id).await })
    };

    while orch.agent_status().busy == 0 {
        tokio::task::yield_now().await;
    }
    assert_scheduling_invariants(&orch);

    let err = orch.unregister_agent(&AgentId::from("G")).unwrap_err();
    assert!(matches!(err, MaestroError::AgentBusy(_)));
    // Re-registering over the busy id is refused too.
    let err = orch
        .register_agent(
            AgentProfile::new("G", AgentKind::Coding, "G2", &["coding"]),
            Arc::new(PickyHandler),
        )
        .unwrap_err();
    assert!(matches!(err, MaestroError::AgentBusy(_)));

    gate.notify_one();
    let outcome = runner.await.unwrap().unwrap();
    assert!(outcome.is_completed());

    let removed = orch.unregister_agent(&AgentId::from("G")).unwrap();
    assert_eq!(removed.id.as_str(), "G");
    assert_eq!(orch.agent_status().total, 0);
    // The finished task still names its agent.
    assert_eq!(
        orch.get_task(task.id).unwrap().assigned_agent,
        Some(AgentId::from("G"))
    );
}

#[tokio::test]
async fn abandoned_execution_releases_agent() {
    let orch = orchestrator();
    register(
        &orch,
        "G",
        &["coding"],
        Arc::new(GatedHandler {
            gate: Arc::new(Notify::new()),
        }),
    );
    let task = orch.create_task(NewTask::new("coding", "never finishes")).unwrap();

    let result = tokio::time::timeout(Duration::from_millis(50), orch.execute_task(task.id)).await;
    assert!(result.is_err(), "the gated handler never returns");

    let task = orch.get_task(task.id).unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(orch.agent_status().idle, 1);
    assert_scheduling_invariants(&orch);
}

// ---------------------------------------------------------------------------
// Status and history
// ---------------------------------------------------------------------------

#[tokio::test]
async fn history_is_bounded_and_most_recent_last() {
    let config = OrchestratorConfig::default().with_history_limit(3);
    let orch = Orchestrator::new(&config).unwrap();
    register(&orch, "A", &["editing"], Arc::new(SimulatedHandler::new("A")));

    let mut ids = Vec::new();
    for n in 0..5 {
        let task = orch
            .create_task(NewTask::new("editing", format!("pass {n}")))
            .unwrap();
        orch.execute_task(task.id).await.unwrap();
        ids.push(task.id);
    }

    let history = orch.execution_history(50);
    let seen: Vec<TaskId> = history.iter().map(|r| r.task_id).collect();
    assert_eq!(seen, ids[2..].to_vec());
    assert_eq!(orch.execution_history(1)[0].task_id, ids[4]);
}

#[tokio::test]
async fn status_reports_serialize_for_transport() {
    let orch = with_stock_agents();
    let task = orch.create_task(NewTask::new("coding", "fizzbuzz")).unwrap();
    orch.execute_task(task.id).await.unwrap();

    let agents = serde_json::to_value(orch.agent_status()).unwrap();
    assert_eq!(agents["total"], 4);
    assert_eq!(agents["idle"], 4);
    assert_eq!(agents["agents"][0]["id"], "agent_research_1");

    let tasks = serde_json::to_value(orch.task_status(None).unwrap()).unwrap();
    assert_eq!(tasks["completed"], 1);
    assert_eq!(tasks["tasks"][0]["id"], "task_1");
    assert_eq!(tasks["tasks"][0]["status"], "completed");

    let one = serde_json::to_value(orch.task_status(Some(task.id)).unwrap()).unwrap();
    assert_eq!(one["assigned_agent"], "agent_coding_1");
}
