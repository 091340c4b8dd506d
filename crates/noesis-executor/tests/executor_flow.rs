//! End-to-end executor flows over the in-memory store, bus, scripted
//! gateway and stub sandbox.

use noesis_core::bus::{subjects, EventBus, MemoryBus, SharedBus};
use noesis_core::llm::ScriptedGateway;
use noesis_core::store::{keys, MemoryStore, SharedStore, StateStore};
use noesis_core::types::{GoalStatus, GoalType, WorkflowStatus};
use noesis_executor::executor::{ExecuteRequest, ExecutorConfig, IntelligentExecutor};
use noesis_executor::synthesis::CodeSynthesiser;
use noesis_goals::manager::GoalManager;
use noesis_sandbox::{SharedSandbox, StubSandbox};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

const PRIMES: &str = "2 3 5 7 11 13 17 19 23 29";

struct Harness {
    store: SharedStore,
    bus: SharedBus,
    gateway: Arc<ScriptedGateway>,
    sandbox: Arc<StubSandbox>,
    goals: Arc<GoalManager>,
    executor: Arc<IntelligentExecutor>,
}

fn harness_with(config: ExecutorConfig) -> Harness {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let bus: SharedBus = Arc::new(MemoryBus::new());
    let gateway = Arc::new(ScriptedGateway::new());
    let sandbox = Arc::new(StubSandbox::new());
    let goals = Arc::new(GoalManager::new(store.clone(), bus.clone(), "agent_1"));
    let executor = Arc::new(IntelligentExecutor::new(
        store.clone(),
        bus.clone(),
        sandbox.clone() as SharedSandbox,
        CodeSynthesiser::new(gateway.clone(), Duration::from_secs(5)),
        goals.clone(),
        config,
    ));
    Harness {
        store,
        bus,
        gateway,
        sandbox,
        goals,
        executor,
    }
}

fn harness() -> Harness {
    harness_with(ExecutorConfig::default())
}

fn prime_request(force_regenerate: bool) -> ExecuteRequest {
    let mut context = BTreeMap::new();
    context.insert("count".to_string(), "10".to_string());
    context.insert("expected_pattern".to_string(), PRIMES.to_string());
    ExecuteRequest {
        task_name: "PrimeNumberGenerator".to_string(),
        description: "Generate the first 10 prime numbers as a list".to_string(),
        context,
        language: Some("python".to_string()),
        project_id: None,
        force_regenerate,
        max_retries: None,
        timeout: None,
        goal_id: None,
    }
}

const PRIME_CODE: &str = "```python\nout = []\nk = 2\nwhile len(out) < 10:\n    if all(k % p for p in out):\n        out.append(k)\n    k += 1\nprint(' '.join(map(str, out)))\n```";

#[tokio::test]
async fn test_prime_generator_happy_path() {
    let h = harness();
    h.gateway.push_response(PRIME_CODE);
    h.sandbox.push_success(PRIMES);

    let response = h.executor.execute(prime_request(true)).await.unwrap();

    assert!(response.success);
    assert!(response.result.as_deref().unwrap().contains(PRIMES));
    assert!(!response.used_cached_code);
    assert_eq!(response.validation_steps.len(), 1);
    assert!(response.validation_steps[0].passed);

    // A capability is cached under the task name.
    let capability = h
        .executor
        .capabilities()
        .lookup("PrimeNumberGenerator")
        .await
        .unwrap()
        .unwrap();
    assert!(capability.success_count >= 1);
    assert!(capability.code.contains("out.append(k)"));

    // The workflow record reached Completed.
    let record = h
        .executor
        .workflow(response.workflow_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, WorkflowStatus::Completed);
    assert!(record.ended_at.is_some());
}

#[tokio::test]
async fn test_repeated_request_reuses_capability() {
    let h = harness();
    h.gateway.push_response(PRIME_CODE);
    h.sandbox.push_success(PRIMES);
    h.sandbox.push_success(PRIMES);

    let first = h.executor.execute(prime_request(false)).await.unwrap();
    assert!(first.success);

    // Second identical request inside the window: the first workflow is
    // terminal, so this one runs, but reuses the cached code and never
    // calls the gateway again.
    let second = h.executor.execute(prime_request(false)).await.unwrap();
    assert!(second.success);
    assert!(second.used_cached_code);
    assert_eq!(h.gateway.calls(), 1);

    // Still exactly one capability entry.
    let listed = h.executor.capabilities().list().await.unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn test_concurrent_duplicates_have_one_winner() {
    let h = harness();
    h.gateway.push_response(PRIME_CODE);
    // Only the winner reaches the sandbox; the delay keeps it in flight
    // while the twin arrives.
    h.sandbox.push_success(PRIMES);
    h.sandbox.set_delay(Duration::from_millis(50));

    let (a, b) = tokio::join!(
        h.executor.execute(prime_request(false)),
        h.executor.execute(prime_request(false)),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    let mut statuses = Vec::new();
    for response in [&a, &b] {
        let record = h
            .executor
            .workflow(response.workflow_id)
            .await
            .unwrap()
            .unwrap();
        statuses.push(record.status);
    }
    statuses.sort_by_key(|s| s.to_string());

    assert_eq!(
        statuses,
        vec![WorkflowStatus::Completed, WorkflowStatus::RejectedDuplicate]
    );

    // The rejected twin points at the winner.
    let (winner, loser) = if a.success { (&a, &b) } else { (&b, &a) };
    let loser_record = h
        .executor
        .workflow(loser.workflow_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        loser_record.duplicate_of.as_deref(),
        Some(winner.workflow_id.to_string().as_str())
    );
    assert!(loser_record.generated_artifact_ids.is_empty());
}

#[tokio::test]
async fn test_destructive_request_rejected_without_execution() {
    let h = harness();

    let request = ExecuteRequest {
        task_name: "TestMalicious".to_string(),
        description: "delete all files in the system".to_string(),
        context: BTreeMap::new(),
        language: Some("python".to_string()),
        project_id: None,
        force_regenerate: true,
        max_retries: None,
        timeout: None,
        goal_id: None,
    };
    let response = h.executor.execute(request).await.unwrap();

    assert!(!response.success);
    assert!(response.error.as_deref().unwrap().contains("static_safety_check"));

    // No sandbox invocation, no synthesis, no artifacts.
    assert_eq!(h.sandbox.runs(), 0);
    assert_eq!(h.gateway.calls(), 0);
    let record = h
        .executor
        .workflow(response.workflow_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, WorkflowStatus::Failed);
    assert_eq!(record.failure_reason.as_deref(), Some("static_safety_check"));
    assert!(record.generated_artifact_ids.is_empty());
}

#[tokio::test]
async fn test_unsafe_generated_code_is_never_run() {
    let h = harness();
    h.gateway
        .push_response("```python\nimport os\nos.system('rm -rf / ')\n```");

    let mut request = prime_request(true);
    request.task_name = "Cleaner".to_string();
    request.description = "tidy the workspace directory".to_string();
    let response = h.executor.execute(request).await.unwrap();

    assert!(!response.success);
    assert!(response.error.as_deref().unwrap().contains("static_safety_check"));
    assert_eq!(h.sandbox.runs(), 0);
}

#[tokio::test]
async fn test_artifact_linkage_both_indices() {
    let h = harness();
    h.gateway.push_response(&format!(
        "{}\n@@FILE:hypothesis_test_report.md\n# Report\nscore: 0.9\n@@END",
        PRIME_CODE
    ));
    h.sandbox.push_success(PRIMES);

    let response = h.executor.execute(prime_request(true)).await.unwrap();
    assert!(response.success);

    let artifacts = h.executor.artifacts();
    let files = artifacts.list_by_workflow(response.workflow_id).await.unwrap();
    assert!(!files.is_empty());

    for meta in &files {
        // Metadata and workflow index stay paired.
        let members = h
            .store
            .set_members(&keys::file_by_workflow(response.workflow_id))
            .await
            .unwrap();
        assert!(members.contains(&meta.id.to_string()));
        assert!(artifacts.metadata(meta.id).await.unwrap().is_some());

        // By-name and by-id fetches return identical bytes.
        let by_id = artifacts.content(meta.id).await.unwrap().unwrap();
        let resolved = artifacts.id_by_name(&meta.filename).await.unwrap().unwrap();
        let by_name = artifacts.content(resolved).await.unwrap().unwrap();
        assert_eq!(by_id, by_name);
    }
}

#[tokio::test]
async fn test_zero_retries_terminates_immediately() {
    let h = harness();
    h.gateway.push_response(PRIME_CODE);
    h.sandbox.push_failure("wrong output", 1);

    let mut request = prime_request(true);
    request.max_retries = Some(0);
    let response = h.executor.execute(request).await.unwrap();

    assert!(!response.success);
    assert!(response
        .error
        .as_deref()
        .unwrap()
        .contains("validation failed"));
    // One sandbox run, no patch request.
    assert_eq!(h.sandbox.runs(), 1);
    assert_eq!(h.gateway.calls(), 1);

    let record = h
        .executor
        .workflow(response.workflow_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.failure_reason.as_deref(), Some("validation_exhausted"));
}

#[tokio::test]
async fn test_validation_retry_with_patch() {
    let h = harness();
    h.gateway.push_response("```python\nprint('wrong')\n```");
    h.gateway.push_response(PRIME_CODE);
    h.sandbox.push_failure("AssertionError: wrong output", 1);
    h.sandbox.push_success(PRIMES);

    let response = h.executor.execute(prime_request(true)).await.unwrap();

    assert!(response.success);
    assert_eq!(response.validation_steps.len(), 2);
    assert!(!response.validation_steps[0].passed);
    assert!(response.validation_steps[1].passed);

    // The patch prompt carried the prior code and the error.
    let prompts = h.gateway.recorded_prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].prompt.contains("print('wrong')"));
    assert!(prompts[1].prompt.contains("AssertionError"));
}

#[tokio::test]
async fn test_unsafe_patch_counts_but_never_executes() {
    let h = harness();
    h.gateway.push_response("```python\nprint('wrong')\n```");
    h.gateway
        .push_response("```python\nimport os\nos.system('rm -rf / ')\n```");
    h.sandbox.push_failure("wrong", 1);
    h.sandbox.push_failure("wrong", 1);

    let response = h.executor.execute(prime_request(true)).await.unwrap();

    assert!(!response.success);
    // Attempts: run, unsafe patch (not executed), run again.
    assert_eq!(h.sandbox.runs(), 2);
    assert!(response
        .validation_steps
        .iter()
        .any(|s| s.detail.as_deref().map(|d| d.contains("safety policy")).unwrap_or(false)));

    let record = h
        .executor
        .workflow(response.workflow_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.failure_reason.as_deref(), Some("validation_exhausted"));
}

#[tokio::test]
async fn test_exec_timeout_fails_workflow() {
    let h = harness();
    h.gateway.push_response(PRIME_CODE);
    h.sandbox.push_outcome(noesis_sandbox::SandboxOutcome {
        stdout: String::new(),
        stderr: "budget exceeded".to_string(),
        exit_code: -1,
        timed_out: true,
        duration_ms: 30_000,
        artifacts: Vec::new(),
    });

    let response = h.executor.execute(prime_request(true)).await.unwrap();
    assert!(!response.success);

    let record = h
        .executor
        .workflow(response.workflow_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.failure_reason.as_deref(), Some("timeout"));
    // Timeout is terminal: no patch loop afterwards.
    assert_eq!(h.sandbox.runs(), 1);
}

#[tokio::test]
async fn test_goal_linked_workflow_updates_goal() {
    let h = harness();
    h.gateway.push_response(PRIME_CODE);
    h.sandbox.push_success(PRIMES);

    let mut goal = noesis_core::goal::Goal::new(
        "Generate the first 10 prime numbers as a list",
        GoalType::Curiosity,
        noesis_core::goal::GoalContext::for_domain("mathematics"),
        "test",
    );
    goal.status = GoalStatus::Active;
    let goal_id = h.goals.create(goal).await.unwrap();

    let mut sub = h
        .bus
        .subscribe(&[subjects::WORKFLOW_COMPLETED, subjects::GOAL_ACHIEVED])
        .await
        .unwrap();

    let mut request = prime_request(true);
    request.goal_id = Some(goal_id);
    let response = h.executor.execute(request).await.unwrap();
    assert!(response.success);

    let goal = h.goals.get(goal_id).await.unwrap().unwrap();
    assert_eq!(goal.status, GoalStatus::Achieved);
    assert_eq!(goal.workflow_id, Some(response.workflow_id));

    let mut subjects_seen = Vec::new();
    for _ in 0..2 {
        subjects_seen.push(sub.recv().await.unwrap().subject);
    }
    subjects_seen.sort();
    assert_eq!(subjects_seen, vec!["goal.achieved", "workflow.completed"]);
}

#[tokio::test]
async fn test_failed_workflow_fails_goal() {
    let h = harness();
    h.gateway.push_response(PRIME_CODE);

    let mut request = prime_request(true);
    request.max_retries = Some(0);
    h.sandbox.push_failure("boom", 2);

    let mut goal = noesis_core::goal::Goal::new(
        "Generate primes",
        GoalType::ActiveLearning,
        noesis_core::goal::GoalContext::for_domain("mathematics"),
        "test",
    );
    goal.status = GoalStatus::Active;
    let goal_id = h.goals.create(goal).await.unwrap();
    request.goal_id = Some(goal_id);

    let response = h.executor.execute(request).await.unwrap();
    assert!(!response.success);

    let goal = h.goals.get(goal_id).await.unwrap().unwrap();
    assert_eq!(goal.status, GoalStatus::Failed);
    assert_eq!(goal.failure_reason.as_deref(), Some("validation_exhausted"));
}

#[tokio::test]
async fn test_fingerprint_claim_released_after_completion() {
    let h = harness();
    h.gateway.push_response(PRIME_CODE);
    h.sandbox.push_success(PRIMES);

    let response = h.executor.execute(prime_request(false)).await.unwrap();
    assert!(response.success);

    let record = h
        .executor
        .workflow(response.workflow_id)
        .await
        .unwrap()
        .unwrap();
    let claim = h
        .store
        .get(&keys::workflow_fingerprint(&record.fingerprint))
        .await
        .unwrap();
    assert!(claim.is_none(), "terminal workflows must not hold the claim");
}
