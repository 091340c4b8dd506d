//! Intelligent Executor
//!
//! Receives workflow requests (HTTP or goal-triggered), suppresses
//! duplicates through the fingerprint claim, synthesises or reuses code,
//! screens it against the safety policy, validates it in the sandbox with
//! bounded patched retries, captures artifacts, caches capabilities, and
//! reports the terminal state back to the Goal Manager.
//!
//! Per-fingerprint work is serialised by the claim itself; across
//! fingerprints a semaphore caps concurrency.

use crate::artifacts::ArtifactStore;
use crate::capability::CapabilityCache;
use crate::fingerprint::fingerprint;
use crate::safety::{SafetyPolicy, SafetyVerdict, REJECTION_REASON};
use crate::synthesis::{extract_stdout_files, CodeSynthesiser, SynthesisedCode};
use noesis_core::bus::{self, subjects, SharedBus};
use noesis_core::capability::SafetyLevel;
use noesis_core::error::Result;
use noesis_core::events::WorkflowFinished;
use noesis_core::llm::LlmPriority;
use noesis_core::store::{keys, SharedStore, StateStore};
use noesis_core::types::WorkflowStatus;
use noesis_core::workflow::{ValidationStep, WorkflowRecord};
use noesis_goals::manager::GoalManager;
use noesis_sandbox::{SandboxRequest, SharedSandbox};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use uuid::Uuid;

/// Context key carrying the validator's expected-stdout pattern.
pub const EXPECTED_PATTERN_KEY: &str = "expected_pattern";

/// Executor configuration
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub default_language: String,

    /// Duplicate-suppression window W
    pub duplicate_window: Duration,

    /// Sandbox budget T_exec per validation run
    pub exec_budget: Duration,

    /// Whole-workflow wall-clock budget T_wf
    pub workflow_budget: Duration,

    /// Validation retry cap N_retry
    pub retry_cap: u32,

    /// Cross-fingerprint concurrency cap
    pub concurrency_cap: usize,

    /// Deadline for one gateway round trip
    pub llm_deadline: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_language: "python".to_string(),
            duplicate_window: Duration::from_secs(600),
            exec_budget: Duration::from_secs(30),
            workflow_budget: Duration::from_secs(600),
            retry_cap: 3,
            concurrency_cap: 4,
            llm_deadline: Duration::from_secs(60),
        }
    }
}

/// One workflow request
#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteRequest {
    pub task_name: String,
    pub description: String,
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub force_regenerate: bool,
    #[serde(default)]
    pub max_retries: Option<u32>,
    /// Sandbox budget override, seconds
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub goal_id: Option<Uuid>,
}

/// Workflow result returned to callers
#[derive(Debug, Clone, Serialize)]
pub struct ExecuteResponse {
    pub success: bool,
    pub workflow_id: Uuid,
    pub used_cached_code: bool,
    pub execution_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_code: Option<String>,
    pub validation_steps: Vec<ValidationStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Terminal outcome of the inner workflow run
enum RunEnd {
    Success {
        stdout: String,
        code: String,
        used_cached: bool,
        safety_level: SafetyLevel,
        companion_files: Vec<(String, String)>,
        sandbox_artifacts: Vec<(String, String)>,
    },
    Failure {
        reason: String,
        error: String,
    },
}

/// The executor service
pub struct IntelligentExecutor {
    store: SharedStore,
    bus: SharedBus,
    sandbox: SharedSandbox,
    synthesiser: CodeSynthesiser,
    safety: SafetyPolicy,
    artifacts: ArtifactStore,
    capabilities: CapabilityCache,
    goals: Arc<GoalManager>,
    semaphore: Arc<Semaphore>,
    config: ExecutorConfig,
}

impl IntelligentExecutor {
    pub fn new(
        store: SharedStore,
        bus: SharedBus,
        sandbox: SharedSandbox,
        synthesiser: CodeSynthesiser,
        goals: Arc<GoalManager>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            artifacts: ArtifactStore::new(store.clone()),
            capabilities: CapabilityCache::new(store.clone()),
            semaphore: Arc::new(Semaphore::new(config.concurrency_cap.max(1))),
            store,
            bus,
            sandbox,
            synthesiser,
            safety: SafetyPolicy::new(),
            goals,
            config,
        }
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub fn capabilities(&self) -> &CapabilityCache {
        &self.capabilities
    }

    /// Create and persist the workflow record for a request. Used by the
    /// asynchronous surface, which must hand back a workflow id before the
    /// run starts.
    pub async fn submit(&self, request: &ExecuteRequest) -> Result<WorkflowRecord> {
        let language = request
            .language
            .clone()
            .unwrap_or_else(|| self.config.default_language.clone());
        let mut record = WorkflowRecord::new(
            &request.task_name,
            &request.description,
            language,
            fingerprint(&request.description, &request.context),
        );
        record.goal_id = request.goal_id;
        record.project_id = request.project_id.clone();
        self.persist(&record).await?;
        Ok(record)
    }

    /// Full synchronous execution.
    pub async fn execute(&self, request: ExecuteRequest) -> Result<ExecuteResponse> {
        let record = self.submit(&request).await?;
        self.run(record, request).await
    }

    /// Drive a prepared workflow record to a terminal state.
    pub async fn run(
        &self,
        mut record: WorkflowRecord,
        request: ExecuteRequest,
    ) -> Result<ExecuteResponse> {
        let started = Instant::now();
        let claim_key = keys::workflow_fingerprint(&record.fingerprint);

        // Duplicate suppression: the conditional claim is the only
        // cross-worker mutex. Forced regeneration overwrites the claim.
        if request.force_regenerate {
            self.store.set(&claim_key, &record.id.to_string()).await?;
            self.store
                .expire(&claim_key, self.config.duplicate_window)
                .await?;
        } else {
            let claimed = self
                .store
                .set_nx_ttl(
                    &claim_key,
                    &record.id.to_string(),
                    self.config.duplicate_window,
                )
                .await?;
            if !claimed {
                let original = self
                    .store
                    .get(&claim_key)
                    .await?
                    .unwrap_or_else(|| "unknown".to_string());
                record.reject_duplicate(&original)?;
                self.persist(&record).await?;
                tracing::info!(workflow_id = %record.id, %original, "duplicate workflow rejected");
                return Ok(self.response(&record, started, None, None, Some(format!(
                    "rejected_duplicate: an active workflow {} owns this fingerprint",
                    original
                ))));
            }
        }

        record.transition_to(WorkflowStatus::Running)?;
        self.persist(&record).await?;

        if let Some(goal_id) = record.goal_id {
            if let Err(e) = self.goals.attach_workflow(goal_id, record.id).await {
                tracing::warn!(goal_id = %goal_id, error = %e, "goal workflow link failed");
            }
        }

        let _permit = self
            .semaphore
            .acquire()
            .await
            .expect("executor semaphore closed");

        let end = match tokio::time::timeout(
            self.config.workflow_budget,
            self.run_inner(&mut record, &request),
        )
        .await
        {
            Ok(Ok(end)) => end,
            Ok(Err(e)) => return Err(e),
            Err(_) => RunEnd::Failure {
                reason: "timeout".to_string(),
                error: format!(
                    "workflow exceeded its wall-clock budget of {:?}",
                    self.config.workflow_budget
                ),
            },
        };

        match end {
            RunEnd::Success {
                stdout,
                code,
                used_cached,
                safety_level,
                companion_files,
                sandbox_artifacts,
            } => {
                self.capture_artifacts(&mut record, &stdout, &companion_files, &sandbox_artifacts)
                    .await;
                if let Some(capability) = self
                    .capabilities
                    .record_success(
                        &record.task_name,
                        &record.language,
                        &code,
                        &record.description,
                        safety_level,
                    )
                    .await?
                {
                    tracing::debug!(
                        task_name = %record.task_name,
                        success_count = capability.success_count,
                        "capability cached"
                    );
                }

                record.used_cached_code = used_cached;
                record.transition_to(WorkflowStatus::Completed)?;
                self.persist(&record).await?;
                self.release_claim(&claim_key, record.id).await;
                self.finish_goal(&record, true, &stdout).await;
                self.publish_finished(&record, subjects::WORKFLOW_COMPLETED)
                    .await?;

                tracing::info!(workflow_id = %record.id, used_cached, "workflow completed");
                Ok(self.response(&record, started, Some(stdout), Some(code), None))
            }
            RunEnd::Failure { reason, error } => {
                record.fail(&reason)?;
                self.persist(&record).await?;
                self.release_claim(&claim_key, record.id).await;
                self.finish_goal(&record, false, &reason).await;
                self.publish_finished(&record, subjects::WORKFLOW_FAILED)
                    .await?;

                tracing::info!(workflow_id = %record.id, %reason, "workflow failed");
                Ok(self.response(&record, started, None, None, Some(error)))
            }
        }
    }

    /// Read one workflow record.
    pub async fn workflow(&self, id: Uuid) -> Result<Option<WorkflowRecord>> {
        match self.store.get(&keys::workflow(id)).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn run_inner(
        &self,
        record: &mut WorkflowRecord,
        request: &ExecuteRequest,
    ) -> Result<RunEnd> {
        // Overtly destructive requests never reach synthesis.
        if let SafetyVerdict::Rejected(patterns) = self.safety.check_description(&request.description)
        {
            return Ok(RunEnd::Failure {
                reason: REJECTION_REASON.to_string(),
                error: SafetyPolicy::rejection_message(&patterns),
            });
        }

        let expected_pattern = request.context.get(EXPECTED_PATTERN_KEY).cloned();
        // Hypothesis-probing work outranks ad-hoc requests at the gateway.
        let priority = if request.context.contains_key("hypothesis_id") || record.goal_id.is_some()
        {
            LlmPriority::High
        } else {
            LlmPriority::Normal
        };
        let attempts_allowed = request.max_retries.unwrap_or(self.config.retry_cap).max(1);

        // Code acquisition: capability cache first, then synthesis.
        let mut used_cached = false;
        let synthesised = if !request.force_regenerate {
            match self.capabilities.lookup(&record.task_name).await? {
                Some(capability) => {
                    used_cached = true;
                    Some(SynthesisedCode {
                        code: capability.code,
                        companion_files: Vec::new(),
                    })
                }
                None => None,
            }
        } else {
            None
        };

        let synthesised = match synthesised {
            Some(s) => s,
            None => {
                match self
                    .synthesise_with_retry(record, request, expected_pattern.as_deref(), priority, attempts_allowed)
                    .await?
                {
                    Ok(s) => s,
                    Err(end) => return Ok(end),
                }
            }
        };

        // Static safety check precedes any execution.
        let safety_level = match self.safety.check_code(&synthesised.code) {
            SafetyVerdict::Safe(level) => level,
            SafetyVerdict::Rejected(patterns) => {
                return Ok(RunEnd::Failure {
                    reason: REJECTION_REASON.to_string(),
                    error: SafetyPolicy::rejection_message(&patterns),
                });
            }
        };

        self.validate_loop(
            record,
            request,
            synthesised,
            used_cached,
            safety_level,
            expected_pattern.as_deref(),
            priority,
            attempts_allowed,
        )
        .await
    }

    async fn synthesise_with_retry(
        &self,
        record: &WorkflowRecord,
        request: &ExecuteRequest,
        expected_pattern: Option<&str>,
        priority: LlmPriority,
        attempts_allowed: u32,
    ) -> Result<std::result::Result<SynthesisedCode, RunEnd>> {
        let mut last_error = String::new();
        for attempt in 1..=attempts_allowed {
            match self
                .synthesiser
                .synthesise(
                    &record.task_name,
                    &request.description,
                    &record.language,
                    &request.context,
                    expected_pattern,
                    priority,
                )
                .await
            {
                Ok(code) => return Ok(Ok(code)),
                Err(e) => {
                    last_error = e.to_string();
                    tracing::warn!(
                        workflow_id = %record.id,
                        attempt,
                        error = %last_error,
                        "synthesis attempt failed"
                    );
                }
            }
        }
        Ok(Err(RunEnd::Failure {
            reason: "synthesis_exhausted".to_string(),
            error: format!(
                "synthesis failed after {} attempts: {}",
                attempts_allowed, last_error
            ),
        }))
    }

    #[allow(clippy::too_many_arguments)]
    async fn validate_loop(
        &self,
        record: &mut WorkflowRecord,
        request: &ExecuteRequest,
        synthesised: SynthesisedCode,
        used_cached: bool,
        mut safety_level: SafetyLevel,
        expected_pattern: Option<&str>,
        priority: LlmPriority,
        attempts_allowed: u32,
    ) -> Result<RunEnd> {
        let exec_budget = request
            .timeout
            .map(Duration::from_secs)
            .unwrap_or(self.config.exec_budget);

        let mut code = synthesised.code;
        let mut companion_files = synthesised.companion_files;
        let mut attempts_used = 0u32;
        let mut last_error = String::new();

        while attempts_used < attempts_allowed {
            attempts_used += 1;

            let sandbox_request = SandboxRequest {
                language: record.language.clone(),
                code: code.clone(),
                env: request.context.clone(),
                budget: exec_budget,
            };
            let outcome = match self.sandbox.execute(sandbox_request).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    record.validation_steps.push(ValidationStep {
                        attempt: attempts_used,
                        passed: false,
                        exit_code: None,
                        detail: Some(format!("sandbox error: {}", e)),
                    });
                    last_error = e.to_string();
                    continue;
                }
            };

            if outcome.timed_out {
                record.validation_steps.push(ValidationStep {
                    attempt: attempts_used,
                    passed: false,
                    exit_code: None,
                    detail: Some("execution budget exceeded".to_string()),
                });
                return Ok(RunEnd::Failure {
                    reason: "timeout".to_string(),
                    error: format!("execution exceeded its budget of {:?}", exec_budget),
                });
            }

            let pattern_ok = expected_pattern
                .map(|p| pattern_matches(p, &outcome.stdout))
                .unwrap_or(true);
            let passed = outcome.exit_code == 0 && pattern_ok;

            record.validation_steps.push(ValidationStep {
                attempt: attempts_used,
                passed,
                exit_code: Some(outcome.exit_code),
                detail: if passed {
                    None
                } else if !pattern_ok && outcome.exit_code == 0 {
                    Some("stdout did not match the expected pattern".to_string())
                } else {
                    Some(truncate_error(&outcome.stderr))
                },
            });

            if passed {
                return Ok(RunEnd::Success {
                    stdout: outcome.stdout,
                    code,
                    used_cached,
                    safety_level,
                    companion_files,
                    sandbox_artifacts: outcome.artifacts,
                });
            }

            last_error = if !pattern_ok && outcome.exit_code == 0 {
                format!(
                    "stdout did not match expected pattern {:?}; stdout was:\n{}",
                    expected_pattern.unwrap_or_default(),
                    outcome.stdout
                )
            } else {
                format!("exit code {}; stderr:\n{}", outcome.exit_code, outcome.stderr)
            };

            if attempts_used >= attempts_allowed {
                break;
            }

            // Ask for a patch. A patch that fails to arrive or reintroduces
            // rejected patterns consumes an attempt without executing.
            match self
                .synthesiser
                .patch(&record.language, &code, &last_error, expected_pattern, priority)
                .await
            {
                Ok(patch) => match self.safety.check_code(&patch.code) {
                    SafetyVerdict::Safe(level) => {
                        code = patch.code;
                        safety_level = level;
                        companion_files.extend(patch.companion_files);
                    }
                    SafetyVerdict::Rejected(patterns) => {
                        attempts_used += 1;
                        record.validation_steps.push(ValidationStep {
                            attempt: attempts_used,
                            passed: false,
                            exit_code: None,
                            detail: Some(SafetyPolicy::rejection_message(&patterns)),
                        });
                    }
                },
                Err(e) => {
                    attempts_used += 1;
                    record.validation_steps.push(ValidationStep {
                        attempt: attempts_used,
                        passed: false,
                        exit_code: None,
                        detail: Some(format!("patch synthesis failed: {}", e)),
                    });
                }
            }
        }

        Ok(RunEnd::Failure {
            reason: "validation_exhausted".to_string(),
            error: format!(
                "validation failed after {} attempts: {}",
                attempts_used, last_error
            ),
        })
    }

    /// Persist every produced file; artifact failures degrade the record
    /// but never the completed workflow.
    async fn capture_artifacts(
        &self,
        record: &mut WorkflowRecord,
        stdout: &str,
        companion_files: &[(String, String)],
        sandbox_artifacts: &[(String, String)],
    ) {
        let mut files: Vec<(String, String)> = Vec::new();
        files.extend(companion_files.iter().cloned());
        files.extend(sandbox_artifacts.iter().cloned());
        files.extend(extract_stdout_files(stdout));

        for (filename, content) in files {
            match self
                .artifacts
                .store_artifact(record.id, &filename, &content)
                .await
            {
                Ok(artifact) => record.generated_artifact_ids.push(artifact.id),
                Err(e) => {
                    tracing::warn!(
                        workflow_id = %record.id,
                        %filename,
                        error = %e,
                        "artifact store failed"
                    );
                }
            }
        }
    }

    async fn finish_goal(&self, record: &WorkflowRecord, achieved: bool, detail: &str) {
        let Some(goal_id) = record.goal_id else {
            return;
        };
        let result = if achieved {
            self.goals
                .achieve(
                    goal_id,
                    serde_json::json!({
                        "workflow_id": record.id,
                        "stdout": detail,
                    }),
                )
                .await
                .map(|_| ())
        } else {
            self.goals.fail(goal_id, detail).await.map(|_| ())
        };
        if let Err(e) = result {
            tracing::warn!(goal_id = %goal_id, error = %e, "goal update failed");
        }
    }

    async fn publish_finished(&self, record: &WorkflowRecord, subject: &str) -> Result<()> {
        bus::publish_event(
            self.bus.as_ref(),
            subject,
            &WorkflowFinished {
                workflow_id: record.id,
                goal_id: record.goal_id,
                status: record.status,
                artifact_ids: record.generated_artifact_ids.clone(),
            },
        )
        .await
    }

    /// Drop the fingerprint claim if this workflow still owns it.
    async fn release_claim(&self, claim_key: &str, workflow_id: Uuid) {
        match self.store.get(claim_key).await {
            Ok(Some(owner)) if owner == workflow_id.to_string() => {
                if let Err(e) = self.store.delete(claim_key).await {
                    tracing::warn!(claim_key, error = %e, "claim release failed");
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(claim_key, error = %e, "claim owner read failed"),
        }
    }

    async fn persist(&self, record: &WorkflowRecord) -> Result<()> {
        self.store
            .set(&keys::workflow(record.id), &serde_json::to_string(record)?)
            .await
    }

    fn response(
        &self,
        record: &WorkflowRecord,
        started: Instant,
        stdout: Option<String>,
        code: Option<String>,
        error: Option<String>,
    ) -> ExecuteResponse {
        ExecuteResponse {
            success: record.status == WorkflowStatus::Completed,
            workflow_id: record.id,
            used_cached_code: record.used_cached_code,
            execution_time_ms: started.elapsed().as_millis() as u64,
            result: stdout,
            generated_code: code,
            validation_steps: record.validation_steps.clone(),
            error,
        }
    }
}

/// Match stdout against the request's expected pattern; an invalid regex
/// degrades to a substring check.
fn pattern_matches(pattern: &str, stdout: &str) -> bool {
    match regex::Regex::new(pattern) {
        Ok(regex) => regex.is_match(stdout),
        Err(_) => stdout.contains(pattern),
    }
}

fn truncate_error(stderr: &str) -> String {
    let mut detail = stderr.trim().to_string();
    if detail.len() > 512 {
        detail.truncate(512);
        detail.push_str("...");
    }
    detail
}
