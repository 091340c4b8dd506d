//! Stub sandbox - scripted test double
//!
//! Replays canned outcomes in order and records every request, so executor
//! tests can run the full validation loop without spawning processes.

use crate::{SandboxExecutor, SandboxOutcome, SandboxRequest};
use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

/// Scripted sandbox for tests
#[derive(Debug, Default)]
pub struct StubSandbox {
    outcomes: Mutex<VecDeque<SandboxOutcome>>,
    requests: Mutex<Vec<SandboxRequest>>,
    delay: Mutex<Option<Duration>>,
}

impl StubSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful run with the given stdout.
    pub fn push_success(&self, stdout: impl Into<String>) {
        self.push_outcome(SandboxOutcome {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
            timed_out: false,
            duration_ms: 5,
            artifacts: Vec::new(),
        });
    }

    /// Queue a failing run with the given stderr and exit code.
    pub fn push_failure(&self, stderr: impl Into<String>, exit_code: i32) {
        self.push_outcome(SandboxOutcome {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code,
            timed_out: false,
            duration_ms: 5,
            artifacts: Vec::new(),
        });
    }

    /// Queue an arbitrary outcome.
    pub fn push_outcome(&self, outcome: SandboxOutcome) {
        self.outcomes.lock().push_back(outcome);
    }

    /// Every request seen so far, in order.
    pub fn recorded_requests(&self) -> Vec<SandboxRequest> {
        self.requests.lock().clone()
    }

    /// How many runs were served.
    pub fn runs(&self) -> usize {
        self.requests.lock().len()
    }

    /// Simulate run latency, for tests that need in-flight overlap.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }
}

#[async_trait]
impl SandboxExecutor for StubSandbox {
    async fn execute(&self, request: SandboxRequest) -> Result<SandboxOutcome> {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.requests.lock().push(request);
        match self.outcomes.lock().pop_front() {
            Some(outcome) => Ok(outcome),
            None => bail!("stub sandbox script exhausted"),
        }
    }
}
