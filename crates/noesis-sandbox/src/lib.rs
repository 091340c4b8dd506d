//! Noesis Sandbox - isolated execution environment
//!
//! Runs synthesised code in an ephemeral working directory with an
//! injected environment map and a hard wall-clock budget. The directory is
//! destroyed when the run finishes; files the code leaves under its
//! `artifacts/` directory are swept out first and returned to the caller.
//!
//! The core never links an interpreter directly: which binary serves a
//! language is configuration, not code.

pub mod stub;

pub use stub::StubSandbox;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::process::Command;
use walkdir::WalkDir;

/// Cap applied to each captured stream.
pub const STREAM_CAP: usize = 64 * 1024;

/// Directory name, inside the sandbox root, swept for artifacts.
pub const ARTIFACTS_DIR: &str = "artifacts";

/// Shared handle to a sandbox implementation
pub type SharedSandbox = Arc<dyn SandboxExecutor>;

/// One code execution request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxRequest {
    /// Language key resolved against the configured images
    pub language: String,

    /// The code body to materialise and run
    pub code: String,

    /// Environment map injected into the child process
    pub env: BTreeMap<String, String>,

    /// Hard wall-clock budget
    pub budget: Duration,
}

impl SandboxRequest {
    pub fn new(language: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            code: code.into(),
            env: BTreeMap::new(),
            budget: Duration::from_secs(30),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }
}

/// Result of one sandboxed run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,

    /// Whether the budget expired and the child was torn down
    pub timed_out: bool,

    pub duration_ms: u64,

    /// (filename, content) pairs swept from the artifacts directory
    pub artifacts: Vec<(String, String)>,
}

impl SandboxOutcome {
    /// Exit code zero and no teardown.
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }
}

/// Runs a code artifact with an environment map and a time budget
#[async_trait]
pub trait SandboxExecutor: Send + Sync {
    async fn execute(&self, request: SandboxRequest) -> Result<SandboxOutcome>;
}

/// Process-backed sandbox
///
/// Materialises the code in a temp directory and runs the configured
/// interpreter for the request's language. The child is killed when the
/// budget expires.
#[derive(Debug, Clone)]
pub struct ProcessSandbox {
    /// language → interpreter binary
    images: BTreeMap<String, String>,
}

impl ProcessSandbox {
    pub fn new(images: BTreeMap<String, String>) -> Self {
        Self { images }
    }

    /// Interpreters resolved from `PATH`: python3, bash, node.
    pub fn with_default_images() -> Self {
        let mut images = BTreeMap::new();
        images.insert("python".to_string(), "python3".to_string());
        images.insert("bash".to_string(), "bash".to_string());
        images.insert("node".to_string(), "node".to_string());
        Self::new(images)
    }

    fn source_filename(language: &str) -> &'static str {
        match language {
            "python" => "main.py",
            "bash" => "main.sh",
            "node" => "main.js",
            _ => "main.txt",
        }
    }

    fn sweep_artifacts(root: &Path) -> Vec<(String, String)> {
        let dir = root.join(ARTIFACTS_DIR);
        let mut out = Vec::new();
        for entry in WalkDir::new(&dir).into_iter().flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = match path.strip_prefix(&dir) {
                Ok(rel) => rel.to_string_lossy().to_string(),
                Err(_) => continue,
            };
            match std::fs::read_to_string(path) {
                Ok(content) => out.push((name, content)),
                Err(e) => tracing::warn!(file = %path.display(), error = %e, "unreadable artifact"),
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

fn truncate(mut text: String, cap: usize) -> String {
    if text.len() > cap {
        text.truncate(cap);
        text.push_str("\n[truncated]");
    }
    text
}

#[async_trait]
impl SandboxExecutor for ProcessSandbox {
    async fn execute(&self, request: SandboxRequest) -> Result<SandboxOutcome> {
        let interpreter = self
            .images
            .get(&request.language)
            .with_context(|| format!("no sandbox image for language '{}'", request.language))?;

        let temp_dir = tempfile::Builder::new()
            .prefix("noesis-sandbox-")
            .tempdir()
            .context("creating sandbox directory")?;
        let root = temp_dir.path().to_path_buf();

        let source = root.join(Self::source_filename(&request.language));
        std::fs::write(&source, &request.code).context("materialising code")?;
        std::fs::create_dir_all(root.join(ARTIFACTS_DIR)).context("creating artifacts dir")?;

        let mut command = Command::new(interpreter);
        command
            .arg(&source)
            .current_dir(&root)
            .env("NOESIS_ARTIFACTS_DIR", root.join(ARTIFACTS_DIR))
            .kill_on_drop(true);
        for (key, value) in &request.env {
            command.env(key, value);
        }

        let started = Instant::now();
        let run = tokio::time::timeout(request.budget, command.output()).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let outcome = match run {
            Ok(output) => {
                let output = output.context("spawning sandbox process")?;
                SandboxOutcome {
                    stdout: truncate(
                        String::from_utf8_lossy(&output.stdout).to_string(),
                        STREAM_CAP,
                    ),
                    stderr: truncate(
                        String::from_utf8_lossy(&output.stderr).to_string(),
                        STREAM_CAP,
                    ),
                    exit_code: output.status.code().unwrap_or(-1),
                    timed_out: false,
                    duration_ms,
                    artifacts: Self::sweep_artifacts(&root),
                }
            }
            // Budget expired: the dropped future kills the child, and the
            // TempDir drop tears the whole sandbox down.
            Err(_) => SandboxOutcome {
                stdout: String::new(),
                stderr: format!("wall-clock budget of {:?} exceeded", request.budget),
                exit_code: -1,
                timed_out: true,
                duration_ms,
                artifacts: Vec::new(),
            },
        };

        tracing::debug!(
            language = %request.language,
            exit_code = outcome.exit_code,
            timed_out = outcome.timed_out,
            duration_ms,
            "sandbox run finished"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_captures_stdout() -> Result<()> {
        let sandbox = ProcessSandbox::with_default_images();
        let outcome = sandbox
            .execute(SandboxRequest::new("bash", "echo hello-noesis"))
            .await?;

        assert!(outcome.succeeded());
        assert_eq!(outcome.stdout.trim(), "hello-noesis");
        Ok(())
    }

    #[tokio::test]
    async fn test_env_injection() -> Result<()> {
        let sandbox = ProcessSandbox::with_default_images();
        let outcome = sandbox
            .execute(SandboxRequest::new("bash", "echo $COUNT").with_env("COUNT", "10"))
            .await?;

        assert_eq!(outcome.stdout.trim(), "10");
        Ok(())
    }

    #[tokio::test]
    async fn test_nonzero_exit_code() -> Result<()> {
        let sandbox = ProcessSandbox::with_default_images();
        let outcome = sandbox
            .execute(SandboxRequest::new("bash", "exit 3"))
            .await?;

        assert!(!outcome.succeeded());
        assert_eq!(outcome.exit_code, 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_budget_teardown() -> Result<()> {
        let sandbox = ProcessSandbox::with_default_images();
        let outcome = sandbox
            .execute(
                SandboxRequest::new("bash", "sleep 5")
                    .with_budget(Duration::from_millis(100)),
            )
            .await?;

        assert!(outcome.timed_out);
        assert!(!outcome.succeeded());
        Ok(())
    }

    #[tokio::test]
    async fn test_artifact_sweep() -> Result<()> {
        let sandbox = ProcessSandbox::with_default_images();
        let outcome = sandbox
            .execute(SandboxRequest::new(
                "bash",
                "echo report-body > \"$NOESIS_ARTIFACTS_DIR/report.md\"",
            ))
            .await?;

        assert!(outcome.succeeded());
        assert_eq!(outcome.artifacts.len(), 1);
        assert_eq!(outcome.artifacts[0].0, "report.md");
        assert_eq!(outcome.artifacts[0].1.trim(), "report-body");
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_language_is_an_error() {
        let sandbox = ProcessSandbox::with_default_images();
        let result = sandbox
            .execute(SandboxRequest::new("cobol", "DISPLAY 'HI'."))
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_truncation() {
        let long = "x".repeat(STREAM_CAP + 10);
        let cut = truncate(long, STREAM_CAP);
        assert!(cut.ends_with("[truncated]"));
    }
}
