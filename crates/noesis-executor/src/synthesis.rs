//! Code synthesis
//!
//! Drives the LLM gateway to produce a code artifact for a workflow
//! request, extracts the code body and any companion files from the
//! completion, and builds patch prompts when validation fails.
//!
//! The synthesis prompt enumerates the language target, the expected
//! stdout shape, the safety constraints, and the machine-check hint the
//! validator will apply.

use lazy_static::lazy_static;
use noesis_core::error::{LlmError, Result};
use noesis_core::llm::{LlmGateway, LlmPriority, LlmRequest};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

lazy_static! {
    static ref CODE_FENCE: Regex =
        Regex::new(r"(?s)```[a-zA-Z0-9_+-]*\n(.*?)```").unwrap();

    /// Companion file markers: `@@FILE:name` ... `@@END`.
    static ref FILE_MARKER: Regex =
        Regex::new(r"(?s)@@FILE:([^\n]+)\n(.*?)@@END").unwrap();
}

/// A synthesised artifact: the code plus companion files
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisedCode {
    pub code: String,

    /// (filename, content) pairs declared alongside the code
    pub companion_files: Vec<(String, String)>,
}

/// Builds prompts and extracts completions for workflow synthesis
#[derive(Clone)]
pub struct CodeSynthesiser {
    llm: Arc<dyn LlmGateway>,
    deadline: Duration,
}

impl CodeSynthesiser {
    pub fn new(llm: Arc<dyn LlmGateway>, deadline: Duration) -> Self {
        Self { llm, deadline }
    }

    /// Synthesise code for a task from scratch.
    pub async fn synthesise(
        &self,
        task_name: &str,
        description: &str,
        language: &str,
        context: &BTreeMap<String, String>,
        expected_pattern: Option<&str>,
        priority: LlmPriority,
    ) -> Result<SynthesisedCode> {
        let prompt = build_synthesis_prompt(task_name, description, language, context, expected_pattern);
        let response = self
            .llm
            .generate(
                LlmRequest::new(SYSTEM_PROMPT, prompt)
                    .with_priority(priority)
                    .with_deadline(self.deadline),
            )
            .await?;
        extract(&response.text)
    }

    /// Request a patch for code that failed validation.
    pub async fn patch(
        &self,
        language: &str,
        prior_code: &str,
        error: &str,
        expected_pattern: Option<&str>,
        priority: LlmPriority,
    ) -> Result<SynthesisedCode> {
        let prompt = build_patch_prompt(language, prior_code, error, expected_pattern);
        let response = self
            .llm
            .generate(
                LlmRequest::new(SYSTEM_PROMPT, prompt)
                    .with_priority(priority)
                    .with_deadline(self.deadline),
            )
            .await?;
        extract(&response.text)
    }
}

const SYSTEM_PROMPT: &str = "You write small, self-contained programs that print their result \
to stdout. Return the program in one fenced code block. Additional output files may be declared \
with @@FILE:<name> ... @@END blocks. Never touch paths outside the working directory, never \
contact the network, never kill processes.";

fn build_synthesis_prompt(
    task_name: &str,
    description: &str,
    language: &str,
    context: &BTreeMap<String, String>,
    expected_pattern: Option<&str>,
) -> String {
    let mut prompt = format!(
        "Task: {task_name}\nLanguage: {language}\n\nWrite a {language} program that does the \
         following:\n{description}\n",
    );
    if !context.is_empty() {
        prompt.push_str("\nContext values are injected as environment variables:\n");
        for (key, value) in context {
            prompt.push_str(&format!("- {} = {}\n", key, value));
        }
    }
    prompt.push_str(
        "\nConstraints:\n\
         - Print the final result to stdout.\n\
         - No file access outside the working directory; extra files go under artifacts/.\n\
         - No network access, no process management, no shell-out with untrusted strings.\n",
    );
    if let Some(pattern) = expected_pattern {
        prompt.push_str(&format!(
            "\nThe validator accepts the run only if stdout matches this pattern:\n{}\n",
            pattern
        ));
    }
    prompt
}

fn build_patch_prompt(
    language: &str,
    prior_code: &str,
    error: &str,
    expected_pattern: Option<&str>,
) -> String {
    let mut prompt = format!(
        "The following {language} program failed validation.\n\nProgram:\n```{language}\n{code}\n```\n\n\
         Failure:\n{error}\n\nReturn a corrected version of the whole program in one fenced \
         code block. Keep the same constraints as before.\n",
        language = language,
        code = prior_code,
        error = error,
    );
    if let Some(pattern) = expected_pattern {
        prompt.push_str(&format!("stdout must match: {}\n", pattern));
    }
    prompt
}

/// Pull `@@FILE` blocks out of captured stdout. Programs may declare
/// artifacts this way instead of writing under `artifacts/`.
pub fn extract_stdout_files(stdout: &str) -> Vec<(String, String)> {
    FILE_MARKER
        .captures_iter(stdout)
        .map(|c| (c[1].trim().to_string(), c[2].to_string()))
        .collect()
}

/// Pull the code body and companion files out of a completion.
fn extract(completion: &str) -> Result<SynthesisedCode> {
    let companion_files: Vec<(String, String)> = FILE_MARKER
        .captures_iter(completion)
        .map(|c| (c[1].trim().to_string(), c[2].to_string()))
        .collect();

    // Strip file blocks before looking for the code fence so a fenced
    // snippet inside a companion file cannot shadow the program.
    let without_files = FILE_MARKER.replace_all(completion, "");

    let code = match CODE_FENCE.captures(&without_files) {
        Some(c) => c[1].trim_end().to_string(),
        None => without_files.trim().to_string(),
    };

    if code.is_empty() {
        return Err(LlmError::EmptyCompletion.into());
    }

    Ok(SynthesisedCode {
        code,
        companion_files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use noesis_core::llm::ScriptedGateway;

    #[test]
    fn test_extract_fenced_code() {
        let completion = "Here is the program:\n```python\nprint('hi')\n```\nDone.";
        let out = extract(completion).unwrap();
        assert_eq!(out.code, "print('hi')");
        assert!(out.companion_files.is_empty());
    }

    #[test]
    fn test_extract_companion_files() {
        let completion = "```python\nprint('hi')\n```\n@@FILE:hypothesis_test_report.md\n# Report\nscore: 0.8\n@@END";
        let out = extract(completion).unwrap();
        assert_eq!(out.code, "print('hi')");
        assert_eq!(out.companion_files.len(), 1);
        assert_eq!(out.companion_files[0].0, "hypothesis_test_report.md");
        assert!(out.companion_files[0].1.contains("score: 0.8"));
    }

    #[test]
    fn test_extract_bare_code() {
        let out = extract("print('no fence')").unwrap();
        assert_eq!(out.code, "print('no fence')");
    }

    #[test]
    fn test_extract_empty_is_an_error() {
        assert!(extract("").is_err());
        assert!(extract("   \n  ").is_err());
    }

    #[test]
    fn test_prompt_enumerates_contract() {
        let mut context = BTreeMap::new();
        context.insert("count".to_string(), "10".to_string());
        let prompt = build_synthesis_prompt(
            "PrimeNumberGenerator",
            "Generate the first 10 prime numbers",
            "python",
            &context,
            Some(r"2 3 5 7 11"),
        );
        assert!(prompt.contains("Language: python"));
        assert!(prompt.contains("count = 10"));
        assert!(prompt.contains("stdout matches this pattern"));
        assert!(prompt.contains("No network access"));
    }

    #[tokio::test]
    async fn test_synthesise_roundtrip() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_response("```python\nprint(42)\n```");
        let synthesiser = CodeSynthesiser::new(gateway.clone(), Duration::from_secs(5));

        let out = synthesiser
            .synthesise(
                "Answer",
                "print the answer",
                "python",
                &BTreeMap::new(),
                None,
                LlmPriority::Normal,
            )
            .await
            .unwrap();
        assert_eq!(out.code, "print(42)");
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn test_patch_prompt_carries_prior_code_and_error() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_response("```python\nprint(43)\n```");
        let synthesiser = CodeSynthesiser::new(gateway.clone(), Duration::from_secs(5));

        synthesiser
            .patch("python", "print(42)", "expected 43", None, LlmPriority::High)
            .await
            .unwrap();

        let prompts = gateway.recorded_prompts();
        assert!(prompts[0].prompt.contains("print(42)"));
        assert!(prompts[0].prompt.contains("expected 43"));
    }
}
