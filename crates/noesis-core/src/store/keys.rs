//! Canonical key layout for the state store
//!
//! Every service builds keys through these constructors so tests and
//! components cannot drift apart on naming.

use uuid::Uuid;

/// Hash of hypothesis_id → hypothesis JSON for one agent.
pub fn hypotheses(agent: &str) -> String {
    format!("fsm:{}:hypotheses", agent)
}

/// List of synthesised goal-seed JSON for one domain.
pub fn curiosity_goals(domain: &str) -> String {
    format!("reasoning:curiosity_goals:{}", domain)
}

/// List of belief JSON for one domain.
pub fn beliefs(domain: &str) -> String {
    format!("reasoning:beliefs:{}", domain)
}

/// Cooling-window claim for a synthesised (source, goal-type) pair.
pub fn goal_seed_claim(source_id: &str, goal_type: &str) -> String {
    format!("reasoning:goal_claim:{}:{}", source_id, goal_type)
}

/// Converter mapping from a seed id to the Goal Manager goal it became.
pub fn goal_mapping(source_id: &str) -> String {
    format!("reasoning:goal_mapping:{}", source_id)
}

/// One goal document.
pub fn goal(id: Uuid) -> String {
    format!("goal:{}", id)
}

/// Set of active goal ids for one agent.
pub fn goals_active(agent: &str) -> String {
    format!("goals:{}:active", agent)
}

/// Set of all goal ids ever owned by one agent.
pub fn goals_history(agent: &str) -> String {
    format!("goals:{}:history", agent)
}

/// One workflow record.
pub fn workflow(id: Uuid) -> String {
    format!("workflow:{}", id)
}

/// Fingerprint claim key; TTL equals the duplicate-suppression window.
pub fn workflow_fingerprint(fingerprint: &str) -> String {
    format!("workflow:fingerprint:{}", fingerprint)
}

/// One capability document, keyed by task name.
pub fn capability(task_name: &str) -> String {
    format!("capability:{}", task_name)
}

/// Set of all cached capability task names.
pub fn capability_index() -> String {
    "capability:index".to_string()
}

/// Single-writer claim for a capability slot.
pub fn capability_claim(task_name: &str) -> String {
    format!("capability:claim:{}", task_name)
}

/// Metadata document for one file artifact.
pub fn file_metadata(file_id: Uuid) -> String {
    format!("file:metadata:{}", file_id)
}

/// Filename → file id index.
pub fn file_by_name(filename: &str) -> String {
    format!("file:by_name:{}", filename)
}

/// Set of file ids produced by one workflow.
pub fn file_by_workflow(workflow_id: Uuid) -> String {
    format!("file:by_workflow:{}", workflow_id)
}

/// Raw artifact bytes (stored verbatim).
pub fn file_content(file_id: Uuid) -> String {
    format!("file:content:{}", file_id)
}

/// Per-domain explanation-learning statistics.
pub fn learning_stats(domain: &str) -> String {
    format!("explanation_learning:stats:{}", domain)
}

/// Per-domain confidence scaling factor.
pub fn confidence_scaling(domain: &str) -> String {
    format!("explanation_learning:confidence_scaling:{}", domain)
}

/// Idempotence ledger entry for one observed terminal goal event.
pub fn learning_processed(goal_id: Uuid, status: &str, updated_at: &str) -> String {
    format!(
        "explanation_learning:processed:{}:{}:{}",
        goal_id, status, updated_at
    )
}

/// List of inconsistency JSON for one agent.
pub fn coherence_inconsistencies(agent: &str) -> String {
    format!("coherence:inconsistencies:{}", agent)
}

/// Claim marking an inconsistency as already materialised.
pub fn coherence_seen(inconsistency_id: &str) -> String {
    format!("coherence:seen:{}", inconsistency_id)
}

/// Resolution mapping from a synthesised goal back to its inconsistency.
pub fn coherence_goal_mapping(curiosity_goal_id: &str) -> String {
    format!("coherence:goal_mapping:{}", curiosity_goal_id)
}

/// List of fact JSON for one domain.
pub fn facts(domain: &str) -> String {
    format!("memory:facts:{}", domain)
}

/// Hash of concept name → concept JSON.
pub fn concepts() -> String {
    "memory:concepts".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_matches_contract() {
        let id = Uuid::nil();
        assert_eq!(hypotheses("agent_1"), "fsm:agent_1:hypotheses");
        assert_eq!(
            curiosity_goals("physics"),
            "reasoning:curiosity_goals:physics"
        );
        assert_eq!(beliefs("physics"), "reasoning:beliefs:physics");
        assert_eq!(goal(id), format!("goal:{}", id));
        assert_eq!(goals_active("agent_1"), "goals:agent_1:active");
        assert_eq!(goals_history("agent_1"), "goals:agent_1:history");
        assert_eq!(workflow(id), format!("workflow:{}", id));
        assert_eq!(workflow_fingerprint("abc"), "workflow:fingerprint:abc");
        assert_eq!(file_metadata(id), format!("file:metadata:{}", id));
        assert_eq!(file_by_name("out.md"), "file:by_name:out.md");
        assert_eq!(file_by_workflow(id), format!("file:by_workflow:{}", id));
        assert_eq!(
            learning_stats("physics"),
            "explanation_learning:stats:physics"
        );
        assert_eq!(
            confidence_scaling("physics"),
            "explanation_learning:confidence_scaling:physics"
        );
        assert_eq!(
            coherence_inconsistencies("agent_1"),
            "coherence:inconsistencies:agent_1"
        );
        assert_eq!(
            coherence_goal_mapping("g1"),
            "coherence:goal_mapping:g1"
        );
    }
}
