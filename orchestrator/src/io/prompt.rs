//! Prompt rendering for the orchestrator model.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use minijinja::{Environment, context};

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");
const TASK_TEMPLATE: &str = include_str!("prompts/task.md");
const COMPACT_TEMPLATE: &str = include_str!("prompts/compact.md");

static ENGINE: LazyLock<Environment<'static>> = LazyLock::new(|| {
    let mut env = Environment::new();
    env.add_template("system", SYSTEM_TEMPLATE)
        .expect("system template should be valid");
    env.add_template("task", TASK_TEMPLATE)
        .expect("task template should be valid");
    env.add_template("compact", COMPACT_TEMPLATE)
        .expect("compact template should be valid");
    env
});

/// System instruction, with remembered facts appended when there are any.
pub fn render_system_prompt(agent: &str, facts: &[String]) -> Result<String> {
    let template = ENGINE.get_template("system")?;
    let rendered = template.render(context! { agent => agent, facts => facts })?;
    Ok(rendered)
}

/// First user turn introducing the task.
pub fn render_task_prompt(agent: &str, task: &str) -> Result<String> {
    let template = ENGINE.get_template("task")?;
    let rendered = template.render(context! { agent => agent, task => task.trim() })?;
    Ok(rendered)
}

/// Instruction asking the model to shrink the fact list.
pub fn render_compaction_prompt(facts: &[String]) -> Result<String> {
    let facts_json = serde_json::to_string(facts).context("serialize facts")?;
    let template = ENGINE.get_template("compact")?;
    let rendered = template.render(context! { facts_json => facts_json })?;
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_names_agent_and_markers() {
        let prompt = render_system_prompt("Claude Code", &[]).expect("render");
        assert!(prompt.contains("driving a Claude Code CLI session"));
        assert!(prompt.contains("MEMORY_SAVE:"));
        assert!(prompt.contains("TASK_COMPLETE"));
        assert!(!prompt.contains("Memory from previous sessions"));
    }

    #[test]
    fn system_prompt_lists_facts() {
        let facts = vec!["uses cargo".to_string(), "tests live in tests/".to_string()];
        let prompt = render_system_prompt("Codex", &facts).expect("render");
        assert!(prompt.ends_with(
            "## Memory from previous sessions\n- uses cargo\n- tests live in tests/"
        ));
    }

    #[test]
    fn task_prompt_carries_task() {
        let prompt = render_task_prompt("Codex", "  fix the build \n").expect("render");
        assert!(prompt.starts_with("Task: fix the build\n\n"));
        assert!(prompt.contains("connected to the Codex CLI"));
    }

    #[test]
    fn compaction_prompt_embeds_json_without_escaping() {
        let facts = vec!["a \"quoted\" <fact>".to_string()];
        let prompt = render_compaction_prompt(&facts).expect("render");
        assert!(prompt.ends_with(r#"["a \"quoted\" <fact>"]"#), "{prompt}");
        assert!(prompt.contains("JSON array of strings"));
    }
}
