//! Operator transcript rendered from loop events.

use dashboard::{EventKind, IterationEvent};

/// Text block for one event, ready for stdout.
pub fn render_event(event: &IterationEvent, agent: &str) -> String {
    let mut lines = Vec::new();
    match event.kind {
        EventKind::TaskInfo => {
            lines.push(format!(
                "task: model={} max_iterations={}",
                event.model.as_deref().unwrap_or("unknown"),
                iteration_cap(event.max_iter)
            ));
            if let Some(task) = &event.task {
                lines.push(format!("task: {}", task.trim()));
            }
        }
        EventKind::IterationStart => {
            let label = if event.max_iter > 0 {
                format!("{}/{}", event.iteration, event.max_iter)
            } else {
                event.iteration.to_string()
            };
            lines.push(String::new());
            lines.push(format!("=== iteration {label} ==="));
        }
        EventKind::IterationEnd => {
            if let Some(tokens) = event.tokens {
                lines.push(format!(
                    "tokens: prompt={} completion={} total={}",
                    tokens.prompt, tokens.completion, tokens.total
                ));
            }
            if let Some(instruction) = &event.orchestrator {
                lines.push(format!("orchestrator -> {agent}:"));
                push_block(&mut lines, instruction);
            }
            if let Some(output) = &event.agent_output {
                lines.push(format!("{agent} output:"));
                push_block(&mut lines, output);
            }
            if let Some(error) = &event.error {
                lines.push(format!("error: {error}"));
            }
            if let Some(duration_ms) = event.duration_ms {
                lines.push(format!("duration: {:.1}s", duration_ms as f64 / 1000.0));
            }
        }
        EventKind::Error => {
            lines.push(format!("error: {}", event.error.as_deref().unwrap_or("unknown")));
        }
        EventKind::Complete => match &event.error {
            Some(error) => lines.push(format!("stopped: {error}")),
            None => lines.push(format!(
                "complete: task finished after {} iteration(s)",
                event.iteration
            )),
        },
    }
    lines.join("\n")
}

fn iteration_cap(max_iter: u32) -> String {
    if max_iter == 0 {
        "unlimited".to_string()
    } else {
        max_iter.to_string()
    }
}

fn push_block(lines: &mut Vec<String>, text: &str) {
    for line in text.lines() {
        lines.push(format!("  | {line}"));
    }
}
