//! Progress events published by the autonomous loop.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

/// Kind of an [`IterationEvent`], serialized as the `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    TaskInfo,
    IterationStart,
    IterationEnd,
    Error,
    Complete,
}

/// Token counts reported by the chat API for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenCounts {
    pub prompt: u64,
    pub completion: u64,
    pub total: u64,
}

/// One step of the control loop, as seen by observers.
///
/// Built once with [`IterationEvent::new`] plus the `with_*` builders and never
/// mutated after it is published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IterationEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub iteration: u32,
    /// Iteration cap for the run; 0 means unbounded.
    pub max_iter: u32,
    /// RFC 3339 UTC timestamp, second precision.
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<TokenCounts>,
    /// Instruction the orchestrator model sent to the agent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orchestrator: Option<String>,
    /// Settled, cleaned pane output the agent produced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl IterationEvent {
    pub fn new(kind: EventKind, iteration: u32, max_iter: u32) -> Self {
        Self {
            kind,
            iteration,
            max_iter,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            duration_ms: None,
            tokens: None,
            orchestrator: None,
            agent_output: None,
            error: None,
            task: None,
            model: None,
        }
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_tokens(mut self, tokens: TokenCounts) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn with_orchestrator(mut self, message: impl Into<String>) -> Self {
        self.orchestrator = Some(message.into());
        self
    }

    pub fn with_agent_output(mut self, output: impl Into<String>) -> Self {
        self.agent_output = Some(output.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn optional_fields_are_omitted() {
        let event = IterationEvent::new(EventKind::IterationStart, 3, 10);
        let value: Value = serde_json::to_value(&event).expect("serialize");
        let object = value.as_object().expect("object");

        assert_eq!(object["type"], "iteration_start");
        assert_eq!(object["iteration"], 3);
        assert_eq!(object["max_iter"], 10);
        assert!(object.contains_key("timestamp"));
        assert!(!object.contains_key("duration_ms"));
        assert!(!object.contains_key("tokens"));
        assert!(!object.contains_key("error"));
    }

    #[test]
    fn iteration_end_carries_tokens_and_output() {
        let event = IterationEvent::new(EventKind::IterationEnd, 1, 0)
            .with_duration_ms(1500)
            .with_tokens(TokenCounts {
                prompt: 10,
                completion: 5,
                total: 15,
            })
            .with_orchestrator("ls")
            .with_agent_output("file.txt");
        let value: Value = serde_json::to_value(&event).expect("serialize");

        assert_eq!(value["duration_ms"], 1500);
        assert_eq!(value["tokens"]["total"], 15);
        assert_eq!(value["orchestrator"], "ls");
        assert_eq!(value["agent_output"], "file.txt");
    }

    #[test]
    fn timestamp_is_rfc3339_utc() {
        let event = IterationEvent::new(EventKind::Complete, 1, 0);
        assert!(event.timestamp.ends_with('Z'), "{}", event.timestamp);
        assert!(chrono::DateTime::parse_from_rfc3339(&event.timestamp).is_ok());
    }
}
