//! Autonomous mode: the orchestrator model drives the agent until it reports
//! completion, the iteration cap is reached, or the API keeps failing.

use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use dashboard::{EventBroker, EventKind, IterationEvent, emit};
use tracing::{debug, info, instrument, warn};

use crate::core::conversation::{ChatMessage, Conversation, Role};
use crate::core::facts::{extract_fact_lines, merge_facts};
use crate::core::pane::clean_pane_output;
use crate::deliver::deliver;
use crate::error::{SettleError, find_settle_error};
use crate::exit_codes;
use crate::io::chat::ChatClient;
use crate::io::config::OrchestratorConfig;
use crate::io::memory::{FactStore, compact_facts};
use crate::io::prompt::{render_system_prompt, render_task_prompt};
use crate::io::tmux::Multiplexer;
use crate::session::SessionManager;

/// Literal the orchestrator model emits when the task is done.
pub const TASK_COMPLETE: &str = "TASK_COMPLETE";
pub const MAX_CONSECUTIVE_API_ERRORS: u32 = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct LoopConfig {
    /// 0 means no cap.
    pub max_iterations: u32,
    pub max_facts: usize,
    pub api_backoff: Duration,
    pub response_timeout: Duration,
    pub temperature: f32,
    pub compaction_temperature: f32,
    /// Display name of the coding agent, used in prompts and turns.
    pub agent_name: String,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self::from_config(&OrchestratorConfig::default())
    }
}

impl LoopConfig {
    pub fn from_config(cfg: &OrchestratorConfig) -> Self {
        Self {
            max_iterations: cfg.agent_loop.max_iterations,
            max_facts: cfg.agent_loop.max_facts,
            api_backoff: Duration::from_millis(cfg.agent_loop.api_backoff_ms),
            response_timeout: cfg.response_timeout(),
            temperature: cfg.agent_loop.temperature,
            compaction_temperature: cfg.agent_loop.compaction_temperature,
            agent_name: cfg.agent_profile().display_name,
        }
    }
}

/// Reason why `run_autonomous` stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStop {
    /// The model replied with the completion sentinel.
    Complete { iteration: u32 },
    /// The iteration cap was used up without completion.
    MaxIterations { max_iterations: u32 },
    /// Too many chat API failures in a row.
    ApiErrorsExhausted { iteration: u32, last_error: String },
}

impl LoopStop {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Complete { .. } => exit_codes::OK,
            Self::MaxIterations { .. } => exit_codes::INCOMPLETE,
            Self::ApiErrorsExhausted { .. } => exit_codes::ABORTED,
        }
    }
}

/// Summary of an autonomous run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    pub stop: LoopStop,
    /// Chat calls made by the loop itself, failed ones included.
    pub api_calls: u32,
    /// Instructions handed to the agent.
    pub deliveries: u32,
    pub facts: Vec<String>,
}

/// Collaborators the loop talks to.
pub struct LoopContext<'a, M: Multiplexer, C: ChatClient> {
    pub manager: &'a SessionManager<'a, M>,
    pub chat: &'a C,
    /// Progress events go here when the dashboard is running.
    pub broker: Option<&'a EventBroker>,
    /// Facts are saved here on every exit when set.
    pub store: Option<&'a FactStore>,
}

struct Publisher<'a, F> {
    broker: Option<&'a EventBroker>,
    on_event: F,
}

impl<F: FnMut(&IterationEvent)> Publisher<'_, F> {
    fn publish(&mut self, event: IterationEvent) {
        emit(self.broker, &event);
        (self.on_event)(&event);
    }
}

#[derive(Default)]
struct Counters {
    api_calls: u32,
    deliveries: u32,
}

/// Run the autonomous loop for `task`, starting from `facts`.
///
/// Every event is published to the broker (when present) and handed to
/// `on_event`. Facts are persisted to the store on every exit, errors
/// included, as long as there are any.
#[instrument(skip_all, fields(model = %ctx.chat.model(), max_iterations = config.max_iterations))]
pub fn run_autonomous<M, C, F>(
    ctx: &LoopContext<'_, M, C>,
    task: &str,
    facts: Vec<String>,
    config: &LoopConfig,
    on_event: F,
) -> Result<LoopOutcome>
where
    M: Multiplexer,
    C: ChatClient,
    F: FnMut(&IterationEvent),
{
    let mut publisher = Publisher {
        broker: ctx.broker,
        on_event,
    };
    let mut facts = facts;
    let mut counters = Counters::default();

    let result = drive(ctx, task, config, &mut facts, &mut counters, &mut publisher);
    persist_facts(ctx.store, &facts);

    let stop = result?;
    info!(?stop, api_calls = counters.api_calls, "autonomous loop finished");
    Ok(LoopOutcome {
        stop,
        api_calls: counters.api_calls,
        deliveries: counters.deliveries,
        facts,
    })
}

fn persist_facts(store: Option<&FactStore>, facts: &[String]) {
    let Some(store) = store else {
        return;
    };
    if facts.is_empty() {
        return;
    }
    if let Err(err) = store.save(facts) {
        warn!(err = %format!("{err:#}"), "failed to save facts");
    }
}

fn drive<M, C, F>(
    ctx: &LoopContext<'_, M, C>,
    task: &str,
    config: &LoopConfig,
    facts: &mut Vec<String>,
    counters: &mut Counters,
    publisher: &mut Publisher<'_, F>,
) -> Result<LoopStop>
where
    M: Multiplexer,
    C: ChatClient,
    F: FnMut(&IterationEvent),
{
    let max = config.max_iterations;
    let agent = config.agent_name.as_str();

    publisher.publish(
        IterationEvent::new(EventKind::TaskInfo, 0, max)
            .with_task(task)
            .with_model(ctx.chat.model()),
    );

    let mut conversation = Conversation::new(
        render_system_prompt(agent, facts)?,
        render_task_prompt(agent, task)?,
    );
    let mut last_pane = String::new();
    let mut consecutive_errors = 0u32;
    let mut iteration = 1u32;

    while max == 0 || iteration <= max {
        let started = Instant::now();
        publisher.publish(IterationEvent::new(EventKind::IterationStart, iteration, max));

        if facts.len() > config.max_facts {
            compact(ctx.chat, config, agent, facts, &mut conversation)?;
        }

        counters.api_calls += 1;
        let reply = match ctx.chat.complete(conversation.messages(), config.temperature) {
            Ok(reply) => {
                consecutive_errors = 0;
                reply
            }
            Err(err) => {
                consecutive_errors += 1;
                let text = format!("{err:#}");
                warn!(iteration, consecutive_errors, err = %text, "chat API call failed");
                publisher.publish(
                    IterationEvent::new(EventKind::Error, iteration, max).with_error(format!(
                        "API error ({consecutive_errors}/{MAX_CONSECUTIVE_API_ERRORS}): {text}"
                    )),
                );
                if consecutive_errors >= MAX_CONSECUTIVE_API_ERRORS {
                    publisher.publish(
                        IterationEvent::new(EventKind::Complete, iteration, max).with_error(
                            format!(
                                "aborted after {MAX_CONSECUTIVE_API_ERRORS} consecutive API errors"
                            ),
                        ),
                    );
                    return Ok(LoopStop::ApiErrorsExhausted {
                        iteration,
                        last_error: text,
                    });
                }
                thread::sleep(config.api_backoff);
                continue;
            }
        };

        let (stripped, new_facts) = extract_fact_lines(&reply.content);
        let instruction = if new_facts.is_empty() {
            reply.content.clone()
        } else {
            info!(count = new_facts.len(), "model saved facts");
            stripped
        };
        merge_facts(facts, new_facts);

        if instruction.contains(TASK_COMPLETE) {
            conversation.push_assistant(instruction.as_str());
            publisher.publish(
                IterationEvent::new(EventKind::IterationEnd, iteration, max)
                    .with_duration_ms(elapsed_ms(started))
                    .with_tokens(reply.usage)
                    .with_orchestrator(instruction.as_str()),
            );
            publisher.publish(
                IterationEvent::new(EventKind::Complete, iteration, max).with_task(task),
            );
            return Ok(LoopStop::Complete { iteration });
        }

        counters.deliveries += 1;
        let delivered = deliver_until_settled(ctx.manager, &instruction, &mut last_pane, config);
        let end = IterationEvent::new(EventKind::IterationEnd, iteration, max)
            .with_duration_ms(elapsed_ms(started))
            .with_tokens(reply.usage)
            .with_orchestrator(instruction.as_str());

        match delivered {
            Ok(pane) => {
                let cleaned = clean_pane_output(&pane);
                publisher.publish(end.with_agent_output(cleaned.as_str()));
                conversation.push_exchange(instruction, format!("{agent} output:\n{cleaned}"));
                last_pane = pane;
            }
            Err(err) => {
                let text = format!("{err:#}");
                warn!(iteration, err = %text, "delivery failed");
                publisher.publish(end.with_error(format!("tmux error: {text}")));
                conversation
                    .push_exchange(instruction, format!("Error sending to {agent}: {text}"));
            }
        }

        iteration += 1;
    }

    publisher.publish(
        IterationEvent::new(EventKind::Complete, max, max).with_error(format!(
            "reached maximum iterations ({max}) without task completion"
        )),
    );
    Ok(LoopStop::MaxIterations {
        max_iterations: max,
    })
}

/// Deliver and keep waiting while the agent is still busy on the same pane.
fn deliver_until_settled<M: Multiplexer>(
    manager: &SessionManager<'_, M>,
    instruction: &str,
    last_pane: &mut String,
    config: &LoopConfig,
) -> Result<String> {
    let mut result = deliver(manager, instruction, last_pane, config.response_timeout);
    loop {
        match result {
            Ok(pane) => return Ok(pane),
            Err(err) => match find_settle_error(&err) {
                Some(SettleError::StillWorking { last_pane: pane, .. }) => {
                    debug!("agent still working, waiting again");
                    last_pane.clone_from(pane);
                    result = manager.wait_for_settled_output(last_pane, config.response_timeout);
                }
                _ => return Err(err),
            },
        }
    }
}

fn compact<C: ChatClient>(
    chat: &C,
    config: &LoopConfig,
    agent: &str,
    facts: &mut Vec<String>,
    conversation: &mut Conversation,
) -> Result<()> {
    info!(count = facts.len(), threshold = config.max_facts, "compacting facts");
    let compacted = compact_facts(facts, |prompt| {
        let request = [ChatMessage::new(Role::User, prompt)];
        chat.complete(&request, config.compaction_temperature)
            .map(|reply| reply.content)
    });
    match compacted {
        Ok(compacted) => {
            info!(before = facts.len(), after = compacted.len(), "facts compacted");
            *facts = compacted;
            conversation.set_system(render_system_prompt(agent, facts)?);
        }
        Err(err) => warn!(err = %format!("{err:#}"), "fact compaction failed"),
    }
    Ok(())
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
