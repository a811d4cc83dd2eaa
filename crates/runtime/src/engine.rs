//! Conversation engine - the bounded model/tool loop.

use crate::interfaces::{EngineError, ModelClient, ToolCatalog};
use crate::types::{
    ModelReply, StopReason, TenantContext, ToolCall, ToolResult, TranscriptEntry, TurnOutcome,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Default ceiling on tool-use rounds within one turn.
pub const DEFAULT_MAX_ROUNDS: usize = 10;

/// Answer synthesized when the round ceiling is hit.
const BUDGET_FALLBACK_TEXT: &str = "I wasn't able to finish working through the data tools \
     within the allowed number of steps. Please try a narrower request.";

/// One conversation's state and its drive loop.
///
/// The transcript is the sole mutable state the engine owns; it is
/// append-only within a turn and never truncated here. Bounding memory is
/// the session store's job (eviction), never silent pruning, which would
/// corrupt the model's context.
pub struct ConversationEngine {
    transcript: Vec<TranscriptEntry>,
    system_prompt: String,
    tenant: TenantContext,
    model: Arc<dyn ModelClient>,
    tools: Arc<dyn ToolCatalog>,
    max_rounds: usize,
}

impl ConversationEngine {
    pub fn new(
        system_prompt: String,
        tenant: TenantContext,
        model: Arc<dyn ModelClient>,
        tools: Arc<dyn ToolCatalog>,
    ) -> Self {
        Self {
            transcript: Vec::new(),
            system_prompt,
            tenant,
            model,
            tools,
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }

    /// Override the round ceiling. Clamped to at least one round.
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    pub fn tenant(&self) -> &TenantContext {
        &self.tenant
    }

    /// Execute one full user-message-to-final-answer cycle.
    ///
    /// Drives the model/tool loop until the model produces a final answer
    /// or the round ceiling is hit. Tool failures are captured as error
    /// results and fed back to the model; only model backend failures
    /// propagate, leaving the transcript exactly as it was before the
    /// failing model call.
    pub async fn turn(&mut self, user_message: &str) -> Result<TurnOutcome, EngineError> {
        if self.needs_user_entry(user_message) {
            self.transcript.push(TranscriptEntry::UserText {
                content: user_message.to_string(),
            });
        } else {
            debug!("resuming turn with pending user entry already in transcript");
        }

        let catalog = self.tools.catalog();
        let mut tool_calls: Vec<ToolCall> = Vec::new();
        let mut tool_results: Vec<ToolResult> = Vec::new();

        for round in 0..self.max_rounds {
            debug!(round = round + 1, max = self.max_rounds, "model round");

            let started = Instant::now();
            let reply = self
                .model
                .complete(&self.system_prompt, &catalog, &self.transcript)
                .await?;
            crate::metrics::record_model_latency(started.elapsed().as_secs_f64() * 1000.0);

            match reply {
                ModelReply::Final { text } => {
                    self.transcript.push(TranscriptEntry::AssistantText {
                        content: text.clone(),
                    });
                    info!(rounds = round + 1, "turn completed");
                    return Ok(TurnOutcome {
                        final_text: text,
                        tool_calls,
                        tool_results,
                        stop_reason: StopReason::Completed,
                    });
                }
                ModelReply::ToolUse { calls } => {
                    self.transcript.push(TranscriptEntry::AssistantToolRequest {
                        calls: calls.clone(),
                    });

                    // The model API requires a result for every call issued
                    // in the round, delivered together before the next call.
                    let mut results = Vec::with_capacity(calls.len());
                    for call in &calls {
                        results.push(self.execute_call(call).await);
                    }

                    tool_calls.extend(calls);
                    tool_results.extend(results.iter().cloned());
                    self.transcript
                        .push(TranscriptEntry::ToolOutcome { results });
                }
            }
        }

        warn!(
            max_rounds = self.max_rounds,
            "tool budget exceeded, synthesizing fallback answer"
        );
        self.transcript.push(TranscriptEntry::AssistantText {
            content: BUDGET_FALLBACK_TEXT.to_string(),
        });
        Ok(TurnOutcome {
            final_text: BUDGET_FALLBACK_TEXT.to_string(),
            tool_calls,
            tool_results,
            stop_reason: StopReason::ToolBudgetExceeded,
        })
    }

    /// A turn retried after a backend failure finds its user message (or the
    /// last round's tool outcome) already at the transcript tail; appending
    /// again would break entry alternation. Resume from where the failed
    /// attempt stopped instead.
    fn needs_user_entry(&self, user_message: &str) -> bool {
        match self.transcript.last() {
            Some(TranscriptEntry::UserText { content }) => content != user_message,
            Some(TranscriptEntry::ToolOutcome { .. }) => false,
            _ => true,
        }
    }

    /// Execute one requested call. Never faults: executor failure and
    /// unknown tool names become error results the model can react to.
    async fn execute_call(&self, call: &ToolCall) -> ToolResult {
        info!(tool = %call.name, "executing tool");

        let Some(executor) = self.tools.lookup(&call.name) else {
            warn!(tool = %call.name, "unknown tool requested");
            crate::metrics::increment_tool_errors();
            return ToolResult::error(call, format!("unknown tool: {}", call.name));
        };

        let started = Instant::now();
        let outcome = executor.invoke(call.input.clone(), &self.tenant).await;
        crate::metrics::record_tool_latency(started.elapsed().as_secs_f64() * 1000.0);

        match outcome {
            Ok(value) => ToolResult::ok(call, value),
            Err(failure) => {
                warn!(tool = %call.name, error = %failure, "tool execution failed");
                crate::metrics::increment_tool_errors();
                ToolResult::error(call, failure.to_string())
            }
        }
    }
}
