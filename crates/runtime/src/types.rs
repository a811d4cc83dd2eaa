//! Core type definitions for the Attache runtime.

use serde::{Deserialize, Serialize};
use serde_json::json;

/// Opaque tenant identifier passed to every tool execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext(String);

impl TenantContext {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Correlation token issued by the model, echoed back in the result.
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// Outcome of a single tool invocation. Exactly one exists per `ToolCall`
/// issued in a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub result: serde_json::Value,
    pub is_error: bool,
}

impl ToolResult {
    /// Successful result for a call.
    pub fn ok(call: &ToolCall, result: serde_json::Value) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            result,
            is_error: false,
        }
    }

    /// Failed result for a call. The message is data the model can see and
    /// react to in the next round.
    pub fn error(call: &ToolCall, message: impl Into<String>) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            result: json!({ "error": message.into() }),
            is_error: true,
        }
    }
}

/// Schema entry advertised to the model for one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// One item in a conversation's ordered history.
///
/// Entries alternate between the user-turn role (`UserText`, `ToolOutcome`)
/// and the assistant-turn role (`AssistantText`, `AssistantToolRequest`) at
/// the outer level. A `ToolOutcome` is the system's reply to the assistant's
/// request and is fed back to the model as if user-supplied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TranscriptEntry {
    UserText { content: String },
    AssistantText { content: String },
    AssistantToolRequest { calls: Vec<ToolCall> },
    ToolOutcome { results: Vec<ToolResult> },
}

impl TranscriptEntry {
    /// Whether this entry plays the user-turn role at the outer level.
    pub fn is_user_turn(&self) -> bool {
        matches!(self, Self::UserText { .. } | Self::ToolOutcome { .. })
    }
}

/// Structured reply from the model backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelReply {
    /// The model produced a final answer.
    Final { text: String },
    /// The model requires one or more tool invocations before continuing.
    ToolUse { calls: Vec<ToolCall> },
}

/// Why a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model produced a final answer.
    Completed,
    /// The round ceiling was hit and a fallback answer was synthesized.
    ToolBudgetExceeded,
}

/// Observable result of one turn, handed back across the transport boundary.
///
/// Carries the full audit trail of the turn; no internal transcript
/// representation crosses this boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub final_text: String,
    pub tool_calls: Vec<ToolCall>,
    pub tool_results: Vec<ToolResult>,
    pub stop_reason: StopReason,
}
