//! HTTP model client speaking an Anthropic-style messages API.

use crate::interfaces::{ModelClient, ModelError};
use crate::types::{ModelReply, ToolCall, ToolSchema, TranscriptEntry};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Connection settings for the messages endpoint.
#[derive(Debug, Clone)]
pub struct ModelEndpoint {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub request_timeout: Duration,
}

/// `ModelClient` backed by an HTTP messages endpoint. One request per
/// completion; failures are classified, never retried here.
pub struct HttpModelClient {
    endpoint: ModelEndpoint,
    http: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    messages: Vec<WireMessage>,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

#[derive(Debug, Serialize, PartialEq)]
struct WireMessage {
    role: &'static str,
    content: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(other)]
    Unknown,
}

impl HttpModelClient {
    pub fn new(endpoint: ModelEndpoint) -> Result<Self, ModelError> {
        let http = reqwest::Client::builder()
            .timeout(endpoint.request_timeout)
            .build()
            .map_err(|err| ModelError::Transport(err.to_string()))?;
        Ok(Self { endpoint, http })
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn complete(
        &self,
        system_prompt: &str,
        tools: &[ToolSchema],
        transcript: &[TranscriptEntry],
    ) -> Result<ModelReply, ModelError> {
        let request = MessagesRequest {
            model: &self.endpoint.model,
            max_tokens: self.endpoint.max_tokens,
            system: system_prompt,
            tools: tools
                .iter()
                .map(|tool| WireTool {
                    name: &tool.name,
                    description: &tool.description,
                    input_schema: &tool.input_schema,
                })
                .collect(),
            messages: wire_messages(transcript),
        };

        debug!(
            model = %self.endpoint.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "calling model backend"
        );

        let url = format!(
            "{}/v1/messages",
            self.endpoint.base_url.trim_end_matches('/')
        );
        let response = self
            .http
            .post(url)
            .header("x-api-key", &self.endpoint.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|err| ModelError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "model backend returned error");
            return Err(classify_status(status.as_u16(), body));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|err| ModelError::InvalidResponse(err.to_string()))?;
        parse_reply(parsed)
    }
}

/// Map the transcript to wire messages. Tool outcomes ride in user-role
/// messages as `tool_result` blocks; consecutive same-role messages are
/// merged because the upstream API requires strict role alternation.
fn wire_messages(transcript: &[TranscriptEntry]) -> Vec<WireMessage> {
    let mut messages: Vec<WireMessage> = Vec::with_capacity(transcript.len());

    for entry in transcript {
        let (role, blocks) = match entry {
            TranscriptEntry::UserText { content } => (
                "user",
                vec![json!({ "type": "text", "text": content })],
            ),
            TranscriptEntry::AssistantText { content } => (
                "assistant",
                vec![json!({ "type": "text", "text": content })],
            ),
            TranscriptEntry::AssistantToolRequest { calls } => (
                "assistant",
                calls
                    .iter()
                    .map(|call| {
                        json!({
                            "type": "tool_use",
                            "id": call.id,
                            "name": call.name,
                            "input": call.input,
                        })
                    })
                    .collect(),
            ),
            TranscriptEntry::ToolOutcome { results } => (
                "user",
                results
                    .iter()
                    .map(|result| {
                        json!({
                            "type": "tool_result",
                            "tool_use_id": result.tool_call_id,
                            "content": result.result.to_string(),
                            "is_error": result.is_error,
                        })
                    })
                    .collect(),
            ),
        };

        match messages.last_mut() {
            Some(last) if last.role == role => last.content.extend(blocks),
            _ => messages.push(WireMessage { role, content: blocks }),
        }
    }

    messages
}

fn parse_reply(response: MessagesResponse) -> Result<ModelReply, ModelError> {
    if response.stop_reason.as_deref() == Some("tool_use") {
        let calls: Vec<ToolCall> = response
            .content
            .into_iter()
            .filter_map(|block| match block {
                ResponseBlock::ToolUse { id, name, input } => Some(ToolCall { id, name, input }),
                _ => None,
            })
            .collect();
        if calls.is_empty() {
            return Err(ModelError::InvalidResponse(
                "tool_use stop reason without tool_use blocks".to_string(),
            ));
        }
        return Ok(ModelReply::ToolUse { calls });
    }

    // First text block; a reply with none is a defined, empty outcome.
    let text = response
        .content
        .into_iter()
        .find_map(|block| match block {
            ResponseBlock::Text { text } => Some(text),
            _ => None,
        })
        .unwrap_or_default();
    Ok(ModelReply::Final { text })
}

fn classify_status(status: u16, body: String) -> ModelError {
    match status {
        401 | 403 => ModelError::Auth(body),
        429 => ModelError::RateLimited(body),
        _ => ModelError::Upstream {
            status,
            message: body,
        },
    }
}
