//! Abstract interfaces for runtime dependencies.

use crate::types::{ModelReply, TenantContext, ToolSchema, TranscriptEntry};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Classified model backend failure. Never retried by the engine; retry
/// policy belongs to the transport layer.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Authentication rejected: {0}")]
    Auth(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Upstream failure (status {status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Engine-level failure surfaced to the caller of `turn`.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Model backend error: {0}")]
    Model(#[from] ModelError),
}

/// Uniform tool invocation failure. The engine absorbs it into an error
/// `ToolResult` instead of letting it escape the turn.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct ToolFailure(pub String);

/// Language-model backend interface.
///
/// One completion: system prompt, tool catalog, and the full transcript in;
/// a final answer or tool-invocation requests out.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        tools: &[ToolSchema],
        transcript: &[TranscriptEntry],
    ) -> Result<ModelReply, ModelError>;
}

/// Name-based tool dispatch. The engine only needs lookup and the schema
/// catalog; it never inspects executor internals.
pub trait ToolCatalog: Send + Sync {
    fn lookup(&self, name: &str) -> Option<Arc<dyn ToolExecutor>>;

    fn catalog(&self) -> Vec<ToolSchema>;
}

/// Uniform invoke contract for one tool.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn invoke(
        &self,
        input: serde_json::Value,
        tenant: &TenantContext,
    ) -> Result<serde_json::Value, ToolFailure>;
}
