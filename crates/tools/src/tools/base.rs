use crate::error::ToolError;
use async_trait::async_trait;
use attache_runtime::TenantContext;

/// A named, schema-described operation the model may request.
///
/// Implementations hold whatever backend handles they need (database pools,
/// API clients); the engine only ever sees the uniform invoke contract
/// through the registry adapter.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// JSON schema for the tool's input, advertised to the model.
    fn schema(&self) -> serde_json::Value;

    async fn execute(
        &self,
        input: serde_json::Value,
        tenant: &TenantContext,
    ) -> Result<serde_json::Value, ToolError>;
}
