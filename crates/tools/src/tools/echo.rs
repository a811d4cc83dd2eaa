use crate::error::ToolError;
use crate::tools::base::Tool;
use async_trait::async_trait;
use attache_runtime::TenantContext;
use serde_json::json;

/// Diagnostic tool that reflects its input back.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn description(&self) -> &'static str {
        "Echoes input back"
    }

    fn schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "message": {"type": "string"}
            },
            "required": ["message"]
        })
    }

    async fn execute(
        &self,
        input: serde_json::Value,
        _tenant: &TenantContext,
    ) -> Result<serde_json::Value, ToolError> {
        if input.get("message").and_then(|value| value.as_str()).is_none() {
            return Err(ToolError::Validation(
                "message must be a string".to_string(),
            ));
        }
        Ok(input)
    }
}
