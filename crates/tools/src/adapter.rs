//! Adapter from the tool registry to the runtime catalog seam.

use crate::error::ToolError;
use crate::registry::ToolRegistry;
use crate::tools::Tool;
use async_trait::async_trait;
use attache_runtime::{TenantContext, ToolCatalog, ToolExecutor, ToolFailure, ToolSchema};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, warn};

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Presents a `ToolRegistry` to the engine as a `ToolCatalog`, wrapping
/// each execution with a timeout and panic isolation.
pub struct RegistryCatalog {
    registry: Arc<ToolRegistry>,
    call_timeout: Duration,
}

impl RegistryCatalog {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }
}

impl ToolCatalog for RegistryCatalog {
    fn lookup(&self, name: &str) -> Option<Arc<dyn ToolExecutor>> {
        self.registry.get(name).map(|tool| {
            Arc::new(GuardedExecutor {
                tool,
                call_timeout: self.call_timeout,
            }) as Arc<dyn ToolExecutor>
        })
    }

    fn catalog(&self) -> Vec<ToolSchema> {
        self.registry.schemas()
    }
}

/// One tool behind the uniform invoke contract. Runs the execution in a
/// spawned task so a panicking tool is isolated from the turn.
struct GuardedExecutor {
    tool: Arc<dyn Tool>,
    call_timeout: Duration,
}

#[async_trait]
impl ToolExecutor for GuardedExecutor {
    async fn invoke(
        &self,
        input: serde_json::Value,
        tenant: &TenantContext,
    ) -> Result<serde_json::Value, ToolFailure> {
        let tool = Arc::clone(&self.tool);
        let tenant = tenant.clone();
        let name = tool.name();

        let handle = tokio::spawn(async move { tool.execute(input, &tenant).await });

        match timeout(self.call_timeout, handle).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(err))) => Err(ToolFailure(err.to_string())),
            Ok(Err(join_err)) => {
                if join_err.is_panic() {
                    error!(tool = name, "tool execution panicked");
                } else {
                    error!(tool = name, "tool execution cancelled");
                }
                Err(ToolFailure(ToolError::Internal.to_string()))
            }
            Err(_) => {
                warn!(tool = name, timeout = ?self.call_timeout, "tool execution timed out");
                Err(ToolFailure(ToolError::Timeout.to_string()))
            }
        }
    }
}
