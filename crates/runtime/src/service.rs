//! Chat service - the facade a transport adapter drives.

use crate::interfaces::EngineError;
use crate::store::{SessionStats, SessionStore};
use crate::types::{TenantContext, TurnOutcome};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Service-level failure surfaced to the transport layer.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Turn timed out after {0:?}")]
    TurnTimeout(Duration),

    #[error("Service shutting down")]
    ShuttingDown,

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Entry point for inbound chat traffic.
///
/// Holds the session store, a global concurrency limiter, and an optional
/// per-turn deadline. Message framing, authentication, and per-message-type
/// routing belong to the transport adapter that owns this service.
pub struct ChatService {
    store: Arc<SessionStore>,
    limiter: Arc<Semaphore>,
    turn_timeout: Option<Duration>,
}

impl ChatService {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self::with_limits(store, 100, None)
    }

    /// Create a service with a custom concurrency ceiling and an optional
    /// overall deadline spanning all model/tool rounds of one turn.
    pub fn with_limits(
        store: Arc<SessionStore>,
        max_concurrent_turns: usize,
        turn_timeout: Option<Duration>,
    ) -> Self {
        Self {
            store,
            limiter: Arc::new(Semaphore::new(max_concurrent_turns)),
            turn_timeout,
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Process one user message against its session.
    ///
    /// Work on the same session id is serialized (FIFO by arrival); work on
    /// different sessions proceeds in parallel. On timeout the transcript
    /// keeps whatever was appended before the cutoff, so the next turn has
    /// continuity rather than amnesia.
    pub async fn chat(
        &self,
        session_id: &str,
        tenant: &TenantContext,
        message: &str,
    ) -> Result<TurnOutcome, ServiceError> {
        if message.trim().is_empty() {
            return Err(ServiceError::InvalidMessage(
                "message must be non-empty".to_string(),
            ));
        }

        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| ServiceError::ShuttingDown)?;

        let turn_id = Uuid::new_v4();
        info!(%turn_id, session = session_id, "processing chat message");

        let entry = self.store.get_or_create(session_id, tenant);
        let mut engine = entry.engine.lock().await;

        let result = match self.turn_timeout {
            Some(deadline) => match tokio::time::timeout(deadline, engine.turn(message)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        %turn_id,
                        session = session_id,
                        "turn exceeded deadline; partial transcript retained"
                    );
                    return Err(ServiceError::TurnTimeout(deadline));
                }
            },
            None => engine.turn(message).await,
        };

        match result {
            Ok(outcome) => {
                info!(
                    %turn_id,
                    session = session_id,
                    stop_reason = ?outcome.stop_reason,
                    tool_calls = outcome.tool_calls.len(),
                    "turn finished"
                );
                Ok(outcome)
            }
            Err(err) => {
                // The session survives a failed turn; the caller may retry.
                error!(%turn_id, session = session_id, error = %err, "turn failed");
                Err(err.into())
            }
        }
    }

    /// Drop a session's history. Idempotent.
    pub fn clear(&self, session_id: &str) -> bool {
        self.store.remove(session_id)
    }

    pub fn stats(&self) -> SessionStats {
        self.store.stats()
    }
}
