//! In-memory session store with TTL expiry and LRU capacity eviction.

use crate::engine::{ConversationEngine, DEFAULT_MAX_ROUNDS};
use crate::interfaces::{ModelClient, ToolCatalog};
use crate::types::TenantContext;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Default system prompt applied to new sessions.
const DEFAULT_SYSTEM_PROMPT: &str =
    "You are the CRM assistant. Use the available tools to answer questions \
     about and make changes to CRM data on behalf of staff.";

/// Store tuning knobs.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Maximum live session population; overflow evicts the LRU entry.
    pub max_sessions: usize,
    /// Maximum idle duration before a session is eligible for removal.
    pub ttl: Duration,
    /// Fixed interval between background sweeps.
    pub sweep_interval: Duration,
    /// Round ceiling handed to each new engine.
    pub max_rounds: usize,
    /// Base system prompt; the tenant identifier is appended per session.
    pub system_prompt: String,
}

impl SessionConfig {
    /// Sweep far more often than sessions expire, floored at one second.
    pub fn derive_sweep_interval(ttl: Duration) -> Duration {
        (ttl / 24).max(Duration::from_secs(1))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        let ttl = Duration::from_secs(30 * 60);
        Self {
            max_sessions: 100,
            ttl,
            sweep_interval: Self::derive_sweep_interval(ttl),
            max_rounds: DEFAULT_MAX_ROUNDS,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

/// One live conversation owned by the store.
pub struct SessionEntry {
    session_id: String,
    /// Serializes turns per session: a second message for a busy session
    /// queues behind the in-flight turn (tokio mutexes are fair, so turns
    /// run in arrival order).
    pub engine: tokio::sync::Mutex<ConversationEngine>,
    created_at: DateTime<Utc>,
    last_accessed: Mutex<Instant>,
}

impl SessionEntry {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_accessed(&self) -> Instant {
        *self.last_accessed.lock()
    }

    fn touch(&self) {
        *self.last_accessed.lock() = Instant::now();
    }

    fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(*self.last_accessed.lock())
    }
}

/// Snapshot of store occupancy.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub active_count: usize,
    pub max_capacity: usize,
    pub ttl: Duration,
}

/// Owner of all live conversation engines, keyed by session id.
///
/// An explicitly constructed instance with an explicit sweep lifecycle;
/// multiple independent stores can coexist (there is no global state).
/// The index lock is held only for O(map-op) durations, never across a
/// model or tool round-trip.
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<String, Arc<SessionEntry>>>>,
    config: SessionConfig,
    model: Arc<dyn ModelClient>,
    tools: Arc<dyn ToolCatalog>,
    sweeper: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl SessionStore {
    pub fn new(
        config: SessionConfig,
        model: Arc<dyn ModelClient>,
        tools: Arc<dyn ToolCatalog>,
    ) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            config,
            model,
            tools,
            sweeper: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Return the engine entry for `session_id`, refreshing its access time;
    /// construct and insert a fresh one if absent, evicting the
    /// least-recently-used entry first when at capacity.
    ///
    /// Engine construction is cheap and synchronous, so it happens under the
    /// index lock; only `turn` execution is long-running.
    pub fn get_or_create(&self, session_id: &str, tenant: &TenantContext) -> Arc<SessionEntry> {
        let mut sessions = self.sessions.lock();

        if let Some(entry) = sessions.get(session_id) {
            entry.touch();
            return Arc::clone(entry);
        }

        if sessions.len() >= self.config.max_sessions {
            self.evict_oldest(&mut sessions);
        }

        let system_prompt = format!(
            "{}\n\nActive tenant: {}.",
            self.config.system_prompt,
            tenant.as_str()
        );
        let engine = ConversationEngine::new(
            system_prompt,
            tenant.clone(),
            Arc::clone(&self.model),
            Arc::clone(&self.tools),
        )
        .with_max_rounds(self.config.max_rounds);

        let entry = Arc::new(SessionEntry {
            session_id: session_id.to_string(),
            engine: tokio::sync::Mutex::new(engine),
            created_at: Utc::now(),
            last_accessed: Mutex::new(Instant::now()),
        });

        info!(session = session_id, tenant = tenant.as_str(), "created session");
        sessions.insert(session_id.to_string(), Arc::clone(&entry));
        entry
    }

    /// Delete the session unconditionally. Idempotent.
    pub fn remove(&self, session_id: &str) -> bool {
        let removed = self.sessions.lock().remove(session_id).is_some();
        if removed {
            info!(session = session_id, "removed session");
        }
        removed
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.lock().contains_key(session_id)
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            active_count: self.sessions.lock().len(),
            max_capacity: self.config.max_sessions,
            ttl: self.config.ttl,
        }
    }

    /// Remove entries idle past the TTL; returns how many were removed.
    pub fn sweep(&self) -> usize {
        sweep_sessions(&self.sessions, self.config.ttl)
    }

    /// Spawn the periodic sweep task. Idempotent while running; `stop` or
    /// dropping the store ends it. The task shares only the session index,
    /// not the store itself.
    pub fn start(&self) {
        let mut sweeper = self.sweeper.lock();
        if sweeper.is_some() {
            return;
        }

        let sessions = Arc::clone(&self.sessions);
        let ttl = self.config.ttl;
        let sweep_interval = self.config.sweep_interval;
        *sweeper = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = sweep_sessions(&sessions, ttl);
                if removed > 0 {
                    debug!(removed, "sweep removed expired sessions");
                }
            }
        }));
    }

    /// Stop the sweep task if running.
    pub fn stop(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
    }

    fn evict_oldest(&self, sessions: &mut HashMap<String, Arc<SessionEntry>>) {
        let oldest = sessions
            .iter()
            .min_by_key(|(_, entry)| entry.last_accessed())
            .map(|(session_id, _)| session_id.clone());

        if let Some(session_id) = oldest {
            sessions.remove(&session_id);
            crate::metrics::increment_session_evictions();
            info!(session = %session_id, "evicted least-recently-used session");
        }
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Snapshot-then-re-verify expiry pass: the index lock is never held across
/// the full scan, and the re-check under the lock means a concurrent touch
/// or replacement wins over removal — a racing `get_or_create` observes
/// either the pre-sweep entry or a fresh one it creates.
fn sweep_sessions(sessions: &Mutex<HashMap<String, Arc<SessionEntry>>>, ttl: Duration) -> usize {
    let now = Instant::now();
    let snapshot: Vec<(String, Arc<SessionEntry>)> = {
        let sessions = sessions.lock();
        sessions
            .iter()
            .map(|(id, entry)| (id.clone(), Arc::clone(entry)))
            .collect()
    };

    let mut removed = 0;
    for (session_id, entry) in snapshot {
        if entry.idle_for(now) < ttl {
            continue;
        }

        let mut sessions = sessions.lock();
        let still_expired = sessions
            .get(&session_id)
            .map(|current| Arc::ptr_eq(current, &entry) && current.idle_for(now) >= ttl)
            .unwrap_or(false);
        if still_expired {
            sessions.remove(&session_id);
            removed += 1;
            crate::metrics::increment_session_expirations();
            info!(
                session = %session_id,
                created_at = %entry.created_at(),
                "session expired"
            );
        }
    }
    removed
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::interfaces::{ModelError, ToolExecutor};
    use crate::types::{ModelReply, ToolSchema, TranscriptEntry};
    use async_trait::async_trait;
    use tokio::time::advance;

    struct NullModel;

    #[async_trait]
    impl ModelClient for NullModel {
        async fn complete(
            &self,
            _system_prompt: &str,
            _tools: &[ToolSchema],
            _transcript: &[TranscriptEntry],
        ) -> Result<ModelReply, ModelError> {
            Ok(ModelReply::Final {
                text: "ok".to_string(),
            })
        }
    }

    struct EmptyCatalog;

    impl ToolCatalog for EmptyCatalog {
        fn lookup(&self, _name: &str) -> Option<Arc<dyn ToolExecutor>> {
            None
        }

        fn catalog(&self) -> Vec<ToolSchema> {
            Vec::new()
        }
    }

    fn store_with_capacity(max_sessions: usize, ttl: Duration) -> SessionStore {
        let config = SessionConfig {
            max_sessions,
            ttl,
            sweep_interval: SessionConfig::derive_sweep_interval(ttl),
            ..SessionConfig::default()
        };
        SessionStore::new(config, Arc::new(NullModel), Arc::new(EmptyCatalog))
    }

    fn tenant() -> TenantContext {
        TenantContext::new("acme")
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_or_create_returns_same_entry_and_refreshes_access() {
        let store = store_with_capacity(10, Duration::from_secs(60));

        let first = store.get_or_create("s1", &tenant());
        let first_access = first.last_accessed();

        advance(Duration::from_millis(5)).await;

        let second = store.get_or_create("s1", &tenant());
        assert!(Arc::ptr_eq(&first, &second));
        assert!(second.last_accessed() >= first_access);
    }

    #[tokio::test(start_paused = true)]
    async fn test_population_never_exceeds_capacity() {
        let store = store_with_capacity(3, Duration::from_secs(60));

        for i in 0..10 {
            store.get_or_create(&format!("s{i}"), &tenant());
            advance(Duration::from_millis(1)).await;
            assert!(store.stats().active_count <= 3);
        }
        assert_eq!(store.stats().active_count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_targets_least_recently_accessed() {
        let store = store_with_capacity(2, Duration::from_secs(60));

        store.get_or_create("a", &tenant());
        advance(Duration::from_millis(1)).await;
        store.get_or_create("b", &tenant());
        advance(Duration::from_millis(1)).await;

        // Refresh "a", so "b" is now the LRU entry.
        store.get_or_create("a", &tenant());
        advance(Duration::from_millis(1)).await;

        store.get_or_create("c", &tenant());

        assert!(store.contains("a"));
        assert!(!store.contains("b"));
        assert!(store.contains("c"));
        assert_eq!(store.stats().active_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_idle_session_and_recreation_is_fresh() {
        let store = store_with_capacity(10, Duration::from_millis(1000));

        {
            let entry = store.get_or_create("s1", &tenant());
            let mut engine = entry.engine.lock().await;
            engine.turn("hello").await.unwrap();
            assert_eq!(engine.transcript().len(), 2);
        }

        advance(Duration::from_millis(1500)).await;
        assert_eq!(store.sweep(), 1);
        assert!(!store.contains("s1"));

        // No state leaks from the expired session.
        let entry = store.get_or_create("s1", &tenant());
        assert!(entry.engine.lock().await.transcript().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_defeats_sweep() {
        let store = store_with_capacity(10, Duration::from_millis(1000));

        // Created at t=0, touched at t=50.
        store.get_or_create("s1", &tenant());
        advance(Duration::from_millis(50)).await;
        store.get_or_create("s1", &tenant());

        // t=1010: past TTL since creation, but only 960ms since the touch.
        advance(Duration::from_millis(960)).await;
        assert_eq!(store.sweep(), 0);
        assert!(store.contains("s1"));

        // t=1160: past TTL since the touch.
        advance(Duration::from_millis(150)).await;
        assert_eq!(store.sweep(), 1);
        assert!(!store.contains("s1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_is_idempotent() {
        let store = store_with_capacity(10, Duration::from_secs(60));

        store.get_or_create("s1", &tenant());
        assert!(store.remove("s1"));
        assert!(!store.remove("s1"));
        assert!(!store.contains("s1"));
        assert!(!store.remove("never_existed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_reflect_configuration() {
        let store = store_with_capacity(7, Duration::from_secs(90));
        store.get_or_create("s1", &tenant());
        store.get_or_create("s2", &tenant());

        let stats = store.stats();
        assert_eq!(stats.active_count, 2);
        assert_eq!(stats.max_capacity, 7);
        assert_eq!(stats.ttl, Duration::from_secs(90));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_obtained_before_sweep_stays_usable() {
        let store = store_with_capacity(10, Duration::from_millis(100));

        let entry = store.get_or_create("s1", &tenant());
        advance(Duration::from_millis(200)).await;
        assert_eq!(store.sweep(), 1);

        // The caller's handle outlives removal from the index.
        let mut engine = entry.engine.lock().await;
        let outcome = engine.turn("still here").await.unwrap();
        assert_eq!(outcome.final_text, "ok");
    }

    #[tokio::test(start_paused = true)]
    async fn test_tenant_scoped_prompt_and_context() {
        let store = store_with_capacity(10, Duration::from_secs(60));
        let entry = store.get_or_create("s1", &TenantContext::new("globex"));
        assert_eq!(entry.engine.lock().await.tenant().as_str(), "globex");
    }
}
