//! The Context Store: per-session conversation history with TTL, backed by
//! a process-local read-through cache and an optional durable backend.
//!
//! The cache is authoritative within a process; the durable backend (any
//! `qorch_storage::KvBackend`) is best-effort and bounded by TTL across
//! processes. If the backend is unavailable, every operation degrades to
//! local-only and logs a warning exactly once per failure episode, never
//! failing the call for backing unavailability — the degrade-and-warn-once
//! policy in section 4.2 of the specification.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use qorch_core::model::{Context, ConversationMessage};
use qorch_core::Result;
use qorch_storage::KvBackend;
use tracing::warn;

fn session_key(session_id: &str) -> String {
    format!("context:{session_id}")
}

pub struct ContextStore {
    cache: DashMap<String, Context>,
    backend: Option<Arc<dyn KvBackend>>,
    max_history: usize,
    default_ttl: Duration,
    backend_degraded: AtomicBool,
}

impl ContextStore {
    #[must_use]
    pub fn new(max_history: usize, default_ttl: Duration) -> Self {
        Self {
            cache: DashMap::new(),
            backend: None,
            max_history,
            default_ttl,
            backend_degraded: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn with_backend(
        max_history: usize,
        default_ttl: Duration,
        backend: Arc<dyn KvBackend>,
    ) -> Self {
        Self {
            cache: DashMap::new(),
            backend: Some(backend),
            max_history,
            default_ttl,
            backend_degraded: AtomicBool::new(false),
        }
    }

    /// Persists `context` to the durable backend if configured, degrading
    /// silently (after the first warning of the episode) on failure.
    async fn persist(&self, context: &Context) {
        let Some(backend) = &self.backend else {
            return;
        };
        let key = session_key(&context.session_id);
        let bytes = match serde_json::to_vec(context) {
            Ok(b) => b,
            Err(e) => {
                self.note_degraded(&format!("failed to serialize context: {e}"));
                return;
            }
        };
        match backend.set(&key, bytes, Some(self.default_ttl)).await {
            Ok(()) => self.note_recovered(),
            Err(e) => self.note_degraded(&format!("durable context write failed: {e}")),
        }
    }

    fn note_degraded(&self, message: &str) {
        if !self.backend_degraded.swap(true, Ordering::SeqCst) {
            warn!(%message, "context store durable backend unavailable, degrading to local-only");
        }
    }

    fn note_recovered(&self) {
        self.backend_degraded.store(false, Ordering::SeqCst);
    }

    /// Returns the cached context, falling back to the durable backend (and
    /// re-populating the cache) if present there but not locally cached.
    pub async fn get(&self, session_id: &str) -> Result<Option<Context>> {
        if let Some(ctx) = self.cache.get(session_id) {
            return Ok(Some(ctx.clone()));
        }
        let Some(backend) = &self.backend else {
            return Ok(None);
        };
        match backend.get(&session_key(session_id)).await {
            Ok(Some(bytes)) => {
                self.note_recovered();
                match serde_json::from_slice::<Context>(&bytes) {
                    Ok(ctx) => {
                        self.cache.insert(session_id.to_string(), ctx.clone());
                        Ok(Some(ctx))
                    }
                    Err(e) => {
                        self.note_degraded(&format!("failed to deserialize context: {e}"));
                        Ok(None)
                    }
                }
            }
            Ok(None) => {
                self.note_recovered();
                Ok(None)
            }
            Err(e) => {
                self.note_degraded(&format!("durable context read failed: {e}"));
                Ok(None)
            }
        }
    }

    pub async fn get_or_create(&self, session_id: &str, user_id: &str) -> Result<Context> {
        if let Some(ctx) = self.get(session_id).await? {
            return Ok(ctx);
        }
        let ctx = Context::new(session_id, user_id, self.max_history);
        self.save(ctx.clone()).await?;
        Ok(ctx)
    }

    pub async fn save(&self, context: Context) -> Result<()> {
        self.persist(&context).await;
        self.cache.insert(context.session_id.clone(), context);
        Ok(())
    }

    /// Appends a timestamped message, dropping the oldest entry once
    /// history exceeds `max_history`. TTL is refreshed as part of the
    /// resulting write, per the specification's "TTL is refreshed on every
    /// write" rule.
    pub async fn update_conversation(
        &self,
        session_id: &str,
        message: ConversationMessage,
    ) -> Result<()> {
        let mut ctx = self
            .get(session_id)
            .await?
            .unwrap_or_else(|| Context::new(session_id, "unknown", self.max_history));
        ctx.push_message(message);
        self.save(ctx).await
    }

    pub async fn delete(&self, session_id: &str) -> Result<()> {
        self.cache.remove(session_id);
        if let Some(backend) = &self.backend {
            match backend.delete(&session_key(session_id)).await {
                Ok(()) => self.note_recovered(),
                Err(e) => self.note_degraded(&format!("durable context delete failed: {e}")),
            }
        }
        Ok(())
    }

    pub async fn extend_ttl(&self, session_id: &str, ttl: Duration) -> Result<()> {
        if let Some(backend) = &self.backend {
            match backend.touch(&session_key(session_id), ttl).await {
                Ok(()) => self.note_recovered(),
                Err(e) => self.note_degraded(&format!("durable context TTL extend failed: {e}")),
            }
        }
        Ok(())
    }

    /// Session ids (stripped of the `context:` key prefix) whose key
    /// contains `pattern`. Consults the local cache; if a durable backend
    /// is configured, also merges in matches from there.
    pub async fn list_sessions(&self, pattern: &str) -> Result<Vec<String>> {
        let mut sessions: Vec<String> = self
            .cache
            .iter()
            .map(|kv| kv.key().clone())
            .filter(|id| id.contains(pattern))
            .collect();

        if let Some(backend) = &self.backend {
            match backend.list_keys(&format!("context:{pattern}")).await {
                Ok(keys) => {
                    self.note_recovered();
                    for key in keys {
                        if let Some(id) = key.strip_prefix("context:") {
                            if !sessions.iter().any(|s| s == id) {
                                sessions.push(id.to_string());
                            }
                        }
                    }
                }
                Err(e) => self.note_degraded(&format!("durable session listing failed: {e}")),
            }
        }
        sessions.sort();
        sessions.dedup();
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qorch_storage::kv::InMemoryKv;

    #[tokio::test]
    async fn get_or_create_returns_new_context_once() {
        let store = ContextStore::new(10, Duration::from_secs(60));
        let ctx = store.get_or_create("s1", "u1").await.unwrap();
        assert_eq!(ctx.session_id, "s1");
        assert!(ctx.conversation_history.is_empty());

        let again = store.get_or_create("s1", "u1").await.unwrap();
        assert_eq!(again.session_id, "s1");
    }

    #[tokio::test]
    async fn update_conversation_appends_and_bounds_history() {
        let store = ContextStore::new(2, Duration::from_secs(60));
        store.get_or_create("s1", "u1").await.unwrap();
        for i in 0..5 {
            store
                .update_conversation("s1", ConversationMessage::new("user", format!("m{i}")))
                .await
                .unwrap();
        }
        let ctx = store.get("s1").await.unwrap().unwrap();
        assert_eq!(ctx.conversation_history.len(), 2);
        assert_eq!(ctx.conversation_history[0].content, "m3");
        assert_eq!(ctx.conversation_history[1].content, "m4");
    }

    #[tokio::test]
    async fn delete_removes_from_cache_and_backend() {
        let backend = Arc::new(InMemoryKv::new());
        let store = ContextStore::with_backend(10, Duration::from_secs(60), backend);
        store.get_or_create("s1", "u1").await.unwrap();
        store.delete("s1").await.unwrap();
        assert!(store.get("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn durable_backend_round_trips_through_a_fresh_store() {
        let backend = Arc::new(InMemoryKv::new());
        {
            let store = ContextStore::with_backend(10, Duration::from_secs(60), backend.clone());
            store.get_or_create("s1", "u1").await.unwrap();
            store
                .update_conversation("s1", ConversationMessage::new("user", "hello"))
                .await
                .unwrap();
        }
        // A fresh store with an empty cache but the same backend should
        // still find the persisted context.
        let store2 = ContextStore::with_backend(10, Duration::from_secs(60), backend);
        let ctx = store2.get("s1").await.unwrap().expect("persisted context");
        assert_eq!(ctx.conversation_history.len(), 1);
    }

    #[tokio::test]
    async fn list_sessions_filters_by_pattern() {
        let store = ContextStore::new(10, Duration::from_secs(60));
        store.get_or_create("alpha", "u1").await.unwrap();
        store.get_or_create("beta", "u1").await.unwrap();
        let sessions = store.list_sessions("alp").await.unwrap();
        assert_eq!(sessions, vec!["alpha".to_string()]);
    }
}
