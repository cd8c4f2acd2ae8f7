//! Short-term memories behind one mutex each: a per-(scope, channel, user)
//! ring of recent utterances and a namespaced key/value cache of recent
//! outcomes. A record past its expiry is logically absent even while still
//! stored; every read path checks and evicts.
//!
//! Clock is `tokio::time::Instant` so TTL behavior is testable under a
//! paused runtime.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

/// A stored value with creation/expiry timestamps and free-form metadata.
#[derive(Debug, Clone)]
pub struct MemoryRecord<T> {
    pub value: T,
    pub created_at: Instant,
    pub expires_at: Option<Instant>,
    pub meta: Option<serde_json::Value>,
}

impl<T> MemoryRecord<T> {
    fn new(value: T, ttl: Option<Duration>, meta: Option<serde_json::Value>) -> Self {
        let now = Instant::now();
        Self {
            value,
            created_at: now,
            expires_at: ttl.map(|t| now + t),
            meta,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|at| now >= at).unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SessionKey {
    scope: String,
    channel: Option<String>,
    user: String,
}

impl SessionKey {
    fn new(scope: &str, channel: Option<&str>, user: &str) -> Self {
        Self {
            scope: scope.to_string(),
            channel: channel.map(str::to_string),
            user: user.to_string(),
        }
    }
}

/// Bounded, TTL-pruned ring of recent utterances per (scope, channel, user).
pub struct SessionMemory {
    rings: Mutex<HashMap<SessionKey, VecDeque<MemoryRecord<String>>>>,
    capacity: usize,
    ttl: Option<Duration>,
}

impl SessionMemory {
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        Self {
            rings: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            ttl,
        }
    }

    /// Append an utterance; the oldest entry silently drops past capacity.
    pub fn add_event(
        &self,
        scope: &str,
        channel: Option<&str>,
        user: &str,
        text: &str,
        meta: Option<serde_json::Value>,
    ) {
        let mut rings = self.rings.lock();
        let ring = rings
            .entry(SessionKey::new(scope, channel, user))
            .or_default();
        ring.push_back(MemoryRecord::new(text.to_string(), self.ttl, meta));
        while ring.len() > self.capacity {
            ring.pop_front();
        }
    }

    /// Recent entries, most-recent-first, lazily pruning expired ones.
    pub fn history(
        &self,
        scope: &str,
        channel: Option<&str>,
        user: &str,
        limit: Option<usize>,
    ) -> Vec<MemoryRecord<String>> {
        let now = Instant::now();
        let mut rings = self.rings.lock();
        let Some(ring) = rings.get_mut(&SessionKey::new(scope, channel, user)) else {
            return Vec::new();
        };
        ring.retain(|r| !r.is_expired(now));
        let take = limit.unwrap_or(ring.len());
        ring.iter().rev().take(take).cloned().collect()
    }

    pub fn clear_session(&self, scope: &str, channel: Option<&str>, user: &str) {
        self.rings
            .lock()
            .remove(&SessionKey::new(scope, channel, user));
    }

    /// Sweep every ring, dropping expired entries and empty rings.
    pub fn prune_all(&self) {
        let now = Instant::now();
        let mut rings = self.rings.lock();
        for ring in rings.values_mut() {
            ring.retain(|r| !r.is_expired(now));
        }
        rings.retain(|_, ring| !ring.is_empty());
    }
}

/// Bounded, TTL-pruned key/value cache per namespace. Over-capacity
/// insertion evicts the single oldest-created record (not LRU by access).
pub struct ContextMemory {
    namespaces: Mutex<HashMap<String, HashMap<String, MemoryRecord<serde_json::Value>>>>,
    capacity: usize,
}

impl ContextMemory {
    pub fn new(capacity: usize) -> Self {
        Self {
            namespaces: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Store a value; key reuse replaces the record wholesale.
    pub fn set(
        &self,
        namespace: &str,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
        meta: Option<serde_json::Value>,
    ) {
        let now = Instant::now();
        let mut namespaces = self.namespaces.lock();
        let ns = namespaces.entry(namespace.to_string()).or_default();
        ns.insert(key.to_string(), MemoryRecord::new(value, ttl, meta));
        if ns.len() > self.capacity {
            ns.retain(|_, r| !r.is_expired(now));
        }
        while ns.len() > self.capacity {
            let oldest = ns
                .iter()
                .min_by_key(|(_, r)| r.created_at)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => ns.remove(&k),
                None => break,
            };
        }
    }

    pub fn get(&self, namespace: &str, key: &str) -> Option<serde_json::Value> {
        self.get_record(namespace, key).map(|r| r.value)
    }

    /// Full record lookup with check-and-evict on expiry.
    pub fn get_record(
        &self,
        namespace: &str,
        key: &str,
    ) -> Option<MemoryRecord<serde_json::Value>> {
        let now = Instant::now();
        let mut namespaces = self.namespaces.lock();
        let ns = namespaces.get_mut(namespace)?;
        match ns.get(key) {
            Some(r) if r.is_expired(now) => {
                ns.remove(key);
                None
            }
            Some(r) => Some(r.clone()),
            None => None,
        }
    }

    pub fn delete(&self, namespace: &str, key: &str) -> bool {
        self.namespaces
            .lock()
            .get_mut(namespace)
            .map(|ns| ns.remove(key).is_some())
            .unwrap_or(false)
    }

    pub fn clear_namespace(&self, namespace: &str) {
        self.namespaces.lock().remove(namespace);
    }

    /// Sweep all namespaces, dropping expired records and empty namespaces.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        let mut namespaces = self.namespaces.lock();
        for ns in namespaces.values_mut() {
            ns.retain(|_, r| !r.is_expired(now));
        }
        namespaces.retain(|_, ns| !ns.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn session_ring_drops_oldest_past_capacity() {
        let mem = SessionMemory::new(4, None);
        for i in 0..5 {
            mem.add_event("g", Some("c"), "u", &format!("msg-{i}"), None);
        }
        let history = mem.history("g", Some("c"), "u", None);
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].value, "msg-4");
        assert!(history.iter().all(|r| r.value != "msg-0"));
    }

    #[tokio::test]
    async fn history_is_most_recent_first_and_capped() {
        let mem = SessionMemory::new(8, None);
        for i in 0..4 {
            mem.add_event("g", None, "u", &format!("m{i}"), None);
        }
        let history = mem.history("g", None, "u", Some(2));
        assert_eq!(
            history.iter().map(|r| r.value.as_str()).collect::<Vec<_>>(),
            vec!["m3", "m2"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn session_entries_expire_lazily() {
        let mem = SessionMemory::new(8, Some(Duration::from_millis(100)));
        mem.add_event("g", None, "u", "old", None);
        tokio::time::advance(Duration::from_millis(150)).await;
        mem.add_event("g", None, "u", "fresh", None);
        let history = mem.history("g", None, "u", None);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].value, "fresh");
    }

    #[tokio::test]
    async fn sessions_are_isolated_by_key() {
        let mem = SessionMemory::new(8, None);
        mem.add_event("g", Some("c1"), "u", "one", None);
        mem.add_event("g", Some("c2"), "u", "two", None);
        assert_eq!(mem.history("g", Some("c1"), "u", None).len(), 1);
        mem.clear_session("g", Some("c1"), "u");
        assert!(mem.history("g", Some("c1"), "u", None).is_empty());
        assert_eq!(mem.history("g", Some("c2"), "u", None).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn context_ttl_read_then_expired() {
        let mem = ContextMemory::new(16);
        mem.set("ns", "k", json!("v"), Some(Duration::from_millis(100)), None);
        assert_eq!(mem.get("ns", "k"), Some(json!("v")));
        tokio::time::advance(Duration::from_millis(101)).await;
        assert_eq!(mem.get("ns", "k"), None);
        // check-and-evict actually removed the record
        assert!(mem.get_record("ns", "k").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn context_evicts_oldest_created_not_lru() {
        let mem = ContextMemory::new(2);
        mem.set("ns", "a", json!(1), None, None);
        tokio::time::advance(Duration::from_millis(10)).await;
        mem.set("ns", "b", json!(2), None, None);
        tokio::time::advance(Duration::from_millis(10)).await;
        // Touch "a" via get; creation-order eviction must ignore the access.
        assert_eq!(mem.get("ns", "a"), Some(json!(1)));
        mem.set("ns", "c", json!(3), None, None);
        assert_eq!(mem.get("ns", "a"), None);
        assert_eq!(mem.get("ns", "b"), Some(json!(2)));
        assert_eq!(mem.get("ns", "c"), Some(json!(3)));
    }

    #[tokio::test]
    async fn key_reuse_replaces_record() {
        let mem = ContextMemory::new(4);
        mem.set("ns", "k", json!("first"), None, Some(json!({"n": 1})));
        mem.set("ns", "k", json!("second"), None, None);
        let rec = mem.get_record("ns", "k").unwrap();
        assert_eq!(rec.value, json!("second"));
        assert!(rec.meta.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn purge_and_clear() {
        let mem = ContextMemory::new(8);
        mem.set("a", "k1", json!(1), Some(Duration::from_millis(50)), None);
        mem.set("a", "k2", json!(2), None, None);
        mem.set("b", "k", json!(3), None, None);
        tokio::time::advance(Duration::from_millis(60)).await;
        mem.purge_expired();
        assert!(mem.get("a", "k1").is_none());
        assert_eq!(mem.get("a", "k2"), Some(json!(2)));
        mem.clear_namespace("b");
        assert!(mem.get("b", "k").is_none());
        assert!(mem.delete("a", "k2"));
        assert!(!mem.delete("a", "k2"));
    }
}
