use std::{
    collections::HashMap,
    hash::Hash,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

/// A mutex-guarded map whose entries expire after a fixed TTL. This is the explicit replacement for the ambient
/// global registries (bot sessions, dedup keys) the system would otherwise accumulate: every consumer owns its own
/// cache instance and eviction is part of the contract, not a cron job.
#[derive(Clone)]
pub struct TtlCache<K, V> {
    entries: Arc<Mutex<HashMap<K, (V, Instant)>>>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self { entries: Arc::new(Mutex::new(HashMap::new())), ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn insert(&self, key: K, value: V) {
        let mut entries = self.entries.lock().expect("ttl cache lock poisoned");
        Self::prune(&mut entries);
        entries.insert(key, (value, Instant::now() + self.ttl));
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock().expect("ttl cache lock poisoned");
        Self::prune(&mut entries);
        entries.get(key).map(|(v, _)| v.clone())
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock().expect("ttl cache lock poisoned");
        entries.remove(key).map(|(v, _)| v)
    }

    /// Insert only if no live entry exists for `key`. Returns true when the entry was inserted. This is the
    /// set-if-absent-with-TTL primitive replay guards are built on.
    pub fn set_if_absent(&self, key: K, value: V) -> bool {
        let mut entries = self.entries.lock().expect("ttl cache lock poisoned");
        Self::prune(&mut entries);
        if entries.contains_key(&key) {
            false
        } else {
            entries.insert(key, (value, Instant::now() + self.ttl));
            true
        }
    }

    pub fn len(&self) -> usize {
        let mut entries = self.entries.lock().expect("ttl cache lock poisoned");
        Self::prune(&mut entries);
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn prune(entries: &mut HashMap<K, (V, Instant)>) {
        let now = Instant::now();
        entries.retain(|_, (_, expires_at)| *expires_at > now);
    }
}

/// Short-TTL dedup store that prevents the same webhook call being processed twice. Keys are derived from the
/// callback identity (track id + signature); a hit within the TTL window is a replay.
#[derive(Clone)]
pub struct ReplayGuard {
    seen: TtlCache<String, ()>,
}

impl ReplayGuard {
    pub fn new(ttl: Duration) -> Self {
        Self { seen: TtlCache::new(ttl) }
    }

    /// Returns true if `key` was fresh (and is now claimed); false if it was already seen within the TTL.
    pub fn check_and_set(&self, key: &str) -> bool {
        self.seen.set_if_absent(key.to_string(), ())
    }
}

/// Per-actor session state (bot conversations and the like), keyed by actor id with TTL eviction.
pub type SessionStore<V> = TtlCache<String, V>;
