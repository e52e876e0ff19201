//! Decision Cache
//!
//! The gateway-side, time-bounded memoization layer for gate decisions.
//! Keyed by the raw credential value; a cache miss after expiry simply
//! recomputes an identical decision, so the gate tolerates the cache
//! without depending on it.

use crate::AuthDecision;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Cached decision with its effective expiry instant.
#[derive(Debug, Clone, Copy)]
struct CachedDecision {
    decision: AuthDecision,
    expires_at: Instant,
}

/// Caller-owned cache of authorization decisions.
///
/// Thread-safe via `RwLock`; lookups take a read lock, inserts a write
/// lock. Expired entries are dropped lazily on lookup and swept on
/// insert once the map grows past a housekeeping threshold.
#[derive(Debug)]
pub struct DecisionCache {
    entries: RwLock<HashMap<String, CachedDecision>>,
    ttl: Duration,
}

/// Sweep the map for expired entries once it grows past this many keys.
const SWEEP_THRESHOLD: usize = 4096;

impl DecisionCache {
    /// Create a cache holding decisions for `ttl` after insertion.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Look up a non-expired decision for this credential.
    pub fn get(&self, credential: &str) -> Option<AuthDecision> {
        let now = Instant::now();
        {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            match entries.get(credential) {
                Some(cached) if cached.expires_at > now => return Some(cached.decision),
                Some(_) => {}
                None => return None,
            }
        }

        // Entry exists but expired: drop it under the write lock.
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if let Some(cached) = entries.get(credential) {
            if cached.expires_at <= now {
                entries.remove(credential);
            } else {
                return Some(cached.decision);
            }
        }
        None
    }

    /// Record a decision for this credential.
    pub fn insert(&self, credential: impl Into<String>, decision: AuthDecision) {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());

        if entries.len() >= SWEEP_THRESHOLD {
            entries.retain(|_, cached| cached.expires_at > now);
        }

        entries.insert(
            credential.into(),
            CachedDecision {
                decision,
                expires_at: now + self.ttl,
            },
        );
    }

    /// Number of entries currently held, expired or not.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether the cache holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_miss_then_hit() {
        let cache = DecisionCache::new(Duration::from_secs(60));
        assert!(cache.get("tok").is_none());

        cache.insert("tok", AuthDecision::ALLOW);
        assert_eq!(cache.get("tok"), Some(AuthDecision::ALLOW));
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let cache = DecisionCache::new(Duration::from_millis(0));
        cache.insert("tok", AuthDecision::DENY);

        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("tok").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_distinct_credentials_are_cached_independently() {
        let cache = DecisionCache::new(Duration::from_secs(60));
        cache.insert("good", AuthDecision::ALLOW);
        cache.insert("bad", AuthDecision::DENY);

        assert_eq!(cache.get("good"), Some(AuthDecision::ALLOW));
        assert_eq!(cache.get("bad"), Some(AuthDecision::DENY));
        assert_eq!(cache.len(), 2);
    }
}
