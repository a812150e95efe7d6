//! TTL cache for admin-auth lookups.
//!
//! Keyed on a SHA-256 of the raw token so plaintext admin tokens never
//! sit in memory longer than the request that carried them.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::AdminPrincipal;

pub struct AdminAuthCache {
    items: Mutex<HashMap<String, (Instant, AdminPrincipal)>>,
    ttl: Duration,
}

impl AdminAuthCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn key(raw: &str) -> String {
        hex::encode(Sha256::digest(raw.as_bytes()))
    }

    pub fn get(&self, raw_token: &str) -> Option<AdminPrincipal> {
        let key = Self::key(raw_token);
        let mut items = self.items.lock();
        match items.get(&key) {
            Some((expires, principal)) if *expires > Instant::now() => {
                Some(principal.clone())
            }
            Some(_) => {
                items.remove(&key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, raw_token: &str, principal: AdminPrincipal) {
        let key = Self::key(raw_token);
        self.items
            .lock()
            .insert(key, (Instant::now() + self.ttl, principal));
    }

    /// Drop all entries (used by the test harness between scenarios).
    pub fn clear(&self) {
        self.items.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal() -> AdminPrincipal {
        AdminPrincipal {
            subject: Some("ops".into()),
            email: None,
            permissions: vec!["admin:*".into()],
        }
    }

    #[test]
    fn hit_within_ttl() {
        let cache = AdminAuthCache::new(Duration::from_secs(15));
        cache.put("tok-1", principal());
        assert!(cache.get("tok-1").is_some());
        assert!(cache.get("tok-2").is_none());
    }

    #[test]
    fn expired_entry_is_evicted() {
        let cache = AdminAuthCache::new(Duration::from_millis(0));
        cache.put("tok-1", principal());
        assert!(cache.get("tok-1").is_none());
    }

    #[test]
    fn clear_empties_cache() {
        let cache = AdminAuthCache::new(Duration::from_secs(15));
        cache.put("tok-1", principal());
        cache.clear();
        assert!(cache.get("tok-1").is_none());
    }
}
