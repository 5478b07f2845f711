//! Short-TTL status cache.
//!
//! Lets many concurrent pollers observe one investigation without
//! hammering the durable store. Entries are keyed per (investigation,
//! caller) so an authorization decision is never served to a different
//! caller. Never persisted.
//!
//! The cache is an owned object injected where needed — its lifetime is
//! tied to the hosting process, not ambient module state.

use crate::status::StatusResponse;
use crate::types::{InvestigationId, OwnerId};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct CacheEntry {
    response:  StatusResponse,
    cached_at: Instant,
}

pub struct PollCache {
    ttl:     Duration,
    entries: Mutex<HashMap<(InvestigationId, OwnerId), CacheEntry>>,
}

impl PollCache {
    pub fn new(ttl_ms: u64) -> Self {
        Self {
            ttl:     Duration::from_millis(ttl_ms),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// A fresh-enough cached response for this (investigation, caller),
    /// if any. Stale entries are left for the eviction sweep.
    pub fn get(&self, investigation_id: &str, caller_id: &str) -> Option<StatusResponse> {
        let entries = self.lock();
        let key = (investigation_id.to_string(), caller_id.to_string());
        entries.get(&key).and_then(|entry| {
            if entry.cached_at.elapsed() < self.ttl {
                Some(entry.response.clone())
            } else {
                None
            }
        })
    }

    pub fn put(&self, investigation_id: &str, caller_id: &str, response: StatusResponse) {
        let mut entries = self.lock();
        entries.insert(
            (investigation_id.to_string(), caller_id.to_string()),
            CacheEntry {
                response,
                cached_at: Instant::now(),
            },
        );
    }

    /// Drop every entry older than the TTL. Run from a periodic
    /// background task, independent of request handling.
    pub fn evict_expired(&self) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.cached_at.elapsed() < self.ttl);
        let evicted = before - entries.len();
        if evicted > 0 {
            log::debug!("poll cache evicted {evicted} expired entries");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(InvestigationId, OwnerId), CacheEntry>> {
        // A poisoned lock only means a panic elsewhere mid-insert;
        // cached status is re-fetchable, so keep serving.
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }
}
