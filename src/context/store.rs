//! Concurrent context store with at-most-once consumption.

use super::{ContextDraft, PreCheckContext};
use crate::{Error, Result};

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Available,
    Consumed,
}

struct Slot {
    context: PreCheckContext,
    state: SlotState,
}

impl Slot {
    fn awaiting_audit(&self) -> bool {
        self.state == SlotState::Available && self.context.decision.is_approved()
    }
}

/// Keyed store of pre-check contexts.
///
/// Each entry moves from available to consumed exactly once. Consumed entries
/// stay until expiry so a second audit fails as already-consumed instead of
/// not-found. Expired entries are unusable immediately and reclaimed by
/// [`ContextStore::purge_expired`].
pub struct ContextStore {
    entries: DashMap<String, Slot>,
    ttl: chrono::Duration,
    max_entries: usize,
    issued: AtomicU64,
    consumed: AtomicU64,
    rejected: AtomicU64,
    expired: AtomicU64,
    expired_unaudited: AtomicU64,
}

impl ContextStore {
    /// Create a store with the given time-to-live and capacity.
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(365)),
            max_entries: max_entries.max(1),
            issued: AtomicU64::new(0),
            consumed: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            expired: AtomicU64::new(0),
            expired_unaudited: AtomicU64::new(0),
        }
    }

    /// Store a new context under a freshly generated correlation identifier.
    ///
    /// Identifiers are random v4 UUIDs drawn from the operating system RNG.
    pub fn put(&self, draft: ContextDraft) -> Result<PreCheckContext> {
        if self.entries.len() >= self.max_entries {
            self.purge_expired();
            if self.entries.len() >= self.max_entries {
                return Err(Error::Capacity {
                    max_entries: self.max_entries,
                });
            }
        }

        let now = Utc::now();
        let correlation_id = Uuid::new_v4().simple().to_string();
        let context = PreCheckContext::from_draft(draft, correlation_id.clone(), now, now + self.ttl);

        self.entries.insert(
            correlation_id,
            Slot {
                context: context.clone(),
                state: SlotState::Available,
            },
        );
        self.issued.fetch_add(1, Ordering::Relaxed);

        Ok(context)
    }

    /// Look up a context without changing its state.
    pub fn get(&self, correlation_id: &str) -> Option<PreCheckContext> {
        let slot = self.entries.get(correlation_id)?;
        if slot.context.is_expired_at(Utc::now()) {
            return None;
        }
        Some(slot.context.clone())
    }

    /// Atomically transition a context from available to consumed.
    pub fn consume(&self, correlation_id: &str) -> Result<PreCheckContext> {
        self.consume_if(correlation_id, |_| true)
    }

    /// Like [`ContextStore::consume`], but only when `owns` accepts the context.
    ///
    /// A rejected ownership check reports not-found and leaves the entry untouched.
    pub fn consume_if<F>(&self, correlation_id: &str, owns: F) -> Result<PreCheckContext>
    where
        F: FnOnce(&PreCheckContext) -> bool,
    {
        let result = match self.entries.get_mut(correlation_id) {
            None => Err(Error::context_not_found(correlation_id)),
            Some(mut slot) => {
                if slot.context.is_expired_at(Utc::now()) {
                    Err(Error::context_expired(correlation_id))
                } else if !owns(&slot.context) {
                    Err(Error::context_not_found(correlation_id))
                } else if slot.state == SlotState::Consumed {
                    Err(Error::context_already_consumed(correlation_id))
                } else {
                    slot.state = SlotState::Consumed;
                    Ok(slot.context.clone())
                }
            }
        };

        match &result {
            Ok(_) => {
                self.consumed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                debug!(correlation_id, reason = e.category(), "Context consumption rejected");
            }
        }
        result
    }

    /// Return a consumed, unexpired context to available.
    ///
    /// Used when an audit could not be persisted so the caller may retry.
    pub fn release(&self, correlation_id: &str) -> bool {
        match self.entries.get_mut(correlation_id) {
            Some(mut slot)
                if slot.state == SlotState::Consumed
                    && !slot.context.is_expired_at(Utc::now()) =>
            {
                slot.state = SlotState::Available;
                self.consumed.fetch_sub(1, Ordering::Relaxed);
                true
            }
            _ => false,
        }
    }

    /// Remove every expired entry.
    pub fn purge_expired(&self) -> SweepReport {
        let now = Utc::now();
        let mut report = SweepReport::default();

        self.entries.retain(|_, slot| {
            if !slot.context.is_expired_at(now) {
                return true;
            }
            report.removed += 1;
            if slot.awaiting_audit() {
                report.unaudited.push(slot.context.correlation_id.clone());
                warn!(
                    correlation_id = %slot.context.correlation_id,
                    tenant_id = %slot.context.tenant_id,
                    requester_id = %slot.context.requester_id,
                    "Approved pre-check expired without an audit record"
                );
            }
            false
        });

        self.expired.fetch_add(report.removed as u64, Ordering::Relaxed);
        self.expired_unaudited
            .fetch_add(report.unaudited.len() as u64, Ordering::Relaxed);
        report
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configured time-to-live.
    pub fn ttl(&self) -> chrono::Duration {
        self.ttl
    }

    /// Get store statistics.
    pub fn stats(&self) -> ContextStats {
        ContextStats {
            live: self.entries.len(),
            issued: self.issued.load(Ordering::Relaxed),
            consumed: self.consumed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            expired_unaudited: self.expired_unaudited.load(Ordering::Relaxed),
        }
    }
}

/// Outcome of one expiry sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Entries removed
    pub removed: usize,
    /// Approved contexts that expired before any audit
    pub unaudited: Vec<String>,
}

/// Context store statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextStats {
    /// Entries currently held
    pub live: usize,
    /// Contexts ever issued
    pub issued: u64,
    /// Successful consumptions
    pub consumed: u64,
    /// Failed consumptions
    pub rejected: u64,
    /// Entries reclaimed after expiry
    pub expired: u64,
    /// Approved contexts reclaimed without an audit
    pub expired_unaudited: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestFingerprint;
    use crate::policy::Decision;
    use std::sync::Arc;
    use std::thread;

    fn draft(decision: Decision) -> ContextDraft {
        ContextDraft {
            tenant_id: "acme".to_string(),
            requester_id: "user-1".to_string(),
            fingerprint: RequestFingerprint::compute("user-1", "hello"),
            decision,
            findings: Vec::new(),
            block_reason: None,
            matched_policies: Vec::new(),
            data_sources: Vec::new(),
            ruleset_version: "test".to_string(),
        }
    }

    #[test]
    fn test_put_get() {
        let store = ContextStore::new(Duration::from_secs(60), 100);
        let context = store.put(draft(Decision::Approved)).unwrap();

        assert_eq!(context.correlation_id.len(), 32);
        assert!(context.expires_at > context.created_at);
        assert_eq!(store.get(&context.correlation_id), Some(context));
        assert!(store.get("missing").is_none());
    }

    #[test]
    fn test_identifiers_are_unique() {
        let store = ContextStore::new(Duration::from_secs(60), 1000);
        let ids: std::collections::HashSet<_> = (0..500)
            .map(|_| store.put(draft(Decision::Approved)).unwrap().correlation_id)
            .collect();
        assert_eq!(ids.len(), 500);
    }

    #[test]
    fn test_consume_once() {
        let store = ContextStore::new(Duration::from_secs(60), 100);
        let id = store.put(draft(Decision::Approved)).unwrap().correlation_id;

        assert!(store.consume(&id).is_ok());
        assert!(matches!(
            store.consume(&id),
            Err(Error::ContextAlreadyConsumed { .. })
        ));
        assert!(matches!(
            store.consume("unknown"),
            Err(Error::ContextNotFound { .. })
        ));

        // Consumed contexts remain readable until they expire.
        assert!(store.get(&id).is_some());

        let stats = store.stats();
        assert_eq!(stats.consumed, 1);
        assert_eq!(stats.rejected, 2);
    }

    #[test]
    fn test_concurrent_consume_has_one_winner() {
        let store = Arc::new(ContextStore::new(Duration::from_secs(60), 100));
        let id = store.put(draft(Decision::Approved)).unwrap().correlation_id;

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                let id = id.clone();
                thread::spawn(move || store.consume(&id))
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, Error::ContextAlreadyConsumed { .. })));
    }

    #[test]
    fn test_ownership_check_leaves_context_available() {
        let store = ContextStore::new(Duration::from_secs(60), 100);
        let id = store.put(draft(Decision::Approved)).unwrap().correlation_id;

        assert!(matches!(
            store.consume_if(&id, |c| c.requester_id == "someone-else"),
            Err(Error::ContextNotFound { .. })
        ));
        assert!(store.consume_if(&id, |c| c.requester_id == "user-1").is_ok());
    }

    #[test]
    fn test_release_allows_retry() {
        let store = ContextStore::new(Duration::from_secs(60), 100);
        let id = store.put(draft(Decision::Approved)).unwrap().correlation_id;

        assert!(!store.release(&id));
        store.consume(&id).unwrap();
        assert!(store.release(&id));
        assert!(store.consume(&id).is_ok());
    }

    #[test]
    fn test_expiration() {
        let store = ContextStore::new(Duration::from_millis(50), 100);
        let approved = store.put(draft(Decision::Approved)).unwrap().correlation_id;
        let blocked = store.put(draft(Decision::Blocked)).unwrap().correlation_id;

        thread::sleep(Duration::from_millis(100));

        assert!(store.get(&approved).is_none());
        assert!(matches!(
            store.consume(&approved),
            Err(Error::ContextExpired { .. })
        ));

        let report = store.purge_expired();
        assert_eq!(report.removed, 2);
        assert_eq!(report.unaudited, vec![approved.clone()]);
        assert!(store.is_empty());

        // Once reclaimed, an expired id is indistinguishable from an unknown one.
        assert!(matches!(
            store.consume(&approved),
            Err(Error::ContextNotFound { .. })
        ));
        assert!(matches!(
            store.consume(&blocked),
            Err(Error::ContextNotFound { .. })
        ));
        assert_eq!(store.stats().expired_unaudited, 1);
    }

    #[test]
    fn test_capacity() {
        let store = ContextStore::new(Duration::from_millis(50), 2);
        store.put(draft(Decision::Approved)).unwrap();
        store.put(draft(Decision::Approved)).unwrap();
        assert!(matches!(
            store.put(draft(Decision::Approved)),
            Err(Error::Capacity { max_entries: 2 })
        ));

        thread::sleep(Duration::from_millis(100));
        assert!(store.put(draft(Decision::Approved)).is_ok());
        assert_eq!(store.len(), 1);
    }
}
