//! Deferred-increment queue with swap-and-flush draining.
//!
//! Deferred amounts coalesce per (tenant, module, usage type, period),
//! so a flush performs one conditional increment per key. The queue is
//! guarded by a synchronous mutex held only for map operations, never
//! across an await, and draining swaps the whole map out so entries
//! enqueued mid-drain land in the next flush instead of being lost.

use crate::model::keys::{ModuleKey, Period, TenantId, UsageType};
use std::collections::HashMap;
use std::sync::Mutex;

/// Coalescing key of one deferred increment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct BatchKey {
    pub tenant_id: TenantId,
    pub module: ModuleKey,
    pub usage_type: UsageType,
    pub period: Period,
}

/// Pending deferred increments.
#[derive(Debug, Default)]
pub(crate) struct BatchQueue {
    entries: Mutex<HashMap<BatchKey, u64>>,
}

impl BatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an amount to the pending entry for `key`, returning the
    /// number of distinct pending keys afterwards so the caller can
    /// decide whether to flush.
    pub fn enqueue(&self, key: BatchKey, amount: u64) -> usize {
        let mut entries = self.entries.lock().expect("batch queue lock poisoned");
        *entries.entry(key).or_insert(0) += amount;
        entries.len()
    }

    /// Swap out and return everything pending.
    pub fn drain(&self) -> Vec<(BatchKey, u64)> {
        let drained = {
            let mut entries = self.entries.lock().expect("batch queue lock poisoned");
            std::mem::take(&mut *entries)
        };
        drained.into_iter().collect()
    }

    /// Number of distinct pending keys.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("batch queue lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(tenant: &str, usage_type: UsageType) -> BatchKey {
        BatchKey {
            tenant_id: TenantId::new(tenant),
            module: ModuleKey::Attendance,
            usage_type,
            period: Period::parse("2025-01").unwrap(),
        }
    }

    #[test]
    fn amounts_coalesce_per_key() {
        let queue = BatchQueue::new();
        queue.enqueue(key("acme", UsageType::ApiCalls), 3);
        queue.enqueue(key("acme", UsageType::ApiCalls), 4);
        queue.enqueue(key("acme", UsageType::Employees), 1);

        let mut drained = queue.drain();
        drained.sort_by_key(|(k, _)| k.usage_type.as_str());
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].1, 7); // apiCalls
        assert_eq!(drained[1].1, 1); // employees
    }

    #[test]
    fn enqueue_reports_pending_key_count() {
        let queue = BatchQueue::new();
        assert_eq!(queue.enqueue(key("acme", UsageType::ApiCalls), 1), 1);
        assert_eq!(queue.enqueue(key("acme", UsageType::ApiCalls), 1), 1);
        assert_eq!(queue.enqueue(key("other", UsageType::ApiCalls), 1), 2);
    }

    #[test]
    fn drain_empties_the_queue() {
        let queue = BatchQueue::new();
        queue.enqueue(key("acme", UsageType::Storage), 10);
        assert!(!queue.is_empty());
        assert_eq!(queue.drain().len(), 1);
        assert!(queue.is_empty());
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn entries_enqueued_after_drain_survive() {
        let queue = BatchQueue::new();
        queue.enqueue(key("acme", UsageType::Storage), 10);
        let first = queue.drain();
        queue.enqueue(key("acme", UsageType::Storage), 5);
        let second = queue.drain();
        assert_eq!(first[0].1, 10);
        assert_eq!(second[0].1, 5);
    }
}
