//! In-memory reference backend.
//!
//! Each collection sits behind one async lock, which trivially gives
//! the linearizable conditional-increment semantics the traits
//! require. Suitable for tests and single-process deployments; a
//! database-backed implementation would use its native conditional
//! update instead.

use crate::model::audit::{AuditEntry, AuditEventType};
use crate::model::keys::{TenantId, UsageType};
use crate::model::license::{License, LimitSet};
use crate::model::usage::{LimitViolation, UsageKey, UsageRecord};
use crate::store::{AuditSink, Increment, LicenseStore, UsageStore};
use crate::EngineError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::{Mutex, RwLock};

/// In-memory license collection.
#[derive(Debug, Default)]
pub struct MemoryLicenseStore {
    inner: RwLock<HashMap<TenantId, License>>,
}

impl MemoryLicenseStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LicenseStore for MemoryLicenseStore {
    async fn insert(&self, license: License) -> Result<(), EngineError> {
        let mut inner = self.inner.write().await;
        if inner.contains_key(&license.tenant_id) {
            return Err(EngineError::DuplicateSubscription {
                tenant: license.tenant_id.to_string(),
            });
        }
        inner.insert(license.tenant_id.clone(), license);
        Ok(())
    }

    async fn get(&self, tenant: &TenantId) -> Result<Option<License>, EngineError> {
        Ok(self.inner.read().await.get(tenant).cloned())
    }

    async fn put(&self, license: License) -> Result<(), EngineError> {
        let mut inner = self.inner.write().await;
        if !inner.contains_key(&license.tenant_id) {
            return Err(EngineError::NotFound {
                tenant: license.tenant_id.to_string(),
            });
        }
        inner.insert(license.tenant_id.clone(), license);
        Ok(())
    }
}

/// In-memory usage collection.
///
/// A single mutex serializes all increments, so every conditional
/// check observes the true current counter.
#[derive(Debug, Default)]
pub struct MemoryUsageStore {
    inner: Mutex<HashMap<UsageKey, UsageRecord>>,
}

impl MemoryUsageStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UsageStore for MemoryUsageStore {
    async fn try_increment(
        &self,
        key: &UsageKey,
        usage_type: UsageType,
        amount: u64,
        limits: &LimitSet,
        now: DateTime<Utc>,
    ) -> Result<Increment, EngineError> {
        let mut inner = self.inner.lock().await;
        let record = inner
            .entry(key.clone())
            .or_insert_with(|| UsageRecord::new(key.clone(), *limits, now));

        let current = record.usage.get(usage_type);
        // The check and the update happen under one lock guard
        if let Some(limit) = record.limits.limit_for(usage_type) {
            if current + amount > limit {
                return Ok(Increment::Rejected { current, limit });
            }
        }
        record.usage.add(usage_type, amount);
        record.updated_at = now;
        Ok(Increment::Applied {
            new_total: record.usage.get(usage_type),
        })
    }

    async fn get(&self, key: &UsageKey) -> Result<Option<UsageRecord>, EngineError> {
        Ok(self.inner.lock().await.get(key).cloned())
    }

    async fn note_warning(
        &self,
        key: &UsageKey,
        usage_type: UsageType,
        percentage: u32,
        cooldown: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool, EngineError> {
        let mut inner = self.inner.lock().await;
        Ok(inner
            .get_mut(key)
            .map(|record| record.note_warning(usage_type, percentage, cooldown, now))
            .unwrap_or(false))
    }

    async fn note_violation(
        &self,
        key: &UsageKey,
        violation: LimitViolation,
        limits: &LimitSet,
    ) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().await;
        let record = inner
            .entry(key.clone())
            .or_insert_with(|| UsageRecord::new(key.clone(), *limits, violation.timestamp));
        record.updated_at = violation.timestamp;
        record.violations.push(violation);
        Ok(())
    }
}

/// In-memory append-only audit sink with query helpers for compliance
/// reads and tests.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: RwLock<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All entries for a tenant, in append order.
    pub async fn for_tenant(&self, tenant: &TenantId) -> Vec<AuditEntry> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| &e.tenant_id == tenant)
            .cloned()
            .collect()
    }

    /// Number of entries of one event type for a tenant.
    pub async fn count_of(&self, tenant: &TenantId, event_type: AuditEventType) -> usize {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| &e.tenant_id == tenant && e.event_type == event_type)
            .count()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, entry: AuditEntry) -> Result<(), EngineError> {
        self.entries.write().await.push(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::keys::{ModuleKey, Period};
    use crate::model::license::{BillingCycle, ModuleSpec, ModuleTier, SubscriptionStatus};
    use chrono::TimeZone;
    use std::sync::Arc;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap()
    }

    fn usage_key() -> UsageKey {
        UsageKey::new(
            TenantId::new("acme"),
            ModuleKey::Attendance,
            Period::parse("2025-01").unwrap(),
        )
    }

    fn capped_limits(limit: u64) -> LimitSet {
        LimitSet::default().with(UsageType::Employees, limit)
    }

    fn sample_license(tenant: &str) -> License {
        License::new(
            TenantId::new(tenant),
            &[ModuleSpec::new(
                ModuleKey::Attendance,
                ModuleTier::Business,
                capped_limits(100),
            )],
            BillingCycle::Monthly,
            SubscriptionStatus::Active,
            None,
            t0(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn license_insert_then_get() {
        let store = MemoryLicenseStore::new();
        store.insert(sample_license("acme")).await.unwrap();
        let loaded = store.get(&TenantId::new("acme")).await.unwrap().unwrap();
        assert_eq!(loaded.tenant_id, TenantId::new("acme"));
    }

    #[tokio::test]
    async fn duplicate_license_insert_rejected() {
        let store = MemoryLicenseStore::new();
        store.insert(sample_license("acme")).await.unwrap();
        let err = store.insert(sample_license("acme")).await.unwrap_err();
        assert!(matches!(err, EngineError::DuplicateSubscription { .. }));
    }

    #[tokio::test]
    async fn put_requires_existing_license() {
        let store = MemoryLicenseStore::new();
        let err = store.put(sample_license("acme")).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[tokio::test]
    async fn increment_creates_record_with_limit_snapshot() {
        let store = MemoryUsageStore::new();
        let outcome = store
            .try_increment(&usage_key(), UsageType::Employees, 10, &capped_limits(100), t0())
            .await
            .unwrap();
        assert_eq!(outcome, Increment::Applied { new_total: 10 });

        let record = store.get(&usage_key()).await.unwrap().unwrap();
        assert_eq!(record.limits.limit_for(UsageType::Employees), Some(100));
    }

    #[tokio::test]
    async fn increment_rejected_at_cap_leaves_usage_unchanged() {
        let store = MemoryUsageStore::new();
        let limits = capped_limits(100);
        store
            .try_increment(&usage_key(), UsageType::Employees, 80, &limits, t0())
            .await
            .unwrap();

        let outcome = store
            .try_increment(&usage_key(), UsageType::Employees, 25, &limits, t0())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            Increment::Rejected {
                current: 80,
                limit: 100
            }
        );
        let record = store.get(&usage_key()).await.unwrap().unwrap();
        assert_eq!(record.usage.get(UsageType::Employees), 80);
    }

    #[tokio::test]
    async fn increment_exactly_to_cap_allowed() {
        let store = MemoryUsageStore::new();
        let limits = capped_limits(100);
        let outcome = store
            .try_increment(&usage_key(), UsageType::Employees, 100, &limits, t0())
            .await
            .unwrap();
        assert_eq!(outcome, Increment::Applied { new_total: 100 });
    }

    #[tokio::test]
    async fn limit_snapshot_wins_over_later_limits_argument() {
        let store = MemoryUsageStore::new();
        store
            .try_increment(&usage_key(), UsageType::Employees, 90, &capped_limits(100), t0())
            .await
            .unwrap();

        // Record was created with limit 100; a raised live limit does
        // not rewrite the period snapshot
        let outcome = store
            .try_increment(&usage_key(), UsageType::Employees, 20, &capped_limits(500), t0())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            Increment::Rejected {
                current: 90,
                limit: 100
            }
        );
    }

    #[tokio::test]
    async fn concurrent_increments_never_overshoot() {
        let store = Arc::new(MemoryUsageStore::new());
        let limits = capped_limits(100);

        let a = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .try_increment(&usage_key(), UsageType::Employees, 60, &limits, t0())
                    .await
                    .unwrap()
            })
        };
        let b = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .try_increment(&usage_key(), UsageType::Employees, 60, &limits, t0())
                    .await
                    .unwrap()
            })
        };

        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        let applied = [a, b]
            .iter()
            .filter(|o| matches!(o, Increment::Applied { .. }))
            .count();
        assert_eq!(applied, 1, "exactly one of two competing increments may win");

        let record = store.get(&usage_key()).await.unwrap().unwrap();
        assert_eq!(record.usage.get(UsageType::Employees), 60);
    }

    #[tokio::test]
    async fn note_warning_on_missing_record_does_not_fire() {
        let store = MemoryUsageStore::new();
        let fired = store
            .note_warning(&usage_key(), UsageType::Employees, 80, Duration::hours(24), t0())
            .await
            .unwrap();
        assert!(!fired);
    }

    #[tokio::test]
    async fn note_violation_creates_record_when_absent() {
        let store = MemoryUsageStore::new();
        let violation = LimitViolation {
            limit_type: UsageType::Employees,
            attempted_amount: 500,
            current_usage: 0,
            limit: 100,
            timestamp: t0(),
        };
        store
            .note_violation(&usage_key(), violation, &capped_limits(100))
            .await
            .unwrap();

        let record = store.get(&usage_key()).await.unwrap().unwrap();
        assert_eq!(record.usage.get(UsageType::Employees), 0);
        assert_eq!(record.violations.len(), 1);
    }

    #[tokio::test]
    async fn audit_sink_appends_and_queries() {
        use crate::model::audit::{AuditScope, AuditSeverity};
        use uuid::Uuid;

        let sink = MemoryAuditSink::new();
        let tenant = TenantId::new("acme");
        let entry = AuditEntry::new(
            tenant.clone(),
            AuditScope::Module(ModuleKey::Attendance),
            AuditEventType::LimitExceeded,
            serde_json::json!({}),
            t0(),
            Uuid::new_v4(),
        );
        sink.append(entry).await.unwrap();

        assert_eq!(sink.for_tenant(&tenant).await.len(), 1);
        assert_eq!(sink.count_of(&tenant, AuditEventType::LimitExceeded).await, 1);
        assert_eq!(sink.count_of(&tenant, AuditEventType::LimitWarning).await, 0);
        assert_eq!(
            sink.for_tenant(&tenant).await[0].severity,
            AuditSeverity::Critical
        );
    }
}
