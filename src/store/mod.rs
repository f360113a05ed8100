//! Storage ports for licenses, usage records, and audit entries.
//!
//! The engine owns no storage; backends are injected as trait objects.
//! Every implementation must honor the atomicity contracts documented
//! on each trait — in particular, `UsageStore::try_increment` is the
//! only code path that may move a usage counter, and it must be a
//! single indivisible check-and-update.

pub mod memory;

use crate::model::audit::AuditEntry;
use crate::model::keys::{TenantId, UsageType};
use crate::model::license::{License, LimitSet};
use crate::model::usage::{LimitViolation, UsageKey, UsageRecord};
use crate::EngineError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

/// Outcome of a conditional usage increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Increment {
    /// The increment was applied.
    Applied {
        /// Counter value after the increment.
        new_total: u64,
    },
    /// The increment would have exceeded the limit; nothing changed.
    Rejected {
        /// Counter value at the time of the attempt.
        current: u64,
        /// The limit in force.
        limit: u64,
    },
}

/// Per-tenant license documents, keyed uniquely by tenant.
///
/// `put` must replace the whole document atomically so no reader ever
/// observes a half-applied module update.
#[async_trait]
pub trait LicenseStore: Send + Sync {
    /// Insert a new license. Fails with `DuplicateSubscription` if the
    /// tenant already has one.
    async fn insert(&self, license: License) -> Result<(), EngineError>;

    /// Fetch a tenant's license.
    async fn get(&self, tenant: &TenantId) -> Result<Option<License>, EngineError>;

    /// Replace a tenant's license as one atomic write. Fails with
    /// `NotFound` if the tenant has no license.
    async fn put(&self, license: License) -> Result<(), EngineError>;
}

/// Usage records keyed by (tenant, module, period).
///
/// Implementations must make `try_increment` linearizable per key: two
/// concurrent competing increments must each be checked against the
/// true post-lock counter, so they can never jointly overshoot a cap.
/// A backend without native conditional writes must serialize
/// competing increments for the same key behind a lock.
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Conditionally add `amount` to the counter for `usage_type`,
    /// creating the period record (with `limits` snapshotted) when it
    /// does not exist. The increment applies only when the limit for
    /// the usage type is absent or `current + amount <= limit`, as one
    /// indivisible operation.
    async fn try_increment(
        &self,
        key: &UsageKey,
        usage_type: UsageType,
        amount: u64,
        limits: &LimitSet,
        now: DateTime<Utc>,
    ) -> Result<Increment, EngineError>;

    /// Fetch a usage record.
    async fn get(&self, key: &UsageKey) -> Result<Option<UsageRecord>, EngineError>;

    /// Upsert the warning entry for a usage type on an existing
    /// record, returning whether the warning fired (no prior entry, or
    /// the cooldown elapsed). Returns `false` when the record does not
    /// exist.
    async fn note_warning(
        &self,
        key: &UsageKey,
        usage_type: UsageType,
        percentage: u32,
        cooldown: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool, EngineError>;

    /// Append a violation to an existing record, creating the record
    /// (with `limits` snapshotted) when absent so blocked first calls
    /// of a period still leave a trace.
    async fn note_violation(
        &self,
        key: &UsageKey,
        violation: LimitViolation,
        limits: &LimitSet,
    ) -> Result<(), EngineError>;
}

/// Append-only sink for audit entries.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persist one audit entry. Entries are immutable once appended.
    async fn append(&self, entry: AuditEntry) -> Result<(), EngineError>;
}
