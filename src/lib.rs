//! # Tenantmeter
//!
//! **Multi-tenant entitlement and usage metering for SaaS backends.**
//!
//! Tenantmeter decides which product modules a tenant may use, meters
//! consumption of billable resources per module and calendar month,
//! and enforces hard quotas **atomically under concurrency** — two
//! competing increments can never jointly overshoot a cap.
//!
//! ## Features
//!
//! - **Atomic conditional increments** — quota check and counter
//!   update are one indivisible storage operation
//! - **Threshold warnings** — one warning per (tenant, module, usage
//!   type) per 24-hour window as usage crosses 80% of a limit
//! - **Subscription lifecycle** — trial, activation, and expiration
//!   transitions that always preserve Core HR
//! - **Fail-closed entitlement reads** — unknown tenants and modules
//!   report disabled instead of failing
//! - **Append-only audit trail** — every limit event and entitlement
//!   change leaves an immutable compliance record
//! - **Deferred batching** — high-volume callers can coalesce
//!   increments and flush them with identical quota semantics
//!
//! ## Quickstart
//!
//! ```no_run
//! use std::sync::Arc;
//! use tenantmeter::{
//!     BillingCycle, LimitSet, MemoryAuditSink, MemoryLicenseStore, MemoryUsageStore,
//!     ModuleKey, ModuleSpec, ModuleTier, SubscriptionLifecycle, SystemClock, TenantId,
//!     TrackerConfig, UsageTracker, UsageType,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tenantmeter::EngineError> {
//!     let licenses = Arc::new(MemoryLicenseStore::new());
//!     let usage = Arc::new(MemoryUsageStore::new());
//!     let audit = Arc::new(MemoryAuditSink::new());
//!     let clock = Arc::new(SystemClock);
//!
//!     let lifecycle = SubscriptionLifecycle::new(licenses.clone(), audit.clone(), clock.clone());
//!     let tracker = UsageTracker::new(
//!         licenses,
//!         usage,
//!         audit,
//!         clock,
//!         TrackerConfig::default(),
//!     )?;
//!
//!     let tenant = TenantId::new("acme");
//!     lifecycle
//!         .create_subscription(
//!             tenant.clone(),
//!             &[ModuleSpec::new(
//!                 ModuleKey::Attendance,
//!                 ModuleTier::Business,
//!                 LimitSet::default().with(UsageType::Employees, 100),
//!             )],
//!             BillingCycle::Monthly,
//!             None,
//!         )
//!         .await?;
//!
//!     let outcome = tracker
//!         .track(&tenant, ModuleKey::Attendance, UsageType::Employees, 5)
//!         .await?;
//!     println!("tracked: {}", outcome.is_tracked());
//!     Ok(())
//! }
//! ```
//!
//! ## Guarantees
//!
//! - For a given (tenant, module, usage type, period), increments are
//!   linearizable and all-or-nothing: each competing call is accepted
//!   or rejected against the true post-lock counter.
//! - A blocked call leaves usage unchanged and writes exactly one
//!   critical audit entry.
//! - Core HR is always licensed, always enabled, and never metered.
//! - Expiration is idempotent and applied as one document write, so
//!   readers never observe a half-disabled module set.
//!
//! Tenantmeter does **not** deduplicate retries: a caller that retries
//! after a storage timeout may double-count unless it layers its own
//! idempotency keys. See [`UsageTracker::track`].

#![deny(warnings)]
#![deny(missing_docs)]

// Core modules
pub mod clock;
pub mod config;
pub mod errors;

// Domain model
pub mod model;

// Storage ports
pub mod store;

// Event layer
pub mod events;

// Lifecycle manager
pub mod lifecycle;

// Usage tracker (main metering API)
pub mod tracker;

// Re-exports for public API
pub use clock::{Clock, SystemClock};
pub use config::TrackerConfig;
pub use errors::EngineError;
pub use events::{EventBus, UsageEvent};
pub use lifecycle::SubscriptionLifecycle;
pub use model::audit::{AuditEntry, AuditEventType, AuditScope, AuditSeverity};
pub use model::keys::{ModuleKey, Period, TenantId, UsageType};
pub use model::license::{
    BillingCycle, License, LimitSet, ModuleLicense, ModuleSpec, ModuleTier, SubscriptionStatus,
};
pub use model::usage::{LimitViolation, LimitWarning, UsageKey, UsageRecord};
pub use store::memory::{MemoryAuditSink, MemoryLicenseStore, MemoryUsageStore};
pub use store::{AuditSink, Increment, LicenseStore, UsageStore};
pub use tracker::{
    FlushSummary, MetricReport, ModuleUsageSummary, TenantUsageReport, TrackOutcome, UsageReport,
    UsageTracker,
};

#[cfg(any(test, feature = "test-seams"))]
pub use clock::MockClock;
