//! The usage tracker: atomic quota-checked increments, threshold
//! warnings, blocking, batching, and reporting.
//!
//! One tracker instance holds its injected stores, clock, and event
//! bus; there is no process-global state, so tests can run many
//! isolated engines side by side.

mod batch;

use crate::clock::Clock;
use crate::config::TrackerConfig;
use crate::events::{EventBus, UsageEvent};
use crate::model::audit::{AuditEntry, AuditEventType, AuditScope};
use crate::model::keys::{ModuleKey, Period, TenantId, UsageType};
use crate::model::license::{License, LimitSet};
use crate::model::usage::{LimitViolation, LimitWarning, UsageKey};
use crate::store::{AuditSink, Increment, LicenseStore, UsageStore};
use crate::EngineError;
use batch::{BatchKey, BatchQueue};
use chrono::Duration;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

/// Result of one tracking call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOutcome {
    /// The module is not usage-metered (Core HR); nothing was stored.
    NotMetered,
    /// The increment was enqueued for a later flush.
    Queued,
    /// The increment was applied.
    Tracked {
        /// Counter value after the increment.
        new_total: u64,
        /// The limit in force, `None` if unlimited.
        limit: Option<u64>,
        /// Usage as a rounded percentage of the limit.
        percentage: Option<u32>,
        /// Whether usage is at or past the warning threshold.
        approaching_limit: bool,
    },
    /// The increment would have exceeded the limit; usage is
    /// unchanged.
    Blocked {
        /// Counter value at the time of the attempt.
        current: u64,
        /// The limit in force.
        limit: u64,
        /// The amount that was attempted.
        attempted: u64,
    },
}

impl TrackOutcome {
    /// Whether usage was persisted by this call.
    pub fn is_tracked(&self) -> bool {
        matches!(self, TrackOutcome::Tracked { .. })
    }

    /// Whether the call was blocked by a limit.
    pub fn is_blocked(&self) -> bool {
        matches!(self, TrackOutcome::Blocked { .. })
    }
}

/// Per-usage-type slice of a usage report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricReport {
    /// The usage type.
    pub usage_type: UsageType,
    /// Consumed amount in the period.
    pub current: u64,
    /// The limit in force, `None` if unlimited.
    pub limit: Option<u64>,
    /// Usage as a rounded percentage of the limit.
    pub percentage: Option<u32>,
    /// Whether usage is at or past the warning threshold.
    pub approaching_limit: bool,
    /// Whether usage has reached the limit.
    pub exceeded: bool,
}

/// Usage of one module in one period.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageReport {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Reported module.
    pub module: ModuleKey,
    /// Reported period.
    pub period: Period,
    /// One entry per usage type.
    pub metrics: Vec<MetricReport>,
    /// Warning history of the period.
    pub warnings: Vec<LimitWarning>,
    /// Blocked-attempt history of the period.
    pub violations: Vec<LimitViolation>,
}

impl UsageReport {
    /// The metric entry for one usage type.
    pub fn metric(&self, usage_type: UsageType) -> &MetricReport {
        self.metrics
            .iter()
            .find(|m| m.usage_type == usage_type)
            .expect("reports carry every usage type")
    }
}

/// Compact per-module entry of a tenant-wide report.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleUsageSummary {
    /// The module.
    pub module: ModuleKey,
    /// Whether the module is currently enabled.
    pub enabled: bool,
    /// One entry per usage type.
    pub metrics: Vec<MetricReport>,
    /// Number of warnings in the period.
    pub warning_count: usize,
    /// Number of blocked attempts in the period.
    pub violation_count: usize,
}

/// Usage of every licensed module of a tenant in one period.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantUsageReport {
    /// The tenant.
    pub tenant_id: TenantId,
    /// Reported period.
    pub period: Period,
    /// One entry per licensed module, in license order.
    pub modules: Vec<ModuleUsageSummary>,
}

/// Counts from one batch flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    /// Increments applied.
    pub applied: usize,
    /// Increments blocked by a limit.
    pub blocked: usize,
}

/// Meters consumption of billable resources per tenant and module,
/// enforcing quotas atomically.
///
/// Retry semantics: the tracker does not deduplicate. A call that
/// fails with [`EngineError::StorageUnavailable`] left no partial
/// increment, so retrying is safe — but if the failure happened after
/// the write landed (e.g. a lost acknowledgment in a remote backend),
/// a retry double-counts. Callers that need exactly-once accounting
/// must deduplicate with their own idempotency keys.
pub struct UsageTracker {
    licenses: Arc<dyn LicenseStore>,
    usage: Arc<dyn UsageStore>,
    audit: Arc<dyn AuditSink>,
    events: EventBus,
    clock: Arc<dyn Clock>,
    config: TrackerConfig,
    queue: BatchQueue,
}

impl UsageTracker {
    /// Create a tracker over the given stores.
    ///
    /// # Errors
    /// Returns `ConfigError` if the configuration is invalid.
    pub fn new(
        licenses: Arc<dyn LicenseStore>,
        usage: Arc<dyn UsageStore>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        config: TrackerConfig,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            licenses,
            usage,
            audit,
            events: EventBus::new(config.event_capacity),
            clock,
            config,
            queue: BatchQueue::new(),
        })
    }

    /// Subscribe to warning and violation events. Dropping the
    /// receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<UsageEvent> {
        self.events.subscribe()
    }

    /// Track usage immediately.
    ///
    /// The quota check and the counter update are one indivisible
    /// storage operation, so concurrent competing calls can never
    /// jointly overshoot a cap. A blocked call leaves usage unchanged,
    /// records a violation, writes one critical audit entry, and
    /// publishes a [`UsageEvent::LimitExceeded`].
    ///
    /// # Errors
    /// - `InvalidAmount` — `amount` is zero; nothing was persisted
    /// - `NotFound` — the tenant has no license
    /// - `ModuleNotLicensed` — the module is not part of the license
    /// - `StorageUnavailable` — transient store failure, no partial
    ///   increment occurred
    pub async fn track(
        &self,
        tenant: &TenantId,
        module: ModuleKey,
        usage_type: UsageType,
        amount: u64,
    ) -> Result<TrackOutcome, EngineError> {
        if amount == 0 {
            return Err(EngineError::InvalidAmount { amount });
        }
        if !module.is_metered() {
            return Ok(TrackOutcome::NotMetered);
        }

        let license = self.require_license(tenant).await?;
        let limits = license
            .limits_for(module)
            .ok_or_else(|| EngineError::ModuleNotLicensed {
                tenant: tenant.to_string(),
                module: module.to_string(),
            })?;

        self.apply(tenant, module, usage_type, amount, &limits).await
    }

    /// Enqueue usage for the next flush instead of writing it now.
    ///
    /// Amounts coalesce per (tenant, module, usage type, period).
    /// Reaching the configured pending-entry threshold flushes inline.
    /// Quota enforcement happens at flush time with the same
    /// conditional semantics as [`UsageTracker::track`].
    ///
    /// # Errors
    /// - `InvalidAmount` — `amount` is zero; nothing was enqueued
    pub async fn track_deferred(
        &self,
        tenant: &TenantId,
        module: ModuleKey,
        usage_type: UsageType,
        amount: u64,
    ) -> Result<TrackOutcome, EngineError> {
        if amount == 0 {
            return Err(EngineError::InvalidAmount { amount });
        }
        if !module.is_metered() {
            return Ok(TrackOutcome::NotMetered);
        }

        let pending = self.queue.enqueue(
            BatchKey {
                tenant_id: tenant.clone(),
                module,
                usage_type,
                period: Period::containing(self.clock.now_utc()),
            },
            amount,
        );
        if pending >= self.config.batch_max_entries {
            self.flush().await?;
        }
        Ok(TrackOutcome::Queued)
    }

    /// Drain the deferred queue and apply every coalesced increment
    /// through the conditional path, with the same warning, violation,
    /// audit, and event side effects as immediate tracking.
    ///
    /// On a transient storage failure the unprocessed entries
    /// (including the failed one) are re-enqueued, preserving
    /// at-least-once delivery.
    ///
    /// # Errors
    /// - `StorageUnavailable` — transient store failure mid-flush
    pub async fn flush(&self) -> Result<FlushSummary, EngineError> {
        if self.queue.is_empty() {
            return Ok(FlushSummary::default());
        }
        let entries = self.queue.drain();
        debug!(entries = entries.len(), "flushing deferred usage");

        let mut summary = FlushSummary::default();
        let mut iter = entries.into_iter();
        while let Some((key, amount)) = iter.next() {
            let limits = match self.limits_for_entry(&key).await {
                Ok(Some(limits)) => limits,
                Ok(None) => continue, // logged inside
                Err(error) => {
                    // Put back the failed entry and the rest of the batch
                    self.queue.enqueue(key, amount);
                    for (key, amount) in iter {
                        self.queue.enqueue(key, amount);
                    }
                    return Err(error);
                }
            };

            let outcome = self
                .apply(&key.tenant_id, key.module, key.usage_type, amount, &limits)
                .await;
            match outcome {
                Ok(TrackOutcome::Blocked { .. }) => summary.blocked += 1,
                Ok(_) => summary.applied += 1,
                Err(error) => {
                    self.queue.enqueue(key, amount);
                    for (key, amount) in iter {
                        self.queue.enqueue(key, amount);
                    }
                    return Err(error);
                }
            }
        }
        Ok(summary)
    }

    /// Spawn a background task that flushes the deferred queue on the
    /// configured interval. Abort the returned handle to stop it.
    pub fn spawn_flusher(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let tracker = Arc::clone(self);
        let period = tracker.config.batch_flush_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await; // first tick fires immediately
            loop {
                ticker.tick().await;
                if let Err(error) = tracker.flush().await {
                    warn!(%error, "deferred usage flush failed, entries re-enqueued");
                }
            }
        })
    }

    /// Usage of one module in one period, defaulting to the current
    /// month.
    ///
    /// A period with no recorded usage reports zero counters against
    /// the live license limits with empty histories; reads never
    /// mutate historical periods.
    ///
    /// # Errors
    /// - `NotFound` — the tenant has no license
    /// - `ModuleNotLicensed` — the module is not part of the license
    pub async fn usage_report(
        &self,
        tenant: &TenantId,
        module: ModuleKey,
        period: Option<Period>,
    ) -> Result<UsageReport, EngineError> {
        let license = self.require_license(tenant).await?;
        let limits = license
            .limits_for(module)
            .ok_or_else(|| EngineError::ModuleNotLicensed {
                tenant: tenant.to_string(),
                module: module.to_string(),
            })?;
        let period = period.unwrap_or_else(|| Period::containing(self.clock.now_utc()));
        self.report_for(tenant, module, period, limits).await
    }

    /// Usage of every licensed module of a tenant in one period,
    /// defaulting to the current month. Carries warning and violation
    /// counts rather than full histories.
    ///
    /// # Errors
    /// - `NotFound` — the tenant has no license
    pub async fn tenant_usage_report(
        &self,
        tenant: &TenantId,
        period: Option<Period>,
    ) -> Result<TenantUsageReport, EngineError> {
        let license = self.require_license(tenant).await?;
        let period = period.unwrap_or_else(|| Period::containing(self.clock.now_utc()));
        let now = self.clock.now_utc();

        let mut modules = Vec::with_capacity(license.modules().len());
        for module_license in license.modules() {
            let report = self
                .report_for(tenant, module_license.key, period.clone(), module_license.limits)
                .await?;
            modules.push(ModuleUsageSummary {
                module: module_license.key,
                enabled: module_license.is_active(now),
                metrics: report.metrics,
                warning_count: report.warnings.len(),
                violation_count: report.violations.len(),
            });
        }

        Ok(TenantUsageReport {
            tenant_id: tenant.clone(),
            period,
            modules,
        })
    }

    /// The conditional-increment pipeline shared by immediate tracking
    /// and batch flushing.
    async fn apply(
        &self,
        tenant: &TenantId,
        module: ModuleKey,
        usage_type: UsageType,
        amount: u64,
        limits: &LimitSet,
    ) -> Result<TrackOutcome, EngineError> {
        let now = self.clock.now_utc();
        let key = UsageKey::new(tenant.clone(), module, Period::containing(now));

        match self
            .usage
            .try_increment(&key, usage_type, amount, limits, now)
            .await?
        {
            Increment::Rejected { current, limit } => {
                warn!(
                    tenant = %tenant,
                    %module,
                    %usage_type,
                    current,
                    limit,
                    attempted = amount,
                    "usage blocked at limit"
                );
                self.usage
                    .note_violation(
                        &key,
                        LimitViolation {
                            limit_type: usage_type,
                            attempted_amount: amount,
                            current_usage: current,
                            limit,
                            timestamp: now,
                        },
                        limits,
                    )
                    .await?;
                self.audit
                    .append(AuditEntry::new(
                        tenant.clone(),
                        AuditScope::Module(module),
                        AuditEventType::LimitExceeded,
                        json!({
                            "limitType": usage_type,
                            "currentValue": current + amount,
                            "limitValue": limit,
                        }),
                        now,
                        Uuid::new_v4(),
                    ))
                    .await?;
                self.events.publish(UsageEvent::LimitExceeded {
                    tenant_id: tenant.clone(),
                    module,
                    limit_type: usage_type,
                    current_usage: current,
                    limit,
                    attempted_amount: amount,
                });
                Ok(TrackOutcome::Blocked {
                    current,
                    limit,
                    attempted: amount,
                })
            }
            Increment::Applied { new_total } => {
                // Limit evaluation uses the record's snapshot semantics:
                // the store enforced against its snapshot, and new_total
                // came back from the same guarded operation
                let limit = limits.limit_for(usage_type);
                let percentage = limit.map(|l| rounded_percentage(new_total, l));
                let approaching_limit = limit
                    .map(|l| new_total >= warning_floor(l, self.config.warning_threshold_pct))
                    .unwrap_or(false);

                debug!(
                    tenant = %tenant,
                    %module,
                    %usage_type,
                    new_total,
                    ?limit,
                    "usage tracked"
                );

                if let (true, Some(limit_value), Some(pct)) = (approaching_limit, limit, percentage)
                {
                    self.raise_warning(tenant, module, usage_type, &key, new_total, limit_value, pct)
                        .await?;
                }

                Ok(TrackOutcome::Tracked {
                    new_total,
                    limit,
                    percentage,
                    approaching_limit,
                })
            }
        }
    }

    /// Emit a threshold warning unless one fired for this
    /// (tenant, module, usage type) within the cooldown window.
    #[allow(clippy::too_many_arguments)]
    async fn raise_warning(
        &self,
        tenant: &TenantId,
        module: ModuleKey,
        usage_type: UsageType,
        key: &UsageKey,
        new_total: u64,
        limit: u64,
        percentage: u32,
    ) -> Result<(), EngineError> {
        let now = self.clock.now_utc();
        let cooldown = Duration::from_std(self.config.warning_cooldown)
            .map_err(|e| EngineError::ConfigError(format!("warning_cooldown out of range: {e}")))?;

        let fired = self
            .usage
            .note_warning(key, usage_type, percentage, cooldown, now)
            .await?;
        if !fired {
            return Ok(());
        }

        warn!(
            tenant = %tenant,
            %module,
            %usage_type,
            new_total,
            limit,
            percentage,
            "usage approaching limit"
        );
        self.audit
            .append(AuditEntry::new(
                tenant.clone(),
                AuditScope::Module(module),
                AuditEventType::LimitWarning,
                json!({
                    "limitType": usage_type,
                    "currentValue": new_total,
                    "limitValue": limit,
                    "percentage": percentage,
                }),
                now,
                Uuid::new_v4(),
            ))
            .await?;
        self.events.publish(UsageEvent::LimitWarning {
            tenant_id: tenant.clone(),
            module,
            limit_type: usage_type,
            current_usage: new_total,
            limit,
            percentage,
        });
        Ok(())
    }

    async fn require_license(&self, tenant: &TenantId) -> Result<License, EngineError> {
        self.licenses
            .get(tenant)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                tenant: tenant.to_string(),
            })
    }

    /// Resolve limits for a deferred entry at flush time. `Ok(None)`
    /// means the entry is no longer applicable and is dropped.
    async fn limits_for_entry(&self, key: &BatchKey) -> Result<Option<LimitSet>, EngineError> {
        match self.licenses.get(&key.tenant_id).await? {
            Some(license) => match license.limits_for(key.module) {
                Some(limits) => Ok(Some(limits)),
                None => {
                    warn!(
                        tenant = %key.tenant_id,
                        module = %key.module,
                        "dropping deferred usage for unlicensed module"
                    );
                    Ok(None)
                }
            },
            None => {
                warn!(tenant = %key.tenant_id, "dropping deferred usage for unknown tenant");
                Ok(None)
            }
        }
    }

    async fn report_for(
        &self,
        tenant: &TenantId,
        module: ModuleKey,
        period: Period,
        live_limits: LimitSet,
    ) -> Result<UsageReport, EngineError> {
        let key = UsageKey::new(tenant.clone(), module, period.clone());
        let record = self.usage.get(&key).await?;
        let limits = record.as_ref().map(|r| r.limits).unwrap_or(live_limits);

        let metrics = UsageType::ALL
            .iter()
            .map(|&usage_type| {
                let current = record
                    .as_ref()
                    .map(|r| r.usage.get(usage_type))
                    .unwrap_or(0);
                let limit = limits.limit_for(usage_type);
                MetricReport {
                    usage_type,
                    current,
                    limit,
                    percentage: limit.map(|l| rounded_percentage(current, l)),
                    approaching_limit: limit
                        .map(|l| current >= warning_floor(l, self.config.warning_threshold_pct))
                        .unwrap_or(false),
                    exceeded: limit.map(|l| current >= l).unwrap_or(false),
                }
            })
            .collect();

        let (warnings, violations) = record
            .map(|r| (r.warnings, r.violations))
            .unwrap_or_default();

        Ok(UsageReport {
            tenant_id: tenant.clone(),
            module,
            period,
            metrics,
            warnings,
            violations,
        })
    }
}

/// Usage as a percentage of the limit, rounded half up.
fn rounded_percentage(current: u64, limit: u64) -> u32 {
    debug_assert!(limit > 0);
    ((current * 200 + limit) / (2 * limit)) as u32
}

/// Smallest usage value considered "approaching" a limit:
/// `ceil(limit * pct / 100)`.
fn warning_floor(limit: u64, pct: u8) -> u64 {
    (limit * u64::from(pct) + 99) / 100
}
