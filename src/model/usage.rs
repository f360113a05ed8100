//! Per-period usage records with warning and violation history.
//!
//! A `UsageRecord` is keyed by (tenant, module, period) and created
//! lazily on the first metered call in a period. Its limits are a
//! snapshot taken at creation; later license changes do not rewrite
//! history. Counters only move through the store's conditional
//! increment, never directly.

use crate::model::keys::{ModuleKey, Period, TenantId, UsageType};
use crate::model::license::LimitSet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Composite key of a usage record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageKey {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Metered module.
    pub module: ModuleKey,
    /// Calendar-month period.
    pub period: Period,
}

impl UsageKey {
    /// Convenience constructor.
    pub fn new(tenant_id: TenantId, module: ModuleKey, period: Period) -> Self {
        Self {
            tenant_id,
            module,
            period,
        }
    }
}

/// Per-usage-type counters, monotonically non-decreasing within a
/// period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageCounters {
    /// Employee records consumed.
    pub employees: u64,
    /// Storage units consumed.
    pub storage: u64,
    /// API calls consumed.
    pub api_calls: u64,
}

impl UsageCounters {
    /// The counter for one usage type.
    pub fn get(&self, usage_type: UsageType) -> u64 {
        match usage_type {
            UsageType::Employees => self.employees,
            UsageType::Storage => self.storage,
            UsageType::ApiCalls => self.api_calls,
        }
    }

    /// Add to the counter for one usage type.
    pub fn add(&mut self, usage_type: UsageType, amount: u64) {
        match usage_type {
            UsageType::Employees => self.employees += amount,
            UsageType::Storage => self.storage += amount,
            UsageType::ApiCalls => self.api_calls += amount,
        }
    }
}

/// One approaching-limit warning, at most one entry per usage type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitWarning {
    /// Usage type the warning applies to.
    pub limit_type: UsageType,
    /// Usage as a percentage of the limit when last triggered.
    pub percentage: u32,
    /// First time this warning fired in the period.
    pub first_triggered_at: DateTime<Utc>,
    /// Most recent time this warning fired.
    pub last_triggered_at: DateTime<Utc>,
}

/// One blocked attempt that would have exceeded a limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitViolation {
    /// Usage type that was capped.
    pub limit_type: UsageType,
    /// The amount the caller tried to add.
    pub attempted_amount: u64,
    /// Usage at the moment of the attempt.
    pub current_usage: u64,
    /// The limit in force.
    pub limit: u64,
    /// When the attempt was blocked.
    pub timestamp: DateTime<Utc>,
}

/// The per-tenant-per-module-per-period counter document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    /// Composite identity.
    pub key: UsageKey,
    /// Consumed amounts.
    pub usage: UsageCounters,
    /// Limits in effect when the record was created.
    pub limits: LimitSet,
    /// Warning history, at most one entry per usage type.
    pub warnings: Vec<LimitWarning>,
    /// Blocked-attempt history.
    pub violations: Vec<LimitViolation>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record was last mutated.
    pub updated_at: DateTime<Utc>,
}

impl UsageRecord {
    /// Create an empty record with a limits snapshot.
    pub fn new(key: UsageKey, limits: LimitSet, now: DateTime<Utc>) -> Self {
        Self {
            key,
            usage: UsageCounters::default(),
            limits,
            warnings: Vec::new(),
            violations: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Upsert the warning entry for a usage type, reporting whether it
    /// fired (i.e. the cooldown had elapsed, or no prior warning
    /// existed). `last_triggered_at` is refreshed only when it fires,
    /// so suppressed re-triggers do not push the window forward.
    pub fn note_warning(
        &mut self,
        usage_type: UsageType,
        percentage: u32,
        cooldown: chrono::Duration,
        now: DateTime<Utc>,
    ) -> bool {
        match self.warnings.iter_mut().find(|w| w.limit_type == usage_type) {
            Some(existing) => {
                if now - existing.last_triggered_at < cooldown {
                    return false;
                }
                existing.percentage = percentage;
                existing.last_triggered_at = now;
                self.updated_at = now;
                true
            }
            None => {
                self.warnings.push(LimitWarning {
                    limit_type: usage_type,
                    percentage,
                    first_triggered_at: now,
                    last_triggered_at: now,
                });
                self.updated_at = now;
                true
            }
        }
    }
}
