//! License documents: per-tenant subscription and per-module
//! entitlement state.
//!
//! A `License` owns an ordered collection of `ModuleLicense` entries,
//! unique by key. Core HR is inserted at construction when absent and
//! can never be disabled; both invariants live here rather than being
//! re-checked at call sites.

use crate::model::keys::{ModuleKey, TenantId, UsageType};
use crate::EngineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Subscription lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    /// Trial period, full access until `trial_ends_at`.
    Trial,
    /// Paid and active.
    Active,
    /// Expired; only Core HR remains enabled.
    Expired,
    /// Suspended by an operator.
    Suspended,
    /// Cancelled by the tenant.
    Cancelled,
}

/// Subscription billing cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingCycle {
    /// Billed every month.
    Monthly,
    /// Billed every year.
    Annual,
}

/// Pricing tier of a licensed module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleTier {
    /// Entry tier.
    Starter,
    /// Mid tier.
    Business,
    /// Top tier.
    Enterprise,
}

/// Per-usage-type caps for one module. `None` means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitSet {
    /// Cap on employee records.
    pub employees: Option<u64>,
    /// Cap on storage units.
    pub storage: Option<u64>,
    /// Cap on API calls.
    pub api_calls: Option<u64>,
}

impl LimitSet {
    /// A limit set with every dimension unlimited.
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// The cap for one usage type, `None` if unlimited.
    pub fn limit_for(&self, usage_type: UsageType) -> Option<u64> {
        match usage_type {
            UsageType::Employees => self.employees,
            UsageType::Storage => self.storage,
            UsageType::ApiCalls => self.api_calls,
        }
    }

    /// Set the cap for one usage type.
    pub fn set(&mut self, usage_type: UsageType, limit: Option<u64>) {
        match usage_type {
            UsageType::Employees => self.employees = limit,
            UsageType::Storage => self.storage = limit,
            UsageType::ApiCalls => self.api_calls = limit,
        }
    }

    /// Builder-style helper used widely in tests.
    pub fn with(mut self, usage_type: UsageType, limit: u64) -> Self {
        self.set(usage_type, Some(limit));
        self
    }
}

/// Requested module configuration at subscription creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSpec {
    /// Which module to license.
    pub module_key: ModuleKey,
    /// Tier to license it at.
    pub tier: ModuleTier,
    /// Usage caps for the module.
    pub limits: LimitSet,
}

impl ModuleSpec {
    /// Convenience constructor.
    pub fn new(module_key: ModuleKey, tier: ModuleTier, limits: LimitSet) -> Self {
        Self {
            module_key,
            tier,
            limits,
        }
    }
}

/// Entitlement state of one module within a license.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleLicense {
    /// Module identity, unique within the license.
    pub key: ModuleKey,
    /// Whether the module is currently enabled.
    pub enabled: bool,
    /// Licensed tier.
    pub tier: ModuleTier,
    /// Usage caps.
    pub limits: LimitSet,
    /// When the module was activated.
    pub activated_at: DateTime<Utc>,
    /// Optional per-module expiry.
    pub expires_at: Option<DateTime<Utc>>,
}

impl ModuleLicense {
    /// Whether the module is enabled and not past its own expiry.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.expires_at.map_or(true, |at| at > now)
    }
}

/// The per-tenant record of subscription status and per-module
/// entitlement. One exists per tenant; it is mutated in place by the
/// lifecycle manager and never recreated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct License {
    /// Owning tenant, the unique key of the document.
    pub tenant_id: TenantId,
    /// Subscription identity.
    pub subscription_id: Uuid,
    /// Lifecycle state.
    pub status: SubscriptionStatus,
    /// Billing cadence.
    pub billing_cycle: BillingCycle,
    /// End of the trial window, when status is `Trial`.
    pub trial_ends_at: Option<DateTime<Utc>>,
    /// When the license was created.
    pub created_at: DateTime<Utc>,
    /// When the license was last mutated.
    pub updated_at: DateTime<Utc>,
    // Ordered, unique by key; Core HR always present and enabled.
    modules: Vec<ModuleLicense>,
}

impl License {
    /// Build a license from module specs.
    ///
    /// Rejects duplicate module keys. Core HR is licensed implicitly
    /// (Starter tier, unlimited) when the specs do not mention it.
    pub fn new(
        tenant_id: TenantId,
        specs: &[ModuleSpec],
        billing_cycle: BillingCycle,
        status: SubscriptionStatus,
        trial_ends_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Self, EngineError> {
        let mut modules: Vec<ModuleLicense> = Vec::with_capacity(specs.len() + 1);
        for spec in specs {
            if modules.iter().any(|m| m.key == spec.module_key) {
                return Err(EngineError::DuplicateModule {
                    module: spec.module_key.to_string(),
                });
            }
            modules.push(ModuleLicense {
                key: spec.module_key,
                enabled: true,
                tier: spec.tier,
                limits: spec.limits,
                activated_at: now,
                expires_at: None,
            });
        }
        if !modules.iter().any(|m| m.key == ModuleKey::CoreHr) {
            modules.insert(
                0,
                ModuleLicense {
                    key: ModuleKey::CoreHr,
                    enabled: true,
                    tier: ModuleTier::Starter,
                    limits: LimitSet::unlimited(),
                    activated_at: now,
                    expires_at: None,
                },
            );
        }

        Ok(Self {
            tenant_id,
            subscription_id: Uuid::new_v4(),
            status,
            billing_cycle,
            trial_ends_at,
            created_at: now,
            updated_at: now,
            modules,
        })
    }

    /// The licensed modules, in activation order.
    pub fn modules(&self) -> &[ModuleLicense] {
        &self.modules
    }

    /// Look up one module's entitlement.
    pub fn module(&self, key: ModuleKey) -> Option<&ModuleLicense> {
        self.modules.iter().find(|m| m.key == key)
    }

    /// Disable every module except Core HR, preserving tier, limits
    /// and activation data. Returns the keys disabled by this call.
    ///
    /// Applying this to an already-downgraded license is a no-op that
    /// returns an empty list, which keeps expiration idempotent.
    pub fn disable_non_core_modules(&mut self, now: DateTime<Utc>) -> Vec<ModuleKey> {
        let mut disabled = Vec::new();
        for module in &mut self.modules {
            if module.key.is_metered() && module.enabled {
                module.enabled = false;
                disabled.push(module.key);
            }
        }
        if !disabled.is_empty() {
            self.updated_at = now;
        }
        disabled
    }

    /// Current limits for one module, `None` if the module is not part
    /// of this license.
    pub fn limits_for(&self, key: ModuleKey) -> Option<LimitSet> {
        self.module(key).map(|m| m.limits)
    }
}
