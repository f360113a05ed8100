//! Subscription lifecycle: creation, expiration, trial transitions,
//! and the fail-closed entitlement read.
//!
//! Every transition rewrites the tenant's license as one document, so
//! a concurrent reader sees either the old or the new module set,
//! never a half-disabled one. Core HR survives every downgrade.

use crate::clock::Clock;
use crate::model::audit::{AuditEntry, AuditEventType, AuditScope};
use crate::model::keys::{ModuleKey, TenantId};
use crate::model::license::{BillingCycle, License, ModuleSpec, SubscriptionStatus};
use crate::store::{AuditSink, LicenseStore};
use crate::EngineError;
use chrono::Duration;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Manages per-tenant subscription and entitlement state.
pub struct SubscriptionLifecycle {
    licenses: Arc<dyn LicenseStore>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl SubscriptionLifecycle {
    /// Create a lifecycle manager over the given stores.
    pub fn new(
        licenses: Arc<dyn LicenseStore>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            licenses,
            audit,
            clock,
        }
    }

    /// Create a subscription for a tenant.
    ///
    /// `trial_days` of `Some(n)` starts the subscription in trial
    /// state ending `n` days from now; `None` starts it active.
    /// Core HR is licensed implicitly when the specs do not mention
    /// it.
    ///
    /// # Errors
    /// - `DuplicateSubscription` — the tenant already has a license
    /// - `DuplicateModule` — the same module appears twice in `specs`
    pub async fn create_subscription(
        &self,
        tenant: TenantId,
        specs: &[ModuleSpec],
        billing_cycle: BillingCycle,
        trial_days: Option<u32>,
    ) -> Result<License, EngineError> {
        let now = self.clock.now_utc();
        let (status, trial_ends_at) = match trial_days {
            Some(days) => (
                SubscriptionStatus::Trial,
                Some(now + Duration::days(i64::from(days))),
            ),
            None => (SubscriptionStatus::Active, None),
        };

        let license = License::new(tenant.clone(), specs, billing_cycle, status, trial_ends_at, now)?;
        self.licenses.insert(license.clone()).await?;

        debug!(
            tenant = %tenant,
            modules = license.modules().len(),
            ?status,
            "subscription created"
        );
        self.audit
            .append(AuditEntry::new(
                tenant,
                AuditScope::Subscription,
                AuditEventType::SubscriptionCreated,
                json!({
                    "subscriptionId": license.subscription_id,
                    "billingCycle": billing_cycle,
                    "status": status,
                    "modules": license.modules().iter().map(|m| m.key).collect::<Vec<_>>(),
                }),
                now,
                Uuid::new_v4(),
            ))
            .await?;

        Ok(license)
    }

    /// Expire a tenant's subscription: status becomes `Expired` and
    /// every module except Core HR is disabled, keeping tier, limits
    /// and activation data intact.
    ///
    /// Idempotent: a second call finds nothing left to disable and
    /// reproduces the same module state.
    ///
    /// # Errors
    /// - `NotFound` — the tenant has no license
    pub async fn expire_subscription(&self, tenant: &TenantId) -> Result<License, EngineError> {
        self.downgrade(tenant, SubscriptionStatus::Expired, "subscription_expired")
            .await
    }

    /// Resolve an ended trial. Converting keeps every module enabled,
    /// clears `trial_ends_at`, and activates the subscription;
    /// otherwise the trial expires exactly like a subscription
    /// expiration, with audit reason `trial_expired`.
    ///
    /// # Errors
    /// - `NotFound` — the tenant has no license
    pub async fn expire_trial(
        &self,
        tenant: &TenantId,
        convert_to_active: bool,
    ) -> Result<License, EngineError> {
        if !convert_to_active {
            return self
                .downgrade(tenant, SubscriptionStatus::Expired, "trial_expired")
                .await;
        }

        let now = self.clock.now_utc();
        let mut license = self
            .licenses
            .get(tenant)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                tenant: tenant.to_string(),
            })?;

        license.status = SubscriptionStatus::Active;
        license.trial_ends_at = None;
        license.updated_at = now;
        self.licenses.put(license.clone()).await?;

        debug!(tenant = %tenant, "trial converted to active");
        self.audit
            .append(AuditEntry::new(
                tenant.clone(),
                AuditScope::Subscription,
                AuditEventType::TrialConverted,
                json!({ "subscriptionId": license.subscription_id }),
                now,
                Uuid::new_v4(),
            ))
            .await?;

        Ok(license)
    }

    /// Whether a module is currently usable by a tenant.
    ///
    /// Never fails: an unknown tenant, an unlicensed module, or a
    /// storage error all resolve to `false`, so callers can simply
    /// hide functionality. Core HR reports `true` for any tenant that
    /// holds a license, regardless of subscription status.
    pub async fn is_module_enabled(&self, tenant: &TenantId, module: ModuleKey) -> bool {
        let license = match self.licenses.get(tenant).await {
            Ok(Some(license)) => license,
            Ok(None) => return false,
            Err(error) => {
                warn!(tenant = %tenant, %module, %error, "license read failed, failing closed");
                return false;
            }
        };

        if module == ModuleKey::CoreHr {
            return true;
        }
        license
            .module(module)
            .map(|m| m.is_active(self.clock.now_utc()))
            .unwrap_or(false)
    }

    /// Shared downgrade path for subscription and trial expiration.
    async fn downgrade(
        &self,
        tenant: &TenantId,
        status: SubscriptionStatus,
        reason: &str,
    ) -> Result<License, EngineError> {
        let now = self.clock.now_utc();
        let mut license = self
            .licenses
            .get(tenant)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                tenant: tenant.to_string(),
            })?;

        license.status = status;
        license.trial_ends_at = None;
        license.updated_at = now;
        let deactivated = license.disable_non_core_modules(now);

        // One atomic document write covers the status change and the
        // whole module-list update
        self.licenses.put(license.clone()).await?;

        warn!(
            tenant = %tenant,
            reason,
            deactivated = deactivated.len(),
            "subscription downgraded"
        );

        let correlation_id = Uuid::new_v4();
        self.audit
            .append(AuditEntry::new(
                tenant.clone(),
                AuditScope::Subscription,
                AuditEventType::LicenseExpired,
                json!({ "reason": reason }),
                now,
                correlation_id,
            ))
            .await?;
        for module in deactivated {
            self.audit
                .append(AuditEntry::new(
                    tenant.clone(),
                    AuditScope::Module(module),
                    AuditEventType::ModuleDeactivated,
                    json!({ "reason": reason }),
                    now,
                    correlation_id,
                ))
                .await?;
        }

        Ok(license)
    }
}
