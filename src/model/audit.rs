//! Append-only audit entries for compliance-relevant events.
//!
//! Entries are immutable once written; retention and purging are an
//! external concern.

use crate::model::keys::{ModuleKey, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What an audit entry is scoped to: the subscription as a whole, or a
/// single module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "scope", content = "module")]
pub enum AuditScope {
    /// The subscription itself (creation, expiration).
    Subscription,
    /// One module within the subscription.
    Module(ModuleKey),
}

/// Kind of compliance event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditEventType {
    /// A subscription was created.
    #[serde(rename = "SUBSCRIPTION_CREATED")]
    SubscriptionCreated,
    /// The subscription expired.
    #[serde(rename = "LICENSE_EXPIRED")]
    LicenseExpired,
    /// A trial was converted to an active subscription.
    #[serde(rename = "TRIAL_CONVERTED")]
    TrialConverted,
    /// A module was disabled.
    #[serde(rename = "MODULE_DEACTIVATED")]
    ModuleDeactivated,
    /// Usage approached a limit.
    #[serde(rename = "LIMIT_WARNING")]
    LimitWarning,
    /// An attempt would have exceeded a limit and was blocked.
    #[serde(rename = "LIMIT_EXCEEDED")]
    LimitExceeded,
}

/// Severity of an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSeverity {
    /// Routine lifecycle events.
    Low,
    /// Noteworthy but expected events.
    Medium,
    /// Entitlement-reducing events.
    High,
    /// Blocked operations.
    Critical,
}

impl AuditEventType {
    /// Standard severity for this event kind.
    pub fn severity(&self) -> AuditSeverity {
        match self {
            AuditEventType::SubscriptionCreated | AuditEventType::TrialConverted => {
                AuditSeverity::Low
            }
            AuditEventType::LimitWarning => AuditSeverity::Medium,
            AuditEventType::LicenseExpired | AuditEventType::ModuleDeactivated => {
                AuditSeverity::High
            }
            AuditEventType::LimitExceeded => AuditSeverity::Critical,
        }
    }
}

/// One immutable compliance event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    /// Entry identity.
    pub id: Uuid,
    /// Affected tenant.
    pub tenant_id: TenantId,
    /// Subscription- or module-level scope.
    #[serde(flatten)]
    pub scope: AuditScope,
    /// Event kind.
    pub event_type: AuditEventType,
    /// Severity, derived from the event kind.
    pub severity: AuditSeverity,
    /// Structured event payload.
    pub details: serde_json::Value,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Groups entries written by one engine invocation.
    pub correlation_id: Uuid,
}

impl AuditEntry {
    /// Build an entry with severity derived from the event type.
    pub fn new(
        tenant_id: TenantId,
        scope: AuditScope,
        event_type: AuditEventType,
        details: serde_json::Value,
        timestamp: DateTime<Utc>,
        correlation_id: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            scope,
            event_type,
            severity: event_type.severity(),
            details,
            timestamp,
            correlation_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn severity_derived_from_event_type() {
        assert_eq!(
            AuditEventType::LimitExceeded.severity(),
            AuditSeverity::Critical
        );
        assert_eq!(AuditEventType::LimitWarning.severity(), AuditSeverity::Medium);
        assert_eq!(AuditEventType::LicenseExpired.severity(), AuditSeverity::High);
        assert_eq!(
            AuditEventType::SubscriptionCreated.severity(),
            AuditSeverity::Low
        );
    }

    #[test]
    fn entry_serializes_with_wire_names() {
        let now = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap();
        let entry = AuditEntry::new(
            TenantId::new("acme"),
            AuditScope::Module(ModuleKey::Attendance),
            AuditEventType::LimitExceeded,
            json!({"limitType": "employees"}),
            now,
            Uuid::new_v4(),
        );
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["tenantId"], "acme");
        assert_eq!(value["eventType"], "LIMIT_EXCEEDED");
        assert_eq!(value["severity"], "critical");
        assert_eq!(value["module"], "ATTENDANCE");
    }
}
