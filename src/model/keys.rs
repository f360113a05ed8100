//! Identifier types: tenants, module keys, usage types, periods.
//!
//! Module keys and usage types are closed enums validated at the
//! string boundary, so the rest of the engine never compares raw
//! strings.

use crate::EngineError;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An isolated customer organization. All entitlement and usage state
/// is partitioned by tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Create a tenant id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A product feature area that can be independently enabled and
/// metered. Closed set; `CoreHr` is the always-on, never-metered
/// variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleKey {
    /// Core HR. Always enabled, never metered.
    #[serde(rename = "CORE_HR")]
    CoreHr,
    /// Attendance tracking.
    #[serde(rename = "ATTENDANCE")]
    Attendance,
    /// Leave and vacation management.
    #[serde(rename = "LEAVE")]
    Leave,
    /// Payroll processing.
    #[serde(rename = "PAYROLL")]
    Payroll,
    /// Document storage.
    #[serde(rename = "DOCUMENTS")]
    Documents,
    /// Internal communication.
    #[serde(rename = "COMMUNICATION")]
    Communication,
    /// Reporting and analytics.
    #[serde(rename = "REPORTING")]
    Reporting,
    /// Task management.
    #[serde(rename = "TASKS")]
    Tasks,
}

impl ModuleKey {
    /// All module keys, in their canonical order.
    pub const ALL: [ModuleKey; 8] = [
        ModuleKey::CoreHr,
        ModuleKey::Attendance,
        ModuleKey::Leave,
        ModuleKey::Payroll,
        ModuleKey::Documents,
        ModuleKey::Communication,
        ModuleKey::Reporting,
        ModuleKey::Tasks,
    ];

    /// Whether usage of this module is metered. False only for Core HR.
    pub fn is_metered(&self) -> bool {
        !matches!(self, ModuleKey::CoreHr)
    }

    /// Canonical wire name (`CORE_HR`, `ATTENDANCE`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleKey::CoreHr => "CORE_HR",
            ModuleKey::Attendance => "ATTENDANCE",
            ModuleKey::Leave => "LEAVE",
            ModuleKey::Payroll => "PAYROLL",
            ModuleKey::Documents => "DOCUMENTS",
            ModuleKey::Communication => "COMMUNICATION",
            ModuleKey::Reporting => "REPORTING",
            ModuleKey::Tasks => "TASKS",
        }
    }
}

impl fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleKey {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|key| key.as_str() == s)
            .copied()
            .ok_or_else(|| EngineError::InvalidModuleKey(s.to_string()))
    }
}

/// A billable resource dimension metered per module and period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UsageType {
    /// Number of employee records.
    #[serde(rename = "employees")]
    Employees,
    /// Storage consumption.
    #[serde(rename = "storage")]
    Storage,
    /// API call volume.
    #[serde(rename = "apiCalls")]
    ApiCalls,
}

impl UsageType {
    /// All usage types, in their canonical order.
    pub const ALL: [UsageType; 3] = [UsageType::Employees, UsageType::Storage, UsageType::ApiCalls];

    /// Canonical wire name (`employees`, `storage`, `apiCalls`).
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageType::Employees => "employees",
            UsageType::Storage => "storage",
            UsageType::ApiCalls => "apiCalls",
        }
    }
}

impl fmt::Display for UsageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UsageType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|usage_type| usage_type.as_str() == s)
            .copied()
            .ok_or_else(|| EngineError::InvalidUsageType(s.to_string()))
    }
}

/// A calendar-month metering period, keyed `YYYY-MM` in UTC.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Period(String);

impl Period {
    /// The period containing the given instant.
    pub fn containing(at: DateTime<Utc>) -> Self {
        Self(format!("{:04}-{:02}", at.year(), at.month()))
    }

    /// Parse a `YYYY-MM` period key.
    pub fn parse(s: &str) -> Result<Self, EngineError> {
        let invalid = || EngineError::InvalidPeriod(s.to_string());
        let (year, month) = s.split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        year.parse::<u16>().map_err(|_| invalid())?;
        let month: u8 = month.parse().map_err(|_| invalid())?;
        if !(1..=12).contains(&month) {
            return Err(invalid());
        }
        Ok(Self(s.to_string()))
    }

    /// The raw `YYYY-MM` key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
