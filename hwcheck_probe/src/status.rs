//! Health status vocabulary.
//!
//! Providers speak their own dialects (IPMI's `ok`/`lnc`/`ucr`, Redfish
//! `Health`/`State`, kernel `operstate`, plain presence). [`ProviderStatus`]
//! keeps the dialect tagged until [`ProviderStatus::to_health`] maps it onto the
//! fixed [`HealthStatus`] set; nothing past that boundary sees a raw string.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HealthStatus {
    Ok,
    Warning,
    Critical,
    NotAvailable,
    #[default]
    Unknown,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Ok => "OK",
            HealthStatus::Warning => "WARNING",
            HealthStatus::Critical => "CRITICAL",
            HealthStatus::NotAvailable => "N/A",
            HealthStatus::Unknown => "UNKNOWN",
        }
    }

    /// Lossy, total and idempotent: `normalize(normalize(s).as_str()) == normalize(s)`.
    pub fn normalize(s: &str) -> HealthStatus {
        let up = s.trim().to_ascii_uppercase();
        match up.as_str() {
            "OK" | "NORMAL" | "GOOD" | "UP" | "PRESENT" | "ENABLED" | "NOMINAL" | "HEALTHY"
            | "PASS" | "ACTIVE" | "ON" => HealthStatus::Ok,
            "WARNING" | "WARN" | "NC" | "LNC" | "UNC" | "DEGRADED" | "NON-CRITICAL"
            | "NONCRITICAL" => HealthStatus::Warning,
            "CRITICAL" | "CR" | "LCR" | "UCR" | "NR" | "LNR" | "UNR" | "FAIL" | "FAILED"
            | "FAULT" | "ERROR" | "NON-RECOVERABLE" => HealthStatus::Critical,
            "N/A" | "NA" | "NS" | "DOWN" | "ABSENT" | "DISABLED" | "NOT PRESENT"
            | "NOTPRESENT" | "OFF" | "INACTIVE" | "MISSING" => HealthStatus::NotAvailable,
            _ => HealthStatus::Unknown,
        }
    }

    /// Anything except `N/A` counts as activated/present.
    pub fn is_active(&self) -> bool {
        !matches!(self, HealthStatus::NotAvailable)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for HealthStatus {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for HealthStatus {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        Ok(HealthStatus::normalize(&s))
    }
}

/// Status exactly as a provider reported it, tagged by dialect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", content = "value", rename_all = "snake_case")]
pub enum ProviderStatus {
    /// `ipmitool` sensor status column.
    Ipmi(String),
    /// Redfish `Status.Health` / `Status.State`.
    Redfish {
        #[serde(default)]
        health: Option<String>,
        #[serde(default)]
        state: Option<String>,
    },
    /// Kernel `operstate`.
    LinkState(String),
    Presence(bool),
    /// Already in (or close to) the internal vocabulary.
    Plain(String),
}

impl Default for ProviderStatus {
    fn default() -> Self {
        ProviderStatus::Plain(String::new())
    }
}

impl ProviderStatus {
    pub fn to_health(&self) -> HealthStatus {
        match self {
            ProviderStatus::Ipmi(s) => match s.trim().to_ascii_lowercase().as_str() {
                "ok" => HealthStatus::Ok,
                "ns" | "na" | "n/a" => HealthStatus::NotAvailable,
                "nc" | "lnc" | "unc" => HealthStatus::Warning,
                "cr" | "lcr" | "ucr" | "nr" | "lnr" | "unr" => HealthStatus::Critical,
                _ => HealthStatus::Unknown,
            },
            ProviderStatus::Redfish { health, state } => {
                let state = state.as_deref().map(str::to_ascii_lowercase);
                if matches!(
                    state.as_deref(),
                    Some("absent" | "disabled" | "standbyoffline" | "unavailableoffline")
                ) {
                    return HealthStatus::NotAvailable;
                }
                match health.as_deref().map(str::to_ascii_lowercase).as_deref() {
                    Some("ok") => HealthStatus::Ok,
                    Some("warning") => HealthStatus::Warning,
                    Some("critical") => HealthStatus::Critical,
                    _ => HealthStatus::Unknown,
                }
            }
            ProviderStatus::LinkState(s) => match s.trim().to_ascii_lowercase().as_str() {
                "up" => HealthStatus::Ok,
                "down" | "lowerlayerdown" | "notpresent" | "dormant" => {
                    HealthStatus::NotAvailable
                }
                _ => HealthStatus::Unknown,
            },
            ProviderStatus::Presence(true) => HealthStatus::Ok,
            ProviderStatus::Presence(false) => HealthStatus::NotAvailable,
            ProviderStatus::Plain(s) => HealthStatus::normalize(s),
        }
    }
}
