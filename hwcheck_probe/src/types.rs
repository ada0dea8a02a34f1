//! Raw readings handed over by providers and the normalized entities built from them.
//! Replay files and `--json` output use these shapes too.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::status::{HealthStatus, ProviderStatus};

/// Hardware family a tool run is about. Each has its own providers, rules and checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Network,
    Power,
    Ram,
    Fan,
    Bmc,
}

impl Domain {
    pub const ALL: [Domain; 5] = [
        Domain::Network,
        Domain::Power,
        Domain::Ram,
        Domain::Fan,
        Domain::Bmc,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Network => "network",
            Domain::Power => "power",
            Domain::Ram => "ram",
            Domain::Fan => "fan",
            Domain::Bmc => "bmc",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "network" | "net" => Ok(Domain::Network),
            "power" | "psu" => Ok(Domain::Power),
            "ram" | "memory" | "mem" => Ok(Domain::Ram),
            "fan" | "fans" => Ok(Domain::Fan),
            "bmc" | "ipmi" => Ok(Domain::Bmc),
            other => Err(format!("unknown domain '{other}'")),
        }
    }
}

/// Coarse location class used by requirement selectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "CPU")]
    Cpu,
    #[serde(rename = "PSU")]
    Psu,
    Memory,
    System,
    Chassis,
    Network,
    #[serde(rename = "BMC")]
    Bmc,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Cpu => "CPU",
            Category::Psu => "PSU",
            Category::Memory => "Memory",
            Category::System => "System",
            Category::Chassis => "Chassis",
            Category::Network => "Network",
            Category::Bmc => "BMC",
            Category::Other => "Other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of quantity (or element) an entity is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Subtype {
    Voltage,
    Current,
    Power,
    Fan,
    Temperature,
    Module,
    Link,
    Controller,
    Other,
}

impl Subtype {
    pub fn as_str(&self) -> &'static str {
        match self {
            Subtype::Voltage => "Voltage",
            Subtype::Current => "Current",
            Subtype::Power => "Power",
            Subtype::Fan => "Fan",
            Subtype::Temperature => "Temperature",
            Subtype::Module => "Module",
            Subtype::Link => "Link",
            Subtype::Controller => "Controller",
            Subtype::Other => "Other",
        }
    }

    /// Plausible range for a reading of this kind; anything outside is a bogus read.
    pub fn sanity_window(&self) -> Option<(f64, f64)> {
        match self {
            Subtype::Voltage => Some((0.0, 400.0)),
            Subtype::Current => Some((0.0, 1000.0)),
            Subtype::Power => Some((0.0, 10_000.0)),
            Subtype::Fan => Some((0.0, 50_000.0)),
            _ => None,
        }
    }
}

impl fmt::Display for Subtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider-supplied limits. Zero or absent means "no threshold".
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical_max: Option<f64>,
}

fn effective(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite() && *x != 0.0)
}

impl Thresholds {
    pub fn min(&self) -> Option<f64> {
        effective(self.min)
    }
    pub fn max(&self) -> Option<f64> {
        effective(self.max)
    }
    pub fn critical_min(&self) -> Option<f64> {
        effective(self.critical_min)
    }
    pub fn critical_max(&self) -> Option<f64> {
        effective(self.critical_max)
    }
    pub fn is_empty(&self) -> bool {
        self.min().is_none()
            && self.max().is_none()
            && self.critical_min().is_none()
            && self.critical_max().is_none()
    }
}

/// Outcome of a ping probe (possibly the best of several attempts).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingStats {
    pub target: String,
    pub transmitted: u32,
    pub received: u32,
    pub loss_percent: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_rtt_ms: Option<f64>,
    pub attempts: u32,
}

impl PingStats {
    pub fn reachable(&self) -> bool {
        self.received > 0 && self.loss_percent < 100.0
    }
}

/// Domain-specific secondary data carried next to the main value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Detail {
    #[default]
    None,
    Memory {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        size_mb: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        speed_mts: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mem_type: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ecc: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        manufacturer: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        part_number: Option<String>,
    },
    Link {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        speed_mbps: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        carrier: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mac: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ping: Option<PingStats>,
    },
    Bmc {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ip: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mac: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ping: Option<PingStats>,
    },
}

impl Detail {
    pub fn ping(&self) -> Option<&PingStats> {
        match self {
            Detail::Link { ping, .. } | Detail::Bmc { ping, .. } => ping.as_ref(),
            _ => None,
        }
    }
}

/// One reading exactly as a provider reported it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub status: ProviderStatus,
    #[serde(default, skip_serializing_if = "Thresholds::is_empty")]
    pub thresholds: Thresholds,
    #[serde(default, skip_serializing_if = "is_no_detail")]
    pub detail: Detail,
}

fn is_no_detail(d: &Detail) -> bool {
    matches!(d, Detail::None)
}

impl RawReading {
    pub fn new(name: impl Into<String>, value: Option<f64>, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value,
            unit: unit.into(),
            status: ProviderStatus::default(),
            thresholds: Thresholds::default(),
            detail: Detail::None,
        }
    }

    pub fn with_status(mut self, status: ProviderStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_detail(mut self, detail: Detail) -> Self {
        self.detail = detail;
        self
    }
}

/// A single observed hardware element from one collection pass.
///
/// Entities are built once and never edited; an element that is expected but
/// not observed gets a fresh placeholder from [`Entity::absent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub raw_name: String,
    pub position: String,
    pub category: Category,
    pub subtype: Subtype,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default)]
    pub unit: String,
    pub status: HealthStatus,
    #[serde(default, skip_serializing_if = "Thresholds::is_empty")]
    pub thresholds: Thresholds,
    pub present: bool,
    #[serde(default, skip_serializing_if = "is_no_detail")]
    pub detail: Detail,
}

impl Entity {
    pub fn absent(position: impl Into<String>, category: Category, subtype: Subtype) -> Self {
        let position = position.into();
        Self {
            raw_name: position.clone(),
            position,
            category,
            subtype,
            value: None,
            unit: String::new(),
            status: HealthStatus::NotAvailable,
            thresholds: Thresholds::default(),
            present: false,
            detail: Detail::None,
        }
    }

    /// Present and not reporting itself as unavailable.
    pub fn is_active(&self) -> bool {
        self.present && self.status.is_active()
    }

    /// Builds a new entity carrying `ping` in its detail; `self` is consumed, never edited in place.
    pub fn with_ping(self, ping: PingStats) -> Self {
        let detail = match self.detail {
            Detail::Link {
                speed_mbps,
                carrier,
                mac,
                ..
            } => Detail::Link {
                speed_mbps,
                carrier,
                mac,
                ping: Some(ping),
            },
            Detail::Bmc { ip, mac, .. } => Detail::Bmc {
                ip,
                mac,
                ping: Some(ping),
            },
            Detail::None => Detail::Link {
                speed_mbps: None,
                carrier: None,
                mac: None,
                ping: Some(ping),
            },
            other => other,
        };
        Entity { detail, ..self }
    }

    /// Short value text for listings and grid cells.
    pub fn display_value(&self) -> String {
        match (&self.detail, self.value) {
            (Detail::Memory { size_mb: Some(mb), .. }, _) => {
                if mb % 1024 == 0 {
                    format!("{}GB", mb / 1024)
                } else {
                    format!("{mb}MB")
                }
            }
            (Detail::Link { speed_mbps: Some(s), .. }, _) => {
                if *s >= 1000 && s % 1000 == 0 {
                    format!("{}G", s / 1000)
                } else {
                    format!("{s}M")
                }
            }
            (Detail::Bmc { ip: Some(ip), .. }, _) => ip.clone(),
            (_, Some(v)) => {
                if self.unit == "RPM" {
                    format!("{v:.0}{}", self.unit)
                } else {
                    format!("{v:.2}{}", self.unit)
                }
            }
            _ => "-".into(),
        }
    }
}
