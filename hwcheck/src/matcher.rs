//! Requirement matching: selects entities per requirement and checks them.
//!
//! Policy violations are data. Nothing here returns an error; every finding
//! becomes an [`Issue`] with a severity, and severities only ever escalate.

use hwcheck_probe::{Category, Detail, Entity, HealthStatus, Subtype};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::aggregate::{aggregate, RunResult};
use crate::policy::{Requirement, Settings};

pub const DEFAULT_RPM_DEVIATION_PERCENT: f64 = 20.0;

/// `ok < warning < error < missing`; a missing element is at least as bad as an error.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Ok,
    Warning,
    Error,
    Missing,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Ok => "ok",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Missing => "missing",
        }
    }

    pub fn escalate(self, other: Severity) -> Severity {
        self.max(other)
    }

    pub fn is_failure(&self) -> bool {
        *self > Severity::Ok
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Count,
    Presence,
    Status,
    Readable,
    Range,
    Tolerance,
    Critical,
    Link,
    Speed,
    Ping,
    Rpm,
    Size,
    MemSpeed,
    Type,
    Ecc,
    Uniform,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    pub severity: Severity,
    pub requirement: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    pub check: CheckKind,
    pub message: String,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.requirement, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityResult {
    pub position: String,
    pub present: bool,
    pub status: Severity,
    pub checks: BTreeMap<CheckKind, bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequirementResult {
    pub name: String,
    pub status: Severity,
    pub issues: Vec<Issue>,
    pub entities: Vec<EntityResult>,
}

fn fmt_value(v: f64, unit: &str) -> String {
    if unit == "RPM" {
        format!("{v:.0}{unit}")
    } else {
        format!("{v:.2}{unit}")
    }
}

struct EntityCheck<'a> {
    req: &'a Requirement,
    e: &'a Entity,
    checks: BTreeMap<CheckKind, bool>,
    issues: Vec<Issue>,
}

impl<'a> EntityCheck<'a> {
    fn new(req: &'a Requirement, e: &'a Entity) -> Self {
        Self {
            req,
            e,
            checks: BTreeMap::new(),
            issues: Vec::new(),
        }
    }

    fn pass(&mut self, kind: CheckKind) {
        self.checks.entry(kind).or_insert(true);
    }

    fn fail(&mut self, kind: CheckKind, severity: Severity, message: String) {
        self.checks.insert(kind, false);
        self.issues.push(Issue {
            severity,
            requirement: self.req.name.clone(),
            position: Some(self.e.position.clone()),
            check: kind,
            message: format!("{}: {message}", self.e.position),
        });
    }

    fn finish(self) -> (EntityResult, Vec<Issue>) {
        let status = self
            .issues
            .iter()
            .fold(Severity::Ok, |s, i| s.escalate(i.severity));
        (
            EntityResult {
                position: self.e.position.clone(),
                present: self.e.present,
                status,
                checks: self.checks,
            },
            self.issues,
        )
    }

    /// Returns false when no further checks apply to this entity.
    fn status(&mut self) -> bool {
        let (req, e) = (self.req, self.e);
        let observed = e.status;
        let active = e.is_active();
        match req.expected_status.get(&e.position) {
            Some(expected) => match (expected.is_active(), active) {
                (false, false) => {
                    self.pass(CheckKind::Status);
                    false
                }
                (false, true) => {
                    self.fail(
                        CheckKind::Status,
                        Severity::Warning,
                        format!("unexpected activation: expected {expected}, observed {observed}"),
                    );
                    true
                }
                (true, false) => {
                    let what = if e.present { "reports" } else { "not found, status" };
                    self.fail(
                        CheckKind::Status,
                        Severity::Error,
                        format!("unexpected absence: expected {expected}, {what} {observed}"),
                    );
                    false
                }
                (true, true) => {
                    if *expected != observed {
                        self.fail(
                            CheckKind::Status,
                            Severity::Error,
                            format!("status {observed}, expected {expected}"),
                        );
                    } else {
                        self.pass(CheckKind::Status);
                    }
                    true
                }
            },
            None if !e.present => {
                self.fail(CheckKind::Presence, Severity::Missing, "not found".into());
                false
            }
            None if !active => {
                self.fail(
                    CheckKind::Presence,
                    Severity::Missing,
                    format!("present but reports {observed}"),
                );
                false
            }
            None => {
                self.pass(CheckKind::Presence);
                true
            }
        }
    }

    fn value(&mut self, check_critical: bool) {
        let Some(v) = self.e.value else {
            if self.req.has_value_bounds() {
                self.fail(
                    CheckKind::Readable,
                    Severity::Error,
                    "no readable value but bounds are configured".into(),
                );
            }
            return;
        };
        let unit = self.e.unit.clone();
        let (min, max) = (self.req.min_value, self.req.max_value);

        match self.req.tolerance_percent {
            Some(tol) => {
                let mid = match (min, max) {
                    (Some(lo), Some(hi)) => Some((lo + hi) / 2.0),
                    (Some(b), None) | (None, Some(b)) => Some(b),
                    (None, None) => None,
                };
                if let Some(mid) = mid {
                    let band = (mid * tol / 100.0).abs();
                    let out_of_range = min.is_some_and(|lo| v < lo) || max.is_some_and(|hi| v > hi);
                    if out_of_range || (v - mid).abs() > band {
                        let range = match (min, max) {
                            (Some(lo), Some(hi)) => {
                                format!(", range {}..{}", fmt_value(lo, &unit), fmt_value(hi, &unit))
                            }
                            _ => String::new(),
                        };
                        self.fail(
                            CheckKind::Tolerance,
                            Severity::Warning,
                            format!(
                                "{} outside tolerance band {}..{} (±{tol}% of {}{range})",
                                fmt_value(v, &unit),
                                fmt_value(mid - band, &unit),
                                fmt_value(mid + band, &unit),
                                fmt_value(mid, &unit),
                            ),
                        );
                    } else {
                        self.pass(CheckKind::Tolerance);
                    }
                }
            }
            None => {
                if let Some(lo) = min.filter(|lo| v < *lo) {
                    self.fail(
                        CheckKind::Range,
                        Severity::Error,
                        format!("{} below minimum {}", fmt_value(v, &unit), fmt_value(lo, &unit)),
                    );
                } else if let Some(hi) = max.filter(|hi| v > *hi) {
                    self.fail(
                        CheckKind::Range,
                        Severity::Error,
                        format!("{} above maximum {}", fmt_value(v, &unit), fmt_value(hi, &unit)),
                    );
                } else if min.is_some() || max.is_some() {
                    self.pass(CheckKind::Range);
                }
            }
        }

        let provider = |x: Option<f64>| x.filter(|_| check_critical);
        let crit_min = self.req.critical_min.or(provider(self.e.thresholds.critical_min()));
        let crit_max = self.req.critical_max.or(provider(self.e.thresholds.critical_max()));
        if let Some(lo) = crit_min.filter(|lo| v < *lo) {
            self.fail(
                CheckKind::Critical,
                Severity::Error,
                format!("{} below critical {}", fmt_value(v, &unit), fmt_value(lo, &unit)),
            );
        } else if let Some(hi) = crit_max.filter(|hi| v > *hi) {
            self.fail(
                CheckKind::Critical,
                Severity::Error,
                format!("{} above critical {}", fmt_value(v, &unit), fmt_value(hi, &unit)),
            );
        } else if crit_min.is_some() || crit_max.is_some() {
            self.pass(CheckKind::Critical);
        }

        if let Some(target) = self.req.target_rpm.filter(|t| *t > 0.0) {
            let allowed = self
                .req
                .rpm_deviation_percent
                .unwrap_or(DEFAULT_RPM_DEVIATION_PERCENT);
            let deviation = (v - target).abs() / target * 100.0;
            if deviation > allowed {
                self.fail(
                    CheckKind::Rpm,
                    Severity::Warning,
                    format!(
                        "{} deviates {deviation:.1}% from target {} (allowed {allowed}%)",
                        fmt_value(v, &unit),
                        fmt_value(target, &unit)
                    ),
                );
            } else {
                self.pass(CheckKind::Rpm);
            }
        }
    }

    /// Provider-reported CRITICAL/WARNING, when the provider's own limits are honored.
    fn provider_status(&mut self, check_critical: bool) {
        if !check_critical || self.req.expected_status.contains_key(&self.e.position) {
            return;
        }
        match self.e.status {
            HealthStatus::Critical => self.fail(
                CheckKind::Critical,
                Severity::Error,
                "provider reports CRITICAL".into(),
            ),
            HealthStatus::Warning => self.fail(
                CheckKind::Critical,
                Severity::Warning,
                "provider reports WARNING".into(),
            ),
            _ => {}
        }
    }

    fn link(&mut self) {
        let Detail::Link {
            speed_mbps, carrier, ..
        } = &self.e.detail
        else {
            return;
        };
        let (speed_mbps, carrier) = (*speed_mbps, *carrier);
        if self.req.check_link {
            let up = carrier.unwrap_or(self.e.status == HealthStatus::Ok);
            if up {
                self.pass(CheckKind::Link);
            } else {
                self.fail(
                    CheckKind::Link,
                    Severity::Error,
                    format!("no carrier (link {})", self.e.status),
                );
            }
        }
        if let Some(min) = self.req.min_speed_mbps {
            match speed_mbps {
                Some(s) if s >= min => self.pass(CheckKind::Speed),
                Some(s) => self.fail(
                    CheckKind::Speed,
                    Severity::Warning,
                    format!("link speed {s}Mb/s below expected {min}Mb/s"),
                ),
                None => self.fail(
                    CheckKind::Speed,
                    Severity::Warning,
                    format!("link speed unknown, expected at least {min}Mb/s"),
                ),
            }
        }
    }

    fn ping(&mut self) {
        if !self.req.check_ping {
            return;
        }
        let Some(p) = self.e.detail.ping().cloned() else {
            self.fail(CheckKind::Ping, Severity::Error, "no ping result".into());
            return;
        };
        let max_loss = self.req.max_ping_loss_percent.unwrap_or(0.0);
        if !p.reachable() {
            self.fail(
                CheckKind::Ping,
                Severity::Error,
                format!(
                    "no reply from {} ({}% loss over {} attempt(s))",
                    p.target, p.loss_percent, p.attempts
                ),
            );
        } else if p.loss_percent > max_loss {
            self.fail(
                CheckKind::Ping,
                Severity::Warning,
                format!(
                    "{}% packet loss to {}, allowed {max_loss}%",
                    p.loss_percent, p.target
                ),
            );
        } else {
            self.pass(CheckKind::Ping);
        }
    }

    fn memory(&mut self) {
        let Detail::Memory {
            size_mb,
            speed_mts,
            mem_type,
            ecc,
            ..
        } = self.e.detail.clone()
        else {
            return;
        };
        if let Some(expected) = self.req.expected_size_mb {
            if size_mb == Some(expected) {
                self.pass(CheckKind::Size);
            } else {
                let observed = size_mb.map_or("unknown".to_string(), |s| format!("{s}MB"));
                self.fail(
                    CheckKind::Size,
                    Severity::Error,
                    format!("size {observed}, expected {expected}MB"),
                );
            }
        }
        if let Some(expected) = self.req.expected_speed_mts {
            if speed_mts == Some(expected) {
                self.pass(CheckKind::MemSpeed);
            } else {
                let observed = speed_mts.map_or("unknown".to_string(), |s| format!("{s}MT/s"));
                self.fail(
                    CheckKind::MemSpeed,
                    Severity::Error,
                    format!("speed {observed}, expected {expected}MT/s"),
                );
            }
        }
        if let Some(expected) = &self.req.expected_type {
            if mem_type
                .as_deref()
                .is_some_and(|t| t.eq_ignore_ascii_case(expected))
            {
                self.pass(CheckKind::Type);
            } else {
                let observed = mem_type.unwrap_or_else(|| "unknown".into());
                self.fail(
                    CheckKind::Type,
                    Severity::Error,
                    format!("type {observed}, expected {expected}"),
                );
            }
        }
        if self.req.require_ecc {
            if ecc == Some(true) {
                self.pass(CheckKind::Ecc);
            } else {
                self.fail(CheckKind::Ecc, Severity::Error, "ECC required but not present".into());
            }
        }
    }
}

/// Entities the requirement selects, with placeholders for listed positions not observed.
pub fn select<'a>(req: &Requirement, entities: &'a [Entity]) -> Vec<Cow<'a, Entity>> {
    let mut selected: Vec<Cow<'a, Entity>> = entities
        .iter()
        .filter(|e| req.selects(e))
        .map(Cow::Borrowed)
        .collect();
    for p in &req.positions {
        if !selected.iter().any(|e| e.position == *p) {
            selected.push(Cow::Owned(Entity::absent(
                p.clone(),
                req.category.unwrap_or(Category::Other),
                req.subtype.unwrap_or(Subtype::Other),
            )));
        }
    }
    selected
}

pub fn evaluate_requirement(
    req: &Requirement,
    entities: &[Entity],
    settings: &Settings,
) -> RequirementResult {
    let selected = select(req, entities);
    let mut issues = Vec::new();
    let mut results = Vec::with_capacity(selected.len());

    if selected.is_empty() {
        let what = match (req.category, req.subtype) {
            (Some(c), Some(s)) => format!("{c} {s}"),
            (Some(c), None) => c.to_string(),
            (None, Some(s)) => s.to_string(),
            (None, None) => "any".into(),
        };
        issues.push(Issue {
            severity: Severity::Error,
            requirement: req.name.clone(),
            position: None,
            check: CheckKind::Count,
            message: format!("no matching sensors ({what})"),
        });
        return RequirementResult {
            name: req.name.clone(),
            status: Severity::Error,
            issues,
            entities: results,
        };
    }

    let count = selected.iter().filter(|e| e.is_active()).count();
    if let Some(min) = req.min_count.filter(|m| count < *m) {
        issues.push(Issue {
            severity: Severity::Error,
            requirement: req.name.clone(),
            position: None,
            check: CheckKind::Count,
            message: format!("{count} active, expected at least {min}"),
        });
    }
    if let Some(max) = req.max_count.filter(|m| count > *m) {
        issues.push(Issue {
            severity: Severity::Error,
            requirement: req.name.clone(),
            position: None,
            check: CheckKind::Count,
            message: format!("{count} active, expected at most {max}"),
        });
    }

    let check_critical = req.check_critical.unwrap_or(settings.check_critical);
    for e in &selected {
        let mut c = EntityCheck::new(req, e);
        if c.status() {
            c.provider_status(check_critical);
            c.value(check_critical);
            c.link();
            c.ping();
            c.memory();
        }
        let (result, mut found) = c.finish();
        results.push(result);
        issues.append(&mut found);
    }

    if req.uniform {
        let sizes: BTreeSet<u64> = selected
            .iter()
            .filter(|e| e.is_active())
            .filter_map(|e| match &e.detail {
                Detail::Memory { size_mb, .. } => *size_mb,
                _ => None,
            })
            .collect();
        if sizes.len() > 1 {
            let listed: Vec<String> = sizes.iter().map(|s| format!("{s}MB")).collect();
            issues.push(Issue {
                severity: Severity::Warning,
                requirement: req.name.clone(),
                position: None,
                check: CheckKind::Uniform,
                message: format!("non-uniform module sizes: {}", listed.join(", ")),
            });
        }
    }

    let status = issues
        .iter()
        .fold(Severity::Ok, |s, i| s.escalate(i.severity));
    RequirementResult {
        name: req.name.clone(),
        status,
        issues,
        entities: results,
    }
}

/// Every requirement applies; there is no short-circuit.
pub fn evaluate(entities: &[Entity], requirements: &[Requirement], settings: &Settings) -> RunResult {
    aggregate(
        requirements
            .iter()
            .map(|r| evaluate_requirement(r, entities, settings))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use hwcheck_probe::{PingStats, Thresholds};

    fn rail(pos: &str, v: Option<f64>, status: HealthStatus) -> Entity {
        Entity {
            raw_name: pos.into(),
            position: pos.into(),
            category: Category::System,
            subtype: Subtype::Voltage,
            value: v,
            unit: "V".into(),
            status,
            thresholds: Thresholds::default(),
            present: true,
            detail: Detail::None,
        }
    }

    fn link(pos: &str, status: HealthStatus, carrier: Option<bool>, speed: Option<u32>) -> Entity {
        Entity {
            raw_name: pos.into(),
            position: pos.into(),
            category: Category::Network,
            subtype: Subtype::Link,
            value: None,
            unit: String::new(),
            status,
            thresholds: Thresholds::default(),
            present: true,
            detail: Detail::Link {
                speed_mbps: speed,
                carrier,
                mac: None,
                ping: None,
            },
        }
    }

    fn dimm(pos: &str, size: Option<u64>) -> Entity {
        Entity {
            raw_name: pos.into(),
            position: pos.into(),
            category: Category::Memory,
            subtype: Subtype::Module,
            value: size.map(|s| s as f64),
            unit: "MB".into(),
            status: if size.is_some() {
                HealthStatus::Ok
            } else {
                HealthStatus::NotAvailable
            },
            thresholds: Thresholds::default(),
            present: true,
            detail: Detail::Memory {
                size_mb: size,
                speed_mts: size.map(|_| 3200),
                mem_type: size.map(|_| "DDR4".to_string()),
                ecc: size.map(|_| true),
                manufacturer: None,
                part_number: None,
            },
        }
    }

    #[test]
    fn tolerance_breach_is_exactly_one_warning() {
        let req = Requirement {
            name: "12V".into(),
            positions: vec!["12V".into()],
            min_value: Some(11.5),
            max_value: Some(12.5),
            tolerance_percent: Some(5.0),
            ..Requirement::default()
        };
        let r = evaluate_requirement(&req, &[rail("12V", Some(12.6), HealthStatus::Ok)], &Settings::default());
        assert_eq!(r.issues.len(), 1, "{:?}", r.issues);
        assert_eq!(r.issues[0].severity, Severity::Warning);
        assert_eq!(r.issues[0].check, CheckKind::Tolerance);
        assert!(r.issues[0].message.contains("tolerance"));
        assert!(r.issues[0].message.contains("12V"));
        assert_eq!(r.status, Severity::Warning);
    }

    #[test]
    fn hard_bounds_without_tolerance_are_errors() {
        let req = Requirement {
            name: "rails".into(),
            subtype: Some(Subtype::Voltage),
            min_value: Some(11.5),
            max_value: Some(12.5),
            critical_max: Some(13.0),
            ..Requirement::default()
        };
        let r = evaluate_requirement(
            &req,
            &[rail("12V", Some(13.2), HealthStatus::Ok)],
            &Settings::default(),
        );
        let kinds: Vec<_> = r.issues.iter().map(|i| (i.check, i.severity)).collect();
        assert_eq!(
            kinds,
            vec![
                (CheckKind::Range, Severity::Error),
                (CheckKind::Critical, Severity::Error)
            ]
        );
    }

    #[test]
    fn provider_critical_thresholds_follow_setting() {
        let mut e = rail("5V", Some(4.2), HealthStatus::Ok);
        e.thresholds.critical_min = Some(4.5);
        let req = Requirement {
            name: "5V".into(),
            positions: vec!["5V".into()],
            ..Requirement::default()
        };
        let on = evaluate_requirement(&req, std::slice::from_ref(&e), &Settings::default());
        assert_eq!(on.status, Severity::Error);
        let off = Settings {
            check_critical: false,
            ..Settings::default()
        };
        assert_eq!(evaluate_requirement(&req, &[e], &off).status, Severity::Ok);
    }

    #[test]
    fn expected_inactive_and_inactive_skips_secondary_checks() {
        let req = Requirement {
            name: "links".into(),
            category: Some(Category::Network),
            check_link: true,
            check_ping: true,
            min_speed_mbps: Some(10_000),
            expected_status: BTreeMap::from([("eno2".to_string(), HealthStatus::NotAvailable)]),
            ..Requirement::default()
        };
        let down = link("eno2", HealthStatus::NotAvailable, Some(false), None);
        let r = evaluate_requirement(&req, &[down], &Settings::default());
        assert!(r.issues.is_empty(), "{:?}", r.issues);
        assert_eq!(r.entities[0].checks.get(&CheckKind::Status), Some(&true));
        assert_eq!(r.entities[0].checks.len(), 1);
    }

    #[test]
    fn status_expectation_mismatches() {
        let req = Requirement {
            name: "psu".into(),
            positions: vec!["PSU1".into(), "PSU2".into(), "PSU3".into()],
            expected_status: BTreeMap::from([
                ("PSU1".to_string(), HealthStatus::NotAvailable),
                ("PSU2".to_string(), HealthStatus::Ok),
                ("PSU3".to_string(), HealthStatus::Ok),
            ]),
            ..Requirement::default()
        };
        let entities = [
            rail("PSU1", Some(12.0), HealthStatus::Ok),
            rail("PSU2", None, HealthStatus::NotAvailable),
            rail("PSU3", Some(12.0), HealthStatus::Critical),
        ];
        let r = evaluate_requirement(&req, &entities, &Settings::default());
        let got: Vec<_> = r.issues.iter().map(|i| i.severity).collect();
        assert_eq!(got, vec![Severity::Warning, Severity::Error, Severity::Error]);
        assert!(r.issues[0].message.contains("unexpected activation"));
        assert!(r.issues[1].message.contains("unexpected absence"));
    }

    #[test]
    fn absent_positions_are_missing_and_zero_matches_error() {
        let req = Requirement {
            name: "fans".into(),
            subtype: Some(Subtype::Fan),
            positions: vec!["FAN1".into(), "FAN2".into()],
            min_count: Some(2),
            ..Requirement::default()
        };
        let mut fan1 = rail("FAN1", Some(5000.0), HealthStatus::Ok);
        fan1.subtype = Subtype::Fan;
        let r = evaluate_requirement(&req, &[fan1], &Settings::default());
        assert_eq!(r.status, Severity::Missing);
        assert_eq!(r.entities.len(), 2);
        assert!(!r.entities[1].present);
        // count issue first, then per-entity issues
        assert_eq!(r.issues[0].check, CheckKind::Count);
        assert_eq!(r.issues[1].severity, Severity::Missing);

        let none = Requirement {
            name: "cpu rails".into(),
            category: Some(Category::Cpu),
            ..Requirement::default()
        };
        let r = evaluate_requirement(&none, &[], &Settings::default());
        assert_eq!(r.status, Severity::Error);
        assert!(r.issues[0].message.contains("no matching sensors"));
    }

    #[test]
    fn unreadable_value_with_bounds_is_an_error() {
        let req = Requirement {
            name: "3.3V".into(),
            positions: vec!["3.3V".into()],
            min_value: Some(3.0),
            ..Requirement::default()
        };
        let r = evaluate_requirement(&req, &[rail("3.3V", None, HealthStatus::Unknown)], &Settings::default());
        assert_eq!(r.issues.len(), 1);
        assert_eq!(r.issues[0].check, CheckKind::Readable);
    }

    #[test]
    fn link_speed_and_ping_checks() {
        let req = Requirement {
            name: "uplinks".into(),
            category: Some(Category::Network),
            check_link: true,
            check_ping: true,
            min_speed_mbps: Some(10_000),
            max_ping_loss_percent: Some(10.0),
            ..Requirement::default()
        };
        let ping = |loss: f64| PingStats {
            target: "10.0.0.1".into(),
            transmitted: 3,
            received: if loss >= 100.0 { 0 } else { 2 },
            loss_percent: loss,
            avg_rtt_ms: None,
            attempts: 3,
        };
        let slow = link("eno1", HealthStatus::Ok, Some(true), Some(1000)).with_ping(ping(0.0));
        let lossy = link("eno2", HealthStatus::Ok, Some(true), Some(10_000)).with_ping(ping(33.3));
        let dead = link("eno3", HealthStatus::Ok, Some(true), Some(10_000)).with_ping(ping(100.0));
        let nocarrier = link("eno4", HealthStatus::Unknown, Some(false), Some(10_000))
            .with_ping(ping(0.0));
        let r = evaluate_requirement(&req, &[slow, lossy, dead, nocarrier], &Settings::default());
        let got: Vec<_> = r
            .issues
            .iter()
            .map(|i| (i.position.clone().unwrap_or_default(), i.check, i.severity))
            .collect();
        assert_eq!(
            got,
            vec![
                ("eno1".to_string(), CheckKind::Speed, Severity::Warning),
                ("eno2".to_string(), CheckKind::Ping, Severity::Warning),
                ("eno3".to_string(), CheckKind::Ping, Severity::Error),
                ("eno4".to_string(), CheckKind::Link, Severity::Error),
            ]
        );
    }

    #[test]
    fn fan_rpm_deviation_warns() {
        let mut fan = rail("FAN1", Some(3000.0), HealthStatus::Ok);
        fan.subtype = Subtype::Fan;
        fan.unit = "RPM".into();
        let req = Requirement {
            name: "fans".into(),
            subtype: Some(Subtype::Fan),
            target_rpm: Some(5000.0),
            rpm_deviation_percent: Some(25.0),
            ..Requirement::default()
        };
        let r = evaluate_requirement(&req, &[fan], &Settings::default());
        assert_eq!(r.issues.len(), 1);
        assert_eq!(r.issues[0].check, CheckKind::Rpm);
        assert!(r.issues[0].message.contains("3000RPM"));
    }

    #[test]
    fn memory_checks_and_uniformity() {
        let req = Requirement {
            name: "dimms".into(),
            category: Some(Category::Memory),
            expected_size_mb: Some(32768),
            expected_type: Some("ddr4".into()),
            require_ecc: true,
            uniform: true,
            expected_status: BTreeMap::from([("DIMMA2".to_string(), HealthStatus::NotAvailable)]),
            ..Requirement::default()
        };
        let entities = [
            dimm("DIMMA1", Some(32768)),
            dimm("DIMMA2", None),
            dimm("DIMMB1", Some(16384)),
        ];
        let r = evaluate_requirement(&req, &entities, &Settings::default());
        let got: Vec<_> = r.issues.iter().map(|i| (i.check, i.severity)).collect();
        assert_eq!(
            got,
            vec![
                (CheckKind::Size, Severity::Error),
                (CheckKind::Uniform, Severity::Warning)
            ]
        );
        assert_eq!(r.entities[0].checks[&CheckKind::Ecc], true);
    }
}
