//! Operator policy per domain: requirements, settings and the grid slot map.
//! Stored under XDG config dir: $XDG_CONFIG_HOME/hwcheck/<domain>.json (fallback ~/.config/hwcheck/<domain>.json)

use hwcheck_probe::{Category, Detail, Domain, Entity, HealthStatus, Subtype};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::layout::Visualization;

pub const POLICY_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no policy at {0} (run with --create-default-config first)")]
    NotFound(PathBuf),
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid policy {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("policy {path} is for {found}, not {expected}")]
    DomainMismatch {
        path: PathBuf,
        expected: Domain,
        found: Domain,
    },
    #[error("{0} already exists (use --force to overwrite)")]
    Exists(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub workers: usize,
    pub probe_timeout_secs: u64,
    pub ping_retries: u32,
    pub ping_count: u32,
    /// Also enforce provider-reported critical thresholds and status.
    pub check_critical: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            workers: 4,
            probe_timeout_secs: 5,
            ping_retries: 2,
            ping_count: 3,
            check_critical: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Requirement {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<Subtype>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub positions: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tolerance_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub critical_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub critical_max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_count: Option<usize>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub expected_status: BTreeMap<String, HealthStatus>,

    /// Overrides `settings.check_critical` for this requirement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_critical: Option<bool>,
    #[serde(skip_serializing_if = "is_false")]
    pub check_link: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub check_ping: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub uniform: bool,

    // network
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_speed_mbps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_ping_loss_percent: Option<f64>,
    // fan
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_rpm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpm_deviation_percent: Option<f64>,
    // ram
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_size_mb: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_speed_mts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_type: Option<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub require_ecc: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl Requirement {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Category/subtype/position selector.
    pub fn selects(&self, e: &Entity) -> bool {
        self.category.map_or(true, |c| c == e.category)
            && self.subtype.map_or(true, |s| s == e.subtype)
            && (self.positions.is_empty() || self.positions.iter().any(|p| *p == e.position))
    }

    pub fn has_value_bounds(&self) -> bool {
        self.min_value.is_some()
            || self.max_value.is_some()
            || self.critical_min.is_some()
            || self.critical_max.is_some()
            || self.target_rpm.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyFile {
    #[serde(default)]
    pub version: u32,
    pub domain: Domain,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub requirements: Vec<Requirement>,
    #[serde(default)]
    pub visualization: Visualization,
    /// interface (or BMC position) -> host to ping
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub ping_targets: BTreeMap<String, String>,
}

impl PolicyFile {
    pub fn empty(domain: Domain) -> Self {
        Self {
            version: POLICY_VERSION,
            domain,
            settings: Settings::default(),
            requirements: Vec::new(),
            visualization: Visualization::default(),
            ping_targets: BTreeMap::new(),
        }
    }

    /// Positions the policy expects to be populated (drives `MISS` cells).
    pub fn required_positions(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for r in &self.requirements {
            for p in &r.positions {
                let expected_inactive = r
                    .expected_status
                    .get(p)
                    .is_some_and(|s| !s.is_active());
                if !expected_inactive && !out.contains(p) {
                    out.push(p.clone());
                }
            }
            for (p, s) in &r.expected_status {
                if s.is_active() && !out.contains(p) {
                    out.push(p.clone());
                }
            }
        }
        out
    }

    pub fn wants_ping(&self) -> bool {
        self.requirements.iter().any(|r| r.check_ping)
    }

    /// Policy derived from what this host reports right now.
    pub fn create_default(domain: Domain, entities: &[Entity]) -> Self {
        let mut policy = Self::empty(domain);
        for (category, subtype, group) in groups(entities) {
            policy
                .requirements
                .extend(default_requirements(domain, category, subtype, &group));
        }
        policy.visualization = Visualization::from_entities(entities);
        policy
    }
}

fn groups(entities: &[Entity]) -> Vec<(Category, Subtype, Vec<&Entity>)> {
    let mut out: Vec<(Category, Subtype, Vec<&Entity>)> = Vec::new();
    for e in entities {
        match out
            .iter_mut()
            .find(|(c, s, _)| *c == e.category && *s == e.subtype)
        {
            Some((_, _, g)) => {
                if !g.iter().any(|x| x.position == e.position) {
                    g.push(e);
                }
            }
            None => out.push((e.category, e.subtype, vec![e])),
        }
    }
    out
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn uniform_value<T: PartialEq + Clone>(values: impl IntoIterator<Item = Option<T>>) -> Option<T> {
    let mut first: Option<T> = None;
    for v in values {
        let v = v?;
        match &first {
            None => first = Some(v),
            Some(f) if *f != v => return None,
            Some(_) => {}
        }
    }
    first
}

fn default_requirements(
    domain: Domain,
    category: Category,
    subtype: Subtype,
    group: &[&Entity],
) -> Vec<Requirement> {
    let active: Vec<&Entity> = group.iter().copied().filter(|e| e.is_active()).collect();
    let mut base = Requirement {
        name: format!("{category} {subtype}"),
        category: Some(category),
        subtype: Some(subtype),
        positions: group.iter().map(|e| e.position.clone()).collect(),
        min_count: Some(active.len()),
        // degraded or unknown elements get no expectation; presence and provider status still apply
        expected_status: group
            .iter()
            .filter_map(|e| match (e.is_active(), e.status) {
                (false, _) => Some((e.position.clone(), HealthStatus::NotAvailable)),
                (true, HealthStatus::Ok) => Some((e.position.clone(), HealthStatus::Ok)),
                _ => None,
            })
            .collect(),
        ..Requirement::default()
    };
    let mut extra = Vec::new();

    match domain {
        Domain::Power => {
            for e in &active {
                let Some(v) = e.value.filter(|v| *v > 0.0) else {
                    continue;
                };
                extra.push(Requirement {
                    name: format!("{} range", e.position),
                    category: Some(category),
                    subtype: Some(subtype),
                    positions: vec![e.position.clone()],
                    min_value: Some(round2(v * 0.9)),
                    max_value: Some(round2(v * 1.1)),
                    tolerance_percent: Some(10.0),
                    ..Requirement::default()
                });
            }
        }
        Domain::Fan => {
            let slowest = active
                .iter()
                .filter_map(|e| e.value)
                .filter(|v| *v > 0.0)
                .fold(f64::INFINITY, f64::min);
            if slowest.is_finite() {
                base.min_value = Some((slowest / 2.0).round());
            }
        }
        Domain::Ram => {
            let installed = active.iter().map(|e| match &e.detail {
                Detail::Memory {
                    size_mb,
                    speed_mts,
                    mem_type,
                    ecc,
                    ..
                } => (*size_mb, *speed_mts, mem_type.clone(), *ecc),
                _ => (None, None, None, None),
            });
            let details: Vec<_> = installed.collect();
            base.expected_size_mb = uniform_value(details.iter().map(|d| d.0));
            base.expected_speed_mts = uniform_value(details.iter().map(|d| d.1));
            base.expected_type = uniform_value(details.iter().map(|d| d.2.clone()));
            base.require_ecc = !details.is_empty() && details.iter().all(|d| d.3 == Some(true));
            base.uniform = true;
        }
        Domain::Network => {
            base.check_link = true;
            base.min_speed_mbps = active
                .iter()
                .filter_map(|e| match &e.detail {
                    Detail::Link { speed_mbps, .. } => *speed_mbps,
                    _ => None,
                })
                .min();
        }
        Domain::Bmc => {
            let has_address = active
                .iter()
                .any(|e| matches!(&e.detail, Detail::Bmc { ip: Some(_), .. }));
            if has_address {
                base.check_ping = true;
                base.max_ping_loss_percent = Some(0.0);
            }
        }
    }

    let mut out = vec![base];
    out.extend(extra);
    out
}

pub fn config_dir() -> PathBuf {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(xdg).join("hwcheck")
    } else {
        dirs_next::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hwcheck")
    }
}

pub fn policy_path(domain: Domain) -> PathBuf {
    config_dir().join(format!("{domain}.json"))
}

pub fn load(path: &Path, domain: Domain) -> Result<PolicyFile, ConfigError> {
    let text = fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ConfigError::NotFound(path.to_path_buf()),
        _ => ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        },
    })?;
    let mut policy: PolicyFile = serde_json::from_str(&text).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    if policy.domain != domain {
        return Err(ConfigError::DomainMismatch {
            path: path.to_path_buf(),
            expected: domain,
            found: policy.domain,
        });
    }
    policy.visualization.drop_invalid_slots();
    Ok(policy)
}

/// `Ok(None)` when the file does not exist.
pub fn load_optional(path: &Path, domain: Domain) -> Result<Option<PolicyFile>, ConfigError> {
    match load(path, domain) {
        Ok(p) => Ok(Some(p)),
        Err(ConfigError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

pub fn save(path: &Path, policy: &PolicyFile, force: bool) -> Result<(), ConfigError> {
    if path.exists() && !force {
        return Err(ConfigError::Exists(path.to_path_buf()));
    }
    let write_err = |e| ConfigError::Write {
        path: path.to_path_buf(),
        source: e,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    let data = serde_json::to_vec_pretty(policy).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    fs::write(path, data).map_err(write_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hwcheck_probe::{Normalizer, ProviderStatus, RawReading};

    fn power_entities() -> Vec<Entity> {
        let n = Normalizer::for_domain(Domain::Power);
        n.entities(vec![
            RawReading::new("PSU1 VIN", Some(230.0), "Volts")
                .with_status(ProviderStatus::Ipmi("ok".into())),
            RawReading::new("PSU2 VIN", None, "Volts")
                .with_status(ProviderStatus::Ipmi("ns".into())),
            RawReading::new("12V", Some(12.0), "Volts")
                .with_status(ProviderStatus::Ipmi("ok".into())),
        ])
    }

    #[test]
    fn missing_optional_fields_get_defaults() {
        let p: PolicyFile = serde_json::from_str(
            r#"{"domain":"fan","requirements":[{"name":"fans","subtype":"Fan","min_value":1000}]}"#,
        )
        .unwrap();
        assert_eq!(p.settings, Settings::default());
        assert_eq!(p.requirements[0].min_value, Some(1000.0));
        assert!(!p.requirements[0].check_ping);
        assert_eq!(p.visualization.row_width, 8);
    }

    #[test]
    fn default_power_policy_groups_and_brackets_values() {
        let p = PolicyFile::create_default(Domain::Power, &power_entities());
        let names: Vec<_> = p.requirements.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["PSU Voltage", "PSU1_VIN range", "System Voltage", "12V range"]
        );
        let psu = &p.requirements[0];
        assert_eq!(psu.positions, vec!["PSU1_VIN", "PSU2_VIN"]);
        assert_eq!(psu.min_count, Some(1));
        assert_eq!(psu.expected_status["PSU2_VIN"], HealthStatus::NotAvailable);
        let rail = &p.requirements[3];
        assert_eq!(rail.min_value, Some(10.8));
        assert_eq!(rail.max_value, Some(13.2));
        assert_eq!(rail.tolerance_percent, Some(10.0));
        assert_eq!(p.visualization.slots["PSU1_VIN"], 1);
        assert_eq!(p.visualization.slots["12V"], 3);
        assert_eq!(p.required_positions(), vec!["PSU1_VIN", "12V"]);
    }

    #[test]
    fn save_refuses_to_overwrite_without_force() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("nested/power.json");
        let p = PolicyFile::create_default(Domain::Power, &power_entities());
        save(&path, &p, false).unwrap();
        assert!(matches!(save(&path, &p, false), Err(ConfigError::Exists(_))));
        save(&path, &p, true).unwrap();
        let back = load(&path, Domain::Power).unwrap();
        assert_eq!(back, p);
        assert!(matches!(
            load(&path, Domain::Fan),
            Err(ConfigError::DomainMismatch { .. })
        ));
    }

    #[test]
    fn unreadable_and_missing_files() {
        let td = tempfile::tempdir().unwrap();
        let missing = td.path().join("ram.json");
        assert!(load_optional(&missing, Domain::Ram).unwrap().is_none());
        fs::write(&missing, "{ not json").unwrap();
        assert!(matches!(
            load(&missing, Domain::Ram),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn hand_edited_slot_zero_loads_as_unmapped() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("fan.json");
        fs::write(
            &path,
            r#"{"domain":"fan","visualization":{"slots":{"FAN1":1,"FAN2":0}}}"#,
        )
        .unwrap();
        let p = load(&path, Domain::Fan).unwrap();
        assert_eq!(p.visualization.slot_of("FAN1"), Some(1));
        assert_eq!(p.visualization.slot_of("FAN2"), None);
    }
}
