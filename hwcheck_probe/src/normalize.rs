//! Canonical position naming and coarse classification of raw sensor labels.
//!
//! Vendors label the same rail `PS1 Input Voltage`, `PSU1_VIN` or `PSU1 VIN`;
//! the grid and the policy file want one short, stable key. Each domain owns an
//! ordered rule table; the first matching rule wins, so specific patterns sit
//! above generic ones (`PSU{n}_VIN` before a bare `{n}V`).

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::types::{Category, Domain, Entity, RawReading, Subtype};

/// Grid column width bounds the canonical name length.
pub const POSITION_MAX_LEN: usize = 12;
/// IFNAMSIZ - 1.
const IFNAME_MAX_LEN: usize = 15;

const NOISE: &[&str] = &["VOLT_", "CUR_", "PWR_", "SENSOR_", "READING_"];

struct Rule {
    pattern: Regex,
    template: &'static str,
}

fn rules(table: &[(&str, &'static str)]) -> Vec<Rule> {
    table
        .iter()
        .map(|(p, t)| Rule {
            pattern: Regex::new(p).expect("static position rule"),
            template: t,
        })
        .collect()
}

// Matched against the upper-cased label with spaces, underscores and `+` removed.
static SENSOR_RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    rules(&[
        // PSU rails
        (r"^PSU?(\d+)V?IN(?:PUT)?(?:VOLT(?:AGE)?)?$", "PSU${1}_VIN"),
        (r"^PSU?(\d+)V?OUT(?:PUT)?(?:VOLT(?:AGE)?)?$", "PSU${1}_VOUT"),
        (
            r"^PSU?(\d+)(?:IIN|CURRIN|INCURR(?:ENT)?|INPUTCURR(?:ENT)?)$",
            "PSU${1}_IIN",
        ),
        (
            r"^PSU?(\d+)(?:IOUT|CURROUT|OUTCURR(?:ENT)?|OUTPUTCURR(?:ENT)?)$",
            "PSU${1}_IOUT",
        ),
        (
            r"^PSU?(\d+)(?:PIN|PWRIN|INPOWER|INPUTPOWER|POWERIN)$",
            "PSU${1}_PIN",
        ),
        (
            r"^PSU?(\d+)(?:POUT|PWROUT|OUTPOWER|OUTPUTPOWER|POWEROUT)$",
            "PSU${1}_POUT",
        ),
        (r"^PSU?(\d+)TEMP\d*$", "PSU${1}_TEMP"),
        (r"^PSU?(\d+)FAN(\d*)$", "PSU${1}_FAN${2}"),
        (r"^PSU?(\d+)(?:STATUS|PRESENCE|PRESENT)?$", "PSU${1}"),
        // CPU rails
        (r"^(?:CPU|P)(\d+)(?:VCORE|VCCIN|VCCCORE|VCC)$", "CPU${1}_VCORE"),
        (r"^(?:CPU)?VCORE(\d+)$", "CPU${1}_VCORE"),
        (r"^(?:CPU|P)(\d+)(?:VDDQ[A-Z]{0,4}|DIMM|MEM|VMEM)$", "CPU${1}_VDDQ"),
        (r"^(?:CPU|P)(\d+)(?:VSA|VCCSA)$", "CPU${1}_VSA"),
        (r"^(?:CPU|P)(\d+)(?:VCCIO|VIO)$", "CPU${1}_VIO"),
        (r"^(?:CPU|P)(\d+)(?:PWR|POWER)$", "CPU${1}_PWR"),
        (r"^(?:CPU|P)(\d+)(?:CURR|CURRENT|IOUT)$", "CPU${1}_CURR"),
        (r"^CPU(\d+)TEMP$", "CPU${1}_TEMP"),
        (r"^CPU(\d+)FAN(\d*)$", "CPU${1}_FAN${2}"),
        // System power
        (
            r"^(?:SYS|SYSTEM|TOTAL)?(?:POWER|PWR)(?:CONSUMPTION|CONSUMED|INPUT)?$",
            "SYS_PWR",
        ),
        // Fans: rotor-qualified before plain numbering
        (r"^(?:SYS|SYSTEM|CHASSIS)?FAN(\d+)(?:ROTOR|R)(\d+)$", "FAN${1}_${2}"),
        (r"^(?:SYS|SYSTEM|CHASSIS)?FAN(\d)([12])$", "FAN${1}_${2}"),
        (r"^(?:SYS|SYSTEM|CHASSIS)?FAN(\d+)([AB])$", "FAN${1}${2}"),
        (r"^FRONTFAN(\d+)$", "FRONT_FAN${1}"),
        (r"^REARFAN(\d+)$", "REAR_FAN${1}"),
        (r"^(?:SYS|SYSTEM|CHASSIS)?FAN(\d+)(?:SPEED|TACH|RPM)?$", "FAN${1}"),
        (r"^(?:SYS|SYSTEM|CHASSIS)?FAN([A-Z])$", "FAN${1}"),
        // Board rails, generic last
        (r"^P?(\d+)[.V](\d+)V?(?:SB|STBY|STANDBY|AUX)$", "${1}.${2}VSB"),
        (r"^P?(\d+)V(?:SB|STBY|STANDBY|AUX)$", "${1}VSB"),
        (r"^P?(\d+)[.V](\d+)V?$", "${1}.${2}V"),
        (r"^P?(\d+)V$", "${1}V"),
        (r"^(?:VBAT|BAT|BATTERY|VBATTERY|CMOSBATTERY)$", "VBAT"),
    ])
});

static DIMM_RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    rules(&[
        (r"^(?:CPU|PROC|P)(\d+)-?DIMM-?([A-Z])(\d+)$", "P${1}_DIMM${2}${3}"),
        (
            r"^(?:CPU|PROC|P)(\d+)-?(?:CHANNEL|CH)-?([A-Z])-?DIMM-?(\d+)$",
            "P${1}_DIMM${2}${3}",
        ),
        (r"^(?:CPU|PROC|P)(\d+)-?([A-Z])(\d+)$", "P${1}_DIMM${2}${3}"),
        (r"^(?:CHANNEL|CH)-?([A-Z])-?DIMM-?(\d+)$", "DIMM${1}${2}"),
        (r"^DIMM-?([A-Z])(\d+)$", "DIMM${1}${2}"),
        (r"^DIMM-?(\d+)$", "DIMM${1}"),
        (r"^([A-Z])(\d+)$", "DIMM${1}${2}"),
    ])
});

static BMC_RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    rules(&[(r"^(?:BMC|IPMI|IDRAC|ILO|XCC|IMM)(\d*)$", "BMC${1}")])
});

// First match wins; order matters (PSU before CPU before generic rail words).
const CATEGORY_KEYWORDS: &[(&str, Category)] = &[
    ("PSU", Category::Psu),
    ("POWER SUPPLY", Category::Psu),
    ("PS1", Category::Psu),
    ("PS2", Category::Psu),
    ("PS3", Category::Psu),
    ("PS4", Category::Psu),
    ("CPU", Category::Cpu),
    ("PROC", Category::Cpu),
    ("VCORE", Category::Cpu),
    ("VCCIN", Category::Cpu),
    ("VCCSA", Category::Cpu),
    ("VCCIO", Category::Cpu),
    ("DIMM", Category::Memory),
    ("VDDQ", Category::Memory),
    ("DDR", Category::Memory),
    ("MEM", Category::Memory),
    ("CHASSIS", Category::Chassis),
    ("FRONT", Category::Chassis),
    ("REAR", Category::Chassis),
    ("SYS", Category::System),
    ("BOARD", Category::System),
    ("VBAT", Category::System),
    ("BAT", Category::System),
    ("STBY", Category::System),
    ("VSB", Category::System),
    ("12V", Category::System),
    ("5V", Category::System),
    ("3.3V", Category::System),
    ("3V3", Category::System),
    ("FAN", Category::Chassis),
];

const SUBTYPE_KEYWORDS: &[(&str, Subtype)] = &[
    ("FAN", Subtype::Fan),
    ("RPM", Subtype::Fan),
    ("TEMP", Subtype::Temperature),
    ("VIN", Subtype::Voltage),
    ("VOUT", Subtype::Voltage),
    ("VOLT", Subtype::Voltage),
    ("VCORE", Subtype::Voltage),
    ("VCC", Subtype::Voltage),
    ("VDD", Subtype::Voltage),
    ("VBAT", Subtype::Voltage),
    ("IIN", Subtype::Current),
    ("IOUT", Subtype::Current),
    ("CURR", Subtype::Current),
    ("AMP", Subtype::Current),
    ("PIN", Subtype::Power),
    ("POUT", Subtype::Power),
    ("PWR", Subtype::Power),
    ("POWER", Subtype::Power),
    ("WATT", Subtype::Power),
];

/// Maps a provider's unit spelling to the short form used everywhere else.
pub fn canonical_unit(unit: &str) -> String {
    let u = unit.trim().to_ascii_lowercase();
    match u.as_str() {
        "v" | "volt" | "volts" => "V".into(),
        "a" | "amp" | "amps" | "ampere" | "amperes" => "A".into(),
        "w" | "watt" | "watts" => "W".into(),
        "rpm" => "RPM".into(),
        "c" | "degrees c" | "celsius" | "°c" => "C".into(),
        "%" | "percent" => "%".into(),
        "mb" => "MB".into(),
        "mbps" | "mb/s" => "Mbps".into(),
        _ => unit.trim().to_string(),
    }
}

fn subtype_from_unit(unit: &str) -> Option<Subtype> {
    match unit {
        "V" => Some(Subtype::Voltage),
        "A" => Some(Subtype::Current),
        "W" => Some(Subtype::Power),
        "RPM" => Some(Subtype::Fan),
        "C" => Some(Subtype::Temperature),
        _ => None,
    }
}

/// Per-domain naming and classification rules.
#[derive(Clone, Copy)]
pub struct Normalizer {
    domain: Domain,
    rules: Option<&'static Lazy<Vec<Rule>>>,
    fold_case: bool,
    max_len: usize,
}

impl Normalizer {
    pub fn for_domain(domain: Domain) -> Self {
        match domain {
            Domain::Power | Domain::Fan => Self {
                domain,
                rules: Some(&SENSOR_RULES),
                fold_case: true,
                max_len: POSITION_MAX_LEN,
            },
            Domain::Ram => Self {
                domain,
                rules: Some(&DIMM_RULES),
                fold_case: true,
                max_len: POSITION_MAX_LEN,
            },
            Domain::Bmc => Self {
                domain,
                rules: Some(&BMC_RULES),
                fold_case: true,
                max_len: POSITION_MAX_LEN,
            },
            // Kernel interface names are case-sensitive identifiers; keep them verbatim.
            Domain::Network => Self {
                domain,
                rules: None,
                fold_case: false,
                max_len: IFNAME_MAX_LEN,
            },
        }
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    /// Canonical position for `raw`. Total and idempotent.
    pub fn normalize(&self, raw: &str) -> String {
        let folded = if self.fold_case {
            raw.trim().to_ascii_uppercase()
        } else {
            raw.trim().to_string()
        };
        let cleaned = self.clean(&folded);
        let capped = cap(&cleaned, self.max_len);
        for candidate in [&folded, &cleaned, &capped] {
            if let Some(hit) = self.apply_rules(candidate) {
                return hit;
            }
        }
        if capped.is_empty() {
            return "UNKNOWN".into();
        }
        capped
    }

    fn apply_rules(&self, s: &str) -> Option<String> {
        let rules = self.rules?;
        let key: String = s.chars().filter(|c| !matches!(c, ' ' | '_' | '\t' | '+')).collect();
        for rule in rules.iter() {
            if let Some(caps) = rule.pattern.captures(&key) {
                let mut out = String::new();
                caps.expand(rule.template, &mut out);
                return Some(cap(&out, self.max_len));
            }
        }
        None
    }

    fn clean(&self, s: &str) -> String {
        let mut out = s.split_whitespace().collect::<Vec<_>>().join("_");
        if self.fold_case {
            loop {
                let before = out.len();
                for n in NOISE {
                    out = out.replace(n, "");
                }
                if out.len() == before {
                    break;
                }
            }
        }
        while out.contains("__") {
            out = out.replace("__", "_");
        }
        out.trim_matches('_').to_string()
    }

    /// Category and subtype for a raw label; `unit` wins over keywords for the subtype.
    pub fn classify(&self, raw: &str, unit: &str) -> (Category, Subtype) {
        match self.domain {
            Domain::Network => return (Category::Network, Subtype::Link),
            Domain::Ram => return (Category::Memory, Subtype::Module),
            Domain::Bmc => return (Category::Bmc, Subtype::Controller),
            Domain::Power | Domain::Fan => {}
        }
        let up = raw.to_ascii_uppercase();
        let category = CATEGORY_KEYWORDS
            .iter()
            .find(|(k, _)| up.contains(k))
            .map(|(_, c)| *c)
            .unwrap_or(Category::Other);
        let subtype = subtype_from_unit(&canonical_unit(unit))
            .or_else(|| {
                SUBTYPE_KEYWORDS
                    .iter()
                    .find(|(k, _)| up.contains(k))
                    .map(|(_, s)| *s)
            })
            .unwrap_or(Subtype::Other);
        (category, subtype)
    }

    /// Builds an entity, or `None` when the value is outside the plausible window.
    pub fn entity(&self, reading: RawReading) -> Option<Entity> {
        let unit = canonical_unit(&reading.unit);
        let (category, subtype) = self.classify(&reading.name, &unit);
        if let (Some(v), Some((lo, hi))) = (reading.value, subtype.sanity_window()) {
            if !v.is_finite() || v < lo || v > hi {
                debug!(
                    name = %reading.name,
                    value = v,
                    %subtype,
                    "dropping reading outside sanity window"
                );
                return None;
            }
        }
        let status = reading.status.to_health();
        Some(Entity {
            position: self.normalize(&reading.name),
            raw_name: reading.name,
            category,
            subtype,
            value: reading.value,
            unit,
            status,
            thresholds: reading.thresholds,
            present: true,
            detail: reading.detail,
        })
    }

    pub fn entities(&self, readings: Vec<RawReading>) -> Vec<Entity> {
        readings.into_iter().filter_map(|r| self.entity(r)).collect()
    }
}

fn cap(s: &str, max: usize) -> String {
    let truncated: String = s.chars().take(max).collect();
    truncated.trim_end_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::ProviderStatus;

    fn power() -> Normalizer {
        Normalizer::for_domain(Domain::Power)
    }

    #[test]
    fn psu_vin_is_canonical_and_classified() {
        let n = power();
        assert_eq!(n.normalize("PSU1_VIN"), "PSU1_VIN");
        assert_eq!(n.normalize("PS1 Input Voltage"), "PSU1_VIN");
        assert_eq!(n.normalize("psu1 vin"), "PSU1_VIN");
        let (cat, sub) = n.classify("PSU1_VIN", "Volts");
        assert_eq!(cat, Category::Psu);
        assert_eq!(sub, Subtype::Voltage);
    }

    #[test]
    fn specific_rules_win_over_generic() {
        let n = power();
        assert_eq!(n.normalize("P12V"), "12V");
        assert_eq!(n.normalize("+12V"), "12V");
        assert_eq!(n.normalize("P3V3"), "3.3V");
        assert_eq!(n.normalize("3.3V"), "3.3V");
        assert_eq!(n.normalize("P3V3_AUX"), "3.3VSB");
        assert_eq!(n.normalize("5VSB"), "5VSB");
        assert_eq!(n.normalize("CPU1 VCORE"), "CPU1_VCORE");
        assert_eq!(n.normalize("PSU2 Power Out"), "PSU2_POUT");
        assert_eq!(n.normalize("Pwr Consumption"), "SYS_PWR");
    }

    #[test]
    fn fans_normalize() {
        let n = Normalizer::for_domain(Domain::Fan);
        assert_eq!(n.normalize("FAN2_1"), "FAN2_1");
        assert_eq!(n.normalize("Fan2 Rotor1"), "FAN2_1");
        assert_eq!(n.normalize("SYS_FAN3"), "FAN3");
        assert_eq!(n.normalize("FANA"), "FANA");
        assert_eq!(n.normalize("Fan1A"), "FAN1A");
        assert_eq!(n.normalize("Front Fan 4"), "FRONT_FAN4");
    }

    #[test]
    fn dimm_locators_normalize() {
        let n = Normalizer::for_domain(Domain::Ram);
        assert_eq!(n.normalize("P1-DIMMA1"), "P1_DIMMA1");
        assert_eq!(n.normalize("CPU1_DIMM_B2"), "P1_DIMMB2");
        assert_eq!(n.normalize("ChannelA-DIMM0"), "DIMMA0");
        assert_eq!(n.normalize("DIMM 3"), "DIMM3");
        assert_eq!(n.normalize("A1"), "DIMMA1");
    }

    #[test]
    fn fallback_strips_noise_and_caps() {
        let n = power();
        assert_eq!(n.normalize("VOLT_Mystery Rail"), "MYSTERY_RAIL");
        let long = n.normalize("Some Very Long Vendor Sensor Label");
        assert!(long.len() <= POSITION_MAX_LEN, "{long}");
        assert_eq!(n.normalize(""), "UNKNOWN");
        // Noise removal falls through to the rule table.
        assert_eq!(n.normalize("VOLT_P12V"), "12V");
    }

    #[test]
    fn normalize_is_idempotent_across_domains() {
        let samples = [
            "PSU1_VIN", "PS1 Input Voltage", "PSU2 IOUT", "P12V", "P3V3", "P5V_STBY", "12V",
            "CPU1 VCORE", "CPU2_VDDQ_ABC", "Pwr Consumption", "FAN2_1", "Fan 10", "FAN12",
            "Fan1A", "FANA", "Rear Fan 2", "P1-DIMMA1", "ChannelB-DIMM1", "DIMM_A1", "A1",
            "VOLT_Mystery Rail", "CUR VOLT", "Some Very Long Vendor Sensor Label", "BMC",
            "iDRAC", "eno1", "enp3s0f0", "PWR_CUR_VOLT_X", "  spaced   out  ", "",
            "P1_DIMM_A10", "VBAT", "CMOS Battery",
        ];
        for d in Domain::ALL {
            let n = Normalizer::for_domain(d);
            for s in samples {
                let once = n.normalize(s);
                let twice = n.normalize(&once);
                assert_eq!(once, twice, "domain {d}, input {s:?}");
            }
        }
    }

    #[test]
    fn network_names_keep_case() {
        let n = Normalizer::for_domain(Domain::Network);
        assert_eq!(n.normalize("enp3s0f0"), "enp3s0f0");
        assert_eq!(n.classify("enp3s0f0", ""), (Category::Network, Subtype::Link));
    }

    #[test]
    fn sanity_window_drops_bogus_readings() {
        let n = power();
        let bogus = RawReading::new("12V", Some(655.35), "Volts");
        assert!(n.entity(bogus).is_none());
        let neg = RawReading::new("PSU1 IOUT", Some(-1.0), "Amps");
        assert!(n.entity(neg).is_none());
        let ok = RawReading::new("12V", Some(12.1), "Volts")
            .with_status(ProviderStatus::Ipmi("ok".into()));
        let e = n.entity(ok).expect("valid reading kept");
        assert_eq!(e.position, "12V");
        assert_eq!(e.unit, "V");
        assert_eq!(e.category, Category::System);
        // Unreadable values are kept; only bad numbers are dropped.
        assert!(n.entity(RawReading::new("5V", None, "Volts")).is_some());
    }

    #[test]
    fn classification_defaults_to_other() {
        let n = power();
        assert_eq!(n.classify("Inlet Temp", "C").0, Category::Other);
        assert_eq!(n.classify("FAN1", "RPM"), (Category::Chassis, Subtype::Fan));
        assert_eq!(n.classify("CPU1 FAN", "RPM"), (Category::Cpu, Subtype::Fan));
    }
}
