//! Memory modules from SMBIOS: `dmidecode -t 17`, with `lshw -json` as fallback.

use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;

use super::{Provider, ProviderContext};
use crate::error::{ProbeError, ProviderError};
use crate::exec::args;
use crate::status::ProviderStatus;
use crate::types::{Detail, RawReading};

/// `32 GB` / `16384 MB` / `1 TB` in MB; `None` for empty slots.
pub fn parse_size_mb(s: &str) -> Option<u64> {
    let mut it = s.split_whitespace();
    let n: u64 = it.next()?.parse().ok()?;
    match it.next()?.to_ascii_uppercase().as_str() {
        "KB" => Some(n / 1024),
        "MB" => Some(n),
        "GB" => Some(n * 1024),
        "TB" => Some(n * 1024 * 1024),
        _ => None,
    }
}

fn parse_speed(s: &str) -> Option<u32> {
    s.split_whitespace().next()?.parse().ok()
}

fn parse_width(s: &str) -> Option<u32> {
    s.split_whitespace().next()?.parse().ok()
}

fn meaningful(s: Option<&String>) -> Option<String> {
    let s = s?.trim();
    let junk = [
        "", "unknown", "not specified", "not provided", "no dimm", "none", "undefined",
    ];
    if junk.contains(&s.to_ascii_lowercase().as_str()) {
        None
    } else {
        Some(s.to_string())
    }
}

/// Locators like `DIMM 0` repeat per channel; prefix the bank locator when it names one.
fn module_name(fields: &HashMap<String, String>) -> Option<String> {
    let locator = meaningful(fields.get("Locator"))?;
    let bank = meaningful(fields.get("Bank Locator"));
    let bare = locator
        .to_ascii_uppercase()
        .trim_start_matches("DIMM")
        .trim()
        .chars()
        .all(|c| c.is_ascii_digit());
    match bank {
        Some(b) if bare && b.to_ascii_uppercase().contains("CHANNEL") => Some(format!("{b} {locator}")),
        _ => Some(locator),
    }
}

fn module_reading(fields: &HashMap<String, String>) -> Option<RawReading> {
    let name = module_name(fields)?;
    let size_mb = fields.get("Size").and_then(|s| parse_size_mb(s));
    let speed_mts = fields
        .get("Configured Memory Speed")
        .or_else(|| fields.get("Configured Clock Speed"))
        .and_then(|s| parse_speed(s))
        .or_else(|| fields.get("Speed").and_then(|s| parse_speed(s)));
    let ecc = match (
        fields.get("Total Width").and_then(|s| parse_width(s)),
        fields.get("Data Width").and_then(|s| parse_width(s)),
    ) {
        (Some(total), Some(data)) => Some(total > data),
        _ => None,
    };
    let installed = size_mb.is_some();
    let detail = Detail::Memory {
        size_mb,
        speed_mts: speed_mts.filter(|_| installed),
        mem_type: meaningful(fields.get("Type")).filter(|_| installed),
        ecc: ecc.filter(|_| installed),
        manufacturer: meaningful(fields.get("Manufacturer")).filter(|_| installed),
        part_number: meaningful(fields.get("Part Number")).filter(|_| installed),
    };
    Some(
        RawReading::new(name, size_mb.map(|mb| mb as f64), "MB")
            .with_status(ProviderStatus::Presence(installed))
            .with_detail(detail),
    )
}

pub fn parse_dmidecode(out: &str) -> Vec<RawReading> {
    let mut readings = Vec::new();
    let mut current: Option<HashMap<String, String>> = None;
    for line in out.lines() {
        if line.trim() == "Memory Device" {
            if let Some(fields) = current.take() {
                readings.extend(module_reading(&fields));
            }
            current = Some(HashMap::new());
            continue;
        }
        if line.starts_with("Handle ") {
            if let Some(fields) = current.take() {
                readings.extend(module_reading(&fields));
            }
            continue;
        }
        if let (Some(fields), Some((k, v))) = (current.as_mut(), line.split_once(':')) {
            // Only top-level keys are one tab deep.
            if line.starts_with('\t') && !line.starts_with("\t\t") {
                fields.insert(k.trim().to_string(), v.trim().to_string());
            }
        }
    }
    if let Some(fields) = current {
        readings.extend(module_reading(&fields));
    }
    readings
}

pub struct DmidecodeProvider;

impl Provider for DmidecodeProvider {
    fn name(&self) -> &str {
        "dmidecode"
    }

    fn collect<'a>(
        &'a self,
        ctx: &'a ProviderContext,
    ) -> BoxFuture<'a, Result<Vec<RawReading>, ProviderError>> {
        Box::pin(async move {
            let out = ctx
                .exec
                .run("dmidecode", &args(&["-t", "17"]), ctx.timeout)
                .await?
                .into_stdout("dmidecode")?;
            Ok(parse_dmidecode(&out))
        })
    }
}

fn mem_type_from(description: &str) -> Option<String> {
    description
        .split_whitespace()
        .find(|w| w.starts_with("DDR") || w.starts_with("LPDDR"))
        .map(str::to_string)
}

fn lshw_banks(v: &Value, out: &mut Vec<RawReading>) {
    match v {
        Value::Array(items) => items.iter().for_each(|i| lshw_banks(i, out)),
        Value::Object(map) => {
            let id = map.get("id").and_then(Value::as_str).unwrap_or("");
            if id.starts_with("bank") {
                let description = map.get("description").and_then(Value::as_str).unwrap_or("");
                let name = map
                    .get("slot")
                    .and_then(Value::as_str)
                    .unwrap_or(id)
                    .to_string();
                let size_mb = map
                    .get("size")
                    .and_then(Value::as_u64)
                    .map(|b| b / (1024 * 1024))
                    .filter(|_| !description.contains("[empty]"));
                let installed = size_mb.is_some();
                let text = |k: &str| {
                    map.get(k)
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .filter(|_| installed)
                };
                let detail = Detail::Memory {
                    size_mb,
                    speed_mts: map
                        .get("clock")
                        .and_then(Value::as_u64)
                        .map(|hz| (hz / 1_000_000) as u32)
                        .filter(|_| installed),
                    mem_type: mem_type_from(description).filter(|_| installed),
                    ecc: None,
                    manufacturer: text("vendor"),
                    part_number: text("product"),
                };
                out.push(
                    RawReading::new(name, size_mb.map(|mb| mb as f64), "MB")
                        .with_status(ProviderStatus::Presence(installed))
                        .with_detail(detail),
                );
            }
            if let Some(children) = map.get("children") {
                lshw_banks(children, out);
            }
        }
        _ => {}
    }
}

pub fn parse_lshw(out: &str) -> Result<Vec<RawReading>, ProbeError> {
    let v: Value = serde_json::from_str(out).map_err(|e| ProbeError::Parse(e.to_string()))?;
    let mut readings = Vec::new();
    lshw_banks(&v, &mut readings);
    Ok(readings)
}

pub struct LshwProvider;

impl Provider for LshwProvider {
    fn name(&self) -> &str {
        "lshw"
    }

    fn collect<'a>(
        &'a self,
        ctx: &'a ProviderContext,
    ) -> BoxFuture<'a, Result<Vec<RawReading>, ProviderError>> {
        Box::pin(async move {
            let out = ctx
                .exec
                .run("lshw", &args(&["-class", "memory", "-json"]), ctx.timeout)
                .await?
                .into_stdout("lshw")?;
            Ok(parse_lshw(&out)?)
        })
    }
}
