//! Power and fan readings through `ipmitool`.
//!
//! `sdr elist full` enumerates every full sensor record once per process; the
//! records relevant to the domain are then read one by one with `sensor get`
//! (which carries thresholds) on the parallel collector. A failed `sensor get`
//! keeps the reading and status from the listing, without thresholds.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{Provider, ProviderContext};
use crate::error::{ProbeError, ProviderError};
use crate::exec::args;
use crate::normalize::{canonical_unit, Normalizer};
use crate::status::ProviderStatus;
use crate::types::{Domain, RawReading, Subtype, Thresholds};

/// One line of `ipmitool sdr elist`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SdrRecord {
    pub id: u16,
    pub name: String,
    pub status: String,
    pub reading: String,
}

/// `ipmitool sensor get` for a single sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorDetail {
    pub value: Option<f64>,
    pub unit: String,
    pub status: Option<String>,
    pub thresholds: Thresholds,
}

/// `FAN1 | 40h | ok | 29.1 | 5400 RPM`
pub fn parse_sdr_elist(out: &str) -> Vec<SdrRecord> {
    out.lines()
        .filter_map(|line| {
            let cols: Vec<&str> = line.split('|').map(str::trim).collect();
            if cols.len() < 5 || cols[0].is_empty() {
                return None;
            }
            let id = u16::from_str_radix(cols[1].trim_end_matches('h'), 16).ok()?;
            Some(SdrRecord {
                id,
                name: cols[0].to_string(),
                status: cols[2].to_string(),
                reading: cols[4].to_string(),
            })
        })
        .collect()
}

/// `230 (+/- 0) Volts` -> (230.0, "Volts"); `No Reading` -> (None, "").
pub fn parse_reading(text: &str) -> (Option<f64>, String) {
    let text = text.trim();
    let mut parts = text.splitn(2, char::is_whitespace);
    let Some(value) = parts.next().and_then(|v| v.parse::<f64>().ok()) else {
        return (None, String::new());
    };
    let rest = parts.next().unwrap_or("").trim();
    let unit = match rest.rfind(')') {
        Some(i) => rest[i + 1..].trim(),
        None => rest,
    };
    (Some(value), unit.to_string())
}

fn threshold(v: &str) -> Option<f64> {
    v.trim().parse::<f64>().ok()
}

pub fn parse_sensor_get(out: &str) -> Result<SensorDetail, ProbeError> {
    let mut detail = SensorDetail {
        value: None,
        unit: String::new(),
        status: None,
        thresholds: Thresholds::default(),
    };
    let mut saw_reading = false;
    for line in out.lines() {
        let Some((key, val)) = line.split_once(':') else {
            continue;
        };
        let val = val.trim();
        match key.trim() {
            "Sensor Reading" => {
                saw_reading = true;
                let (v, u) = parse_reading(val);
                detail.value = v;
                detail.unit = u;
            }
            "Status" => detail.status = Some(val.to_string()),
            "Lower Non-Critical" => detail.thresholds.min = threshold(val),
            "Upper Non-Critical" => detail.thresholds.max = threshold(val),
            "Lower Critical" => detail.thresholds.critical_min = threshold(val),
            "Upper Critical" => detail.thresholds.critical_max = threshold(val),
            _ => {}
        }
    }
    if !saw_reading && detail.status.is_none() {
        return Err(ProbeError::Parse("no sensor reading in `sensor get` output".into()));
    }
    Ok(detail)
}

pub struct IpmiSdrProvider {
    domain: Domain,
    normalizer: Normalizer,
}

impl IpmiSdrProvider {
    pub fn new(domain: Domain) -> Self {
        Self {
            domain,
            normalizer: Normalizer::for_domain(domain),
        }
    }

    /// Whether a record belongs to this domain, by unit or (for unread sensors) by name.
    pub fn is_relevant(&self, rec: &SdrRecord) -> bool {
        let (_, unit) = parse_reading(&rec.reading);
        let subtype = match canonical_unit(&unit).as_str() {
            "V" => Subtype::Voltage,
            "A" => Subtype::Current,
            "W" => Subtype::Power,
            "RPM" => Subtype::Fan,
            "" => self.normalizer.classify(&rec.name, "").1,
            _ => return false,
        };
        match self.domain {
            Domain::Fan => subtype == Subtype::Fan,
            Domain::Power => matches!(subtype, Subtype::Voltage | Subtype::Current | Subtype::Power),
            _ => false,
        }
    }
}

async fn sdr_records(ctx: &ProviderContext) -> Result<Vec<SdrRecord>, ProbeError> {
    let argv = args(&["sdr", "elist", "full"]);
    let out = ctx
        .exec
        .run(&ctx.ipmitool, &argv, ctx.timeout)
        .await?
        .into_stdout(&ctx.ipmitool)?;
    let records = parse_sdr_elist(&out);
    if records.is_empty() {
        return Err(ProbeError::Parse("empty sdr listing".into()));
    }
    debug!(count = records.len(), "sdr records indexed");
    Ok(records)
}

impl Provider for IpmiSdrProvider {
    fn name(&self) -> &str {
        "ipmi-sdr"
    }

    fn collect<'a>(
        &'a self,
        ctx: &'a ProviderContext,
    ) -> BoxFuture<'a, Result<Vec<RawReading>, ProviderError>> {
        Box::pin(async move {
            let records = ctx.sdr_cache.get_or_populate(|| sdr_records(ctx)).await?;
            let relevant: Vec<SdrRecord> =
                records.into_iter().filter(|r| self.is_relevant(r)).collect();
            if relevant.is_empty() {
                return Ok(Vec::new());
            }

            let exec = Arc::clone(&ctx.exec);
            let tool = ctx.ipmitool.clone();
            let timeout = ctx.timeout;
            let mut outcomes = ctx
                .collector
                .collect(relevant, move |rec: SdrRecord| {
                    let exec = Arc::clone(&exec);
                    let tool = tool.clone();
                    async move {
                        let argv = vec!["sensor".to_string(), "get".to_string(), rec.name.clone()];
                        let out = exec.run(&tool, &argv, timeout).await?.into_stdout(&tool)?;
                        parse_sensor_get(&out)
                    }
                })
                .await;
            outcomes.sort_by_key(|o| o.index);

            let readings = outcomes
                .into_iter()
                .map(|o| {
                    let rec = o.target;
                    match o.result {
                        Ok(d) => {
                            let status = d.status.unwrap_or_else(|| rec.status.clone());
                            RawReading::new(rec.name, d.value, d.unit)
                                .with_status(ProviderStatus::Ipmi(status))
                                .with_thresholds(d.thresholds)
                        }
                        Err(e) => {
                            warn!(sensor = %rec.name, error = %e, "sensor read failed");
                            let (value, unit) = parse_reading(&rec.reading);
                            RawReading::new(rec.name, value, unit)
                                .with_status(ProviderStatus::Ipmi(rec.status))
                        }
                    }
                })
                .collect();
            Ok(readings)
        })
    }
}
