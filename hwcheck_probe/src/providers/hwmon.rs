//! Kernel hwmon fallback for power and fan readings (`/sys/class/hwmon`).

use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{Provider, ProviderContext};
use crate::error::{ProbeError, ProviderError};
use crate::status::ProviderStatus;
use crate::types::{Domain, RawReading, Thresholds};

static INPUT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(in|curr|power|fan)(\d+)_input$").expect("static hwmon regex"));

/// (file prefix, divisor to base unit, unit)
const POWER_KINDS: &[(&str, f64, &str)] = &[
    ("in", 1000.0, "V"),
    ("curr", 1000.0, "A"),
    ("power", 1_000_000.0, "W"),
];
const FAN_KINDS: &[(&str, f64, &str)] = &[("fan", 1.0, "RPM")];

pub struct HwmonProvider {
    domain: Domain,
}

impl HwmonProvider {
    pub fn new(domain: Domain) -> Self {
        Self { domain }
    }

    fn kinds(&self) -> &'static [(&'static str, f64, &'static str)] {
        match self.domain {
            Domain::Power => POWER_KINDS,
            Domain::Fan => FAN_KINDS,
            _ => &[],
        }
    }
}

async fn read_trimmed(path: &Path) -> Option<String> {
    tokio::fs::read_to_string(path)
        .await
        .ok()
        .map(|s| s.trim().to_string())
}

async fn read_scaled(dir: &Path, file: &str, divisor: f64) -> Option<f64> {
    read_trimmed(&dir.join(file))
        .await?
        .parse::<f64>()
        .ok()
        .map(|v| v / divisor)
}

async fn read_flag(dir: &Path, file: &str) -> bool {
    read_trimmed(&dir.join(file)).await.as_deref() == Some("1")
}

async fn list_dir(dir: &Path) -> Result<Vec<PathBuf>, ProbeError> {
    let mut rd = tokio::fs::read_dir(dir).await?;
    let mut out = Vec::new();
    while let Some(entry) = rd.next_entry().await? {
        out.push(entry.path());
    }
    out.sort();
    Ok(out)
}

async fn chip_readings(
    chip: &Path,
    kinds: &[(&str, f64, &str)],
) -> Result<Vec<RawReading>, ProbeError> {
    let chip_name = read_trimmed(&chip.join("name"))
        .await
        .unwrap_or_else(|| "hwmon".to_string());
    let mut inputs: Vec<(usize, u32, String, f64, &str)> = Vec::new();
    for path in list_dir(chip).await? {
        let Some(file) = path.file_name().and_then(|f| f.to_str()) else {
            continue;
        };
        let Some(caps) = INPUT.captures(file) else {
            continue;
        };
        let Some(order) = kinds.iter().position(|(k, _, _)| *k == &caps[1]) else {
            continue;
        };
        let n: u32 = caps[2].parse().unwrap_or(0);
        let (_, divisor, unit) = kinds[order];
        inputs.push((order, n, caps[1].to_string(), divisor, unit));
    }
    inputs.sort_by_key(|(order, n, ..)| (*order, *n));

    let mut readings = Vec::with_capacity(inputs.len());
    for (_, n, kind, divisor, unit) in inputs {
        let base = format!("{kind}{n}");
        let label = read_trimmed(&chip.join(format!("{base}_label")))
            .await
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| format!("{chip_name} {base}"));
        let value = read_scaled(chip, &format!("{base}_input"), divisor).await;
        let thresholds = Thresholds {
            min: read_scaled(chip, &format!("{base}_min"), divisor).await,
            max: read_scaled(chip, &format!("{base}_max"), divisor).await,
            critical_min: read_scaled(chip, &format!("{base}_lcrit"), divisor).await,
            critical_max: read_scaled(chip, &format!("{base}_crit"), divisor).await,
        };
        let status = if read_flag(chip, &format!("{base}_fault")).await {
            "critical"
        } else if read_flag(chip, &format!("{base}_alarm")).await {
            "warning"
        } else if value.is_none() {
            "unknown"
        } else {
            "ok"
        };
        readings.push(
            RawReading::new(label, value, unit)
                .with_status(ProviderStatus::Plain(status.into()))
                .with_thresholds(thresholds),
        );
    }
    Ok(readings)
}

impl Provider for HwmonProvider {
    fn name(&self) -> &str {
        "hwmon"
    }

    fn collect<'a>(
        &'a self,
        ctx: &'a ProviderContext,
    ) -> BoxFuture<'a, Result<Vec<RawReading>, ProviderError>> {
        Box::pin(async move {
            let root = ctx.sysfs_root.join("class").join("hwmon");
            let chips = list_dir(&root)
                .await
                .map_err(|e| ProviderError::Unavailable(format!("{}: {e}", root.display())))?;
            let mut readings = Vec::new();
            for chip in chips {
                match chip_readings(&chip, self.kinds()).await {
                    Ok(mut r) => readings.append(&mut r),
                    Err(e) => debug!(chip = %chip.display(), error = %e, "skipping hwmon chip"),
                }
            }
            Ok(readings)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::ParallelCollector;
    use crate::exec::ScriptedExec;
    use std::fs;
    use std::sync::Arc;

    fn write(dir: &Path, file: &str, body: &str) {
        fs::write(dir.join(file), body).unwrap();
    }

    fn fake_sysfs() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        let chip = tmp.path().join("class/hwmon/hwmon0");
        fs::create_dir_all(&chip).unwrap();
        write(&chip, "name", "nct6775\n");
        write(&chip, "in1_input", "12096\n");
        write(&chip, "in1_label", "+12V\n");
        write(&chip, "in1_min", "11400\n");
        write(&chip, "in1_max", "12600\n");
        write(&chip, "in0_input", "1008\n");
        write(&chip, "in0_alarm", "1\n");
        write(&chip, "power1_input", "85000000\n");
        write(&chip, "fan1_input", "1250\n");
        write(&chip, "fan1_label", "SYS_FAN1\n");
        write(&chip, "fan2_input", "0\n");
        write(&chip, "fan2_fault", "1\n");
        tmp
    }

    fn ctx(root: &Path) -> ProviderContext {
        ProviderContext::new(Arc::new(ScriptedExec::new()), ParallelCollector::default())
            .with_sysfs_root(root)
    }

    #[tokio::test]
    async fn power_rails_are_scaled_and_ordered() {
        let tmp = fake_sysfs();
        let r = HwmonProvider::new(Domain::Power).collect(&ctx(tmp.path())).await.unwrap();
        let names: Vec<_> = r.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["nct6775 in0", "+12V", "nct6775 power1"]);
        assert_eq!(r[0].status, ProviderStatus::Plain("warning".into()));
        assert!((r[1].value.unwrap() - 12.096).abs() < 1e-9);
        assert_eq!(r[1].thresholds.min, Some(11.4));
        assert_eq!(r[1].unit, "V");
        assert_eq!(r[2].value, Some(85.0));
    }

    #[tokio::test]
    async fn fans_report_faults() {
        let tmp = fake_sysfs();
        let r = HwmonProvider::new(Domain::Fan).collect(&ctx(tmp.path())).await.unwrap();
        assert_eq!(r.len(), 2);
        assert_eq!(r[0].name, "SYS_FAN1");
        assert_eq!(r[0].value, Some(1250.0));
        assert_eq!(r[1].status, ProviderStatus::Plain("critical".into()));
    }

    #[tokio::test]
    async fn missing_hwmon_class_is_unavailable() {
        let tmp = tempfile::tempdir().unwrap();
        let err = HwmonProvider::new(Domain::Fan)
            .collect(&ctx(tmp.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable(_)));
    }
}
