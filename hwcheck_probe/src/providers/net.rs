//! Network interfaces: link state from sysfs, with sysinfo enumeration as fallback.

use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use sysinfo::Networks;
use tracing::warn;

use super::{Provider, ProviderContext};
use crate::error::{ProbeError, ProviderError};
use crate::status::ProviderStatus;
use crate::types::{Detail, RawReading};

#[derive(Debug, Clone, PartialEq)]
pub struct LinkInfo {
    pub operstate: String,
    pub carrier: Option<bool>,
    pub speed_mbps: Option<u32>,
    pub mac: Option<String>,
}

async fn read_attr(dir: &Path, name: &str) -> Option<String> {
    // carrier/speed fail with EINVAL while the link is down
    tokio::fs::read_to_string(dir.join(name))
        .await
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub async fn read_link(dir: &Path) -> Result<LinkInfo, ProbeError> {
    let operstate = tokio::fs::read_to_string(dir.join("operstate"))
        .await?
        .trim()
        .to_string();
    let carrier = read_attr(dir, "carrier").await.map(|c| c == "1");
    // -1 (or 4294967295 on older kernels) means unknown
    let speed_mbps = read_attr(dir, "speed")
        .await
        .and_then(|s| s.parse::<i64>().ok())
        .filter(|s| *s > 0 && *s < u32::MAX as i64)
        .map(|s| s as u32);
    let mac = read_attr(dir, "address")
        .await
        .filter(|m| m.as_str() != "00:00:00:00:00:00");
    Ok(LinkInfo {
        operstate,
        carrier,
        speed_mbps,
        mac,
    })
}

fn link_reading(name: String, info: LinkInfo) -> RawReading {
    RawReading::new(name, info.speed_mbps.map(f64::from), "Mbps")
        .with_status(ProviderStatus::LinkState(info.operstate))
        .with_detail(Detail::Link {
            speed_mbps: info.speed_mbps,
            carrier: info.carrier,
            mac: info.mac,
            ping: None,
        })
}

/// Physical interfaces only: loopback and devices without a backing `device` link are skipped.
pub struct SysfsNetProvider;

impl Provider for SysfsNetProvider {
    fn name(&self) -> &str {
        "sysfs-net"
    }

    fn collect<'a>(
        &'a self,
        ctx: &'a ProviderContext,
    ) -> BoxFuture<'a, Result<Vec<RawReading>, ProviderError>> {
        Box::pin(async move {
            let root = ctx.sysfs_root.join("class").join("net");
            let mut rd = tokio::fs::read_dir(&root)
                .await
                .map_err(|e| ProviderError::Unavailable(format!("{}: {e}", root.display())))?;
            let mut ifaces: Vec<PathBuf> = Vec::new();
            while let Some(entry) = rd.next_entry().await.map_err(ProbeError::from)? {
                let path = entry.path();
                if entry.file_name() == "lo" || !path.join("device").exists() {
                    continue;
                }
                ifaces.push(path);
            }
            ifaces.sort();

            let outcomes = ctx
                .collector
                .collect(ifaces, |dir: PathBuf| async move { read_link(&dir).await })
                .await;
            let mut readings: Vec<(usize, RawReading)> = outcomes
                .into_iter()
                .map(|o| {
                    let name = o
                        .target
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    let reading = match o.result {
                        Ok(info) => link_reading(name, info),
                        Err(e) => {
                            warn!(iface = %name, error = %e, "link state unreadable");
                            RawReading::new(name, None, "Mbps")
                                .with_status(ProviderStatus::LinkState("unknown".into()))
                                .with_detail(Detail::Link {
                                    speed_mbps: None,
                                    carrier: None,
                                    mac: None,
                                    ping: None,
                                })
                        }
                    };
                    (o.index, reading)
                })
                .collect();
            readings.sort_by_key(|(i, _)| *i);
            Ok(readings.into_iter().map(|(_, r)| r).collect())
        })
    }
}

/// Interface names and MACs only; link state is unknown.
pub struct SysinfoNetProvider;

impl Provider for SysinfoNetProvider {
    fn name(&self) -> &str {
        "sysinfo"
    }

    fn collect<'a>(
        &'a self,
        _ctx: &'a ProviderContext,
    ) -> BoxFuture<'a, Result<Vec<RawReading>, ProviderError>> {
        Box::pin(async move {
            let nets = Networks::new_with_refreshed_list();
            let mut readings: Vec<RawReading> = nets
                .iter()
                .filter(|(name, _)| name.as_str() != "lo")
                .map(|(name, data)| {
                    let mac = data.mac_address().to_string();
                    RawReading::new(name.to_string(), None, "Mbps")
                        .with_status(ProviderStatus::Plain("unknown".into()))
                        .with_detail(Detail::Link {
                            speed_mbps: None,
                            carrier: None,
                            mac: Some(mac).filter(|m| m.as_str() != "00:00:00:00:00:00"),
                            ping: None,
                        })
                })
                .collect();
            readings.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(readings)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::ParallelCollector;
    use crate::exec::ScriptedExec;
    use crate::status::HealthStatus;
    use std::fs;
    use std::sync::Arc;

    fn iface(root: &Path, name: &str, attrs: &[(&str, &str)], physical: bool) {
        let dir = root.join("class/net").join(name);
        fs::create_dir_all(&dir).unwrap();
        if physical {
            fs::create_dir_all(dir.join("device")).unwrap();
        }
        for (k, v) in attrs {
            fs::write(dir.join(k), format!("{v}\n")).unwrap();
        }
    }

    #[tokio::test]
    async fn reads_physical_links_in_name_order() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        iface(
            root,
            "eno2",
            &[("operstate", "down"), ("speed", "-1"), ("address", "aa:bb:cc:00:00:02")],
            true,
        );
        iface(
            root,
            "eno1",
            &[
                ("operstate", "up"),
                ("carrier", "1"),
                ("speed", "10000"),
                ("address", "aa:bb:cc:00:00:01"),
            ],
            true,
        );
        iface(root, "lo", &[("operstate", "unknown")], false);
        iface(root, "docker0", &[("operstate", "up")], false);
        iface(root, "eno3", &[], true);

        let ctx = ProviderContext::new(Arc::new(ScriptedExec::new()), ParallelCollector::default())
            .with_sysfs_root(root);
        let r = SysfsNetProvider.collect(&ctx).await.unwrap();
        let names: Vec<_> = r.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["eno1", "eno2", "eno3"]);
        assert_eq!(r[0].status.to_health(), HealthStatus::Ok);
        assert_eq!(
            r[0].detail,
            Detail::Link {
                speed_mbps: Some(10_000),
                carrier: Some(true),
                mac: Some("aa:bb:cc:00:00:01".into()),
                ping: None,
            }
        );
        assert_eq!(r[1].status.to_health(), HealthStatus::NotAvailable);
        assert_eq!(r[1].value, None);
        // Missing operstate fails that interface only.
        assert_eq!(r[2].status.to_health(), HealthStatus::Unknown);
    }
}
