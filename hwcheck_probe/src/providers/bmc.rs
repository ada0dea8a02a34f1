//! BMC presence and management address.

use futures::future::BoxFuture;

use super::{Provider, ProviderContext};
use crate::error::{ProbeError, ProviderError};
use crate::status::ProviderStatus;
use crate::types::{Detail, RawReading};

/// `ipmitool lan print [channel]`.
#[derive(Debug, Default, Clone)]
pub struct IpmiLanProvider {
    pub channel: Option<u8>,
}

pub fn parse_lan_print(out: &str) -> Result<RawReading, ProbeError> {
    let mut ip = None;
    let mut mac = None;
    for line in out.lines() {
        let Some((key, val)) = line.split_once(':') else {
            continue;
        };
        let val = val.trim();
        match key.trim() {
            "IP Address" if !val.is_empty() && val != "0.0.0.0" => ip = Some(val.to_string()),
            "MAC Address" if !val.is_empty() && val != "00:00:00:00:00:00" => {
                mac = Some(val.to_string())
            }
            _ => {}
        }
    }
    if ip.is_none() && mac.is_none() {
        return Err(ProbeError::Parse("no address in `lan print` output".into()));
    }
    Ok(RawReading::new("BMC", None, "")
        .with_status(ProviderStatus::Presence(true))
        .with_detail(Detail::Bmc { ip, mac, ping: None }))
}

impl Provider for IpmiLanProvider {
    fn name(&self) -> &str {
        "ipmi-lan"
    }

    fn collect<'a>(
        &'a self,
        ctx: &'a ProviderContext,
    ) -> BoxFuture<'a, Result<Vec<RawReading>, ProviderError>> {
        Box::pin(async move {
            let mut argv = vec!["lan".to_string(), "print".to_string()];
            if let Some(ch) = self.channel {
                argv.push(ch.to_string());
            }
            let out = ctx
                .exec
                .run(&ctx.ipmitool, &argv, ctx.timeout)
                .await?
                .into_stdout(&ctx.ipmitool)?;
            Ok(vec![parse_lan_print(&out)?])
        })
    }
}

const DEVICE_NODES: &[&str] = &["ipmi0", "ipmi/0", "ipmidev/0"];

/// Last resort: the kernel IPMI device node. Always yields exactly one reading,
/// present or not, so a missing BMC is a check result rather than a collection error.
pub struct DeviceNodeProvider;

impl Provider for DeviceNodeProvider {
    fn name(&self) -> &str {
        "ipmi-devnode"
    }

    fn collect<'a>(
        &'a self,
        ctx: &'a ProviderContext,
    ) -> BoxFuture<'a, Result<Vec<RawReading>, ProviderError>> {
        Box::pin(async move {
            let mut found = false;
            for node in DEVICE_NODES {
                if tokio::fs::metadata(ctx.dev_root.join(node)).await.is_ok() {
                    found = true;
                    break;
                }
            }
            Ok(vec![RawReading::new("BMC", None, "")
                .with_status(ProviderStatus::Presence(found))
                .with_detail(Detail::Bmc {
                    ip: None,
                    mac: None,
                    ping: None,
                })])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::ParallelCollector;
    use crate::exec::ScriptedExec;
    use std::sync::Arc;

    const LAN: &str = "Set in Progress         : Set Complete
IP Address Source       : Static Address
IP Address              : 10.20.0.15
Subnet Mask             : 255.255.255.0
MAC Address             : 3c:ec:ef:12:34:56
Default Gateway IP      : 10.20.0.1
";

    #[test]
    fn lan_print_yields_address() {
        let r = parse_lan_print(LAN).unwrap();
        assert_eq!(r.name, "BMC");
        assert_eq!(
            r.detail,
            Detail::Bmc {
                ip: Some("10.20.0.15".into()),
                mac: Some("3c:ec:ef:12:34:56".into()),
                ping: None,
            }
        );
        assert!(parse_lan_print("Set in Progress : Set Complete\n").is_err());
    }

    #[tokio::test]
    async fn lan_print_uses_configured_channel() {
        let exec = Arc::new(ScriptedExec::new().ok("ipmitool lan print 8", LAN));
        let ctx = ProviderContext::new(exec.clone(), ParallelCollector::default());
        let r = IpmiLanProvider { channel: Some(8) }.collect(&ctx).await.unwrap();
        assert_eq!(r.len(), 1);
        assert_eq!(exec.calls(), vec!["ipmitool lan print 8"]);
    }

    #[tokio::test]
    async fn device_node_reports_absence_as_reading() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = ProviderContext::new(Arc::new(ScriptedExec::new()), ParallelCollector::default())
            .with_dev_root(tmp.path());
        let r = DeviceNodeProvider.collect(&ctx).await.unwrap();
        assert_eq!(r[0].status, ProviderStatus::Presence(false));

        std::fs::create_dir_all(tmp.path().join("ipmi")).unwrap();
        std::fs::write(tmp.path().join("ipmi/0"), "").unwrap();
        let r = DeviceNodeProvider.collect(&ctx).await.unwrap();
        assert_eq!(r[0].status, ProviderStatus::Presence(true));
    }
}
