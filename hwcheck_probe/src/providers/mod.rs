//! Raw reading providers and the ordered fallback chain that tries them.
//!
//! Every provider has the same contract: produce raw readings or an error.
//! The chain walks its providers in order and stops at the first one that
//! yields anything, so callers never special-case a particular source.

pub mod bmc;
pub mod dmidecode;
pub mod hwmon;
pub mod ipmi;
pub mod net;
pub mod replay;

use futures::future::BoxFuture;
use once_cell::sync::OnceCell;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::collector::{ParallelCollector, SensorIndexCache};
use crate::error::{CollectError, ProviderError};
use crate::exec::{SharedExec, SystemExec};
use crate::types::{Domain, RawReading};

pub use ipmi::SdrRecord;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

// Read once; tests build contexts explicitly instead.
fn ipmitool_path() -> &'static str {
    static P: OnceCell<String> = OnceCell::new();
    P.get_or_init(|| env_or("HWCHECK_IPMITOOL", "ipmitool"))
}
fn sysfs_root() -> &'static str {
    static P: OnceCell<String> = OnceCell::new();
    P.get_or_init(|| env_or("HWCHECK_SYSFS_ROOT", "/sys"))
}
fn dev_root() -> &'static str {
    static P: OnceCell<String> = OnceCell::new();
    P.get_or_init(|| env_or("HWCHECK_DEV_ROOT", "/dev"))
}

/// Everything a provider may touch: process execution, filesystem roots,
/// the probe pool and the shared SDR record cache.
#[derive(Clone)]
pub struct ProviderContext {
    pub exec: SharedExec,
    pub collector: ParallelCollector,
    pub timeout: Duration,
    pub ipmitool: String,
    pub sysfs_root: PathBuf,
    pub dev_root: PathBuf,
    pub sdr_cache: Arc<SensorIndexCache<SdrRecord>>,
}

impl ProviderContext {
    pub fn new(exec: SharedExec, collector: ParallelCollector) -> Self {
        Self {
            exec,
            timeout: collector.timeout(),
            collector,
            ipmitool: "ipmitool".into(),
            sysfs_root: PathBuf::from("/sys"),
            dev_root: PathBuf::from("/dev"),
            sdr_cache: Arc::new(SensorIndexCache::new()),
        }
    }

    /// Real host: system processes, paths overridable via `HWCHECK_*` env vars.
    pub fn system(collector: ParallelCollector) -> Self {
        Self {
            ipmitool: ipmitool_path().to_string(),
            sysfs_root: PathBuf::from(sysfs_root()),
            dev_root: PathBuf::from(dev_root()),
            ..Self::new(Arc::new(SystemExec), collector)
        }
    }

    pub fn with_sysfs_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.sysfs_root = root.into();
        self
    }

    pub fn with_dev_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.dev_root = root.into();
        self
    }
}

pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    /// Whether readings come from live hardware (replayed data skips live probes).
    fn is_live(&self) -> bool {
        true
    }

    fn collect<'a>(
        &'a self,
        ctx: &'a ProviderContext,
    ) -> BoxFuture<'a, Result<Vec<RawReading>, ProviderError>>;
}

/// Readings from the first provider that produced any.
#[derive(Debug, Clone)]
pub struct ChainOutput {
    pub provider: String,
    pub live: bool,
    pub readings: Vec<RawReading>,
}

pub struct ProviderChain {
    domain: Domain,
    providers: Vec<Box<dyn Provider>>,
}

impl ProviderChain {
    pub fn new(domain: Domain, providers: Vec<Box<dyn Provider>>) -> Self {
        Self { domain, providers }
    }

    /// Default source order for a domain on a live host.
    pub fn for_domain(domain: Domain) -> Self {
        let providers: Vec<Box<dyn Provider>> = match domain {
            Domain::Power => vec![
                Box::new(ipmi::IpmiSdrProvider::new(Domain::Power)),
                Box::new(hwmon::HwmonProvider::new(Domain::Power)),
            ],
            Domain::Fan => vec![
                Box::new(ipmi::IpmiSdrProvider::new(Domain::Fan)),
                Box::new(hwmon::HwmonProvider::new(Domain::Fan)),
            ],
            Domain::Ram => vec![
                Box::new(dmidecode::DmidecodeProvider),
                Box::new(dmidecode::LshwProvider),
            ],
            Domain::Network => vec![
                Box::new(net::SysfsNetProvider),
                Box::new(net::SysinfoNetProvider),
            ],
            Domain::Bmc => vec![
                Box::new(bmc::IpmiLanProvider::default()),
                Box::new(bmc::DeviceNodeProvider),
            ],
        };
        Self::new(domain, providers)
    }

    /// A chain that only replays readings from a file.
    pub fn replay(domain: Domain, path: impl Into<PathBuf>) -> Self {
        Self::new(domain, vec![Box::new(replay::ReplayProvider::new(domain, path))])
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    pub async fn collect(&self, ctx: &ProviderContext) -> Result<ChainOutput, CollectError> {
        if self.providers.is_empty() {
            return Err(CollectError::NoProviders(self.domain.to_string()));
        }
        let mut attempts = Vec::with_capacity(self.providers.len());
        for p in &self.providers {
            match p.collect(ctx).await {
                Ok(readings) if !readings.is_empty() => {
                    debug!(provider = p.name(), count = readings.len(), "provider produced readings");
                    return Ok(ChainOutput {
                        provider: p.name().to_string(),
                        live: p.is_live(),
                        readings,
                    });
                }
                Ok(_) => {
                    debug!(provider = p.name(), "provider produced no readings");
                    attempts.push((p.name().to_string(), None));
                }
                Err(e) => {
                    warn!(provider = p.name(), error = %e, "provider failed");
                    attempts.push((p.name().to_string(), Some(e)));
                }
            }
        }
        Err(CollectError::NoData {
            domain: self.domain.to_string(),
            attempts,
        })
    }
}
