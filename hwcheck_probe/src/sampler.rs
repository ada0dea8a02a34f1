//! One collection pass: provider chain, normalization, then live ping enrichment.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::collector::ParallelCollector;
use crate::error::CollectError;
use crate::normalize::Normalizer;
use crate::ping::{ping_once, ping_with_retries, PingSpec};
use crate::providers::{ProviderChain, ProviderContext};
use crate::types::{Detail, Domain, Entity, PingStats, RawReading};

/// Which entities get pinged, and how hard.
#[derive(Debug, Clone, PartialEq)]
pub struct PingPlan {
    /// position -> host
    pub targets: BTreeMap<String, String>,
    pub retries: u32,
    pub count: u32,
    pub retry_delay: Duration,
    /// Ping a BMC at the address it reports when no explicit target is set.
    pub use_bmc_address: bool,
}

impl Default for PingPlan {
    fn default() -> Self {
        Self {
            targets: BTreeMap::new(),
            retries: 2,
            count: 3,
            retry_delay: Duration::from_secs(1),
            use_bmc_address: true,
        }
    }
}

impl PingPlan {
    fn spec_for(&self, entity: &Entity) -> Option<PingSpec> {
        if !entity.present {
            return None;
        }
        if let Some(host) = self.targets.get(&entity.position) {
            let spec = PingSpec::new(host.clone()).with_count(self.count);
            return Some(match entity.detail {
                Detail::Link { .. } => spec.via(entity.raw_name.clone()),
                _ => spec,
            });
        }
        match &entity.detail {
            Detail::Bmc { ip: Some(ip), .. } if self.use_bmc_address => {
                Some(PingSpec::new(ip.clone()).with_count(self.count))
            }
            _ => None,
        }
    }

    /// Worst case for one target: every attempt runs to its deadline.
    fn budget(&self, spec: &PingSpec) -> Duration {
        let per_attempt = spec.deadline + Duration::from_secs(2) + self.retry_delay;
        per_attempt * (self.retries + 1)
    }
}

#[derive(Debug, Clone)]
pub struct CollectionPass {
    pub domain: Domain,
    pub provider: String,
    pub live: bool,
    pub readings: Vec<RawReading>,
    pub entities: Vec<Entity>,
    /// position -> probe error, for targets whose probe failed outright.
    pub probe_failures: BTreeMap<String, String>,
}

pub struct Sampler {
    chain: ProviderChain,
    ctx: ProviderContext,
    normalizer: Normalizer,
    ping: Option<PingPlan>,
}

impl Sampler {
    pub fn new(chain: ProviderChain, ctx: ProviderContext) -> Self {
        let normalizer = Normalizer::for_domain(chain.domain());
        Self {
            chain,
            ctx,
            normalizer,
            ping: None,
        }
    }

    pub fn with_ping(mut self, plan: PingPlan) -> Self {
        self.ping = Some(plan);
        self
    }

    pub fn domain(&self) -> Domain {
        self.chain.domain()
    }

    pub async fn run(&self) -> Result<CollectionPass, CollectError> {
        let out = self.chain.collect(&self.ctx).await?;
        let entities = self.normalizer.entities(out.readings.clone());
        debug!(
            provider = %out.provider,
            readings = out.readings.len(),
            entities = entities.len(),
            "normalized"
        );
        let mut probe_failures = BTreeMap::new();
        let entities = match (&self.ping, out.live) {
            (Some(plan), true) => self.enrich(entities, plan, &mut probe_failures).await,
            _ => entities,
        };
        info!(
            domain = %self.domain(),
            provider = %out.provider,
            entities = entities.len(),
            failed_probes = probe_failures.len(),
            "collection pass complete"
        );
        Ok(CollectionPass {
            domain: self.domain(),
            provider: out.provider,
            live: out.live,
            readings: out.readings,
            entities,
            probe_failures,
        })
    }

    async fn enrich(
        &self,
        entities: Vec<Entity>,
        plan: &PingPlan,
        failures: &mut BTreeMap<String, String>,
    ) -> Vec<Entity> {
        let jobs: Vec<(usize, PingSpec)> = entities
            .iter()
            .enumerate()
            .filter_map(|(i, e)| plan.spec_for(e).map(|s| (i, s)))
            .collect();
        if jobs.is_empty() {
            return entities;
        }
        let budget = jobs
            .iter()
            .map(|(_, s)| plan.budget(s))
            .max()
            .unwrap_or(self.ctx.timeout);
        let pool = ParallelCollector::new(self.ctx.collector.workers(), budget);
        let exec = Arc::clone(&self.ctx.exec);
        let (retries, delay) = (plan.retries, plan.retry_delay);

        let outcomes = pool
            .collect(jobs, move |(_, spec): (usize, PingSpec)| {
                let exec = Arc::clone(&exec);
                async move {
                    ping_with_retries(retries, delay, |_| {
                        let exec = Arc::clone(&exec);
                        let spec = spec.clone();
                        async move { ping_once(exec.as_ref(), &spec).await }
                    })
                    .await
                }
            })
            .await;

        let mut stats: HashMap<usize, PingStats> = HashMap::with_capacity(outcomes.len());
        for o in outcomes {
            let (index, spec) = o.target;
            let result = match o.result {
                Ok(s) => s,
                Err(e) => {
                    let position = entities[index].position.clone();
                    warn!(%position, target = %spec.target, error = %e, "ping probe failed");
                    failures.insert(position, e.to_string());
                    PingStats {
                        target: spec.target,
                        transmitted: 0,
                        received: 0,
                        loss_percent: 100.0,
                        avg_rtt_ms: None,
                        attempts: retries + 1,
                    }
                }
            };
            stats.insert(index, result);
        }

        entities
            .into_iter()
            .enumerate()
            .map(|(i, e)| match stats.remove(&i) {
                Some(s) => e.with_ping(s),
                None => e,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::{ExecOutput, ScriptedExec};
    use crate::providers::Provider;
    use crate::error::ProviderError;
    use crate::status::ProviderStatus;
    use futures::future::BoxFuture;

    struct Links(Vec<RawReading>);

    impl Provider for Links {
        fn name(&self) -> &str {
            "links"
        }
        fn collect<'a>(
            &'a self,
            _ctx: &'a ProviderContext,
        ) -> BoxFuture<'a, Result<Vec<RawReading>, ProviderError>> {
            Box::pin(async move { Ok(self.0.clone()) })
        }
    }

    fn link(name: &str, up: bool) -> RawReading {
        RawReading::new(name, Some(10_000.0), "Mbps")
            .with_status(ProviderStatus::LinkState(if up { "up" } else { "down" }.into()))
            .with_detail(Detail::Link {
                speed_mbps: Some(10_000),
                carrier: Some(up),
                mac: None,
                ping: None,
            })
    }

    const REPLY: &str = "3 packets transmitted, 3 received, 0% packet loss, time 2003ms\n";

    #[tokio::test]
    async fn pings_only_targets_with_hosts_and_rebuilds_entities() {
        let plan = PingPlan {
            targets: BTreeMap::from([
                ("eno1".to_string(), "10.0.0.1".to_string()),
                ("eno2".to_string(), "10.0.0.2".to_string()),
            ]),
            retries: 1,
            retry_delay: Duration::from_millis(1),
            ..PingPlan::default()
        };
        let spec1 = PingSpec::new("10.0.0.1").with_count(3).via("eno1");
        let spec2 = PingSpec::new("10.0.0.2").with_count(3).via("eno2");
        let exec = ScriptedExec::new()
            .ok(&format!("ping {}", spec1.args().join(" ")), REPLY)
            .on(
                &format!("ping {}", spec2.args().join(" ")),
                Ok(ExecOutput::failed(1, "", "ping: connect: Network is unreachable")),
            );
        let ctx = ProviderContext::new(Arc::new(exec), ParallelCollector::default());
        let chain = ProviderChain::new(
            Domain::Network,
            vec![Box::new(Links(vec![link("eno1", true), link("eno2", true), link("eno3", true)]))],
        );
        let pass = Sampler::new(chain, ctx).with_ping(plan).run().await.unwrap();

        assert_eq!(pass.entities.len(), 3);
        let p1 = pass.entities[0].detail.ping().unwrap();
        assert_eq!(p1.loss_percent, 0.0);
        let p2 = pass.entities[1].detail.ping().unwrap();
        assert_eq!(p2.loss_percent, 100.0);
        assert_eq!(p2.attempts, 2);
        assert!(pass.probe_failures.contains_key("eno2"));
        assert!(pass.entities[2].detail.ping().is_none());
        // Raw readings stay as collected.
        assert!(pass.readings.iter().all(|r| r.detail.ping().is_none()));
    }

    #[tokio::test]
    async fn replayed_data_is_never_pinged() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            r#"[{"name":"BMC","status":{"source":"presence","value":true},
                "detail":{"kind":"bmc","ip":"10.20.0.15"}}]"#,
        )
        .unwrap();
        let exec = Arc::new(ScriptedExec::new());
        let ctx = ProviderContext::new(exec.clone(), ParallelCollector::default());
        let pass = Sampler::new(ProviderChain::replay(Domain::Bmc, tmp.path()), ctx)
            .with_ping(PingPlan::default())
            .run()
            .await
            .unwrap();
        assert!(!pass.live);
        assert_eq!(pass.entities[0].position, "BMC");
        assert!(pass.entities[0].detail.ping().is_none());
        assert!(exec.calls().is_empty());
    }
}
