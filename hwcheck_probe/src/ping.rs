//! ICMP reachability via the system `ping`, with bounded retries.

use once_cell::sync::Lazy;
use regex::Regex;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::error::ProbeError;
use crate::exec::Exec;
use crate::types::PingStats;

static SUMMARY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+) packets transmitted, (\d+) (?:packets )?received.*?([\d.]+)% packet loss")
        .expect("static ping summary regex")
});
static RTT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:rtt|round-trip) min/avg/max/(?:mdev|stddev) = [\d.]+/([\d.]+)/")
        .expect("static ping rtt regex")
});

#[derive(Debug, Clone, PartialEq)]
pub struct PingSpec {
    pub target: String,
    /// Source interface (`ping -I`).
    pub interface: Option<String>,
    pub count: u32,
    pub deadline: Duration,
}

impl PingSpec {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            interface: None,
            count: 3,
            deadline: Duration::from_secs(4),
        }
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count.max(1);
        self
    }

    pub fn via(mut self, interface: impl Into<String>) -> Self {
        self.interface = Some(interface.into());
        self
    }

    pub fn args(&self) -> Vec<String> {
        let mut a = vec![
            "-n".to_string(),
            "-c".to_string(),
            self.count.max(1).to_string(),
            "-W".to_string(),
            "1".to_string(),
            "-w".to_string(),
            self.deadline.as_secs().max(1).to_string(),
        ];
        if let Some(iface) = &self.interface {
            a.push("-I".into());
            a.push(iface.clone());
        }
        a.push(self.target.clone());
        a
    }
}

/// Parses the summary block of iputils/busybox/BSD `ping`.
pub fn parse_ping_output(target: &str, out: &str) -> Option<PingStats> {
    let caps = SUMMARY.captures(out)?;
    let transmitted = caps[1].parse().ok()?;
    let received = caps[2].parse().ok()?;
    let loss_percent = caps[3].parse().ok()?;
    let avg_rtt_ms = RTT
        .captures(out)
        .and_then(|c| c[1].parse::<f64>().ok());
    Some(PingStats {
        target: target.to_string(),
        transmitted,
        received,
        loss_percent,
        avg_rtt_ms,
        attempts: 1,
    })
}

/// One `ping` invocation. Total loss is still `Ok` with 100 % loss.
pub async fn ping_once(exec: &dyn Exec, spec: &PingSpec) -> Result<PingStats, ProbeError> {
    let args = spec.args();
    let timeout = spec.deadline + Duration::from_secs(2);
    let out = exec.run("ping", &args, timeout).await?;
    parse_ping_output(&spec.target, &out.stdout).ok_or_else(|| {
        let detail = if out.stderr.trim().is_empty() {
            out.stdout.trim().to_string()
        } else {
            out.stderr.trim().to_string()
        };
        ProbeError::Unreachable(format!("{}: {detail}", spec.target))
    })
}

/// Up to `retries + 1` attempts, `delay` apart. Keeps the lowest-loss attempt and
/// stops early on a clean run. When nothing gets through, the result carries the
/// minimum loss observed across attempts. `Err` only if no attempt produced stats.
pub async fn ping_with_retries<F, Fut>(
    retries: u32,
    delay: Duration,
    mut attempt: F,
) -> Result<PingStats, ProbeError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<PingStats, ProbeError>>,
{
    let total = retries.saturating_add(1);
    let mut best: Option<PingStats> = None;
    let mut last_err: Option<ProbeError> = None;
    let mut made = 0;
    for n in 0..total {
        if n > 0 {
            tokio::time::sleep(delay).await;
        }
        made += 1;
        match attempt(n).await {
            Ok(stats) => {
                debug!(target = %stats.target, attempt = n, loss = stats.loss_percent, "ping attempt");
                let better = best
                    .as_ref()
                    .map_or(true, |b| stats.loss_percent < b.loss_percent);
                if better {
                    best = Some(stats);
                }
                if best.as_ref().is_some_and(|b| b.loss_percent <= 0.0) {
                    break;
                }
            }
            Err(e) => {
                debug!(attempt = n, error = %e, "ping attempt failed");
                last_err = Some(e);
            }
        }
    }
    match best {
        Some(mut b) => {
            b.attempts = made;
            Ok(b)
        }
        None => Err(last_err.unwrap_or_else(|| ProbeError::Unreachable("no ping attempts".into()))),
    }
}
