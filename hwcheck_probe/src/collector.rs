//! Bounded parallel probing.
//!
//! A fixed number of worker tasks drain a shared queue of independent targets.
//! Every target produces exactly one [`ProbeOutcome`], success or failure, and
//! the call returns only after all of them are in. Outcomes arrive in completion
//! order; callers re-key by target before use.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, OnceCell};
use tracing::{debug, warn};

use crate::error::ProbeError;

pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ProbeOutcome<T, R> {
    /// Position of the target in the submitted list.
    pub index: usize,
    pub target: T,
    pub result: Result<R, ProbeError>,
    pub elapsed: Duration,
}

impl<T, R> ProbeOutcome<T, R> {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ParallelCollector {
    workers: usize,
    timeout: Duration,
}

impl Default for ParallelCollector {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS, DEFAULT_PROBE_TIMEOUT)
    }
}

impl ParallelCollector {
    pub fn new(workers: usize, timeout: Duration) -> Self {
        Self {
            workers: workers.max(1),
            timeout,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs `probe` once per target with at most `workers` in flight.
    ///
    /// Each probe runs in its own task under the per-probe timeout, so a hung or
    /// panicking probe fails only its own target.
    pub async fn collect<T, R, F, Fut>(&self, targets: Vec<T>, probe: F) -> Vec<ProbeOutcome<T, R>>
    where
        T: Clone + Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, ProbeError>> + Send + 'static,
    {
        let total = targets.len();
        if total == 0 {
            return Vec::new();
        }
        let originals = targets.clone();
        let queue: Arc<Mutex<VecDeque<(usize, T)>>> =
            Arc::new(Mutex::new(targets.into_iter().enumerate().collect()));
        let probe = Arc::new(probe);
        let (tx, mut rx) = mpsc::unbounded_channel::<ProbeOutcome<T, R>>();
        let width = self.workers.min(total);
        let timeout = self.timeout;

        let mut workers = Vec::with_capacity(width);
        for worker in 0..width {
            let queue = Arc::clone(&queue);
            let probe = Arc::clone(&probe);
            let tx = tx.clone();
            workers.push(tokio::spawn(async move {
                loop {
                    let next = queue.lock().ok().and_then(|mut q| q.pop_front());
                    let Some((index, target)) = next else { break };
                    let started = Instant::now();
                    let mut handle = tokio::spawn((*probe)(target.clone()));
                    let result = match tokio::time::timeout(timeout, &mut handle).await {
                        Err(_) => {
                            handle.abort();
                            Err(ProbeError::Timeout(timeout))
                        }
                        Ok(Err(join)) => Err(ProbeError::Panicked(join.to_string())),
                        Ok(Ok(r)) => r,
                    };
                    debug!(worker, index, ok = result.is_ok(), "probe finished");
                    let outcome = ProbeOutcome {
                        index,
                        target,
                        result,
                        elapsed: started.elapsed(),
                    };
                    if tx.send(outcome).is_err() {
                        break;
                    }
                }
            }));
        }
        drop(tx);

        let mut outcomes = Vec::with_capacity(total);
        while let Some(o) = rx.recv().await {
            outcomes.push(o);
        }
        for w in workers {
            if let Err(e) = w.await {
                warn!("collector worker died: {e}");
            }
        }

        // A worker that died mid-target still owes that target an outcome.
        if outcomes.len() < total {
            let seen: HashSet<usize> = outcomes.iter().map(|o| o.index).collect();
            for (index, target) in originals.into_iter().enumerate() {
                if !seen.contains(&index) {
                    outcomes.push(ProbeOutcome {
                        index,
                        target,
                        result: Err(ProbeError::Panicked("worker exited before reporting".into())),
                        elapsed: Duration::ZERO,
                    });
                }
            }
        }
        outcomes
    }
}

/// Re-keys unordered outcomes by target identity.
pub fn outcomes_by_key<T, R, K, F>(outcomes: Vec<ProbeOutcome<T, R>>, key: F) -> BTreeMap<K, ProbeOutcome<T, R>>
where
    K: Ord,
    F: Fn(&T) -> K,
{
    outcomes.into_iter().map(|o| (key(&o.target), o)).collect()
}

/// Process-wide list of relevant sensor records, discovered once.
///
/// Concurrent first callers wait for a single population; a failed population
/// is not cached, so the next caller tries again. Readers only ever get a copy.
#[derive(Debug)]
pub struct SensorIndexCache<T> {
    cell: OnceCell<Vec<T>>,
    populations: AtomicUsize,
}

impl<T> Default for SensorIndexCache<T> {
    fn default() -> Self {
        Self {
            cell: OnceCell::new(),
            populations: AtomicUsize::new(0),
        }
    }
}

impl<T: Clone> SensorIndexCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_populate<E, F, Fut>(&self, populate: F) -> Result<Vec<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<T>, E>>,
    {
        let records = self
            .cell
            .get_or_try_init(|| async {
                self.populations.fetch_add(1, Ordering::AcqRel);
                populate().await
            })
            .await?;
        Ok(records.clone())
    }

    /// Copy of the cached records, if populated.
    pub fn indices(&self) -> Option<Vec<T>> {
        self.cell.get().cloned()
    }

    /// How many times population ran (successful or not).
    pub fn populations(&self) -> usize {
        self.populations.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_target_reports_even_when_some_fail() {
        let collector = ParallelCollector::new(3, Duration::from_secs(2));
        let targets: Vec<u32> = (0..10).collect();
        let outcomes = collector
            .collect(targets, |t| async move {
                // Reverse the completion order relative to submission.
                tokio::time::sleep(Duration::from_millis(u64::from(10 - t) * 3)).await;
                if t % 3 == 0 {
                    Err(ProbeError::Unreachable(format!("target {t}")))
                } else {
                    Ok(t * 10)
                }
            })
            .await;
        assert_eq!(outcomes.len(), 10);
        let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
        assert_eq!(failed, 4); // 0, 3, 6, 9
        let by_key = outcomes_by_key(outcomes, |t| *t);
        assert_eq!(by_key.len(), 10);
        assert_eq!(by_key[&4].result.as_ref().ok(), Some(&40));
        assert!(by_key[&9].result.is_err());
    }

    #[tokio::test]
    async fn panicking_probe_fails_only_its_target() {
        let collector = ParallelCollector::new(2, Duration::from_secs(2));
        let outcomes = collector
            .collect(vec![1u8, 2, 3], |t| async move {
                if t == 2 {
                    panic!("probe blew up");
                }
                Ok(t)
            })
            .await;
        assert_eq!(outcomes.len(), 3);
        let by_key = outcomes_by_key(outcomes, |t| *t);
        assert!(matches!(by_key[&2].result, Err(ProbeError::Panicked(_))));
        assert!(by_key[&1].is_ok() && by_key[&3].is_ok());
    }

    #[tokio::test]
    async fn slow_target_times_out_without_blocking_siblings() {
        let collector = ParallelCollector::new(2, Duration::from_millis(100));
        let outcomes = collector
            .collect(vec!["slow", "fast-a", "fast-b"], |t| async move {
                if t == "slow" {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
                Ok(t.len())
            })
            .await;
        assert_eq!(outcomes.len(), 3);
        let by_key = outcomes_by_key(outcomes, |t| t.to_string());
        assert!(matches!(by_key["slow"].result, Err(ProbeError::Timeout(_))));
        assert_eq!(by_key["fast-a"].result.as_ref().ok(), Some(&6));
    }

    #[tokio::test]
    async fn empty_target_list_returns_nothing() {
        let collector = ParallelCollector::default();
        let outcomes = collector
            .collect(Vec::<u8>::new(), |t| async move { Ok(t) })
            .await;
        assert!(outcomes.is_empty());
        assert_eq!(ParallelCollector::new(0, Duration::from_secs(1)).workers(), 1);
    }

    #[tokio::test]
    async fn cache_populates_once_under_concurrency() {
        let cache = Arc::new(SensorIndexCache::<u16>::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_populate(|| async {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok::<_, ProbeError>(vec![0x30, 0x31, 0x42])
                    })
                    .await
            }));
        }
        for h in handles {
            let got = h.await.unwrap().unwrap();
            assert_eq!(got, vec![0x30, 0x31, 0x42]);
        }
        assert_eq!(cache.populations(), 1);
        assert_eq!(cache.indices(), Some(vec![0x30, 0x31, 0x42]));
    }

    #[tokio::test]
    async fn failed_population_is_retried() {
        let cache = SensorIndexCache::<u16>::new();
        let first: Result<Vec<u16>, ProbeError> = cache
            .get_or_populate(|| async { Err(ProbeError::Parse("sdr".into())) })
            .await;
        assert!(first.is_err());
        assert!(cache.indices().is_none());
        let second = cache
            .get_or_populate(|| async { Ok::<_, ProbeError>(vec![7]) })
            .await
            .unwrap();
        assert_eq!(second, vec![7]);
        assert_eq!(cache.populations(), 2);
    }
}
