//! Hardware telemetry collection for hwcheck.
//!
//! Providers turn host tools and sysfs into raw readings; the normalizer turns
//! those into entities with canonical positions; the parallel collector and
//! ping retry loop do the per-target probing.

pub mod collector;
pub mod error;
pub mod exec;
pub mod normalize;
pub mod ping;
pub mod providers;
pub mod sampler;
pub mod status;
pub mod types;

pub use collector::{outcomes_by_key, ParallelCollector, ProbeOutcome, SensorIndexCache};
pub use error::{CollectError, ProbeError, ProviderError};
pub use exec::{Exec, ExecOutput, ScriptedExec, SharedExec, SystemExec};
pub use normalize::{Normalizer, POSITION_MAX_LEN};
pub use ping::{ping_with_retries, PingSpec};
pub use providers::{Provider, ProviderChain, ProviderContext};
pub use sampler::{CollectionPass, PingPlan, Sampler};
pub use status::{HealthStatus, ProviderStatus};
pub use types::{Category, Detail, Domain, Entity, PingStats, RawReading, Subtype, Thresholds};
