//! Error types for probes, providers and whole collection passes.

use std::time::Duration;
use thiserror::Error;

/// Failure of a single probe against a single target.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProbeError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("failed to run {program}: {reason}")]
    Spawn { program: String, reason: String },
    #[error("{program} exited with status {code:?}: {stderr}")]
    ExitStatus {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("unparsable output: {0}")]
    Parse(String),
    #[error("unreachable: {0}")]
    Unreachable(String),
    #[error("probe task panicked: {0}")]
    Panicked(String),
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ProbeError {
    fn from(e: std::io::Error) -> Self {
        ProbeError::Io(e.to_string())
    }
}

/// A provider could not produce readings at all.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    #[error("{0} is not available on this host")]
    Unavailable(String),
    #[error(transparent)]
    Probe(#[from] ProbeError),
    #[error("invalid replay file {path}: {reason}")]
    Replay { path: String, reason: String },
}

/// No provider in the chain yielded any entity.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("no provider configured for {0}")]
    NoProviders(String),
    #[error("no {domain} data from any provider: {}", format_attempts(.attempts))]
    NoData {
        domain: String,
        attempts: Vec<(String, Option<ProviderError>)>,
    },
}

fn format_attempts(attempts: &[(String, Option<ProviderError>)]) -> String {
    attempts
        .iter()
        .map(|(name, err)| match err {
            Some(e) => format!("{name}: {e}"),
            None => format!("{name}: no readings"),
        })
        .collect::<Vec<_>>()
        .join("; ")
}
