//! Raw readings replayed from a JSON file instead of live hardware.
//!
//! Accepts either a bare array of readings or `{"domain": "...", "readings": [...]}`.

use futures::future::BoxFuture;
use serde::Deserialize;
use std::path::PathBuf;

use super::{Provider, ProviderContext};
use crate::error::ProviderError;
use crate::types::{Domain, RawReading};

#[derive(Deserialize)]
#[serde(untagged)]
enum ReplayFile {
    Document {
        #[serde(default)]
        domain: Option<Domain>,
        readings: Vec<RawReading>,
    },
    List(Vec<RawReading>),
}

pub struct ReplayProvider {
    domain: Domain,
    path: PathBuf,
}

impl ReplayProvider {
    pub fn new(domain: Domain, path: impl Into<PathBuf>) -> Self {
        Self {
            domain,
            path: path.into(),
        }
    }

    fn error(&self, reason: impl ToString) -> ProviderError {
        ProviderError::Replay {
            path: self.path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn parse(&self, text: &str) -> Result<Vec<RawReading>, ProviderError> {
        match serde_json::from_str::<ReplayFile>(text).map_err(|e| self.error(e))? {
            ReplayFile::List(readings) => Ok(readings),
            ReplayFile::Document { domain, readings } => match domain {
                Some(d) if d != self.domain => Err(self.error(format!(
                    "recorded for {d}, not {}",
                    self.domain
                ))),
                _ => Ok(readings),
            },
        }
    }
}

impl Provider for ReplayProvider {
    fn name(&self) -> &str {
        "replay"
    }

    fn is_live(&self) -> bool {
        false
    }

    fn collect<'a>(
        &'a self,
        _ctx: &'a ProviderContext,
    ) -> BoxFuture<'a, Result<Vec<RawReading>, ProviderError>> {
        Box::pin(async move {
            let text = tokio::fs::read_to_string(&self.path)
                .await
                .map_err(|e| self.error(e))?;
            self.parse(&text)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::ProviderStatus;

    #[test]
    fn both_layouts_parse() {
        let p = ReplayProvider::new(Domain::Power, "power.json");
        let list = p
            .parse(r#"[{"name":"PSU1 VIN","value":230.0,"unit":"Volts","status":{"source":"ipmi","value":"ok"}}]"#)
            .unwrap();
        assert_eq!(list[0].status, ProviderStatus::Ipmi("ok".into()));
        let doc = p
            .parse(r#"{"domain":"power","readings":[{"name":"12V","value":12.1,"unit":"V"}]}"#)
            .unwrap();
        assert_eq!(doc[0].name, "12V");
        assert_eq!(doc[0].status, ProviderStatus::default());
    }

    #[test]
    fn wrong_domain_and_garbage_are_replay_errors() {
        let p = ReplayProvider::new(Domain::Fan, "x.json");
        let err = p.parse(r#"{"domain":"power","readings":[]}"#).unwrap_err();
        assert!(err.to_string().contains("recorded for power"));
        assert!(matches!(p.parse("{"), Err(ProviderError::Replay { .. })));
    }
}
