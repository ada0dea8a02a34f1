//! Folds per-requirement results into one run verdict.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::matcher::{Issue, RequirementResult, Severity};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResult {
    pub status: Severity,
    pub issues: Vec<Issue>,
    pub requirements: Vec<RequirementResult>,
}

/// Status is the maximum over every requirement; issues keep requirement order.
pub fn aggregate(requirements: Vec<RequirementResult>) -> RunResult {
    let status = requirements
        .iter()
        .fold(Severity::Ok, |s, r| s.escalate(r.status));
    let issues = requirements
        .iter()
        .flat_map(|r| r.issues.iter().cloned())
        .collect();
    RunResult {
        status,
        issues,
        requirements,
    }
}

impl RunResult {
    pub fn passed(&self) -> bool {
        !self.status.is_failure()
    }

    /// Worst severity seen per position across all requirements.
    pub fn position_severity(&self) -> BTreeMap<String, Severity> {
        let mut out: BTreeMap<String, Severity> = BTreeMap::new();
        for e in self.requirements.iter().flat_map(|r| r.entities.iter()) {
            let s = out.entry(e.position.clone()).or_default();
            *s = s.escalate(e.status);
        }
        out
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }

    /// 0 when everything passed, 1 on any validation failure.
    pub fn exit_code(&self) -> i32 {
        if self.passed() {
            0
        } else {
            1
        }
    }
}
