//! Policy checks over collected hardware entities.
//!
//! `hwcheck_probe` collects and normalizes; this crate loads the operator
//! policy, matches requirements, aggregates the verdict and renders it.

pub mod aggregate;
pub mod layout;
pub mod matcher;
pub mod policy;
pub mod ui;

pub use aggregate::{aggregate, RunResult};
pub use layout::{Row, RowSpec, Visualization};
pub use matcher::{evaluate, evaluate_requirement, CheckKind, Issue, RequirementResult, Severity};
pub use policy::{ConfigError, PolicyFile, Requirement, Settings};
