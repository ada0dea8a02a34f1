//! Plain line output: entity tables, issue lists and the run summary.

use std::io::{self, IsTerminal, Write};

use crossterm::style::Stylize;
use hwcheck_probe::{Entity, HealthStatus};

use crate::aggregate::RunResult;
use crate::matcher::Severity;
use crate::ui::theme;

fn paint(text: &str, severity: Severity, color: bool) -> String {
    if color {
        text.with(theme::term_color(severity)).to_string()
    } else {
        text.to_string()
    }
}

pub fn color_enabled() -> bool {
    io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none()
}

fn status_severity(e: &Entity) -> Severity {
    match e.status {
        _ if !e.present => Severity::Missing,
        HealthStatus::Ok => Severity::Ok,
        HealthStatus::Warning | HealthStatus::Unknown => Severity::Warning,
        HealthStatus::Critical => Severity::Error,
        HealthStatus::NotAvailable => Severity::Missing,
    }
}

pub fn entity_lines(entities: &[Entity], color: bool) -> Vec<String> {
    let mut out = vec![format!(
        "{:<12}  {:<8}  {:<11}  {:>10}  {:<8}  {}",
        "POSITION", "CATEGORY", "SUBTYPE", "VALUE", "STATUS", "NAME"
    )];
    for e in entities {
        let status = format!("{:<8}", e.status.as_str());
        out.push(format!(
            "{:<12}  {:<8}  {:<11}  {:>10}  {}  {}",
            e.position,
            e.category.as_str(),
            e.subtype.as_str(),
            e.display_value(),
            paint(&status, status_severity(e), color),
            e.raw_name
        ));
    }
    out
}

pub fn issue_lines(run: &RunResult, color: bool) -> Vec<String> {
    run.issues
        .iter()
        .map(|i| {
            let tag = format!("[{}]", i.severity.as_str().to_ascii_uppercase());
            format!(
                "{} {}: {}",
                paint(&tag, i.severity, color),
                i.requirement,
                i.message
            )
        })
        .collect()
}

pub fn summary_line(run: &RunResult, color: bool) -> String {
    let verdict = if run.passed() { "PASS" } else { "FAIL" };
    format!(
        "{} {} requirement(s), {} error(s), {} warning(s), {} missing",
        paint(verdict, run.status, color),
        run.requirements.len(),
        run.count(Severity::Error),
        run.count(Severity::Warning),
        run.count(Severity::Missing),
    )
}

pub fn print_lines(lines: &[String]) -> io::Result<()> {
    let mut out = io::stdout().lock();
    for l in lines {
        writeln!(out, "{l}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::matcher::{CheckKind, Issue, RequirementResult};
    use hwcheck_probe::{Category, Subtype};

    #[test]
    fn uncolored_issue_lines_carry_context() {
        let run = aggregate(vec![RequirementResult {
            name: "fans".into(),
            status: Severity::Error,
            issues: vec![Issue {
                severity: Severity::Error,
                requirement: "fans".into(),
                position: Some("FAN2".into()),
                check: CheckKind::Range,
                message: "FAN2: 300RPM below minimum 1000RPM".into(),
            }],
            entities: Vec::new(),
        }]);
        assert_eq!(
            issue_lines(&run, false),
            vec!["[ERROR] fans: FAN2: 300RPM below minimum 1000RPM"]
        );
        assert!(summary_line(&run, false).starts_with("FAIL 1 requirement(s), 1 error(s)"));
    }

    #[test]
    fn absent_entities_list_as_missing() {
        let lines = entity_lines(&[Entity::absent("FAN3", Category::Chassis, Subtype::Fan)], false);
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("FAN3"));
        assert!(lines[1].contains("N/A"));
    }
}
