use std::fmt::Write as _;

use taskmaster_core::cross_tag::CrossTagMoveResult;
use taskmaster_core::fix::FixReport;
use taskmaster_core::move_task::MoveRecord;
use taskmaster_core::task_ops::{RemovalReport, TagSummary};
use taskmaster_core::validate::ValidationReport;
use taskmaster_core::DependencyConflict;

pub fn format_validation(tag: &str, report: &ValidationReport) -> String {
    if report.is_valid() {
        return format!("All dependencies in tag '{tag}' are valid.\n");
    }
    let mut out = format!(
        "Found {} dependency issue(s) in tag '{tag}':\n",
        report.issues.len()
    );
    for issue in &report.issues {
        let _ = writeln!(out, "  [{}] {}", issue.code.as_str(), issue.detail);
    }
    out
}

pub fn format_fix(tag: &str, report: &FixReport, dry_run: bool) -> String {
    if report.is_empty() {
        return format!("No invalid dependencies in tag '{tag}'.\n");
    }
    let verb = if dry_run { "Would remove" } else { "Removed" };
    let mut out = String::new();
    for change in &report.removed {
        let _ = writeln!(
            out,
            "{verb} {} -> {} ({})",
            change.address,
            change.edge,
            change.reason.as_str()
        );
    }
    let verb = if dry_run { "Would collapse" } else { "Collapsed" };
    for change in &report.collapsed {
        let _ = writeln!(
            out,
            "{verb} duplicate {} -> {}",
            change.address, change.edge
        );
    }
    let _ = writeln!(
        out,
        "{} change(s) in tag '{tag}'{}",
        report.total(),
        if dry_run { " (dry run, nothing saved)" } else { "" }
    );
    out
}

pub fn format_moves(tag: &str, records: &[MoveRecord]) -> String {
    let mut out = String::new();
    for record in records {
        if record.skipped {
            let _ = writeln!(out, "Skipped {}: source and destination are the same", record.from);
        } else {
            let _ = writeln!(out, "Moved {} to {} in tag '{tag}'", record.from, record.to);
        }
    }
    out
}

pub fn format_cross_tag(source: &str, target: &str, result: &CrossTagMoveResult) -> String {
    let moved: Vec<String> = result.moved.iter().map(ToString::to_string).collect();
    let mut out = format!(
        "Moved {} task(s) from '{source}' to '{target}': {}\n",
        moved.len(),
        moved.join(", ")
    );
    for tip in &result.tips {
        let _ = writeln!(out, "  tip: {tip}");
    }
    out
}

pub fn format_conflicts(conflicts: &[DependencyConflict]) -> String {
    let mut out = String::new();
    for conflict in conflicts {
        let _ = writeln!(
            out,
            "  {} depends on {}",
            conflict.dependent, conflict.prerequisite
        );
    }
    out.push_str("Use --with-dependencies to move prerequisites too, or --ignore-dependencies to drop these edges.\n");
    out
}

pub fn format_removal(report: &RemovalReport) -> String {
    let removed: Vec<String> = report.removed.iter().map(ToString::to_string).collect();
    let mut out = format!("Removed {}\n", removed.join(", "));
    if !report.updated.is_empty() {
        let updated: Vec<String> = report.updated.iter().map(ToString::to_string).collect();
        let _ = writeln!(out, "Cleaned dependencies of {}", updated.join(", "));
    }
    out
}

pub fn format_tags(tags: &[TagSummary]) -> String {
    let mut out = String::new();
    for tag in tags {
        let marker = if tag.current { "*" } else { " " };
        let _ = writeln!(
            out,
            "{marker} {:<20} {:>4} tasks {:>4} done",
            tag.name, tag.tasks, tag.completed
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskmaster_core::validate::{DependencyIssue, IssueCode};
    use taskmaster_core::Address;

    #[test]
    fn validation_lists_each_issue() {
        let report = ValidationReport {
            issues: vec![DependencyIssue {
                address: Address::Task(2),
                code: IssueCode::Dangling,
                dependency: Some(Address::Task(9)),
                detail: "2 depends on missing task 9".to_string(),
            }],
        };
        let text = format_validation("main", &report);
        assert!(text.contains("1 dependency issue(s)"));
        assert!(text.contains("[DANGLING] 2 depends on missing task 9"));
    }

    #[test]
    fn tags_mark_current() {
        let tags = vec![TagSummary {
            name: "main".to_string(),
            tasks: 3,
            completed: 1,
            current: true,
            description: None,
        }];
        assert!(format_tags(&tags).starts_with("* main"));
    }
}
