use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::graph::DependencyGraph;
use crate::task::Workspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    Dangling,
    #[serde(rename = "SELF")]
    SelfDependency,
    Duplicate,
    Cycle,
}

impl IssueCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueCode::Dangling => "DANGLING",
            IssueCode::SelfDependency => "SELF",
            IssueCode::Duplicate => "DUPLICATE",
            IssueCode::Cycle => "CYCLE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyIssue {
    pub address: Address,
    pub code: IssueCode,
    /// The offending edge target; absent for cycle membership.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependency: Option<Address>,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ValidationReport {
    pub issues: Vec<DependencyIssue>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn count(&self, code: IssueCode) -> usize {
        self.issues.iter().filter(|issue| issue.code == code).count()
    }

    pub fn issues_for(&self, address: Address) -> impl Iterator<Item = &DependencyIssue> {
        self.issues
            .iter()
            .filter(move |issue| issue.address == address)
    }
}

/// Reports every dangling, self, duplicate and cyclic dependency in `ws`.
/// Never mutates the workspace.
pub fn validate_dependencies(ws: &Workspace) -> ValidationReport {
    let graph = DependencyGraph::from_workspace(ws);
    let mut issues = Vec::new();

    for node in graph.nodes() {
        let node = *node;
        let mut seen: HashSet<Address> = HashSet::new();
        let mut duplicated: HashSet<Address> = HashSet::new();
        for dep in graph.dependencies(node) {
            let dep = *dep;
            if !seen.insert(dep) {
                if duplicated.insert(dep) {
                    issues.push(DependencyIssue {
                        address: node,
                        code: IssueCode::Duplicate,
                        dependency: Some(dep),
                        detail: format!("{} lists dependency {} more than once", node, dep),
                    });
                }
                continue;
            }
            if dep == node {
                issues.push(DependencyIssue {
                    address: node,
                    code: IssueCode::SelfDependency,
                    dependency: Some(dep),
                    detail: format!("{} depends on itself", node),
                });
            } else if !graph.exists(dep) {
                issues.push(DependencyIssue {
                    address: node,
                    code: IssueCode::Dangling,
                    dependency: Some(dep),
                    detail: format!("{} depends on missing task {}", node, dep),
                });
            }
        }
    }

    let mut reported: HashSet<Address> = HashSet::new();
    for cycle in graph.cycles() {
        let path = render_cycle(&cycle);
        for node in &cycle {
            if reported.insert(*node) {
                issues.push(DependencyIssue {
                    address: *node,
                    code: IssueCode::Cycle,
                    dependency: None,
                    detail: format!("{} is part of dependency cycle {}", node, path),
                });
            }
        }
    }

    ValidationReport { issues }
}

pub(crate) fn render_cycle(cycle: &[Address]) -> String {
    let mut parts: Vec<String> = cycle.iter().map(Address::to_string).collect();
    if let Some(first) = cycle.first() {
        parts.push(first.to_string());
    }
    parts.join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Subtask, Task};
    use pretty_assertions::assert_eq;

    fn task(id: u32, deps: &[Address]) -> Task {
        let mut task = Task::new(id, format!("Task {}", id));
        task.dependencies = deps.to_vec();
        task
    }

    #[test]
    fn clean_workspace_is_valid() {
        let ws = Workspace::with_tasks(vec![task(1, &[]), task(2, &[Address::Task(1)])]);
        assert!(validate_dependencies(&ws).is_valid());
    }

    #[test]
    fn reports_each_violation_kind() {
        let ws = Workspace::with_tasks(vec![
            task(1, &[Address::Task(1)]),
            task(2, &[Address::Task(1), Address::Task(1), Address::Task(9)]),
        ]);
        let report = validate_dependencies(&ws);
        let codes: Vec<(Address, IssueCode)> = report
            .issues
            .iter()
            .map(|issue| (issue.address, issue.code))
            .collect();
        assert_eq!(
            codes,
            vec![
                (Address::Task(1), IssueCode::SelfDependency),
                (Address::Task(2), IssueCode::Duplicate),
                (Address::Task(2), IssueCode::Dangling),
            ]
        );
    }

    #[test]
    fn cycle_members_are_reported_once() {
        let ws = Workspace::with_tasks(vec![
            task(1, &[Address::Task(2)]),
            task(2, &[Address::Task(3), Address::Task(1)]),
            task(3, &[Address::Task(1)]),
        ]);
        let report = validate_dependencies(&ws);
        assert_eq!(report.count(IssueCode::Cycle), 3);
        for id in 1..=3 {
            assert_eq!(
                report
                    .issues_for(Address::Task(id))
                    .filter(|issue| issue.code == IssueCode::Cycle)
                    .count(),
                1
            );
        }
    }

    #[test]
    fn subtask_edges_are_checked() {
        let mut parent = task(1, &[]);
        let mut child = Subtask::new(1, "child");
        child.dependencies = vec![Address::subtask(1, 4)];
        parent.subtasks.push(child);
        let report = validate_dependencies(&Workspace::with_tasks(vec![parent]));
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].address, Address::subtask(1, 1));
        assert_eq!(report.issues[0].code, IssueCode::Dangling);
    }

    #[test]
    fn codes_serialize_as_wire_names() {
        let json = serde_json::to_string(&IssueCode::SelfDependency).expect("json");
        assert_eq!(json, "\"SELF\"");
        let json = serde_json::to_string(&IssueCode::Dangling).expect("json");
        assert_eq!(json, "\"DANGLING\"");
    }
}
