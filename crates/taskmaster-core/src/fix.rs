use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::Address;
use crate::graph::DependencyGraph;
use crate::task::Workspace;
use crate::validate::IssueCode;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FixError {
    #[error("Malformed workspace: {0}")]
    Malformed(String),
}

impl FixError {
    pub fn code(&self) -> &'static str {
        "MALFORMED_WORKSPACE"
    }
}

/// One edge the fixer removed or collapsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeChange {
    pub address: Address,
    pub edge: Address,
    pub reason: IssueCode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FixReport {
    pub removed: Vec<EdgeChange>,
    pub collapsed: Vec<EdgeChange>,
}

impl FixReport {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.collapsed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.removed.len() + self.collapsed.len()
    }

    pub fn count(&self, reason: IssueCode) -> usize {
        self.removed
            .iter()
            .chain(self.collapsed.iter())
            .filter(|change| change.reason == reason)
            .count()
    }
}

/// Repairs every invalid edge in `ws`: dangling and self edges are dropped,
/// duplicates collapse to their first occurrence, and each cycle loses the
/// edge leaving its highest node.
pub fn fix_dependencies(ws: &mut Workspace) -> Result<FixReport, FixError> {
    ensure_well_formed(ws)?;

    let mut graph = DependencyGraph::from_workspace(ws);
    let mut report = FixReport::default();

    let nodes: Vec<Address> = graph.nodes().to_vec();
    for node in nodes {
        let deps = graph.dependencies(node).to_vec();
        let mut kept = Vec::with_capacity(deps.len());
        let mut seen: HashSet<Address> = HashSet::new();
        let mut reported: HashSet<Address> = HashSet::new();
        for dep in deps {
            if !graph.exists(dep) {
                if reported.insert(dep) {
                    report.removed.push(EdgeChange {
                        address: node,
                        edge: dep,
                        reason: IssueCode::Dangling,
                    });
                }
                continue;
            }
            if dep == node {
                if reported.insert(dep) {
                    report.removed.push(EdgeChange {
                        address: node,
                        edge: dep,
                        reason: IssueCode::SelfDependency,
                    });
                }
                continue;
            }
            if !seen.insert(dep) {
                if reported.insert(dep) {
                    report.collapsed.push(EdgeChange {
                        address: node,
                        edge: dep,
                        reason: IssueCode::Duplicate,
                    });
                }
                continue;
            }
            kept.push(dep);
        }
        graph.set_dependencies(node, kept);
    }

    while let Some(cycle) = graph.cycles().into_iter().next() {
        let Some((pos, node)) = cycle.iter().enumerate().max_by_key(|(_, addr)| **addr) else {
            break;
        };
        let node = *node;
        let successor = cycle[(pos + 1) % cycle.len()];
        if !graph.remove_edge(node, successor) {
            return Err(FixError::Malformed(format!(
                "cycle edge {} -> {} not present",
                node, successor
            )));
        }
        report.removed.push(EdgeChange {
            address: node,
            edge: successor,
            reason: IssueCode::Cycle,
        });
    }

    if !report.is_empty() {
        graph.apply_to(ws);
        ws.touch();
    }
    Ok(report)
}

fn ensure_well_formed(ws: &Workspace) -> Result<(), FixError> {
    if let Some(task) = ws.tasks.iter().find(|task| task.id == 0) {
        return Err(FixError::Malformed(format!(
            "task '{}' has id 0",
            task.title
        )));
    }
    let index = ws.index();
    if let Some(dup) = index.duplicates().first() {
        return Err(FixError::Malformed(format!("duplicate id {}", dup)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Task;
    use crate::validate::validate_dependencies;
    use pretty_assertions::assert_eq;

    fn task(id: u32, deps: &[u32]) -> Task {
        let mut task = Task::new(id, format!("Task {}", id));
        task.dependencies = deps.iter().map(|dep| Address::Task(*dep)).collect();
        task
    }

    #[test]
    fn removes_dangling_and_self_edges() {
        let mut ws = Workspace::with_tasks(vec![task(1, &[1, 2]), task(2, &[7])]);
        let report = fix_dependencies(&mut ws).expect("fix");
        assert_eq!(
            report.removed,
            vec![
                EdgeChange {
                    address: Address::Task(1),
                    edge: Address::Task(1),
                    reason: IssueCode::SelfDependency,
                },
                EdgeChange {
                    address: Address::Task(2),
                    edge: Address::Task(7),
                    reason: IssueCode::Dangling,
                },
            ]
        );
        assert_eq!(ws.tasks[0].dependencies, vec![Address::Task(2)]);
        assert!(ws.tasks[1].dependencies.is_empty());
    }

    #[test]
    fn breaks_cycle_at_highest_node() {
        let mut ws = Workspace::with_tasks(vec![task(1, &[2]), task(2, &[3]), task(3, &[1])]);
        let report = fix_dependencies(&mut ws).expect("fix");
        assert_eq!(
            report.removed,
            vec![EdgeChange {
                address: Address::Task(3),
                edge: Address::Task(1),
                reason: IssueCode::Cycle,
            }]
        );
        assert!(validate_dependencies(&ws).is_valid());
    }

    #[test]
    fn overlapping_cycles_are_all_broken() {
        let mut ws = Workspace::with_tasks(vec![
            task(1, &[2]),
            task(2, &[3, 1]),
            task(3, &[1, 2]),
        ]);
        let report = fix_dependencies(&mut ws).expect("fix");
        assert!(report.count(IssueCode::Cycle) >= 2);
        assert!(DependencyGraph::from_workspace(&ws).cycles().is_empty());
    }

    #[test]
    fn rejects_duplicate_task_ids() {
        let mut ws = Workspace::with_tasks(vec![task(1, &[]), task(1, &[])]);
        assert!(matches!(
            fix_dependencies(&mut ws),
            Err(FixError::Malformed(_))
        ));
    }

    #[test]
    fn untouched_workspace_keeps_metadata() {
        let mut ws = Workspace::with_tasks(vec![task(1, &[]), task(2, &[1])]);
        let report = fix_dependencies(&mut ws).expect("fix");
        assert!(report.is_empty());
        assert_eq!(ws.metadata.updated, None);
    }
}
