use serde::Serialize;
use thiserror::Error;

use crate::address::{resolve, Address, ResolveError};
use crate::graph::DependencyGraph;
use crate::task::{TaggedDocument, Workspace};
use crate::validate::render_cycle;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskOpError {
    #[error("Task {0} not found")]
    NotFound(Address),
    #[error("Task {0} cannot depend on itself")]
    SelfDependency(Address),
    #[error("Task {node} already depends on {dependency}")]
    AlreadyExists { node: Address, dependency: Address },
    #[error("Adding {dependency} to {node} would create a cycle: {path}")]
    WouldCreateCycle {
        node: Address,
        dependency: Address,
        path: String,
    },
    #[error("Task {node} does not depend on {dependency}")]
    NotADependency { node: Address, dependency: Address },
}

impl From<ResolveError> for TaskOpError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::NotFound(addr) => TaskOpError::NotFound(addr),
        }
    }
}

impl TaskOpError {
    pub fn code(&self) -> &'static str {
        match self {
            TaskOpError::NotFound(_) => "TASK_NOT_FOUND",
            TaskOpError::SelfDependency(_) => "SELF_DEPENDENCY",
            TaskOpError::AlreadyExists { .. } => "DEPENDENCY_EXISTS",
            TaskOpError::WouldCreateCycle { .. } => "WOULD_CREATE_CYCLE",
            TaskOpError::NotADependency { .. } => "NOT_A_DEPENDENCY",
        }
    }
}

pub fn add_dependency(
    ws: &mut Workspace,
    node: Address,
    dependency: Address,
) -> Result<(), TaskOpError> {
    resolve(ws, node)?;
    resolve(ws, dependency)?;
    if node == dependency {
        return Err(TaskOpError::SelfDependency(node));
    }
    let graph = DependencyGraph::from_workspace(ws);
    if graph.has_edge(node, dependency) {
        return Err(TaskOpError::AlreadyExists { node, dependency });
    }
    if graph.reaches(dependency, node) {
        let path = cycle_path(&graph, dependency, node);
        return Err(TaskOpError::WouldCreateCycle {
            node,
            dependency,
            path,
        });
    }
    if let Some(deps) = ws.dependencies_mut(node) {
        deps.push(dependency);
        deps.sort();
    }
    ws.touch();
    Ok(())
}

/// Path `node -> dependency -> ... -> node` that the new edge would close.
fn cycle_path(graph: &DependencyGraph, from: Address, to: Address) -> String {
    let mut parents: Vec<(Address, Address)> = Vec::new();
    let mut pending = vec![from];
    let mut seen = vec![from];
    while let Some(current) = pending.pop() {
        if current == to {
            break;
        }
        for dep in graph.dependencies(current) {
            if !seen.contains(dep) {
                seen.push(*dep);
                parents.push((*dep, current));
                pending.push(*dep);
            }
        }
    }
    let mut chain = vec![to];
    let mut cursor = to;
    while cursor != from {
        match parents.iter().find(|(child, _)| *child == cursor) {
            Some((_, parent)) => {
                cursor = *parent;
                chain.push(cursor);
            }
            None => break,
        }
    }
    chain.reverse();
    let mut cycle = vec![to];
    cycle.extend(chain.into_iter().filter(|addr| *addr != to));
    render_cycle(&cycle)
}

pub fn remove_dependency(
    ws: &mut Workspace,
    node: Address,
    dependency: Address,
) -> Result<(), TaskOpError> {
    if !resolve(ws, node)?.dependencies().contains(&dependency) {
        return Err(TaskOpError::NotADependency { node, dependency });
    }
    if let Some(deps) = ws.dependencies_mut(node) {
        deps.retain(|dep| *dep != dependency);
    }
    ws.touch();
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct RemovalReport {
    /// The removed node followed by any subtasks it owned.
    pub removed: Vec<Address>,
    /// Nodes that lost a dependency on a removed address.
    pub updated: Vec<Address>,
}

/// Deletes a task (with its subtasks) or a single subtask and strips every
/// dependency on the removed addresses.
pub fn remove_task(ws: &mut Workspace, addr: Address) -> Result<RemovalReport, TaskOpError> {
    let removed = match addr {
        Address::Task(id) => {
            let task = ws.take_task(id).ok_or(TaskOpError::NotFound(addr))?;
            let mut removed = vec![addr];
            removed.extend(
                task.subtasks
                    .iter()
                    .map(|subtask| Address::subtask(id, subtask.id)),
            );
            removed
        }
        Address::Subtask { parent, sub } => {
            ws.task_mut(parent)
                .and_then(|task| task.take_subtask(sub))
                .ok_or(TaskOpError::NotFound(addr))?;
            vec![addr]
        }
    };

    let mut graph = DependencyGraph::from_workspace(ws);
    let mut updated = Vec::new();
    for gone in &removed {
        for node in graph.remove_address(*gone) {
            if !updated.contains(&node) {
                updated.push(node);
            }
        }
    }
    graph.apply_to(ws);
    ws.touch();
    Ok(RemovalReport { removed, updated })
}

/// One past the highest task id, or `None` when the highest id is `u32::MAX`.
pub fn next_available_id(ws: &Workspace) -> Option<u32> {
    ws.tasks
        .iter()
        .map(|task| task.id)
        .max()
        .unwrap_or(0)
        .checked_add(1)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagSummary {
    pub name: String,
    pub tasks: usize,
    pub completed: usize,
    pub current: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

pub fn list_tags(doc: &TaggedDocument, current: &str) -> Vec<TagSummary> {
    doc.tags
        .iter()
        .map(|(name, ws)| TagSummary {
            name: name.clone(),
            tasks: ws.tasks.len(),
            completed: ws.completed_count(),
            current: name == current,
            description: ws.metadata.description.clone(),
        })
        .collect()
}
