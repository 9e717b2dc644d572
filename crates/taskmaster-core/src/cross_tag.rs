//! Moving tasks between tags.
//!
//! Task ids are preserved across tags, so a move fails on collision instead of
//! renumbering. Dependency edges may not span tags at rest; every edge that a
//! move would split is a conflict, handled according to [`MovePolicy`].

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::Address;
use crate::graph::DependencyGraph;
use crate::task::{TaggedDocument, Workspace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum MovePolicy {
    /// Refuse the move when any dependency would cross tags.
    #[default]
    Strict,
    /// Bring every prerequisite along.
    WithDependencies,
    /// Move as requested and drop the edges that would cross tags.
    IgnoreDependencies,
}

impl MovePolicy {
    pub fn from_flags(with_dependencies: bool, ignore_dependencies: bool) -> Self {
        if with_dependencies {
            MovePolicy::WithDependencies
        } else if ignore_dependencies {
            MovePolicy::IgnoreDependencies
        } else {
            MovePolicy::Strict
        }
    }
}

/// An edge `dependent -> prerequisite` that a move would split across tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DependencyConflict {
    pub dependent: Address,
    pub prerequisite: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CrossTagMoveResult {
    pub moved: Vec<Address>,
    pub tips: Vec<String>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CrossTagError {
    #[error("Source and target tags are the same ('{0}')")]
    SameSourceTargetTag(String),
    #[error("Source tag '{0}' not found")]
    InvalidSourceTag(String),
    #[error("Target tag '{0}' not found")]
    InvalidTargetTag(String),
    #[error("Task {0} not found in source tag")]
    TaskNotFound(Address),
    #[error("Cannot move subtask {0} to another tag; promote it to a task first")]
    CannotMoveSubtask(Address),
    #[error("Task {id} already exists in target tag{}", tag_suffix(.target_tag))]
    TaskAlreadyExists {
        id: u32,
        target_tag: Option<String>,
    },
    #[error("Cannot move: {} cross-tag dependency conflict(s)", .conflicts.len())]
    CrossTagDependencyConflicts { conflicts: Vec<DependencyConflict> },
}

fn tag_suffix(tag: &Option<String>) -> String {
    tag.as_ref()
        .map(|tag| format!(" '{}'", tag))
        .unwrap_or_default()
}

impl CrossTagError {
    pub fn code(&self) -> &'static str {
        match self {
            CrossTagError::SameSourceTargetTag(_) => "SAME_SOURCE_TARGET_TAG",
            CrossTagError::InvalidSourceTag(_) => "INVALID_SOURCE_TAG",
            CrossTagError::InvalidTargetTag(_) => "INVALID_TARGET_TAG",
            CrossTagError::TaskNotFound(_) => "TASK_NOT_FOUND",
            CrossTagError::CannotMoveSubtask(_) => "CANNOT_MOVE_SUBTASK",
            CrossTagError::TaskAlreadyExists { .. } => "TASK_ALREADY_EXISTS",
            CrossTagError::CrossTagDependencyConflicts { .. } => "CROSS_TAG_DEPENDENCY_CONFLICTS",
        }
    }

    pub fn conflicts(&self) -> &[DependencyConflict] {
        match self {
            CrossTagError::CrossTagDependencyConflicts { conflicts } => conflicts,
            _ => &[],
        }
    }

    fn in_target(self, target: &str) -> Self {
        match self {
            CrossTagError::TaskAlreadyExists { id, .. } => CrossTagError::TaskAlreadyExists {
                id,
                target_tag: Some(target.to_string()),
            },
            other => other,
        }
    }
}

/// Moves the tasks `ids` from `src` to `dst`. Either every change is applied
/// to both workspaces or neither is touched.
pub fn move_across_tags(
    src: &mut Workspace,
    dst: &mut Workspace,
    ids: &[Address],
    policy: MovePolicy,
) -> Result<CrossTagMoveResult, CrossTagError> {
    let mut moving = resolve_ids(src, ids)?;
    ensure_no_collisions(dst, &moving)?;

    let graph = DependencyGraph::from_workspace(src);
    let mut conflicts = detect_conflicts(&graph, &moving);
    let mut tips = Vec::new();
    let mut strip: Vec<DependencyConflict> = Vec::new();

    match policy {
        MovePolicy::Strict => {
            if !conflicts.is_empty() {
                return Err(CrossTagError::CrossTagDependencyConflicts { conflicts });
            }
        }
        MovePolicy::WithDependencies => {
            moving = expand_prerequisites(&graph, dst, &moving);
            ensure_no_collisions(dst, &moving)?;
            conflicts = detect_conflicts(&graph, &moving);
            let moving_set: HashSet<u32> = moving.iter().copied().collect();
            for conflict in conflicts {
                if moving_set.contains(&conflict.dependent.task_id()) {
                    // Prerequisite stayed behind because the target already holds its task id.
                    if dst.contains(conflict.prerequisite) {
                        tips.push(format!(
                            "Task {} depends on {}, which stays in the source tag; the target tag has its own {}, unrelated to the source one, and the dependency now points at it",
                            conflict.dependent, conflict.prerequisite, conflict.prerequisite
                        ));
                    } else {
                        tips.push(format!(
                            "Removed dependency {} -> {}: {} stays in the source tag and the target tag has no {}",
                            conflict.dependent,
                            conflict.prerequisite,
                            conflict.prerequisite,
                            conflict.prerequisite
                        ));
                        strip.push(conflict);
                    }
                } else {
                    tips.push(format!(
                        "Removed dependency {} -> {}: {} stays behind while {} moves",
                        conflict.dependent,
                        conflict.prerequisite,
                        conflict.dependent,
                        conflict.prerequisite
                    ));
                    strip.push(conflict);
                }
            }
        }
        MovePolicy::IgnoreDependencies => {
            for conflict in conflicts {
                tips.push(format!(
                    "Removed cross-tag dependency {} -> {}; {} no longer depends on {}",
                    conflict.dependent,
                    conflict.prerequisite,
                    conflict.dependent,
                    conflict.prerequisite
                ));
                strip.push(conflict);
            }
        }
    }

    let mut staged_src = src.clone();
    let mut staged_dst = dst.clone();
    for conflict in &strip {
        if let Some(deps) = staged_src.dependencies_mut(conflict.dependent) {
            deps.retain(|dep| *dep != conflict.prerequisite);
        }
    }

    let moving_set: HashSet<u32> = moving.iter().copied().collect();
    let (moved_tasks, kept): (Vec<_>, Vec<_>) = staged_src
        .tasks
        .into_iter()
        .partition(|task| moving_set.contains(&task.id));
    staged_src.tasks = kept;
    let moved: Vec<Address> = moved_tasks.iter().map(|task| task.address()).collect();
    staged_dst.tasks.extend(moved_tasks);
    staged_src.touch();
    staged_dst.touch();

    *src = staged_src;
    *dst = staged_dst;
    Ok(CrossTagMoveResult { moved, tips })
}

/// Document-level entry point: validates the tag pair, then moves.
pub fn move_between_tags(
    doc: &mut TaggedDocument,
    source_tag: &str,
    target_tag: &str,
    ids: &[Address],
    policy: MovePolicy,
) -> Result<CrossTagMoveResult, CrossTagError> {
    if source_tag == target_tag {
        return Err(CrossTagError::SameSourceTargetTag(source_tag.to_string()));
    }
    if !doc.tags.contains_key(source_tag) {
        return Err(CrossTagError::InvalidSourceTag(source_tag.to_string()));
    }
    if !doc.tags.contains_key(target_tag) {
        return Err(CrossTagError::InvalidTargetTag(target_tag.to_string()));
    }
    let mut src = doc.tags.remove(source_tag).unwrap_or_default();
    let mut dst = doc.tags.remove(target_tag).unwrap_or_default();
    let result = move_across_tags(&mut src, &mut dst, ids, policy);
    doc.tags.insert(source_tag.to_string(), src);
    doc.tags.insert(target_tag.to_string(), dst);
    result.map_err(|err| err.in_target(target_tag))
}

fn resolve_ids(src: &Workspace, ids: &[Address]) -> Result<Vec<u32>, CrossTagError> {
    let index = src.index();
    let mut resolved = Vec::with_capacity(ids.len());
    for addr in ids {
        if let Address::Subtask { .. } = addr {
            return Err(CrossTagError::CannotMoveSubtask(*addr));
        }
        let id = index
            .resolve(src, *addr)
            .map_err(|_| CrossTagError::TaskNotFound(*addr))?
            .address()
            .task_id();
        if !resolved.contains(&id) {
            resolved.push(id);
        }
    }
    Ok(resolved)
}

fn ensure_no_collisions(dst: &Workspace, moving: &[u32]) -> Result<(), CrossTagError> {
    match moving.iter().find(|id| dst.contains_task(**id)) {
        Some(id) => Err(CrossTagError::TaskAlreadyExists {
            id: *id,
            target_tag: None,
        }),
        None => Ok(()),
    }
}

/// Edges with exactly one endpoint inside the moving set. Dangling edges are
/// the validator's concern and are not conflicts.
pub fn detect_conflicts(graph: &DependencyGraph, moving: &[u32]) -> Vec<DependencyConflict> {
    let moving: HashSet<u32> = moving.iter().copied().collect();
    let mut conflicts = BTreeSet::new();
    for node in graph.nodes() {
        let node_moves = moving.contains(&node.task_id());
        for dep in graph.dependencies(*node) {
            if !graph.exists(*dep) {
                continue;
            }
            if node_moves != moving.contains(&dep.task_id()) {
                conflicts.insert(DependencyConflict {
                    dependent: *node,
                    prerequisite: *dep,
                });
            }
        }
    }
    conflicts.into_iter().collect()
}

/// Adds the transitive prerequisites of `moving` (by owning task) that the
/// target does not already hold.
fn expand_prerequisites(graph: &DependencyGraph, dst: &Workspace, moving: &[u32]) -> Vec<u32> {
    let mut expanded: Vec<u32> = moving.to_vec();
    let mut pending: Vec<u32> = moving.to_vec();
    while let Some(task_id) = pending.pop() {
        let owned = graph
            .nodes()
            .iter()
            .filter(|node| node.task_id() == task_id);
        for node in owned {
            for dep in graph.dependencies(*node) {
                let prerequisite = dep.task_id();
                if !graph.exists(Address::Task(prerequisite))
                    || expanded.contains(&prerequisite)
                    || dst.contains_task(prerequisite)
                {
                    continue;
                }
                expanded.push(prerequisite);
                pending.push(prerequisite);
            }
        }
    }
    expanded
}
