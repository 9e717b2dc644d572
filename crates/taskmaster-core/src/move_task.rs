use serde::Serialize;
use thiserror::Error;

use crate::address::{resolve, Address};
use crate::graph::DependencyGraph;
use crate::task::Workspace;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoveError {
    #[error("Source task {0} not found")]
    SourceNotFound(Address),
    #[error("Destination {0} already exists; move or remove it first")]
    DestinationOccupied(Address),
    #[error("Destination parent task {0} not found")]
    DestinationParentNotFound(u32),
    #[error("Task {0} has subtasks and cannot become a subtask")]
    TaskHasSubtasks(u32),
    #[error("Task {0} cannot be moved under itself")]
    MoveIntoSelf(u32),
    #[error("Number of source ids ({from}) must match number of destination ids ({to})")]
    BatchLengthMismatch { from: usize, to: usize },
}

impl MoveError {
    pub fn code(&self) -> &'static str {
        match self {
            MoveError::SourceNotFound(_) => "SOURCE_NOT_FOUND",
            MoveError::DestinationOccupied(_) => "DESTINATION_OCCUPIED",
            MoveError::DestinationParentNotFound(_) => "DESTINATION_PARENT_NOT_FOUND",
            MoveError::TaskHasSubtasks(_) => "TASK_HAS_SUBTASKS",
            MoveError::MoveIntoSelf(_) => "MOVE_INTO_SELF",
            MoveError::BatchLengthMismatch { .. } => "BATCH_LENGTH_MISMATCH",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveRecord {
    pub from: Address,
    pub to: Address,
    /// True when `from == to` and nothing happened.
    pub skipped: bool,
}

/// Relocates the node at `from` to `to` inside one tag and rewrites every
/// dependency that pointed at the old address (or at its subtasks).
pub fn move_within_tag(
    ws: &mut Workspace,
    from: Address,
    to: Address,
) -> Result<MoveRecord, MoveError> {
    if from == to {
        return Ok(MoveRecord {
            from,
            to,
            skipped: true,
        });
    }
    resolve(ws, from).map_err(|_| MoveError::SourceNotFound(from))?;
    if resolve(ws, to).is_ok() {
        return Err(MoveError::DestinationOccupied(to));
    }

    let renames = relocate(ws, from, to)?;
    ws.sort_tasks();

    let mut graph = DependencyGraph::from_workspace(ws);
    for (old, new) in renames {
        graph.rewrite_address(old, new);
    }
    graph.apply_to(ws);
    ws.touch();

    Ok(MoveRecord {
        from,
        to,
        skipped: false,
    })
}

/// Moves the node and returns every `(old, new)` address pair it produced.
fn relocate(
    ws: &mut Workspace,
    from: Address,
    to: Address,
) -> Result<Vec<(Address, Address)>, MoveError> {
    let missing = || MoveError::SourceNotFound(from);
    let mut renames = vec![(from, to)];

    match (from, to) {
        (Address::Task(old_id), Address::Task(new_id)) => {
            let task = ws.task_mut(old_id).ok_or_else(missing)?;
            task.id = new_id;
            for subtask in &task.subtasks {
                renames.push((
                    Address::subtask(old_id, subtask.id),
                    Address::subtask(new_id, subtask.id),
                ));
            }
        }
        (Address::Subtask { parent, sub }, Address::Subtask { parent: new_parent, sub: new_sub }) => {
            if !ws.contains_task(new_parent) {
                return Err(MoveError::DestinationParentNotFound(new_parent));
            }
            let mut subtask = ws
                .task_mut(parent)
                .and_then(|task| task.take_subtask(sub))
                .ok_or_else(missing)?;
            subtask.id = new_sub;
            ws.task_mut(new_parent)
                .ok_or(MoveError::DestinationParentNotFound(new_parent))?
                .insert_subtask(subtask);
        }
        (Address::Subtask { parent, sub }, Address::Task(new_id)) => {
            let subtask = ws
                .task_mut(parent)
                .and_then(|task| task.take_subtask(sub))
                .ok_or_else(missing)?;
            ws.tasks.push(subtask.into_task(new_id));
        }
        (Address::Task(old_id), Address::Subtask { parent: new_parent, sub: new_sub }) => {
            if new_parent == old_id {
                return Err(MoveError::MoveIntoSelf(old_id));
            }
            if !ws.contains_task(new_parent) {
                return Err(MoveError::DestinationParentNotFound(new_parent));
            }
            let task = ws.task(old_id).ok_or_else(missing)?;
            if !task.subtasks.is_empty() {
                return Err(MoveError::TaskHasSubtasks(old_id));
            }
            let task = ws.take_task(old_id).ok_or_else(missing)?;
            ws.task_mut(new_parent)
                .ok_or(MoveError::DestinationParentNotFound(new_parent))?
                .insert_subtask(task.into_subtask(new_sub));
        }
    }

    Ok(renames)
}

/// Zips comma-separated source and destination lists into move pairs.
pub fn pair_batch(
    from: &[Address],
    to: &[Address],
) -> Result<Vec<(Address, Address)>, MoveError> {
    if from.len() != to.len() {
        return Err(MoveError::BatchLengthMismatch {
            from: from.len(),
            to: to.len(),
        });
    }
    Ok(from.iter().copied().zip(to.iter().copied()).collect())
}

/// Applies `pairs` left to right. A later pair may target an id vacated by an
/// earlier one. On error the workspace is left untouched.
pub fn move_batch(
    ws: &mut Workspace,
    pairs: &[(Address, Address)],
) -> Result<Vec<MoveRecord>, MoveError> {
    let mut staged = ws.clone();
    let mut records = Vec::with_capacity(pairs.len());
    for (from, to) in pairs {
        records.push(move_within_tag(&mut staged, *from, *to)?);
    }
    *ws = staged;
    Ok(records)
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

    fn ids(ws: &Workspace) -> Vec<u32> {
        ws.tasks.iter().map(|task| task.id).collect()
    }

    #[test]
    fn renumbers_task_and_rewrites_edges() {
        let mut ws = Workspace::with_tasks(vec![task(1, &[]), task(2, &[Address::Task(1)])]);
        move_within_tag(&mut ws, Address::Task(1), Address::Task(5)).expect("move");
        assert_eq!(ids(&ws), vec![2, 5]);
        assert_eq!(ws.task(2).expect("task 2").dependencies, vec![Address::Task(5)]);
    }

    #[test]
    fn same_address_is_a_no_op() {
        let mut ws = Workspace::with_tasks(vec![task(1, &[])]);
        let before = ws.clone();
        let record = move_within_tag(&mut ws, Address::Task(1), Address::Task(1)).expect("move");
        assert!(record.skipped);
        assert_eq!(ws, before);
    }

    #[test]
    fn occupied_destination_is_rejected() {
        let mut ws = Workspace::with_tasks(vec![task(1, &[]), task(2, &[])]);
        let err = move_within_tag(&mut ws, Address::Task(1), Address::Task(2)).unwrap_err();
        assert_eq!(err, MoveError::DestinationOccupied(Address::Task(2)));
        assert_eq!(err.code(), "DESTINATION_OCCUPIED");
    }

    #[test]
    fn missing_source_is_rejected() {
        let mut ws = Workspace::with_tasks(vec![task(1, &[])]);
        let err = move_within_tag(&mut ws, Address::Task(4), Address::Task(5)).unwrap_err();
        assert_eq!(err, MoveError::SourceNotFound(Address::Task(4)));
    }

    #[test]
    fn task_move_carries_subtask_references() {
        let mut parent = task(1, &[]);
        parent.subtasks.push(Subtask::new(1, "a"));
        let mut second = Subtask::new(2, "b");
        second.dependencies = vec![Address::subtask(1, 1)];
        parent.subtasks.push(second);
        let mut ws = Workspace::with_tasks(vec![parent, task(2, &[Address::subtask(1, 2)])]);

        move_within_tag(&mut ws, Address::Task(1), Address::Task(3)).expect("move");

        let moved = ws.task(3).expect("task 3");
        assert_eq!(moved.subtasks[1].dependencies, vec![Address::subtask(3, 1)]);
        assert_eq!(
            ws.task(2).expect("task 2").dependencies,
            vec![Address::subtask(3, 2)]
        );
    }

    #[test]
    fn subtask_can_be_reparented() {
        let mut a = task(1, &[]);
        a.subtasks.push(Subtask::new(1, "child"));
        let b = task(2, &[Address::subtask(1, 1)]);
        let mut ws = Workspace::with_tasks(vec![a, b]);

        move_within_tag(&mut ws, Address::subtask(1, 1), Address::subtask(2, 4)).expect("move");

        assert!(ws.task(1).expect("task 1").subtasks.is_empty());
        let b = ws.task(2).expect("task 2");
        assert_eq!(b.subtasks[0].id, 4);
        // The former edge now points at b's own subtask.
        assert_eq!(b.dependencies, vec![Address::subtask(2, 4)]);
    }

    #[test]
    fn subtask_promotes_to_task() {
        let mut a = task(1, &[]);
        a.subtasks.push(Subtask::new(1, "child"));
        let b = task(2, &[Address::subtask(1, 1)]);
        let mut ws = Workspace::with_tasks(vec![a, b]);

        move_within_tag(&mut ws, Address::subtask(1, 1), Address::Task(9)).expect("move");

        assert_eq!(ids(&ws), vec![1, 2, 9]);
        assert_eq!(ws.task(9).expect("task 9").title, "child");
        assert_eq!(ws.task(2).expect("task 2").dependencies, vec![Address::Task(9)]);
    }

    #[test]
    fn task_demotes_to_subtask() {
        let mut ws = Workspace::with_tasks(vec![
            task(1, &[]),
            task(2, &[]),
            task(3, &[Address::Task(2)]),
        ]);
        move_within_tag(&mut ws, Address::Task(2), Address::subtask(1, 1)).expect("move");
        assert_eq!(ids(&ws), vec![1, 3]);
        assert_eq!(
            ws.task(3).expect("task 3").dependencies,
            vec![Address::subtask(1, 1)]
        );
    }

    #[test]
    fn task_with_subtasks_cannot_be_demoted() {
        let mut a = task(1, &[]);
        a.subtasks.push(Subtask::new(1, "child"));
        let mut ws = Workspace::with_tasks(vec![a, task(2, &[])]);
        let err =
            move_within_tag(&mut ws, Address::Task(1), Address::subtask(2, 1)).unwrap_err();
        assert_eq!(err, MoveError::TaskHasSubtasks(1));
    }

    #[test]
    fn batch_can_reuse_vacated_ids() {
        let mut ws = Workspace::with_tasks(vec![
            task(1, &[]),
            task(2, &[Address::Task(1)]),
            task(3, &[Address::Task(2)]),
        ]);
        let pairs = vec![
            (Address::Task(2), Address::Task(10)),
            (Address::Task(1), Address::Task(2)),
        ];
        let records = move_batch(&mut ws, &pairs).expect("batch");
        assert_eq!(records.len(), 2);
        assert_eq!(ids(&ws), vec![2, 3, 10]);
        assert_eq!(ws.task(10).expect("10").dependencies, vec![Address::Task(2)]);
        assert_eq!(ws.task(3).expect("3").dependencies, vec![Address::Task(10)]);
    }

    #[test]
    fn failed_batch_leaves_workspace_untouched() {
        let mut ws = Workspace::with_tasks(vec![task(1, &[]), task(2, &[])]);
        let before = ws.clone();
        let pairs = vec![
            (Address::Task(1), Address::Task(5)),
            (Address::Task(2), Address::Task(5)),
        ];
        assert!(move_batch(&mut ws, &pairs).is_err());
        assert_eq!(ws, before);
    }

    #[test]
    fn pair_batch_requires_equal_lengths() {
        let err = pair_batch(&[Address::Task(1)], &[]).unwrap_err();
        assert_eq!(err, MoveError::BatchLengthMismatch { from: 1, to: 0 });
    }
}
