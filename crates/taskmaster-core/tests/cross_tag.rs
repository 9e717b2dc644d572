use pretty_assertions::assert_eq;
use taskmaster_core::cross_tag::{move_across_tags, move_between_tags};
use taskmaster_core::task::{Subtask, Task, TaggedDocument, Workspace};
use taskmaster_core::{Address, CrossTagError, DependencyConflict, MovePolicy};

fn task(id: u32, deps: &[u32]) -> Task {
    let mut task = Task::new(id, format!("Task {}", id));
    task.dependencies = deps.iter().map(|dep| Address::Task(*dep)).collect();
    task
}

fn ids(ws: &Workspace) -> Vec<u32> {
    ws.tasks.iter().map(|task| task.id).collect()
}

fn scenario_b() -> (Workspace, Workspace) {
    (
        Workspace::with_tasks(vec![task(1, &[]), task(2, &[1])]),
        Workspace::new("Tasks for feature"),
    )
}

#[test]
fn strict_policy_reports_conflicts_and_changes_nothing() {
    let (mut src, mut dst) = scenario_b();
    let (src_before, dst_before) = (src.clone(), dst.clone());

    let err = move_across_tags(&mut src, &mut dst, &[Address::Task(2)], MovePolicy::Strict)
        .unwrap_err();

    assert_eq!(err.code(), "CROSS_TAG_DEPENDENCY_CONFLICTS");
    assert_eq!(
        err.conflicts(),
        &[DependencyConflict {
            dependent: Address::Task(2),
            prerequisite: Address::Task(1),
        }]
    );
    assert_eq!(src, src_before);
    assert_eq!(dst, dst_before);
}

#[test]
fn with_dependencies_moves_the_prerequisite_too() {
    let (mut src, mut dst) = scenario_b();

    let result = move_across_tags(
        &mut src,
        &mut dst,
        &[Address::Task(2)],
        MovePolicy::WithDependencies,
    )
    .expect("move");

    assert!(src.tasks.is_empty());
    assert_eq!(ids(&dst), vec![1, 2]);
    assert_eq!(result.moved, vec![Address::Task(1), Address::Task(2)]);
    assert!(result.tips.is_empty());
    assert_eq!(
        dst.task(2).expect("task 2").dependencies,
        vec![Address::Task(1)]
    );
}

#[test]
fn ignore_dependencies_strips_the_edge_and_leaves_a_tip() {
    let (mut src, mut dst) = scenario_b();

    let result = move_across_tags(
        &mut src,
        &mut dst,
        &[Address::Task(2)],
        MovePolicy::IgnoreDependencies,
    )
    .expect("move");

    assert_eq!(ids(&src), vec![1]);
    assert_eq!(ids(&dst), vec![2]);
    assert!(dst.task(2).expect("task 2").dependencies.is_empty());
    assert_eq!(result.tips.len(), 1);
    assert!(result.tips[0].contains("2 no longer depends on 1"));
}

#[test]
fn ignore_dependencies_strips_edges_from_tasks_left_behind() {
    let mut src = Workspace::with_tasks(vec![task(1, &[]), task(2, &[1])]);
    let mut dst = Workspace::default();

    move_across_tags(
        &mut src,
        &mut dst,
        &[Address::Task(1)],
        MovePolicy::IgnoreDependencies,
    )
    .expect("move");

    assert!(src.task(2).expect("task 2").dependencies.is_empty());
    assert_eq!(ids(&dst), vec![1]);
}

#[test]
fn collision_in_target_is_rejected_without_mutation() {
    let mut doc = TaggedDocument::default();
    doc.insert("main", Workspace::with_tasks(vec![task(7, &[]), task(8, &[])]));
    doc.insert("feature", Workspace::with_tasks(vec![task(7, &[])]));
    let before = doc.clone();

    let err = move_between_tags(
        &mut doc,
        "main",
        "feature",
        &[Address::Task(7)],
        MovePolicy::Strict,
    )
    .unwrap_err();

    assert_eq!(err.code(), "TASK_ALREADY_EXISTS");
    assert_eq!(
        err,
        CrossTagError::TaskAlreadyExists {
            id: 7,
            target_tag: Some("feature".to_string()),
        }
    );
    assert_eq!(doc, before);
}

#[test]
fn subtasks_cannot_cross_tags() {
    let mut parent = task(3, &[]);
    parent.subtasks.push(Subtask::new(1, "child"));
    let mut src = Workspace::with_tasks(vec![parent]);
    let mut dst = Workspace::default();

    let err = move_across_tags(
        &mut src,
        &mut dst,
        &[Address::subtask(3, 1)],
        MovePolicy::Strict,
    )
    .unwrap_err();

    assert_eq!(err.code(), "CANNOT_MOVE_SUBTASK");
    assert_eq!(src.tasks[0].subtasks.len(), 1);
}

#[test]
fn moved_task_takes_its_subtasks_along() {
    let mut parent = task(3, &[]);
    let mut child = Subtask::new(1, "child");
    child.dependencies = vec![Address::Task(1)];
    parent.subtasks.push(child);
    let mut doc = TaggedDocument::default();
    doc.insert("main", Workspace::with_tasks(vec![task(1, &[]), parent]));
    doc.insert("feature", Workspace::default());

    let result = move_between_tags(
        &mut doc,
        "main",
        "feature",
        &[Address::Task(3)],
        MovePolicy::WithDependencies,
    )
    .expect("move");

    assert_eq!(result.moved, vec![Address::Task(1), Address::Task(3)]);
    let feature = doc.get("feature").expect("feature tag");
    assert_eq!(feature.task(3).expect("task 3").subtasks.len(), 1);
    assert!(doc.get("main").expect("main tag").tasks.is_empty());
}
