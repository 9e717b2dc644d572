use std::fs;

use pretty_assertions::assert_eq;
use serde_json::Value;
use taskmaster_core::fix::fix_dependencies;
use taskmaster_core::paths::resolve_project;
use taskmaster_core::task_ops::add_dependency;
use taskmaster_core::{Address, JsonFileStore, Store};
use tempfile::TempDir;

const LEGACY: &str = r#"{
  "tasks": [
    {"id": 1, "title": "Set up repo", "status": "done", "dependencies": []},
    {"id": "2", "title": "Write parser", "status": "pending", "priority": "high",
     "dependencies": [1, 1, 9],
     "subtasks": [
        {"id": 1, "title": "Lexer", "status": "pending", "dependencies": []},
        {"id": 2, "title": "Grammar", "status": "pending", "dependencies": [1]}
     ],
     "complexityScore": 7}
  ]
}"#;

#[test]
fn legacy_document_loads_fixes_and_saves_tagged() {
    let temp = TempDir::new().expect("tempdir");
    let paths = resolve_project(temp.path(), None).expect("paths");
    fs::create_dir_all(paths.tasks_file.parent().expect("parent")).expect("dirs");
    fs::write(&paths.tasks_file, LEGACY).expect("legacy");
    let store = JsonFileStore::from_paths(&paths);

    let tag = store.current_tag().expect("current tag");
    assert_eq!(tag, "main");
    let mut ws = store.load(&tag).expect("load");
    assert_eq!(
        ws.task(2).expect("task 2").subtasks[1].dependencies,
        vec![Address::subtask(2, 1)]
    );

    let report = fix_dependencies(&mut ws).expect("fix");
    assert_eq!(report.total(), 2);
    store.save(&tag, ws).expect("save");

    let saved: Value =
        serde_json::from_str(&fs::read_to_string(&paths.tasks_file).expect("read")).expect("json");
    let task = &saved["main"]["tasks"][1];
    assert_eq!(task["id"], 2);
    assert_eq!(task["dependencies"], serde_json::json!([1]));
    assert_eq!(task["subtasks"][1]["dependencies"], serde_json::json!(["2.1"]));
    assert_eq!(task["complexityScore"], 7);
    assert!(saved.get("tasks").is_none());
}

#[test]
fn saving_one_tag_keeps_the_others() {
    let temp = TempDir::new().expect("tempdir");
    let store = JsonFileStore::new(
        temp.path().join("tasks.json"),
        temp.path().join("state.json"),
        "main",
    );
    fs::write(
        temp.path().join("tasks.json"),
        r#"{"main": {"tasks": [{"id": 1, "title": "a"}]}, "feature": {"tasks": []}}"#,
    )
    .expect("doc");

    let mut feature = store.load("feature").expect("feature");
    feature.tasks.push(taskmaster_core::Task::new(4, "d"));
    store.save("feature", feature).expect("save");

    let doc = store.load_document().expect("reload");
    assert_eq!(doc.tag_names(), vec!["feature".to_string(), "main".to_string()]);
    assert_eq!(doc.get("main").expect("main").tasks.len(), 1);
    assert_eq!(doc.get("feature").expect("feature").tasks[0].id, 4);
}

#[test]
fn subtask_dependency_on_task_survives_reload_next_to_same_numbered_sibling() {
    let temp = TempDir::new().expect("tempdir");
    let store = JsonFileStore::new(
        temp.path().join("tasks.json"),
        temp.path().join("state.json"),
        "main",
    );
    fs::write(
        temp.path().join("tasks.json"),
        r#"{"main": {"tasks": [
            {"id": 1, "title": "parent", "subtasks": [
                {"id": 1, "title": "first"},
                {"id": 3, "title": "third"}
            ]},
            {"id": 3, "title": "elsewhere"}
        ]}}"#,
    )
    .expect("doc");

    let mut ws = store.load("main").expect("load");
    add_dependency(&mut ws, Address::subtask(1, 1), Address::Task(3)).expect("add");
    add_dependency(&mut ws, Address::subtask(1, 1), Address::subtask(1, 3)).expect("add sibling");
    let before = ws.task(1).expect("task 1").subtasks[0].dependencies.clone();
    store.save("main", ws).expect("save");

    let reloaded = store.load("main").expect("reload");
    assert_eq!(reloaded.task(1).expect("task 1").subtasks[0].dependencies, before);
    assert_eq!(before, vec![Address::subtask(1, 3), Address::Task(3)]);
}
