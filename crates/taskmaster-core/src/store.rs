//! JSON persistence of the tagged task document and the current-tag state.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::paths::ProjectPaths;
use crate::task::{now_rfc3339, TaggedDocument, Workspace, DEFAULT_TAG};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Tasks file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Tag '{0}' not found")]
    TagNotFound(String),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::NotFound(_) => "TASKS_FILE_NOT_FOUND",
            StoreError::Io { .. } => "IO_ERROR",
            StoreError::Parse { .. } => "PARSE_ERROR",
            StoreError::TagNotFound(_) => "TAG_NOT_FOUND",
        }
    }
}

/// Persistence seam between the adapters and the core.
pub trait Store {
    fn load_document(&self) -> Result<TaggedDocument, StoreError>;

    fn save_document(&self, doc: &TaggedDocument) -> Result<(), StoreError>;

    fn current_tag(&self) -> Result<String, StoreError>;

    fn load(&self, tag: &str) -> Result<Workspace, StoreError> {
        let mut doc = self.load_document()?;
        doc.tags
            .remove(tag)
            .ok_or_else(|| StoreError::TagNotFound(tag.to_string()))
    }

    /// Replaces one tag, creating the document when it does not exist yet.
    fn save(&self, tag: &str, ws: Workspace) -> Result<(), StoreError> {
        let mut doc = match self.load_document() {
            Ok(doc) => doc,
            Err(StoreError::NotFound(_)) => TaggedDocument::default(),
            Err(err) => return Err(err),
        };
        doc.insert(tag, ws);
        self.save_document(&doc)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StateFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    current_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_switched: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    tasks_path: PathBuf,
    state_path: PathBuf,
    default_tag: String,
}

impl JsonFileStore {
    pub fn new(
        tasks_path: impl Into<PathBuf>,
        state_path: impl Into<PathBuf>,
        default_tag: impl Into<String>,
    ) -> Self {
        Self {
            tasks_path: tasks_path.into(),
            state_path: state_path.into(),
            default_tag: default_tag.into(),
        }
    }

    pub fn from_paths(paths: &ProjectPaths) -> Self {
        Self::new(&paths.tasks_file, &paths.state_file, paths.default_tag())
    }

    pub fn tasks_path(&self) -> &Path {
        &self.tasks_path
    }

    /// Records `tag` as current. The tag must exist in the document.
    pub fn set_current_tag(&self, tag: &str) -> Result<(), StoreError> {
        let doc = self.load_document()?;
        if !doc.tags.contains_key(tag) {
            return Err(StoreError::TagNotFound(tag.to_string()));
        }
        let mut state = self.read_state()?.unwrap_or_default();
        state.current_tag = Some(tag.to_string());
        state.last_switched = Some(now_rfc3339());
        let body = serde_json::to_string_pretty(&state).map_err(|source| StoreError::Parse {
            path: self.state_path.clone(),
            source,
        })?;
        write_file(&self.state_path, &body)
    }

    fn read_state(&self) -> Result<Option<StateFile>, StoreError> {
        if !self.state_path.is_file() {
            return Ok(None);
        }
        let text = read_file(&self.state_path)?;
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| StoreError::Parse {
                path: self.state_path.clone(),
                source,
            })
    }
}

impl Store for JsonFileStore {
    fn load_document(&self) -> Result<TaggedDocument, StoreError> {
        if !self.tasks_path.is_file() {
            return Err(StoreError::NotFound(self.tasks_path.clone()));
        }
        let text = read_file(&self.tasks_path)?;
        let parse_error = |source| StoreError::Parse {
            path: self.tasks_path.clone(),
            source,
        };
        let raw: Value = serde_json::from_str(&text).map_err(parse_error)?;
        serde_json::from_value(migrate_legacy(raw)).map_err(parse_error)
    }

    fn save_document(&self, doc: &TaggedDocument) -> Result<(), StoreError> {
        let body = serde_json::to_string_pretty(doc).map_err(|source| StoreError::Parse {
            path: self.tasks_path.clone(),
            source,
        })?;
        write_file(&self.tasks_path, &format!("{}\n", body))
    }

    fn current_tag(&self) -> Result<String, StoreError> {
        let tag = self
            .read_state()?
            .and_then(|state| state.current_tag)
            .map(|tag| tag.trim().to_string())
            .filter(|tag| !tag.is_empty());
        Ok(tag.unwrap_or_else(|| self.default_tag.clone()))
    }
}

/// Wraps a legacy `{ "tasks": [...] }` document as the `main` tag.
pub fn migrate_legacy(raw: Value) -> Value {
    let is_legacy = raw
        .as_object()
        .and_then(|map| map.get("tasks"))
        .map(Value::is_array)
        .unwrap_or(false);
    if !is_legacy {
        return raw;
    }
    let mut legacy = match raw {
        Value::Object(map) => map,
        other => return other,
    };
    let tasks = legacy.remove("tasks").unwrap_or_else(|| Value::Array(Vec::new()));
    let mut metadata = match legacy.remove("metadata") {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    let now = now_rfc3339();
    metadata
        .entry("created")
        .or_insert_with(|| Value::from(now.clone()));
    metadata.entry("updated").or_insert_with(|| Value::from(now));
    metadata
        .entry("description")
        .or_insert_with(|| Value::from("Tasks for main context"));

    let mut workspace = Map::new();
    workspace.insert("tasks".to_string(), tasks);
    workspace.insert("metadata".to_string(), Value::Object(metadata));
    let mut root = Map::new();
    root.insert(DEFAULT_TAG.to_string(), Value::Object(workspace));
    Value::Object(root)
}

fn read_file(path: &Path) -> Result<String, StoreError> {
    fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write_file(path: &Path, body: &str) -> Result<(), StoreError> {
    let io_error = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    fs::write(path, body).map_err(io_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use crate::task::Task;
    use serde_json::json;
    use tempfile::TempDir;

    fn store(temp: &TempDir) -> JsonFileStore {
        JsonFileStore::new(
            temp.path().join(".taskmaster/tasks/tasks.json"),
            temp.path().join(".taskmaster/state.json"),
            DEFAULT_TAG,
        )
    }

    #[test]
    fn legacy_document_is_wrapped_under_main() {
        let migrated = migrate_legacy(json!({"tasks": [{"id": 1, "title": "a"}]}));
        assert_eq!(migrated["main"]["tasks"][0]["id"], 1);
        assert!(migrated["main"]["metadata"]["created"].is_string());

        let tagged = json!({"main": {"tasks": []}});
        assert_eq!(migrate_legacy(tagged.clone()), tagged);
    }

    #[test]
    fn save_creates_document_and_parent_dirs() {
        let temp = TempDir::new().expect("tempdir");
        let store = store(&temp);
        let mut task = Task::new(2, "b");
        task.dependencies = vec![Address::Task(1)];
        store
            .save("main", Workspace::with_tasks(vec![Task::new(1, "a"), task]))
            .expect("save");

        let ws = store.load("main").expect("load");
        assert_eq!(ws.tasks.len(), 2);
        assert_eq!(ws.tasks[1].dependencies, vec![Address::Task(1)]);
        assert!(matches!(store.load("other"), Err(StoreError::TagNotFound(_))));
    }

    #[test]
    fn missing_document_is_not_found() {
        let temp = TempDir::new().expect("tempdir");
        assert!(matches!(
            store(&temp).load_document(),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn current_tag_defaults_then_follows_state_file() {
        let temp = TempDir::new().expect("tempdir");
        let store = store(&temp);
        assert_eq!(store.current_tag().expect("tag"), "main");

        let mut doc = TaggedDocument::default();
        doc.insert("main", Workspace::default());
        doc.insert("feature", Workspace::default());
        store.save_document(&doc).expect("save");
        store.set_current_tag("feature").expect("switch");
        assert_eq!(store.current_tag().expect("tag"), "feature");

        assert!(matches!(
            store.set_current_tag("missing"),
            Err(StoreError::TagNotFound(_))
        ));
    }

    #[test]
    fn state_file_keeps_unknown_keys() {
        let temp = TempDir::new().expect("tempdir");
        let store = store(&temp);
        let mut doc = TaggedDocument::default();
        doc.insert("main", Workspace::default());
        store.save_document(&doc).expect("save");
        fs::write(
            temp.path().join(".taskmaster/state.json"),
            r#"{"currentTag": "main", "branchTagMapping": {}}"#,
        )
        .expect("state");
        store.set_current_tag("main").expect("switch");
        let text = fs::read_to_string(temp.path().join(".taskmaster/state.json")).expect("read");
        assert!(text.contains("branchTagMapping"));
    }
}
