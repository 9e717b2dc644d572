use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use serde::ser::{self, SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::address::{
    deserialize_id, deserialize_subtask_dependencies, resolve, Address, NodeRef, ResolveError,
    SHORT_FORM_PARENT,
};

pub const DEFAULT_TAG: &str = "main";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Done,
    Review,
    Deferred,
    Cancelled,
}

impl TaskStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecFile {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub file: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub details: String,
    #[serde(default, rename = "testStrategy")]
    pub test_strategy: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub dependencies: Vec<Address>,
    #[serde(default, serialize_with = "serialize_subtasks")]
    pub subtasks: Vec<Subtask>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub spec_files: Vec<SpecFile>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub logs: String,
    /// Keys this tool does not model, carried through untouched.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtask {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub details: String,
    #[serde(default, rename = "testStrategy")]
    pub test_strategy: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    /// JSON numbers stay short form until the owning [`Workspace`] resolves them.
    #[serde(default, deserialize_with = "deserialize_subtask_dependencies")]
    pub dependencies: Vec<Address>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub spec_files: Vec<SpecFile>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub logs: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

const PARENT_KEY: &str = "parentTaskId";

// A task reference that shares its number with a sibling is written as a
// numeric string so it does not read back as short form.
fn serialize_subtasks<S: Serializer>(subtasks: &[Subtask], serializer: S) -> Result<S::Ok, S::Error> {
    let siblings: Vec<u32> = subtasks.iter().map(|subtask| subtask.id).collect();
    let mut seq = serializer.serialize_seq(Some(subtasks.len()))?;
    for subtask in subtasks {
        let mut value = serde_json::to_value(subtask).map_err(ser::Error::custom)?;
        let deps: Vec<Value> = subtask
            .dependencies
            .iter()
            .map(|dep| match dep {
                Address::Task(id) if siblings.contains(id) => Value::from(id.to_string()),
                Address::Task(id) => Value::from(*id),
                Address::Subtask { .. } => Value::from(dep.to_string()),
            })
            .collect();
        value["dependencies"] = Value::Array(deps);
        seq.serialize_element(&value)?;
    }
    seq.end()
}

impl Task {
    pub fn new(id: u32, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            description: String::new(),
            details: String::new(),
            test_strategy: String::new(),
            status: TaskStatus::Pending,
            priority: Priority::Medium,
            dependencies: Vec::new(),
            subtasks: Vec::new(),
            spec_files: Vec::new(),
            logs: String::new(),
            extra: BTreeMap::new(),
        }
    }

    pub fn address(&self) -> Address {
        Address::Task(self.id)
    }

    pub fn subtask(&self, id: u32) -> Option<&Subtask> {
        self.subtasks.iter().find(|subtask| subtask.id == id)
    }

    pub fn subtask_mut(&mut self, id: u32) -> Option<&mut Subtask> {
        self.subtasks.iter_mut().find(|subtask| subtask.id == id)
    }

    /// Removes and returns subtask `id`.
    pub fn take_subtask(&mut self, id: u32) -> Option<Subtask> {
        let idx = self.subtasks.iter().position(|subtask| subtask.id == id)?;
        Some(self.subtasks.remove(idx))
    }

    /// Inserts `subtask` keeping the list ordered by id.
    pub fn insert_subtask(&mut self, mut subtask: Subtask) {
        if subtask.extra.contains_key(PARENT_KEY) {
            subtask.extra.insert(PARENT_KEY.to_string(), Value::from(self.id));
        }
        let idx = self
            .subtasks
            .iter()
            .position(|existing| existing.id > subtask.id)
            .unwrap_or(self.subtasks.len());
        self.subtasks.insert(idx, subtask);
    }

    /// Turns a subtask-less task into a subtask with id `sub`.
    pub fn into_subtask(self, sub: u32) -> Subtask {
        Subtask {
            id: sub,
            title: self.title,
            description: self.description,
            details: self.details,
            test_strategy: self.test_strategy,
            status: self.status,
            priority: Some(self.priority),
            dependencies: self.dependencies,
            spec_files: self.spec_files,
            logs: self.logs,
            extra: self.extra,
        }
    }
}

impl Subtask {
    pub fn new(id: u32, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            description: String::new(),
            details: String::new(),
            test_strategy: String::new(),
            status: TaskStatus::Pending,
            priority: None,
            dependencies: Vec::new(),
            spec_files: Vec::new(),
            logs: String::new(),
            extra: BTreeMap::new(),
        }
    }

    /// Promotes the subtask to a standalone task with id `id`.
    pub fn into_task(mut self, id: u32) -> Task {
        self.extra.remove(PARENT_KEY);
        Task {
            id,
            title: self.title,
            description: self.description,
            details: self.details,
            test_strategy: self.test_strategy,
            status: self.status,
            priority: self.priority.unwrap_or_default(),
            dependencies: self.dependencies,
            subtasks: Vec::new(),
            spec_files: self.spec_files,
            logs: self.logs,
            extra: self.extra,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WorkspaceMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// All tasks of one tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(from = "WorkspaceOnDisk")]
pub struct Workspace {
    pub tasks: Vec<Task>,
    pub metadata: WorkspaceMetadata,
}

#[derive(Deserialize)]
struct WorkspaceOnDisk {
    #[serde(default)]
    tasks: Vec<Task>,
    #[serde(default)]
    metadata: WorkspaceMetadata,
}

impl From<WorkspaceOnDisk> for Workspace {
    fn from(raw: WorkspaceOnDisk) -> Self {
        let mut ws = Workspace {
            tasks: raw.tasks,
            metadata: raw.metadata,
        };
        ws.resolve_short_form();
        ws
    }
}

impl Workspace {
    pub fn new(description: impl Into<String>) -> Self {
        let now = now_rfc3339();
        Self {
            tasks: Vec::new(),
            metadata: WorkspaceMetadata {
                created: Some(now.clone()),
                updated: Some(now),
                description: Some(description.into()),
                extra: BTreeMap::new(),
            },
        }
    }

    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        Self {
            tasks,
            metadata: WorkspaceMetadata::default(),
        }
    }

    pub fn task(&self, id: u32) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn task_mut(&mut self, id: u32) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|task| task.id == id)
    }

    pub fn take_task(&mut self, id: u32) -> Option<Task> {
        let idx = self.tasks.iter().position(|task| task.id == id)?;
        Some(self.tasks.remove(idx))
    }

    pub fn contains_task(&self, id: u32) -> bool {
        self.task(id).is_some()
    }

    pub fn contains(&self, addr: Address) -> bool {
        resolve(self, addr).is_ok()
    }

    pub fn dependencies_mut(&mut self, addr: Address) -> Option<&mut Vec<Address>> {
        match addr {
            Address::Task(id) => self.task_mut(id).map(|task| &mut task.dependencies),
            Address::Subtask { parent, sub } => self
                .task_mut(parent)
                .and_then(|task| task.subtask_mut(sub))
                .map(|subtask| &mut subtask.dependencies),
        }
    }

    pub fn sort_tasks(&mut self) {
        self.tasks.sort_by_key(|task| task.id);
    }

    pub fn touch(&mut self) {
        self.metadata.updated = Some(now_rfc3339());
    }

    pub fn completed_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|task| task.status.is_complete())
            .count()
    }

    /// Resolves short-form subtask dependencies: a bare `n` inside subtask `p.k`
    /// means sibling `p.n` when `p` owns subtask `n`, otherwise task `n`.
    fn resolve_short_form(&mut self) {
        for task in &mut self.tasks {
            let siblings: Vec<u32> = task.subtasks.iter().map(|subtask| subtask.id).collect();
            let parent = task.id;
            for subtask in &mut task.subtasks {
                for dep in &mut subtask.dependencies {
                    if let Address::Subtask {
                        parent: SHORT_FORM_PARENT,
                        sub: id,
                    } = *dep
                    {
                        *dep = if siblings.contains(&id) {
                            Address::subtask(parent, id)
                        } else {
                            Address::Task(id)
                        };
                    }
                }
            }
        }
    }

    pub fn index(&self) -> NodeIndex {
        NodeIndex::build(self)
    }
}

/// Location of a node inside `Workspace::tasks`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeSlot {
    pub task: usize,
    pub subtask: Option<usize>,
}

/// Address → position index over one workspace, rebuilt after structural edits.
#[derive(Debug, Clone, Default)]
pub struct NodeIndex {
    slots: HashMap<Address, NodeSlot>,
    duplicates: Vec<Address>,
}

impl NodeIndex {
    pub fn build(ws: &Workspace) -> Self {
        let mut index = NodeIndex::default();
        for (task_idx, task) in ws.tasks.iter().enumerate() {
            index.insert(
                task.address(),
                NodeSlot {
                    task: task_idx,
                    subtask: None,
                },
            );
            for (sub_idx, subtask) in task.subtasks.iter().enumerate() {
                index.insert(
                    Address::subtask(task.id, subtask.id),
                    NodeSlot {
                        task: task_idx,
                        subtask: Some(sub_idx),
                    },
                );
            }
        }
        index
    }

    fn insert(&mut self, addr: Address, slot: NodeSlot) {
        if self.slots.contains_key(&addr) {
            self.duplicates.push(addr);
        } else {
            self.slots.insert(addr, slot);
        }
    }

    pub fn get(&self, addr: &Address) -> Option<NodeSlot> {
        self.slots.get(addr).copied()
    }

    /// Like [`resolve`], through the index. `ws` must be the workspace it was built from.
    pub fn resolve<'a>(&self, ws: &'a Workspace, addr: Address) -> Result<NodeRef<'a>, ResolveError> {
        let slot = self.get(&addr).ok_or(ResolveError::NotFound(addr))?;
        let task = ws.tasks.get(slot.task).ok_or(ResolveError::NotFound(addr))?;
        match slot.subtask {
            None => Ok(NodeRef::Task(task)),
            Some(idx) => task
                .subtasks
                .get(idx)
                .map(|subtask| NodeRef::Subtask(task, subtask))
                .ok_or(ResolveError::NotFound(addr)),
        }
    }

    /// Addresses that occur more than once (malformed input).
    pub fn duplicates(&self) -> &[Address] {
        &self.duplicates
    }
}

/// The persisted root document: tag name → workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct TaggedDocument {
    pub tags: BTreeMap<String, Workspace>,
}

impl TaggedDocument {
    pub fn get(&self, tag: &str) -> Option<&Workspace> {
        self.tags.get(tag)
    }

    pub fn get_mut(&mut self, tag: &str) -> Option<&mut Workspace> {
        self.tags.get_mut(tag)
    }

    pub fn insert(&mut self, tag: impl Into<String>, ws: Workspace) {
        self.tags.insert(tag.into(), ws);
    }

    pub fn tag_names(&self) -> Vec<String> {
        self.tags.keys().cloned().collect()
    }
}

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}
