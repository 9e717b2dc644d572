use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

use crate::task::{Subtask, Task, Workspace};

/// Identifier of a node in a workspace: a task (`"12"`) or a subtask (`"12.3"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Address {
    Task(u32),
    Subtask { parent: u32, sub: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("Invalid task id '{input}': {reason}")]
    Invalid { input: String, reason: &'static str },
}

impl AddressError {
    pub fn code(&self) -> &'static str {
        "INVALID_ADDRESS"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("Task {0} not found")]
    NotFound(Address),
}

impl ResolveError {
    pub fn code(&self) -> &'static str {
        "TASK_NOT_FOUND"
    }
}

/// Borrowed view of a resolved node.
#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    Task(&'a Task),
    Subtask(&'a Task, &'a Subtask),
}

impl<'a> NodeRef<'a> {
    pub fn address(&self) -> Address {
        match self {
            NodeRef::Task(task) => Address::Task(task.id),
            NodeRef::Subtask(parent, subtask) => Address::subtask(parent.id, subtask.id),
        }
    }

    pub fn dependencies(&self) -> &'a [Address] {
        match self {
            NodeRef::Task(task) => &task.dependencies,
            NodeRef::Subtask(_, subtask) => &subtask.dependencies,
        }
    }
}

fn address_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d+)(?:\.(\d+))?$").expect("regex"))
}

impl Address {
    pub fn subtask(parent: u32, sub: u32) -> Self {
        Address::Subtask { parent, sub }
    }

    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let raw = input.trim();
        let invalid = |reason| AddressError::Invalid {
            input: input.to_string(),
            reason,
        };
        if raw.is_empty() {
            return Err(invalid("empty id"));
        }
        if raw.matches('.').count() > 1 {
            return Err(invalid("expected <task> or <task>.<subtask>"));
        }
        let caps = address_pattern()
            .captures(raw)
            .ok_or_else(|| invalid("segments must be positive integers"))?;
        let parse_segment = |text: &str| -> Result<u32, AddressError> {
            match text.parse::<u32>() {
                Ok(0) => Err(invalid("ids start at 1")),
                Ok(value) => Ok(value),
                Err(_) => Err(invalid("id is out of range")),
            }
        };
        let parent = parse_segment(&caps[1])?;
        match caps.get(2) {
            Some(sub) => Ok(Address::subtask(parent, parse_segment(sub.as_str())?)),
            None => Ok(Address::Task(parent)),
        }
    }

    /// Parses a comma separated list such as `"1,2.1, 7"`.
    pub fn parse_list(input: &str) -> Result<Vec<Self>, AddressError> {
        let items: Vec<&str> = input
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .collect();
        if items.is_empty() {
            return Err(AddressError::Invalid {
                input: input.to_string(),
                reason: "no ids given",
            });
        }
        items.into_iter().map(Address::parse).collect()
    }

    /// Id of the top-level task that owns this node.
    pub fn task_id(&self) -> u32 {
        match self {
            Address::Task(id) => *id,
            Address::Subtask { parent, .. } => *parent,
        }
    }

    fn sort_key(&self) -> (u32, u32) {
        match self {
            Address::Task(id) => (*id, 0),
            Address::Subtask { parent, sub } => (*parent, *sub),
        }
    }
}

// Tasks order by id and sit directly before their own subtasks.
impl Ord for Address {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Task(id) => write!(f, "{}", id),
            Address::Subtask { parent, sub } => write!(f, "{}.{}", parent, sub),
        }
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::parse(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Address::Task(id) => serializer.serialize_u32(*id),
            Address::Subtask { .. } => serializer.collect_str(self),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(i64),
    Text(String),
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawId::deserialize(deserializer)? {
            RawId::Number(value) => positive_id(value)
                .map(Address::Task)
                .ok_or_else(|| de::Error::custom(format!("invalid task id {}", value))),
            RawId::Text(text) => Address::parse(&text).map_err(de::Error::custom),
        }
    }
}

fn positive_id(value: i64) -> Option<u32> {
    u32::try_from(value).ok().filter(|id| *id > 0)
}

/// Accepts a task/subtask `id` written either as a JSON number or a numeric string.
pub(crate) fn deserialize_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    match RawId::deserialize(deserializer)? {
        RawId::Number(value) => {
            positive_id(value).ok_or_else(|| de::Error::custom(format!("invalid id {}", value)))
        }
        RawId::Text(text) => match Address::parse(&text).map_err(de::Error::custom)? {
            Address::Task(id) => Ok(id),
            other => Err(de::Error::custom(format!("expected a plain id, got {}", other))),
        },
    }
}

/// Parent id carried by a short-form subtask dependency until its workspace
/// resolves it. Never a valid task id.
pub(crate) const SHORT_FORM_PARENT: u32 = 0;

/// Subtask dependency lists: a JSON number `n` is short form (sibling `p.n`
/// when one exists, else task `n`) and stays pending until the owning
/// workspace resolves it. Strings always mean what they say.
pub(crate) fn deserialize_subtask_dependencies<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<Address>, D::Error> {
    Vec::<RawId>::deserialize(deserializer)?
        .into_iter()
        .map(|raw| match raw {
            RawId::Number(value) => positive_id(value)
                .map(|sub| Address::subtask(SHORT_FORM_PARENT, sub))
                .ok_or_else(|| de::Error::custom(format!("invalid task id {}", value))),
            RawId::Text(text) => Address::parse(&text).map_err(de::Error::custom),
        })
        .collect()
}

/// Looks up `addr` in `ws`.
pub fn resolve(ws: &Workspace, addr: Address) -> Result<NodeRef<'_>, ResolveError> {
    let not_found = || ResolveError::NotFound(addr);
    match addr {
        Address::Task(id) => ws.task(id).map(NodeRef::Task).ok_or_else(not_found),
        Address::Subtask { parent, sub } => {
            let task = ws.task(parent).ok_or_else(not_found)?;
            let subtask = task.subtask(sub).ok_or_else(not_found)?;
            Ok(NodeRef::Subtask(task, subtask))
        }
    }
}
