use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::address::Address;
use crate::task::now_rfc3339;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Failed to write audit log: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to serialize audit event: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl AuditError {
    pub fn code(&self) -> &'static str {
        "AUDIT_ERROR"
    }
}

/// One line of the JSONL audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: String,
    pub actor: Option<String>,
    pub action: String,
    pub tag: String,
    #[serde(default)]
    pub task_ids: Vec<Address>,
    pub details: Value,
}

impl AuditEvent {
    pub fn new(action: impl Into<String>, tag: impl Into<String>, task_ids: Vec<Address>, details: Value) -> Self {
        Self {
            timestamp: now_rfc3339(),
            actor: std::env::var("USER").ok().filter(|user| !user.trim().is_empty()),
            action: action.into(),
            tag: tag.into(),
            task_ids,
            details,
        }
    }
}

pub fn append_audit_event(path: &Path, event: &AuditEvent) -> Result<(), AuditError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let line = serde_json::to_string(event)?;
    writeln!(file, "{}", line)?;
    Ok(())
}
