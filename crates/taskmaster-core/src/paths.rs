use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::{project_config_file, resolve_config, ConfigError, TaskmasterConfig};

pub const PROJECT_DIR: &str = ".taskmaster";

#[derive(Debug, Error)]
pub enum PathsError {
    #[error("No task-master project found at or above {0}")]
    NotFound(PathBuf),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl PathsError {
    pub fn code(&self) -> &'static str {
        match self {
            PathsError::NotFound(_) => "PROJECT_NOT_FOUND",
            PathsError::Config(err) => err.code(),
        }
    }
}

/// Every file location a command needs, resolved once.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    pub root: PathBuf,
    pub tasks_file: PathBuf,
    pub state_file: PathBuf,
    pub audit_log: PathBuf,
    pub config: TaskmasterConfig,
}

impl ProjectPaths {
    pub fn default_tag(&self) -> &str {
        self.config.default_tag()
    }
}

/// Resolves paths for the project rooted at `root`. `tasks_file` overrides the
/// configured document location; relative overrides are taken from `root`.
pub fn resolve_project(root: &Path, tasks_file: Option<&Path>) -> Result<ProjectPaths, PathsError> {
    let config = resolve_config(root)?;
    let tasks_file = match tasks_file {
        Some(path) => absolutize(root, path),
        None => root.join(config.tasks_file()),
    };
    let state_file = root.join(config.state_file());
    Ok(ProjectPaths {
        root: root.to_path_buf(),
        tasks_file,
        state_file,
        audit_log: root.join(PROJECT_DIR).join(".audit.log"),
        config,
    })
}

/// Walks up from `start` to the nearest directory that has a project config
/// file or a `.taskmaster` directory.
pub fn locate_project_root(start: &Path) -> Result<PathBuf, PathsError> {
    let start = start.canonicalize().unwrap_or_else(|_| start.to_path_buf());
    for candidate in start.ancestors() {
        if project_config_file(candidate).is_some() || candidate.join(PROJECT_DIR).is_dir() {
            return Ok(candidate.to_path_buf());
        }
    }
    Err(PathsError::NotFound(start))
}

fn absolutize(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}
