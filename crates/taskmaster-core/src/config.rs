use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::task::DEFAULT_TAG;

pub const DEFAULT_TASKS_FILE: &str = ".taskmaster/tasks/tasks.json";
pub const DEFAULT_STATE_FILE: &str = ".taskmaster/state.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        "CONFIG_ERROR"
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskmasterConfig {
    /// Tasks document, relative to the project root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks_file: Option<String>,
    /// Tag used when the state file names none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_file: Option<String>,
}

impl TaskmasterConfig {
    /// Fills unset keys from `fallback`.
    pub fn or(self, fallback: TaskmasterConfig) -> TaskmasterConfig {
        TaskmasterConfig {
            tasks_file: self.tasks_file.or(fallback.tasks_file),
            default_tag: self.default_tag.or(fallback.default_tag),
            state_file: self.state_file.or(fallback.state_file),
        }
    }

    pub fn tasks_file(&self) -> &str {
        non_empty(self.tasks_file.as_deref()).unwrap_or(DEFAULT_TASKS_FILE)
    }

    pub fn state_file(&self) -> &str {
        non_empty(self.state_file.as_deref()).unwrap_or(DEFAULT_STATE_FILE)
    }

    pub fn default_tag(&self) -> &str {
        non_empty(self.default_tag.as_deref()).unwrap_or(DEFAULT_TAG)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

const CONFIG_FILES: [&str; 2] = [".taskmaster.toml", ".taskmasterrc"];

/// Project config file directly inside `dir`, if any.
pub fn project_config_file(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// `$TASKMASTER_HOME/config.toml`, else `~/.taskmaster/config.toml`.
fn global_config_path() -> Option<PathBuf> {
    let env_dir = |key: &str| {
        std::env::var(key)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
    };
    let home = env_dir("TASKMASTER_HOME").or_else(|| {
        env_dir("HOME")
            .or_else(|| env_dir("USERPROFILE"))
            .map(|home| home.join(".taskmaster"))
    })?;
    Some(home.join("config.toml"))
}

fn read_config(path: &Path) -> Result<TaskmasterConfig, ConfigError> {
    let text = fs::read_to_string(path)?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_config(project_root: &Path) -> Result<Option<TaskmasterConfig>, ConfigError> {
    match project_config_file(project_root) {
        Some(path) => read_config(&path).map(Some),
        None => Ok(None),
    }
}

fn load_global_config() -> Result<Option<TaskmasterConfig>, ConfigError> {
    match global_config_path() {
        Some(path) if path.is_file() => read_config(&path).map(Some),
        _ => Ok(None),
    }
}

/// Project settings layered over global ones.
pub fn resolve_config(project_root: &Path) -> Result<TaskmasterConfig, ConfigError> {
    let project = load_config(project_root)?.unwrap_or_default();
    let global = load_global_config()?.unwrap_or_default();
    Ok(project.or(global))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::ffi::OsString;
    use tempfile::TempDir;

    fn config_path(project_root: &Path) -> PathBuf {
        project_root.join(CONFIG_FILES[0])
    }

    struct EnvGuard {
        taskmaster_home: Option<OsString>,
    }

    impl EnvGuard {
        fn capture() -> Self {
            Self {
                taskmaster_home: std::env::var_os("TASKMASTER_HOME"),
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match self.taskmaster_home.as_ref() {
                Some(value) => std::env::set_var("TASKMASTER_HOME", value),
                None => std::env::remove_var("TASKMASTER_HOME"),
            }
        }
    }

    #[test]
    fn write_and_read_config() {
        let temp = TempDir::new().expect("tempdir");
        let config = TaskmasterConfig {
            tasks_file: Some("plan/tasks.json".to_string()),
            default_tag: Some("dev".to_string()),
            state_file: None,
        };
        let body = toml::to_string_pretty(&config).expect("toml");
        fs::write(config_path(temp.path()), body).expect("write config");
        let loaded = load_config(temp.path()).expect("load").expect("present");
        assert_eq!(loaded, config);
        assert_eq!(loaded.state_file(), DEFAULT_STATE_FILE);
    }

    #[test]
    fn rc_file_is_a_fallback_name() {
        let temp = TempDir::new().expect("tempdir");
        fs::write(temp.path().join(".taskmasterrc"), "default_tag = \"rc\"\n").expect("rc");
        let loaded = load_config(temp.path()).expect("load").expect("present");
        assert_eq!(loaded.default_tag(), "rc");
    }

    #[test]
    fn malformed_config_is_an_error() {
        let temp = TempDir::new().expect("tempdir");
        fs::write(config_path(temp.path()), "default_tag = [").expect("write");
        assert!(matches!(
            load_config(temp.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    #[serial]
    fn project_config_overrides_global() {
        let _env = EnvGuard::capture();
        let repo = TempDir::new().expect("repo tempdir");
        let home = TempDir::new().expect("home tempdir");
        std::env::set_var("TASKMASTER_HOME", home.path());

        let resolved = resolve_config(repo.path()).expect("defaults");
        assert_eq!(resolved.default_tag(), DEFAULT_TAG);
        assert_eq!(resolved.tasks_file(), DEFAULT_TASKS_FILE);

        fs::write(
            home.path().join("config.toml"),
            "default_tag = \"global\"\ntasks_file = \"global.json\"\n",
        )
        .expect("global config");
        let resolved = resolve_config(repo.path()).expect("global");
        assert_eq!(resolved.default_tag(), "global");

        fs::write(config_path(repo.path()), "default_tag = \"project\"\n").expect("project");
        let resolved = resolve_config(repo.path()).expect("project");
        assert_eq!(resolved.default_tag(), "project");
        assert_eq!(resolved.tasks_file(), "global.json");
    }
}
