//! Task dependency graph and tag workspace engine for task-master.

pub mod address;
pub mod audit;
pub mod config;
pub mod cross_tag;
pub mod fix;
pub mod graph;
pub mod move_task;
pub mod paths;
pub mod store;
pub mod task;
pub mod task_ops;
pub mod validate;

pub use address::{Address, AddressError};
pub use cross_tag::{CrossTagError, CrossTagMoveResult, DependencyConflict, MovePolicy};
pub use store::{JsonFileStore, Store, StoreError};
pub use task::{TaggedDocument, Task, Workspace};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::version;

    #[test]
    fn version_is_not_empty() {
        assert!(!version().is_empty());
    }
}
