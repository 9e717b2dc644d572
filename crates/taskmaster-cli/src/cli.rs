use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "task-master",
    version,
    about = "Validate, repair and move task dependencies across tags"
)]
pub struct Cli {
    /// Project root [default: nearest ancestor with .taskmaster/]
    #[arg(long, env = "TASKMASTER_ROOT", global = true)]
    pub root: Option<PathBuf>,

    /// Tasks document, overriding the configured location
    #[arg(short = 'f', long, global = true)]
    pub file: Option<PathBuf>,

    /// Tag to operate on [default: the current tag]
    #[arg(long, global = true)]
    pub tag: Option<String>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Log debug events to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Report dangling, self, duplicate and circular dependencies
    #[command(name = "validate-dependencies")]
    ValidateDependencies,

    /// Remove every invalid dependency
    #[command(name = "fix-dependencies")]
    FixDependencies {
        /// Report what would change without saving
        #[arg(long)]
        dry_run: bool,
    },

    /// Move tasks within a tag, or between tags with --to-tag
    ///
    /// Within a tag, --from and --to take comma-separated lists of equal
    /// length (e.g. --from 5,6 --to 10,11). Ids may be subtasks ("3.2").
    #[command(name = "move")]
    Move {
        /// Source id(s)
        #[arg(long)]
        from: String,
        /// Destination id(s), required within a tag
        #[arg(long)]
        to: Option<String>,
        /// Source tag [default: the current tag]
        #[arg(long)]
        from_tag: Option<String>,
        /// Target tag; switches to a cross-tag move
        #[arg(long)]
        to_tag: Option<String>,
        /// Move every prerequisite along with the tasks
        #[arg(long, conflicts_with = "ignore_dependencies")]
        with_dependencies: bool,
        /// Move as requested and drop dependencies that would cross tags
        #[arg(long)]
        ignore_dependencies: bool,
    },

    /// Add a dependency
    #[command(name = "add-dependency")]
    AddDependency {
        /// Task or subtask that gains the dependency
        #[arg(long)]
        id: String,
        /// Prerequisite task or subtask
        #[arg(long)]
        depends_on: String,
    },

    /// Remove a dependency
    #[command(name = "remove-dependency")]
    RemoveDependency {
        #[arg(long)]
        id: String,
        #[arg(long)]
        depends_on: String,
    },

    /// Remove tasks or subtasks and every dependency on them
    #[command(name = "remove-task")]
    RemoveTask {
        /// Comma-separated ids
        #[arg(long)]
        id: String,
    },

    /// List tags with task counts
    Tags,

    /// Switch the current tag
    #[command(name = "use-tag")]
    UseTag {
        /// Tag name
        name: String,
    },

    /// Print version information
    Version,
}
