mod cli;
mod output;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use taskmaster_core::address::AddressError;
use taskmaster_core::audit::{append_audit_event, AuditError, AuditEvent};
use taskmaster_core::config::ConfigError;
use taskmaster_core::cross_tag::move_between_tags;
use taskmaster_core::fix::{fix_dependencies, FixError};
use taskmaster_core::move_task::{move_batch, pair_batch, MoveError};
use taskmaster_core::paths::{locate_project_root, resolve_project, PathsError, ProjectPaths};
use taskmaster_core::task_ops::{
    add_dependency, list_tags, next_available_id, remove_dependency, remove_task, TaskOpError,
};
use taskmaster_core::validate::validate_dependencies;
use taskmaster_core::{Address, CrossTagError, JsonFileStore, MovePolicy, Store, StoreError};

#[derive(Debug, Error)]
enum CliError {
    #[error("--to is required when moving within a tag (or pass --to-tag)")]
    MissingDestination,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let json_output = cli.json;
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_error(&err, json_output);
            ExitCode::FAILURE
        }
    }
}

/// stderr only; stdout carries command output.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = std::env::var("TASKMASTER_LOG")
        .ok()
        .and_then(|value| EnvFilter::try_new(value).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .ok();
}

struct Project {
    paths: ProjectPaths,
    store: JsonFileStore,
}

impl Project {
    fn open(cli: &Cli) -> Result<Self> {
        let root = match &cli.root {
            Some(root) => root.clone(),
            None => {
                let cwd = std::env::current_dir().context("failed to read current directory")?;
                match locate_project_root(&cwd) {
                    Ok(root) => root,
                    Err(_) if cli.file.is_some() => cwd,
                    Err(err) => return Err(err.into()),
                }
            }
        };
        let paths = resolve_project(&root, cli.file.as_deref())?;
        debug!(
            root = %paths.root.display(),
            tasks_file = %paths.tasks_file.display(),
            "resolved project"
        );
        let store = JsonFileStore::from_paths(&paths);
        Ok(Self { paths, store })
    }

    fn tag(&self, explicit: Option<&str>) -> Result<String> {
        match explicit {
            Some(tag) => Ok(tag.to_string()),
            None => Ok(self.store.current_tag()?),
        }
    }

    fn audit(&self, action: &str, tag: &str, task_ids: Vec<Address>, details: Value) -> Result<()> {
        let event = AuditEvent::new(action, tag, task_ids, details);
        append_audit_event(&self.paths.audit_log, &event)?;
        Ok(())
    }
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    if let Command::Version = cli.command {
        if cli.json {
            print_json(&json!({ "version": taskmaster_core::version() }))?;
        } else {
            println!("task-master {}", taskmaster_core::version());
        }
        return Ok(());
    }

    let project = Project::open(&cli)?;
    let tag_flag = cli.tag.as_deref();

    match &cli.command {
        Command::Version => {}

        Command::ValidateDependencies => {
            let tag = project.tag(tag_flag)?;
            let ws = project.store.load(&tag)?;
            let report = validate_dependencies(&ws);
            debug!(tag = %tag, issues = report.issues.len(), "validated dependencies");
            if cli.json {
                print_json(&json!({
                    "tag": tag,
                    "valid": report.is_valid(),
                    "issues": report.issues,
                }))?;
            } else {
                print!("{}", output::format_validation(&tag, &report));
            }
        }

        Command::FixDependencies { dry_run } => {
            let tag = project.tag(tag_flag)?;
            let mut ws = project.store.load(&tag)?;
            let report = fix_dependencies(&mut ws)?;
            if !report.is_empty() && !dry_run {
                project.store.save(&tag, ws)?;
                let mut touched: Vec<Address> = report
                    .removed
                    .iter()
                    .chain(report.collapsed.iter())
                    .map(|change| change.address)
                    .collect();
                touched.sort();
                touched.dedup();
                project.audit(
                    "fix_dependencies",
                    &tag,
                    touched,
                    json!({ "removed": report.removed.len(), "collapsed": report.collapsed.len() }),
                )?;
                info!(
                    tag = %tag,
                    removed = report.removed.len(),
                    collapsed = report.collapsed.len(),
                    "fixed dependencies"
                );
            }
            if cli.json {
                print_json(&json!({
                    "tag": tag,
                    "dryRun": dry_run,
                    "removed": report.removed,
                    "collapsed": report.collapsed,
                }))?;
            } else {
                print!("{}", output::format_fix(&tag, &report, *dry_run));
            }
        }

        Command::Move {
            from,
            to,
            from_tag,
            to_tag,
            with_dependencies,
            ignore_dependencies,
        } => {
            let from_ids = Address::parse_list(from)?;
            let source_flag = from_tag.as_deref().or(tag_flag);
            match to_tag {
                Some(target) => {
                    if to.is_some() {
                        warn!("--to is ignored for cross-tag moves; ids are preserved");
                    }
                    let policy = MovePolicy::from_flags(*with_dependencies, *ignore_dependencies);
                    let source = project.tag(source_flag)?;
                    let mut doc = project.store.load_document()?;
                    let result = move_between_tags(&mut doc, &source, target, &from_ids, policy)?;
                    project.store.save_document(&doc)?;
                    project.audit(
                        "move_task_cross_tag",
                        &source,
                        result.moved.clone(),
                        json!({ "targetTag": target, "policy": policy, "tips": result.tips }),
                    )?;
                    info!(
                        source_tag = %source,
                        target_tag = %target,
                        moved = result.moved.len(),
                        "moved tasks across tags"
                    );
                    if cli.json {
                        print_json(&json!({
                            "sourceTag": source,
                            "targetTag": target,
                            "moved": result.moved,
                            "tips": result.tips,
                        }))?;
                    } else {
                        print!("{}", output::format_cross_tag(&source, target, &result));
                    }
                }
                None => {
                    let to = to.as_deref().ok_or(CliError::MissingDestination)?;
                    let to_ids = Address::parse_list(to)?;
                    let pairs = pair_batch(&from_ids, &to_ids)?;
                    let tag = project.tag(source_flag)?;
                    let mut ws = project.store.load(&tag)?;
                    let next_id = next_available_id(&ws);
                    let records = move_batch(&mut ws, &pairs).map_err(|err| {
                        let hint = matches!(err, MoveError::DestinationOccupied(_));
                        let err = anyhow::Error::from(err);
                        match next_id {
                            Some(id) if hint => {
                                err.context(format!("next available task id is {}", id))
                            }
                            None if hint => err.context("no task ids left in this tag"),
                            _ => err,
                        }
                    })?;
                    if records.iter().any(|record| !record.skipped) {
                        project.store.save(&tag, ws)?;
                        project.audit(
                            "move_task",
                            &tag,
                            records.iter().map(|record| record.from).collect(),
                            json!({ "moves": records }),
                        )?;
                        info!(tag = %tag, moves = records.len(), "moved tasks");
                    }
                    if cli.json {
                        print_json(&json!({ "tag": tag, "moves": records }))?;
                    } else {
                        print!("{}", output::format_moves(&tag, &records));
                    }
                }
            }
        }

        Command::AddDependency { id, depends_on } => {
            let node = Address::parse(id)?;
            let dependency = Address::parse(depends_on)?;
            let tag = project.tag(tag_flag)?;
            let mut ws = project.store.load(&tag)?;
            add_dependency(&mut ws, node, dependency)?;
            project.store.save(&tag, ws)?;
            project.audit(
                "add_dependency",
                &tag,
                vec![node],
                json!({ "dependsOn": dependency }),
            )?;
            info!(tag = %tag, node = %node, dependency = %dependency, "added dependency");
            if cli.json {
                print_json(&json!({ "tag": tag, "id": node, "dependsOn": dependency }))?;
            } else {
                println!("Task {} now depends on {}", node, dependency);
            }
        }

        Command::RemoveDependency { id, depends_on } => {
            let node = Address::parse(id)?;
            let dependency = Address::parse(depends_on)?;
            let tag = project.tag(tag_flag)?;
            let mut ws = project.store.load(&tag)?;
            remove_dependency(&mut ws, node, dependency)?;
            project.store.save(&tag, ws)?;
            project.audit(
                "remove_dependency",
                &tag,
                vec![node],
                json!({ "dependsOn": dependency }),
            )?;
            info!(tag = %tag, node = %node, dependency = %dependency, "removed dependency");
            if cli.json {
                print_json(&json!({ "tag": tag, "id": node, "dependsOn": dependency }))?;
            } else {
                println!("Task {} no longer depends on {}", node, dependency);
            }
        }

        Command::RemoveTask { id } => {
            let ids = Address::parse_list(id)?;
            let tag = project.tag(tag_flag)?;
            let mut ws = project.store.load(&tag)?;
            let mut reports = Vec::with_capacity(ids.len());
            for addr in &ids {
                reports.push(remove_task(&mut ws, *addr)?);
            }
            project.store.save(&tag, ws)?;
            project.audit("remove_task", &tag, ids.clone(), json!({ "removed": reports }))?;
            info!(tag = %tag, removed = ids.len(), "removed tasks");
            if cli.json {
                print_json(&json!({ "tag": tag, "removed": reports }))?;
            } else {
                for report in &reports {
                    print!("{}", output::format_removal(report));
                }
            }
        }

        Command::Tags => {
            let doc = project.store.load_document()?;
            let current = project.store.current_tag()?;
            let tags = list_tags(&doc, &current);
            if cli.json {
                print_json(&json!({ "currentTag": current, "tags": tags }))?;
            } else {
                print!("{}", output::format_tags(&tags));
            }
        }

        Command::UseTag { name } => {
            project.store.set_current_tag(name)?;
            info!(tag = %name, "switched current tag");
            if cli.json {
                print_json(&json!({ "currentTag": name }))?;
            } else {
                println!("Switched to tag '{}'", name);
            }
        }
    }
    Ok(())
}

fn error_code(err: &anyhow::Error) -> &'static str {
    if let Some(err) = err.downcast_ref::<CrossTagError>() {
        return err.code();
    }
    if let Some(err) = err.downcast_ref::<MoveError>() {
        return err.code();
    }
    if let Some(err) = err.downcast_ref::<TaskOpError>() {
        return err.code();
    }
    if let Some(err) = err.downcast_ref::<FixError>() {
        return err.code();
    }
    if let Some(err) = err.downcast_ref::<StoreError>() {
        return err.code();
    }
    if let Some(err) = err.downcast_ref::<AddressError>() {
        return err.code();
    }
    if let Some(err) = err.downcast_ref::<PathsError>() {
        return err.code();
    }
    if let Some(err) = err.downcast_ref::<ConfigError>() {
        return err.code();
    }
    if let Some(err) = err.downcast_ref::<AuditError>() {
        return err.code();
    }
    if err.downcast_ref::<CliError>().is_some() {
        return "INVALID_ARGUMENTS";
    }
    "ERROR"
}

fn report_error(err: &anyhow::Error, json_output: bool) {
    let code = error_code(err);
    let conflicts = err
        .downcast_ref::<CrossTagError>()
        .map(|err| err.conflicts().to_vec())
        .unwrap_or_default();
    if json_output {
        let mut payload = json!({ "error": format!("{err:#}"), "code": code });
        if !conflicts.is_empty() {
            payload["conflicts"] = json!(conflicts);
        }
        println!(
            "{}",
            serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string())
        );
        return;
    }
    eprintln!("error [{code}]: {err:#}");
    if !conflicts.is_empty() {
        eprint!("{}", output::format_conflicts(&conflicts));
    }
}
