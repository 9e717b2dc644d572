use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rust_mcp_sdk::macros::{mcp_tool, JsonSchema};
use rust_mcp_sdk::schema::{
    schema_utils::CallToolError, CallToolRequestParams, CallToolResult, ListToolsResult,
    PaginatedRequestParams, RpcError, TextContent,
};
use rust_mcp_sdk::tool_box;
use rust_mcp_sdk::{mcp_server::ServerHandler, McpServer};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use taskmaster_core::address::AddressError;
use taskmaster_core::audit::{append_audit_event, AuditError, AuditEvent};
use taskmaster_core::cross_tag::move_between_tags;
use taskmaster_core::fix::{fix_dependencies, FixError};
use taskmaster_core::move_task::{move_batch, pair_batch, MoveError};
use taskmaster_core::paths::{locate_project_root, resolve_project, PathsError, ProjectPaths};
use taskmaster_core::task_ops::{
    add_dependency, list_tags, remove_dependency, remove_task, TaskOpError,
};
use taskmaster_core::validate::validate_dependencies;
use taskmaster_core::{Address, CrossTagError, JsonFileStore, MovePolicy, Store, StoreError};

const ROOT_REQUIRED_ERROR: &str =
    "root is required for MCP calls unless the server is started within a task-master project";

#[derive(Clone)]
pub struct McpContext {
    pub default_root: Option<PathBuf>,
}

/// Domain failure reported to the client as a JSON payload.
type ToolOutcome = Result<Value, Value>;

trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn payload(&self) -> Value {
        json!({ "error": self.to_string(), "code": self.error_code() })
    }
}

macro_rules! error_code {
    ($($ty:ty),* $(,)?) => {
        $(impl ErrorCode for $ty {
            fn error_code(&self) -> &'static str {
                self.code()
            }
        })*
    };
}

error_code!(
    AddressError,
    AuditError,
    FixError,
    MoveError,
    PathsError,
    StoreError,
    TaskOpError,
);

impl ErrorCode for CrossTagError {
    fn error_code(&self) -> &'static str {
        self.code()
    }

    fn payload(&self) -> Value {
        let mut payload = json!({ "error": self.to_string(), "code": self.code() });
        if !self.conflicts().is_empty() {
            payload["conflicts"] = json!(self.conflicts());
        }
        payload
    }
}

fn fail<E: ErrorCode>(err: E) -> Value {
    debug!(code = err.error_code(), error = %err, "tool call failed");
    err.payload()
}

struct Project {
    paths: ProjectPaths,
    store: JsonFileStore,
}

impl Project {
    fn tag(&self, explicit: Option<&str>) -> Result<String, Value> {
        match explicit.map(str::trim).filter(|tag| !tag.is_empty()) {
            Some(tag) => Ok(tag.to_string()),
            None => self.store.current_tag().map_err(fail),
        }
    }

    fn audit(&self, action: &str, tag: &str, task_ids: Vec<Address>, details: Value) -> Result<(), Value> {
        let mut event = AuditEvent::new(action, tag, task_ids, details);
        event.actor = Some("mcp".to_string());
        append_audit_event(&self.paths.audit_log, &event).map_err(fail)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn open_project(context: &McpContext, root: Option<&str>, file: Option<&str>) -> Result<Project, Value> {
    let used_root = non_empty(root)
        .map(PathBuf::from)
        .or_else(|| context.default_root.clone());
    let root = match used_root {
        Some(root) => root,
        None => {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            match locate_project_root(&cwd) {
                Ok(root) => root,
                Err(_) if non_empty(file).is_some() => cwd,
                Err(_) => return Err(json!({ "error": ROOT_REQUIRED_ERROR, "code": "PROJECT_NOT_FOUND" })),
            }
        }
    };
    let paths = resolve_project(&root, non_empty(file).map(Path::new)).map_err(fail)?;
    let store = JsonFileStore::from_paths(&paths);
    Ok(Project { paths, store })
}

fn ok_text(content: String) -> Result<CallToolResult, CallToolError> {
    Ok(CallToolResult::text_content(vec![TextContent::from(
        content,
    )]))
}

fn ok_json(value: Value) -> Result<CallToolResult, CallToolError> {
    let text = serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string());
    ok_text(text)
}

fn respond(outcome: ToolOutcome) -> Result<CallToolResult, CallToolError> {
    match outcome {
        Ok(value) => ok_json(value),
        Err(err) => ok_json(err),
    }
}

fn default_format() -> String {
    "json".to_string()
}

#[mcp_tool(name = "version", description = "Return task-master version information.")]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct VersionTool {
    #[serde(default = "default_format")]
    pub format: String,
}

#[mcp_tool(
    name = "validate_dependencies",
    description = "Report dangling, self, duplicate and circular dependencies in a tag without changing it."
)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct ValidateDependenciesTool {
    pub root: Option<String>,
    pub file: Option<String>,
    pub tag: Option<String>,
}

#[mcp_tool(
    name = "fix_dependencies",
    description = "Remove invalid dependencies in a tag: dangling, self and duplicate edges, and one edge per cycle."
)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct FixDependenciesTool {
    pub root: Option<String>,
    pub file: Option<String>,
    pub tag: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
}

#[mcp_tool(
    name = "move_task",
    description = "Move tasks within a tag (from/to id lists, e.g. \"5,6\" -> \"10,11\", subtasks as \"3.2\"), or to another tag when to_tag is given."
)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct MoveTaskTool {
    pub from: String,
    pub to: Option<String>,
    pub from_tag: Option<String>,
    pub to_tag: Option<String>,
    #[serde(default)]
    pub with_dependencies: bool,
    #[serde(default)]
    pub ignore_dependencies: bool,
    pub root: Option<String>,
    pub file: Option<String>,
    pub tag: Option<String>,
}

#[mcp_tool(name = "add_dependency", description = "Add a dependency to a task or subtask.")]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct AddDependencyTool {
    pub id: String,
    pub depends_on: String,
    pub root: Option<String>,
    pub file: Option<String>,
    pub tag: Option<String>,
}

#[mcp_tool(
    name = "remove_dependency",
    description = "Remove a dependency from a task or subtask."
)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct RemoveDependencyTool {
    pub id: String,
    pub depends_on: String,
    pub root: Option<String>,
    pub file: Option<String>,
    pub tag: Option<String>,
}

#[mcp_tool(
    name = "remove_task",
    description = "Remove tasks or subtasks (comma-separated ids) and every dependency on them."
)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct RemoveTaskTool {
    pub id: String,
    pub root: Option<String>,
    pub file: Option<String>,
    pub tag: Option<String>,
}

#[mcp_tool(name = "list_tags", description = "List tags with task counts and the current tag.")]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct ListTagsTool {
    pub root: Option<String>,
    pub file: Option<String>,
}

tool_box!(
    TaskmasterTools,
    [
        VersionTool,
        ValidateDependenciesTool,
        FixDependenciesTool,
        MoveTaskTool,
        AddDependencyTool,
        RemoveDependencyTool,
        RemoveTaskTool,
        ListTagsTool
    ]
);

pub struct TaskmasterServerHandler {
    pub context: McpContext,
}

#[async_trait]
impl ServerHandler for TaskmasterServerHandler {
    async fn handle_list_tools_request(
        &self,
        _params: Option<PaginatedRequestParams>,
        _runtime: std::sync::Arc<dyn McpServer>,
    ) -> Result<ListToolsResult, RpcError> {
        Ok(ListToolsResult {
            meta: None,
            next_cursor: None,
            tools: TaskmasterTools::tools(),
        })
    }

    async fn handle_call_tool_request(
        &self,
        params: CallToolRequestParams,
        _runtime: std::sync::Arc<dyn McpServer>,
    ) -> Result<CallToolResult, CallToolError> {
        debug!(tool = %params.name, "call tool");
        let tool = TaskmasterTools::try_from(params).map_err(CallToolError::new)?;
        match tool {
            TaskmasterTools::VersionTool(tool) => tool.call(&self.context),
            TaskmasterTools::ValidateDependenciesTool(tool) => respond(tool.call(&self.context)),
            TaskmasterTools::FixDependenciesTool(tool) => respond(tool.call(&self.context)),
            TaskmasterTools::MoveTaskTool(tool) => respond(tool.call(&self.context)),
            TaskmasterTools::AddDependencyTool(tool) => respond(tool.call(&self.context)),
            TaskmasterTools::RemoveDependencyTool(tool) => respond(tool.call(&self.context)),
            TaskmasterTools::RemoveTaskTool(tool) => respond(tool.call(&self.context)),
            TaskmasterTools::ListTagsTool(tool) => respond(tool.call(&self.context)),
        }
    }
}

impl VersionTool {
    fn call(&self, _context: &McpContext) -> Result<CallToolResult, CallToolError> {
        let version = taskmaster_core::version();
        if self.format == "text" {
            return ok_text(format!("task-master {}\n", version));
        }
        ok_json(json!({ "name": "task-master", "version": version }))
    }
}

impl ValidateDependenciesTool {
    fn call(&self, context: &McpContext) -> ToolOutcome {
        let project = open_project(context, self.root.as_deref(), self.file.as_deref())?;
        let tag = project.tag(self.tag.as_deref())?;
        let ws = project.store.load(&tag).map_err(fail)?;
        let report = validate_dependencies(&ws);
        Ok(json!({
            "tag": tag,
            "valid": report.is_valid(),
            "issues": report.issues,
        }))
    }
}

impl FixDependenciesTool {
    fn call(&self, context: &McpContext) -> ToolOutcome {
        let project = open_project(context, self.root.as_deref(), self.file.as_deref())?;
        let tag = project.tag(self.tag.as_deref())?;
        let mut ws = project.store.load(&tag).map_err(fail)?;
        let report = fix_dependencies(&mut ws).map_err(fail)?;
        if !report.is_empty() && !self.dry_run {
            project.store.save(&tag, ws).map_err(fail)?;
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
            info!(tag = %tag, changes = report.total(), "fixed dependencies");
        }
        Ok(json!({
            "tag": tag,
            "dryRun": self.dry_run,
            "removed": report.removed,
            "collapsed": report.collapsed,
        }))
    }
}

impl MoveTaskTool {
    fn call(&self, context: &McpContext) -> ToolOutcome {
        let project = open_project(context, self.root.as_deref(), self.file.as_deref())?;
        let from = Address::parse_list(&self.from).map_err(fail)?;
        let source_flag = non_empty(self.from_tag.as_deref()).or(non_empty(self.tag.as_deref()));

        if let Some(target) = non_empty(self.to_tag.as_deref()) {
            let policy = MovePolicy::from_flags(self.with_dependencies, self.ignore_dependencies);
            let source = project.tag(source_flag)?;
            let mut doc = project.store.load_document().map_err(fail)?;
            let result =
                move_between_tags(&mut doc, &source, target, &from, policy).map_err(fail)?;
            project.store.save_document(&doc).map_err(fail)?;
            project.audit(
                "move_task_cross_tag",
                &source,
                result.moved.clone(),
                json!({ "targetTag": target, "policy": policy, "tips": result.tips }),
            )?;
            info!(source_tag = %source, target_tag = %target, moved = result.moved.len(), "moved tasks across tags");
            return Ok(json!({
                "sourceTag": source,
                "targetTag": target,
                "moved": result.moved,
                "tips": result.tips,
            }));
        }

        let to = match non_empty(self.to.as_deref()) {
            Some(to) => Address::parse_list(to).map_err(fail)?,
            None => {
                return Err(json!({
                    "error": "to is required when moving within a tag (or pass to_tag)",
                    "code": "INVALID_ARGUMENTS",
                }))
            }
        };
        let pairs = pair_batch(&from, &to).map_err(fail)?;
        let tag = project.tag(source_flag)?;
        let mut ws = project.store.load(&tag).map_err(fail)?;
        let records = move_batch(&mut ws, &pairs).map_err(fail)?;
        if records.iter().any(|record| !record.skipped) {
            project.store.save(&tag, ws).map_err(fail)?;
            project.audit(
                "move_task",
                &tag,
                records.iter().map(|record| record.from).collect(),
                json!({ "moves": records }),
            )?;
            info!(tag = %tag, moves = records.len(), "moved tasks");
        }
        Ok(json!({ "tag": tag, "moves": records }))
    }
}

impl AddDependencyTool {
    fn call(&self, context: &McpContext) -> ToolOutcome {
        let project = open_project(context, self.root.as_deref(), self.file.as_deref())?;
        let node = Address::parse(&self.id).map_err(fail)?;
        let dependency = Address::parse(&self.depends_on).map_err(fail)?;
        let tag = project.tag(self.tag.as_deref())?;
        let mut ws = project.store.load(&tag).map_err(fail)?;
        add_dependency(&mut ws, node, dependency).map_err(fail)?;
        project.store.save(&tag, ws).map_err(fail)?;
        project.audit("add_dependency", &tag, vec![node], json!({ "dependsOn": dependency }))?;
        info!(tag = %tag, node = %node, dependency = %dependency, "added dependency");
        Ok(json!({ "tag": tag, "id": node, "dependsOn": dependency }))
    }
}

impl RemoveDependencyTool {
    fn call(&self, context: &McpContext) -> ToolOutcome {
        let project = open_project(context, self.root.as_deref(), self.file.as_deref())?;
        let node = Address::parse(&self.id).map_err(fail)?;
        let dependency = Address::parse(&self.depends_on).map_err(fail)?;
        let tag = project.tag(self.tag.as_deref())?;
        let mut ws = project.store.load(&tag).map_err(fail)?;
        remove_dependency(&mut ws, node, dependency).map_err(fail)?;
        project.store.save(&tag, ws).map_err(fail)?;
        project.audit("remove_dependency", &tag, vec![node], json!({ "dependsOn": dependency }))?;
        info!(tag = %tag, node = %node, dependency = %dependency, "removed dependency");
        Ok(json!({ "tag": tag, "id": node, "dependsOn": dependency }))
    }
}

impl RemoveTaskTool {
    fn call(&self, context: &McpContext) -> ToolOutcome {
        let project = open_project(context, self.root.as_deref(), self.file.as_deref())?;
        let ids = Address::parse_list(&self.id).map_err(fail)?;
        let tag = project.tag(self.tag.as_deref())?;
        let mut ws = project.store.load(&tag).map_err(fail)?;
        let mut reports = Vec::with_capacity(ids.len());
        for addr in &ids {
            reports.push(remove_task(&mut ws, *addr).map_err(fail)?);
        }
        project.store.save(&tag, ws).map_err(fail)?;
        project.audit("remove_task", &tag, ids.clone(), json!({ "removed": reports }))?;
        info!(tag = %tag, removed = ids.len(), "removed tasks");
        Ok(json!({ "tag": tag, "removed": reports }))
    }
}

impl ListTagsTool {
    fn call(&self, context: &McpContext) -> ToolOutcome {
        let project = open_project(context, self.root.as_deref(), self.file.as_deref())?;
        let doc = project.store.load_document().map_err(fail)?;
        let current = project.store.current_tag().map_err(fail)?;
        Ok(json!({ "currentTag": current, "tags": list_tags(&doc, &current) }))
    }
}
