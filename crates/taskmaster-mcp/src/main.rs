mod tools;

use std::path::PathBuf;

use clap::Parser;
use rust_mcp_sdk::error::SdkResult;
use rust_mcp_sdk::schema::{
    Implementation, InitializeResult, ProtocolVersion, ServerCapabilities, ServerCapabilitiesTools,
};
use rust_mcp_sdk::{
    mcp_server::{server_runtime, McpServerOptions},
    McpServer, StdioTransport, ToMcpServerHandler, TransportOptions,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::tools::{McpContext, TaskmasterServerHandler};

#[derive(Parser)]
#[command(name = "task-master-mcp", version)]
struct Args {
    /// Default project root for tool calls that omit `root`.
    #[arg(long, env = "TASKMASTER_ROOT")]
    root: Option<PathBuf>,
}

// stdout belongs to the transport.
fn init_logging() {
    let filter = std::env::var("TASKMASTER_LOG")
        .ok()
        .and_then(|value| EnvFilter::try_new(value).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init()
        .ok();
}

#[tokio::main]
async fn main() -> SdkResult<()> {
    let args = Args::parse();
    init_logging();

    let server_details = InitializeResult {
        server_info: Implementation {
            name: "task-master".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            title: Some("Task Master MCP Server".into()),
            description: Some("Dependency validation, repair and task moves for tagged task lists".into()),
            icons: vec![],
            website_url: None,
        },
        capabilities: ServerCapabilities {
            tools: Some(ServerCapabilitiesTools { list_changed: None }),
            ..Default::default()
        },
        meta: None,
        instructions: Some(
            "Pass `root` (or start the server with --root) to select a project. Errors come back as JSON with `error` and `code`.".into(),
        ),
        protocol_version: ProtocolVersion::V2025_11_25.into(),
    };

    let transport = StdioTransport::new(TransportOptions::default())?;
    info!(root = ?args.root, "starting task-master MCP server");
    let handler = TaskmasterServerHandler {
        context: McpContext {
            default_root: args.root,
        },
    };

    let server = server_runtime::create_server(McpServerOptions {
        server_details,
        transport,
        handler: handler.to_mcp_server_handler(),
        task_store: None,
        client_task_store: None,
    });

    server.start().await
}
