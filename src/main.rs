//! keel CLI binary entry point.

use std::str::FromStr;
use std::sync::Arc;

use futures::StreamExt;
use keel::cli::demo;
use keel::cli::{Cli, Commands, ReplayArgs};
use keel::config::SessionConfig;
use keel::stream::wire;
use keel::{PermissionMode, Script, ScriptedTransport, Session, ToolRegistry};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse_args();

    let result = match cli.command {
        Commands::Replay(args) => handle_replay(args).await,
        Commands::Tools => handle_tools(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn handle_tools() -> Result<(), Box<dyn std::error::Error>> {
    let registry = ToolRegistry::build([demo::calculator_server()])?;
    for name in registry.names() {
        let description = registry
            .metadata(&name)
            .map(|meta| meta.description)
            .unwrap_or_default();
        println!("{name}\t{description}");
    }
    Ok(())
}

async fn handle_replay(args: ReplayArgs) -> Result<(), Box<dyn std::error::Error>> {
    let script = Script::load(&args.script)?;
    let transport = Arc::new(ScriptedTransport::from_script(script));

    let mut config = match &args.config {
        Some(path) => SessionConfig::load(path)?.with_env()?,
        None => SessionConfig::discover()?,
    };
    if let Some(mode) = &args.permission_mode {
        config.permission_mode = PermissionMode::from_str(mode)
            .map_err(|_| format!("Invalid permission mode: '{mode}'"))?;
    }

    let mut options = config.into_options();
    options.mcp_servers = vec![demo::calculator_server()];
    options.hooks = demo::demo_hooks();

    let session = Session::open(options, transport.clone())?;
    let prompts = if args.prompts.is_empty() {
        vec![demo::DEFAULT_PROMPT.to_string()]
    } else {
        args.prompts
    };

    for prompt in prompts {
        let mut stream = session.send(prompt)?;
        while let Some(message) = stream.next().await {
            println!("{}", wire::encode_line(&message)?);
        }
        if session.state().is_closed() {
            break;
        }
    }

    session.close().await;
    tracing::info!(
        session_id = session.id(),
        audit_records = session.audit_log().len(),
        unused_calls = transport.remaining(),
        "replay finished"
    );
    Ok(())
}
