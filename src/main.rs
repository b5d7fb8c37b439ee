//! phalcon-mcp — MCP stdio server entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Parse CLI flags
//!   3. Load config
//!   4. Init logger once (CLI `-v` flags > env > config)
//!   5. Build the store registry and run the first discovery pass
//!   6. Spawn Ctrl-C → shutdown signal watcher
//!   7. Serve MCP over stdin/stdout until EOF or shutdown

use std::sync::Arc;

use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use phalcon_mcp::config;
use phalcon_mcp::cursor::{QueryEngine, StoreRegistry};
use phalcon_mcp::error::AppError;
use phalcon_mcp::logger;
use phalcon_mcp::mcp::{McpServer, Toolbox};
use phalcon_mcp::phalcon::PhalconRunner;

struct CliArgs {
    log_level: Option<&'static str>,
    config_path: Option<String>,
}

#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: {e}");
            1
        }
    };
    // stdin may still be parked in a blocking read; exit without waiting on it.
    std::process::exit(code);
}

async fn run() -> Result<(), AppError> {
    // Load .env if present; the file is optional.
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();
    let config = config::load(args.config_path.as_deref())?;

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    logger::init(effective_log_level, args.log_level.is_some(), config.log_file.as_deref())?;

    info!(
        configured_log_level = %config.log_level,
        effective_log_level = %effective_log_level,
        phalcon = %config.phalcon.executable,
        "config loaded"
    );

    let registry = Arc::new(StoreRegistry::from_config(&config.cursor));
    let summary = registry.refresh();
    match &summary.root {
        Some(root) => info!(
            root = %root.display(),
            projects = summary.project_count,
            "cursor stores discovered"
        ),
        None => warn!("no Cursor root available; only explicit project directories are searched"),
    }

    let toolbox = Toolbox::new(
        QueryEngine::new(Arc::clone(&registry)),
        PhalconRunner::from_config(&config.phalcon),
    );
    let server = Arc::new(McpServer::new(toolbox));

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("ctrl-c received; shutting down");
                shutdown.cancel();
            }
        });
    }

    info!("serving MCP on stdio");
    server
        .serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout(), shutdown)
        .await?;

    info!("server stopped");
    Ok(())
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut config_path = None;

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                // stdout is free here: the protocol has not started.
                println!("Usage: phalcon-mcp [OPTIONS]");
                println!();
                println!("Serves MCP (JSON-RPC 2.0) on stdin/stdout.");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -f, --config <PATH>        Path to configuration file");
                println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
                std::process::exit(0);
            }
            "-f" | "--config" => {
                if let Some(path) = iter.next() {
                    config_path = Some(path);
                } else {
                    eprintln!("error: -f/--config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            other => eprintln!("warning: ignoring unknown argument '{other}'"),
        }
    }

    CliArgs {
        log_level: logger::level_for_verbosity(verbosity),
        config_path,
    }
}
