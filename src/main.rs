//! cfgd — running/candidate configuration daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────┐
//!                    │                    cfgd                       │
//!                    │                                               │
//!   HTTP Request     │  ┌─────────┐   ┌──────────┐   ┌───────────┐  │
//!   ─────────────────┼─▶│  http   │──▶│ session  │──▶│transaction│  │
//!                    │  │ server  │   │  tokens  │   │  manager  │  │
//!                    │  └─────────┘   └──────────┘   └─────┬─────┘  │
//!                    │                                     │        │
//!                    │              ┌──────────────────────┼──────┐ │
//!                    │              │        core engine   ▼      │ │
//!                    │              │  ┌──────┐ ┌──────┐ ┌──────┐ │ │
//!                    │              │  │ tree │ │ path │ │constr│ │ │
//!                    │              │  └──────┘ └──────┘ └──────┘ │ │
//!                    │              │        ┌──────┐             │ │
//!                    │              │        │ deps │             │ │
//!                    │              │        └──────┘             │ │
//!                    │              └─────────────────────────────┘ │
//!                    │  ┌────────────────────────────────────────┐  │
//!                    │  │ config documents │ observability       │  │
//!                    │  └────────────────────────────────────────┘  │
//!                    └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{CommandFactory, Parser};
use tokio::net::TcpListener;

use cfgd::config::load_from_files;
use cfgd::observability::{init_logging, init_metrics};
use cfgd::session::DEFAULT_SESSION_TIMEOUT;
use cfgd::{AppState, HttpServer, SessionManager, TransactionManager};

#[derive(Parser, Debug)]
#[command(name = "cfgd")]
#[command(about = "Running/candidate configuration daemon", long_about = None)]
struct Cli {
    /// Path to the JSON configuration document
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Path to the JSON Schema document
    #[arg(short = 's', long = "schema")]
    schema: Option<PathBuf>,

    /// Bind address (e.g. 0.0.0.0)
    #[arg(short = 'a', long = "address")]
    address: Option<String>,

    /// Bind port
    #[arg(short = 'p', long = "port")]
    port: Option<u16>,

    /// Prometheus exporter bind address (disabled when absent)
    #[arg(long = "metrics-address")]
    metrics_address: Option<std::net::SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let cli = Cli::parse();
    let (config, schema, address, port) = match (cli.config, cli.schema, cli.address, cli.port) {
        (Some(config), Some(schema), Some(address), Some(port)) => {
            (config, schema, address, port)
        }
        _ => {
            // A missing flag prints usage and exits cleanly; only a
            // malformed invocation is an error (clap handles that).
            Cli::command().print_help()?;
            return Ok(());
        }
    };

    tracing::info!("cfgd v0.1.0 starting");

    let loaded = match load_from_files(&config, &schema) {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load configuration documents");
            return Err(e.into());
        }
    };

    tracing::info!(
        config = %config.display(),
        schema = %schema.display(),
        "Configuration loaded"
    );

    if let Some(metrics_addr) = cli.metrics_address {
        init_metrics(metrics_addr);
    }

    let manager = Arc::new(TransactionManager::new(loaded));
    let sessions = Arc::new(SessionManager::new(
        Arc::clone(&manager),
        DEFAULT_SESSION_TIMEOUT,
    ));
    let state = AppState { manager, sessions };

    let listener = TcpListener::bind((address.as_str(), port)).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        "Listening for connections"
    );

    let server = HttpServer::new(state, Duration::from_secs(30));
    server.run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
