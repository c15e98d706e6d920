//! Branching gateway.
//!
//! An HTTP gateway that routes each request either through an alternate
//! middleware chain or straight to the upstream, depending on conditions
//! evaluated against the request.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────▶ request id → trace → timeout → metrics
//!                                              │
//!                                              ▼
//!                                   ┌────────────────────┐  true   ┌──────────────┐
//!                                   │ branch "first"     │───────▶│ alt. chain   │──┐
//!                                   │ (condition)        │         └──────────────┘  │
//!                                   └─────────┬──────────┘                           │
//!                                    false /  │  error (fail open)                   │
//!                                             ▼                                      │
//!                                   ┌────────────────────┐                           │
//!                                   │ branch "second"    │◀──────────────────────────┘
//!                                   └─────────┬──────────┘
//!                                             ▼
//!                                   ┌────────────────────┐
//!                                   │ upstream forwarder │──────▶ Upstream
//!                                   └────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use branching_router::config::load_config;
use branching_router::http::GatewayServer;
use branching_router::lifecycle::Shutdown;
use branching_router::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "branching-gateway", version)]
#[command(about = "HTTP gateway with condition-based middleware branching", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "branching.toml")]
    config: PathBuf,

    /// Validate the configuration, build every branch, and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)?;
    logging::init_logging(&config.observability);

    tracing::info!(
        path = %cli.config.display(),
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.url,
        branches = config.branches.len(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if cli.check {
        GatewayServer::new(config)?;
        tracing::info!("Configuration is valid");
        return Ok(());
    }

    // Decision counters are registered when branches are built, so the
    // recorder has to exist first.
    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let bind_address = config.listener.bind_address.clone();
    let server = GatewayServer::new(config)?;

    let listener = TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    shutdown.trigger_on_signal();

    server.run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
