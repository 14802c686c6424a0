//! Stash MCP server - main entry point.
//!
//! Loads configuration from the environment (and `.env`), connects to Stash
//! with bounded retry, then serves MCP over stdin/stdout until EOF or Ctrl-C.

use clap::Parser;
use std::sync::Arc;

use stash_mcp::gateway::{Connector, GraphqlGateway, StashGateway};
use stash_mcp::observability::init_tracing;
use stash_mcp::{AnalysisEngine, CatalogService, Config, StashServer, StdioServer};

#[derive(Parser, Debug)]
#[command(name = "stash-mcp", version, about = "MCP server for a Stash media catalogue")]
struct Args {
    /// Stash base URL (overrides STASH_ENDPOINT)
    #[arg(long)]
    endpoint: Option<String>,

    /// Log level (overrides STASH_LOG_LEVEL; RUST_LOG still wins)
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON logs on stderr
    #[arg(long, default_value_t = false)]
    json_logs: bool,

    /// Connect, print the Stash version and exit
    #[arg(long, default_value_t = false)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    dotenv::dotenv().ok();

    let mut config = Config::from_env()?;
    if let Some(endpoint) = args.endpoint {
        config.stash.endpoint = endpoint.trim_end_matches('/').to_string();
    }
    if let Some(level) = args.log_level {
        config.observability.log_level = level;
    }
    config.observability.json_logs |= args.json_logs;

    init_tracing(&config.observability);
    if let Err(err) = config.validate() {
        tracing::error!(error = %err, "invalid configuration");
        return Err(err.into());
    }
    tracing::debug!(?config, "configuration loaded");

    let mut connector = Connector::new(&config.stash);
    let gateway = connector.connect(GraphqlGateway::new(&config.stash)?).await?;
    if args.check {
        println!("{} ({})", gateway.endpoint(), gateway.version().await?);
        return Ok(());
    }

    let catalog = Arc::new(CatalogService::new(Arc::new(gateway), config.cache.clone()));
    let engine = Arc::new(AnalysisEngine::new(catalog, config.analysis.clone()));
    let server = StdioServer::new(Arc::new(StashServer::new(engine)?));

    let cancel = server.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
            cancel.cancel();
        }
    });

    tracing::info!(endpoint = %config.stash.endpoint, "stash-mcp ready on stdio");
    server.serve().await?;
    Ok(())
}
