use anyhow::{Context, Result};
use log::info;
use std::sync::Arc;

use qdrant_notes::config::{Settings, Transport};
use qdrant_notes::embeddings::create_provider;
use qdrant_notes::mcp::{self, ToolServer};
use qdrant_notes::store::open_store;

fn main() -> Result<()> {
    // stderr only: stdout carries the stdio transport
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let settings = Settings::from_env().context("Invalid configuration")?;

    let store = open_store(&settings.store, settings.timeout).context("Failed to open vector store")?;
    let provider = create_provider(&settings.embedding).context("Failed to create embedding provider")?;
    info!(
        "{} v{}: {} store, model {} ({} dims), collection {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        store.backend_name(),
        provider.model_name(),
        provider.dimension(),
        settings.collection_name.as_deref().unwrap_or("<per call>")
    );
    if settings.read_only {
        info!("Read-only mode: write tools disabled");
    }

    let server = ToolServer::from_settings(&settings, store, provider);

    match settings.transport {
        Transport::Stdio => {
            let stdin = std::io::stdin();
            mcp::run_stdio(&server, stdin.lock(), std::io::stdout())
        }
        Transport::Http => mcp::http::serve(Arc::new(server), settings.http_addr, settings.http_token.clone()),
    }
}
