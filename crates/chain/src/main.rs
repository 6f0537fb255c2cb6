//! bridge-node: HTTP query front-end over the persisted bridge state.
//!
//! Usage: `bridge-node [config.toml]`. Without a config file the defaults
//! are used. Log filtering follows `RUST_LOG` (default `info`).

use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use bridge_chain::query::snapshot_query;
use bridge_chain::rpc;
use bridge_chain::store::LmdbStore;
use bridge_common::config::load_from_file;
use bridge_common::NodeConfig;

const DEFAULT_CONFIG_PATH: &str = "bridge.toml";

fn load_config() -> anyhow::Result<NodeConfig> {
    let path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    if Path::new(&path).exists() {
        load_from_file(&path).with_context(|| format!("loading config {}", path))
    } else {
        warn!(path = %path, "config file not found, using defaults");
        Ok(NodeConfig::default())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = load_config()?;
    let store = Arc::new(
        LmdbStore::open(&config.data_dir).with_context(|| format!("opening store at {}", config.data_dir))?,
    );

    match snapshot_query(&*store).and_then(|q| q.latest_span()) {
        Ok(Some(span)) => info!(span_id = span.id, end_block = span.end_block, "state loaded"),
        Ok(None) => warn!("store has no genesis yet"),
        Err(e) => warn!(error = %e, "could not read latest span"),
    }

    let app = rpc::router(store);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, chain_id = %config.chain_id, "bridge-node listening");
    axum::serve(listener, app).await?;
    Ok(())
}
