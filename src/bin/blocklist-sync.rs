//! Applies a verified blocklist document to every configured server, in order.
//!
//! File paths come from `BLOCKSYNC_CONFIG` / `BLOCKSYNC_DATA` (a `.env` file is honoured),
//! or from the first two arguments.

use blocklist_sync::{apply_server, load_block_file, load_config, Stats};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("blocklist_sync=info".parse()?))
        .init();

    let mut args = std::env::args().skip(1);
    let config_path = std::env::var("BLOCKSYNC_CONFIG")
        .ok()
        .or_else(|| args.next())
        .ok_or("usage: blocklist-sync <servers config> <blocklist document>")?;
    let data_path = std::env::var("BLOCKSYNC_DATA")
        .ok()
        .or_else(|| args.next())
        .ok_or("usage: blocklist-sync <servers config> <blocklist document>")?;

    let config = load_config(&config_path).await?;
    let file = load_block_file(&data_path).await?;
    tracing::info!(
        servers = config.servers.len(),
        blocks = file.blocks.len(),
        published_at = %file.published_at,
        "loaded"
    );

    let mut total = Stats::default();
    for server in &config.servers {
        let stats = apply_server(server, &file).await.map_err(|e| {
            tracing::error!(server = %server.name, kind = e.kind().code(), error = %e, "apply failed");
            e
        })?;
        print!("{}", stats.report(&server.name));
        total += stats;
    }
    tracing::info!(
        inserted = total.insert_count,
        updated = total.update_count,
        deleted = total.delete_count,
        "done"
    );
    Ok(())
}
