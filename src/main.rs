use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing::info;

use spacebook::clock::SystemClock;
use spacebook::config::Config;
use spacebook::notify::NotifyHub;
use spacebook::store::WalStore;
use spacebook::{Collaborators, Engine, compactor};

/// Hosts the store and its background work. No request transport is served
/// here; the engine is built so its housekeeping runs, and embedding hosts
/// drive `Engine` directly.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cfg = Config::from_env()?;
    spacebook::observability::init(cfg.metrics_port)?;

    std::fs::create_dir_all(&cfg.data_dir)?;
    let wal_path = cfg.wal_path();
    let store = Arc::new(WalStore::open(&wal_path, Arc::new(NotifyHub::new()), Arc::new(SystemClock)).await?);
    let engine = Arc::new(Engine::new(Collaborators::wal_backed(store.clone()), cfg.transition_policy));

    info!("spacebook ready");
    info!("  wal: {}", wal_path.display());
    info!("  transition policy: {:?}", cfg.transition_policy);
    info!("  compaction: every {} appends, checked every {:?}", cfg.compact_threshold, cfg.compact_interval);
    info!(
        "  metrics: {}",
        cfg.metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    tokio::spawn(compactor::run_compactor(
        store.clone(),
        engine.clone(),
        cfg.compact_threshold,
        cfg.compact_interval,
    ));

    // Tail the admin feed into the log.
    let mut feed = store.hub().subscribe_admin();
    tokio::spawn(async move {
        loop {
            match feed.recv().await {
                Ok(n) => info!("notification [{}] {:?}: {}", n.category.as_str(), n.target, n.message),
                Err(RecvError::Lagged(skipped)) => tracing::warn!("admin feed lagged, {skipped} skipped"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    if let Err(e) = store.compact().await {
        tracing::warn!("final compaction failed: {e}");
    }
    info!("spacebook stopped");
    Ok(())
}
