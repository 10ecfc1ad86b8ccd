//! CDP Bridge entry point.
//!
//! Wires a `TabController` over the configured `ContextFactory` (relay or
//! persistent), warms the context up so the relay server (in relay mode)
//! starts listening immediately, runs a periodic closed-tab pruning task,
//! and shuts everything down on SIGTERM/SIGINT.

use cdp_bridge::adapter::{registry::AdapterRegistry, sites};
use cdp_bridge::config::{Config, ContextMode};
use cdp_bridge::context::persistent::PersistentContextFactory;
use cdp_bridge::context::relay_backed::RelayContextFactory;
use cdp_bridge::context::ContextFactory;
use cdp_bridge::tab::TabController;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

fn init_tracing(config: &Config) {
    let log_level = config.log_level.parse::<Level>().unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn build_context_factory(config: &Config) -> Arc<dyn ContextFactory> {
    match config.mode {
        ContextMode::Relay => Arc::new(RelayContextFactory::new(config.relay_host.clone())),
        ContextMode::Persistent => Arc::new(PersistentContextFactory::new(
            config.chrome_path.clone(),
            config.chrome_data_dir.clone().map(PathBuf::from),
            config.chrome_headless,
            config.profile_lock_retries,
        )),
    }
}

fn spawn_prune_task(controller: Arc<TabController>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            controller.prune_closed().await;
        }
    });
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).unwrap();
        let mut sigint = signal(SignalKind::interrupt()).unwrap();

        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
    }

    #[cfg(windows)]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("received Ctrl+C");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    init_tracing(&config);
    info!("CDP Bridge v{} starting in {:?} mode", cdp_bridge::VERSION, config.mode);

    let registry = Arc::new(AdapterRegistry::new(sites::builtin()));
    let factory = build_context_factory(&config);
    let controller = Arc::new(TabController::new(
        factory,
        registry,
        Duration::from_millis(config.navigation_timeout_ms),
    ));

    // Warm the context up immediately: in relay mode this starts the relay
    // listener (and logs its address) before any external caller arrives.
    match controller.open_tab("about:blank").await {
        Ok(id) => info!("warm-up tab {} ready", id),
        Err(e) => warn!("warm-up failed, continuing lazily: {}", e),
    }

    spawn_prune_task(Arc::clone(&controller));

    shutdown_signal().await;

    info!("shutting down");
    if let Err(e) = controller.shutdown().await {
        error!("error during shutdown: {}", e);
    }

    Ok(())
}
