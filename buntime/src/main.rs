//! Process entry point: load configuration, assemble the runtime, and
//! serve until a shutdown signal arrives (spec §4.6).
//!
//! Grounded on `r2e-core/src/builder.rs`'s `AppBuilder::build()`/`serve()`
//! split: a single function assembles every long-lived value into one
//! explicit "runtime", which `buntime_dispatch::serve` then drives.

use std::net::SocketAddr;
use std::time::Duration;

use buntime_core::{init_tracing, set_production_mode, BuntimeConfig};
use buntime_dispatch::{build_router, serve, DispatchState};
use buntime_plugin::PluginRegistry;
use buntime_pool::Pool;

/// How long the supervisor waits for in-flight requests to drain after a
/// shutdown signal, before the process exits regardless.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Interval between retirement sweeps (spec §4.3.3: "run at least once a
/// second").
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let base_dir = std::env::current_dir()?;
    let config = BuntimeConfig::from_env(&base_dir)?;
    set_production_mode(config.production);

    let pool = Pool::new(config.worker_dirs.clone(), config.pool_size);
    // No plugins ship with the core itself (spec: "every individual
    // plugin's internal logic ... out of scope"); a real deployment would
    // populate this from a manifest of built-in names / on-disk paths
    // before `load()` validates and initializes them.
    let plugins = PluginRegistry::load(Vec::new()).await?;

    spawn_sweeper(pool.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let state = DispatchState::new(config, pool.clone(), plugins);
    let plugins_handle = state.plugins.clone();
    let router = build_router(state);

    serve(router, addr, pool, plugins_handle, SHUTDOWN_GRACE).await?;
    Ok(())
}

/// Background task retiring idle/overdue workers, independent of request
/// traffic (spec §4.3.3).
fn spawn_sweeper(pool: Pool) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            pool.sweep_once().await;
        }
    });
}
