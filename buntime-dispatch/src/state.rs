//! Shared, process-wide state handed to every request (spec §9
//! "Process-wide state ... initialise them in a single startup function
//! that returns an explicit 'runtime' value").

use std::path::PathBuf;
use std::sync::Arc;

use buntime_core::BuntimeConfig;
use buntime_plugin::PluginRegistry;
use buntime_pool::Pool;

#[derive(Clone)]
pub struct DispatchState {
    pub pool: Pool,
    pub plugins: Arc<PluginRegistry>,
    pub worker_dirs: Vec<PathBuf>,
    pub config: Arc<BuntimeConfig>,
}

impl DispatchState {
    pub fn new(config: BuntimeConfig, pool: Pool, plugins: PluginRegistry) -> Self {
        Self {
            worker_dirs: config.worker_dirs.clone(),
            config: Arc::new(config),
            pool,
            plugins: Arc::new(plugins),
        }
    }
}
