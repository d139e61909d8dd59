//! In-process plugin system (spec §4.5): load order, lifecycle hooks,
//! named services, and route mounting under distinct base paths.

mod error;
mod plugin;
mod registry;
mod service;

pub use error::PluginError;
pub use plugin::{Plugin, PluginContext, PluginRequest};
pub use registry::PluginRegistry;
pub use service::ServiceRegistry;
