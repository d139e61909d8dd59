//! HTTP front door: routing precedence, plugin hooks, worker proxying,
//! and the admin/health surface (spec §4.4, §6).

mod admin;
mod app_dispatch;
mod health;
mod proxy;
mod router;
mod serve;
mod state;

pub use proxy::proxy;
pub use router::build_router;
pub use serve::serve;
pub use state::DispatchState;
