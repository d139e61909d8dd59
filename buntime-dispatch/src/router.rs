//! Assembles the full `Router`: plugin routes, admin routes, health
//! routes, then the app-dispatch fallback (spec §4.4 step 1, routing
//! precedence).

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::app_dispatch::app_dispatch;
use crate::state::DispatchState;
use crate::{admin, health};

pub fn build_router(state: DispatchState) -> Router {
    // Plugin routes carry no state of their own; admin/health routes need
    // `DispatchState` via an extractor. Resolve each sub-router's state
    // first so they can all merge into one `Router<DispatchState>`, then
    // supply the real state once for the assembled router (the fallback
    // still needs it for `app_dispatch`).
    let plugin_routes: Router<DispatchState> = state.plugins.routes().with_state(());
    let admin_routes: Router<DispatchState> =
        Router::new().nest("/_/admin", admin::router()).with_state(state.clone());
    let health_routes: Router<DispatchState> = health::router().with_state(state.clone());

    Router::new()
        .merge(plugin_routes)
        .merge(admin_routes)
        .merge(health_routes)
        .fallback(app_dispatch)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
