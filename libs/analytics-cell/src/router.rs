use std::sync::Arc;

use axum::{
    Router,
    routing::get,
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::{auth_middleware, physician_only, staff_only};

use crate::handlers;

pub fn analytics_routes(state: Arc<AppConfig>) -> Router {
    let staff_routes = Router::new()
        .route("/revenue", get(handlers::revenue_report))
        .route("/network", get(handlers::network_overview))
        .layer(middleware::from_fn(staff_only));

    let physician_routes = Router::new()
        .route("/physicians/me", get(handlers::my_summary))
        .layer(middleware::from_fn(physician_only));

    Router::new()
        .merge(staff_routes)
        .merge(physician_routes)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
