use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::{auth_middleware, portal_gate};

use crate::handlers;

pub fn auth_routes(state: Arc<AppConfig>) -> Router {
    let public_routes = Router::new()
        .route("/validate", post(handlers::validate_token))
        .route("/verify", post(handlers::verify_token))
        .route("/refresh", post(handlers::refresh_session));

    let protected_routes = Router::new()
        .route("/me", get(handlers::me))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

/// `/patient`, `/physician` and `/admin`, each open only to its own roles.
pub fn portal_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/patient", get(handlers::portal_home))
        .route("/physician", get(handlers::portal_home))
        .route("/admin", get(handlers::portal_home))
        .layer(middleware::from_fn(portal_gate))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
