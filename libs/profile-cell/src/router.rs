use std::sync::Arc;

use axum::{
    Router,
    routing::{get, patch, post},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::{auth_middleware, clinical_only, staff_only};

use crate::handlers;

pub fn profile_routes(state: Arc<AppConfig>) -> Router {
    let clinical_routes = Router::new()
        .route("/patients", get(handlers::search_patients))
        .layer(middleware::from_fn(clinical_only));

    Router::new()
        .route("/me", get(handlers::get_my_profile).patch(handlers::update_my_profile))
        .route("/physicians", get(handlers::list_physicians))
        .route("/{profile_id}", get(handlers::get_profile))
        .merge(clinical_routes)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}

pub fn location_routes(state: Arc<AppConfig>) -> Router {
    let staff_routes = Router::new()
        .route("/", post(handlers::create_location))
        .route("/{location_id}", patch(handlers::update_location))
        .layer(middleware::from_fn(staff_only));

    Router::new()
        .route("/", get(handlers::list_locations))
        .route("/{location_id}", get(handlers::get_location))
        .merge(staff_routes)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
