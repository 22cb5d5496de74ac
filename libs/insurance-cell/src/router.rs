use std::sync::Arc;

use axum::{
    Router,
    routing::{get, patch},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::{auth_middleware, staff_only};

use crate::handlers;

pub fn insurance_routes(state: Arc<AppConfig>) -> Router {
    let staff_routes = Router::new()
        .route("/verifications/{verification_id}", patch(handlers::record_verification))
        .layer(middleware::from_fn(staff_only));

    Router::new()
        .route("/verifications", get(handlers::list_verifications).post(handlers::create_verification))
        .route("/verifications/{verification_id}", get(handlers::get_verification))
        .route("/patients/{patient_id}/active", get(handlers::get_active_verification))
        .merge(staff_routes)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
