use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::{auth_middleware, clinical_only};

use crate::handlers;

pub fn telemedicine_routes(state: Arc<AppConfig>) -> Router {
    let clinical_routes = Router::new()
        .route("/sessions", post(handlers::create_session))
        .route("/sessions/{session_id}/end", post(handlers::end_session))
        .route("/sessions/{session_id}/cancel", post(handlers::cancel_session))
        .layer(middleware::from_fn(clinical_only));

    Router::new()
        .route("/sessions/{session_id}", get(handlers::get_session))
        .route("/sessions/{session_id}/join", post(handlers::join_session))
        .route("/appointments/{appointment_id}/session", get(handlers::get_appointment_session))
        .merge(clinical_routes)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
