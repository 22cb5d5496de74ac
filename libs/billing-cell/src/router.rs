use std::sync::Arc;

use axum::{
    Router,
    routing::{get, patch, post},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::{auth_middleware, clinical_only, staff_only};

use crate::handlers;

pub fn billing_routes(state: Arc<AppConfig>) -> Router {
    let clinical_routes = Router::new()
        .route("/encounters", post(handlers::create_encounter))
        .layer(middleware::from_fn(clinical_only));

    let staff_routes = Router::new()
        .route("/invoices", post(handlers::create_invoice))
        .route("/invoices/mark-overdue", post(handlers::mark_overdue))
        .route("/invoices/{invoice_id}/issue", post(handlers::issue_invoice))
        .route("/invoices/{invoice_id}/void", post(handlers::void_invoice))
        .route("/claims", post(handlers::create_claim))
        .route("/claims/{claim_id}/status", patch(handlers::update_claim_status))
        .layer(middleware::from_fn(staff_only));

    let authenticated = Router::new()
        .route("/encounters/{encounter_id}", get(handlers::get_encounter))
        .route("/encounters/{encounter_id}/superbill", get(handlers::get_superbill))
        .route("/invoices", get(handlers::list_invoices))
        .route("/invoices/{invoice_id}", get(handlers::get_invoice))
        .route("/checkout", post(handlers::create_checkout))
        .route("/checkout/verify", get(handlers::verify_checkout))
        .route("/portal", post(handlers::create_portal))
        .route("/claims", get(handlers::list_claims))
        .route("/claims/{claim_id}", get(handlers::get_claim))
        .merge(clinical_routes)
        .merge(staff_routes)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/webhook", post(handlers::stripe_webhook))
        .merge(authenticated)
        .with_state(state)
}
