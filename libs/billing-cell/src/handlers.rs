use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Extension, Path, Query, State},
    http::HeaderMap,
    Json,
};
use axum_extra::TypedHeader;
use chrono::Utc;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    CheckoutRequest, ClaimListQuery, CreateClaimRequest, CreateEncounterRequest, CreateInvoiceRequest,
    InvoiceListQuery, InvoiceStatus, UpdateClaimStatusRequest, VerifyCheckoutQuery,
};
use crate::services::{ClaimService, EncounterService, InvoiceService, PaymentService};

// ==============================================================================
// ENCOUNTERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_encounter(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateEncounterRequest>,
) -> Result<Json<Value>, AppError> {
    let service = EncounterService::new(&config);
    let encounter = service
        .create_encounter(request, user.user_id()?, user.practice_role(), auth.token())
        .await?;

    Ok(Json(json!({
        "encounter": encounter,
        "message": "Encounter recorded"
    })))
}

#[axum::debug_handler]
pub async fn get_encounter(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(encounter_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = EncounterService::new(&config);
    let encounter = service
        .get_for_caller(encounter_id, user.user_id()?, user.practice_role(), auth.token())
        .await?;

    Ok(Json(json!(encounter)))
}

#[axum::debug_handler]
pub async fn get_superbill(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(encounter_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = EncounterService::new(&config);
    let superbill = service
        .superbill(encounter_id, user.user_id()?, user.practice_role(), auth.token())
        .await?;

    Ok(Json(json!(superbill)))
}

// ==============================================================================
// INVOICES
// ==============================================================================

#[axum::debug_handler]
pub async fn create_invoice(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<CreateInvoiceRequest>,
) -> Result<Json<Value>, AppError> {
    let service = InvoiceService::new(&config);
    let invoice = service.create_invoice(request, auth.token()).await?;

    Ok(Json(json!({
        "invoice": invoice,
        "message": "Invoice drafted"
    })))
}

#[axum::debug_handler]
pub async fn list_invoices(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<InvoiceListQuery>,
) -> Result<Json<Value>, AppError> {
    let service = InvoiceService::new(&config);
    let invoices = service
        .list_invoices(&query, user.user_id()?, user.practice_role(), auth.token())
        .await?;

    let outstanding: i64 = invoices
        .iter()
        .filter(|i| i.status.is_payable())
        .map(|i| i.amount_due_cents)
        .sum();

    Ok(Json(json!({
        "invoices": invoices,
        "total": invoices.len(),
        "outstanding_cents": outstanding
    })))
}

#[axum::debug_handler]
pub async fn get_invoice(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = InvoiceService::new(&config);
    let invoice = service
        .get_for_caller(invoice_id, user.user_id()?, user.practice_role(), auth.token())
        .await?;

    Ok(Json(json!(invoice)))
}

#[axum::debug_handler]
pub async fn issue_invoice(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = InvoiceService::new(&config);
    let invoice = service.issue_invoice(invoice_id, auth.token()).await?;

    Ok(Json(json!(invoice)))
}

#[axum::debug_handler]
pub async fn void_invoice(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = InvoiceService::new(&config);
    let invoice = service.void_invoice(invoice_id, auth.token()).await?;

    Ok(Json(json!(invoice)))
}

#[axum::debug_handler]
pub async fn mark_overdue(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let service = InvoiceService::new(&config);
    let updated = service.mark_overdue(Utc::now(), auth.token()).await?;

    Ok(Json(json!({
        "updated": updated.len(),
        "invoices": updated
    })))
}

// ==============================================================================
// PAYMENTS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_checkout(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<Value>, AppError> {
    let service = PaymentService::new(&config);
    let checkout = service
        .create_checkout(request.invoice_id, user.user_id()?, user.practice_role(), auth.token())
        .await?;

    Ok(Json(json!(checkout)))
}

#[axum::debug_handler]
pub async fn verify_checkout(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<VerifyCheckoutQuery>,
) -> Result<Json<Value>, AppError> {
    let service = PaymentService::new(&config);
    let invoice = service
        .verify_checkout(&query.session_id, user.user_id()?, user.practice_role(), auth.token())
        .await?;

    Ok(Json(json!({
        "paid": invoice.status == InvoiceStatus::Paid,
        "invoice": invoice
    })))
}

#[axum::debug_handler]
pub async fn create_portal(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = PaymentService::new(&config);
    let portal = service.create_portal(user.user_id()?, auth.token()).await?;

    Ok(Json(json!({ "url": portal.url })))
}

/// Public endpoint; authenticity comes from the `Stripe-Signature` header.
#[axum::debug_handler]
pub async fn stripe_webhook(
    State(config): State<Arc<AppConfig>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            warn!("Webhook received without Stripe-Signature");
            AppError::BadRequest("Missing Stripe-Signature header".to_string())
        })?;

    let service = PaymentService::new(&config);
    let handled = service.handle_webhook(&body, signature).await?;
    info!("Stripe webhook processed (handled: {})", handled);

    Ok(Json(json!({ "received": true, "handled": handled })))
}

// ==============================================================================
// CLAIMS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_claim(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<CreateClaimRequest>,
) -> Result<Json<Value>, AppError> {
    let service = ClaimService::new(&config);
    let claim = service.create_claim(request.invoice_id, auth.token()).await?;

    Ok(Json(json!({
        "claim": claim,
        "message": "Claim drafted"
    })))
}

#[axum::debug_handler]
pub async fn list_claims(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<ClaimListQuery>,
) -> Result<Json<Value>, AppError> {
    let service = ClaimService::new(&config);
    let claims = service
        .list_claims(&query, user.user_id()?, user.practice_role(), auth.token())
        .await?;

    Ok(Json(json!({
        "claims": claims,
        "total": claims.len()
    })))
}

#[axum::debug_handler]
pub async fn get_claim(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(claim_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = ClaimService::new(&config);
    let claim = service
        .get_for_caller(claim_id, user.user_id()?, user.practice_role(), auth.token())
        .await?;

    Ok(Json(json!(claim)))
}

#[axum::debug_handler]
pub async fn update_claim_status(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(claim_id): Path<Uuid>,
    Json(request): Json<UpdateClaimStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let service = ClaimService::new(&config);
    let claim = service.update_status(claim_id, request, auth.token()).await?;

    Ok(Json(json!(claim)))
}
