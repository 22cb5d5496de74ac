use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use shared_models::error::AppError;

// ==============================================================================
// ENCOUNTERS & SUPERBILLS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcedureLine {
    /// CPT code.
    pub code: String,
    pub description: String,
    pub units: i64,
    pub unit_price_cents: i64,
}

impl ProcedureLine {
    pub fn line_total_cents(&self) -> i64 {
        self.units * self.unit_price_cents
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Encounter {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub physician_id: Uuid,
    pub location_id: Option<Uuid>,
    pub diagnosis_codes: Vec<String>,
    pub procedures: Vec<ProcedureLine>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEncounterRequest {
    pub appointment_id: Uuid,
    pub diagnosis_codes: Vec<String>,
    pub procedures: Vec<ProcedureLine>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuperbillParty {
    pub id: Uuid,
    pub name: String,
    pub npi: Option<String>,
    pub specialty: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuperbillLine {
    pub code: String,
    pub description: String,
    pub units: i64,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Superbill {
    pub encounter_id: Uuid,
    pub date_of_service: NaiveDate,
    pub provider: SuperbillParty,
    pub patient: SuperbillParty,
    pub location_id: Option<Uuid>,
    pub diagnosis_codes: Vec<String>,
    pub lines: Vec<SuperbillLine>,
    pub total_cents: i64,
    pub total_display: String,
}

// ==============================================================================
// INVOICES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineItem {
    pub description: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

impl LineItem {
    pub fn total_cents(&self) -> i64 {
        self.quantity * self.unit_price_cents
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Open,
    Paid,
    Void,
    Overdue,
}

impl InvoiceStatus {
    /// Statuses a patient can pay against.
    pub fn is_payable(&self) -> bool {
        matches!(self, InvoiceStatus::Open | InvoiceStatus::Overdue)
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Open => "open",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Void => "void",
            InvoiceStatus::Overdue => "overdue",
        };
        write!(f, "{}", value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub invoice_number: String,
    pub patient_id: Uuid,
    pub encounter_id: Option<Uuid>,
    pub physician_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    pub status: InvoiceStatus,
    pub line_items: Vec<LineItem>,
    pub subtotal_cents: i64,
    pub insurance_adjustment_cents: i64,
    pub amount_paid_cents: i64,
    pub amount_due_cents: i64,
    pub due_date: NaiveDate,
    pub issued_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub stripe_checkout_session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateInvoiceRequest {
    pub patient_id: Option<Uuid>,
    pub encounter_id: Option<Uuid>,
    pub physician_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    pub line_items: Option<Vec<LineItem>>,
    pub insurance_adjustment_cents: Option<i64>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoiceListQuery {
    pub status: Option<InvoiceStatus>,
    pub patient_id: Option<Uuid>,
    pub limit: Option<i64>,
}

// ==============================================================================
// PAYMENTS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub patient_id: Uuid,
    pub amount_cents: i64,
    pub stripe_checkout_session_id: String,
    pub stripe_payment_intent_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub invoice_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyCheckoutQuery {
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: String,
    pub url: Option<String>,
    pub payment_status: String,
    pub payment_intent: Option<String>,
    pub amount_total: Option<i64>,
    pub customer: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl StripeCheckoutSession {
    pub fn is_paid(&self) -> bool {
        self.payment_status == "paid"
    }

    pub fn invoice_id(&self) -> Option<Uuid> {
        self.metadata.get("invoice_id").and_then(|id| Uuid::parse_str(id).ok())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripePortalSession {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

// ==============================================================================
// CLAIMS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Draft,
    Submitted,
    Accepted,
    Denied,
    Paid,
}

impl ClaimStatus {
    pub fn can_become(&self, next: ClaimStatus) -> bool {
        matches!(
            (self, next),
            (ClaimStatus::Draft, ClaimStatus::Submitted)
                | (ClaimStatus::Submitted, ClaimStatus::Accepted)
                | (ClaimStatus::Submitted, ClaimStatus::Denied)
                | (ClaimStatus::Accepted, ClaimStatus::Paid)
        )
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            ClaimStatus::Draft => "draft",
            ClaimStatus::Submitted => "submitted",
            ClaimStatus::Accepted => "accepted",
            ClaimStatus::Denied => "denied",
            ClaimStatus::Paid => "paid",
        };
        write!(f, "{}", value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub id: Uuid,
    pub claim_number: String,
    pub invoice_id: Uuid,
    pub patient_id: Uuid,
    pub verification_id: Uuid,
    pub payer_name: String,
    pub member_id: String,
    pub status: ClaimStatus,
    pub billed_cents: i64,
    pub allowed_cents: Option<i64>,
    pub paid_cents: Option<i64>,
    pub denial_reason: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub adjudicated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateClaimRequest {
    pub invoice_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateClaimStatusRequest {
    pub status: ClaimStatus,
    pub allowed_cents: Option<i64>,
    pub paid_cents: Option<i64>,
    pub denial_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClaimListQuery {
    pub status: Option<ClaimStatus>,
    pub patient_id: Option<Uuid>,
    pub invoice_id: Option<Uuid>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum BillingError {
    #[error("Encounter not found")]
    EncounterNotFound,

    #[error("Invoice not found")]
    InvoiceNotFound,

    #[error("Claim not found")]
    ClaimNotFound,

    #[error("Appointment not found")]
    AppointmentNotFound,

    #[error("Only completed appointments can be billed")]
    AppointmentNotCompleted,

    #[error("An encounter already exists for this appointment")]
    DuplicateEncounter,

    #[error("A claim is already open for this invoice")]
    DuplicateClaim,

    #[error("Invoice is {0}")]
    InvalidInvoiceState(InvoiceStatus),

    #[error("Cannot change claim from {from} to {to}")]
    InvalidClaimTransition { from: ClaimStatus, to: ClaimStatus },

    #[error("Patient has no active insurance verification")]
    NoActiveInsurance,

    #[error("No billing account on file")]
    NoBillingAccount,

    #[error("Payments are not configured")]
    PaymentsNotConfigured,

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Payment provider error: {0}")]
    PaymentProvider(String),

    #[error("Invalid webhook signature: {0}")]
    WebhookSignature(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<BillingError> for AppError {
    fn from(e: BillingError) -> Self {
        match e {
            BillingError::EncounterNotFound
            | BillingError::InvoiceNotFound
            | BillingError::ClaimNotFound
            | BillingError::AppointmentNotFound => AppError::NotFound(e.to_string()),
            BillingError::DuplicateEncounter | BillingError::DuplicateClaim => AppError::Conflict(e.to_string()),
            BillingError::AppointmentNotCompleted
            | BillingError::InvalidInvoiceState(_)
            | BillingError::InvalidClaimTransition { .. }
            | BillingError::NoActiveInsurance
            | BillingError::NoBillingAccount
            | BillingError::WebhookSignature(_) => AppError::BadRequest(e.to_string()),
            BillingError::PaymentsNotConfigured => AppError::Internal(e.to_string()),
            BillingError::Unauthorized(msg) => AppError::Forbidden(msg),
            BillingError::ValidationError(msg) => AppError::ValidationError(msg),
            BillingError::PaymentProvider(msg) => AppError::ExternalService(msg),
            BillingError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}
