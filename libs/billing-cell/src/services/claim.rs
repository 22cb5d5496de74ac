use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::info;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{QueryBuilder, SupabaseClient};
use shared_models::auth::Role;
use shared_utils::money::format_cents;
use shared_utils::validation::Validator;
use insurance_cell::{InsuranceError, VerificationService};
use notification_cell::{NewNotification, NotificationKind, NotificationService};

use crate::models::{
    BillingError, Claim, ClaimListQuery, ClaimStatus, InvoiceStatus, UpdateClaimStatusRequest,
};
use crate::services::invoice::InvoiceService;
use crate::services::totals::claim_number;

const TABLE: &str = "claims";

pub struct ClaimService {
    supabase: SupabaseClient,
    invoices: InvoiceService,
    verifications: VerificationService,
    notifications: NotificationService,
}

/// Field checks for an adjudication step, against the claim's billed amount.
fn validate_status_update(claim: &Claim, request: &UpdateClaimStatusRequest) -> Result<(), BillingError> {
    if !claim.status.can_become(request.status) {
        return Err(BillingError::InvalidClaimTransition { from: claim.status, to: request.status });
    }

    let mut validator = Validator::new();
    match request.status {
        ClaimStatus::Accepted => {
            if let Some(allowed) = request.allowed_cents {
                validator = validator
                    .non_negative("allowed_cents", allowed)
                    .check(allowed <= claim.billed_cents, "allowed_cents", "cannot exceed the billed amount");
            }
        },
        ClaimStatus::Denied => {
            validator = validator.required("denial_reason", request.denial_reason.as_deref().unwrap_or(""));
        },
        ClaimStatus::Paid => match request.paid_cents {
            Some(paid) => {
                let ceiling = claim.allowed_cents.unwrap_or(claim.billed_cents);
                validator = validator
                    .non_negative("paid_cents", paid)
                    .check(paid <= ceiling, "paid_cents", "cannot exceed the allowed or billed amount");
            },
            None => {
                validator = validator.check(false, "paid_cents", "is required");
            },
        },
        _ => {},
    }
    validator.into_result().map_err(BillingError::ValidationError)
}

impl ClaimService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            invoices: InvoiceService::new(config),
            verifications: VerificationService::new(config),
            notifications: NotificationService::new(config),
        }
    }

    /// Drafts a claim against the patient's current verified coverage.
    pub async fn create_claim(&self, invoice_id: Uuid, auth_token: &str) -> Result<Claim, BillingError> {
        let invoice = self.invoices.get_invoice(invoice_id, auth_token).await?;
        if matches!(invoice.status, InvoiceStatus::Void | InvoiceStatus::Draft) {
            return Err(BillingError::InvalidInvoiceState(invoice.status));
        }

        let verification = self.verifications
            .active_for_patient(invoice.patient_id, auth_token)
            .await
            .map_err(|e| match e {
                InsuranceError::NoActiveVerification => BillingError::NoActiveInsurance,
                other => BillingError::DatabaseError(other.to_string()),
            })?;

        let open: Vec<Claim> = self.supabase
            .select(TABLE, &QueryBuilder::new().eq("invoice_id", invoice.id).neq("status", ClaimStatus::Denied), auth_token)
            .await
            .map_err(|e| BillingError::DatabaseError(e.to_string()))?;
        if !open.is_empty() {
            return Err(BillingError::DuplicateClaim);
        }

        let now = Utc::now();
        let row = json!({
            "claim_number": claim_number(now.date_naive()),
            "invoice_id": invoice.id,
            "patient_id": invoice.patient_id,
            "verification_id": verification.id,
            "payer_name": verification.payer_name,
            "member_id": verification.member_id,
            "status": ClaimStatus::Draft,
            "billed_cents": invoice.subtotal_cents,
            "created_at": now.to_rfc3339(),
        });

        let claim: Claim = self.supabase
            .insert(TABLE, row, auth_token)
            .await
            .map_err(|e| BillingError::DatabaseError(e.to_string()))?;

        info!("Claim {} drafted for invoice {} with {}", claim.claim_number, invoice.invoice_number, claim.payer_name);
        Ok(claim)
    }

    pub async fn get_claim(&self, claim_id: Uuid, auth_token: &str) -> Result<Claim, BillingError> {
        self.supabase
            .select_one(TABLE, &QueryBuilder::new().eq("id", claim_id), auth_token)
            .await
            .map_err(|e| BillingError::DatabaseError(e.to_string()))?
            .ok_or(BillingError::ClaimNotFound)
    }

    pub async fn get_for_caller(&self, claim_id: Uuid, caller_id: Uuid, role: Role, auth_token: &str) -> Result<Claim, BillingError> {
        let claim = self.get_claim(claim_id, auth_token).await?;
        match role {
            Role::Staff | Role::Admin => Ok(claim),
            Role::Patient if claim.patient_id == caller_id => Ok(claim),
            _ => Err(BillingError::Unauthorized("not your claim".to_string())),
        }
    }

    pub async fn list_claims(
        &self,
        query: &ClaimListQuery,
        caller_id: Uuid,
        role: Role,
        auth_token: &str,
    ) -> Result<Vec<Claim>, BillingError> {
        let mut q = match role {
            Role::Patient => QueryBuilder::new().eq("patient_id", caller_id),
            Role::Staff | Role::Admin => match query.patient_id {
                Some(patient_id) => QueryBuilder::new().eq("patient_id", patient_id),
                None => QueryBuilder::new(),
            },
            Role::Physician => return Err(BillingError::Unauthorized("claims are handled by billing staff".to_string())),
        };
        if let Some(status) = query.status {
            q = q.eq("status", status);
        }
        if let Some(invoice_id) = query.invoice_id {
            q = q.eq("invoice_id", invoice_id);
        }

        self.supabase
            .select(TABLE, &q.order("created_at", false).limit(200), auth_token)
            .await
            .map_err(|e| BillingError::DatabaseError(e.to_string()))
    }

    pub async fn update_status(
        &self,
        claim_id: Uuid,
        request: UpdateClaimStatusRequest,
        auth_token: &str,
    ) -> Result<Claim, BillingError> {
        let claim = self.get_claim(claim_id, auth_token).await?;
        validate_status_update(&claim, &request)?;

        let now = Utc::now().to_rfc3339();
        let mut changes = Map::new();
        changes.insert("status".to_string(), json!(request.status));
        match request.status {
            ClaimStatus::Submitted => {
                changes.insert("submitted_at".to_string(), json!(now));
            },
            ClaimStatus::Accepted => {
                changes.insert("allowed_cents".to_string(), json!(request.allowed_cents));
                changes.insert("adjudicated_at".to_string(), json!(now));
            },
            ClaimStatus::Denied => {
                changes.insert("denial_reason".to_string(), json!(request.denial_reason));
                changes.insert("adjudicated_at".to_string(), json!(now));
            },
            ClaimStatus::Paid => {
                changes.insert("paid_cents".to_string(), json!(request.paid_cents));
            },
            ClaimStatus::Draft => {},
        }

        let rows: Vec<Claim> = self.supabase
            .update(TABLE, &QueryBuilder::new().eq("id", claim_id), Value::Object(changes), auth_token)
            .await
            .map_err(|e| BillingError::DatabaseError(e.to_string()))?;
        let updated = rows.into_iter().next().ok_or(BillingError::ClaimNotFound)?;

        if let (ClaimStatus::Paid, Some(paid)) = (updated.status, updated.paid_cents) {
            let invoice = self.invoices.apply_insurance_adjustment(updated.invoice_id, paid, auth_token).await?;
            info!("Invoice {} adjusted by {} from claim {}", invoice.invoice_number, format_cents(paid), updated.claim_number);
        }

        info!("Claim {} moved from {} to {}", updated.claim_number, claim.status, updated.status);

        let notification = NewNotification::new(
            updated.patient_id,
            NotificationKind::ClaimUpdated,
            "Insurance claim updated",
            format!("Claim {} with {} is now {}.", updated.claim_number, updated.payer_name, updated.status),
        ).with_link(format!("/billing/claims/{}", updated.id));
        self.notifications.notify_best_effort(notification, auth_token).await;

        Ok(updated)
    }
}
