use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{QueryBuilder, SupabaseClient};
use shared_models::auth::Role;
use shared_utils::money::format_cents;
use shared_utils::validation::Validator;
use notification_cell::{NewNotification, NotificationKind, NotificationService};

use crate::models::{BillingError, CreateInvoiceRequest, Invoice, InvoiceListQuery, InvoiceStatus, LineItem};
use crate::services::encounter::EncounterService;
use crate::services::totals::{amount_due_cents, invoice_number, line_items_from_procedures, subtotal_cents};

const TABLE: &str = "invoices";
const DEFAULT_TERMS_DAYS: i64 = 30;

pub struct InvoiceService {
    supabase: SupabaseClient,
    encounters: EncounterService,
    notifications: NotificationService,
}

fn validate_items(items: &[LineItem], adjustment: i64) -> Result<(), BillingError> {
    let mut validator = Validator::new()
        .check(!items.is_empty(), "line_items", "at least one line item is required")
        .non_negative("insurance_adjustment_cents", adjustment);
    for item in items {
        validator = validator
            .required("line_items.description", &item.description)
            .max_len("line_items.description", &item.description, 250)
            .positive("line_items.quantity", item.quantity)
            .non_negative("line_items.unit_price_cents", item.unit_price_cents);
    }
    validator.into_result().map_err(BillingError::ValidationError)
}

impl InvoiceService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            encounters: EncounterService::new(config),
            notifications: NotificationService::new(config),
        }
    }

    /// Drafts an invoice from an encounter's procedures or from explicit items.
    pub async fn create_invoice(&self, request: CreateInvoiceRequest, auth_token: &str) -> Result<Invoice, BillingError> {
        let (patient_id, physician_id, location_id, items) = match request.encounter_id {
            Some(encounter_id) => {
                let encounter = self.encounters.get_encounter(encounter_id, auth_token).await?;
                if request.patient_id.is_some_and(|id| id != encounter.patient_id) {
                    return Err(BillingError::ValidationError(
                        "patient_id: does not match the encounter".to_string(),
                    ));
                }
                let items = request
                    .line_items
                    .unwrap_or_else(|| line_items_from_procedures(&encounter.procedures));
                (encounter.patient_id, Some(encounter.physician_id), encounter.location_id, items)
            },
            None => {
                let patient_id = request.patient_id.ok_or_else(|| {
                    BillingError::ValidationError("patient_id: is required without an encounter".to_string())
                })?;
                (patient_id, request.physician_id, request.location_id, request.line_items.unwrap_or_default())
            },
        };

        let adjustment = request.insurance_adjustment_cents.unwrap_or(0);
        validate_items(&items, adjustment)?;

        let now = Utc::now();
        let subtotal = subtotal_cents(&items);
        let due_date = request.due_date.unwrap_or_else(|| (now + Duration::days(DEFAULT_TERMS_DAYS)).date_naive());

        let row = json!({
            "invoice_number": invoice_number(now.date_naive()),
            "patient_id": patient_id,
            "encounter_id": request.encounter_id,
            "physician_id": physician_id,
            "location_id": location_id,
            "status": InvoiceStatus::Draft,
            "line_items": items,
            "subtotal_cents": subtotal,
            "insurance_adjustment_cents": adjustment,
            "amount_paid_cents": 0,
            "amount_due_cents": amount_due_cents(subtotal, adjustment, 0),
            "due_date": due_date,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339(),
        });

        let invoice: Invoice = self.supabase
            .insert(TABLE, row, auth_token)
            .await
            .map_err(|e| BillingError::DatabaseError(e.to_string()))?;

        info!("Invoice {} drafted for patient {} ({})",
              invoice.invoice_number, patient_id, format_cents(invoice.subtotal_cents));
        Ok(invoice)
    }

    pub async fn get_invoice(&self, invoice_id: Uuid, auth_token: &str) -> Result<Invoice, BillingError> {
        self.supabase
            .select_one(TABLE, &QueryBuilder::new().eq("id", invoice_id), auth_token)
            .await
            .map_err(|e| BillingError::DatabaseError(e.to_string()))?
            .ok_or(BillingError::InvoiceNotFound)
    }

    pub async fn get_for_caller(
        &self,
        invoice_id: Uuid,
        caller_id: Uuid,
        role: Role,
        auth_token: &str,
    ) -> Result<Invoice, BillingError> {
        let invoice = self.get_invoice(invoice_id, auth_token).await?;
        let allowed = match role {
            Role::Patient => invoice.patient_id == caller_id,
            Role::Physician => invoice.physician_id == Some(caller_id),
            Role::Staff | Role::Admin => true,
        };
        if !allowed {
            return Err(BillingError::Unauthorized("not your invoice".to_string()));
        }
        Ok(invoice)
    }

    pub async fn list_invoices(
        &self,
        query: &InvoiceListQuery,
        caller_id: Uuid,
        role: Role,
        auth_token: &str,
    ) -> Result<Vec<Invoice>, BillingError> {
        let mut q = match role {
            Role::Patient => QueryBuilder::new().eq("patient_id", caller_id),
            Role::Physician => QueryBuilder::new().eq("physician_id", caller_id),
            Role::Staff | Role::Admin => match query.patient_id {
                Some(patient_id) => QueryBuilder::new().eq("patient_id", patient_id),
                None => QueryBuilder::new(),
            },
        };
        if let Some(status) = query.status {
            q = q.eq("status", status);
        }
        let q = q
            .order("created_at", false)
            .limit(query.limit.unwrap_or(50).clamp(1, 200));

        self.supabase
            .select(TABLE, &q, auth_token)
            .await
            .map_err(|e| BillingError::DatabaseError(e.to_string()))
    }

    async fn patch(&self, invoice_id: Uuid, changes: Value, auth_token: &str) -> Result<Invoice, BillingError> {
        let rows: Vec<Invoice> = self.supabase
            .update(TABLE, &QueryBuilder::new().eq("id", invoice_id), changes, auth_token)
            .await
            .map_err(|e| BillingError::DatabaseError(e.to_string()))?;
        rows.into_iter().next().ok_or(BillingError::InvoiceNotFound)
    }

    /// Draft → open. The patient is notified.
    pub async fn issue_invoice(&self, invoice_id: Uuid, auth_token: &str) -> Result<Invoice, BillingError> {
        let invoice = self.get_invoice(invoice_id, auth_token).await?;
        if invoice.status != InvoiceStatus::Draft {
            return Err(BillingError::InvalidInvoiceState(invoice.status));
        }

        let now = Utc::now().to_rfc3339();
        let issued = self.patch(invoice_id, json!({
            "status": InvoiceStatus::Open,
            "issued_at": now,
            "updated_at": now,
        }), auth_token).await?;

        info!("Invoice {} issued", issued.invoice_number);

        let notification = NewNotification::new(
            issued.patient_id,
            NotificationKind::InvoiceIssued,
            "New invoice",
            format!("Invoice {} for {} is due {}.",
                    issued.invoice_number, format_cents(issued.amount_due_cents), issued.due_date),
        ).with_link(format!("/billing/invoices/{}", issued.id));
        self.notifications.notify_best_effort(notification, auth_token).await;

        Ok(issued)
    }

    pub async fn void_invoice(&self, invoice_id: Uuid, auth_token: &str) -> Result<Invoice, BillingError> {
        let invoice = self.get_invoice(invoice_id, auth_token).await?;
        if !matches!(invoice.status, InvoiceStatus::Draft | InvoiceStatus::Open) {
            return Err(BillingError::InvalidInvoiceState(invoice.status));
        }
        if invoice.amount_paid_cents > 0 {
            return Err(BillingError::ValidationError("invoice: has payments recorded".to_string()));
        }

        let voided = self.patch(invoice_id, json!({
            "status": InvoiceStatus::Void,
            "updated_at": Utc::now().to_rfc3339(),
        }), auth_token).await?;

        info!("Invoice {} voided", voided.invoice_number);
        Ok(voided)
    }

    /// Moves open invoices whose due date has passed to overdue.
    pub async fn mark_overdue(&self, now: DateTime<Utc>, auth_token: &str) -> Result<Vec<Invoice>, BillingError> {
        let q = QueryBuilder::new()
            .eq("status", InvoiceStatus::Open)
            .lt("due_date", now.date_naive());

        let updated: Vec<Invoice> = self.supabase
            .update(TABLE, &q, json!({
                "status": InvoiceStatus::Overdue,
                "updated_at": now.to_rfc3339(),
            }), auth_token)
            .await
            .map_err(|e| BillingError::DatabaseError(e.to_string()))?;

        info!("Marked {} invoices overdue", updated.len());
        Ok(updated)
    }

    pub async fn attach_checkout_session(
        &self,
        invoice_id: Uuid,
        session_id: &str,
        auth_token: &str,
    ) -> Result<Invoice, BillingError> {
        self.patch(invoice_id, json!({
            "stripe_checkout_session_id": session_id,
            "updated_at": Utc::now().to_rfc3339(),
        }), auth_token).await
    }

    /// Adds a patient payment and settles the invoice when nothing is left due.
    pub async fn apply_payment(
        &self,
        invoice: &Invoice,
        amount_cents: i64,
        session_id: &str,
        auth_token: &str,
    ) -> Result<Invoice, BillingError> {
        let paid = invoice.amount_paid_cents + amount_cents;
        let due = amount_due_cents(invoice.subtotal_cents, invoice.insurance_adjustment_cents, paid);
        let now = Utc::now().to_rfc3339();

        let mut changes = json!({
            "amount_paid_cents": paid,
            "amount_due_cents": due,
            "stripe_checkout_session_id": session_id,
            "updated_at": now,
        });
        if due == 0 {
            changes["status"] = json!(InvoiceStatus::Paid);
            changes["paid_at"] = json!(now);
        }

        debug!("Applying {} to invoice {}", format_cents(amount_cents), invoice.invoice_number);
        self.patch(invoice.id, changes, auth_token).await
    }

    /// Records what the payer covered and recomputes the balance.
    pub async fn apply_insurance_adjustment(
        &self,
        invoice_id: Uuid,
        adjustment_cents: i64,
        auth_token: &str,
    ) -> Result<Invoice, BillingError> {
        let invoice = self.get_invoice(invoice_id, auth_token).await?;
        let due = amount_due_cents(invoice.subtotal_cents, adjustment_cents, invoice.amount_paid_cents);
        let now = Utc::now().to_rfc3339();

        let mut changes = json!({
            "insurance_adjustment_cents": adjustment_cents,
            "amount_due_cents": due,
            "updated_at": now,
        });
        if due == 0 && invoice.status.is_payable() {
            changes["status"] = json!(InvoiceStatus::Paid);
            changes["paid_at"] = json!(now);
        }

        self.patch(invoice_id, changes, auth_token).await
    }
}
