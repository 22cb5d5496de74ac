use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{QueryBuilder, SupabaseClient};
use shared_models::auth::Role;
use shared_utils::money::format_cents;
use notification_cell::{NewNotification, NotificationKind, NotificationService};
use profile_cell::ProfileService;

use crate::models::{
    BillingError, CheckoutResponse, Invoice, InvoiceStatus, Payment, StripeCheckoutSession, StripeEvent,
    StripePortalSession,
};
use crate::services::invoice::InvoiceService;
use crate::services::stripe::{CheckoutSessionParams, StripeClient};
use crate::services::totals::checkout_shares;
use crate::services::webhook::verify_signature;

const PAYMENTS_TABLE: &str = "payments";

pub struct PaymentService {
    supabase: SupabaseClient,
    stripe: StripeClient,
    invoices: InvoiceService,
    profiles: ProfileService,
    notifications: NotificationService,
    app_base_url: String,
    webhook_secret: String,
    service_token: String,
    payments_configured: bool,
}

impl PaymentService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            stripe: StripeClient::new(config),
            invoices: InvoiceService::new(config),
            profiles: ProfileService::new(config),
            notifications: NotificationService::new(config),
            app_base_url: config.app_base_url.trim_end_matches('/').to_string(),
            webhook_secret: config.stripe_webhook_secret.clone(),
            service_token: config.service_token().to_string(),
            payments_configured: config.is_payments_configured(),
        }
    }

    /// Opens a hosted checkout for what is still owed on an invoice.
    pub async fn create_checkout(
        &self,
        invoice_id: Uuid,
        caller_id: Uuid,
        role: Role,
        auth_token: &str,
    ) -> Result<CheckoutResponse, BillingError> {
        if !self.payments_configured {
            return Err(BillingError::PaymentsNotConfigured);
        }

        let invoice = self.invoices.get_for_caller(invoice_id, caller_id, role, auth_token).await?;
        if role == Role::Physician {
            return Err(BillingError::Unauthorized("physicians do not collect payments".to_string()));
        }
        if !invoice.status.is_payable() {
            return Err(BillingError::InvalidInvoiceState(invoice.status));
        }
        if invoice.amount_due_cents <= 0 {
            return Err(BillingError::ValidationError("invoice: nothing is due".to_string()));
        }

        let patient = self.profiles
            .get_profile(invoice.patient_id, auth_token)
            .await
            .map_err(|e| BillingError::DatabaseError(e.to_string()))?;

        let lines = checkout_shares(&invoice.line_items, invoice.amount_due_cents);
        let params = CheckoutSessionParams {
            invoice_id: invoice.id.to_string(),
            invoice_number: &invoice.invoice_number,
            customer: patient.stripe_customer_id.as_deref(),
            customer_email: Some(&patient.email),
            lines: &lines,
            success_url: format!("{}/patient/billing/success?session_id={{CHECKOUT_SESSION_ID}}", self.app_base_url),
            cancel_url: format!("{}/patient/billing/invoices/{}", self.app_base_url, invoice.id),
        };

        let session = self.stripe.create_checkout_session(&params).await?;
        let url = session
            .url
            .clone()
            .ok_or_else(|| BillingError::PaymentProvider("checkout session has no url".to_string()))?;

        self.invoices.attach_checkout_session(invoice.id, &session.id, auth_token).await?;

        info!("Checkout session {} opened for invoice {} ({})",
              session.id, invoice.invoice_number, format_cents(invoice.amount_due_cents));

        Ok(CheckoutResponse { session_id: session.id, url })
    }

    /// Called when the patient returns from checkout.
    pub async fn verify_checkout(
        &self,
        session_id: &str,
        caller_id: Uuid,
        role: Role,
        auth_token: &str,
    ) -> Result<Invoice, BillingError> {
        let session = self.stripe.retrieve_checkout_session(session_id).await?;
        let invoice_id = session
            .invoice_id()
            .ok_or_else(|| BillingError::PaymentProvider("checkout session is not linked to an invoice".to_string()))?;

        let invoice = self.invoices.get_for_caller(invoice_id, caller_id, role, auth_token).await?;
        self.settle(&session, invoice, auth_token).await
    }

    /// Records the payment once. Unpaid sessions and invoices already paid
    /// come back unchanged. Money taken against a void or draft invoice is
    /// recorded but does not change its status.
    async fn settle(&self, session: &StripeCheckoutSession, invoice: Invoice, auth_token: &str) -> Result<Invoice, BillingError> {
        if !session.is_paid() {
            debug!("Session {} not paid yet ({})", session.id, session.payment_status);
            return Ok(invoice);
        }
        if invoice.status == InvoiceStatus::Paid {
            return Ok(invoice);
        }

        let recorded: Vec<Payment> = self.supabase
            .select(
                PAYMENTS_TABLE,
                &QueryBuilder::new().eq("stripe_checkout_session_id", &session.id),
                auth_token,
            )
            .await
            .map_err(|e| BillingError::DatabaseError(e.to_string()))?;
        if !recorded.is_empty() {
            return Ok(invoice);
        }

        let amount = session.amount_total.unwrap_or(invoice.amount_due_cents);
        let payment: Payment = self.supabase
            .insert(PAYMENTS_TABLE, json!({
                "invoice_id": invoice.id,
                "patient_id": invoice.patient_id,
                "amount_cents": amount,
                "stripe_checkout_session_id": session.id,
                "stripe_payment_intent_id": session.payment_intent,
                "created_at": Utc::now().to_rfc3339(),
            }), auth_token)
            .await
            .map_err(|e| BillingError::DatabaseError(e.to_string()))?;

        if !invoice.status.is_payable() {
            warn!("Payment {} of {} received for {} invoice {}; status left unchanged",
                  payment.id, format_cents(payment.amount_cents), invoice.status, invoice.invoice_number);
            return Ok(invoice);
        }

        let updated = self.invoices.apply_payment(&invoice, payment.amount_cents, &session.id, auth_token).await?;

        info!("Payment {} of {} recorded against invoice {}",
              payment.id, format_cents(payment.amount_cents), updated.invoice_number);

        let notification = NewNotification::new(
            updated.patient_id,
            NotificationKind::PaymentReceived,
            "Payment received",
            format!("We received {} for invoice {}.", format_cents(payment.amount_cents), updated.invoice_number),
        ).with_link(format!("/billing/invoices/{}", updated.id));
        self.notifications.notify_best_effort(notification, auth_token).await;

        Ok(updated)
    }

    pub async fn create_portal(&self, caller_id: Uuid, auth_token: &str) -> Result<StripePortalSession, BillingError> {
        let profile = self.profiles
            .get_profile(caller_id, auth_token)
            .await
            .map_err(|e| BillingError::DatabaseError(e.to_string()))?;
        let customer = profile.stripe_customer_id.ok_or(BillingError::NoBillingAccount)?;

        self.stripe
            .create_portal_session(&customer, &format!("{}/patient/billing", self.app_base_url))
            .await
    }

    /// Verifies and applies a Stripe event. Returns whether the event was acted on.
    pub async fn handle_webhook(&self, payload: &[u8], signature: &str) -> Result<bool, BillingError> {
        verify_signature(payload, signature, &self.webhook_secret, Utc::now().timestamp())?;

        let event: StripeEvent = serde_json::from_slice(payload)
            .map_err(|e| BillingError::ValidationError(format!("event: {}", e)))?;

        debug!("Stripe event {} ({})", event.id, event.event_type);

        match event.event_type.as_str() {
            "checkout.session.completed" | "checkout.session.async_payment_succeeded" => {
                let session: StripeCheckoutSession = serde_json::from_value(event.data.object)
                    .map_err(|e| BillingError::ValidationError(format!("event.data.object: {}", e)))?;

                let Some(invoice_id) = session.invoice_id() else {
                    warn!("Checkout session {} has no invoice metadata", session.id);
                    return Ok(false);
                };

                let invoice = self.invoices.get_invoice(invoice_id, &self.service_token).await?;
                self.settle(&session, invoice, &self.service_token).await?;
                Ok(true)
            },
            _ => Ok(false),
        }
    }
}
