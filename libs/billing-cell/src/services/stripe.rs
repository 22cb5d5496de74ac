use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error};

use shared_config::AppConfig;

use crate::models::{BillingError, StripeCheckoutSession, StripePortalSession};

/// Form-encoded client for the Stripe REST API.
pub struct StripeClient {
    client: Client,
    base_url: String,
    secret_key: String,
}

pub struct CheckoutSessionParams<'a> {
    pub invoice_id: String,
    pub invoice_number: &'a str,
    pub customer: Option<&'a str>,
    pub customer_email: Option<&'a str>,
    pub lines: &'a [(String, i64)],
    pub success_url: String,
    pub cancel_url: String,
}

impl StripeClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.stripe_api_base_url.trim_end_matches('/').to_string(),
            secret_key: config.stripe_secret_key.clone(),
        }
    }

    async fn send<T>(&self, method: Method, path: &str, form: Option<&[(String, String)]>) -> Result<T, BillingError>
    where T: DeserializeOwned {
        if self.secret_key.is_empty() {
            return Err(BillingError::PaymentsNotConfigured);
        }

        let url = format!("{}{}", self.base_url, path);
        debug!("Stripe {} {}", method, url);

        let mut req = self.client.request(method, &url).bearer_auth(&self.secret_key);
        if let Some(params) = form {
            req = req.form(params);
        }

        let response = req
            .send()
            .await
            .map_err(|e| BillingError::PaymentProvider(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            let message = body["error"]["message"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| format!("Stripe returned {}", status));
            error!("Stripe error ({}): {}", status, message);
            return Err(BillingError::PaymentProvider(message));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| BillingError::PaymentProvider(format!("unexpected Stripe response: {}", e)))
    }

    pub async fn create_checkout_session(&self, params: &CheckoutSessionParams<'_>) -> Result<StripeCheckoutSession, BillingError> {
        let mut form = vec![
            ("mode".to_string(), "payment".to_string()),
            ("success_url".to_string(), params.success_url.clone()),
            ("cancel_url".to_string(), params.cancel_url.clone()),
            ("client_reference_id".to_string(), params.invoice_id.clone()),
            ("metadata[invoice_id]".to_string(), params.invoice_id.clone()),
            ("metadata[invoice_number]".to_string(), params.invoice_number.to_string()),
            ("payment_intent_data[metadata][invoice_id]".to_string(), params.invoice_id.clone()),
        ];

        match (params.customer, params.customer_email) {
            (Some(customer), _) => form.push(("customer".to_string(), customer.to_string())),
            (None, Some(email)) => form.push(("customer_email".to_string(), email.to_string())),
            (None, None) => {},
        }

        for (idx, (description, amount)) in params.lines.iter().enumerate() {
            let prefix = format!("line_items[{}]", idx);
            form.push((format!("{}[quantity]", prefix), "1".to_string()));
            form.push((format!("{}[price_data][currency]", prefix), "usd".to_string()));
            form.push((format!("{}[price_data][unit_amount]", prefix), amount.to_string()));
            form.push((format!("{}[price_data][product_data][name]", prefix), description.clone()));
        }

        self.send(Method::POST, "/checkout/sessions", Some(&form)).await
    }

    pub async fn retrieve_checkout_session(&self, session_id: &str) -> Result<StripeCheckoutSession, BillingError> {
        if session_id.is_empty() || !session_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(BillingError::ValidationError("session_id: is malformed".to_string()));
        }
        self.send(Method::GET, &format!("/checkout/sessions/{}", session_id), None).await
    }

    pub async fn create_portal_session(&self, customer: &str, return_url: &str) -> Result<StripePortalSession, BillingError> {
        let form = vec![
            ("customer".to_string(), customer.to_string()),
            ("return_url".to_string(), return_url.to_string()),
        ];
        self.send(Method::POST, "/billing_portal/sessions", Some(&form)).await
    }
}
