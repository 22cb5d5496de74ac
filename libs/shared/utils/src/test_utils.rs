use std::sync::Arc;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use base64::{Engine as _, engine::general_purpose};
use serde_json::json;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub stripe_api_base_url: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            stripe_api_base_url: "http://localhost:12111/v1".to_string(),
        }
    }
}

impl TestConfig {
    /// Points both Supabase and Stripe at the same mock server.
    pub fn with_mock_server(uri: &str) -> Self {
        Self {
            supabase_url: uri.to_string(),
            stripe_api_base_url: format!("{}/v1", uri),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            supabase_service_role_key: "test-service-role-key".to_string(),
            stripe_secret_key: "sk_test_practice".to_string(),
            stripe_webhook_secret: "whsec_test_practice".to_string(),
            stripe_api_base_url: self.stripe_api_base_url.clone(),
            app_base_url: "http://localhost:3000".to_string(),
            telemedicine_base_url: "https://meet.test".to_string(),
            api_port: 3000,
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: "patient".to_string(),
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn with_id(mut self, id: impl ToString) -> Self {
        self.id = id.to_string();
        self
    }

    pub fn physician(email: &str) -> Self {
        Self::new(email, "physician")
    }

    pub fn patient(email: &str) -> Self {
        Self::new(email, "patient")
    }

    pub fn staff(email: &str) -> Self {
        Self::new(email, "staff")
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some("authenticated".to_string()),
            metadata: Some(json!({ "role": self.role })),
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": "authenticated",
            "user_metadata": { "role": user.role },
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }
}

/// Canned PostgREST rows for the practice tables.
pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn profile_response(id: &str, role: &str) -> serde_json::Value {
        let specialty = (role == "physician").then_some("Family Medicine");
        json!({
            "id": id,
            "role": role,
            "first_name": "Test",
            "last_name": "User",
            "email": format!("{}@example.com", role),
            "phone": null,
            "date_of_birth": null,
            "specialty": specialty,
            "npi": null,
            "default_location_id": null,
            "stripe_customer_id": null,
            "is_active": true,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn location_response(id: &str) -> serde_json::Value {
        json!({
            "id": id,
            "name": "Downtown Clinic",
            "address": "1 Main St",
            "city": "Springfield",
            "state": "IL",
            "postal_code": "62701",
            "phone": "+1 555 0100",
            "timezone": "UTC",
            "opens_at": "08:00:00",
            "closes_at": "17:00:00",
            "is_active": true,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn appointment_response(
        id: &str,
        patient_id: &str,
        physician_id: &str,
        starts_at: &str,
        ends_at: &str,
        status: &str,
    ) -> serde_json::Value {
        json!({
            "id": id,
            "patient_id": patient_id,
            "physician_id": physician_id,
            "location_id": null,
            "starts_at": starts_at,
            "ends_at": ends_at,
            "appointment_type": "in_person",
            "status": status,
            "reason": "Annual physical",
            "notes": null,
            "cancellation_reason": null,
            "checked_in_at": null,
            "completed_at": null,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn invoice_response(id: &str, patient_id: &str, status: &str, subtotal_cents: i64) -> serde_json::Value {
        json!({
            "id": id,
            "invoice_number": "INV-20250101-ABC123",
            "patient_id": patient_id,
            "encounter_id": null,
            "physician_id": null,
            "location_id": null,
            "status": status,
            "line_items": [
                { "description": "Office visit", "quantity": 1, "unit_price_cents": subtotal_cents }
            ],
            "subtotal_cents": subtotal_cents,
            "insurance_adjustment_cents": 0,
            "amount_paid_cents": 0,
            "amount_due_cents": subtotal_cents,
            "due_date": "2025-02-01",
            "issued_at": null,
            "paid_at": null,
            "stripe_checkout_session_id": null,
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn error_response(message: &str, code: &str) -> serde_json::Value {
        json!({
            "error": {
                "message": message,
                "code": code
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_models::auth::Role;

    #[test]
    fn test_config_creation() {
        let config = TestConfig::default();
        let app_config = config.to_app_config();

        assert_eq!(app_config.supabase_url, "http://localhost:54321");
        assert_eq!(app_config.supabase_anon_key, "test-anon-key");
        assert!(!app_config.supabase_jwt_secret.is_empty());
        assert!(app_config.is_payments_configured());
    }

    #[test]
    fn test_user_creation() {
        let user = TestUser::physician("doc@example.com");
        assert_eq!(user.email, "doc@example.com");
        assert_eq!(user.role, "physician");

        let user_model = user.to_user();
        assert_eq!(user_model.email, Some(user.email.clone()));
        assert_eq!(user_model.practice_role(), Role::Physician);
        assert_eq!(user_model.id, user.id);
    }

    #[test]
    fn test_jwt_token_creation() {
        let user = TestUser::default();
        let token = JwtTestUtils::create_test_token(&user, "test-secret", Some(1));

        assert_eq!(token.split('.').count(), 3);
    }
}
