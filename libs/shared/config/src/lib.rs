use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    /// Used for server-initiated writes such as payment webhooks.
    pub supabase_service_role_key: String,
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub stripe_api_base_url: String,
    pub app_base_url: String,
    pub telemedicine_base_url: String,
    pub api_port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY").unwrap_or_default(),
            stripe_secret_key: env::var("STRIPE_SECRET_KEY")
                .unwrap_or_else(|_| {
                    warn!("STRIPE_SECRET_KEY not set, using empty value");
                    String::new()
                }),
            stripe_webhook_secret: env::var("STRIPE_WEBHOOK_SECRET")
                .unwrap_or_else(|_| {
                    warn!("STRIPE_WEBHOOK_SECRET not set, using empty value");
                    String::new()
                }),
            stripe_api_base_url: env::var("STRIPE_API_BASE_URL")
                .unwrap_or_else(|_| "https://api.stripe.com/v1".to_string()),
            app_base_url: env::var("APP_BASE_URL")
                .unwrap_or_else(|_| {
                    warn!("APP_BASE_URL not set, using default");
                    "http://localhost:3000".to_string()
                }),
            telemedicine_base_url: env::var("TELEMEDICINE_BASE_URL")
                .unwrap_or_else(|_| {
                    warn!("TELEMEDICINE_BASE_URL not set, using default");
                    "https://meet.practice.local".to_string()
                }),
            api_port: env::var("API_PORT")
                .ok()
                .and_then(|port| port.parse().ok())
                .unwrap_or(3000),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }
        if !config.is_payments_configured() {
            warn!("Stripe not configured - checkout and webhooks will be rejected");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    /// Token for requests made without a user session.
    pub fn service_token(&self) -> &str {
        if self.supabase_service_role_key.is_empty() {
            &self.supabase_anon_key
        } else {
            &self.supabase_service_role_key
        }
    }

    pub fn is_payments_configured(&self) -> bool {
        !self.stripe_secret_key.is_empty()
            && !self.stripe_webhook_secret.is_empty()
            && !self.stripe_api_base_url.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank() -> AppConfig {
        AppConfig {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_jwt_secret: String::new(),
            supabase_service_role_key: String::new(),
            stripe_secret_key: String::new(),
            stripe_webhook_secret: String::new(),
            stripe_api_base_url: "https://api.stripe.com/v1".to_string(),
            app_base_url: "http://localhost:3000".to_string(),
            telemedicine_base_url: "https://meet.practice.local".to_string(),
            api_port: 3000,
        }
    }

    #[test]
    fn test_unconfigured_by_default() {
        let config = blank();
        assert!(!config.is_configured());
        assert!(!config.is_payments_configured());
    }

    #[test]
    fn test_payments_need_both_secrets() {
        let mut config = blank();
        config.stripe_secret_key = "sk_test_123".to_string();
        assert!(!config.is_payments_configured());

        config.stripe_webhook_secret = "whsec_123".to_string();
        assert!(config.is_payments_configured());
    }

    #[test]
    fn test_service_token_falls_back_to_anon_key() {
        let mut config = blank();
        config.supabase_anon_key = "anon".to_string();
        assert_eq!(config.service_token(), "anon");

        config.supabase_service_role_key = "service".to_string();
        assert_eq!(config.service_token(), "service");
    }
}
