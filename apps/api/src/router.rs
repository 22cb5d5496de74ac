use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use analytics_cell::router::analytics_routes;
use appointment_cell::router::appointment_routes;
use auth_cell::router::{auth_routes, portal_routes};
use billing_cell::router::billing_routes;
use insurance_cell::router::insurance_routes;
use notification_cell::router::notification_routes;
use profile_cell::router::{location_routes, profile_routes};
use telemedicine_cell::router::telemedicine_routes;
use shared_config::AppConfig;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "Practice API is running!" }))
        .merge(portal_routes(state.clone()))
        .nest("/auth", auth_routes(state.clone()))
        .nest("/profiles", profile_routes(state.clone()))
        .nest("/locations", location_routes(state.clone()))
        .nest("/appointments", appointment_routes(state.clone()))
        .nest("/billing", billing_routes(state.clone()))
        .nest("/insurance", insurance_routes(state.clone()))
        .nest("/telemedicine", telemedicine_routes(state.clone()))
        .nest("/notifications", notification_routes(state.clone()))
        .nest("/analytics", analytics_routes(state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::{Request, StatusCode}};
    use tower::ServiceExt;

    use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

    fn request(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_liveness() {
        let app = create_router(TestConfig::default().to_arc());
        let response = app.oneshot(request("/", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_protected_routes_require_token() {
        for uri in ["/appointments", "/billing/invoices", "/insurance/verifications", "/analytics/revenue"] {
            let app = create_router(TestConfig::default().to_arc());
            let response = app.oneshot(request(uri, None)).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_analytics_is_staff_only() {
        let config = TestConfig::default().to_arc();
        let token = JwtTestUtils::create_test_token(&TestUser::patient("p@example.com"), &config.supabase_jwt_secret, None);

        let response = create_router(config).oneshot(request("/analytics/revenue", Some(&token))).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_portals_are_gated_by_role() {
        let config = TestConfig::default().to_arc();
        let patient = JwtTestUtils::create_test_token(&TestUser::patient("p@example.com"), &config.supabase_jwt_secret, None);
        let staff = JwtTestUtils::create_test_token(&TestUser::staff("s@example.com"), &config.supabase_jwt_secret, None);

        let response = create_router(config.clone()).oneshot(request("/patient", Some(&patient))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = create_router(config.clone()).oneshot(request("/admin", Some(&patient))).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = create_router(config.clone()).oneshot(request("/admin", Some(&staff))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = create_router(config).oneshot(request("/physician", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
