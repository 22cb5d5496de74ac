use axum::extract::{Extension, Path, State};
use axum::Json;
use axum_extra::TypedHeader;
use chrono::{Duration, NaiveDate, Utc};
use headers::{Authorization, authorization::Bearer};
use serde_json::json;
use uuid::Uuid;
use wiremock::{MockServer, Mock, ResponseTemplate};
use wiremock::matchers::{method, path, query_param};
use assert_matches::assert_matches;

use insurance_cell::handlers::*;
use insurance_cell::models::*;
use shared_models::error::AppError;
use shared_utils::test_utils::{TestConfig, TestUser};

fn auth_header() -> TypedHeader<Authorization<Bearer>> {
    TypedHeader(Authorization::bearer("test-token").unwrap())
}

fn verification_row(id: Uuid, patient_id: &str, status: &str, verified_days_ago: Option<i64>) -> serde_json::Value {
    let today = Utc::now().date_naive();
    let verified_at = verified_days_ago.map(|days| (Utc::now() - Duration::days(days)).to_rfc3339());
    json!({
        "id": id,
        "patient_id": patient_id,
        "payer_name": "Acme Health",
        "member_id": "M-1001",
        "group_number": "G-7",
        "plan_name": "PPO Gold",
        "status": status,
        "copay_cents": 2500,
        "deductible_cents": 150000,
        "deductible_met_cents": 50000,
        "coverage_start": today - Duration::days(200),
        "coverage_end": today + Duration::days(165),
        "verified_by": null,
        "verified_at": verified_at,
        "failure_reason": null,
        "created_at": "2025-01-01T00:00:00Z"
    })
}

#[tokio::test]
async fn test_patient_submits_own_insurance() {
    let server = MockServer::start().await;
    let patient = TestUser::patient("p@example.com");

    Mock::given(method("POST"))
        .and(path("/rest/v1/insurance_verifications"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            verification_row(Uuid::new_v4(), &patient.id, "pending", None)
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let config = TestConfig::with_mock_server(&server.uri()).to_arc();
    let request = CreateVerificationRequest {
        patient_id: None,
        payer_name: "Acme Health".to_string(),
        member_id: "M-1001".to_string(),
        group_number: Some("G-7".to_string()),
        plan_name: None,
    };

    let result = create_verification(State(config), auth_header(), Extension(patient.to_user()), Json(request))
        .await
        .unwrap();

    assert_eq!(result.0["verification"]["status"], "pending");
}

#[tokio::test]
async fn test_patient_cannot_submit_for_another_patient() {
    let config = TestConfig::default().to_arc();
    let patient = TestUser::patient("p@example.com");
    let request = CreateVerificationRequest {
        patient_id: Some(Uuid::new_v4()),
        payer_name: "Acme Health".to_string(),
        member_id: "M-1001".to_string(),
        group_number: None,
        plan_name: None,
    };

    let result = create_verification(State(config), auth_header(), Extension(patient.to_user()), Json(request)).await;

    assert_matches!(result, Err(AppError::Forbidden(_)));
}

#[tokio::test]
async fn test_verified_result_requires_coverage_dates() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/insurance_verifications"))
        .and(query_param("id", format!("eq.{}", id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            verification_row(id, &Uuid::new_v4().to_string(), "pending", None)
        ])))
        .mount(&server)
        .await;

    let config = TestConfig::with_mock_server(&server.uri()).to_arc();
    let request = RecordVerificationRequest {
        status: VerificationStatus::Verified,
        copay_cents: Some(2500),
        deductible_cents: None,
        deductible_met_cents: None,
        coverage_start: NaiveDate::from_ymd_opt(2030, 12, 31),
        coverage_end: NaiveDate::from_ymd_opt(2030, 1, 1),
        failure_reason: None,
    };
    let staff = TestUser::staff("desk@example.com");

    let result = record_verification(State(config), auth_header(), Extension(staff.to_user()), Path(id), Json(request)).await;

    assert_matches!(result, Err(AppError::ValidationError(msg)) if msg.contains("coverage"));
}

#[tokio::test]
async fn test_active_verification_skips_stale_rows() {
    let server = MockServer::start().await;
    let patient = TestUser::patient("p@example.com");
    let fresh_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/insurance_verifications"))
        .and(query_param("patient_id", format!("eq.{}", patient.id)))
        .and(query_param("status", "eq.verified"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            verification_row(Uuid::new_v4(), &patient.id, "verified", Some(120)),
            verification_row(fresh_id, &patient.id, "verified", Some(10))
        ])))
        .mount(&server)
        .await;

    let config = TestConfig::with_mock_server(&server.uri()).to_arc();
    let patient_id = Uuid::parse_str(&patient.id).unwrap();
    let result = get_active_verification(State(config), auth_header(), Extension(patient.to_user()), Path(patient_id))
        .await
        .unwrap();

    assert_eq!(result.0["verification"]["id"], json!(fresh_id));
    assert_eq!(result.0["remaining_deductible_cents"], 100000);
}

#[tokio::test]
async fn test_no_active_verification_is_404() {
    let server = MockServer::start().await;
    let staff = TestUser::staff("desk@example.com");

    Mock::given(method("GET"))
        .and(path("/rest/v1/insurance_verifications"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let config = TestConfig::with_mock_server(&server.uri()).to_arc();
    let result = get_active_verification(State(config), auth_header(), Extension(staff.to_user()), Path(Uuid::new_v4())).await;

    assert_matches!(result, Err(AppError::NotFound(_)));
}

#[tokio::test]
async fn test_patient_cannot_check_other_patients_coverage() {
    let config = TestConfig::default().to_arc();
    let patient = TestUser::patient("p@example.com");

    let result = get_active_verification(State(config), auth_header(), Extension(patient.to_user()), Path(Uuid::new_v4())).await;

    assert_matches!(result, Err(AppError::Forbidden(_)));
}
