use axum::extract::{Extension, Query, State};
use axum_extra::TypedHeader;
use chrono::{TimeZone, Utc};
use headers::{Authorization, authorization::Bearer};
use serde_json::json;
use uuid::Uuid;
use wiremock::{MockServer, Mock, ResponseTemplate};
use wiremock::matchers::{method, path, query_param};
use assert_matches::assert_matches;

use analytics_cell::handlers::*;
use analytics_cell::models::*;
use shared_models::error::AppError;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig, TestUser};

fn auth_header() -> TypedHeader<Authorization<Bearer>> {
    TypedHeader(Authorization::bearer("test-token").unwrap())
}

fn year_2025() -> AnalyticsQuery {
    AnalyticsQuery {
        from: Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).single(),
        to: Utc.with_ymd_and_hms(2025, 12, 31, 0, 0, 0).single(),
        ..Default::default()
    }
}

async fn mock_rows(server: &MockServer, table: &str, rows: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(format!("/rest/v1/{}", table)))
        .respond_with(ResponseTemplate::new(200).set_body_json(rows))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_revenue_report_totals() {
    let server = MockServer::start().await;
    let config = TestConfig::with_mock_server(&server.uri()).to_arc();
    let patient = Uuid::new_v4().to_string();

    let mut paid = MockSupabaseResponses::invoice_response(&Uuid::new_v4().to_string(), &patient, "paid", 20_000);
    paid["amount_paid_cents"] = json!(15_000);
    paid["insurance_adjustment_cents"] = json!(5_000);
    paid["amount_due_cents"] = json!(0);
    let open = MockSupabaseResponses::invoice_response(&Uuid::new_v4().to_string(), &patient, "open", 10_000);
    let void = MockSupabaseResponses::invoice_response(&Uuid::new_v4().to_string(), &patient, "void", 40_000);
    mock_rows(&server, "invoices", json!([paid, open, void])).await;

    let result = revenue_report(State(config), auth_header(), Query(year_2025())).await;

    assert!(result.is_ok());
    let report = result.unwrap().0;
    assert_eq!(report["totals"]["billed_cents"], 30_000);
    assert_eq!(report["totals"]["collected_cents"], 20_000);
    assert_eq!(report["totals"]["outstanding_cents"], 10_000);
    assert_eq!(report["totals"]["insurance_adjustments_cents"], 5_000);
    assert_eq!(report["totals"]["collection_rate"], 66.7);
    assert_eq!(report["monthly"][0]["month"], "2025-01");
    assert_eq!(report["status_counts"]["void"], 1);
    assert_eq!(report["status_counts"]["open"], 1);
}

#[tokio::test]
async fn test_revenue_report_filters_by_location() {
    let server = MockServer::start().await;
    let config = TestConfig::with_mock_server(&server.uri()).to_arc();
    let location = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/invoices"))
        .and(query_param("location_id", format!("eq.{}", location)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let query = AnalyticsQuery { location_id: Some(location), ..year_2025() };
    let result = revenue_report(State(config), auth_header(), Query(query)).await;

    let report = result.unwrap().0;
    assert_eq!(report["totals"]["billed_cents"], 0);
    assert_eq!(report["totals"]["collection_rate"], 0.0);
}

#[tokio::test]
async fn test_inverted_period_rejected() {
    let server = MockServer::start().await;
    let config = TestConfig::with_mock_server(&server.uri()).to_arc();

    let query = AnalyticsQuery {
        from: Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).single(),
        to: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).single(),
        ..Default::default()
    };
    let result = revenue_report(State(config), auth_header(), Query(query)).await;

    assert_matches!(result, Err(AppError::BadRequest(_)));
}

#[tokio::test]
async fn test_network_overview_per_location() {
    let server = MockServer::start().await;
    let config = TestConfig::with_mock_server(&server.uri()).to_arc();
    let location_id = Uuid::new_v4().to_string();
    let physician = Uuid::new_v4().to_string();
    let patient = Uuid::new_v4().to_string();

    let mut completed = MockSupabaseResponses::appointment_response(
        &Uuid::new_v4().to_string(), &patient, &physician,
        "2025-03-03T10:00:00Z", "2025-03-03T10:30:00Z", "completed",
    );
    completed["location_id"] = json!(location_id);
    let mut no_show = MockSupabaseResponses::appointment_response(
        &Uuid::new_v4().to_string(), &patient, &physician,
        "2025-03-04T10:00:00Z", "2025-03-04T10:30:00Z", "no_show",
    );
    no_show["location_id"] = json!(location_id);
    let mut remote = MockSupabaseResponses::appointment_response(
        &Uuid::new_v4().to_string(), &patient, &physician,
        "2025-03-05T10:00:00Z", "2025-03-05T10:30:00Z", "completed",
    );
    remote["appointment_type"] = json!("telemedicine");

    let mut paid = MockSupabaseResponses::invoice_response(&Uuid::new_v4().to_string(), &patient, "paid", 9_000);
    paid["location_id"] = json!(location_id);
    paid["amount_paid_cents"] = json!(9_000);
    paid["amount_due_cents"] = json!(0);

    mock_rows(&server, "appointments", json!([completed, no_show, remote])).await;
    mock_rows(&server, "invoices", json!([paid])).await;
    mock_rows(&server, "locations", json!([MockSupabaseResponses::location_response(&location_id)])).await;

    let result = network_overview(State(config), auth_header(), Query(year_2025())).await;

    let overview = result.unwrap().0;
    let clinic = &overview["locations"][0];
    assert_eq!(clinic["location_name"], "Downtown Clinic");
    assert_eq!(clinic["appointments"]["total"], 2);
    assert_eq!(clinic["appointments"]["completion_rate"], 50.0);
    assert_eq!(clinic["appointments"]["no_show_rate"], 50.0);
    assert_eq!(clinic["revenue_collected_cents"], 9_000);
    assert_eq!(overview["locations"][1]["location_name"], "Virtual");
    assert_eq!(overview["locations"][1]["appointments"]["telemedicine_share"], 100.0);
    assert_eq!(overview["totals"]["total"], 3);
    assert_eq!(overview["active_physicians"], 1);
}

#[tokio::test]
async fn test_physician_summary_is_scoped_to_caller() {
    let server = MockServer::start().await;
    let config = TestConfig::with_mock_server(&server.uri()).to_arc();
    let physician = TestUser::physician("doc@example.com");
    let patient = Uuid::new_v4().to_string();

    let completed = MockSupabaseResponses::appointment_response(
        &Uuid::new_v4().to_string(), &patient, &physician.id,
        "2025-02-03T10:00:00Z", "2025-02-03T10:30:00Z", "completed",
    );
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("physician_id", format!("eq.{}", physician.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([completed])))
        .expect(1)
        .mount(&server)
        .await;
    let mut invoice = MockSupabaseResponses::invoice_response(&Uuid::new_v4().to_string(), &patient, "open", 12_500);
    invoice["physician_id"] = json!(physician.id);
    Mock::given(method("GET"))
        .and(path("/rest/v1/invoices"))
        .and(query_param("physician_id", format!("eq.{}", physician.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([invoice])))
        .expect(1)
        .mount(&server)
        .await;

    let result = my_summary(State(config), auth_header(), Extension(physician.to_user()), Query(year_2025())).await;

    let summary = result.unwrap().0;
    assert_eq!(summary["physician_id"], json!(physician.id));
    assert_eq!(summary["appointments"]["completed"], 1);
    assert_eq!(summary["billed_cents"], 12_500);
    assert_eq!(summary["outstanding_cents"], 12_500);
}

#[tokio::test]
async fn test_revenue_report_reads_every_page() {
    use analytics_cell::services::report::PAGE_SIZE;

    let server = MockServer::start().await;
    let config = TestConfig::with_mock_server(&server.uri()).to_arc();
    let patient = Uuid::new_v4().to_string();
    let open = || MockSupabaseResponses::invoice_response(&Uuid::new_v4().to_string(), &patient, "open", 1_000);

    let first: Vec<_> = (0..PAGE_SIZE).map(|_| open()).collect();
    Mock::given(method("GET"))
        .and(path("/rest/v1/invoices"))
        .and(query_param("limit", PAGE_SIZE.to_string()))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(first)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/invoices"))
        .and(query_param("offset", PAGE_SIZE.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([open()])))
        .expect(1)
        .mount(&server)
        .await;

    let report = revenue_report(State(config), auth_header(), Query(year_2025())).await.unwrap().0;

    assert_eq!(report["status_counts"]["open"], PAGE_SIZE + 1);
    assert_eq!(report["totals"]["billed_cents"], (PAGE_SIZE + 1) * 1_000);
}
