// libs/doctor-cell/tests/handlers_test.rs

use std::sync::Arc;

use assert_matches::assert_matches;
use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use chrono::NaiveTime;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use doctor_cell::handlers::*;
use doctor_cell::models::*;
use shared_config::AppConfig;
use shared_models::{auth::User, error::AppError};
use shared_utils::test_utils::{MockRows, TestConfig, TestUser};

fn config_for(mock_server: &MockServer) -> Arc<AppConfig> {
    TestConfig::with_url(&mock_server.uri()).to_arc()
}

fn auth_header() -> TypedHeader<Authorization<Bearer>> {
    TypedHeader(Authorization::bearer("test-token").unwrap())
}

fn extension(user: &TestUser) -> Extension<User> {
    Extension(user.to_user())
}

fn doctor_row_with_availability(id: &str, user_id: &str) -> serde_json::Value {
    let mut row = MockRows::doctor_row(id, user_id);
    row["availability"] = json!([
        {"day_of_week": "Tuesday", "start_time": "09:00", "end_time": "10:00"},
        {"day_of_week": "Friday", "start_time": "14:00", "end_time": "15:30"}
    ]);
    row
}

#[tokio::test]
async fn availability_endpoint_generates_slots_for_the_requested_date() {
    let mock_server = MockServer::start().await;
    let config = config_for(&mock_server);
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("id", format!("eq.{}", doctor_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            doctor_row_with_availability(&doctor_id.to_string(), &Uuid::new_v4().to_string())
        ])))
        .mount(&mock_server)
        .await;

    // 2025-07-01 is a Tuesday.
    let result = get_doctor_availability(
        State(config),
        Path(doctor_id),
        Query(SlotQuery {
            date: "2025-07-01".parse().unwrap(),
        }),
    )
    .await;

    let slots = result.expect("availability should succeed").0;
    assert_eq!(slots, vec!["09:00".to_string(), "09:30".to_string()]);
}

#[tokio::test]
async fn availability_is_empty_when_no_template_matches_the_weekday() {
    let mock_server = MockServer::start().await;
    let config = config_for(&mock_server);
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("id", format!("eq.{}", doctor_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            doctor_row_with_availability(&doctor_id.to_string(), &Uuid::new_v4().to_string())
        ])))
        .mount(&mock_server)
        .await;

    // 2025-07-02 is a Wednesday, which has no template.
    let result = get_doctor_availability(
        State(config),
        Path(doctor_id),
        Query(SlotQuery {
            date: "2025-07-02".parse().unwrap(),
        }),
    )
    .await;

    let slots = result.expect("availability should succeed").0;
    assert!(slots.is_empty());
}

#[tokio::test]
async fn availability_for_unknown_doctor_is_404() {
    let mock_server = MockServer::start().await;
    let config = config_for(&mock_server);
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("id", format!("eq.{}", doctor_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let result = get_doctor_availability(
        State(config),
        Path(doctor_id),
        Query(SlotQuery {
            date: "2025-07-01".parse().unwrap(),
        }),
    )
    .await;

    assert_matches!(result, Err(AppError::NotFound(_)));
}

#[tokio::test]
async fn listing_doctors_returns_all_profiles() {
    let mock_server = MockServer::start().await;
    let config = config_for(&mock_server);

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("order", "created_at.asc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockRows::doctor_row(&Uuid::new_v4().to_string(), &Uuid::new_v4().to_string()),
            MockRows::doctor_row(&Uuid::new_v4().to_string(), &Uuid::new_v4().to_string())
        ])))
        .mount(&mock_server)
        .await;

    let result = list_doctors(State(config)).await;

    let body = result.expect("listing should succeed").0;
    let doctors: Vec<Doctor> = serde_json::from_value(body).expect("rows should deserialize");
    assert_eq!(doctors.len(), 2);
}

#[tokio::test]
async fn profile_creation_requires_doctor_role() {
    let mock_server = MockServer::start().await;
    let config = config_for(&mock_server);
    let patient = TestUser::patient("patient@example.com");

    let result = create_doctor(
        State(config),
        auth_header(),
        extension(&patient),
        Json(CreateDoctorRequest {
            user_id: Uuid::parse_str(&patient.id).unwrap(),
            specialization: "Cardiology".to_string(),
            experience_years: 5,
            bio: None,
            phone: None,
            clinic_address: None,
            availability: None,
        }),
    )
    .await;

    assert_matches!(result, Err(AppError::Forbidden(_)));
}

#[tokio::test]
async fn duplicate_profile_creation_is_a_conflict() {
    let mock_server = MockServer::start().await;
    let config = config_for(&mock_server);
    let doctor_user = TestUser::doctor("doctor@example.com");

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("user_id", format!("eq.{}", doctor_user.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockRows::doctor_row(&Uuid::new_v4().to_string(), &doctor_user.id)
        ])))
        .mount(&mock_server)
        .await;

    let result = create_doctor(
        State(config),
        auth_header(),
        extension(&doctor_user),
        Json(CreateDoctorRequest {
            user_id: Uuid::parse_str(&doctor_user.id).unwrap(),
            specialization: "Cardiology".to_string(),
            experience_years: 5,
            bio: None,
            phone: None,
            clinic_address: None,
            availability: None,
        }),
    )
    .await;

    assert_matches!(result, Err(AppError::Conflict(_)));
}

#[tokio::test]
async fn availability_update_by_non_owner_is_403() {
    let mock_server = MockServer::start().await;
    let config = config_for(&mock_server);
    let other_doctor = TestUser::doctor("other@example.com");
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("id", format!("eq.{}", doctor_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockRows::doctor_row(&doctor_id.to_string(), &Uuid::new_v4().to_string())
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let result = update_availability(
        State(config),
        Path(doctor_id),
        auth_header(),
        extension(&other_doctor),
        Json(UpdateAvailabilityRequest {
            availability: vec![],
        }),
    )
    .await;

    assert_matches!(result, Err(AppError::Forbidden(_)));
}

#[tokio::test]
async fn availability_update_rejects_inverted_templates() {
    let mock_server = MockServer::start().await;
    let config = config_for(&mock_server);
    let doctor_user = TestUser::doctor("doctor@example.com");
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("id", format!("eq.{}", doctor_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockRows::doctor_row(&doctor_id.to_string(), &doctor_user.id)
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let inverted = AvailabilityTemplate {
        day_of_week: DayOfWeek::Monday,
        start_time: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        end_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
    };

    let result = update_availability(
        State(config),
        Path(doctor_id),
        auth_header(),
        extension(&doctor_user),
        Json(UpdateAvailabilityRequest {
            availability: vec![inverted],
        }),
    )
    .await;

    assert_matches!(result, Err(AppError::ValidationError(_)));
}

#[tokio::test]
async fn owner_replaces_availability_templates() {
    let mock_server = MockServer::start().await;
    let config = config_for(&mock_server);
    let doctor_user = TestUser::doctor("doctor@example.com");
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("id", format!("eq.{}", doctor_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockRows::doctor_row(&doctor_id.to_string(), &doctor_user.id)
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("id", format!("eq.{}", doctor_id)))
        .and(body_partial_json(json!({
            "availability": [
                {"day_of_week": "Monday", "start_time": "09:00", "end_time": "12:00"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            doctor_row_with_availability(&doctor_id.to_string(), &doctor_user.id)
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = update_availability(
        State(config),
        Path(doctor_id),
        auth_header(),
        extension(&doctor_user),
        Json(UpdateAvailabilityRequest {
            availability: vec![AvailabilityTemplate {
                day_of_week: DayOfWeek::Monday,
                start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                end_time: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            }],
        }),
    )
    .await;

    let body = result.expect("availability update should succeed").0;
    assert_eq!(body["message"], "Availability updated successfully");
}
