// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn appointment_routes(state: Arc<AppConfig>) -> Router {
    let public_routes = Router::new()
        .route("/{appointment_id}", get(handlers::get_appointment));

    let protected_routes = Router::new()
        .route("/", post(handlers::book_appointment))
        .route("/{appointment_id}/status", put(handlers::update_status))
        .route("/{appointment_id}/payment", put(handlers::update_payment))
        .route("/{appointment_id}/cancel", put(handlers::cancel_appointment))
        .route("/{appointment_id}/prescription", put(handlers::add_prescription))
        .route("/patient/appointments", get(handlers::get_patient_appointments))
        .route("/patient/upcoming", get(handlers::get_patient_upcoming))
        .route("/patient/past", get(handlers::get_patient_past))
        .route("/doctor/appointments", get(handlers::get_doctor_appointments))
        .route("/doctor/upcoming", get(handlers::get_doctor_upcoming))
        .route("/doctor/past", get(handlers::get_doctor_past))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    protected_routes.merge(public_routes).with_state(state)
}
