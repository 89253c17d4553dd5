// libs/doctor-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    CreateDoctorRequest, DoctorError, SlotQuery, UpdateAvailabilityRequest, UpdateDoctorRequest,
};
use crate::services::availability::AvailabilityService;
use crate::services::doctor::DoctorService;

fn map_doctor_error(e: DoctorError) -> AppError {
    match e {
        DoctorError::NotFound => AppError::NotFound("Doctor not found".to_string()),
        DoctorError::ProfileExists => {
            AppError::Conflict("Doctor profile already exists for this user".to_string())
        }
        DoctorError::InvalidUser => {
            AppError::BadRequest("User not found or does not have doctor role".to_string())
        }
        DoctorError::Forbidden => {
            AppError::Forbidden("Not authorized to modify this doctor profile".to_string())
        }
        DoctorError::InvalidTemplate(msg) => AppError::ValidationError(msg),
        DoctorError::Database(msg) => AppError::Database(msg),
    }
}

// ==============================================================================
// PUBLIC HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_doctors(State(state): State<Arc<AppConfig>>) -> Result<Json<Value>, AppError> {
    let service = DoctorService::new(&state);
    let doctors = service.list_doctors().await.map_err(map_doctor_error)?;

    Ok(Json(json!(doctors)))
}

#[axum::debug_handler]
pub async fn get_doctor(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = DoctorService::new(&state);
    let doctor = service.get_doctor(doctor_id).await.map_err(map_doctor_error)?;

    Ok(Json(json!(doctor)))
}

/// Bookable start times for one calendar date, derived from the doctor's
/// weekly templates. Returns an empty array when nothing matches the weekday.
#[axum::debug_handler]
pub async fn get_doctor_availability(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<SlotQuery>,
) -> Result<Json<Vec<String>>, AppError> {
    let service = AvailabilityService::new(&state);
    let slots = service
        .get_available_slots(doctor_id, query.date)
        .await
        .map_err(map_doctor_error)?;

    Ok(Json(slots))
}

// ==============================================================================
// PROTECTED HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_doctor(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateDoctorRequest>,
) -> Result<Json<Value>, AppError> {
    if !user.is_doctor() {
        return Err(AppError::Forbidden("Doctor access required".to_string()));
    }

    // A doctor may only create their own profile.
    if request.user_id.to_string() != user.id {
        return Err(AppError::Forbidden(
            "Not authorized to create a profile for another user".to_string(),
        ));
    }

    let service = DoctorService::new(&state);
    let doctor = service
        .create_doctor(request, auth.token())
        .await
        .map_err(map_doctor_error)?;

    Ok(Json(json!({
        "message": "Doctor profile created successfully",
        "doctor": doctor
    })))
}

#[axum::debug_handler]
pub async fn update_doctor(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateDoctorRequest>,
) -> Result<Json<Value>, AppError> {
    if !user.is_doctor() {
        return Err(AppError::Forbidden("Doctor access required".to_string()));
    }

    let service = DoctorService::new(&state);
    let doctor = service
        .update_doctor(doctor_id, &user, request, auth.token())
        .await
        .map_err(map_doctor_error)?;

    Ok(Json(json!({
        "message": "Doctor profile updated successfully",
        "doctor": doctor
    })))
}

#[axum::debug_handler]
pub async fn update_availability(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateAvailabilityRequest>,
) -> Result<Json<Value>, AppError> {
    if !user.is_doctor() {
        return Err(AppError::Forbidden("Doctor access required".to_string()));
    }

    let service = AvailabilityService::new(&state);
    let doctor = service
        .update_availability(doctor_id, &user, request, auth.token())
        .await
        .map_err(map_doctor_error)?;

    Ok(Json(json!({
        "message": "Availability updated successfully",
        "doctor": doctor
    })))
}
