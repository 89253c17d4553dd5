// libs/doctor-cell/src/services/availability.rs

use chrono::{Datelike, Duration, NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::User;

use crate::models::{AvailabilityTemplate, DayOfWeek, Doctor, DoctorError, UpdateAvailabilityRequest};

/// Fixed slot granularity in minutes.
pub const SLOT_MINUTES: i64 = 30;

/// Expand weekly availability templates into concrete bookable start times
/// for one calendar date.
///
/// Each template matching the date's weekday is walked independently from its
/// own `start_time` in 30-minute steps, emitting a start time only when a
/// full slot fits before `end_time`. Results are concatenated in template
/// order: overlapping templates yield duplicate slots, and templates on
/// different grids stay misaligned. Slots are display values only;
/// generating them reserves nothing.
pub fn generate_slots(templates: &[AvailabilityTemplate], date: NaiveDate) -> Vec<String> {
    let weekday = DayOfWeek::from(date.weekday());
    let mut slots = Vec::new();

    for template in templates.iter().filter(|t| t.day_of_week == weekday) {
        let mut current = template.start_time;
        loop {
            let (slot_end, wrapped) = current.overflowing_add_signed(Duration::minutes(SLOT_MINUTES));
            if wrapped != 0 || slot_end > template.end_time {
                // No full slot left before end_time (or the step would cross
                // midnight); the walk for this template is done.
                break;
            }
            slots.push(current.format("%H:%M").to_string());
            current = slot_end;
        }
    }

    slots
}

pub struct AvailabilityService {
    supabase: SupabaseClient,
}

impl AvailabilityService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Bookable slots for a doctor on a given date. Unknown weekdays produce
    /// an empty list, not an error.
    pub async fn get_available_slots(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<String>, DoctorError> {
        debug!("Generating slots for doctor {} on {}", doctor_id, date);

        let doctor = self.get_doctor_by_id(doctor_id).await?;
        let slots = generate_slots(&doctor.availability, date);

        debug!("Generated {} slots for doctor {}", slots.len(), doctor_id);
        Ok(slots)
    }

    /// Replace a doctor's weekly availability templates. Only the owning
    /// doctor may write them.
    pub async fn update_availability(
        &self,
        doctor_id: Uuid,
        actor: &User,
        request: UpdateAvailabilityRequest,
        auth_token: &str,
    ) -> Result<Doctor, DoctorError> {
        debug!("Updating availability for doctor {}", doctor_id);

        let doctor = self.get_doctor_by_id(doctor_id).await?;
        if doctor.user_id.to_string() != actor.id {
            return Err(DoctorError::Forbidden);
        }

        for template in &request.availability {
            if !template.is_valid() {
                return Err(DoctorError::InvalidTemplate(format!(
                    "start time must be before end time on {}",
                    template.day_of_week
                )));
            }
        }

        let update_data = json!({
            "availability": request.availability,
            "updated_at": Utc::now().to_rfc3339(),
        });

        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(Method::PATCH, &path, Some(auth_token), Some(update_data), Some(headers))
            .await
            .map_err(|e| DoctorError::Database(e.to_string()))?;

        let updated = result
            .into_iter()
            .next()
            .ok_or(DoctorError::NotFound)?;

        serde_json::from_value(updated).map_err(|e| DoctorError::Database(e.to_string()))
    }

    async fn get_doctor_by_id(&self, doctor_id: Uuid) -> Result<Doctor, DoctorError> {
        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(|e| DoctorError::Database(e.to_string()))?;

        let row = result.into_iter().next().ok_or(DoctorError::NotFound)?;
        serde_json::from_value(row).map_err(|e| DoctorError::Database(e.to_string()))
    }
}
