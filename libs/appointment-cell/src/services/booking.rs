// libs/appointment-cell/src/services/booking.rs

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::User;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, BookAppointmentRequest, DoctorAppointment,
    PatientAppointment, PaymentStatus, Prescription,
};
use crate::services::lifecycle::AppointmentLifecycleService;

/// Columns populated for the patient-facing listings.
const PATIENT_SELECT: &str = "select=*,doctor:doctors(full_name,specialization)";
/// Columns populated for the doctor-facing listings.
const DOCTOR_SELECT: &str = "select=*,patient:users(full_name,email)";

fn scoped_list_path(field: &str, id: &str, select: &str) -> String {
    format!("/rest/v1/appointments?{}=eq.{}&order=date.desc&{}", field, id, select)
}

fn upcoming_path(field: &str, id: &str, select: &str, now: DateTime<Utc>) -> String {
    format!(
        "/rest/v1/appointments?{}=eq.{}&date=gte.{}&order=date.asc&{}",
        field,
        id,
        now.to_rfc3339_opts(SecondsFormat::Secs, true),
        select
    )
}

fn past_path(field: &str, id: &str, select: &str, now: DateTime<Utc>) -> String {
    format!(
        "/rest/v1/appointments?{}=eq.{}&date=lt.{}&order=date.desc&{}",
        field,
        id,
        now.to_rfc3339_opts(SecondsFormat::Secs, true),
        select
    )
}

/// Minimal doctor row used for ownership checks; the appointment references
/// the doctor profile id while the principal carries the user id.
#[derive(Debug, Deserialize)]
struct DoctorRef {
    id: Uuid,
}

pub struct AppointmentBookingService {
    supabase: SupabaseClient,
    lifecycle: AppointmentLifecycleService,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            lifecycle: AppointmentLifecycleService::new(),
        }
    }

    /// Book an appointment for the authenticated patient. The referenced
    /// doctor and patient must exist; the slot itself is not reserved, so a
    /// concurrent booking of the same slot succeeds as well.
    pub async fn create_appointment(
        &self,
        patient_id: Uuid,
        request: BookAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!(
            "Creating appointment for patient {} with doctor {}",
            patient_id, request.doctor_id
        );

        self.ensure_doctor_exists(request.doctor_id).await?;
        self.ensure_patient_exists(patient_id).await?;

        let appointment_data = json!({
            "doctor_id": request.doctor_id,
            "patient_id": patient_id,
            "date": request.date.to_rfc3339(),
            "time_slot": request.time_slot,
            "symptoms": request.symptoms,
            "medical_history": request.medical_history,
            "status": AppointmentStatus::Pending,
            "payment_status": PaymentStatus::Pending,
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339(),
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                Some(auth_token),
                Some(appointment_data),
                Some(headers),
            )
            .await
            .map_err(|e| AppointmentError::Database(e.to_string()))?;

        let row = result
            .into_iter()
            .next()
            .ok_or_else(|| AppointmentError::Database("Failed to create appointment".to_string()))?;

        let appointment: Appointment =
            serde_json::from_value(row).map_err(|e| AppointmentError::Database(e.to_string()))?;
        debug!("Appointment created with ID: {}", appointment.id);

        Ok(appointment)
    }

    pub async fn get_appointment(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(|e| AppointmentError::Database(e.to_string()))?;

        let row = result.into_iter().next().ok_or(AppointmentError::NotFound)?;
        serde_json::from_value(row).map_err(|e| AppointmentError::Database(e.to_string()))
    }

    /// Apply a status transition. Only the appointment's own doctor may move
    /// the consultation state, and only along the transition table.
    pub async fn update_status(
        &self,
        appointment_id: Uuid,
        new_status: AppointmentStatus,
        actor: &User,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.get_appointment(appointment_id).await?;

        if !self.is_appointment_doctor(&appointment, actor).await? {
            return Err(AppointmentError::Forbidden);
        }

        self.lifecycle
            .validate_status_transition(appointment.status, new_status)?;

        self.patch_appointment(
            appointment_id,
            json!({
                "status": new_status,
                "updated_at": Utc::now().to_rfc3339(),
            }),
            auth_token,
        )
        .await
    }

    /// Apply a payment transition. Only the appointment's own patient pays.
    pub async fn update_payment_status(
        &self,
        appointment_id: Uuid,
        new_payment_status: PaymentStatus,
        actor: &User,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.get_appointment(appointment_id).await?;

        if appointment.patient_id.to_string() != actor.id {
            return Err(AppointmentError::Forbidden);
        }

        self.lifecycle
            .validate_payment_transition(appointment.payment_status, new_payment_status)?;

        self.patch_appointment(
            appointment_id,
            json!({
                "payment_status": new_payment_status,
                "updated_at": Utc::now().to_rfc3339(),
            }),
            auth_token,
        )
        .await
    }

    /// Cancel an appointment. Allowed for the appointment's own patient or
    /// doctor, and only while the transition table permits cancellation.
    pub async fn cancel_appointment(
        &self,
        appointment_id: Uuid,
        actor: &User,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.get_appointment(appointment_id).await?;

        // The patient match needs no lookup; the doctor profile is only
        // resolved when the caller is not the appointment's patient.
        let is_owner = appointment.patient_id.to_string() == actor.id
            || self.is_appointment_doctor(&appointment, actor).await?;

        if !is_owner {
            return Err(AppointmentError::Forbidden);
        }

        self.lifecycle
            .validate_status_transition(appointment.status, AppointmentStatus::Cancelled)?;

        self.patch_appointment(
            appointment_id,
            json!({
                "status": AppointmentStatus::Cancelled,
                "updated_at": Utc::now().to_rfc3339(),
            }),
            auth_token,
        )
        .await
    }

    /// Record the consultation outcome. Only the appointment's own doctor
    /// may attach a prescription.
    pub async fn add_prescription(
        &self,
        appointment_id: Uuid,
        prescription: Prescription,
        actor: &User,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.get_appointment(appointment_id).await?;

        if !self.is_appointment_doctor(&appointment, actor).await? {
            return Err(AppointmentError::Forbidden);
        }

        if appointment.status == AppointmentStatus::Cancelled {
            return Err(AppointmentError::ValidationError(
                "Cannot add a prescription to a cancelled appointment".to_string(),
            ));
        }

        self.patch_appointment(
            appointment_id,
            json!({
                "prescription": prescription,
                "updated_at": Utc::now().to_rfc3339(),
            }),
            auth_token,
        )
        .await
    }

    // ==========================================================================
    // LISTINGS
    // ==========================================================================

    pub async fn get_patient_appointments(
        &self,
        patient_id: &str,
        auth_token: &str,
    ) -> Result<Vec<PatientAppointment>, AppointmentError> {
        let path = scoped_list_path("patient_id", patient_id, PATIENT_SELECT);
        self.fetch_list(&path, auth_token).await
    }

    pub async fn get_patient_upcoming(
        &self,
        patient_id: &str,
        auth_token: &str,
    ) -> Result<Vec<PatientAppointment>, AppointmentError> {
        let path = upcoming_path("patient_id", patient_id, PATIENT_SELECT, Utc::now());
        self.fetch_list(&path, auth_token).await
    }

    pub async fn get_patient_past(
        &self,
        patient_id: &str,
        auth_token: &str,
    ) -> Result<Vec<PatientAppointment>, AppointmentError> {
        let path = past_path("patient_id", patient_id, PATIENT_SELECT, Utc::now());
        self.fetch_list(&path, auth_token).await
    }

    pub async fn get_doctor_appointments(
        &self,
        actor: &User,
        auth_token: &str,
    ) -> Result<Vec<DoctorAppointment>, AppointmentError> {
        let doctor = self.doctor_for_user(&actor.id).await?.ok_or(AppointmentError::DoctorNotFound)?;
        let path = scoped_list_path("doctor_id", &doctor.id.to_string(), DOCTOR_SELECT);
        self.fetch_list(&path, auth_token).await
    }

    pub async fn get_doctor_upcoming(
        &self,
        actor: &User,
        auth_token: &str,
    ) -> Result<Vec<DoctorAppointment>, AppointmentError> {
        let doctor = self.doctor_for_user(&actor.id).await?.ok_or(AppointmentError::DoctorNotFound)?;
        let path = upcoming_path("doctor_id", &doctor.id.to_string(), DOCTOR_SELECT, Utc::now());
        self.fetch_list(&path, auth_token).await
    }

    pub async fn get_doctor_past(
        &self,
        actor: &User,
        auth_token: &str,
    ) -> Result<Vec<DoctorAppointment>, AppointmentError> {
        let doctor = self.doctor_for_user(&actor.id).await?.ok_or(AppointmentError::DoctorNotFound)?;
        let path = past_path("doctor_id", &doctor.id.to_string(), DOCTOR_SELECT, Utc::now());
        self.fetch_list(&path, auth_token).await
    }

    // ==========================================================================
    // PRIVATE HELPERS
    // ==========================================================================

    async fn fetch_list<T>(&self, path: &str, auth_token: &str) -> Result<Vec<T>, AppointmentError>
    where
        T: serde::de::DeserializeOwned,
    {
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::Database(e.to_string()))?;

        result
            .into_iter()
            .map(|row| serde_json::from_value(row).map_err(|e| AppointmentError::Database(e.to_string())))
            .collect()
    }

    async fn patch_appointment(
        &self,
        appointment_id: Uuid,
        update_data: Value,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(Method::PATCH, &path, Some(auth_token), Some(update_data), Some(headers))
            .await
            .map_err(|e| AppointmentError::Database(e.to_string()))?;

        let row = result.into_iter().next().ok_or(AppointmentError::NotFound)?;
        serde_json::from_value(row).map_err(|e| AppointmentError::Database(e.to_string()))
    }

    async fn ensure_doctor_exists(&self, doctor_id: Uuid) -> Result<(), AppointmentError> {
        let path = format!("/rest/v1/doctors?id=eq.{}&select=id", doctor_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(|e| AppointmentError::Database(e.to_string()))?;

        if result.is_empty() {
            return Err(AppointmentError::DoctorNotFound);
        }
        Ok(())
    }

    async fn ensure_patient_exists(&self, patient_id: Uuid) -> Result<(), AppointmentError> {
        let path = format!("/rest/v1/users?id=eq.{}&select=id", patient_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(|e| AppointmentError::Database(e.to_string()))?;

        if result.is_empty() {
            return Err(AppointmentError::PatientNotFound);
        }
        Ok(())
    }

    async fn doctor_for_user(&self, user_id: &str) -> Result<Option<DoctorRef>, AppointmentError> {
        let path = format!("/rest/v1/doctors?user_id=eq.{}&select=id", user_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(|e| AppointmentError::Database(e.to_string()))?;

        match result.into_iter().next() {
            Some(row) => serde_json::from_value(row)
                .map(Some)
                .map_err(|e| AppointmentError::Database(e.to_string())),
            None => Ok(None),
        }
    }

    async fn is_appointment_doctor(
        &self,
        appointment: &Appointment,
        actor: &User,
    ) -> Result<bool, AppointmentError> {
        match self.doctor_for_user(&actor.id).await? {
            Some(doctor) => Ok(doctor.id == appointment.doctor_id),
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn upcoming_filters_from_now_ascending() {
        let path = upcoming_path("patient_id", "p-1", PATIENT_SELECT, noon());
        assert!(path.contains("patient_id=eq.p-1"));
        assert!(path.contains("date=gte.2025-07-01T12:00:00Z"));
        assert!(path.contains("order=date.asc"));
        assert!(path.contains("doctor:doctors(full_name,specialization)"));
    }

    #[test]
    fn past_filters_before_now_descending() {
        let path = past_path("doctor_id", "d-1", DOCTOR_SELECT, noon());
        assert!(path.contains("doctor_id=eq.d-1"));
        assert!(path.contains("date=lt.2025-07-01T12:00:00Z"));
        assert!(path.contains("order=date.desc"));
        assert!(path.contains("patient:users(full_name,email)"));
    }

    #[test]
    fn scoped_list_is_newest_first() {
        let path = scoped_list_path("patient_id", "p-1", PATIENT_SELECT);
        assert!(path.contains("order=date.desc"));
        assert!(!path.contains("date=gte"));
        assert!(!path.contains("date=lt"));
    }
}
