// libs/doctor-cell/src/services/doctor.rs

use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::User;
use shared_models::users::UserAccount;

use crate::models::{CreateDoctorRequest, Doctor, DoctorError, UpdateDoctorRequest};

pub struct DoctorService {
    supabase: SupabaseClient,
}

impl DoctorService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn list_doctors(&self) -> Result<Vec<Doctor>, DoctorError> {
        debug!("Fetching all doctors");

        let path = "/rest/v1/doctors?order=created_at.asc";
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, path, None, None)
            .await
            .map_err(|e| DoctorError::Database(e.to_string()))?;

        result
            .into_iter()
            .map(|row| serde_json::from_value(row).map_err(|e| DoctorError::Database(e.to_string())))
            .collect()
    }

    pub async fn get_doctor(&self, doctor_id: Uuid) -> Result<Doctor, DoctorError> {
        debug!("Fetching doctor {}", doctor_id);

        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(|e| DoctorError::Database(e.to_string()))?;

        let row = result.into_iter().next().ok_or(DoctorError::NotFound)?;
        serde_json::from_value(row).map_err(|e| DoctorError::Database(e.to_string()))
    }

    /// Resolve the doctor profile belonging to an authenticated user, if any.
    pub async fn get_doctor_for_user(&self, user_id: &str) -> Result<Option<Doctor>, DoctorError> {
        let path = format!("/rest/v1/doctors?user_id=eq.{}", user_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(|e| DoctorError::Database(e.to_string()))?;

        match result.into_iter().next() {
            Some(row) => serde_json::from_value(row)
                .map(Some)
                .map_err(|e| DoctorError::Database(e.to_string())),
            None => Ok(None),
        }
    }

    /// Create a doctor profile for an existing doctor-role user. One profile
    /// per user.
    pub async fn create_doctor(
        &self,
        request: CreateDoctorRequest,
        auth_token: &str,
    ) -> Result<Doctor, DoctorError> {
        debug!("Creating doctor profile for user {}", request.user_id);

        if self.get_doctor_for_user(&request.user_id.to_string()).await?.is_some() {
            return Err(DoctorError::ProfileExists);
        }

        let user = self.get_user(request.user_id).await?;
        if user.role != "doctor" {
            return Err(DoctorError::InvalidUser);
        }

        if let Some(templates) = &request.availability {
            for template in templates {
                if !template.is_valid() {
                    return Err(DoctorError::InvalidTemplate(format!(
                        "start time must be before end time on {}",
                        template.day_of_week
                    )));
                }
            }
        }

        let doctor_data = json!({
            "user_id": request.user_id,
            "full_name": user.full_name,
            "email": user.email,
            "specialization": request.specialization,
            "experience_years": request.experience_years,
            "bio": request.bio,
            "phone": request.phone,
            "clinic_address": request.clinic_address,
            "availability": request.availability.unwrap_or_default(),
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339(),
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/doctors",
                Some(auth_token),
                Some(doctor_data),
                Some(headers),
            )
            .await
            .map_err(|e| DoctorError::Database(e.to_string()))?;

        let row = result
            .into_iter()
            .next()
            .ok_or_else(|| DoctorError::Database("Failed to create doctor profile".to_string()))?;

        let doctor: Doctor = serde_json::from_value(row).map_err(|e| DoctorError::Database(e.to_string()))?;
        debug!("Doctor profile created with ID: {}", doctor.id);

        Ok(doctor)
    }

    /// Update profile fields. Only the owning doctor may write them.
    pub async fn update_doctor(
        &self,
        doctor_id: Uuid,
        actor: &User,
        request: UpdateDoctorRequest,
        auth_token: &str,
    ) -> Result<Doctor, DoctorError> {
        debug!("Updating doctor {}", doctor_id);

        let doctor = self.get_doctor(doctor_id).await?;
        if doctor.user_id.to_string() != actor.id {
            return Err(DoctorError::Forbidden);
        }

        let mut update_data = serde_json::Map::new();

        if let Some(specialization) = request.specialization {
            update_data.insert("specialization".to_string(), json!(specialization));
        }
        if let Some(experience_years) = request.experience_years {
            update_data.insert("experience_years".to_string(), json!(experience_years));
        }
        if let Some(bio) = request.bio {
            update_data.insert("bio".to_string(), json!(bio));
        }
        if let Some(phone) = request.phone {
            update_data.insert("phone".to_string(), json!(phone));
        }
        if let Some(clinic_address) = request.clinic_address {
            update_data.insert("clinic_address".to_string(), json!(clinic_address));
        }

        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(Value::Object(update_data)),
                Some(headers),
            )
            .await
            .map_err(|e| DoctorError::Database(e.to_string()))?;

        let row = result.into_iter().next().ok_or(DoctorError::NotFound)?;
        serde_json::from_value(row).map_err(|e| DoctorError::Database(e.to_string()))
    }

    async fn get_user(&self, user_id: Uuid) -> Result<UserAccount, DoctorError> {
        let path = format!("/rest/v1/users?id=eq.{}", user_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(|e| DoctorError::Database(e.to_string()))?;

        let row = result.into_iter().next().ok_or(DoctorError::InvalidUser)?;
        serde_json::from_value(row).map_err(|e| DoctorError::Database(e.to_string()))
    }
}
