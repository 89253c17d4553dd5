pub mod availability;
pub mod doctor;

pub use availability::{generate_slots, AvailabilityService, SLOT_MINUTES};
pub use doctor::DoctorService;
