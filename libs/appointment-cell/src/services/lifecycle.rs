// libs/appointment-cell/src/services/lifecycle.rs
use tracing::{debug, warn};

use crate::models::{AppointmentError, AppointmentStatus, PaymentStatus};

/// Owns the appointment state machine and the payment sub-state. Any status
/// write goes through the transition tables here; disallowed edges are
/// rejected rather than overwritten.
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Validate that a status transition is allowed.
    pub fn validate_status_transition(
        &self,
        current: AppointmentStatus,
        new: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition {} -> {}", current, new);

        if !self.valid_transitions(current).contains(&new) {
            warn!("Invalid status transition attempted: {} -> {}", current, new);
            return Err(AppointmentError::InvalidStatusTransition {
                from: current,
                to: new,
            });
        }

        Ok(())
    }

    /// All valid next statuses for a given current status.
    pub fn valid_transitions(&self, current: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current {
            AppointmentStatus::Pending => vec![
                AppointmentStatus::Confirmed,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::Confirmed => vec![
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
            ],
            // Terminal states - no transitions allowed
            AppointmentStatus::Completed => vec![],
            AppointmentStatus::Cancelled => vec![],
        }
    }

    /// Validate a payment sub-state transition.
    pub fn validate_payment_transition(
        &self,
        current: PaymentStatus,
        new: PaymentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating payment transition {} -> {}", current, new);

        if !self.valid_payment_transitions(current).contains(&new) {
            warn!("Invalid payment transition attempted: {} -> {}", current, new);
            return Err(AppointmentError::InvalidPaymentTransition {
                from: current,
                to: new,
            });
        }

        Ok(())
    }

    /// All valid next payment statuses. A failed payment may be retried to
    /// completion; a completed payment is terminal.
    pub fn valid_payment_transitions(&self, current: PaymentStatus) -> Vec<PaymentStatus> {
        match current {
            PaymentStatus::Pending => vec![PaymentStatus::Completed, PaymentStatus::Failed],
            PaymentStatus::Failed => vec![PaymentStatus::Completed],
            PaymentStatus::Completed => vec![],
        }
    }

    /// Cancellation is an ordinary edge in the transition table.
    pub fn can_cancel(&self, current: AppointmentStatus) -> bool {
        self.valid_transitions(current)
            .contains(&AppointmentStatus::Cancelled)
    }
}

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn pending_can_be_confirmed_or_cancelled() {
        let lifecycle = AppointmentLifecycleService::new();
        assert!(lifecycle
            .validate_status_transition(AppointmentStatus::Pending, AppointmentStatus::Confirmed)
            .is_ok());
        assert!(lifecycle
            .validate_status_transition(AppointmentStatus::Pending, AppointmentStatus::Cancelled)
            .is_ok());
    }

    #[test]
    fn pending_cannot_jump_to_completed() {
        let lifecycle = AppointmentLifecycleService::new();
        assert_matches!(
            lifecycle.validate_status_transition(
                AppointmentStatus::Pending,
                AppointmentStatus::Completed
            ),
            Err(AppointmentError::InvalidStatusTransition { .. })
        );
    }

    #[test]
    fn confirmed_can_complete_or_cancel() {
        let lifecycle = AppointmentLifecycleService::new();
        assert!(lifecycle
            .validate_status_transition(AppointmentStatus::Confirmed, AppointmentStatus::Completed)
            .is_ok());
        assert!(lifecycle
            .validate_status_transition(AppointmentStatus::Confirmed, AppointmentStatus::Cancelled)
            .is_ok());
    }

    #[test]
    fn terminal_states_reject_all_transitions() {
        let lifecycle = AppointmentLifecycleService::new();
        for terminal in [AppointmentStatus::Completed, AppointmentStatus::Cancelled] {
            for target in [
                AppointmentStatus::Pending,
                AppointmentStatus::Confirmed,
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
            ] {
                assert_matches!(
                    lifecycle.validate_status_transition(terminal, target),
                    Err(AppointmentError::InvalidStatusTransition { .. })
                );
            }
        }
    }

    #[test]
    fn completed_appointment_cannot_be_cancelled() {
        let lifecycle = AppointmentLifecycleService::new();
        assert!(!lifecycle.can_cancel(AppointmentStatus::Completed));
        assert!(lifecycle.can_cancel(AppointmentStatus::Pending));
        assert!(lifecycle.can_cancel(AppointmentStatus::Confirmed));
    }

    #[test]
    fn payment_pending_can_complete_or_fail() {
        let lifecycle = AppointmentLifecycleService::new();
        assert!(lifecycle
            .validate_payment_transition(PaymentStatus::Pending, PaymentStatus::Completed)
            .is_ok());
        assert!(lifecycle
            .validate_payment_transition(PaymentStatus::Pending, PaymentStatus::Failed)
            .is_ok());
    }

    #[test]
    fn failed_payment_can_be_retried_to_completion() {
        let lifecycle = AppointmentLifecycleService::new();
        assert!(lifecycle
            .validate_payment_transition(PaymentStatus::Failed, PaymentStatus::Completed)
            .is_ok());
    }

    #[test]
    fn completed_payment_is_terminal() {
        let lifecycle = AppointmentLifecycleService::new();
        assert_matches!(
            lifecycle.validate_payment_transition(PaymentStatus::Completed, PaymentStatus::Pending),
            Err(AppointmentError::InvalidPaymentTransition { .. })
        );
    }
}
