//! Boundary with the appointment/scheduling subsystem.
//!
//! The core touches scheduling in exactly one place: when an encounter with a
//! linked appointment finalizes, that appointment must be marked consulted.
//! Everything else about scheduling lives outside this crate.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Outcome of the consulted notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppointmentUpdate {
    /// The appointment now reports a consulted status.
    Consulted,
    /// The scheduling side knows no such appointment.
    NotFound,
}

/// Transport-level failure reaching the scheduling subsystem.
///
/// Distinct from [`AppointmentUpdate::NotFound`]: this means the answer is
/// unknown, and the finalize that triggered the call must roll back.
#[derive(Debug, thiserror::Error)]
#[error("scheduling collaborator unavailable: {0}")]
pub struct SchedulingUnavailable(pub String);

/// The single call the encounter core makes into scheduling.
#[async_trait]
pub trait SchedulingCollaborator: Send + Sync {
    async fn mark_appointment_consulted(
        &self,
        appointment_id: Uuid,
    ) -> Result<AppointmentUpdate, SchedulingUnavailable>;
}

/// Collaborator for deployments without a scheduling subsystem.
///
/// Acknowledges every notification; an encounter can only carry an
/// appointment reference if something issued one, and with scheduling
/// disabled there is no status to update.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedScheduling;

#[async_trait]
impl SchedulingCollaborator for DetachedScheduling {
    async fn mark_appointment_consulted(
        &self,
        appointment_id: Uuid,
    ) -> Result<AppointmentUpdate, SchedulingUnavailable> {
        debug!(%appointment_id, "scheduling detached; consulted notification dropped");
        Ok(AppointmentUpdate::Consulted)
    }
}

/// In-memory collaborator used by tests and local fixtures.
///
/// Holds a set of known appointments, records which ones were marked
/// consulted, and can be armed to fail the next notification to exercise the
/// finalize rollback path.
#[derive(Debug, Default)]
pub struct InMemoryScheduling {
    known: Mutex<HashSet<Uuid>>,
    consulted: Mutex<HashSet<Uuid>>,
    fail_next: Mutex<Option<String>>,
}

impl InMemoryScheduling {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_appointment(&self, appointment_id: Uuid) {
        self.known.lock().unwrap().insert(appointment_id);
    }

    /// Arms a one-shot transport failure for the next notification.
    pub fn fail_next(&self, reason: impl Into<String>) {
        *self.fail_next.lock().unwrap() = Some(reason.into());
    }

    /// Whether the appointment currently reports a consulted status.
    pub fn is_consulted(&self, appointment_id: Uuid) -> bool {
        self.consulted.lock().unwrap().contains(&appointment_id)
    }
}

#[async_trait]
impl SchedulingCollaborator for InMemoryScheduling {
    async fn mark_appointment_consulted(
        &self,
        appointment_id: Uuid,
    ) -> Result<AppointmentUpdate, SchedulingUnavailable> {
        if let Some(reason) = self.fail_next.lock().unwrap().take() {
            return Err(SchedulingUnavailable(reason));
        }
        if !self.known.lock().unwrap().contains(&appointment_id) {
            return Ok(AppointmentUpdate::NotFound);
        }
        self.consulted.lock().unwrap().insert(appointment_id);
        Ok(AppointmentUpdate::Consulted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_collaborator_tracks_consulted_status() {
        let scheduling = InMemoryScheduling::new();
        let appointment_id = Uuid::new_v4();
        scheduling.add_appointment(appointment_id);

        assert!(!scheduling.is_consulted(appointment_id));
        let outcome = scheduling
            .mark_appointment_consulted(appointment_id)
            .await
            .unwrap();
        assert_eq!(outcome, AppointmentUpdate::Consulted);
        assert!(scheduling.is_consulted(appointment_id));
    }

    #[tokio::test]
    async fn unknown_appointments_report_not_found() {
        let scheduling = InMemoryScheduling::new();
        let outcome = scheduling
            .mark_appointment_consulted(Uuid::new_v4())
            .await
            .unwrap();
        assert_eq!(outcome, AppointmentUpdate::NotFound);
    }

    #[tokio::test]
    async fn armed_failure_fires_once() {
        let scheduling = InMemoryScheduling::new();
        let appointment_id = Uuid::new_v4();
        scheduling.add_appointment(appointment_id);
        scheduling.fail_next("connection reset");

        assert!(scheduling
            .mark_appointment_consulted(appointment_id)
            .await
            .is_err());
        assert!(scheduling
            .mark_appointment_consulted(appointment_id)
            .await
            .is_ok());
    }
}
