//! Encounter root record and the whole-document aggregate view.

use crate::model::collections::{
    Medication, PerformedAnalysis, RecommendedInvestigation, SecondaryDiagnosis,
};
use crate::model::sections::SectionSet;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use encounter_types::EncounterStatus;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Root record of one clinical consultation visit.
///
/// Carries identity, linkage, and workflow state only; clinical content lives
/// in the section and collection rows. List views read this record alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Encounter {
    pub id: Uuid,
    /// Link to the scheduling subsystem. `None` for walk-in visits created
    /// without a prior appointment.
    pub appointment_id: Option<Uuid>,
    pub patient_id: Uuid,
    pub clinician_id: Uuid,
    pub encounter_date: NaiveDate,
    pub encounter_time: NaiveTime,
    /// Free-text visit category: first visit, follow-up, urgent.
    pub kind: String,
    pub status: EncounterStatus,
    /// Set exactly once, by the finalize transition.
    pub finalized_at: Option<DateTime<Utc>>,
    /// Effective consultation duration, set on finalize.
    pub duration_minutes: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub created_by: Uuid,
    pub modified_at: Option<DateTime<Utc>>,
    pub modified_by: Option<Uuid>,
}

impl Encounter {
    /// Combined date and time of the visit.
    pub fn date_and_time(&self) -> chrono::NaiveDateTime {
        self.encounter_date.and_time(self.encounter_time)
    }

    /// True while the encounter still accepts draft saves.
    pub fn is_open(&self) -> bool {
        self.status == EncounterStatus::InProgress
    }
}

/// The whole consultation document: root plus every persisted sub-part.
///
/// Assembled by the repository's aggregate read; sections never saved are
/// simply absent. This is the shape the editing surface and the medical
/// letter renderer consume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncounterAggregate {
    pub encounter: Encounter,
    pub sections: SectionSet,
    pub secondary_diagnoses: Vec<SecondaryDiagnosis>,
    pub medications: Vec<Medication>,
    pub recommended_investigations: Vec<RecommendedInvestigation>,
    pub performed_analyses: Vec<PerformedAnalysis>,
}
