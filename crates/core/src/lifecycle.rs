//! Encounter lifecycle orchestration.
//!
//! The only component aware of the draft → finalized state machine and its
//! invariants. Stateless between calls: every operation opens one transaction,
//! applies all of its writes inside it, and commits or rolls back as a unit,
//! so a retried autosave after a timeout can never half-apply. Across calls
//! the last committed write wins; parts of the aggregate a call does not
//! touch are left exactly as they were.

use crate::error::{EncounterError, EncounterResult};
use crate::model::collections::{
    MedicationEntry, PerformedAnalysisEntry, RecommendedInvestigationEntry,
    SecondaryDiagnosisEntry, MAX_SECONDARY_DIAGNOSES,
};
use crate::model::sections::{
    Conclusion, HistoryAndRiskFactors, InvestigationNotes, PhysicalExam, PresentingComplaint,
    PrincipalDiagnosis, SectionData, Treatment,
};
use crate::reference::{DiagnosisInfo, MedicationInfo, ReferenceDataProvider};
use crate::repositories::encounter::{
    create_in, find_open_draft_in, get_by_id_in, update_in, DraftScope, EncounterRepository,
    NewEncounter,
};
use crate::scheduling::{AppointmentUpdate, SchedulingCollaborator};
use crate::store::{collections, sections, Database};
use chrono::{NaiveDate, NaiveTime, Utc};
use encounter_types::EncounterStatus;
use sqlx::SqliteConnection;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// One autosave submission from the editing surface.
///
/// Sparse: only the sections and collections present in the request are
/// written; everything else is untouched by this call. Collections are
/// always the complete current list, never a diff.
#[derive(Debug, Clone)]
pub struct DraftRequest {
    /// Explicit target; when absent the open-draft lookup decides between
    /// updating an existing draft and creating a new one.
    pub encounter_id: Option<Uuid>,
    pub appointment_id: Option<Uuid>,
    pub patient_id: Uuid,
    pub clinician_id: Uuid,
    pub encounter_date: NaiveDate,
    pub encounter_time: NaiveTime,
    pub kind: String,
    /// Clinician performing the save; recorded in every audit pair touched.
    pub actor: Uuid,

    pub presenting_complaint: Option<PresentingComplaint>,
    pub history_and_risk_factors: Option<HistoryAndRiskFactors>,
    pub physical_exam: Option<PhysicalExam>,
    pub investigation_notes: Option<InvestigationNotes>,
    pub principal_diagnosis: Option<PrincipalDiagnosis>,
    pub treatment: Option<Treatment>,
    pub conclusion: Option<Conclusion>,

    pub secondary_diagnoses: Option<Vec<SecondaryDiagnosisEntry>>,
    pub medications: Option<Vec<MedicationEntry>>,
    pub recommended_investigations: Option<Vec<RecommendedInvestigationEntry>>,
    pub performed_analyses: Option<Vec<PerformedAnalysisEntry>>,
}

impl DraftRequest {
    /// A request carrying root fields only; sections and collections are
    /// filled in by the caller as the form is edited.
    pub fn new(
        patient_id: Uuid,
        clinician_id: Uuid,
        encounter_date: NaiveDate,
        encounter_time: NaiveTime,
        kind: impl Into<String>,
        actor: Uuid,
    ) -> Self {
        Self {
            encounter_id: None,
            appointment_id: None,
            patient_id,
            clinician_id,
            encounter_date,
            encounter_time,
            kind: kind.into(),
            actor,
            presenting_complaint: None,
            history_and_risk_factors: None,
            physical_exam: None,
            investigation_notes: None,
            principal_diagnosis: None,
            treatment: None,
            conclusion: None,
            secondary_diagnoses: None,
            medications: None,
            recommended_investigations: None,
            performed_analyses: None,
        }
    }

    fn supplied_sections(&self) -> Vec<SectionData> {
        let mut sections = Vec::new();
        if let Some(s) = &self.presenting_complaint {
            sections.push(SectionData::PresentingComplaint(s.clone()));
        }
        if let Some(s) = &self.history_and_risk_factors {
            sections.push(SectionData::HistoryAndRiskFactors(s.clone()));
        }
        if let Some(s) = &self.physical_exam {
            sections.push(SectionData::PhysicalExam(s.clone()));
        }
        if let Some(s) = &self.investigation_notes {
            sections.push(SectionData::InvestigationNotes(s.clone()));
        }
        if let Some(s) = &self.principal_diagnosis {
            sections.push(SectionData::PrincipalDiagnosis(s.clone()));
        }
        if let Some(s) = &self.treatment {
            sections.push(SectionData::Treatment(s.clone()));
        }
        if let Some(s) = &self.conclusion {
            sections.push(SectionData::Conclusion(s.clone()));
        }
        sections
    }
}

/// Orchestrates draft creation/lookup, autosave, and the finalize transition.
#[derive(Clone)]
pub struct EncounterLifecycle {
    db: Database,
    repository: EncounterRepository,
    scheduling: Arc<dyn SchedulingCollaborator>,
    reference: Arc<dyn ReferenceDataProvider>,
}

impl EncounterLifecycle {
    pub fn new(
        db: Database,
        scheduling: Arc<dyn SchedulingCollaborator>,
        reference: Arc<dyn ReferenceDataProvider>,
    ) -> Self {
        let repository = EncounterRepository::new(db.clone());
        Self {
            db,
            repository,
            scheduling,
            reference,
        }
    }

    /// Read access to the root records and the aggregate view.
    pub fn repository(&self) -> &EncounterRepository {
        &self.repository
    }

    /// Saves one autosave submission; returns the encounter id.
    ///
    /// Without an explicit id this first looks for an open draft under the
    /// request's scoping and reuses it, so an editing surface autosaving
    /// every few seconds converges on one encounter instead of creating one
    /// per keystroke. All writes of the call are one transaction.
    #[instrument(skip_all, fields(patient_id = %request.patient_id))]
    pub async fn save_draft(&self, request: DraftRequest) -> EncounterResult<Uuid> {
        validate_identifiers(&request)?;
        if let Some(diagnoses) = &request.secondary_diagnoses {
            validate_secondary_count(diagnoses.len())?;
        }

        let now = Utc::now();
        let mut tx = self.db.pool().begin().await?;

        let encounter_id = self.resolve_draft_target(&mut tx, &request, now).await?;

        for section in request.supplied_sections() {
            sections::upsert_section(&mut tx, encounter_id, &section, request.actor, now).await?;
        }

        if let Some(diagnoses) = &request.secondary_diagnoses {
            collections::replace_secondary_diagnoses(
                &mut tx,
                encounter_id,
                diagnoses,
                request.actor,
                now,
            )
            .await?;
        }
        if let Some(medications) = &request.medications {
            // The form keeps a blank trailing row for data entry; rows
            // without a name are noise, not prescriptions.
            let named: Vec<MedicationEntry> = medications
                .iter()
                .filter(|m| !m.name.trim().is_empty())
                .cloned()
                .collect();
            collections::replace_medications(&mut tx, encounter_id, &named, request.actor, now)
                .await?;
        }
        if let Some(investigations) = &request.recommended_investigations {
            collections::replace_recommended_investigations(
                &mut tx,
                encounter_id,
                investigations,
                request.actor,
                now,
            )
            .await?;
        }
        if let Some(analyses) = &request.performed_analyses {
            collections::replace_performed_analyses(
                &mut tx,
                encounter_id,
                analyses,
                request.actor,
                now,
            )
            .await?;
        }

        tx.commit().await?;
        info!(%encounter_id, "draft saved");
        Ok(encounter_id)
    }

    /// Closes the encounter for editing and notifies scheduling.
    ///
    /// The status update and the consulted notification succeed or fail
    /// together: the notification runs inside the finalize transaction, so a
    /// failed notification rolls the status back and the caller retries the
    /// whole call. The state check runs inside the same transaction, which is
    /// what makes a finalize racing a delete fail with `InvalidState` instead
    /// of silently resurrecting a cancelled record.
    #[instrument(skip(self))]
    pub async fn finalize(
        &self,
        encounter_id: Uuid,
        duration_minutes: i32,
        actor: Uuid,
    ) -> EncounterResult<()> {
        if actor.is_nil() {
            return Err(EncounterError::Validation("actor is required".into()));
        }
        if duration_minutes < 0 {
            return Err(EncounterError::Validation(
                "duration cannot be negative".into(),
            ));
        }

        let mut tx = self.db.pool().begin().await?;

        let mut encounter = get_by_id_in(&mut tx, encounter_id)
            .await?
            .ok_or(EncounterError::EncounterNotFound(encounter_id))?;
        require_transition(&encounter, EncounterStatus::Finalized)?;

        let now = Utc::now();
        encounter.status = EncounterStatus::Finalized;
        encounter.finalized_at = Some(now);
        encounter.duration_minutes = Some(duration_minutes);
        encounter.modified_at = Some(now);
        encounter.modified_by = Some(actor);

        if !update_in(&mut tx, &encounter).await? {
            return Err(EncounterError::EncounterNotFound(encounter_id));
        }

        if let Some(appointment_id) = encounter.appointment_id {
            match self
                .scheduling
                .mark_appointment_consulted(appointment_id)
                .await
            {
                Ok(AppointmentUpdate::Consulted) => {}
                Ok(AppointmentUpdate::NotFound) => {
                    warn!(%encounter_id, %appointment_id, "finalize rolled back: appointment unknown");
                    return Err(EncounterError::AppointmentNotFound(appointment_id));
                }
                Err(err) => {
                    warn!(%encounter_id, %appointment_id, error = %err, "finalize rolled back: scheduling unreachable");
                    return Err(EncounterError::Scheduling(err.to_string()));
                }
            }
        }

        tx.commit().await?;
        info!(%encounter_id, duration_minutes, "encounter finalized");
        Ok(())
    }

    /// Soft-deletes an in-progress encounter.
    ///
    /// A finalized clinical record is never deleted by domain rule; it is
    /// superseded by corrective documentation outside this core.
    #[instrument(skip(self))]
    pub async fn delete(&self, encounter_id: Uuid, actor: Uuid) -> EncounterResult<()> {
        let mut tx = self.db.pool().begin().await?;

        let mut encounter = get_by_id_in(&mut tx, encounter_id)
            .await?
            .ok_or(EncounterError::EncounterNotFound(encounter_id))?;
        require_transition(&encounter, EncounterStatus::Cancelled)?;

        let now = Utc::now();
        encounter.status = EncounterStatus::Cancelled;
        encounter.modified_at = Some(now);
        encounter.modified_by = Some(actor);
        update_in(&mut tx, &encounter).await?;

        tx.commit().await?;
        info!(%encounter_id, "encounter cancelled");
        Ok(())
    }

    /// Replaces the ordered secondary-diagnosis list.
    ///
    /// Rejects more than ten entries before any storage write; truncating
    /// silently would lose data.
    #[instrument(skip(self, diagnoses), fields(count = diagnoses.len()))]
    pub async fn sync_secondary_diagnoses(
        &self,
        encounter_id: Uuid,
        diagnoses: Vec<SecondaryDiagnosisEntry>,
        actor: Uuid,
    ) -> EncounterResult<()> {
        validate_secondary_count(diagnoses.len())?;

        let mut tx = self.db.pool().begin().await?;
        self.require_open_in(&mut tx, encounter_id).await?;
        collections::replace_secondary_diagnoses(
            &mut tx,
            encounter_id,
            &diagnoses,
            actor,
            Utc::now(),
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Replaces the ordered medication list; an empty list clears it.
    #[instrument(skip(self, medications), fields(count = medications.len()))]
    pub async fn replace_medications(
        &self,
        encounter_id: Uuid,
        medications: Vec<MedicationEntry>,
        actor: Uuid,
    ) -> EncounterResult<()> {
        let named: Vec<MedicationEntry> = medications
            .into_iter()
            .filter(|m| !m.name.trim().is_empty())
            .collect();

        let mut tx = self.db.pool().begin().await?;
        self.require_open_in(&mut tx, encounter_id).await?;
        collections::replace_medications(&mut tx, encounter_id, &named, actor, Utc::now()).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Replaces the recommended-investigation list.
    #[instrument(skip(self, investigations), fields(count = investigations.len()))]
    pub async fn replace_recommended_investigations(
        &self,
        encounter_id: Uuid,
        investigations: Vec<RecommendedInvestigationEntry>,
        actor: Uuid,
    ) -> EncounterResult<()> {
        let mut tx = self.db.pool().begin().await?;
        self.require_open_in(&mut tx, encounter_id).await?;
        collections::replace_recommended_investigations(
            &mut tx,
            encounter_id,
            &investigations,
            actor,
            Utc::now(),
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Records imported analysis results.
    ///
    /// Unlike every other write, this is permitted on a finalized encounter:
    /// results arrive asynchronously from external labs, usually after the
    /// consultation closed. Cancelled encounters still reject it.
    #[instrument(skip(self, analyses), fields(count = analyses.len()))]
    pub async fn record_performed_analyses(
        &self,
        encounter_id: Uuid,
        analyses: Vec<PerformedAnalysisEntry>,
        actor: Uuid,
    ) -> EncounterResult<()> {
        let mut tx = self.db.pool().begin().await?;

        let encounter = get_by_id_in(&mut tx, encounter_id)
            .await?
            .ok_or(EncounterError::EncounterNotFound(encounter_id))?;
        if encounter.status == EncounterStatus::Cancelled {
            return Err(EncounterError::InvalidState {
                id: encounter_id,
                status: encounter.status,
            });
        }

        collections::replace_performed_analyses(&mut tx, encounter_id, &analyses, actor, Utc::now())
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Display enrichment for an ICD-10 code; `None` for unknown codes.
    pub async fn describe_diagnosis(&self, code: &str) -> Option<DiagnosisInfo> {
        self.reference.diagnosis_by_code(code).await
    }

    /// Display enrichment for a medication catalog code.
    pub async fn describe_medication(&self, code: &str) -> Option<MedicationInfo> {
        self.reference.medication_by_code(code).await
    }

    /// Finds or creates the draft a save targets, updating root fields on
    /// reuse. Runs inside the save transaction so a concurrent first save
    /// cannot slip a second draft in between lookup and create.
    async fn resolve_draft_target(
        &self,
        conn: &mut SqliteConnection,
        request: &DraftRequest,
        now: chrono::DateTime<Utc>,
    ) -> EncounterResult<Uuid> {
        let existing = match request.encounter_id {
            Some(id) => Some(
                get_by_id_in(conn, id)
                    .await?
                    .ok_or(EncounterError::EncounterNotFound(id))?,
            ),
            None => {
                let scope = DraftScope {
                    patient_id: request.patient_id,
                    clinician_id: Some(request.clinician_id),
                    date: Some(request.encounter_date),
                    appointment_id: request.appointment_id,
                };
                find_open_draft_in(conn, &scope).await?
            }
        };

        match existing {
            Some(mut encounter) => {
                require_open(&encounter)?;
                encounter.appointment_id = request.appointment_id.or(encounter.appointment_id);
                encounter.encounter_date = request.encounter_date;
                encounter.encounter_time = request.encounter_time;
                encounter.kind = request.kind.clone();
                encounter.modified_at = Some(now);
                encounter.modified_by = Some(request.actor);
                update_in(conn, &encounter).await?;
                Ok(encounter.id)
            }
            None => {
                create_in(
                    conn,
                    &NewEncounter {
                        appointment_id: request.appointment_id,
                        patient_id: request.patient_id,
                        clinician_id: request.clinician_id,
                        encounter_date: request.encounter_date,
                        encounter_time: request.encounter_time,
                        kind: request.kind.clone(),
                        created_by: request.actor,
                    },
                    now,
                )
                .await
            }
        }
    }

    async fn require_open_in(
        &self,
        conn: &mut SqliteConnection,
        encounter_id: Uuid,
    ) -> EncounterResult<()> {
        let encounter = get_by_id_in(conn, encounter_id)
            .await?
            .ok_or(EncounterError::EncounterNotFound(encounter_id))?;
        require_open(&encounter)
    }
}

fn require_open(encounter: &crate::model::encounter::Encounter) -> EncounterResult<()> {
    if !encounter.is_open() {
        return Err(EncounterError::InvalidState {
            id: encounter.id,
            status: encounter.status,
        });
    }
    Ok(())
}

fn require_transition(
    encounter: &crate::model::encounter::Encounter,
    next: EncounterStatus,
) -> EncounterResult<()> {
    if !encounter.status.can_transition_to(next) {
        return Err(EncounterError::InvalidState {
            id: encounter.id,
            status: encounter.status,
        });
    }
    Ok(())
}

fn validate_identifiers(request: &DraftRequest) -> EncounterResult<()> {
    if request.patient_id.is_nil() {
        return Err(EncounterError::Validation("patient id is required".into()));
    }
    if request.clinician_id.is_nil() {
        return Err(EncounterError::Validation(
            "clinician id is required".into(),
        ));
    }
    if request.actor.is_nil() {
        return Err(EncounterError::Validation("actor is required".into()));
    }
    Ok(())
}

fn validate_secondary_count(count: usize) -> EncounterResult<()> {
    if count > MAX_SECONDARY_DIAGNOSES {
        return Err(EncounterError::Validation(format!(
            "at most {MAX_SECONDARY_DIAGNOSES} secondary diagnoses are allowed, got {count}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::InMemoryCatalog;
    use crate::scheduling::{DetachedScheduling, InMemoryScheduling};
    use chrono::Local;

    struct Fixture {
        lifecycle: EncounterLifecycle,
        scheduling: Arc<InMemoryScheduling>,
        patient_id: Uuid,
        clinician_id: Uuid,
    }

    async fn fixture() -> Fixture {
        let db = Database::in_memory().await.expect("database should open");
        let scheduling = Arc::new(InMemoryScheduling::new());
        let lifecycle = EncounterLifecycle::new(
            db,
            scheduling.clone(),
            Arc::new(InMemoryCatalog::new()),
        );
        Fixture {
            lifecycle,
            scheduling,
            patient_id: Uuid::new_v4(),
            clinician_id: Uuid::new_v4(),
        }
    }

    fn base_request(fx: &Fixture) -> DraftRequest {
        DraftRequest::new(
            fx.patient_id,
            fx.clinician_id,
            Local::now().date_naive(),
            NaiveTime::from_hms_opt(9, 15, 0).unwrap(),
            "first visit",
            fx.clinician_id,
        )
    }

    fn diagnosis_entries(count: usize) -> Vec<SecondaryDiagnosisEntry> {
        (0..count)
            .map(|i| SecondaryDiagnosisEntry {
                icd10_code: format!("E{i:02}"),
                name: format!("diagnosis {i}"),
                elaboration: None,
            })
            .collect()
    }

    #[tokio::test]
    async fn two_idless_saves_converge_on_one_encounter() {
        let fx = fixture().await;

        let first = fx.lifecycle.save_draft(base_request(&fx)).await.unwrap();
        let second = fx.lifecycle.save_draft(base_request(&fx)).await.unwrap();
        assert_eq!(first, second, "autosave dedup must reuse the open draft");

        let drafts = fx
            .lifecycle
            .repository()
            .list_by_patient(fx.patient_id)
            .await
            .unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].status, EncounterStatus::InProgress);
    }

    #[tokio::test]
    async fn autosave_scenario_builds_one_document_and_finalizes_it() {
        let fx = fixture().await;
        let appointment_id = Uuid::new_v4();
        fx.scheduling.add_appointment(appointment_id);

        // First autosave: complaint only.
        let mut request = base_request(&fx);
        request.appointment_id = Some(appointment_id);
        request.presenting_complaint = Some(PresentingComplaint {
            complaint: Some("chest pain".into()),
            history_of_present_illness: None,
        });
        let e1 = fx.lifecycle.save_draft(request).await.unwrap();

        // Second autosave, still without an explicit id: treatment only.
        let mut request = base_request(&fx);
        request.appointment_id = Some(appointment_id);
        request.treatment = Some(Treatment {
            medicamentous: Some("aspirin 100mg".into()),
            ..Default::default()
        });
        let again = fx.lifecycle.save_draft(request).await.unwrap();
        assert_eq!(e1, again);

        let aggregate = fx.lifecycle.repository().fetch_aggregate(e1).await.unwrap();
        assert_eq!(
            aggregate
                .sections
                .presenting_complaint
                .and_then(|s| s.complaint),
            Some("chest pain".into())
        );
        assert_eq!(
            aggregate.sections.treatment.and_then(|s| s.medicamentous),
            Some("aspirin 100mg".into())
        );

        fx.lifecycle.finalize(e1, 20, fx.clinician_id).await.unwrap();

        let closed = fx
            .lifecycle
            .repository()
            .get_by_id(e1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(closed.status, EncounterStatus::Finalized);
        assert_eq!(closed.duration_minutes, Some(20));
        assert!(closed.finalized_at.is_some());
        assert!(fx.scheduling.is_consulted(appointment_id));
    }

    #[tokio::test]
    async fn sparse_saves_leave_untouched_parts_alone() {
        let fx = fixture().await;

        let mut request = base_request(&fx);
        request.medications = Some(vec![MedicationEntry {
            name: "Metformin".into(),
            dose: Some("500mg".into()),
            ..Default::default()
        }]);
        let id = fx.lifecycle.save_draft(request).await.unwrap();

        // A later save touching only a section must not disturb medications.
        let mut request = base_request(&fx);
        request.conclusion = Some(Conclusion {
            prognosis: Some("favourable".into()),
            ..Default::default()
        });
        fx.lifecycle.save_draft(request).await.unwrap();

        let aggregate = fx.lifecycle.repository().fetch_aggregate(id).await.unwrap();
        assert_eq!(aggregate.medications.len(), 1);
        assert_eq!(aggregate.medications[0].name, "Metformin");
        assert!(aggregate.sections.conclusion.is_some());
    }

    #[tokio::test]
    async fn eleven_secondary_diagnoses_are_rejected_and_storage_unchanged() {
        let fx = fixture().await;
        let id = fx.lifecycle.save_draft(base_request(&fx)).await.unwrap();

        fx.lifecycle
            .sync_secondary_diagnoses(id, diagnosis_entries(3), fx.clinician_id)
            .await
            .unwrap();

        let rejected = fx
            .lifecycle
            .sync_secondary_diagnoses(id, diagnosis_entries(11), fx.clinician_id)
            .await;
        assert!(matches!(rejected, Err(EncounterError::Validation(_))));

        let stored = fx
            .lifecycle
            .repository()
            .sections()
            .get_secondary_diagnoses(id)
            .await
            .unwrap();
        assert_eq!(stored.len(), 3, "failed sync must not alter stored state");
        assert_eq!(stored[0].display_order, 1);
        assert_eq!(stored[2].display_order, 3);
    }

    #[tokio::test]
    async fn oversized_list_is_rejected_before_the_draft_is_written() {
        let fx = fixture().await;

        let mut request = base_request(&fx);
        request.secondary_diagnoses = Some(diagnosis_entries(11));
        let rejected = fx.lifecycle.save_draft(request).await;
        assert!(matches!(rejected, Err(EncounterError::Validation(_))));

        let drafts = fx
            .lifecycle
            .repository()
            .list_by_patient(fx.patient_id)
            .await
            .unwrap();
        assert!(drafts.is_empty(), "validation must precede every write");
    }

    #[tokio::test]
    async fn ten_secondary_diagnoses_round_trip_in_order() {
        let fx = fixture().await;
        let id = fx.lifecycle.save_draft(base_request(&fx)).await.unwrap();

        let entries = diagnosis_entries(10);
        fx.lifecycle
            .sync_secondary_diagnoses(id, entries.clone(), fx.clinician_id)
            .await
            .unwrap();

        let stored = fx
            .lifecycle
            .repository()
            .sections()
            .get_secondary_diagnoses(id)
            .await
            .unwrap();
        assert_eq!(stored.len(), 10);
        for (index, row) in stored.iter().enumerate() {
            assert_eq!(row.display_order, index as i32 + 1);
            assert_eq!(row.icd10_code, entries[index].icd10_code);
        }
    }

    #[tokio::test]
    async fn empty_medication_list_clears_previous_prescriptions() {
        let fx = fixture().await;
        let id = fx.lifecycle.save_draft(base_request(&fx)).await.unwrap();

        fx.lifecycle
            .replace_medications(
                id,
                vec![MedicationEntry {
                    name: "Aspirin".into(),
                    ..Default::default()
                }],
                fx.clinician_id,
            )
            .await
            .unwrap();

        fx.lifecycle
            .replace_medications(id, Vec::new(), fx.clinician_id)
            .await
            .unwrap();

        let stored = fx
            .lifecycle
            .repository()
            .sections()
            .get_medications(id)
            .await
            .unwrap();
        assert!(stored.is_empty());
    }

    #[tokio::test]
    async fn blank_medication_rows_are_dropped() {
        let fx = fixture().await;
        let id = fx.lifecycle.save_draft(base_request(&fx)).await.unwrap();

        fx.lifecycle
            .replace_medications(
                id,
                vec![
                    MedicationEntry {
                        name: "Aspirin".into(),
                        ..Default::default()
                    },
                    MedicationEntry {
                        name: "   ".into(),
                        dose: Some("orphan dose".into()),
                        ..Default::default()
                    },
                ],
                fx.clinician_id,
            )
            .await
            .unwrap();

        let stored = fx
            .lifecycle
            .repository()
            .sections()
            .get_medications(id)
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].name, "Aspirin");
    }

    #[tokio::test]
    async fn finalize_is_not_repeatable() {
        let fx = fixture().await;
        let id = fx.lifecycle.save_draft(base_request(&fx)).await.unwrap();

        fx.lifecycle.finalize(id, 25, fx.clinician_id).await.unwrap();
        let first = fx
            .lifecycle
            .repository()
            .get_by_id(id)
            .await
            .unwrap()
            .unwrap();

        let second = fx.lifecycle.finalize(id, 99, fx.clinician_id).await;
        assert!(matches!(
            second,
            Err(EncounterError::InvalidState {
                status: EncounterStatus::Finalized,
                ..
            })
        ));

        let after = fx
            .lifecycle
            .repository()
            .get_by_id(id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.duration_minutes, Some(25));
        assert_eq!(after.finalized_at, first.finalized_at);
    }

    #[tokio::test]
    async fn failed_scheduling_notification_rolls_the_finalize_back() {
        let fx = fixture().await;
        let appointment_id = Uuid::new_v4();
        fx.scheduling.add_appointment(appointment_id);

        let mut request = base_request(&fx);
        request.appointment_id = Some(appointment_id);
        let id = fx.lifecycle.save_draft(request).await.unwrap();

        fx.scheduling.fail_next("connection reset");
        let failed = fx.lifecycle.finalize(id, 30, fx.clinician_id).await;
        assert!(matches!(failed, Err(EncounterError::Scheduling(_))));

        let encounter = fx
            .lifecycle
            .repository()
            .get_by_id(id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(encounter.status, EncounterStatus::InProgress);
        assert!(encounter.finalized_at.is_none());
        assert!(!fx.scheduling.is_consulted(appointment_id));

        // The whole call retries cleanly once the collaborator recovers.
        fx.lifecycle.finalize(id, 30, fx.clinician_id).await.unwrap();
        assert!(fx.scheduling.is_consulted(appointment_id));
    }

    #[tokio::test]
    async fn unknown_appointment_rolls_the_finalize_back() {
        let fx = fixture().await;

        let mut request = base_request(&fx);
        request.appointment_id = Some(Uuid::new_v4());
        let id = fx.lifecycle.save_draft(request).await.unwrap();

        let failed = fx.lifecycle.finalize(id, 30, fx.clinician_id).await;
        assert!(matches!(
            failed,
            Err(EncounterError::AppointmentNotFound(_))
        ));

        let encounter = fx
            .lifecycle
            .repository()
            .get_by_id(id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(encounter.status, EncounterStatus::InProgress);
    }

    #[tokio::test]
    async fn walk_in_finalize_skips_scheduling_entirely() {
        let db = Database::in_memory().await.unwrap();
        let lifecycle = EncounterLifecycle::new(
            db,
            Arc::new(DetachedScheduling),
            Arc::new(InMemoryCatalog::new()),
        );
        let clinician_id = Uuid::new_v4();

        let request = DraftRequest::new(
            Uuid::new_v4(),
            clinician_id,
            Local::now().date_naive(),
            NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
            "urgent",
            clinician_id,
        );
        let id = lifecycle.save_draft(request).await.unwrap();
        lifecycle.finalize(id, 15, clinician_id).await.unwrap();

        let encounter = lifecycle.repository().get_by_id(id).await.unwrap().unwrap();
        assert_eq!(encounter.status, EncounterStatus::Finalized);
        assert!(encounter.appointment_id.is_none());
    }

    #[tokio::test]
    async fn closed_encounters_reject_further_draft_saves() {
        let fx = fixture().await;
        let id = fx.lifecycle.save_draft(base_request(&fx)).await.unwrap();
        fx.lifecycle.finalize(id, 10, fx.clinician_id).await.unwrap();

        let mut request = base_request(&fx);
        request.encounter_id = Some(id);
        let rejected = fx.lifecycle.save_draft(request).await;
        assert!(matches!(
            rejected,
            Err(EncounterError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn delete_is_draft_only() {
        let fx = fixture().await;
        let id = fx.lifecycle.save_draft(base_request(&fx)).await.unwrap();
        fx.lifecycle.finalize(id, 10, fx.clinician_id).await.unwrap();

        let rejected = fx.lifecycle.delete(id, fx.clinician_id).await;
        assert!(matches!(
            rejected,
            Err(EncounterError::InvalidState { .. })
        ));

        let draft = fx.lifecycle.save_draft(base_request(&fx)).await.unwrap();
        assert_ne!(draft, id, "finalized encounter is no longer an open draft");
        fx.lifecycle.delete(draft, fx.clinician_id).await.unwrap();

        let encounter = fx
            .lifecycle
            .repository()
            .get_by_id(draft)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(encounter.status, EncounterStatus::Cancelled);
    }

    #[tokio::test]
    async fn analyses_may_arrive_after_finalize_but_not_after_cancel() {
        let fx = fixture().await;
        let id = fx.lifecycle.save_draft(base_request(&fx)).await.unwrap();
        fx.lifecycle.finalize(id, 10, fx.clinician_id).await.unwrap();

        fx.lifecycle
            .record_performed_analyses(
                id,
                vec![PerformedAnalysisEntry {
                    name: "Complete blood count".into(),
                    ..Default::default()
                }],
                fx.clinician_id,
            )
            .await
            .unwrap();

        let stored = fx
            .lifecycle
            .repository()
            .sections()
            .get_performed_analyses(id)
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);

        let cancelled = fx.lifecycle.save_draft(base_request(&fx)).await.unwrap();
        fx.lifecycle.delete(cancelled, fx.clinician_id).await.unwrap();
        let rejected = fx
            .lifecycle
            .record_performed_analyses(
                cancelled,
                vec![PerformedAnalysisEntry {
                    name: "Glucose".into(),
                    ..Default::default()
                }],
                fx.clinician_id,
            )
            .await;
        assert!(matches!(
            rejected,
            Err(EncounterError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn unknown_diagnosis_codes_store_as_free_text() {
        let fx = fixture().await;

        let mut request = base_request(&fx);
        request.principal_diagnosis = Some(PrincipalDiagnosis {
            icd10_code: Some("made-up-code".into()),
            name: Some("clinician's own wording".into()),
            elaboration: None,
        });
        let id = fx.lifecycle.save_draft(request).await.unwrap();

        // The catalog knows nothing about the code, and the save went
        // through regardless.
        assert!(fx.lifecycle.describe_diagnosis("made-up-code").await.is_none());

        let aggregate = fx.lifecycle.repository().fetch_aggregate(id).await.unwrap();
        assert_eq!(
            aggregate
                .sections
                .principal_diagnosis
                .and_then(|d| d.icd10_code),
            Some("made-up-code".into())
        );
    }

    #[tokio::test]
    async fn nil_identifiers_are_rejected_up_front() {
        let fx = fixture().await;

        let mut request = base_request(&fx);
        request.patient_id = Uuid::nil();
        assert!(matches!(
            fx.lifecycle.save_draft(request).await,
            Err(EncounterError::Validation(_))
        ));

        assert!(matches!(
            fx.lifecycle.finalize(Uuid::new_v4(), -5, fx.clinician_id).await,
            Err(EncounterError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn saving_against_a_missing_id_reports_not_found() {
        let fx = fixture().await;
        let mut request = base_request(&fx);
        request.encounter_id = Some(Uuid::new_v4());
        assert!(matches!(
            fx.lifecycle.save_draft(request).await,
            Err(EncounterError::EncounterNotFound(_))
        ));
    }
}
