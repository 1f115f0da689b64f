//! Encounter root persistence.
//!
//! Root lookups do not load sections or collections: list views
//! only need the narrow root record, and the aggregate read composes the
//! section store on demand. The open-draft lookup exists purely to prevent a
//! fast-autosaving editing surface from spawning duplicate in-progress
//! encounters for the same visit before its first save round-trips.

use crate::error::{EncounterError, EncounterResult};
use crate::model::encounter::{Encounter, EncounterAggregate};
use crate::store::{uuid_column, uuid_column_opt, Database, SectionStore};
use chrono::{DateTime, Local, NaiveDate, NaiveTime, Utc};
use encounter_types::EncounterStatus;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use tracing::{debug, info};
use uuid::Uuid;

/// Fields required to open a new encounter root record.
///
/// Status is not a field: every encounter starts `InProgress`.
#[derive(Debug, Clone)]
pub struct NewEncounter {
    /// `None` for walk-in visits.
    pub appointment_id: Option<Uuid>,
    pub patient_id: Uuid,
    pub clinician_id: Uuid,
    pub encounter_date: NaiveDate,
    pub encounter_time: NaiveTime,
    pub kind: String,
    pub created_by: Uuid,
}

/// Scoping for the open-draft dedup lookup.
///
/// When `appointment_id` is present it scopes the match on its own: one
/// appointment maps to at most one open encounter regardless of how the form
/// was reached. Otherwise the match is patient + date (+ clinician when
/// given); `date` defaults to today.
#[derive(Debug, Clone)]
pub struct DraftScope {
    pub patient_id: Uuid,
    pub clinician_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    pub appointment_id: Option<Uuid>,
}

/// Root-record persistence plus the whole-aggregate read.
#[derive(Clone, Debug)]
pub struct EncounterRepository {
    db: Database,
    sections: SectionStore,
}

impl EncounterRepository {
    pub fn new(db: Database) -> Self {
        let sections = SectionStore::new(db.clone());
        Self { db, sections }
    }

    pub fn sections(&self) -> &SectionStore {
        &self.sections
    }

    /// Inserts a new root record with status `InProgress`; returns its id.
    pub async fn create(&self, new: NewEncounter) -> EncounterResult<Uuid> {
        let mut conn = self.db.pool().acquire().await?;
        let id = create_in(&mut conn, &new, Utc::now()).await?;
        info!(encounter_id = %id, patient_id = %new.patient_id, "encounter created");
        Ok(id)
    }

    pub async fn get_by_id(&self, id: Uuid) -> EncounterResult<Option<Encounter>> {
        let row = sqlx::query(&select_encounters("WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(self.db.pool())
            .await?;
        row.as_ref().map(encounter_from_row).transpose()
    }

    /// Encounters of one patient, newest visit first. Soft-deleted rows are
    /// excluded; this is the read path that makes cancelled records
    /// unreachable.
    pub async fn list_by_patient(&self, patient_id: Uuid) -> EncounterResult<Vec<Encounter>> {
        let rows = sqlx::query(&select_encounters(
            "WHERE patient_id = ? AND status != 'cancelled'
             ORDER BY encounter_date DESC, encounter_time DESC",
        ))
        .bind(patient_id.to_string())
        .fetch_all(self.db.pool())
        .await?;
        rows.iter().map(encounter_from_row).collect()
    }

    /// Encounters conducted by one clinician, newest visit first.
    pub async fn list_by_clinician(&self, clinician_id: Uuid) -> EncounterResult<Vec<Encounter>> {
        let rows = sqlx::query(&select_encounters(
            "WHERE clinician_id = ? AND status != 'cancelled'
             ORDER BY encounter_date DESC, encounter_time DESC",
        ))
        .bind(clinician_id.to_string())
        .fetch_all(self.db.pool())
        .await?;
        rows.iter().map(encounter_from_row).collect()
    }

    /// The encounter attached to one appointment, if any.
    pub async fn get_by_appointment(
        &self,
        appointment_id: Uuid,
    ) -> EncounterResult<Option<Encounter>> {
        let row = sqlx::query(&select_encounters(
            "WHERE appointment_id = ? AND status != 'cancelled'
             ORDER BY created_at DESC LIMIT 1",
        ))
        .bind(appointment_id.to_string())
        .fetch_optional(self.db.pool())
        .await?;
        row.as_ref().map(encounter_from_row).transpose()
    }

    /// Full-field update of the root record.
    ///
    /// Returns `false` when the id does not exist; callers must check.
    pub async fn update(&self, encounter: &Encounter) -> EncounterResult<bool> {
        let mut conn = self.db.pool().acquire().await?;
        update_in(&mut conn, encounter).await
    }

    /// Marks an in-progress encounter as cancelled without purging children,
    /// preserving the record for retention. Returns `false` when the id does
    /// not exist or the encounter is no longer in progress.
    pub async fn soft_delete(&self, id: Uuid, actor: Uuid) -> EncounterResult<bool> {
        let result = sqlx::query(
            "UPDATE encounters
             SET status = 'cancelled', modified_at = ?, modified_by = ?
             WHERE id = ? AND status = 'in_progress'",
        )
        .bind(Utc::now())
        .bind(actor.to_string())
        .bind(id.to_string())
        .execute(self.db.pool())
        .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(encounter_id = %id, "encounter soft-deleted");
        }
        Ok(deleted)
    }

    /// Finds an existing in-progress encounter for the given scoping.
    pub async fn find_open_draft(&self, scope: &DraftScope) -> EncounterResult<Option<Encounter>> {
        let mut conn = self.db.pool().acquire().await?;
        find_open_draft_in(&mut conn, scope).await
    }

    /// Reads the whole consultation document: root, sections, collections.
    pub async fn fetch_aggregate(&self, id: Uuid) -> EncounterResult<EncounterAggregate> {
        let encounter = self
            .get_by_id(id)
            .await?
            .ok_or(EncounterError::EncounterNotFound(id))?;

        let sections = self.sections.get_sections(id).await?;
        let secondary_diagnoses = self.sections.get_secondary_diagnoses(id).await?;
        let medications = self.sections.get_medications(id).await?;
        let recommended_investigations = self.sections.get_recommended_investigations(id).await?;
        let performed_analyses = self.sections.get_performed_analyses(id).await?;

        Ok(EncounterAggregate {
            encounter,
            sections,
            secondary_diagnoses,
            medications,
            recommended_investigations,
            performed_analyses,
        })
    }
}

// ============================================================================
// TRANSACTION-SCOPED PRIMITIVES
// ============================================================================

pub(crate) async fn create_in(
    conn: &mut SqliteConnection,
    new: &NewEncounter,
    now: DateTime<Utc>,
) -> EncounterResult<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO encounters
             (id, appointment_id, patient_id, clinician_id, encounter_date,
              encounter_time, kind, status, created_at, created_by)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(new.appointment_id.map(|a| a.to_string()))
    .bind(new.patient_id.to_string())
    .bind(new.clinician_id.to_string())
    .bind(new.encounter_date)
    .bind(new.encounter_time)
    .bind(&new.kind)
    .bind(EncounterStatus::InProgress.as_str())
    .bind(now)
    .bind(new.created_by.to_string())
    .execute(&mut *conn)
    .await?;
    Ok(id)
}

pub(crate) async fn get_by_id_in(
    conn: &mut SqliteConnection,
    id: Uuid,
) -> EncounterResult<Option<Encounter>> {
    let row = sqlx::query(&select_encounters("WHERE id = ?"))
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(encounter_from_row).transpose()
}

pub(crate) async fn update_in(
    conn: &mut SqliteConnection,
    encounter: &Encounter,
) -> EncounterResult<bool> {
    let result = sqlx::query(
        "UPDATE encounters SET
             appointment_id = ?, patient_id = ?, clinician_id = ?,
             encounter_date = ?, encounter_time = ?, kind = ?, status = ?,
             finalized_at = ?, duration_minutes = ?, modified_at = ?, modified_by = ?
         WHERE id = ?",
    )
    .bind(encounter.appointment_id.map(|a| a.to_string()))
    .bind(encounter.patient_id.to_string())
    .bind(encounter.clinician_id.to_string())
    .bind(encounter.encounter_date)
    .bind(encounter.encounter_time)
    .bind(&encounter.kind)
    .bind(encounter.status.as_str())
    .bind(encounter.finalized_at)
    .bind(encounter.duration_minutes)
    .bind(encounter.modified_at)
    .bind(encounter.modified_by.map(|m| m.to_string()))
    .bind(encounter.id.to_string())
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn find_open_draft_in(
    conn: &mut SqliteConnection,
    scope: &DraftScope,
) -> EncounterResult<Option<Encounter>> {
    // An appointment pins the visit on its own; the original lookup ignores
    // the patient filter entirely when an appointment id is supplied.
    let row = if let Some(appointment_id) = scope.appointment_id {
        sqlx::query(&select_encounters(
            "WHERE appointment_id = ? AND status = 'in_progress'
             ORDER BY created_at DESC LIMIT 1",
        ))
        .bind(appointment_id.to_string())
        .fetch_optional(&mut *conn)
        .await?
    } else {
        let date = scope.date.unwrap_or_else(|| Local::now().date_naive());
        sqlx::query(&select_encounters(
            "WHERE patient_id = ? AND encounter_date = ? AND status = 'in_progress'
               AND (? IS NULL OR clinician_id = ?)
             ORDER BY created_at DESC LIMIT 1",
        ))
        .bind(scope.patient_id.to_string())
        .bind(date)
        .bind(scope.clinician_id.map(|c| c.to_string()))
        .bind(scope.clinician_id.map(|c| c.to_string()))
        .fetch_optional(&mut *conn)
        .await?
    };

    let draft = row.as_ref().map(encounter_from_row).transpose()?;
    if let Some(found) = &draft {
        debug!(encounter_id = %found.id, "open draft matched");
    }
    Ok(draft)
}

// ============================================================================
// ROW DECODING
// ============================================================================

fn select_encounters(tail: &str) -> String {
    format!(
        "SELECT id, appointment_id, patient_id, clinician_id, encounter_date,
                encounter_time, kind, status, finalized_at, duration_minutes,
                created_at, created_by, modified_at, modified_by
         FROM encounters {tail}"
    )
}

fn encounter_from_row(row: &SqliteRow) -> EncounterResult<Encounter> {
    let status_raw: String = row.try_get("status")?;
    Ok(Encounter {
        id: uuid_column(row, "id")?,
        appointment_id: uuid_column_opt(row, "appointment_id")?,
        patient_id: uuid_column(row, "patient_id")?,
        clinician_id: uuid_column(row, "clinician_id")?,
        encounter_date: row.try_get("encounter_date")?,
        encounter_time: row.try_get("encounter_time")?,
        kind: row.try_get("kind")?,
        status: EncounterStatus::parse(&status_raw)?,
        finalized_at: row.try_get("finalized_at")?,
        duration_minutes: row.try_get("duration_minutes")?,
        created_at: row.try_get("created_at")?,
        created_by: uuid_column(row, "created_by")?,
        modified_at: row.try_get("modified_at")?,
        modified_by: uuid_column_opt(row, "modified_by")?,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
pub(crate) mod tests_support {
    use super::*;

    /// Inserts a minimal in-progress encounter and returns its id.
    pub(crate) async fn insert_draft(db: &Database) -> Uuid {
        insert_draft_for(db, Uuid::new_v4(), Uuid::new_v4(), None).await
    }

    pub(crate) async fn insert_draft_for(
        db: &Database,
        patient_id: Uuid,
        clinician_id: Uuid,
        appointment_id: Option<Uuid>,
    ) -> Uuid {
        EncounterRepository::new(db.clone())
            .create(NewEncounter {
                appointment_id,
                patient_id,
                clinician_id,
                encounter_date: Local::now().date_naive(),
                encounter_time: NaiveTime::from_hms_opt(10, 30, 0).unwrap(),
                kind: "first visit".into(),
                created_by: clinician_id,
            })
            .await
            .expect("draft insert should succeed")
    }
}

#[cfg(test)]
mod tests {
    use super::tests_support::{insert_draft, insert_draft_for};
    use super::*;

    #[tokio::test]
    async fn created_encounter_starts_in_progress() {
        let db = Database::in_memory().await.unwrap();
        let repo = EncounterRepository::new(db.clone());
        let id = insert_draft(&db).await;

        let encounter = repo.get_by_id(id).await.unwrap().expect("row exists");
        assert_eq!(encounter.status, EncounterStatus::InProgress);
        assert!(encounter.finalized_at.is_none());
        assert!(encounter.duration_minutes.is_none());
        assert!(encounter.is_open());
    }

    #[tokio::test]
    async fn get_by_id_misses_cleanly() {
        let db = Database::in_memory().await.unwrap();
        let repo = EncounterRepository::new(db.clone());
        assert!(repo.get_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_returns_false_for_unknown_id() {
        let db = Database::in_memory().await.unwrap();
        let repo = EncounterRepository::new(db.clone());
        let id = insert_draft(&db).await;

        let mut encounter = repo.get_by_id(id).await.unwrap().unwrap();
        encounter.id = Uuid::new_v4();
        assert!(!repo.update(&encounter).await.unwrap());
    }

    #[tokio::test]
    async fn soft_delete_hides_the_row_from_list_reads() {
        let db = Database::in_memory().await.unwrap();
        let repo = EncounterRepository::new(db.clone());
        let patient_id = Uuid::new_v4();
        let clinician_id = Uuid::new_v4();
        let id = insert_draft_for(&db, patient_id, clinician_id, None).await;

        assert!(repo.soft_delete(id, clinician_id).await.unwrap());
        assert!(repo.list_by_patient(patient_id).await.unwrap().is_empty());
        assert!(repo
            .list_by_clinician(clinician_id)
            .await
            .unwrap()
            .is_empty());

        // The row itself survives for retention, carrying the terminal state.
        let encounter = repo.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(encounter.status, EncounterStatus::Cancelled);

        // Terminal: a second delete finds nothing in progress.
        assert!(!repo.soft_delete(id, clinician_id).await.unwrap());
    }

    #[tokio::test]
    async fn find_open_draft_scopes_by_appointment_first() {
        let db = Database::in_memory().await.unwrap();
        let repo = EncounterRepository::new(db.clone());
        let appointment_id = Uuid::new_v4();
        let id = insert_draft_for(&db, Uuid::new_v4(), Uuid::new_v4(), Some(appointment_id)).await;

        // A different patient id in the scope does not matter once the
        // appointment pins the visit.
        let found = repo
            .find_open_draft(&DraftScope {
                patient_id: Uuid::new_v4(),
                clinician_id: None,
                date: None,
                appointment_id: Some(appointment_id),
            })
            .await
            .unwrap();
        assert_eq!(found.map(|e| e.id), Some(id));
    }

    #[tokio::test]
    async fn find_open_draft_matches_patient_and_today_by_default() {
        let db = Database::in_memory().await.unwrap();
        let repo = EncounterRepository::new(db.clone());
        let patient_id = Uuid::new_v4();
        let clinician_id = Uuid::new_v4();
        let id = insert_draft_for(&db, patient_id, clinician_id, None).await;

        let scope = DraftScope {
            patient_id,
            clinician_id: Some(clinician_id),
            date: None,
            appointment_id: None,
        };
        let found = repo.find_open_draft(&scope).await.unwrap();
        assert_eq!(found.map(|e| e.id), Some(id));

        // A different clinician narrows the match away.
        let other = repo
            .find_open_draft(&DraftScope {
                clinician_id: Some(Uuid::new_v4()),
                ..scope.clone()
            })
            .await
            .unwrap();
        assert!(other.is_none());
    }

    #[tokio::test]
    async fn find_open_draft_ignores_closed_encounters() {
        let db = Database::in_memory().await.unwrap();
        let repo = EncounterRepository::new(db.clone());
        let patient_id = Uuid::new_v4();
        let clinician_id = Uuid::new_v4();
        let id = insert_draft_for(&db, patient_id, clinician_id, None).await;
        repo.soft_delete(id, clinician_id).await.unwrap();

        let found = repo
            .find_open_draft(&DraftScope {
                patient_id,
                clinician_id: None,
                date: None,
                appointment_id: None,
            })
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn aggregate_read_requires_an_existing_root() {
        let db = Database::in_memory().await.unwrap();
        let repo = EncounterRepository::new(db.clone());
        let missing = repo.fetch_aggregate(Uuid::new_v4()).await;
        assert!(matches!(
            missing,
            Err(EncounterError::EncounterNotFound(_))
        ));
    }
}
