//! Replace-all synchronization for the ordered child collections.
//!
//! Every write here is a full replace: existing rows for the encounter are
//! deleted and the submitted list is inserted fresh, display order assigned
//! 1..N by list position. Callers always submit the complete current list
//! from the editing surface, so diffing against persisted identifiers would
//! buy nothing and cost a client-side identifier-reconciliation protocol the
//! surface does not implement. The delete and the inserts run inside the
//! caller's transaction and commit or roll back as one unit.

use crate::error::EncounterResult;
use crate::model::collections::{
    AnalysisParameter, Medication, MedicationEntry, PerformedAnalysis, PerformedAnalysisEntry,
    RecommendedInvestigation, RecommendedInvestigationEntry, SecondaryDiagnosis,
    SecondaryDiagnosisEntry,
};
use crate::store::sections::ensure_encounter_exists;
use crate::store::{uuid_column, Database, SectionStore};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection};
use tracing::debug;
use uuid::Uuid;

// ============================================================================
// WRITE PRIMITIVES (transaction-scoped)
// ============================================================================

pub(crate) async fn replace_secondary_diagnoses(
    conn: &mut SqliteConnection,
    encounter_id: Uuid,
    entries: &[SecondaryDiagnosisEntry],
    actor: Uuid,
    now: DateTime<Utc>,
) -> EncounterResult<()> {
    ensure_encounter_exists(conn, encounter_id).await?;

    sqlx::query("DELETE FROM secondary_diagnoses WHERE encounter_id = ?")
        .bind(encounter_id.to_string())
        .execute(&mut *conn)
        .await?;

    for (index, entry) in entries.iter().enumerate() {
        sqlx::query(
            "INSERT INTO secondary_diagnoses
                 (id, encounter_id, display_order, icd10_code, name, elaboration,
                  created_at, created_by)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(encounter_id.to_string())
        .bind(index as i32 + 1)
        .bind(&entry.icd10_code)
        .bind(&entry.name)
        .bind(&entry.elaboration)
        .bind(now)
        .bind(actor.to_string())
        .execute(&mut *conn)
        .await?;
    }

    debug!(%encounter_id, count = entries.len(), "secondary diagnoses replaced");
    Ok(())
}

pub(crate) async fn replace_medications(
    conn: &mut SqliteConnection,
    encounter_id: Uuid,
    entries: &[MedicationEntry],
    actor: Uuid,
    now: DateTime<Utc>,
) -> EncounterResult<()> {
    ensure_encounter_exists(conn, encounter_id).await?;

    sqlx::query("DELETE FROM medications WHERE encounter_id = ?")
        .bind(encounter_id.to_string())
        .execute(&mut *conn)
        .await?;

    for (index, entry) in entries.iter().enumerate() {
        sqlx::query(
            "INSERT INTO medications
                 (id, encounter_id, display_order, name, dose, frequency, duration,
                  quantity, notes, created_at, created_by)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(encounter_id.to_string())
        .bind(index as i32 + 1)
        .bind(&entry.name)
        .bind(&entry.dose)
        .bind(&entry.frequency)
        .bind(&entry.duration)
        .bind(&entry.quantity)
        .bind(&entry.notes)
        .bind(now)
        .bind(actor.to_string())
        .execute(&mut *conn)
        .await?;
    }

    debug!(%encounter_id, count = entries.len(), "medications replaced");
    Ok(())
}

pub(crate) async fn replace_recommended_investigations(
    conn: &mut SqliteConnection,
    encounter_id: Uuid,
    entries: &[RecommendedInvestigationEntry],
    actor: Uuid,
    now: DateTime<Utc>,
) -> EncounterResult<()> {
    ensure_encounter_exists(conn, encounter_id).await?;

    sqlx::query("DELETE FROM recommended_investigations WHERE encounter_id = ?")
        .bind(encounter_id.to_string())
        .execute(&mut *conn)
        .await?;

    for (index, entry) in entries.iter().enumerate() {
        sqlx::query(
            "INSERT INTO recommended_investigations
                 (id, encounter_id, display_order, code, name, urgent, indication,
                  target_date, created_at, created_by)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(encounter_id.to_string())
        .bind(index as i32 + 1)
        .bind(&entry.code)
        .bind(&entry.name)
        .bind(entry.urgent)
        .bind(&entry.indication)
        .bind(entry.target_date)
        .bind(now)
        .bind(actor.to_string())
        .execute(&mut *conn)
        .await?;
    }

    debug!(%encounter_id, count = entries.len(), "recommended investigations replaced");
    Ok(())
}

pub(crate) async fn replace_performed_analyses(
    conn: &mut SqliteConnection,
    encounter_id: Uuid,
    entries: &[PerformedAnalysisEntry],
    actor: Uuid,
    now: DateTime<Utc>,
) -> EncounterResult<()> {
    ensure_encounter_exists(conn, encounter_id).await?;

    // Parameter rows cascade from their analysis rows.
    sqlx::query("DELETE FROM performed_analyses WHERE encounter_id = ?")
        .bind(encounter_id.to_string())
        .execute(&mut *conn)
        .await?;

    for (index, entry) in entries.iter().enumerate() {
        let analysis_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO performed_analyses
                 (id, encounter_id, display_order, code, name, performed_at,
                  result_summary, created_at, created_by)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(analysis_id.to_string())
        .bind(encounter_id.to_string())
        .bind(index as i32 + 1)
        .bind(&entry.code)
        .bind(&entry.name)
        .bind(entry.performed_at)
        .bind(&entry.result_summary)
        .bind(now)
        .bind(actor.to_string())
        .execute(&mut *conn)
        .await?;

        for (ordinal, parameter) in entry.parameters.iter().enumerate() {
            sqlx::query(
                "INSERT INTO analysis_parameters
                     (analysis_id, ordinal, name, value, unit, reference_range, abnormal)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(analysis_id.to_string())
            .bind(ordinal as i32 + 1)
            .bind(&parameter.name)
            .bind(&parameter.value)
            .bind(&parameter.unit)
            .bind(&parameter.reference_range)
            .bind(parameter.abnormal)
            .execute(&mut *conn)
            .await?;
        }
    }

    debug!(%encounter_id, count = entries.len(), "performed analyses replaced");
    Ok(())
}

// ============================================================================
// ORDERED READS
// ============================================================================

impl SectionStore {
    pub async fn get_secondary_diagnoses(
        &self,
        encounter_id: Uuid,
    ) -> EncounterResult<Vec<SecondaryDiagnosis>> {
        let rows = sqlx::query(
            "SELECT id, encounter_id, display_order, icd10_code, name, elaboration,
                    created_at, created_by
             FROM secondary_diagnoses
             WHERE encounter_id = ?
             ORDER BY display_order",
        )
        .bind(encounter_id.to_string())
        .fetch_all(self.db().pool())
        .await?;

        rows.iter()
            .map(|row| {
                Ok(SecondaryDiagnosis {
                    id: uuid_column(row, "id")?,
                    encounter_id: uuid_column(row, "encounter_id")?,
                    display_order: row.try_get("display_order")?,
                    icd10_code: row.try_get("icd10_code")?,
                    name: row.try_get("name")?,
                    elaboration: row.try_get("elaboration")?,
                    created_at: row.try_get("created_at")?,
                    created_by: uuid_column(row, "created_by")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(Into::into)
    }

    pub async fn get_medications(&self, encounter_id: Uuid) -> EncounterResult<Vec<Medication>> {
        let rows = sqlx::query(
            "SELECT id, encounter_id, display_order, name, dose, frequency, duration,
                    quantity, notes, created_at, created_by
             FROM medications
             WHERE encounter_id = ?
             ORDER BY display_order",
        )
        .bind(encounter_id.to_string())
        .fetch_all(self.db().pool())
        .await?;

        rows.iter()
            .map(|row| {
                Ok(Medication {
                    id: uuid_column(row, "id")?,
                    encounter_id: uuid_column(row, "encounter_id")?,
                    display_order: row.try_get("display_order")?,
                    name: row.try_get("name")?,
                    dose: row.try_get("dose")?,
                    frequency: row.try_get("frequency")?,
                    duration: row.try_get("duration")?,
                    quantity: row.try_get("quantity")?,
                    notes: row.try_get("notes")?,
                    created_at: row.try_get("created_at")?,
                    created_by: uuid_column(row, "created_by")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(Into::into)
    }

    pub async fn get_recommended_investigations(
        &self,
        encounter_id: Uuid,
    ) -> EncounterResult<Vec<RecommendedInvestigation>> {
        let rows = sqlx::query(
            "SELECT id, encounter_id, display_order, code, name, urgent, indication,
                    target_date, created_at, created_by
             FROM recommended_investigations
             WHERE encounter_id = ?
             ORDER BY display_order",
        )
        .bind(encounter_id.to_string())
        .fetch_all(self.db().pool())
        .await?;

        rows.iter()
            .map(|row| {
                Ok(RecommendedInvestigation {
                    id: uuid_column(row, "id")?,
                    encounter_id: uuid_column(row, "encounter_id")?,
                    display_order: row.try_get("display_order")?,
                    code: row.try_get("code")?,
                    name: row.try_get("name")?,
                    urgent: row.try_get("urgent")?,
                    indication: row.try_get("indication")?,
                    target_date: row.try_get("target_date")?,
                    created_at: row.try_get("created_at")?,
                    created_by: uuid_column(row, "created_by")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(Into::into)
    }

    pub async fn get_performed_analyses(
        &self,
        encounter_id: Uuid,
    ) -> EncounterResult<Vec<PerformedAnalysis>> {
        let rows = sqlx::query(
            "SELECT id, encounter_id, display_order, code, name, performed_at,
                    result_summary, created_at, created_by
             FROM performed_analyses
             WHERE encounter_id = ?
             ORDER BY display_order",
        )
        .bind(encounter_id.to_string())
        .fetch_all(self.db().pool())
        .await?;

        let mut analyses = Vec::with_capacity(rows.len());
        for row in &rows {
            let id = uuid_column(row, "id")?;
            let parameter_rows = sqlx::query(
                "SELECT name, value, unit, reference_range, abnormal
                 FROM analysis_parameters
                 WHERE analysis_id = ?
                 ORDER BY ordinal",
            )
            .bind(id.to_string())
            .fetch_all(self.db().pool())
            .await?;

            let parameters = parameter_rows
                .iter()
                .map(|p| {
                    Ok(AnalysisParameter {
                        name: p.try_get("name")?,
                        value: p.try_get("value")?,
                        unit: p.try_get("unit")?,
                        reference_range: p.try_get("reference_range")?,
                        abnormal: p.try_get("abnormal")?,
                    })
                })
                .collect::<Result<Vec<_>, sqlx::Error>>()?;

            analyses.push(PerformedAnalysis {
                id,
                encounter_id: uuid_column(row, "encounter_id")?,
                display_order: row.try_get("display_order")?,
                code: row.try_get("code")?,
                name: row.try_get("name")?,
                performed_at: row.try_get("performed_at")?,
                result_summary: row.try_get("result_summary")?,
                parameters,
                created_at: row.try_get("created_at")?,
                created_by: uuid_column(row, "created_by")?,
            });
        }

        Ok(analyses)
    }
}
