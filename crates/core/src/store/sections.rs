//! Upsert and read primitives for the 1:1 encounter sections.
//!
//! The original system kept seven section tables, each with its own upsert
//! stored procedure. The contract is identical here (insert-if-absent,
//! update-if-present, keyed by (encounter, kind)) but collapsed onto one
//! keyed table with a typed JSON payload per row, so there is a single code
//! path instead of seven.

use crate::error::{EncounterError, EncounterResult};
use crate::model::sections::{SectionData, SectionSet};
use crate::store::Database;
use chrono::{DateTime, Utc};
use encounter_types::SectionKind;
use sqlx::{Row, SqliteConnection};
use tracing::debug;
use uuid::Uuid;

/// Read access to section rows; writes go through the transaction-scoped
/// primitives below.
#[derive(Clone, Debug)]
pub struct SectionStore {
    db: Database,
}

impl SectionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub(crate) fn db(&self) -> &Database {
        &self.db
    }

    /// Loads every section row of an encounter into a [`SectionSet`].
    ///
    /// Sections never saved are absent; an encounter with no sections yields
    /// an empty set rather than an error, because the root row is the
    /// authority on existence.
    pub async fn get_sections(&self, encounter_id: Uuid) -> EncounterResult<SectionSet> {
        let rows = sqlx::query(
            "SELECT kind, body FROM encounter_sections WHERE encounter_id = ?",
        )
        .bind(encounter_id.to_string())
        .fetch_all(self.db.pool())
        .await?;

        let mut set = SectionSet::default();
        for row in rows {
            let kind_raw: String = row.try_get("kind")?;
            let body: String = row.try_get("body")?;
            let kind = SectionKind::parse(&kind_raw)?;
            let data = SectionData::from_json(kind, &body).map_err(|source| {
                EncounterError::CorruptSection {
                    encounter_id,
                    kind,
                    source,
                }
            })?;
            set.insert(data);
        }
        Ok(set)
    }
}

/// Fails with [`EncounterError::EncounterNotFound`] unless a root row exists.
///
/// Shared guard for every child-row write: the foreign key would catch the
/// orphan anyway, but this surfaces a domain NotFound instead of a raw
/// constraint violation.
pub(crate) async fn ensure_encounter_exists(
    conn: &mut SqliteConnection,
    encounter_id: Uuid,
) -> EncounterResult<()> {
    let found = sqlx::query("SELECT 1 FROM encounters WHERE id = ?")
        .bind(encounter_id.to_string())
        .fetch_optional(&mut *conn)
        .await?;

    if found.is_none() {
        return Err(EncounterError::EncounterNotFound(encounter_id));
    }
    Ok(())
}

/// Inserts or updates one section row inside the caller's transaction.
///
/// Never produces a second row for the same kind: the (encounter, kind)
/// primary key plus the conflict clause make the upsert idempotent under
/// repeated autosave calls.
pub(crate) async fn upsert_section(
    conn: &mut SqliteConnection,
    encounter_id: Uuid,
    data: &SectionData,
    actor: Uuid,
    now: DateTime<Utc>,
) -> EncounterResult<()> {
    ensure_encounter_exists(conn, encounter_id).await?;

    let body = data.to_json().map_err(|err| {
        EncounterError::Validation(format!("section payload is not serializable: {err}"))
    })?;

    sqlx::query(
        "INSERT INTO encounter_sections (encounter_id, kind, body, created_at, created_by)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT (encounter_id, kind) DO UPDATE SET
             body = excluded.body,
             modified_at = excluded.created_at,
             modified_by = excluded.created_by",
    )
    .bind(encounter_id.to_string())
    .bind(data.kind().as_str())
    .bind(body)
    .bind(now)
    .bind(actor.to_string())
    .execute(&mut *conn)
    .await?;

    debug!(%encounter_id, kind = %data.kind(), "section upserted");
    Ok(())
}
