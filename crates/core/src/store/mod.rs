//! Durable storage for the encounter aggregate.
//!
//! One SQLite database holds the root table, the keyed section table, and the
//! four collection tables. All write primitives take `&mut SqliteConnection`
//! so the caller decides the transaction boundary; the orchestration layer
//! wraps every save in exactly one transaction, which is what makes a
//! half-applied autosave impossible.
//!
//! ## Persisted layout
//!
//! ```text
//! encounters                  # one root row per encounter
//! encounter_sections          # ≤ 7 rows per encounter, keyed (encounter, kind)
//! secondary_diagnoses         # ordered, ≤ 10 per encounter
//! medications                 # ordered, unbounded
//! recommended_investigations  # ordered; "what was asked for"
//! performed_analyses          # ordered; "what came back"
//!   analysis_parameters       # nested panel results per analysis
//! ```

pub mod collections;
pub mod sections;

use crate::config::CoreConfig;
use crate::error::EncounterResult;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

pub use sections::SectionStore;

/// Handle to the encounter database.
///
/// Cheap to clone; all clones share one connection pool. No encounter state
/// is cached in memory between requests; every read re-fetches from storage.
#[derive(Clone, Debug)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connects using the startup configuration and ensures the schema exists.
    pub async fn connect(cfg: &CoreConfig) -> EncounterResult<Self> {
        let options = SqliteConnectOptions::from_str(cfg.database_url())?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(cfg.max_connections())
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.ensure_schema().await?;
        Ok(db)
    }

    /// Opens a private in-memory database on a single-connection pool.
    ///
    /// A shared pool over `:memory:` would hand each connection its own empty
    /// database, so the pool is pinned to one connection.
    pub async fn in_memory() -> EncounterResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.ensure_schema().await?;
        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn ensure_schema(&self) -> EncounterResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS encounters (
                id TEXT PRIMARY KEY,
                appointment_id TEXT,
                patient_id TEXT NOT NULL,
                clinician_id TEXT NOT NULL,
                encounter_date TEXT NOT NULL,
                encounter_time TEXT NOT NULL,
                kind TEXT NOT NULL,
                status TEXT NOT NULL,
                finalized_at TEXT,
                duration_minutes INTEGER,
                created_at TEXT NOT NULL,
                created_by TEXT NOT NULL,
                modified_at TEXT,
                modified_by TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_encounters_patient_date
             ON encounters (patient_id, encounter_date)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_encounters_clinician
             ON encounters (clinician_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_encounters_appointment
             ON encounters (appointment_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS encounter_sections (
                encounter_id TEXT NOT NULL REFERENCES encounters(id) ON DELETE CASCADE,
                kind TEXT NOT NULL,
                body TEXT NOT NULL,
                created_at TEXT NOT NULL,
                created_by TEXT NOT NULL,
                modified_at TEXT,
                modified_by TEXT,
                PRIMARY KEY (encounter_id, kind)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS secondary_diagnoses (
                id TEXT PRIMARY KEY,
                encounter_id TEXT NOT NULL REFERENCES encounters(id) ON DELETE CASCADE,
                display_order INTEGER NOT NULL,
                icd10_code TEXT NOT NULL,
                name TEXT NOT NULL,
                elaboration TEXT,
                created_at TEXT NOT NULL,
                created_by TEXT NOT NULL,
                UNIQUE (encounter_id, display_order)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS medications (
                id TEXT PRIMARY KEY,
                encounter_id TEXT NOT NULL REFERENCES encounters(id) ON DELETE CASCADE,
                display_order INTEGER NOT NULL,
                name TEXT NOT NULL,
                dose TEXT,
                frequency TEXT,
                duration TEXT,
                quantity TEXT,
                notes TEXT,
                created_at TEXT NOT NULL,
                created_by TEXT NOT NULL,
                UNIQUE (encounter_id, display_order)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS recommended_investigations (
                id TEXT PRIMARY KEY,
                encounter_id TEXT NOT NULL REFERENCES encounters(id) ON DELETE CASCADE,
                display_order INTEGER NOT NULL,
                code TEXT,
                name TEXT NOT NULL,
                urgent INTEGER NOT NULL,
                indication TEXT,
                target_date TEXT,
                created_at TEXT NOT NULL,
                created_by TEXT NOT NULL,
                UNIQUE (encounter_id, display_order)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS performed_analyses (
                id TEXT PRIMARY KEY,
                encounter_id TEXT NOT NULL REFERENCES encounters(id) ON DELETE CASCADE,
                display_order INTEGER NOT NULL,
                code TEXT,
                name TEXT NOT NULL,
                performed_at TEXT,
                result_summary TEXT,
                created_at TEXT NOT NULL,
                created_by TEXT NOT NULL,
                UNIQUE (encounter_id, display_order)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS analysis_parameters (
                analysis_id TEXT NOT NULL REFERENCES performed_analyses(id) ON DELETE CASCADE,
                ordinal INTEGER NOT NULL,
                name TEXT NOT NULL,
                value TEXT,
                unit TEXT,
                reference_range TEXT,
                abnormal INTEGER NOT NULL,
                PRIMARY KEY (analysis_id, ordinal)
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Decodes a required UUID column stored as canonical text.
pub(crate) fn uuid_column(row: &SqliteRow, column: &str) -> Result<Uuid, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    Uuid::parse_str(&raw).map_err(|err| sqlx::Error::ColumnDecode {
        index: column.to_owned(),
        source: Box::new(err),
    })
}

/// Decodes a nullable UUID column stored as canonical text.
pub(crate) fn uuid_column_opt(row: &SqliteRow, column: &str) -> Result<Option<Uuid>, sqlx::Error> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|value| {
        Uuid::parse_str(&value).map_err(|err| sqlx::Error::ColumnDecode {
            index: column.to_owned(),
            source: Box::new(err),
        })
    })
    .transpose()
}
