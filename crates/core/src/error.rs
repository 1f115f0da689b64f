use encounter_types::{EncounterStatus, VocabularyError};
use uuid::Uuid;

/// Errors produced by the encounter core.
///
/// The lifecycle manager is the only layer that translates low-level storage
/// failures into this taxonomy; the store and repository modules propagate
/// `sqlx::Error` upward uninterpreted via the `Storage` variant.
///
/// `Storage` is the only retryable variant: every write path is atomic per
/// call, so a failed call leaves storage exactly as it was and the whole call
/// can be resubmitted.
#[derive(Debug, thiserror::Error)]
pub enum EncounterError {
    /// The referenced encounter does not exist.
    #[error("encounter not found: {0}")]
    EncounterNotFound(Uuid),

    /// The linked appointment does not exist on the scheduling side.
    #[error("appointment not found: {0}")]
    AppointmentNotFound(Uuid),

    /// The operation requires a different workflow state.
    #[error("encounter {id} is {status}; the operation is not allowed in that state")]
    InvalidState { id: Uuid, status: EncounterStatus },

    /// Input rejected before any storage write was attempted.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Transient storage failure; safe to retry the whole call.
    #[error("storage unavailable: {0}")]
    Storage(#[from] sqlx::Error),

    /// A stored section payload could not be decoded.
    #[error("corrupt section payload for encounter {encounter_id} ({kind}): {source}")]
    CorruptSection {
        encounter_id: Uuid,
        kind: encounter_types::SectionKind,
        #[source]
        source: serde_json::Error,
    },

    /// Stored vocabulary text did not parse into its closed type.
    #[error("corrupt stored vocabulary: {0}")]
    CorruptVocabulary(#[from] VocabularyError),

    /// The scheduling collaborator could not be notified; the finalize that
    /// triggered the notification has been rolled back.
    #[error("scheduling notification failed: {0}")]
    Scheduling(String),
}

pub type EncounterResult<T> = std::result::Result<T, EncounterError>;
