//! Closed vocabulary types shared across the encounter workspace.
//!
//! The original system carried its workflow status as free text and compared
//! strings at every decision point. Here the status is a closed tagged type
//! with explicit transition checking, so an illegal transition is a value the
//! compiler can see rather than a typo the database stores.

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing vocabulary values from storage.
#[derive(Debug, thiserror::Error)]
pub enum VocabularyError {
    /// The stored text is not a known encounter status
    #[error("unknown encounter status: {0}")]
    UnknownStatus(String),
    /// The stored text is not a known section kind
    #[error("unknown section kind: {0}")]
    UnknownSectionKind(String),
}

/// Workflow state of a clinical encounter.
///
/// Transitions are monotonic: `InProgress` is the only non-terminal state.
/// `Finalized` closes the record for editing; `Cancelled` is the soft-delete
/// terminal state that keeps child rows for retention while removing the
/// encounter from every normal read path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncounterStatus {
    /// Draft under active editing; the only state that accepts writes.
    InProgress,
    /// Consultation closed; terminal.
    Finalized,
    /// Soft-deleted before finalization; terminal.
    Cancelled,
}

impl EncounterStatus {
    /// Returns the canonical storage spelling of this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Finalized => "finalized",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses the canonical storage spelling.
    pub fn parse(input: &str) -> Result<Self, VocabularyError> {
        match input {
            "in_progress" => Ok(Self::InProgress),
            "finalized" => Ok(Self::Finalized),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(VocabularyError::UnknownStatus(other.to_owned())),
        }
    }

    /// True when no further transition is possible.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::InProgress)
    }

    /// Whether the state machine permits moving from `self` to `next`.
    ///
    /// The only legal moves are `InProgress -> Finalized` and
    /// `InProgress -> Cancelled`. Self-transitions are not moves.
    pub fn can_transition_to(self, next: EncounterStatus) -> bool {
        matches!(
            (self, next),
            (Self::InProgress, Self::Finalized) | (Self::InProgress, Self::Cancelled)
        )
    }
}

impl std::fmt::Display for EncounterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The seven 1:1 sub-sections an encounter may carry.
///
/// One row exists per encounter per kind, created lazily on first save.
/// The discriminant doubles as the storage key, so the spellings here are
/// load-bearing and must not change once data exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SectionKind {
    PresentingComplaint,
    HistoryAndRiskFactors,
    PhysicalExam,
    InvestigationNotes,
    PrincipalDiagnosis,
    Treatment,
    Conclusion,
}

impl SectionKind {
    /// All kinds, in the order the consultation form presents them.
    pub const ALL: [SectionKind; 7] = [
        Self::PresentingComplaint,
        Self::HistoryAndRiskFactors,
        Self::PhysicalExam,
        Self::InvestigationNotes,
        Self::PrincipalDiagnosis,
        Self::Treatment,
        Self::Conclusion,
    ];

    /// Returns the canonical storage spelling of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PresentingComplaint => "presenting_complaint",
            Self::HistoryAndRiskFactors => "history_and_risk_factors",
            Self::PhysicalExam => "physical_exam",
            Self::InvestigationNotes => "investigation_notes",
            Self::PrincipalDiagnosis => "principal_diagnosis",
            Self::Treatment => "treatment",
            Self::Conclusion => "conclusion",
        }
    }

    /// Parses the canonical storage spelling.
    pub fn parse(input: &str) -> Result<Self, VocabularyError> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == input)
            .ok_or_else(|| VocabularyError::UnknownSectionKind(input.to_owned()))
    }
}

impl std::fmt::Display for SectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
