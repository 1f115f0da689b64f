//! # Encounter Core
//!
//! Business logic for clinical encounter records: the consultation a
//! clinician documents during a patient visit, from first autosaved draft to
//! finalized document.
//!
//! An encounter aggregates a root record (who, when, what kind, which
//! appointment), up to seven singleton sections of the consultation form,
//! and four ordered child collections (secondary diagnoses, medications,
//! recommended investigations, performed analyses). [`EncounterLifecycle`]
//! is the entry point for all writes; [`EncounterRepository`] serves reads.
//!
//! **No API concerns**: authentication, HTTP servers, or service interfaces
//! belong to the surfaces embedding this crate. Patient, clinician, and
//! appointment records live in their own subsystems and are referenced here
//! by id only.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod reference;
pub mod repositories;
pub mod scheduling;
pub mod store;

pub use config::CoreConfig;
pub use error::{EncounterError, EncounterResult};
pub use lifecycle::{DraftRequest, EncounterLifecycle};
pub use model::{
    AnalysisParameter, BmiBand, Conclusion, Encounter, EncounterAggregate, HistoryAndRiskFactors,
    InvestigationNotes, Medication, MedicationEntry, PerformedAnalysis, PerformedAnalysisEntry,
    PhysicalExam, PresentingComplaint, PrincipalDiagnosis, RecommendedInvestigation,
    RecommendedInvestigationEntry, SecondaryDiagnosis, SecondaryDiagnosisEntry, SectionData,
    SectionSet, Treatment, MAX_SECONDARY_DIAGNOSES,
};
pub use reference::{DiagnosisInfo, InMemoryCatalog, MedicationInfo, ReferenceDataProvider};
pub use repositories::{DraftScope, EncounterRepository, NewEncounter};
pub use scheduling::{
    AppointmentUpdate, DetachedScheduling, InMemoryScheduling, SchedulingCollaborator,
    SchedulingUnavailable,
};
pub use store::{Database, SectionStore};
