//! Domain model for the clinical encounter aggregate.
//!
//! One encounter is a logically single consultation document stored as
//! several physical records: the root row ([`Encounter`]), up to seven 1:1
//! section rows ([`sections`]), and four ordered child collections
//! ([`collections`]). The root owns every child exclusively; nothing outside
//! the aggregate references a child row by identifier.

pub mod collections;
pub mod encounter;
pub mod sections;

pub use collections::{
    AnalysisParameter, Medication, MedicationEntry, PerformedAnalysis, PerformedAnalysisEntry,
    RecommendedInvestigation, RecommendedInvestigationEntry, SecondaryDiagnosis,
    SecondaryDiagnosisEntry, MAX_SECONDARY_DIAGNOSES,
};
pub use encounter::{Encounter, EncounterAggregate};
pub use sections::{
    BmiBand, Conclusion, HistoryAndRiskFactors, InvestigationNotes, PhysicalExam,
    PresentingComplaint, PrincipalDiagnosis, SectionData, SectionSet, Treatment,
};
