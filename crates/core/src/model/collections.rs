//! Ordered 1:N child collections of an encounter.
//!
//! Each collection has two shapes: the *entry* the editing surface submits
//! (no identifier, no order; autosave always sends the complete current
//! list) and the *row* the store returns (identifier, dense display order,
//! audit pair). Row identifiers are not stable across saves because
//! replace-all synchronization reinserts the list; nothing outside the
//! aggregate references them, so that instability is harmless.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound on secondary diagnoses per encounter.
pub const MAX_SECONDARY_DIAGNOSES: usize = 10;

// ============================================================================
// SECONDARY DIAGNOSES
// ============================================================================

/// A secondary diagnosis as submitted by the editing surface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecondaryDiagnosisEntry {
    pub icd10_code: String,
    pub name: String,
    pub elaboration: Option<String>,
}

/// A persisted secondary diagnosis row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecondaryDiagnosis {
    pub id: Uuid,
    pub encounter_id: Uuid,
    /// Dense 1..count within the encounter, assigned by list position.
    pub display_order: i32,
    pub icd10_code: String,
    pub name: String,
    pub elaboration: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: Uuid,
}

// ============================================================================
// MEDICATIONS
// ============================================================================

/// A prescribed medication as submitted by the editing surface.
///
/// Entries with a blank name are dropped before storage; the form keeps an
/// empty trailing row for data entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MedicationEntry {
    pub name: String,
    pub dose: Option<String>,
    pub frequency: Option<String>,
    pub duration: Option<String>,
    pub quantity: Option<String>,
    pub notes: Option<String>,
}

/// A persisted medication row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medication {
    pub id: Uuid,
    pub encounter_id: Uuid,
    pub display_order: i32,
    pub name: String,
    pub dose: Option<String>,
    pub frequency: Option<String>,
    pub duration: Option<String>,
    pub quantity: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: Uuid,
}

// ============================================================================
// RECOMMENDED INVESTIGATIONS
// ============================================================================

/// An investigation the clinician asks for during the encounter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecommendedInvestigationEntry {
    pub code: Option<String>,
    pub name: String,
    pub urgent: bool,
    pub indication: Option<String>,
    pub target_date: Option<NaiveDate>,
}

/// A persisted recommended-investigation row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedInvestigation {
    pub id: Uuid,
    pub encounter_id: Uuid,
    pub display_order: i32,
    pub code: Option<String>,
    pub name: String,
    pub urgent: bool,
    pub indication: Option<String>,
    pub target_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub created_by: Uuid,
}

// ============================================================================
// PERFORMED ANALYSES
// ============================================================================

/// One parameter-level result inside an analysis panel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisParameter {
    pub name: String,
    pub value: Option<String>,
    pub unit: Option<String>,
    pub reference_range: Option<String>,
    pub abnormal: bool,
}

/// A result record imported after it arrives from the laboratory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformedAnalysisEntry {
    pub code: Option<String>,
    pub name: String,
    pub performed_at: Option<NaiveDate>,
    pub result_summary: Option<String>,
    pub parameters: Vec<AnalysisParameter>,
}

/// A persisted performed-analysis row with its nested panel results.
///
/// Not joined to [`RecommendedInvestigation`] by foreign key:
/// results arrive asynchronously from external labs, often after the
/// encounter is finalized, and frequently for investigations nobody
/// recommended. The only linkage is by code or name, and
/// [`matches_recommendation`](Self::matches_recommendation) is the one place
/// that loose coupling is spelled out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformedAnalysis {
    pub id: Uuid,
    pub encounter_id: Uuid,
    pub display_order: i32,
    pub code: Option<String>,
    pub name: String,
    pub performed_at: Option<NaiveDate>,
    pub result_summary: Option<String>,
    pub parameters: Vec<AnalysisParameter>,
    pub created_at: DateTime<Utc>,
    pub created_by: Uuid,
}

impl PerformedAnalysis {
    /// Best-effort association with a recommendation: same code when both
    /// sides carry one, otherwise a case-insensitive name match.
    pub fn matches_recommendation(&self, recommendation: &RecommendedInvestigation) -> bool {
        if let (Some(own), Some(theirs)) = (&self.code, &recommendation.code) {
            return own.eq_ignore_ascii_case(theirs);
        }
        self.name.eq_ignore_ascii_case(&recommendation.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recommendation(code: Option<&str>, name: &str) -> RecommendedInvestigation {
        RecommendedInvestigation {
            id: Uuid::new_v4(),
            encounter_id: Uuid::new_v4(),
            display_order: 1,
            code: code.map(str::to_owned),
            name: name.to_owned(),
            urgent: false,
            indication: None,
            target_date: None,
            created_at: Utc::now(),
            created_by: Uuid::new_v4(),
        }
    }

    fn analysis(code: Option<&str>, name: &str) -> PerformedAnalysis {
        PerformedAnalysis {
            id: Uuid::new_v4(),
            encounter_id: Uuid::new_v4(),
            display_order: 1,
            code: code.map(str::to_owned),
            name: name.to_owned(),
            performed_at: None,
            result_summary: None,
            parameters: Vec::new(),
            created_at: Utc::now(),
            created_by: Uuid::new_v4(),
        }
    }

    #[test]
    fn code_match_wins_when_both_sides_carry_codes() {
        let rec = recommendation(Some("HB"), "Haemoglobin");
        assert!(analysis(Some("hb"), "whatever").matches_recommendation(&rec));
        assert!(!analysis(Some("GLU"), "Haemoglobin").matches_recommendation(&rec));
    }

    #[test]
    fn name_match_is_the_fallback() {
        let rec = recommendation(None, "Haemoglobin");
        assert!(analysis(None, "haemoglobin").matches_recommendation(&rec));
        assert!(analysis(Some("HB"), "HAEMOGLOBIN").matches_recommendation(&rec));
        assert!(!analysis(None, "Glucose").matches_recommendation(&rec));
    }
}
