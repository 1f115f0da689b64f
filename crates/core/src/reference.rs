//! Boundary with the ICD-10 and medication nomenclature lookups.
//!
//! Read-only, display-enrichment only. An unknown code is stored as the free
//! text the clinician typed and never blocks a save; the consultation record
//! is the clinician's document, not a coding validator.

use async_trait::async_trait;
use std::collections::HashMap;

/// Display information for one ICD-10 code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosisInfo {
    pub code: String,
    pub name: String,
    pub chapter: Option<String>,
}

/// Display information for one medication catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MedicationInfo {
    pub code: String,
    pub name: String,
    pub form: Option<String>,
    pub strength: Option<String>,
}

/// Read-only reference data lookups.
#[async_trait]
pub trait ReferenceDataProvider: Send + Sync {
    async fn diagnosis_by_code(&self, code: &str) -> Option<DiagnosisInfo>;
    async fn medication_by_code(&self, code: &str) -> Option<MedicationInfo>;
}

/// In-memory catalog for tests, fixtures, and small deployments.
///
/// Lookups are case-insensitive on the code, matching how clinicians type
/// ICD-10 codes.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    diagnoses: HashMap<String, DiagnosisInfo>,
    medications: HashMap<String, MedicationInfo>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_diagnosis(mut self, info: DiagnosisInfo) -> Self {
        self.diagnoses.insert(info.code.to_ascii_uppercase(), info);
        self
    }

    pub fn with_medication(mut self, info: MedicationInfo) -> Self {
        self.medications
            .insert(info.code.to_ascii_uppercase(), info);
        self
    }
}

#[async_trait]
impl ReferenceDataProvider for InMemoryCatalog {
    async fn diagnosis_by_code(&self, code: &str) -> Option<DiagnosisInfo> {
        self.diagnoses.get(&code.to_ascii_uppercase()).cloned()
    }

    async fn medication_by_code(&self, code: &str) -> Option<MedicationInfo> {
        self.medications.get(&code.to_ascii_uppercase()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn catalog_lookups_are_case_insensitive() {
        let catalog = InMemoryCatalog::new().with_diagnosis(DiagnosisInfo {
            code: "I21.0".into(),
            name: "Acute transmural myocardial infarction of anterior wall".into(),
            chapter: Some("IX".into()),
        });

        assert!(catalog.diagnosis_by_code("i21.0").await.is_some());
        assert!(catalog.diagnosis_by_code("I21.0").await.is_some());
        assert!(catalog.diagnosis_by_code("Z99").await.is_none());
    }
}
