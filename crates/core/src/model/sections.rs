//! Typed payloads for the seven 1:1 encounter sections.
//!
//! Each payload serializes to the JSON body of one `encounter_sections` row.
//! Every field is optional: a section row exists as soon as the clinician
//! touches any field in it, and the row's lifecycle is owned entirely by the
//! encounter (created lazily, updated in place, removed only with the root).

use encounter_types::SectionKind;
use serde::{Deserialize, Serialize};

/// Presenting complaint and history of the present illness.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresentingComplaint {
    pub complaint: Option<String>,
    pub history_of_present_illness: Option<String>,
}

/// Medical history and risk factors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryAndRiskFactors {
    pub personal_history: Option<String>,
    pub family_history: Option<String>,
    pub prior_treatment: Option<String>,
    pub risk_factors: Option<String>,
    pub allergies: Option<String>,
}

/// Physical examination findings and vital signs.
///
/// Body-mass index is derived from weight and height on demand and is never
/// stored; the original system persisted a redundant IMC column that could
/// drift from the measurements it was computed from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhysicalExam {
    pub general_state: Option<String>,
    pub skin: Option<String>,
    pub mucosae: Option<String>,
    pub lymph_nodes: Option<String>,
    pub edema: Option<String>,
    pub detailed_findings: Option<String>,
    pub other_clinical_notes: Option<String>,

    pub weight_kg: Option<f64>,
    pub height_cm: Option<f64>,
    pub temperature_c: Option<f64>,
    /// Free text, e.g. "120/80 mmHg".
    pub blood_pressure: Option<String>,
    pub pulse_bpm: Option<i32>,
    pub respiratory_rate: Option<i32>,
    pub oxygen_saturation_pct: Option<i32>,
    pub glucose_mg_dl: Option<f64>,
}

impl PhysicalExam {
    /// Body-mass index in kg/m², rounded to two decimals.
    ///
    /// Returns `None` unless both weight and a positive height are recorded.
    pub fn bmi(&self) -> Option<f64> {
        let weight = self.weight_kg?;
        let height_cm = self.height_cm?;
        if height_cm <= 0.0 {
            return None;
        }
        let height_m = height_cm / 100.0;
        Some((weight / (height_m * height_m) * 100.0).round() / 100.0)
    }

    /// WHO-style interpretation band for the derived BMI.
    pub fn bmi_band(&self) -> Option<BmiBand> {
        Some(BmiBand::from_bmi(self.bmi()?))
    }
}

/// WHO interpretation bands for body-mass index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BmiBand {
    Underweight,
    Normal,
    Overweight,
    ObeseClassI,
    ObeseClassII,
    ObeseClassIII,
}

impl BmiBand {
    pub fn from_bmi(bmi: f64) -> Self {
        match bmi {
            b if b < 18.5 => Self::Underweight,
            b if b < 25.0 => Self::Normal,
            b if b < 30.0 => Self::Overweight,
            b if b < 35.0 => Self::ObeseClassI,
            b if b < 40.0 => Self::ObeseClassII,
            _ => Self::ObeseClassIII,
        }
    }
}

/// Free-text notes about investigations reviewed during the visit.
///
/// Distinct from the structured recommended/performed collections: this is
/// the narrative block of the consultation form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvestigationNotes {
    pub laboratory: Option<String>,
    pub other: Option<String>,
}

/// Principal diagnosis: one ICD-10 code plus free-text elaboration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrincipalDiagnosis {
    pub icd10_code: Option<String>,
    pub name: Option<String>,
    pub elaboration: Option<String>,
}

/// Treatment plan and follow-up recommendations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Treatment {
    pub medicamentous: Option<String>,
    pub lifestyle_recommendations: Option<String>,
    pub next_appointment: Option<String>,
    pub monitoring_recommendations: Option<String>,
}

/// Prognosis, conclusions, and the regulatory annex flags of the medical
/// letter (oncologic condition, admission, issued documents, dispatch).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conclusion {
    pub prognosis: Option<String>,
    pub conclusion: Option<String>,
    pub clinician_remarks: Option<String>,

    pub oncologic_condition: bool,
    pub oncologic_details: Option<String>,
    pub admission_indicated: bool,
    pub admission_timeframe: Option<String>,
    pub prescription_issued: bool,
    pub prescription_series: Option<String>,
    pub sick_leave_issued: bool,
    pub sick_leave_series: Option<String>,
    pub home_care_referral: bool,
    pub medical_device_referral: bool,
    pub email_dispatch: bool,
    pub email_address: Option<String>,
}

/// One section payload together with its kind discriminant.
///
/// This is the unit the section store accepts: the kind becomes the storage
/// key, the payload becomes the JSON body.
#[derive(Debug, Clone, PartialEq)]
pub enum SectionData {
    PresentingComplaint(PresentingComplaint),
    HistoryAndRiskFactors(HistoryAndRiskFactors),
    PhysicalExam(PhysicalExam),
    InvestigationNotes(InvestigationNotes),
    PrincipalDiagnosis(PrincipalDiagnosis),
    Treatment(Treatment),
    Conclusion(Conclusion),
}

impl SectionData {
    pub fn kind(&self) -> SectionKind {
        match self {
            Self::PresentingComplaint(_) => SectionKind::PresentingComplaint,
            Self::HistoryAndRiskFactors(_) => SectionKind::HistoryAndRiskFactors,
            Self::PhysicalExam(_) => SectionKind::PhysicalExam,
            Self::InvestigationNotes(_) => SectionKind::InvestigationNotes,
            Self::PrincipalDiagnosis(_) => SectionKind::PrincipalDiagnosis,
            Self::Treatment(_) => SectionKind::Treatment,
            Self::Conclusion(_) => SectionKind::Conclusion,
        }
    }

    /// Serializes the payload body (without the kind discriminant).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        match self {
            Self::PresentingComplaint(s) => serde_json::to_string(s),
            Self::HistoryAndRiskFactors(s) => serde_json::to_string(s),
            Self::PhysicalExam(s) => serde_json::to_string(s),
            Self::InvestigationNotes(s) => serde_json::to_string(s),
            Self::PrincipalDiagnosis(s) => serde_json::to_string(s),
            Self::Treatment(s) => serde_json::to_string(s),
            Self::Conclusion(s) => serde_json::to_string(s),
        }
    }

    /// Decodes a stored payload body under the given kind.
    pub fn from_json(kind: SectionKind, body: &str) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            SectionKind::PresentingComplaint => {
                Self::PresentingComplaint(serde_json::from_str(body)?)
            }
            SectionKind::HistoryAndRiskFactors => {
                Self::HistoryAndRiskFactors(serde_json::from_str(body)?)
            }
            SectionKind::PhysicalExam => Self::PhysicalExam(serde_json::from_str(body)?),
            SectionKind::InvestigationNotes => {
                Self::InvestigationNotes(serde_json::from_str(body)?)
            }
            SectionKind::PrincipalDiagnosis => {
                Self::PrincipalDiagnosis(serde_json::from_str(body)?)
            }
            SectionKind::Treatment => Self::Treatment(serde_json::from_str(body)?),
            SectionKind::Conclusion => Self::Conclusion(serde_json::from_str(body)?),
        })
    }
}

/// The sections of one encounter, at most one of each kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SectionSet {
    pub presenting_complaint: Option<PresentingComplaint>,
    pub history_and_risk_factors: Option<HistoryAndRiskFactors>,
    pub physical_exam: Option<PhysicalExam>,
    pub investigation_notes: Option<InvestigationNotes>,
    pub principal_diagnosis: Option<PrincipalDiagnosis>,
    pub treatment: Option<Treatment>,
    pub conclusion: Option<Conclusion>,
}

impl SectionSet {
    /// Places one decoded section; a later value for the same kind replaces
    /// the earlier one, mirroring the storage key's uniqueness.
    pub fn insert(&mut self, data: SectionData) {
        match data {
            SectionData::PresentingComplaint(s) => self.presenting_complaint = Some(s),
            SectionData::HistoryAndRiskFactors(s) => self.history_and_risk_factors = Some(s),
            SectionData::PhysicalExam(s) => self.physical_exam = Some(s),
            SectionData::InvestigationNotes(s) => self.investigation_notes = Some(s),
            SectionData::PrincipalDiagnosis(s) => self.principal_diagnosis = Some(s),
            SectionData::Treatment(s) => self.treatment = Some(s),
            SectionData::Conclusion(s) => self.conclusion = Some(s),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.presenting_complaint.is_none()
            && self.history_and_risk_factors.is_none()
            && self.physical_exam.is_none()
            && self.investigation_notes.is_none()
            && self.principal_diagnosis.is_none()
            && self.treatment.is_none()
            && self.conclusion.is_none()
    }
}
