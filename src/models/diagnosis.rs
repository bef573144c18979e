use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::prescription::PrescriptionRecord;

/// Labels the classification service was trained on. Informational only:
/// any non-empty label the service returns is accepted.
pub const KNOWN_LABELS: &[&str] = &[
    "Acne",
    "Eczema",
    "Hair Loss, Alopecia",
    "Nail Fungus",
    "Scabies",
];

/// One classification of one submitted image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisResult {
    /// `None` when the service reported a score without a label.
    pub label: Option<String>,
    /// Percentage on a 0–100 scale.
    pub confidence_score: f64,
}

impl DiagnosisResult {
    pub fn is_known_label(&self) -> bool {
        self.label
            .as_deref()
            .is_some_and(|label| KNOWN_LABELS.contains(&label))
    }
}

/// Minimal context the advice prompt is built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdviceRequest {
    pub diagnosis_label: String,
    pub confidence_score: f64,
}

impl AdviceRequest {
    /// `None` for an unlabeled diagnosis; the prompt needs a label.
    pub fn from_diagnosis(diagnosis: &DiagnosisResult) -> Option<Self> {
        Some(Self {
            diagnosis_label: diagnosis.label.clone()?,
            confidence_score: diagnosis.confidence_score,
        })
    }
}

/// Advice text exactly as the generative service returned it.
/// Not assumed to be well-formed markup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawAdviceText(pub String);

impl RawAdviceText {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RawAdviceText {
    fn from(text: String) -> Self {
        Self(text)
    }
}

impl From<&str> for RawAdviceText {
    fn from(text: &str) -> Self {
        Self(text.to_string())
    }
}

/// Everything a completed run hands to the rendering boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisReport {
    pub submission_id: Uuid,
    pub label: String,
    pub confidence_score: f64,
    pub raw_advice: RawAdviceText,
    pub prescription: PrescriptionRecord,
    pub generated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advice_request_copies_label_and_score() {
        let diagnosis = DiagnosisResult {
            label: Some("Eczema".into()),
            confidence_score: 95.0,
        };
        let request = AdviceRequest::from_diagnosis(&diagnosis).unwrap();
        assert_eq!(request.diagnosis_label, "Eczema");
        assert_eq!(request.confidence_score, 95.0);
    }

    #[test]
    fn unlabeled_diagnosis_has_no_advice_request() {
        let diagnosis = DiagnosisResult {
            label: None,
            confidence_score: 99.0,
        };
        assert_eq!(AdviceRequest::from_diagnosis(&diagnosis), None);
        assert!(!diagnosis.is_known_label());
    }

    #[test]
    fn known_labels_cover_trained_classes() {
        let known = DiagnosisResult {
            label: Some("Hair Loss, Alopecia".into()),
            confidence_score: 99.1,
        };
        let unknown = DiagnosisResult {
            label: Some("Psoriasis".into()),
            confidence_score: 99.1,
        };
        assert!(known.is_known_label());
        assert!(!unknown.is_known_label());
    }

    #[test]
    fn raw_advice_serializes_as_plain_string() {
        let raw = RawAdviceText::from("No prescription available.");
        let json = serde_json::to_string(&raw).unwrap();
        assert_eq!(json, "\"No prescription available.\"");
    }
}
