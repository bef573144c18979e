use serde::{Deserialize, Serialize};

/// Disease name used when the advice text carries none.
pub const UNKNOWN_CONDITION: &str = "Unknown Condition";
/// Default for medication name, dosage, frequency and duration.
pub const NOT_SPECIFIED: &str = "Not specified";
/// Default for special instructions.
pub const NO_INSTRUCTIONS: &str = "None";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Medication {
    pub name: String,
    pub dosage: String,
    pub frequency: String,
    pub duration: String,
    pub special_instructions: String,
}

impl Default for Medication {
    fn default() -> Self {
        Self {
            name: NOT_SPECIFIED.into(),
            dosage: NOT_SPECIFIED.into(),
            frequency: NOT_SPECIFIED.into(),
            duration: NOT_SPECIFIED.into(),
            special_instructions: NO_INSTRUCTIONS.into(),
        }
    }
}

impl Medication {
    pub fn has_special_instructions(&self) -> bool {
        self.special_instructions != NO_INSTRUCTIONS
    }
}

/// Structured prescription built from the advice text.
///
/// Every field is always populated: missing values resolve to the sentinels
/// above, missing sections to empty vectors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrescriptionRecord {
    pub disease_name: String,
    pub medications: Vec<Medication>,
    pub advice: Vec<String>,
}

impl Default for PrescriptionRecord {
    fn default() -> Self {
        Self {
            disease_name: UNKNOWN_CONDITION.into(),
            medications: Vec::new(),
            advice: Vec::new(),
        }
    }
}

impl PrescriptionRecord {
    pub fn has_known_disease(&self) -> bool {
        self.disease_name != UNKNOWN_CONDITION
    }

    /// False when nothing could be extracted; callers then show the raw text.
    pub fn has_usable_content(&self) -> bool {
        self.has_known_disease() || !self.medications.is_empty() || !self.advice.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_medication_uses_sentinels() {
        let med = Medication::default();
        assert_eq!(med.name, "Not specified");
        assert_eq!(med.dosage, "Not specified");
        assert_eq!(med.frequency, "Not specified");
        assert_eq!(med.duration, "Not specified");
        assert_eq!(med.special_instructions, "None");
        assert!(!med.has_special_instructions());
    }

    #[test]
    fn default_record_has_no_usable_content() {
        let record = PrescriptionRecord::default();
        assert_eq!(record.disease_name, "Unknown Condition");
        assert!(record.medications.is_empty());
        assert!(record.advice.is_empty());
        assert!(!record.has_usable_content());
    }

    #[test]
    fn any_section_makes_record_usable() {
        let advice_only = PrescriptionRecord {
            advice: vec!["Keep the area dry".into()],
            ..Default::default()
        };
        assert!(advice_only.has_usable_content());

        let named_only = PrescriptionRecord {
            disease_name: "Acne".into(),
            ..Default::default()
        };
        assert!(named_only.has_usable_content());
    }

    #[test]
    fn serializes_with_camel_case_fields() {
        let record = PrescriptionRecord {
            disease_name: "Acne".into(),
            medications: vec![Medication::default()],
            advice: vec![],
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["diseaseName"], "Acne");
        assert_eq!(json["medications"][0]["specialInstructions"], "None");
    }
}
