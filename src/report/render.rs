use std::fmt;

use crate::models::{DiagnosisReport, PrescriptionRecord, RawAdviceText};

pub const REPORT_TITLE: &str = "Prescription";
pub const MEDICATIONS_HEADING: &str = "Medication Details";
pub const ADVICE_HEADING: &str = "Medical Advice";
pub const NO_ADVICE: &str = "No specific advice provided.";
pub const DISCLAIMER: &str =
    "Please follow the prescription carefully and consult your doctor if symptoms persist.";

/// One visual element of the report, top to bottom.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportBlock {
    Title(String),
    /// Disease name shown next to the title.
    Badge(String),
    Caption(String),
    Heading(String),
    /// Medication name.
    Subheading(String),
    Field { label: String, value: String },
    Point(String),
    /// Raw advice text shown when nothing could be extracted.
    Paragraph(String),
    Note(String),
    Rule,
}

/// Rendered report, ready for display or export.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportView {
    /// `None` when the record carries the unknown-condition sentinel.
    pub disease_name: Option<String>,
    /// True when the raw advice text is shown instead of parsed sections.
    pub is_fallback: bool,
    pub blocks: Vec<ReportBlock>,
}

/// Render a completed diagnosis.
pub fn render_report(report: &DiagnosisReport) -> ReportView {
    let caption = format!(
        "Diagnosis: {} ({}% confidence) · {}",
        report.label,
        report.confidence_score,
        report.generated_at.format("%Y-%m-%d %H:%M UTC")
    );
    render_prescription(&report.prescription, &report.raw_advice, Some(caption))
}

/// Render a prescription record, falling back to the raw text when the
/// record has no usable content.
pub fn render_prescription(
    record: &PrescriptionRecord,
    raw_advice: &RawAdviceText,
    caption: Option<String>,
) -> ReportView {
    let mut blocks = vec![
        ReportBlock::Title(REPORT_TITLE.into()),
        ReportBlock::Badge(record.disease_name.clone()),
    ];
    if let Some(caption) = caption {
        blocks.push(ReportBlock::Caption(caption));
    }
    blocks.push(ReportBlock::Rule);

    let is_fallback = !record.has_usable_content();
    if is_fallback {
        blocks.push(ReportBlock::Paragraph(raw_advice.as_str().trim().to_string()));
    } else {
        blocks.push(ReportBlock::Heading(MEDICATIONS_HEADING.into()));
        for med in &record.medications {
            blocks.push(ReportBlock::Subheading(med.name.clone()));
            blocks.push(field("Dosage", &med.dosage));
            blocks.push(field("Frequency", &med.frequency));
            blocks.push(field("Duration", &med.duration));
            if med.has_special_instructions() {
                blocks.push(field("Instructions", &med.special_instructions));
            }
        }

        blocks.push(ReportBlock::Heading(ADVICE_HEADING.into()));
        if record.advice.is_empty() {
            blocks.push(ReportBlock::Note(NO_ADVICE.into()));
        } else {
            blocks.extend(record.advice.iter().cloned().map(ReportBlock::Point));
        }
    }

    blocks.push(ReportBlock::Rule);
    blocks.push(ReportBlock::Note(DISCLAIMER.into()));

    ReportView {
        disease_name: record
            .has_known_disease()
            .then(|| record.disease_name.clone()),
        is_fallback,
        blocks,
    }
}

fn field(label: &str, value: &str) -> ReportBlock {
    ReportBlock::Field {
        label: label.into(),
        value: value.into(),
    }
}

/// Plain-text rendering for terminals.
impl fmt::Display for ReportView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for block in &self.blocks {
            match block {
                ReportBlock::Title(text) => {
                    writeln!(f, "{}", text.to_uppercase())?;
                    writeln!(f, "{}", "=".repeat(text.chars().count()))?;
                }
                ReportBlock::Badge(text) => writeln!(f, "[ {text} ]")?,
                ReportBlock::Caption(text) => writeln!(f, "{text}")?,
                ReportBlock::Heading(text) => {
                    writeln!(f)?;
                    writeln!(f, "{text}")?;
                    writeln!(f, "{}", "-".repeat(text.chars().count()))?;
                }
                ReportBlock::Subheading(text) => writeln!(f, "  {text}")?,
                ReportBlock::Field { label, value } => writeln!(f, "    {label}: {value}")?,
                ReportBlock::Point(text) => writeln!(f, "  - {text}")?,
                ReportBlock::Paragraph(text) => {
                    writeln!(f)?;
                    writeln!(f, "{text}")?;
                }
                ReportBlock::Note(text) => writeln!(f, "  {text}")?,
                ReportBlock::Rule => writeln!(f, "{}", "-".repeat(60))?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Medication, UNKNOWN_CONDITION};
    use crate::pipeline::diagnosis::parse_prescription;

    fn acne_record() -> PrescriptionRecord {
        PrescriptionRecord {
            disease_name: "Acne".into(),
            medications: vec![
                Medication {
                    name: "Adapalene".into(),
                    dosage: "0.1% gel".into(),
                    frequency: "Nightly".into(),
                    duration: "12 weeks".into(),
                    special_instructions: "Avoid eyes".into(),
                },
                Medication {
                    name: "Benzoyl Peroxide".into(),
                    ..Default::default()
                },
            ],
            advice: vec!["Use a gentle cleanser".into()],
        }
    }

    #[test]
    fn renders_sections_in_order() {
        let view = render_prescription(&acne_record(), &RawAdviceText::from("raw"), None);

        assert_eq!(view.disease_name.as_deref(), Some("Acne"));
        assert!(!view.is_fallback);
        assert_eq!(view.blocks[0], ReportBlock::Title("Prescription".into()));
        assert_eq!(view.blocks[1], ReportBlock::Badge("Acne".into()));

        let headings: Vec<_> = view
            .blocks
            .iter()
            .filter_map(|b| match b {
                ReportBlock::Heading(h) => Some(h.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(headings, vec![MEDICATIONS_HEADING, ADVICE_HEADING]);
        assert_eq!(view.blocks.last(), Some(&ReportBlock::Note(DISCLAIMER.into())));
    }

    #[test]
    fn instructions_hidden_when_none() {
        let view = render_prescription(&acne_record(), &RawAdviceText::from(""), None);
        let instructions: Vec<_> = view
            .blocks
            .iter()
            .filter(|b| matches!(b, ReportBlock::Field { label, .. } if label == "Instructions"))
            .collect();
        assert_eq!(instructions.len(), 1, "only the first medication has instructions");
    }

    #[test]
    fn empty_advice_shows_placeholder() {
        let record = PrescriptionRecord {
            advice: vec![],
            ..acne_record()
        };
        let view = render_prescription(&record, &RawAdviceText::from(""), None);
        assert!(view.blocks.contains(&ReportBlock::Note(NO_ADVICE.into())));
    }

    #[test]
    fn unparseable_advice_falls_back_to_raw_text() {
        let raw = RawAdviceText::from("  Keep the rash clean and dry.\n");
        let record = parse_prescription(raw.as_str());
        let view = render_prescription(&record, &raw, None);

        assert!(view.is_fallback);
        assert_eq!(view.disease_name, None);
        assert!(view
            .blocks
            .contains(&ReportBlock::Paragraph("Keep the rash clean and dry.".into())));
        assert!(view.blocks.contains(&ReportBlock::Badge(UNKNOWN_CONDITION.into())));
        assert!(!view
            .blocks
            .iter()
            .any(|b| matches!(b, ReportBlock::Heading(_))));
    }

    #[test]
    fn plain_text_output_lists_medications_and_advice() {
        let text = render_prescription(&acne_record(), &RawAdviceText::from(""), None).to_string();
        assert!(text.starts_with("PRESCRIPTION\n============\n[ Acne ]\n"));
        assert!(text.contains("  Adapalene\n    Dosage: 0.1% gel\n"));
        assert!(text.contains("    Instructions: Avoid eyes\n"));
        assert!(text.contains("  - Use a gentle cleanser\n"));
        assert!(text.contains(DISCLAIMER));
    }
}
