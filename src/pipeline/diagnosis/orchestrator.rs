//! Diagnosis run state machine.
//!
//! ```text
//! Idle → Submitting → Classified → Gated(Accepted) → AdviceRequested → Done
//!            │                        Gated(Rejected)  │         │
//!            └────────→ Errored ←──────────────────────┴─────────┘
//! ```
//!
//! One `Submission` owns everything a run produces. `submit` takes
//! `&mut self`, so a second run cannot start while one is in flight, and
//! every submission restarts at `Idle`.

use std::mem;

use chrono::Utc;
use uuid::Uuid;

use super::parser::parse_prescription;
use super::types::{AdviceClient, ClassificationClient};
use super::DiagnosisError;
use crate::config::{DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_MAX_IMAGE_BYTES};
use crate::models::{AdviceRequest, DiagnosisReport, DiagnosisResult};

/// Shown when a diagnosis does not clear the confidence gate.
pub const LOW_CONFIDENCE_MESSAGE: &str = "Please upload a clear and fresh picture!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    Accepted,
    Rejected,
}

/// Strictly above the threshold is accepted; equal is rejected.
pub fn apply_confidence_gate(confidence_score: f64, threshold: f64) -> GateOutcome {
    if confidence_score > threshold {
        GateOutcome::Accepted
    } else {
        GateOutcome::Rejected
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum DiagnosisState {
    #[default]
    Idle,
    /// Holds the image payload being classified.
    Submitting(Vec<u8>),
    Classified(DiagnosisResult),
    Gated {
        diagnosis: DiagnosisResult,
        outcome: GateOutcome,
    },
    AdviceRequested(AdviceRequest),
    Done(Box<DiagnosisReport>),
    Errored(DiagnosisError),
}

impl DiagnosisState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Submitting(_) => "submitting",
            Self::Classified(_) => "classified",
            Self::Gated {
                outcome: GateOutcome::Accepted,
                ..
            } => "gated_accepted",
            Self::Gated {
                outcome: GateOutcome::Rejected,
                ..
            } => "gated_rejected",
            Self::AdviceRequested(_) => "advice_requested",
            Self::Done(_) => "done",
            Self::Errored(_) => "errored",
        }
    }

    /// Terminal states end a run; `submit` restarts from `Idle`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Done(_)
                | Self::Errored(_)
                | Self::Gated {
                    outcome: GateOutcome::Rejected,
                    ..
                }
        )
    }
}

/// What a finished run hands back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosisOutcome {
    /// Advice was requested and parsed; ready for rendering.
    Completed(Box<DiagnosisReport>),
    /// User-facing warning, not an error: resubmit a clearer image.
    LowConfidence {
        diagnosis: DiagnosisResult,
        message: &'static str,
    },
}

/// Per-submission context: the staged image and the run's state.
#[derive(Debug, Default)]
pub struct Submission {
    id: Uuid,
    image: Option<Vec<u8>>,
    state: DiagnosisState,
}

impl Submission {
    fn fresh(image: Option<Vec<u8>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            image,
            state: DiagnosisState::Idle,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }

    pub fn state(&self) -> &DiagnosisState {
        &self.state
    }
}

/// Sequences classification → confidence gate → advice → parsing.
pub struct DiagnosisOrchestrator {
    classifier: Box<dyn ClassificationClient + Send + Sync>,
    advisor: Box<dyn AdviceClient + Send + Sync>,
    confidence_threshold: f64,
    max_image_bytes: usize,
    submission: Submission,
}

impl DiagnosisOrchestrator {
    pub fn new(
        classifier: Box<dyn ClassificationClient + Send + Sync>,
        advisor: Box<dyn AdviceClient + Send + Sync>,
    ) -> Self {
        Self {
            classifier,
            advisor,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            submission: Submission::fresh(None),
        }
    }

    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// 0 disables the size check.
    pub fn with_max_image_bytes(mut self, max_image_bytes: usize) -> Self {
        self.max_image_bytes = max_image_bytes;
        self
    }

    pub fn confidence_threshold(&self) -> f64 {
        self.confidence_threshold
    }

    pub fn submission(&self) -> &Submission {
        &self.submission
    }

    pub fn state(&self) -> &DiagnosisState {
        &self.submission.state
    }

    /// True mid-run; callers disable the submit action while this holds.
    pub fn is_busy(&self) -> bool {
        !matches!(self.submission.state, DiagnosisState::Idle) && !self.submission.state.is_terminal()
    }

    /// Stage a captured image, discarding any previous submission.
    pub fn stage_image(&mut self, image: Vec<u8>) {
        self.submission = Submission::fresh(Some(image));
        tracing::debug!(submission = %self.submission.id, "Image staged");
    }

    /// Drop the staged image and any result ("re-upload").
    pub fn clear(&mut self) {
        self.submission = Submission::fresh(None);
    }

    /// Acknowledge a finished run and return to `Idle`.
    pub fn acknowledge(&mut self) {
        if self.submission.state.is_terminal() {
            self.submission.state = DiagnosisState::Idle;
        }
    }

    /// Run the staged image through the whole pipeline.
    ///
    /// Consumes the staged image: resubmitting requires staging a fresh one.
    pub async fn submit(&mut self) -> Result<DiagnosisOutcome, DiagnosisError> {
        if !matches!(self.submission.state, DiagnosisState::Idle) {
            self.submission.state = DiagnosisState::Idle;
        }

        loop {
            self.step().await?;

            match &self.submission.state {
                DiagnosisState::Done(report) => {
                    return Ok(DiagnosisOutcome::Completed(report.clone()));
                }
                DiagnosisState::Gated {
                    diagnosis,
                    outcome: GateOutcome::Rejected,
                } => {
                    return Ok(DiagnosisOutcome::LowConfidence {
                        diagnosis: diagnosis.clone(),
                        message: LOW_CONFIDENCE_MESSAGE,
                    });
                }
                DiagnosisState::Errored(error) => return Err(error.clone()),
                _ => {}
            }
        }
    }

    /// Perform exactly one transition from the current state.
    ///
    /// Only precondition failures are returned as `Err`; they leave the
    /// state at `Idle` without touching the network. Remote failures move
    /// the run to `Errored`.
    pub async fn step(&mut self) -> Result<(), DiagnosisError> {
        let submission_id = self.submission.id;
        let current = mem::take(&mut self.submission.state);

        let next = match current {
            DiagnosisState::Idle => {
                let image = self.take_staged_image()?;
                tracing::info!(submission = %submission_id, image_bytes = image.len(), "Submitting image");
                DiagnosisState::Submitting(image)
            }

            DiagnosisState::Submitting(image) => match self.classifier.classify(&image).await {
                Ok(diagnosis) => {
                    tracing::info!(
                        submission = %submission_id,
                        label = diagnosis.label.as_deref().unwrap_or("-"),
                        confidence = diagnosis.confidence_score,
                        "Image classified"
                    );
                    DiagnosisState::Classified(diagnosis)
                }
                Err(e) => {
                    tracing::error!(submission = %submission_id, error = %e, "Classification failed");
                    DiagnosisState::Errored(e)
                }
            },

            DiagnosisState::Classified(diagnosis) => {
                let outcome =
                    apply_confidence_gate(diagnosis.confidence_score, self.confidence_threshold);
                if outcome == GateOutcome::Rejected {
                    tracing::warn!(
                        submission = %submission_id,
                        confidence = diagnosis.confidence_score,
                        threshold = self.confidence_threshold,
                        "Confidence too low, advice not requested"
                    );
                }
                DiagnosisState::Gated { diagnosis, outcome }
            }

            DiagnosisState::Gated {
                diagnosis,
                outcome: GateOutcome::Accepted,
            } => match AdviceRequest::from_diagnosis(&diagnosis) {
                Some(request) => DiagnosisState::AdviceRequested(request),
                // Only an accepted result needs a label.
                None => {
                    tracing::error!(submission = %submission_id, "Accepted diagnosis has no label");
                    DiagnosisState::Errored(DiagnosisError::MalformedResponse(
                        "missing disease label".into(),
                    ))
                }
            },

            DiagnosisState::AdviceRequested(request) => {
                match self.advisor.request_advice(&request).await {
                    Ok(raw_advice) => {
                        let prescription = parse_prescription(raw_advice.as_str());
                        tracing::info!(
                            submission = %submission_id,
                            advice_len = raw_advice.as_str().len(),
                            medications = prescription.medications.len(),
                            advice_points = prescription.advice.len(),
                            "Prescription ready"
                        );
                        DiagnosisState::Done(Box::new(DiagnosisReport {
                            submission_id,
                            label: request.diagnosis_label,
                            confidence_score: request.confidence_score,
                            raw_advice,
                            prescription,
                            generated_at: Utc::now(),
                        }))
                    }
                    Err(e) => {
                        tracing::error!(submission = %submission_id, error = %e, "Advice request failed");
                        DiagnosisState::Errored(e)
                    }
                }
            }

            terminal => terminal,
        };

        self.submission.state = next;
        Ok(())
    }

    fn take_staged_image(&mut self) -> Result<Vec<u8>, DiagnosisError> {
        let image = self
            .submission
            .image
            .take()
            .ok_or_else(|| DiagnosisError::Precondition("no image staged".into()))?;

        if image.is_empty() {
            return Err(DiagnosisError::Precondition("staged image is empty".into()));
        }
        if self.max_image_bytes > 0 && image.len() > self.max_image_bytes {
            let limit = self.max_image_bytes;
            let size = image.len();
            // Keep the image so the caller can see what was rejected.
            self.submission.image = Some(image);
            return Err(DiagnosisError::Precondition(format!(
                "image is {size} bytes, limit is {limit}"
            )));
        }
        Ok(image)
    }
}
