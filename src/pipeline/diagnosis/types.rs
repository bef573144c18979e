use async_trait::async_trait;

use super::DiagnosisError;
use crate::models::{AdviceRequest, DiagnosisResult, RawAdviceText};

/// Classification service abstraction (allows mocking)
#[async_trait]
pub trait ClassificationClient {
    /// One outbound request, no retry.
    async fn classify(&self, image: &[u8]) -> Result<DiagnosisResult, DiagnosisError>;
}

/// Generative advice service abstraction (allows mocking)
#[async_trait]
pub trait AdviceClient {
    /// Returns the first completion verbatim, or the no-prescription sentinel
    /// when the envelope carries none.
    async fn request_advice(
        &self,
        request: &AdviceRequest,
    ) -> Result<RawAdviceText, DiagnosisError>;
}
