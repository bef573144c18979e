use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};

use super::types::ClassificationClient;
use super::{DiagnosisError, Service};
use crate::config::AppConfig;
use crate::models::DiagnosisResult;

/// Multipart field the classification service reads the image from.
const IMAGE_FIELD: &str = "file";

/// HTTP client for the image classification service.
pub struct HttpClassificationClient {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpClassificationClient {
    /// `timeout` of `None` leaves requests unbounded.
    pub fn new(endpoint: &str, timeout: Option<Duration>) -> Result<Self, DiagnosisError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| {
            DiagnosisError::transport(Service::Classification, format!("HTTP client setup: {e}"))
        })?;

        Ok(Self {
            endpoint: endpoint.trim().to_string(),
            client,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, DiagnosisError> {
        Self::new(&config.classifier_url, config.http_timeout)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ClassificationClient for HttpClassificationClient {
    async fn classify(&self, image: &[u8]) -> Result<DiagnosisResult, DiagnosisError> {
        let form = Form::new().part(IMAGE_FIELD, Part::bytes(image.to_vec()).file_name("upload"));

        tracing::debug!(endpoint = %self.endpoint, image_bytes = image.len(), "Sending image for classification");

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| DiagnosisError::from_reqwest(Service::Classification, &self.endpoint, &e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DiagnosisError::from_reqwest(Service::Classification, &self.endpoint, &e))?;

        if !status.is_success() {
            return Err(DiagnosisError::from_status(Service::Classification, status, &body));
        }

        decode_classification(&body)
    }
}

/// Decode `{ "disease": string, "confidence": number }` (0–100).
///
/// Only the confidence is required here. A missing or blank label decodes to
/// `None`; the orchestrator rejects it only if the result clears the gate.
pub fn decode_classification(body: &str) -> Result<DiagnosisResult, DiagnosisError> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| DiagnosisError::MalformedResponse(format!("not JSON: {e}")))?;

    let label = value
        .get("disease")
        .and_then(|d| d.as_str())
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string);

    let confidence_score = value
        .get("confidence")
        .and_then(|c| c.as_f64())
        .ok_or_else(|| DiagnosisError::MalformedResponse("missing numeric confidence".into()))?;

    if !(0.0..=100.0).contains(&confidence_score) {
        return Err(DiagnosisError::MalformedResponse(format!(
            "confidence {confidence_score} is outside 0–100"
        )));
    }

    Ok(DiagnosisResult {
        label,
        confidence_score,
    })
}

/// Mock classification client for testing. Returns a fixed outcome.
pub struct MockClassificationClient {
    outcome: Result<DiagnosisResult, DiagnosisError>,
    calls: AtomicUsize,
}

impl MockClassificationClient {
    pub fn new(label: &str, confidence_score: f64) -> Self {
        Self {
            outcome: Ok(DiagnosisResult {
                label: Some(label.to_string()),
                confidence_score,
            }),
            calls: AtomicUsize::new(0),
        }
    }

    /// A result carrying a score but no label.
    pub fn unlabeled(confidence_score: f64) -> Self {
        Self {
            outcome: Ok(DiagnosisResult {
                label: None,
                confidence_score,
            }),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: DiagnosisError) -> Self {
        Self {
            outcome: Err(error),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClassificationClient for MockClassificationClient {
    async fn classify(&self, _image: &[u8]) -> Result<DiagnosisResult, DiagnosisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}

#[async_trait]
impl<T: ClassificationClient + Send + Sync + ?Sized> ClassificationClient for std::sync::Arc<T> {
    async fn classify(&self, image: &[u8]) -> Result<DiagnosisResult, DiagnosisError> {
        (**self).classify(image).await
    }
}
