use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::prompt::{build_advice_prompt, ADVICE_SYSTEM_PROMPT};
use super::types::AdviceClient;
use super::{DiagnosisError, Service};
use crate::config::AppConfig;
use crate::models::{AdviceRequest, RawAdviceText};

/// Returned when the completion envelope carries no text.
pub const NO_PRESCRIPTION: &str = "No prescription available.";

const MAX_COMPLETION_TOKENS: u32 = 1024;

/// Chat-completions client for the generative advice service.
pub struct HttpAdviceClient {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpAdviceClient {
    /// `timeout` of `None` leaves requests unbounded.
    pub fn new(
        endpoint: &str,
        model: &str,
        api_key: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, DiagnosisError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| {
            DiagnosisError::transport(Service::Advice, format!("HTTP client setup: {e}"))
        })?;

        Ok(Self {
            endpoint: endpoint.trim().to_string(),
            model: model.to_string(),
            api_key,
            client,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, DiagnosisError> {
        Self::new(
            &config.advice_url,
            &config.advice_model,
            config.advice_api_key.clone(),
            config.http_timeout,
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

/// Request body for a chat completion
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    messages: [ChatMessage<'a>; 2],
    model: &'a str,
    temperature: f32,
    max_completion_tokens: u32,
    top_p: f32,
    stream: bool,
    stop: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Response envelope; everything optional so a thin envelope still decodes.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl AdviceClient for HttpAdviceClient {
    async fn request_advice(
        &self,
        request: &AdviceRequest,
    ) -> Result<RawAdviceText, DiagnosisError> {
        let user_prompt = build_advice_prompt(request);
        let body = ChatCompletionRequest {
            messages: [
                ChatMessage {
                    role: "system",
                    content: ADVICE_SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &user_prompt,
                },
            ],
            model: &self.model,
            temperature: 1.0,
            max_completion_tokens: MAX_COMPLETION_TOKENS,
            top_p: 1.0,
            stream: false,
            stop: None,
        };

        let mut http_request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            http_request = http_request.bearer_auth(key);
        }

        tracing::debug!(endpoint = %self.endpoint, model = %self.model, "Requesting advice");

        let response = http_request
            .send()
            .await
            .map_err(|e| DiagnosisError::from_reqwest(Service::Advice, &self.endpoint, &e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| DiagnosisError::from_reqwest(Service::Advice, &self.endpoint, &e))?;

        if !status.is_success() {
            return Err(DiagnosisError::from_status(Service::Advice, status, &text));
        }

        Ok(extract_completion(&text))
    }
}

/// First completion text, unmodified, or the sentinel when there is none.
pub fn extract_completion(body: &str) -> RawAdviceText {
    let completion = match serde_json::from_str::<ChatCompletionResponse>(body) {
        Ok(envelope) => envelope
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .filter(|content| !content.is_empty()),
        Err(e) => {
            tracing::warn!(error = %e, "Advice envelope did not decode");
            None
        }
    };

    match completion {
        Some(content) => RawAdviceText(content),
        None => {
            tracing::warn!("Advice envelope carried no completion, using fallback text");
            RawAdviceText::from(NO_PRESCRIPTION)
        }
    }
}

/// Mock advice client for testing. Records every request it receives.
pub struct MockAdviceClient {
    outcome: Result<RawAdviceText, DiagnosisError>,
    requests: Mutex<Vec<AdviceRequest>>,
}

impl MockAdviceClient {
    pub fn new(response: &str) -> Self {
        Self {
            outcome: Ok(RawAdviceText::from(response)),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: DiagnosisError) -> Self {
        Self {
            outcome: Err(error),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<AdviceRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AdviceClient for MockAdviceClient {
    async fn request_advice(
        &self,
        request: &AdviceRequest,
    ) -> Result<RawAdviceText, DiagnosisError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        self.outcome.clone()
    }
}

#[async_trait]
impl<T: AdviceClient + Send + Sync + ?Sized> AdviceClient for std::sync::Arc<T> {
    async fn request_advice(
        &self,
        request: &AdviceRequest,
    ) -> Result<RawAdviceText, DiagnosisError> {
        (**self).request_advice(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::sync::Arc;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/v1/chat/completions")
    }

    fn eczema_request() -> AdviceRequest {
        AdviceRequest {
            diagnosis_label: "Eczema".into(),
            confidence_score: 95.0,
        }
    }

    #[test]
    fn extracts_first_completion_verbatim() {
        let body = json!({
            "choices": [
                { "message": { "role": "assistant", "content": "  <diseaseName>Eczema</diseaseName>\n" } },
                { "message": { "role": "assistant", "content": "second" } }
            ]
        })
        .to_string();
        assert_eq!(extract_completion(&body).as_str(), "  <diseaseName>Eczema</diseaseName>\n");
    }

    #[test]
    fn empty_envelope_falls_back_to_sentinel() {
        for body in [
            r#"{"choices": []}"#,
            r#"{}"#,
            r#"{"choices": [{"message": null}]}"#,
            r#"{"choices": [{"message": {"content": ""}}]}"#,
            "not json at all",
        ] {
            assert_eq!(extract_completion(body).as_str(), NO_PRESCRIPTION, "body: {body}");
        }
    }

    #[tokio::test]
    async fn sends_chat_completion_body_with_bearer_token() {
        let seen: Arc<Mutex<Option<(Value, Option<String>)>>> = Arc::new(Mutex::new(None));
        let seen_in_handler = seen.clone();
        let app = Router::new().route(
            "/v1/chat/completions",
            post(move |headers: HeaderMap, Json(body): Json<Value>| {
                let seen = seen_in_handler.clone();
                async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    *seen.lock().unwrap() = Some((body, auth));
                    Json(json!({ "choices": [{ "message": { "content": "<point>Moisturize</point>" } }] }))
                }
            }),
        );
        let url = serve(app).await;
        let client = HttpAdviceClient::new(&url, "llama-test", Some("k-123".into()), None).unwrap();

        let raw = client.request_advice(&eczema_request()).await.unwrap();
        assert_eq!(raw.as_str(), "<point>Moisturize</point>");

        let (body, auth) = seen.lock().unwrap().clone().unwrap();
        assert_eq!(auth.as_deref(), Some("Bearer k-123"));
        assert_eq!(body["model"], "llama-test");
        assert_eq!(body["stream"], false);
        assert_eq!(body["max_completion_tokens"], 1024);
        assert!(body["stop"].is_null());
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], ADVICE_SYSTEM_PROMPT);
        assert_eq!(body["messages"][1]["role"], "user");
        let user = body["messages"][1]["content"].as_str().unwrap();
        assert!(user.contains("diagnosed with Eczema with a confidence level of 95%"));
    }

    #[tokio::test]
    async fn omits_authorization_without_key() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|headers: HeaderMap| async move {
                let content = if headers.contains_key("authorization") { "auth" } else { "anonymous" };
                Json(json!({ "choices": [{ "message": { "content": content } }] }))
            }),
        );
        let url = serve(app).await;
        let client = HttpAdviceClient::new(&url, "m", None, None).unwrap();

        let raw = client.request_advice(&eczema_request()).await.unwrap();
        assert_eq!(raw.as_str(), "anonymous");
    }

    #[tokio::test]
    async fn non_success_status_is_transport_error() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({ "error": { "message": "Rate limit reached" } })),
                )
            }),
        );
        let url = serve(app).await;
        let client = HttpAdviceClient::new(&url, "m", None, None).unwrap();

        let err = client.request_advice(&eczema_request()).await.unwrap_err();
        assert_eq!(
            err,
            DiagnosisError::Transport {
                service: Service::Advice,
                message: "status 429: Rate limit reached".into(),
            }
        );
    }

    #[tokio::test]
    async fn success_without_completion_returns_sentinel() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async { Json(json!({ "choices": [] })) }),
        );
        let url = serve(app).await;
        let client = HttpAdviceClient::new(&url, "m", None, None).unwrap();

        let raw = client.request_advice(&eczema_request()).await.unwrap();
        assert_eq!(raw.as_str(), NO_PRESCRIPTION);
    }

    #[tokio::test]
    async fn mock_records_requests() {
        let mock = MockAdviceClient::new("text");
        let raw = mock.request_advice(&eczema_request()).await.unwrap();
        assert_eq!(raw.as_str(), "text");
        assert_eq!(mock.requests(), vec![eczema_request()]);
    }
}
