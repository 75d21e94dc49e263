//! Digitizer backed by an HTTP function (Supabase edge function by default).

use super::{DigitizationRequest, DigitizeError, Digitizer, RecognizedText};
use crate::config::AppConfig;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub struct EdgeFunctionDigitizer {
    url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl EdgeFunctionDigitizer {
    pub fn new(client: reqwest::Client, url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            url: url.into(),
            api_key,
            client,
        }
    }

    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self::new(
            client,
            config.function_url.clone(),
            config.api_key.clone(),
        ))
    }
}

// ── Wire types ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct DigitizeBody<'a> {
    image: &'a str,
}

#[derive(Deserialize)]
struct DigitizeResponse {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Pull a human-readable message out of an error body, if it has one.
fn error_message(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    parsed.error.or(parsed.message)
}

/// First 500 characters of a body, for logging.
fn preview(body: &str) -> &str {
    match body.char_indices().nth(500) {
        Some((end, _)) => &body[..end],
        None => body,
    }
}

// ── Digitizer implementation ────────────────────────────────────────────────

#[async_trait::async_trait]
impl Digitizer for EdgeFunctionDigitizer {
    fn name(&self) -> &str {
        "edge_function"
    }

    async fn digitize(
        &self,
        request: &DigitizationRequest,
    ) -> Result<RecognizedText, DigitizeError> {
        let body = DigitizeBody {
            image: request.image.data_uri(),
        };

        info!(
            "EdgeFunctionDigitizer: submitting {} ({} chars encoded, epoch {})",
            request.image.name(),
            body.image.len(),
            request.epoch.0
        );

        let mut builder = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.header("apikey", key).bearer_auth(key);
        }

        let resp = builder.send().await?;
        let status = resp.status();

        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            debug!(
                "EdgeFunctionDigitizer: error body ({} bytes): {}",
                text.len(),
                preview(&text)
            );
            return Err(DigitizeError::Status {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        let raw_text = resp.text().await?;
        debug!(
            "EdgeFunctionDigitizer: raw response ({} bytes): {}",
            raw_text.len(),
            preview(&raw_text)
        );
        let parsed: DigitizeResponse = serde_json::from_str(&raw_text)?;

        match (parsed.text, parsed.error) {
            (Some(text), _) if !text.is_empty() => RecognizedText::new(text),
            (_, Some(message)) => Err(DigitizeError::Status {
                status: status.as_u16(),
                message: Some(message),
            }),
            _ => Err(DigitizeError::NoText),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::SourceImage;
    use crate::digitize::{Epoch, GENERIC_FAILURE_MESSAGE};
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> DigitizationRequest {
        DigitizationRequest {
            epoch: Epoch(1),
            image: SourceImage::encode("notes.png", "image/png", b"png"),
        }
    }

    fn digitizer(server: &MockServer, timeout: Duration) -> EdgeFunctionDigitizer {
        let client = reqwest::Client::builder().timeout(timeout).build().unwrap();
        EdgeFunctionDigitizer::new(
            client,
            format!("{}/functions/v1/digitize-handwriting", server.uri()),
            Some("anon-key".to_string()),
        )
    }

    async fn respond_with(template: ResponseTemplate) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/functions/v1/digitize-handwriting"))
            .respond_with(template)
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_success_sends_contract_body_and_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/functions/v1/digitize-handwriting"))
            .and(header("apikey", "anon-key"))
            .and(header("authorization", "Bearer anon-key"))
            .and(body_json(json!({ "image": "data:image/png;base64,cG5n" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "text": "Hello" })))
            .expect(1)
            .mount(&server)
            .await;

        let text = digitizer(&server, Duration::from_secs(5))
            .digitize(&request())
            .await
            .unwrap();
        assert_eq!(text.as_str(), "Hello");
    }

    #[tokio::test]
    async fn test_empty_text_is_failure() {
        let server =
            respond_with(ResponseTemplate::new(200).set_body_json(json!({ "text": "" }))).await;
        let err = digitizer(&server, Duration::from_secs(5))
            .digitize(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, DigitizeError::NoText));
    }

    #[tokio::test]
    async fn test_missing_text_is_failure() {
        let server = respond_with(ResponseTemplate::new(200).set_body_json(json!({}))).await;
        let err = digitizer(&server, Duration::from_secs(5))
            .digitize(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, DigitizeError::NoText));
    }

    #[tokio::test]
    async fn test_error_status_carries_message() {
        let server = respond_with(
            ResponseTemplate::new(500).set_body_json(json!({ "error": "Model overloaded" })),
        )
        .await;
        let err = digitizer(&server, Duration::from_secs(5))
            .digitize(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, DigitizeError::Status { status: 500, .. }));
        assert_eq!(err.display_message(), "Model overloaded");
    }

    #[tokio::test]
    async fn test_error_status_without_body_uses_fallback() {
        let server = respond_with(ResponseTemplate::new(502).set_body_string("<html>")).await;
        let err = digitizer(&server, Duration::from_secs(5))
            .digitize(&request())
            .await
            .unwrap_err();
        assert_eq!(err.display_message(), GENERIC_FAILURE_MESSAGE);
    }

    #[tokio::test]
    async fn test_error_field_on_success_status() {
        let server = respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "error": "Image too blurry" })),
        )
        .await;
        let err = digitizer(&server, Duration::from_secs(5))
            .digitize(&request())
            .await
            .unwrap_err();
        assert_eq!(err.display_message(), "Image too blurry");
    }

    #[tokio::test]
    async fn test_unreadable_body_is_malformed() {
        let server = respond_with(ResponseTemplate::new(200).set_body_string("not json")).await;
        let err = digitizer(&server, Duration::from_secs(5))
            .digitize(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, DigitizeError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_timeout_is_transport_failure() {
        let server = respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "text": "late" }))
                .set_delay(Duration::from_secs(2)),
        )
        .await;
        let err = digitizer(&server, Duration::from_millis(100))
            .digitize(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, DigitizeError::Transport(_)));
        assert_eq!(err.display_message(), "The digitization request timed out");
    }
}
