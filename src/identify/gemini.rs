use crate::config::IdentifyConfig;
use crate::identify::data_uri::parse_data_uri;
use crate::identify::interface::{
    parse_result_json, ErrorReason, IdentificationResult, IdentifyError, IdentifyRequest,
    MedicineIdentifier,
};
use crate::identify::prompt::{identify_prompt, result_schema};
use crate::utils::http::{request_with_retry, RetryPolicy};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

pub struct GeminiIdentifier {
    api_key: String,
    base_url: String,
    model: String,
    client: Client,
    retry: RetryPolicy,
}

impl GeminiIdentifier {
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        model: Option<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        // If empty string provided, fall back to default
        let model = model
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let base_url = base_url
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            retry,
        }
    }

    pub fn from_config(config: &IdentifyConfig) -> Result<Self, String> {
        let api_key = config
            .resolve_api_key()
            .ok_or("Gemini API key is required")?;
        Ok(Self::new(
            api_key,
            config.base_url.clone(),
            config.model.clone(),
            Duration::from_secs(config.timeout_secs),
            RetryPolicy::new(config.max_retries),
        ))
    }

    /// Swap the HTTP client, e.g. for one that bypasses the system proxy.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn build_body(request: &IdentifyRequest) -> Result<Value, IdentifyError> {
        let image = parse_data_uri(&request.photo_data_uri)?;
        Ok(json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "text": identify_prompt(&request.language) },
                    {
                        "inline_data": {
                            "mime_type": image.mime_type,
                            "data": image.data
                        }
                    }
                ]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": result_schema()
            }
        }))
    }
}

/// Turn a non-success response body into an error, preferring the
/// `error.status` string Google puts in the body.
fn error_from_body(status: reqwest::StatusCode, body: &str) -> IdentifyError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let error = parsed.as_ref().and_then(|v| v.get("error"));

    let reason = error
        .and_then(|e| e.get("status"))
        .and_then(|s| s.as_str())
        .map(ErrorReason::from_status_str)
        .filter(|r| *r != ErrorReason::Other)
        .unwrap_or_else(|| ErrorReason::from_http_status(status));

    let message = error
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Gemini API error ({}): {}", status, body));

    IdentifyError::new(reason, message)
}

fn extract_text(json: &Value) -> Result<String, IdentifyError> {
    // Structure: { "candidates": [ { "content": { "parts": [ { "text": "..." } ] } } ] }
    let candidate = json
        .get("candidates")
        .and_then(|v| v.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| {
            let blocked = json
                .pointer("/promptFeedback/blockReason")
                .and_then(|v| v.as_str());
            match blocked {
                Some(reason) => IdentifyError::invalid(format!("Prompt blocked: {}", reason)),
                None => IdentifyError::malformed("Missing 'candidates' array"),
            }
        })?;

    let text: String = candidate
        .pointer("/content/parts")
        .and_then(|v| v.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        let finish = candidate
            .get("finishReason")
            .and_then(|v| v.as_str())
            .unwrap_or("UNKNOWN");
        return Err(IdentifyError::malformed(format!(
            "Empty model output (finishReason: {})",
            finish
        )));
    }
    Ok(text)
}

#[async_trait]
impl MedicineIdentifier for GeminiIdentifier {
    fn id(&self) -> String {
        "gemini".to_string()
    }

    async fn identify(
        &self,
        request: IdentifyRequest,
    ) -> Result<IdentificationResult, IdentifyError> {
        // Key goes in a header so it never shows up in a URL that error text echoes.
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = Self::build_body(&request)?;

        tracing::info!(
            "[Identify] Gemini request: model={}, language={}",
            self.model,
            request.language
        );

        let res = request_with_retry(
            || {
                self.client
                    .post(&url)
                    .header("x-goog-api-key", &self.api_key)
                    .json(&body)
                    .send()
            },
            self.retry,
        )
        .await?;

        let status = res.status();
        if !status.is_success() {
            let error_text = res.text().await.unwrap_or_default();
            let err = error_from_body(status, &error_text);
            tracing::error!("[Identify] Gemini API error: {}", err);
            return Err(err);
        }

        let json: Value = res.json().await?;
        let text = extract_text(&json)?;
        let result = parse_result_json(&text)?;
        tracing::info!("[Identify] Identified '{}'", result.medicine_name);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PHOTO: &str = "data:image/jpeg;base64,/9j/4AAQSkZJRg==";

    fn identifier(server: &MockServer) -> GeminiIdentifier {
        GeminiIdentifier::new(
            "test-key".to_string(),
            Some(server.uri()),
            Some("gemini-test".to_string()),
            Duration::from_secs(5),
            RetryPolicy::immediate(1),
        )
        .with_client(Client::builder().no_proxy().build().unwrap())
    }

    fn request(language: &str) -> IdentifyRequest {
        IdentifyRequest {
            photo_data_uri: PHOTO.to_string(),
            language: language.to_string(),
        }
    }

    fn candidate_body(text: &str) -> Value {
        json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": text }] },
                "finishReason": "STOP"
            }]
        })
    }

    #[test]
    fn test_body_carries_image_and_language() {
        let body = GeminiIdentifier::build_body(&request("ta")).unwrap();
        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert!(parts[0]["text"].as_str().unwrap().contains("language: ta"));
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/jpeg");
        assert_eq!(parts[1]["inline_data"]["data"], "/9j/4AAQSkZJRg==");
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );
    }

    #[test]
    fn test_body_rejects_non_data_uri() {
        let mut req = request("en");
        req.photo_data_uri = "file:///tmp/a.png".to_string();
        let err = GeminiIdentifier::build_body(&req).unwrap_err();
        assert_eq!(err.reason, ErrorReason::InvalidArgument);
    }

    #[tokio::test]
    async fn test_identify_parses_candidate_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-test:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(json!({
                "generationConfig": { "responseMimeType": "application/json" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(candidate_body(
                r#"{"medicineName":"Paracetamol","uses":"Used for pain relief and fever."}"#,
            )))
            .expect(1)
            .mount(&server)
            .await;

        let result = identifier(&server).identify(request("en")).await.unwrap();
        assert_eq!(result.medicine_name, "Paracetamol");
        assert_eq!(result.uses, "Used for pain relief and fever.");
    }

    #[tokio::test]
    async fn test_error_status_from_body_wins() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {
                    "code": 400,
                    "message": "Unable to process input image.",
                    "status": "INVALID_ARGUMENT"
                }
            })))
            .mount(&server)
            .await;

        let err = identifier(&server).identify(request("en")).await.unwrap_err();
        assert_eq!(err.reason, ErrorReason::InvalidArgument);
        assert_eq!(err.message, "Unable to process input image.");
    }

    #[tokio::test]
    async fn test_gateway_timeout_maps_to_deadline() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(504).set_body_string("upstream timed out"))
            .mount(&server)
            .await;

        let err = identifier(&server).identify(request("en")).await.unwrap_err();
        assert_eq!(err.reason, ErrorReason::DeadlineExceeded);
    }

    #[tokio::test]
    async fn test_blocked_prompt_is_invalid_argument() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "promptFeedback": { "blockReason": "SAFETY" }
            })))
            .mount(&server)
            .await;

        let err = identifier(&server).identify(request("en")).await.unwrap_err();
        assert_eq!(err.reason, ErrorReason::InvalidArgument);
        assert!(err.message.contains("SAFETY"));
    }

    #[tokio::test]
    async fn test_non_json_output_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(candidate_body("I cannot tell.")),
            )
            .mount(&server)
            .await;

        let err = identifier(&server).identify(request("en")).await.unwrap_err();
        assert_eq!(err.reason, ErrorReason::MalformedResponse);
    }

    #[tokio::test]
    async fn test_network_error_does_not_leak_api_key() {
        let gemini = GeminiIdentifier::new(
            "SECRET-KEY-123".to_string(),
            Some("http://127.0.0.1:9".to_string()),
            None,
            Duration::from_secs(2),
            RetryPolicy::immediate(0),
        )
        .with_client(Client::builder().no_proxy().build().unwrap());

        let err = gemini.identify(request("en")).await.unwrap_err();
        assert_eq!(err.reason, ErrorReason::Unavailable);
        assert!(!err.friendly_message().contains("SECRET-KEY-123"));
        assert!(!err.to_string().contains("SECRET-KEY-123"));
    }

    #[test]
    fn test_from_config_requires_key() {
        let config = IdentifyConfig {
            api_key: None,
            api_key_env: Some("PILL_IDENTIFIER_TEST_NO_GEMINI_KEY".to_string()),
            ..IdentifyConfig::default()
        };
        assert!(GeminiIdentifier::from_config(&config).is_err());
    }
}
